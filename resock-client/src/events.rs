//! Named-event registry
//!
//! A small publish/subscribe table keyed by event name. The channel keeps one
//! to deliver inbound events and its own lifecycle events (`connect`,
//! `disconnect`, `error`, `reconnect`, `reconnect_failed`) to consumers, but
//! the registry has no dependency on the channel and can be used on its own.
//!
//! # Semantics
//!
//! - Listeners for one name run in registration order.
//! - Listeners registered under [`WILDCARD`] (`"all"`) run after the named
//!   listeners of every trigger and receive the event name as their first
//!   argument.
//! - Every listener is called with a receiver [`Context`]: the one given at
//!   registration, or the registry's own context.
//! - Removal filters on name, on listener identity and on the explicitly
//!   registered context, independently.
//!
//! # Examples
//!
//! ```rust
//! use resock_client::{EventRegistry, Listener};
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let listener = Listener::new(move |_ctx, args| sink.lock().unwrap().push(args.to_vec()));
//!
//! let mut registry = EventRegistry::new();
//! registry.on("all", listener.clone(), None);
//! registry.trigger("move", &[json!("e2e4")]);
//!
//! assert_eq!(seen.lock().unwrap()[0], vec![json!("move"), json!("e2e4")]);
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Event name whose listeners receive every trigger
pub const WILDCARD: &str = "all";

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Receiver identity bound to a listener
///
/// Contexts compare by identity: every call to [`Context::new`] yields a
/// value equal only to its own clones. Use one context per logical owner
/// (a view, a session) to remove all of its listeners in one `off` call.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Context {
    id: u64,
}

impl Context {
    /// Mint a fresh, unique context
    pub fn new() -> Self {
        Self {
            id: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Numeric identity, useful in logs
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context({})", self.id)
    }
}

type ListenerFn = dyn Fn(&Context, &[Value]) + Send + Sync;

/// Event callback
///
/// Cheap to clone; clones share identity, which is what [`EventRegistry::off`]
/// matches on. Keep a clone around to remove the listener later.
#[derive(Clone)]
pub struct Listener {
    callback: Arc<ListenerFn>,
}

impl Listener {
    /// Wrap a closure receiving the bound context and the trigger arguments
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Context, &[Value]) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Invoke the listener
    pub fn call(&self, context: &Context, args: &[Value]) {
        (self.callback)(context, args)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.callback))
    }
}

#[derive(Clone)]
struct Subscription {
    listener: Listener,
    /// Context given at registration; removal matches against this one
    context: Option<Context>,
    /// Receiver used at invocation time
    receiver: Context,
}

/// Table of listeners keyed by event name
pub struct EventRegistry {
    subscriptions: HashMap<String, Vec<Subscription>>,
    context: Context,
}

impl EventRegistry {
    /// Create an empty registry with its own default context
    pub fn new() -> Self {
        Self::with_context(Context::new())
    }

    /// Create an empty registry whose default receiver is `context`
    pub fn with_context(context: Context) -> Self {
        Self {
            subscriptions: HashMap::new(),
            context,
        }
    }

    /// The receiver bound to listeners registered without a context
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Register `listener` under `name`
    ///
    /// Does nothing when `listener` is `None`.
    pub fn on(
        &mut self,
        name: impl Into<String>,
        listener: impl Into<Option<Listener>>,
        context: impl Into<Option<Context>>,
    ) -> &mut Self {
        let Some(listener) = listener.into() else {
            return self;
        };
        let context = context.into();
        let receiver = context.clone().unwrap_or_else(|| self.context.clone());

        self.subscriptions
            .entry(name.into())
            .or_default()
            .push(Subscription {
                listener,
                context,
                receiver,
            });
        self
    }

    /// Remove listeners
    ///
    /// - no filter: everything is removed
    /// - only `name`: every listener of that event is removed
    /// - `listener` and/or `context`: within `name` (or every event when
    ///   `name` is `None`), listeners matching all given filters are removed
    ///
    /// Events left without listeners are dropped from the table.
    pub fn off<'a>(
        &mut self,
        name: impl Into<Option<&'a str>>,
        listener: impl Into<Option<&'a Listener>>,
        context: impl Into<Option<&'a Context>>,
    ) -> &mut Self {
        let name = name.into();
        let listener = listener.into();
        let context = context.into();

        if name.is_none() && listener.is_none() && context.is_none() {
            self.subscriptions.clear();
            return self;
        }

        let names: Vec<String> = match name {
            Some(name) => vec![name.to_string()],
            None => self.subscriptions.keys().cloned().collect(),
        };

        for name in names {
            let Some(subscriptions) = self.subscriptions.get_mut(&name) else {
                continue;
            };

            if listener.is_some() || context.is_some() {
                subscriptions.retain(|sub| {
                    let listener_matches = listener.map_or(true, |l| *l == sub.listener);
                    let context_matches = context.map_or(true, |c| sub.context.as_ref() == Some(c));
                    !(listener_matches && context_matches)
                });
            } else {
                subscriptions.clear();
            }

            if subscriptions.is_empty() {
                self.subscriptions.remove(&name);
            }
        }

        self
    }

    /// Invoke the listeners of `name`, then the wildcard listeners
    ///
    /// Both lists are snapshotted before the first callback runs.
    pub fn trigger(&self, name: &str, args: &[Value]) -> &Self {
        let named = self.snapshot(name);
        let wildcard = self.snapshot(WILDCARD);

        if named.is_empty() && wildcard.is_empty() {
            return self;
        }

        for sub in &named {
            sub.listener.call(&sub.receiver, args);
        }

        if !wildcard.is_empty() {
            let mut wildcard_args = Vec::with_capacity(args.len() + 1);
            wildcard_args.push(Value::String(name.to_string()));
            wildcard_args.extend_from_slice(args);

            for sub in &wildcard {
                sub.listener.call(&sub.receiver, &wildcard_args);
            }
        }

        self
    }

    /// Number of listeners registered under `name`
    pub fn listener_count(&self, name: &str) -> usize {
        self.subscriptions.get(name).map_or(0, Vec::len)
    }

    /// Names that currently have at least one listener
    pub fn event_names(&self) -> Vec<String> {
        self.subscriptions.keys().cloned().collect()
    }

    /// Whether no listener is registered at all
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    fn snapshot(&self, name: &str) -> Vec<Subscription> {
        self.subscriptions.get(name).cloned().unwrap_or_default()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .subscriptions
            .iter()
            .map(|(name, subs)| (name.as_str(), subs.len()))
            .collect();
        f.debug_struct("EventRegistry")
            .field("context", &self.context)
            .field("subscriptions", &counts)
            .finish()
    }
}
