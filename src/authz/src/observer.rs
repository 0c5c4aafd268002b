//! Typed observer registry
//!
//! Handlers are called synchronously, in subscription order. A panicking
//! handler is logged and skipped; the remaining handlers still run and the
//! emitter never observes the panic.

use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::error;

/// Callback invoked for every emitted event
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Inner<E> {
    next_id: u64,
    handlers: Vec<(u64, Handler<E>)>,
}

/// Ordered list of event handlers
pub struct ObserverRegistry<E> {
    inner: Arc<Mutex<Inner<E>>>,
}

impl<E: 'static> ObserverRegistry<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 1,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register a handler; it stays registered until
    /// [`Subscription::unsubscribe`] is called
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.handlers.push((id, Arc::new(handler)));
            id
        };

        let weak: Weak<Mutex<Inner<E>>> = Arc::downgrade(&self.inner);
        Subscription::new(id, move || match weak.upgrade() {
            Some(inner) => {
                let mut inner = inner.lock();
                let before = inner.handlers.len();
                inner.handlers.retain(|(handler_id, _)| *handler_id != id);
                inner.handlers.len() != before
            }
            None => false,
        })
    }

    /// Deliver an event to every handler
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe during dispatch without deadlocking.
    pub fn emit(&self, event: &E) {
        let handlers: Vec<(u64, Handler<E>)> = self.inner.lock().handlers.clone();

        for (id, handler) in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
            if let Err(payload) = outcome {
                error!(
                    subscription = id,
                    panic = %panic_message(payload.as_ref()),
                    "Event handler panicked"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every handler
    pub fn clear(&self) {
        self.inner.lock().handlers.clear();
    }
}

impl<E: 'static> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ObserverRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> fmt::Debug for ObserverRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("handlers", &self.inner.lock().handlers.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

type Unsubscribe = Box<dyn FnOnce() -> bool + Send + Sync>;

/// Handle returned by `subscribe`/`watch`
///
/// Dropping a subscription does not unsubscribe; call
/// [`Subscription::unsubscribe`] explicitly.
pub struct Subscription {
    id: u64,
    cancel: Option<Unsubscribe>,
}

impl Subscription {
    pub fn new<F>(id: u64, cancel: F) -> Self
    where
        F: FnOnce() -> bool + Send + Sync + 'static,
    {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel
    pub fn noop() -> Self {
        Self { id: 0, cancel: None }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the handler; returns `true` if it was still registered
    pub fn unsubscribe(mut self) -> bool {
        self.cancel.take().map(|cancel| cancel()).unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
