use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// An event that can be routed through an [`EventBus`] by its kind.
pub trait BusEvent: Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E: BusEvent> {
    next_id: u64,
    handlers: Vec<(u64, E::Kind, Handler<E>)>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<E: BusEvent> Detach for Mutex<Registry<E>> {
    fn detach(&self, id: u64) {
        self.lock().handlers.retain(|(handler_id, _, _)| *handler_id != id);
    }
}

/// Typed publish/subscribe registry.
///
/// Handlers run on the notifying thread, in subscription order, without the
/// registry lock held.
pub struct EventBus<E: BusEvent> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, kind: E::Kind, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, kind, Arc::new(handler)));
            id
        };

        let registry: Arc<dyn Detach> = self.registry.clone();
        Subscription {
            id,
            registry: Some(Arc::downgrade(&registry)),
        }
    }

    /// Delivers `event` to every handler of its kind and returns how many ran.
    pub fn notify(&self, event: &E) -> usize {
        let kind = event.kind();
        let handlers: Vec<Handler<E>> = self
            .registry
            .lock()
            .handlers
            .iter()
            .filter(|(_, handler_kind, _)| *handler_kind == kind)
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.registry
            .lock()
            .handlers
            .iter()
            .filter(|(_, handler_kind, _)| *handler_kind == kind)
            .count()
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes the handler"]
pub struct Subscription {
    id: u64,
    registry: Option<Weak<dyn Detach>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keeps the handler registered for as long as the bus lives.
    pub fn keep(mut self) {
        self.registry = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.detach(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
