//! In-process signal fired whenever the stored access token changes.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct BusInner {
    listeners: Mutex<Vec<(Uuid, Listener)>>,
}

/// Publish/subscribe bus with no payload. Subscribers re-read the token
/// store when notified.
///
/// Cheap to clone; clones share listeners.
#[derive(Clone, Default)]
pub struct AuthEventBus {
    inner: Arc<BusInner>,
}

/// Removes exactly the listener it was returned for
#[must_use = "dropping the handle keeps the listener registered"]
pub struct Unsubscribe {
    id: Uuid,
    bus: Weak<BusInner>,
}

impl Unsubscribe {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns false when the listener was already gone
    pub fn unsubscribe(self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let mut listeners = bus.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() != before
    }
}

impl AuthEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        Unsubscribe {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Call every listener registered at the time of the call, in
    /// registration order. Listeners may subscribe or unsubscribe while
    /// running.
    pub fn emit(&self) {
        let snapshot: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        debug!(listeners = snapshot.len(), "auth event");
        for listener in snapshot {
            listener();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}
