use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::util::Unsubscribe;

pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Single-topic publish-subscribe dispatcher (spec.md §2 C2, §4.2). Delivery
/// is synchronous and FIFO over listener-registration order. A listener that
/// panics is caught and logged — never propagated to sibling listeners nor to
/// the dispatcher's caller, mirroring the JS source's "an exception from one
/// listener must not break the others" contract translated to Rust's panic
/// model. The facade instantiates two of these: one for snapshot mutation
/// events, one for `SynchronizationEvent`/`FileSynchronizationEvent`.
pub struct EventDispatcher<T> {
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventDispatcher<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener and returns an `Unsubscribe` that removes it.
    /// Takes `Arc<Self>` (rather than `&self`) so the returned closure can
    /// safely outlive any particular borrow, the same shape as
    /// `QueryListenerRegistration` holding `Arc<MemoryLocalStore>` elsewhere
    /// in this codebase.
    pub fn add_listener(self: &Arc<Self>, listener: Listener<T>) -> Unsubscribe
    where
        T: Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, listener));
        let dispatcher = Arc::clone(self);
        Box::new(move || {
            dispatcher.remove_listener(id);
        })
    }

    fn remove_listener(&self, id: u64) {
        self.listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
    }

    /// Delivers `event` to every listener registered at the time dispatch
    /// begins (spec.md §5: "a dispatch snapshot of the listener list is taken
    /// at the start of each event").
    pub fn dispatch(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| listener(event)));
            if result.is_err() {
                log::error!("federation: listener panicked during dispatch; suppressed");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}
