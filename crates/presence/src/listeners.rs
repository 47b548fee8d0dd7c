//! Listener registration and ordered, isolated event delivery.

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use cradle_viewer::ViewerParams;

/// Subscriber for insertion/removal events.
pub trait ViewerListener: Send + Sync {
    /// The device was inserted into a viewer.
    fn on_inserted(&self, params: ViewerParams);

    /// The device left the viewer, or its tag stopped answering.
    fn on_removed(&self);
}

/// Shared listener handle. Registration identity is the allocation,
/// not the value: two listeners comparing equal are still distinct
/// registrations.
pub type ViewerListenerRef = Arc<dyn ViewerListener>;

enum Event {
    Inserted(ViewerParams),
    Removed,
}

struct Entry {
    listener: ViewerListenerRef,
    tx: Sender<Event>,
}

/// Thread-safe listener set with one delivery queue per listener.
///
/// Events posted to a listener are delivered in posting order on that
/// listener's own worker thread, so a listener that blocks delays only
/// itself and posting never blocks the caller. There is no ordering
/// guarantee across different listeners. A listener removed after an
/// event was posted but before delivery may still receive that event.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener`. Re-adding the same allocation is a no-op.
    pub fn register(&self, listener: ViewerListenerRef) {
        let mut entries = self.entries.lock().unwrap();
        if entries
            .iter()
            .any(|entry| Arc::ptr_eq(&entry.listener, &listener))
        {
            return;
        }

        let (tx, rx) = unbounded();
        let worker = Arc::clone(&listener);
        thread::spawn(move || {
            for event in rx {
                match event {
                    Event::Inserted(params) => worker.on_inserted(params),
                    Event::Removed => worker.on_removed(),
                }
            }
        });
        entries.push(Entry { listener, tx });
    }

    /// Remove every registration of `listener`. Its worker exits after
    /// draining events already posted.
    pub fn unregister(&self, listener: &ViewerListenerRef) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|entry| !Arc::ptr_eq(&entry.listener, listener));
    }

    /// Post an insertion event to every registered listener.
    pub fn notify_inserted(&self, params: &ViewerParams) {
        let entries = self.entries.lock().unwrap();
        for entry in entries.iter() {
            let _ = entry.tx.send(Event::Inserted(params.clone()));
        }
    }

    /// Post a removal event to every registered listener.
    pub fn notify_removed(&self) {
        let entries = self.entries.lock().unwrap();
        for entry in entries.iter() {
            let _ = entry.tx.send(Event::Removed);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingListener {
        inserted: AtomicUsize,
        removed: AtomicUsize,
    }

    impl ViewerListener for CountingListener {
        fn on_inserted(&self, _params: ViewerParams) {
            self.inserted.fetch_add(1, Ordering::SeqCst);
        }

        fn on_removed(&self) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_register_is_idempotent_by_identity() {
        let registry = ListenerRegistry::new();
        let listener = Arc::new(CountingListener::default());
        let handle: ViewerListenerRef = listener.clone();

        registry.register(handle.clone());
        registry.register(handle.clone());
        assert_eq!(registry.len(), 1);

        // Same value, different allocation: a distinct registration.
        registry.register(Arc::new(CountingListener::default()));
        assert_eq!(registry.len(), 2);

        registry.notify_removed();
        assert!(wait_for(|| listener.removed.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let registry = ListenerRegistry::new();
        let listener = Arc::new(CountingListener::default());
        let handle: ViewerListenerRef = listener.clone();

        registry.register(handle.clone());
        registry.notify_removed();
        assert!(wait_for(|| listener.removed.load(Ordering::SeqCst) == 1));

        registry.unregister(&handle);
        assert!(registry.is_empty());
        registry.notify_removed();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(listener.removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_per_listener_order_is_posting_order() {
        struct OrderListener {
            log: Mutex<Vec<&'static str>>,
        }

        impl ViewerListener for OrderListener {
            fn on_inserted(&self, _params: ViewerParams) {
                self.log.lock().unwrap().push("inserted");
            }

            fn on_removed(&self) {
                self.log.lock().unwrap().push("removed");
            }
        }

        let registry = ListenerRegistry::new();
        let listener = Arc::new(OrderListener {
            log: Mutex::new(Vec::new()),
        });
        registry.register(listener.clone());

        let params = ViewerParams::default();
        registry.notify_inserted(&params);
        registry.notify_removed();
        registry.notify_inserted(&params);

        assert!(wait_for(|| listener.log.lock().unwrap().len() == 3));
        assert_eq!(
            *listener.log.lock().unwrap(),
            vec!["inserted", "removed", "inserted"]
        );
    }

    #[test]
    fn test_blocking_listener_does_not_stall_others() {
        struct BlockingListener;

        impl ViewerListener for BlockingListener {
            fn on_inserted(&self, _params: ViewerParams) {
                thread::park();
            }

            fn on_removed(&self) {
                thread::park();
            }
        }

        let registry = ListenerRegistry::new();
        registry.register(Arc::new(BlockingListener));
        let listener = Arc::new(CountingListener::default());
        registry.register(listener.clone());

        registry.notify_inserted(&ViewerParams::default());
        assert!(wait_for(|| listener.inserted.load(Ordering::SeqCst) == 1));
    }
}
