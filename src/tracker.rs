//! Tracking of in-flight calls and idle detection.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::operation::OperationKind;

/// Observer invoked when the number of active calls drops to zero.
pub type IdleCallback = Arc<dyn Fn() + Send + Sync>;

/// Registry of calls currently between `enqueue` and their terminal event.
///
/// Owned by a [`Client`](crate::Client) and shared with every call it creates.
/// The idle callback fires exactly once per transition from one or more
/// active calls to zero, even when several calls finish at the same time.
#[derive(Default)]
pub struct CallTracker {
    active: AtomicUsize,
    registry: Mutex<HashMap<(OperationKind, &'static str), usize>>,
    idle_callback: RwLock<Option<IdleCallback>>,
}

impl CallTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active calls.
    pub fn active_calls_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Number of active calls for the named operation.
    pub fn active_calls_for(&self, name: &str) -> usize {
        self.registry
            .lock()
            .iter()
            .filter(|((_, registered), _)| *registered == name)
            .map(|(_, count)| *count)
            .sum()
    }

    /// Number of active calls of the given kind.
    pub fn active_calls_of(&self, kind: OperationKind) -> usize {
        self.registry
            .lock()
            .iter()
            .filter(|((registered, _), _)| *registered == kind)
            .map(|(_, count)| *count)
            .sum()
    }

    /// Sets the idle observer, replacing any previous one.
    pub fn set_idle_callback(&self, callback: Option<IdleCallback>) {
        *self.idle_callback.write() = callback;
    }

    pub(crate) fn register(&self, kind: OperationKind, name: &'static str) {
        *self.registry.lock().entry((kind, name)).or_insert(0) += 1;
        let active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(operation = %name, active = active, "Registered call");
    }

    pub(crate) fn unregister(&self, kind: OperationKind, name: &'static str) {
        if self.release(kind, name) {
            self.notify_idle();
        }
    }

    /// Drops one registration without notifying. Returns `true` if it was
    /// the last active call; the caller then owes one [`Self::notify_idle`].
    pub(crate) fn release(&self, kind: OperationKind, name: &'static str) -> bool {
        {
            let mut registry = self.registry.lock();
            match registry.get_mut(&(kind, name)) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    registry.remove(&(kind, name));
                }
                None => {
                    tracing::error!(operation = %name, "Unregistered a call that was never registered");
                    return false;
                }
            }
        }

        self.active.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn notify_idle(&self) {
        let callback = self.idle_callback.read().clone();
        tracing::debug!("No active calls left");
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl std::fmt::Debug for CallTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallTracker")
            .field("active", &self.active_calls_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn counting_tracker() -> (Arc<CallTracker>, Arc<AtomicUsize>) {
        let tracker = Arc::new(CallTracker::new());
        let idle = Arc::new(AtomicUsize::new(0));
        let counter = idle.clone();
        tracker.set_idle_callback(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        (tracker, idle)
    }

    #[test]
    fn test_counts_by_name_and_kind() {
        let tracker = CallTracker::new();
        tracker.register(OperationKind::Query, "GetPost");
        tracker.register(OperationKind::Query, "GetPost");
        tracker.register(OperationKind::Mutation, "AddPost");

        assert_eq!(tracker.active_calls_count(), 3);
        assert_eq!(tracker.active_calls_for("GetPost"), 2);
        assert_eq!(tracker.active_calls_of(OperationKind::Mutation), 1);

        tracker.unregister(OperationKind::Query, "GetPost");
        assert_eq!(tracker.active_calls_for("GetPost"), 1);
    }

    #[test]
    fn test_release_leaves_notification_to_caller() {
        let (tracker, idle) = counting_tracker();
        tracker.register(OperationKind::Query, "GetPost");
        tracker.register(OperationKind::Query, "GetPost");

        assert!(!tracker.release(OperationKind::Query, "GetPost"));
        assert!(tracker.release(OperationKind::Query, "GetPost"));
        assert_eq!(idle.load(Ordering::SeqCst), 0);

        tracker.notify_idle();
        assert_eq!(idle.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_unregister_does_not_underflow() {
        let (tracker, idle) = counting_tracker();
        tracker.unregister(OperationKind::Query, "GetPost");
        assert_eq!(tracker.active_calls_count(), 0);
        assert_eq!(idle.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_idle_fires_once_for_concurrent_completions() {
        for n in [1usize, 2, 10] {
            let (tracker, idle) = counting_tracker();
            for _ in 0..n {
                tracker.register(OperationKind::Query, "GetPost");
            }

            let barrier = Arc::new(std::sync::Barrier::new(n));
            let handles: Vec<_> = (0..n)
                .map(|_| {
                    let tracker = tracker.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        tracker.unregister(OperationKind::Query, "GetPost");
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(tracker.active_calls_count(), 0);
            assert_eq!(idle.load(Ordering::SeqCst), 1, "n = {n}");
        }
    }
}
