//! Alarm scheduling.
//!
//! The coordinator schedules named one-shot alarms ("fire `close_tab_7` in
//! five minutes") and must be able to cancel them by name before arming a
//! replacement. The trait keeps the daemon testable: the tokio
//! implementation drives real delays, the mock records calls.
//!
//! Cancellation is synchronous: after `cancel` returns, the alarm task has
//! been aborted. A name that already reached the fired channel is handled by
//! the coordinator's re-validation on expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

// ============================================================================
// AlarmScheduler
// ============================================================================

/// Named one-shot alarm scheduling with cancel-by-name.
pub trait AlarmScheduler: Send + Sync {
    /// Schedules `name` to fire once after `delay`, replacing any pending
    /// alarm with the same name.
    fn schedule(&self, name: &str, delay: Duration);

    /// Cancels the pending alarm named `name`, if any.
    fn cancel(&self, name: &str);
}

// ============================================================================
// TokioAlarmScheduler
// ============================================================================

struct TokioInner {
    fired_tx: mpsc::UnboundedSender<String>,
    pending: Mutex<HashMap<String, AbortHandle>>,
}

impl TokioInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, AbortHandle>> {
        self.pending.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("TokioAlarmScheduler: mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Tokio-backed scheduler.
///
/// Fired alarm names are delivered on the channel handed to [`Self::new`];
/// the daemon loop multiplexes that channel with the IPC listener.
#[derive(Clone)]
pub struct TokioAlarmScheduler {
    inner: Arc<TokioInner>,
}

impl TokioAlarmScheduler {
    /// Creates a scheduler delivering fired names to `fired_tx`.
    ///
    /// Must be used from within a tokio runtime.
    pub fn new(fired_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            inner: Arc::new(TokioInner {
                fired_tx,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl AlarmScheduler for TokioAlarmScheduler {
    fn schedule(&self, name: &str, delay: Duration) {
        // Replace any pending alarm under the same name.
        self.cancel(name);

        let inner = Arc::clone(&self.inner);
        let alarm_name = name.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.lock().remove(&alarm_name);
            // The receiver may be gone during shutdown.
            let _ = inner.fired_tx.send(alarm_name);
        });

        self.inner
            .lock()
            .insert(name.to_string(), handle.abort_handle());
    }

    fn cancel(&self, name: &str) {
        if let Some(handle) = self.inner.lock().remove(name) {
            handle.abort();
        }
    }
}

// ============================================================================
// MockAlarmScheduler
// ============================================================================

/// Recording scheduler for tests.
#[derive(Debug, Default)]
pub struct MockAlarmScheduler {
    scheduled: Mutex<Vec<(String, Duration)>>,
    cancelled: Mutex<Vec<String>>,
    pending: Mutex<HashMap<String, Duration>>,
}

impl MockAlarmScheduler {
    /// Creates an empty mock scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// All schedule calls in order.
    pub fn scheduled(&self) -> Vec<(String, Duration)> {
        self.scheduled.lock().unwrap().clone()
    }

    /// All cancel calls in order.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Whether an alarm named `name` is currently pending.
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.lock().unwrap().contains_key(name)
    }

    /// Number of currently pending alarms.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Marks `name` as fired (removes it from pending), as the real
    /// scheduler does before delivering the name.
    pub fn fire(&self, name: &str) {
        self.pending.lock().unwrap().remove(name);
    }
}

impl AlarmScheduler for MockAlarmScheduler {
    fn schedule(&self, name: &str, delay: Duration) {
        self.scheduled
            .lock()
            .unwrap()
            .push((name.to_string(), delay));
        self.pending.lock().unwrap().insert(name.to_string(), delay);
    }

    fn cancel(&self, name: &str) {
        self.cancelled.lock().unwrap().push(name.to_string());
        self.pending.lock().unwrap().remove(name);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // TokioAlarmScheduler Tests
    // ------------------------------------------------------------------------

    mod tokio_scheduler_tests {
        use super::*;

        #[tokio::test]
        async fn test_alarm_fires_with_name() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let scheduler = TokioAlarmScheduler::new(tx);

            scheduler.schedule("close_tab_1", Duration::from_millis(10));

            let fired = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("alarm did not fire")
                .unwrap();
            assert_eq!(fired, "close_tab_1");
        }

        #[tokio::test]
        async fn test_cancelled_alarm_never_fires() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let scheduler = TokioAlarmScheduler::new(tx);

            scheduler.schedule("close_tab_1", Duration::from_millis(20));
            scheduler.cancel("close_tab_1");

            tokio::time::sleep(Duration::from_millis(60)).await;
            assert!(rx.try_recv().is_err());
        }

        #[tokio::test]
        async fn test_reschedule_replaces_pending() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let scheduler = TokioAlarmScheduler::new(tx);

            scheduler.schedule("close_tab_1", Duration::from_millis(10));
            scheduler.schedule("close_tab_1", Duration::from_millis(30));

            tokio::time::sleep(Duration::from_millis(80)).await;

            // Only the replacement fired.
            assert_eq!(rx.try_recv().unwrap(), "close_tab_1");
            assert!(rx.try_recv().is_err());
        }

        #[tokio::test]
        async fn test_cancel_unknown_name_is_noop() {
            let (tx, _rx) = mpsc::unbounded_channel();
            let scheduler = TokioAlarmScheduler::new(tx);
            scheduler.cancel("never_scheduled");
        }

        #[tokio::test]
        async fn test_independent_alarms() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let scheduler = TokioAlarmScheduler::new(tx);

            scheduler.schedule("close_tab_1", Duration::from_millis(10));
            scheduler.schedule("close_tab_2", Duration::from_millis(20));
            scheduler.cancel("close_tab_1");

            tokio::time::sleep(Duration::from_millis(60)).await;
            assert_eq!(rx.try_recv().unwrap(), "close_tab_2");
            assert!(rx.try_recv().is_err());
        }
    }

    // ------------------------------------------------------------------------
    // MockAlarmScheduler Tests
    // ------------------------------------------------------------------------

    mod mock_scheduler_tests {
        use super::*;

        #[test]
        fn test_records_schedule_and_cancel() {
            let mock = MockAlarmScheduler::new();
            mock.schedule("a", Duration::from_secs(60));
            mock.cancel("a");

            assert_eq!(mock.scheduled(), vec![("a".to_string(), Duration::from_secs(60))]);
            assert_eq!(mock.cancelled(), vec!["a".to_string()]);
            assert!(!mock.is_pending("a"));
        }

        #[test]
        fn test_pending_tracking() {
            let mock = MockAlarmScheduler::new();
            mock.schedule("a", Duration::from_secs(1));
            mock.schedule("b", Duration::from_secs(2));
            assert_eq!(mock.pending_count(), 2);

            mock.fire("a");
            assert!(!mock.is_pending("a"));
            assert!(mock.is_pending("b"));
        }
    }
}
