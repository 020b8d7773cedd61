//! Per-trial task context and the shared history lock.

use std::sync::Arc;

use hp_types::{RunId, SlotId, TrialIndex};
use parking_lot::Mutex;
use serde::Serialize;

/// Environment variable that pins a trial to one accelerator.
pub const DEVICE_ENV_VAR: &str = "CUDA_VISIBLE_DEVICES";

/// Mutual exclusion over the read-and-propose step against trial history.
///
/// One lock is created per parallel run and cloned into every trial of that
/// run. Only the propose step holds it; evaluation runs unlocked.
#[derive(Debug, Clone, Default)]
pub struct HistoryLock {
    inner: Arc<Mutex<()>>,
}

impl HistoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock.
    pub fn with<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.inner.lock();
        f()
    }

    /// Whether both handles guard the same history.
    pub fn same_as(&self, other: &HistoryLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

/// Everything a trial needs to know about where and what it runs.
///
/// The same struct is passed in sequential and parallel mode; `lock` is only
/// present when other trials may read history concurrently.
#[derive(Debug, Clone, Serialize)]
pub struct TaskContext {
    pub run: RunId,
    pub slot_id: SlotId,
    pub trial_index: TrialIndex,
    #[serde(skip)]
    pub lock: Option<HistoryLock>,
}

impl TaskContext {
    pub fn sequential(run: RunId, trial_index: TrialIndex) -> Self {
        Self {
            run,
            slot_id: 0,
            trial_index,
            lock: None,
        }
    }

    pub fn parallel(run: RunId, slot_id: SlotId, trial_index: TrialIndex, lock: HistoryLock) -> Self {
        Self {
            run,
            slot_id,
            trial_index,
            lock: Some(lock),
        }
    }

    /// Run the read-and-propose step, holding the history lock when there is one.
    ///
    /// The lock is released before this returns.
    pub fn propose<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.lock {
            Some(lock) => lock.with(f),
            None => f(),
        }
    }

    /// `(name, value)` of the environment variable binding this trial to its slot's device.
    pub fn device_env(&self) -> (&'static str, String) {
        (DEVICE_ENV_VAR, self.slot_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn sequential_context_has_no_lock() {
        let ctx = TaskContext::sequential(RunId::new("cnn", 0), 4);
        assert_eq!(ctx.slot_id, 0);
        assert!(ctx.lock.is_none());
        assert_eq!(ctx.propose(|| 5), 5);
    }

    #[test]
    fn propose_releases_before_returning() {
        let lock = HistoryLock::new();
        let ctx = TaskContext::parallel(RunId::new("cnn", 0), 1, 9, lock.clone());

        let held = ctx.propose(|| lock.is_locked());
        assert!(held);
        assert!(!lock.is_locked());
    }

    #[test]
    fn propose_is_mutually_exclusive() {
        let lock = HistoryLock::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|slot| {
                let ctx = TaskContext::parallel(RunId::new("cnn", 0), slot, slot, lock.clone());
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..5 {
                        ctx.propose(|| {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(1));
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn device_env_follows_slot() {
        let ctx = TaskContext::parallel(RunId::new("cnn", 0), 3, 12, HistoryLock::new());
        assert_eq!(ctx.device_env(), ("CUDA_VISIBLE_DEVICES", "3".to_string()));
    }
}
