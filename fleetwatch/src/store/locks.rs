use std::collections::BTreeSet;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{FleetError, FleetResult};

/// In-process exclusive locks on daemon rows.
///
/// SQLite only locks whole databases, so per-daemon exclusion is provided
/// here. A set of ids is granted atomically once none of them is held,
/// which rules out lock-order deadlocks between callers. Locks are not
/// reentrant: a thread asking again for an id it holds waits until timeout.
#[derive(Debug, Default)]
pub struct RowLocks {
    held: Mutex<BTreeSet<i64>>,
    released: Condvar,
}

impl RowLocks {
    /// Lock all `ids`, waiting at most `wait`.
    pub fn acquire(self: &Arc<Self>, ids: &[i64], wait: Duration) -> FleetResult<RowLockGuard> {
        let ids: Vec<i64> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let deadline = Instant::now() + wait;
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            let blocked = ids.iter().find(|id| held.contains(*id)).copied();
            let Some(blocked) = blocked else {
                held.extend(ids.iter().copied());
                debug!(?ids, "acquired daemon locks");
                return Ok(RowLockGuard {
                    locks: Arc::clone(self),
                    ids,
                });
            };

            let now = Instant::now();
            if now >= deadline {
                warn!(daemon_id = blocked, "timed out waiting for daemon lock");
                return Err(FleetError::LockConflict { daemon_id: blocked });
            }
            let (next, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            held = next;
        }
    }

    fn release(&self, ids: &[i64]) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            held.remove(id);
        }
        drop(held);
        self.released.notify_all();
    }
}

/// Locks held on a set of daemons, released on drop.
#[derive(Debug)]
pub struct RowLockGuard {
    locks: Arc<RowLocks>,
    ids: Vec<i64>,
}

impl RowLockGuard {
    /// Locked ids in ascending order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }
}

impl Drop for RowLockGuard {
    fn drop(&mut self) {
        self.locks.release(&self.ids);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::RowLocks;
    use crate::error::FleetError;

    #[test]
    fn ids_are_sorted_and_deduplicated() {
        let locks = Arc::new(RowLocks::default());
        let guard = locks
            .acquire(&[5, 1, 5, 3], Duration::from_millis(10))
            .expect("lock");
        assert_eq!(guard.ids(), &[1, 3, 5]);
    }

    #[test]
    fn overlapping_set_times_out_with_conflict() {
        let locks = Arc::new(RowLocks::default());
        let _held = locks.acquire(&[1, 2], Duration::from_millis(10)).expect("first");

        let err = locks
            .acquire(&[2, 3], Duration::from_millis(20))
            .expect_err("second");
        assert!(matches!(err, FleetError::LockConflict { daemon_id: 2 }));

        let disjoint = locks.acquire(&[3], Duration::from_millis(10));
        assert!(disjoint.is_ok());
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let locks = Arc::new(RowLocks::default());
        let guard = locks.acquire(&[7], Duration::from_millis(10)).expect("first");
        let released = Arc::new(AtomicBool::new(false));

        thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                let second = locks.acquire(&[7], Duration::from_secs(5)).expect("second");
                assert!(released.load(Ordering::SeqCst));
                second.ids().to_vec()
            });
            thread::sleep(Duration::from_millis(50));
            released.store(true, Ordering::SeqCst);
            drop(guard);
            assert_eq!(waiter.join().expect("join"), vec![7]);
        });
    }
}
