//! Per-document advisory locks
//!
//! Mutual exclusion is per document path and local to this process. A second
//! acquire on the same path blocks up to a timeout, then fails. Holders get
//! a TTL so a crashed transaction cannot wedge its document forever.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Lock acquisition failures.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("could not acquire lock on {path} within {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },
}

#[derive(Debug, Clone)]
struct Holder {
    token: Uuid,
    expires_at: Instant,
}

#[derive(Default)]
struct LockState {
    held: Mutex<HashMap<PathBuf, Holder>>,
    released: Condvar,
}

/// Advisory lock table shared by all transactions of one engine.
#[derive(Clone)]
pub struct LockManager {
    state: Arc<LockState>,
    ttl: Duration,
}

impl LockManager {
    /// Create a manager whose holders expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Arc::new(LockState::default()),
            ttl,
        }
    }

    /// Acquire the lock for `path`, blocking up to `timeout`.
    ///
    /// The returned guard releases on drop, so every exit path of a
    /// transaction releases exactly once.
    pub fn acquire(&self, path: &Path, timeout: Duration) -> Result<LockGuard, LockError> {
        let deadline = Instant::now() + timeout;
        let token = Uuid::new_v4();
        let mut held = self.state.held.lock().expect("lock table poisoned");

        loop {
            let now = Instant::now();
            let free = match held.get(path) {
                None => true,
                Some(holder) => holder.expires_at <= now,
            };

            if free {
                held.insert(
                    path.to_path_buf(),
                    Holder {
                        token,
                        expires_at: now + self.ttl,
                    },
                );
                return Ok(LockGuard {
                    state: Arc::clone(&self.state),
                    path: path.to_path_buf(),
                    token,
                });
            }

            let remaining = deadline.saturating_duration_since(now);
            if remaining.is_zero() {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    timeout,
                });
            }

            let (guard, wait) = self
                .state
                .released
                .wait_timeout(held, remaining)
                .expect("lock table poisoned");
            held = guard;
            if wait.timed_out() {
                // Re-check once in case the holder's TTL lapsed during the wait
                let now = Instant::now();
                let expired = held
                    .get(path)
                    .map(|holder| holder.expires_at <= now)
                    .unwrap_or(true);
                if !expired {
                    return Err(LockError::Timeout {
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
            }
        }
    }

    /// Whether a live (non-expired) holder exists for `path`.
    pub fn is_locked(&self, path: &Path) -> bool {
        let held = self.state.held.lock().expect("lock table poisoned");
        held.get(path)
            .map(|holder| holder.expires_at > Instant::now())
            .unwrap_or(false)
    }
}

/// Scoped lock ownership. Dropping releases the lock and wakes waiters.
pub struct LockGuard {
    state: Arc<LockState>,
    path: PathBuf,
    token: Uuid,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut held = self.state.held.lock().expect("lock table poisoned");
        // Only remove our own entry; an expired lock may have been taken over
        if held.get(&self.path).map(|h| h.token) == Some(self.token) {
            held.remove(&self.path);
        }
        drop(held);
        self.state.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_acquire_and_release() {
        let manager = LockManager::new(Duration::from_secs(60));
        let path = Path::new("/site/page.html");

        let guard = manager.acquire(path, Duration::from_millis(100)).unwrap();
        assert!(manager.is_locked(path));
        drop(guard);
        assert!(!manager.is_locked(path));
    }

    #[test]
    fn test_second_acquire_times_out() {
        let manager = LockManager::new(Duration::from_secs(60));
        let path = Path::new("/site/page.html");

        let _guard = manager.acquire(path, Duration::from_millis(100)).unwrap();
        let result = manager.acquire(path, Duration::from_millis(50));
        assert!(matches!(result, Err(LockError::Timeout { .. })));
    }

    #[test]
    fn test_different_paths_do_not_contend() {
        let manager = LockManager::new(Duration::from_secs(60));
        let _a = manager
            .acquire(Path::new("/a.html"), Duration::from_millis(50))
            .unwrap();
        let _b = manager
            .acquire(Path::new("/b.html"), Duration::from_millis(50))
            .unwrap();
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let manager = LockManager::new(Duration::from_secs(60));
        let path = PathBuf::from("/site/page.html");

        let guard = manager.acquire(&path, Duration::from_millis(100)).unwrap();

        let manager2 = manager.clone();
        let path2 = path.clone();
        let handle = thread::spawn(move || {
            manager2
                .acquire(&path2, Duration::from_secs(5))
                .map(|g| drop(g))
                .is_ok()
        });

        thread::sleep(Duration::from_millis(50));
        drop(guard);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_expired_holder_is_evicted() {
        let manager = LockManager::new(Duration::from_millis(20));
        let path = Path::new("/site/page.html");

        let _stale = manager.acquire(path, Duration::from_millis(50)).unwrap();
        thread::sleep(Duration::from_millis(40));

        // The TTL has lapsed, so a new acquire succeeds even though the
        // stale guard was never dropped
        let fresh = manager.acquire(path, Duration::from_millis(50)).unwrap();
        assert!(manager.is_locked(path));
        drop(fresh);
    }

    #[test]
    fn test_stale_guard_drop_does_not_release_new_holder() {
        let manager = LockManager::new(Duration::from_millis(20));
        let path = Path::new("/site/page.html");

        let stale = manager.acquire(path, Duration::from_millis(50)).unwrap();
        thread::sleep(Duration::from_millis(40));
        let _fresh = manager.acquire(path, Duration::from_millis(50)).unwrap();

        drop(stale);
        assert!(manager.is_locked(path));
    }
}
