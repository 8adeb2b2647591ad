//! Per-path exclusive sections
//!
//! A record may only be rewritten while the lock for its own path is held.
//! Creating or deleting a child rewrites the parent, so sibling operations
//! serialize on the parent's lock; QoS status writes serialize on the
//! object's own lock. Where two locks are held at once the shallower path is
//! taken first.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of async mutexes keyed by normalised path.
///
/// An entry lives only while some task holds or waits on it.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Exclusive access to one path; releasing it drops an idle table entry
#[derive(Debug)]
pub struct PathGuard<'a> {
    table: &'a PathLocks,
    path: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`
    pub async fn lock(&self, path: &str) -> PathGuard<'_> {
        let mutex = self
            .locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        PathGuard {
            table: self,
            path: path.to_string(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left: nobody holds or waits
        self.table
            .locks
            .remove_if(&self.path, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_path_is_exclusive() {
        let locks = Arc::new(PathLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("/a").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_paths_do_not_block() {
        let locks = PathLocks::new();
        let _a = locks.lock("/a").await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.lock("/b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_entries_are_dropped() {
        let locks = PathLocks::new();
        let held = locks.lock("/held").await;
        drop(locks.lock("/released").await);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_survives_while_contended() {
        let locks = Arc::new(PathLocks::new());
        let first = locks.lock("/a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("/a").await;
            })
        };
        // Table, the held guard and the queued waiter
        while locks.locks.get("/a").map(|m| Arc::strong_count(&*m)) != Some(3) {
            tokio::task::yield_now().await;
        }

        drop(first);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
