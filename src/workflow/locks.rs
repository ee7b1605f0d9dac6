//! Per-space serialization.
//!
//! Reviews and owner edits on the same space run one at a time; operations on
//! different spaces never wait on each other. An entry lives only while some
//! caller holds or waits on it, so the map stays as small as the set of spaces
//! currently in flight.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<i64, Arc<Mutex<()>>>;

#[derive(Clone, Default)]
pub struct SpaceLocks {
    locks: Arc<LockMap>,
}

/// Exclusive access to one space. Dropping it releases the lock and evicts
/// the map entry when nobody else is waiting.
pub struct SpaceGuard {
    space_id: i64,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SpaceGuard {
    fn drop(&mut self) {
        self.guard.take();
        // The map's own Arc is the last one: no holder, no waiter.
        self.locks
            .remove_if(&self.space_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl SpaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `space_id`. Held until the guard drops.
    pub async fn acquire(&self, space_id: i64) -> SpaceGuard {
        // Clone the Arc out so the map shard is not held across the await.
        let lock = self.locks.entry(space_id).or_default().clone();
        let guard = lock.lock_owned().await;
        SpaceGuard {
            space_id,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Spaces with a live holder or waiter.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_space_is_exclusive() {
        let locks = SpaceLocks::new();
        let guard = locks.acquire(1).await;

        let contender = locks.clone();
        let waiting = tokio::spawn(async move {
            let _g = contender.acquire(1).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("second acquire should complete once the first guard drops")
            .unwrap();
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_different_spaces_do_not_block() {
        let locks = SpaceLocks::new();
        let _first = locks.acquire(1).await;
        let second = tokio::time::timeout(Duration::from_millis(200), locks.acquire(2)).await;
        assert!(second.is_ok());
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_released_locks_are_evicted() {
        let locks = SpaceLocks::new();
        for id in 0..500 {
            let _guard = locks.acquire(id).await;
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_entry_survives_while_a_waiter_remains() {
        let locks = SpaceLocks::new();
        let first = locks.acquire(9).await;

        let contender = locks.clone();
        let (held_tx, held_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let waiter = tokio::spawn(async move {
            let _g = contender.acquire(9).await;
            held_tx.send(()).unwrap();
            release_rx.await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(first);
        held_rx.await.unwrap();
        // The waiter now holds the same entry, so it was not evicted.
        assert_eq!(locks.tracked(), 1);

        release_tx.send(()).unwrap();
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
