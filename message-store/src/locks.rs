//! Sharded per-key write locks.
//!
//! Every write touching a message holds the shard for its uuid, so writes to the
//! same uuid are applied one at a time while unrelated uuids mostly proceed in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};

pub struct KeyedLocks {
    shards: Vec<Mutex<()>>,
}

/// Guards held for the duration of one write; released on drop.
pub struct KeyedGuard<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}

impl KeyedLocks {
    /// `shards` is clamped to at least 1.
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Mutex::new(())).collect();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_of(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let guard = self.shards[self.shard_of(key)].lock().await;
        KeyedGuard {
            _guards: vec![guard],
        }
    }

    /// Locks the shards of every key. Shards are taken once each, in ascending
    /// order, so two overlapping batches cannot deadlock.
    pub async fn lock_many<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> KeyedGuard<'_> {
        let mut indices: Vec<usize> = keys.into_iter().map(|k| self.shard_of(k)).collect();
        indices.sort_unstable();
        indices.dedup();
        self.lock_indices(indices).await
    }

    /// Locks every shard; used by bulk deletes.
    pub async fn lock_all(&self) -> KeyedGuard<'_> {
        self.lock_indices(0..self.shards.len()).await
    }

    async fn lock_indices(&self, indices: impl IntoIterator<Item = usize>) -> KeyedGuard<'_> {
        let mut guards = Vec::new();
        for index in indices {
            guards.push(self.shards[index].lock().await);
        }
        KeyedGuard { _guards: guards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_shard_of_is_stable_and_in_range() {
        let locks = KeyedLocks::new(8);
        let shard = locks.shard_of("a1");
        assert_eq!(shard, locks.shard_of("a1"));
        assert!(shard < 8);
        assert_eq!(KeyedLocks::new(0).shard_count(), 1);
    }

    #[tokio::test]
    async fn test_same_key_waits_for_holder() {
        let locks = Arc::new(KeyedLocks::new(4));
        let guard = locks.lock("b1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("b1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender acquires after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_lock_many_dedups_shared_shards() {
        let locks = KeyedLocks::new(1);
        // all keys map to the single shard; locking it twice would hang
        let guard = tokio::time::timeout(
            Duration::from_secs(1),
            locks.lock_many(["x", "y", "x"]),
        )
        .await
        .expect("lock_many does not self-deadlock");
        drop(guard);
        let _all = locks.lock_all().await;
    }
}
