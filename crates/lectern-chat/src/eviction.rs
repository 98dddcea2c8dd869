//! Background eviction of idle conversations.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::{ConversationLocks, ConversationStore};

/// Periodically drop conversations idle for longer than `ttl`.
///
/// The first sweep runs one `interval` after spawning. Abort the handle to
/// stop the task.
pub fn spawn_eviction_task(
    store: Arc<dyn ConversationStore>,
    locks: Arc<ConversationLocks>,
    ttl: chrono::Duration,
    interval: Duration,
) -> JoinHandle<()> {
    info!(
        ttl_secs = ttl.num_seconds(),
        interval_secs = interval.as_secs(),
        "Starting conversation eviction task"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep(store.as_ref(), &locks, ttl).await;
        }
    })
}

/// One eviction pass; returns the number of conversations removed.
pub async fn sweep(store: &dyn ConversationStore, locks: &ConversationLocks, ttl: chrono::Duration) -> usize {
    match store.evict_stale(ttl).await {
        Ok(evicted) => {
            for id in &evicted {
                locks.forget(*id);
            }
            let pruned = locks.prune();
            debug!(evicted = evicted.len(), pruned_locks = pruned, "Eviction sweep finished");
            evicted.len()
        }
        Err(e) => {
            warn!(error = %e, "Eviction sweep failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryConversationStore;

    #[tokio::test]
    async fn test_sweep_evicts_and_forgets_locks() {
        let store = Arc::new(InMemoryConversationStore::new());
        let locks = ConversationLocks::new();
        let old = store.get_or_create(None).await.unwrap().id;
        let fresh = store.get_or_create(None).await.unwrap().id;
        drop(locks.acquire(old).await);
        store.backdate(old, 3 * 3600);

        let evicted = sweep(store.as_ref(), &locks, chrono::Duration::hours(2)).await;
        assert_eq!(evicted, 1);
        assert!(store.find(old).await.unwrap().is_none());
        assert!(store.find(fresh).await.unwrap().is_some());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_task_sweeps_on_interval() {
        let store = Arc::new(InMemoryConversationStore::new());
        let locks = Arc::new(ConversationLocks::new());
        let id = store.get_or_create(None).await.unwrap().id;
        store.backdate(id, 3600);

        let handle = spawn_eviction_task(
            store.clone(),
            locks,
            chrono::Duration::minutes(30),
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.len().await.unwrap(), 0);
        handle.abort();
    }
}
