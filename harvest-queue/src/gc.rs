use std::sync::Arc;

use tracing::debug;

use crate::manager::QueueManager;

/// Drives [`QueueManager::gc_tick`] on the manager's configured interval
/// until `shutdown` resolves. Spawned as its own long-running task, per
/// §5's "the queue manager and GC thread are dedicated long-running
/// tasks".
pub async fn run_gc_loop<P, S>(
    manager: Arc<QueueManager<P, S>>,
    tick: std::time::Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) where
    P: Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = manager.gc_tick();
                if removed > 0 {
                    debug!(removed, "queue manager GC round reclaimed routing keys");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::QueueManagerConfig;
    use crate::routing_key::next_test_key;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn gc_loop_reclaims_idle_keys_and_stops_on_shutdown() {
        let manager = Arc::new(QueueManager::<u32, u32>::new(QueueManagerConfig {
            gc_grace: Duration::from_millis(1),
            ..QueueManagerConfig::default()
        }));
        let key = next_test_key();
        manager.acquire(key, "cfg", 0);
        manager.release(key);

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(run_gc_loop(manager.clone(), Duration::from_millis(5), rx));

        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;

        assert!(!manager.contains(key));

        tx.send(true).unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;
        handle.await.unwrap();
    }
}
