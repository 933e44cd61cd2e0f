use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::feedback::FeedbackInterface;
use crate::priority::PriorityScheduler;
use crate::routing_key::RoutingKey;
use crate::sender_queue::{BoundedQueue, PushResult};

/// Tunables for a [`QueueManager`], mirroring the defaults named in §4.6
/// and §5 of the spec.
#[derive(Debug, Clone)]
pub struct QueueManagerConfig {
    pub capacity: usize,
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub max_priority: usize,
    pub gc_tick: Duration,
    pub gc_budget: Duration,
    pub gc_grace: Duration,
}

impl Default for QueueManagerConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            high_watermark: 1024,
            low_watermark: 256,
            max_priority: 3,
            gc_tick: Duration::from_secs(30),
            gc_budget: Duration::from_millis(500),
            gc_grace: Duration::from_secs(60),
        }
    }
}

/// The two bounded queues owned by one [`RoutingKey`] (§4.6's topology):
/// a ProcessQueue fed by readers and drained by processors, and a
/// SenderQueue fed by processors and drained by sinks.
pub struct QueuePair<P, S> {
    pub process: Arc<BoundedQueue<P>>,
    pub sender: Arc<BoundedQueue<S>>,
    config_name: Mutex<String>,
}

struct Entry<P, S> {
    pair: Arc<QueuePair<P, S>>,
    refcount: AtomicUsize,
    marked_for_gc_since: Mutex<Option<Instant>>,
}

/// Owns every ProcessQueue/SenderQueue pair in the engine, keyed by
/// [`RoutingKey`], plus the priority scheduler and the garbage collector
/// that reclaims keys with no remaining producers or consumers (§4.6).
///
/// Generic over the process-queue item type `P` and sender-queue item
/// type `S` so this crate never needs to know about `Record` or
/// `EventGroup`.
pub struct QueueManager<P, S> {
    config: QueueManagerConfig,
    entries: DashMap<RoutingKey, Entry<P, S>>,
    scheduler: Mutex<PriorityScheduler>,
    producer_keys: DashMap<String, HashSet<RoutingKey>>,
}

impl<P, S> QueueManager<P, S> {
    pub fn new(config: QueueManagerConfig) -> Self {
        let scheduler = Mutex::new(PriorityScheduler::new(config.max_priority));
        Self {
            config,
            entries: DashMap::new(),
            scheduler,
            producer_keys: DashMap::new(),
        }
    }

    /// Looks up or lazily creates the queue pair for `key`, bumping its
    /// refcount and cancelling any pending GC (§3 invariant 5 / §4.6
    /// "Re-creating a key after marking for GC cancels the deletion").
    pub fn acquire(&self, key: RoutingKey, config_name: &str, priority: usize) -> Arc<QueuePair<P, S>> {
        let entry = self.entries.entry(key).or_insert_with(|| {
            let pair = Arc::new(QueuePair {
                process: Arc::new(BoundedQueue::new(
                    self.config.capacity,
                    self.config.high_watermark,
                    self.config.low_watermark,
                )),
                sender: Arc::new(BoundedQueue::new(
                    self.config.capacity,
                    self.config.high_watermark,
                    self.config.low_watermark,
                )),
                config_name: Mutex::new(config_name.to_string()),
            });
            self.scheduler.lock().insert(key, priority);
            Entry {
                pair,
                refcount: AtomicUsize::new(0),
                marked_for_gc_since: Mutex::new(None),
            }
        });
        entry.refcount.fetch_add(1, Ordering::AcqRel);
        *entry.marked_for_gc_since.lock() = None;
        *entry.pair.config_name.lock() = config_name.to_string();

        self.producer_keys
            .entry(config_name.to_string())
            .or_default()
            .insert(key);

        Arc::clone(&entry.pair)
    }

    /// Releases one reference on `key`. Once the refcount reaches zero the
    /// key becomes a GC candidate (but is not deleted until
    /// [`Self::gc_tick`] observes both queues empty and the grace window
    /// has elapsed).
    pub fn release(&self, key: RoutingKey) {
        if let Some(entry) = self.entries.get(&key) {
            let prev = entry.refcount.fetch_sub(1, Ordering::AcqRel);
            if prev <= 1 {
                *entry.marked_for_gc_since.lock() = Some(Instant::now());
            }
        }
    }

    pub fn get(&self, key: RoutingKey) -> Option<Arc<QueuePair<P, S>>> {
        self.entries.get(&key).map(|e| Arc::clone(&e.pair))
    }

    pub fn try_push_process(&self, key: RoutingKey, item: P) -> PushResult {
        match self.get(key) {
            Some(pair) => pair.process.try_push(item),
            None => PushResult::NoSuchKey,
        }
    }

    pub fn try_push_sender(&self, key: RoutingKey, item: S) -> PushResult {
        match self.get(key) {
            Some(pair) => pair.sender.try_push(item),
            None => PushResult::NoSuchKey,
        }
    }

    /// Registers the SenderQueue -> ProcessQueue feedback wiring for
    /// `key` (§4.6). The ProcessQueue -> reader-scheduler leg is the
    /// engine's concern, not this crate's, so it is not modeled here.
    pub fn register_sender_feedback(&self, key: RoutingKey, feedback: FeedbackInterface) {
        if let Some(pair) = self.get(key) {
            pair.sender.register_feedback(feedback);
        }
    }

    pub fn register_process_feedback(&self, key: RoutingKey, feedback: FeedbackInterface) {
        if let Some(pair) = self.get(key) {
            pair.process.register_feedback(feedback);
        }
    }

    /// Moves `key`'s scheduling position to `priority` in O(1) (§4.6).
    pub fn set_priority(&self, key: RoutingKey, priority: usize) {
        self.scheduler.lock().set_priority(key, priority);
    }

    pub fn next_scheduled(&self) -> Option<RoutingKey> {
        self.scheduler.lock().next()
    }

    /// Marks every queue owned by `config_name` as non-poppable, per
    /// §4.6's producer-stop contract. Queued items are retained.
    pub fn invalidate_pop(&self, config_name: &str) {
        if let Some(keys) = self.producer_keys.get(config_name) {
            for key in keys.iter() {
                if let Some(pair) = self.get(*key) {
                    pair.process.set_poppable(false);
                    pair.sender.set_poppable(false);
                }
            }
        }
    }

    pub fn validate_pop(&self, config_name: &str) {
        if let Some(keys) = self.producer_keys.get(config_name) {
            for key in keys.iter() {
                if let Some(pair) = self.get(*key) {
                    pair.process.set_poppable(true);
                    pair.sender.set_poppable(true);
                }
            }
        }
    }

    /// Runs one time-budgeted GC round (§4.6): for every key marked for
    /// GC whose grace window has elapsed, verifies both queues are still
    /// empty and, if so, deletes it. Returns the number of keys removed.
    pub fn gc_tick(&self) -> usize {
        let deadline = Instant::now() + self.config.gc_budget;
        let mut removed = 0usize;
        let candidates: Vec<RoutingKey> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let marked_since = *entry.marked_for_gc_since.lock();
                marked_since
                    .filter(|since| since.elapsed() >= self.config.gc_grace)
                    .map(|_| *entry.key())
            })
            .collect();

        for key in candidates {
            if Instant::now() >= deadline {
                break;
            }
            let should_remove = self
                .entries
                .get(&key)
                .map(|entry| {
                    entry.refcount.load(Ordering::Acquire) == 0
                        && entry.pair.process.is_empty()
                        && entry.pair.sender.is_empty()
                        && entry.marked_for_gc_since.lock().is_some()
                })
                .unwrap_or(false);

            if should_remove {
                self.entries.remove(&key);
                self.scheduler.lock().remove(key);
                removed += 1;
            }
        }
        removed
    }

    pub fn contains(&self, key: RoutingKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing_key::next_test_key;
    use std::thread::sleep;

    fn manager() -> QueueManager<u32, u32> {
        QueueManager::new(QueueManagerConfig {
            capacity: 4,
            high_watermark: 4,
            low_watermark: 1,
            max_priority: 1,
            gc_tick: Duration::from_millis(10),
            gc_budget: Duration::from_millis(50),
            gc_grace: Duration::from_millis(10),
        })
    }

    #[test]
    fn acquire_then_release_is_gc_eligible_after_grace() {
        let mgr = manager();
        let key = next_test_key();
        mgr.acquire(key, "cfg-a", 0);
        mgr.release(key);

        // Not yet past the grace window.
        assert_eq!(mgr.gc_tick(), 0);
        assert!(mgr.contains(key));

        sleep(Duration::from_millis(20));
        assert_eq!(mgr.gc_tick(), 1);
        assert!(!mgr.contains(key));
    }

    #[test]
    fn non_empty_queue_is_never_gced() {
        let mgr = manager();
        let key = next_test_key();
        mgr.acquire(key, "cfg-a", 0);
        mgr.try_push_sender(key, 42);
        mgr.release(key);

        sleep(Duration::from_millis(20));
        assert_eq!(mgr.gc_tick(), 0);
        assert!(mgr.contains(key));
    }

    #[test]
    fn reacquiring_cancels_pending_gc() {
        let mgr = manager();
        let key = next_test_key();
        mgr.acquire(key, "cfg-a", 0);
        mgr.release(key);
        mgr.acquire(key, "cfg-a", 0);

        sleep(Duration::from_millis(20));
        assert_eq!(mgr.gc_tick(), 0);
        assert!(mgr.contains(key));
    }

    #[test]
    fn invalidate_pop_retains_items_but_blocks_pop() {
        let mgr = manager();
        let key = next_test_key();
        mgr.acquire(key, "cfg-a", 0);
        mgr.try_push_process(key, 1);

        mgr.invalidate_pop("cfg-a");
        assert_eq!(mgr.get(key).unwrap().process.try_pop(), None);
        assert_eq!(mgr.get(key).unwrap().process.len(), 1);

        mgr.validate_pop("cfg-a");
        assert_eq!(mgr.get(key).unwrap().process.try_pop(), Some(1));
    }

    #[test]
    fn push_to_unknown_key_reports_no_such_key() {
        let mgr: QueueManager<u32, u32> = manager();
        let key = next_test_key();
        assert_eq!(mgr.try_push_process(key, 1), PushResult::NoSuchKey);
    }
}
