use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;

use crate::feedback::FeedbackInterface;

/// Outcome of a non-blocking enqueue attempt (§4.6). A full queue is not
/// an error condition (§7's error taxonomy): the caller parks and is
/// woken by the registered [`FeedbackInterface`] once the consumer drains
/// past the low watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Accepted,
    RejectedFull,
    NoSuchKey,
}

/// A bounded, optionally feedback-coupled FIFO used as the concrete
/// storage for one priority level's worth of items belonging to a single
/// [`crate::routing_key::RoutingKey`]. `ProcessQueue` and the
/// single-slot form of `SenderQueue` are both thin wrappers over this.
pub struct BoundedQueue<T> {
    items: ArrayQueue<T>,
    capacity: usize,
    high_watermark: usize,
    low_watermark: usize,
    len: AtomicUsize,
    poppable: std::sync::atomic::AtomicBool,
    feedback: parking_lot::Mutex<Option<FeedbackInterface>>,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, high_watermark: usize, low_watermark: usize) -> Self {
        assert!(low_watermark <= high_watermark && high_watermark <= capacity);
        Self {
            items: ArrayQueue::new(capacity.max(1)),
            capacity,
            high_watermark,
            low_watermark,
            len: AtomicUsize::new(0),
            poppable: std::sync::atomic::AtomicBool::new(true),
            feedback: parking_lot::Mutex::new(None),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_above_high_watermark(&self) -> bool {
        self.len() >= self.high_watermark
    }

    /// Registers the callback invoked once, under this queue's lock,
    /// whenever a `pop` drains the queue at or below the low watermark.
    /// One-to-one per §4.6: a later registration replaces the prior one.
    pub fn register_feedback(&self, feedback: FeedbackInterface) {
        *self.feedback.lock() = Some(feedback);
    }

    pub fn try_push(&self, item: T) -> PushResult {
        if self.len() >= self.capacity {
            return PushResult::RejectedFull;
        }
        match self.items.push(item) {
            Ok(()) => {
                self.len.fetch_add(1, Ordering::AcqRel);
                PushResult::Accepted
            }
            Err(_) => PushResult::RejectedFull,
        }
    }

    /// Marks this queue non-poppable (`invalidate_pop`) or poppable again
    /// (`validate_pop`) without discarding queued items (§4.6).
    pub fn set_poppable(&self, poppable: bool) {
        self.poppable.store(poppable, Ordering::Release);
    }

    pub fn is_poppable(&self) -> bool {
        self.poppable.load(Ordering::Acquire)
    }

    pub fn try_pop(&self) -> Option<T> {
        if !self.is_poppable() {
            return None;
        }
        let item = self.items.pop()?;
        let new_len = self.len.fetch_sub(1, Ordering::AcqRel) - 1;
        if new_len <= self.low_watermark {
            // Invoked under this queue's own state, matching §9's rule that
            // feedback callbacks run under the downstream queue's lock: the
            // `parking_lot::Mutex` below is that lock.
            if let Some(feedback) = self.feedback.lock().as_ref() {
                feedback.notify();
            }
        }
        Some(item)
    }
}
