use snafu::Snafu;

/// Commit state of one slot in an exactly-once [`ExactlyOnceSenderQueue`],
/// mirroring `RangeCheckpoint::commit_state` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Pending,
    Committed,
}

#[derive(Debug, Snafu)]
pub enum ExactlyOnceQueueError {
    #[snafu(display("slot {slot} is out of range for a queue with {concurrency} slots"))]
    SlotOutOfRange { slot: usize, concurrency: usize },
    #[snafu(display("slot {slot} already holds an un-acked item"))]
    SlotOccupied { slot: usize },
    #[snafu(display("slot {slot} is empty; nothing to ack"))]
    SlotEmpty { slot: usize },
}

/// A SenderQueue bound to exactly-once delivery: it holds exactly
/// `concurrency` slots, one per in-flight [`crate::routing_key`]-scoped
/// range checkpoint (§4.6's "Exactly-once queues"). Pushing requires an
/// explicit slot index (the caller already knows which range it read);
/// acking a slot commits the corresponding range and frees it for reuse.
pub struct ExactlyOnceSenderQueue<T> {
    slots: Vec<Option<T>>,
    state: Vec<CommitState>,
}

impl<T> ExactlyOnceSenderQueue<T> {
    pub fn new(concurrency: usize) -> Self {
        Self {
            slots: (0..concurrency).map(|_| None).collect(),
            state: vec![CommitState::Committed; concurrency],
        }
    }

    pub fn concurrency(&self) -> usize {
        self.slots.len()
    }

    fn check_slot(&self, slot: usize) -> Result<(), ExactlyOnceQueueError> {
        if slot >= self.slots.len() {
            return SlotOutOfRangeSnafu {
                slot,
                concurrency: self.slots.len(),
            }
            .fail();
        }
        Ok(())
    }

    /// Places `item` into `slot`, marking it `Pending`. Fails if the slot
    /// is out of range or already holds an un-acked item, which would
    /// indicate the controller issued two reads for the same slot without
    /// an intervening ack -- an invariant violation upstream, not
    /// something this queue silently tolerates.
    pub fn push(&mut self, slot: usize, item: T) -> Result<(), ExactlyOnceQueueError> {
        self.check_slot(slot)?;
        if self.slots[slot].is_some() {
            return SlotOccupiedSnafu { slot }.fail();
        }
        self.slots[slot] = Some(item);
        self.state[slot] = CommitState::Pending;
        Ok(())
    }

    /// Commits the range held in `slot` and frees it, returning the item
    /// so the caller can finish any bookkeeping (e.g. advancing the
    /// controller's last-committed offset) before dropping it.
    pub fn ack(&mut self, slot: usize) -> Result<T, ExactlyOnceQueueError> {
        self.check_slot(slot)?;
        let item = self.slots[slot].take().ok_or(()).map_err(|_| ExactlyOnceQueueError::SlotEmpty { slot })?;
        self.state[slot] = CommitState::Committed;
        Ok(item)
    }

    pub fn state_of(&self, slot: usize) -> Option<CommitState> {
        self.state.get(slot).copied()
    }

    pub fn is_slot_free(&self, slot: usize) -> bool {
        self.slots.get(slot).map(Option::is_none).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_ack_roundtrip_frees_slot() {
        let mut q: ExactlyOnceSenderQueue<&str> = ExactlyOnceSenderQueue::new(3);
        assert!(q.is_slot_free(1));

        q.push(1, "range-a").unwrap();
        assert!(!q.is_slot_free(1));
        assert_eq!(q.state_of(1), Some(CommitState::Pending));

        let acked = q.ack(1).unwrap();
        assert_eq!(acked, "range-a");
        assert!(q.is_slot_free(1));
        assert_eq!(q.state_of(1), Some(CommitState::Committed));
    }

    #[test]
    fn double_push_without_ack_is_rejected() {
        let mut q: ExactlyOnceSenderQueue<&str> = ExactlyOnceSenderQueue::new(1);
        q.push(0, "first").unwrap();
        let err = q.push(0, "second").unwrap_err();
        assert!(matches!(err, ExactlyOnceQueueError::SlotOccupied { slot: 0 }));
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut q: ExactlyOnceSenderQueue<&str> = ExactlyOnceSenderQueue::new(2);
        assert!(matches!(
            q.push(5, "x"),
            Err(ExactlyOnceQueueError::SlotOutOfRange { slot: 5, concurrency: 2 })
        ));
    }
}
