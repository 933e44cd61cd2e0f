//! §4.7 exactly-once controller: binds a Reader in exactly-once mode to
//! a fixed-size vector of [`RangeCheckpoint`](crate::checkpoint::exactly_once::RangeCheckpoint)s,
//! replaying uncommitted ranges on restart before resuming normal
//! reading. This sits directly above [`harvest_queue::ExactlyOnceSenderQueue`]
//! (which owns the in-flight slot machinery) and
//! [`crate::checkpoint::exactly_once::ExactlyOnceCheckpointStore`]
//! (which owns on-disk persistence); this module is the
//! read-size-selection and replay-validity logic the spec places
//! between them.

use std::collections::{BTreeMap, VecDeque};

use harvest_queue::RoutingKey;

use crate::checkpoint::exactly_once::{CommitStateDto, RangeCheckpoint};
use crate::identity::FileIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSizeDecision {
    /// Replay the exact range recorded by an uncommitted checkpoint.
    Replay { start_offset: u64, read_length: u64 },
    /// No replay pending: use the reader's normal bounded read size.
    Normal,
}

/// A range in flight awaiting an ack. Its presence in a slot already
/// means `pending`; a slot is cleared on [`EoOption::ack`] once its
/// range has been folded into the committed frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlightRange {
    read_offset: u64,
    read_length: u64,
}

/// One Reader's exactly-once binding (§4.7's `EOOption`).
pub struct EoOption {
    pub primary_key: String,
    pub routing_key: RoutingKey,
    concurrency: usize,
    in_flight: Vec<Option<InFlightRange>>,
    /// Uncommitted checkpoints sorted by read offset, replayed in
    /// order before falling back to normal reads.
    replay_queue: VecDeque<RangeCheckpoint>,
    /// Committed ranges known but not yet merged into the contiguous
    /// frontier, keyed by `read_offset` (a range can be committed ahead
    /// of an earlier still-pending range, e.g. §8's S6).
    committed_ranges: BTreeMap<u64, u64>,
    last_committed_offset: u64,
}

impl EoOption {
    pub fn new(primary_key: String, routing_key: RoutingKey, concurrency: usize) -> Self {
        Self {
            primary_key,
            routing_key,
            concurrency,
            in_flight: vec![None; concurrency],
            replay_queue: VecDeque::new(),
            committed_ranges: BTreeMap::new(),
            last_committed_offset: 0,
        }
    }

    /// Loads persisted ranges on startup: committed ranges are recorded
    /// for contiguous-frontier merging; pending ranges populate the
    /// replay queue, sorted by `read_offset` (§4.7's "Binding").
    pub fn load_ranges(&mut self, ranges: Vec<RangeCheckpoint>) {
        let mut pending: Vec<RangeCheckpoint> = Vec::new();
        for range in ranges {
            match range.state {
                CommitStateDto::Committed => {
                    self.committed_ranges.insert(range.read_offset, range.read_length);
                }
                CommitStateDto::Pending => pending.push(range),
            }
        }
        pending.sort_by_key(|r| r.read_offset);
        self.replay_queue = pending.into_iter().collect();
        self.advance_committed_offset();
    }

    pub fn last_committed_offset(&self) -> u64 {
        self.last_committed_offset
    }

    /// §4.7's "Read-size selection": the next replay checkpoint, if any,
    /// otherwise fall through to the caller's normal bounded read.
    pub fn next_read_decision(&self) -> ReadSizeDecision {
        match self.replay_queue.front() {
            Some(range) => ReadSizeDecision::Replay {
                start_offset: range.read_offset,
                read_length: range.read_length,
            },
            None => ReadSizeDecision::Normal,
        }
    }

    /// §4.7's "Replay validity check": before applying the head of the
    /// replay queue, verify the requested offset matches the Reader's
    /// current offset and the requested length is available. On
    /// mismatch, the entire replay set is dropped.
    pub fn validate_replay(&mut self, reader_offset: u64, available_bytes: u64) -> bool {
        let Some(range) = self.replay_queue.front() else {
            return true;
        };
        if range.read_offset != reader_offset || range.read_length > available_bytes {
            self.replay_queue.clear();
            return false;
        }
        true
    }

    /// Consumes the head replay checkpoint after it has been
    /// successfully re-delivered, binding it to `slot` for the
    /// eventual ack.
    pub fn pop_replay_into_slot(&mut self, slot: usize) -> Option<RangeCheckpoint> {
        let range = self.replay_queue.pop_front()?;
        self.in_flight[slot] = Some(InFlightRange {
            read_offset: range.read_offset,
            read_length: range.read_length,
        });
        Some(range)
    }

    /// §4.7's "Post-read bookkeeping": records a freshly read (not
    /// replayed) range into `slot` as `pending`.
    pub fn record_fresh_read(&mut self, slot: usize, read_offset: u64, read_length: u64) {
        self.in_flight[slot] = Some(InFlightRange { read_offset, read_length });
    }

    /// An ack from the sink: moves `slot`'s range into the committed set
    /// and re-merges the contiguous frontier from `last_committed_offset`.
    pub fn ack(&mut self, slot: usize) {
        if let Some(range) = self.in_flight[slot].take() {
            self.committed_ranges.insert(range.read_offset, range.read_length);
        }
        self.advance_committed_offset();
    }

    /// Merges `committed_ranges` into `last_committed_offset` as far as
    /// a contiguous chain from the current frontier reaches (§8's S6:
    /// a range committed ahead of an earlier pending one only advances
    /// the frontier once the gap before it closes).
    fn advance_committed_offset(&mut self) {
        while let Some(&len) = self.committed_ranges.get(&self.last_committed_offset) {
            self.committed_ranges.remove(&self.last_committed_offset);
            self.last_committed_offset += len;
        }
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.in_flight.iter().position(|r| r.is_none())
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

/// §4.7's "Primary-key validation": on load, confirm the primary
/// checkpoint's recorded signature matches the live file signature. If
/// it doesn't, the caller discards exactly-once state for this
/// identity and falls back to normal resumption.
pub fn validate_primary_key(
    recorded: crate::identity::FileSignature,
    live: crate::identity::FileSignature,
    _identity: &FileIdentity,
) -> bool {
    recorded == live
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_queue::derive_routing_key;

    fn range(offset: u64, len: u64, state: CommitStateDto) -> RangeCheckpoint {
        RangeCheckpoint {
            read_offset: offset,
            read_length: len,
            state,
        }
    }

    fn eo_option() -> EoOption {
        EoOption::new("pk".into(), derive_routing_key("proj", "store"), 2)
    }

    #[test]
    fn load_ranges_advances_committed_offset_and_queues_pending() {
        let mut eo = eo_option();
        eo.load_ranges(vec![
            range(0, 100, CommitStateDto::Committed),
            range(100, 50, CommitStateDto::Pending),
        ]);
        assert_eq!(eo.last_committed_offset(), 100);
        assert_eq!(
            eo.next_read_decision(),
            ReadSizeDecision::Replay {
                start_offset: 100,
                read_length: 50
            }
        );
    }

    #[test]
    fn no_pending_ranges_falls_through_to_normal_reads() {
        let eo = eo_option();
        assert_eq!(eo.next_read_decision(), ReadSizeDecision::Normal);
    }

    #[test]
    fn validate_replay_drops_entire_queue_on_offset_mismatch() {
        let mut eo = eo_option();
        eo.load_ranges(vec![range(100, 50, CommitStateDto::Pending)]);
        assert!(!eo.validate_replay(0, 1000));
        assert_eq!(eo.next_read_decision(), ReadSizeDecision::Normal);
    }

    #[test]
    fn validate_replay_drops_queue_when_length_exceeds_available_bytes() {
        let mut eo = eo_option();
        eo.load_ranges(vec![range(0, 500, CommitStateDto::Pending)]);
        assert!(!eo.validate_replay(0, 10));
    }

    #[test]
    fn ack_advances_committed_offset_only_when_contiguous() {
        let mut eo = eo_option();
        eo.record_fresh_read(0, 0, 10);
        eo.record_fresh_read(1, 10, 10);
        eo.ack(1); // commits [10,20) first, but [0,10) isn't committed yet.
        assert_eq!(eo.last_committed_offset(), 0);
        eo.ack(0); // now [0,10) commits and the chain advances through both.
        assert_eq!(eo.last_committed_offset(), 20);
    }

    #[test]
    fn free_slot_finds_an_open_slot() {
        let mut eo = eo_option();
        eo.record_fresh_read(0, 0, 10);
        assert_eq!(eo.free_slot(), Some(1));
    }

    #[test]
    fn primary_key_validation_rejects_signature_mismatch() {
        let identity = FileIdentity::new(1, 2, "cfg");
        let recorded = crate::identity::FileSignature::from_head_bytes(b"a\n", 64);
        let live = crate::identity::FileSignature::from_head_bytes(b"b\n", 64);
        assert!(!validate_primary_key(recorded, live, &identity));
    }
}
