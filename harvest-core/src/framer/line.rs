//! §4.3 framing mode 1: one Record per `\n`-terminated line.

use super::{split_lines, FrameResult, Framer, Record};
use crate::identity::FileIdentity;

#[derive(Debug, Default, Clone, Copy)]
pub struct LineFramer;

impl Framer for LineFramer {
    fn push(
        &mut self,
        identity: &FileIdentity,
        base_offset: u64,
        next_sequence: u64,
        bytes: &[u8],
    ) -> FrameResult {
        let (lines, partial_len) = split_lines(bytes);
        let mut records = Vec::with_capacity(lines.len());
        let mut cursor = base_offset;
        let mut sequence = next_sequence;

        for line in lines {
            records.push(Record {
                identity: identity.clone(),
                start_offset: cursor,
                len: line.len(),
                text: String::from_utf8_lossy(line).into_owned(),
                sequence,
                parse_error: None,
            });
            cursor += line.len() as u64 + 1; // + the consumed '\n'
            sequence += 1;
        }

        FrameResult {
            records,
            rollback_bytes: partial_len,
        }
    }
}
