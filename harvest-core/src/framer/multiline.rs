//! §4.3 framing mode 2: multiline records delimited by start/continue/end
//! regexes, grounded in the shape of ilogtail's multiline log reader
//! (`original_source`) but expressed as a small explicit state machine
//! rather than ported line-for-line.

use regex::Regex;

use super::{split_lines, FrameResult, Framer, Record};
use crate::identity::FileIdentity;

#[derive(Debug, Clone)]
pub struct MultilineConfig {
    pub start: Option<Regex>,
    pub continue_: Option<Regex>,
    pub end: Option<Regex>,
    /// Non-matching lines encountered before any record has started in
    /// this call are dropped when `true`; otherwise they are emitted as
    /// their own single-line record.
    pub discard_unmatched: bool,
    /// Safety cap (§4.3): a buffer with no pattern match past this size
    /// is force-flushed rather than grown indefinitely.
    pub max_record_bytes: usize,
}

impl Default for MultilineConfig {
    fn default() -> Self {
        Self {
            start: None,
            continue_: None,
            end: None,
            discard_unmatched: false,
            max_record_bytes: 1024 * 1024,
        }
    }
}

struct Pending {
    start_offset: u64,
    sequence: u64,
    lines: Vec<Vec<u8>>,
    byte_len: usize,
}

pub struct MultilineFramer {
    config: MultilineConfig,
}

impl MultilineFramer {
    pub fn new(config: MultilineConfig) -> Self {
        Self { config }
    }

    fn is_start(&self, line: &[u8]) -> bool {
        self.config
            .start
            .as_ref()
            .is_some_and(|re| re.is_match(&String::from_utf8_lossy(line)))
    }

    fn is_continue(&self, line: &[u8]) -> bool {
        self.config
            .continue_
            .as_ref()
            .is_some_and(|re| re.is_match(&String::from_utf8_lossy(line)))
    }

    fn is_end(&self, line: &[u8]) -> bool {
        self.config
            .end
            .as_ref()
            .is_some_and(|re| re.is_match(&String::from_utf8_lossy(line)))
    }

    fn has_any_pattern(&self) -> bool {
        self.config.start.is_some() || self.config.continue_.is_some() || self.config.end.is_some()
    }
}

fn flush(pending: Pending, identity: &FileIdentity) -> Record {
    let joined = pending
        .lines
        .iter()
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    Record {
        identity: identity.clone(),
        start_offset: pending.start_offset,
        len: pending.byte_len,
        text: joined,
        sequence: pending.sequence,
        parse_error: None,
    }
}

impl Framer for MultilineFramer {
    fn push(
        &mut self,
        identity: &FileIdentity,
        base_offset: u64,
        next_sequence: u64,
        bytes: &[u8],
    ) -> FrameResult {
        let (lines, partial_len) = split_lines(bytes);
        let mut records = Vec::new();
        let mut offset = base_offset;
        let mut sequence = next_sequence;
        let mut pending: Option<Pending> = None;
        let mut last_emitted_index: Option<usize> = None;

        for line in lines {
            let line_bytes = line.len() as u64 + 1;
            let starts_new = self.is_start(line);
            let at_end = self.is_end(line);
            let continues = self.is_continue(line);
            let no_patterns_configured = !self.has_any_pattern();

            if starts_new && pending.is_some() {
                let finished = pending.take().unwrap();
                records.push(flush(finished, identity));
                last_emitted_index = Some(records.len() - 1);
            }

            if starts_new || (pending.is_none() && (continues || at_end || no_patterns_configured)) {
                if pending.is_none() {
                    pending = Some(Pending {
                        start_offset: offset,
                        sequence,
                        lines: Vec::new(),
                        byte_len: 0,
                    });
                    sequence += 1;
                }
            }

            match pending.as_mut() {
                Some(p) => {
                    p.lines.push(line.to_vec());
                    p.byte_len += line_bytes as usize;
                    if at_end || p.byte_len > self.config.max_record_bytes {
                        let finished = pending.take().unwrap();
                        records.push(flush(finished, identity));
                        last_emitted_index = Some(records.len() - 1);
                    }
                }
                None => {
                    // A non-matching line with no record open yet.
                    if self.config.discard_unmatched {
                        // dropped
                    } else if let Some(idx) = last_emitted_index {
                        let text = String::from_utf8_lossy(line).into_owned();
                        records[idx].text.push('\n');
                        records[idx].text.push_str(&text);
                        records[idx].len += line_bytes as usize;
                    } else {
                        records.push(Record {
                            identity: identity.clone(),
                            start_offset: offset,
                            len: line.len(),
                            text: String::from_utf8_lossy(line).into_owned(),
                            sequence,
                            parse_error: None,
                        });
                        sequence += 1;
                        last_emitted_index = Some(records.len() - 1);
                    }
                }
            }

            offset += line_bytes;
        }

        let rollback_bytes = match &pending {
            Some(p) => p.byte_len + partial_len,
            None => partial_len,
        };

        FrameResult {
            records,
            rollback_bytes,
        }
    }
}
