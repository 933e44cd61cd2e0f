//! §4.3 framing mode 3: the container runtime text log format,
//! `<RFC3339Nano> <stream> <tag> <payload>`, with `P`/`F` partial-line
//! merging. Grounded in ilogtail's container stdout reader
//! (`original_source/plugin_manager` log-split handling) for the P/F
//! semantics, reworked into the same rollback-returning `Framer`
//! contract the other two modes use.

use std::collections::HashMap;

use super::{split_lines, FrameResult, Framer, Record};
use crate::identity::FileIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

struct PendingPartial {
    start_offset: u64,
    sequence: u64,
    payload: String,
    byte_len: usize,
}

/// Stateless across `push()` calls, like [`super::line::LineFramer`] and
/// [`super::multiline::MultilineFramer`]: a P line left unterminated at
/// the end of a call is reported via `rollback_bytes` rather than kept
/// in a struct field, so the Reader re-offers those raw bytes on the
/// next call and this framer re-parses the P/F merge from scratch. A
/// struct-field-retained `pending` map would double-count a P payload
/// that's both merged here and re-delivered by the Reader next cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerTextFramer;

impl ContainerTextFramer {
    pub fn new() -> Self {
        Self
    }
}

struct ParsedLine<'a> {
    stream: &'a str,
    tag: &'a str,
    payload: &'a str,
}

/// Splits `<timestamp> <stream> <tag> <payload>` on the first three
/// spaces. Returns `None` if the line is missing its second or third
/// space or carries a tag outside `{P, F}` (spec's malformed-line
/// definition).
fn parse_line(line: &str) -> Option<ParsedLine<'_>> {
    let mut parts = line.splitn(4, ' ');
    let _timestamp = parts.next()?;
    let stream = parts.next()?;
    let tag = parts.next()?;
    let payload = parts.next().unwrap_or("");
    if tag != "P" && tag != "F" {
        return None;
    }
    Some(ParsedLine {
        stream,
        tag,
        payload,
    })
}

impl Framer for ContainerTextFramer {
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
        let mut pending: HashMap<&'static str, PendingPartial> = HashMap::new();

        for line in lines {
            let line_len = line.len() as u64 + 1;
            let text = String::from_utf8_lossy(line).into_owned();

            match parse_line(&text) {
                None => {
                    records.push(Record {
                        identity: identity.clone(),
                        start_offset: offset,
                        len: line.len(),
                        text,
                        sequence,
                        parse_error: Some("malformed container log line".to_string()),
                    });
                    sequence += 1;
                }
                Some(parsed) => {
                    let stream_key: &'static str = match parsed.stream {
                        "stdout" => "stdout",
                        "stderr" => "stderr",
                        _ => "stdout",
                    };

                    match parsed.tag {
                        "P" => {
                            let entry = pending.entry(stream_key).or_insert_with(|| PendingPartial {
                                start_offset: offset,
                                sequence,
                                payload: String::new(),
                                byte_len: 0,
                            });
                            if entry.payload.is_empty() && entry.byte_len == 0 {
                                sequence += 1;
                            }
                            entry.payload.push_str(parsed.payload);
                            entry.byte_len += line_len as usize;
                        }
                        "F" => {
                            if let Some(mut entry) = pending.remove(stream_key) {
                                entry.payload.push_str(parsed.payload);
                                entry.byte_len += line_len as usize;
                                records.push(Record {
                                    identity: identity.clone(),
                                    start_offset: entry.start_offset,
                                    len: entry.byte_len,
                                    text: entry.payload,
                                    sequence: entry.sequence,
                                    parse_error: None,
                                });
                            } else {
                                records.push(Record {
                                    identity: identity.clone(),
                                    start_offset: offset,
                                    len: line.len(),
                                    text: parsed.payload.to_string(),
                                    sequence,
                                    parse_error: None,
                                });
                                sequence += 1;
                            }
                        }
                        _ => unreachable!("parse_line only accepts P or F"),
                    }
                }
            }

            offset += line_len;
        }

        let pending_bytes: usize = pending.values().map(|p| p.byte_len).sum();
        FrameResult {
            records,
            rollback_bytes: pending_bytes + partial_len,
        }
    }
}
