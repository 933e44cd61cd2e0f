//! §8's seed scenarios (S1-S6), exercised against the public API the
//! way the teacher's `tests/glob.rs` exercises `paths_provider` from
//! outside the crate.

use std::fs::{self, File};
use std::io::Write;

use harvest_core::checkpoint::exactly_once::{CommitStateDto, RangeCheckpoint};
use harvest_core::exactly_once::{EoOption, ReadSizeDecision};
use harvest_core::framer::container::ContainerTextFramer;
use harvest_core::framer::line::LineFramer;
use harvest_core::framer::multiline::{MultilineConfig, MultilineFramer};
use harvest_core::framer::Framer;
use harvest_core::identity::FileIdentity;
use harvest_core::metadata_ext::PortableFileExt;
use harvest_core::processors::delimiter_parser::{DelimiterParser, DelimiterParserConfig, OverflowPolicy};
use harvest_core::processors::{Event, EventGroup, FieldValue, Processor};
use harvest_core::reader::{ReadFrom, Reader, RotationVerdict};
use harvest_core::reader::encoding::SourceEncoding;
use regex::Regex;

fn id() -> FileIdentity {
    FileIdentity::new(1, 2, "cfg")
}

/// S1 — single-line tailing.
#[test]
fn s1_single_line_tailing() {
    let mut framer = LineFramer;
    let result = framer.push(&id(), 0, 0, b"a\nb\nc\n");
    assert_eq!(result.records.len(), 3);
    assert_eq!(
        result.records.iter().map(|r| (r.start_offset, r.text.as_str())).collect::<Vec<_>>(),
        vec![(0, "a"), (2, "b"), (4, "c")]
    );
}

/// S2 — multiline Java stack trace: first read emits the completed
/// record and rolls back the unterminated second occurrence; the
/// rolled-back bytes plus newly arrived bytes complete the second
/// record on the next push (framers are stateless across calls, so the
/// reader is expected to re-offer the rolled-back prefix).
#[test]
fn s2_multiline_java_stack_trace() {
    let config = MultilineConfig {
        start: Some(Regex::new(r#"^Exception"#).unwrap()),
        continue_: Some(Regex::new(r#"^\s+at\s"#).unwrap()),
        end: Some(Regex::new(r#"^\s*\.\.\.\d+ more"#).unwrap()),
        discard_unmatched: false,
        max_record_bytes: 1024 * 1024,
    };
    let mut framer = MultilineFramer::new(config);

    let first_chunk = "Exception in thread \"main\"\n    at X(Y.java:1)\n    ...23 more\nException in thread \"main\"\n";
    let first = framer.push(&id(), 0, 0, first_chunk.as_bytes());
    assert_eq!(first.records.len(), 1);
    assert!(first.records[0].text.contains("at X(Y.java:1)"));
    assert!(first.records[0].text.contains("...23 more"));
    assert!(first.rollback_bytes > 0);

    let consumed = first_chunk.len() - first.rollback_bytes;
    let second_chunk = format!(
        "{}{}",
        &first_chunk[consumed..],
        "    at Z\nException in thread \"main\"\n"
    );
    let second = framer.push(&id(), consumed as u64, 1, second_chunk.as_bytes());
    assert_eq!(second.records.len(), 1);
    assert!(second.records[0].text.contains("at Z"));
}

/// S3 — container stdout P/F merge.
#[test]
fn s3_container_partial_merge() {
    let mut framer = ContainerTextFramer::new();
    let input = concat!(
        "2021-08-25T07:00:00.000000000Z stdout P hello\n",
        "2021-08-25T07:00:00.000000000Z stdout P  world\n",
        "2021-08-25T07:00:00.000000000Z stdout F !\n",
    );
    let result = framer.push(&id(), 0, 0, input.as_bytes());
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].text, "hello world!");
}

/// S4 — delimiter parsing with quoted, comma-containing, escaped-quote field.
#[test]
fn s4_delimiter_with_quotes() {
    let config = DelimiterParserConfig {
        separator: ',',
        quote: '"',
        field_keys: vec!["f0".into(), "f1".into(), "f2".into()],
        overflow: OverflowPolicy::Discard,
        keep_source_on_parse_fail: true,
        source_field_key: "content".into(),
    };
    let parser = DelimiterParser::new(config);

    let mut fields = std::collections::BTreeMap::new();
    fields.insert("content".to_string(), FieldValue::String(r#"a,"b,""c""",d"#.to_string()));
    let group = EventGroup {
        identity: id(),
        events: vec![Event {
            timestamp: chrono::Utc::now(),
            fields,
            tags: std::collections::BTreeMap::new(),
            discarded: false,
        }],
    };

    let result = parser.process(group);
    let event = &result.events[0];
    assert_eq!(event.fields.get("f0").and_then(FieldValue::as_str), Some("a"));
    assert_eq!(event.fields.get("f1").and_then(FieldValue::as_str), Some(r#"b,"c""#));
    assert_eq!(event.fields.get("f2").and_then(FieldValue::as_str), Some("d"));
}

/// S5 — rotation: the old Reader keeps draining its unlinked handle
/// while a new Reader starts on the successor inode at offset 0.
#[test]
fn s5_rotation_old_reader_drains_new_reader_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    fs::write(&path, vec![b'x'; 100]).unwrap();

    let old_file = File::open(&path).unwrap();
    let old_identity = FileIdentity::new(old_file.portable_dev().unwrap(), old_file.portable_ino().unwrap(), "cfg");
    let mut old_reader = Reader::open(old_identity, path.clone(), ReadFrom::Beginning, SourceEncoding::Utf8).unwrap();
    let (_bytes, _offset, _more) = old_reader.read_once().unwrap();
    assert_eq!(old_reader.offset(), 100);

    let rotated_path = dir.path().join("app.log.1");
    fs::rename(&path, &rotated_path).unwrap();
    fs::write(&path, vec![b'y'; 50]).unwrap();

    // The old reader's handle still resolves its unlinked inode.
    assert_eq!(old_reader.check_rotation(false), RotationVerdict::Gone);

    let new_file = File::open(&path).unwrap();
    let new_identity = FileIdentity::new(new_file.portable_dev().unwrap(), new_file.portable_ino().unwrap(), "cfg");
    assert_ne!(new_identity, *old_reader.identity());

    let new_reader = Reader::open(new_identity, path, ReadFrom::Beginning, SourceEncoding::Utf8).unwrap();
    assert_eq!(new_reader.offset(), 0);
}

/// S6 — exactly-once replay: offset 1024 is already committed; offsets
/// 0 and 2048 are pending and must replay exactly before continuous
/// reading resumes from 3072.
#[test]
fn s6_exactly_once_replay_resumes_after_replaying_pending_ranges() {
    let mut eo = EoOption::new("pk".into(), harvest_queue::derive_routing_key("proj", "store"), 2);
    eo.load_ranges(vec![
        RangeCheckpoint {
            read_offset: 0,
            read_length: 1024,
            state: CommitStateDto::Pending,
        },
        RangeCheckpoint {
            read_offset: 1024,
            read_length: 1024,
            state: CommitStateDto::Committed,
        },
        RangeCheckpoint {
            read_offset: 2048,
            read_length: 1024,
            state: CommitStateDto::Pending,
        },
    ]);
    // The committed middle range can't advance the frontier past the
    // still-pending [0, 1024) gap in front of it.
    assert_eq!(eo.last_committed_offset(), 0);

    assert!(eo.validate_replay(0, 4096));
    assert_eq!(
        eo.next_read_decision(),
        ReadSizeDecision::Replay {
            start_offset: 0,
            read_length: 1024
        }
    );
    let replayed = eo.pop_replay_into_slot(0).unwrap();
    assert_eq!(replayed.read_offset, 0);
    eo.ack(0);

    assert!(eo.validate_replay(2048, 4096));
    assert_eq!(
        eo.next_read_decision(),
        ReadSizeDecision::Replay {
            start_offset: 2048,
            read_length: 1024
        }
    );
    let replayed = eo.pop_replay_into_slot(0).unwrap();
    assert_eq!(replayed.read_offset, 2048);
    eo.ack(0);

    assert_eq!(eo.last_committed_offset(), 3072);
    assert_eq!(eo.next_read_decision(), ReadSizeDecision::Normal);
}
