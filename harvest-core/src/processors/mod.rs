//! The parsing pipeline (§4.4): an ordered sequence of [`Processor`]s
//! turns one [`Record`](crate::framer::Record) into an [`EventGroup`].
//! Grounded in the teacher's plugin-processor shape
//! (`lib/vector-core`'s transform contract) for the uniform
//! input/output/metrics contract, with the five concrete parsers built
//! from `original_source`'s `core/processor/*Native` family.

pub mod delimiter_parser;
pub mod json_parser;
pub mod regex_parser;
pub mod tag_injector;
pub mod timestamp_parser;

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::error;

use crate::alarm::{AlarmKey, AlarmRegistry};
use crate::framer::Record;
use crate::identity::FileIdentity;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// One structured event produced by the pipeline (§3's `EventGroup`
/// element): a timestamp, a set of typed fields, and metadata tags.
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
    pub tags: BTreeMap<String, String>,
    /// Set when a processor failed to produce fields for this event and
    /// `keep_source_on_parse_fail` retained the raw record instead of
    /// discarding it.
    pub discarded: bool,
}

impl Event {
    pub fn from_record(record: &Record, raw_field_key: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(raw_field_key.to_string(), FieldValue::String(record.text.clone()));
        Self {
            timestamp: Utc::now(),
            fields,
            tags: BTreeMap::new(),
            discarded: false,
        }
    }
}

/// An ordered run of [`Event`]s sharing a routing key (§3).
#[derive(Debug, Clone)]
pub struct EventGroup {
    pub identity: FileIdentity,
    pub events: Vec<Event>,
}

/// Per-processor-instance counters (§4.4's "Processor contract").
#[derive(Debug, Default)]
pub struct ProcessorMetrics {
    pub input_events: AtomicU64,
    pub output_events: AtomicU64,
    pub input_bytes: AtomicU64,
    pub output_bytes: AtomicU64,
    pub processing_time: std::sync::Mutex<Duration>,
    pub discarded_records: AtomicU64,
    pub parse_errors: AtomicU64,
}

impl ProcessorMetrics {
    pub fn record_pass(&self, input_bytes: u64, output_bytes: u64, elapsed: Duration) {
        self.input_events.fetch_add(1, Ordering::Relaxed);
        self.output_events.fetch_add(1, Ordering::Relaxed);
        self.input_bytes.fetch_add(input_bytes, Ordering::Relaxed);
        self.output_bytes.fetch_add(output_bytes, Ordering::Relaxed);
        *self.processing_time.lock().unwrap() += elapsed;
    }

    pub fn record_discard(&self) {
        self.input_events.fetch_add(1, Ordering::Relaxed);
        self.discarded_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Uniform processor contract (§4.4). Each processor declares the event
/// kind it expects via [`Processor::accepts`] and transforms an
/// `EventGroup` in place.
pub trait Processor: Send {
    fn name(&self) -> &str;
    fn metrics(&self) -> &ProcessorMetrics;

    /// Declares the input event kind this processor expects; the
    /// pipeline driver calls this before `process` and rejects a
    /// mismatched group rather than invoking `process` on it.
    fn accepts(&self, group: &EventGroup) -> bool {
        let _ = group;
        true
    }

    fn process(&self, group: EventGroup) -> EventGroup;
}

fn field_bytes(group: &EventGroup) -> u64 {
    group
        .events
        .iter()
        .flat_map(|e| e.fields.values())
        .filter_map(|v| v.as_str())
        .map(|s| s.len() as u64)
        .sum()
}

/// Throttles the "processor panicked" alarm to at most once per window
/// per processor name (§7, §9: "panics ... are caught at the processor
/// boundary, converted to a parse error, and rate-limited").
fn panic_alarms() -> &'static AlarmRegistry {
    static ALARMS: OnceLock<AlarmRegistry> = OnceLock::new();
    ALARMS.get_or_init(AlarmRegistry::default)
}

/// Runs `group` through `pipeline` in declared order, timing and
/// counting each stage, and rejecting a stage whose `accepts` check
/// fails by leaving the group untouched and bumping its parse-error
/// counter rather than invoking `process` on a type it didn't declare
/// support for.
///
/// A processor that panics is caught at this boundary (§9): the
/// panicking stage's input is preserved as the pipeline's output for
/// that stage, its parse-error counter is bumped, and a rate-limited
/// alarm is raised, rather than the panic unwinding into the worker
/// driving the whole pipeline.
pub fn run_pipeline(pipeline: &[Box<dyn Processor>], mut group: EventGroup) -> EventGroup {
    for processor in pipeline {
        if !processor.accepts(&group) {
            processor.metrics().record_parse_error();
            continue;
        }
        let input_bytes = field_bytes(&group);
        let before = group.clone();
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| processor.process(group)));
        group = match outcome {
            Ok(next) => next,
            Err(_) => {
                processor.metrics().record_parse_error();
                if panic_alarms().should_emit(AlarmKey {
                    kind: "processor_panic",
                    project: String::new(),
                    logstore: String::new(),
                    region: processor.name().to_string(),
                }) {
                    error!(processor = processor.name(), "processor panicked, passing record through unparsed");
                }
                before
            }
        };
        let output_bytes = field_bytes(&group);
        processor
            .metrics()
            .record_pass(input_bytes, output_bytes, started.elapsed());
    }
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FileIdentity;

    struct PanickingProcessor {
        metrics: ProcessorMetrics,
    }

    impl Processor for PanickingProcessor {
        fn name(&self) -> &str {
            "panicking"
        }

        fn metrics(&self) -> &ProcessorMetrics {
            &self.metrics
        }

        fn process(&self, _group: EventGroup) -> EventGroup {
            panic!("boom");
        }
    }

    fn group() -> EventGroup {
        let mut fields = BTreeMap::new();
        fields.insert("content".to_string(), FieldValue::String("hello".into()));
        EventGroup {
            identity: FileIdentity::new(1, 2, "cfg"),
            events: vec![Event {
                timestamp: Utc::now(),
                fields,
                tags: BTreeMap::new(),
                discarded: false,
            }],
        }
    }

    #[test]
    fn a_panicking_processor_is_caught_and_passes_input_through() {
        let pipeline: Vec<Box<dyn Processor>> = vec![Box::new(PanickingProcessor {
            metrics: ProcessorMetrics::default(),
        })];
        let input = group();
        let output = run_pipeline(&pipeline, input.clone());
        assert_eq!(output.events[0].fields, input.events[0].fields);
        assert_eq!(pipeline[0].metrics().parse_errors.load(Ordering::Relaxed), 1);
    }
}
