//! §4.4 regex parser: an anchored regex with N capture groups mapped to
//! a configured key list, with one capture optionally marked as the
//! timestamp source.

use regex::Regex;

use super::{Event, EventGroup, FieldValue, Processor, ProcessorMetrics};

pub struct RegexParserConfig {
    pub pattern: Regex,
    pub field_keys: Vec<String>,
    pub timestamp_capture_index: Option<usize>,
    pub keep_source_on_parse_fail: bool,
    pub source_field_key: String,
}

pub struct RegexParser {
    config: RegexParserConfig,
    metrics: ProcessorMetrics,
}

impl RegexParser {
    pub fn new(config: RegexParserConfig) -> Self {
        Self {
            config,
            metrics: ProcessorMetrics::default(),
        }
    }
}

impl Processor for RegexParser {
    fn name(&self) -> &str {
        "regex_parser"
    }

    fn metrics(&self) -> &ProcessorMetrics {
        &self.metrics
    }

    fn process(&self, mut group: EventGroup) -> EventGroup {
        for event in &mut group.events {
            let Some(FieldValue::String(raw)) = event.fields.get(&self.config.source_field_key).cloned()
            else {
                continue;
            };

            match self.config.pattern.captures(&raw) {
                Some(caps) => {
                    for (i, key) in self.config.field_keys.iter().enumerate() {
                        if let Some(m) = caps.get(i + 1) {
                            event
                                .fields
                                .insert(key.clone(), FieldValue::String(m.as_str().to_string()));
                            if self.config.timestamp_capture_index == Some(i) {
                                if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(m.as_str()) {
                                    event.timestamp = parsed.with_timezone(&chrono::Utc);
                                }
                            }
                        }
                    }
                    if !self.config.keep_source_on_parse_fail {
                        event.fields.remove(&self.config.source_field_key);
                    }
                }
                None => {
                    self.metrics.record_parse_error();
                    if self.config.keep_source_on_parse_fail {
                        event.discarded = false;
                    } else {
                        event.discarded = true;
                        self.metrics.record_discard();
                    }
                }
            }
        }
        group
    }
}
