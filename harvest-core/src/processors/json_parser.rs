//! §4.4 JSON parser: parses the record body as a single JSON object;
//! each top-level key becomes a field. Non-object or ill-formed JSON is
//! a parse error.

use serde_json::Value;

use super::{Event, EventGroup, FieldValue, Processor, ProcessorMetrics};

pub struct JsonParserConfig {
    pub keep_source_on_parse_fail: bool,
    pub source_field_key: String,
}

pub struct JsonParser {
    config: JsonParserConfig,
    metrics: ProcessorMetrics,
}

impl JsonParser {
    pub fn new(config: JsonParserConfig) -> Self {
        Self {
            config,
            metrics: ProcessorMetrics::default(),
        }
    }
}

fn json_value_to_field(value: &Value) -> FieldValue {
    match value {
        Value::String(s) => FieldValue::String(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                FieldValue::Integer(i)
            } else {
                FieldValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        other => FieldValue::String(other.to_string()),
    }
}

impl Processor for JsonParser {
    fn name(&self) -> &str {
        "json_parser"
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

            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => {
                    for (key, value) in map {
                        event.fields.insert(key, json_value_to_field(&value));
                    }
                    if !self.config.keep_source_on_parse_fail {
                        event.fields.remove(&self.config.source_field_key);
                    }
                }
                _ => {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::Record;
    use crate::identity::FileIdentity;

    fn group_of(text: &str) -> EventGroup {
        let record = Record {
            identity: FileIdentity::new(1, 1, "cfg"),
            start_offset: 0,
            len: text.len(),
            text: text.to_string(),
            sequence: 0,
            parse_error: None,
        };
        EventGroup {
            identity: record.identity.clone(),
            events: vec![Event::from_record(&record, "raw")],
        }
    }

    fn parser(keep_on_fail: bool) -> JsonParser {
        JsonParser::new(JsonParserConfig {
            keep_source_on_parse_fail: keep_on_fail,
            source_field_key: "raw".into(),
        })
    }

    #[test]
    fn top_level_keys_become_fields() {
        let group = parser(false).process(group_of(r#"{"level":"info","count":3}"#));
        assert_eq!(
            group.events[0].fields.get("level").unwrap().as_str(),
            Some("info")
        );
        assert_eq!(group.events[0].fields.get("count").unwrap(), &FieldValue::Integer(3));
    }

    #[test]
    fn non_object_json_is_a_parse_error() {
        let group = parser(false).process(group_of("[1,2,3]"));
        assert!(group.events[0].discarded);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let group = parser(false).process(group_of("{not json"));
        assert!(group.events[0].discarded);
    }
}
