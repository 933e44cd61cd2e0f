//! §4.4 delimiter parser: a four-state FSM over `{separator, quote,
//! data}`, ported in spirit from `original_source`'s
//! `DelimiterModeFsmParser` (`Initial`/`InQuote`/`InData`/
//! `JustClosedQuote`, renamed from the original's `STATE_INITIAL` /
//! `STATE_QUOTE` / `STATE_DATA` / `STATE_DOUBLE_QUOTE`).

use super::{Event, EventGroup, FieldValue, Processor, ProcessorMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsmState {
    Initial,
    InQuote,
    InData,
    JustClosedQuote,
}

/// What happens to fields beyond the configured key list's length
/// (§4.4's "Overflow fields").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Extend with synthetic keys `__column${i}__`.
    Extend,
    /// Join everything past the declared keys into one trailing field.
    CatchAll,
    Discard,
}

pub struct DelimiterParserConfig {
    pub separator: char,
    pub quote: char,
    pub field_keys: Vec<String>,
    pub overflow: OverflowPolicy,
    pub keep_source_on_parse_fail: bool,
    pub source_field_key: String,
}

pub struct DelimiterParser {
    config: DelimiterParserConfig,
    metrics: ProcessorMetrics,
}

impl DelimiterParser {
    pub fn new(config: DelimiterParserConfig) -> Self {
        Self {
            config,
            metrics: ProcessorMetrics::default(),
        }
    }
}

/// Runs the FSM over one line, returning the parsed fields or `None` if
/// the line ends while still inside a quoted field (the spec's only
/// FSM parse-error case).
fn parse_delimiter_line(line: &str, separator: char, quote: char) -> Option<Vec<String>> {
    let mut state = FsmState::Initial;
    let mut field = String::new();
    let mut columns = Vec::new();

    for ch in line.chars() {
        if ch == separator {
            match state {
                FsmState::Initial => {
                    columns.push(std::mem::take(&mut field));
                }
                FsmState::InQuote => field.push(ch),
                FsmState::InData | FsmState::JustClosedQuote => {
                    state = FsmState::Initial;
                    columns.push(std::mem::take(&mut field));
                }
            }
        } else if ch == quote {
            match state {
                FsmState::Initial => state = FsmState::InQuote,
                FsmState::InQuote => state = FsmState::JustClosedQuote,
                FsmState::InData => return None,
                FsmState::JustClosedQuote => {
                    // Doubled quote inside a quoted field escapes to one quote.
                    state = FsmState::InQuote;
                    field.push(quote);
                }
            }
        } else {
            match state {
                FsmState::Initial => {
                    state = FsmState::InData;
                    field.push(ch);
                }
                FsmState::InQuote | FsmState::InData => field.push(ch),
                FsmState::JustClosedQuote => return None,
            }
        }
    }

    match state {
        FsmState::Initial | FsmState::InData | FsmState::JustClosedQuote => {
            columns.push(field);
            Some(columns)
        }
        FsmState::InQuote => None,
    }
}

fn apply_overflow(keys: &[String], values: Vec<String>, policy: OverflowPolicy) -> Vec<(String, String)> {
    if values.len() <= keys.len() {
        return keys.iter().cloned().zip(values).collect();
    }

    let mut out: Vec<(String, String)> = keys
        .iter()
        .cloned()
        .zip(values.iter().take(keys.len()).cloned())
        .collect();
    let extra = &values[keys.len()..];

    match policy {
        OverflowPolicy::Discard => {}
        OverflowPolicy::Extend => {
            for (i, v) in extra.iter().enumerate() {
                out.push((format!("__column{}__", keys.len() + i), v.clone()));
            }
        }
        OverflowPolicy::CatchAll => {
            out.push((format!("__column{}__", keys.len()), extra.join(&','.to_string())));
        }
    }
    out
}

impl Processor for DelimiterParser {
    fn name(&self) -> &str {
        "delimiter_parser"
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

            match parse_delimiter_line(&raw, self.config.separator, self.config.quote) {
                Some(values) => {
                    for (key, value) in apply_overflow(&self.config.field_keys, values, self.config.overflow) {
                        event.fields.insert(key, FieldValue::String(value));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_comma_line() {
        let values = parse_delimiter_line("a,b,c", ',', '"').unwrap();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn doubled_quote_inside_a_quoted_field_escapes_to_one_quote() {
        let values = parse_delimiter_line(r#"a,"he said ""hi""",c"#, ',', '"').unwrap();
        assert_eq!(values[1], r#"he said "hi""#);
    }

    #[test]
    fn unterminated_quote_at_eof_is_a_parse_error() {
        let values = parse_delimiter_line(r#"a,"unterminated"#, ',', '"');
        assert!(values.is_none());
    }

    #[test]
    fn overflow_extend_appends_synthetic_column_keys() {
        let out = apply_overflow(
            &["a".into(), "b".into()],
            vec!["1".into(), "2".into(), "3".into()],
            OverflowPolicy::Extend,
        );
        assert_eq!(out[2].0, "__column2__");
    }

    #[test]
    fn overflow_catch_all_joins_remaining_fields() {
        let out = apply_overflow(
            &["a".into()],
            vec!["1".into(), "2".into(), "3".into()],
            OverflowPolicy::CatchAll,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].1, "2,3");
    }

    #[test]
    fn overflow_discard_drops_extra_fields() {
        let out = apply_overflow(
            &["a".into()],
            vec!["1".into(), "2".into(), "3".into()],
            OverflowPolicy::Discard,
        );
        assert_eq!(out.len(), 1);
    }
}
