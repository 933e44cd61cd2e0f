//! §4.4 timestamp parser: a format-string subset of
//! `{%Y %m %d %H %M %S %f %s %z %a %A %b %B}` applied to a designated
//! field, with a second-resolution cache, year deduction, and
//! `GMT±HH:MM` timezone offsets. Grounded in
//! `original_source/core/processor/ProcessorParseTimestampNative.h`'s
//! contract (`mSourceFormat`, `mSourceTimezone`, `ParseLogTime`'s
//! second/cache split), expressed with `chrono`'s format machinery
//! instead of iLogtail's hand-rolled `LogtailTime` parser.

use std::sync::Mutex;

use chrono::format::{parse as chrono_parse, Parsed, StrftimeItems};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use regex::Regex;

use super::{Event, EventGroup, FieldValue, Processor, ProcessorMetrics};

pub struct TimestampParserConfig {
    pub source_field_key: String,
    /// e.g. `"%Y-%m-%d %H:%M:%S.%f"`.
    pub format: String,
    /// `GMT±HH:MM`, or `None` to leave timestamps in the wall-clock zone
    /// they were parsed with.
    pub timezone: Option<String>,
}

struct SecondCache {
    prefix: String,
    base: NaiveDateTime,
}

pub struct TimestampParser {
    config: TimestampParserConfig,
    has_year: bool,
    has_fraction: bool,
    offset: Option<FixedOffset>,
    offset_disabled_alarm_raised: Mutex<bool>,
    cache: Mutex<Option<SecondCache>>,
    metrics: ProcessorMetrics,
}

impl TimestampParser {
    pub fn new(config: TimestampParserConfig) -> Self {
        let has_year = config.format.contains("%Y");
        let has_fraction = config.format.contains("%f");
        let offset = config
            .timezone
            .as_deref()
            .and_then(parse_gmt_offset);
        let offset_disabled = config.timezone.is_some() && offset.is_none();

        Self {
            config,
            has_year,
            has_fraction,
            offset,
            offset_disabled_alarm_raised: Mutex::new(offset_disabled),
            cache: Mutex::new(None),
            metrics: ProcessorMetrics::default(),
        }
    }

    /// `true` once an invalid `GMT±HH:MM` string has left the offset
    /// adjustment disabled (spec: "invalid offsets leave the adjustment
    /// disabled with an alarm"); callers may read this once to raise
    /// that alarm and needn't repeat it every record.
    pub fn take_offset_disabled_alarm(&self) -> bool {
        let mut guard = self.offset_disabled_alarm_raised.lock().unwrap();
        let was_set = *guard;
        *guard = false;
        was_set
    }

    fn parse_one(&self, raw: &str, now: NaiveDateTime) -> Option<DateTime<Utc>> {
        if self.has_fraction {
            if let Some(naive) = self.parse_with_second_cache(raw) {
                return Some(self.apply_offset_and_year(naive, now));
            }
        }
        let naive = self.full_parse(raw)?;
        Some(self.apply_offset_and_year(naive, now))
    }

    fn full_parse(&self, raw: &str) -> Option<NaiveDateTime> {
        let mut parsed = Parsed::new();
        chrono_parse(&mut parsed, raw, StrftimeItems::new(&self.config.format)).ok()?;
        parsed_to_naive(&parsed)
    }

    /// Fast path for consecutive records sharing the same second
    /// prefix: reuses the cached second-resolution base and reparses
    /// only the trailing fractional digits.
    fn parse_with_second_cache(&self, raw: &str) -> Option<NaiveDateTime> {
        let mut guard = self.cache.lock().unwrap();
        if let Some(cached) = guard.as_ref() {
            if let Some(rest) = raw.strip_prefix(cached.prefix.as_str()) {
                let frac_digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                if !frac_digits.is_empty() {
                    let nanos = parse_fraction_to_nanos(&frac_digits);
                    return cached.base.with_nanosecond(nanos);
                }
            }
        }

        let naive = self.full_parse(raw)?;
        let second_prefix_len = find_second_prefix_len(raw, naive.and_utc().timestamp_subsec_nanos());
        *guard = Some(SecondCache {
            prefix: raw[..second_prefix_len].to_string(),
            base: naive.with_nanosecond(0)?,
        });
        Some(naive)
    }

    fn apply_offset_and_year(&self, mut naive: NaiveDateTime, now: NaiveDateTime) -> DateTime<Utc> {
        if !self.has_year {
            let year = deduce_year(naive.month(), naive.day(), now.date());
            naive = naive.with_year(year).unwrap_or(naive);
        }
        match self.offset {
            Some(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
            None => Utc.from_utc_datetime(&naive),
        }
    }
}

fn parsed_to_naive(parsed: &Parsed) -> Option<NaiveDateTime> {
    let date = parsed.to_naive_date().ok();
    let time = parsed.to_naive_time().ok();
    match (date, time) {
        (Some(d), Some(t)) => Some(NaiveDateTime::new(d, t)),
        (Some(d), None) => Some(NaiveDateTime::new(d, chrono::NaiveTime::MIN)),
        _ => None,
    }
}

fn find_second_prefix_len(raw: &str, _nanos: u32) -> usize {
    let digit_run = raw
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    raw.len() - digit_run
}

fn parse_fraction_to_nanos(digits: &str) -> u32 {
    let mut padded = digits.to_string();
    padded.truncate(9);
    while padded.len() < 9 {
        padded.push('0');
    }
    padded.parse().unwrap_or(0)
}

/// §4.4's calendar-wrap deduction when the format has no `%Y`.
fn deduce_year(observed_month: u32, observed_day: u32, now: NaiveDate) -> i32 {
    if observed_month == 1 && observed_day == 1 && now.month() == 12 && now.day() == 31 {
        now.year() + 1
    } else if observed_month == 12 && observed_day == 31 && now.month() == 1 && now.day() == 1 {
        now.year() - 1
    } else {
        now.year()
    }
}

/// Parses `GMT+HH:MM` / `GMT-HH:MM`. Returns `None` for anything else,
/// which the caller treats as "offset adjustment disabled".
fn parse_gmt_offset(s: &str) -> Option<FixedOffset> {
    let re = Regex::new(r"^GMT([+-])(\d{2}):(\d{2})$").unwrap();
    let caps = re.captures(s)?;
    let sign = if &caps[1] == "+" { 1 } else { -1 };
    let hours: i32 = caps[2].parse().ok()?;
    let minutes: i32 = caps[3].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    let total_seconds = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(total_seconds)
}

impl Processor for TimestampParser {
    fn name(&self) -> &str {
        "timestamp_parser"
    }

    fn metrics(&self) -> &ProcessorMetrics {
        &self.metrics
    }

    fn process(&self, mut group: EventGroup) -> EventGroup {
        let now = Utc::now().naive_utc();
        for event in &mut group.events {
            let Some(FieldValue::String(raw)) = event.fields.get(&self.config.source_field_key).cloned()
            else {
                continue;
            };

            match self.parse_one(&raw, now) {
                Some(ts) => event.timestamp = ts,
                None => self.metrics.record_parse_error(),
            }
        }
        group
    }
}
