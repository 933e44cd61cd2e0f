use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The dimensions alarms are aggregated by (§7): error kind plus the
/// logical destination the error occurred against. `region` is carried
/// as an opaque string since the engine has no notion of deployment
/// topology beyond what a config supplies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlarmKey {
    pub kind: &'static str,
    pub project: String,
    pub logstore: String,
    pub region: String,
}

/// Throttles repeated alarms of the same [`AlarmKey`] to at most one
/// emission per window (default 600s per §7; individual call sites like
/// the discovery multi-match ambiguity alarm use their own window, e.g.
/// 10 minutes per §4.1).
///
/// This registry only decides *whether* to emit; actual delivery is an
/// excluded external collaborator (§1's "process-level telemetry"), so
/// callers pass in a sink closure at emission time rather than this type
/// owning one.
pub struct AlarmRegistry {
    window: Duration,
    last_emitted: Mutex<HashMap<AlarmKey, Instant>>,
}

impl AlarmRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emitted: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if an alarm for `key` should be emitted now (and
    /// records that it was), or `false` if one was already emitted
    /// within the throttle window.
    pub fn should_emit(&self, key: AlarmKey) -> bool {
        let now = Instant::now();
        let mut guard = self.last_emitted.lock().unwrap();
        match guard.get(&key) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                guard.insert(key, now);
                true
            }
        }
    }
}

impl Default for AlarmRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: &'static str) -> AlarmKey {
        AlarmKey {
            kind,
            project: "proj".into(),
            logstore: "store".into(),
            region: "cn-hangzhou".into(),
        }
    }

    #[test]
    fn second_alarm_within_window_is_suppressed() {
        let reg = AlarmRegistry::new(Duration::from_secs(600));
        assert!(reg.should_emit(key("checkpoint_corrupt")));
        assert!(!reg.should_emit(key("checkpoint_corrupt")));
    }

    #[test]
    fn distinct_keys_do_not_share_a_throttle_slot() {
        let reg = AlarmRegistry::new(Duration::from_secs(600));
        assert!(reg.should_emit(key("checkpoint_corrupt")));
        assert!(reg.should_emit(key("parse_error")));
    }

    #[test]
    fn alarm_emits_again_after_window_elapses() {
        let reg = AlarmRegistry::new(Duration::from_millis(10));
        assert!(reg.should_emit(key("transient_io")));
        std::thread::sleep(Duration::from_millis(20));
        assert!(reg.should_emit(key("transient_io")));
    }
}
