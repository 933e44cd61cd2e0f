//! §4.1's matching algorithm: which watch configs claim a given path.
//! Grounded in the teacher's glob-based `paths_provider` for pattern
//! matching primitives, generalized to the spec's multi-config
//! tie-break and ambiguity-alarm rules, which `file-source` (built
//! around one source per config) has no counterpart for.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use glob::Pattern;

use crate::alarm::{AlarmKey, AlarmRegistry};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_CACHE_CAPACITY: usize = 50_000;
pub const DEFAULT_AMBIGUITY_ALARM_WINDOW: Duration = Duration::from_secs(10 * 60);

/// One watch configuration's matching criteria (§4.1's "config set C").
pub struct WatchConfig {
    pub config_name: String,
    pub base_path: PathBuf,
    /// `Some` for a wildcard-segmented watch path; matched in addition
    /// to the plain prefix check against `base_path`.
    pub wildcard_pattern: Option<Pattern>,
    pub directory_blacklist: Vec<Pattern>,
    pub recursion_depth: usize,
    pub force_multi_config: bool,
    pub create_time: DateTime<Utc>,
}

impl WatchConfig {
    fn depth_below_base(&self, path: &Path) -> Option<usize> {
        let rel = path.strip_prefix(&self.base_path).ok()?;
        Some(rel.components().count().saturating_sub(1))
    }

    fn matches_path(&self, path: &Path) -> bool {
        let prefix_match = match self.depth_below_base(path) {
            Some(depth) => depth <= self.recursion_depth,
            None => false,
        };
        let wildcard_match = self
            .wildcard_pattern
            .as_ref()
            .is_some_and(|p| p.matches(&path.to_string_lossy()));
        prefix_match || wildcard_match
    }

    fn blacklists_directory(&self, dir: &Path) -> bool {
        self.directory_blacklist
            .iter()
            .any(|p| p.matches(&dir.to_string_lossy()))
    }
}

struct CacheEntry {
    configs: Vec<String>,
    inserted_at: Instant,
}

/// §4.1's step 4 cache: invalidated by age (default 6h) or by size cap.
struct MatchCache {
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<PathBuf, CacheEntry>>,
}

impl MatchCache {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, path: &Path) -> Option<Vec<String>> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(path)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.configs.clone())
    }

    fn insert(&self, path: PathBuf, configs: Vec<String>) {
        let mut entries = self.entries.write().unwrap();
        if entries.len() >= self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            path,
            CacheEntry {
                configs,
                inserted_at: Instant::now(),
            },
        );
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

pub struct ConfigMatcher {
    configs: Vec<WatchConfig>,
    host_blacklist: Vec<Pattern>,
    cache: MatchCache,
    alarms: AlarmRegistry,
}

impl ConfigMatcher {
    pub fn new(configs: Vec<WatchConfig>, host_blacklist: Vec<Pattern>) -> Self {
        Self {
            configs,
            host_blacklist,
            cache: MatchCache::new(DEFAULT_CACHE_TTL, DEFAULT_CACHE_CAPACITY),
            alarms: AlarmRegistry::new(DEFAULT_AMBIGUITY_ALARM_WINDOW),
        }
    }

    pub fn cached_entry_count(&self) -> usize {
        self.cache.len()
    }

    /// Runs the §4.1 four-step algorithm, consulting and populating the
    /// cache. Returns the config names that claim `path`, in match
    /// order (forced matches first, then the single tie-broken normal
    /// winner if any).
    pub fn match_path(&self, path: &Path) -> Vec<String> {
        if let Some(cached) = self.cache.get(path) {
            return cached;
        }

        let result = self.match_path_uncached(path);
        self.cache.insert(path.to_path_buf(), result.clone());
        result
    }

    fn match_path_uncached(&self, path: &Path) -> Vec<String> {
        // Step 1: host-path blacklist.
        if self.host_blacklist.iter().any(|p| p.matches(&path.to_string_lossy())) {
            return Vec::new();
        }

        // Step 2: candidate configs, honoring per-config directory blacklist
        // against every ancestor directory within the config's base path.
        let candidates: Vec<&WatchConfig> = self
            .configs
            .iter()
            .filter(|cfg| cfg.matches_path(path) && !self.any_ancestor_blacklisted(cfg, path))
            .collect();

        // Step 3: select.
        let (forced, normal): (Vec<&WatchConfig>, Vec<&WatchConfig>) =
            candidates.into_iter().partition(|c| c.force_multi_config);

        let mut selected: Vec<String> = forced.iter().map(|c| c.config_name.clone()).collect();

        match normal.len() {
            0 => {}
            1 => selected.push(normal[0].config_name.clone()),
            _ => {
                self.raise_ambiguity_alarm(path);
                if let Some(winner) = self.tie_break(&normal) {
                    selected.push(winner.config_name.clone());
                }
            }
        }

        selected
    }

    fn any_ancestor_blacklisted(&self, cfg: &WatchConfig, path: &Path) -> bool {
        let mut current = path;
        while let Some(parent) = current.parent() {
            if parent.starts_with(&cfg.base_path) && cfg.blacklists_directory(parent) {
                return true;
            }
            if parent == cfg.base_path {
                break;
            }
            current = parent;
        }
        false
    }

    /// Longest base path wins; ties broken by earliest config create-time
    /// (§4.1's deterministic tie-break rule).
    fn tie_break<'a>(&self, normal: &[&'a WatchConfig]) -> Option<&'a WatchConfig> {
        normal
            .iter()
            .copied()
            .max_by(|a, b| {
                a.base_path
                    .as_os_str()
                    .len()
                    .cmp(&b.base_path.as_os_str().len())
                    .then_with(|| b.create_time.cmp(&a.create_time))
            })
    }

    fn raise_ambiguity_alarm(&self, path: &Path) {
        let key = AlarmKey {
            kind: "discovery_ambiguous_match",
            project: String::new(),
            logstore: String::new(),
            region: path.to_string_lossy().into_owned(),
        };
        let _ = self.alarms.should_emit(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(name: &str, base: &str, forced: bool, minutes_old: i64) -> WatchConfig {
        WatchConfig {
            config_name: name.into(),
            base_path: PathBuf::from(base),
            wildcard_pattern: None,
            directory_blacklist: Vec::new(),
            recursion_depth: 10,
            force_multi_config: forced,
            create_time: Utc::now() - chrono::Duration::minutes(minutes_old),
        }
    }

    #[test]
    fn single_match_is_selected_directly() {
        let matcher = ConfigMatcher::new(vec![cfg("a", "/var/log/app", false, 0)], Vec::new());
        let matched = matcher.match_path(Path::new("/var/log/app/current.log"));
        assert_eq!(matched, vec!["a".to_string()]);
    }

    #[test]
    fn host_blacklist_rejects_before_any_config_check() {
        let blacklist = vec![Pattern::new("/proc/**").unwrap()];
        let matcher = ConfigMatcher::new(vec![cfg("a", "/proc", false, 0)], blacklist);
        assert!(matcher.match_path(Path::new("/proc/1/status")).is_empty());
    }

    #[test]
    fn ambiguous_normal_matches_pick_longest_base_path() {
        let matcher = ConfigMatcher::new(
            vec![cfg("short", "/var/log", false, 0), cfg("long", "/var/log/app", false, 0)],
            Vec::new(),
        );
        let matched = matcher.match_path(Path::new("/var/log/app/current.log"));
        assert_eq!(matched, vec!["long".to_string()]);
    }

    #[test]
    fn ambiguous_tie_on_base_path_length_breaks_on_earliest_create_time() {
        let matcher = ConfigMatcher::new(
            vec![cfg("older", "/var/log/app", false, 10), cfg("newer", "/var/log/app", false, 0)],
            Vec::new(),
        );
        let matched = matcher.match_path(Path::new("/var/log/app/current.log"));
        assert_eq!(matched, vec!["older".to_string()]);
    }

    #[test]
    fn force_multi_config_matches_alongside_the_normal_winner() {
        let matcher = ConfigMatcher::new(
            vec![cfg("normal", "/var/log/app", false, 0), cfg("forced", "/var/log/app", true, 0)],
            Vec::new(),
        );
        let mut matched = matcher.match_path(Path::new("/var/log/app/current.log"));
        matched.sort();
        assert_eq!(matched, vec!["forced".to_string(), "normal".to_string()]);
    }

    #[test]
    fn directory_blacklist_removes_an_otherwise_matching_config() {
        let mut config = cfg("a", "/var/log/app", false, 0);
        config.directory_blacklist = vec![Pattern::new("/var/log/app/private").unwrap()];
        let matcher = ConfigMatcher::new(vec![config], Vec::new());
        assert!(matcher.match_path(Path::new("/var/log/app/private/secret.log")).is_empty());
    }

    #[test]
    fn cache_hits_avoid_recomputation_and_grow_with_new_paths() {
        let matcher = ConfigMatcher::new(vec![cfg("a", "/var/log/app", false, 0)], Vec::new());
        matcher.match_path(Path::new("/var/log/app/one.log"));
        matcher.match_path(Path::new("/var/log/app/one.log"));
        matcher.match_path(Path::new("/var/log/app/two.log"));
        assert_eq!(matcher.cached_entry_count(), 2);
    }
}
