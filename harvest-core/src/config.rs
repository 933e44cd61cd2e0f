//! Already-validated, strongly-typed configuration structs the engine
//! consumes (§1 excludes loading/validation/hot-reload from scope, but
//! something has to hold the defaults named throughout §4). Plain
//! `serde::Deserialize` with `#[serde(default)]`, the way the teacher's
//! own source-specific config structs are built.

use std::time::Duration;

use serde::Deserialize;

fn default_read_slice_bytes() -> usize {
    1024 * 1024
}

fn default_dump_interval_secs() -> u64 {
    15 * 60
}

fn default_dump_jitter_secs() -> u64 {
    60
}

fn default_load_staleness_secs() -> i64 {
    300
}

fn default_in_memory_staleness_secs() -> i64 {
    7200
}

fn default_checkpoint_capacity() -> usize {
    crate::checkpoint::aggregate::DEFAULT_CAPACITY
}

fn default_gc_tick_secs() -> u64 {
    30
}

fn default_scan_entry_cap() -> usize {
    crate::discovery::DEFAULT_SCAN_ENTRY_CAP
}

fn default_ambiguity_alarm_window_secs() -> u64 {
    10 * 60
}

fn default_cache_ttl_secs() -> u64 {
    6 * 60 * 60
}

fn default_cache_capacity() -> usize {
    crate::discovery::matcher::DEFAULT_CACHE_CAPACITY
}

fn default_recursion_depth() -> usize {
    10
}

fn default_max_record_bytes() -> usize {
    512 * 1024
}

fn default_alarm_window_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub scan_entry_cap: usize,
    pub ambiguity_alarm_window_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub recursion_depth: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_entry_cap: default_scan_entry_cap(),
            ambiguity_alarm_window_secs: default_ambiguity_alarm_window_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            recursion_depth: default_recursion_depth(),
        }
    }
}

impl DiscoveryConfig {
    pub fn ambiguity_alarm_window(&self) -> Duration {
        Duration::from_secs(self.ambiguity_alarm_window_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub read_slice_bytes: usize,
    pub fixed_tail_kib: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_slice_bytes: default_read_slice_bytes(),
            fixed_tail_kib: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FramerConfig {
    pub max_record_bytes: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: default_max_record_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub keep_source_on_parse_fail: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            keep_source_on_parse_fail: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub dump_interval_secs: u64,
    pub dump_jitter_secs: u64,
    pub load_staleness_secs: i64,
    pub in_memory_staleness_secs: i64,
    pub capacity: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dump_interval_secs: default_dump_interval_secs(),
            dump_jitter_secs: default_dump_jitter_secs(),
            load_staleness_secs: default_load_staleness_secs(),
            in_memory_staleness_secs: default_in_memory_staleness_secs(),
            capacity: default_checkpoint_capacity(),
        }
    }
}

impl CheckpointConfig {
    pub fn dump_interval(&self) -> Duration {
        Duration::from_secs(self.dump_interval_secs)
    }

    pub fn load_staleness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.load_staleness_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub gc_tick_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            gc_tick_secs: default_gc_tick_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub window_secs: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            window_secs: default_alarm_window_secs(),
        }
    }
}

impl AlarmConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// The top-level, already-validated engine configuration composed from
/// each layer's own config struct.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub discovery: DiscoveryConfig,
    pub reader: ReaderConfig,
    pub framer: FramerConfig,
    pub processor: ProcessorConfig,
    pub checkpoint: CheckpointConfig,
    pub queue: QueueConfig,
    pub alarm: AlarmConfig,
}
