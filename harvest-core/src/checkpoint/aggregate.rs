//! §4.5 aggregate file (normal mode): one versioned JSON document
//! holding every active [`CheckpointRecord`] plus a directory-watch map
//! for pending subdirectories, with dump-tick persistence and a
//! recovery protocol that re-resolves paths by `(dev, inode)` when the
//! recorded path has gone stale.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use super::{atomic_write, CheckpointRecord};
use crate::error::EngineError;
use crate::identity::{FileIdentity, FileSignature};

const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CAPACITY: usize = 100_000;
pub const DEFAULT_LOAD_STALENESS_SECS: i64 = 300;
pub const DEFAULT_IN_MEMORY_STALENESS_SECS: i64 = 7200;

#[derive(Debug, Serialize, Deserialize, Default)]
struct AggregateDocument {
    schema_version: u32,
    checkpoints: HashMap<String, CheckpointRecord>,
    pending_directories: Vec<String>,
}

/// In-memory view backing the aggregate document, matching the
/// teacher's `CheckpointsView` (`DashMap`-style concurrent map) but
/// keyed by the composite key instead of a bare fingerprint, since
/// normal-mode checkpoints carry a path and config name as part of
/// their identity.
pub struct AggregateCheckpointStore {
    path: PathBuf,
    capacity: usize,
    records: RwLock<HashMap<String, CheckpointRecord>>,
    pending_directories: RwLock<Vec<String>>,
}

impl AggregateCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
            records: RwLock::new(HashMap::new()),
            pending_directories: RwLock::new(Vec::new()),
        }
    }

    pub fn upsert(&self, record: CheckpointRecord) {
        self.records
            .write()
            .unwrap()
            .insert(record.composite_key(), record);
    }

    pub fn get(&self, composite_key: &str) -> Option<CheckpointRecord> {
        self.records.read().unwrap().get(composite_key).cloned()
    }

    pub fn remove(&self, composite_key: &str) {
        self.records.write().unwrap().remove(composite_key);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_pending_directory(&self, dir: impl Into<String>) {
        self.pending_directories.write().unwrap().push(dir.into());
    }

    /// Writes the aggregate document atomically (§4.5's write
    /// discipline). When the active record count exceeds `capacity`,
    /// only the most-recently-updated subset is written and the
    /// overflow count is returned so the caller can raise the
    /// capacity-cap alarm.
    pub fn dump(&self) -> Result<usize, EngineError> {
        let records = self.records.read().unwrap();
        let mut sorted: Vec<&CheckpointRecord> = records.values().collect();
        sorted.sort_by_key(|r| std::cmp::Reverse(r.last_update_time));

        let overflow = sorted.len().saturating_sub(self.capacity);
        let selected = &sorted[..sorted.len().min(self.capacity)];

        let doc = AggregateDocument {
            schema_version: SCHEMA_VERSION,
            checkpoints: selected
                .iter()
                .map(|r| (r.composite_key(), (*r).clone()))
                .collect(),
            pending_directories: self.pending_directories.read().unwrap().clone(),
        };

        let json = serde_json::to_vec_pretty(&doc).map_err(|e| EngineError::Checkpoint {
            message: format!("failed to serialize aggregate checkpoint document: {e}"),
        })?;
        atomic_write(&self.path, &json).map_err(|e| EngineError::Checkpoint {
            message: format!("failed to write aggregate checkpoint file {}: {e}", self.path.display()),
        })?;

        Ok(overflow)
    }

    /// Loads the aggregate document, discarding records older than
    /// `load_staleness`, the spec's load-time TTL (default 300s).
    pub fn load(&self, load_staleness: ChronoDuration) -> Result<usize, EngineError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(EngineError::Checkpoint {
                    message: format!("failed to read aggregate checkpoint file: {e}"),
                })
            }
        };

        let doc: AggregateDocument = serde_json::from_slice(&bytes).map_err(|e| EngineError::Checkpoint {
            message: format!("failed to parse aggregate checkpoint file: {e}"),
        })?;

        let now = Utc::now();
        let mut discarded = 0usize;
        let mut records = self.records.write().unwrap();
        for (key, record) in doc.checkpoints {
            if now.signed_duration_since(record.last_update_time) > load_staleness {
                discarded += 1;
                continue;
            }
            records.insert(key, record);
        }
        *self.pending_directories.write().unwrap() = doc.pending_directories;
        Ok(discarded)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RecoveryVerdict {
    Resume { offset: u64 },
    Discard,
}

/// §4.5's recovery protocol, steps 1-3: resolve the real path
/// (preferring `real_path`, else a bounded `(dev, inode)` scan of its
/// parent directory), verify signature, and decide whether to resume.
pub fn recover(
    record: &CheckpointRecord,
    resolve: impl Fn(&Path) -> Option<(PathBuf, FileSignature)>,
    max_scan: usize,
) -> RecoveryVerdict {
    let recorded_path = Path::new(&record.real_path);
    if let Some((_path, signature)) = resolve(recorded_path) {
        if signature == record.signature {
            return RecoveryVerdict::Resume {
                offset: record.offset,
            };
        }
    }

    if let Some(parent) = recorded_path.parent() {
        if let Ok(entries) = std::fs::read_dir(parent) {
            for entry in entries.flatten().take(max_scan) {
                let candidate = entry.path();
                if let Some((_, signature)) = resolve(&candidate) {
                    if signature == record.signature {
                        return RecoveryVerdict::Resume {
                            offset: record.offset,
                        };
                    }
                }
            }
        }
    }

    RecoveryVerdict::Discard
}

pub fn composite_key_for(identity: &FileIdentity, real_path: &str) -> String {
    format!(
        "{}*{}*{}*{}",
        real_path, identity.device_id, identity.inode, identity.config_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key_suffix: &str, minutes_old: i64) -> CheckpointRecord {
        CheckpointRecord {
            device_id: 1,
            inode: 2,
            config_name: format!("cfg-{key_suffix}"),
            real_path: format!("/var/log/{key_suffix}.log"),
            offset: 42,
            signature: FileSignature::from_head_bytes(b"head\n", 64),
            last_update_time: Utc::now() - ChronoDuration::minutes(minutes_old),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = AggregateCheckpointStore::new(dir.path().join("checkpoints.json"));
        let r = record("a", 0);
        let key = r.composite_key();
        store.upsert(r);
        assert!(store.get(&key).is_some());
    }

    #[test]
    fn dump_then_load_round_trips_a_fresh_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        let store = AggregateCheckpointStore::new(&path);
        store.upsert(record("a", 0));
        store.dump().unwrap();

        let reloaded = AggregateCheckpointStore::new(&path);
        let discarded = reloaded.load(ChronoDuration::seconds(300)).unwrap();
        assert_eq!(discarded, 0);
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn load_discards_records_older_than_the_staleness_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        let store = AggregateCheckpointStore::new(&path);
        store.upsert(record("stale", 10));
        store.dump().unwrap();

        let reloaded = AggregateCheckpointStore::new(&path);
        let discarded = reloaded.load(ChronoDuration::seconds(60)).unwrap();
        assert_eq!(discarded, 1);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn dump_caps_to_most_recently_updated_subset_and_reports_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        let store = AggregateCheckpointStore::with_capacity(&path, 1);
        store.upsert(record("old", 10));
        store.upsert(record("new", 0));
        let overflow = store.dump().unwrap();
        assert_eq!(overflow, 1);
    }

    #[test]
    fn recovery_resumes_when_real_path_resolves_with_matching_signature() {
        let sig = FileSignature::from_head_bytes(b"same\n", 64);
        let record = CheckpointRecord {
            device_id: 1,
            inode: 2,
            config_name: "cfg".into(),
            real_path: "/var/log/app.log".into(),
            offset: 17,
            signature: sig,
            last_update_time: Utc::now(),
        };
        let verdict = recover(&record, |_p| Some((PathBuf::from("/var/log/app.log"), sig)), 100);
        assert_eq!(verdict, RecoveryVerdict::Resume { offset: 17 });
    }

    #[test]
    fn recovery_discards_on_signature_mismatch_everywhere() {
        let record = CheckpointRecord {
            device_id: 1,
            inode: 2,
            config_name: "cfg".into(),
            real_path: "/var/log/missing.log".into(),
            offset: 17,
            signature: FileSignature::from_head_bytes(b"orig\n", 64),
            last_update_time: Utc::now(),
        };
        let verdict = recover(&record, |_p| None, 10);
        assert_eq!(verdict, RecoveryVerdict::Discard);
    }
}
