//! §4.5 exactly-once store: a key-value document keyed by
//! `"<config>-<path>-<dev>-<inode>"` holding a fixed-size vector of
//! RangeCheckpoints per file, persisted with the same atomic-write
//! discipline as the other two layouts. This is the on-disk
//! counterpart to [`harvest_queue::ExactlyOnceSenderQueue`]'s in-memory
//! slots; [`crate::exactly_once`] is what binds the two together at
//! runtime.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use harvest_queue::CommitState;
use serde::{Deserialize, Serialize};

use super::atomic_write;
use crate::error::EngineError;
use crate::identity::FileIdentity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeCheckpoint {
    pub read_offset: u64,
    pub read_length: u64,
    pub state: CommitStateDto,
}

/// [`CommitState`] has no `Serialize`/`Deserialize` impl (it's an
/// in-memory-only concept in `harvest-queue`); this is its on-disk
/// mirror, converted at the load/save boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStateDto {
    Pending,
    Committed,
}

impl From<CommitState> for CommitStateDto {
    fn from(state: CommitState) -> Self {
        match state {
            CommitState::Pending => CommitStateDto::Pending,
            CommitState::Committed => CommitStateDto::Committed,
        }
    }
}

impl From<CommitStateDto> for CommitState {
    fn from(dto: CommitStateDto) -> Self {
        match dto {
            CommitStateDto::Pending => CommitState::Pending,
            CommitStateDto::Committed => CommitState::Committed,
        }
    }
}

/// `"<config>-<path>-<dev>-<inode>"` (§4.5's exactly-once primary key).
pub fn primary_key(identity: &FileIdentity, real_path: &str) -> String {
    format!(
        "{}-{}-{}-{}",
        identity.config_name, real_path, identity.device_id, identity.inode
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRanges {
    ranges: Vec<RangeCheckpoint>,
}

pub struct ExactlyOnceCheckpointStore {
    path: PathBuf,
    documents: RwLock<HashMap<String, FileRanges>>,
}

impl ExactlyOnceCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_ranges(&self, primary_key: String, ranges: Vec<RangeCheckpoint>) {
        self.documents
            .write()
            .unwrap()
            .insert(primary_key, FileRanges { ranges });
    }

    pub fn ranges_for(&self, primary_key: &str) -> Option<Vec<RangeCheckpoint>> {
        self.documents
            .read()
            .unwrap()
            .get(primary_key)
            .map(|f| f.ranges.clone())
    }

    pub fn remove(&self, primary_key: &str) {
        self.documents.write().unwrap().remove(primary_key);
    }

    pub fn dump(&self) -> Result<(), EngineError> {
        let documents = self.documents.read().unwrap();
        let json = serde_json::to_vec_pretty(&*documents).map_err(|e| EngineError::Checkpoint {
            message: format!("failed to serialize exactly-once checkpoint document: {e}"),
        })?;
        atomic_write(&self.path, &json).map_err(|e| EngineError::Checkpoint {
            message: format!(
                "failed to write exactly-once checkpoint file {}: {e}",
                self.path.display()
            ),
        })
    }

    pub fn load(&self) -> Result<(), EngineError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(EngineError::Checkpoint {
                    message: format!("failed to read exactly-once checkpoint file: {e}"),
                })
            }
        };
        let documents: HashMap<String, FileRanges> =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::Checkpoint {
                message: format!("failed to parse exactly-once checkpoint file: {e}"),
            })?;
        *self.documents.write().unwrap() = documents;
        Ok(())
    }
}
