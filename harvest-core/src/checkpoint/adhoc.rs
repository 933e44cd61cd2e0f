//! §4.5 per-job files (ad-hoc mode): one document per job under an
//! ad-hoc directory, each describing a fixed file list with per-file
//! progress and status. Shares [`super::atomic_write`]'s write
//! discipline with the aggregate store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::atomic_write;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Waiting,
    Reading,
    Done,
    Lost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFileProgress {
    pub path: String,
    pub offset: u64,
    pub status: FileStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCheckpoint {
    pub job_id: String,
    pub files: Vec<JobFileProgress>,
}

impl JobCheckpoint {
    pub fn new(job_id: impl Into<String>, file_paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            job_id: job_id.into(),
            files: file_paths
                .into_iter()
                .map(|path| JobFileProgress {
                    path,
                    offset: 0,
                    status: FileStatus::Waiting,
                })
                .collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.files
            .iter()
            .all(|f| matches!(f.status, FileStatus::Done | FileStatus::Lost))
    }
}

/// One job checkpoint file per job, all living under `directory`
/// (§4.5's "ad-hoc directory").
pub struct AdhocCheckpointStore {
    directory: PathBuf,
}

impl AdhocCheckpointStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.directory.join(format!("{job_id}.json"))
    }

    pub fn save(&self, checkpoint: &JobCheckpoint) -> Result<(), EngineError> {
        std::fs::create_dir_all(&self.directory).map_err(|e| EngineError::Checkpoint {
            message: format!("failed to create ad-hoc checkpoint directory: {e}"),
        })?;
        let json = serde_json::to_vec_pretty(checkpoint).map_err(|e| EngineError::Checkpoint {
            message: format!("failed to serialize job checkpoint {}: {e}", checkpoint.job_id),
        })?;
        atomic_write(&self.job_path(&checkpoint.job_id), &json).map_err(|e| EngineError::Checkpoint {
            message: format!("failed to write job checkpoint {}: {e}", checkpoint.job_id),
        })
    }

    pub fn load(&self, job_id: &str) -> Result<Option<JobCheckpoint>, EngineError> {
        let path = self.job_path(job_id);
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| EngineError::Checkpoint {
                    message: format!("failed to parse job checkpoint {job_id}: {e}"),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Checkpoint {
                message: format!("failed to read job checkpoint {job_id}: {e}"),
            }),
        }
    }

    pub fn delete(&self, job_id: &str) -> Result<(), EngineError> {
        match std::fs::remove_file(self.job_path(job_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Checkpoint {
                message: format!("failed to delete job checkpoint {job_id}: {e}"),
            }),
        }
    }

    pub fn list_job_ids(&self) -> Result<Vec<String>, EngineError> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EngineError::Checkpoint {
                    message: format!("failed to list ad-hoc checkpoint directory: {e}"),
                })
            }
        };
        Ok(entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect())
    }
}

pub fn job_file_path(directory: &Path, job_id: &str) -> PathBuf {
    directory.join(format!("{job_id}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips_progress() {
        let dir = tempfile::tempdir().unwrap();
        let store = AdhocCheckpointStore::new(dir.path());
        let mut checkpoint = JobCheckpoint::new("job-1", vec!["/a.log".into(), "/b.log".into()]);
        checkpoint.files[0].offset = 100;
        checkpoint.files[0].status = FileStatus::Done;
        store.save(&checkpoint).unwrap();

        let loaded = store.load("job-1").unwrap().unwrap();
        assert_eq!(loaded.files[0].offset, 100);
        assert_eq!(loaded.files[0].status, FileStatus::Done);
    }

    #[test]
    fn load_missing_job_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = AdhocCheckpointStore::new(dir.path());
        assert!(store.load("nonexistent").unwrap().is_none());
    }

    #[test]
    fn is_complete_requires_every_file_done_or_lost() {
        let mut checkpoint = JobCheckpoint::new("job-2", vec!["/a.log".into(), "/b.log".into()]);
        assert!(!checkpoint.is_complete());
        checkpoint.files[0].status = FileStatus::Done;
        checkpoint.files[1].status = FileStatus::Lost;
        assert!(checkpoint.is_complete());
    }

    #[test]
    fn list_job_ids_finds_saved_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = AdhocCheckpointStore::new(dir.path());
        store.save(&JobCheckpoint::new("job-a", vec!["/a.log".into()])).unwrap();
        store.save(&JobCheckpoint::new("job-b", vec!["/b.log".into()])).unwrap();
        let mut ids = store.list_job_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["job-a", "job-b"]);
    }
}
