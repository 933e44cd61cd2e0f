//! §4.1 discovery: turns filesystem scans and container-runtime updates
//! into a normalized event stream for Reader creation/teardown, built on
//! top of [`matcher::ConfigMatcher`] and [`paths_provider::PathsProvider`].

pub mod matcher;
pub mod paths_provider;

use std::path::{Path, PathBuf};

use crate::alarm::{AlarmKey, AlarmRegistry};
use crate::identity::FileIdentity;

pub const DEFAULT_SCAN_ENTRY_CAP: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Created {
        path: PathBuf,
        identity: Option<FileIdentity>,
        config_name: String,
    },
    Modified {
        path: PathBuf,
        identity: Option<FileIdentity>,
        config_name: String,
    },
    Deleted {
        path: PathBuf,
        identity: Option<FileIdentity>,
        config_name: String,
    },
    MovedFrom {
        path: PathBuf,
        identity: Option<FileIdentity>,
        config_name: String,
    },
    MovedTo {
        path: PathBuf,
        identity: Option<FileIdentity>,
        config_name: String,
    },
    ContainerStopped {
        container_id: String,
        config_name: String,
    },
}

/// §6's container-updates channel message shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerUpdateMessage {
    pub config_name: String,
    pub delete_flag: bool,
    pub params: ContainerParams,
    pub update_all_flag: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerParams {
    pub container_id: String,
    pub mount_path: String,
    pub labels: Vec<(String, String)>,
    pub env: Vec<(String, String)>,
}

/// Outcome of walking one directory subtree (§4.1's "Failure semantics").
#[derive(Debug, Default)]
pub struct ScanReport {
    pub entries: Vec<PathBuf>,
    /// Directories whose `scan-entry cap` was exceeded; these
    /// directories are retried whole on the next walk rather than
    /// resumed mid-listing.
    pub capped_directories: Vec<PathBuf>,
    /// Directories that failed to open, paired with the raw OS error.
    pub open_failures: Vec<(PathBuf, std::io::Error)>,
}

/// Walks `root` non-recursively per directory up to `max_depth`,
/// honoring a per-directory scan-entry cap and recording failures
/// instead of propagating them, matching §4.1's "continue on failure"
/// semantics.
pub struct DirectoryWalker {
    entry_cap: usize,
    alarms: AlarmRegistry,
}

impl DirectoryWalker {
    pub fn new(entry_cap: usize) -> Self {
        Self {
            entry_cap,
            alarms: AlarmRegistry::default(),
        }
    }

    pub fn walk(&self, root: &Path, max_depth: usize) -> ScanReport {
        let mut report = ScanReport::default();
        self.walk_inner(root, max_depth, &mut report);
        report
    }

    fn walk_inner(&self, dir: &Path, remaining_depth: usize, report: &mut ScanReport) {
        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                self.raise_open_failure_alarm(dir);
                report.open_failures.push((dir.to_path_buf(), e));
                return;
            }
        };

        let mut count = 0usize;
        let mut capped = false;
        for entry in read_dir.flatten() {
            count += 1;
            if count > self.entry_cap {
                capped = true;
                break;
            }
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && remaining_depth > 0 {
                self.walk_inner(&path, remaining_depth - 1, report);
            } else if !is_dir {
                report.entries.push(path);
            }
        }

        if capped {
            self.raise_scan_cap_alarm(dir);
            report.capped_directories.push(dir.to_path_buf());
        }
    }

    fn raise_open_failure_alarm(&self, dir: &Path) {
        let _ = self.alarms.should_emit(AlarmKey {
            kind: "discovery_directory_open_failed",
            project: String::new(),
            logstore: String::new(),
            region: dir.to_string_lossy().into_owned(),
        });
    }

    fn raise_scan_cap_alarm(&self, dir: &Path) {
        let _ = self.alarms.should_emit(AlarmKey {
            kind: "discovery_scan_entry_cap_exceeded",
            project: String::new(),
            logstore: String::new(),
            region: dir.to_string_lossy().into_owned(),
        });
    }
}

/// §4.1's "A config whose base path ceases to exist unregisters its
/// prior watches on the next scan": configs to drop from the active set.
pub fn configs_with_missing_base_path<'a>(
    configs: impl IntoIterator<Item = &'a matcher::WatchConfig>,
) -> Vec<&'a str> {
    configs
        .into_iter()
        .filter(|c| !c.base_path.exists())
        .map(|c| c.config_name.as_str())
        .collect()
}
