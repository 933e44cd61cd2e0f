use std::{io, path::Path, time::Duration};

use crate::identity::FileIdentity;

/// Every internal event this crate can raise has a corresponding method
/// here, mirroring the teacher's `FileSourceInternalEvents` trait. A
/// concrete implementation decides how (or whether) to surface each one
/// -- logging, metrics, or both -- keeping this crate decoupled from any
/// particular telemetry sink (§1 excludes process-level telemetry from
/// scope; only the call sites are core).
pub trait EngineInternalEvents: Send + Sync + Clone + 'static {
    fn emit_file_discovered(&self, path: &Path, config_name: &str);
    fn emit_file_rotated(&self, old_identity: &FileIdentity, new_path: &Path);
    fn emit_file_deleted(&self, identity: &FileIdentity);
    fn emit_reader_io_error(&self, identity: &FileIdentity, error: &io::Error);
    fn emit_record_discarded_oversize(&self, identity: &FileIdentity, size: usize);
    fn emit_parse_error(&self, processor: &str, message: &str);
    fn emit_checkpoint_written(&self, count: usize, duration: Duration);
    fn emit_checkpoint_discarded(&self, reason: &str);
    fn emit_queue_overflow_alarm(&self, project: &str, logstore: &str);
    fn emit_directory_scan_capped(&self, path: &Path, cap: usize);
}

/// A no-op emitter for tests and for embedders that only want the
/// `tracing` call sites already present at each producing layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEvents;

impl EngineInternalEvents for NullEvents {
    fn emit_file_discovered(&self, _path: &Path, _config_name: &str) {}
    fn emit_file_rotated(&self, _old_identity: &FileIdentity, _new_path: &Path) {}
    fn emit_file_deleted(&self, _identity: &FileIdentity) {}
    fn emit_reader_io_error(&self, _identity: &FileIdentity, _error: &io::Error) {}
    fn emit_record_discarded_oversize(&self, _identity: &FileIdentity, _size: usize) {}
    fn emit_parse_error(&self, _processor: &str, _message: &str) {}
    fn emit_checkpoint_written(&self, _count: usize, _duration: Duration) {}
    fn emit_checkpoint_discarded(&self, _reason: &str) {}
    fn emit_queue_overflow_alarm(&self, _project: &str, _logstore: &str) {}
    fn emit_directory_scan_capped(&self, _path: &Path, _cap: usize) {}
}
