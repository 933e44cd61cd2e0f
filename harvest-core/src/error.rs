use snafu::Snafu;

use crate::identity::FileIdentity;

/// Recoverable failure kinds from §7's error taxonomy. Transient I/O,
/// framing, parsing, and checkpoint errors are all handled locally by
/// the layer that produced them (a reader reopens after rotation, a
/// framer rolls back, a processor discards a record); this enum exists
/// so those layers have a uniform, typed shape to log and to feed into
/// the [`crate::alarm::AlarmRegistry`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    #[snafu(display("transient I/O error reading {identity:?}: {source}"))]
    TransientIo {
        identity: FileIdentity,
        source: std::io::Error,
    },

    #[snafu(display("permanent I/O error on watched path {path}: {source}"))]
    PermanentIo {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("framing error on {identity:?}: {message}"))]
    Framing {
        identity: FileIdentity,
        message: String,
    },

    #[snafu(display("parse error in processor {processor}: {message}"))]
    Parsing { processor: String, message: String },

    #[snafu(display("checkpoint error: {message}"))]
    Checkpoint { message: String },

    /// An invariant the engine assumes was violated at runtime (§7's
    /// "Catastrophic" row). Callers are expected to attempt a final
    /// checkpoint dump and exit non-zero; this crate never does that
    /// exit itself since process lifecycle is the embedding binary's
    /// concern.
    #[snafu(display("invariant violated: {message}"))]
    Invariant { message: String },
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
