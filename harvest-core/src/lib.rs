//! The core log-collection engine: file discovery, incremental
//! tailing, record framing, structured parsing, checkpointing, and
//! exactly-once replay, matching §2's component layering, plus the
//! [`engine`] loop that pumps bytes through that pipeline and drains the
//! result into [`harvest_queue`].
//!
//! This crate owns no signal handling or config-file loading -- the
//! embedding binary is still responsible for process lifecycle (reading
//! config, installing signal handlers, deciding when to call
//! [`engine::pump_reader`]/[`engine::pump_processor`] and at what
//! cadence) -- but the read -> frame -> parse -> queue loop itself lives
//! here, in the dependency order §2 specifies: checkpoint store, framer,
//! reader, discovery, processor pipeline, then the [`harvest_queue`]
//! manager and the exactly-once controller above all of it.

#![deny(clippy::all)]

pub mod alarm;
pub mod checkpoint;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod exactly_once;
pub mod framer;
pub mod identity;
pub mod internal_events;
pub mod metadata_ext;
pub mod processors;
pub mod reader;

pub use error::{EngineError, Result};
pub use identity::{FileIdentity, FileSignature};
