//! §4.5 checkpoint store. Three layouts share one write discipline
//! (write to `.bak`, fsync, rename) grounded in the teacher's
//! `Checkpointer::write_checkpoints`
//! (`lib/file-source/src/checkpointer.rs`), generalized from the
//! teacher's single `BTreeSet<Checkpoint>` document to the three
//! document shapes §4.5 names.

pub mod adhoc;
pub mod aggregate;
pub mod exactly_once;

use serde::{Deserialize, Serialize};

use crate::identity::FileSignature;

/// One entry in the aggregate (normal-mode) checkpoint document (§3's
/// `CheckpointRecord`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub device_id: u64,
    pub inode: u64,
    pub config_name: String,
    pub real_path: String,
    /// Written as a JSON string, not a number (§6's wire format:
    /// `offset(string)`).
    #[serde(with = "offset_as_string")]
    pub offset: u64,
    pub signature: FileSignature,
    pub last_update_time: chrono::DateTime<chrono::Utc>,
}

mod offset_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(offset: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(offset)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl CheckpointRecord {
    /// `"<path>*<dev>*<inode>*<config_name>"` (§4.5's composite key).
    pub fn composite_key(&self) -> String {
        format!(
            "{}*{}*{}*{}",
            self.real_path, self.device_id, self.inode, self.config_name
        )
    }
}

impl Serialize for FileSignature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("FileSignature", 2)?;
        s.serialize_field("first_line_bytes_length", &self.first_line_bytes_length)?;
        s.serialize_field("hash", &self.hash)?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for FileSignature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            first_line_bytes_length: usize,
            hash: u64,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(FileSignature {
            first_line_bytes_length: raw.first_line_bytes_length,
            hash: raw.hash,
        })
    }
}

/// Atomically writes `contents` to `path`: write to `<path>.bak`,
/// fsync, rename over `path` (§4.5's write discipline, directly
/// grounded in the teacher's `write_checkpoints`).
pub(crate) fn atomic_write(path: &std::path::Path, contents: &[u8]) -> std::io::Result<()> {
    let bak_path = path.with_extension("bak");
    {
        use std::io::Write;
        let mut f = std::io::BufWriter::new(std::fs::File::create(&bak_path)?);
        f.write_all(contents)?;
        f.into_inner()?.sync_all()?;
    }
    std::fs::rename(&bak_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_key_matches_spec_format() {
        let record = CheckpointRecord {
            device_id: 1,
            inode: 2,
            config_name: "cfg".into(),
            real_path: "/var/log/app.log".into(),
            offset: 100,
            signature: FileSignature::from_head_bytes(b"head\n", 64),
            last_update_time: chrono::Utc::now(),
        };
        assert_eq!(record.composite_key(), "/var/log/app.log*1*2*cfg");
    }

    #[test]
    fn atomic_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        atomic_write(&path, b"{\"hello\":1}").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"hello\":1}");
        assert!(!path.with_extension("bak").exists());
    }
}
