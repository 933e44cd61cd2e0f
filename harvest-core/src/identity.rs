use std::io::{self, Read};

/// The unique key of a log source under the engine (§3): a
/// `(device, inode, config)` triple. Two files with an identical path
/// but different inodes are distinct identities, and identity is stable
/// across rename until the inode is reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    pub device_id: u64,
    pub inode: u64,
    pub config_name: String,
}

impl FileIdentity {
    pub fn new(device_id: u64, inode: u64, config_name: impl Into<String>) -> Self {
        Self {
            device_id,
            inode,
            config_name: config_name.into(),
        }
    }

    /// The composite key format used by the aggregate checkpoint document
    /// (§6): `"<dev>*<inode>*<config_name>"`. The real path is stored
    /// alongside this key rather than embedded in it, since rotation can
    /// change the path without changing identity.
    pub fn composite_key_suffix(&self) -> String {
        format!("{}*{}*{}", self.device_id, self.inode, self.config_name)
    }
}

/// A head-of-file fingerprint used to detect truncation-to-zero-then-grow
/// and inode reuse (§3): the byte length of the first line plus a 64-bit
/// hash of those bytes. A signature is only ever produced by actually
/// reading a file's head (there is no "uncomputed" sentinel value: the
/// hash of zero bytes is a legitimate CRC-64 output, `0`, indistinguishable
/// from any other struct literal a sentinel might pick). Callers that need
/// to represent "not yet computed" use `Option<FileSignature>` instead of
/// a magic value of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    pub first_line_bytes_length: usize,
    pub hash: u64,
}

impl FileSignature {
    /// `true` if the observed first line was empty (a file currently
    /// starting with `\n`, or a zero-length read). This is a legitimate,
    /// computed signature value, not a placeholder — two files that both
    /// presently have an empty first line produce equal signatures here,
    /// same as any other repeated content.
    pub fn is_empty_first_line(&self) -> bool {
        self.first_line_bytes_length == 0
    }

    /// Computes a signature over up to `max_bytes` of `head`, stopping at
    /// the first `\n` if one is found earlier. `max_bytes` bounds the
    /// amount of a pathological single-line file that gets hashed.
    pub fn from_head_bytes(head: &[u8], max_bytes: usize) -> FileSignature {
        let limit = head.len().min(max_bytes);
        let scan = &head[..limit];
        let end = scan.iter().position(|&b| b == b'\n').unwrap_or(scan.len());
        let slice = &scan[..end];
        FileSignature {
            first_line_bytes_length: slice.len(),
            hash: crc64(slice),
        }
    }

    /// Reads up to `max_bytes` from the start of `reader` and computes a
    /// signature the same way [`Self::from_head_bytes`] would.
    pub fn from_reader(mut reader: impl Read, max_bytes: usize) -> io::Result<FileSignature> {
        let mut buf = vec![0u8; max_bytes];
        let mut total = 0usize;
        loop {
            match reader.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => {
                    total += n;
                    if total >= max_bytes || buf[..total].contains(&b'\n') {
                        break;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(FileSignature::from_head_bytes(&buf[..total], max_bytes))
    }
}

/// CRC-64/ECMA-182, matching the checksum the teacher's `file-source`
/// crate computes (via the same `crc` crate) for fingerprints and
/// checkpoint file names.
fn crc64(bytes: &[u8]) -> u64 {
    const ALGO: crc::Crc<u64> = crc::Crc::<u64>::new(&crc::CRC_64_ECMA_182);
    ALGO.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_key_matches_spec_format() {
        let id = FileIdentity::new(42, 7, "access-log");
        assert_eq!(id.composite_key_suffix(), "42*7*access-log");
    }

    #[test]
    fn signature_stops_at_first_newline() {
        let sig = FileSignature::from_head_bytes(b"hello\nworld\n", 1024);
        assert_eq!(sig.first_line_bytes_length, 5);
    }

    #[test]
    fn signature_respects_max_bytes_cap() {
        let sig = FileSignature::from_head_bytes(b"no newline at all here", 6);
        assert_eq!(sig.first_line_bytes_length, 6);
    }

    #[test]
    fn identical_head_bytes_produce_identical_signatures() {
        let a = FileSignature::from_head_bytes(b"same line\n", 1024);
        let b = FileSignature::from_head_bytes(b"same line\ndiffering tail", 1024);
        assert_eq!(a, b);
    }

    #[test]
    fn an_empty_first_line_is_reported_as_such() {
        let sig = FileSignature::from_head_bytes(b"\nrest", 1024);
        assert!(sig.is_empty_first_line());
    }

    #[test]
    fn two_files_with_empty_first_lines_produce_equal_signatures() {
        let a = FileSignature::from_head_bytes(b"\nfoo", 1024);
        let b = FileSignature::from_head_bytes(b"\nbar", 1024);
        assert_eq!(a, b);
    }

    #[test]
    fn from_reader_matches_from_head_bytes() {
        let data = b"line one\nline two\n";
        let via_reader = FileSignature::from_reader(std::io::Cursor::new(&data[..]), 1024).unwrap();
        let via_bytes = FileSignature::from_head_bytes(data, 1024);
        assert_eq!(via_reader, via_bytes);
    }
}
