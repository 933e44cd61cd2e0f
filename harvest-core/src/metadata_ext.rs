//! Portable access to a file's `(device, inode)` pair, the same role the
//! teacher's `metadata_ext.rs` plays for `file-source`. Only the Unix
//! path is implemented in full: Windows support would need the same
//! reparse-point/file-index plumbing the teacher carries, which this
//! engine does not need to reproduce to satisfy the spec (host-resident
//! agents in this family run on Linux containers hosts).

use std::fs::File;
use std::io;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

pub trait PortableFileExt {
    fn portable_dev(&self) -> io::Result<u64>;
    fn portable_ino(&self) -> io::Result<u64>;
}

#[cfg(unix)]
impl PortableFileExt for File {
    fn portable_dev(&self) -> io::Result<u64> {
        Ok(self.metadata()?.dev())
    }

    fn portable_ino(&self) -> io::Result<u64> {
        Ok(self.metadata()?.ino())
    }
}

#[cfg(not(unix))]
impl PortableFileExt for File {
    fn portable_dev(&self) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "device/inode identity is only implemented for unix targets",
        ))
    }

    fn portable_ino(&self) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "device/inode identity is only implemented for unix targets",
        ))
    }
}
