//! Durable single-slot storage of the IoT Connect session id.

use super::session::{truncated, SID_LEN};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not open mutable file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not read mutable file: {0}")]
    Read(#[source] io::Error),
    #[error("could not write mutable file: {0}")]
    Write(#[source] io::Error),
}

pub trait SessionStore {
    /// Stored session id, `None` when the slot was never written.
    fn load(&mut self) -> Result<Option<String>, StorageError>;

    fn store(&mut self, sid: &str) -> Result<(), StorageError>;
}

/// One fixed-size NUL-padded record in a file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&mut self) -> Result<Option<String>, StorageError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no session file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(StorageError::Read(e)),
        };

        let record = &raw[..raw.len().min(SID_LEN)];
        let end = record.iter().position(|&b| b == 0).unwrap_or(record.len());
        let sid = String::from_utf8_lossy(&record[..end]).into_owned();
        Ok((!sid.is_empty()).then_some(sid))
    }

    fn store(&mut self, sid: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Open {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut record = [0u8; SID_LEN];
        let sid = truncated(sid, SID_LEN);
        record[..sid.len()].copy_from_slice(sid.as_bytes());

        std::fs::write(&self.path, record).map_err(StorageError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSessionStore::new(dir.path().join("sid"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_record_is_fixed_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("sid");
        let mut store = FileSessionStore::new(&path);

        store.store("9tAyZNOIWD+1D2Qp").unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), SID_LEN as u64);
        assert_eq!(store.load().unwrap().as_deref(), Some("9tAyZNOIWD+1D2Qp"));

        // shorter value overwrites the whole record
        store.store("abc").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_long_sid_is_cut_to_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSessionStore::new(dir.path().join("sid"));
        store.store(&"s".repeat(100)).unwrap();
        assert_eq!(store.load().unwrap().unwrap().len(), SID_LEN);
    }

    #[test]
    fn test_multibyte_sid_is_cut_on_a_character() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSessionStore::new(dir.path().join("sid"));
        // 65 bytes, the last 'é' straddles the record end
        let sid = format!("a{}", "é".repeat(32));
        store.store(&sid).unwrap();
        assert_eq!(store.load().unwrap(), Some(format!("a{}", "é".repeat(31))));
    }

    #[test]
    fn test_all_nul_record_is_empty_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sid");
        std::fs::write(&path, [0u8; SID_LEN]).unwrap();
        assert_eq!(FileSessionStore::new(&path).load().unwrap(), None);
    }
}
