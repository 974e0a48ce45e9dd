/*!
In-memory session store

Single slot like the file store, plus a write counter so tests can check
that an unchanged session id is not rewritten.
*/

use parking_lot::Mutex;
use rtcore_kernel::iotconnect::{SessionStore, StorageError};
use std::io;
use std::sync::Arc;

#[derive(Default)]
struct Slot {
    sid: Option<String>,
    writes: usize,
    failing: bool,
}

#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<Slot>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sid(sid: &str) -> Self {
        let store = Self::default();
        store.inner.lock().sid = Some(sid.to_string());
        store
    }

    pub fn sid(&self) -> Option<String> {
        self.inner.lock().sid.clone()
    }

    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    /// Every read and write fails while set.
    pub fn fail(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&mut self) -> Result<Option<String>, StorageError> {
        let inner = self.inner.lock();
        if inner.failing {
            return Err(StorageError::Read(io::Error::new(io::ErrorKind::Other, "storage offline")));
        }
        Ok(inner.sid.clone())
    }

    fn store(&mut self, sid: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.failing {
            return Err(StorageError::Write(io::Error::new(io::ErrorKind::Other, "storage offline")));
        }
        inner.sid = Some(sid.to_string());
        inner.writes += 1;
        Ok(())
    }
}
