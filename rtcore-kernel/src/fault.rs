//! Process-wide "last error" indicator.
//!
//! Transport and storage failures never stop the event loop; they are logged
//! where they happen and the most recent one is kept here so the main loop can
//! report it on exit.

use serde::Serialize;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FaultCode {
    OpenRtSocket,
    WriteRtSocket,
    ReadRtSocket,
    OpenMutableFile,
    ReadMutableFile,
    WriteMutableFile,
    CloudSend,
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultCode::OpenRtSocket => "open_rt_socket",
            FaultCode::WriteRtSocket => "write_rt_socket",
            FaultCode::ReadRtSocket => "read_rt_socket",
            FaultCode::OpenMutableFile => "open_mutable_file",
            FaultCode::ReadMutableFile => "read_mutable_file",
            FaultCode::WriteMutableFile => "write_mutable_file",
            FaultCode::CloudSend => "cloud_send",
        };
        f.write_str(s)
    }
}

/// Shared handle on the last recorded fault.
///
/// The kernel runs on a single thread, clones share one slot.
#[derive(Debug, Clone, Default)]
pub struct LastFault(Rc<Cell<Option<FaultCode>>>);

impl LastFault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, code: FaultCode) {
        self.0.set(Some(code));
    }

    pub fn get(&self) -> Option<FaultCode> {
        self.0.get()
    }

    pub fn clear(&self) {
        self.0.set(None);
    }
}
