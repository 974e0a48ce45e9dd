//! Seam between the dispatch table and the OS intercore sockets.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Opaque handle of an opened intercore socket (the raw fd on Linux).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketHandle(pub i32);

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unable to connect to component {component_id}: {source}")]
    Connect {
        component_id: String,
        #[source]
        source: io::Error,
    },
    #[error("socket {0} is not open")]
    NotOpen(SocketHandle),
    #[error("unable to set receive timeout on {socket}: {source}")]
    Timeout {
        socket: SocketHandle,
        #[source]
        source: io::Error,
    },
    #[error("unable to send on {socket}: {source}")]
    Send {
        socket: SocketHandle,
        #[source]
        source: io::Error,
    },
    #[error("short send on {socket}: {sent} of {expected} bytes")]
    ShortSend {
        socket: SocketHandle,
        sent: usize,
        expected: usize,
    },
    #[error("unable to register {socket} for input events: {reason}")]
    Register { socket: SocketHandle, reason: String },
}

/// Something the event layer observed on a registered socket.
#[derive(Debug)]
pub enum IntercoreEvent {
    Message { socket: SocketHandle, bytes: Vec<u8> },
    Failed { socket: SocketHandle, error: io::Error },
}

/// Intercore socket primitives used by the dispatch table.
///
/// Sends are fire-and-forget; incoming data is delivered by the event layer as
/// [`IntercoreEvent`]s once a socket has been registered.
pub trait IntercoreTransport {
    fn connect(&mut self, component_id: &str) -> Result<SocketHandle, TransportError>;

    fn set_receive_timeout(&mut self, socket: SocketHandle, timeout: Duration) -> Result<(), TransportError>;

    fn register_readable(&mut self, socket: SocketHandle) -> Result<(), TransportError>;

    fn send(&mut self, socket: SocketHandle, bytes: &[u8]) -> Result<usize, TransportError>;

    fn close(&mut self, socket: SocketHandle);
}
