//! Host implementation of the intercore transport over unix datagram sockets.
//!
//! Each real-time app listens on `<socket_dir>/<component_id>.sock`; the
//! kernel binds its own end at `<socket_dir>/hl-<component_id>.sock` so the
//! peer can answer. Datagrams keep message boundaries like the seqpacket
//! sockets of the board.

use super::command::MAX_RT_MESSAGE_SIZE;
use super::transport::{IntercoreEvent, IntercoreTransport, SocketHandle, TransportError};
use std::collections::HashMap;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixDatagram;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct OpenSocket {
    socket: Arc<UnixDatagram>,
    local_path: PathBuf,
    receive_timeout: Option<Duration>,
    reader: Option<JoinHandle<()>>,
}

pub struct UnixIntercore {
    socket_dir: PathBuf,
    open: HashMap<SocketHandle, OpenSocket>,
    events: UnboundedSender<IntercoreEvent>,
}

impl UnixIntercore {
    pub fn new<P: Into<PathBuf>>(socket_dir: P, events: UnboundedSender<IntercoreEvent>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            open: HashMap::new(),
            events,
        }
    }

    /// Where the real-time app with this component id listens.
    pub fn peer_path(socket_dir: &Path, component_id: &str) -> PathBuf {
        socket_dir.join(format!("{component_id}.sock"))
    }

    pub fn local_path(socket_dir: &Path, component_id: &str) -> PathBuf {
        socket_dir.join(format!("hl-{component_id}.sock"))
    }
}

impl IntercoreTransport for UnixIntercore {
    fn connect(&mut self, component_id: &str) -> Result<SocketHandle, TransportError> {
        let connect_error = |source| TransportError::Connect {
            component_id: component_id.to_string(),
            source,
        };

        let local_path = Self::local_path(&self.socket_dir, component_id);
        // leftover from a previous run
        let _ = std::fs::remove_file(&local_path);

        let socket = UnixDatagram::bind(&local_path).map_err(connect_error)?;
        if let Err(e) = socket.connect(Self::peer_path(&self.socket_dir, component_id)) {
            let _ = std::fs::remove_file(&local_path);
            return Err(connect_error(e));
        }

        let handle = SocketHandle(socket.as_raw_fd());
        debug!("intercore socket {} bound at {}", handle, local_path.display());
        self.open.insert(
            handle,
            OpenSocket {
                socket: Arc::new(socket),
                local_path,
                receive_timeout: None,
                reader: None,
            },
        );
        Ok(handle)
    }

    fn set_receive_timeout(&mut self, socket: SocketHandle, timeout: Duration) -> Result<(), TransportError> {
        let entry = self.open.get_mut(&socket).ok_or(TransportError::NotOpen(socket))?;
        if timeout.is_zero() {
            return Err(TransportError::Timeout {
                socket,
                source: io::Error::new(io::ErrorKind::InvalidInput, "receive timeout must be non-zero"),
            });
        }
        entry.receive_timeout = Some(timeout);
        Ok(())
    }

    fn register_readable(&mut self, socket: SocketHandle) -> Result<(), TransportError> {
        let entry = self.open.get_mut(&socket).ok_or(TransportError::NotOpen(socket))?;
        if entry.reader.is_some() {
            return Err(TransportError::Register {
                socket,
                reason: "already registered".into(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| TransportError::Register {
            socket,
            reason: e.to_string(),
        })?;

        let reader = read_loop(
            socket,
            entry.socket.clone(),
            self.events.clone(),
            entry.receive_timeout,
        );
        entry.reader = Some(runtime.spawn(reader));
        Ok(())
    }

    fn send(&mut self, socket: SocketHandle, bytes: &[u8]) -> Result<usize, TransportError> {
        let entry = self.open.get(&socket).ok_or(TransportError::NotOpen(socket))?;
        let sent = entry
            .socket
            .try_send(bytes)
            .map_err(|source| TransportError::Send { socket, source })?;
        if sent < bytes.len() {
            return Err(TransportError::ShortSend {
                socket,
                sent,
                expected: bytes.len(),
            });
        }
        Ok(sent)
    }

    fn close(&mut self, socket: SocketHandle) {
        if let Some(entry) = self.open.remove(&socket) {
            if let Some(reader) = entry.reader {
                reader.abort();
            }
            if let Err(e) = std::fs::remove_file(&entry.local_path) {
                debug!("could not remove {}: {}", entry.local_path.display(), e);
            }
            debug!("intercore socket {} closed", socket);
        }
    }
}

impl Drop for UnixIntercore {
    fn drop(&mut self) {
        let handles: Vec<SocketHandle> = self.open.keys().copied().collect();
        for handle in handles {
            self.close(handle);
        }
    }
}

/// Waits for input on one socket and forwards it to the event loop.
///
/// A receive error ends the loop: the peer is not serviced again until restart.
async fn read_loop(
    handle: SocketHandle,
    socket: Arc<UnixDatagram>,
    events: UnboundedSender<IntercoreEvent>,
    receive_timeout: Option<Duration>,
) {
    let mut buf = vec![0u8; MAX_RT_MESSAGE_SIZE];
    loop {
        if let Err(error) = socket.readable().await {
            let _ = events.send(IntercoreEvent::Failed { socket: handle, error });
            return;
        }

        let received = match receive_timeout {
            Some(limit) => match tokio::time::timeout(limit, socket.recv(&mut buf)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "receive timed out")),
            },
            None => socket.recv(&mut buf).await,
        };

        let event = match received {
            Ok(n) => IntercoreEvent::Message {
                socket: handle,
                bytes: buf[..n].to_vec(),
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(error) => {
                warn!("intercore receive on {} failed: {}", handle, error);
                let _ = events.send(IntercoreEvent::Failed { socket: handle, error });
                return;
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }
}
