/*!
Mock intercore transport

Records every call the dispatch table makes and hands out fake socket
handles. Clones share the same recorder, so a test keeps one clone and gives
the other to the `DispatchTable`.
*/

use parking_lot::Mutex;
use rtcore_kernel::intercore::{CommandBlock, IntercoreTransport, SocketHandle, TransportError};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// First fake fd handed out.
const FIRST_FD: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntercoreCall {
    Connect(String),
    SetTimeout(SocketHandle, Duration),
    Register(SocketHandle),
    Send(SocketHandle, Vec<u8>),
    Close(SocketHandle),
}

#[derive(Default)]
struct Recorder {
    calls: Vec<IntercoreCall>,
    opened: Vec<(String, SocketHandle)>,
    refused: HashSet<String>,
    failing_sends: bool,
    next_fd: i32,
}

#[derive(Clone, Default)]
pub struct MockIntercore {
    inner: Arc<Mutex<Recorder>>,
}

impl MockIntercore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `connect` fail for this component id.
    pub fn refuse(&self, component_id: &str) -> &Self {
        self.inner.lock().refused.insert(component_id.to_string());
        self
    }

    pub fn fail_sends(&self, failing: bool) -> &Self {
        self.inner.lock().failing_sends = failing;
        self
    }

    pub fn calls(&self) -> Vec<IntercoreCall> {
        self.inner.lock().calls.clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                IntercoreCall::Connect(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn socket_of(&self, component_id: &str) -> Option<SocketHandle> {
        self.inner
            .lock()
            .opened
            .iter()
            .find(|(id, _)| id == component_id)
            .map(|(_, socket)| *socket)
    }

    /// Raw payloads sent, in order.
    pub fn sent(&self) -> Vec<(SocketHandle, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                IntercoreCall::Send(socket, bytes) => Some((socket, bytes)),
                _ => None,
            })
            .collect()
    }

    /// Sent payloads decoded as command blocks; undecodable ones are skipped.
    pub fn sent_commands(&self) -> Vec<(SocketHandle, CommandBlock)> {
        self.sent()
            .into_iter()
            .filter_map(|(socket, bytes)| CommandBlock::decode(&bytes).ok().map(|b| (socket, b)))
            .collect()
    }

    pub fn sent_to(&self, socket: SocketHandle) -> Vec<CommandBlock> {
        self.sent_commands()
            .into_iter()
            .filter(|(s, _)| *s == socket)
            .map(|(_, block)| block)
            .collect()
    }

    pub fn closed(&self) -> Vec<SocketHandle> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                IntercoreCall::Close(socket) => Some(socket),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }
}

impl IntercoreTransport for MockIntercore {
    fn connect(&mut self, component_id: &str) -> Result<SocketHandle, TransportError> {
        let mut inner = self.inner.lock();
        inner.calls.push(IntercoreCall::Connect(component_id.to_string()));
        if inner.refused.contains(component_id) {
            return Err(TransportError::Connect {
                component_id: component_id.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such real-time app"),
            });
        }
        let socket = SocketHandle(FIRST_FD + inner.next_fd);
        inner.next_fd += 1;
        inner.opened.push((component_id.to_string(), socket));
        debug!("[MOCK] {} connected on {}", component_id, socket);
        Ok(socket)
    }

    fn set_receive_timeout(&mut self, socket: SocketHandle, timeout: Duration) -> Result<(), TransportError> {
        self.inner.lock().calls.push(IntercoreCall::SetTimeout(socket, timeout));
        Ok(())
    }

    fn register_readable(&mut self, socket: SocketHandle) -> Result<(), TransportError> {
        self.inner.lock().calls.push(IntercoreCall::Register(socket));
        Ok(())
    }

    fn send(&mut self, socket: SocketHandle, bytes: &[u8]) -> Result<usize, TransportError> {
        let mut inner = self.inner.lock();
        inner.calls.push(IntercoreCall::Send(socket, bytes.to_vec()));
        if inner.failing_sends {
            return Err(TransportError::Send {
                socket,
                source: io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"),
            });
        }
        Ok(bytes.len())
    }

    fn close(&mut self, socket: SocketHandle) {
        self.inner.lock().calls.push(IntercoreCall::Close(socket));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtcore_kernel::intercore::InterCoreCmd;

    #[test]
    fn test_records_and_shares_state() {
        let mock = MockIntercore::new();
        let mut link = mock.clone();

        let socket = link.connect("app-a").unwrap();
        link.send(socket, &CommandBlock::new(InterCoreCmd::Heartbeat).encode()).unwrap();
        link.close(socket);

        assert_eq!(mock.connects(), vec!["app-a".to_string()]);
        assert_eq!(mock.socket_of("app-a"), Some(socket));
        assert_eq!(mock.sent_to(socket)[0].cmd, InterCoreCmd::Heartbeat);
        assert_eq!(mock.closed(), vec![socket]);
    }

    #[test]
    fn test_injected_failures() {
        let mock = MockIntercore::new();
        mock.refuse("bad").fail_sends(true);
        let mut link = mock.clone();

        assert!(link.connect("bad").is_err());
        let socket = link.connect("good").unwrap();
        assert!(link.send(socket, &[1]).is_err());
        assert_eq!(mock.sent().len(), 1);
    }
}
