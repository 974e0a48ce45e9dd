//! Avnet IoT Connect: handshake, session id persistence and telemetry envelope.

pub mod adapter;
pub mod envelope;
pub mod handshake;
pub mod session;
pub mod store;

pub use adapter::{IotConnectAdapter, DEFAULT_HELLO_PERIOD};
pub use envelope::{iotc_timestamp, EnvelopeError, TELEMETRY_OVERHEAD};
pub use handshake::{parse_handshake, Handshake};
pub use session::{CloudSession, HandshakeDiagnostics, GUID_LEN, SID_LEN};
pub use store::{FileSessionStore, SessionStore, StorageError};
