//! Communication with the real-time (M4) applications.

pub mod app;
pub mod command;
pub mod dispatch;
pub mod sensors;
pub mod transport;
pub mod unix;

pub use app::{Endpoint, HookSet, InterfaceVersion, RealTimeApp};
pub use command::{CommandBlock, DecodeError, InterCoreCmd, Response, COMMAND_BLOCK_LEN, MAX_RT_MESSAGE_SIZE};
pub use dispatch::{DispatchError, DispatchSettings, DispatchTable, Dispatched, MAX_REAL_TIME_APPS};
pub use sensors::{AlsPt19Decoder, GpsReading, GroveGpsDecoder, LightReading, SensorCache};
pub use transport::{IntercoreEvent, IntercoreTransport, SocketHandle, TransportError};
pub use unix::UnixIntercore;
