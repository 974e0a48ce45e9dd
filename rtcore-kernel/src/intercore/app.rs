//! Real-time application descriptors and their behaviour hooks.
//!
//! A descriptor pairs an [`Endpoint`] (identity + socket) with a [`HookSet`].
//! Every hook is optional; a missing hook means the matching action is
//! skipped for that app.

use super::command::{CommandBlock, DecodeError, InterCoreCmd, Response};
use super::dispatch::DispatchError;
use super::sensors::SensorCache;
use super::transport::{IntercoreTransport, SocketHandle, TransportError};
use crate::fault::{FaultCode, LastFault};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interface revision agreed with the real-time app at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceVersion {
    #[default]
    V0,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: String,
    pub component_id: String,
    pub interface_version: InterfaceVersion,
    socket: Option<SocketHandle>,
}

impl Endpoint {
    pub fn new<N: Into<String>, C: Into<String>>(name: N, component_id: C) -> Self {
        Self {
            name: name.into(),
            component_id: component_id.into(),
            interface_version: InterfaceVersion::default(),
            socket: None,
        }
    }

    pub fn socket(&self) -> Option<SocketHandle> {
        self.socket
    }

    /// Records the socket opened for this app. A socket is assigned once.
    pub fn attach_socket(&mut self, socket: SocketHandle) -> Result<(), DispatchError> {
        if self.socket.is_some() {
            return Err(DispatchError::AlreadyConnected(self.name.clone()));
        }
        self.socket = Some(socket);
        Ok(())
    }
}

/// Settings handed to init hooks.
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub receive_timeout: Duration,
    /// False when the app has no response hook: nobody would read the socket.
    pub register_for_input: bool,
    pub faults: LastFault,
}

pub trait InitHook {
    fn init(
        &mut self,
        endpoint: &mut Endpoint,
        link: &mut dyn IntercoreTransport,
        options: &InitOptions,
    ) -> Result<(), DispatchError>;
}

/// Turns the bytes read from an app's socket into a [`Response`].
pub trait ResponseHook {
    fn decode<'a>(&mut self, bytes: &'a [u8]) -> Result<Response<'a>, DecodeError>;
}

/// Decodes an app-specific raw sensor block.
///
/// Returns a reported-state patch when the reading should be pushed to the
/// cloud.
pub trait RawDataHook {
    fn on_raw_data(&mut self, block: &[u8], sensors: &mut SensorCache) -> Result<Option<Value>, DecodeError>;
}

pub trait TelemetryRequestHook {
    fn request(&mut self, endpoint: &Endpoint, link: &mut dyn IntercoreTransport) -> Result<(), TransportError>;
}

pub trait CleanupHook {
    fn cleanup(&mut self, endpoint: &mut Endpoint, link: &mut dyn IntercoreTransport);
}

#[derive(Default)]
pub struct HookSet {
    pub init: Option<Box<dyn InitHook>>,
    pub response: Option<Box<dyn ResponseHook>>,
    pub raw_data: Option<Box<dyn RawDataHook>>,
    pub telemetry_request: Option<Box<dyn TelemetryRequestHook>>,
    pub cleanup: Option<Box<dyn CleanupHook>>,
}

impl HookSet {
    /// Hooks suitable for any compliant real-time app; no raw decoder.
    pub fn generic() -> Self {
        Self {
            init: Some(Box::new(GenericInit)),
            response: Some(Box::new(GenericResponse)),
            raw_data: None,
            telemetry_request: Some(Box::new(GenericTelemetryRequest)),
            cleanup: Some(Box::new(GenericCleanup)),
        }
    }

    pub fn with_raw_data(mut self, hook: Box<dyn RawDataHook>) -> Self {
        self.raw_data = Some(hook);
        self
    }

    pub fn without_telemetry(mut self) -> Self {
        self.telemetry_request = None;
        self
    }
}

pub struct RealTimeApp {
    pub endpoint: Endpoint,
    pub hooks: HookSet,
}

impl RealTimeApp {
    pub fn new(endpoint: Endpoint, hooks: HookSet) -> Self {
        Self { endpoint, hooks }
    }

    pub fn generic<N: Into<String>, C: Into<String>>(name: N, component_id: C) -> Self {
        Self::new(Endpoint::new(name, component_id), HookSet::generic())
    }

    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    pub fn socket(&self) -> Option<SocketHandle> {
        self.endpoint.socket()
    }
}

/// Sends one command block, failing on short writes.
pub fn send_command(
    link: &mut dyn IntercoreTransport,
    socket: SocketHandle,
    block: CommandBlock,
) -> Result<usize, TransportError> {
    debug!("sending RT app command {:?} on {}", block.cmd, socket);
    link.send(socket, &block.encode())
}

/// Opens the socket, bounds receives, registers for input, says hello.
pub struct GenericInit;

impl InitHook for GenericInit {
    fn init(
        &mut self,
        endpoint: &mut Endpoint,
        link: &mut dyn IntercoreTransport,
        options: &InitOptions,
    ) -> Result<(), DispatchError> {
        info!("{} init called", endpoint.name);

        let name = endpoint.name.clone();
        let transport_error = |source| DispatchError::Transport {
            name: name.clone(),
            source,
        };

        let socket = link.connect(&endpoint.component_id).map_err(|e| {
            warn!(
                "{}: real time core disabled or component id {} is not correct",
                endpoint.name, endpoint.component_id
            );
            transport_error(e)
        })?;
        endpoint.attach_socket(socket)?;

        link.set_receive_timeout(socket, options.receive_timeout)
            .map_err(transport_error)?;

        if options.register_for_input {
            link.register_readable(socket).map_err(transport_error)?;
        }

        if let Err(e) = send_command(link, socket, CommandBlock::new(InterCoreCmd::Heartbeat)) {
            warn!("{}: heartbeat not sent: {}", endpoint.name, e);
            options.faults.record(FaultCode::WriteRtSocket);
        }
        Ok(())
    }
}

/// Standard command/response block decoding.
pub struct GenericResponse;

impl ResponseHook for GenericResponse {
    fn decode<'a>(&mut self, bytes: &'a [u8]) -> Result<Response<'a>, DecodeError> {
        Response::decode(bytes)
    }
}

/// Asks the app to read its sensors and answer with JSON telemetry.
pub struct GenericTelemetryRequest;

impl TelemetryRequestHook for GenericTelemetryRequest {
    fn request(&mut self, endpoint: &Endpoint, link: &mut dyn IntercoreTransport) -> Result<(), TransportError> {
        match endpoint.socket() {
            Some(socket) => {
                send_command(
                    link,
                    socket,
                    CommandBlock::new(InterCoreCmd::ReadSensorRespondWithTelemetry),
                )?;
                Ok(())
            }
            None => {
                debug!("{}: no socket, telemetry request skipped", endpoint.name);
                Ok(())
            }
        }
    }
}

pub struct GenericCleanup;

impl CleanupHook for GenericCleanup {
    fn cleanup(&mut self, endpoint: &mut Endpoint, link: &mut dyn IntercoreTransport) {
        info!("{} cleanup called", endpoint.name);
        if let Some(socket) = endpoint.socket() {
            link.close(socket);
        }
    }
}
