/**
 * INTERCORE DISPATCH TABLE - Registry of the real-time (M4) applications
 *
 * ROLE :
 * Opens one intercore socket per configured app, sends commands
 * (heartbeat, read sensor, telemetry request, sample rate) and routes the
 * responses by command tag.
 *
 * HOW IT WORKS :
 * - One `RealTimeApp` per entry, in configuration order, looked up by socket
 * - Each entry carries optional hooks; a missing hook means "not handled"
 * - First byte of every response is the command tag, the payload depends on it
 * - Tag 3 carries NUL-terminated JSON, validated before it leaves the table
 *
 * FAILURES :
 * Send/receive errors are logged and recorded in `LastFault`, they never stop
 * the loop. Only a bad configuration or a failed init aborts.
 *
 * IN RTCORE :
 * 🎯 Hardware limit : the MT3620 has two real-time cores, never more entries
 * 🎯 Fail fast : init stops at the first app that cannot be opened
 * 🎯 Pluggable decoders : ALS-PT19 and Grove GPS blocks through raw-data hooks
 *
 * EXAMPLE EXCHANGE :
 * ```text
 * A7 -> M4   [02 00 00 00 00 00 00 00]            read sensor
 * M4 -> A7   [02 00 00 00 rate lux ...]            raw data (24 byte ALS block)
 * A7 -> M4   [03 00 00 00 00 00 00 00]            read sensor, reply telemetry
 * M4 -> A7   [03 {"light_intensity":43.92} 00]    telemetry
 * ```
 */

use super::app::{send_command, InitOptions, RealTimeApp};
use super::command::{CommandBlock, InterCoreCmd, Response, MAX_RT_MESSAGE_SIZE};
use super::sensors::SensorCache;
use super::transport::{IntercoreTransport, SocketHandle, TransportError};
use crate::fault::{FaultCode, LastFault};
use serde_json::Value;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// MT3620: two real-time cores.
pub const MAX_REAL_TIME_APPS: usize = 2;

pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{count} real-time apps configured, the platform supports at most {max}")]
    TooManyApps { count: usize, max: usize },
    #[error("{name}: {source}")]
    Transport {
        name: String,
        #[source]
        source: TransportError,
    },
    #[error("{0} is already connected")]
    AlreadyConnected(String),
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_apps: usize,
    pub receive_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_apps: MAX_REAL_TIME_APPS,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

/// What a response turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// Validated JSON text, to be forwarded to the cloud.
    Telemetry(String),
    SampleRateAck(u32),
    RawData { app: String, report: Option<Value> },
    Heartbeat,
    /// Dropped: bad JSON, unknown socket, missing hook or undecodable block.
    Discarded,
    Unknown(u8),
}

pub struct DispatchTable {
    apps: Vec<RealTimeApp>,
    settings: DispatchSettings,
    link: Box<dyn IntercoreTransport>,
    sensors: SensorCache,
    faults: LastFault,
}

impl DispatchTable {
    pub fn new(
        apps: Vec<RealTimeApp>,
        link: Box<dyn IntercoreTransport>,
        settings: DispatchSettings,
        faults: LastFault,
    ) -> Self {
        Self {
            apps,
            settings,
            link,
            sensors: SensorCache::default(),
            faults,
        }
    }

    pub fn apps(&self) -> &[RealTimeApp] {
        &self.apps
    }

    pub fn sensors(&self) -> &SensorCache {
        &self.sensors
    }

    /// Runs every init hook. Stops at the first failure.
    pub fn initialize(&mut self) -> Result<(), DispatchError> {
        // never above the board, whatever the settings say
        let max = self.settings.max_apps.min(MAX_REAL_TIME_APPS);
        if self.apps.len() > max {
            return Err(DispatchError::TooManyApps {
                count: self.apps.len(),
                max,
            });
        }

        for app in self.apps.iter_mut() {
            let options = InitOptions {
                receive_timeout: self.settings.receive_timeout,
                register_for_input: app.hooks.response.is_some(),
                faults: self.faults.clone(),
            };
            let Some(init) = app.hooks.init.as_mut() else {
                debug!("{} has no init hook", app.endpoint.name);
                continue;
            };

            if let Err(e) = init.init(&mut app.endpoint, self.link.as_mut(), &options) {
                error!("init of {} failed: {}", app.endpoint.name, e);
                if matches!(e, DispatchError::Transport { .. }) {
                    self.faults.record(FaultCode::OpenRtSocket);
                }
                return Err(e);
            }
        }

        info!("{} real-time apps initialized", self.apps.len());
        Ok(())
    }

    pub fn shutdown(&mut self) {
        for app in self.apps.iter_mut() {
            if let Some(cleanup) = app.hooks.cleanup.as_mut() {
                cleanup.cleanup(&mut app.endpoint, self.link.as_mut());
            }
        }
    }

    pub fn find_by_socket(&self, socket: SocketHandle) -> Option<usize> {
        self.apps.iter().position(|app| app.socket() == Some(socket))
    }

    /// Handles bytes read from an intercore socket.
    pub fn on_response(&mut self, socket: SocketHandle, bytes: &[u8]) -> Dispatched {
        let bytes = &bytes[..bytes.len().min(MAX_RT_MESSAGE_SIZE)];
        let index = self.find_by_socket(socket);

        let decoded = match index.and_then(|i| self.apps[i].hooks.response.as_mut()) {
            Some(hook) => hook.decode(bytes),
            None => Response::decode(bytes),
        };
        let response = match decoded {
            Ok(response) => response,
            Err(e) => {
                warn!("undecodable response on {}: {}", socket, e);
                return Dispatched::Discarded;
            }
        };

        match response {
            Response::Telemetry(text) => telemetry_text(text),

            Response::SampleRateAck(seconds) => {
                info!("real-time app sample rate set to {} seconds", seconds);
                Dispatched::SampleRateAck(seconds)
            }

            Response::RawData(block) => {
                let Some(i) = index else {
                    debug!("raw data from unregistered socket {}", socket);
                    return Dispatched::Discarded;
                };
                let app = &mut self.apps[i];
                let Some(hook) = app.hooks.raw_data.as_mut() else {
                    debug!("{} has no raw data handler", app.endpoint.name);
                    return Dispatched::Discarded;
                };
                match hook.on_raw_data(block, &mut self.sensors) {
                    Ok(report) => Dispatched::RawData {
                        app: app.endpoint.name.clone(),
                        report,
                    },
                    Err(e) => {
                        warn!("{}: bad raw data block: {}", app.endpoint.name, e);
                        Dispatched::Discarded
                    }
                }
            }

            Response::Heartbeat => {
                debug!("real-time app on {} responded with heartbeat", socket);
                Dispatched::Heartbeat
            }

            Response::Unknown(tag) => {
                warn!("unknown response (tag {}) from real-time app on {}", tag, socket);
                Dispatched::Unknown(tag)
            }
        }
    }

    /// Event-layer report of a failed receive.
    pub fn on_receive_error(&mut self, socket: SocketHandle, err: &io::Error) {
        let name = self
            .find_by_socket(socket)
            .map(|i| self.apps[i].endpoint.name.as_str())
            .unwrap_or("unregistered socket");
        error!("unable to receive from {} ({}): {}", name, socket, err);
        self.faults.record(FaultCode::ReadRtSocket);
    }

    /// Sends read-sensor to every app that can decode the raw answer.
    pub fn request_raw_data(&mut self) {
        for app in &self.apps {
            if app.hooks.raw_data.is_none() {
                continue;
            }
            let Some(socket) = app.socket() else {
                debug!("{} not connected, raw data request skipped", app.endpoint.name);
                continue;
            };
            if let Err(e) = send_command(self.link.as_mut(), socket, CommandBlock::new(InterCoreCmd::ReadSensor)) {
                warn!("{}: {}", app.endpoint.name, e);
                self.faults.record(FaultCode::WriteRtSocket);
            }
        }
    }

    pub fn request_telemetry(&mut self) {
        for app in self.apps.iter_mut() {
            if let Some(hook) = app.hooks.telemetry_request.as_mut() {
                if let Err(e) = hook.request(&app.endpoint, self.link.as_mut()) {
                    warn!("{}: telemetry request failed: {}", app.endpoint.name, e);
                    self.faults.record(FaultCode::WriteRtSocket);
                }
            }
        }
    }

    /// Broadcasts a new automatic telemetry interval; 0 stops it on the peer.
    pub fn set_sample_interval(&mut self, seconds: u32) {
        let block = CommandBlock::set_sample_rate(seconds);
        for app in &self.apps {
            let Some(socket) = app.socket() else {
                debug!("{} not connected, sample rate not sent", app.endpoint.name);
                continue;
            };
            if let Err(e) = send_command(self.link.as_mut(), socket, block) {
                warn!("{}: {}", app.endpoint.name, e);
                self.faults.record(FaultCode::WriteRtSocket);
            }
        }
    }
}

fn telemetry_text(text: &[u8]) -> Dispatched {
    let Ok(text) = std::str::from_utf8(text) else {
        warn!("telemetry from real-time app is not UTF-8, dropped");
        return Dispatched::Discarded;
    };
    match serde_json::from_str::<Value>(text) {
        Ok(_) => {
            debug!("RX: {}", text);
            Dispatched::Telemetry(text.to_string())
        }
        Err(e) => {
            warn!("cannot parse real-time app telemetry as JSON: {}", e);
            Dispatched::Discarded
        }
    }
}
