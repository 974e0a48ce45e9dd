//! IoT Connect session tracking and telemetry wrapping.

use super::envelope::{build_envelope, hello_message, EnvelopeError, TELEMETRY_OVERHEAD};
use super::handshake::parse_handshake;
use super::session::CloudSession;
use super::store::{SessionStore, StorageError};
use crate::cloud::CloudLink;
use crate::fault::{FaultCode, LastFault};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long to wait for the first IoT Connect response before saying hello again.
pub const DEFAULT_HELLO_PERIOD: Duration = Duration::from_secs(15);

pub struct IotConnectAdapter {
    session: CloudSession,
    store: Box<dyn SessionStore>,
    hello_period: Duration,
    hello_armed: bool,
    faults: LastFault,
}

impl IotConnectAdapter {
    pub fn new(store: Box<dyn SessionStore>, hello_period: Duration, faults: LastFault) -> Self {
        Self {
            session: CloudSession::default(),
            store,
            hello_period,
            hello_armed: false,
            faults,
        }
    }

    /// Restores the persisted session id. An empty slot leaves it blank.
    pub fn load_session(&mut self) {
        match self.store.load() {
            Ok(Some(sid)) => {
                debug!("restored IoT Connect sid ({} chars)", sid.len());
                self.session.sid = sid;
            }
            Ok(None) => debug!("no IoT Connect sid stored yet"),
            Err(e) => {
                warn!("{}", e);
                self.faults.record(storage_fault(&e));
            }
        }
    }

    pub fn session(&self) -> &CloudSession {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.session.connected
    }

    pub fn hello_period(&self) -> Duration {
        self.hello_period
    }

    pub fn hello_armed(&self) -> bool {
        self.hello_armed
    }

    /// Call on every (re)connection to the hub.
    pub fn on_connected_to_cloud(&mut self, cloud: &mut dyn CloudLink) {
        // a reconnect invalidates the previous handshake
        self.session.connected = false;
        self.send_hello(cloud);
        self.hello_armed = true;
        info!("waiting for IoT Connect handshake (hello every {}s)", self.hello_period.as_secs());
    }

    pub fn on_timer_tick(&mut self, cloud: &mut dyn CloudLink) {
        if !self.hello_armed || self.session.connected {
            return;
        }
        if !cloud.is_ready() {
            debug!("cloud link not ready, hello postponed");
            return;
        }
        debug!("no IoT Connect response yet, resending hello");
        self.send_hello(cloud);
    }

    /// Consumes a cloud-to-device message. Returns false when it was not JSON.
    pub fn on_cloud_message(&mut self, bytes: &[u8]) -> bool {
        let handshake = match parse_handshake(bytes) {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!("cannot parse cloud message as JSON: {}", e);
                return false;
            }
        };

        if let Some(dtg) = handshake.device_group {
            self.session.device_group = dtg;
        }
        if let Some(g) = handshake.device_guid {
            self.session.device_guid = g;
        }
        if let Some(sid) = handshake.sid {
            if sid != self.session.sid {
                debug!("sid changed, persisting");
                if let Err(e) = self.store.store(&sid) {
                    warn!("{}", e);
                    self.faults.record(storage_fault(&e));
                }
                self.session.sid = sid;
            }
        }

        debug!("handshake diagnostics: {:?}", handshake.diagnostics);
        self.session.diagnostics = handshake.diagnostics;

        if !self.session.connected {
            info!("IoT Connect handshake received (dtg {})", self.session.device_group);
        }
        self.session.connected = true;
        true
    }

    /// Wraps `original` in the IoT Connect envelope.
    ///
    /// `capacity` is the size of the buffer the caller is ready to send; it
    /// must hold `original.len() + TELEMETRY_OVERHEAD` bytes.
    pub fn wrap_telemetry(&self, original: &str, capacity: usize) -> Result<String, EnvelopeError> {
        self.wrap_telemetry_at(original, capacity, Utc::now())
    }

    pub fn wrap_telemetry_at(
        &self,
        original: &str,
        capacity: usize,
        now: DateTime<Utc>,
    ) -> Result<String, EnvelopeError> {
        if !self.session.connected {
            debug!("IoT Connect handshake not received, telemetry not wrapped");
            return Err(EnvelopeError::NotConnected);
        }

        let required = original.len() + TELEMETRY_OVERHEAD;
        if required > capacity {
            warn!(
                "telemetry of {} bytes needs a {} byte buffer, only {} available",
                original.len(),
                required,
                capacity
            );
            return Err(EnvelopeError::BufferTooSmall {
                required,
                available: capacity,
            });
        }

        let wrapped = build_envelope(&self.session.sid, &self.session.device_group, original, now)?;
        if wrapped.len() > capacity {
            return Err(EnvelopeError::BufferTooSmall {
                required: wrapped.len(),
                available: capacity,
            });
        }
        Ok(wrapped)
    }

    fn send_hello(&mut self, cloud: &mut dyn CloudLink) {
        let hello = match hello_message(&self.session.sid, Utc::now()) {
            Ok(hello) => hello,
            Err(e) => {
                warn!("cannot build hello message: {}", e);
                return;
            }
        };
        if let Err(e) = cloud.send_telemetry(&hello) {
            warn!("hello not sent: {}", e);
            self.faults.record(FaultCode::CloudSend);
        }
    }
}

fn storage_fault(err: &StorageError) -> FaultCode {
    match err {
        StorageError::Open { .. } => FaultCode::OpenMutableFile,
        StorageError::Read(_) => FaultCode::ReadMutableFile,
        StorageError::Write(_) => FaultCode::WriteMutableFile,
    }
}
