/**
 * GATEWAY - Composition root of the kernel
 *
 * ROLE :
 * Owns the dispatch table, the IoT Connect adapter and the cloud link.
 * Routes real-time telemetry to the cloud, raw sensor reports to the device
 * twin, and cloud events back to the adapter or the real-time apps.
 *
 * HOW IT WORKS :
 * - Intercore event -> dispatch table -> telemetry, twin patch or nothing
 * - Telemetry -> GPS substitution -> IoT Connect envelope (when enabled) -> hub
 * - Hub connect -> fresh hello, handshake message -> new session
 * - Desired `realTimeAutoTelemetryInterval` -> every app, then reported back
 *
 * Everything runs on the single event-loop task; no locking. Timers and
 * sockets live in main.rs, the gateway only reacts to what they produce,
 * so the tests drive it directly with the devkit mocks.
 */

use crate::cloud::{CloudEvent, CloudLink};
use crate::config::RtcoreConfig;
use crate::fault::{FaultCode, LastFault};
use crate::intercore::{DispatchError, DispatchTable, Dispatched, IntercoreEvent, SensorCache};
use crate::iotconnect::IotConnectAdapter;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Desired twin property driving the real-time apps' automatic telemetry.
pub const AUTO_TELEMETRY_PROPERTY: &str = "realTimeAutoTelemetryInterval";

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub iotconnect_enabled: bool,
    pub telemetry_buffer_size: usize,
    pub substitute_missing_gps: bool,
    pub auto_telemetry_interval: Option<u32>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            iotconnect_enabled: true,
            telemetry_buffer_size: 512,
            substitute_missing_gps: true,
            auto_telemetry_interval: None,
        }
    }
}

impl From<&RtcoreConfig> for GatewayOptions {
    fn from(cfg: &RtcoreConfig) -> Self {
        Self {
            iotconnect_enabled: cfg.iotconnect.enabled,
            telemetry_buffer_size: cfg.iotconnect.telemetry_buffer_size,
            substitute_missing_gps: cfg.telemetry.substitute_missing_gps,
            auto_telemetry_interval: cfg.telemetry.auto_telemetry_interval_secs,
        }
    }
}

pub struct Gateway<C: CloudLink> {
    dispatch: DispatchTable,
    iotc: IotConnectAdapter,
    cloud: C,
    options: GatewayOptions,
    faults: LastFault,
}

impl<C: CloudLink> Gateway<C> {
    pub fn new(
        dispatch: DispatchTable,
        iotc: IotConnectAdapter,
        cloud: C,
        options: GatewayOptions,
        faults: LastFault,
    ) -> Self {
        Self {
            dispatch,
            iotc,
            cloud,
            options,
            faults,
        }
    }

    pub fn dispatch(&self) -> &DispatchTable {
        &self.dispatch
    }

    pub fn iotconnect(&self) -> &IotConnectAdapter {
        &self.iotc
    }

    pub fn cloud(&self) -> &C {
        &self.cloud
    }

    pub fn cloud_mut(&mut self) -> &mut C {
        &mut self.cloud
    }

    pub fn faults(&self) -> &LastFault {
        &self.faults
    }

    /// Restores the IoT Connect session and opens the real-time apps.
    pub fn start(&mut self) -> Result<(), DispatchError> {
        if self.options.iotconnect_enabled {
            self.iotc.load_session();
        }
        self.dispatch.initialize()?;
        if let Some(seconds) = self.options.auto_telemetry_interval {
            info!("real-time apps auto telemetry every {}s", seconds);
            self.dispatch.set_sample_interval(seconds);
        }
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.dispatch.shutdown();
    }

    pub fn handle_intercore(&mut self, event: IntercoreEvent) {
        match event {
            IntercoreEvent::Message { socket, bytes } => {
                let outcome = self.dispatch.on_response(socket, &bytes);
                self.route(outcome);
            }
            IntercoreEvent::Failed { socket, error } => self.dispatch.on_receive_error(socket, &error),
        }
    }

    pub fn on_cloud_event(&mut self, event: CloudEvent) {
        match event {
            CloudEvent::Connected => {
                if self.options.iotconnect_enabled {
                    self.iotc.on_connected_to_cloud(&mut self.cloud);
                }
            }
            CloudEvent::Message(bytes) => {
                if self.options.iotconnect_enabled {
                    self.iotc.on_cloud_message(&bytes);
                } else {
                    debug!("cloud message ignored ({} bytes)", bytes.len());
                }
            }
            CloudEvent::DesiredProperties(desired) => self.on_desired_properties(&desired),
            CloudEvent::Disconnected | CloudEvent::Other => {}
        }
    }

    pub fn on_desired_properties(&mut self, desired: &Value) {
        let Some(value) = desired.get(AUTO_TELEMETRY_PROPERTY) else {
            return;
        };
        let Some(seconds) = value.as_u64().and_then(|s| u32::try_from(s).ok()) else {
            warn!("{} must be a positive integer, got {}", AUTO_TELEMETRY_PROPERTY, value);
            return;
        };

        info!("{} set to {}", AUTO_TELEMETRY_PROPERTY, seconds);
        self.dispatch.set_sample_interval(seconds);
        self.report(&json!({ AUTO_TELEMETRY_PROPERTY: seconds }));
    }

    pub fn on_sensor_tick(&mut self) {
        self.dispatch.request_raw_data();
        self.dispatch.request_telemetry();
    }

    pub fn on_hello_tick(&mut self) {
        if self.options.iotconnect_enabled {
            self.iotc.on_timer_tick(&mut self.cloud);
        }
    }

    /// Forwards telemetry text to the cloud, wrapped when IoT Connect is on.
    pub fn send_telemetry(&mut self, json: &str) {
        let substituted = if self.options.substitute_missing_gps {
            substitute_missing_gps(json, self.dispatch.sensors())
        } else {
            None
        };
        let json = substituted.as_deref().unwrap_or(json);

        let message = if self.options.iotconnect_enabled {
            match self.iotc.wrap_telemetry(json, self.options.telemetry_buffer_size) {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    warn!("telemetry dropped: {}", e);
                    return;
                }
            }
        } else {
            json.to_string()
        };

        if let Err(e) = self.cloud.send_telemetry(&message) {
            warn!("telemetry not sent: {}", e);
            self.faults.record(FaultCode::CloudSend);
        }
    }

    fn route(&mut self, outcome: Dispatched) {
        match outcome {
            Dispatched::Telemetry(text) => self.send_telemetry(&text),
            Dispatched::RawData { app, report: Some(patch) } => {
                debug!("{} reported {}", app, patch);
                self.report(&patch);
            }
            _ => {}
        }
    }

    fn report(&mut self, patch: &Value) {
        if let Err(e) = self.cloud.report_state(patch) {
            warn!("reported state not sent: {}", e);
            self.faults.record(FaultCode::CloudSend);
        }
    }
}

/// Replaces the "no fix" GPS telemetry with the last known position.
pub fn substitute_missing_gps(json: &str, sensors: &SensorCache) -> Option<String> {
    let value: Value = serde_json::from_str(json).ok()?;
    let root = value.as_object()?;
    if root.len() != 1 {
        return None;
    }
    let tracking = root.get("Tracking")?.as_object()?;
    let is_zero = |key: &str| tracking.get(key).and_then(Value::as_f64) == Some(0.0);
    if tracking.len() != 3 || !(is_zero("lat") && is_zero("lon") && is_zero("alt")) {
        return None;
    }

    let (lat, lon) = sensors.last_location.map_or((0.0, 0.0), |l| (l.lat, l.lon));
    debug!("no GPS fix in telemetry, sending last known position");
    Some(format!(
        r#"{{"Tracking":{{"lat":{:.5},"lon":{:.5},"alt":0.0}}}}"#,
        lat, lon
    ))
}
