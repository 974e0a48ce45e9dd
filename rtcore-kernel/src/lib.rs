//! rtcore kernel: bridges real-time (M4) applications and an Avnet IoT Connect
//! device on Azure IoT Hub.
//!
//! - [`intercore`]: wire format, app descriptors, dispatch table, unix transport
//! - [`iotconnect`]: handshake, session persistence, telemetry envelope
//! - [`cloud`]: IoT Hub MQTT link
//! - [`gateway`]: routing between the two sides

pub mod cloud;
pub mod config;
pub mod fault;
pub mod gateway;
pub mod intercore;
pub mod iotconnect;

pub use cloud::{CloudError, CloudEvent, CloudLink, MqttCloudLink};
pub use config::{load_config, ConfigError, RtcoreConfig};
pub use fault::{FaultCode, LastFault};
pub use gateway::{Gateway, GatewayOptions};
