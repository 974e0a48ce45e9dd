//! Cloud transport: IoT Hub over MQTT.
//!
//! The kernel only needs three things from the hub: publish telemetry, patch
//! reported properties, and receive cloud-to-device / desired-property
//! messages. Publishing never blocks the event loop (`try_publish`).

use crate::config::CloudConf;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("cloud link not connected")]
    NotConnected,
    #[error("MQTT request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait CloudLink {
    /// True when a telemetry send has a chance to go through.
    fn is_ready(&self) -> bool;

    fn send_telemetry(&mut self, payload: &str) -> Result<(), CloudError>;

    fn report_state(&mut self, patch: &Value) -> Result<(), CloudError>;
}

/// What the event loop should do with an MQTT event.
#[derive(Debug, Clone, PartialEq)]
pub enum CloudEvent {
    Connected,
    Disconnected,
    /// Cloud-to-device message payload.
    Message(Vec<u8>),
    DesiredProperties(Value),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubTopics {
    pub telemetry: String,
    pub c2d_filter: String,
    c2d_prefix: String,
    pub desired_filter: String,
    desired_prefix: String,
    pub twin_response_filter: String,
    reported_prefix: String,
}

impl HubTopics {
    pub fn for_device(device_id: &str) -> Self {
        let c2d_prefix = format!("devices/{device_id}/messages/devicebound/");
        let desired_prefix = "$iothub/twin/PATCH/properties/desired/".to_string();
        Self {
            telemetry: format!("devices/{device_id}/messages/events/"),
            c2d_filter: format!("{c2d_prefix}#"),
            c2d_prefix,
            desired_filter: format!("{desired_prefix}#"),
            desired_prefix,
            twin_response_filter: "$iothub/twin/res/#".to_string(),
            reported_prefix: "$iothub/twin/PATCH/properties/reported/".to_string(),
        }
    }

    pub fn reported(&self, request_id: u32) -> String {
        format!("{}?$rid={}", self.reported_prefix, request_id)
    }

    pub fn is_c2d(&self, topic: &str) -> bool {
        topic.starts_with(&self.c2d_prefix)
    }

    pub fn is_desired(&self, topic: &str) -> bool {
        topic.starts_with(&self.desired_prefix)
    }
}

pub struct MqttCloudLink {
    client: AsyncClient,
    topics: HubTopics,
    connected: bool,
    request_id: u32,
}

impl MqttCloudLink {
    pub fn new(cfg: &CloudConf) -> (Self, EventLoop) {
        let mut opts = MqttOptions::new(&cfg.device_id, &cfg.host, cfg.port);
        opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
        opts.set_clean_session(true);
        if let Some(username) = &cfg.username {
            opts.set_credentials(username, cfg.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(opts, 32);
        let link = Self {
            client,
            topics: HubTopics::for_device(&cfg.device_id),
            connected: false,
            request_id: 0,
        };
        (link, eventloop)
    }

    pub fn topics(&self) -> &HubTopics {
        &self.topics
    }

    /// Sorts an MQTT event and keeps the connection flag current.
    ///
    /// Subscriptions are (re)queued on every accepted connection since the
    /// session is clean.
    pub fn classify(&mut self, event: &Event) -> CloudEvent {
        match event {
            Event::Incoming(Incoming::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
                self.connected = true;
                self.subscribe();
                info!("connected to IoT Hub");
                CloudEvent::Connected
            }
            Event::Incoming(Incoming::ConnAck(ack)) => {
                warn!("IoT Hub refused connection: {:?}", ack.code);
                self.connected = false;
                CloudEvent::Disconnected
            }
            Event::Incoming(Incoming::Disconnect) => {
                self.mark_disconnected();
                CloudEvent::Disconnected
            }
            Event::Incoming(Incoming::Publish(publish)) if self.topics.is_c2d(&publish.topic) => {
                CloudEvent::Message(publish.payload.to_vec())
            }
            Event::Incoming(Incoming::Publish(publish)) if self.topics.is_desired(&publish.topic) => {
                match serde_json::from_slice::<Value>(&publish.payload) {
                    Ok(desired) => CloudEvent::DesiredProperties(desired),
                    Err(e) => {
                        warn!("desired properties are not JSON: {}", e);
                        CloudEvent::Other
                    }
                }
            }
            Event::Incoming(Incoming::Publish(publish)) => {
                debug!("ignoring message on {}", publish.topic);
                CloudEvent::Other
            }
            _ => CloudEvent::Other,
        }
    }

    pub fn mark_disconnected(&mut self) {
        if self.connected {
            warn!("IoT Hub connection lost");
        }
        self.connected = false;
    }

    fn subscribe(&self) {
        for filter in [
            &self.topics.c2d_filter,
            &self.topics.desired_filter,
            &self.topics.twin_response_filter,
        ] {
            if let Err(e) = self.client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                warn!("subscribe to {} failed: {}", filter, e);
            }
        }
    }
}

impl CloudLink for MqttCloudLink {
    fn is_ready(&self) -> bool {
        self.connected
    }

    fn send_telemetry(&mut self, payload: &str) -> Result<(), CloudError> {
        if !self.connected {
            return Err(CloudError::NotConnected);
        }
        self.client.try_publish(
            self.topics.telemetry.as_str(),
            QoS::AtLeastOnce,
            false,
            payload.as_bytes().to_vec(),
        )?;
        debug!("telemetry queued ({} bytes)", payload.len());
        Ok(())
    }

    fn report_state(&mut self, patch: &Value) -> Result<(), CloudError> {
        if !self.connected {
            return Err(CloudError::NotConnected);
        }
        self.request_id = self.request_id.wrapping_add(1);
        let payload = serde_json::to_vec(patch)?;
        self.client
            .try_publish(self.topics.reported(self.request_id), QoS::AtLeastOnce, false, payload)?;
        debug!("reported state queued: {}", patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Publish};

    fn test_config() -> CloudConf {
        CloudConf {
            device_id: "dev-1".into(),
            ..CloudConf::default()
        }
    }

    #[test]
    fn test_hub_topics() {
        let topics = HubTopics::for_device("dev-1");
        assert_eq!(topics.telemetry, "devices/dev-1/messages/events/");
        assert_eq!(topics.c2d_filter, "devices/dev-1/messages/devicebound/#");
        assert_eq!(topics.reported(7), "$iothub/twin/PATCH/properties/reported/?$rid=7");
        assert!(topics.is_c2d("devices/dev-1/messages/devicebound/%24.to=x"));
        assert!(!topics.is_c2d("devices/dev-2/messages/devicebound/"));
        assert!(topics.is_desired("$iothub/twin/PATCH/properties/desired/?$version=3"));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (mut link, _eventloop) = MqttCloudLink::new(&test_config());
        assert!(!link.is_ready());
        assert!(matches!(link.send_telemetry("{}"), Err(CloudError::NotConnected)));
    }

    #[tokio::test]
    async fn test_classify_events() {
        let (mut link, _eventloop) = MqttCloudLink::new(&test_config());

        let ack = Event::Incoming(Incoming::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        }));
        assert_eq!(link.classify(&ack), CloudEvent::Connected);
        assert!(link.is_ready());

        let c2d = Event::Incoming(Incoming::Publish(Publish::new(
            "devices/dev-1/messages/devicebound/",
            QoS::AtLeastOnce,
            br#"{"d":{}}"#.to_vec(),
        )));
        assert_eq!(link.classify(&c2d), CloudEvent::Message(br#"{"d":{}}"#.to_vec()));

        let desired = Event::Incoming(Incoming::Publish(Publish::new(
            "$iothub/twin/PATCH/properties/desired/?$version=2",
            QoS::AtLeastOnce,
            br#"{"realTimeAutoTelemetryInterval":30}"#.to_vec(),
        )));
        match link.classify(&desired) {
            CloudEvent::DesiredProperties(v) => assert_eq!(v["realTimeAutoTelemetryInterval"], 30),
            other => panic!("unexpected event: {:?}", other),
        }

        link.mark_disconnected();
        assert!(!link.is_ready());
    }
}
