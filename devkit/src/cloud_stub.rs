/*!
Mock cloud link

Stands in for the IoT Hub MQTT link. Records telemetry and reported-state
patches; readiness and failures are switchable at runtime.
*/

use parking_lot::Mutex;
use rtcore_kernel::{CloudError, CloudLink};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct Recorder {
    ready: bool,
    failing: bool,
    telemetry: Vec<String>,
    reports: Vec<Value>,
}

#[derive(Clone, Default)]
pub struct MockCloudLink {
    inner: Arc<Mutex<Recorder>>,
}

impl MockCloudLink {
    /// A link that is connected and accepts everything.
    pub fn new() -> Self {
        let link = Self::default();
        link.set_ready(true);
        link
    }

    pub fn set_ready(&self, ready: bool) {
        self.inner.lock().ready = ready;
    }

    /// Sends return `CloudError::NotConnected` while set.
    pub fn fail_sends(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    pub fn telemetry(&self) -> Vec<String> {
        self.inner.lock().telemetry.clone()
    }

    /// Sent telemetry parsed as JSON; unparsable messages are skipped.
    pub fn telemetry_json(&self) -> Vec<Value> {
        self.telemetry()
            .iter()
            .filter_map(|t| serde_json::from_str(t).ok())
            .collect()
    }

    /// Messages with `"mt":200`.
    pub fn hellos(&self) -> Vec<Value> {
        self.telemetry_json()
            .into_iter()
            .filter(|v| v.get("mt").and_then(Value::as_u64) == Some(200))
            .collect()
    }

    pub fn reports(&self) -> Vec<Value> {
        self.inner.lock().reports.clone()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.telemetry.clear();
        inner.reports.clear();
    }
}

impl CloudLink for MockCloudLink {
    fn is_ready(&self) -> bool {
        self.inner.lock().ready
    }

    fn send_telemetry(&mut self, payload: &str) -> Result<(), CloudError> {
        let mut inner = self.inner.lock();
        if inner.failing {
            return Err(CloudError::NotConnected);
        }
        debug!("[MOCK] telemetry: {}", payload);
        inner.telemetry.push(payload.to_string());
        Ok(())
    }

    fn report_state(&mut self, patch: &Value) -> Result<(), CloudError> {
        let mut inner = self.inner.lock();
        if inner.failing {
            return Err(CloudError::NotConnected);
        }
        debug!("[MOCK] reported: {}", patch);
        inner.reports.push(patch.clone());
        Ok(())
    }
}
