/*!
Builders for the bytes a real-time app or IoT Connect would send

- `BlockBuilder`: intercore responses (raw sensor blocks, telemetry, acks)
- `HandshakeBuilder`: IoT Connect first-response messages
*/

use chrono::{DateTime, TimeZone, Utc};
use rtcore_kernel::intercore::command::encode_telemetry;
use rtcore_kernel::intercore::{CommandBlock, GpsReading, InterCoreCmd, LightReading};
use serde_json::{json, Map, Value};
use uuid::Uuid;

pub struct BlockBuilder;

impl BlockBuilder {
    pub fn heartbeat() -> Vec<u8> {
        CommandBlock::new(InterCoreCmd::Heartbeat).encode().to_vec()
    }

    pub fn sample_rate_ack(seconds: u32) -> Vec<u8> {
        CommandBlock::set_sample_rate(seconds).encode().to_vec()
    }

    /// An 8-byte block with an arbitrary tag.
    pub fn with_tag(tag: u8) -> Vec<u8> {
        let mut block = vec![0u8; 8];
        block[0] = tag;
        block
    }

    /// Tag 3 followed by NUL-terminated JSON text.
    pub fn telemetry(json: &str) -> Vec<u8> {
        encode_telemetry(json)
    }

    pub fn light(sensor_data: u32, lux: f64) -> Vec<u8> {
        LightReading {
            sample_rate: 0,
            sensor_data,
            lux,
        }
        .encode()
        .to_vec()
    }

    pub fn gps(lat: f64, lon: f64, alt: f32) -> Vec<u8> {
        GpsReading {
            sample_rate: 0,
            lat,
            lon,
            fix_qual: 1,
            num_sats: 8,
            horizontal_dilution: 0.9,
            alt,
        }
        .encode()
        .to_vec()
    }

    /// What the GPS app sends with no module plugged in.
    pub fn empty_gps() -> Vec<u8> {
        Self::gps(0.0, 0.0, 0.0)
    }
}

/// Fluent builder for `{"d":{...}}` handshake messages.
#[derive(Default)]
pub struct HandshakeBuilder {
    d: Map<String, Value>,
    has: Map<String, Value>,
}

impl HandshakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A complete response with random GUIDs and the given sid.
    pub fn complete(sid: &str) -> Self {
        Self::new()
            .ec(0)
            .ct(200)
            .dtg(&Uuid::new_v4().to_string())
            .guid(&Uuid::new_v4().to_string())
            .sid(sid)
            .has("d", 1)
            .has("attr", 1)
            .has("set", 0)
            .has("r", 1)
    }

    pub fn dtg(mut self, dtg: &str) -> Self {
        self.d.insert("dtg".into(), json!(dtg));
        self
    }

    pub fn guid(mut self, g: &str) -> Self {
        self.d.insert("g".into(), json!(g));
        self
    }

    pub fn sid(mut self, sid: &str) -> Self {
        self.d.insert("sid".into(), json!(sid));
        self
    }

    pub fn ec(mut self, ec: i64) -> Self {
        self.d.insert("ec".into(), json!(ec));
        self
    }

    pub fn ct(mut self, ct: i64) -> Self {
        self.d.insert("ct".into(), json!(ct));
        self
    }

    pub fn has(mut self, flag: &str, value: i64) -> Self {
        self.has.insert(flag.into(), json!(value));
        self
    }

    /// Arbitrary field, for mistyped-value cases.
    pub fn raw(mut self, key: &str, value: Value) -> Self {
        self.d.insert(key.into(), value);
        self
    }

    pub fn build_value(&self) -> Value {
        let mut d = self.d.clone();
        if !self.has.is_empty() {
            d.insert("has".into(), Value::Object(self.has.clone()));
        }
        json!({ "d": d })
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_value().to_string().into_bytes()
    }
}

/// A fixed instant for reproducible envelopes.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 6, 23, 15, 27, 33)
        .single()
        .unwrap_or_default()
}
