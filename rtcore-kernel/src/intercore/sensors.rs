//! Raw sensor blocks of the stock real-time apps and their decoders.

use super::app::RawDataHook;
use super::command::{read_u32, DecodeError, InterCoreCmd};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Latest readings collected from the real-time apps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SensorCache {
    pub light: Option<LightReading>,
    pub gps: Option<GpsReading>,
    /// Last position pushed to the cloud.
    pub last_location: Option<Location>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// ALS-PT19 light sensor block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LightReading {
    pub sample_rate: u32,
    pub sensor_data: u32,
    pub lux: f64,
}

impl LightReading {
    pub const BLOCK_LEN: usize = 24;

    pub fn decode(block: &[u8]) -> Result<Self, DecodeError> {
        check_len("ALS-PT19", block, Self::BLOCK_LEN)?;
        Ok(Self {
            sample_rate: read_u32(block, 4),
            sensor_data: read_u32(block, 8),
            lux: read_f64(block, 16),
        })
    }

    pub fn encode(&self) -> [u8; Self::BLOCK_LEN] {
        let mut out = [0u8; Self::BLOCK_LEN];
        out[0] = InterCoreCmd::ReadSensor.tag();
        out[4..8].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[8..12].copy_from_slice(&self.sensor_data.to_le_bytes());
        out[16..24].copy_from_slice(&self.lux.to_le_bytes());
        out
    }
}

/// Grove GPS block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsReading {
    pub sample_rate: u32,
    pub lat: f64,
    pub lon: f64,
    pub fix_qual: i32,
    pub num_sats: i32,
    pub horizontal_dilution: f32,
    pub alt: f32,
}

impl GpsReading {
    pub const BLOCK_LEN: usize = 40;

    pub fn decode(block: &[u8]) -> Result<Self, DecodeError> {
        check_len("Grove GPS", block, Self::BLOCK_LEN)?;
        Ok(Self {
            sample_rate: read_u32(block, 4),
            lat: read_f64(block, 8),
            lon: read_f64(block, 16),
            fix_qual: read_u32(block, 24) as i32,
            num_sats: read_u32(block, 28) as i32,
            horizontal_dilution: f32::from_bits(read_u32(block, 32)),
            alt: f32::from_bits(read_u32(block, 36)),
        })
    }

    pub fn encode(&self) -> [u8; Self::BLOCK_LEN] {
        let mut out = [0u8; Self::BLOCK_LEN];
        out[0] = InterCoreCmd::ReadSensor.tag();
        out[4..8].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[8..16].copy_from_slice(&self.lat.to_le_bytes());
        out[16..24].copy_from_slice(&self.lon.to_le_bytes());
        out[24..28].copy_from_slice(&self.fix_qual.to_le_bytes());
        out[28..32].copy_from_slice(&self.num_sats.to_le_bytes());
        out[32..36].copy_from_slice(&self.horizontal_dilution.to_le_bytes());
        out[36..40].copy_from_slice(&self.alt.to_le_bytes());
        out
    }

    /// All-zero position means the GPS module is not plugged in or has no data.
    pub fn is_empty(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0 && self.alt == 0.0
    }
}

pub struct AlsPt19Decoder;

impl RawDataHook for AlsPt19Decoder {
    fn on_raw_data(&mut self, block: &[u8], sensors: &mut SensorCache) -> Result<Option<Value>, DecodeError> {
        let reading = LightReading::decode(block)?;
        debug!("light sensor data: {}, lux: {:.2}", reading.sensor_data, reading.lux);
        sensors.light = Some(reading);
        Ok(None)
    }
}

pub struct GroveGpsDecoder;

impl RawDataHook for GroveGpsDecoder {
    fn on_raw_data(&mut self, block: &[u8], sensors: &mut SensorCache) -> Result<Option<Value>, DecodeError> {
        let mut reading = GpsReading::decode(block)?;
        debug!(
            "gps raw data: fix_qual {}, sats {}, lat {}, lon {}, alt {:.2}",
            reading.fix_qual, reading.num_sats, reading.lat, reading.lon, reading.alt
        );

        if reading.is_empty() {
            // keep consumers from taking the stale position for a real fix
            if let Some(last) = sensors.last_location {
                reading.lat = last.lat;
                reading.lon = last.lon;
            }
            reading.fix_qual = 0;
            reading.num_sats = 0;
            reading.horizontal_dilution = 10.0;
        }
        sensors.gps = Some(reading);

        let moved = match sensors.last_location {
            Some(last) => last.lat != reading.lat && last.lon != reading.lon,
            None => true,
        };
        if !moved || reading.lat == 0.0 || reading.lon == 0.0 {
            return Ok(None);
        }

        sensors.last_location = Some(Location {
            lat: reading.lat,
            lon: reading.lon,
        });
        info!("device location changed: {:.6}, {:.6}", reading.lat, reading.lon);

        Ok(Some(json!({
            "DeviceLocation": {
                "lat": reading.lat,
                "lon": reading.lon,
                "alt": reading.alt,
            },
            "numSat": reading.num_sats,
            "fix_qual": reading.fix_qual,
            "horiz_dilution": reading.horizontal_dilution,
        })))
    }
}

fn check_len(kind: &'static str, block: &[u8], need: usize) -> Result<(), DecodeError> {
    if block.len() < need {
        return Err(DecodeError::Truncated {
            kind,
            got: block.len(),
            need,
        });
    }
    Ok(())
}

fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    f64::from_le_bytes(raw)
}
