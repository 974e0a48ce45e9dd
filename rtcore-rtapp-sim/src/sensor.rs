//! Simulated sensors and the command/response logic of a real-time app.

use rtcore_kernel::intercore::command::encode_telemetry;
use rtcore_kernel::intercore::{CommandBlock, GpsReading, InterCoreCmd, LightReading};
use std::str::FromStr;
use thiserror::Error;

/// Telemetry a GPS app sends when no module answers.
pub const NO_FIX_TELEMETRY: &str = r#"{"Tracking":{"lat":0.00000,"lon":0.00000,"alt": 0.00}}"#;

#[derive(Debug, Error)]
#[error("unknown sensor kind {0:?}, expected als or gps")]
pub struct UnknownKind(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Als,
    Gps,
}

impl FromStr for SensorKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "als" | "als_pt19" => Ok(SensorKind::Als),
            "gps" | "grove_gps" => Ok(SensorKind::Gps),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// What the app sends back for one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub bytes: Vec<u8>,
    /// New automatic telemetry period when the command changed it.
    pub auto_telemetry: Option<u32>,
}

impl Reply {
    fn plain(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            auto_telemetry: None,
        }
    }
}

pub struct SimSensor {
    kind: SensorKind,
    has_fix: bool,
    sample_rate: u32,
    readings: u32,
}

impl SimSensor {
    pub fn new(kind: SensorKind, has_fix: bool) -> Self {
        Self {
            kind,
            has_fix,
            sample_rate: 0,
            readings: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Answers a command block. `None` for datagrams too short to be one.
    pub fn respond(&mut self, request: &[u8]) -> Option<Reply> {
        let block = CommandBlock::decode(request).ok()?;
        let reply = match block.cmd {
            InterCoreCmd::Heartbeat => Reply::plain(CommandBlock::new(InterCoreCmd::Heartbeat).encode().to_vec()),
            InterCoreCmd::ReadSensor => Reply::plain(self.raw_block()),
            InterCoreCmd::ReadSensorRespondWithTelemetry => Reply::plain(encode_telemetry(&self.telemetry())),
            InterCoreCmd::SetSampleRate => {
                self.sample_rate = block.sample_rate;
                Reply {
                    bytes: CommandBlock::set_sample_rate(block.sample_rate).encode().to_vec(),
                    auto_telemetry: Some(block.sample_rate),
                }
            }
            InterCoreCmd::Unknown => Reply::plain(CommandBlock::new(InterCoreCmd::Unknown).encode().to_vec()),
        };
        Some(reply)
    }

    pub fn raw_block(&mut self) -> Vec<u8> {
        self.readings = self.readings.wrapping_add(1);
        match self.kind {
            SensorKind::Als => {
                let (sensor_data, lux) = self.light();
                LightReading {
                    sample_rate: self.sample_rate,
                    sensor_data,
                    lux,
                }
                .encode()
                .to_vec()
            }
            SensorKind::Gps => {
                let reading = match self.position() {
                    Some((lat, lon, alt)) => GpsReading {
                        sample_rate: self.sample_rate,
                        lat,
                        lon,
                        fix_qual: 1,
                        num_sats: 9,
                        horizontal_dilution: 0.8,
                        alt,
                    },
                    None => GpsReading {
                        sample_rate: self.sample_rate,
                        lat: 0.0,
                        lon: 0.0,
                        fix_qual: 0,
                        num_sats: 0,
                        horizontal_dilution: 0.0,
                        alt: 0.0,
                    },
                };
                reading.encode().to_vec()
            }
        }
    }

    pub fn telemetry(&mut self) -> String {
        self.readings = self.readings.wrapping_add(1);
        match self.kind {
            SensorKind::Als => {
                let (_, lux) = self.light();
                format!(r#"{{"light_intensity":{:.2}}}"#, lux)
            }
            SensorKind::Gps => match self.position() {
                Some((lat, lon, alt)) => {
                    format!(r#"{{"Tracking":{{"lat":{:.5},"lon":{:.5},"alt":{:.2}}}}}"#, lat, lon, alt)
                }
                None => NO_FIX_TELEMETRY.to_string(),
            },
        }
    }

    fn light(&self) -> (u32, f64) {
        let sensor_data = 1800 + (self.readings % 16) * 25;
        (sensor_data, f64::from(sensor_data) * 0.0244)
    }

    fn position(&self) -> Option<(f64, f64, f32)> {
        if !self.has_fix {
            return None;
        }
        let drift = f64::from(self.readings % 10) * 0.0001;
        Some((47.6205 + drift, -122.3493 - drift, 56.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtcore_kernel::intercore::Response;

    fn cmd(block: CommandBlock) -> Vec<u8> {
        block.encode().to_vec()
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("ALS".parse::<SensorKind>().unwrap(), SensorKind::Als);
        assert_eq!("grove_gps".parse::<SensorKind>().unwrap(), SensorKind::Gps);
        assert!("radar".parse::<SensorKind>().is_err());
    }

    #[test]
    fn test_heartbeat_and_unknown_echo() {
        let mut sim = SimSensor::new(SensorKind::Als, true);
        let reply = sim.respond(&cmd(CommandBlock::new(InterCoreCmd::Heartbeat))).unwrap();
        assert_eq!(Response::decode(&reply.bytes).unwrap(), Response::Heartbeat);

        let mut odd = vec![0u8; 8];
        odd[0] = 77;
        let reply = sim.respond(&odd).unwrap();
        assert_eq!(Response::decode(&reply.bytes).unwrap(), Response::Unknown(0));
        assert!(sim.respond(&[1, 0]).is_none());
    }

    #[test]
    fn test_raw_blocks_decode() {
        let mut als = SimSensor::new(SensorKind::Als, true);
        let reply = als.respond(&cmd(CommandBlock::new(InterCoreCmd::ReadSensor))).unwrap();
        let light = LightReading::decode(&reply.bytes).unwrap();
        assert!(light.sensor_data >= 1800);

        let mut gps = SimSensor::new(SensorKind::Gps, false);
        let reply = gps.respond(&cmd(CommandBlock::new(InterCoreCmd::ReadSensor))).unwrap();
        assert!(GpsReading::decode(&reply.bytes).unwrap().is_empty());
    }

    #[test]
    fn test_telemetry_is_json() {
        let mut gps = SimSensor::new(SensorKind::Gps, true);
        let reply = gps
            .respond(&cmd(CommandBlock::new(InterCoreCmd::ReadSensorRespondWithTelemetry)))
            .unwrap();
        let Response::Telemetry(text) = Response::decode(&reply.bytes).unwrap() else {
            panic!("expected telemetry");
        };
        let v: serde_json::Value = serde_json::from_slice(text).unwrap();
        assert!(v["Tracking"]["lat"].as_f64().unwrap() > 47.0);

        let mut no_fix = SimSensor::new(SensorKind::Gps, false);
        assert_eq!(no_fix.telemetry(), NO_FIX_TELEMETRY);
    }

    #[test]
    fn test_sample_rate_ack() {
        let mut sim = SimSensor::new(SensorKind::Als, true);
        let reply = sim.respond(&cmd(CommandBlock::set_sample_rate(15))).unwrap();
        assert_eq!(reply.auto_telemetry, Some(15));
        assert_eq!(Response::decode(&reply.bytes).unwrap(), Response::SampleRateAck(15));
        assert_eq!(sim.sample_rate(), 15);

        let reply = sim.respond(&cmd(CommandBlock::set_sample_rate(0))).unwrap();
        assert_eq!(reply.auto_telemetry, Some(0));
    }
}
