//! IoT Connect message formats: timestamps, hello and telemetry envelope.

use super::session::{GUID_LEN, SID_LEN};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use thiserror::Error;

/// `YYYY-MM-DDTHH:MM:SS.0000000Z`
pub const TIMESTAMP_LEN: usize = 28;

/// Length of `{"sid":"","dtg":"","mt":0,"dt":"","d":[{"d":}]}`.
pub const ENVELOPE_SKELETON_LEN: usize = 47;

/// Worst-case bytes the envelope adds around the original telemetry.
pub const TELEMETRY_OVERHEAD: usize = ENVELOPE_SKELETON_LEN + SID_LEN + GUID_LEN + TIMESTAMP_LEN;

/// Message type of the hello/liveness message.
pub const MT_HELLO: u16 = 200;
pub const MT_TELEMETRY: u16 = 0;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("initial IoT Connect handshake not received yet")]
    NotConnected,
    #[error("target buffer too small: need {required} bytes, have {available}")]
    BufferTooSmall { required: usize, available: usize },
    #[error("telemetry is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("serialization failed: {0}")]
    Json(#[source] serde_json::Error),
}

/// UTC time with the fixed fractional part IoT Connect expects.
pub fn iotc_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S.0000000Z").to_string()
}

#[derive(Serialize)]
struct Hello<'a> {
    t: &'a str,
    mt: u16,
    sid: &'a str,
}

#[derive(Serialize)]
struct Envelope<'a> {
    sid: &'a str,
    dtg: &'a str,
    mt: u16,
    dt: &'a str,
    d: [Entry<'a>; 1],
}

#[derive(Serialize)]
struct Entry<'a> {
    d: &'a RawValue,
}

/// `{"t":"<ts>","mt":200,"sid":"<sid>"}`
pub fn hello_message(sid: &str, now: DateTime<Utc>) -> Result<String, EnvelopeError> {
    let t = iotc_timestamp(now);
    serde_json::to_string(&Hello {
        t: &t,
        mt: MT_HELLO,
        sid,
    })
    .map_err(EnvelopeError::Json)
}

/// Embeds `original` verbatim in the telemetry envelope.
pub fn build_envelope(sid: &str, dtg: &str, original: &str, now: DateTime<Utc>) -> Result<String, EnvelopeError> {
    let payload: &RawValue = serde_json::from_str(original).map_err(EnvelopeError::InvalidJson)?;
    let dt = iotc_timestamp(now);
    serde_json::to_string(&Envelope {
        sid,
        dtg,
        mt: MT_TELEMETRY,
        dt: &dt,
        d: [Entry { d: payload }],
    })
    .map_err(EnvelopeError::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 23, 15, 27, 33).unwrap()
    }

    #[test]
    fn test_timestamp_format() {
        let ts = iotc_timestamp(fixed_now());
        assert_eq!(ts, "2020-06-23T15:27:33.0000000Z");
        assert_eq!(ts.len(), TIMESTAMP_LEN);
    }

    #[test]
    fn test_hello_message() {
        let hello = hello_message("SID1", fixed_now()).unwrap();
        assert_eq!(hello, r#"{"t":"2020-06-23T15:27:33.0000000Z","mt":200,"sid":"SID1"}"#);
    }

    #[test]
    fn test_envelope_layout() {
        let env = build_envelope("S", "G", r#"{"temp": 21.5}"#, fixed_now()).unwrap();
        assert_eq!(
            env,
            r#"{"sid":"S","dtg":"G","mt":0,"dt":"2020-06-23T15:27:33.0000000Z","d":[{"d":{"temp": 21.5}}]}"#
        );
    }

    #[test]
    fn test_skeleton_length() {
        let env = build_envelope("", "", "{}", fixed_now()).unwrap();
        assert_eq!(env.len(), ENVELOPE_SKELETON_LEN + TIMESTAMP_LEN + 2);
    }

    #[test]
    fn test_envelope_rejects_invalid_json() {
        let err = build_envelope("S", "G", "{not json", fixed_now()).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidJson(_)));
    }
}
