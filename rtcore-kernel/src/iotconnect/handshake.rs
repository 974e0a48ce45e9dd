//! Parsing of the IoT Connect "first response".
//!
//! ```json
//! {"d": {"ec": 0, "ct": 200,
//!        "dtg": "b3a7d542-20ad-4397-abf3-5d7ec539fba6",
//!        "sid": "9tAyZNOIWD+1D2Qp785FDsXUmrEnGJntnAvV1uSxKSSRL4ZaLgo5UV1hRY0kTmHg",
//!        "g": "c2fbe330-8787-4dbd-87e4-9ecf58c41f6a",
//!        "has": {"d": 1, "attr": 1, "set": 1, "r": 1}}}
//! ```
//!
//! Every field is optional and checked on its own: a missing or mistyped
//! field is skipped, the rest of the message still counts.

use super::session::{truncated, HandshakeDiagnostics, GUID_LEN, SID_LEN};
use serde_json::{Map, Value};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    pub device_group: Option<String>,
    pub sid: Option<String>,
    pub device_guid: Option<String>,
    pub diagnostics: HandshakeDiagnostics,
}

pub fn parse_handshake(bytes: &[u8]) -> Result<Handshake, serde_json::Error> {
    let root: Value = serde_json::from_slice(bytes)?;

    let Some(d) = root.get("d").and_then(Value::as_object) else {
        debug!("handshake has no d object");
        return Ok(Handshake::default());
    };

    let has = d.get("has").and_then(Value::as_object);
    let has_flag = |key: &str| has.and_then(|h| int_field(h, key));

    Ok(Handshake {
        device_group: string_field(d, "dtg", GUID_LEN),
        sid: string_field(d, "sid", SID_LEN),
        device_guid: string_field(d, "g", GUID_LEN),
        diagnostics: HandshakeDiagnostics {
            ec: int_field(d, "ec"),
            ct: int_field(d, "ct"),
            has_d: has_flag("d"),
            has_attr: has_flag("attr"),
            has_set: has_flag("set"),
            has_r: has_flag("r"),
        },
    })
}

fn string_field(obj: &Map<String, Value>, key: &str, max: usize) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Some(truncated(s, max)),
        Some(other) => {
            warn!("handshake field {} is not a string: {}", key, other);
            None
        }
        None => {
            debug!("handshake field {} not found", key);
            None
        }
    }
}

fn int_field(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = obj.get(key)?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{"d":{"ec":0,"ct":200,"dtg":"b3a7d542-20ad-4397-abf3-5d7ec539fba6","sid":"9tAyZNOIWD+1D2Qp785FDsXUmrEnGJntnAvV1uSxKSSRL4ZaLgo5UV1hRY0kTmHg","g":"c2fbe330-8787-4dbd-87e4-9ecf58c41f6a","has":{"d":1,"attr":1,"set":0,"r":1}}}"#;

    #[test]
    fn test_full_handshake() {
        let hs = parse_handshake(FULL.as_bytes()).unwrap();
        assert_eq!(hs.device_group.as_deref(), Some("b3a7d542-20ad-4397-abf3-5d7ec539fba6"));
        assert_eq!(hs.device_guid.as_deref(), Some("c2fbe330-8787-4dbd-87e4-9ecf58c41f6a"));
        assert_eq!(hs.sid.as_ref().map(String::len), Some(64));
        assert_eq!(hs.diagnostics.ct, Some(200));
        assert_eq!(hs.diagnostics.has_set, Some(0));
        assert_eq!(hs.diagnostics.has_r, Some(1));
    }

    #[test]
    fn test_fields_are_truncated() {
        let long_guid = "x".repeat(50);
        let long_sid = "s".repeat(80);
        let msg = format!(r#"{{"d":{{"dtg":"{long_guid}","sid":"{long_sid}"}}}}"#);
        let hs = parse_handshake(msg.as_bytes()).unwrap();
        assert_eq!(hs.device_group.unwrap().len(), GUID_LEN);
        assert_eq!(hs.sid.unwrap().len(), SID_LEN);
    }

    #[test]
    fn test_mistyped_field_is_skipped_alone() {
        let hs = parse_handshake(br#"{"d":{"dtg":42,"sid":"ABC","has":"yes"}}"#).unwrap();
        assert_eq!(hs.device_group, None);
        assert_eq!(hs.sid.as_deref(), Some("ABC"));
        assert_eq!(hs.diagnostics.has_d, None);
    }

    #[test]
    fn test_missing_d_object() {
        assert_eq!(parse_handshake(b"{}").unwrap(), Handshake::default());
        assert_eq!(parse_handshake(br#"{"d":[1,2]}"#).unwrap(), Handshake::default());
    }

    #[test]
    fn test_malformed_json() {
        assert!(parse_handshake(b"{\"d\":").is_err());
    }
}
