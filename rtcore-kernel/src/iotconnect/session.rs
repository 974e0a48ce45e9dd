use serde::Serialize;

pub const GUID_LEN: usize = 36;
pub const SID_LEN: usize = 64;

/// Fields of the handshake kept for diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandshakeDiagnostics {
    pub ec: Option<i64>,
    pub ct: Option<i64>,
    pub has_d: Option<i64>,
    pub has_attr: Option<i64>,
    pub has_set: Option<i64>,
    pub has_r: Option<i64>,
}

/// IoT Connect session negotiated with the platform.
///
/// `connected` flips to true on the first parseable handshake and back to
/// false on every (re)connect to the hub.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CloudSession {
    pub device_group: String,
    pub device_guid: String,
    pub sid: String,
    pub connected: bool,
    pub diagnostics: HandshakeDiagnostics,
}

/// Copies at most `max` bytes, cut back to the last whole character.
pub(crate) fn truncated(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}
