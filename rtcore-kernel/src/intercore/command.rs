//! Intercore command/response block.
//!
//! Layout shared with the real-time apps (little-endian):
//!
//! ```text
//! offset 0      command tag (u8)
//! offset 1..4   padding
//! offset 4..8   sample rate in seconds (u32)
//! offset 8..    command-specific payload
//! ```
//!
//! Telemetry responses are the exception: the NUL-terminated JSON text starts
//! right after the tag byte.

use thiserror::Error;

/// Size of an outbound command block.
pub const COMMAND_BLOCK_LEN: usize = 8;

/// Largest message accepted from a real-time app, longer datagrams are truncated.
pub const MAX_RT_MESSAGE_SIZE: usize = 256;

const SAMPLE_RATE_OFFSET: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty intercore message")]
    Empty,
    #[error("{kind} block too short: got {got} bytes, need {need}")]
    Truncated {
        kind: &'static str,
        got: usize,
        need: usize,
    },
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterCoreCmd {
    Unknown = 0,
    Heartbeat = 1,
    ReadSensor = 2,
    ReadSensorRespondWithTelemetry = 3,
    SetSampleRate = 4,
}

impl InterCoreCmd {
    /// Maps a wire tag to a command; anything unrecognised is `Unknown`.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => InterCoreCmd::Heartbeat,
            2 => InterCoreCmd::ReadSensor,
            3 => InterCoreCmd::ReadSensorRespondWithTelemetry,
            4 => InterCoreCmd::SetSampleRate,
            _ => InterCoreCmd::Unknown,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBlock {
    pub cmd: InterCoreCmd,
    pub sample_rate: u32,
}

impl CommandBlock {
    pub fn new(cmd: InterCoreCmd) -> Self {
        Self { cmd, sample_rate: 0 }
    }

    pub fn set_sample_rate(seconds: u32) -> Self {
        Self {
            cmd: InterCoreCmd::SetSampleRate,
            sample_rate: seconds,
        }
    }

    pub fn encode(&self) -> [u8; COMMAND_BLOCK_LEN] {
        let mut out = [0u8; COMMAND_BLOCK_LEN];
        out[0] = self.cmd.tag();
        out[SAMPLE_RATE_OFFSET..COMMAND_BLOCK_LEN].copy_from_slice(&self.sample_rate.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if bytes.len() < COMMAND_BLOCK_LEN {
            return Err(DecodeError::Truncated {
                kind: "command",
                got: bytes.len(),
                need: COMMAND_BLOCK_LEN,
            });
        }
        Ok(Self {
            cmd: InterCoreCmd::from_tag(bytes[0]),
            sample_rate: read_u32(bytes, SAMPLE_RATE_OFFSET),
        })
    }
}

/// A response from a real-time app, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response<'a> {
    Heartbeat,
    SampleRateAck(u32),
    /// Whole block, application-specific layout.
    RawData(&'a [u8]),
    /// JSON text without the tag byte and without the terminating NUL.
    Telemetry(&'a [u8]),
    Unknown(u8),
}

impl<'a> Response<'a> {
    pub fn decode(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let Some(&tag) = bytes.first() else {
            return Err(DecodeError::Empty);
        };

        let response = match InterCoreCmd::from_tag(tag) {
            InterCoreCmd::Heartbeat => Response::Heartbeat,
            InterCoreCmd::ReadSensor => Response::RawData(bytes),
            InterCoreCmd::ReadSensorRespondWithTelemetry => {
                let payload = &bytes[1..];
                let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
                Response::Telemetry(&payload[..end])
            }
            InterCoreCmd::SetSampleRate => {
                if bytes.len() < COMMAND_BLOCK_LEN {
                    return Err(DecodeError::Truncated {
                        kind: "sample rate ack",
                        got: bytes.len(),
                        need: COMMAND_BLOCK_LEN,
                    });
                }
                Response::SampleRateAck(read_u32(bytes, SAMPLE_RATE_OFFSET))
            }
            InterCoreCmd::Unknown => Response::Unknown(tag),
        };
        Ok(response)
    }
}

/// Builds a telemetry response block: tag, JSON text, NUL.
///
/// Text that would not fit in [`MAX_RT_MESSAGE_SIZE`] is cut short.
pub fn encode_telemetry(json: &str) -> Vec<u8> {
    let room = MAX_RT_MESSAGE_SIZE - 2;
    let text = &json.as_bytes()[..json.len().min(room)];
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(InterCoreCmd::ReadSensorRespondWithTelemetry.tag());
    out.extend_from_slice(text);
    out.push(0);
    out
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}
