//! Error types for the belt protocol layer
//!
//! `BeltError` is the error surfaced by every public operation. Codec and
//! transport failures have their own enums and convert into it with `?`.

use core::fmt;

use crate::protocol::Characteristic;
use crate::state::StateTransitionError;
use crate::types::OperatingMode;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures of the binary codec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Frame too short for {what}: expected at least {expected} bytes, got {actual}")]
    TooShort {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Unrecognized payload on {characteristic}: {payload}")]
    Unrecognized {
        characteristic: Characteristic,
        payload: String,
    },
    #[error("Unknown operating mode {0}")]
    UnknownMode(u8),
    #[error("Unknown button id {0}")]
    UnknownButton(u8),
    #[error("Unknown attribute handle {0}")]
    UnknownHandle(u8),
    #[error("Value {value} out of range for {field}")]
    OutOfRange { field: &'static str, value: u32 },
    #[error("Payload of {len} bytes exceeds the {max}-byte limit of {characteristic}")]
    PayloadTooLarge {
        characteristic: Characteristic,
        len: usize,
        max: usize,
    },
    #[error("{0} does not support notifications")]
    NotNotifiable(Characteristic),
}

/// Failures of the underlying link
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to open link to {target}: {reason}")]
    OpenFailed { target: String, reason: String },
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },
    #[error("Link closed")]
    Closed,
    #[error("{0} is not available on this link")]
    CharacteristicUnavailable(Characteristic),
    #[error("Inbound stream already taken")]
    InboundTaken,
    #[error("Transport timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// A frame or byte run that could not be decoded
///
/// Malformed frames are reported and skipped; they never end a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedFrame {
    /// Characteristic the bytes arrived on, when known
    pub characteristic: Option<Characteristic>,
    /// The discarded bytes
    pub bytes: Vec<u8>,
    pub reason: String,
}

impl MalformedFrame {
    pub fn new(characteristic: Option<Characteristic>, bytes: Vec<u8>, reason: impl Into<String>) -> Self {
        Self {
            characteristic,
            bytes,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MalformedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.characteristic {
            Some(characteristic) => write!(
                f,
                "{} on {} [{}]",
                self.reason,
                characteristic,
                hex::encode(&self.bytes)
            ),
            None => write!(f, "{} [{}]", self.reason, hex::encode(&self.bytes)),
        }
    }
}

impl std::error::Error for MalformedFrame {}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Main error type for belt operations
#[derive(Debug, thiserror::Error)]
pub enum BeltError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Vibration on channel {channel} is not permitted in {mode} mode")]
    ModeNotPermitted { channel: u8, mode: OperatingMode },

    #[error("Command engine busy")]
    EngineBusy,

    #[error("No acknowledgment within {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("Command rejected by the belt (reason {reason:#04x})")]
    Rejected { reason: u8 },

    #[error("Command cancelled")]
    Cancelled,

    #[error("Belt disconnected")]
    Disconnected,

    #[error("No belt connected")]
    NotConnected,

    #[error("Channel index {channel} out of range")]
    InvalidChannel { channel: u8 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(#[from] StateTransitionError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BeltError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        BeltError::InvalidParameter(message.into())
    }

    /// True for outcomes that leave the session usable
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            BeltError::Transport(_) | BeltError::Disconnected | BeltError::ConnectionFailed { .. }
        )
    }
}

/// Result type for belt operations
pub type Result<T> = core::result::Result<T, BeltError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_frame_display_includes_hex() {
        let frame = MalformedFrame::new(None, vec![0xEE, 0xFF, 0x00], "discarded bytes");
        assert_eq!(frame.to_string(), "discarded bytes [eeff00]");

        let frame = MalformedFrame::new(
            Some(Characteristic::ParameterNotification),
            vec![0x42],
            "unrecognized",
        );
        assert!(frame.to_string().contains("42"));
    }

    #[test]
    fn test_error_conversions() {
        let err: BeltError = CodecError::UnknownMode(9).into();
        assert!(matches!(err, BeltError::Codec(CodecError::UnknownMode(9))));

        let err: BeltError = TransportError::Closed.into();
        assert!(!err.is_recoverable());
        assert!(BeltError::TimedOut { timeout_ms: 2000 }.is_recoverable());
    }
}
