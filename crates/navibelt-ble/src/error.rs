//! Error types for the BLE transport

use navibelt_core::{Characteristic, TransportError};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE transport
#[derive(Error, Debug)]
pub enum BleTransportError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Failed to scan for belts: {0}")]
    ScanFailed(String),

    #[error("Failed to connect to {target}: {reason}")]
    ConnectionFailed { target: String, reason: String },

    #[error("Connection to {target} timed out after {timeout_ms}ms")]
    ConnectionTimeout { target: String, timeout_ms: u64 },

    #[error("Failed to discover services: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("{0} not found on the belt")]
    CharacteristicNotFound(Characteristic),

    #[error("Failed to change notifications of {characteristic}: {reason}")]
    SubscriptionFailed { characteristic: Characteristic, reason: String },

    #[error("Failed to write to {characteristic}: {reason}")]
    WriteFailed { characteristic: Characteristic, reason: String },

    #[error("Failed to read {characteristic}: {reason}")]
    ReadFailed { characteristic: Characteristic, reason: String },

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Failed to get notifications stream: {0}")]
    NotificationStreamFailed(String),

    #[error("Link closed")]
    Closed,
}

impl From<BleTransportError> for TransportError {
    fn from(err: BleTransportError) -> Self {
        match err {
            BleTransportError::ConnectionFailed { target, reason } => TransportError::OpenFailed { target, reason },
            BleTransportError::ConnectionTimeout { timeout_ms, .. } => TransportError::Timeout {
                duration_ms: timeout_ms,
            },
            BleTransportError::CharacteristicNotFound(characteristic) => {
                TransportError::CharacteristicUnavailable(characteristic)
            }
            BleTransportError::Closed => TransportError::Closed,
            other => TransportError::SendFailed {
                reason: other.to_string(),
            },
        }
    }
}
