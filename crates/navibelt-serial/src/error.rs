//! Error types for the serial transport

use navibelt_core::TransportError;
use thiserror::Error;

/// Errors specific to the serial transport
#[derive(Error, Debug)]
pub enum SerialTransportError {
    #[error("Failed to open {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Link closed")]
    Closed,
}

impl From<serialport::Error> for SerialTransportError {
    fn from(err: serialport::Error) -> Self {
        SerialTransportError::Io(err.into())
    }
}

impl From<SerialTransportError> for TransportError {
    fn from(err: SerialTransportError) -> Self {
        match err {
            SerialTransportError::OpenFailed { path, reason } => TransportError::OpenFailed { target: path, reason },
            SerialTransportError::Io(e) => TransportError::Io(e),
            SerialTransportError::Closed => TransportError::Closed,
        }
    }
}
