//! Transport abstraction for the belt protocol
//!
//! A transport carries link operations to the belt and delivers received
//! frames as a single-pass stream. BLE and USB-serial links implement the
//! same traits so the protocol logic never branches on the link type.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::{MalformedFrame, TransportError};
use crate::protocol::{OutboundPacket, RawFrame};

// ----------------------------------------------------------------------------
// Inbound Stream
// ----------------------------------------------------------------------------

/// Item delivered by a transport's inbound stream
#[derive(Debug)]
pub enum InboundItem {
    Frame(RawFrame),
    /// Bytes the link layer could not frame; the stream continues
    Malformed(MalformedFrame),
    /// The link failed; no further items follow
    Failed(TransportError),
}

/// Lazy, unbounded, single-pass sequence of inbound items
///
/// The stream ends when the link closes.
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundItem> + Send>>;

// ----------------------------------------------------------------------------
// Transport Traits
// ----------------------------------------------------------------------------

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum TransportType {
    /// Bluetooth Low Energy
    Ble,
    /// USB-serial
    Serial,
    /// Custom transport implementation
    Custom(&'static str),
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Ble => write!(f, "ble"),
            TransportType::Serial => write!(f, "serial"),
            TransportType::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// An open link to one belt
#[async_trait]
pub trait BeltTransport: Send + Sync {
    fn transport_type(&self) -> TransportType;

    /// Send one link operation; returns once the link accepted it
    async fn send(&self, packet: OutboundPacket) -> Result<(), TransportError>;

    /// Take the inbound stream; only the first call returns it
    fn take_inbound(&self) -> Option<InboundStream>;

    /// Close the link; the inbound stream ends afterwards
    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens links to a specific belt
#[async_trait]
pub trait BeltConnector: Send + Sync {
    fn transport_type(&self) -> TransportType;

    /// Human readable description of the target, used in logs and errors
    fn target(&self) -> String;

    async fn open(&self) -> Result<Arc<dyn BeltTransport>, TransportError>;
}
