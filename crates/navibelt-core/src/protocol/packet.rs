//! Link-level units exchanged with the belt

use core::fmt;
use serde::{Deserialize, Serialize};

use super::characteristic::Characteristic;
use crate::errors::CodecError;

/// One discrete payload received from the belt
///
/// On BLE this is a notification or read value. On USB-serial it is the
/// payload of one `[handle][length][payload]` record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawFrame {
    pub characteristic: Characteristic,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(characteristic: Characteristic, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            characteristic,
            payload: payload.into(),
        }
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.characteristic, hex::encode(&self.payload))
    }
}

/// One operation sent to the belt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutboundPacket {
    /// Write a payload to a characteristic
    Write {
        characteristic: Characteristic,
        payload: Vec<u8>,
    },
    /// Request the current value of a characteristic
    Read { characteristic: Characteristic },
    /// Enable or disable notifications of a characteristic
    SetNotifications {
        characteristic: Characteristic,
        enabled: bool,
    },
}

impl OutboundPacket {
    pub fn write(characteristic: Characteristic, payload: impl Into<Vec<u8>>) -> Self {
        OutboundPacket::Write {
            characteristic,
            payload: payload.into(),
        }
    }

    pub fn characteristic(&self) -> Characteristic {
        match self {
            OutboundPacket::Write { characteristic, .. }
            | OutboundPacket::Read { characteristic }
            | OutboundPacket::SetNotifications { characteristic, .. } => *characteristic,
        }
    }

    /// Payload of a write, empty for other operations
    pub fn payload(&self) -> &[u8] {
        match self {
            OutboundPacket::Write { payload, .. } => payload,
            _ => &[],
        }
    }

    /// Check link-level constraints before the packet reaches a transport
    pub fn check(&self) -> Result<(), CodecError> {
        match self {
            OutboundPacket::Write {
                characteristic,
                payload,
            } if payload.len() > characteristic.max_payload_len() => Err(CodecError::PayloadTooLarge {
                characteristic: *characteristic,
                len: payload.len(),
                max: characteristic.max_payload_len(),
            }),
            OutboundPacket::SetNotifications { characteristic, .. } if !characteristic.is_notifiable() => {
                Err(CodecError::NotNotifiable(*characteristic))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for OutboundPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundPacket::Write {
                characteristic,
                payload,
            } => write!(f, "write {} [{}]", characteristic, hex::encode(payload)),
            OutboundPacket::Read { characteristic } => write!(f, "read {}", characteristic),
            OutboundPacket::SetNotifications {
                characteristic,
                enabled,
            } => write!(
                f,
                "{} notifications on {}",
                if *enabled { "enable" } else { "disable" },
                characteristic
            ),
        }
    }
}

// ----------------------------------------------------------------------------
// Byte Reading Helpers
// ----------------------------------------------------------------------------

/// Little-endian cursor over a received payload
pub(crate) struct PayloadReader<'a> {
    bytes: &'a [u8],
    offset: usize,
    what: &'static str,
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(bytes: &'a [u8], what: &'static str) -> Self {
        Self { bytes, offset: 0, what }
    }

    /// Fail unless at least `expected` bytes are present in total
    pub(crate) fn require(&self, expected: usize) -> Result<(), CodecError> {
        if self.bytes.len() < expected {
            return Err(CodecError::TooShort {
                what: self.what,
                expected,
                actual: self.bytes.len(),
            });
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        self.require(self.offset + N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take::<1>()?[0])
    }

    pub(crate) fn i8(&mut self) -> Result<i8, CodecError> {
        Ok(i8::from_le_bytes(self.take::<1>()?))
    }

    pub(crate) fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take::<2>()?))
    }

    pub(crate) fn i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_le_bytes(self.take::<2>()?))
    }

    pub(crate) fn skip(&mut self, count: usize) -> Result<(), CodecError> {
        self.require(self.offset + count)?;
        self.offset += count;
        Ok(())
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.bytes[self.offset.min(self.bytes.len())..]
    }
}
