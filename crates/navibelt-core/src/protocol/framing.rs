//! USB-serial framing
//!
//! Every record on the serial link is `[handle][length][payload]`. Host
//! writes target a value handle, reads are a value handle with an empty
//! payload and notification toggles target the configuration handle with the
//! payload `[enabled, 0]`. The belt answers with records on value handles.

use super::characteristic::Characteristic;
use super::packet::{OutboundPacket, RawFrame};
use crate::errors::{CodecError, MalformedFrame};

const HEADER_LEN: usize = 2;

/// Serialize a host operation into a serial record
pub fn encode_packet(packet: &OutboundPacket) -> Result<Vec<u8>, CodecError> {
    packet.check()?;
    let bytes = match packet {
        OutboundPacket::Write {
            characteristic,
            payload,
        } => {
            let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
            bytes.push(characteristic.value_handle());
            bytes.push(payload.len() as u8);
            bytes.extend_from_slice(payload);
            bytes
        }
        OutboundPacket::Read { characteristic } => vec![characteristic.value_handle(), 0],
        OutboundPacket::SetNotifications {
            characteristic,
            enabled,
        } => {
            let handle = characteristic
                .config_handle()
                .ok_or(CodecError::NotNotifiable(*characteristic))?;
            vec![handle, 2, u8::from(*enabled), 0]
        }
    };
    Ok(bytes)
}

/// Serialize a belt frame into a serial record
pub fn encode_frame(frame: &RawFrame) -> Result<Vec<u8>, CodecError> {
    let max = frame.characteristic.max_payload_len();
    if frame.payload.len() > max {
        return Err(CodecError::PayloadTooLarge {
            characteristic: frame.characteristic,
            len: frame.payload.len(),
            max,
        });
    }
    let mut bytes = Vec::with_capacity(HEADER_LEN + frame.payload.len());
    bytes.push(frame.characteristic.value_handle());
    bytes.push(frame.payload.len() as u8);
    bytes.extend_from_slice(&frame.payload);
    Ok(bytes)
}

/// Parse one host record from the start of `bytes`
///
/// Returns `None` while the record is incomplete, otherwise the operation and
/// the number of bytes it occupied. Used by belt emulators.
pub fn decode_packet(bytes: &[u8]) -> Result<Option<(OutboundPacket, usize)>, CodecError> {
    let [handle, len, ..] = bytes else {
        return Ok(None);
    };
    let total = HEADER_LEN + *len as usize;
    if bytes.len() < total {
        return Ok(None);
    }
    let payload = &bytes[HEADER_LEN..total];
    if let Some(characteristic) = Characteristic::from_config_handle(*handle) {
        let enabled = payload.first().is_some_and(|b| *b != 0);
        return Ok(Some((
            OutboundPacket::SetNotifications {
                characteristic,
                enabled,
            },
            total,
        )));
    }
    let characteristic = Characteristic::from_value_handle(*handle).ok_or(CodecError::UnknownHandle(*handle))?;
    let packet = if payload.is_empty() {
        OutboundPacket::Read { characteristic }
    } else {
        OutboundPacket::write(characteristic, payload)
    };
    Ok(Some((packet, total)))
}

/// Item produced by the stream decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedUnit {
    Frame(RawFrame),
    Malformed(MalformedFrame),
}

/// Incremental decoder of belt records from a byte stream
///
/// Bytes that cannot start a record (unknown handle, or a length above the
/// characteristic limit) are skipped one at a time until a plausible header
/// is found. Each contiguous skipped run is reported once.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    discarded: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes and collect every complete unit
    pub fn push(&mut self, bytes: &[u8]) -> Vec<DecodedUnit> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        let mut start = 0;

        while start < self.buffer.len() {
            let Some(characteristic) = Characteristic::from_value_handle(self.buffer[start]) else {
                self.discarded.push(self.buffer[start]);
                start += 1;
                continue;
            };
            let Some(&len) = self.buffer.get(start + 1) else {
                break;
            };
            let len = len as usize;
            if len > characteristic.max_payload_len() {
                self.discarded.push(self.buffer[start]);
                start += 1;
                continue;
            }
            let end = start + HEADER_LEN + len;
            if self.buffer.len() < end {
                break;
            }
            self.flush_discarded(&mut out);
            out.push(DecodedUnit::Frame(RawFrame::new(
                characteristic,
                &self.buffer[start + HEADER_LEN..end],
            )));
            start = end;
        }

        self.buffer.drain(..start);
        self.flush_discarded(&mut out);
        out
    }

    /// True while a record is partially received
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Drop a partially received record, reporting its bytes
    pub fn reset_partial(&mut self) -> Option<MalformedFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.buffer);
        Some(MalformedFrame::new(None, bytes, "incomplete record dropped after packet timeout"))
    }

    fn flush_discarded(&mut self, out: &mut Vec<DecodedUnit>) {
        if self.discarded.is_empty() {
            return;
        }
        let bytes = std::mem::take(&mut self.discarded);
        out.push(DecodedUnit::Malformed(MalformedFrame::new(
            None,
            bytes,
            "bytes outside of any record",
        )));
    }
}
