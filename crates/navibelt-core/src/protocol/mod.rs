//! Belt Protocol Module
//!
//! Pure, stateless translation between domain objects and link-level units:
//! - `characteristic`: the belt's characteristics and their BLE and serial identifiers
//! - `packet`: received frames and outbound link operations
//! - `request`: host requests, their encoding and acknowledgment correlation
//! - `message`: messages originated by the belt
//! - `framing`: record framing of the USB-serial link

pub mod characteristic;
pub mod framing;
pub mod message;
pub mod packet;
pub mod request;

pub use characteristic::{Characteristic, MAX_PAYLOAD_LEN, MAX_SENSOR_PAYLOAD_LEN};
pub use framing::{decode_packet, encode_frame, encode_packet, DecodedUnit, FrameDecoder};
pub use message::DeviceMessage;
pub use packet::{OutboundPacket, RawFrame};
pub use request::{AckMatch, AckMatcher, Request, MIN_ORIENTATION_PERIOD_MS};
