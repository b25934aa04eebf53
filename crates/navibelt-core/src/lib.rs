//! NaviBelt Core Protocol Implementation
//!
//! Foundational types for driving a haptic navigation belt: the binary codec
//! shared by the BLE and USB-serial links, the vibration channel model, the
//! connection state machine, the transport capability traits and the events
//! delivered to applications. Everything here is free of I/O; the runtime
//! crate wires it to a live transport.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod errors;
pub mod event;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod types;
pub mod vibration;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{vibration_permitted, ChannelModel, VibrationChannel};
pub use config::{BeltConfig, QueuePolicy};
pub use errors::{BeltError, CodecError, MalformedFrame, Result, TransportError};
pub use event::BeltEvent;
pub use protocol::{Characteristic, DeviceMessage, OutboundPacket, RawFrame, Request};
pub use state::{ConnectionEffect, ConnectionEvent, ConnectionState, StateTransition, StateTransitionError};
pub use transport::{BeltConnector, BeltTransport, InboundItem, InboundStream, TransportType};
pub use types::{
    BatteryReport, BeltButton, DeviceParameters, ModeChangeCause, OperatingMode, OrientationReport, PowerStatus,
    BASE_CHANNEL, CHANNEL_COUNT,
};
pub use vibration::{ChannelPattern, Orientation, PatternKind, PulseSpec, TimerOption, VibrationPattern, VibrationSpec};
