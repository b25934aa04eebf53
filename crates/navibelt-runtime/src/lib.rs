//! NaviBelt Runtime
//!
//! Drives a belt session on top of the transport traits from `navibelt-core`:
//! - `BeltController`: connect handshake, disconnect and the command API
//! - `CommandEngine`: one acknowledged request in flight, bounded waits
//! - the inbound dispatcher task turning frames into session updates
//! - observer delivery of `BeltEvent`s in arrival order

mod dispatcher;

pub mod controller;
pub mod engine;
pub mod observer;
pub mod session;

pub use controller::{BeltController, VibrationOptions, MIN_FIRMWARE_ORIENTATION_PERIOD};
pub use engine::{Acknowledgment, Command, CommandEngine, CommandId};
pub use observer::{route_event, BeltObserver, ChannelObserver, ObserverRegistry};
pub use session::Session;

// Re-export core types for convenience
pub use navibelt_core::{
    BeltConfig, BeltConnector, BeltError, BeltEvent, BeltTransport, ChannelPattern, ConnectionState, ModeChangeCause,
    OperatingMode, PulseSpec, QueuePolicy, Request, Result, VibrationSpec,
};
