//! Notifications delivered to the application

use serde::{Deserialize, Serialize};

use crate::errors::MalformedFrame;
use crate::state::ConnectionState;
use crate::types::{BatteryReport, BeltButton, ModeChangeCause, OperatingMode, OrientationReport, PowerStatus};

/// An event observed on a session, in arrival order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BeltEvent {
    ConnectionStateChanged {
        state: ConnectionState,
        /// Why the link ended, for unsolicited disconnections and failures
        error: Option<String>,
    },
    ModeChanged {
        mode: OperatingMode,
        cause: ModeChangeCause,
    },
    ButtonPressed {
        button: BeltButton,
        previous_mode: OperatingMode,
        new_mode: OperatingMode,
    },
    OrientationUpdate {
        heading: i16,
        accurate: bool,
        report: OrientationReport,
    },
    BatteryUpdate {
        /// Charge level in percent
        level: f32,
        status: PowerStatus,
        report: BatteryReport,
    },
    DefaultIntensityChanged(u8),
    HeadingOffsetChanged(u16),
    BluetoothNameChanged(String),
    InaccurateSignalStateChanged {
        in_app: bool,
        in_compass: bool,
    },
    PairingRequirementChanged(bool),
    FirmwareVersion(u16),
    #[serde(skip)]
    MalformedFrame(MalformedFrame),
}

impl BeltEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BeltEvent::ConnectionStateChanged { .. } => "connection-state",
            BeltEvent::ModeChanged { .. } => "mode-changed",
            BeltEvent::ButtonPressed { .. } => "button-pressed",
            BeltEvent::OrientationUpdate { .. } => "orientation",
            BeltEvent::BatteryUpdate { .. } => "battery",
            BeltEvent::DefaultIntensityChanged(_) => "default-intensity",
            BeltEvent::HeadingOffsetChanged(_) => "heading-offset",
            BeltEvent::BluetoothNameChanged(_) => "bluetooth-name",
            BeltEvent::InaccurateSignalStateChanged { .. } => "inaccurate-signal",
            BeltEvent::PairingRequirementChanged(_) => "pairing-requirement",
            BeltEvent::FirmwareVersion(_) => "firmware-version",
            BeltEvent::MalformedFrame(_) => "malformed-frame",
        }
    }
}
