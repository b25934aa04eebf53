//! Domain types shared by the codec, the channel model and the runtime

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::errors::CodecError;

/// Number of independent vibration channels on the belt
pub const CHANNEL_COUNT: usize = 6;

/// Index of the only channel usable outside of app mode
pub const BASE_CHANNEL: u8 = 0;

// ----------------------------------------------------------------------------
// Operating Mode
// ----------------------------------------------------------------------------

/// Device-level behavioral state of the belt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OperatingMode {
    Standby = 0,
    Wait = 1,
    Compass = 2,
    AppMode = 3,
    Pause = 4,
    Calibration = 5,
    Crossing = 6,
}

impl OperatingMode {
    /// All modes, ordered by wire value
    pub const ALL: [OperatingMode; 7] = [
        OperatingMode::Standby,
        OperatingMode::Wait,
        OperatingMode::Compass,
        OperatingMode::AppMode,
        OperatingMode::Pause,
        OperatingMode::Calibration,
        OperatingMode::Crossing,
    ];

    /// Wire value of the mode
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_app_mode(self) -> bool {
        self == OperatingMode::AppMode
    }
}

impl TryFrom<u8> for OperatingMode {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        OperatingMode::ALL
            .get(value as usize)
            .copied()
            .ok_or(CodecError::UnknownMode(value))
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperatingMode::Standby => "standby",
            OperatingMode::Wait => "wait",
            OperatingMode::Compass => "compass",
            OperatingMode::AppMode => "app",
            OperatingMode::Pause => "pause",
            OperatingMode::Calibration => "calibration",
            OperatingMode::Crossing => "crossing",
        };
        write!(f, "{}", name)
    }
}

/// What caused an operating mode change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeChangeCause {
    /// Acknowledged mode-change command issued by this host
    Local,
    /// Unsolicited report from the belt (parameter or keep-alive notification)
    Device,
    /// A button was pressed on the belt
    ButtonPress,
    /// Synthesized locally to track the belt's fallback on link loss
    Implicit,
}

// ----------------------------------------------------------------------------
// Buttons and Power
// ----------------------------------------------------------------------------

/// Physical buttons on the belt control box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BeltButton {
    Power = 1,
    Pause = 2,
    Compass = 3,
    Home = 4,
}

impl BeltButton {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for BeltButton {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(BeltButton::Power),
            2 => Ok(BeltButton::Pause),
            3 => Ok(BeltButton::Compass),
            4 => Ok(BeltButton::Home),
            other => Err(CodecError::UnknownButton(other)),
        }
    }
}

/// Power supply status reported with battery notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerStatus {
    Unknown,
    OnBattery,
    Charging,
    ExternalPower,
    Other(u8),
}

impl PowerStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            PowerStatus::Unknown => 0,
            PowerStatus::OnBattery => 1,
            PowerStatus::Charging => 2,
            PowerStatus::ExternalPower => 3,
            PowerStatus::Other(raw) => raw,
        }
    }
}

impl From<u8> for PowerStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => PowerStatus::Unknown,
            1 => PowerStatus::OnBattery,
            2 => PowerStatus::Charging,
            3 => PowerStatus::ExternalPower,
            other => PowerStatus::Other(other),
        }
    }
}

// ----------------------------------------------------------------------------
// Device Reports
// ----------------------------------------------------------------------------

/// Orientation of the belt as reported by its sensor fusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrientationReport {
    pub sensor_id: u8,
    /// Heading of the belt in degrees relative to magnetic North
    pub heading: i16,
    pub box_heading: i16,
    pub box_roll: i16,
    pub box_pitch: i16,
    /// Raw accuracy estimate of the heading
    pub accuracy: u16,
    pub magnetometer_status: i8,
    pub accelerometer_status: i8,
    pub gyroscope_status: i8,
    pub fusion_status: i8,
    /// False when magnetic interference makes the heading unreliable
    pub accurate: bool,
}

/// Battery and power state of the belt
///
/// Values are kept in their raw wire representation so that decoding is
/// lossless; the accessor methods convert them to physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryReport {
    pub status: PowerStatus,
    /// Charge level in 1/256 percent
    pub level_raw: u16,
    /// Time to full (charging) or to empty (discharging) in units of 5.625 s
    pub time_to_full_or_empty_raw: u16,
    pub current_ma: i16,
    pub voltage_mv: u16,
}

impl BatteryReport {
    /// Charge level in percent, capped at 100
    pub fn charge_level(&self) -> f32 {
        (self.level_raw as f32 / 256.0).min(100.0)
    }

    /// Estimated time to full or to empty in seconds
    pub fn time_to_full_or_empty_secs(&self) -> f32 {
        self.time_to_full_or_empty_raw as f32 * 5.625
    }
}

/// Parameters read from the belt during the handshake and kept up to date by
/// notifications
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceParameters {
    pub firmware_version: Option<u16>,
    pub default_intensity: Option<u8>,
    pub heading_offset: Option<u16>,
    /// `(enabled in app mode, enabled in compass mode)`
    pub inaccurate_signal_state: Option<(bool, bool)>,
    pub pairing_required: Option<bool>,
    pub bluetooth_name: Option<String>,
}
