//! Device characteristics and their link-level identifiers
//!
//! On BLE a characteristic is addressed by its 128-bit UUID. The USB-serial
//! link addresses the same characteristics by fixed attribute handles: a
//! value handle for payloads and, for notifying characteristics, a
//! configuration handle used to toggle notifications.

use core::fmt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bluetooth base UUID `00000000-0000-1000-8000-00805f9b34fb`
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Default payload limit of a characteristic
pub const MAX_PAYLOAD_LEN: usize = 22;

/// Payload limit of the sensor notification characteristic
pub const MAX_SENSOR_PAYLOAD_LEN: usize = 244;

/// A GATT characteristic exposed by the belt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Characteristic {
    FirmwareInfo,
    KeepAlive,
    VibrationCommand,
    ButtonPress,
    ParameterRequest,
    ParameterNotification,
    BuzzerLedCommand,
    BatteryStatus,
    SensorCommand,
    SensorNotification,
    OrientationData,
    DebugInput,
    DebugOutput,
}

impl Characteristic {
    pub const ALL: [Characteristic; 13] = [
        Characteristic::FirmwareInfo,
        Characteristic::KeepAlive,
        Characteristic::VibrationCommand,
        Characteristic::ButtonPress,
        Characteristic::ParameterRequest,
        Characteristic::ParameterNotification,
        Characteristic::BuzzerLedCommand,
        Characteristic::BatteryStatus,
        Characteristic::SensorCommand,
        Characteristic::SensorNotification,
        Characteristic::OrientationData,
        Characteristic::DebugInput,
        Characteristic::DebugOutput,
    ];

    /// 16-bit short form of the characteristic UUID
    pub const fn short_uuid(self) -> u16 {
        match self {
            Characteristic::FirmwareInfo => 0xFE01,
            Characteristic::KeepAlive => 0xFE02,
            Characteristic::VibrationCommand => 0xFE03,
            Characteristic::ButtonPress => 0xFE04,
            Characteristic::ParameterRequest => 0xFE05,
            Characteristic::ParameterNotification => 0xFE06,
            Characteristic::BuzzerLedCommand => 0xFE07,
            Characteristic::BatteryStatus => 0xFE09,
            Characteristic::SensorCommand => 0xFE0A,
            Characteristic::SensorNotification => 0xFE0B,
            Characteristic::OrientationData => 0xFE0C,
            Characteristic::DebugInput => 0xFE13,
            Characteristic::DebugOutput => 0xFE14,
        }
    }

    /// Full 128-bit UUID of the characteristic
    pub fn uuid(self) -> Uuid {
        Uuid::from_u128(BLUETOOTH_BASE_UUID | ((self.short_uuid() as u128) << 96))
    }

    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.uuid() == uuid)
    }

    /// USB-serial handle carrying the characteristic value
    pub const fn value_handle(self) -> u8 {
        match self {
            Characteristic::FirmwareInfo => 31,
            Characteristic::KeepAlive => 33,
            Characteristic::VibrationCommand => 36,
            Characteristic::ButtonPress => 38,
            Characteristic::ParameterRequest => 41,
            Characteristic::ParameterNotification => 43,
            Characteristic::BuzzerLedCommand => 46,
            Characteristic::BatteryStatus => 51,
            Characteristic::SensorCommand => 55,
            Characteristic::SensorNotification => 57,
            Characteristic::OrientationData => 60,
            Characteristic::DebugInput => 75,
            Characteristic::DebugOutput => 77,
        }
    }

    /// USB-serial handle of the notification configuration descriptor
    pub const fn config_handle(self) -> Option<u8> {
        match self {
            Characteristic::KeepAlive => Some(34),
            Characteristic::ButtonPress => Some(39),
            Characteristic::ParameterNotification => Some(44),
            Characteristic::BatteryStatus => Some(52),
            Characteristic::SensorNotification => Some(58),
            Characteristic::OrientationData => Some(61),
            Characteristic::DebugOutput => Some(78),
            _ => None,
        }
    }

    pub fn from_value_handle(handle: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.value_handle() == handle)
    }

    pub fn from_config_handle(handle: u8) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.config_handle() == Some(handle))
    }

    pub const fn is_notifiable(self) -> bool {
        self.config_handle().is_some()
    }

    /// Largest payload the characteristic accepts or emits
    pub const fn max_payload_len(self) -> usize {
        match self {
            Characteristic::SensorNotification => MAX_SENSOR_PAYLOAD_LEN,
            _ => MAX_PAYLOAD_LEN,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Characteristic::FirmwareInfo => "firmware-info",
            Characteristic::KeepAlive => "keep-alive",
            Characteristic::VibrationCommand => "vibration-command",
            Characteristic::ButtonPress => "button-press",
            Characteristic::ParameterRequest => "parameter-request",
            Characteristic::ParameterNotification => "parameter-notification",
            Characteristic::BuzzerLedCommand => "buzzer-led-command",
            Characteristic::BatteryStatus => "battery-status",
            Characteristic::SensorCommand => "sensor-command",
            Characteristic::SensorNotification => "sensor-notification",
            Characteristic::OrientationData => "orientation-data",
            Characteristic::DebugInput => "debug-input",
            Characteristic::DebugOutput => "debug-output",
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:04x})", self.name(), self.short_uuid())
    }
}
