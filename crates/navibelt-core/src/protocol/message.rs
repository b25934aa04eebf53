//! Messages originated by the belt

use serde::{Deserialize, Serialize};

use super::characteristic::Characteristic;
use super::packet::{PayloadReader, RawFrame};
use super::request::REJECTION_MARKER;
use crate::errors::CodecError;
use crate::types::{BatteryReport, BeltButton, OperatingMode, OrientationReport, PowerStatus};

const ORIENTATION_LEN: usize = 16;
const BATTERY_LEN: usize = 9;
const BUTTON_PRESS_LEN: usize = 5;

/// A decoded frame received from the belt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceMessage {
    /// Current operating mode, also the acknowledgment of mode requests
    ModeReport(OperatingMode),
    DefaultIntensity(u8),
    HeadingOffset(u16),
    BluetoothName(String),
    InaccurateSignalState { in_app: bool, in_compass: bool },
    PairingRequirement(bool),
    OrientationNotificationPeriod(u16),
    ButtonPress {
        button: BeltButton,
        press_type: u8,
        previous_mode: OperatingMode,
        new_mode: OperatingMode,
    },
    KeepAlive { mode: OperatingMode },
    Orientation(OrientationReport),
    Battery(BatteryReport),
    FirmwareVersion(u16),
    /// Refusal of a request, keyed by its first two payload bytes
    Rejection { request_key: [u8; 2], reason: u8 },
}

impl DeviceMessage {
    /// Decode one frame
    ///
    /// Unknown or truncated payloads yield an error; trailing bytes after a
    /// complete message are ignored, as newer firmware appends fields.
    pub fn decode(frame: &RawFrame) -> Result<DeviceMessage, CodecError> {
        let payload = frame.payload.as_slice();
        match frame.characteristic {
            Characteristic::ParameterNotification => decode_parameter_notification(payload),
            Characteristic::ButtonPress => {
                let mut reader = PayloadReader::new(payload, "button press");
                reader.require(BUTTON_PRESS_LEN)?;
                let button = BeltButton::try_from(reader.u8()?)?;
                let press_type = reader.u8()?;
                reader.skip(1)?;
                Ok(DeviceMessage::ButtonPress {
                    button,
                    press_type,
                    previous_mode: OperatingMode::try_from(reader.u8()?)?,
                    new_mode: OperatingMode::try_from(reader.u8()?)?,
                })
            }
            Characteristic::KeepAlive => {
                let mut reader = PayloadReader::new(payload, "keep-alive");
                reader.skip(1)?;
                Ok(DeviceMessage::KeepAlive {
                    mode: OperatingMode::try_from(reader.u8()?)?,
                })
            }
            Characteristic::OrientationData => decode_orientation(payload),
            Characteristic::BatteryStatus => decode_battery(payload),
            Characteristic::FirmwareInfo => {
                let mut reader = PayloadReader::new(payload, "firmware version");
                Ok(DeviceMessage::FirmwareVersion(reader.u16()?))
            }
            other => Err(CodecError::Unrecognized {
                characteristic: other,
                payload: hex::encode(payload),
            }),
        }
    }

    /// Encode the message as the belt would send it
    pub fn encode(&self) -> RawFrame {
        use Characteristic::ParameterNotification;

        match self {
            DeviceMessage::ModeReport(mode) => RawFrame::new(ParameterNotification, [0x01, 0x01, mode.as_u8()]),
            DeviceMessage::DefaultIntensity(intensity) => RawFrame::new(ParameterNotification, [0x01, 0x02, *intensity]),
            DeviceMessage::HeadingOffset(offset) => {
                let [lo, hi] = offset.to_le_bytes();
                RawFrame::new(ParameterNotification, [0x01, 0x03, lo, hi])
            }
            DeviceMessage::BluetoothName(name) => {
                let mut payload = vec![0x01, 0x04];
                payload.extend_from_slice(name.as_bytes());
                RawFrame::new(ParameterNotification, payload)
            }
            DeviceMessage::InaccurateSignalState { in_app, in_compass } => {
                let state = u8::from(*in_compass) + 2 * u8::from(*in_app);
                RawFrame::new(ParameterNotification, [0x10, 0x03, state])
            }
            DeviceMessage::PairingRequirement(required) => {
                RawFrame::new(ParameterNotification, [0x10, 0x25, u8::from(*required)])
            }
            DeviceMessage::OrientationNotificationPeriod(period_ms) => {
                let [lo, hi] = period_ms.to_le_bytes();
                RawFrame::new(ParameterNotification, [0x10, 0x0F, 0x00, lo, hi])
            }
            DeviceMessage::ButtonPress {
                button,
                press_type,
                previous_mode,
                new_mode,
            } => RawFrame::new(
                Characteristic::ButtonPress,
                [button.as_u8(), *press_type, 0x00, previous_mode.as_u8(), new_mode.as_u8()],
            ),
            DeviceMessage::KeepAlive { mode } => RawFrame::new(Characteristic::KeepAlive, [0x01, mode.as_u8()]),
            DeviceMessage::Orientation(report) => RawFrame::new(Characteristic::OrientationData, encode_orientation(report)),
            DeviceMessage::Battery(report) => RawFrame::new(Characteristic::BatteryStatus, encode_battery(report)),
            DeviceMessage::FirmwareVersion(version) => {
                RawFrame::new(Characteristic::FirmwareInfo, version.to_le_bytes())
            }
            DeviceMessage::Rejection { request_key, reason } => RawFrame::new(
                ParameterNotification,
                [REJECTION_MARKER, request_key[0], request_key[1], *reason],
            ),
        }
    }

    /// Mode announced by the message, if any
    pub fn reported_mode(&self) -> Option<OperatingMode> {
        match self {
            DeviceMessage::ModeReport(mode) | DeviceMessage::KeepAlive { mode } => Some(*mode),
            DeviceMessage::ButtonPress { new_mode, .. } => Some(*new_mode),
            _ => None,
        }
    }
}

fn decode_parameter_notification(payload: &[u8]) -> Result<DeviceMessage, CodecError> {
    let mut reader = PayloadReader::new(payload, "parameter notification");
    let group = reader.u8()?;
    let id = reader.u8()?;
    match (group, id) {
        (0x01, 0x01) => Ok(DeviceMessage::ModeReport(OperatingMode::try_from(reader.u8()?)?)),
        (0x01, 0x02) | (0x10, 0x00) => Ok(DeviceMessage::DefaultIntensity(reader.u8()?)),
        (0x01, 0x03) | (0x10, 0x01) => Ok(DeviceMessage::HeadingOffset(reader.u16()?)),
        (0x01, 0x04) => Ok(DeviceMessage::BluetoothName(
            String::from_utf8_lossy(reader.rest()).trim_end_matches('\0').to_string(),
        )),
        (0x10, 0x03) => {
            let state = reader.u8()?;
            Ok(DeviceMessage::InaccurateSignalState {
                in_app: state & 0x02 != 0,
                in_compass: state & 0x01 != 0,
            })
        }
        (0x10, 0x25) => Ok(DeviceMessage::PairingRequirement(reader.u8()? != 0)),
        (0x10, 0x0F) => {
            reader.skip(1)?;
            Ok(DeviceMessage::OrientationNotificationPeriod(reader.u16()?))
        }
        (REJECTION_MARKER, first) => {
            let second = reader.u8()?;
            Ok(DeviceMessage::Rejection {
                request_key: [first, second],
                reason: reader.u8()?,
            })
        }
        _ => Err(CodecError::Unrecognized {
            characteristic: Characteristic::ParameterNotification,
            payload: hex::encode(payload),
        }),
    }
}

fn decode_orientation(payload: &[u8]) -> Result<DeviceMessage, CodecError> {
    let mut reader = PayloadReader::new(payload, "orientation");
    reader.require(ORIENTATION_LEN)?;
    Ok(DeviceMessage::Orientation(OrientationReport {
        sensor_id: reader.u8()?,
        heading: reader.i16()?,
        box_heading: reader.i16()?,
        box_roll: reader.i16()?,
        box_pitch: reader.i16()?,
        accuracy: reader.u16()?,
        magnetometer_status: reader.i8()?,
        accelerometer_status: reader.i8()?,
        gyroscope_status: reader.i8()?,
        fusion_status: reader.i8()?,
        accurate: reader.u8()? == 0,
    }))
}

fn encode_orientation(report: &OrientationReport) -> Vec<u8> {
    let mut payload = Vec::with_capacity(ORIENTATION_LEN);
    payload.push(report.sensor_id);
    for value in [report.heading, report.box_heading, report.box_roll, report.box_pitch] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    payload.extend_from_slice(&report.accuracy.to_le_bytes());
    for status in [
        report.magnetometer_status,
        report.accelerometer_status,
        report.gyroscope_status,
        report.fusion_status,
    ] {
        payload.extend_from_slice(&status.to_le_bytes());
    }
    payload.push(u8::from(!report.accurate));
    payload
}

fn decode_battery(payload: &[u8]) -> Result<DeviceMessage, CodecError> {
    let mut reader = PayloadReader::new(payload, "battery status");
    reader.require(BATTERY_LEN)?;
    Ok(DeviceMessage::Battery(BatteryReport {
        status: PowerStatus::from(reader.u8()?),
        level_raw: reader.u16()?,
        time_to_full_or_empty_raw: reader.u16()?,
        current_ma: reader.i16()?,
        voltage_mv: reader.u16()?,
    }))
}

fn encode_battery(report: &BatteryReport) -> Vec<u8> {
    let mut payload = Vec::with_capacity(BATTERY_LEN);
    payload.push(report.status.as_u8());
    payload.extend_from_slice(&report.level_raw.to_le_bytes());
    payload.extend_from_slice(&report.time_to_full_or_empty_raw.to_le_bytes());
    payload.extend_from_slice(&report.current_ma.to_le_bytes());
    payload.extend_from_slice(&report.voltage_mv.to_le_bytes());
    payload
}
