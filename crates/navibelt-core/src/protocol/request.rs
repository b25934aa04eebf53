//! Requests sent to the belt and their acknowledgment correlation

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use super::characteristic::Characteristic;
use super::packet::{OutboundPacket, PayloadReader, RawFrame};
use crate::errors::{BeltError, CodecError, Result};
use crate::types::{OperatingMode, CHANNEL_COUNT};
use crate::vibration::{Orientation, PulseSpec, TimerOption, VibrationPattern, VibrationSpec, MAX_INTENSITY};

/// First byte of a rejection frame on the parameter notification characteristic
pub const REJECTION_MARKER: u8 = 0xFE;

/// Intensity value selecting the belt's default intensity in vibration commands
pub const DEFAULT_INTENSITY_WIDE: u16 = 0xAAAA;

/// Intensity value selecting the belt's default intensity in pulse commands
pub const DEFAULT_INTENSITY_NARROW: u8 = 0xAA;

/// Shortest orientation notification period supported by the firmware
pub const MIN_ORIENTATION_PERIOD_MS: u16 = 20;

/// Longest Bluetooth name suffix that fits one parameter request
pub const MAX_NAME_SUFFIX_LEN: usize = 18;

const STOP_COMMAND: u8 = 0x30;
const PULSE_COMMAND: u8 = 0x40;
const ALL_CHANNELS: u8 = 0xFF;
const VIBRATION_COMMAND_LEN: usize = 18;
const PULSE_COMMAND_LEN: usize = 17;

// ----------------------------------------------------------------------------
// Request
// ----------------------------------------------------------------------------

/// An operation the host asks the belt to perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    QueryMode,
    SetMode(OperatingMode),
    QueryDefaultIntensity,
    SetDefaultIntensity { intensity: u8, feedback: bool },
    QueryHeadingOffset,
    QueryInaccurateSignalState,
    SetInaccurateSignalState {
        in_app: bool,
        in_compass: bool,
        persistent: bool,
    },
    SetPairingRequirement { required: bool, persistent: bool },
    SetOrientationNotificationPeriod { period_ms: u16 },
    ReadFirmwareVersion,
    /// Append a suffix to the belt's Bluetooth name
    Rename { suffix: String },
    Vibrate { channel: u8, spec: VibrationSpec },
    Pulse { channel: u8, spec: PulseSpec },
    /// Stop one channel, or every channel when `None`
    Stop { channel: Option<u8> },
    SetNotifications {
        characteristic: Characteristic,
        enabled: bool,
    },
    /// Reply to a keep-alive notification
    KeepAliveResponse,
}

/// Outcome of matching an inbound frame against a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMatch {
    Acknowledged,
    Rejected { reason: u8 },
}

/// Correlation key of an acknowledged request
///
/// The belt echoes the characteristic and a payload prefix of the request in
/// its acknowledgment. A rejection echoes the first two request bytes after
/// the rejection marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckMatcher {
    pub characteristic: Characteristic,
    pub prefix: SmallVec<[u8; 4]>,
    pub rejection_key: Option<[u8; 2]>,
}

impl AckMatcher {
    pub fn classify(&self, frame: &RawFrame) -> Option<AckMatch> {
        if frame.characteristic == self.characteristic && frame.payload.starts_with(&self.prefix) {
            return Some(AckMatch::Acknowledged);
        }
        let key = self.rejection_key?;
        match frame.payload.as_slice() {
            [REJECTION_MARKER, k0, k1, reason, ..]
                if frame.characteristic == Characteristic::ParameterNotification && [*k0, *k1] == key =>
            {
                Some(AckMatch::Rejected { reason: *reason })
            }
            _ => None,
        }
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

fn check_channel(channel: u8) -> Result<()> {
    if channel as usize >= CHANNEL_COUNT {
        return Err(BeltError::InvalidChannel { channel });
    }
    Ok(())
}

fn check_name_suffix(suffix: &str) -> Result<()> {
    if suffix.is_empty() {
        return Err(BeltError::invalid_parameter("name suffix is empty"));
    }
    if suffix.len() > MAX_NAME_SUFFIX_LEN {
        return Err(BeltError::invalid_parameter(format!(
            "name suffix is {} bytes, at most {} fit",
            suffix.len(),
            MAX_NAME_SUFFIX_LEN
        )));
    }
    if !suffix.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        return Err(BeltError::invalid_parameter(format!(
            "name suffix {:?} is not printable ASCII",
            suffix
        )));
    }
    Ok(())
}

impl Request {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::QueryMode => "query-mode",
            Request::SetMode(_) => "set-mode",
            Request::QueryDefaultIntensity => "query-default-intensity",
            Request::SetDefaultIntensity { .. } => "set-default-intensity",
            Request::QueryHeadingOffset => "query-heading-offset",
            Request::QueryInaccurateSignalState => "query-inaccurate-signal",
            Request::SetInaccurateSignalState { .. } => "set-inaccurate-signal",
            Request::SetPairingRequirement { .. } => "set-pairing-requirement",
            Request::SetOrientationNotificationPeriod { .. } => "set-orientation-period",
            Request::ReadFirmwareVersion => "read-firmware-version",
            Request::Rename { .. } => "rename",
            Request::Vibrate { .. } => "vibrate",
            Request::Pulse { .. } => "pulse",
            Request::Stop { .. } => "stop",
            Request::SetNotifications { .. } => "set-notifications",
            Request::KeepAliveResponse => "keep-alive-response",
        }
    }

    /// Check parameter ranges before encoding
    pub fn validate(&self) -> Result<()> {
        match self {
            Request::SetDefaultIntensity { intensity, .. } if *intensity > MAX_INTENSITY => Err(
                BeltError::invalid_parameter(format!("default intensity {} exceeds {}", intensity, MAX_INTENSITY)),
            ),
            Request::SetOrientationNotificationPeriod { period_ms } if *period_ms < MIN_ORIENTATION_PERIOD_MS => {
                Err(BeltError::invalid_parameter(format!(
                    "orientation notification period {} ms is below {} ms",
                    period_ms, MIN_ORIENTATION_PERIOD_MS
                )))
            }
            Request::Rename { suffix } => check_name_suffix(suffix),
            Request::Vibrate { channel, spec } => {
                check_channel(*channel)?;
                spec.validate()
            }
            Request::Pulse { channel, spec } => {
                check_channel(*channel)?;
                spec.validate()
            }
            Request::Stop { channel: Some(channel) } => check_channel(*channel),
            Request::SetNotifications { characteristic, .. } if !characteristic.is_notifiable() => Err(
                BeltError::invalid_parameter(format!("{} does not support notifications", characteristic)),
            ),
            _ => Ok(()),
        }
    }

    /// Encode the request as a link operation
    pub fn encode(&self) -> OutboundPacket {
        use Characteristic::{KeepAlive, ParameterRequest, VibrationCommand};

        match self {
            Request::QueryMode => OutboundPacket::write(ParameterRequest, [0x01, 0x01]),
            Request::SetMode(mode) => OutboundPacket::write(ParameterRequest, [0x01, 0x81, mode.as_u8()]),
            Request::QueryDefaultIntensity => OutboundPacket::write(ParameterRequest, [0x01, 0x02]),
            Request::SetDefaultIntensity { intensity, feedback } => {
                OutboundPacket::write(ParameterRequest, [0x01, 0x82, *intensity, 0x00, flag(*feedback)])
            }
            Request::QueryHeadingOffset => OutboundPacket::write(ParameterRequest, [0x01, 0x03]),
            Request::QueryInaccurateSignalState => OutboundPacket::write(ParameterRequest, [0x10, 0x01, 0x03]),
            Request::SetInaccurateSignalState {
                in_app,
                in_compass,
                persistent,
            } => {
                let state = flag(*in_compass) + 2 * flag(*in_app);
                OutboundPacket::write(ParameterRequest, [0x11, 0x03, flag(*persistent), state])
            }
            Request::SetPairingRequirement { required, persistent } => {
                OutboundPacket::write(ParameterRequest, [0x11, 0x25, flag(*persistent), flag(*required)])
            }
            Request::SetOrientationNotificationPeriod { period_ms } => {
                let [lo, hi] = period_ms.to_le_bytes();
                OutboundPacket::write(ParameterRequest, [0x11, 0x0F, 0x00, lo, hi])
            }
            Request::ReadFirmwareVersion => OutboundPacket::Read {
                characteristic: Characteristic::FirmwareInfo,
            },
            Request::Rename { suffix } => {
                let mut payload = vec![0x01, 0x84];
                payload.extend_from_slice(suffix.as_bytes());
                OutboundPacket::write(ParameterRequest, payload)
            }
            Request::Vibrate { channel, spec } => OutboundPacket::write(VibrationCommand, encode_vibration(*channel, spec)),
            Request::Pulse { channel, spec } => OutboundPacket::write(VibrationCommand, encode_pulse(*channel, spec)),
            Request::Stop { channel } => {
                OutboundPacket::write(VibrationCommand, [STOP_COMMAND, channel.unwrap_or(ALL_CHANNELS)])
            }
            Request::SetNotifications {
                characteristic,
                enabled,
            } => OutboundPacket::SetNotifications {
                characteristic: *characteristic,
                enabled: *enabled,
            },
            Request::KeepAliveResponse => OutboundPacket::write(KeepAlive, [0x01]),
        }
    }

    /// How the belt acknowledges this request, `None` when it sends no response
    pub fn ack_matcher(&self) -> Option<AckMatcher> {
        let notification = |prefix: &[u8]| {
            Some(AckMatcher {
                characteristic: Characteristic::ParameterNotification,
                prefix: SmallVec::from_slice(prefix),
                rejection_key: None,
            })
        };
        let mut matcher = match self {
            Request::QueryMode | Request::SetMode(_) => notification(&[0x01, 0x01]),
            Request::QueryDefaultIntensity | Request::SetDefaultIntensity { .. } => notification(&[0x01, 0x02]),
            Request::QueryHeadingOffset => notification(&[0x01, 0x03]),
            Request::QueryInaccurateSignalState | Request::SetInaccurateSignalState { .. } => {
                notification(&[0x10, 0x03])
            }
            Request::SetPairingRequirement { .. } => notification(&[0x10, 0x25]),
            Request::SetOrientationNotificationPeriod { .. } => notification(&[0x10, 0x0F]),
            Request::ReadFirmwareVersion => Some(AckMatcher {
                characteristic: Characteristic::FirmwareInfo,
                prefix: smallvec![],
                rejection_key: None,
            }),
            _ => None,
        }?;
        if let [b0, b1, ..] = self.encode().payload() {
            matcher.rejection_key = Some([*b0, *b1]);
        }
        Some(matcher)
    }

    /// Decode a link operation back into a request
    pub fn decode(packet: &OutboundPacket) -> core::result::Result<Request, CodecError> {
        match packet {
            OutboundPacket::Read {
                characteristic: Characteristic::FirmwareInfo,
            } => Ok(Request::ReadFirmwareVersion),
            OutboundPacket::SetNotifications {
                characteristic,
                enabled,
            } => Ok(Request::SetNotifications {
                characteristic: *characteristic,
                enabled: *enabled,
            }),
            OutboundPacket::Write {
                characteristic: Characteristic::ParameterRequest,
                payload,
            } => decode_parameter_request(payload),
            OutboundPacket::Write {
                characteristic: Characteristic::VibrationCommand,
                payload,
            } => decode_vibration_command(payload),
            OutboundPacket::Write {
                characteristic: Characteristic::KeepAlive,
                payload,
            } if payload.as_slice() == [0x01] => Ok(Request::KeepAliveResponse),
            other => Err(CodecError::Unrecognized {
                characteristic: other.characteristic(),
                payload: hex::encode(other.payload()),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Vibration Command Layouts
// ----------------------------------------------------------------------------

fn encode_vibration(channel: u8, spec: &VibrationSpec) -> Vec<u8> {
    let intensity = spec.intensity.map(u16::from).unwrap_or(DEFAULT_INTENSITY_WIDE).to_le_bytes();
    let orientation = spec.orientation.wire_value().to_le_bytes();
    let period = spec.period_ms.to_le_bytes();
    let start = spec.start_time_ms.to_le_bytes();
    vec![
        channel,
        spec.pattern.as_u8(),
        intensity[0],
        intensity[1],
        0x00,
        0x00,
        spec.orientation.type_code(),
        orientation[0],
        orientation[1],
        0x00,
        0x00,
        spec.iterations.unwrap_or(0),
        period[0],
        period[1],
        start[0],
        start[1],
        flag(spec.exclusive),
        flag(spec.clear_other_channels),
    ]
}

fn encode_pulse(channel: u8, spec: &PulseSpec) -> Vec<u8> {
    let orientation = spec.orientation.wire_value().to_le_bytes();
    let on_duration = spec.on_duration_ms.to_le_bytes();
    let pulse_period = spec.pulse_period_ms.to_le_bytes();
    let series_period = spec.series_period_ms.to_le_bytes();
    vec![
        PULSE_COMMAND,
        channel,
        spec.orientation.type_code(),
        orientation[0],
        orientation[1],
        spec.intensity.unwrap_or(DEFAULT_INTENSITY_NARROW),
        on_duration[0],
        on_duration[1],
        spec.pulse_iterations,
        spec.series_iterations.unwrap_or(0),
        pulse_period[0],
        pulse_period[1],
        series_period[0],
        series_period[1],
        spec.timer_option as u8,
        flag(spec.exclusive),
        flag(spec.clear_other_channels),
    ]
}

fn unrecognized(characteristic: Characteristic, payload: &[u8]) -> CodecError {
    CodecError::Unrecognized {
        characteristic,
        payload: hex::encode(payload),
    }
}

fn decode_parameter_request(payload: &[u8]) -> core::result::Result<Request, CodecError> {
    Ok(match payload {
        [0x01, 0x01] => Request::QueryMode,
        [0x01, 0x81, mode] => Request::SetMode(OperatingMode::try_from(*mode)?),
        [0x01, 0x02] => Request::QueryDefaultIntensity,
        [0x01, 0x82, intensity, _, feedback] => Request::SetDefaultIntensity {
            intensity: *intensity,
            feedback: *feedback != 0,
        },
        [0x01, 0x03] => Request::QueryHeadingOffset,
        [0x10, 0x01, 0x03] => Request::QueryInaccurateSignalState,
        [0x11, 0x03, persistent, state] => Request::SetInaccurateSignalState {
            in_app: state & 0x02 != 0,
            in_compass: state & 0x01 != 0,
            persistent: *persistent != 0,
        },
        [0x11, 0x25, persistent, required] => Request::SetPairingRequirement {
            required: *required != 0,
            persistent: *persistent != 0,
        },
        [0x11, 0x0F, _, lo, hi] => Request::SetOrientationNotificationPeriod {
            period_ms: u16::from_le_bytes([*lo, *hi]),
        },
        [0x01, 0x84, suffix @ ..] if !suffix.is_empty() => match std::str::from_utf8(suffix) {
            Ok(suffix) => Request::Rename {
                suffix: suffix.to_string(),
            },
            Err(_) => return Err(unrecognized(Characteristic::ParameterRequest, payload)),
        },
        other => return Err(unrecognized(Characteristic::ParameterRequest, other)),
    })
}

fn decode_vibration_command(payload: &[u8]) -> core::result::Result<Request, CodecError> {
    match payload {
        [STOP_COMMAND, channel] => Ok(Request::Stop {
            channel: (*channel != ALL_CHANNELS).then_some(*channel),
        }),
        [PULSE_COMMAND, ..] if payload.len() == PULSE_COMMAND_LEN => decode_pulse(payload),
        _ if payload.len() == VIBRATION_COMMAND_LEN => decode_vibration(payload),
        other => Err(unrecognized(Characteristic::VibrationCommand, other)),
    }
}

fn decode_vibration(payload: &[u8]) -> core::result::Result<Request, CodecError> {
    let mut reader = PayloadReader::new(payload, "vibration command");
    let channel = reader.u8()?;
    let pattern = VibrationPattern::try_from(reader.u8()?)?;
    let intensity = match reader.u16()? {
        DEFAULT_INTENSITY_WIDE => None,
        value => Some(u8::try_from(value).map_err(|_| CodecError::OutOfRange {
            field: "intensity",
            value: value as u32,
        })?),
    };
    reader.skip(2)?;
    let orientation_type = reader.u8()?;
    let orientation = Orientation::from_wire(orientation_type, reader.u16()?)?;
    reader.skip(2)?;
    let iterations = reader.u8()?;
    let spec = VibrationSpec {
        pattern,
        intensity,
        orientation,
        iterations: (iterations != 0).then_some(iterations),
        period_ms: reader.u16()?,
        start_time_ms: reader.u16()?,
        exclusive: reader.u8()? != 0,
        clear_other_channels: reader.u8()? != 0,
    };
    Ok(Request::Vibrate { channel, spec })
}

fn decode_pulse(payload: &[u8]) -> core::result::Result<Request, CodecError> {
    let mut reader = PayloadReader::new(payload, "pulse command");
    reader.skip(1)?;
    let channel = reader.u8()?;
    let orientation_type = reader.u8()?;
    let orientation = Orientation::from_wire(orientation_type, reader.u16()?)?;
    let intensity = match reader.u8()? {
        DEFAULT_INTENSITY_NARROW => None,
        value => Some(value),
    };
    let on_duration_ms = reader.u16()?;
    let pulse_iterations = reader.u8()?;
    let series_iterations = reader.u8()?;
    let spec = PulseSpec {
        orientation,
        intensity,
        on_duration_ms,
        pulse_iterations,
        series_iterations: (series_iterations != 0).then_some(series_iterations),
        pulse_period_ms: reader.u16()?,
        series_period_ms: reader.u16()?,
        timer_option: TimerOption::try_from(reader.u8()?)?,
        exclusive: reader.u8()? != 0,
        clear_other_channels: reader.u8()? != 0,
    };
    Ok(Request::Pulse { channel, spec })
}
