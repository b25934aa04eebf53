//! Vibration patterns, pulse trains and their parameter ranges

use serde::{Deserialize, Serialize};

use crate::errors::{BeltError, CodecError, Result};

/// Default period of the continuous signal used for angle and bearing vibrations
pub const DEFAULT_SIGNAL_PERIOD_MS: u16 = 500;

/// Highest pattern identifier understood by the firmware
pub const MAX_PATTERN_ID: u8 = 26;

/// Largest finite iteration count
pub const MAX_ITERATIONS: u8 = 127;

/// Largest explicit intensity in percent
pub const MAX_INTENSITY: u8 = 100;

// ----------------------------------------------------------------------------
// Orientation
// ----------------------------------------------------------------------------

/// Where on the belt a signal is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Bit mask of motors, bit 0 being the front motor
    BinaryMask(u16),
    /// A single motor, in [0, 15]
    MotorIndex(u8),
    /// Degrees clockwise from the front of the user, in [0, 359]
    Angle(u16),
    /// Degrees clockwise from magnetic North, in [0, 359]
    MagneticBearing(u16),
}

impl Orientation {
    pub fn angle(degrees: i32) -> Self {
        Orientation::Angle(degrees.rem_euclid(360) as u16)
    }

    pub fn bearing(degrees: i32) -> Self {
        Orientation::MagneticBearing(degrees.rem_euclid(360) as u16)
    }

    pub fn motor(index: u8) -> Self {
        Orientation::MotorIndex(index % 16)
    }

    pub fn type_code(&self) -> u8 {
        match self {
            Orientation::BinaryMask(_) => 0,
            Orientation::MotorIndex(_) => 1,
            Orientation::Angle(_) => 2,
            Orientation::MagneticBearing(_) => 3,
        }
    }

    /// Wire value, normalized to the range of the orientation type
    pub fn wire_value(&self) -> u16 {
        match *self {
            Orientation::BinaryMask(mask) => mask,
            Orientation::MotorIndex(index) => (index % 16) as u16,
            Orientation::Angle(degrees) | Orientation::MagneticBearing(degrees) => degrees % 360,
        }
    }

    pub fn from_wire(type_code: u8, value: u16) -> core::result::Result<Self, CodecError> {
        match type_code {
            0 => Ok(Orientation::BinaryMask(value)),
            1 => Ok(Orientation::MotorIndex((value % 16) as u8)),
            2 => Ok(Orientation::Angle(value % 360)),
            3 => Ok(Orientation::MagneticBearing(value % 360)),
            other => Err(CodecError::OutOfRange {
                field: "orientation type",
                value: other as u32,
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Patterns and Options
// ----------------------------------------------------------------------------

/// Vibration pattern identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VibrationPattern {
    NoVibration,
    Continuous,
    SingleShort,
    SingleLong,
    DoubleShort,
    DoubleLong,
    /// Further firmware patterns, identifiers 6 to 26
    Other(u8),
}

impl VibrationPattern {
    pub fn as_u8(self) -> u8 {
        match self {
            VibrationPattern::NoVibration => 0,
            VibrationPattern::Continuous => 1,
            VibrationPattern::SingleShort => 2,
            VibrationPattern::SingleLong => 3,
            VibrationPattern::DoubleShort => 4,
            VibrationPattern::DoubleLong => 5,
            VibrationPattern::Other(id) => id,
        }
    }
}

impl TryFrom<u8> for VibrationPattern {
    type Error = CodecError;

    fn try_from(value: u8) -> core::result::Result<Self, Self::Error> {
        Ok(match value {
            0 => VibrationPattern::NoVibration,
            1 => VibrationPattern::Continuous,
            2 => VibrationPattern::SingleShort,
            3 => VibrationPattern::SingleLong,
            4 => VibrationPattern::DoubleShort,
            5 => VibrationPattern::DoubleLong,
            id if id <= MAX_PATTERN_ID => VibrationPattern::Other(id),
            id => {
                return Err(CodecError::OutOfRange {
                    field: "pattern",
                    value: id as u32,
                })
            }
        })
    }
}

/// How a pulse command treats the channel timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TimerOption {
    #[default]
    ResetTimer = 0,
    ResetOnDifferentPeriod = 1,
    KeepTimer = 2,
}

impl TryFrom<u8> for TimerOption {
    type Error = CodecError;

    fn try_from(value: u8) -> core::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(TimerOption::ResetTimer),
            1 => Ok(TimerOption::ResetOnDifferentPeriod),
            2 => Ok(TimerOption::KeepTimer),
            other => Err(CodecError::OutOfRange {
                field: "timer option",
                value: other as u32,
            }),
        }
    }
}

fn check_intensity(intensity: Option<u8>) -> Result<()> {
    match intensity {
        Some(value) if value > MAX_INTENSITY => Err(BeltError::invalid_parameter(format!(
            "intensity {} exceeds {}",
            value, MAX_INTENSITY
        ))),
        _ => Ok(()),
    }
}

fn check_iterations(field: &str, iterations: Option<u8>) -> Result<()> {
    match iterations {
        Some(0) => Err(BeltError::invalid_parameter(format!(
            "{} must be at least 1, use None for an unbounded signal",
            field
        ))),
        Some(value) if value > MAX_ITERATIONS => Err(BeltError::invalid_parameter(format!(
            "{} {} exceeds {}",
            field, value, MAX_ITERATIONS
        ))),
        _ => Ok(()),
    }
}

fn check_nonzero(field: &str, value: u16) -> Result<()> {
    if value == 0 {
        return Err(BeltError::invalid_parameter(format!("{} must be at least 1 ms", field)));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Vibration Specification
// ----------------------------------------------------------------------------

/// Parameters of a vibration command on one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VibrationSpec {
    pub pattern: VibrationPattern,
    /// Intensity in percent, `None` for the belt's default intensity
    pub intensity: Option<u8>,
    pub orientation: Orientation,
    /// Number of pattern repetitions, `None` for an unbounded signal
    pub iterations: Option<u8>,
    pub period_ms: u16,
    /// Offset of the signal start within the period
    pub start_time_ms: u16,
    /// Suppress other channels while this one is active
    pub exclusive: bool,
    /// Stop every other channel when starting this one
    pub clear_other_channels: bool,
}

impl VibrationSpec {
    /// Unbounded continuous signal at the given orientation
    pub fn continuous(orientation: Orientation) -> Self {
        Self {
            pattern: VibrationPattern::Continuous,
            intensity: None,
            orientation,
            iterations: None,
            period_ms: DEFAULT_SIGNAL_PERIOD_MS,
            start_time_ms: 0,
            exclusive: false,
            clear_other_channels: false,
        }
    }

    pub fn with_pattern(mut self, pattern: VibrationPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_intensity(mut self, intensity: Option<u8>) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_iterations(mut self, iterations: Option<u8>) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_period(mut self, period_ms: u16) -> Self {
        self.period_ms = period_ms;
        self
    }

    pub fn with_start_time(mut self, start_time_ms: u16) -> Self {
        self.start_time_ms = start_time_ms;
        self
    }

    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn with_clear_other_channels(mut self, clear: bool) -> Self {
        self.clear_other_channels = clear;
        self
    }

    /// True when the signal ends on its own
    pub fn is_bounded(&self) -> bool {
        self.iterations.is_some() || self.pattern == VibrationPattern::NoVibration
    }

    pub fn validate(&self) -> Result<()> {
        check_intensity(self.intensity)?;
        check_iterations("iterations", self.iterations)?;
        check_nonzero("period", self.period_ms)?;
        if self.pattern.as_u8() > MAX_PATTERN_ID {
            return Err(BeltError::invalid_parameter(format!(
                "pattern {} exceeds {}",
                self.pattern.as_u8(),
                MAX_PATTERN_ID
            )));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Pulse Specification
// ----------------------------------------------------------------------------

/// Parameters of a pulse train: a series of pulses, itself repeated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseSpec {
    pub orientation: Orientation,
    /// Intensity in percent, `None` for the belt's default intensity
    pub intensity: Option<u8>,
    pub on_duration_ms: u16,
    pub pulse_period_ms: u16,
    /// Pulses per series, at least 1
    pub pulse_iterations: u8,
    pub series_period_ms: u16,
    /// Number of series, `None` for an unbounded train
    pub series_iterations: Option<u8>,
    pub timer_option: TimerOption,
    pub exclusive: bool,
    pub clear_other_channels: bool,
}

impl PulseSpec {
    /// A single series of `pulse_iterations` pulses
    pub fn new(orientation: Orientation, on_duration_ms: u16, pulse_period_ms: u16, pulse_iterations: u8) -> Self {
        Self {
            orientation,
            intensity: None,
            on_duration_ms,
            pulse_period_ms,
            pulse_iterations,
            series_period_ms: pulse_period_ms.saturating_mul(pulse_iterations.max(1) as u16),
            series_iterations: Some(1),
            timer_option: TimerOption::ResetTimer,
            exclusive: false,
            clear_other_channels: false,
        }
    }

    pub fn with_intensity(mut self, intensity: Option<u8>) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_series(mut self, series_period_ms: u16, series_iterations: Option<u8>) -> Self {
        self.series_period_ms = series_period_ms;
        self.series_iterations = series_iterations;
        self
    }

    pub fn with_timer_option(mut self, timer_option: TimerOption) -> Self {
        self.timer_option = timer_option;
        self
    }

    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn with_clear_other_channels(mut self, clear: bool) -> Self {
        self.clear_other_channels = clear;
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.series_iterations.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        check_intensity(self.intensity)?;
        check_nonzero("on duration", self.on_duration_ms)?;
        check_nonzero("pulse period", self.pulse_period_ms)?;
        check_nonzero("series period", self.series_period_ms)?;
        if self.pulse_iterations == 0 {
            return Err(BeltError::invalid_parameter("pulse iterations must be at least 1"));
        }
        check_iterations("series iterations", self.series_iterations)
    }
}

// ----------------------------------------------------------------------------
// Channel Pattern
// ----------------------------------------------------------------------------

/// Category of signal held by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKind {
    ContinuousAtAngle,
    ContinuousAtBearing,
    CustomIntensityPattern,
    PulsePattern,
}

/// Signal requested on a vibration channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelPattern {
    Vibration(VibrationSpec),
    Pulses(PulseSpec),
}

impl ChannelPattern {
    /// Unbounded continuous vibration at an angle relative to the user
    pub fn at_angle(degrees: i32) -> Self {
        ChannelPattern::Vibration(VibrationSpec::continuous(Orientation::angle(degrees)))
    }

    /// Unbounded continuous vibration towards a magnetic bearing
    pub fn at_bearing(degrees: i32) -> Self {
        ChannelPattern::Vibration(VibrationSpec::continuous(Orientation::bearing(degrees)))
    }

    pub fn kind(&self) -> PatternKind {
        match self {
            ChannelPattern::Pulses(_) => PatternKind::PulsePattern,
            ChannelPattern::Vibration(spec)
                if spec.pattern == VibrationPattern::Continuous && spec.iterations.is_none() =>
            {
                match spec.orientation {
                    Orientation::Angle(_) => PatternKind::ContinuousAtAngle,
                    Orientation::MagneticBearing(_) => PatternKind::ContinuousAtBearing,
                    _ => PatternKind::CustomIntensityPattern,
                }
            }
            ChannelPattern::Vibration(_) => PatternKind::CustomIntensityPattern,
        }
    }

    pub fn is_bounded(&self) -> bool {
        match self {
            ChannelPattern::Vibration(spec) => spec.is_bounded(),
            ChannelPattern::Pulses(spec) => spec.is_bounded(),
        }
    }

    pub fn clears_other_channels(&self) -> bool {
        match self {
            ChannelPattern::Vibration(spec) => spec.clear_other_channels,
            ChannelPattern::Pulses(spec) => spec.clear_other_channels,
        }
    }

    /// True when the pattern leaves the channel idle
    pub fn is_silent(&self) -> bool {
        matches!(self, ChannelPattern::Vibration(spec) if spec.pattern == VibrationPattern::NoVibration)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ChannelPattern::Vibration(spec) => spec.validate(),
            ChannelPattern::Pulses(spec) => spec.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_normalization() {
        assert_eq!(Orientation::angle(-90), Orientation::Angle(270));
        assert_eq!(Orientation::angle(720), Orientation::Angle(0));
        assert_eq!(Orientation::bearing(361), Orientation::MagneticBearing(1));
        assert_eq!(Orientation::motor(17), Orientation::MotorIndex(1));
        assert_eq!(Orientation::Angle(400).wire_value(), 40);
    }

    #[test]
    fn test_pattern_kinds() {
        assert_eq!(ChannelPattern::at_angle(45).kind(), PatternKind::ContinuousAtAngle);
        assert_eq!(ChannelPattern::at_bearing(45).kind(), PatternKind::ContinuousAtBearing);

        let custom = VibrationSpec::continuous(Orientation::motor(3))
            .with_pattern(VibrationPattern::DoubleShort)
            .with_iterations(Some(2));
        assert_eq!(ChannelPattern::Vibration(custom).kind(), PatternKind::CustomIntensityPattern);

        let pulses = PulseSpec::new(Orientation::angle(0), 100, 400, 3);
        assert_eq!(ChannelPattern::Pulses(pulses).kind(), PatternKind::PulsePattern);
    }

    #[test]
    fn test_bounded_duration() {
        assert!(!ChannelPattern::at_angle(0).is_bounded());

        let bounded = VibrationSpec::continuous(Orientation::angle(0)).with_iterations(Some(1));
        assert!(ChannelPattern::Vibration(bounded).is_bounded());

        let silent = VibrationSpec::continuous(Orientation::angle(0)).with_pattern(VibrationPattern::NoVibration);
        assert!(ChannelPattern::Vibration(silent).is_bounded());

        let pulses = PulseSpec::new(Orientation::angle(0), 100, 400, 3);
        assert!(pulses.is_bounded());
        assert!(!pulses.with_series(1200, None).is_bounded());
    }

    #[test]
    fn test_parameter_ranges() {
        let spec = VibrationSpec::continuous(Orientation::angle(0));
        assert!(spec.clone().with_intensity(Some(100)).validate().is_ok());
        assert!(spec.clone().with_intensity(Some(101)).validate().is_err());
        assert!(spec.clone().with_iterations(Some(0)).validate().is_err());
        assert!(spec.clone().with_iterations(Some(128)).validate().is_err());
        assert!(spec.clone().with_period(0).validate().is_err());
        assert!(spec.with_pattern(VibrationPattern::Other(27)).validate().is_err());

        let pulses = PulseSpec::new(Orientation::angle(0), 100, 400, 3);
        assert!(pulses.validate().is_ok());
        assert!(PulseSpec::new(Orientation::angle(0), 0, 400, 3).validate().is_err());
        assert!(PulseSpec::new(Orientation::angle(0), 100, 400, 0).validate().is_err());
    }

    #[test]
    fn test_pattern_identifiers() {
        assert_eq!(VibrationPattern::try_from(4).unwrap(), VibrationPattern::DoubleShort);
        assert_eq!(VibrationPattern::try_from(26).unwrap(), VibrationPattern::Other(26));
        assert!(VibrationPattern::try_from(27).is_err());
        assert!(TimerOption::try_from(3).is_err());
    }
}
