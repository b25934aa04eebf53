//! Vibration channel model
//!
//! Tracks the requested state of the six vibration channels and enforces
//! the mode constraint: outside of app mode only channel 0 is usable, and
//! only with a signal that ends on its own.

use serde::{Deserialize, Serialize};

use crate::errors::{BeltError, Result};
use crate::protocol::Request;
use crate::types::{OperatingMode, BASE_CHANNEL, CHANNEL_COUNT};
use crate::vibration::{ChannelPattern, PatternKind};

/// Requested state of one channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VibrationChannel {
    pub active: bool,
    pub pattern: Option<ChannelPattern>,
}

impl VibrationChannel {
    pub fn kind(&self) -> Option<PatternKind> {
        self.pattern.as_ref().map(ChannelPattern::kind)
    }
}

/// True when a vibration request is allowed in the given mode
pub fn vibration_permitted(channel: u8, pattern: &ChannelPattern, mode: OperatingMode) -> bool {
    mode.is_app_mode() || (channel == BASE_CHANNEL && pattern.is_bounded())
}

fn check_channel_index(channel: u8) -> Result<()> {
    if channel as usize >= CHANNEL_COUNT {
        return Err(BeltError::InvalidChannel { channel });
    }
    Ok(())
}

/// State of all vibration channels of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelModel {
    channels: [VibrationChannel; CHANNEL_COUNT],
}

impl ChannelModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, index: u8) -> Option<&VibrationChannel> {
        self.channels.get(index as usize)
    }

    pub fn channels(&self) -> &[VibrationChannel] {
        &self.channels
    }

    /// Indices of channels currently marked active
    pub fn active_channels(&self) -> Vec<u8> {
        (0..CHANNEL_COUNT as u8)
            .filter(|index| self.channels[*index as usize].active)
            .collect()
    }

    /// Validate a vibration request and record it
    ///
    /// The channel state is updated optimistically, before the belt
    /// acknowledges the command. On error nothing changes.
    pub fn request_vibration(&mut self, channel: u8, pattern: ChannelPattern, mode: OperatingMode) -> Result<Request> {
        check_channel_index(channel)?;
        pattern.validate()?;
        if !vibration_permitted(channel, &pattern, mode) {
            return Err(BeltError::ModeNotPermitted { channel, mode });
        }

        let request = match &pattern {
            ChannelPattern::Vibration(spec) => Request::Vibrate {
                channel,
                spec: spec.clone(),
            },
            ChannelPattern::Pulses(spec) => Request::Pulse {
                channel,
                spec: spec.clone(),
            },
        };

        if pattern.clears_other_channels() {
            for (index, other) in self.channels.iter_mut().enumerate() {
                if index != channel as usize {
                    *other = VibrationChannel::default();
                }
            }
        }
        self.channels[channel as usize] = VibrationChannel {
            active: !pattern.is_silent(),
            pattern: Some(pattern),
        };
        Ok(request)
    }

    /// Validate a stop request and record it
    ///
    /// `None` stops every channel and needs app mode, as does stopping any
    /// channel other than channel 0.
    pub fn stop_vibration(&mut self, channel: Option<u8>, mode: OperatingMode) -> Result<Request> {
        if let Some(index) = channel {
            check_channel_index(index)?;
        }
        if !mode.is_app_mode() && channel != Some(BASE_CHANNEL) {
            return Err(BeltError::ModeNotPermitted {
                channel: channel.unwrap_or(BASE_CHANNEL),
                mode,
            });
        }

        match channel {
            Some(index) => self.channels[index as usize] = VibrationChannel::default(),
            None => self.reset(),
        }
        Ok(Request::Stop { channel })
    }

    /// Clear every channel
    pub fn reset(&mut self) {
        self.channels = Default::default();
    }
}
