//! Session aggregate
//!
//! All mutable state of one connect-to-disconnect lifecycle lives here and is
//! guarded by a single lock shared by the controller, the command engine and
//! the dispatcher task. Events are emitted while the lock is held so that
//! their order matches the order of the state changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use navibelt_core::protocol::{AckMatch, AckMatcher};
use navibelt_core::{
    BeltEvent, BeltTransport, ChannelModel, ConnectionEffect, ConnectionEvent, ConnectionState, DeviceMessage,
    DeviceParameters, ModeChangeCause, OperatingMode, RawFrame, Request, Result, StateTransition,
};

use crate::engine::CommandId;

// ----------------------------------------------------------------------------
// Pending Commands
// ----------------------------------------------------------------------------

/// How a pending command was resolved by someone other than its submitter
#[derive(Debug)]
pub(crate) enum Resolution {
    Acknowledged(RawFrame),
    Rejected { reason: u8 },
    Cancelled,
    Disconnected,
}

/// The command awaiting its acknowledgment
#[derive(Debug)]
pub(crate) struct PendingCommand {
    pub id: CommandId,
    pub request: Request,
    pub matcher: AckMatcher,
    pub issued_at: Instant,
    pub responder: oneshot::Sender<Resolution>,
}

impl PendingCommand {
    pub fn resolve(self, resolution: Resolution) {
        if self.responder.send(resolution).is_err() {
            debug!("Command {} resolved after its submitter gave up", self.id);
        }
    }
}

/// Result of feeding a device message into the session
#[derive(Debug, Default)]
pub(crate) struct MessageEffects {
    /// The belt expects a keep-alive reply
    pub reply_keep_alive: bool,
    /// The belt announced it is switching off
    pub powered_off: bool,
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Mutable state of the belt link
pub struct Session {
    state: ConnectionState,
    mode: Option<OperatingMode>,
    channels: ChannelModel,
    parameters: DeviceParameters,
    pending: Option<PendingCommand>,
    queued: HashMap<CommandId, oneshot::Sender<()>>,
    transport: Option<Arc<dyn BeltTransport>>,
    /// Incremented for every link, so a stale dispatcher cannot touch a newer one
    epoch: u64,
    events: mpsc::UnboundedSender<BeltEvent>,
}

impl Session {
    pub(crate) fn new(events: mpsc::UnboundedSender<BeltEvent>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            mode: None,
            channels: ChannelModel::new(),
            parameters: DeviceParameters::default(),
            pending: None,
            queued: HashMap::new(),
            transport: None,
            epoch: 0,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Operating mode, defined only while connected
    pub fn mode(&self) -> Option<OperatingMode> {
        self.mode.filter(|_| self.state == ConnectionState::Connected)
    }

    /// Mode reported so far, including during the handshake
    pub(crate) fn reported_mode(&self) -> Option<OperatingMode> {
        self.mode
    }

    pub fn channels(&self) -> &ChannelModel {
        &self.channels
    }

    pub(crate) fn channels_mut(&mut self) -> &mut ChannelModel {
        &mut self.channels
    }

    pub fn parameters(&self) -> &DeviceParameters {
        &self.parameters
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn BeltTransport>> {
        self.transport.clone()
    }

    pub(crate) fn emit(&self, event: BeltEvent) {
        if self.events.send(event).is_err() {
            debug!("Event dropped, delivery queue closed");
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Apply a connection event and carry out its session-local effects
    ///
    /// Closing the link is left to the caller, which must not hold the lock
    /// while awaiting transport I/O.
    pub(crate) fn apply(&mut self, event: ConnectionEvent) -> Result<StateTransition> {
        let transition = self.state.transition(event)?;
        debug!(
            "Connection {} -> {} on {}",
            transition.audit_entry.from_state, transition.audit_entry.to_state, transition.audit_entry.event
        );
        self.state = transition.new_state;
        for effect in &transition.effects {
            match effect {
                ConnectionEffect::ResetSession => self.reset(),
                ConnectionEffect::FailPending => self.fail_pending(),
                ConnectionEffect::CloseLink => {}
            }
        }
        Ok(transition)
    }

    /// Start a new link generation and return its epoch
    pub(crate) fn begin_link(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    pub(crate) fn attach(&mut self, transport: Arc<dyn BeltTransport>) {
        self.transport = Some(transport);
    }

    pub(crate) fn detach(&mut self) -> Option<Arc<dyn BeltTransport>> {
        self.transport.take()
    }

    fn reset(&mut self) {
        self.mode = None;
        self.channels.reset();
        self.parameters = DeviceParameters::default();
    }

    fn fail_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!("Failing pending {} command {}", pending.request.name(), pending.id);
            pending.resolve(Resolution::Disconnected);
        }
    }

    // ------------------------------------------------------------------------
    // Command Bookkeeping
    // ------------------------------------------------------------------------

    pub(crate) fn register_pending(&mut self, pending: PendingCommand) {
        if let Some(previous) = self.pending.replace(pending) {
            warn!("Replacing pending command {} without resolution", previous.id);
            previous.resolve(Resolution::Cancelled);
        }
    }

    /// Remove the pending command if it is the given one
    pub(crate) fn take_pending(&mut self, id: CommandId) -> Option<PendingCommand> {
        match &self.pending {
            Some(pending) if pending.id == id => self.pending.take(),
            _ => None,
        }
    }

    pub(crate) fn enqueue(&mut self, id: CommandId, cancel: oneshot::Sender<()>) {
        self.queued.insert(id, cancel);
    }

    /// Remove a queued command, false when it was cancelled meanwhile
    pub(crate) fn dequeue(&mut self, id: CommandId) -> bool {
        self.queued.remove(&id).is_some()
    }

    /// Forget a command whose submitter stopped waiting
    pub(crate) fn abandon(&mut self, id: CommandId) {
        let queued = self.dequeue(id);
        let pending = self.take_pending(id).is_some();
        if queued || pending {
            debug!("Command {} abandoned by its caller", id);
        }
    }

    #[cfg(test)]
    pub(crate) fn has_queued(&self) -> bool {
        !self.queued.is_empty()
    }

    /// Cancel a queued or pending command
    pub(crate) fn cancel(&mut self, id: CommandId) -> bool {
        if let Some(cancel) = self.queued.remove(&id) {
            let _ = cancel.send(());
            return true;
        }
        match self.take_pending(id) {
            Some(pending) => {
                pending.resolve(Resolution::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Resolve the pending command if the frame answers it
    ///
    /// Returns the request that was acknowledged.
    pub(crate) fn resolve_with(&mut self, frame: &RawFrame) -> Option<Request> {
        let outcome = self.pending.as_ref()?.matcher.classify(frame)?;
        let pending = self.pending.take()?;
        let request = pending.request.clone();
        debug!(
            "Command {} ({}) resolved as {:?} after {:?}",
            pending.id,
            request.name(),
            outcome,
            pending.issued_at.elapsed()
        );
        match outcome {
            AckMatch::Acknowledged => pending.resolve(Resolution::Acknowledged(frame.clone())),
            AckMatch::Rejected { reason } => pending.resolve(Resolution::Rejected { reason }),
        }
        Some(request)
    }

    /// Peek whether a frame answers the pending command
    pub(crate) fn matches_pending(&self, frame: &RawFrame) -> Option<&Request> {
        let pending = self.pending.as_ref()?;
        pending.matcher.classify(frame).map(|_| &pending.request)
    }

    // ------------------------------------------------------------------------
    // Device State
    // ------------------------------------------------------------------------

    /// Record a mode report, emitting `ModeChanged` on an actual change
    ///
    /// Leaving app mode clears the channel model. While the handshake is
    /// running the mode is recorded silently.
    pub(crate) fn update_mode(&mut self, mode: OperatingMode, cause: ModeChangeCause) {
        if !self.state.is_active() || self.mode == Some(mode) {
            return;
        }
        let previous = self.mode.replace(mode);
        if previous == Some(OperatingMode::AppMode) || !mode.is_app_mode() {
            self.channels.reset();
        }
        if self.state == ConnectionState::Connected {
            self.emit(BeltEvent::ModeChanged { mode, cause });
        }
    }

    /// Update the session from a decoded device message and emit events
    ///
    /// `acknowledged` is the request the message answered, if any.
    pub(crate) fn apply_message(&mut self, message: &DeviceMessage, acknowledged: Option<&Request>) -> MessageEffects {
        let mut effects = MessageEffects::default();
        if !self.state.is_active() {
            debug!("Ignoring {:?} while {}", message, self.state);
            return effects;
        }
        let connected = self.state == ConnectionState::Connected;

        match message {
            DeviceMessage::ModeReport(mode) => {
                let cause = match acknowledged {
                    Some(Request::SetMode(_)) => ModeChangeCause::Local,
                    _ => ModeChangeCause::Device,
                };
                self.update_mode(*mode, cause);
                effects.powered_off = *mode == OperatingMode::Standby;
            }
            DeviceMessage::KeepAlive { mode } => {
                self.update_mode(*mode, ModeChangeCause::Device);
                effects.reply_keep_alive = true;
            }
            DeviceMessage::ButtonPress {
                button,
                previous_mode,
                new_mode,
                ..
            } => {
                self.emit(BeltEvent::ButtonPressed {
                    button: *button,
                    previous_mode: *previous_mode,
                    new_mode: *new_mode,
                });
                self.update_mode(*new_mode, ModeChangeCause::ButtonPress);
                effects.powered_off = *new_mode == OperatingMode::Standby;
            }
            DeviceMessage::Orientation(report) => self.emit(BeltEvent::OrientationUpdate {
                heading: report.heading,
                accurate: report.accurate,
                report: *report,
            }),
            DeviceMessage::Battery(report) => self.emit(BeltEvent::BatteryUpdate {
                level: report.charge_level(),
                status: report.status,
                report: *report,
            }),
            DeviceMessage::DefaultIntensity(intensity) => {
                self.parameters.default_intensity = Some(*intensity);
                if connected {
                    self.emit(BeltEvent::DefaultIntensityChanged(*intensity));
                }
            }
            DeviceMessage::HeadingOffset(offset) => {
                self.parameters.heading_offset = Some(*offset);
                if connected {
                    self.emit(BeltEvent::HeadingOffsetChanged(*offset));
                }
            }
            DeviceMessage::BluetoothName(name) => {
                self.parameters.bluetooth_name = Some(name.clone());
                if connected {
                    self.emit(BeltEvent::BluetoothNameChanged(name.clone()));
                }
            }
            DeviceMessage::InaccurateSignalState { in_app, in_compass } => {
                self.parameters.inaccurate_signal_state = Some((*in_app, *in_compass));
                if connected {
                    self.emit(BeltEvent::InaccurateSignalStateChanged {
                        in_app: *in_app,
                        in_compass: *in_compass,
                    });
                }
            }
            DeviceMessage::PairingRequirement(required) => {
                self.parameters.pairing_required = Some(*required);
                if connected {
                    self.emit(BeltEvent::PairingRequirementChanged(*required));
                }
            }
            DeviceMessage::FirmwareVersion(version) => {
                self.parameters.firmware_version = Some(*version);
                if connected {
                    self.emit(BeltEvent::FirmwareVersion(*version));
                }
            }
            DeviceMessage::OrientationNotificationPeriod(period_ms) => {
                debug!("Orientation notification period set to {} ms", period_ms);
            }
            DeviceMessage::Rejection { request_key, reason } => {
                if acknowledged.is_none() {
                    warn!(
                        "Belt rejected request {} with reason {:#04x} but no command was pending",
                        hex_key(request_key),
                        reason
                    );
                }
            }
        }
        effects
    }
}

fn hex_key(key: &[u8; 2]) -> String {
    format!("{:02x}{:02x}", key[0], key[1])
}
