//! Belt controller
//!
//! Public command surface of the runtime. A controller owns one session and
//! drives the connect handshake, the disconnect sequence and every command
//! the application issues to the belt.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use navibelt_core::{
    BeltConfig, BeltConnector, BeltError, BeltEvent, Characteristic, ChannelPattern, ConnectionEvent,
    ConnectionState, DeviceMessage, DeviceParameters, OperatingMode, Orientation, PulseSpec, Request, Result,
    TransportError, TransportType, VibrationChannel, VibrationSpec,
};

use crate::dispatcher::{finish_link, spawn_dispatcher};
use crate::engine::{Acknowledgment, Command, CommandEngine, CommandId};
use crate::observer::{BeltObserver, ChannelObserver, ObserverRegistry};
use crate::session::Session;

/// First firmware version accepting a custom orientation notification period
pub const MIN_FIRMWARE_ORIENTATION_PERIOD: u16 = 52;

// ----------------------------------------------------------------------------
// Vibration Options
// ----------------------------------------------------------------------------

/// Options of the angle and bearing vibration helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VibrationOptions {
    /// Intensity in percent, `None` for the belt's default intensity
    pub intensity: Option<u8>,
    pub clear_other_channels: bool,
    /// Switch the belt to app mode before vibrating
    pub switch_to_app_mode: bool,
}

impl VibrationOptions {
    pub fn with_intensity(mut self, intensity: u8) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn with_clear_other_channels(mut self, clear: bool) -> Self {
        self.clear_other_channels = clear;
        self
    }

    pub fn with_switch_to_app_mode(mut self, switch: bool) -> Self {
        self.switch_to_app_mode = switch;
        self
    }
}

// ----------------------------------------------------------------------------
// Controller
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Lifecycle {
    connector: Option<Arc<dyn BeltConnector>>,
    dispatcher: Option<JoinHandle<()>>,
}

struct ControllerInner {
    config: BeltConfig,
    session: Arc<Mutex<Session>>,
    engine: CommandEngine,
    observers: ObserverRegistry,
    lifecycle: Mutex<Lifecycle>,
    delivery: JoinHandle<()>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.delivery.abort();
        if let Ok(mut lifecycle) = self.lifecycle.try_lock() {
            if let Some(dispatcher) = lifecycle.dispatcher.take() {
                dispatcher.abort();
            }
        }
    }
}

/// Controls one belt over any transport
///
/// Cloning is cheap and clones share the session. Must be created inside a
/// Tokio runtime.
#[derive(Clone)]
pub struct BeltController {
    inner: Arc<ControllerInner>,
}

impl BeltController {
    pub fn new(config: BeltConfig) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Mutex::new(Session::new(events_tx)));
        let observers = ObserverRegistry::new();
        let delivery = observers.spawn_delivery(events_rx);
        let engine = CommandEngine::new(session.clone(), config.clone());
        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                session,
                engine,
                observers,
                lifecycle: Mutex::new(Lifecycle::default()),
                delivery,
            }),
        })
    }

    pub fn config(&self) -> &BeltConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    pub async fn add_observer(&self, observer: Arc<dyn BeltObserver>) {
        self.inner.observers.add(observer).await;
    }

    pub async fn remove_observer(&self, observer: &Arc<dyn BeltObserver>) -> bool {
        self.inner.observers.remove(observer).await
    }

    /// Receive every event from now on through a channel
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<BeltEvent> {
        let (observer, receiver) = ChannelObserver::new();
        self.add_observer(Arc::new(observer)).await;
        receiver
    }

    // ------------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------------

    /// Open a link to the belt and run the handshake
    ///
    /// Resolves once the belt reported its mode and the session is
    /// connected. On failure the session is back to disconnected.
    pub async fn connect(&self, connector: Arc<dyn BeltConnector>) -> Result<()> {
        let epoch = {
            let mut session = self.inner.session.lock().await;
            session.apply(ConnectionEvent::ConnectRequested)?;
            session.emit(BeltEvent::ConnectionStateChanged {
                state: ConnectionState::Connecting,
                error: None,
            });
            session.begin_link()
        };
        self.inner.lifecycle.lock().await.connector = Some(connector.clone());
        info!("Connecting to belt {} over {}", connector.target(), connector.transport_type());

        match self.open_link(connector.as_ref(), epoch).await {
            Ok(()) => Ok(()),
            Err(error) => {
                let reason = error.to_string();
                warn!("Connection to {} failed: {}", connector.target(), reason);
                self.abort_connect(epoch, &reason).await;
                Err(BeltError::ConnectionFailed { reason })
            }
        }
    }

    /// Connect again using the connector of the last connection
    pub async fn reconnect(&self) -> Result<()> {
        let connector = self
            .inner
            .lifecycle
            .lock()
            .await
            .connector
            .clone()
            .ok_or_else(|| BeltError::ConnectionFailed {
                reason: "no previous connection".into(),
            })?;
        self.connect(connector).await
    }

    async fn open_link(&self, connector: &dyn BeltConnector, epoch: u64) -> Result<()> {
        let transport = connector.open().await?;
        let Some(inbound) = transport.take_inbound() else {
            let _ = transport.close().await;
            return Err(TransportError::InboundTaken.into());
        };
        {
            let mut session = self.inner.session.lock().await;
            if session.epoch() != epoch || session.state() != ConnectionState::Connecting {
                drop(session);
                let _ = transport.close().await;
                return Err(BeltError::Disconnected);
            }
            session.attach(transport);
        }
        let dispatcher = spawn_dispatcher(self.inner.session.clone(), epoch, inbound);
        if let Some(previous) = self.inner.lifecycle.lock().await.dispatcher.replace(dispatcher) {
            previous.abort();
        }

        self.handshake().await?;

        let mut session = self.inner.session.lock().await;
        if session.epoch() != epoch {
            return Err(BeltError::Disconnected);
        }
        let Some(mode) = session.reported_mode() else {
            return Err(BeltError::ConnectionFailed {
                reason: "belt did not report its operating mode".into(),
            });
        };
        session.apply(ConnectionEvent::HandshakeCompleted)?;
        session.emit(BeltEvent::ConnectionStateChanged {
            state: ConnectionState::Connected,
            error: None,
        });
        info!("Connected to belt in {} mode", mode);
        Ok(())
    }

    /// Subscribe notifications and read the belt parameters
    async fn handshake(&self) -> Result<()> {
        let subscribe = |characteristic| Request::SetNotifications {
            characteristic,
            enabled: true,
        };
        let steps = if self.inner.config.handshake {
            vec![
                subscribe(Characteristic::KeepAlive),
                subscribe(Characteristic::ParameterNotification),
                Request::QueryMode,
                Request::QueryDefaultIntensity,
                Request::ReadFirmwareVersion,
                Request::QueryHeadingOffset,
                Request::QueryInaccurateSignalState,
                subscribe(Characteristic::ButtonPress),
                subscribe(Characteristic::OrientationData),
                subscribe(Characteristic::BatteryStatus),
            ]
        } else {
            vec![subscribe(Characteristic::ParameterNotification), Request::QueryMode]
        };
        for request in steps {
            debug!("Handshake step {}", request.name());
            self.inner.engine.execute(request).await?;
        }
        Ok(())
    }

    async fn abort_connect(&self, epoch: u64, reason: &str) {
        let transport = {
            let mut session = self.inner.session.lock().await;
            if session.epoch() != epoch {
                return;
            }
            match session.apply(ConnectionEvent::ConnectFailed {
                reason: reason.to_string(),
            }) {
                Ok(_) => {
                    session.emit(BeltEvent::ConnectionStateChanged {
                        state: ConnectionState::Disconnected,
                        error: Some(reason.to_string()),
                    });
                    session.detach()
                }
                // The link already ended and reported it
                Err(_) => None,
            }
        };
        if let Some(transport) = transport {
            if let Err(error) = transport.close().await {
                debug!("Closing failed link: {}", error);
            }
        }
    }

    /// Close the link and wait until it reports closure
    ///
    /// Does nothing when no link is open.
    pub async fn disconnect(&self) -> Result<()> {
        let (epoch, transport) = {
            let mut session = self.inner.session.lock().await;
            if !session.state().is_active() {
                return Ok(());
            }
            session.apply(ConnectionEvent::DisconnectRequested)?;
            session.emit(BeltEvent::ConnectionStateChanged {
                state: ConnectionState::Disconnecting,
                error: None,
            });
            (session.epoch(), session.transport())
        };
        info!("Disconnecting from belt");
        if let Some(transport) = transport {
            if let Err(error) = transport.close().await {
                warn!("Closing link failed: {}", error);
            }
        }

        let dispatcher = self.inner.lifecycle.lock().await.dispatcher.take();
        let closed = match dispatcher {
            Some(mut handle) => match tokio::time::timeout(self.inner.config.disconnect_timeout, &mut handle).await {
                Ok(_) => true,
                Err(_) => {
                    warn!(
                        "Link did not close within {:?}, dropping it",
                        self.inner.config.disconnect_timeout
                    );
                    handle.abort();
                    false
                }
            },
            None => false,
        };
        if !closed {
            finish_link(&self.inner.session, epoch, None).await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.session.lock().await.state()
    }

    /// Current operating mode, `None` unless connected
    pub async fn get_mode(&self) -> Option<OperatingMode> {
        self.inner.session.lock().await.mode()
    }

    pub async fn parameters(&self) -> DeviceParameters {
        self.inner.session.lock().await.parameters().clone()
    }

    pub async fn channel_state(&self, channel: u8) -> Option<VibrationChannel> {
        self.inner.session.lock().await.channels().channel(channel).cloned()
    }

    pub async fn active_channels(&self) -> Vec<u8> {
        self.inner.session.lock().await.channels().active_channels()
    }

    async fn connected_mode(&self) -> Result<OperatingMode> {
        self.inner.session.lock().await.mode().ok_or(BeltError::NotConnected)
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    pub fn prepare_command(&self, request: Request) -> Command {
        self.inner.engine.prepare(request)
    }

    /// Submit a raw command, bypassing the channel model
    pub async fn submit_command(&self, command: Command) -> Result<Acknowledgment> {
        self.inner.engine.submit(command).await
    }

    /// Cancel a queued or pending command
    pub async fn cancel(&self, id: CommandId) -> bool {
        self.inner.engine.cancel(id).await
    }

    async fn execute_connected(&self, request: Request) -> Result<Acknowledgment> {
        self.connected_mode().await?;
        self.inner.engine.execute(request).await
    }

    /// Request an operating mode, resolving with the mode the belt reports
    pub async fn set_mode(&self, mode: OperatingMode) -> Result<OperatingMode> {
        let ack = self.execute_connected(Request::SetMode(mode)).await?;
        match ack.response {
            Some(DeviceMessage::ModeReport(reported)) => Ok(reported),
            _ => Ok(mode),
        }
    }

    pub async fn vibrate_at_angle(&self, angle: i32, channel: u8) -> Result<()> {
        self.vibrate_at_angle_with(angle, channel, VibrationOptions::default()).await
    }

    pub async fn vibrate_at_angle_with(&self, angle: i32, channel: u8, options: VibrationOptions) -> Result<()> {
        self.vibrate_towards(Orientation::angle(angle), channel, options).await
    }

    pub async fn vibrate_at_bearing(&self, bearing: i32, channel: u8) -> Result<()> {
        self.vibrate_at_bearing_with(bearing, channel, VibrationOptions::default()).await
    }

    pub async fn vibrate_at_bearing_with(&self, bearing: i32, channel: u8, options: VibrationOptions) -> Result<()> {
        self.vibrate_towards(Orientation::bearing(bearing), channel, options).await
    }

    async fn vibrate_towards(&self, orientation: Orientation, channel: u8, options: VibrationOptions) -> Result<()> {
        if let Some(intensity) = options.intensity {
            if intensity > 100 {
                return Err(BeltError::invalid_parameter(format!("intensity {} above 100", intensity)));
            }
        }
        if options.switch_to_app_mode && self.connected_mode().await? != OperatingMode::AppMode {
            self.set_mode(OperatingMode::AppMode).await?;
        }
        let spec = VibrationSpec::continuous(orientation)
            .with_intensity(options.intensity)
            .with_clear_other_channels(options.clear_other_channels);
        self.send_vibration_command(channel, ChannelPattern::Vibration(spec)).await
    }

    /// Start a pattern on a channel
    ///
    /// Outside app mode only channel 0 accepts a pattern, and only one that
    /// ends on its own.
    pub async fn send_vibration_command(&self, channel: u8, pattern: ChannelPattern) -> Result<()> {
        let command = {
            let mut session = self.inner.session.lock().await;
            let mode = session.mode().ok_or(BeltError::NotConnected)?;
            let request = session.channels_mut().request_vibration(channel, pattern, mode)?;
            self.inner.engine.prepare(request)
        };
        self.inner.engine.submit(command).await.map(|_| ())
    }

    pub async fn send_pulse_command(&self, channel: u8, spec: PulseSpec) -> Result<()> {
        self.send_vibration_command(channel, ChannelPattern::Pulses(spec)).await
    }

    pub async fn stop_vibration(&self, channel: u8) -> Result<()> {
        self.stop(Some(channel)).await
    }

    /// Stop every channel, app mode only
    pub async fn stop_all_vibrations(&self) -> Result<()> {
        self.stop(None).await
    }

    async fn stop(&self, channel: Option<u8>) -> Result<()> {
        let command = {
            let mut session = self.inner.session.lock().await;
            let mode = session.mode().ok_or(BeltError::NotConnected)?;
            let request = session.channels_mut().stop_vibration(channel, mode)?;
            self.inner.engine.prepare(request)
        };
        self.inner.engine.submit(command).await.map(|_| ())
    }

    // ------------------------------------------------------------------------
    // Belt Parameters
    // ------------------------------------------------------------------------

    /// Set the default vibration intensity, optionally with a feedback signal
    pub async fn set_default_intensity(&self, intensity: u8, feedback: bool) -> Result<()> {
        self.execute_connected(Request::SetDefaultIntensity { intensity, feedback })
            .await
            .map(|_| ())
    }

    /// Enable or disable the signal warning about an inaccurate heading
    pub async fn set_inaccurate_orientation_signal(&self, in_app: bool, in_compass: bool, persistent: bool) -> Result<()> {
        self.execute_connected(Request::SetInaccurateSignalState {
            in_app,
            in_compass,
            persistent,
        })
        .await
        .map(|_| ())
    }

    pub async fn set_pairing_requirement(&self, required: bool, persistent: bool) -> Result<()> {
        self.execute_connected(Request::SetPairingRequirement { required, persistent })
            .await
            .map(|_| ())
    }

    /// Append a suffix to the belt's Bluetooth name
    ///
    /// The belt restarts its radio to advertise the new name, so a Bluetooth
    /// link is closed once the request is written.
    pub async fn rename(&self, suffix: &str) -> Result<()> {
        self.execute_connected(Request::Rename {
            suffix: suffix.to_string(),
        })
        .await?;
        let transport_type = self.inner.session.lock().await.transport().map(|link| link.transport_type());
        if transport_type == Some(TransportType::Ble) {
            info!("Belt renamed, closing Bluetooth link");
            self.disconnect().await?;
        }
        Ok(())
    }

    pub async fn set_orientation_notifications(&self, enabled: bool) -> Result<()> {
        self.set_notifications(Characteristic::OrientationData, enabled).await
    }

    pub async fn set_power_status_notifications(&self, enabled: bool) -> Result<()> {
        self.set_notifications(Characteristic::BatteryStatus, enabled).await
    }

    async fn set_notifications(&self, characteristic: Characteristic, enabled: bool) -> Result<()> {
        self.execute_connected(Request::SetNotifications {
            characteristic,
            enabled,
        })
        .await
        .map(|_| ())
    }

    /// Change the orientation notification period
    ///
    /// Notifications are paused while the period changes and resumed
    /// afterwards. Requires firmware 52 or later.
    pub async fn set_orientation_notification_period(&self, period: Duration) -> Result<()> {
        let firmware = self.parameters().await.firmware_version;
        if firmware.map_or(true, |version| version < MIN_FIRMWARE_ORIENTATION_PERIOD) {
            return Err(BeltError::invalid_parameter(format!(
                "orientation notification period needs firmware {} or later",
                MIN_FIRMWARE_ORIENTATION_PERIOD
            )));
        }
        let period_ms = u16::try_from(period.as_millis())
            .map_err(|_| BeltError::invalid_parameter(format!("period {:?} too long", period)))?;
        let request = Request::SetOrientationNotificationPeriod { period_ms };
        request.validate()?;

        self.set_orientation_notifications(false).await?;
        self.execute_connected(request).await?;
        self.set_orientation_notifications(true).await
    }
}
