//! Event delivery to application observers
//!
//! Events are produced under the session lock into an unbounded queue and
//! delivered by a single task, so observers see them in production order
//! and never run while the session is locked.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use navibelt_core::{
    BatteryReport, BeltButton, BeltEvent, ConnectionState, MalformedFrame, ModeChangeCause, OperatingMode,
    OrientationReport,
};

// ----------------------------------------------------------------------------
// Observer Trait
// ----------------------------------------------------------------------------

/// Receives belt notifications
///
/// Every method has an empty default so an observer only implements what it
/// needs. Implementations must return quickly, delivery is sequential.
pub trait BeltObserver: Send + Sync {
    /// Entry point for every event, routes to the specific methods below
    fn on_event(&self, event: &BeltEvent) {
        route_event(self, event);
    }

    fn on_connection_state_changed(&self, _state: ConnectionState, _error: Option<&str>) {}

    fn on_mode_changed(&self, _mode: OperatingMode, _cause: ModeChangeCause) {}

    fn on_button_pressed(&self, _button: BeltButton, _previous_mode: OperatingMode, _new_mode: OperatingMode) {}

    fn on_orientation_update(&self, _report: &OrientationReport) {}

    fn on_battery_update(&self, _report: &BatteryReport) {}

    fn on_default_intensity_changed(&self, _intensity: u8) {}

    fn on_heading_offset_changed(&self, _offset: u16) {}

    fn on_bluetooth_name_changed(&self, _name: &str) {}

    fn on_inaccurate_signal_state_changed(&self, _in_app: bool, _in_compass: bool) {}

    fn on_pairing_requirement_changed(&self, _required: bool) {}

    fn on_firmware_version(&self, _version: u16) {}

    fn on_malformed_frame(&self, _frame: &MalformedFrame) {}
}

/// Call the observer method matching the event
pub fn route_event<O: BeltObserver + ?Sized>(observer: &O, event: &BeltEvent) {
    match event {
        BeltEvent::ConnectionStateChanged { state, error } => {
            observer.on_connection_state_changed(*state, error.as_deref())
        }
        BeltEvent::ModeChanged { mode, cause } => observer.on_mode_changed(*mode, *cause),
        BeltEvent::ButtonPressed {
            button,
            previous_mode,
            new_mode,
        } => observer.on_button_pressed(*button, *previous_mode, *new_mode),
        BeltEvent::OrientationUpdate { report, .. } => observer.on_orientation_update(report),
        BeltEvent::BatteryUpdate { report, .. } => observer.on_battery_update(report),
        BeltEvent::DefaultIntensityChanged(intensity) => observer.on_default_intensity_changed(*intensity),
        BeltEvent::HeadingOffsetChanged(offset) => observer.on_heading_offset_changed(*offset),
        BeltEvent::BluetoothNameChanged(name) => observer.on_bluetooth_name_changed(name),
        BeltEvent::InaccurateSignalStateChanged { in_app, in_compass } => {
            observer.on_inaccurate_signal_state_changed(*in_app, *in_compass)
        }
        BeltEvent::PairingRequirementChanged(required) => observer.on_pairing_requirement_changed(*required),
        BeltEvent::FirmwareVersion(version) => observer.on_firmware_version(*version),
        BeltEvent::MalformedFrame(frame) => observer.on_malformed_frame(frame),
    }
}

/// Observer forwarding every event into a channel
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<BeltEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BeltEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl BeltObserver for ChannelObserver {
    fn on_event(&self, event: &BeltEvent) {
        let _ = self.sender.send(event.clone());
    }
}

// ----------------------------------------------------------------------------
// Observer Registry
// ----------------------------------------------------------------------------

/// Observers registered on a controller
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<RwLock<Vec<Arc<dyn BeltObserver>>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, observer: Arc<dyn BeltObserver>) {
        self.observers.write().await.push(observer);
    }

    pub async fn remove(&self, observer: &Arc<dyn BeltObserver>) -> bool {
        let mut observers = self.observers.write().await;
        let before = observers.len();
        observers.retain(|registered| !Arc::ptr_eq(registered, observer));
        observers.len() != before
    }

    pub async fn len(&self) -> usize {
        self.observers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn deliver(&self, event: &BeltEvent) {
        let observers = self.observers.read().await.clone();
        trace!("Delivering {} to {} observers", event.name(), observers.len());
        for observer in observers {
            observer.on_event(event);
        }
    }

    /// Spawn the task draining the event queue into the registered observers
    pub(crate) fn spawn_delivery(&self, mut events: mpsc::UnboundedReceiver<BeltEvent>) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                registry.deliver(&event).await;
            }
            debug!("Event queue closed, delivery task finished");
        })
    }
}
