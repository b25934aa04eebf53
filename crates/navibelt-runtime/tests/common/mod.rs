//! Simulated belt used by the runtime integration tests
//!
//! `MockBelt` is a connector whose links answer requests the way the belt
//! firmware does, with switches to make it silent, reject mode changes or
//! refuse connections.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use navibelt_core::{
    BeltConnector, BeltEvent, BeltTransport, DeviceMessage, InboundItem, InboundStream, OperatingMode,
    OutboundPacket, RawFrame, Request, TransportError, TransportType,
};
use tokio::sync::mpsc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Debug)]
struct BeltState {
    mode: OperatingMode,
    firmware_version: u16,
    default_intensity: u8,
    heading_offset: u16,
    inaccurate_signal: (bool, bool),
    responsive: bool,
    mode_rejection: Option<u8>,
    fail_open: bool,
    transport_type: TransportType,
    /// Notifications sent right before and right after a mode report
    mode_ack_surround: (Vec<DeviceMessage>, Vec<DeviceMessage>),
    sent: Vec<Request>,
    /// Generation and sender of the open link
    link: Option<(usize, mpsc::UnboundedSender<InboundItem>)>,
    opened: usize,
}

/// Simulated belt, cheap to clone
#[derive(Clone)]
pub struct MockBelt {
    state: Arc<Mutex<BeltState>>,
}

impl Default for MockBelt {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBelt {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BeltState {
                mode: OperatingMode::Wait,
                firmware_version: 60,
                default_intensity: 50,
                heading_offset: 45,
                inaccurate_signal: (true, false),
                responsive: true,
                mode_rejection: None,
                fail_open: false,
                transport_type: TransportType::Custom("mock"),
                mode_ack_surround: (Vec::new(), Vec::new()),
                sent: Vec::new(),
                link: None,
                opened: 0,
            })),
        }
    }

    pub fn connector(&self) -> Arc<dyn BeltConnector> {
        Arc::new(self.clone())
    }

    pub fn with_firmware_version(self, version: u16) -> Self {
        self.state.lock().unwrap().firmware_version = version;
        self
    }

    pub fn with_transport_type(self, transport_type: TransportType) -> Self {
        self.state.lock().unwrap().transport_type = transport_type;
        self
    }

    /// Stream notifications around the answer to the next mode changes
    pub fn surround_mode_ack(&self, before: Vec<DeviceMessage>, after: Vec<DeviceMessage>) {
        self.state.lock().unwrap().mode_ack_surround = (before, after);
    }

    pub fn set_responsive(&self, responsive: bool) {
        self.state.lock().unwrap().responsive = responsive;
    }

    pub fn reject_mode_requests(&self, reason: u8) {
        self.state.lock().unwrap().mode_rejection = Some(reason);
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn mode(&self) -> OperatingMode {
        self.state.lock().unwrap().mode
    }

    pub fn sent_requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.state.lock().unwrap().sent.clear();
    }

    pub fn is_linked(&self) -> bool {
        self.state.lock().unwrap().link.is_some()
    }

    /// Deliver a device message on the open link
    pub fn inject(&self, message: DeviceMessage) {
        self.inject_item(InboundItem::Frame(message.encode()));
    }

    pub fn inject_frame(&self, frame: RawFrame) {
        self.inject_item(InboundItem::Frame(frame));
    }

    pub fn inject_item(&self, item: InboundItem) {
        if let Some((_, link)) = &self.state.lock().unwrap().link {
            let _ = link.send(item);
        }
    }

    /// End the link as if the belt went out of range
    pub fn drop_link(&self) {
        self.state.lock().unwrap().link.take();
    }

    /// End the link with a transport failure
    pub fn fail_link(&self, reason: &str) {
        let link = self.state.lock().unwrap().link.take();
        if let Some((_, link)) = link {
            let _ = link.send(InboundItem::Failed(TransportError::SendFailed {
                reason: reason.to_string(),
            }));
        }
    }

    fn answer(state: &mut BeltState, request: &Request) -> Option<DeviceMessage> {
        match request {
            Request::QueryMode => Some(DeviceMessage::ModeReport(state.mode)),
            Request::SetMode(mode) => match state.mode_rejection {
                Some(reason) => {
                    let payload = request.encode().payload().to_vec();
                    Some(DeviceMessage::Rejection {
                        request_key: [payload[0], payload[1]],
                        reason,
                    })
                }
                None => {
                    state.mode = *mode;
                    Some(DeviceMessage::ModeReport(*mode))
                }
            },
            Request::QueryDefaultIntensity => Some(DeviceMessage::DefaultIntensity(state.default_intensity)),
            Request::SetDefaultIntensity { intensity, .. } => {
                state.default_intensity = *intensity;
                Some(DeviceMessage::DefaultIntensity(*intensity))
            }
            Request::QueryHeadingOffset => Some(DeviceMessage::HeadingOffset(state.heading_offset)),
            Request::QueryInaccurateSignalState => Some(DeviceMessage::InaccurateSignalState {
                in_app: state.inaccurate_signal.0,
                in_compass: state.inaccurate_signal.1,
            }),
            Request::SetInaccurateSignalState { in_app, in_compass, .. } => {
                state.inaccurate_signal = (*in_app, *in_compass);
                Some(DeviceMessage::InaccurateSignalState {
                    in_app: *in_app,
                    in_compass: *in_compass,
                })
            }
            Request::SetPairingRequirement { required, .. } => Some(DeviceMessage::PairingRequirement(*required)),
            Request::SetOrientationNotificationPeriod { period_ms } => {
                Some(DeviceMessage::OrientationNotificationPeriod(*period_ms))
            }
            Request::ReadFirmwareVersion => Some(DeviceMessage::FirmwareVersion(state.firmware_version)),
            _ => None,
        }
    }
}

#[async_trait]
impl BeltConnector for MockBelt {
    fn transport_type(&self) -> TransportType {
        self.state.lock().unwrap().transport_type
    }

    fn target(&self) -> String {
        "mock-belt".to_string()
    }

    async fn open(&self) -> Result<Arc<dyn BeltTransport>, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            return Err(TransportError::OpenFailed {
                target: "mock-belt".to_string(),
                reason: "belt not found".to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.opened += 1;
        state.link = Some((state.opened, tx));
        Ok(Arc::new(MockLink {
            belt: self.clone(),
            generation: state.opened,
            inbound: Mutex::new(Some(rx)),
        }))
    }
}

/// One open link to the simulated belt
///
/// The sender lives in the belt state only, so dropping it there ends the
/// inbound stream.
struct MockLink {
    belt: MockBelt,
    generation: usize,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<InboundItem>>>,
}

impl MockLink {
    fn sender(&self, state: &BeltState) -> Option<mpsc::UnboundedSender<InboundItem>> {
        match &state.link {
            Some((generation, sender)) if *generation == self.generation => Some(sender.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl BeltTransport for MockLink {
    fn transport_type(&self) -> TransportType {
        self.belt.state.lock().unwrap().transport_type
    }

    async fn send(&self, packet: OutboundPacket) -> Result<(), TransportError> {
        let mut state = self.belt.state.lock().unwrap();
        let Some(link) = self.sender(&state) else {
            return Err(TransportError::Closed);
        };
        let request = Request::decode(&packet)?;
        state.sent.push(request.clone());
        if !state.responsive {
            return Ok(());
        }
        let (before, after) = match &request {
            Request::SetMode(_) => state.mode_ack_surround.clone(),
            _ => (Vec::new(), Vec::new()),
        };
        let answer = MockBelt::answer(&mut state, &request);
        for message in before.iter().chain(answer.iter()).chain(after.iter()) {
            let _ = link.send(InboundItem::Frame(message.encode()));
        }
        Ok(())
    }

    fn take_inbound(&self) -> Option<InboundStream> {
        let rx = self.inbound.lock().unwrap().take()?;
        Some(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.belt.state.lock().unwrap();
        if self.sender(&state).is_some() {
            state.link = None;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Event Helpers
// ----------------------------------------------------------------------------

/// Next event, failing the test if none arrives in time
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<BeltEvent>) -> BeltEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event within timeout")
        .expect("event channel closed")
}

/// Skip events until one matches
pub async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<BeltEvent>, mut predicate: F) -> BeltEvent
where
    F: FnMut(&BeltEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if predicate(&event) {
            return event;
        }
    }
}

/// Wait until the belt received a request matching the predicate
pub async fn wait_for_request<F>(belt: &MockBelt, predicate: F)
where
    F: Fn(&Request) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !belt.sent_requests().iter().any(&predicate) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("request not sent within timeout");
}
