//! End-to-end scenarios of the controller against a simulated belt
//!
//! Each test drives a `BeltController` through a `MockBelt` link and checks
//! the resulting mode, channel state, sent requests and event order.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{init_tracing, next_event, wait_for, wait_for_request, MockBelt};
use navibelt_core::{
    BatteryReport, BeltButton, Characteristic, DeviceMessage, InboundItem, MalformedFrame, Orientation,
    OrientationReport, PowerStatus, RawFrame, TransportType, VibrationSpec,
};
use navibelt_runtime::{
    BeltConfig, BeltController, BeltError, BeltEvent, BeltObserver, ChannelPattern, ConnectionState,
    ModeChangeCause, OperatingMode, PulseSpec, QueuePolicy, Request, VibrationOptions,
};
use tokio::sync::mpsc;

async fn connected(config: BeltConfig, belt: &MockBelt) -> (BeltController, mpsc::UnboundedReceiver<BeltEvent>) {
    init_tracing();
    let controller = BeltController::new(config).unwrap();
    let mut events = controller.subscribe().await;
    controller.connect(belt.connector()).await.unwrap();
    wait_for(&mut events, |event| {
        matches!(
            event,
            BeltEvent::ConnectionStateChanged {
                state: ConnectionState::Connected,
                ..
            }
        )
    })
    .await;
    (controller, events)
}

fn state_event(state: ConnectionState, error: Option<&str>) -> BeltEvent {
    BeltEvent::ConnectionStateChanged {
        state,
        error: error.map(str::to_string),
    }
}

fn bounded_pattern() -> ChannelPattern {
    ChannelPattern::Vibration(VibrationSpec::continuous(Orientation::angle(90)).with_iterations(Some(2)))
}

// ----------------------------------------------------------------------------
// Connection
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_reports_wait_mode() {
    init_tracing();
    let belt = MockBelt::new();
    let controller = BeltController::new(BeltConfig::default()).unwrap();
    let mut events = controller.subscribe().await;

    controller.connect(belt.connector()).await.unwrap();

    assert_eq!(controller.connection_state().await, ConnectionState::Connected);
    assert_eq!(controller.get_mode().await, Some(OperatingMode::Wait));
    assert_eq!(next_event(&mut events).await, state_event(ConnectionState::Connecting, None));
    // Reports received during the handshake only fill the parameter cache
    assert_eq!(next_event(&mut events).await, state_event(ConnectionState::Connected, None));

    let parameters = controller.parameters().await;
    assert_eq!(parameters.firmware_version, Some(60));
    assert_eq!(parameters.default_intensity, Some(50));
    assert_eq!(parameters.heading_offset, Some(45));
    assert_eq!(parameters.inaccurate_signal_state, Some((true, false)));
}

#[tokio::test]
async fn test_handshake_order() {
    let belt = MockBelt::new();
    let (_controller, _events) = connected(BeltConfig::default(), &belt).await;

    let subscribe = |characteristic| Request::SetNotifications {
        characteristic,
        enabled: true,
    };
    assert_eq!(
        belt.sent_requests(),
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
    );
}

#[tokio::test]
async fn test_minimal_handshake() {
    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default().with_handshake(false), &belt).await;

    assert_eq!(belt.sent_requests().len(), 2);
    assert_eq!(controller.get_mode().await, Some(OperatingMode::Wait));
    assert_eq!(controller.parameters().await.firmware_version, None);
}

#[tokio::test]
async fn test_connect_failure() {
    init_tracing();
    let belt = MockBelt::new();
    belt.fail_open(true);
    let controller = BeltController::new(BeltConfig::default()).unwrap();
    let mut events = controller.subscribe().await;

    let result = controller.connect(belt.connector()).await;
    assert!(matches!(result, Err(BeltError::ConnectionFailed { .. })));
    assert_eq!(controller.connection_state().await, ConnectionState::Disconnected);
    assert_eq!(next_event(&mut events).await, state_event(ConnectionState::Connecting, None));
    match next_event(&mut events).await {
        BeltEvent::ConnectionStateChanged {
            state: ConnectionState::Disconnected,
            error: Some(reason),
        } => assert!(reason.contains("belt not found")),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_silent_belt_fails_handshake() {
    init_tracing();
    let belt = MockBelt::new();
    belt.set_responsive(false);
    let controller = BeltController::new(BeltConfig::default()).unwrap();

    let result = controller.connect(belt.connector()).await;
    assert!(matches!(result, Err(BeltError::ConnectionFailed { .. })));
    assert_eq!(controller.connection_state().await, ConnectionState::Disconnected);
    assert!(!belt.is_linked());
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;
    assert!(matches!(
        controller.connect(belt.connector()).await,
        Err(BeltError::InvalidTransition(_))
    ));
    assert_eq!(belt.opened(), 1);
}

#[tokio::test]
async fn test_disconnect_and_reconnect() {
    let belt = MockBelt::new();
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;

    controller.disconnect().await.unwrap();
    assert_eq!(controller.connection_state().await, ConnectionState::Disconnected);
    assert_eq!(controller.get_mode().await, None);
    assert_eq!(next_event(&mut events).await, state_event(ConnectionState::Disconnecting, None));
    assert_eq!(next_event(&mut events).await, state_event(ConnectionState::Disconnected, None));

    controller.reconnect().await.unwrap();
    assert_eq!(belt.opened(), 2);
    assert_eq!(controller.get_mode().await, Some(OperatingMode::Wait));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_fails_pending_command() {
    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;
    belt.set_responsive(false);

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.set_mode(OperatingMode::AppMode).await }
    });
    wait_for_request(&belt, |request| matches!(request, Request::SetMode(_))).await;

    controller.disconnect().await.unwrap();
    assert!(matches!(pending.await.unwrap(), Err(BeltError::Disconnected)));
}

// ----------------------------------------------------------------------------
// Modes
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_set_app_mode() {
    let belt = MockBelt::new();
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;

    let mode = controller.set_mode(OperatingMode::AppMode).await.unwrap();
    assert_eq!(mode, OperatingMode::AppMode);
    assert_eq!(controller.get_mode().await, Some(OperatingMode::AppMode));
    assert_eq!(
        next_event(&mut events).await,
        BeltEvent::ModeChanged {
            mode: OperatingMode::AppMode,
            cause: ModeChangeCause::Local
        }
    );
    assert_eq!(belt.sent_requests().last(), Some(&Request::SetMode(OperatingMode::AppMode)));
}

fn orientation(heading: i16) -> DeviceMessage {
    DeviceMessage::Orientation(OrientationReport {
        sensor_id: 1,
        heading,
        box_heading: heading,
        box_roll: 0,
        box_pitch: 0,
        accuracy: 5,
        magnetometer_status: 3,
        accelerometer_status: 3,
        gyroscope_status: 3,
        fusion_status: 3,
        accurate: true,
    })
}

#[tokio::test]
async fn test_notifications_keep_wire_order_around_mode_ack() {
    let belt = MockBelt::new();
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;
    let battery = BatteryReport {
        status: PowerStatus::Charging,
        level_raw: 80 * 256,
        time_to_full_or_empty_raw: 40,
        current_ma: 300,
        voltage_mv: 4100,
    };
    belt.surround_mode_ack(vec![orientation(90)], vec![DeviceMessage::Battery(battery), orientation(95)]);

    let mode = controller.set_mode(OperatingMode::AppMode).await.unwrap();
    assert_eq!(mode, OperatingMode::AppMode);

    assert!(matches!(
        next_event(&mut events).await,
        BeltEvent::OrientationUpdate { heading: 90, .. }
    ));
    assert_eq!(
        next_event(&mut events).await,
        BeltEvent::ModeChanged {
            mode: OperatingMode::AppMode,
            cause: ModeChangeCause::Local
        }
    );
    match next_event(&mut events).await {
        BeltEvent::BatteryUpdate { report, status, .. } => {
            assert_eq!(report, battery);
            assert_eq!(status, PowerStatus::Charging);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(
        next_event(&mut events).await,
        BeltEvent::OrientationUpdate { heading: 95, .. }
    ));
}

#[tokio::test]
async fn test_rejected_mode_change() {
    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;
    belt.reject_mode_requests(0x02);

    let result = controller.set_mode(OperatingMode::AppMode).await;
    assert!(matches!(result, Err(BeltError::Rejected { reason: 0x02 })));
    assert_eq!(controller.get_mode().await, Some(OperatingMode::Wait));
}

#[tokio::test]
async fn test_unsolicited_mode_report() {
    let belt = MockBelt::new();
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;

    belt.inject(DeviceMessage::ModeReport(OperatingMode::Compass));
    assert_eq!(
        next_event(&mut events).await,
        BeltEvent::ModeChanged {
            mode: OperatingMode::Compass,
            cause: ModeChangeCause::Device
        }
    );
    assert_eq!(controller.get_mode().await, Some(OperatingMode::Compass));
}

#[tokio::test]
async fn test_button_press_changes_mode() {
    let belt = MockBelt::new();
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;
    controller.set_mode(OperatingMode::AppMode).await.unwrap();
    controller.vibrate_at_angle(45, 2).await.unwrap();
    next_event(&mut events).await;

    belt.inject(DeviceMessage::ButtonPress {
        button: BeltButton::Pause,
        press_type: 1,
        previous_mode: OperatingMode::AppMode,
        new_mode: OperatingMode::Pause,
    });
    assert_eq!(
        next_event(&mut events).await,
        BeltEvent::ButtonPressed {
            button: BeltButton::Pause,
            previous_mode: OperatingMode::AppMode,
            new_mode: OperatingMode::Pause
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        BeltEvent::ModeChanged {
            mode: OperatingMode::Pause,
            cause: ModeChangeCause::ButtonPress
        }
    );
    assert!(controller.active_channels().await.is_empty());
}

#[tokio::test]
async fn test_power_off_closes_link() {
    let belt = MockBelt::new();
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;

    belt.inject(DeviceMessage::ButtonPress {
        button: BeltButton::Power,
        press_type: 1,
        previous_mode: OperatingMode::Wait,
        new_mode: OperatingMode::Standby,
    });
    assert!(matches!(next_event(&mut events).await, BeltEvent::ButtonPressed { .. }));
    assert_eq!(
        next_event(&mut events).await,
        BeltEvent::ModeChanged {
            mode: OperatingMode::Standby,
            cause: ModeChangeCause::ButtonPress
        }
    );
    assert_eq!(next_event(&mut events).await, state_event(ConnectionState::Disconnecting, None));
    assert_eq!(next_event(&mut events).await, state_event(ConnectionState::Disconnected, None));
    assert_eq!(controller.connection_state().await, ConnectionState::Disconnected);
    assert!(!belt.is_linked());
}

// ----------------------------------------------------------------------------
// Vibration
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_vibration_requires_app_mode() {
    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;

    let result = controller.send_vibration_command(3, ChannelPattern::at_angle(90)).await;
    assert!(matches!(
        result,
        Err(BeltError::ModeNotPermitted {
            channel: 3,
            mode: OperatingMode::Wait
        })
    ));
    assert!(!belt.sent_requests().iter().any(|r| matches!(r, Request::Vibrate { .. })));

    controller.set_mode(OperatingMode::AppMode).await.unwrap();
    controller
        .send_vibration_command(3, ChannelPattern::at_angle(90))
        .await
        .unwrap();
    assert_eq!(controller.active_channels().await, vec![3]);
    assert!(matches!(
        belt.sent_requests().last(),
        Some(Request::Vibrate { channel: 3, .. })
    ));
}

#[tokio::test]
async fn test_bounded_signal_outside_app_mode() {
    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;

    controller.send_vibration_command(0, bounded_pattern()).await.unwrap();
    controller
        .send_pulse_command(0, PulseSpec::new(Orientation::angle(0), 100, 500, 3))
        .await
        .unwrap();
    assert!(matches!(
        controller.send_vibration_command(1, bounded_pattern()).await,
        Err(BeltError::ModeNotPermitted { .. })
    ));
    assert!(matches!(
        controller.stop_all_vibrations().await,
        Err(BeltError::ModeNotPermitted { .. })
    ));
    controller.stop_vibration(0).await.unwrap();
}

#[tokio::test]
async fn test_vibrate_switching_to_app_mode() {
    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;

    let options = VibrationOptions::default()
        .with_intensity(30)
        .with_switch_to_app_mode(true);
    controller.vibrate_at_bearing_with(180, 1, options).await.unwrap();

    assert_eq!(belt.mode(), OperatingMode::AppMode);
    match belt.sent_requests().last() {
        Some(Request::Vibrate { channel: 1, spec }) => {
            assert_eq!(spec.intensity, Some(30));
            assert_eq!(spec.orientation, Orientation::MagneticBearing(180));
        }
        other => panic!("unexpected request {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_channel() {
    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;
    controller.set_mode(OperatingMode::AppMode).await.unwrap();
    assert!(matches!(
        controller.vibrate_at_angle(90, 6).await,
        Err(BeltError::InvalidChannel { channel: 6 })
    ));
}

// ----------------------------------------------------------------------------
// Link Loss and Malformed Input
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_link_loss_in_app_mode() {
    let belt = MockBelt::new();
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;
    controller.set_mode(OperatingMode::AppMode).await.unwrap();
    next_event(&mut events).await;

    belt.drop_link();
    assert_eq!(
        next_event(&mut events).await,
        BeltEvent::ModeChanged {
            mode: OperatingMode::Wait,
            cause: ModeChangeCause::Implicit
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        state_event(ConnectionState::Disconnected, Some("connection lost"))
    );
    assert_eq!(controller.get_mode().await, None);
    assert!(matches!(
        controller.vibrate_at_angle(0, 1).await,
        Err(BeltError::NotConnected)
    ));
}

#[tokio::test]
async fn test_link_failure_reports_reason() {
    let belt = MockBelt::new();
    let (_controller, mut events) = connected(BeltConfig::default(), &belt).await;

    belt.fail_link("adapter removed");
    match next_event(&mut events).await {
        BeltEvent::ConnectionStateChanged {
            state: ConnectionState::Disconnected,
            error: Some(reason),
        } => assert!(reason.contains("adapter removed")),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_corrupt_fragment_is_reported() {
    let belt = MockBelt::new();
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;

    belt.inject_item(InboundItem::Malformed(MalformedFrame::new(
        None,
        vec![0xEE, 0xFF, 0x00],
        "unknown attribute handle",
    )));
    belt.inject_frame(RawFrame::new(Characteristic::ButtonPress, [0x01]));
    belt.inject(DeviceMessage::DefaultIntensity(30));

    match next_event(&mut events).await {
        BeltEvent::MalformedFrame(frame) => assert_eq!(frame.bytes, vec![0xEE, 0xFF, 0x00]),
        other => panic!("unexpected event {:?}", other),
    }
    match next_event(&mut events).await {
        BeltEvent::MalformedFrame(frame) => assert_eq!(frame.characteristic, Some(Characteristic::ButtonPress)),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(next_event(&mut events).await, BeltEvent::DefaultIntensityChanged(30));
    assert_eq!(controller.parameters().await.default_intensity, Some(30));
}

#[tokio::test]
async fn test_keep_alive_is_answered() {
    let belt = MockBelt::new();
    let (_controller, _events) = connected(BeltConfig::default(), &belt).await;
    belt.clear_sent();

    belt.inject(DeviceMessage::KeepAlive {
        mode: OperatingMode::Wait,
    });
    wait_for_request(&belt, |request| *request == Request::KeepAliveResponse).await;
}

// ----------------------------------------------------------------------------
// Command Engine
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_commands_resolve_in_submission_order() {
    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;
    belt.clear_sent();

    let first = controller.prepare_command(Request::SetDefaultIntensity {
        intensity: 10,
        feedback: false,
    });
    let second = controller.prepare_command(Request::QueryHeadingOffset);
    let third = controller.prepare_command(Request::SetDefaultIntensity {
        intensity: 30,
        feedback: false,
    });
    let (a, b, c) = futures::join!(
        controller.submit_command(first),
        controller.submit_command(second),
        controller.submit_command(third),
    );

    assert_eq!(a.unwrap().response, Some(DeviceMessage::DefaultIntensity(10)));
    assert_eq!(b.unwrap().response, Some(DeviceMessage::HeadingOffset(45)));
    assert_eq!(c.unwrap().response, Some(DeviceMessage::DefaultIntensity(30)));
    assert_eq!(
        belt.sent_requests(),
        vec![
            Request::SetDefaultIntensity {
                intensity: 10,
                feedback: false
            },
            Request::QueryHeadingOffset,
            Request::SetDefaultIntensity {
                intensity: 30,
                feedback: false
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_resolves_once() {
    let belt = MockBelt::new();
    let config = BeltConfig::default().with_ack_timeout(Duration::from_millis(500));
    let (controller, _events) = connected(config, &belt).await;
    belt.set_responsive(false);

    let result = controller.set_mode(OperatingMode::AppMode).await;
    assert!(matches!(result, Err(BeltError::TimedOut { timeout_ms: 500 })));

    // A late acknowledgment resolves nothing and the engine is free again
    belt.inject(DeviceMessage::ModeReport(OperatingMode::AppMode));
    belt.set_responsive(true);
    let mode = controller.set_mode(OperatingMode::Compass).await.unwrap();
    assert_eq!(mode, OperatingMode::Compass);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_queued_command() {
    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;
    belt.set_responsive(false);
    belt.clear_sent();

    let in_flight = tokio::spawn({
        let controller = controller.clone();
        async move { controller.set_mode(OperatingMode::AppMode).await }
    });
    wait_for_request(&belt, |request| matches!(request, Request::SetMode(_))).await;

    let queued = controller.prepare_command(Request::QueryHeadingOffset);
    let queued_id = queued.id;
    let queued_task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit_command(queued).await }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert!(controller.cancel(queued_id).await);
    assert!(matches!(queued_task.await.unwrap(), Err(BeltError::Cancelled)));
    assert!(matches!(in_flight.await.unwrap(), Err(BeltError::TimedOut { .. })));
    assert_eq!(belt.sent_requests(), vec![Request::SetMode(OperatingMode::AppMode)]);
}

#[tokio::test(start_paused = true)]
async fn test_fail_fast_policy() {
    let belt = MockBelt::new();
    let config = BeltConfig::default().with_queue_policy(QueuePolicy::FailFast);
    let (controller, _events) = connected(config, &belt).await;
    belt.set_responsive(false);

    let in_flight = tokio::spawn({
        let controller = controller.clone();
        async move { controller.set_default_intensity(20, false).await }
    });
    wait_for_request(&belt, |request| matches!(request, Request::SetDefaultIntensity { .. })).await;

    assert!(matches!(
        controller.set_mode(OperatingMode::AppMode).await,
        Err(BeltError::EngineBusy)
    ));
    assert!(in_flight.await.unwrap().is_err());
}

// ----------------------------------------------------------------------------
// Parameters and Observers
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_parameter_updates() {
    let belt = MockBelt::new();
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;

    controller.set_default_intensity(80, true).await.unwrap();
    assert_eq!(next_event(&mut events).await, BeltEvent::DefaultIntensityChanged(80));

    controller.set_inaccurate_orientation_signal(false, true, false).await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        BeltEvent::InaccurateSignalStateChanged {
            in_app: false,
            in_compass: true
        }
    );

    controller.set_pairing_requirement(true, false).await.unwrap();
    assert_eq!(next_event(&mut events).await, BeltEvent::PairingRequirementChanged(true));

    let parameters = controller.parameters().await;
    assert_eq!(parameters.default_intensity, Some(80));
    assert_eq!(parameters.inaccurate_signal_state, Some((false, true)));
    assert_eq!(parameters.pairing_required, Some(true));
}

#[tokio::test]
async fn test_rename_keeps_serial_link() {
    let belt = MockBelt::new().with_transport_type(TransportType::Serial);
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;
    belt.clear_sent();

    controller.rename("kitchen").await.unwrap();
    assert_eq!(
        belt.sent_requests(),
        vec![Request::Rename {
            suffix: "kitchen".to_string()
        }]
    );
    assert_eq!(controller.connection_state().await, ConnectionState::Connected);

    assert!(matches!(
        controller.rename("a-suffix-that-is-too-long").await,
        Err(BeltError::InvalidParameter(_))
    ));
    assert_eq!(belt.sent_requests().len(), 1);
}

#[tokio::test]
async fn test_rename_closes_bluetooth_link() {
    let belt = MockBelt::new().with_transport_type(TransportType::Ble);
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;

    controller.rename("left").await.unwrap();
    assert!(belt.sent_requests().contains(&Request::Rename {
        suffix: "left".to_string()
    }));
    assert_eq!(controller.connection_state().await, ConnectionState::Disconnected);
    assert!(!belt.is_linked());
    wait_for(&mut events, |event| {
        *event == state_event(ConnectionState::Disconnected, None)
    })
    .await;

    let controller = BeltController::new(BeltConfig::default()).unwrap();
    assert!(matches!(controller.rename("left").await, Err(BeltError::NotConnected)));
}

#[tokio::test]
async fn test_orientation_period_needs_recent_firmware() {
    let old_belt = MockBelt::new().with_firmware_version(50);
    let (controller, _events) = connected(BeltConfig::default(), &old_belt).await;
    assert!(matches!(
        controller
            .set_orientation_notification_period(Duration::from_millis(100))
            .await,
        Err(BeltError::InvalidParameter(_))
    ));

    let belt = MockBelt::new();
    let (controller, _events) = connected(BeltConfig::default(), &belt).await;
    belt.clear_sent();
    controller
        .set_orientation_notification_period(Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(
        belt.sent_requests(),
        vec![
            Request::SetNotifications {
                characteristic: Characteristic::OrientationData,
                enabled: false
            },
            Request::SetOrientationNotificationPeriod { period_ms: 100 },
            Request::SetNotifications {
                characteristic: Characteristic::OrientationData,
                enabled: true
            },
        ]
    );
    assert!(matches!(
        controller
            .set_orientation_notification_period(Duration::from_millis(5))
            .await,
        Err(BeltError::InvalidParameter(_))
    ));
}

#[derive(Default)]
struct BatteryLog {
    levels: Mutex<Vec<f32>>,
}

impl BeltObserver for BatteryLog {
    fn on_battery_update(&self, report: &BatteryReport) {
        self.levels.lock().unwrap().push(report.charge_level());
    }
}

#[tokio::test]
async fn test_observer_receives_battery_updates() {
    let belt = MockBelt::new();
    let (controller, mut events) = connected(BeltConfig::default(), &belt).await;
    let log = Arc::new(BatteryLog::default());
    controller.add_observer(log.clone()).await;

    belt.inject(DeviceMessage::Battery(BatteryReport {
        status: PowerStatus::OnBattery,
        level_raw: 64 * 256,
        time_to_full_or_empty_raw: 100,
        current_ma: -120,
        voltage_mv: 3900,
    }));
    match next_event(&mut events).await {
        BeltEvent::BatteryUpdate { level, status, .. } => {
            assert_eq!(level, 64.0);
            assert_eq!(status, PowerStatus::OnBattery);
        }
        other => panic!("unexpected event {:?}", other),
    }
    // Both observers are served by the same delivery pass
    assert_eq!(*log.levels.lock().unwrap(), vec![64.0]);
}
