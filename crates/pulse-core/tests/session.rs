//! Session behaviour driven through the public API with a mock platform.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulse_core::uuids::{
    BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_INFO_SERVICE, HEART_RATE_MEASUREMENT,
    HEART_RATE_SERVICE, MANUFACTURER_NAME, MODEL_NUMBER, from_short,
};
use pulse_core::{
    CharacteristicProperties, DecodedSample, DeviceSelector, DeviceSession, DisconnectReason,
    Error, ErrorKind, IssueCategory, MockCentral, MockLink, PlatformError, SessionConfig,
    SessionEvent, SessionState,
};

fn wearable() -> MockLink {
    MockLink::builder("AA:BB:CC:DD:EE:01")
        .name("Garmin HRM-Pro")
        .characteristic(
            HEART_RATE_SERVICE,
            HEART_RATE_MEASUREMENT,
            CharacteristicProperties::NOTIFY,
            None,
        )
        .characteristic(
            BATTERY_SERVICE,
            BATTERY_LEVEL,
            CharacteristicProperties::READ_NOTIFY,
            Some(vec![90]),
        )
        .characteristic(
            DEVICE_INFO_SERVICE,
            MANUFACTURER_NAME,
            CharacteristicProperties::READ,
            Some(b"Garmin".to_vec()),
        )
        .characteristic(
            DEVICE_INFO_SERVICE,
            MODEL_NUMBER,
            CharacteristicProperties::READ,
            Some(b"HRM-Pro".to_vec()),
        )
        .build()
}

fn session_with(link: &MockLink) -> DeviceSession<MockCentral> {
    DeviceSession::new(MockCentral::with_link(link.clone()))
}

/// Record every event the session publishes.
fn record(session: &DeviceSession<MockCentral>) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _sub = session.bus().subscribe(move |event| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    events
}

fn transitions(events: &Mutex<Vec<SessionEvent>>) -> Vec<&'static str> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.is_transition())
        .map(SessionEvent::name)
        .collect()
}

async fn wait_for_state(session: &DeviceSession<MockCentral>, target: SessionState) {
    let mut state = session.state();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == target))
        .await
        .expect("state not reached")
        .unwrap();
}

#[tokio::test]
async fn test_connect_publishes_one_event_per_transition() {
    let link = wearable();
    let session = session_with(&link);
    let events = record(&session);

    let device = session.connect(None).await.unwrap();
    assert_eq!(device.name.as_deref(), Some("Garmin HRM-Pro"));
    assert_eq!(session.current_state(), SessionState::Ready);
    assert_eq!(session.device(), Some(device));
    assert!(link.is_connected());
    assert!(link.is_subscribed(&HEART_RATE_MEASUREMENT));
    assert!(link.is_subscribed(&BATTERY_LEVEL));

    session.disconnect().await;
    assert_eq!(session.current_state(), SessionState::Disconnected);
    assert_eq!(
        transitions(&events),
        vec!["connecting", "connected", "ready", "disconnected"]
    );

    let samples: Vec<&'static str> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.sample().map(DecodedSample::kind))
        .collect();
    assert_eq!(
        samples,
        vec!["battery_level", "device_info_string", "device_info_string"]
    );
}

#[tokio::test]
async fn test_ready_event_counts_services() {
    let link = wearable();
    let session = session_with(&link);
    let events = record(&session);

    session.connect(None).await.unwrap();
    let ready = events
        .lock()
        .unwrap()
        .iter()
        .find_map(|e| match e {
            SessionEvent::Ready { services, .. } => Some(*services),
            _ => None,
        });
    assert_eq!(ready, Some(3));
    assert_eq!(session.services().await.len(), 3);
}

#[tokio::test]
async fn test_read_failure_keeps_siblings() {
    let link = wearable();
    link.fail_read(MODEL_NUMBER, PlatformError::new("Read not permitted"));
    let session = session_with(&link);
    let events = record(&session);

    session.connect(None).await.unwrap();
    assert_eq!(session.current_state(), SessionState::Ready);

    let registry = session.registry().read().await;
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.characteristic_count(), 4);
    assert!(registry.characteristic(&MODEL_NUMBER).is_some());
    assert_eq!(registry.cached_value(&MODEL_NUMBER), None);
    assert_eq!(registry.cached_value(&MANUFACTURER_NAME), Some(&b"Garmin"[..]));
    assert_eq!(registry.cached_value(&BATTERY_LEVEL), Some(&[90u8][..]));
    drop(registry);

    let issues: Vec<(IssueCategory, Option<uuid::Uuid>)> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Error {
                category,
                characteristic,
                ..
            } => Some((*category, *characteristic)),
            _ => None,
        })
        .collect();
    assert_eq!(issues, vec![(IssueCategory::Discovery, Some(MODEL_NUMBER))]);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_discovery_discards_generation() {
    let link = wearable();
    link.set_read_latency(Duration::from_millis(100));
    let session = session_with(&link);
    let events = record(&session);

    let mut state = session.state();
    let connecting = session.clone();
    let handle = tokio::spawn(async move { connecting.connect(None).await });

    state
        .wait_for(|s| *s == SessionState::Discovering)
        .await
        .unwrap();
    let generation = session.generation();

    // Let the first read go in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(link.read_count(&BATTERY_LEVEL), 1);

    session.disconnect().await;
    assert_eq!(session.current_state(), SessionState::Disconnected);
    assert_eq!(session.registry().read().await.entries_for(generation), 0);

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)), "{result:?}");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(session.registry().read().await.entries_for(generation), 0);
    assert!(session.services().await.is_empty());
    assert_eq!(session.current_state(), SessionState::Disconnected);
    assert_eq!(
        transitions(&events),
        vec!["connecting", "connected", "disconnected"]
    );
    assert!(
        events
            .lock()
            .unwrap()
            .iter()
            .all(|e| e.sample().is_none()),
        "stale read was published"
    );
}

#[tokio::test]
async fn test_failing_subscriber_does_not_starve_others() {
    let link = wearable();
    let session = session_with(&link);
    let mut rx = session.bus().receiver();

    let _failing = session
        .bus()
        .subscribe(|_| Err("subscriber always fails".into()));
    let _panicking = session.bus().subscribe(|_| panic!("subscriber panicked"));
    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let _counting = session.bus().subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    session.connect(None).await.unwrap();
    link.push_notification(HEART_RATE_MEASUREMENT, vec![0x00, 0x48]);
    tokio::task::yield_now().await;
    session.disconnect().await;

    let mut published = 0;
    while rx.try_recv().is_ok() {
        published += 1;
    }
    assert!(published >= 4);
    assert_eq!(received.load(Ordering::SeqCst), published);
}

#[tokio::test]
async fn test_connect_while_ready_is_rejected() {
    let link = wearable();
    let session = session_with(&link);

    session.connect(None).await.unwrap();
    let generation = session.generation();
    let events = record(&session);

    let err = session.connect(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyConnected);
    assert!(matches!(err, Error::Connect(ref e) if e.kind == ErrorKind::AlreadyConnected));

    assert_eq!(session.current_state(), SessionState::Ready);
    assert_eq!(session.generation(), generation);
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(link.connect_count(), 1);
    assert!(!session.services().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connecting_is_rejected() {
    let link = wearable();
    link.set_connect_latency(Duration::from_secs(1));
    let session = session_with(&link);

    let mut state = session.state();
    let pending = session.clone();
    let handle = tokio::spawn(async move { pending.connect(None).await });
    state
        .wait_for(|s| *s == SessionState::Connecting)
        .await
        .unwrap();

    let err = session.connect(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyConnected);

    handle.await.unwrap().unwrap();
    assert_eq!(session.current_state(), SessionState::Ready);
}

#[tokio::test]
async fn test_link_loss_tears_down_like_disconnect() {
    let link = wearable();
    let session = session_with(&link);
    let events = record(&session);

    session.connect(None).await.unwrap();
    let generation = session.generation();

    link.drop_link();
    wait_for_state(&session, SessionState::Disconnected).await;

    assert!(session.generation() > generation);
    assert!(session.services().await.is_empty());
    assert!(session.device().is_none());
    assert_eq!(session.battery_level().await, None);

    let last = events.lock().unwrap().last().cloned().unwrap();
    match last {
        SessionEvent::Disconnected {
            device,
            reason,
            generation: ended,
        } => {
            assert_eq!(reason, DisconnectReason::LinkLost);
            assert_eq!(ended, generation);
            assert_eq!(device.unwrap().id, "AA:BB:CC:DD:EE:01");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(
        transitions(&events),
        vec!["connecting", "connected", "ready", "disconnected"]
    );

    // The session is reusable afterwards.
    session.connect(None).await.unwrap();
    assert_eq!(session.current_state(), SessionState::Ready);
}

#[tokio::test]
async fn test_notifications_are_decoded_and_published() {
    let link = wearable();
    let session = session_with(&link);
    session.connect(None).await.unwrap();
    let mut rx = session.bus().receiver();

    assert!(link.push_notification(HEART_RATE_MEASUREMENT, vec![0x19, 0x4B, 0x00, 0x0A, 0x00]));
    let event = rx.recv().await.unwrap();
    match event {
        SessionEvent::Sample {
            characteristic,
            sample: DecodedSample::HeartRate(hr),
        } => {
            assert_eq!(characteristic, Some(HEART_RATE_MEASUREMENT));
            assert_eq!(hr.bpm, 75);
            assert_eq!(hr.energy_expended, Some(10));
            assert!(hr.rr_intervals.is_empty());
        }
        other => panic!("unexpected event {other:?}"),
    }

    // 16-bit bpm flagged but only one byte follows.
    assert!(link.push_notification(HEART_RATE_MEASUREMENT, vec![0x01, 0x48]));
    let event = rx.recv().await.unwrap();
    assert!(matches!(
        event,
        SessionEvent::Error {
            category: IssueCategory::Decode,
            characteristic: Some(HEART_RATE_MEASUREMENT),
            ..
        }
    ));

    assert!(link.push_notification(BATTERY_LEVEL, vec![77]));
    let event = rx.recv().await.unwrap();
    assert_eq!(event.sample(), Some(&DecodedSample::BatteryLevel { percent: 77 }));
    assert_eq!(session.current_state(), SessionState::Ready);
}

#[tokio::test]
async fn test_device_info_and_battery_from_cache() {
    let link = wearable();
    let session = session_with(&link);
    assert_eq!(session.device_info().await, None);

    session.connect(None).await.unwrap();
    let info = session.device_info().await.unwrap();
    assert_eq!(info.manufacturer.as_deref(), Some("Garmin"));
    assert_eq!(info.model.as_deref(), Some("HRM-Pro"));
    assert_eq!(info.serial, None);
    assert_eq!(session.battery_level().await, Some(90));

    session.disconnect().await;
    assert_eq!(session.device_info().await, None);
    assert_eq!(session.battery_level().await, None);
}

#[tokio::test]
async fn test_rediscover_refreshes_cache_without_transition() {
    let link = wearable();
    let session = session_with(&link);
    assert!(matches!(
        session.rediscover().await,
        Err(Error::NotConnected)
    ));

    session.connect(None).await.unwrap();
    let generation = session.generation();
    let events = record(&session);

    link.set_value(BATTERY_LEVEL, vec![55]);
    let report = session.rediscover().await.unwrap();
    assert_eq!(report.generation, generation);
    assert_eq!(report.services, 3);
    assert_eq!(report.reads, 3);
    assert!(report.failures.is_empty());

    assert_eq!(session.battery_level().await, Some(55));
    assert_eq!(session.services().await.len(), 3);
    assert_eq!(session.current_state(), SessionState::Ready);
    assert_eq!(session.generation(), generation);
    assert!(transitions(&events).is_empty());
    assert_eq!(link.read_count(&BATTERY_LEVEL), 2);

    link.remove_characteristic(&MODEL_NUMBER);
    let report = session.rediscover().await.unwrap();
    assert_eq!(report.services, 3);
    assert_eq!(report.reads, 2);
    assert!(session.registry().read().await.characteristic(&MODEL_NUMBER).is_none());
    let info = session.device_info().await.unwrap();
    assert_eq!(info.manufacturer.as_deref(), Some("Garmin"));
    assert_eq!(info.model, None);
    assert!(transitions(&events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_selection_timeout_is_device_not_found() {
    let link = wearable();
    let central = MockCentral::with_link(link.clone());
    central.set_select_latency(Duration::from_secs(60));
    let config = SessionConfig::default().selection_timeout(Duration::from_secs(1));
    let session = DeviceSession::with_config(central, config).unwrap();
    let events = record(&session);

    let err = session.connect(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    assert_eq!(session.current_state(), SessionState::Disconnected);
    assert!(!link.is_connected());

    let last = events.lock().unwrap().last().cloned().unwrap();
    assert!(matches!(
        last,
        SessionEvent::Disconnected {
            device: None,
            reason: DisconnectReason::ConnectFailed(ErrorKind::DeviceNotFound),
            ..
        }
    ));
    assert_eq!(transitions(&events), vec!["connecting", "disconnected"]);
}

#[tokio::test]
async fn test_selection_errors_are_classified() {
    let session = DeviceSession::new(MockCentral::new());
    let err = session.connect(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceNotFound);

    let central = MockCentral::with_link(wearable());
    central.fail_select(PlatformError::with_code("NotAllowedError", "User denied access"));
    let session = DeviceSession::new(central);
    let err = session.connect(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(err.to_string().contains("User denied access"));
    assert_eq!(session.current_state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_link_failure_is_classified_and_session_recovers() {
    let link = wearable();
    link.fail_connect(PlatformError::new("Bluetooth adapter is powered off"));
    let session = session_with(&link);

    let err = session.connect(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportUnavailable);
    assert_eq!(session.current_state(), SessionState::Disconnected);
    let failed_generation = session.generation();

    link.clear_failures();
    session.connect(None).await.unwrap();
    assert_eq!(session.current_state(), SessionState::Ready);
    assert!(session.generation() > failed_generation);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_is_transport_unavailable() {
    let link = wearable();
    link.set_connect_latency(Duration::from_secs(60));
    let config = SessionConfig::default().connect_timeout(Duration::from_secs(2));
    let session = DeviceSession::with_config(MockCentral::with_link(link.clone()), config).unwrap();

    let err = session.connect(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportUnavailable);
    assert_eq!(session.current_state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_discovery_timeout_still_becomes_ready() {
    let link = wearable();
    link.set_read_latency(Duration::from_secs(5));
    let config = SessionConfig::default()
        .discovery_timeout(Duration::from_secs(7))
        .read_timeout(Duration::from_secs(10));
    let session = DeviceSession::with_config(MockCentral::with_link(link.clone()), config).unwrap();
    let events = record(&session);

    session.connect(None).await.unwrap();
    assert_eq!(session.current_state(), SessionState::Ready);
    assert_eq!(session.battery_level().await, Some(90));
    assert_eq!(session.device_info().await, None);

    let timed_out = events.lock().unwrap().iter().any(|e| {
        matches!(
            e,
            SessionEvent::Error {
                category: IssueCategory::Discovery,
                characteristic: None,
                ..
            }
        )
    });
    assert!(timed_out);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let link = wearable();
    let session = session_with(&link);
    let events = record(&session);

    session.disconnect().await;
    assert!(events.lock().unwrap().is_empty());

    session.connect(None).await.unwrap();
    let generation = session.generation();
    session.disconnect().await;
    session.disconnect().await;

    assert_eq!(session.generation().value(), generation.value() + 1);
    assert_eq!(link.disconnect_count(), 1);
    assert!(!link.is_connected());
    assert_eq!(
        transitions(&events),
        vec!["connecting", "connected", "ready", "disconnected"]
    );
}

#[tokio::test]
async fn test_unlink_failure_is_not_surfaced() {
    let link = wearable();
    link.fail_disconnect(PlatformError::new("GATT operation failed"));
    let session = session_with(&link);
    let events = record(&session);

    session.connect(None).await.unwrap();
    session.disconnect().await;

    assert_eq!(session.current_state(), SessionState::Disconnected);
    assert!(session.services().await.is_empty());
    assert!(matches!(
        events.lock().unwrap().last(),
        Some(SessionEvent::Disconnected {
            reason: DisconnectReason::UserRequested,
            ..
        })
    ));
}

#[tokio::test]
async fn test_accept_all_explores_unknown_services() {
    let vendor_service = from_short(0xFFF0);
    let vendor_value = from_short(0xFFF1);
    let link = MockLink::builder("11:22:33:44:55:66")
        .characteristic(
            vendor_service,
            vendor_value,
            CharacteristicProperties::READ,
            Some(vec![1, 2, 3]),
        )
        .build();
    let session = session_with(&link);

    let err = session.connect(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceNotFound);

    let events = record(&session);
    session
        .connect(Some(&DeviceSelector::accept_all()))
        .await
        .unwrap();

    let raw = events
        .lock()
        .unwrap()
        .iter()
        .find_map(|e| e.sample().cloned());
    assert_eq!(
        raw,
        Some(DecodedSample::Raw {
            uuid: vendor_value,
            bytes: vec![1, 2, 3],
        })
    );
}

#[tokio::test]
async fn test_identifier_selects_one_of_many() {
    let central = MockCentral::new();
    central.add_link(wearable());
    let second = MockLink::builder("AA:BB:CC:DD:EE:02")
        .name("Garmin Forerunner")
        .service(HEART_RATE_SERVICE)
        .build();
    central.add_link(second.clone());
    let session = DeviceSession::new(central);

    let selector = DeviceSelector::wearables().with_identifier("forerunner");
    let device = session.connect(Some(&selector)).await.unwrap();
    assert_eq!(device.id, "AA:BB:CC:DD:EE:02");
    assert!(second.is_connected());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = SessionConfig::default().read_timeout(Duration::ZERO);
    let result = DeviceSession::with_config(MockCentral::new(), config);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
