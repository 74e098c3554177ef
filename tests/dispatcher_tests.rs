//! Scan dispatcher: filtering, dedup and claim release

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{init_logging, taggr, Behavior, Call, FakeTransport, RecordingSink};
use taggr_link::bluetooth::{
    PeripheralIdentity, RetryController, RetryPolicy, ScanDispatcher, ScanEvent, SessionConfig,
    SessionOutcome, SessionSequencer,
};
use taggr_link::status::SharedStatusSink;
use taggr_link::{BleError, SessionFailure};

fn dispatcher(
    transport: &Arc<FakeTransport>,
    sink: &Arc<RecordingSink>,
) -> Arc<ScanDispatcher<FakeTransport>> {
    let sink: SharedStatusSink = sink.clone();
    let sequencer = SessionSequencer::new(transport.clone(), sink.clone(), SessionConfig::default());
    Arc::new(ScanDispatcher::new(
        transport.clone(),
        sink,
        sequencer,
        RetryController::new(RetryPolicy::default()),
    ))
}

#[tokio::test]
async fn test_non_matching_names_are_ignored() {
    init_logging();
    let transport = FakeTransport::new(Behavior::default());
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(&transport, &sink);

    let events = vec![
        ScanEvent::Discovered(PeripheralIdentity::new("A", Some("Headphones".to_string()), None)),
        ScanEvent::Discovered(PeripheralIdentity::new("B", Some("taggr-lower".to_string()), None)),
        ScanEvent::Discovered(PeripheralIdentity::new("C", None, Some(-40))),
        ScanEvent::Error(BleError::Other("scan hiccup".to_string())),
    ];
    for event in events {
        assert!(dispatcher.handle_event(event).is_none());
    }

    assert!(transport.calls().is_empty());
    assert!(sink.history().is_empty());
    assert_eq!(dispatcher.active_sessions(), 0);
}

#[tokio::test]
async fn test_matching_device_runs_session_and_is_released() {
    let transport = FakeTransport::new(Behavior::default());
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(&transport, &sink);
    let device = taggr("01");

    let task = dispatcher
        .handle_event(ScanEvent::Discovered(device.clone()))
        .expect("session started");

    assert_eq!(task.await.unwrap(), SessionOutcome::Completed);
    assert!(!dispatcher.is_in_session(&device.id));
    assert_eq!(sink.snapshot().device, Some(device.with_rssi(-42)));
    assert_eq!(sink.snapshot().message, "Done");
}

#[tokio::test]
async fn test_duplicate_discovery_is_ignored_while_in_session() {
    let transport = FakeTransport::new(Behavior::default());
    let gate = transport.gate_connect();
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(&transport, &sink);
    let device = taggr("01");

    let task = dispatcher
        .handle_event(ScanEvent::Discovered(device.clone()))
        .expect("session started");
    assert!(dispatcher.is_in_session(&device.id));

    assert!(dispatcher
        .handle_event(ScanEvent::Discovered(device.clone()))
        .is_none());

    gate.notify_one();
    assert!(task.await.unwrap().is_completed());
    assert_eq!(transport.count(&Call::Connect(512)), 1);

    // eligible again once the session ended
    let again = dispatcher
        .handle_event(ScanEvent::Discovered(device))
        .expect("rediscovery starts a new session");
    gate.notify_one();
    assert!(again.await.unwrap().is_completed());
    assert_eq!(transport.count(&Call::Connect(512)), 2);
}

#[tokio::test]
async fn test_distinct_devices_run_concurrently() {
    let transport = FakeTransport::new(Behavior::default());
    let gate = transport.gate_connect();
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(&transport, &sink);

    let first = dispatcher
        .handle_event(ScanEvent::Discovered(taggr("01")))
        .expect("first session");
    let second = dispatcher
        .handle_event(ScanEvent::Discovered(taggr("02")))
        .expect("second session");
    assert_eq!(dispatcher.active_sessions(), 2);

    gate.notify_one();
    gate.notify_one();
    // a single stored permit does not stack, so keep nudging until both finish
    let nudge = {
        let gate = gate.clone();
        tokio::spawn(async move {
            loop {
                gate.notify_waiters();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };
    assert!(first.await.unwrap().is_completed());
    assert!(second.await.unwrap().is_completed());
    nudge.abort();
    assert_eq!(dispatcher.active_sessions(), 0);
}

#[tokio::test]
async fn test_exhausted_retries_release_the_device() {
    let transport = FakeTransport::new(Behavior {
        read_value: None,
        ..Behavior::default()
    });
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(&transport, &sink);
    let device = taggr("01");

    let task = dispatcher
        .handle_event(ScanEvent::Discovered(device.clone()))
        .expect("session started");

    assert_eq!(
        task.await.unwrap(),
        SessionOutcome::Failed(SessionFailure::CharacteristicEmpty)
    );
    assert_eq!(transport.count(&Call::Subscribe), 4);
    assert!(!dispatcher.is_in_session(&device.id));
    assert_eq!(sink.snapshot().message, "Reading firmware version...");
}

#[tokio::test]
async fn test_start_routes_scan_events() {
    let transport = FakeTransport::new(Behavior::default());
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(&transport, &sink);

    dispatcher.start().await.unwrap();
    assert!(dispatcher.is_scanning());

    transport.emit(ScanEvent::Discovered(taggr("01")));
    for _ in 0..100 {
        if sink.snapshot().message == "Done" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(sink.snapshot().message, "Done");
    assert_eq!(transport.count(&Call::StartScan), 1);
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let transport = FakeTransport::new(Behavior::default());
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(&transport, &sink);

    dispatcher.start().await.unwrap();
    dispatcher.start().await.unwrap();
    dispatcher.stop().await.unwrap();
    dispatcher.stop().await.unwrap();

    assert!(!dispatcher.is_scanning());
    assert_eq!(transport.count(&Call::StartScan), 1);
    assert_eq!(transport.count(&Call::StopScan), 1);
}

#[tokio::test]
async fn test_stop_does_not_cancel_running_session() {
    let transport = FakeTransport::new(Behavior::default());
    let gate = transport.gate_connect();
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(&transport, &sink);

    dispatcher.start().await.unwrap();
    let task = dispatcher
        .handle_event(ScanEvent::Discovered(taggr("01")))
        .expect("session started");
    dispatcher.stop().await.unwrap();

    gate.notify_one();
    assert!(task.await.unwrap().is_completed());
}

#[tokio::test]
async fn test_permission_denied_prevents_scanning() {
    let transport = FakeTransport::new(Behavior {
        permission: false,
        ..Behavior::default()
    });
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(&transport, &sink);

    assert_eq!(dispatcher.start().await, Err(BleError::PermissionDenied));
    assert!(!dispatcher.is_scanning());
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_custom_prefix() {
    let transport = FakeTransport::new(Behavior::default());
    let sink = RecordingSink::new();
    let sink_handle: SharedStatusSink = sink.clone();
    let sequencer =
        SessionSequencer::new(transport.clone(), sink_handle.clone(), SessionConfig::default());
    let dispatcher = ScanDispatcher::new(
        transport.clone(),
        sink_handle,
        sequencer,
        RetryController::default(),
    )
    .with_name_prefix("Beacon");

    assert!(dispatcher
        .handle_event(ScanEvent::Discovered(taggr("01")))
        .is_none());
    let task = dispatcher
        .handle_event(ScanEvent::Discovered(PeripheralIdentity::new(
            "B1",
            Some("Beacon-7".to_string()),
            None,
        )))
        .expect("prefix matched");
    assert!(task.await.unwrap().is_completed());
}
