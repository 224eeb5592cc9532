mod common;

use common::{eventually, message, CapturedLogs, Recorder, RecordingStatusPort, ScriptedConnector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tagum_core::transport::TransportEvent;
use tagum_core::{
    ConnectionState, Listener, MessageKind, RealtimeConfig, RealtimeDispatcher, RealtimeMessage,
    StreamTopic, TagumError, TransportKind,
};

fn setup() -> (
    RealtimeConfig,
    Arc<ScriptedConnector>,
    Arc<RecordingStatusPort>,
    RealtimeDispatcher,
) {
    let config = RealtimeConfig::default();
    let connector = ScriptedConnector::new(TransportKind::Sse);
    let status = RecordingStatusPort::new();
    let dispatcher = RealtimeDispatcher::new(config.clone(), connector.clone(), status.clone());
    (config, connector, status, dispatcher)
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn unknown_type_reaches_no_listener() {
    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Notifications;
    let stream = connector.push_open(&config.sse_url(&topic));

    let recorder = Recorder::new();
    dispatcher.subscribe(topic, recorder.clone());

    stream.send(message(r#"{"type": "mystery", "unread_count": 1}"#)).unwrap();
    stream.send(message(r#"{"unread_count": 1}"#)).unwrap();
    stream
        .send(message(r#"{"type": "notification", "unread_count": 2, "notification": {"message": "hi"}}"#))
        .unwrap();

    eventually(|| recorder.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let received = recorder.messages();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].kind, MessageKind::Notification);
    assert_eq!(received[0].source, TransportKind::Sse);
}

#[tokio::test]
async fn double_subscribe_invokes_once() {
    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Dashboard;
    let stream = connector.push_open(&config.sse_url(&topic));

    let recorder = Recorder::new();
    let listener: Arc<dyn Listener> = recorder.clone();
    assert!(dispatcher.subscribe(topic, listener.clone()));
    assert!(!dispatcher.subscribe(topic, listener));

    stream
        .send(message(r#"{"type": "dashboard_update", "total_projects": 4}"#))
        .unwrap();

    eventually(|| recorder.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.len(), 1);
    // One stream per topic regardless of listener count
    assert_eq!(connector.dial_count(), 1);
}

#[tokio::test]
async fn routes_by_type_not_by_stream() {
    let (config, connector, _status, dispatcher) = setup();
    let dashboard_stream = connector.push_open(&config.sse_url(&StreamTopic::Dashboard));
    let _notification_stream =
        connector.push_open(&config.sse_url(&StreamTopic::Notifications));

    let dashboard = Recorder::new();
    let notifications = Recorder::new();
    dispatcher.subscribe(StreamTopic::Dashboard, dashboard.clone());
    dispatcher.subscribe(StreamTopic::Notifications, notifications.clone());

    dashboard_stream
        .send(message(r#"{"type": "notification", "unread_count": 5}"#))
        .unwrap();
    dashboard_stream
        .send(message(r#"{"type": "dashboard_update", "total_projects": 9}"#))
        .unwrap();

    eventually(|| notifications.len() == 1 && dashboard.len() == 1).await;
    assert_eq!(notifications.messages()[0].u64_field("unread_count"), Some(5));
    assert_eq!(dashboard.messages()[0].u64_field("total_projects"), Some(9));
}

#[tokio::test]
async fn single_project_stream_keeps_its_sub_topic() {
    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Projects(Some(42));
    let stream = connector.push_open(&config.sse_url(&topic));
    assert!(config.sse_url(&topic).ends_with("/realtime/projects/42/"));

    let single = Recorder::new();
    let all = Recorder::new();
    dispatcher.subscribe(topic, single.clone());
    dispatcher.bus().subscribe(StreamTopic::Projects(None), all.clone());

    stream
        .send(message(r#"{"type": "project_status", "project_id": 42, "status": "delayed"}"#))
        .unwrap();

    eventually(|| single.len() == 1).await;
    assert_eq!(all.len(), 0);
    assert_eq!(single.messages()[0].project_id(), Some(42));
}

#[tokio::test]
async fn malformed_and_error_payloads_are_dropped() {
    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Notifications;
    let stream = connector.push_open(&config.sse_url(&topic));

    let recorder = Recorder::new();
    dispatcher.subscribe(topic, recorder.clone());

    stream.send(message("{not json")).unwrap();
    stream.send(message(r#"["notification"]"#)).unwrap();
    stream
        .send(message(r#"{"type": "error", "message": "backend exploded"}"#))
        .unwrap();
    stream
        .send(message(r#"{"type": "notification", "unread_count": 1}"#))
        .unwrap();

    eventually(|| recorder.len() == 1).await;
    // The stream survives bad frames
    assert!(dispatcher.is_connected(&topic));
    assert_eq!(connector.dial_count(), 1);
}

#[tokio::test]
async fn server_error_text_is_logged_beside_the_event_message() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Dashboard;
    let stream = connector.push_open(&config.sse_url(&topic));
    let recorder = Recorder::new();
    dispatcher.subscribe(topic, recorder.clone());

    stream
        .send(message(r#"{"type": "error", "message": "backend exploded"}"#))
        .unwrap();
    stream
        .send(message(r#"{"type": "dashboard_update", "total_projects": 3}"#))
        .unwrap();
    eventually(|| recorder.len() == 1).await;

    let reported: Vec<_> = logs
        .events("realtime")
        .into_iter()
        .filter(|e| e.fields.get("message").map(String::as_str) == Some("Server reported an error"))
        .collect();
    assert_eq!(reported.len(), 1);
    assert_eq!(
        reported[0].fields.get("server_message").map(String::as_str),
        Some("backend exploded")
    );
}

#[tokio::test]
async fn failing_listener_does_not_block_others() {
    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Notifications;
    let stream = connector.push_open(&config.sse_url(&topic));

    let failing: Arc<dyn Listener> = Arc::new(|_: &RealtimeMessage| -> tagum_core::Result<()> {
        Err(TagumError::Listener("boom".into()))
    });
    let panicking: Arc<dyn Listener> =
        Arc::new(|_: &RealtimeMessage| -> tagum_core::Result<()> { panic!("listener bug") });
    let recorder = Recorder::new();

    dispatcher.subscribe(topic, failing);
    dispatcher.subscribe(topic, panicking);
    dispatcher.subscribe(topic, recorder.clone());

    stream
        .send(message(r#"{"type": "notification", "unread_count": 1}"#))
        .unwrap();
    stream
        .send(message(r#"{"type": "notification", "unread_count": 2}"#))
        .unwrap();

    eventually(|| recorder.len() == 2).await;
    let stats = dispatcher.bus().get_stats(&topic).unwrap();
    assert_eq!(stats.listener_errors, 4);
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn sse_backoff_doubles_then_fails_for_good() {
    let (config, connector, status, dispatcher) = setup();
    let topic = StreamTopic::Notifications;
    let url = config.sse_url(&topic);

    dispatcher.subscribe(topic, Recorder::new());

    for _ in 0..600 {
        if dispatcher.status(&topic) == ConnectionState::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert_eq!(dispatcher.status(&topic), ConnectionState::Failed);

    let expected = [2000u64, 4000, 8000, 16000, 30000];
    let gaps = connector.gaps_ms(&url);
    assert_eq!(gaps.len(), expected.len(), "gaps: {gaps:?}");
    for (gap, want) in gaps.iter().zip(expected) {
        assert!(gap.abs_diff(want) <= 5, "gap {gap} != {want}");
    }

    // No dial after the terminal failure
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(connector.dials_to(&url).len(), 6);

    eventually(|| !status.events().is_empty()).await;
    assert_eq!(
        status.events(),
        vec![(topic, TransportKind::Sse, ConnectionState::Failed)]
    );
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_the_attempt_counter() {
    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Dashboard;
    let url = config.sse_url(&topic);

    connector.push_failure(&url, "refused");
    connector.push_failure(&url, "refused");
    let stream = connector.push_open(&url);

    dispatcher.subscribe(topic, Recorder::new());
    eventually(|| dispatcher.is_connected(&topic)).await;

    // Drop the stream; the next delay starts from the first step again
    stream.send(TransportEvent::Error("reset by peer".into())).unwrap();
    eventually(|| connector.dials_to(&url).len() == 4).await;

    let gaps = connector.gaps_ms(&url);
    assert!(gaps[0].abs_diff(2000) <= 5);
    assert!(gaps[1].abs_diff(4000) <= 5);
    // Measured from when the error was injected, which the poll loop rounds up
    assert!(gaps[2].abs_diff(2000) <= 20, "gaps: {gaps:?}");
}

#[tokio::test(start_paused = true)]
async fn manual_close_schedules_no_reconnect() {
    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Notifications;
    let url = config.sse_url(&topic);

    dispatcher.subscribe(topic, Recorder::new());
    eventually(|| dispatcher.status(&topic) == ConnectionState::Reconnecting).await;
    assert_eq!(connector.dials_to(&url).len(), 1);

    // Close while the reconnect timer is pending
    dispatcher.disconnect(&topic);
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(connector.dials_to(&url).len(), 1);
    assert_eq!(dispatcher.status(&topic), ConnectionState::Idle);
}

#[tokio::test]
async fn disconnect_closes_open_session() {
    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Projects(None);
    let _stream = connector.push_open(&config.sse_url(&topic));

    dispatcher.subscribe(topic, Recorder::new());
    eventually(|| dispatcher.is_connected(&topic)).await;

    dispatcher.disconnect_all();
    eventually(|| connector.closes() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(connector.dial_count(), 1);
    assert_eq!(dispatcher.bus().listener_count(&topic), 0);
    assert!(dispatcher.connected_topics().is_empty());
}

#[tokio::test(start_paused = true)]
async fn normal_closure_does_not_reconnect() {
    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Dashboard;
    let stream = connector.push_open(&config.sse_url(&topic));

    dispatcher.subscribe(topic, Recorder::new());
    eventually(|| dispatcher.is_connected(&topic)).await;

    stream.send(TransportEvent::Closed(1000)).unwrap();
    eventually(|| dispatcher.status(&topic) == ConnectionState::Idle).await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(connector.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_topic_leaves_other_topics_running() {
    let (config, connector, status, dispatcher) = setup();
    let healthy = StreamTopic::Dashboard;
    let broken = StreamTopic::Notifications;
    let stream = connector.push_open(&config.sse_url(&healthy));

    let recorder = Recorder::new();
    dispatcher.subscribe(healthy, recorder.clone());
    dispatcher.subscribe(broken, Recorder::new());

    for _ in 0..600 {
        if dispatcher.status(&broken) == ConnectionState::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert_eq!(dispatcher.status(&broken), ConnectionState::Failed);
    assert!(dispatcher.is_connected(&healthy));

    stream
        .send(message(r#"{"type": "dashboard_update", "total_projects": 1}"#))
        .unwrap();
    eventually(|| recorder.len() == 1).await;

    let failures = status.events();
    assert!(failures.iter().all(|(topic, _, _)| *topic == broken));
    assert_eq!(dispatcher.connected_topics(), vec![healthy]);
}

#[tokio::test(start_paused = true)]
async fn resubscribing_after_failure_dials_again() {
    let (config, connector, _status, dispatcher) = setup();
    let topic = StreamTopic::Notifications;
    let url = config.sse_url(&topic);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let listener: Arc<dyn Listener> = Arc::new(move |_: &RealtimeMessage| -> tagum_core::Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    dispatcher.subscribe(topic, listener.clone());
    for _ in 0..600 {
        if dispatcher.status(&topic) == ConnectionState::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert_eq!(connector.dials_to(&url).len(), 6);

    let stream = connector.push_open(&url);
    assert!(!dispatcher.subscribe(topic, listener));
    eventually(|| dispatcher.is_connected(&topic)).await;
    stream
        .send(message(r#"{"type": "notification", "unread_count": 1}"#))
        .unwrap();
    eventually(|| calls.load(Ordering::SeqCst) == 1).await;
}
