//! End-to-end pipeline tests over the simulated link
//!
//! Exercises the full monitor pipeline — listen, accept, decode, window,
//! supervise — with a simulated wearable on the other side of the link:
//! window cadence, reconnect cycles, shutdown races, and the single-peer
//! invariant.
//!
//! Run with:
//!   cargo test --test stream_lifecycle

use std::sync::Arc;
use std::time::Duration;

use pulselink::classify::{spawn_scoring, Classifier, LatestScore};
use pulselink::link::simulated::{SimDevice, SimNetwork};
use pulselink::link::service::StatusEvent;
use pulselink::link::transport::{LinkSession, WirelessTransport};
use pulselink::link::LinkError;
use pulselink::{MonitorEvent, SessionState, Supervisor, SupervisorConfig, WINDOW_SIZE};

use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        retry_delay: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Create a monitor device with a supervisor over it, plus a wearable on
/// the same simulated network.
fn make_rig(config: SupervisorConfig) -> (Arc<SimDevice>, SimDevice, Arc<Supervisor>) {
    let network = SimNetwork::new();
    let monitor = Arc::new(network.create_device());
    let wearable = network.create_device();
    let supervisor = Supervisor::new(monitor.clone(), config);
    (monitor, wearable, supervisor)
}

async fn wait_for_state(supervisor: &Arc<Supervisor>, state: SessionState) {
    let mut watch = supervisor.watch_state();
    tokio::time::timeout(Duration::from_secs(5), watch.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for state")
        .expect("supervisor dropped");
}

/// Connect the wearable to the monitor, retrying until the supervisor's
/// listener is up.
async fn connect_wearable(
    wearable: &SimDevice,
    monitor_addr: Uuid,
    service_id: Uuid,
) -> Box<dyn LinkSession> {
    loop {
        match wearable.connect(monitor_addr, service_id).await {
            Ok(session) => return session,
            Err(_) => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
}

async fn next_event(events: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// 186 samples leave the buffer readable and fire nothing; the 187th fires
/// exactly one window carrying all samples in push order and drains the
/// buffer.
#[tokio::test(start_paused = true)]
async fn test_full_window_cadence() {
    let (monitor, wearable, supervisor) = make_rig(test_config());
    let config = test_config();
    let mut events = supervisor.events();
    supervisor.start();

    let session = connect_wearable(&wearable, monitor.address(), config.service_id).await;
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::ConnectionStatusChanged(true)
    );

    assert_eq!(supervisor.state(), SessionState::Connected);

    for i in 0..WINDOW_SIZE - 1 {
        session.send(format!("{}", i as f32).as_bytes()).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            MonitorEvent::SampleAppended(i as f32)
        );
    }

    // The first byte moved the session into streaming.
    assert_eq!(supervisor.state(), SessionState::Streaming);

    // All 186 visible to the live display, no window yet.
    assert_eq!(supervisor.window().current().len(), WINDOW_SIZE - 1);
    assert_eq!(supervisor.window().windows_completed(), 0);

    session
        .send(format!("{}", (WINDOW_SIZE - 1) as f32).as_bytes())
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::SampleAppended((WINDOW_SIZE - 1) as f32)
    );
    match next_event(&mut events).await {
        MonitorEvent::WindowReady(window) => {
            assert_eq!(window.len(), WINDOW_SIZE);
            for (i, sample) in window.iter().enumerate() {
                assert_eq!(*sample, i as f32);
            }
        }
        other => panic!("expected WindowReady, got {:?}", other),
    }

    assert_eq!(supervisor.window().windows_completed(), 1);
    assert!(supervisor.window().current().is_empty());

    supervisor.stop();
}

/// Garbled chunks produce no samples and leave the buffer untouched.
#[tokio::test(start_paused = true)]
async fn test_malformed_chunks_are_dropped() {
    let (monitor, wearable, supervisor) = make_rig(test_config());
    let config = test_config();
    let mut events = supervisor.events();
    supervisor.start();

    let session = connect_wearable(&wearable, monitor.address(), config.service_id).await;
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::ConnectionStatusChanged(true)
    );

    session.send(b"not-a-number").await.unwrap();
    session.send(&[0xFF, 0x00, 0xAB]).await.unwrap();
    session.send(b"77.7").await.unwrap();

    // Only the valid chunk surfaces; the garbled ones were dropped before
    // reaching the buffer.
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::SampleAppended(77.7)
    );
    assert_eq!(supervisor.window().current(), vec![77.7]);
    assert_eq!(supervisor.malformed_samples(), 2);

    supervisor.stop();
}

/// A peer disconnect tears the session down and the supervisor re-listens;
/// status transitions arrive in occurrence order across the reconnect.
#[tokio::test(start_paused = true)]
async fn test_reconnect_cycle() {
    let (monitor, wearable, supervisor) = make_rig(test_config());
    let config = test_config();
    let mut events = supervisor.events();
    let mut status = supervisor.status().subscribe();
    supervisor.start();

    let session = connect_wearable(&wearable, monitor.address(), config.service_id).await;
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::ConnectionStatusChanged(true)
    );

    session.send(b"70.1").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::SampleAppended(70.1)
    );

    // Wearable drops the link.
    session.close().await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::ConnectionStatusChanged(false)
    );

    // The supervisor re-listens on its own; a new peer gets through.
    let session = connect_wearable(&wearable, monitor.address(), config.service_id).await;
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::ConnectionStatusChanged(true)
    );
    session.send(b"71.2").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::SampleAppended(71.2)
    );

    // The status holder saw the same ordered transitions.
    assert!(status.recv().await.unwrap());
    assert!(!status.recv().await.unwrap());
    assert!(status.recv().await.unwrap());

    supervisor.stop();
}

/// Stopping while listening fires no events and releases the endpoint.
#[tokio::test(start_paused = true)]
async fn test_stop_while_listening() {
    let (monitor, _wearable, supervisor) = make_rig(test_config());
    let config = test_config();
    let mut events = supervisor.events();
    supervisor.start();

    wait_for_state(&supervisor, SessionState::Listening).await;
    supervisor.stop();
    wait_for_state(&supervisor, SessionState::Idle).await;

    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    // The endpoint was released, not leaked: the device can listen again.
    assert!(monitor.listen(config.service_id).await.is_ok());
}

/// Stopping mid-stream closes the session promptly; the peer observes the
/// disconnect instead of a hang.
#[tokio::test(start_paused = true)]
async fn test_stop_while_streaming() {
    let (monitor, wearable, supervisor) = make_rig(test_config());
    let config = test_config();
    let mut events = supervisor.events();
    supervisor.start();

    let session = connect_wearable(&wearable, monitor.address(), config.service_id).await;
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::ConnectionStatusChanged(true)
    );
    session.send(b"66.0").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::SampleAppended(66.0)
    );

    supervisor.stop();
    wait_for_state(&supervisor, SessionState::Idle).await;
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::ConnectionStatusChanged(false)
    );

    let result = tokio::time::timeout(Duration::from_secs(5), session.read())
        .await
        .expect("peer read must resolve after monitor shutdown");
    assert!(matches!(result, Err(LinkError::PeerDisconnected)));
}

/// Exactly one session exists at a time: while one wearable streams, a
/// second connect attempt is refused.
#[tokio::test(start_paused = true)]
async fn test_single_session_invariant() {
    let (monitor, wearable, supervisor) = make_rig(test_config());
    let config = test_config();
    let mut events = supervisor.events();
    supervisor.start();

    let first = connect_wearable(&wearable, monitor.address(), config.service_id).await;
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::ConnectionStatusChanged(true)
    );

    // The listener was consumed by the accept: a second attempt is refused
    // rather than producing a second live session.
    let result = wearable.connect(monitor.address(), config.service_id).await;
    assert!(matches!(result, Err(LinkError::ConnectionError(_))));

    assert!(first.is_connected());
    supervisor.stop();
}

/// A disabled radio keeps the supervisor retrying without crashing; once
/// the radio comes back it reaches Listening on its own.
#[tokio::test(start_paused = true)]
async fn test_unavailable_transport_retries() {
    let (monitor, _wearable, supervisor) = make_rig(test_config());
    monitor.set_radio_enabled(false);
    supervisor.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(supervisor.state(), SessionState::Idle);

    monitor.set_radio_enabled(true);
    wait_for_state(&supervisor, SessionState::Listening).await;

    supervisor.stop();
}

/// With a status interval configured, the wearable receives the connect
/// notification and then periodic re-broadcasts.
#[tokio::test(start_paused = true)]
async fn test_status_rebroadcast_to_peer() {
    let config = SupervisorConfig {
        retry_delay: Duration::from_millis(50),
        status_interval: Some(Duration::from_secs(1)),
        ..Default::default()
    };
    let (monitor, wearable, supervisor) = make_rig(config.clone());
    supervisor.start();

    let session = connect_wearable(&wearable, monitor.address(), config.service_id).await;

    // Connect-time notification.
    let chunk = session.read().await.unwrap();
    let event = StatusEvent::from_line(&chunk).unwrap();
    assert!(event.connected);

    // Periodic re-broadcast.
    let chunk = tokio::time::timeout(Duration::from_secs(5), session.read())
        .await
        .expect("expected periodic status event")
        .unwrap();
    let event = StatusEvent::from_line(&chunk).unwrap();
    assert!(event.connected);

    supervisor.stop();
}

/// Window events drive an external classifier through the scoring task.
#[tokio::test(start_paused = true)]
async fn test_windows_drive_classifier() {
    struct MeanScore;
    impl Classifier for MeanScore {
        fn classify(&self, window: &[f32]) -> f32 {
            window.iter().sum::<f32>() / window.len() as f32
        }
    }

    let (monitor, wearable, supervisor) = make_rig(test_config());
    let config = test_config();
    let latest = Arc::new(LatestScore::new());
    let mut scores = latest.subscribe();
    let _scoring = spawn_scoring(&supervisor, Arc::new(MeanScore), Arc::clone(&latest));
    supervisor.start();

    let session = connect_wearable(&wearable, monitor.address(), config.service_id).await;
    for _ in 0..WINDOW_SIZE {
        session.send(b"80.0").await.unwrap();
    }

    let score = tokio::time::timeout(Duration::from_secs(5), scores.recv())
        .await
        .expect("expected a score")
        .unwrap();
    assert!((score - 80.0).abs() < 1e-3);
    assert_eq!(latest.get(), Some(score));

    supervisor.stop();
}
