mod common;

use std::time::Duration;

use common::{connected_engine, drain, options, wait_for, READ_KEY, WRITE_KEY};
use lib_pubsub::{MockServer, PubSubError, PubSubOptions, SessionEngine, SessionEvent};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn silent_server_times_requests_out() {
    let server = MockServer::new();
    let (engine, mut events, _) = connected_engine(&server, &[READ_KEY], options(false)).await;
    server.set_responding(false);

    let started = Instant::now();
    let err = engine.subscribe("Test", None).await.unwrap_err();
    let sequence = match &err {
        PubSubError::Timeout { sequence } => *sequence,
        other => panic!("expected a timeout, got {:?}", other),
    };
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert_eq!(err.code(), Some(101));
    assert_eq!(err.to_string(), format!("Timeout awaiting response to sequence {}", sequence));

    match wait_for(&mut events, |e| matches!(e, SessionEvent::Error(_))).await {
        SessionEvent::Error(e) => assert_eq!(e, PubSubError::Timeout { sequence }),
        _ => unreachable!(),
    }
    assert!(engine.registered_channels().await.unwrap().is_empty());
    assert_eq!(engine.pending_requests().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_response_after_timeout_is_ignored() {
    let server = MockServer::new();
    let (engine, mut events, _) = connected_engine(&server, &[READ_KEY], options(false)).await;
    server.set_responding(false);

    let sequence = match engine.subscribe("Late", None).await {
        Err(PubSubError::Timeout { sequence }) => sequence,
        other => panic!("expected a timeout, got {:?}", other),
    };
    drain(&mut events);

    server.inject(&format!(
        r#"{{"seq":{},"action":"subscribe","code":200,"channels":["Late"]}}"#,
        sequence
    ));
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::RawRecord(_)));
    assert!(engine.registered_channels().await.unwrap().is_empty());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn custom_request_timeout_is_honoured() {
    let server = MockServer::new();
    let opts = PubSubOptions {
        request_timeout: Duration::from_secs(5),
        ..options(false)
    };
    let (engine, _events, _) = connected_engine(&server, &[READ_KEY], opts).await;
    server.set_responding(false);

    let started = Instant::now();
    assert!(matches!(engine.list_subscriptions().await, Err(PubSubError::Timeout { .. })));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn full_table_refuses_new_requests() {
    let server = MockServer::new();
    let opts = PubSubOptions {
        max_pending_requests: 2,
        ..options(false)
    };
    let (engine, _events, _) = connected_engine(&server, &[READ_KEY, WRITE_KEY], opts).await;
    server.set_responding(false);

    let first = engine.publish("a", "1");
    let second = engine.publish("a", "2");
    let third = engine.publish("a", "3");
    assert_eq!(third.failed().await, Some(PubSubError::CapacityExceeded { limit: 2 }));
    assert_eq!(engine.pending_requests().await.unwrap(), 2);

    assert_eq!(first.failed().await, None);
    assert_eq!(second.failed().await, None);
    assert_eq!(engine.pending_requests().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn drop_connection_abandons_requests_and_reconnects() {
    let server = MockServer::new();
    let (engine, mut events, session) = connected_engine(&server, &[READ_KEY], options(true)).await;
    server.set_responding(false);

    let waiting = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.subscribe("Test", None).await })
    };
    while engine.pending_requests().await.unwrap() == 0 {
        tokio::task::yield_now().await;
    }

    engine.drop_connection().unwrap();
    assert_eq!(waiting.await.unwrap(), Err(PubSubError::Abandoned));
    assert_eq!(engine.pending_requests().await.unwrap(), 0);
    assert!(engine.registered_channels().await.unwrap().is_empty());

    server.set_responding(true);
    match wait_for(&mut events, |e| matches!(e, SessionEvent::ReconnectScheduled { .. })).await {
        SessionEvent::ReconnectScheduled { attempt, delay } => {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_secs(5));
        }
        _ => unreachable!(),
    }
    wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnected)).await;
    assert_eq!(engine.get_session_id().await.unwrap(), session);
}

#[tokio::test(start_paused = true)]
async fn engine_lives_while_any_handle_does() {
    let server = MockServer::new();
    let engine = SessionEngine::new(&[READ_KEY], options(false), server.transport()).unwrap();
    let events = engine.events();
    let clone = engine.clone();
    drop(engine);
    drop(events);

    // One handle is still alive, so the engine is too.
    assert_eq!(clone.list_subscriptions().await, Err(PubSubError::NotConnected));
}
