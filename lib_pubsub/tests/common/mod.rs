#![allow(dead_code)]

use std::time::Duration;

use lib_pubsub::{MockServer, PubSubOptions, SessionEngine, SessionEvent};
use tokio::sync::broadcast::{self, error::RecvError};

pub const READ_KEY: &str = "R-0123456789abcdef-00112233445566778899aabbccddeeff";
pub const WRITE_KEY: &str = "W-0123456789abcdef-ffeeddccbbaa99887766554433221100";
pub const ADMIN_KEY: &str = "A-0123456789abcdef-0f1e2d3c4b5a69788796a5b4c3d2e1f0";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn options(auto_reconnect: bool) -> PubSubOptions {
    PubSubOptions {
        auto_reconnect,
        ..PubSubOptions::with_url("mock://pubsub")
    }
}

/// Waits for the first event matching `pred`, skipping everything else.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event stream closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(24 * 3600), wait)
        .await
        .expect("event never arrived")
}

/// Builds an engine on `server`, connects it and waits for the first session.
pub async fn connected_engine(
    server: &MockServer,
    keys: &[&str],
    options: PubSubOptions,
) -> (SessionEngine, broadcast::Receiver<SessionEvent>, String) {
    init_logger();
    let engine = SessionEngine::new(keys, options, server.transport()).expect("engine starts");
    let mut events = engine.events();
    engine.connect(None).expect("connect queued");

    let session = match wait_for(&mut events, |e| matches!(e, SessionEvent::NewSession(_))).await {
        SessionEvent::NewSession(uuid) => uuid,
        _ => unreachable!(),
    };
    (engine, events, session)
}

/// Drains what is already buffered on `events`.
pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
