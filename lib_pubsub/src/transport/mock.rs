//! # Mock Transport
//!
//! A pub/sub server living in the same process. [`MockServer`] holds the
//! server side state (sessions, subscriptions, live connections) behind a
//! shared lock; each [`MockTransport`] is one client connection to it.
//!
//! The server honours the permissions found in the `Payload` header: `R` is
//! needed to subscribe, unsubscribe and list, `W` to publish. Sessions keep
//! their channel list across connections, so a client presenting a known
//! session token gets it back along with its subscriptions.
//!
//! Test controls:
//! - [`MockServer::set_responding`] stops answering requests (to provoke timeouts).
//! - [`MockServer::inject`] pushes an arbitrary raw record to every connection.
//! - [`MockServer::report_fault`] reports a non-fatal transport fault on every connection.
//! - [`MockServer::fail_next_connects`] refuses the next connect attempts.
//! - [`MockServer::drop_connections`] ends every connection abnormally.
//! - [`MockServer::forget_sessions`] loses every session, as after a restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::SecondsFormat;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::auth::AuthPayload;
use crate::error::PubSubError;
use crate::transport::{CloseReason, ConnectRequest, Transport, TransportEvent};

const NOT_AUTHORIZED: &str = "Not Authorized";
const NOT_FOUND: &str = "Not Found";

struct Connection {
    session_uuid: String,
    permissions: String,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Connection {
    fn can_read(&self) -> bool {
        self.permissions.contains('R')
    }

    fn can_write(&self) -> bool {
        self.permissions.contains('W')
    }

    fn push(&self, record: &Value) {
        let _ = self.events.send(TransportEvent::Text(record.to_string()));
    }
}

#[derive(Default)]
struct ServerState {
    sessions: HashMap<String, Vec<String>>,
    connections: HashMap<u64, Connection>,
    next_connection: u64,
    responding: bool,
    failing_connects: usize,
    sent_frames: Vec<String>,
    connect_attempts: Vec<Instant>,
    presented_sessions: Vec<Option<String>>,
}

/// Shared handle to the in-process server. Clones see the same state.
#[derive(Clone)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// A server with no sessions that answers every request.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                responding: true,
                ..Default::default()
            })),
        }
    }

    /// A new client connection to this server.
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            server: self.clone(),
            connection: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().expect("MockServer lock poisoned")
    }

    /// Turns request handling on or off. Requests received while off are
    /// recorded and never answered.
    pub fn set_responding(&self, responding: bool) {
        self.lock().responding = responding;
    }

    /// Pushes `raw` verbatim to every live connection.
    pub fn inject(&self, raw: &str) {
        let state = self.lock();
        for connection in state.connections.values() {
            let _ = connection.events.send(TransportEvent::Text(raw.to_string()));
        }
    }

    /// Reports a fault on every live connection without closing it.
    pub fn report_fault(&self, reason: &str) {
        let state = self.lock();
        for connection in state.connections.values() {
            let _ = connection.events.send(TransportEvent::Error(reason.to_string()));
        }
    }

    /// Refuses the next `count` connect attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.lock().failing_connects = count;
    }

    /// Ends every live connection without a close handshake.
    pub fn drop_connections(&self) {
        let mut state = self.lock();
        for (_, connection) in state.connections.drain() {
            let _ = connection
                .events
                .send(TransportEvent::Close(CloseReason::abnormal("connection dropped by server")));
        }
    }

    /// Loses every session; the next connect starts a new one.
    pub fn forget_sessions(&self) {
        self.lock().sessions.clear();
    }

    /// Every frame received from clients, in arrival order.
    pub fn sent_frames(&self) -> Vec<String> {
        self.lock().sent_frames.clone()
    }

    /// Received frames decoded as JSON, skipping anything undecodable.
    pub fn sent_records(&self) -> Vec<Value> {
        self.lock()
            .sent_frames
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }

    /// When each connect attempt reached the server.
    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.lock().connect_attempts.clone()
    }

    /// Session token presented by each connect attempt, in order.
    pub fn presented_sessions(&self) -> Vec<Option<String>> {
        self.lock().presented_sessions.clone()
    }

    /// Number of connections currently open.
    pub fn live_connections(&self) -> usize {
        self.lock().connections.len()
    }

    /// The channels a session is subscribed to, if the session exists.
    pub fn session_channels(&self, session_uuid: &str) -> Option<Vec<String>> {
        self.lock().sessions.get(session_uuid).cloned()
    }

    fn open(&self, request: &ConnectRequest, events: mpsc::UnboundedSender<TransportEvent>) -> Option<u64> {
        let mut state = self.lock();
        state.connect_attempts.push(Instant::now());
        state.presented_sessions.push(request.session_uuid.clone());

        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            let _ = events.send(TransportEvent::Close(CloseReason::abnormal("connection refused")));
            return None;
        }

        let Some(payload) = AuthPayload::from_header(&request.headers.payload_base64) else {
            let _ = events.send(TransportEvent::Close(CloseReason {
                code: Some(1008),
                reason: "invalid Payload header".to_string(),
            }));
            return None;
        };

        let session_uuid = match payload.session_uuid {
            Some(uuid) if state.sessions.contains_key(&uuid) => uuid,
            _ => {
                let uuid = uuid::Uuid::new_v4().to_string();
                state.sessions.insert(uuid.clone(), Vec::new());
                uuid
            }
        };

        state.next_connection += 1;
        let id = state.next_connection;
        let _ = events.send(TransportEvent::Open);
        state.connections.insert(
            id,
            Connection {
                session_uuid,
                permissions: payload.permissions,
                events,
            },
        );
        Some(id)
    }

    fn close(&self, id: u64) {
        if let Some(connection) = self.lock().connections.remove(&id) {
            let _ = connection.events.send(TransportEvent::Close(CloseReason::normal()));
        }
    }

    fn is_open(&self, id: u64) -> bool {
        self.lock().connections.contains_key(&id)
    }

    fn receive(&self, id: u64, text: String) -> Result<(), PubSubError> {
        let mut state = self.lock();
        if !state.connections.contains_key(&id) {
            return Err(PubSubError::NotConnected);
        }
        state.sent_frames.push(text.clone());
        if !state.responding {
            return Ok(());
        }

        let request: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => Value::String(text),
        };
        handle_request(&mut state, id, &request);
        Ok(())
    }
}

fn error_record(seq: &Value, action: &str, code: u16, message: &str, details: &str) -> Value {
    json!({
        "seq": seq,
        "action": action,
        "code": code,
        "message": message,
        "details": details,
    })
}

fn handle_request(state: &mut ServerState, id: u64, request: &Value) {
    let ServerState {
        sessions, connections, ..
    } = state;
    let Some(connection) = connections.get(&id) else {
        return;
    };
    let seq = request.get("seq").cloned().unwrap_or(Value::Null);
    let action = request.get("action").and_then(Value::as_str).unwrap_or_default();
    let channel = request.get("channel").and_then(Value::as_str);
    let channels = sessions.entry(connection.session_uuid.clone()).or_default();

    let reply = match (action, channel) {
        ("session-uuid", _) => json!({
            "seq": seq,
            "action": action,
            "code": 200,
            "uuid": connection.session_uuid,
        }),
        ("subscribe", Some(_)) | ("unsubscribe", Some(_)) | ("unsubscribe-all", _) | ("subscriptions", _)
            if !connection.can_read() =>
        {
            error_record(
                &seq,
                action,
                401,
                NOT_AUTHORIZED,
                "You do not have read permissions on this socket.",
            )
        }
        ("subscribe", Some(channel)) => {
            if !channels.iter().any(|c| c == channel) {
                channels.push(channel.to_string());
            }
            json!({"seq": seq, "action": action, "code": 200, "channels": channels})
        }
        ("unsubscribe", Some(channel)) => match channels.iter().position(|c| c == channel) {
            Some(index) => {
                channels.remove(index);
                json!({"seq": seq, "action": action, "code": 200, "channels": channels})
            }
            None => error_record(
                &seq,
                action,
                404,
                NOT_FOUND,
                "You are not subscribed to the specified channel.",
            ),
        },
        ("unsubscribe-all", _) => {
            let reply = json!({"seq": seq, "action": action, "code": 200, "channels": channels});
            channels.clear();
            reply
        }
        ("subscriptions", _) => json!({"seq": seq, "action": action, "code": 200, "channels": channels}),
        ("pub", _) => {
            let (Some(chan), Some(msg)) = (
                request.get("chan").and_then(Value::as_str),
                request.get("msg").and_then(Value::as_str),
            ) else {
                connection.push(&invalid_request(request));
                return;
            };
            if !connection.can_write() {
                connection.push(&error_record(
                    &seq,
                    action,
                    401,
                    NOT_AUTHORIZED,
                    "You do not have write permissions on this socket, and therefore cannot publish to channels.",
                ));
                return;
            }

            let message_id = uuid::Uuid::new_v4().to_string();
            let message = json!({
                "id": message_id,
                "action": "msg",
                "time": chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "chan": chan,
                "msg": msg,
            });
            for subscriber in connections.values() {
                let subscribed = sessions
                    .get(&subscriber.session_uuid)
                    .map_or(false, |list| list.iter().any(|c| c == chan));
                if subscribed {
                    subscriber.push(&message);
                }
            }

            if request.get("ack").and_then(Value::as_bool) == Some(true) {
                json!({"seq": seq, "action": action, "code": 200, "id": message_id})
            } else {
                return;
            }
        }
        _ => invalid_request(request),
    };

    connection.push(&reply);
}

fn invalid_request(request: &Value) -> Value {
    json!({
        "action": "invalid-request",
        "code": 400,
        "message": "Invalid Request",
        "details": "The request could not be understood by the server.",
        "bad_request": request,
    })
}

/// One client connection to a [`MockServer`].
pub struct MockTransport {
    server: MockServer,
    connection: Option<u64>,
}

impl MockTransport {
    /// The server this transport talks to.
    pub fn server(&self) -> &MockServer {
        &self.server
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, request: ConnectRequest, events: mpsc::UnboundedSender<TransportEvent>) {
        if let Some(id) = self.connection.take() {
            self.server.close(id);
        }
        log::debug!("Mock connect to {} (session {:?})", request.url, request.session_uuid);
        self.connection = self.server.open(&request, events);
    }

    fn disconnect(&mut self) {
        if let Some(id) = self.connection.take() {
            self.server.close(id);
        }
    }

    fn is_connected(&self) -> bool {
        self.connection.map_or(false, |id| self.server.is_open(id))
    }

    fn send(&mut self, text: String) -> Result<(), PubSubError> {
        match self.connection {
            Some(id) => self.server.receive(id, text),
            None => Err(PubSubError::NotConnected),
        }
    }
}
