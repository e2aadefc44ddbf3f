//! # Session Engine
//!
//! One tokio task (the actor) owns every piece of mutable session state: the
//! transport, the pending request table, the channel registry, the session
//! token and the reconnect bookkeeping. [`SessionEngine`] handles talk to it
//! through an unbounded command channel and get their answers back on
//! `oneshot` channels. Notifications fan out on a `broadcast` channel of
//! [`SessionEvent`]s.
//!
//! The actor multiplexes four sources:
//! - commands from handles (a closed channel means every handle is gone);
//! - events from the current transport connection;
//! - sequence numbers whose request timer ran out;
//! - reconnect timer ticks.
//!
//! Events from a connection the actor already let go of are never seen: each
//! connect gets a fresh event channel and the old receiver is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::auth::Authenticator;
use crate::configs::options::PubSubOptions;
use crate::core::pending::PendingRequestTable;
use crate::core::reconnect::{ReconnectPolicy, ReconnectState};
use crate::core::registry::{ChannelRegistry, MessageHandler};
use crate::core::sequencer::SequenceAllocator;
use crate::error::PubSubError;
use crate::protocol::{classify, ErrorResponse, Frame, PubSubMessage, RequestFrame, Response};
use crate::transport::{CloseReason, ConnectRequest, Transport, TransportEvent};

/// Lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// No connection; a reconnect may be scheduled.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is open.
    Connected,
    /// `close()` is tearing the connection down.
    Closing,
    /// Closed on purpose. Only an explicit `connect` leaves this state.
    Closed,
}

/// Notifications published by the engine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The transport opened.
    Connected,
    /// The server started a session other than the one presented.
    NewSession(String),
    /// The server confirmed the session that was presented.
    Reconnected,
    /// Every inbound record, verbatim, before it is classified.
    RawRecord(String),
    /// A message from any subscribed channel.
    Message(PubSubMessage),
    /// The connection ended; `None` for a normal closure.
    Closed(Option<PubSubError>),
    /// General error notification.
    Error(PubSubError),
    /// The server answered some request with an error status.
    ErrorResponse(ErrorResponse),
    /// A reconnect attempt was scheduled.
    ReconnectScheduled {
        /// Attempt number since the last successful connect, from 1.
        attempt: u64,
        /// Wait before the attempt.
        delay: Duration,
    },
}

/// Where a request's outcome goes.
enum Completion {
    /// The caller waits for the response or an error.
    Outcome(oneshot::Sender<Result<Response, PubSubError>>),
    /// Fire-and-forget publish: only an error is ever reported.
    ErrorOnly(oneshot::Sender<PubSubError>),
    /// Issued by the engine itself; nobody waits.
    Internal,
}

impl Completion {
    fn is_disposable(&self) -> bool {
        matches!(self, Completion::ErrorOnly(_))
    }

    fn succeed(self, response: Response) {
        if let Completion::Outcome(tx) = self {
            let _ = tx.send(Ok(response));
        }
    }

    fn fail(self, error: PubSubError) {
        match self {
            Completion::Outcome(tx) => {
                let _ = tx.send(Err(error));
            }
            Completion::ErrorOnly(tx) => {
                let _ = tx.send(error);
            }
            Completion::Internal => {}
        }
    }
}

/// Registry change tied to a request's outcome.
enum Effect {
    None,
    Subscribe(String),
    Unsubscribe(String),
    UnsubscribeAll,
}

impl Effect {
    fn of(frame: &RequestFrame) -> Self {
        match frame {
            RequestFrame::Subscribe { channel, .. } => Effect::Subscribe(channel.clone()),
            RequestFrame::Unsubscribe { channel, .. } => Effect::Unsubscribe(channel.clone()),
            RequestFrame::UnsubscribeAll { .. } => Effect::UnsubscribeAll,
            _ => Effect::None,
        }
    }
}

struct InFlight {
    completion: Completion,
    effect: Effect,
}

enum Command {
    Connect {
        session_uuid: Option<String>,
    },
    Request {
        frame: RequestFrame,
        completion: Completion,
        handler: Option<MessageHandler>,
    },
    Close,
    DropConnection,
    State(oneshot::Sender<EngineState>),
    PendingRequests(oneshot::Sender<usize>),
    Channels(oneshot::Sender<Vec<String>>),
}

/// Outcome of a fire-and-forget [`SessionEngine::publish`].
#[derive(Debug)]
pub struct PublishHandle {
    sequence: u64,
    failure: oneshot::Receiver<PubSubError>,
}

impl PublishHandle {
    /// Sequence number of the publish request.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Waits until the publish is settled. `Some` if it failed; `None` once
    /// the request is gone without an error, which is what success looks like.
    pub async fn failed(self) -> Option<PubSubError> {
        self.failure.await.ok()
    }
}

/// Handle to a session engine. Clones share the same session.
#[derive(Clone)]
pub struct SessionEngine {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
    sequences: Arc<SequenceAllocator>,
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("receivers", &self.events.receiver_count())
            .finish()
    }
}

impl SessionEngine {
    /// Validates `keys` and `options` and starts the engine task on the
    /// current tokio runtime. Nothing connects until [`SessionEngine::connect`].
    pub fn new<S, T>(keys: &[S], options: PubSubOptions, transport: T) -> Result<Self, PubSubError>
    where
        S: AsRef<str>,
        T: Transport,
    {
        let auth = Authenticator::new(keys)?;
        Self::with_authenticator(auth, options, transport)
    }

    /// Like [`SessionEngine::new`], with keys that are already parsed.
    pub fn with_authenticator<T: Transport>(
        auth: Authenticator,
        options: PubSubOptions,
        transport: T,
    ) -> Result<Self, PubSubError> {
        options
            .validate()
            .map_err(|e| PubSubError::InvalidOptions(e.to_string()))?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (expiries_tx, expiries_rx) = mpsc::unbounded_channel();
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(options.event_capacity);
        let sequences = Arc::new(SequenceAllocator::new());

        let policy = ReconnectPolicy::from_options(&options);
        let actor = EngineActor {
            pending: PendingRequestTable::new(options.max_pending_requests, expiries_tx),
            reconnect: policy.initial_state(options.auto_reconnect),
            policy,
            auth,
            options,
            transport,
            state: EngineState::Disconnected,
            session_uuid: None,
            channels: ChannelRegistry::new(),
            reconnect_timer: None,
            reconnect_generation: 0,
            reconnect_tx,
            transport_rx: None,
            events: events.clone(),
            sequences: Arc::clone(&sequences),
        };
        tokio::spawn(actor.run(commands_rx, expiries_rx, reconnect_rx));

        Ok(Self {
            commands: commands_tx,
            events,
            sequences,
        })
    }

    /// A receiver for every notification published from now on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Starts connecting, presenting `session_uuid` for resumption if given.
    /// A no-op while connecting or connected.
    pub fn connect(&self, session_uuid: Option<String>) -> Result<(), PubSubError> {
        self.send_command(Command::Connect { session_uuid })
    }

    /// Closes the session for good: no reconnect, pending requests are
    /// abandoned and channel handlers are forgotten.
    pub fn close(&self) -> Result<(), PubSubError> {
        self.send_command(Command::Close)
    }

    /// Drops the connection and abandons pending requests, but lets
    /// auto-reconnect bring the session back.
    pub fn drop_connection(&self) -> Result<(), PubSubError> {
        self.send_command(Command::DropConnection)
    }

    /// Asks the server for the current session id.
    pub async fn get_session_id(&self) -> Result<String, PubSubError> {
        let response = self.request(|seq| RequestFrame::SessionUuid { seq }, None).await?;
        response
            .uuid
            .ok_or_else(|| PubSubError::Protocol("session-uuid response without uuid".to_string()))
    }

    /// Subscribes to `channel`; `handler` receives that channel's messages.
    /// Returns every channel the session is subscribed to.
    pub async fn subscribe(&self, channel: &str, handler: Option<MessageHandler>) -> Result<Vec<String>, PubSubError> {
        let channel = channel.to_string();
        let response = self
            .request(|seq| RequestFrame::Subscribe { seq, channel }, handler)
            .await?;
        channels_of(response)
    }

    /// Unsubscribes from `channel`. Returns the remaining channels.
    pub async fn unsubscribe(&self, channel: &str) -> Result<Vec<String>, PubSubError> {
        let channel = channel.to_string();
        let response = self
            .request(|seq| RequestFrame::Unsubscribe { seq, channel }, None)
            .await?;
        channels_of(response)
    }

    /// Unsubscribes from every channel. Returns the channels that were left.
    pub async fn unsubscribe_all(&self) -> Result<Vec<String>, PubSubError> {
        let response = self.request(|seq| RequestFrame::UnsubscribeAll { seq }, None).await?;
        channels_of(response)
    }

    /// Lists the session's subscriptions as the server knows them.
    pub async fn list_subscriptions(&self) -> Result<Vec<String>, PubSubError> {
        let response = self.request(|seq| RequestFrame::Subscriptions { seq }, None).await?;
        channels_of(response)
    }

    /// Publishes without acknowledgement. The handle reports a failure, if
    /// the server sends one.
    pub fn publish(&self, channel: &str, message: &str) -> PublishHandle {
        let seq = self.sequences.next();
        let (tx, rx) = oneshot::channel();
        let _ = self.send_command(Command::Request {
            frame: RequestFrame::Publish {
                seq,
                chan: channel.to_string(),
                msg: message.to_string(),
                ack: None,
            },
            completion: Completion::ErrorOnly(tx),
            handler: None,
        });
        PublishHandle {
            sequence: seq,
            failure: rx,
        }
    }

    /// Publishes and waits for the server's acknowledgement. Returns the
    /// message id. The message itself still reaches subscribed handlers.
    pub async fn publish_with_ack(&self, channel: &str, message: &str) -> Result<String, PubSubError> {
        let (chan, msg) = (channel.to_string(), message.to_string());
        let response = self
            .request(
                |seq| RequestFrame::Publish {
                    seq,
                    chan,
                    msg,
                    ack: Some(true),
                },
                None,
            )
            .await?;
        response
            .id
            .ok_or_else(|| PubSubError::Protocol("publish acknowledgement without id".to_string()))
    }

    /// The engine's current lifecycle state.
    pub async fn state(&self) -> Result<EngineState, PubSubError> {
        self.query(Command::State).await
    }

    /// Number of requests waiting for a response.
    pub async fn pending_requests(&self) -> Result<usize, PubSubError> {
        self.query(Command::PendingRequests).await
    }

    /// Channels registered locally, sorted.
    pub async fn registered_channels(&self) -> Result<Vec<String>, PubSubError> {
        self.query(Command::Channels).await
    }

    async fn query<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R, PubSubError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(command(tx))?;
        rx.await.map_err(|_| PubSubError::EngineStopped)
    }

    async fn request(
        &self,
        build: impl FnOnce(u64) -> RequestFrame,
        handler: Option<MessageHandler>,
    ) -> Result<Response, PubSubError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(Command::Request {
            frame: build(self.sequences.next()),
            completion: Completion::Outcome(tx),
            handler,
        })?;
        rx.await.map_err(|_| PubSubError::Abandoned)?
    }

    fn send_command(&self, command: Command) -> Result<(), PubSubError> {
        match self.commands.send(command) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(command)) => {
                if let Command::Request { completion, .. } = command {
                    completion.fail(PubSubError::EngineStopped);
                }
                Err(PubSubError::EngineStopped)
            }
        }
    }
}

fn channels_of(response: Response) -> Result<Vec<String>, PubSubError> {
    response.channels.ok_or_else(|| {
        PubSubError::Protocol(format!("{} response without channels", response.action))
    })
}

async fn next_event(rx: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>) -> Option<TransportEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

struct EngineActor<T: Transport> {
    options: PubSubOptions,
    auth: Authenticator,
    transport: T,
    state: EngineState,
    session_uuid: Option<String>,
    pending: PendingRequestTable<InFlight>,
    channels: ChannelRegistry,
    policy: ReconnectPolicy,
    reconnect: ReconnectState,
    reconnect_timer: Option<CancellationToken>,
    reconnect_generation: u64,
    reconnect_tx: mpsc::UnboundedSender<u64>,
    transport_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    events: broadcast::Sender<SessionEvent>,
    sequences: Arc<SequenceAllocator>,
}

impl<T: Transport> EngineActor<T> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut expiries: mpsc::UnboundedReceiver<u64>,
        mut reconnects: mpsc::UnboundedReceiver<u64>,
    ) {
        log::debug!("Session engine started for {}", self.options.url);
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = next_event(&mut self.transport_rx) => self.handle_transport_event(event),
                Some(sequence) = expiries.recv() => self.handle_expiry(sequence),
                Some(generation) = reconnects.recv() => self.handle_reconnect_tick(generation),
            }
        }

        self.cancel_reconnect();
        self.transport.disconnect();
        self.pending.clear();
        log::debug!("Session engine stopped for {}", self.options.url);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { session_uuid } => self.connect(session_uuid),
            Command::Request {
                frame,
                completion,
                handler,
            } => self.send_request(frame, completion, handler),
            Command::Close => self.close(),
            Command::DropConnection => self.drop_connection(),
            Command::State(tx) => {
                let _ = tx.send(self.state);
            }
            Command::PendingRequests(tx) => {
                let _ = tx.send(self.pending.len());
            }
            Command::Channels(tx) => {
                let _ = tx.send(self.channels.channels());
            }
        }
    }

    fn connect(&mut self, session_uuid: Option<String>) {
        if matches!(self.state, EngineState::Connecting | EngineState::Connected) {
            log::debug!("Connect ignored, engine is {:?}", self.state);
            return;
        }
        self.cancel_reconnect();
        self.session_uuid = session_uuid;
        self.reconnect.enabled = self.options.auto_reconnect;
        self.open_transport();
    }

    fn open_transport(&mut self) {
        let headers = self.auth.authenticate(self.session_uuid.as_deref());
        let (tx, rx) = mpsc::unbounded_channel();
        self.transport_rx = Some(rx);
        self.state = EngineState::Connecting;
        log::info!("Connecting to {} (session {:?})", self.options.url, self.session_uuid);
        self.transport.connect(
            ConnectRequest {
                url: self.options.url.clone(),
                headers,
                session_uuid: self.session_uuid.clone(),
                timeout: self.options.connection_timeout,
            },
            tx,
        );
    }

    fn close(&mut self) {
        let was_live = matches!(self.state, EngineState::Connecting | EngineState::Connected);
        self.state = EngineState::Closing;
        self.reconnect.enabled = false;
        self.cancel_reconnect();
        self.transport.disconnect();
        self.transport_rx = None;
        self.abandon_pending();
        self.channels.clear();
        self.state = EngineState::Closed;
        log::info!("Session closed");
        if was_live {
            self.emit(SessionEvent::Closed(None));
        }
    }

    fn drop_connection(&mut self) {
        self.abandon_pending();
        if !matches!(self.state, EngineState::Connecting | EngineState::Connected) {
            log::debug!("Drop ignored, engine is {:?}", self.state);
            return;
        }
        self.transport.disconnect();
        self.transport_rx = None;
        self.state = EngineState::Disconnected;
        log::info!("Connection dropped on request");
        self.emit(SessionEvent::Closed(None));
        self.schedule_reconnect();
    }

    fn send_request(&mut self, frame: RequestFrame, completion: Completion, handler: Option<MessageHandler>) {
        let sequence = frame.seq();
        if self.state != EngineState::Connected || !self.transport.is_connected() {
            log::warn!("Request {} ({}) while disconnected", sequence, frame.action().as_str());
            self.reject(completion, PubSubError::NotConnected);
            return;
        }

        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => return self.reject(completion, e),
        };

        let effect = Effect::of(&frame);
        if let Effect::Subscribe(channel) = &effect {
            self.channels.insert(channel, handler);
        }

        let disposable = completion.is_disposable();
        if let Err(rejected) = self.pending.register(
            sequence,
            InFlight { completion, effect },
            disposable,
            self.options.request_timeout,
        ) {
            self.roll_back(&rejected.value.effect);
            return self.reject(rejected.value.completion, rejected.error);
        }

        log::debug!("Sending: {}", text);
        if let Err(e) = self.transport.send(text) {
            if let Some(entry) = self.pending.resolve(sequence) {
                self.roll_back(&entry.value.effect);
                self.reject(entry.value.completion, e);
            }
        }
    }

    /// Forgets every request in flight. Waiting callers see `Abandoned`.
    fn abandon_pending(&mut self) {
        let abandoned = self.pending.drain();
        if !abandoned.is_empty() {
            log::warn!("Abandoning {} pending requests", abandoned.len());
        }
        for entry in abandoned {
            self.roll_back(&entry.value.effect);
        }
    }

    fn reject(&self, completion: Completion, error: PubSubError) {
        self.emit(SessionEvent::Error(error.clone()));
        completion.fail(error);
    }

    fn roll_back(&mut self, effect: &Effect) {
        if let Effect::Subscribe(channel) = effect {
            self.channels.remove(channel);
        }
    }

    fn apply(&mut self, effect: &Effect) {
        match effect {
            Effect::Unsubscribe(channel) => {
                self.channels.remove(channel);
            }
            Effect::UnsubscribeAll => self.channels.clear(),
            Effect::Subscribe(_) | Effect::None => {}
        }
    }

    fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Open) => self.on_open(),
            Some(TransportEvent::Text(raw)) => self.on_record(raw),
            Some(TransportEvent::Error(e)) => {
                log::error!("Transport error: {}", e);
                self.emit(SessionEvent::Error(PubSubError::Transport(e)));
            }
            Some(TransportEvent::Close(reason)) => self.on_close(reason),
            None => self.on_close(CloseReason::abnormal("transport went away")),
        }
    }

    fn on_open(&mut self) {
        log::info!("Connected to {}", self.options.url);
        self.state = EngineState::Connected;
        self.policy.reset(&mut self.reconnect);
        self.emit(SessionEvent::Connected);

        let seq = self.sequences.next();
        self.send_request(RequestFrame::SessionUuid { seq }, Completion::Internal, None);
    }

    fn on_close(&mut self, reason: CloseReason) {
        self.transport_rx = None;
        self.state = EngineState::Disconnected;
        let error = if reason.is_normal() {
            log::info!("Disconnected from {}", self.options.url);
            None
        } else {
            log::warn!("Disconnected from {}: {}", self.options.url, reason);
            Some(PubSubError::Transport(reason.to_string()))
        };
        self.emit(SessionEvent::Closed(error));
        self.schedule_reconnect();
    }

    fn on_record(&mut self, raw: String) {
        log::debug!("Received: {}", raw);
        self.emit(SessionEvent::RawRecord(raw.clone()));

        match classify(&raw) {
            Frame::Malformed(error) => {
                log::warn!("Unusable record: {}", error);
                self.emit(SessionEvent::Error(error));
            }
            Frame::ErrorResponse(response) => {
                if let Some(entry) = response.sequence.and_then(|seq| self.pending.resolve(seq)) {
                    self.roll_back(&entry.value.effect);
                    entry.value.completion.fail(PubSubError::Server(response.clone()));
                }
                self.emit(SessionEvent::ErrorResponse(response));
            }
            Frame::Response(response) => {
                if let Some(uuid) = &response.uuid {
                    if self.session_uuid.as_deref() == Some(uuid.as_str()) {
                        log::info!("Resumed session {}", uuid);
                        self.emit(SessionEvent::Reconnected);
                    } else {
                        log::info!("New session {}", uuid);
                        self.emit(SessionEvent::NewSession(uuid.clone()));
                    }
                    self.session_uuid = Some(uuid.clone());
                }
                if let Some(entry) = self.pending.resolve(response.seq) {
                    self.apply(&entry.value.effect);
                    entry.value.completion.succeed(response);
                }
            }
            Frame::Message(message) => {
                self.channels.dispatch(&message);
                self.emit(SessionEvent::Message(message));
            }
        }
    }

    fn handle_expiry(&mut self, sequence: u64) {
        let Some(entry) = self.pending.expire(sequence) else {
            return;
        };
        if entry.disposable {
            log::debug!("Publish {} settled without a reply", sequence);
            return;
        }
        log::warn!("Request {} timed out after {:?}", sequence, self.options.request_timeout);
        self.roll_back(&entry.value.effect);
        let error = PubSubError::Timeout { sequence };
        self.emit(SessionEvent::Error(error.clone()));
        entry.value.completion.fail(error);
    }

    fn schedule_reconnect(&mut self) {
        if !self.policy.should_retry(&self.reconnect) {
            if self.reconnect.enabled {
                log::warn!("Giving up after {} reconnect attempts", self.reconnect.attempts);
            }
            return;
        }

        let attempt = self.reconnect.attempts + 1;
        let delay = self.policy.next_delay(&mut self.reconnect);
        log::info!("Reconnect attempt {} in {:?}", attempt, delay);
        self.emit(SessionEvent::ReconnectScheduled { attempt, delay });

        self.cancel_reconnect();
        self.reconnect_generation += 1;
        let generation = self.reconnect_generation;
        let token = CancellationToken::new();
        self.reconnect_timer = Some(token.clone());
        let tx = self.reconnect_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(delay) => {
                    let _ = tx.send(generation);
                }
            }
        });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(token) = self.reconnect_timer.take() {
            token.cancel();
        }
    }

    fn handle_reconnect_tick(&mut self, generation: u64) {
        if generation != self.reconnect_generation || self.reconnect_timer.take().is_none() {
            return;
        }
        if self.state != EngineState::Disconnected || !self.reconnect.enabled {
            return;
        }
        self.open_transport();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockServer;

    const KEYS: [&str; 2] = [
        "R-0123456789abcdef-00112233445566778899aabbccddeeff",
        "W-0123456789abcdef-ffeeddccbbaa99887766554433221100",
    ];

    fn options() -> PubSubOptions {
        PubSubOptions {
            auto_reconnect: false,
            ..PubSubOptions::with_url("mock://pubsub")
        }
    }

    #[tokio::test]
    async fn bad_keys_are_rejected_up_front() {
        let server = MockServer::new();
        let err = SessionEngine::new(&["X-zz-00"], options(), server.transport()).unwrap_err();
        assert!(matches!(err, PubSubError::Auth(_)));
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_up_front() {
        let server = MockServer::new();
        let bad = PubSubOptions {
            max_pending_requests: 0,
            ..options()
        };
        let err = SessionEngine::new(&KEYS, bad, server.transport()).unwrap_err();
        assert!(matches!(err, PubSubError::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn requests_before_connect_fail_immediately() {
        let server = MockServer::new();
        let engine = SessionEngine::new(&KEYS, options(), server.transport()).unwrap();
        let mut events = engine.events();

        assert_eq!(engine.list_subscriptions().await, Err(PubSubError::NotConnected));
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Error(PubSubError::NotConnected)));
        assert_eq!(engine.pending_requests().await.unwrap(), 0);
        assert!(server.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn publish_handle_reports_not_connected() {
        let server = MockServer::new();
        let engine = SessionEngine::new(&KEYS, options(), server.transport()).unwrap();
        let handle = engine.publish("Test", "hello");
        assert!(handle.sequence() > 0);
        assert_eq!(handle.failed().await, Some(PubSubError::NotConnected));
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_engine() {
        let server = MockServer::new();
        let engine = SessionEngine::new(&KEYS, options(), server.transport()).unwrap();
        let mut events = engine.events();
        engine.connect(None).unwrap();
        while !matches!(events.recv().await.unwrap(), SessionEvent::NewSession(_)) {}
        assert_eq!(server.live_connections(), 1);

        drop(engine);
        assert!(matches!(events.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert_eq!(server.live_connections(), 0);
    }
}
