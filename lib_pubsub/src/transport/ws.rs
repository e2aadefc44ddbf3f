//! # WebSocket Transport
//!
//! Each `connect` spawns one task that opens the socket (bounded by the
//! connection timeout) and then multiplexes three sources with `select!`: the
//! cancellation token used by `disconnect`, outbound text queued by `send`, and
//! frames read from the server. The task reports everything on the engine's
//! event channel and always finishes with exactly one `Close`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};
use tokio_util::sync::CancellationToken;

use crate::error::PubSubError;
use crate::transport::{CloseReason, ConnectRequest, Transport, TransportEvent};

/// Close code reported when the server closed without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// tokio-tungstenite backed [`Transport`].
#[derive(Debug, Default)]
pub struct WsTransport {
    connected: Arc<AtomicBool>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: Option<CancellationToken>,
}

impl WsTransport {
    /// A transport with no connection yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, request: ConnectRequest, events: mpsc::UnboundedSender<TransportEvent>) {
        self.disconnect();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(false));

        self.outbound = Some(outbound_tx);
        self.cancel = Some(cancel.clone());
        self.connected = Arc::clone(&connected);

        tokio::spawn(run_connection(request, events, outbound_rx, cancel, connected));
    }

    fn disconnect(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.outbound = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&mut self, text: String) -> Result<(), PubSubError> {
        if !self.is_connected() {
            return Err(PubSubError::NotConnected);
        }
        match &self.outbound {
            Some(tx) => tx.send(text).map_err(|_| PubSubError::NotConnected),
            None => Err(PubSubError::NotConnected),
        }
    }
}

fn fail(events: &mpsc::UnboundedSender<TransportEvent>, error: String) {
    log::error!("WebSocket error: {}", error);
    let _ = events.send(TransportEvent::Error(error.clone()));
    let _ = events.send(TransportEvent::Close(CloseReason::abnormal(error)));
}

async fn run_connection(
    request: ConnectRequest,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
) {
    let mut client_request = match request.url.as_str().into_client_request() {
        Ok(r) => r,
        Err(e) => return fail(&events, format!("Invalid URL {}: {}", request.url, e)),
    };
    // Header names are case-insensitive; the http crate wants them lowercase.
    for (name, value) in [
        ("payload", &request.headers.payload_base64),
        ("payloadhmac", &request.headers.payload_hmac),
    ] {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                client_request.headers_mut().insert(name, v);
            }
            Err(e) => return fail(&events, format!("Invalid {} header: {}", name, e)),
        }
    }

    log::info!("Connecting to {}", request.url);
    let stream = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = events.send(TransportEvent::Close(CloseReason::normal()));
            return;
        }
        result = tokio::time::timeout(request.timeout, connect_async(client_request)) => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return fail(&events, format!("Failed to connect to {}: {}", request.url, e)),
            Err(_) => {
                return fail(
                    &events,
                    format!("Connection to {} timed out after {:?}", request.url, request.timeout),
                )
            }
        }
    };

    log::info!("Connected to {}", request.url);
    connected.store(true, Ordering::SeqCst);
    let _ = events.send(TransportEvent::Open);

    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let frame = CloseFrame { code: CloseCode::Normal, reason: "".into() };
                if let Err(e) = write.send(WsMessage::Close(Some(frame))).await {
                    log::debug!("Close frame not delivered: {}", e);
                }
                break CloseReason::normal();
            }
            Some(text) = outbound.recv() => {
                log::debug!("Sending: {}", text);
                if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                    log::error!("Failed to send frame: {}", e);
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break CloseReason::abnormal(e.to_string());
                }
            }
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = events.send(TransportEvent::Text(text.as_str().to_string()));
                }
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        let _ = events.send(TransportEvent::Text(text));
                    }
                    Err(_) => log::warn!("Dropping non UTF-8 binary frame of {} bytes", data.len()),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    break match frame {
                        Some(frame) => CloseReason {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.as_str().to_string(),
                        },
                        None => CloseReason {
                            code: Some(CLOSE_NO_STATUS),
                            reason: String::new(),
                        },
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::error!("WebSocket read error: {}", e);
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break CloseReason::abnormal(e.to_string());
                }
                None => break CloseReason::abnormal("stream ended"),
            }
        }
    };

    connected.store(false, Ordering::SeqCst);
    log::info!("Disconnected from {}: {}", request.url, reason);
    let _ = events.send(TransportEvent::Close(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthHeaders;
    use std::time::Duration;

    #[tokio::test]
    async fn send_before_connect_is_rejected() {
        let mut t = WsTransport::new();
        assert!(!t.is_connected());
        assert_eq!(t.send("{}".into()), Err(PubSubError::NotConnected));
    }

    #[tokio::test]
    async fn invalid_url_reports_error_then_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut t = WsTransport::new();
        t.connect(
            ConnectRequest {
                url: "not a url".into(),
                headers: AuthHeaders {
                    payload_base64: "e30=".into(),
                    payload_hmac: "00".into(),
                },
                session_uuid: None,
                timeout: Duration::from_secs(1),
            },
            tx,
        );

        assert!(matches!(rx.recv().await, Some(TransportEvent::Error(_))));
        match rx.recv().await {
            Some(TransportEvent::Close(reason)) => assert!(!reason.is_normal()),
            other => panic!("expected a close, got {:?}", other),
        }
        assert!(!t.is_connected());
    }
}
