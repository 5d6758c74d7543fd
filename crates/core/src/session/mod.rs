//! Session connection (C5): the persistent bidirectional websocket to the
//! control plane, supervised by the reconnect controller (C6) and backed
//! by the inbound dispatcher (C7) and outbound pipeline (C9).
//!
//! The reader and writer run as separate tasks per connection attempt,
//! mirroring the sender/receiver task split of a plain websocket client;
//! what's added here is the outer supervisor loop that reconnects with
//! backoff and the `watch`-based state that callers can observe.

pub mod reconnect;
mod dispatcher;

use crate::error::{OrraError, Result};
use crate::outbound::OutboundPipeline;
use crate::task::TaskEngine;
use crate::types::SessionState;
use dispatcher::Dispatcher;
use futures::{SinkExt, StreamExt};
use reconnect::ReconnectController;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

/// Builds the session websocket URL from the control plane's HTTP(S)
/// base: rewrites the scheme (`http`→`ws`, `https`→`wss`), appends
/// `/ws`, and carries the service id and API key as query parameters.
pub fn derive_ws_url(base: &Url, service_id: &str, api_key: &str) -> Result<Url> {
    let scheme = match base.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => base.scheme(),
        other => {
            return Err(OrraError::InvalidArgument(format!(
                "unsupported control plane scheme: {other}"
            )))
        }
    };

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|_| OrraError::InvalidArgument("failed to rewrite URL scheme".to_string()))?;
    url = url.join("ws").map_err(OrraError::UrlError)?;
    url.query_pairs_mut()
        .append_pair("serviceId", service_id)
        .append_pair("apiKey", api_key);
    Ok(url)
}

/// Observable handle into a running session: current connection state and
/// the means to shut it down.
#[derive(Clone)]
pub struct SessionHandle {
    state_rx: watch::Receiver<SessionState>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Builds a handle from the supervisor's state receiver and shutdown
    /// token.
    pub fn new(state_rx: watch::Receiver<SessionState>, cancel: CancellationToken) -> Self {
        Self { state_rx, cancel }
    }

    /// The current connection state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Begins an orderly shutdown: the supervisor sends a close frame,
    /// stops reconnecting, and settles into `Closed`. Idempotent: calling
    /// this on an already-closing or closed session is a no-op.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Runs the session supervisor loop until `cancel` fires, then performs
/// an orderly shutdown. Spawned once by [`crate::service`] at `Start()`.
pub async fn run(
    ws_url: Url,
    engine: Arc<TaskEngine>,
    service_id: String,
    mut outbound: OutboundPipeline,
    cancel: CancellationToken,
    state_tx: watch::Sender<SessionState>,
) {
    let dispatcher = Arc::new(Dispatcher::new(service_id, outbound.handle(), engine));
    let mut reconnect = ReconnectController::new();

    while !cancel.is_cancelled() {
        let _ = state_tx.send(SessionState::Connecting);
        match tokio_tungstenite::connect_async(ws_url.as_str()).await {
            Ok((stream, _response)) => {
                reconnect.reset();
                let _ = state_tx.send(SessionState::Connected);
                info!("session connected");

                run_connection(stream, &dispatcher, &mut outbound, &cancel).await;

                if cancel.is_cancelled() {
                    break;
                }
                let _ = state_tx.send(SessionState::Disconnected);
                warn!("session disconnected, will reconnect");
            }
            Err(e) => {
                error!(error = %e, "connect attempt failed");
                let _ = state_tx.send(SessionState::Disconnected);
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        match reconnect.next_delay() {
            Some(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                error!("reconnect attempts exhausted, giving up");
                break;
            }
        }
    }

    let _ = state_tx.send(SessionState::Closing);
    info!("session shutting down");
    let _ = state_tx.send(SessionState::Closed);
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Drives one live connection: splits it into reader and writer halves
/// and runs both concurrently until either ends, the peer closes, or
/// `cancel` fires. The writer owns the close handshake, since it is the
/// one holding the sink half of the socket.
async fn run_connection(
    stream: WsStream,
    dispatcher: &Arc<Dispatcher>,
    outbound: &mut OutboundPipeline,
    cancel: &CancellationToken,
) {
    let (write, mut read) = stream.split();

    let reader = async {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => dispatcher.handle_text(&text).await,
                Ok(Message::Close(_)) => {
                    info!("control plane closed the session");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "session read error");
                    return;
                }
            }
        }
    };

    let writer = run_writer(write, outbound, cancel);

    tokio::select! {
        _ = reader => {}
        _ = writer => {}
    }
}

/// Drains the outbound pipeline onto the socket, arming the ack-timeout
/// watcher for each sent envelope. Returns once the pipeline reports
/// `None` (either the session is cancelled or the queue's producer side
/// has gone away), sending a normal-closure frame first when cancelled.
async fn run_writer(
    mut write: futures::stream::SplitSink<WsStream, Message>,
    outbound: &mut OutboundPipeline,
    cancel: &CancellationToken,
) {
    loop {
        let Some(envelope) = outbound.next().await else {
            if cancel.is_cancelled() {
                send_close(&mut write).await;
            }
            return;
        };

        let text = match serde_json::to_string(&envelope) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "failed to serialize outbound envelope, dropping");
                continue;
            }
        };

        if let Err(e) = write.send(Message::Text(text)).await {
            error!(error = %e, "failed to write to session socket");
            return;
        }

        outbound.record_sent(envelope);
    }
}

/// Sends a normal-closure close frame. Best-effort: failures are logged,
/// never propagated, since the connection is going away regardless.
async fn send_close(write: &mut futures::stream::SplitSink<WsStream, Message>) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "Normal Closure".into(),
    };
    if let Err(e) = write.send(Message::Close(Some(frame))).await {
        warn!(error = %e, "failed to send close frame");
    }
}
