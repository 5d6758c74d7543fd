//! A minimal mock control plane: one `POST /register/service` route and
//! one `GET /ws` route, enough to drive a real [`orra_sdk_core::service`]
//! instance end to end against a real socket on localhost.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use url::Url;

#[derive(Clone)]
struct Shared {
    to_client: broadcast::Sender<String>,
    from_client: mpsc::UnboundedSender<String>,
    registrations: Arc<Mutex<Vec<Value>>>,
}

/// A running mock control plane bound to an ephemeral localhost port.
pub struct MockControlPlane {
    addr: SocketAddr,
    shared: Shared,
    from_client_rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl MockControlPlane {
    /// Starts the mock server in the background and returns once it is
    /// accepting connections.
    pub async fn start() -> Self {
        let (to_client, _) = broadcast::channel(64);
        let (from_client, from_client_rx) = mpsc::unbounded_channel();
        let shared = Shared {
            to_client,
            from_client,
            registrations: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/register/service", post(register))
            .route("/ws", get(upgrade))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock control plane");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock control plane server");
        });

        Self {
            addr,
            shared,
            from_client_rx: Mutex::new(from_client_rx),
        }
    }

    /// The HTTP base URL a service under test should register against.
    pub fn base_url(&self) -> Url {
        format!("http://{}", self.addr).parse().expect("valid base url")
    }

    /// Pushes one frame to whichever client is currently connected over
    /// `/ws`.
    pub fn send(&self, frame: Value) {
        let _ = self.shared.to_client.send(frame.to_string());
    }

    /// Waits for and returns the next frame the connected client sent.
    pub async fn recv(&self) -> Value {
        let mut rx = self.from_client_rx.lock().await;
        let text = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client channel closed");
        serde_json::from_str(&text).expect("client frame is valid JSON")
    }

    /// All registration request bodies received so far, in order.
    pub async fn registrations(&self) -> Vec<Value> {
        self.shared.registrations.lock().await.clone()
    }
}

async fn register(State(shared): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    let mut registrations = shared.registrations.lock().await;
    let version = registrations.len() as u64 + 1;
    registrations.push(body);
    Json(json!({ "id": "s_test0001", "version": version }))
}

async fn upgrade(State(shared): State<Shared>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, shared))
}

async fn handle_socket(mut socket: WebSocket, shared: Shared) {
    let mut to_client_rx = shared.to_client.subscribe();
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let _ = shared.from_client.send(text.to_string());
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    _ => {}
                }
            }
            outgoing = to_client_rx.recv() => {
                match outgoing {
                    Ok(text) => {
                        if socket.send(WsMessage::Text(text.into())).await.is_err() {
                            return;
                        }
                    }
                    Err(_) => return,
                }
            }
        }
    }
}

/// Polls a service handle's state until it reports `Connected`, or panics
/// after a generous timeout.
pub async fn wait_connected(service: &orra_sdk_core::ServiceHandle) {
    let mut rx = service.state_watch();
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if *rx.borrow() == orra_sdk_core::SessionState::Connected {
                return;
            }
            rx.changed().await.expect("session state channel closed");
        }
    })
    .await
    .expect("session never reached Connected");
}

/// An in-process identity store backed by a mutex, so tests never touch
/// the filesystem for identity persistence.
pub fn in_memory_identity_store() -> Arc<orra_sdk_core::identity::CustomIdentityStore> {
    let slot: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let save_slot = slot.clone();
    let save_fn: orra_sdk_core::identity::SaveFn = Arc::new(move |id: String| {
        let save_slot = save_slot.clone();
        Box::pin(async move {
            *save_slot.lock().await = Some(id);
            Ok(())
        })
    });

    let load_slot = slot;
    let load_fn: orra_sdk_core::identity::LoadFn = Arc::new(move || {
        let load_slot = load_slot.clone();
        Box::pin(async move { Ok(load_slot.lock().await.clone()) })
    });

    Arc::new(
        orra_sdk_core::identity::CustomIdentityStore::new(Some(save_fn), Some(load_fn))
            .expect("both callbacks provided"),
    )
}
