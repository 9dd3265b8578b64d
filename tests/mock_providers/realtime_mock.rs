//! Mock OpenAI Realtime WebSocket server.
//!
//! Accepts one connection at a time. On connect it sends `session.created`;
//! every text frame from the client is parsed and recorded, and a
//! `session.update` is answered with `session.updated` unless the server is
//! configured to stay silent.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// Session id the mock hands out.
pub const MOCK_SESSION_ID: &str = "sess_mock";

/// How long the wait helpers block before failing the test.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How the mock answers a connecting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Acknowledge `session.update` with `session.updated`
    Acknowledge,
    /// Accept the socket but never acknowledge the session
    Silent,
    /// Refuse the WebSocket handshake with this HTTP status
    RejectHandshake(u16),
}

enum Command {
    Send(Value),
    Close,
}

#[derive(Default)]
struct Recorded {
    events: Mutex<Vec<Value>>,
    headers: Mutex<Vec<(String, String)>>,
    connections: AtomicUsize,
    client_closed: AtomicBool,
    changed: Notify,
}

impl Recorded {
    fn record(&self, event: Value) {
        self.events.lock().push(event);
        self.changed.notify_waiters();
    }
}

/// Handle to a running mock server. The server stops when this is dropped.
pub struct MockRealtimeServer {
    addr: SocketAddr,
    recorded: Arc<Recorded>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl MockRealtimeServer {
    /// Start a server that acknowledges sessions.
    pub async fn start() -> Self {
        Self::start_with(MockBehavior::Acknowledge).await
    }

    pub async fn start_with(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to read local address");
        let recorded = Arc::new(Recorded::default());
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(serve(listener, behavior, recorded.clone(), rx));

        Self {
            addr,
            recorded,
            commands,
            task,
        }
    }

    /// WebSocket URL for the client configuration.
    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime?model=gpt-realtime", self.addr)
    }

    /// Send a server event to the connected client.
    pub fn push(&self, event: Value) {
        let _ = self.commands.send(Command::Send(event));
    }

    /// Close the current connection from the server side.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Every client event received so far.
    pub fn events(&self) -> Vec<Value> {
        self.recorded.events.lock().clone()
    }

    /// Client events of one type, in arrival order.
    pub fn events_of(&self, kind: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|event| event["type"] == kind)
            .collect()
    }

    /// Types of all client events, in arrival order.
    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|event| event["type"].as_str().map(str::to_string))
            .collect()
    }

    /// A handshake header from the most recent connection attempt.
    pub fn header(&self, name: &str) -> Option<String> {
        self.recorded
            .headers
            .lock()
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    /// Number of accepted WebSocket connections.
    pub fn connections(&self) -> usize {
        self.recorded.connections.load(Ordering::SeqCst)
    }

    /// Whether the client sent a close frame.
    pub fn client_closed(&self) -> bool {
        self.recorded.client_closed.load(Ordering::SeqCst)
    }

    /// Wait for the first client event of `kind`.
    pub async fn wait_for_event(&self, kind: &str) -> Value {
        self.wait_for_count(kind, 1)
            .await
            .into_iter()
            .next()
            .expect("wait_for_count returned no events")
    }

    /// Wait until at least `count` client events of `kind` have arrived.
    pub async fn wait_for_count(&self, kind: &str, count: usize) -> Vec<Value> {
        let wait = async {
            loop {
                let changed = self.recorded.changed.notified();
                let matching = self.events_of(kind);
                if matching.len() >= count {
                    return matching;
                }
                changed.await;
            }
        };
        tokio::time::timeout(WAIT_TIMEOUT, wait)
            .await
            .unwrap_or_else(|_| {
                panic!(
                    "Timed out waiting for {count} {kind} event(s), received {:?}",
                    self.event_types()
                )
            })
    }

    /// Wait until the client has closed its connection.
    pub async fn wait_for_client_close(&self) {
        let wait = async {
            loop {
                let changed = self.recorded.changed.notified();
                if self.client_closed() {
                    return;
                }
                changed.await;
            }
        };
        tokio::time::timeout(WAIT_TIMEOUT, wait)
            .await
            .expect("Timed out waiting for the client to close");
    }
}

impl Drop for MockRealtimeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    listener: TcpListener,
    behavior: MockBehavior,
    recorded: Arc<Recorded>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    while let Ok((stream, _)) = listener.accept().await {
        handle_connection(stream, behavior, &recorded, &mut commands).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    behavior: MockBehavior,
    recorded: &Arc<Recorded>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) {
    let handshake = recorded.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let mut headers = handshake.headers.lock();
        headers.clear();
        for (name, value) in request.headers() {
            headers.push((
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            ));
        }
        match behavior {
            MockBehavior::RejectHandshake(status) => Err(http::Response::builder()
                .status(status)
                .body(Some("invalid api key".to_string()))
                .expect("valid error response")),
            _ => Ok(response),
        }
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    recorded.connections.fetch_add(1, Ordering::SeqCst);
    recorded.client_closed.store(false, Ordering::SeqCst);

    let (mut write, mut read) = ws_stream.split();

    let created = json!({
        "type": "session.created",
        "event_id": "event_created",
        "session": {"id": MOCK_SESSION_ID, "model": "gpt-realtime"}
    });
    if write.send(Message::Text(created.to_string().into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let event: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                        let is_update = event["type"] == "session.update";
                        recorded.record(event);

                        if is_update && behavior == MockBehavior::Acknowledge {
                            let updated = json!({
                                "type": "session.updated",
                                "event_id": "event_updated",
                                "session": {"id": MOCK_SESSION_ID, "model": "gpt-realtime"}
                            });
                            if write.send(Message::Text(updated.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        recorded.client_closed.store(true, Ordering::SeqCst);
                        recorded.changed.notify_waiters();
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => {
                        recorded.client_closed.store(true, Ordering::SeqCst);
                        recorded.changed.notify_waiters();
                        break;
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Some(Command::Send(event)) => {
                        if write.send(Message::Text(event.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Command::Close) => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}
