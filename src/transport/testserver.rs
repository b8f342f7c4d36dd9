//! In-process mock server for transport tests.
//!
//! Binds a real WebSocket listener on a random localhost port and speaks
//! the wire protocol: requests are answered by method name, and a few
//! control methods exist purely to provoke the situations the transport
//! has to survive (out-of-order replies, silence, undecodable frames,
//! server-side hangups, push events).
//!
//! Each request is answered from its own task over a shared writer, so
//! replies interleave exactly as a busy server's would.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

// ============================================================================
// Types
// ============================================================================

/// Shared write half of one accepted connection.
type Writer = Arc<Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>>;

// ============================================================================
// TestServer
// ============================================================================

/// A mock Meridian server listening on a random localhost port.
pub(crate) struct TestServer {
    addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl TestServer {
    /// Binds a listener and starts accepting connections.
    pub(crate) async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(serve_connection(stream));
            }
        });

        Self { addr, accept_task }
    }

    /// Returns the endpoint clients should connect to.
    pub(crate) fn endpoint(&self) -> String {
        format!("ws://{}/rpc", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// ============================================================================
// Connection Handling
// ============================================================================

/// Serves one accepted connection until it closes.
async fn serve_connection(stream: TcpStream) {
    let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    let (ws_write, mut ws_read) = ws_stream.split();
    let writer: Writer = Arc::new(Mutex::new(ws_write));

    while let Some(Ok(message)) = ws_read.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };

        // Answer from a separate task so slow methods don't serialize
        // the whole connection.
        let writer = Arc::clone(&writer);
        tokio::spawn(answer(frame, writer));
    }
}

/// Answers one request frame according to its method.
async fn answer(frame: Value, writer: Writer) {
    let id = frame.get("id").cloned().unwrap_or(Value::Null);
    let method = frame
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = frame
        .get("params")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    match method.as_str() {
        "echo" => {
            let value = params.first().cloned().unwrap_or(Value::Null);
            send_result(&writer, &id, value).await;
        }

        // Replies with params[0] after params[1] milliseconds.
        "echo_after" => {
            let value = params.first().cloned().unwrap_or(Value::Null);
            let delay = params.get(1).and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            send_result(&writer, &id, value).await;
        }

        "ping" | "use" | "kill" => {
            send_result(&writer, &id, Value::Null).await;
        }

        "signin" => {
            let pass = params
                .first()
                .and_then(|p| p.get("pass"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if pass == "wrong" {
                send_error(&writer, &id, -32004, "invalid credentials").await;
            } else {
                send_result(&writer, &id, Value::Null).await;
            }
        }

        "live" => {
            send_result(&writer, &id, json!(Uuid::new_v4().to_string())).await;
        }

        "query" => {
            send_result(&writer, &id, json!([{"ok": true}])).await;
        }

        // Pushes a notification for params[0] carrying params[1], then
        // acknowledges the request itself.
        "notify" => {
            let subscription = params.first().cloned().unwrap_or(Value::Null);
            let payload = params.get(1).cloned().unwrap_or(Value::Null);
            let push = json!({
                "result": {"id": subscription, "action": "CREATE", "result": payload}
            });
            send_text(&writer, push.to_string()).await;
            send_result(&writer, &id, Value::Null).await;
        }

        // Emits an undecodable frame, then acknowledges the request.
        "garbage" => {
            send_text(&writer, "{this is not json".to_string()).await;
            send_result(&writer, &id, Value::Null).await;
        }

        // Never replies; callers are left waiting.
        "block" => {}

        // Closes the socket from the server side without replying.
        "hangup" => {
            let _ = writer.lock().await.close().await;
        }

        other => {
            send_error(&writer, &id, -32601, &format!("unknown method '{other}'")).await;
        }
    }
}

// ============================================================================
// Frame Helpers
// ============================================================================

async fn send_result(writer: &Writer, id: &Value, result: Value) {
    send_text(writer, json!({"id": id, "result": result}).to_string()).await;
}

async fn send_error(writer: &Writer, id: &Value, code: i64, message: &str) {
    let frame = json!({"id": id, "error": {"code": code, "message": message}});
    send_text(writer, frame.to_string()).await;
}

async fn send_text(writer: &Writer, text: String) {
    let _ = writer.lock().await.send(Message::Text(text.into())).await;
}
