use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use flyswat_core::net::messages::{ClientMessage, ServerMessage, StartSessionMsg};
use flyswat_core::net::protocol::{PROTOCOL_VERSION, decode_server_message, encode_client_message};

use flyswat_server::build_app;
use flyswat_server::config::{ServerConfig, StoreKind};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// In-memory leaderboard, 2 second sessions.
    pub async fn new() -> Self {
        Self::from_config(test_config()).await
    }

    /// Leaderboard persisted to the given JSON file.
    pub async fn with_file_store(path: &Path) -> Self {
        let mut config = test_config();
        config.leaderboard.store = StoreKind::File;
        config.leaderboard.path = path.to_path_buf();
        Self::from_config(config).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn leaderboard_url(&self) -> String {
        format!("http://{}/api/v1/leaderboard", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.leaderboard.store = StoreKind::Memory;
    config.session.duration_secs = 2;
    config
}

/// POST a submission and return (status, json body).
pub async fn post_score(
    server: &TestServer,
    body: serde_json::Value,
) -> (u16, serde_json::Value) {
    let resp = reqwest::Client::new()
        .post(server.leaderboard_url())
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// GET the ranked board.
pub async fn get_board(server: &TestServer) -> Vec<serde_json::Value> {
    reqwest::get(server.leaderboard_url())
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Read raw binary data from a WebSocket stream (5s timeout).
pub async fn ws_read_raw(stream: &mut WsStream) -> Vec<u8> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Read the next ServerMessage from a WebSocket stream (5s timeout).
pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let data = ws_read_raw(stream).await;
    decode_server_message(&data).unwrap()
}

/// Read messages until `pick` returns `Some` (10s overall timeout).
pub async fn ws_read_until<T>(
    stream: &mut WsStream,
    mut pick: impl FnMut(ServerMessage) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(found) = pick(ws_read_server_msg(stream).await) {
                return found;
            }
        }
    })
    .await
    .expect("Timed out waiting for expected message")
}

/// Send a ClientMessage from a WS stream.
pub async fn ws_send_client_msg(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

pub async fn ws_start_session(stream: &mut WsStream) {
    let msg = ClientMessage::StartSession(StartSessionMsg {
        protocol_version: PROTOCOL_VERSION,
    });
    ws_send_client_msg(stream, &msg).await;
}
