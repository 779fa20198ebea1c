use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use flyswat_core::net::messages::{
    ClientMessage, LeaderboardMsg, ServerMessage, SubmitResultMsg,
};
use flyswat_core::net::protocol::{
    MAX_MESSAGE_SIZE, PROTOCOL_VERSION, decode_client_message, decode_message_type,
    encode_server_message,
};
use flyswat_core::session::SessionResult;

use crate::leaderboard::LeaderboardUpdate;
use crate::session_loop::{SessionBroadcast, SessionCommand, SessionHandle, spawn_session};
use crate::state::{AppState, ConnectionGuard};

/// Outbound frames buffered per connection before the writer applies
/// backpressure.
const OUTBOUND_BUFFER: usize = 256;

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

/// Per-connection state: the session actor plus the last unsubmitted result.
struct Connection {
    session_id: Uuid,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    out_tx: mpsc::Sender<Bytes>,
    pending_result: Option<SessionResult>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let session_id = Uuid::new_v4();
    let (ws_sender, mut ws_receiver) = socket.split();

    let (out_tx, out_rx) = mpsc::channel::<Bytes>(OUTBOUND_BUFFER);
    spawn_writer(ws_sender, out_rx);

    let SessionHandle {
        cmd_tx,
        mut broadcast_rx,
        handle,
    } = spawn_session(state.config.session.clone(), None);
    let mut board_rx = Some(state.leaderboard.subscribe());

    tracing::info!(%session_id, "Player connected");

    let mut conn = Connection {
        session_id,
        cmd_tx,
        out_tx,
        pending_result: None,
    };

    // Current board so the client can render it before the first run
    let entries = state.leaderboard.query().await;
    conn.send(&ServerMessage::Leaderboard(LeaderboardMsg { entries }))
        .await;

    let mut rate_limiter = RateLimiter::per_second(state.config.limits.ws_rate_limit_per_sec);

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                let data = match incoming {
                    Some(Ok(Message::Binary(d))) => d,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };

                if !rate_limiter.allow() {
                    tracing::warn!(%session_id, "Dropped frame over rate limit");
                    continue;
                }

                if !conn.handle_frame(&data, &state).await {
                    break;
                }
            }
            out = broadcast_rx.recv() => {
                match out {
                    Some(SessionBroadcast::EncodedMessage(data)) => {
                        if conn.out_tx.send(data).await.is_err() {
                            break;
                        }
                    },
                    Some(SessionBroadcast::Ended(result)) => {
                        conn.pending_result = Some(result);
                    },
                    Some(SessionBroadcast::Closed) | None => break,
                }
            }
            update = next_update(board_rx.as_mut()) => {
                match update {
                    Ok(LeaderboardUpdate { entries }) => {
                        conn.send(&ServerMessage::Leaderboard(LeaderboardMsg { entries }))
                            .await;
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(%session_id, skipped = n, "Leaderboard updates lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        // Keep serving the session without live board pushes
                        board_rx = None;
                    },
                }
            }
        }
    }

    let _ = conn.cmd_tx.send(SessionCommand::Stop);
    let _ = handle.await;
    tracing::info!(%session_id, "Player disconnected");
}

async fn next_update(
    rx: Option<&mut broadcast::Receiver<LeaderboardUpdate>>,
) -> Result<LeaderboardUpdate, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Connection {
    async fn send(&self, msg: &ServerMessage) {
        match encode_server_message(msg) {
            Ok(data) => {
                let _ = self.out_tx.send(Bytes::from(data)).await;
            },
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "Failed to encode message");
            },
        }
    }

    /// Handle one client frame. Returns `false` when the connection should
    /// be closed.
    async fn handle_frame(&mut self, data: &[u8], state: &AppState) -> bool {
        let session_id = self.session_id;

        // Drop oversized messages
        if data.is_empty() || data.len() > MAX_MESSAGE_SIZE {
            return true;
        }

        let msg_type = match decode_message_type(data) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(%session_id, error = %e, "Dropped unknown frame");
                return true;
            },
        };

        // Server-authoritative: clients never send snapshots or results
        if msg_type.is_server_only() {
            tracing::warn!(%session_id, ?msg_type, "Rejected server-only message from client");
            return true;
        }

        let msg = match decode_client_message(data) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(%session_id, error = %e, "Dropped malformed frame");
                return true;
            },
        };

        let cmd = match msg {
            ClientMessage::StartSession(start) => {
                if start.protocol_version != 0 && start.protocol_version != PROTOCOL_VERSION {
                    tracing::warn!(
                        %session_id,
                        client = start.protocol_version,
                        server = PROTOCOL_VERSION,
                        "Protocol version mismatch"
                    );
                    return false;
                }
                self.pending_result = None;
                SessionCommand::Start
            },
            ClientMessage::Swat(swat) => SessionCommand::Swat {
                target_id: swat.target_id,
            },
            ClientMessage::Miss(miss) => SessionCommand::Miss {
                x: miss.x,
                y: miss.y,
            },
            ClientMessage::Replay(_) => {
                // Skipping the submission forfeits it
                self.pending_result = None;
                SessionCommand::Replay
            },
            ClientMessage::SubmitScore(submit) => {
                self.submit(&submit.name, state).await;
                return true;
            },
        };

        self.cmd_tx.send(cmd).is_ok()
    }

    async fn submit(&mut self, name: &str, state: &AppState) {
        let Some(result) = self.pending_result else {
            self.send(&ServerMessage::SubmitResult(SubmitResultMsg {
                success: false,
                error: Some("no_result".to_string()),
                entry_id: None,
                rank: None,
            }))
            .await;
            return;
        };

        let reply = match state
            .leaderboard
            .submit_score(name, result.final_score)
            .await
        {
            Ok(ack) => {
                self.pending_result = None;
                tracing::info!(
                    session_id = %self.session_id,
                    entry_id = ack.id,
                    score = result.final_score,
                    "Session score submitted"
                );
                SubmitResultMsg {
                    success: true,
                    error: None,
                    entry_id: Some(ack.id),
                    rank: ack.rank,
                }
            },
            Err(e) => SubmitResultMsg {
                success: false,
                error: Some(e.tag().to_string()),
                entry_id: None,
                rank: None,
            },
        };
        self.send(&ServerMessage::SubmitResult(reply)).await;
    }
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });
}

/// Token bucket over inbound frames, so a client spamming swats or misses
/// cannot flood its session actor. Frames over budget are dropped, not
/// queued.
struct RateLimiter {
    tokens: f64,
    last_refill: tokio::time::Instant,
    burst: f64,
    per_sec: f64,
}

impl RateLimiter {
    fn new(burst: f64, per_sec: f64) -> Self {
        Self {
            tokens: burst,
            last_refill: tokio::time::Instant::now(),
            burst,
            per_sec,
        }
    }

    /// Allow `ws_rate_limit_per_sec` frames per second with a one-second
    /// burst.
    fn per_second(rate: f64) -> Self {
        Self::new(rate, rate)
    }

    /// Takes a token for one frame; `false` means drop it.
    fn allow(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_sec).min(self.burst);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
