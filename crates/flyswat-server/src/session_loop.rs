use std::time::Duration;

use bytes::Bytes;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use flyswat_core::net::messages::{ServerMessage, SessionEndMsg};
use flyswat_core::net::protocol::encode_server_message;
use flyswat_core::session::{Session, SessionConfig, SessionEvent, SessionResult, SwatOutcome};
use flyswat_core::target::{Position, TargetId};

/// Commands sent from the WebSocket handler to the session task.
#[derive(Debug)]
pub enum SessionCommand {
    Start,
    Swat { target_id: TargetId },
    Miss { x: f32, y: f32 },
    Replay,
    /// Re-broadcast the current snapshot.
    Snapshot,
    Stop,
}

/// Output of the session task.
#[derive(Debug, Clone)]
pub enum SessionBroadcast {
    /// Serialized ServerMessage bytes ready to send over WebSocket.
    EncodedMessage(Bytes),
    /// The run ended on its own timer. Sent once per run, ahead of the
    /// encoded `SessionEnd`.
    Ended(SessionResult),
    /// The task has exited.
    Closed,
}

pub struct SessionHandle {
    pub cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    pub broadcast_rx: mpsc::UnboundedReceiver<SessionBroadcast>,
    pub handle: JoinHandle<()>,
}

/// Countdown and spawn timers. Only exist while the session is running.
struct RunTimers {
    countdown: Interval,
    spawn: Interval,
    started_at: Instant,
}

impl RunTimers {
    fn new(config: &SessionConfig) -> Self {
        let now = Instant::now();
        Self {
            countdown: periodic(now, config.tick_interval_ms),
            spawn: periodic(now, config.spawn_interval_ms),
            started_at: now,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Interval whose first tick is one full period after `start`.
fn periodic(start: Instant, period_ms: u64) -> Interval {
    let period = Duration::from_millis(period_ms.max(1));
    let mut interval = tokio::time::interval_at(start + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        },
        None => std::future::pending::<()>().await,
    }
}

/// Spawn a session actor as a tokio task. `rng_seed` pins target
/// placement for tests.
pub fn spawn_session(config: SessionConfig, rng_seed: Option<u64>) -> SessionHandle {
    let rng = match rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        run_session_loop(Session::new(config), rng, cmd_rx, broadcast_tx).await;
    });

    SessionHandle {
        cmd_tx,
        broadcast_rx,
        handle,
    }
}

async fn run_session_loop(
    mut session: Session,
    mut rng: StdRng,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    broadcast_tx: mpsc::UnboundedSender<SessionBroadcast>,
) {
    let mut timers: Option<RunTimers> = None;

    // Initial idle snapshot so the client can render the PLAY state
    send_snapshot(&session, &broadcast_tx);

    loop {
        let (countdown, spawn) = match timers.as_mut() {
            Some(t) => (Some(&mut t.countdown), Some(&mut t.spawn)),
            None => (None, None),
        };

        tokio::select! {
            _ = next_tick(countdown) => {
                if let Some(t) = &timers {
                    session.sync_clock(t.elapsed_ms());
                }
                session.expire_targets();
                let events = session.tick();
                send_snapshot(&session, &broadcast_tx);

                for event in events {
                    if let SessionEvent::Ended(result) = event {
                        timers = None;
                        tracing::info!(final_score = result.final_score, "Session ended");
                        // Owner records the result before the client can see SessionEnd
                        let _ = broadcast_tx.send(SessionBroadcast::Ended(result));
                        send_message(
                            &broadcast_tx,
                            &ServerMessage::SessionEnd(SessionEndMsg {
                                final_score: result.final_score,
                            }),
                        );
                    }
                }
            }
            _ = next_tick(spawn) => {
                if let Some(t) = &timers {
                    session.sync_clock(t.elapsed_ms());
                }
                let expired = session.expire_targets();
                let spawned = session.spawn(&mut rng);
                if spawned.is_some() || !expired.is_empty() {
                    send_snapshot(&session, &broadcast_tx);
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Start) => {
                        session.start();
                        timers = Some(RunTimers::new(session.config()));
                        tracing::debug!(
                            duration_secs = session.config().duration_secs,
                            "Session started"
                        );
                        send_snapshot(&session, &broadcast_tx);
                    },
                    Some(SessionCommand::Swat { target_id }) => {
                        match session.swat(target_id) {
                            SwatOutcome::Hit { score, .. } => {
                                tracing::trace!(target_id, score, "Target swatted");
                                send_snapshot(&session, &broadcast_tx);
                            },
                            SwatOutcome::Miss | SwatOutcome::Inactive => {},
                        }
                    },
                    Some(SessionCommand::Miss { x, y }) => {
                        session.miss(Position::new(x, y));
                    },
                    Some(SessionCommand::Replay) => {
                        if !session.replay().is_empty() {
                            timers = None;
                            send_snapshot(&session, &broadcast_tx);
                        }
                    },
                    Some(SessionCommand::Snapshot) => {
                        send_snapshot(&session, &broadcast_tx);
                    },
                    Some(SessionCommand::Stop) | None => {
                        break;
                    },
                }
            }
        }
    }

    drop(timers);
    if let Some(SessionEvent::Ended(result)) = session.end().into_iter().next() {
        tracing::debug!(
            final_score = result.final_score,
            "Session stopped while running"
        );
    }
    let _ = broadcast_tx.send(SessionBroadcast::Closed);
}

fn send_snapshot(session: &Session, tx: &mpsc::UnboundedSender<SessionBroadcast>) {
    send_message(tx, &ServerMessage::Session(session.snapshot()));
}

fn send_message(tx: &mpsc::UnboundedSender<SessionBroadcast>, msg: &ServerMessage) {
    match encode_server_message(msg) {
        Ok(data) => {
            let _ = tx.send(SessionBroadcast::EncodedMessage(Bytes::from(data)));
        },
        Err(e) => tracing::error!(error = %e, "Failed to encode session message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flyswat_core::net::protocol::decode_server_message;
    use flyswat_core::session::{SessionPhase, SessionSnapshot};
    use flyswat_core::test_helpers::short_session_config;

    fn decode(msg: SessionBroadcast) -> Option<ServerMessage> {
        match msg {
            SessionBroadcast::EncodedMessage(data) => {
                Some(decode_server_message(&data).expect("should decode"))
            },
            _ => None,
        }
    }

    async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<SessionBroadcast>) -> SessionSnapshot {
        loop {
            let msg = rx.recv().await.expect("channel open");
            if let Some(ServerMessage::Session(snapshot)) = decode(msg) {
                return snapshot;
            }
        }
    }

    /// Drain until the encoded `SessionEnd`, returning its score and the
    /// `Ended` result that must precede it.
    async fn run_to_end(rx: &mut mpsc::UnboundedReceiver<SessionBroadcast>) -> (u32, SessionResult) {
        let mut ended = None;
        loop {
            match rx.recv().await.expect("channel open") {
                SessionBroadcast::Ended(result) => ended = Some(result),
                SessionBroadcast::Closed => panic!("closed before end"),
                msg => {
                    if let Some(ServerMessage::SessionEnd(m)) = decode(msg) {
                        return (m.final_score, ended.expect("Ended before SessionEnd"));
                    }
                },
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn initial_snapshot_is_idle() {
        let SessionHandle {
            cmd_tx,
            mut broadcast_rx,
            handle,
        } = spawn_session(short_session_config(3), Some(1));

        let snapshot = next_snapshot(&mut broadcast_rx).await;
        assert_eq!(snapshot.phase, SessionPhase::Idle);
        assert_eq!(snapshot.countdown, 3);
        assert!(snapshot.targets.is_empty());

        let _ = cmd_tx.send(SessionCommand::Stop);
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_never_spawns() {
        let SessionHandle {
            cmd_tx,
            mut broadcast_rx,
            handle,
        } = spawn_session(short_session_config(3), Some(1));
        let _ = next_snapshot(&mut broadcast_rx).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(broadcast_rx.try_recv().is_err());

        let _ = cmd_tx.send(SessionCommand::Stop);
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn run_ends_after_duration_with_empty_field() {
        let SessionHandle {
            cmd_tx,
            mut broadcast_rx,
            handle,
        } = spawn_session(short_session_config(3), Some(7));
        let _ = next_snapshot(&mut broadcast_rx).await;

        let started = Instant::now();
        cmd_tx.send(SessionCommand::Start).unwrap();
        let (end_score, result) = run_to_end(&mut broadcast_rx).await;
        assert_eq!(end_score, 0);
        assert_eq!(result.final_score, 0);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));

        cmd_tx.send(SessionCommand::Snapshot).unwrap();
        let snapshot = next_snapshot(&mut broadcast_rx).await;
        assert_eq!(snapshot.phase, SessionPhase::Ended);
        assert_eq!(snapshot.countdown, 0);
        assert!(snapshot.targets.is_empty());

        // Timers are gone: nothing further arrives
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(broadcast_rx.try_recv().is_err());

        let _ = cmd_tx.send(SessionCommand::Stop);
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn swats_count_toward_final_score() {
        let SessionHandle {
            cmd_tx,
            mut broadcast_rx,
            handle,
        } = spawn_session(short_session_config(5), Some(42));
        let _ = next_snapshot(&mut broadcast_rx).await;
        cmd_tx.send(SessionCommand::Start).unwrap();

        let mut swatted = std::collections::HashSet::new();
        let (end_score, result) = loop {
            match broadcast_rx.recv().await.expect("channel open") {
                SessionBroadcast::Ended(result) => break (swatted.len(), result),
                msg => {
                    if let Some(ServerMessage::Session(snapshot)) = decode(msg)
                        && snapshot.phase == SessionPhase::Running
                        && swatted.len() < 3
                        && let Some(target) =
                            snapshot.targets.iter().find(|t| !swatted.contains(&t.id))
                    {
                        cmd_tx
                            .send(SessionCommand::Swat {
                                target_id: target.id,
                            })
                            .unwrap();
                        // Same id twice must only count once
                        cmd_tx
                            .send(SessionCommand::Swat {
                                target_id: target.id,
                            })
                            .unwrap();
                        swatted.insert(target.id);
                    }
                },
            }
        };
        assert_eq!(end_score, 3);
        assert_eq!(result.final_score, 3);

        let _ = cmd_tx.send(SessionCommand::Stop);
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn live_targets_never_exceed_cap() {
        let config = SessionConfig {
            duration_secs: 10,
            spawn_cap: 4,
            ..SessionConfig::default()
        };
        let SessionHandle {
            cmd_tx,
            mut broadcast_rx,
            handle,
        } = spawn_session(config, Some(3));
        let _ = next_snapshot(&mut broadcast_rx).await;
        cmd_tx.send(SessionCommand::Start).unwrap();

        let mut max_live = 0;
        loop {
            match broadcast_rx.recv().await.expect("channel open") {
                SessionBroadcast::Ended(_) => break,
                msg => {
                    if let Some(ServerMessage::Session(snapshot)) = decode(msg) {
                        max_live = max_live.max(snapshot.targets.len());
                    }
                },
            }
        }
        assert_eq!(max_live, 4);

        let _ = cmd_tx.send(SessionCommand::Stop);
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn replay_returns_to_idle() {
        let SessionHandle {
            cmd_tx,
            mut broadcast_rx,
            handle,
        } = spawn_session(short_session_config(1), Some(9));
        let _ = next_snapshot(&mut broadcast_rx).await;
        cmd_tx.send(SessionCommand::Start).unwrap();
        let _ = run_to_end(&mut broadcast_rx).await;

        cmd_tx.send(SessionCommand::Replay).unwrap();
        let snapshot = next_snapshot(&mut broadcast_rx).await;
        assert_eq!(snapshot.phase, SessionPhase::Idle);
        assert_eq!(snapshot.score, 0);
        assert_eq!(snapshot.countdown, 1);

        let _ = cmd_tx.send(SessionCommand::Stop);
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_mid_run_closes_without_end() {
        let SessionHandle {
            cmd_tx,
            mut broadcast_rx,
            handle,
        } = spawn_session(short_session_config(30), Some(5));
        let _ = next_snapshot(&mut broadcast_rx).await;
        cmd_tx.send(SessionCommand::Start).unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        cmd_tx.send(SessionCommand::Stop).unwrap();

        let mut saw_ended = false;
        loop {
            match broadcast_rx.recv().await {
                Some(SessionBroadcast::Closed) | None => break,
                Some(SessionBroadcast::Ended(_)) => saw_ended = true,
                Some(_) => {},
            }
        }
        assert!(!saw_ended);
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_stops_task() {
        let SessionHandle {
            cmd_tx,
            mut broadcast_rx,
            handle,
        } = spawn_session(short_session_config(30), None);
        cmd_tx.send(SessionCommand::Start).unwrap();
        drop(cmd_tx);
        handle.await.unwrap();

        let mut last = None;
        while let Some(msg) = broadcast_rx.recv().await {
            last = Some(msg);
        }
        assert!(matches!(last, Some(SessionBroadcast::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_while_running_resets_countdown() {
        let SessionHandle {
            cmd_tx,
            mut broadcast_rx,
            handle,
        } = spawn_session(short_session_config(5), Some(2));
        let _ = next_snapshot(&mut broadcast_rx).await;
        cmd_tx.send(SessionCommand::Start).unwrap();
        // Wait until the first run has ticked at least once
        while next_snapshot(&mut broadcast_rx).await.countdown == 5 {}

        cmd_tx.send(SessionCommand::Start).unwrap();
        let snapshot = loop {
            let snapshot = next_snapshot(&mut broadcast_rx).await;
            if snapshot.countdown == 5 {
                break snapshot;
            }
        };
        assert_eq!(snapshot.phase, SessionPhase::Running);
        assert_eq!(snapshot.countdown, 5);
        assert_eq!(snapshot.score, 0);

        let _ = cmd_tx.send(SessionCommand::Stop);
        let _ = handle.await;
    }
}
