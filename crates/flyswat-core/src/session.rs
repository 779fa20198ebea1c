//! Single-player session engine.
//!
//! A [`Session`] is a small state machine (`Idle -> Running -> Ended -> Idle`)
//! driven entirely by its owner: a countdown `tick` once per second, a
//! `spawn` on a shorter cadence, and `swat` whenever the player hits a
//! target. The engine owns no timers and does no I/O, so every method takes
//! `&mut self` and the owner decides how calls are serialized.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::{Position, Target, TargetId};

/// Default session length in seconds.
pub const DEFAULT_DURATION_SECS: u32 = 60;
/// Default cap on simultaneously live targets.
pub const DEFAULT_SPAWN_CAP: usize = 12;
/// Largest accepted `spawn_cap`: a snapshot with this many worst-case
/// targets still encodes within `MAX_MESSAGE_SIZE`.
pub const MAX_SPAWN_CAP: usize = 100;
/// Default countdown cadence.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
/// Default spawn cadence.
pub const DEFAULT_SPAWN_INTERVAL_MS: u64 = 400;

/// Phase of a play session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Running,
    Ended,
}

/// Data-driven tuning for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Countdown start value in seconds.
    pub duration_secs: u32,
    /// Maximum number of live targets at any instant.
    pub spawn_cap: usize,
    /// Period of the countdown timer.
    pub tick_interval_ms: u64,
    /// Period of the spawn timer.
    pub spawn_interval_ms: u64,
    /// When set, targets older than this fly away without scoring.
    pub max_target_lifetime_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_DURATION_SECS,
            spawn_cap: DEFAULT_SPAWN_CAP,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            spawn_interval_ms: DEFAULT_SPAWN_INTERVAL_MS,
            max_target_lifetime_ms: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionConfigError {
    #[error("session.duration_secs must be > 0")]
    ZeroDuration,
    #[error("session.spawn_cap must be > 0")]
    ZeroSpawnCap,
    #[error("session.spawn_cap must be <= {max}, got {0}", max = MAX_SPAWN_CAP)]
    SpawnCapTooLarge(usize),
    #[error("session.{0} must be > 0")]
    ZeroInterval(&'static str),
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        if self.duration_secs == 0 {
            return Err(SessionConfigError::ZeroDuration);
        }
        if self.spawn_cap == 0 {
            return Err(SessionConfigError::ZeroSpawnCap);
        }
        if self.spawn_cap > MAX_SPAWN_CAP {
            return Err(SessionConfigError::SpawnCapTooLarge(self.spawn_cap));
        }
        if self.tick_interval_ms == 0 {
            return Err(SessionConfigError::ZeroInterval("tick_interval_ms"));
        }
        if self.spawn_interval_ms == 0 {
            return Err(SessionConfigError::ZeroInterval("spawn_interval_ms"));
        }
        if self.max_target_lifetime_ms == Some(0) {
            return Err(SessionConfigError::ZeroInterval("max_target_lifetime_ms"));
        }
        Ok(())
    }
}

/// Terminal result of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub final_score: u32,
}

/// Observable state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    Started,
    Reset,
    Countdown { remaining: u32 },
    Ended(SessionResult),
}

/// Outcome of a swat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwatOutcome {
    /// A live target was removed and the score incremented.
    Hit { target_id: TargetId, score: u32 },
    /// Running, but nothing live was hit.
    Miss,
    /// The session is not running; the swat was ignored.
    Inactive,
}

/// What the display layer renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub score: u32,
    pub countdown: u32,
    pub targets: Vec<Target>,
}

pub struct Session {
    config: SessionConfig,
    phase: SessionPhase,
    score: u32,
    countdown: u32,
    targets: BTreeMap<TargetId, Target>,
    next_target_id: TargetId,
    elapsed_ms: u64,
    ended_emitted: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let countdown = config.duration_secs;
        Self {
            config,
            phase: SessionPhase::Idle,
            score: 0,
            countdown,
            targets: BTreeMap::new(),
            next_target_id: 1,
            elapsed_ms: 0,
            ended_emitted: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn live_count(&self) -> usize {
        self.targets.len()
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn is_live(&self, target_id: TargetId) -> bool {
        self.targets.contains_key(&target_id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            score: self.score,
            countdown: self.countdown,
            targets: self.targets.values().cloned().collect(),
        }
    }

    fn reset(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.score = 0;
        self.countdown = self.config.duration_secs;
        self.targets.clear();
        self.elapsed_ms = 0;
        self.ended_emitted = false;
    }

    /// Begin a fresh run. Allowed from any phase; a run in progress is
    /// discarded without an `Ended` event.
    pub fn start(&mut self) -> Vec<SessionEvent> {
        if self.phase == SessionPhase::Running {
            tracing::debug!(score = self.score, "Restarting a running session");
        }
        self.reset(SessionPhase::Running);
        vec![SessionEvent::Started]
    }

    /// `Ended -> Idle`. No-op in any other phase.
    pub fn replay(&mut self) -> Vec<SessionEvent> {
        if self.phase != SessionPhase::Ended {
            return Vec::new();
        }
        self.reset(SessionPhase::Idle);
        vec![SessionEvent::Reset]
    }

    /// Advance the countdown by one unit.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        if self.phase != SessionPhase::Running {
            return Vec::new();
        }
        self.countdown = self.countdown.saturating_sub(1);
        let mut events = vec![SessionEvent::Countdown {
            remaining: self.countdown,
        }];
        if self.countdown == 0
            && let Some(ended) = self.finish()
        {
            events.push(ended);
        }
        events
    }

    /// Force a running session to end with its current score. Used on
    /// teardown; idempotent.
    pub fn end(&mut self) -> Vec<SessionEvent> {
        if self.phase != SessionPhase::Running {
            return Vec::new();
        }
        self.finish().into_iter().collect()
    }

    fn finish(&mut self) -> Option<SessionEvent> {
        if self.ended_emitted {
            return None;
        }
        self.phase = SessionPhase::Ended;
        self.targets.clear();
        self.ended_emitted = true;
        Some(SessionEvent::Ended(SessionResult {
            final_score: self.score,
        }))
    }

    /// Spawn one target at a random position if running and under the cap.
    pub fn spawn<R: Rng>(&mut self, rng: &mut R) -> Option<Target> {
        if self.phase != SessionPhase::Running || self.targets.len() >= self.config.spawn_cap {
            return None;
        }
        let target = Target {
            id: self.next_target_id,
            position: Position::random(rng),
            spawned_at_ms: self.elapsed_ms,
        };
        self.next_target_id += 1;
        self.targets.insert(target.id, target.clone());
        Some(target)
    }

    /// Swat a target by id. Each live id scores at most once.
    pub fn swat(&mut self, target_id: TargetId) -> SwatOutcome {
        if self.phase != SessionPhase::Running {
            return SwatOutcome::Inactive;
        }
        match self.targets.remove(&target_id) {
            Some(_) => {
                self.score += 1;
                SwatOutcome::Hit {
                    target_id,
                    score: self.score,
                }
            },
            None => SwatOutcome::Miss,
        }
    }

    /// A swat that landed on empty space. Never changes state.
    pub fn miss(&self, position: Position) -> SwatOutcome {
        if self.phase != SessionPhase::Running {
            return SwatOutcome::Inactive;
        }
        tracing::trace!(x = position.x, y = position.y, "Swat missed");
        SwatOutcome::Miss
    }

    /// Move the session clock forward to `elapsed_ms` (ms since start).
    /// The clock never runs backwards.
    pub fn sync_clock(&mut self, elapsed_ms: u64) {
        self.elapsed_ms = self.elapsed_ms.max(elapsed_ms);
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Drop targets that outlived `max_target_lifetime_ms`. Returns their ids.
    pub fn expire_targets(&mut self) -> Vec<TargetId> {
        let Some(max_age) = self.config.max_target_lifetime_ms else {
            return Vec::new();
        };
        if self.phase != SessionPhase::Running {
            return Vec::new();
        }
        let now = self.elapsed_ms;
        let expired: Vec<TargetId> = self
            .targets
            .values()
            .filter(|t| t.age_ms(now) >= max_age)
            .map(|t| t.id)
            .collect();
        for id in &expired {
            self.targets.remove(id);
        }
        expired
    }
}
