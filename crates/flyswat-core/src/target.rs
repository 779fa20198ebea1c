use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier of a spawned target, unique within one session.
pub type TargetId = u64;

/// Normalized 2-D position. Both axes lie in `[0.0, 1.0]`; the display
/// layer maps them onto its own play area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }

    /// Uniformly random position inside the unit square.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            x: rng.random_range(0.0..=1.0),
            y: rng.random_range(0.0..=1.0),
        }
    }

    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// A live mosquito.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub position: Position,
    /// Session clock (ms since start) at the moment of spawning.
    pub spawned_at_ms: u64,
}

impl Target {
    /// Age of the target at session time `now_ms`.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.spawned_at_ms)
    }
}
