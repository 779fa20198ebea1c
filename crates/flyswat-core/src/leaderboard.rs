//! Leaderboard entry types and the ranking rules shared by every store.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store-assigned identity of an entry. Monotonically increasing, so it is
/// also the final tie-break between equal scores submitted in the same
/// millisecond.
pub type EntryId = u64;

/// Longest accepted display name, in characters.
pub const MAX_NAME_CHARS: usize = 15;

/// Number of entries the leaderboard keeps.
pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
/// Largest board that still fits one `Leaderboard` frame with every name at
/// `MAX_NAME_CHARS` four-byte characters.
pub const MAX_LEADERBOARD_SIZE: usize = 50;

/// A stored leaderboard row. Never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: EntryId,
    pub name: String,
    pub score: u32,
    pub created_at_ms: u64,
}

/// A validated submission waiting for the store to assign an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub name: String,
    pub score: u32,
    pub created_at_ms: u64,
}

impl NewEntry {
    pub fn into_entry(self, id: EntryId) -> LeaderboardEntry {
        LeaderboardEntry {
            id,
            name: self.name,
            score: self.score,
            created_at_ms: self.created_at_ms,
        }
    }
}

/// Public row shape returned by leaderboard queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub id: EntryId,
    pub name: String,
    pub score: u32,
}

impl From<&LeaderboardEntry> for RankedEntry {
    fn from(e: &LeaderboardEntry) -> Self {
        Self {
            id: e.id,
            name: e.name.clone(),
            score: e.score,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name is empty")]
    EmptyName,
    #[error("name exceeds {} characters", MAX_NAME_CHARS)]
    NameTooLong,
    #[error("name contains control characters")]
    NameControlChars,
    #[error("score is not an integer")]
    ScoreNotNumeric,
    #[error("score is negative")]
    NegativeScore,
    #[error("score is out of range")]
    ScoreOutOfRange,
}

/// Total ranking order: score descending, then earlier submission first,
/// then lower id first.
pub fn rank_cmp(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.score
        .cmp(&a.score)
        .then(a.created_at_ms.cmp(&b.created_at_ms))
        .then(a.id.cmp(&b.id))
}

/// Sort entries into ranking order in place.
pub fn sort_ranked(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(rank_cmp);
}

/// Ids of the top `n` entries under [`rank_cmp`].
pub fn top_n_ids<'a, I>(entries: I, n: usize) -> HashSet<EntryId>
where
    I: IntoIterator<Item = &'a LeaderboardEntry>,
{
    let mut refs: Vec<&LeaderboardEntry> = entries.into_iter().collect();
    refs.sort_by(|a, b| rank_cmp(a, b));
    refs.into_iter().take(n).map(|e| e.id).collect()
}

/// Trim and check a display name.
pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::NameTooLong);
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::NameControlChars);
    }
    Ok(name.to_string())
}

/// Parse a submitted score. Accepts a JSON integer or a string holding a
/// base-10 integer, as sent by a plain HTML form.
pub fn parse_score(value: &serde_json::Value) -> Result<u32, ValidationError> {
    let n: i64 = match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else if n.as_u64().is_some() {
                return Err(ValidationError::ScoreOutOfRange);
            } else {
                return Err(ValidationError::ScoreNotNumeric);
            }
        },
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::ScoreNotNumeric)?,
        _ => return Err(ValidationError::ScoreNotNumeric),
    };
    if n < 0 {
        return Err(ValidationError::NegativeScore);
    }
    u32::try_from(n).map_err(|_| ValidationError::ScoreOutOfRange)
}
