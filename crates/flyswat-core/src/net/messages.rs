use serde::{Deserialize, Serialize};

use crate::leaderboard::{EntryId, RankedEntry};
use crate::session::SessionSnapshot;
use crate::target::TargetId;

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Server
    StartSession = 0x01,
    Swat = 0x02,
    Miss = 0x03,
    Replay = 0x04,
    SubmitScore = 0x05,

    // Server -> Client
    Session = 0x10,
    SessionEnd = 0x11,
    SubmitResult = 0x12,
    Leaderboard = 0x13,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::StartSession),
            0x02 => Some(Self::Swat),
            0x03 => Some(Self::Miss),
            0x04 => Some(Self::Replay),
            0x05 => Some(Self::SubmitScore),
            0x10 => Some(Self::Session),
            0x11 => Some(Self::SessionEnd),
            0x12 => Some(Self::SubmitResult),
            0x13 => Some(Self::Leaderboard),
            _ => None,
        }
    }

    /// Whether only the server may send this message type.
    pub fn is_server_only(self) -> bool {
        (self as u8) >= 0x10
    }
}

// ============================================================================
// Client -> Server
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    StartSession(StartSessionMsg),
    Swat(SwatMsg),
    Miss(MissMsg),
    Replay(ReplayMsg),
    SubmitScore(SubmitScoreMsg),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSessionMsg {
    pub protocol_version: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwatMsg {
    pub target_id: TargetId,
}

/// A tap that hit no target, in normalized coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissMsg {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMsg {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitScoreMsg {
    pub name: String,
}

// ============================================================================
// Server -> Client
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    Session(SessionSnapshot),
    SessionEnd(SessionEndMsg),
    SubmitResult(SubmitResultMsg),
    Leaderboard(LeaderboardMsg),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEndMsg {
    pub final_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResultMsg {
    pub success: bool,
    /// Short error tag (`invalid_input`, `storage_unavailable`, `no_result`).
    pub error: Option<String>,
    pub entry_id: Option<EntryId>,
    /// 1-based rank if the entry made the board.
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardMsg {
    pub entries: Vec<RankedEntry>,
}
