use serde::{Deserialize, Serialize};

use super::messages::{
    ClientMessage, LeaderboardMsg, MessageType, MissMsg, ReplayMsg, ServerMessage,
    SessionEndMsg, StartSessionMsg, SubmitResultMsg, SubmitScoreMsg, SwatMsg,
};
use crate::session::SessionSnapshot;

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024; // 4 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ClientMessage::StartSession(m) => encode_message(MessageType::StartSession, m),
        ClientMessage::Swat(m) => encode_message(MessageType::Swat, m),
        ClientMessage::Miss(m) => encode_message(MessageType::Miss, m),
        ClientMessage::Replay(m) => encode_message(MessageType::Replay, m),
        ClientMessage::SubmitScore(m) => encode_message(MessageType::SubmitScore, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ServerMessage::Session(m) => encode_message(MessageType::Session, m),
        ServerMessage::SessionEnd(m) => encode_message(MessageType::SessionEnd, m),
        ServerMessage::SubmitResult(m) => encode_message(MessageType::SubmitResult, m),
        ServerMessage::Leaderboard(m) => encode_message(MessageType::Leaderboard, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    MessageType::from_byte(data[0]).ok_or(ProtocolError::UnknownMessageType(data[0]))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::StartSession => Ok(ClientMessage::StartSession(decode_payload::<
            StartSessionMsg,
        >(data)?)),
        MessageType::Swat => Ok(ClientMessage::Swat(decode_payload::<SwatMsg>(data)?)),
        MessageType::Miss => Ok(ClientMessage::Miss(decode_payload::<MissMsg>(data)?)),
        MessageType::Replay => Ok(ClientMessage::Replay(decode_payload::<ReplayMsg>(data)?)),
        MessageType::SubmitScore => Ok(ClientMessage::SubmitScore(decode_payload::<
            SubmitScoreMsg,
        >(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::Session => Ok(ServerMessage::Session(decode_payload::<SessionSnapshot>(
            data,
        )?)),
        MessageType::SessionEnd => Ok(ServerMessage::SessionEnd(decode_payload::<
            SessionEndMsg,
        >(data)?)),
        MessageType::SubmitResult => Ok(ServerMessage::SubmitResult(decode_payload::<
            SubmitResultMsg,
        >(data)?)),
        MessageType::Leaderboard => Ok(ServerMessage::Leaderboard(decode_payload::<
            LeaderboardMsg,
        >(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}
