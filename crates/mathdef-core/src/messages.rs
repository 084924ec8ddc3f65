use serde::{Deserialize, Serialize};

use crate::command::ClientCommand;

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    GameSnapshot = 0x10,
    Commands = 0x11,
    RoomMessage = 0x12,
    GameOverReport = 0x13,
}

impl MessageType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x10 => Some(Self::GameSnapshot),
            0x11 => Some(Self::Commands),
            0x12 => Some(Self::RoomMessage),
            0x13 => Some(Self::GameOverReport),
            _ => None,
        }
    }
}

/// Per-tick minimized view of one player's game state. Opponents receive the
/// obfuscated form: the answer box and problem internals stay hidden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimalGameData {
    pub owner_name: String,
    pub base_health: f64,
    pub combo: i32,
    pub current_input: String,
    pub received_enemies_stock: u32,
    pub enemies: Vec<MinimalEnemy>,
    /// Enemy ids removed this tick, for client-side deletion.
    pub erased_enemy_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimalEnemy {
    pub id: String,
    pub s_position: f64,
    pub x_position: f64,
    pub displayed_text: String,
}

/// Full state synchronization for one observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshotMsg {
    pub tick: u64,
    /// The observer's own field; absent for spectators.
    pub own: Option<MinimalGameData>,
    pub opponents: Vec<MinimalGameData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandsMsg {
    pub commands: Vec<ClientCommand>,
}

/// Inline text for the room's intermission view (validation errors,
/// countdown messages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessageMsg {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOverReportMsg {
    pub statistics: crate::action::GameStatistics,
    pub replay_saved: bool,
}

/// Messages the core sends; transport delivery belongs to the messenger
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    GameSnapshot(GameSnapshotMsg),
    Commands(CommandsMsg),
    RoomMessage(RoomMessageMsg),
    GameOverReport(GameOverReportMsg),
}

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
                write!(f, "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})")
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
fn encode_message<T: Serialize>(msg_type: MessageType, payload: &T) -> Result<Vec<u8>, ProtocolError> {
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

fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    rmp_serde::from_slice(data).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ServerMessage::GameSnapshot(m) => encode_message(MessageType::GameSnapshot, m),
        ServerMessage::Commands(m) => encode_message(MessageType::Commands, m),
        ServerMessage::RoomMessage(m) => encode_message(MessageType::RoomMessage, m),
        ServerMessage::GameOverReport(m) => encode_message(MessageType::GameOverReport, m),
    }
}

/// Decode a `ServerMessage` from wire format.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let (&type_byte, payload) = data.split_first().ok_or(ProtocolError::EmptyMessage)?;
    match MessageType::from_byte(type_byte) {
        Some(MessageType::GameSnapshot) => Ok(ServerMessage::GameSnapshot(decode_payload(payload)?)),
        Some(MessageType::Commands) => Ok(ServerMessage::Commands(decode_payload(payload)?)),
        Some(MessageType::RoomMessage) => Ok(ServerMessage::RoomMessage(decode_payload(payload)?)),
        Some(MessageType::GameOverReport) => {
            Ok(ServerMessage::GameOverReport(decode_payload(payload)?))
        },
        None => Err(ProtocolError::UnknownMessageType(type_byte)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Screen;

    #[test]
    fn snapshot_roundtrip() {
        let msg = ServerMessage::GameSnapshot(GameSnapshotMsg {
            tick: 42,
            own: Some(MinimalGameData {
                owner_name: "alice".to_string(),
                base_health: 90.0,
                combo: 3,
                current_input: "12".to_string(),
                received_enemies_stock: 2,
                enemies: vec![MinimalEnemy {
                    id: "G1".to_string(),
                    s_position: 7.5,
                    x_position: 0.3,
                    displayed_text: "3×4".to_string(),
                }],
                erased_enemy_ids: vec!["G0".to_string()],
            }),
            opponents: Vec::new(),
        });

        let encoded = encode_server_message(&msg).unwrap();
        let decoded = decode_server_message(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn commands_roundtrip() {
        let msg = ServerMessage::Commands(CommandsMsg {
            commands: vec![
                ClientCommand::ClearInput,
                ClientCommand::ChangeScreen(Screen::MainMenu),
            ],
        });
        let encoded = encode_server_message(&msg).unwrap();
        assert_eq!(decode_server_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn empty_message_rejected() {
        assert!(matches!(
            decode_server_message(&[]),
            Err(ProtocolError::EmptyMessage)
        ));
    }

    #[test]
    fn unknown_type_rejected() {
        assert!(matches!(
            decode_server_message(&[0xEE, 0x00]),
            Err(ProtocolError::UnknownMessageType(0xEE))
        ));
    }
}
