use serde::{Deserialize, Serialize};

/// Opaque transport-level identifier for one connected client.
pub type ConnectionId = String;

/// Display metadata for a connection, provided by the connection registry.
/// The simulation never authenticates anyone; it only reads this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub connection_id: ConnectionId,
    pub display_name: String,
    /// `Some` for authenticated accounts, `None` for guests.
    pub user_id: Option<String>,
    pub rank: PlayerRank,
}

impl PlayerProfile {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Site rank shown next to a player's name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerRank {
    #[default]
    None,
    Contributor,
    Moderator,
    Administrator,
    Developer,
    GameMaster,
}

impl PlayerRank {
    /// Name color for ranked players, as a CSS hex string.
    pub fn color(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Contributor => Some("#01acff"),
            Self::Moderator => Some("#2ed573"),
            Self::Administrator => Some("#da1717"),
            Self::Developer => Some("#ff7f00"),
            Self::GameMaster => Some("#8257ff"),
        }
    }
}
