use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mode::GameMode;
use crate::time::timestamp_ms;

/// Bump when the action-record schema changes shape.
pub const RECORDING_VERSION: u32 = 1;

/// Whether an action belongs to the room as a whole or to one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionScope {
    Room,
    Player,
}

/// Every simulation mutation relevant to reconstructing a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameAction {
    GameStart,
    SetGameData,
    EnemySpawn,
    EnemyKill,
    EnemyReachedBase,
    EnemyReceived,
    StockRelease,
    Elimination,
    DeclareWinner,
    Keypress,
    GameOver,
}

/// One appended, timestamped domain action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub scope: ActionScope,
    pub action: GameAction,
    /// Wall-clock milliseconds; ordering authority is insertion order.
    pub timestamp: u64,
    /// Owner name for player-scoped actions.
    pub user: Option<String>,
    pub data: Value,
}

/// Append-only action log. Insertion order is the chronological tick order;
/// the first record of a game is always GameStart and the last GameOver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionLog {
    records: Vec<ActionRecord>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_room(&mut self, action: GameAction, data: Value) {
        self.records.push(ActionRecord {
            scope: ActionScope::Room,
            action,
            timestamp: timestamp_ms(),
            user: None,
            data,
        });
    }

    pub fn record_player(&mut self, action: GameAction, user: &str, data: Value) {
        self.records.push(ActionRecord {
            scope: ActionScope::Player,
            action,
            timestamp: timestamp_ms(),
            user: Some(user.to_string()),
            data,
        });
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One player's finish entry in a multiplayer ranking. Placement 1 is the
/// winner; the first player eliminated among N receives placement N.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishRecord {
    pub placement: u32,
    pub name: String,
    pub time_in_milliseconds: u64,
    pub enemies_sent: u32,
    pub enemies_received: u32,
    /// `Some` for authenticated accounts.
    pub user_id: Option<String>,
}

/// Final statistics persisted alongside the action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameStatistics {
    Singleplayer {
        score: u64,
        time_in_milliseconds: u64,
        enemies_killed: u32,
        enemies_spawned: u32,
        actions_performed: u32,
    },
    Multiplayer {
        ranking: Vec<FinishRecord>,
    },
}

/// The persisted replay shape handed to the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDocument {
    pub recording_version: u32,
    pub game_version: String,
    pub mode: GameMode,
    pub owner_user_id: Option<String>,
    pub actions: Vec<ActionRecord>,
    pub statistics: GameStatistics,
}
