use std::collections::HashMap;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::sync::mpsc;

use mathdef_core::action::ReplayDocument;
use mathdef_core::messages::{ServerMessage, encode_server_message};
use mathdef_core::player::ConnectionId;

/// Per-connection sender for outbound binary messages. Bounded so a slow
/// client backs up its own channel, not the tick loop.
pub type PlayerSender = mpsc::Sender<Bytes>;

/// Outbound delivery seam. The tick loop talks to connections only through
/// this trait, so tests can capture traffic instead of opening sockets.
pub trait Messenger {
    fn send(&mut self, connection_id: &str, message: &ServerMessage);
}

/// Storage seam for finished games: replays and account progression.
pub trait Persistence {
    /// Returns true when the replay was durably stored.
    fn save_replay(&mut self, replay: &ReplayDocument) -> bool;
    fn award_experience(&mut self, user_id: &str, amount: u64);
    fn add_game_played(&mut self, user_id: &str);
    fn add_multiplayer_win(&mut self, user_id: &str);
}

/// Production messenger: encodes each message once and hands the bytes to
/// the connection's channel. Full channels drop the message for that client
/// rather than stall everyone.
#[derive(Default)]
pub struct ChannelMessenger {
    senders: HashMap<ConnectionId, PlayerSender>,
}

impl ChannelMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection_id: ConnectionId, sender: PlayerSender) {
        self.senders.insert(connection_id, sender);
    }

    pub fn unregister(&mut self, connection_id: &str) {
        self.senders.remove(connection_id);
    }
}

impl Messenger for ChannelMessenger {
    fn send(&mut self, connection_id: &str, message: &ServerMessage) {
        let Some(sender) = self.senders.get(connection_id) else {
            return;
        };
        match encode_server_message(message) {
            Ok(data) => {
                if sender.try_send(Bytes::from(data)).is_err() {
                    tracing::warn!(connection_id, "Dropped message for slow or gone client");
                }
            },
            Err(e) => tracing::error!(connection_id, error = %e, "Failed to encode message"),
        }
    }
}

/// Replays land as JSON documents on disk; experience awards are forwarded
/// to the account service (logged until that integration lands).
pub struct FilePersistence {
    replay_dir: PathBuf,
}

impl FilePersistence {
    pub fn new(replay_dir: impl Into<PathBuf>) -> Self {
        Self {
            replay_dir: replay_dir.into(),
        }
    }
}

impl Persistence for FilePersistence {
    fn save_replay(&mut self, replay: &ReplayDocument) -> bool {
        if let Err(e) = std::fs::create_dir_all(&self.replay_dir) {
            tracing::error!(error = %e, "Failed to create replay directory");
            return false;
        }
        let name = format!(
            "{}-{}.json",
            mathdef_core::time::timestamp_ms(),
            uuid::Uuid::new_v4()
        );
        let path = self.replay_dir.join(name);
        let json = match serde_json::to_vec(replay) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize replay");
                return false;
            },
        };
        match std::fs::write(&path, json) {
            Ok(()) => {
                tracing::info!(path = %path.display(), mode = %replay.mode, "Saved replay");
                true
            },
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to write replay");
                false
            },
        }
    }

    fn award_experience(&mut self, user_id: &str, amount: u64) {
        tracing::info!(user_id, amount, "Awarding experience");
    }

    fn add_game_played(&mut self, user_id: &str) {
        tracing::info!(user_id, "Incrementing games played");
    }

    fn add_multiplayer_win(&mut self, user_id: &str) {
        tracing::info!(user_id, "Incrementing multiplayer wins");
    }
}

/// In-memory collaborators for tests: everything is captured for assertion.
#[derive(Default)]
pub struct MemoryMessenger {
    pub sent: Vec<(ConnectionId, ServerMessage)>,
}

impl Messenger for MemoryMessenger {
    fn send(&mut self, connection_id: &str, message: &ServerMessage) {
        self.sent.push((connection_id.to_string(), message.clone()));
    }
}

#[derive(Default)]
pub struct MemoryPersistence {
    pub replays: Vec<ReplayDocument>,
    pub experience: HashMap<String, u64>,
    pub games_played: HashMap<String, u64>,
    pub multiplayer_wins: HashMap<String, u64>,
}

impl Persistence for MemoryPersistence {
    fn save_replay(&mut self, replay: &ReplayDocument) -> bool {
        self.replays.push(replay.clone());
        true
    }

    fn award_experience(&mut self, user_id: &str, amount: u64) {
        *self.experience.entry(user_id.to_string()).or_default() += amount;
    }

    fn add_game_played(&mut self, user_id: &str) {
        *self.games_played.entry(user_id.to_string()).or_default() += 1;
    }

    fn add_multiplayer_win(&mut self, user_id: &str) {
        *self.multiplayer_wins.entry(user_id.to_string()).or_default() += 1;
    }
}
