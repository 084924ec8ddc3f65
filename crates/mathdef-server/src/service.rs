use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use mathdef_core::command::{ClientCommand, Screen};
use mathdef_core::id::generate_room_id;
use mathdef_core::messages::{CommandsMsg, GameOverReportMsg, RoomMessageMsg, ServerMessage};
use mathdef_core::mode::{CustomGameSettings, GameMode, GameSettings, SettingsError};
use mathdef_core::player::{ConnectionId, PlayerProfile};
use mathdef_engine::room::{Room, RoomEvent, RoomState};

use crate::collaborators::{Messenger, Persistence};
use crate::config::ServerConfig;

#[derive(Debug)]
pub enum ServiceError {
    RoomNotFound(String),
    AlreadyInRoom,
    NotInRoom,
    InvalidSettings(SettingsError),
    MissingCustomSettings,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoomNotFound(id) => write!(f, "room {id} not found"),
            Self::AlreadyInRoom => write!(f, "connection is already in a room"),
            Self::NotInRoom => write!(f, "connection is not in a room"),
            Self::InvalidSettings(e) => write!(f, "{e}"),
            Self::MissingCustomSettings => write!(f, "custom mode requires settings"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Owns every room and routes connection intent into them from the single
/// tick-loop task. Default Multiplayer shares one open room process-wide;
/// every other mode gets its own room, joined by id.
pub struct RoomService<M: Messenger, P: Persistence> {
    rooms: HashMap<String, Room>,
    /// Mode -> open shared room id. Only Default Multiplayer lives here;
    /// the entry is cleared when its room is destroyed.
    singleton_rooms: HashMap<GameMode, String>,
    connection_rooms: HashMap<ConnectionId, String>,
    config: ServerConfig,
    pub messenger: M,
    pub persistence: P,
    rng: StdRng,
}

impl<M: Messenger, P: Persistence> RoomService<M, P> {
    pub fn new(config: ServerConfig, messenger: M, persistence: P) -> Self {
        Self {
            rooms: HashMap::new(),
            singleton_rooms: HashMap::new(),
            connection_rooms: HashMap::new(),
            config,
            messenger,
            persistence,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    #[cfg(test)]
    pub(crate) fn room_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    /// Quick play. Default Multiplayer pools everyone into the one open
    /// shared room; singleplayer modes always get a private fresh room.
    /// Returns the room id.
    pub fn join_mode(&mut self, profile: PlayerProfile, mode: GameMode) -> Result<String, ServiceError> {
        if mode.is_custom() {
            return Err(ServiceError::MissingCustomSettings);
        }
        if self.connection_rooms.contains_key(&profile.connection_id) {
            return Err(ServiceError::AlreadyInRoom);
        }
        if mode == GameMode::DefaultMultiplayer
            && let Some(room_id) = self.singleton_rooms.get(&mode).cloned()
            && let Some(room) = self.rooms.get_mut(&room_id)
            && room.state != RoomState::Destroyed
        {
            let connection_id = profile.connection_id.clone();
            room.add_member(profile);
            self.connection_rooms.insert(connection_id, room_id.clone());
            return Ok(room_id);
        }
        let settings = GameSettings::load(mode);
        let room_id = self.insert_room(profile, mode, settings);
        if mode == GameMode::DefaultMultiplayer {
            self.singleton_rooms.insert(mode, room_id.clone());
        }
        Ok(room_id)
    }

    /// Create a private custom room. The provided settings are validated in
    /// full; every violation is reported at once.
    pub fn create_custom_room(
        &mut self,
        profile: PlayerProfile,
        mode: GameMode,
        custom: &CustomGameSettings,
    ) -> Result<String, ServiceError> {
        if !mode.is_custom() {
            return Err(ServiceError::MissingCustomSettings);
        }
        if self.connection_rooms.contains_key(&profile.connection_id) {
            return Err(ServiceError::AlreadyInRoom);
        }
        let settings = custom.validate(mode).map_err(ServiceError::InvalidSettings)?;
        Ok(self.insert_room(profile, mode, settings))
    }

    /// Join an existing room by id, as a player or a spectator.
    pub fn join_room(
        &mut self,
        profile: PlayerProfile,
        room_id: &str,
        as_spectator: bool,
    ) -> Result<(), ServiceError> {
        if self.connection_rooms.contains_key(&profile.connection_id) {
            return Err(ServiceError::AlreadyInRoom);
        }
        let room = self
            .rooms
            .get_mut(room_id)
            .filter(|r| r.state != RoomState::Destroyed)
            .ok_or_else(|| ServiceError::RoomNotFound(room_id.to_string()))?;
        let connection_id = profile.connection_id.clone();
        if as_spectator {
            room.add_spectator(profile);
        } else {
            room.add_member(profile);
        }
        self.connection_rooms
            .insert(connection_id, room_id.to_string());
        Ok(())
    }

    fn insert_room(&mut self, profile: PlayerProfile, mode: GameMode, settings: GameSettings) -> String {
        let mut room_id = generate_room_id(&mut self.rng);
        while self.rooms.contains_key(&room_id) {
            room_id = generate_room_id(&mut self.rng);
        }
        let mut room = Room::new(room_id.clone(), mode, settings);
        room.configure_lobby(
            self.config.rooms.intermission_secs,
            self.config.rooms.minimum_multiplayer_players,
        );
        let connection_id = profile.connection_id.clone();
        room.add_member(profile);
        self.connection_rooms
            .insert(connection_id, room_id.clone());
        tracing::info!(room = %room_id, mode = %mode, "Created room");
        self.rooms.insert(room_id.clone(), room);
        room_id
    }

    /// Remove a connection from whatever room it occupies. Safe to call for
    /// unknown connections (disconnect races).
    pub fn leave(&mut self, connection_id: &str) {
        let Some(room_id) = self.connection_rooms.remove(connection_id) else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.delete_member(connection_id);
        }
    }

    pub fn keypress(&mut self, connection_id: &str, code: &str) -> Result<(), ServiceError> {
        let room_id = self
            .connection_rooms
            .get(connection_id)
            .ok_or(ServiceError::NotInRoom)?;
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or(ServiceError::NotInRoom)?;
        room.process_keypress(connection_id, code);
        Ok(())
    }

    pub fn request_start(&mut self, connection_id: &str) -> Result<(), ServiceError> {
        let room_id = self
            .connection_rooms
            .get(connection_id)
            .ok_or(ServiceError::NotInRoom)?;
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or(ServiceError::NotInRoom)?;
        room.request_start(connection_id);
        Ok(())
    }

    /// Advance every room one tick, deliver the resulting messages, and reap
    /// rooms that destroyed themselves. A room whose update panics is
    /// destroyed and the rest of the loop carries on.
    pub fn tick(&mut self, dt: f64) {
        let mut batches = Vec::new();
        for (room_id, room) in self.rooms.iter_mut() {
            let update = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let events = room.update(dt);
                let outbound = room.outbound_messages();
                (events, outbound)
            }));
            let (events, outbound) = match update {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(room = %room_id, "Room update panicked, destroying room");
                    room.state = RoomState::Destroyed;
                    continue;
                },
            };
            if events.is_empty() && outbound.is_empty() {
                continue;
            }
            let audience: Vec<ConnectionId> = room
                .members()
                .iter()
                .chain(room.spectators().iter())
                .cloned()
                .collect();
            batches.push((events, outbound, audience));
        }

        for (events, outbound, audience) in batches {
            for event in events {
                self.handle_event(event, &audience);
            }
            for (connection_id, message) in outbound {
                self.messenger.send(&connection_id, &message);
            }
        }

        self.reap_destroyed();
    }

    fn handle_event(&mut self, event: RoomEvent, audience: &[ConnectionId]) {
        match event {
            RoomEvent::GameStarted => {},
            RoomEvent::IntermissionCountdown { seconds_remaining } => {
                let message = ServerMessage::RoomMessage(RoomMessageMsg {
                    text: format!("Game starting in {seconds_remaining} seconds"),
                });
                for connection_id in audience {
                    self.messenger.send(connection_id, &message);
                }
            },
            RoomEvent::PlayerEliminated { connection_id, .. } => {
                self.send_commands(&connection_id, vec![ClientCommand::ChangeScreen(
                    Screen::Intermission,
                )]);
            },
            RoomEvent::PlayerAborted { connection_id } => {
                self.connection_rooms.remove(&connection_id);
                self.send_commands(&connection_id, vec![ClientCommand::ChangeScreen(
                    Screen::MainMenu,
                )]);
            },
            RoomEvent::SingleplayerGameOver {
                connection_id,
                replay,
            } => {
                let authenticated = replay.owner_user_id.is_some();
                let replay_saved = authenticated && self.persistence.save_replay(&replay);
                if let Some(user_id) = &replay.owner_user_id
                    && let mathdef_core::action::GameStatistics::Singleplayer { score, .. } =
                        &replay.statistics
                {
                    let amount =
                        (*score as f64 * self.config.persistence.experience_per_score) as u64;
                    self.persistence.award_experience(user_id, amount);
                    self.persistence.add_game_played(user_id);
                }
                self.messenger.send(
                    &connection_id,
                    &ServerMessage::GameOverReport(GameOverReportMsg {
                        statistics: replay.statistics.clone(),
                        replay_saved,
                    }),
                );
                self.send_commands(&connection_id, vec![ClientCommand::ChangeScreen(
                    Screen::GameOver,
                )]);
            },
            RoomEvent::MultiplayerGameOver {
                ranking,
                replay,
                elapsed_ms,
                ..
            } => {
                let replay_saved = replay
                    .as_ref()
                    .map(|r| self.persistence.save_replay(r))
                    .unwrap_or(false);
                for record in &ranking {
                    let Some(user_id) = &record.user_id else {
                        continue;
                    };
                    // Survival time drives the award; the winner survived the
                    // whole game (elapsed_ms) and gets the bonus multiplier.
                    let survived_ms = if record.placement == 1 {
                        elapsed_ms
                    } else {
                        record.time_in_milliseconds
                    };
                    let mut amount = survived_ms as f64 / 1000.0
                        * self.config.persistence.experience_per_second;
                    if record.placement == 1 {
                        amount *= self.config.persistence.winner_experience_multiplier;
                    }
                    self.persistence.award_experience(user_id, amount as u64);
                    self.persistence.add_game_played(user_id);
                    if record.placement == 1 {
                        self.persistence.add_multiplayer_win(user_id);
                    }
                }
                let statistics = mathdef_core::action::GameStatistics::Multiplayer { ranking };
                let report = ServerMessage::GameOverReport(GameOverReportMsg {
                    statistics,
                    replay_saved,
                });
                for connection_id in audience {
                    self.messenger.send(connection_id, &report);
                    self.send_commands(connection_id, vec![ClientCommand::ChangeScreen(
                        Screen::Intermission,
                    )]);
                }
            },
        }
    }

    fn send_commands(&mut self, connection_id: &str, commands: Vec<ClientCommand>) {
        self.messenger
            .send(connection_id, &ServerMessage::Commands(CommandsMsg { commands }));
    }

    fn reap_destroyed(&mut self) {
        let dead: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, r)| r.state == RoomState::Destroyed)
            .map(|(id, _)| id.clone())
            .collect();
        for room_id in dead {
            self.rooms.remove(&room_id);
            self.singleton_rooms.retain(|_, id| *id != room_id);
            self.connection_rooms.retain(|_, id| *id != room_id);
            tracing::info!(room = %room_id, "Reaped destroyed room");
        }
    }
}
