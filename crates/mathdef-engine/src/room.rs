use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;

use mathdef_core::action::{
    ActionLog, FinishRecord, GameAction, GameStatistics, RECORDING_VERSION, ReplayDocument,
};
use mathdef_core::clock::Clock;
use mathdef_core::command::{ClientCommand, Screen};
use mathdef_core::messages::{CommandsMsg, GameSnapshotMsg, MinimalGameData, ServerMessage};
use mathdef_core::mode::{GameMode, GameSettings};
use mathdef_core::player::{ConnectionId, PlayerProfile};

use crate::enemy::{Enemy, EnemyOrigin};
use crate::game_data::{FORCE_ELIMINATED_HEALTH, GameData};
use crate::input::{InputAction, process_action};

/// Seconds of intermission before a Default Multiplayer game starts.
pub const DEFAULT_INTERMISSION_SECS: f64 = 30.0;

/// Members required before the Default Multiplayer countdown runs.
pub const DEFAULT_MINIMUM_PLAYERS: usize = 2;

/// Lifecycle state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    /// Lobby or intermission.
    NotPlaying,
    Playing,
    Destroyed,
}

/// Events surfaced from a room update for the service layer to act on
/// (persistence, experience awards, screen changes).
#[derive(Debug, Clone)]
pub enum RoomEvent {
    GameStarted,
    IntermissionCountdown {
        seconds_remaining: u32,
    },
    PlayerEliminated {
        connection_id: ConnectionId,
        placement: u32,
    },
    PlayerAborted {
        connection_id: ConnectionId,
    },
    SingleplayerGameOver {
        connection_id: ConnectionId,
        replay: ReplayDocument,
    },
    MultiplayerGameOver {
        winner: Option<ConnectionId>,
        ranking: Vec<FinishRecord>,
        /// `Some` iff at least one participant was authenticated.
        replay: Option<ReplayDocument>,
        elapsed_ms: u64,
    },
}

/// A session container coordinating players through the game lifecycle.
/// Exclusively owned by the tick loop; connection handlers only enqueue
/// intent.
pub struct Room {
    pub id: String,
    pub mode: GameMode,
    pub state: RoomState,
    pub settings: GameSettings,

    members: Vec<ConnectionId>,
    spectators: Vec<ConnectionId>,
    profiles: HashMap<ConnectionId, PlayerProfile>,
    /// Custom Multiplayer start authority.
    pub host: Option<ConnectionId>,
    start_requested: bool,

    pub game_data: Vec<GameData>,
    pub ranking: Vec<FinishRecord>,
    pub log: ActionLog,
    connection_ids_this_round: Vec<ConnectionId>,

    elapsed_ms: f64,
    tick: u64,
    intermission_remaining: f64,
    pub intermission_seconds: f64,
    pub minimum_players: usize,
    /// Room-scoped multiplayer clock; each fire clones one enemy template
    /// into every living player's field.
    global_spawn: Clock,
    rng: StdRng,
}

impl Room {
    pub fn new(id: String, mode: GameMode, settings: GameSettings) -> Self {
        Self::with_rng(id, mode, settings, StdRng::from_os_rng())
    }

    /// Deterministic construction for tests and replay verification.
    pub fn with_rng(id: String, mode: GameMode, settings: GameSettings, rng: StdRng) -> Self {
        let global_spawn = Clock::new(settings.forced_spawn_time);
        Self {
            id,
            mode,
            state: RoomState::NotPlaying,
            settings,
            members: Vec::new(),
            spectators: Vec::new(),
            profiles: HashMap::new(),
            host: None,
            start_requested: false,
            game_data: Vec::new(),
            ranking: Vec::new(),
            log: ActionLog::new(),
            connection_ids_this_round: Vec::new(),
            elapsed_ms: 0.0,
            tick: 0,
            intermission_remaining: DEFAULT_INTERMISSION_SECS,
            intermission_seconds: DEFAULT_INTERMISSION_SECS,
            minimum_players: DEFAULT_MINIMUM_PLAYERS,
            global_spawn,
            rng,
        }
    }

    /// Apply server-level lobby settings. Called once, right after creation.
    pub fn configure_lobby(&mut self, intermission_seconds: f64, minimum_players: usize) {
        self.intermission_seconds = intermission_seconds;
        self.intermission_remaining = intermission_seconds;
        self.minimum_players = minimum_players;
    }

    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    pub fn spectators(&self) -> &[ConnectionId] {
        &self.spectators
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms.round() as u64
    }

    pub fn has_connection(&self, connection_id: &str) -> bool {
        self.members.iter().any(|c| c == connection_id)
            || self.spectators.iter().any(|c| c == connection_id)
    }

    /// Add a member. No-op if already present; a spectator joining as a
    /// member switches sets (the two are always disjoint).
    pub fn add_member(&mut self, profile: PlayerProfile) -> bool {
        if self.state == RoomState::Destroyed {
            return false;
        }
        if self.members.contains(&profile.connection_id) {
            return false;
        }
        self.spectators.retain(|c| *c != profile.connection_id);
        if self.host.is_none() {
            self.host = Some(profile.connection_id.clone());
        }
        self.members.push(profile.connection_id.clone());
        self.profiles.insert(profile.connection_id.clone(), profile);
        true
    }

    pub fn add_spectator(&mut self, profile: PlayerProfile) -> bool {
        if self.state == RoomState::Destroyed
            || self.spectators.contains(&profile.connection_id)
            || self.members.contains(&profile.connection_id)
        {
            return false;
        }
        self.spectators.push(profile.connection_id.clone());
        self.profiles.insert(profile.connection_id.clone(), profile);
        true
    }

    /// Remove a connection from the room. Idempotent: a second call with the
    /// same id changes nothing. A mid-game member removal is treated as an
    /// abort on the next tick. When the last connection leaves, the room is
    /// destroyed.
    pub fn delete_member(&mut self, connection_id: &str) -> bool {
        let before = self.members.len() + self.spectators.len();
        self.members.retain(|c| c != connection_id);
        self.spectators.retain(|c| c != connection_id);
        if before == self.members.len() + self.spectators.len() {
            return false;
        }
        self.profiles.remove(connection_id);
        if self.host.as_deref() == Some(connection_id) {
            self.host = self.members.first().cloned();
        }
        if self.state == RoomState::Playing
            && let Some(gd) = self
                .game_data
                .iter_mut()
                .find(|g| g.owner_connection_id == connection_id)
        {
            gd.aborted = true;
            gd.base_health = FORCE_ELIMINATED_HEALTH;
        }
        if self.members.is_empty() && self.spectators.is_empty() {
            self.state = RoomState::Destroyed;
        }
        true
    }

    /// Request the next game: host-only in Custom Multiplayer, the seated
    /// player's retry in singleplayer. Picked up on the next lobby tick.
    pub fn request_start(&mut self, connection_id: &str) -> bool {
        let allowed = match self.mode {
            GameMode::CustomMultiplayer => self.host.as_deref() == Some(connection_id),
            GameMode::DefaultMultiplayer => false,
            _ => self.members.iter().any(|c| c == connection_id),
        };
        if allowed {
            self.start_requested = true;
        }
        allowed
    }

    /// Apply a queued keypress from a connection. Malformed codes and
    /// missing game states are skipped, never raised into the tick loop.
    pub fn process_keypress(&mut self, connection_id: &str, code: &str) {
        if self.state != RoomState::Playing {
            return;
        }
        let Some(pos) = self
            .game_data
            .iter()
            .position(|g| g.owner_connection_id == connection_id)
        else {
            tracing::warn!(room = %self.id, connection_id, "Keypress for missing game state");
            return;
        };
        let Some(action) = InputAction::from_code(code) else {
            tracing::warn!(room = %self.id, code, "Dropped malformed input code");
            return;
        };
        let owner = self.game_data[pos].owner_name.clone();
        self.log
            .record_player(GameAction::Keypress, &owner, json!({ "code": code }));
        process_action(
            &mut self.game_data[pos],
            action,
            &self.settings,
            &mut self.log,
        );
    }

    /// Advance the room by one tick. Never panics out to the driver: bad
    /// deltas are logged and the tick skipped.
    pub fn update(&mut self, dt: f64) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        if !(dt >= 0.0) {
            tracing::warn!(room = %self.id, dt, "Skipping update with invalid deltaTime");
            return events;
        }
        match self.state {
            RoomState::Destroyed => {},
            RoomState::NotPlaying => self.update_lobby(dt, &mut events),
            RoomState::Playing => {
                self.elapsed_ms += dt * 1000.0;
                self.tick += 1;
                for gd in &mut self.game_data {
                    gd.clocks.advance(dt);
                }
                if self.mode.is_singleplayer() {
                    self.update_singleplayer(dt, &mut events);
                } else {
                    self.global_spawn.advance(dt);
                    self.update_multiplayer(dt, &mut events);
                }
            },
        }
        events
    }

    fn update_lobby(&mut self, dt: f64, events: &mut Vec<RoomEvent>) {
        match self.mode {
            GameMode::EasySingleplayer
            | GameMode::StandardSingleplayer
            | GameMode::CustomSingleplayer => {
                // First game begins as soon as the creator is seated; retries
                // wait for an explicit start request.
                let first_round = self.connection_ids_this_round.is_empty();
                if !self.members.is_empty() && (first_round || self.start_requested) {
                    self.start_game(events);
                }
            },
            GameMode::DefaultMultiplayer => {
                if self.members.len() >= self.minimum_players {
                    let before = self.intermission_remaining.ceil() as u32;
                    self.intermission_remaining -= dt;
                    let after = self.intermission_remaining.ceil().max(0.0) as u32;
                    if after != before {
                        events.push(RoomEvent::IntermissionCountdown {
                            seconds_remaining: after,
                        });
                    }
                    if self.intermission_remaining <= 0.0 {
                        self.start_game(events);
                    }
                } else {
                    // Membership dropped below threshold: the countdown
                    // restarts from the top.
                    self.intermission_remaining = self.intermission_seconds;
                }
            },
            GameMode::CustomMultiplayer => {
                if self.start_requested && self.members.len() >= 2 {
                    self.start_game(events);
                }
            },
        }
    }

    /// NotPlaying -> Playing. One GameData per member, fresh log seeded with
    /// GameStart plus one SetGameData record per initial setting, so the log
    /// alone reproduces starting conditions.
    fn start_game(&mut self, events: &mut Vec<RoomEvent>) {
        if self.state == RoomState::Playing || self.members.is_empty() {
            return;
        }
        self.game_data = self
            .members
            .iter()
            .filter_map(|c| self.profiles.get(c))
            .map(|p| GameData::new(p, self.mode, &self.settings))
            .collect();
        self.ranking.clear();
        self.connection_ids_this_round = self.members.clone();
        self.elapsed_ms = 0.0;
        self.tick = 0;
        self.global_spawn = Clock::new(self.settings.forced_spawn_time);
        self.start_requested = false;

        self.log = ActionLog::new();
        let names: Vec<&str> = self
            .game_data
            .iter()
            .map(|g| g.owner_name.as_str())
            .collect();
        self.log.record_room(
            GameAction::GameStart,
            json!({ "mode": self.mode.as_str(), "players": names }),
        );
        if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(&self.settings) {
            for (key, value) in map {
                self.log
                    .record_room(GameAction::SetGameData, json!({ "key": key, "value": value }));
            }
        }

        for gd in &mut self.game_data {
            gd.push_command(ClientCommand::ChangeScreen(Screen::Game));
        }
        self.state = RoomState::Playing;
        events.push(RoomEvent::GameStarted);
        tracing::debug!(room = %self.id, mode = %self.mode, players = self.game_data.len(), "Game started");
    }

    /// Playing -> NotPlaying. GameData cleared, countdown re-armed.
    fn stop_game(&mut self) {
        self.state = RoomState::NotPlaying;
        self.game_data.clear();
        self.intermission_remaining = self.intermission_seconds;
        self.start_requested = false;
    }

    /// Tear down explicitly-quit players: sentinel health, no ranking entry,
    /// membership removed. Distinct from elimination.
    fn handle_aborts(&mut self, events: &mut Vec<RoomEvent>) {
        while let Some(pos) = self.game_data.iter().position(|g| g.aborted) {
            let gd = self.game_data.remove(pos);
            let connection_id = gd.owner_connection_id.clone();
            events.push(RoomEvent::PlayerAborted {
                connection_id: connection_id.clone(),
            });
            self.delete_member(&connection_id);
        }
    }

    fn update_singleplayer(&mut self, dt: f64, events: &mut Vec<RoomEvent>) {
        self.handle_aborts(events);
        if self.game_data.is_empty() {
            if self.state == RoomState::Playing {
                self.stop_game();
            }
            return;
        }

        let settings = self.settings.clone();
        let is_custom = self.mode.is_custom();
        {
            let log = &mut self.log;
            let rng = &mut self.rng;
            for gd in &mut self.game_data {
                move_and_breach(gd, dt, &settings, log);
                fire_player_clocks(gd, &settings, rng, log, is_custom);
            }
        }

        if let Some(gd) = self.game_data.first()
            && !gd.is_alive()
        {
            let connection_id = gd.owner_connection_id.clone();
            let statistics = GameStatistics::Singleplayer {
                score: gd.score,
                time_in_milliseconds: self.elapsed_ms(),
                enemies_killed: gd.enemies_killed,
                enemies_spawned: gd.enemies_spawned,
                actions_performed: gd.actions_performed,
            };
            let owner_user_id = gd.owner_user_id.clone();
            self.log.record_room(
                GameAction::GameOver,
                json!({ "score": gd.score, "timeInMilliseconds": self.elapsed_ms() }),
            );
            let replay = self.build_replay(statistics, owner_user_id);
            events.push(RoomEvent::SingleplayerGameOver {
                connection_id,
                replay,
            });
            self.stop_game();
        }
    }

    fn update_multiplayer(&mut self, dt: f64, events: &mut Vec<RoomEvent>) {
        self.handle_aborts(events);
        // Aborts can empty the room entirely, destroying it mid-tick.
        if self.state != RoomState::Playing {
            return;
        }

        // Room-scoped spawn: one template, cloned to every living field, so
        // all players face comparable pressure.
        if self.global_spawn.ready() {
            self.global_spawn.drain();
            let template =
                Enemy::generate(&mut self.rng, &self.settings, EnemyOrigin::Generated, 0);
            self.log.record_room(
                GameAction::EnemySpawn,
                json!({
                    "global": true,
                    "value": template.requested_value,
                    "text": template.displayed_text,
                }),
            );
            for gd in &mut self.game_data {
                if gd.is_alive() {
                    gd.spawn_from_template(&template);
                }
            }
        }

        let settings = self.settings.clone();
        let is_custom = self.mode.is_custom();
        {
            let log = &mut self.log;
            let rng = &mut self.rng;
            for gd in &mut self.game_data {
                move_and_breach(gd, dt, &settings, log);
                fire_player_clocks(gd, &settings, rng, log, is_custom);
            }
        }

        // Eliminations. Placement is the collection length before removal:
        // first out of N gets N, the next N-1, the winner 1.
        let mut i = 0;
        while i < self.game_data.len() {
            if self.game_data[i].is_alive() {
                i += 1;
                continue;
            }
            let placement = self.game_data.len() as u32;
            let gd = self.game_data.remove(i);
            let record = FinishRecord {
                placement,
                name: gd.owner_name.clone(),
                time_in_milliseconds: self.elapsed_ms(),
                enemies_sent: gd.total_enemies_sent,
                enemies_received: gd.total_enemies_received,
                user_id: gd.owner_user_id.clone(),
            };
            self.log.record_player(
                GameAction::Elimination,
                &gd.owner_name,
                serde_json::to_value(&record).unwrap_or_default(),
            );
            self.ranking.push(record);
            events.push(RoomEvent::PlayerEliminated {
                connection_id: gd.owner_connection_id.clone(),
                placement,
            });
        }

        // Game over: fewer than 2 players remain.
        if self.game_data.len() < 2 {
            let winner = self.game_data.pop();
            let winner_connection = winner.as_ref().map(|g| g.owner_connection_id.clone());
            if let Some(gd) = winner {
                let record = FinishRecord {
                    placement: 1,
                    name: gd.owner_name.clone(),
                    time_in_milliseconds: self.elapsed_ms(),
                    enemies_sent: gd.total_enemies_sent,
                    enemies_received: gd.total_enemies_received,
                    user_id: gd.owner_user_id.clone(),
                };
                self.log.record_player(
                    GameAction::DeclareWinner,
                    &gd.owner_name,
                    serde_json::to_value(&record).unwrap_or_default(),
                );
                self.ranking.push(record);
            }
            self.log.record_room(
                GameAction::GameOver,
                json!({ "timeInMilliseconds": self.elapsed_ms() }),
            );
            let any_authenticated = self.ranking.iter().any(|r| r.user_id.is_some());
            let statistics = GameStatistics::Multiplayer {
                ranking: self.ranking.clone(),
            };
            let replay = any_authenticated.then(|| self.build_replay(statistics, None));
            events.push(RoomEvent::MultiplayerGameOver {
                winner: winner_connection,
                ranking: self.ranking.clone(),
                replay,
                elapsed_ms: self.elapsed_ms(),
            });
            self.stop_game();
            return;
        }

        // Attack delivery: one stocked enemy per player per tick moves to a
        // uniformly random other living player.
        let n = self.game_data.len();
        for i in 0..n {
            if self.game_data[i].enemies_sent_stock == 0 {
                continue;
            }
            self.game_data[i].enemies_sent_stock -= 1;
            let mut target = self.rng.random_range(0..n - 1);
            if target >= i {
                target += 1;
            }
            let target_gd = &mut self.game_data[target];
            target_gd.received_enemies_stock += 1;
            target_gd.total_enemies_received += 1;
        }

        // Released stock materializes one enemy per tick.
        {
            let log = &mut self.log;
            let rng = &mut self.rng;
            for gd in &mut self.game_data {
                if gd.received_enemies_to_spawn == 0 {
                    continue;
                }
                gd.received_enemies_to_spawn -= 1;
                let enemy = gd.spawn_enemy(rng, &settings, EnemyOrigin::Received);
                log.record_player(
                    GameAction::EnemyReceived,
                    &gd.owner_name.clone(),
                    json!({ "enemyId": enemy.id, "value": enemy.requested_value }),
                );
            }
        }
    }

    fn build_replay(
        &self,
        statistics: GameStatistics,
        owner_user_id: Option<String>,
    ) -> ReplayDocument {
        ReplayDocument {
            recording_version: RECORDING_VERSION,
            game_version: env!("CARGO_PKG_VERSION").to_string(),
            mode: self.mode,
            owner_user_id,
            actions: self.log.records().to_vec(),
            statistics,
        }
    }

    /// Per-tick outbound traffic: flushed one-shot commands plus the
    /// minimized, opponent-obfuscated state synchronization for every
    /// observer.
    pub fn outbound_messages(&mut self) -> Vec<(ConnectionId, ServerMessage)> {
        let mut out = Vec::new();
        for gd in &mut self.game_data {
            let commands = gd.take_commands();
            if !commands.is_empty() {
                out.push((
                    gd.owner_connection_id.clone(),
                    ServerMessage::Commands(CommandsMsg { commands }),
                ));
            }
        }
        if self.state != RoomState::Playing {
            return out;
        }

        let tick = self.tick;
        let mut own_views: Vec<(ConnectionId, MinimalGameData)> = Vec::new();
        for gd in &mut self.game_data {
            own_views.push((gd.owner_connection_id.clone(), gd.to_minimal(false)));
        }
        let obfuscated: Vec<MinimalGameData> = own_views
            .iter()
            .map(|(_, view)| {
                let mut v = view.clone();
                v.current_input.clear();
                v
            })
            .collect();

        for (i, (connection_id, view)) in own_views.iter().enumerate() {
            let opponents = obfuscated
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, v)| v.clone())
                .collect();
            out.push((
                connection_id.clone(),
                ServerMessage::GameSnapshot(GameSnapshotMsg {
                    tick,
                    own: Some(view.clone()),
                    opponents,
                }),
            ));
        }
        let playing: Vec<&ConnectionId> = own_views.iter().map(|(c, _)| c).collect();
        for connection_id in self.spectators.iter().chain(
            self.members
                .iter()
                .filter(|c| !playing.iter().any(|p| p == c)),
        ) {
            out.push((
                connection_id.clone(),
                ServerMessage::GameSnapshot(GameSnapshotMsg {
                    tick,
                    own: None,
                    opponents: obfuscated.clone(),
                }),
            ));
        }
        out
    }
}

/// Move every enemy by `speed * dt`; any enemy reaching the base damages it
/// and is removed.
fn move_and_breach(gd: &mut GameData, dt: f64, settings: &GameSettings, log: &mut ActionLog) {
    for enemy in &mut gd.enemies {
        enemy.move_by(enemy.speed * dt);
    }
    let breached: Vec<Enemy> = gd
        .enemies
        .iter()
        .filter(|e| e.has_reached_base())
        .cloned()
        .collect();
    for enemy in breached {
        gd.base_health -= settings.base_damage;
        gd.erase_enemy(&enemy.id);
        log.record_player(
            GameAction::EnemyReachedBase,
            &gd.owner_name.clone(),
            json!({ "enemyId": enemy.id, "damage": settings.base_damage }),
        );
    }
}

/// Fire a player's spawn/combo/regeneration clocks for this tick.
fn fire_player_clocks(
    gd: &mut GameData,
    settings: &GameSettings,
    rng: &mut StdRng,
    log: &mut ActionLog,
    is_custom: bool,
) {
    let mut forced_this_tick = false;

    // An empty field never stalls: spawn immediately regardless of clocks.
    if gd.enemies.is_empty() {
        let enemy = gd.spawn_enemy(rng, settings, EnemyOrigin::Forced);
        record_spawn(log, gd, &enemy);
        forced_this_tick = true;
    }

    if gd.clocks.forced_enemy_spawn.ready() {
        // spawn_enemy resets the forced clock to exactly zero.
        let enemy = gd.spawn_enemy(rng, settings, EnemyOrigin::Forced);
        record_spawn(log, gd, &enemy);
        forced_this_tick = true;
    }

    if gd.clocks.enemy_spawn.ready() {
        gd.clocks.enemy_spawn.drain();
        if !forced_this_tick && rng.random::<f64>() < settings.enemy_spawn_chance {
            let enemy = gd.spawn_enemy(rng, settings, EnemyOrigin::Generated);
            record_spawn(log, gd, &enemy);
        }
    }

    if gd.clocks.combo_reset.ready() {
        gd.clocks.combo_reset.drain();
        gd.combo = -1;
    }

    if !is_custom && gd.is_alive() && gd.clocks.regenerate_base_health.ready() {
        gd.clocks.regenerate_base_health.drain();
        gd.regenerate();
    }
}

fn record_spawn(log: &mut ActionLog, gd: &GameData, enemy: &Enemy) {
    log.record_player(
        GameAction::EnemySpawn,
        &gd.owner_name,
        json!({
            "enemyId": enemy.id,
            "value": enemy.requested_value,
            "text": enemy.displayed_text,
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathdef_core::action::ActionScope;
    use mathdef_core::test_helpers::{fast_settings, make_profiles, make_registered_profiles};

    fn singleplayer_room() -> Room {
        let mut room = Room::with_rng(
            "ROOM0001".to_string(),
            GameMode::StandardSingleplayer,
            fast_settings(),
            StdRng::seed_from_u64(7),
        );
        room.add_member(make_profiles(1).remove(0));
        room
    }

    /// A started Custom Multiplayer room with `n` authenticated players.
    fn multiplayer_room(n: usize) -> Room {
        let mut room = Room::with_rng(
            "ROOM0002".to_string(),
            GameMode::CustomMultiplayer,
            fast_settings(),
            StdRng::seed_from_u64(8),
        );
        for profile in make_registered_profiles(n) {
            room.add_member(profile);
        }
        let host = room.host.clone().unwrap();
        assert!(room.request_start(&host));
        let events = room.update(0.0);
        assert!(matches!(events[0], RoomEvent::GameStarted));
        room
    }

    fn kill_player(room: &mut Room, index: usize) {
        room.game_data[index].base_health = 0.0;
    }

    #[test]
    fn singleplayer_starts_on_first_lobby_tick() {
        let mut room = singleplayer_room();
        let events = room.update(0.0);
        assert!(matches!(events.as_slice(), [RoomEvent::GameStarted]));
        assert_eq!(room.state, RoomState::Playing);
        assert_eq!(room.game_data.len(), 1);

        let records = room.log.records();
        assert!(matches!(records[0].action, GameAction::GameStart));
        assert!(records
            .iter()
            .skip(1)
            .take_while(|r| matches!(r.action, GameAction::SetGameData))
            .all(|r| r.scope == ActionScope::Room));
    }

    #[test]
    fn singleplayer_does_not_restart_without_request() {
        let mut room = singleplayer_room();
        room.update(0.0);
        kill_player(&mut room, 0);
        room.update(0.0);
        assert_eq!(room.state, RoomState::NotPlaying);

        assert!(room.update(1.0).is_empty(), "no silent restart");
        let member = room.members()[0].clone();
        assert!(room.request_start(&member));
        let events = room.update(0.0);
        assert!(matches!(events.as_slice(), [RoomEvent::GameStarted]));
    }

    #[test]
    fn singleplayer_game_over_builds_replay() {
        let mut room = singleplayer_room();
        room.update(0.0);
        room.update(0.05);
        kill_player(&mut room, 0);
        let events = room.update(0.05);

        let Some(RoomEvent::SingleplayerGameOver { replay, .. }) = events
            .iter()
            .find(|e| matches!(e, RoomEvent::SingleplayerGameOver { .. }))
        else {
            panic!("expected a game-over event, got {events:?}");
        };
        assert_eq!(replay.recording_version, RECORDING_VERSION);
        assert!(matches!(
            replay.actions.first().map(|r| &r.action),
            Some(GameAction::GameStart)
        ));
        assert!(matches!(
            replay.actions.last().map(|r| &r.action),
            Some(GameAction::GameOver)
        ));
        assert!(matches!(
            replay.statistics,
            GameStatistics::Singleplayer { .. }
        ));
        assert_eq!(room.state, RoomState::NotPlaying);
        assert!(room.game_data.is_empty());
    }

    #[test]
    fn negative_delta_skips_the_tick() {
        let mut room = singleplayer_room();
        room.update(0.0);
        let tick_before = room.tick;
        assert!(room.update(-0.5).is_empty());
        assert_eq!(room.tick, tick_before);
    }

    #[test]
    fn placements_count_down_from_field_size() {
        let mut room = multiplayer_room(4);

        kill_player(&mut room, 0);
        kill_player(&mut room, 2);
        let events = room.update(0.0);
        let placements: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                RoomEvent::PlayerEliminated { placement, .. } => Some(*placement),
                _ => None,
            })
            .collect();
        assert_eq!(placements, vec![4, 3]);

        kill_player(&mut room, 1);
        let events = room.update(0.0);
        assert!(matches!(
            events.as_slice(),
            [
                RoomEvent::PlayerEliminated { placement: 2, .. },
                RoomEvent::MultiplayerGameOver { .. }
            ]
        ));
        let placements: Vec<u32> = room.ranking.iter().map(|r| r.placement).collect();
        assert_eq!(placements, vec![4, 3, 2, 1]);
        assert_eq!(room.state, RoomState::NotPlaying);
    }

    #[test]
    fn winner_gets_replay_when_any_player_is_authenticated() {
        let mut room = multiplayer_room(2);
        kill_player(&mut room, 1);
        let events = room.update(0.0);
        let Some(RoomEvent::MultiplayerGameOver {
            winner,
            ranking,
            replay,
            ..
        }) = events
            .iter()
            .find(|e| matches!(e, RoomEvent::MultiplayerGameOver { .. }))
        else {
            panic!("expected game over, got {events:?}");
        };
        assert!(winner.is_some());
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking.last().unwrap().placement, 1);
        let replay = replay.as_ref().expect("authenticated round persists");
        assert!(matches!(
            replay.actions.last().map(|r| &r.action),
            Some(GameAction::GameOver)
        ));
        assert!(replay
            .actions
            .iter()
            .any(|r| matches!(r.action, GameAction::DeclareWinner)));
    }

    #[test]
    fn abort_removes_player_without_ranking_entry() {
        let mut room = multiplayer_room(3);
        let quitter = room.game_data[1].owner_connection_id.clone();
        let quitter_name = room.game_data[1].owner_name.clone();
        assert!(room.delete_member(&quitter));
        let events = room.update(0.0);

        assert!(events.iter().any(|e| matches!(
            e,
            RoomEvent::PlayerAborted { connection_id } if *connection_id == quitter
        )));
        assert!(room.ranking.iter().all(|r| r.name != quitter_name));
        assert_eq!(room.game_data.len(), 2);
        assert!(!room.has_connection(&quitter));
    }

    #[test]
    fn delete_member_is_idempotent_and_destroys_empty_rooms() {
        let mut room = singleplayer_room();
        let member = room.members()[0].clone();
        assert!(room.delete_member(&member));
        assert!(!room.delete_member(&member));
        assert_eq!(room.state, RoomState::Destroyed);
        assert!(!room.add_member(make_profiles(1).remove(0)));
    }

    #[test]
    fn default_multiplayer_countdown_restarts_when_membership_drops() {
        let mut room = Room::with_rng(
            "ROOM0003".to_string(),
            GameMode::DefaultMultiplayer,
            fast_settings(),
            StdRng::seed_from_u64(9),
        );
        room.intermission_seconds = 3.0;
        room.intermission_remaining = 3.0;
        let mut profiles = make_profiles(3).into_iter();
        room.add_member(profiles.next().unwrap());
        assert!(room.update(1.0).is_empty(), "alone: countdown idle");

        let second = profiles.next().unwrap();
        let second_id = second.connection_id.clone();
        room.add_member(second);
        let events = room.update(1.0);
        assert!(matches!(
            events.as_slice(),
            [RoomEvent::IntermissionCountdown {
                seconds_remaining: 2
            }]
        ));

        room.delete_member(&second_id);
        room.update(1.0);
        room.add_member(profiles.next().unwrap());
        let events = room.update(1.0);
        assert!(
            matches!(
                events.as_slice(),
                [RoomEvent::IntermissionCountdown {
                    seconds_remaining: 2
                }]
            ),
            "countdown restarted from the top"
        );

        let events = room.update(1.0);
        assert!(matches!(
            events.as_slice(),
            [RoomEvent::IntermissionCountdown {
                seconds_remaining: 1
            }]
        ));
        let events = room.update(1.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, RoomEvent::GameStarted)));
    }

    #[test]
    fn stock_exchange_delivers_to_the_other_player() {
        let mut room = multiplayer_room(2);
        room.game_data[0].enemies_sent_stock = 2;
        room.update(0.01);
        assert_eq!(room.game_data[0].enemies_sent_stock, 1);
        assert_eq!(room.game_data[1].received_enemies_stock, 1);
        assert_eq!(room.game_data[1].total_enemies_received, 1);
        room.update(0.01);
        assert_eq!(room.game_data[0].enemies_sent_stock, 0);
        assert_eq!(room.game_data[1].received_enemies_stock, 2);
    }

    #[test]
    fn released_stock_spawns_received_enemies() {
        let mut room = multiplayer_room(2);
        room.game_data[1].received_enemies_to_spawn = 2;
        let spawned_before = room.game_data[1].enemies_spawned;
        room.update(0.01);
        assert_eq!(room.game_data[1].received_enemies_to_spawn, 1);
        assert!(room.game_data[1]
            .enemies
            .iter()
            .any(|e| e.id.starts_with('R')));
        assert!(room.game_data[1].enemies_spawned > spawned_before);
        assert!(room
            .log
            .records()
            .iter()
            .any(|r| matches!(r.action, GameAction::EnemyReceived)));
    }

    #[test]
    fn snapshots_obfuscate_opponents_and_include_spectators() {
        let mut room = multiplayer_room(2);
        room.add_spectator(make_profiles(3).remove(2));
        room.game_data[0].current_input = "12".to_string();
        room.update(0.01);

        let messages = room.outbound_messages();
        let snapshots: Vec<&(ConnectionId, ServerMessage)> = messages
            .iter()
            .filter(|(_, m)| matches!(m, ServerMessage::GameSnapshot(_)))
            .collect();
        assert_eq!(snapshots.len(), 3, "two players plus one spectator");

        for (connection_id, message) in snapshots {
            let ServerMessage::GameSnapshot(snap) = message else {
                unreachable!();
            };
            if connection_id == &room.game_data[0].owner_connection_id {
                assert_eq!(snap.own.as_ref().unwrap().current_input, "12");
            } else {
                assert!(snap.own.is_none() || snap.own.as_ref().unwrap().current_input.is_empty());
                assert!(snap
                    .opponents
                    .iter()
                    .all(|o| o.current_input.is_empty()));
            }
        }
    }

    #[test]
    fn breach_damages_base_and_erases_enemy() {
        let mut room = singleplayer_room();
        room.update(0.0); // lobby tick starts the game
        room.update(0.0); // first playing tick force-spawns into the empty field
        assert!(!room.game_data[0].enemies.is_empty());
        let health_before = room.game_data[0].base_health;
        for enemy in &mut room.game_data[0].enemies {
            enemy.s_position = 0.001;
        }
        room.update(1.0);
        assert!(room.game_data.is_empty() || room.game_data[0].base_health < health_before);
        assert!(room
            .log
            .records()
            .iter()
            .any(|r| matches!(r.action, GameAction::EnemyReachedBase)));
    }

    proptest::proptest! {
        /// However eliminations fall, placements count down from the field
        /// size to 1 with no gaps or repeats.
        #[test]
        fn placements_descend_for_any_elimination_order(
            n in 2usize..6,
            seed in proptest::prelude::any::<u64>(),
        ) {
            let mut room = Room::with_rng(
                "ROOMPROP".to_string(),
                GameMode::CustomMultiplayer,
                fast_settings(),
                StdRng::seed_from_u64(seed),
            );
            for profile in make_registered_profiles(n) {
                room.add_member(profile);
            }
            let host = room.host.clone().unwrap();
            room.request_start(&host);
            room.update(0.0);

            let mut order = StdRng::seed_from_u64(seed.wrapping_add(1));
            while room.state == RoomState::Playing {
                let victim = order.random_range(0..room.game_data.len());
                room.game_data[victim].base_health = 0.0;
                room.update(0.0);
            }

            let placements: Vec<u32> = room.ranking.iter().map(|r| r.placement).collect();
            let expected: Vec<u32> = (1..=n as u32).rev().collect();
            proptest::prop_assert_eq!(placements, expected);
        }
    }

    #[test]
    fn keypress_routes_into_game_state() {
        let mut room = singleplayer_room();
        room.update(0.0);
        let member = room.members()[0].clone();
        room.process_keypress(&member, "Digit4");
        assert_eq!(room.game_data[0].current_input, "4");
        room.process_keypress(&member, "NotAKey");
        assert_eq!(room.game_data[0].current_input, "4");
        assert!(room
            .log
            .records()
            .iter()
            .any(|r| matches!(r.action, GameAction::Keypress)));
    }
}
