use rand::Rng;
use serde::{Deserialize, Serialize};

use mathdef_core::clock::PlayerClocks;
use mathdef_core::command::ClientCommand;
use mathdef_core::messages::MinimalGameData;
use mathdef_core::mode::{GameMode, GameSettings};
use mathdef_core::player::{ConnectionId, PlayerProfile};

use crate::enemy::{Enemy, EnemyOrigin, calculate_score, calculate_sent};

/// Internal sentinel for a force-eliminated player (explicit quit). Never
/// surfaced to clients as a real health value.
pub const FORCE_ELIMINATED_HEALTH: f64 = -99_999.0;

/// Spawn interval multiplier applied each singleplayer level-up.
const LEVEL_SPAWN_TIGHTENING: f64 = 0.95;

/// One player's live simulation state within a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameData {
    pub owner_connection_id: ConnectionId,
    pub owner_name: String,
    /// `Some` for authenticated accounts; decides replay persistence.
    pub owner_user_id: Option<String>,
    pub mode: GameMode,

    pub score: u64,
    /// Consecutive-kill counter; -1 means "no active combo".
    pub combo: i32,
    pub base_health: f64,
    pub maximum_base_health: f64,
    pub base_health_regeneration: f64,

    pub enemies: Vec<Enemy>,
    /// Ids removed this tick, drained into the next snapshot.
    pub erased_enemy_ids: Vec<String>,
    pub clocks: PlayerClocks,
    pub current_input: String,

    pub actions_performed: u32,
    pub enemies_spawned: u32,
    pub enemies_killed: u32,

    // Singleplayer progression.
    pub level: u32,
    pub enemies_to_next_level: u32,

    // Multiplayer stock accounting.
    pub enemies_sent_stock: u32,
    pub received_enemies_stock: u32,
    pub received_enemies_to_spawn: u32,
    pub total_enemies_sent: u32,
    pub total_enemies_received: u32,

    /// Set by an explicit player quit; torn down on the next tick.
    pub aborted: bool,

    /// Typed one-shot client instructions, flushed every tick.
    commands: Vec<ClientCommand>,
    enemy_serial: u64,
}

impl GameData {
    pub fn new(profile: &PlayerProfile, mode: GameMode, settings: &GameSettings) -> Self {
        Self {
            owner_connection_id: profile.connection_id.clone(),
            owner_name: profile.display_name.clone(),
            owner_user_id: profile.user_id.clone(),
            mode,
            score: 0,
            combo: -1,
            base_health: settings.starting_base_health,
            maximum_base_health: settings.maximum_base_health,
            base_health_regeneration: settings.base_health_regeneration,
            enemies: Vec::new(),
            erased_enemy_ids: Vec::new(),
            clocks: PlayerClocks::from_settings(settings),
            current_input: String::new(),
            actions_performed: 0,
            enemies_spawned: 0,
            enemies_killed: 0,
            level: 1,
            enemies_to_next_level: settings.enemies_per_level,
            enemies_sent_stock: 0,
            received_enemies_stock: 0,
            received_enemies_to_spawn: 0,
            total_enemies_sent: 0,
            total_enemies_received: 0,
            aborted: false,
            commands: Vec::new(),
            enemy_serial: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.base_health > 0.0
    }

    pub fn push_command(&mut self, command: ClientCommand) {
        self.commands.push(command);
    }

    /// Drain queued commands for delivery; each is one-shot.
    pub fn take_commands(&mut self) -> Vec<ClientCommand> {
        std::mem::take(&mut self.commands)
    }

    fn next_serial(&mut self) -> u64 {
        let serial = self.enemy_serial;
        self.enemy_serial += 1;
        serial
    }

    /// Spawn a freshly generated enemy. Any spawn resets the forced-spawn
    /// clock, which guarantees the hard upper bound between enemies.
    pub fn spawn_enemy<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        settings: &GameSettings,
        origin: EnemyOrigin,
    ) -> Enemy {
        let serial = self.next_serial();
        let enemy = Enemy::generate(rng, settings, origin, serial);
        self.enemies.push(enemy.clone());
        self.enemies_spawned += 1;
        self.clocks.forced_enemy_spawn.reset();
        enemy
    }

    /// Spawn a clone of the room-wide template enemy.
    pub fn spawn_from_template(&mut self, template: &Enemy) -> Enemy {
        let serial = self.next_serial();
        let enemy = Enemy::from_template(template, EnemyOrigin::Generated, serial);
        self.enemies.push(enemy.clone());
        self.enemies_spawned += 1;
        self.clocks.forced_enemy_spawn.reset();
        enemy
    }

    /// Remove an enemy from the field and record it as erased so clients
    /// delete it.
    pub fn erase_enemy(&mut self, id: &str) {
        self.enemies.retain(|e| e.id != id);
        self.erased_enemy_ids.push(id.to_string());
    }

    /// Apply the combat half of a kill: score, attack volume, combo. The
    /// caller removes the enemy and appends the action record.
    ///
    /// Returns the gross sent volume (multiplayer; zero otherwise). Formulas
    /// evaluate with the pre-increment combo; the combo then increments and
    /// its reset clock restarts.
    pub fn apply_kill(
        &mut self,
        enemy: &Enemy,
        give_score: bool,
        give_combo: bool,
        settings: &GameSettings,
    ) -> u32 {
        let mut sent = 0;
        if give_score {
            self.score += calculate_score(self.combo, enemy.s_position, settings.coefficient);
        }
        if self.mode.is_multiplayer() {
            sent = calculate_sent(self.combo, enemy.s_position, settings.coefficient);
            self.total_enemies_sent += sent;
            // Outstanding received stock absorbs the attack before any of it
            // spills toward an opponent.
            let offset = sent.min(self.received_enemies_stock);
            self.received_enemies_stock -= offset;
            self.enemies_sent_stock += sent - offset;
        }
        if give_combo {
            self.combo += 1;
            self.clocks.combo_reset.reset();
        }
        self.enemies_killed += 1;
        if self.mode.is_singleplayer() {
            self.advance_level(settings);
        }
        sent
    }

    /// Singleplayer difficulty ramp: every `enemies_per_level` kills, the
    /// level rises and the spawn roll interval tightens.
    fn advance_level(&mut self, settings: &GameSettings) {
        self.enemies_to_next_level = self.enemies_to_next_level.saturating_sub(1);
        if self.enemies_to_next_level == 0 {
            self.level += 1;
            self.enemies_to_next_level = settings.enemies_per_level;
            self.clocks.enemy_spawn.action_time =
                (self.clocks.enemy_spawn.action_time * LEVEL_SPAWN_TIGHTENING).max(0.02);
        }
    }

    /// Clamped regeneration; never exceeds the maximum.
    pub fn regenerate(&mut self) {
        self.base_health =
            (self.base_health + self.base_health_regeneration).min(self.maximum_base_health);
    }

    /// Minimized per-tick view. `obfuscate` hides the answer box from
    /// opponents and spectators. Drains the erased-id list.
    pub fn to_minimal(&mut self, obfuscate: bool) -> MinimalGameData {
        MinimalGameData {
            owner_name: self.owner_name.clone(),
            // The sentinel is internal; observers see an emptied base.
            base_health: self.base_health.max(0.0),
            combo: self.combo,
            current_input: if obfuscate {
                String::new()
            } else {
                self.current_input.clone()
            },
            received_enemies_stock: self.received_enemies_stock,
            enemies: self.enemies.iter().map(Enemy::to_minimal).collect(),
            erased_enemy_ids: std::mem::take(&mut self.erased_enemy_ids),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathdef_core::test_helpers::{fast_settings, make_profiles};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn new_game_data(mode: GameMode) -> (GameData, GameSettings) {
        let settings = fast_settings();
        let profile = &make_profiles(1)[0];
        (GameData::new(profile, mode, &settings), settings)
    }

    #[test]
    fn starts_with_no_active_combo() {
        let (data, _) = new_game_data(GameMode::StandardSingleplayer);
        assert_eq!(data.combo, -1);
        assert_eq!(data.level, 1);
        assert!(data.is_alive());
    }

    #[test]
    fn spawn_resets_forced_clock_and_counts() {
        let (mut data, settings) = new_game_data(GameMode::StandardSingleplayer);
        let mut rng = StdRng::seed_from_u64(1);
        data.clocks.forced_enemy_spawn.advance(5.0);

        data.spawn_enemy(&mut rng, &settings, EnemyOrigin::Generated);
        assert_eq!(data.clocks.forced_enemy_spawn.current_time, 0.0);
        assert_eq!(data.enemies_spawned, 1);
        assert_eq!(data.enemies.len(), 1);
    }

    #[test]
    fn enemy_serials_are_unique_across_origins() {
        let (mut data, settings) = new_game_data(GameMode::DefaultMultiplayer);
        let mut rng = StdRng::seed_from_u64(2);
        let a = data.spawn_enemy(&mut rng, &settings, EnemyOrigin::Generated);
        let b = data.spawn_enemy(&mut rng, &settings, EnemyOrigin::Forced);
        let c = data.spawn_enemy(&mut rng, &settings, EnemyOrigin::Received);
        assert_eq!(a.id, "G0");
        assert_eq!(b.id, "F1");
        assert_eq!(c.id, "R2");
    }

    #[test]
    fn erase_records_id_for_client_deletion() {
        let (mut data, settings) = new_game_data(GameMode::StandardSingleplayer);
        let mut rng = StdRng::seed_from_u64(3);
        let enemy = data.spawn_enemy(&mut rng, &settings, EnemyOrigin::Generated);
        data.erase_enemy(&enemy.id);
        assert!(data.enemies.is_empty());
        assert_eq!(data.erased_enemy_ids, vec![enemy.id]);
    }

    #[test]
    fn kill_applies_score_and_combo() {
        let (mut data, settings) = new_game_data(GameMode::EasySingleplayer);
        let mut rng = StdRng::seed_from_u64(4);
        let mut enemy = data.spawn_enemy(&mut rng, &settings, EnemyOrigin::Generated);
        enemy.s_position = 0.5;

        data.clocks.combo_reset.advance(0.9);
        let sent = data.apply_kill(&enemy, true, true, &settings);

        assert_eq!(sent, 0, "singleplayer kills send nothing");
        assert_eq!(data.score, 100);
        assert_eq!(data.combo, 0);
        assert_eq!(data.enemies_killed, 1);
        assert_eq!(
            data.clocks.combo_reset.current_time, 0.0,
            "kill restarts the combo window"
        );
    }

    #[test]
    fn multiplayer_kill_nets_against_received_stock() {
        let (mut data, settings) = new_game_data(GameMode::DefaultMultiplayer);
        let mut rng = StdRng::seed_from_u64(5);
        let mut enemy = data.spawn_enemy(&mut rng, &settings, EnemyOrigin::Generated);
        enemy.s_position = 0.8;
        data.combo = 2;
        data.received_enemies_stock = 3;

        // combo 2, s 0.8 => 4 sent; 3 cancel incoming stock, 1 spills out.
        let sent = data.apply_kill(&enemy, true, true, &settings);
        assert_eq!(sent, 4);
        assert_eq!(data.total_enemies_sent, 4);
        assert_eq!(data.received_enemies_stock, 0);
        assert_eq!(data.enemies_sent_stock, 1);
        assert_eq!(data.combo, 3);
    }

    #[test]
    fn level_advances_after_configured_kills() {
        let (mut data, settings) = new_game_data(GameMode::StandardSingleplayer);
        let mut rng = StdRng::seed_from_u64(6);
        let interval_before = data.clocks.enemy_spawn.action_time;

        for _ in 0..settings.enemies_per_level {
            let enemy = data.spawn_enemy(&mut rng, &settings, EnemyOrigin::Generated);
            data.apply_kill(&enemy, true, true, &settings);
        }
        assert_eq!(data.level, 2);
        assert_eq!(data.enemies_to_next_level, settings.enemies_per_level);
        assert!(data.clocks.enemy_spawn.action_time < interval_before);
    }

    #[test]
    fn regeneration_never_exceeds_maximum() {
        let (mut data, _) = new_game_data(GameMode::StandardSingleplayer);
        data.base_health = data.maximum_base_health - 0.4;
        data.regenerate();
        assert_eq!(data.base_health, data.maximum_base_health);
        data.regenerate();
        assert_eq!(data.base_health, data.maximum_base_health);
    }

    #[test]
    fn commands_are_one_shot() {
        let (mut data, _) = new_game_data(GameMode::StandardSingleplayer);
        data.push_command(ClientCommand::ClearInput);
        assert_eq!(data.take_commands().len(), 1);
        assert!(data.take_commands().is_empty());
    }

    #[test]
    fn minimal_view_obfuscates_input_and_hides_sentinel() {
        let (mut data, _) = new_game_data(GameMode::DefaultMultiplayer);
        data.current_input = "42".to_string();
        data.base_health = FORCE_ELIMINATED_HEALTH;
        data.erased_enemy_ids.push("G0".to_string());

        let opponent_view = data.to_minimal(true);
        assert!(opponent_view.current_input.is_empty());
        assert_eq!(opponent_view.base_health, 0.0);
        assert_eq!(opponent_view.erased_enemy_ids, vec!["G0".to_string()]);
        assert!(
            data.erased_enemy_ids.is_empty(),
            "erased ids drain into the snapshot"
        );
    }
}
