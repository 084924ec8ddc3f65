pub mod action;
pub mod clock;
pub mod command;
pub mod id;
pub mod messages;
pub mod mode;
pub mod player;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::mode::GameSettings;
    use crate::player::{PlayerProfile, PlayerRank};

    /// Create `n` guest profiles with sequential names and connection ids.
    pub fn make_profiles(n: usize) -> Vec<PlayerProfile> {
        (0..n)
            .map(|i| PlayerProfile {
                connection_id: format!("conn-{}", i + 1),
                display_name: format!("Player{}", i + 1),
                user_id: None,
                rank: PlayerRank::default(),
            })
            .collect()
    }

    /// Like [`make_profiles`], but every player is an authenticated account.
    pub fn make_registered_profiles(n: usize) -> Vec<PlayerProfile> {
        make_profiles(n)
            .into_iter()
            .enumerate()
            .map(|(i, mut p)| {
                p.user_id = Some(format!("user-{}", i + 1));
                p
            })
            .collect()
    }

    /// Settings with very short intervals so tests reach clock fires and
    /// game-over conditions in a handful of ticks.
    pub fn fast_settings() -> GameSettings {
        GameSettings {
            starting_base_health: 20.0,
            maximum_base_health: 20.0,
            base_health_regeneration: 1.0,
            regeneration_interval: 0.5,
            enemy_spawn_time: 0.05,
            enemy_spawn_chance: 1.0,
            forced_spawn_time: 0.2,
            combo_reset_time: 1.0,
            enemy_speed: 5.0,
            base_damage: 10.0,
            coefficient: 1.0,
            minimum_enemy_value: 1,
            maximum_enemy_value: 9,
            enemies_per_level: 3,
        }
    }
}
