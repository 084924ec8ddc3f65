use serde::{Deserialize, Serialize};

use crate::mode::GameSettings;

/// An accumulator/threshold pair advanced every tick.
///
/// `current_time` only ever grows by deltaTime, shrinks by exactly
/// `action_time` ([`Clock::drain`]), or returns to exactly zero
/// ([`Clock::reset`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    pub current_time: f64,
    pub action_time: f64,
}

impl Clock {
    pub fn new(action_time: f64) -> Self {
        Self {
            current_time: 0.0,
            action_time,
        }
    }

    pub fn advance(&mut self, dt: f64) {
        self.current_time += dt;
    }

    pub fn ready(&self) -> bool {
        self.current_time >= self.action_time
    }

    /// Subtract one interval, keeping the overflow for the next one.
    pub fn drain(&mut self) {
        self.current_time -= self.action_time;
    }

    /// Hard reset to zero. Used by the forced-spawn and combo clocks, where
    /// the interval must restart from the triggering event rather than drift.
    pub fn reset(&mut self) {
        self.current_time = 0.0;
    }
}

/// The named clocks attached to one player's game state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerClocks {
    pub enemy_spawn: Clock,
    pub forced_enemy_spawn: Clock,
    pub combo_reset: Clock,
    pub regenerate_base_health: Clock,
}

impl PlayerClocks {
    pub fn from_settings(settings: &GameSettings) -> Self {
        Self {
            enemy_spawn: Clock::new(settings.enemy_spawn_time),
            forced_enemy_spawn: Clock::new(settings.forced_spawn_time),
            combo_reset: Clock::new(settings.combo_reset_time),
            regenerate_base_health: Clock::new(settings.regeneration_interval),
        }
    }

    pub fn advance(&mut self, dt: f64) {
        self.enemy_spawn.advance(dt);
        self.forced_enemy_spawn.advance(dt);
        self.combo_reset.advance(dt);
        self.regenerate_base_health.advance(dt);
    }
}
