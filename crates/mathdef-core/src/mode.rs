use serde::{Deserialize, Serialize};

/// Maximum number of characters `current_input` may already hold when a new
/// digit or sign arrives. The guard is `len <= MAXIMUM_INPUT_LENGTH`, so the
/// accumulator tops out at `MAXIMUM_INPUT_LENGTH + 1` characters.
pub const MAXIMUM_INPUT_LENGTH: usize = 7;

/// Which variant of the game a room is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    EasySingleplayer,
    StandardSingleplayer,
    CustomSingleplayer,
    DefaultMultiplayer,
    CustomMultiplayer,
}

impl GameMode {
    pub fn is_singleplayer(self) -> bool {
        matches!(
            self,
            Self::EasySingleplayer | Self::StandardSingleplayer | Self::CustomSingleplayer
        )
    }

    pub fn is_multiplayer(self) -> bool {
        matches!(self, Self::DefaultMultiplayer | Self::CustomMultiplayer)
    }

    /// Custom modes take their numbers from validated player settings and are
    /// excluded from base-health regeneration defaults.
    pub fn is_custom(self) -> bool {
        matches!(self, Self::CustomSingleplayer | Self::CustomMultiplayer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EasySingleplayer => "easy-singleplayer",
            Self::StandardSingleplayer => "standard-singleplayer",
            Self::CustomSingleplayer => "custom-singleplayer",
            Self::DefaultMultiplayer => "default-multiplayer",
            Self::CustomMultiplayer => "custom-multiplayer",
        }
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data-driven numeric table for one game mode. All intervals are seconds.
///
/// These are plain configuration values; nothing here has constructor side
/// effects. Custom modes build a table through [`CustomGameSettings::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    /// Base health a player starts the game with.
    pub starting_base_health: f64,
    /// Regeneration never pushes base health above this value.
    pub maximum_base_health: f64,
    /// Health restored per regeneration fire (non-custom modes only).
    pub base_health_regeneration: f64,
    /// Interval between regeneration fires.
    pub regeneration_interval: f64,
    /// Interval between probabilistic spawn rolls.
    pub enemy_spawn_time: f64,
    /// Probability that a spawn roll actually produces an enemy.
    pub enemy_spawn_chance: f64,
    /// Hard upper bound between spawns; fires unconditionally.
    pub forced_spawn_time: f64,
    /// Inactivity window after which the combo drops back to -1.
    pub combo_reset_time: f64,
    /// sPosition units an enemy travels per second.
    pub enemy_speed: f64,
    /// Damage inflicted when an enemy reaches the base.
    pub base_damage: f64,
    /// Multiplier applied to both the score and sent-enemy formulas.
    pub coefficient: f64,
    /// Inclusive lower bound for generated enemy values.
    pub minimum_enemy_value: i64,
    /// Inclusive upper bound for generated enemy values.
    pub maximum_enemy_value: i64,
    /// Kills required to advance a singleplayer level.
    pub enemies_per_level: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self::standard_singleplayer()
    }
}

impl GameSettings {
    pub fn easy_singleplayer() -> Self {
        Self {
            starting_base_health: 100.0,
            maximum_base_health: 100.0,
            base_health_regeneration: 2.0,
            regeneration_interval: 1.0,
            enemy_spawn_time: 0.4,
            enemy_spawn_chance: 0.2,
            forced_spawn_time: 5.0,
            combo_reset_time: 10.0,
            enemy_speed: 0.5,
            base_damage: 10.0,
            coefficient: 1.0,
            minimum_enemy_value: 1,
            maximum_enemy_value: 16,
            enemies_per_level: 10,
        }
    }

    pub fn standard_singleplayer() -> Self {
        Self {
            starting_base_health: 100.0,
            maximum_base_health: 100.0,
            base_health_regeneration: 2.0,
            regeneration_interval: 1.0,
            enemy_spawn_time: 0.1,
            enemy_spawn_chance: 0.25,
            forced_spawn_time: 2.5,
            combo_reset_time: 5.0,
            enemy_speed: 1.0,
            base_damage: 10.0,
            coefficient: 1.0,
            minimum_enemy_value: 2,
            maximum_enemy_value: 99,
            enemies_per_level: 10,
        }
    }

    pub fn default_multiplayer() -> Self {
        Self {
            starting_base_health: 100.0,
            maximum_base_health: 100.0,
            base_health_regeneration: 2.0,
            regeneration_interval: 1.0,
            enemy_spawn_time: 0.1,
            enemy_spawn_chance: 0.25,
            forced_spawn_time: 2.5,
            combo_reset_time: 5.0,
            enemy_speed: 1.0,
            base_damage: 10.0,
            coefficient: 1.0,
            minimum_enemy_value: 2,
            maximum_enemy_value: 99,
            enemies_per_level: 10,
        }
    }

    /// Built-in table for a mode. Custom modes fall back to the standard
    /// table; their real numbers come from [`CustomGameSettings::validate`].
    pub fn for_mode(mode: GameMode) -> Self {
        match mode {
            GameMode::EasySingleplayer => Self::easy_singleplayer(),
            GameMode::StandardSingleplayer | GameMode::CustomSingleplayer => {
                Self::standard_singleplayer()
            },
            GameMode::DefaultMultiplayer | GameMode::CustomMultiplayer => {
                Self::default_multiplayer()
            },
        }
    }

    /// Load the table for a mode, honoring TOML overrides from
    /// `MATHDEF_GAMEPLAY_CONFIG` or `config/gameplay.toml`.
    pub fn load(mode: GameMode) -> Self {
        if let Ok(path) = std::env::var("MATHDEF_GAMEPLAY_CONFIG")
            && let Ok(contents) = std::fs::read_to_string(&path)
            && let Ok(file) = toml::from_str::<GameplayFile>(&contents)
            && let Some(settings) = file.for_mode(mode)
        {
            tracing::info!(path, mode = %mode, "Loaded gameplay overrides");
            return settings;
        }
        if let Ok(contents) = std::fs::read_to_string("config/gameplay.toml")
            && let Ok(file) = toml::from_str::<GameplayFile>(&contents)
            && let Some(settings) = file.for_mode(mode)
        {
            tracing::info!(mode = %mode, "Loaded gameplay overrides from config/gameplay.toml");
            return settings;
        }
        Self::for_mode(mode)
    }
}

/// Optional per-mode override tables in `gameplay.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GameplayFile {
    easy_singleplayer: Option<GameSettings>,
    standard_singleplayer: Option<GameSettings>,
    default_multiplayer: Option<GameSettings>,
}

impl GameplayFile {
    fn for_mode(&self, mode: GameMode) -> Option<GameSettings> {
        match mode {
            GameMode::EasySingleplayer => self.easy_singleplayer.clone(),
            GameMode::StandardSingleplayer => self.standard_singleplayer.clone(),
            GameMode::DefaultMultiplayer => self.default_multiplayer.clone(),
            GameMode::CustomSingleplayer | GameMode::CustomMultiplayer => None,
        }
    }
}

/// Raw custom-game settings as submitted by a player. Everything is optional;
/// missing fields keep the standard value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomGameSettings {
    pub starting_base_health: Option<f64>,
    pub maximum_base_health: Option<f64>,
    pub base_health_regeneration: Option<f64>,
    pub enemy_spawn_time: Option<f64>,
    pub enemy_spawn_chance: Option<f64>,
    pub forced_spawn_time: Option<f64>,
    pub combo_reset_time: Option<f64>,
    pub enemy_speed: Option<f64>,
    pub base_damage: Option<f64>,
    pub minimum_enemy_value: Option<i64>,
    pub maximum_enemy_value: Option<i64>,
}

/// All bound violations found while validating custom settings, joined into
/// one message for the intermission UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsError {
    pub problems: Vec<String>,
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid custom settings: {}", self.problems.join("; "))
    }
}

impl std::error::Error for SettingsError {}

impl CustomGameSettings {
    /// Validate every provided field against its inclusive bounds. Returns a
    /// complete [`GameSettings`] table, or every violation at once.
    pub fn validate(&self, mode: GameMode) -> Result<GameSettings, SettingsError> {
        let mut settings = GameSettings::for_mode(mode);
        let mut problems = Vec::new();

        let mut check = |name: &str, value: Option<f64>, min: f64, max: f64, slot: &mut f64| {
            if let Some(v) = value {
                if v.is_finite() && (min..=max).contains(&v) {
                    *slot = v;
                } else {
                    problems.push(format!("{name} must be between {min} and {max}"));
                }
            }
        };

        check(
            "startingBaseHealth",
            self.starting_base_health,
            1.0,
            1_000_000.0,
            &mut settings.starting_base_health,
        );
        check(
            "maximumBaseHealth",
            self.maximum_base_health,
            1.0,
            1_000_000.0,
            &mut settings.maximum_base_health,
        );
        check(
            "baseHealthRegeneration",
            self.base_health_regeneration,
            0.0,
            1000.0,
            &mut settings.base_health_regeneration,
        );
        check(
            "enemySpawnTime",
            self.enemy_spawn_time,
            0.01,
            60.0,
            &mut settings.enemy_spawn_time,
        );
        check(
            "enemySpawnChance",
            self.enemy_spawn_chance,
            0.0,
            1.0,
            &mut settings.enemy_spawn_chance,
        );
        check(
            "forcedSpawnTime",
            self.forced_spawn_time,
            0.1,
            60.0,
            &mut settings.forced_spawn_time,
        );
        check(
            "comboResetTime",
            self.combo_reset_time,
            0.1,
            60.0,
            &mut settings.combo_reset_time,
        );
        check(
            "enemySpeed",
            self.enemy_speed,
            0.01,
            10.0,
            &mut settings.enemy_speed,
        );
        check(
            "baseDamage",
            self.base_damage,
            0.0,
            1_000_000.0,
            &mut settings.base_damage,
        );

        if let Some(v) = self.minimum_enemy_value {
            if (-1000..=1000).contains(&v) {
                settings.minimum_enemy_value = v;
            } else {
                problems.push("minimumEnemyValue must be between -1000 and 1000".to_string());
            }
        }
        if let Some(v) = self.maximum_enemy_value {
            if (-1000..=1000).contains(&v) {
                settings.maximum_enemy_value = v;
            } else {
                problems.push("maximumEnemyValue must be between -1000 and 1000".to_string());
            }
        }
        if settings.minimum_enemy_value > settings.maximum_enemy_value {
            problems.push(
                "minimumEnemyValue must not exceed maximumEnemyValue".to_string(),
            );
        }
        if settings.starting_base_health > settings.maximum_base_health {
            problems.push(
                "startingBaseHealth must not exceed maximumBaseHealth".to_string(),
            );
        }

        if problems.is_empty() {
            Ok(settings)
        } else {
            Err(SettingsError { problems })
        }
    }
}
