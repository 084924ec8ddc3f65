use serde::Deserialize;

/// Top-level server configuration, loaded from `mathdef.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub tick: TickConfig,
    pub rooms: RoomsConfig,
    pub persistence: PersistenceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            rooms: RoomsConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

/// Simulation loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Updates per second for every room.
    pub rate_hz: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self { rate_hz: 60 }
    }
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// Intermission length before a Default Multiplayer game begins.
    pub intermission_secs: f64,
    /// Members required before the Default Multiplayer countdown runs.
    pub minimum_multiplayer_players: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            intermission_secs: 30.0,
            minimum_multiplayer_players: 2,
        }
    }
}

/// Progression rewards for finished games.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Singleplayer experience per point of score.
    pub experience_per_score: f64,
    /// Multiplayer experience per second survived.
    pub experience_per_second: f64,
    /// Multiplier applied to the multiplayer winner's award.
    pub winner_experience_multiplier: f64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            experience_per_score: 0.01,
            experience_per_second: 1.0,
            winner_experience_multiplier: 1.5,
        }
    }
}

impl ServerConfig {
    /// Validate configuration, logging errors for fatal issues.
    pub fn validate(&self) {
        if self.tick.rate_hz == 0 {
            tracing::error!("tick.rate_hz must be > 0");
            std::process::exit(1);
        }
        if self.rooms.intermission_secs <= 0.0 {
            tracing::error!("rooms.intermission_secs must be > 0");
            std::process::exit(1);
        }
        if self.rooms.minimum_multiplayer_players < 2 {
            tracing::error!("rooms.minimum_multiplayer_players must be >= 2");
            std::process::exit(1);
        }
        if self.persistence.winner_experience_multiplier < 1.0 {
            tracing::warn!("winner_experience_multiplier below 1.0 penalizes winning");
        }
    }

    /// Load config from `mathdef.toml` if it exists, then apply env var
    /// overrides.
    pub fn load() -> Self {
        let path = std::env::var("MATHDEF_CONFIG").unwrap_or_else(|_| "mathdef.toml".to_string());
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!(path, "Loaded configuration");
                    cfg
                },
                Err(e) => {
                    tracing::warn!(path, "Failed to parse config: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!(path, "No config file found, using defaults");
                ServerConfig::default()
            },
        };

        if let Ok(val) = std::env::var("MATHDEF_TICK_RATE")
            && let Ok(n) = val.parse::<u32>()
        {
            config.tick.rate_hz = n;
        }
        if let Ok(val) = std::env::var("MATHDEF_INTERMISSION_SECS")
            && let Ok(n) = val.parse::<f64>()
        {
            config.rooms.intermission_secs = n;
        }

        config
    }
}
