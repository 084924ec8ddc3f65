use std::collections::HashMap;

use mathdef_core::action::{
    ActionRecord, FinishRecord, GameAction, RECORDING_VERSION, ReplayDocument,
};
use mathdef_core::mode::GameMode;

/// Why a replay document failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    Empty,
    UnsupportedVersion(u32),
    MissingGameStart,
    MissingGameOver,
    TimestampRegression(usize),
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "replay contains no action records"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported recording version {v}"),
            Self::MissingGameStart => write!(f, "first action record must be GameStart"),
            Self::MissingGameOver => write!(f, "last action record must be GameOver"),
            Self::TimestampRegression(i) => write!(f, "action timestamps regress at record {i}"),
        }
    }
}

impl std::error::Error for ReplayError {}

/// What a log walk recovers about a finished game, independent of the
/// statistics block stored next to it.
#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    pub players: Vec<String>,
    pub final_scores: HashMap<String, u64>,
    pub enemies_killed: HashMap<String, u32>,
    pub enemies_spawned: HashMap<String, u32>,
    pub keypresses: u64,
    pub ranking: Vec<FinishRecord>,
}

/// Structural invariants every stored replay satisfies: bracketed by
/// GameStart/GameOver, monotone timestamps, a version we can read.
pub fn verify(doc: &ReplayDocument) -> Result<(), ReplayError> {
    if doc.recording_version != RECORDING_VERSION {
        return Err(ReplayError::UnsupportedVersion(doc.recording_version));
    }
    let first = doc.actions.first().ok_or(ReplayError::Empty)?;
    if !matches!(first.action, GameAction::GameStart) {
        return Err(ReplayError::MissingGameStart);
    }
    // Log construction appends only, so the last record is the closer.
    if !matches!(
        doc.actions.last().map(|r| &r.action),
        Some(GameAction::GameOver)
    ) {
        return Err(ReplayError::MissingGameOver);
    }
    for (i, pair) in doc.actions.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            return Err(ReplayError::TimestampRegression(i + 1));
        }
    }
    Ok(())
}

/// Walk the action records and rebuild the game's outcome. Kill records
/// carry the cumulative score, so the last one per player is authoritative.
pub fn reconstruct(doc: &ReplayDocument) -> Result<ReplaySummary, ReplayError> {
    verify(doc)?;
    let mut summary = ReplaySummary::default();
    for record in &doc.actions {
        match &record.action {
            GameAction::GameStart => {
                if let Some(players) = record.data.get("players").and_then(|v| v.as_array()) {
                    summary.players = players
                        .iter()
                        .filter_map(|p| p.as_str().map(str::to_string))
                        .collect();
                }
            },
            GameAction::EnemySpawn | GameAction::EnemyReceived => {
                if let Some(user) = &record.user {
                    *summary.enemies_spawned.entry(user.clone()).or_default() += 1;
                }
            },
            GameAction::EnemyKill => {
                let Some(user) = &record.user else { continue };
                *summary.enemies_killed.entry(user.clone()).or_default() += 1;
                if let Some(score) = record.data.get("score").and_then(|v| v.as_u64()) {
                    summary.final_scores.insert(user.clone(), score);
                }
            },
            GameAction::Keypress => summary.keypresses += 1,
            GameAction::Elimination | GameAction::DeclareWinner => {
                if let Ok(finish) = serde_json::from_value::<FinishRecord>(record.data.clone()) {
                    summary.ranking.push(finish);
                }
            },
            _ => {},
        }
    }
    Ok(summary)
}

/// Multiplayer spectating and post-game screens only need the ranking.
pub fn ranking_of(mode: GameMode, actions: &[ActionRecord]) -> Vec<FinishRecord> {
    if !mode.is_multiplayer() {
        return Vec::new();
    }
    actions
        .iter()
        .filter(|r| {
            matches!(
                r.action,
                GameAction::Elimination | GameAction::DeclareWinner
            )
        })
        .filter_map(|r| serde_json::from_value(r.data.clone()).ok())
        .collect()
}
