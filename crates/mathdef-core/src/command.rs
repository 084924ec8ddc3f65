use serde::{Deserialize, Serialize};

/// Client screens the server can summon a player to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Screen {
    MainMenu,
    Game,
    Intermission,
    GameOver,
}

/// A typed, one-shot instruction for a specific client. Commands queue on the
/// player's game state and are flushed (and cleared) every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    /// Wipe the on-screen answer box after a submit.
    ClearInput,
    ChangeScreen(Screen),
    UpdateText { selector: String, value: String },
    /// Soft indication that a replay/statistics save failed.
    NotSaved,
}
