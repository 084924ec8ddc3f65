use serde_json::json;

use mathdef_core::action::{ActionLog, GameAction};
use mathdef_core::command::ClientCommand;
use mathdef_core::mode::{GameSettings, MAXIMUM_INPUT_LENGTH};

use crate::game_data::GameData;

/// A discrete player input applied to the simulation between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    AddDigit(u8),
    RemoveDigit,
    AddSubtractionSign,
    SendAnswer,
    AbortGame,
}

impl InputAction {
    /// Parse a KeyboardEvent-style code. Unknown codes are validation
    /// errors; callers log and skip them.
    pub fn from_code(code: &str) -> Option<Self> {
        if let Some(digit) = code
            .strip_prefix("Digit")
            .or_else(|| code.strip_prefix("Numpad"))
            && digit.len() == 1
            && let Ok(d) = digit.parse::<u8>()
        {
            return Some(Self::AddDigit(d));
        }
        match code {
            "Backspace" => Some(Self::RemoveDigit),
            "Minus" | "NumpadSubtract" => Some(Self::AddSubtractionSign),
            "Enter" | "NumpadEnter" | "Space" => Some(Self::SendAnswer),
            "Escape" => Some(Self::AbortGame),
            _ => None,
        }
    }
}

/// Apply one input action to a player's game state.
///
/// Kills and stock releases are appended to the action log here, because an
/// answer submission is the only combat trigger that originates outside the
/// tick itself.
pub fn process_action(
    data: &mut GameData,
    action: InputAction,
    settings: &GameSettings,
    log: &mut ActionLog,
) {
    match action {
        InputAction::AddDigit(d) => {
            if d <= 9 && data.current_input.len() <= MAXIMUM_INPUT_LENGTH {
                data.current_input.push((b'0' + d) as char);
            }
        },
        InputAction::RemoveDigit => {
            data.current_input.pop();
        },
        InputAction::AddSubtractionSign => {
            // Only meaningful as a leading sign.
            if data.current_input.is_empty() {
                data.current_input.push('-');
            }
        },
        InputAction::SendAnswer => send_answer(data, settings, log),
        InputAction::AbortGame => {
            data.aborted = true;
        },
    }
}

fn send_answer(data: &mut GameData, settings: &GameSettings, log: &mut ActionLog) {
    data.actions_performed += 1;

    let submitted = data.current_input.parse::<i64>().ok();
    let matched_ids: Vec<String> = match submitted {
        Some(value) => data
            .enemies
            .iter()
            .filter(|e| e.check(value))
            .map(|e| e.id.clone())
            .collect(),
        None => Vec::new(),
    };

    for id in &matched_ids {
        let Some(enemy) = data.enemies.iter().find(|e| e.id == *id).cloned() else {
            continue;
        };
        let sent = data.apply_kill(&enemy, true, true, settings);
        let score = data.score;
        data.erase_enemy(&enemy.id);
        log.record_player(
            GameAction::EnemyKill,
            &data.owner_name.clone(),
            json!({
                "enemyId": enemy.id,
                "value": enemy.requested_value,
                "sPosition": enemy.s_position,
                "combo": data.combo,
                "sent": sent,
                "score": score,
            }),
        );
    }

    if matched_ids.is_empty() && data.mode.is_multiplayer() && data.received_enemies_stock > 0 {
        // A whiff releases the whole stock: queued attacks now spawn and can
        // no longer be parried away.
        let released = data.received_enemies_stock;
        data.received_enemies_to_spawn += released;
        data.received_enemies_stock = 0;
        log.record_player(
            GameAction::StockRelease,
            &data.owner_name.clone(),
            json!({ "released": released }),
        );
    }

    data.current_input.clear();
    data.push_command(ClientCommand::ClearInput);
}
