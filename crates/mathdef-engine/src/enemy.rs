use rand::Rng;
use serde::{Deserialize, Serialize};

use mathdef_core::messages::MinimalEnemy;
use mathdef_core::mode::GameSettings;

/// sPosition an enemy spawns at; it decreases toward 0 (the base).
pub const ENEMY_SPAWN_POSITION: f64 = 10.0;

/// Where an enemy came from; encoded as the first character of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnemyOrigin {
    /// Spawned by the probabilistic spawn clock.
    Generated,
    /// Spawned by the forced-spawn clock or the empty-field rule.
    Forced,
    /// Spawned from an opponent's attack stock.
    Received,
}

impl EnemyOrigin {
    pub fn prefix(self) -> char {
        match self {
            Self::Generated => 'G',
            Self::Forced => 'F',
            Self::Received => 'R',
        }
    }
}

/// A falling numeric enemy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    /// Unique within a player's field; origin prefix plus serial.
    pub id: String,
    /// The answer that destroys this enemy.
    pub requested_value: i64,
    /// What the client renders: the bare value or an arithmetic expression
    /// that evaluates to it.
    pub displayed_text: String,
    /// Horizontal lane, 0..1.
    pub x_position: f64,
    /// Distance from the base; strictly decreasing while alive.
    pub s_position: f64,
    /// sPosition units per second.
    pub speed: f64,
}

impl Enemy {
    /// Sample a fresh enemy from the mode's value range.
    pub fn generate<R: Rng + ?Sized>(
        rng: &mut R,
        settings: &GameSettings,
        origin: EnemyOrigin,
        serial: u64,
    ) -> Self {
        let value = rng.random_range(settings.minimum_enemy_value..=settings.maximum_enemy_value);
        Self {
            id: format!("{}{}", origin.prefix(), serial),
            requested_value: value,
            displayed_text: render_problem(rng, value),
            x_position: rng.random::<f64>(),
            s_position: ENEMY_SPAWN_POSITION,
            speed: settings.enemy_speed,
        }
    }

    /// Clone a template enemy (the multiplayer global spawn) into one
    /// player's field under a fresh id.
    pub fn from_template(template: &Enemy, origin: EnemyOrigin, serial: u64) -> Self {
        Self {
            id: format!("{}{}", origin.prefix(), serial),
            ..template.clone()
        }
    }

    /// No clamping; the caller checks for `s_position <= 0`.
    pub fn move_by(&mut self, distance: f64) {
        self.s_position -= distance;
    }

    pub fn check(&self, submitted_value: i64) -> bool {
        submitted_value == self.requested_value
    }

    pub fn has_reached_base(&self) -> bool {
        self.s_position <= 0.0
    }

    pub fn to_minimal(&self) -> MinimalEnemy {
        MinimalEnemy {
            id: self.id.clone(),
            s_position: self.s_position,
            x_position: self.x_position,
            displayed_text: self.displayed_text.clone(),
        }
    }
}

/// Score for killing an enemy: reward grows with the active combo and with
/// how close to the base the enemy was.
pub fn calculate_score(combo: i32, s_position: f64, coefficient: f64) -> u64 {
    let position_bonus = ((s_position - 0.5) * 50.0).max(0.0);
    let combo_multiplier = (combo as f64 * 0.1 + 1.0).max(1.0);
    ((100.0 + position_bonus * combo_multiplier) * coefficient).round() as u64
}

/// Attack volume generated by a kill: combo and proximity both convert into
/// enemies owed to an opponent.
pub fn calculate_sent(combo: i32, s_position: f64, coefficient: f64) -> u32 {
    let from_combo = ((combo + 1) as f64 / 3.0).floor();
    let from_position = ((s_position - 0.5) * 10.0).floor().max(0.0);
    (((from_combo + from_position) * coefficient).max(0.0)) as u32
}

/// Render a problem text that evaluates to `value`. Factor-based forms
/// special-case zero, which has no usable factor pairs.
fn render_problem<R: Rng + ?Sized>(rng: &mut R, value: i64) -> String {
    match rng.random_range(0..5u8) {
        1 => {
            let a = rng.random_range(0..=9i64);
            let b = value - a;
            if b < 0 {
                format!("{a}-{}", -b)
            } else {
                format!("{a}+{b}")
            }
        },
        2 => {
            let b = rng.random_range(0..=9i64);
            format!("{}-{b}", value + b)
        },
        3 => {
            if value == 0 {
                format!("0×{}", rng.random_range(1..=9))
            } else {
                let divisors: Vec<i64> = (1..=12)
                    .filter(|d| value % d == 0 && (value / d).abs() <= 999)
                    .collect();
                let d = divisors[rng.random_range(0..divisors.len())];
                format!("{d}×{}", value / d)
            }
        },
        4 => {
            let b = rng.random_range(1..=9i64);
            match value.checked_mul(b) {
                Some(a) => format!("{a}÷{b}"),
                None => value.to_string(),
            }
        },
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathdef_core::test_helpers::fast_settings;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn eval(text: &str) -> i64 {
        for (i, op) in text.char_indices().skip(1) {
            let (lhs, rhs) = (&text[..i], &text[i + op.len_utf8()..]);
            let apply = |f: fn(i64, i64) -> i64| {
                f(lhs.parse().unwrap(), rhs.parse().unwrap())
            };
            match op {
                '+' => return apply(|a, b| a + b),
                '-' => return apply(|a, b| a - b),
                '×' => return apply(|a, b| a * b),
                '÷' => return apply(|a, b| a / b),
                _ => {},
            }
        }
        text.parse().unwrap()
    }

    #[test]
    fn move_by_strictly_decreases_position() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut enemy = Enemy::generate(&mut rng, &fast_settings(), EnemyOrigin::Generated, 0);
        let mut last = enemy.s_position;
        for _ in 0..40 {
            enemy.move_by(0.25);
            assert!(enemy.s_position < last);
            last = enemy.s_position;
        }
        assert!(enemy.has_reached_base());
    }

    #[test]
    fn check_matches_requested_value_only() {
        let mut rng = StdRng::seed_from_u64(2);
        let enemy = Enemy::generate(&mut rng, &fast_settings(), EnemyOrigin::Generated, 0);
        assert!(enemy.check(enemy.requested_value));
        assert!(!enemy.check(enemy.requested_value + 1));
    }

    #[test]
    fn id_prefixes_encode_origin() {
        let mut rng = StdRng::seed_from_u64(3);
        let settings = fast_settings();
        let g = Enemy::generate(&mut rng, &settings, EnemyOrigin::Generated, 7);
        let f = Enemy::generate(&mut rng, &settings, EnemyOrigin::Forced, 8);
        let r = Enemy::generate(&mut rng, &settings, EnemyOrigin::Received, 9);
        assert_eq!(g.id, "G7");
        assert_eq!(f.id, "F8");
        assert_eq!(r.id, "R9");
    }

    #[test]
    fn displayed_text_always_evaluates_to_value() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut settings = fast_settings();
        settings.minimum_enemy_value = 0;
        settings.maximum_enemy_value = 99;
        for serial in 0..500 {
            let enemy = Enemy::generate(&mut rng, &settings, EnemyOrigin::Generated, serial);
            assert_eq!(
                eval(&enemy.displayed_text),
                enemy.requested_value,
                "problem {} must equal {}",
                enemy.displayed_text,
                enemy.requested_value
            );
        }
    }

    #[test]
    fn zero_value_generation_does_not_panic() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut settings = fast_settings();
        settings.minimum_enemy_value = 0;
        settings.maximum_enemy_value = 0;
        for serial in 0..100 {
            let enemy = Enemy::generate(&mut rng, &settings, EnemyOrigin::Generated, serial);
            assert_eq!(eval(&enemy.displayed_text), 0);
        }
    }

    #[test]
    fn template_clone_keeps_problem_but_renames() {
        let mut rng = StdRng::seed_from_u64(6);
        let template = Enemy::generate(&mut rng, &fast_settings(), EnemyOrigin::Generated, 0);
        let cloned = Enemy::from_template(&template, EnemyOrigin::Generated, 42);
        assert_eq!(cloned.requested_value, template.requested_value);
        assert_eq!(cloned.displayed_text, template.displayed_text);
        assert_eq!(cloned.id, "G42");
    }

    #[test]
    fn base_score_is_100_near_the_base() {
        // Position term zero at s <= 0.5; no active combo.
        assert_eq!(calculate_score(0, 0.5, 1.0), 100);
        assert_eq!(calculate_score(-1, 0.2, 1.0), 100);
    }

    #[test]
    fn score_grows_with_distance_and_combo() {
        let near = calculate_score(0, 0.5, 1.0);
        let far = calculate_score(0, 5.0, 1.0);
        assert!(far > near);
        assert!(calculate_score(10, 5.0, 1.0) > far);
    }

    #[test]
    fn sent_formula_matches_worked_example() {
        // combo 2, sPosition 0.8: floor(3/3) + floor(0.3/0.1) = 1 + 3 = 4
        assert_eq!(calculate_sent(2, 0.8, 1.0), 4);
    }

    #[test]
    fn sent_is_zero_without_combo_near_base() {
        assert_eq!(calculate_sent(-1, 0.4, 1.0), 0);
        assert_eq!(calculate_sent(0, 0.5, 1.0), 0);
    }
}
