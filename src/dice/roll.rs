//! Roll Evaluation
//!
//! Produces the authoritative outcome of a roll. Runs on the server only:
//! the random source it draws from is never exposed to clients, so nobody
//! can predict a result before it is broadcast.
//!
//! Evaluation is a pure function of the dice set and the random draws,
//! which keeps it testable with a seeded [`DeterministicRng`].
//!
//! [`DeterministicRng`]: crate::core::rng::DeterministicRng

use serde::{Serialize, Deserialize};

use crate::core::rng::RandomSource;
use super::kind::DieKind;
use super::notation::DiceNotation;

/// The authoritative result of one roll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    /// Die types rolled, in order.
    pub set: Vec<DieKind>,
    /// Constant modifier.
    pub constant: i32,
    /// One value per die, aligned with `set`.
    pub result: Vec<i32>,
    /// Sum of `result` plus `constant`.
    pub result_total: i32,
    /// Human-readable summary, e.g. `3 + 5 + 2 = 10`.
    pub result_string: String,
}

impl RollOutcome {
    /// Assemble an outcome from already-known values.
    ///
    /// Used both by the evaluator and by clients that fall back to the
    /// physically read values when no authoritative result was supplied.
    pub fn from_values(set: Vec<DieKind>, constant: i32, result: Vec<i32>) -> Self {
        // Parsed notations keep this far from overflow; saturate regardless.
        let result_total = result.iter().fold(constant, |acc, v| acc.saturating_add(*v));
        let result_string = format_result(&result, constant, result_total);
        Self {
            set,
            constant,
            result,
            result_total,
            result_string,
        }
    }

    /// Number of dice rolled.
    pub fn dice_count(&self) -> usize {
        self.result.len()
    }
}

/// Draw one value for a die of the given type.
///
/// Uniform over the type's declared value set (for the tens die that is
/// 0, 10, ..., 90).
pub fn roll_die(kind: DieKind, rng: &mut dyn RandomSource) -> i32 {
    let step = kind.value_step();
    let slots = (kind.max_value() - kind.min_value()) / step;
    kind.min_value() + rng.next_in_range(0, slots) * step
}

/// Evaluate a parsed notation.
pub fn evaluate(notation: &DiceNotation, rng: &mut dyn RandomSource) -> RollOutcome {
    let result: Vec<i32> = notation
        .set
        .iter()
        .map(|kind| roll_die(*kind, rng))
        .collect();
    RollOutcome::from_values(notation.set.clone(), notation.constant, result)
}

/// Render `a + b + c + K = total`.
///
/// A negative constant is written as ` -K`. The total is only appended
/// when there is more than one die or a constant, since `6 = 6` says
/// nothing new.
pub fn format_result(result: &[i32], constant: i32, total: i32) -> String {
    let mut text = result
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" + ");
    if constant > 0 {
        text.push_str(&format!(" + {constant}"));
    } else if constant < 0 {
        text.push_str(&format!(" {constant}"));
    }
    if result.len() > 1 || constant != 0 {
        text.push_str(&format!(" = {total}"));
    }
    text
}
