//! Dice Module
//!
//! Die types, notation parsing and authoritative roll evaluation.
//!
//! ## Module Structure
//!
//! - `kind`: the supported die types and their value ranges
//! - `notation`: `2d6+3` style expressions
//! - `roll`: server-side evaluation into a [`RollOutcome`]

pub mod kind;
pub mod notation;
pub mod roll;

// Re-export key types
pub use kind::{DieKind, FaceLabelling};
pub use notation::{DiceNotation, NotationError, MAX_CONSTANT, MAX_DICE};
pub use roll::{RollOutcome, evaluate, roll_die, format_result};
