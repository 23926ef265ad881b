//! Core primitives.
//!
//! Randomness and float math shared by the server-side evaluator and the
//! client-side reconciliation code.

pub mod rng;
pub mod vec3;

// Re-export core types
pub use rng::{RandomSource, DeterministicRng, EntropyRng};
pub use vec3::{Vec3, Quat};
