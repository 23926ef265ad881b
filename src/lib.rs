//! # Dice Room Server
//!
//! Shared dice rolling over websockets. A host configures dice and table
//! appearance for a named room, anyone in the room may roll, and every
//! member sees the same physics-animated outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DICE ROOM SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── rng.rs      - Injectable random sources                 │
//! │  └── vec3.rs     - Vectors and quaternions                   │
//! │                                                              │
//! │  dice/           - Dice semantics                            │
//! │  ├── kind.rs     - Die types and value ranges                │
//! │  ├── notation.rs - "2d6+3" parsing                           │
//! │  └── roll.rs     - Authoritative roll evaluation             │
//! │                                                              │
//! │  room/           - Authoritative room state                  │
//! │  ├── state.rs    - Rooms, dice sets, appearance, presets     │
//! │  └── registry.rs - Lifecycle and roll admission              │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── password.rs - Room password digests                     │
//! │  └── server.rs   - HTTP + WebSocket server                   │
//! │                                                              │
//! │  client/         - Client-side logic                         │
//! │  ├── geometry.rs - Face tables                               │
//! │  ├── reconcile.rs- Face relabelling                          │
//! │  ├── animation.rs- Throw and settle                          │
//! │  └── session.rs  - Room client state machine                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority
//!
//! Roll values are drawn on the server only. Clients simulate the throw
//! locally and relabel the settled dice so the faces show the broadcast
//! values; simulation state is never shared.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod core;
pub mod dice;
pub mod network;
pub mod room;

// Re-export commonly used types
pub use core::rng::{DeterministicRng, EntropyRng, RandomSource};
pub use dice::{DiceNotation, DieKind, RollOutcome};
pub use network::{RoomServer, ServerConfig};
pub use room::{RoomRegistry, RegistryConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
