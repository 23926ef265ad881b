//! Rooms
//!
//! Authoritative room state and the registry that owns it.

pub mod registry;
pub mod state;

pub use registry::{
    RoomRegistry, RegistryConfig, RegistryError, Scheduled, Timer, MAX_ROOM_NAME_LEN,
};
pub use state::{
    Appearance, ConnectionId, DiceConfiguration, DiceSetError, DieDescriptor, DieTextures,
    PhysicsConstants, PhysicsPreset, Room, RoomPhase, GRAVITY_SCALE,
};
