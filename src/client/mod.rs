//! Client Module
//!
//! Everything a client needs besides rendering: face tables, post-settle
//! reconciliation, the roll animation state machine and the room session.
//!
//! ## Module Structure
//!
//! - `geometry`: body-space faces and outward normals per die shape
//! - `reconcile`: face read-out and relabelling to the authoritative value
//! - `animation`: throw planning, settle detection, per-roll lifecycle
//! - `session`: one client role state machine, gated by capabilities

pub mod animation;
pub mod geometry;
pub mod reconcile;
pub mod session;

pub use animation::{
    plan_throw, resting_layout, AnimationError, AnimationPhase, BodyHandle, BodySpec, BodyState,
    PhysicsWorld, RollAnimation, RollCompletion, SettleConfig, StopMarker, ThrowArea,
};
pub use geometry::{DieGeometry, Face};
pub use reconcile::{read_value, reconcile, reconcile_all, FaceLabels, ReconcileError, D4_CORNER_LABELS};
pub use session::{Capabilities, ClientEvent, ClientState, RoomClient, RoomMirror};
