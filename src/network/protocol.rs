//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON object whose `type` field names the message;
//! the two enums below are the complete vocabulary in each direction.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::dice::RollOutcome;
use crate::room::{Appearance, DieDescriptor, PhysicsPreset};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a room. An empty password makes it public.
    CreateRoom {
        room_name: String,
        #[serde(default)]
        password: String,
    },

    /// Join a room, leaving any other room first.
    JoinRoom {
        room_name: String,
        #[serde(default)]
        password: String,
    },

    /// Leave the current room.
    LeaveRoom,

    /// Replace the room's dice with those described by a notation.
    SetNotation { notation: String },

    /// Replace the room's dice descriptors.
    SetDiceSet { dice: Vec<DieDescriptor> },

    /// Replace the room's appearance.
    SetAppearance { appearance: Appearance },

    /// Select a physics preset.
    SetPhysicsPreset { preset: PhysicsPreset },

    /// Ask the server to roll the room's dice.
    RequestRoll {
        #[serde(default)]
        vector: Option<ThrowVector>,
    },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

/// Gesture hint for the throw animation. Never affects the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrowVector {
    /// Horizontal swipe component in screen units.
    pub x: f64,
    /// Vertical swipe component in screen units.
    pub y: f64,
}

impl ThrowVector {
    /// Whether the gesture carries a usable direction.
    pub fn is_usable(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && (self.x != 0.0 || self.y != 0.0)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current lobby. Sent on connect and after every create/delete.
    RoomList { rooms: Vec<RoomSummary> },

    /// The requested room was created.
    CreateSuccess { room_name: String },

    /// The requested room could not be created.
    CreateError { message: String },

    /// Join target does not exist.
    RoomNotFound,

    /// Join was refused.
    JoinError { message: String },

    /// Room notation, canonical form.
    NotationUpdate { notation: String },

    /// Room dice descriptors.
    DiceSetUpdate { dice: Vec<DieDescriptor> },

    /// Room appearance.
    AppearanceUpdate(Appearance),

    /// Room physics preset.
    PhysicsPresetUpdate { preset: PhysicsPreset },

    /// An accepted roll.
    NewRoll(RollBroadcast),

    /// Cue the roll sound.
    PlayRollSound,

    /// Roll button should stay locked for this long.
    StartCooldown { duration_ms: u64 },

    /// Cooldown is over; rolling is allowed again.
    EnableRoll,

    /// Someone joined the room.
    UserJoined { message: String },

    /// Someone left the room.
    UserLeft { message: String },

    /// Pong response.
    Pong { timestamp: u64, server_time: i64 },

    /// Error message.
    Error(ServerError),
}

/// Lobby entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub name: String,
    pub is_private: bool,
}

/// Payload of [`ServerMessage::NewRoll`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollBroadcast {
    /// Authoritative outcome.
    pub result: RollOutcome,
    /// Requester's gesture, relayed for the animation.
    pub vector: Option<ThrowVector>,
    pub rolled_at: DateTime<Utc>,
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be decoded.
    InvalidInput,
    /// Notation did not parse cleanly.
    InvalidNotation,
    /// Dice set was malformed.
    InvalidDiceSet,
    /// Appearance values out of range.
    InvalidAppearance,
    /// Room-scoped request without a joined room.
    NotInRoom,
    /// Connection limit reached.
    ServerOverloaded,
}

impl ServerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom { .. } => "create_room",
            ClientMessage::JoinRoom { .. } => "join_room",
            ClientMessage::LeaveRoom => "leave_room",
            ClientMessage::SetNotation { .. } => "set_notation",
            ClientMessage::SetDiceSet { .. } => "set_dice_set",
            ClientMessage::SetAppearance { .. } => "set_appearance",
            ClientMessage::SetPhysicsPreset { .. } => "set_physics_preset",
            ClientMessage::RequestRoll { .. } => "request_roll",
            ClientMessage::Ping { .. } => "ping",
        }
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Build an error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::DieKind;

    #[test]
    fn test_client_wire_names() {
        let json = r#"{"type":"create_room","room_name":"table1","password":"pw"}"#;
        let msg = ClientMessage::from_json(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateRoom { room_name: "table1".into(), password: "pw".into() }
        );

        let json = r#"{"type":"leave_room"}"#;
        assert_eq!(ClientMessage::from_json(json).unwrap(), ClientMessage::LeaveRoom);
    }

    #[test]
    fn test_password_and_vector_are_optional() {
        let msg = ClientMessage::from_json(r#"{"type":"join_room","room_name":"a"}"#).unwrap();
        assert_eq!(msg, ClientMessage::JoinRoom { room_name: "a".into(), password: String::new() });

        let msg = ClientMessage::from_json(r#"{"type":"request_roll"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RequestRoll { vector: None });
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"drop_tables"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_appearance_update_is_flattened() {
        let msg = ServerMessage::AppearanceUpdate(Appearance::default());
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "appearance_update");
        assert_eq!(value["background_color"], "#212121");
        assert_eq!(value["scale"], 100.0);
    }

    #[test]
    fn test_preset_update_uses_preset_names() {
        let msg = ServerMessage::PhysicsPresetUpdate { preset: PhysicsPreset::Moon };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""preset":"Moon""#));
    }

    #[test]
    fn test_new_roll_payload() {
        let msg = ServerMessage::NewRoll(RollBroadcast {
            result: RollOutcome::from_values(vec![DieKind::D6, DieKind::D6], 3, vec![2, 5]),
            vector: Some(ThrowVector { x: 10.0, y: -4.0 }),
            rolled_at: Utc::now(),
        });
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "new_roll");
        assert_eq!(value["result"]["result_total"], 10);
        assert_eq!(value["result"]["set"][0], "d6");
        assert_eq!(value["vector"]["x"], 10.0);
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::error(ErrorCode::InvalidNotation, "bad");
        let json = msg.to_json().unwrap();
        assert!(json.contains("invalid_notation"));
        assert!(json.contains(r#""type":"error""#));
    }

    #[test]
    fn test_unit_variants_carry_only_type() {
        assert_eq!(ServerMessage::EnableRoll.to_json().unwrap(), r#"{"type":"enable_roll"}"#);
        assert_eq!(ServerMessage::RoomNotFound.to_json().unwrap(), r#"{"type":"room_not_found"}"#);
    }

    #[test]
    fn test_throw_vector_usable() {
        assert!(ThrowVector { x: 1.0, y: 0.0 }.is_usable());
        assert!(!ThrowVector { x: 0.0, y: 0.0 }.is_usable());
        assert!(!ThrowVector { x: f64::NAN, y: 1.0 }.is_usable());
    }
}
