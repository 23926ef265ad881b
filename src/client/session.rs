//! Room Client
//!
//! One state machine for every client role. A host and a participant run
//! the same join and roll flow; they differ only in [`Capabilities`],
//! which gate the edits a client may propose.
//!
//! The client never applies its own proposals. It sends them and waits
//! for the broadcast, so the local mirror always holds the server's view.

use std::time::Duration;

use tracing::{debug, info};

use crate::dice::{DiceNotation, RollOutcome};
use crate::network::protocol::{
    ClientMessage, ErrorCode, RoomSummary, ServerError, ServerMessage, ThrowVector,
};
use crate::room::{Appearance, DieDescriptor, PhysicsPreset};

/// What a client is allowed to propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// May replace notation and dice descriptors.
    pub can_edit_dice: bool,
    /// May replace appearance and physics preset.
    pub can_edit_appearance: bool,
}

impl Capabilities {
    pub fn host() -> Self {
        Self { can_edit_dice: true, can_edit_appearance: true }
    }

    pub fn participant() -> Self {
        Self { can_edit_dice: false, can_edit_appearance: false }
    }
}

/// Where the client is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Lobby,
    /// Join sent, room state not yet received.
    Joining { room: String },
    InRoom { room: String },
}

/// Local copy of the room's shared state.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomMirror {
    pub notation: String,
    pub dice: Vec<DieDescriptor>,
    pub appearance: Appearance,
    pub preset: PhysicsPreset,
}

impl Default for RoomMirror {
    fn default() -> Self {
        Self {
            notation: String::new(),
            dice: Vec::new(),
            appearance: Appearance::default(),
            preset: PhysicsPreset::default(),
        }
    }
}

/// What the UI should react to after a server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    RoomsChanged,
    Created { room: String },
    Joined { room: String },
    /// Create or join refused.
    Rejected { message: String },
    RoomNotFound,
    /// Part of the mirror was overwritten.
    StateChanged,
    /// Start animating with these authoritative values.
    RollStarted { outcome: RollOutcome, vector: Option<ThrowVector> },
    PlaySound,
    CooldownStarted(Duration),
    RollEnabled,
    Presence { message: String },
    Pong { timestamp: u64, server_time: i64 },
    Error(ServerError),
}

/// Client-side session with one server.
#[derive(Debug, Clone)]
pub struct RoomClient {
    capabilities: Capabilities,
    state: ClientState,
    rooms: Vec<RoomSummary>,
    mirror: RoomMirror,
    roll_locked: bool,
}

impl RoomClient {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            state: ClientState::Lobby,
            rooms: Vec::new(),
            mirror: RoomMirror::default(),
            roll_locked: false,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Lobby as last broadcast.
    pub fn rooms(&self) -> &[RoomSummary] {
        &self.rooms
    }

    pub fn mirror(&self) -> &RoomMirror {
        &self.mirror
    }

    /// Whether the roll button is locked.
    pub fn roll_locked(&self) -> bool {
        self.roll_locked
    }

    fn in_room(&self) -> bool {
        matches!(self.state, ClientState::InRoom { .. })
    }

    // =========================================================================
    // Outgoing
    // =========================================================================

    pub fn create_room(&self, room_name: &str, password: &str) -> ClientMessage {
        ClientMessage::CreateRoom {
            room_name: room_name.trim().to_string(),
            password: password.to_string(),
        }
    }

    pub fn join_room(&mut self, room_name: &str, password: &str) -> ClientMessage {
        let room = room_name.trim().to_string();
        self.state = ClientState::Joining { room: room.clone() };
        ClientMessage::JoinRoom { room_name: room, password: password.to_string() }
    }

    /// `None` when not in or joining a room.
    pub fn leave_room(&mut self) -> Option<ClientMessage> {
        if self.state == ClientState::Lobby {
            return None;
        }
        self.state = ClientState::Lobby;
        self.roll_locked = false;
        Some(ClientMessage::LeaveRoom)
    }

    /// Propose a notation. Malformed input is caught here and not sent.
    pub fn propose_notation(&self, notation: &str) -> Option<ClientMessage> {
        if !self.in_room() || !self.capabilities.can_edit_dice {
            return None;
        }
        let parsed = DiceNotation::parse(notation);
        if parsed.error {
            debug!(notation, "not proposing malformed notation");
            return None;
        }
        Some(ClientMessage::SetNotation { notation: parsed.to_string() })
    }

    pub fn propose_dice_set(&self, dice: Vec<DieDescriptor>) -> Option<ClientMessage> {
        if !self.in_room() || !self.capabilities.can_edit_dice {
            return None;
        }
        Some(ClientMessage::SetDiceSet { dice })
    }

    pub fn propose_appearance(&self, appearance: Appearance) -> Option<ClientMessage> {
        if !self.in_room() || !self.capabilities.can_edit_appearance {
            return None;
        }
        appearance.validate().ok()?;
        Some(ClientMessage::SetAppearance { appearance })
    }

    pub fn propose_preset(&self, preset: PhysicsPreset) -> Option<ClientMessage> {
        if !self.in_room() || !self.capabilities.can_edit_appearance {
            return None;
        }
        Some(ClientMessage::SetPhysicsPreset { preset })
    }

    /// Ask for a roll, locking the button until `enable_roll`.
    ///
    /// The lock is only a first check; the server drops duplicates anyway.
    pub fn request_roll(&mut self, vector: Option<ThrowVector>) -> Option<ClientMessage> {
        if !self.in_room() || self.roll_locked || self.mirror.dice.is_empty() {
            return None;
        }
        let vector = vector.filter(ThrowVector::is_usable);
        self.roll_locked = true;
        Some(ClientMessage::RequestRoll { vector })
    }

    // =========================================================================
    // Incoming
    // =========================================================================

    /// Apply a server message. Broadcast state always replaces local state.
    pub fn handle(&mut self, message: ServerMessage) -> ClientEvent {
        match message {
            ServerMessage::RoomList { rooms } => {
                self.rooms = rooms;
                ClientEvent::RoomsChanged
            }
            ServerMessage::CreateSuccess { room_name } => ClientEvent::Created { room: room_name },
            ServerMessage::CreateError { message } => ClientEvent::Rejected { message },
            ServerMessage::RoomNotFound => {
                self.state = ClientState::Lobby;
                ClientEvent::RoomNotFound
            }
            ServerMessage::JoinError { message } => {
                self.state = ClientState::Lobby;
                ClientEvent::Rejected { message }
            }
            ServerMessage::NotationUpdate { notation } => {
                self.mirror.notation = notation;
                self.state_received()
            }
            ServerMessage::DiceSetUpdate { dice } => {
                self.mirror.dice = dice;
                self.state_received()
            }
            ServerMessage::AppearanceUpdate(appearance) => {
                self.mirror.appearance = appearance;
                self.state_received()
            }
            ServerMessage::PhysicsPresetUpdate { preset } => {
                self.mirror.preset = preset;
                self.state_received()
            }
            ServerMessage::NewRoll(roll) => {
                self.roll_locked = true;
                ClientEvent::RollStarted { outcome: roll.result, vector: roll.vector }
            }
            ServerMessage::PlayRollSound => ClientEvent::PlaySound,
            ServerMessage::StartCooldown { duration_ms } => {
                self.roll_locked = true;
                ClientEvent::CooldownStarted(Duration::from_millis(duration_ms))
            }
            ServerMessage::EnableRoll => {
                self.roll_locked = false;
                ClientEvent::RollEnabled
            }
            ServerMessage::UserJoined { message } | ServerMessage::UserLeft { message } => {
                ClientEvent::Presence { message }
            }
            ServerMessage::Pong { timestamp, server_time } => ClientEvent::Pong { timestamp, server_time },
            ServerMessage::Error(error) => {
                if error.code == ErrorCode::NotInRoom {
                    self.state = ClientState::Lobby;
                    self.roll_locked = false;
                }
                ClientEvent::Error(error)
            }
        }
    }

    /// First state message after a join confirms it.
    fn state_received(&mut self) -> ClientEvent {
        if let ClientState::Joining { room } = &self.state {
            let room = room.clone();
            info!(room = %room, "joined");
            self.state = ClientState::InRoom { room: room.clone() };
            self.roll_locked = false;
            return ClientEvent::Joined { room };
        }
        ClientEvent::StateChanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::DieKind;
    use crate::network::protocol::RollBroadcast;
    use chrono::Utc;

    fn joined(capabilities: Capabilities) -> RoomClient {
        let mut client = RoomClient::new(capabilities);
        client.join_room(" table1 ", "");
        assert_eq!(client.state(), &ClientState::Joining { room: "table1".into() });
        let event = client.handle(ServerMessage::NotationUpdate { notation: "1d6".into() });
        assert_eq!(event, ClientEvent::Joined { room: "table1".into() });
        client.handle(ServerMessage::DiceSetUpdate { dice: vec![DieDescriptor::new(DieKind::D6)] });
        client
    }

    #[test]
    fn test_participant_cannot_propose_edits() {
        let client = joined(Capabilities::participant());
        assert!(client.propose_notation("2d6").is_none());
        assert!(client.propose_dice_set(vec![]).is_none());
        assert!(client.propose_appearance(Appearance::default()).is_none());
        assert!(client.propose_preset(PhysicsPreset::Moon).is_none());
    }

    #[test]
    fn test_host_proposals_are_not_applied_locally() {
        let client = joined(Capabilities::host());
        let message = client.propose_notation("2D6 + 3").unwrap();
        assert_eq!(message, ClientMessage::SetNotation { notation: "2d6+3".into() });
        assert_eq!(client.mirror().notation, "1d6");
        assert!(client.propose_notation("2x6").is_none());
        assert!(client.propose_preset(PhysicsPreset::Ice).is_some());
    }

    #[test]
    fn test_proposals_need_a_room() {
        let client = RoomClient::new(Capabilities::host());
        assert!(client.propose_notation("1d20").is_none());
    }

    #[test]
    fn test_roll_lock_cycle() {
        let mut client = joined(Capabilities::participant());
        assert!(client.request_roll(Some(ThrowVector { x: 3.0, y: 1.0 })).is_some());
        assert!(client.roll_locked());
        assert!(client.request_roll(None).is_none());

        let outcome = RollOutcome::from_values(vec![DieKind::D6], 0, vec![4]);
        let event = client.handle(ServerMessage::NewRoll(RollBroadcast {
            result: outcome.clone(),
            vector: None,
            rolled_at: Utc::now(),
        }));
        assert_eq!(event, ClientEvent::RollStarted { outcome, vector: None });
        assert_eq!(
            client.handle(ServerMessage::StartCooldown { duration_ms: 3000 }),
            ClientEvent::CooldownStarted(Duration::from_secs(3))
        );
        assert!(client.roll_locked());

        assert_eq!(client.handle(ServerMessage::EnableRoll), ClientEvent::RollEnabled);
        assert!(!client.roll_locked());
        assert!(client.request_roll(None).is_some());
    }

    #[test]
    fn test_zero_gesture_is_not_sent() {
        let mut client = joined(Capabilities::participant());
        let message = client.request_roll(Some(ThrowVector { x: 0.0, y: 0.0 }));
        assert_eq!(message, Some(ClientMessage::RequestRoll { vector: None }));
    }

    #[test]
    fn test_roll_needs_dice() {
        let mut client = joined(Capabilities::host());
        client.handle(ServerMessage::DiceSetUpdate { dice: vec![] });
        assert!(client.request_roll(None).is_none());
        assert!(!client.roll_locked());
    }

    #[test]
    fn test_broadcast_overwrites_mirror() {
        let mut client = joined(Capabilities::host());
        let event = client.handle(ServerMessage::PhysicsPresetUpdate { preset: PhysicsPreset::Jupiter });
        assert_eq!(event, ClientEvent::StateChanged);
        assert_eq!(client.mirror().preset, PhysicsPreset::Jupiter);

        let appearance = Appearance { scale: 60.0, ..Appearance::default() };
        client.handle(ServerMessage::AppearanceUpdate(appearance.clone()));
        assert_eq!(client.mirror().appearance, appearance);
    }

    #[test]
    fn test_join_refusals_return_to_lobby() {
        let mut client = RoomClient::new(Capabilities::participant());
        client.join_room("nowhere", "");
        assert_eq!(client.handle(ServerMessage::RoomNotFound), ClientEvent::RoomNotFound);
        assert_eq!(client.state(), &ClientState::Lobby);

        client.join_room("locked", "guess");
        let event = client.handle(ServerMessage::JoinError { message: "Incorrect password".into() });
        assert!(matches!(event, ClientEvent::Rejected { .. }));
        assert_eq!(client.state(), &ClientState::Lobby);
    }

    #[test]
    fn test_leave() {
        let mut client = joined(Capabilities::host());
        assert_eq!(client.leave_room(), Some(ClientMessage::LeaveRoom));
        assert!(client.leave_room().is_none());
        assert!(client.request_roll(None).is_none());
    }

    #[test]
    fn test_lobby_list_is_stored() {
        let mut client = RoomClient::new(Capabilities::participant());
        let rooms = vec![RoomSummary { name: "a".into(), is_private: true }];
        assert_eq!(client.handle(ServerMessage::RoomList { rooms: rooms.clone() }), ClientEvent::RoomsChanged);
        assert_eq!(client.rooms(), rooms.as_slice());
    }
}
