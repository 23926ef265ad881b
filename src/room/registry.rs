//! Room Registry
//!
//! Owns every room and every live connection's outbox. All room state is
//! mutated here and nowhere else; the server wraps one registry in a lock
//! and hands it each decoded message in turn, so a message is fully
//! applied (and its broadcasts queued) before the next one is looked at.
//!
//! ## Timers
//!
//! The registry never sleeps. Operations that need something to happen
//! later (deleting an emptied room, re-opening the roll latch) return a
//! [`Scheduled`] ticket; the caller waits `after` and hands the timer back
//! through [`RoomRegistry::fire`]. Each timer carries the generation it was
//! armed with, and fires only if the room still holds that generation, so
//! a rejoin or a deleted room turns a stale timer into a no-op.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::core::rng::RandomSource;
use crate::dice::{self, DiceNotation, NotationError};
use crate::network::password;
use crate::network::protocol::{
    ClientMessage, ServerMessage, ErrorCode, RoomSummary, RollBroadcast, ThrowVector,
};
use super::state::{
    Appearance, ConnectionId, DiceConfiguration, DiceSetError, DieDescriptor, PhysicsPreset, Room,
};

/// Longest accepted room name, in characters.
pub const MAX_ROOM_NAME_LEN: usize = 64;

/// Tunables for the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long an empty room survives before deletion.
    pub grace_period: Duration,
    /// How long the roll latch stays closed after an accepted roll.
    pub roll_cooldown: Duration,
    /// Live connection limit.
    pub max_connections: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(5000),
            roll_cooldown: Duration::from_millis(3000),
            max_connections: 1000,
        }
    }
}

/// Reasons a request is refused. Each maps to one reply for the requester.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("room name must not be empty")]
    EmptyName,
    #[error("room name must be at most {0} characters")]
    NameTooLong(usize),
    #[error("room {0:?} already exists")]
    NameTaken(String),
    #[error("room not found")]
    RoomNotFound,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("join a room first")]
    NotInRoom,
    #[error(transparent)]
    InvalidNotation(#[from] NotationError),
    #[error(transparent)]
    InvalidDiceSet(#[from] DiceSetError),
    #[error("invalid appearance: {0}")]
    InvalidAppearance(String),
    #[error("server is full ({0} connections)")]
    ServerFull(usize),
}

impl RegistryError {
    /// The reply sent to the connection whose request failed.
    pub fn to_message(&self) -> ServerMessage {
        let message = self.to_string();
        match self {
            RegistryError::EmptyName
            | RegistryError::NameTooLong(_)
            | RegistryError::NameTaken(_) => ServerMessage::CreateError { message },
            RegistryError::RoomNotFound => ServerMessage::RoomNotFound,
            RegistryError::IncorrectPassword => ServerMessage::JoinError { message },
            RegistryError::NotInRoom => ServerMessage::error(ErrorCode::NotInRoom, message),
            RegistryError::InvalidNotation(_) => {
                ServerMessage::error(ErrorCode::InvalidNotation, message)
            }
            RegistryError::InvalidDiceSet(_) => {
                ServerMessage::error(ErrorCode::InvalidDiceSet, message)
            }
            RegistryError::InvalidAppearance(_) => {
                ServerMessage::error(ErrorCode::InvalidAppearance, message)
            }
            RegistryError::ServerFull(_) => {
                ServerMessage::error(ErrorCode::ServerOverloaded, message)
            }
        }
    }
}

/// Deferred registry work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timer {
    /// Delete `room` if it is still empty under the same drain generation.
    DrainRoom { room: String, generation: u64 },
    /// Re-open the roll latch of `room` if it is still held by `generation`.
    ReleaseRoll { room: String, generation: u64 },
}

/// A timer to fire after a delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub after: Duration,
    pub timer: Timer,
}

struct Connection {
    /// Dropped when the client stops keeping up, which closes its socket.
    outbox: Option<mpsc::Sender<ServerMessage>>,
    room: Option<String>,
    connected_at: DateTime<Utc>,
}

/// In-memory registry of rooms and connections.
pub struct RoomRegistry {
    config: RegistryConfig,
    rooms: BTreeMap<String, Room>,
    connections: BTreeMap<ConnectionId, Connection>,
    next_generation: u64,
    rng: Box<dyn RandomSource>,
}

impl RoomRegistry {
    /// Create an empty registry drawing roll results from `rng`.
    pub fn new(config: RegistryConfig, rng: Box<dyn RandomSource>) -> Self {
        Self {
            config,
            rooms: BTreeMap::new(),
            connections: BTreeMap::new(),
            next_generation: 0,
            rng,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Room a connection is currently joined to.
    pub fn room_of(&self, conn: ConnectionId) -> Option<&str> {
        self.connections.get(&conn).and_then(|c| c.room.as_deref())
    }

    /// Lobby view: every room with its privacy flag.
    pub fn room_summaries(&self) -> Vec<RoomSummary> {
        self.rooms
            .values()
            .map(|room| RoomSummary {
                name: room.name.clone(),
                is_private: room.is_private(),
            })
            .collect()
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Register a connection and send it the lobby.
    pub fn connect(
        &mut self,
        conn: ConnectionId,
        outbox: mpsc::Sender<ServerMessage>,
    ) -> Result<(), RegistryError> {
        if self.connections.len() >= self.config.max_connections {
            return Err(RegistryError::ServerFull(self.config.max_connections));
        }
        self.connections.insert(conn, Connection {
            outbox: Some(outbox),
            room: None,
            connected_at: Utc::now(),
        });
        info!(%conn, total = self.connections.len(), "connection registered");
        let rooms = self.room_summaries();
        self.send(conn, ServerMessage::RoomList { rooms });
        Ok(())
    }

    /// Drop a connection, leaving its room.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Vec<Scheduled> {
        let scheduled = self.leave_room(conn);
        if let Some(c) = self.connections.remove(&conn) {
            let lifetime = Utc::now() - c.connected_at;
            info!(%conn, secs = lifetime.num_seconds(), "connection closed");
        }
        scheduled
    }

    /// Handle one client message. Failures are answered to `conn` only.
    pub fn dispatch(&mut self, conn: ConnectionId, msg: ClientMessage) -> Vec<Scheduled> {
        let kind = msg.kind();
        let result = match msg {
            ClientMessage::CreateRoom { room_name, password } => {
                self.create_room(conn, &room_name, &password)
            }
            ClientMessage::JoinRoom { room_name, password } => {
                self.join_room(conn, &room_name, &password)
            }
            ClientMessage::LeaveRoom => Ok(self.leave_room(conn)),
            ClientMessage::SetNotation { notation } => {
                self.set_notation(conn, &notation).map(|()| Vec::new())
            }
            ClientMessage::SetDiceSet { dice } => {
                self.set_dice_set(conn, dice).map(|()| Vec::new())
            }
            ClientMessage::SetAppearance { appearance } => {
                self.set_appearance(conn, appearance).map(|()| Vec::new())
            }
            ClientMessage::SetPhysicsPreset { preset } => {
                self.set_physics_preset(conn, preset).map(|()| Vec::new())
            }
            ClientMessage::RequestRoll { vector } => Ok(self.request_roll(conn, vector)),
            ClientMessage::Ping { timestamp } => {
                self.send(conn, ServerMessage::Pong {
                    timestamp,
                    server_time: Utc::now().timestamp_millis(),
                });
                Ok(Vec::new())
            }
        };

        match result {
            Ok(scheduled) => scheduled,
            Err(err) => {
                debug!(%conn, request = kind, error = %err, "request rejected");
                self.send(conn, err.to_message());
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Room lifecycle
    // =========================================================================

    /// Create a room. It starts empty with its drain timer armed.
    pub fn create_room(
        &mut self,
        conn: ConnectionId,
        room_name: &str,
        password: &str,
    ) -> Result<Vec<Scheduled>, RegistryError> {
        let name = validate_room_name(room_name)?;
        if self.rooms.contains_key(&name) {
            return Err(RegistryError::NameTaken(name));
        }

        let generation = self.next_generation();
        let mut room = Room::new(name.clone(), password::digest(&name, password));
        room.drain = Some(generation);
        info!(room = %name, private = room.is_private(), "room created");
        self.rooms.insert(name.clone(), room);

        self.send(conn, ServerMessage::CreateSuccess { room_name: name.clone() });
        self.broadcast_room_list();

        Ok(vec![Scheduled {
            after: self.config.grace_period,
            timer: Timer::DrainRoom { room: name, generation },
        }])
    }

    /// Join a room, leaving any other room first.
    ///
    /// The joiner receives the full room state; existing members only get a
    /// presence notice.
    pub fn join_room(
        &mut self,
        conn: ConnectionId,
        room_name: &str,
        password: &str,
    ) -> Result<Vec<Scheduled>, RegistryError> {
        let name = room_name.trim();
        let room = self.rooms.get(name).ok_or(RegistryError::RoomNotFound)?;
        if !password::verify(room.password_digest.as_deref(), name, password) {
            return Err(RegistryError::IncorrectPassword);
        }

        let mut scheduled = Vec::new();
        if self.room_of(conn).is_some_and(|current| current != name) {
            scheduled = self.leave_room(conn);
        }

        let room = self.rooms.get_mut(name).ok_or(RegistryError::RoomNotFound)?;
        room.drain = None;
        let added = room.add_user(conn);
        let snapshot = state_messages(room);
        let others: Vec<ConnectionId> =
            room.users.iter().copied().filter(|u| *u != conn).collect();
        let members = room.users.len();

        if let Some(c) = self.connections.get_mut(&conn) {
            c.room = Some(name.to_string());
        }
        for msg in snapshot {
            self.send(conn, msg);
        }
        if added {
            info!(room = %name, %conn, members, "user joined");
            for other in others {
                self.send(other, ServerMessage::UserJoined {
                    message: "A user joined the room.".to_string(),
                });
            }
        }
        Ok(scheduled)
    }

    /// Leave the current room, arming its drain timer if it empties.
    pub fn leave_room(&mut self, conn: ConnectionId) -> Vec<Scheduled> {
        let Some(name) = self.connections.get_mut(&conn).and_then(|c| c.room.take()) else {
            return Vec::new();
        };
        let generation = self.next_generation();
        let Some(room) = self.rooms.get_mut(&name) else {
            return Vec::new();
        };
        if !room.remove_user(conn) {
            return Vec::new();
        }

        let remaining = room.users.clone();
        let emptied = remaining.is_empty();
        if emptied {
            room.drain = Some(generation);
        }
        info!(room = %name, %conn, members = remaining.len(), "user left");

        for other in remaining {
            self.send(other, ServerMessage::UserLeft {
                message: "A user left the room.".to_string(),
            });
        }

        if emptied {
            debug!(room = %name, generation, "room empty, drain armed");
            vec![Scheduled {
                after: self.config.grace_period,
                timer: Timer::DrainRoom { room: name, generation },
            }]
        } else {
            Vec::new()
        }
    }

    // =========================================================================
    // Room mutation
    // =========================================================================

    /// Replace the room's dice from a notation string.
    pub fn set_notation(&mut self, conn: ConnectionId, text: &str) -> Result<(), RegistryError> {
        let name = self.member_room(conn)?;
        let notation = DiceNotation::parse_strict(text)?;
        let room = self.rooms.get_mut(&name).ok_or(RegistryError::RoomNotFound)?;
        room.apply_notation(notation);
        debug!(room = %name, notation = %room.notation, "notation set");
        let msgs = dice_messages(room);
        self.broadcast(&name, msgs);
        Ok(())
    }

    /// Replace the room's dice descriptors.
    pub fn set_dice_set(
        &mut self,
        conn: ConnectionId,
        dice: Vec<DieDescriptor>,
    ) -> Result<(), RegistryError> {
        let name = self.member_room(conn)?;
        let proposed = DiceConfiguration { dice };
        let room = self.rooms.get_mut(&name).ok_or(RegistryError::RoomNotFound)?;
        room.dice.validate_replacement(&proposed)?;
        room.apply_dice(proposed);
        debug!(room = %name, notation = %room.notation, "dice set replaced");
        let msgs = dice_messages(room);
        self.broadcast(&name, msgs);
        Ok(())
    }

    /// Replace the room's appearance.
    pub fn set_appearance(
        &mut self,
        conn: ConnectionId,
        appearance: Appearance,
    ) -> Result<(), RegistryError> {
        let name = self.member_room(conn)?;
        appearance.validate().map_err(RegistryError::InvalidAppearance)?;
        let room = self.rooms.get_mut(&name).ok_or(RegistryError::RoomNotFound)?;
        room.appearance = appearance.clone();
        self.broadcast(&name, vec![ServerMessage::AppearanceUpdate(appearance)]);
        Ok(())
    }

    /// Select the room's physics preset.
    pub fn set_physics_preset(
        &mut self,
        conn: ConnectionId,
        preset: PhysicsPreset,
    ) -> Result<(), RegistryError> {
        let name = self.member_room(conn)?;
        let room = self.rooms.get_mut(&name).ok_or(RegistryError::RoomNotFound)?;
        room.preset = preset;
        debug!(room = %name, ?preset, "physics preset set");
        self.broadcast(&name, vec![ServerMessage::PhysicsPresetUpdate { preset }]);
        Ok(())
    }

    // =========================================================================
    // Rolling
    // =========================================================================

    /// Roll the room's dice if its latch is open.
    ///
    /// Requests that cannot be honoured are dropped without a reply: the
    /// requester is not in a room, a roll is already in flight, or there is
    /// nothing to roll.
    pub fn request_roll(
        &mut self,
        conn: ConnectionId,
        vector: Option<ThrowVector>,
    ) -> Vec<Scheduled> {
        let Ok(name) = self.member_room(conn) else {
            debug!(%conn, "roll dropped, not in a room");
            return Vec::new();
        };
        let generation = self.next_generation();
        let Some(room) = self.rooms.get_mut(&name) else {
            return Vec::new();
        };
        if room.is_rolling() {
            debug!(room = %name, %conn, "roll dropped, already rolling");
            return Vec::new();
        }
        if room.notation.set.is_empty() {
            debug!(room = %name, %conn, "roll dropped, no dice");
            return Vec::new();
        }

        let outcome = dice::evaluate(&room.notation, self.rng.as_mut());
        // Latch closes in the same turn as the check.
        room.rolling = Some(generation);
        info!(room = %name, %conn, result = %outcome.result_string, "roll accepted");

        let cooldown = self.config.roll_cooldown;
        self.broadcast(&name, vec![
            ServerMessage::NewRoll(RollBroadcast {
                result: outcome,
                vector: vector.filter(ThrowVector::is_usable),
                rolled_at: Utc::now(),
            }),
            ServerMessage::PlayRollSound,
            ServerMessage::StartCooldown {
                duration_ms: u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX),
            },
        ]);

        vec![Scheduled {
            after: cooldown,
            timer: Timer::ReleaseRoll { room: name, generation },
        }]
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Run a timer previously returned as [`Scheduled`].
    pub fn fire(&mut self, timer: Timer) {
        match timer {
            Timer::DrainRoom { room, generation } => {
                let still_empty = self
                    .rooms
                    .get(&room)
                    .is_some_and(|r| r.drain == Some(generation) && r.users.is_empty());
                if !still_empty {
                    debug!(%room, generation, "stale drain timer");
                    return;
                }
                self.rooms.remove(&room);
                info!(%room, "room deleted");
                self.broadcast_room_list();
            }
            Timer::ReleaseRoll { room, generation } => {
                let Some(r) = self.rooms.get_mut(&room) else {
                    debug!(%room, "roll release for deleted room");
                    return;
                };
                if r.rolling != Some(generation) {
                    return;
                }
                r.rolling = None;
                debug!(%room, "roll latch released");
                self.broadcast(&room, vec![ServerMessage::EnableRoll]);
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Name of the live room `conn` is joined to.
    fn member_room(&self, conn: ConnectionId) -> Result<String, RegistryError> {
        match self.room_of(conn) {
            Some(name) if self.rooms.contains_key(name) => Ok(name.to_string()),
            _ => Err(RegistryError::NotInRoom),
        }
    }

    /// Queue `msg` for `conn`.
    ///
    /// A connection whose outbox is full loses its outbox instead of the
    /// message: the socket task then closes and the normal disconnect path
    /// removes it from its room.
    fn send(&mut self, conn: ConnectionId, msg: ServerMessage) {
        let Some(c) = self.connections.get_mut(&conn) else {
            return;
        };
        let Some(outbox) = &c.outbox else {
            return;
        };
        match outbox.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(%conn, "outbox full, disconnecting slow client");
                c.outbox = None;
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%conn, "outbox closed");
                c.outbox = None;
            }
        }
    }

    /// Send `msgs` in order to every member of `room`.
    fn broadcast(&mut self, room: &str, msgs: Vec<ServerMessage>) {
        let Some(r) = self.rooms.get(room) else {
            return;
        };
        let members = r.users.clone();
        for member in members {
            for msg in &msgs {
                self.send(member, msg.clone());
            }
        }
    }

    fn broadcast_room_list(&mut self) {
        let rooms = self.room_summaries();
        let conns: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for conn in conns {
            self.send(conn, ServerMessage::RoomList { rooms: rooms.clone() });
        }
    }

    /// Answer a frame that could not be decoded.
    pub fn reject_frame(&mut self, conn: ConnectionId) {
        self.send(conn, ServerMessage::error(ErrorCode::InvalidInput, "Invalid message format"));
    }
}

fn validate_room_name(raw: &str) -> Result<String, RegistryError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if name.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(RegistryError::NameTooLong(MAX_ROOM_NAME_LEN));
    }
    Ok(name.to_string())
}

fn dice_messages(room: &Room) -> Vec<ServerMessage> {
    vec![
        ServerMessage::NotationUpdate { notation: room.notation.to_string() },
        ServerMessage::DiceSetUpdate { dice: room.dice.dice.clone() },
    ]
}

fn state_messages(room: &Room) -> Vec<ServerMessage> {
    let mut msgs = dice_messages(room);
    msgs.push(ServerMessage::AppearanceUpdate(room.appearance.clone()));
    msgs.push(ServerMessage::PhysicsPresetUpdate { preset: room.preset });
    msgs
}
