//! Room State
//!
//! The authoritative per-room data owned by the registry: dice
//! configuration, appearance, physics preset, membership and the two
//! timer latches (roll cooldown and empty-room drain).

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::dice::{DieKind, DiceNotation};

/// Opaque identifier of one websocket connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell connections apart in logs.
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

// =============================================================================
// Dice configuration
// =============================================================================

/// Optional per-channel texture references for a die.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DieTextures {
    #[serde(default)]
    pub albedo: Option<String>,
    #[serde(default)]
    pub metalness: Option<String>,
    #[serde(default)]
    pub roughness: Option<String>,
    #[serde(default)]
    pub normal: Option<String>,
}

/// One die in a room's configuration.
///
/// `id` and `kind` are fixed for the life of the die; the cosmetic fields
/// may be replaced by any member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DieDescriptor {
    /// Stable identity.
    pub id: String,
    /// Die type. Never reassigned.
    #[serde(rename = "type")]
    pub kind: DieKind,
    /// Body color (CSS hex).
    pub dice_color: String,
    /// Label color (CSS hex).
    pub label_color: String,
    pub metalness: f64,
    pub roughness: f64,
    #[serde(default)]
    pub texture: DieTextures,
}

impl DieDescriptor {
    /// A die of the given type with default cosmetics and a fresh id.
    pub fn new(kind: DieKind) -> Self {
        Self {
            id: format!("{}-{}", kind, Uuid::new_v4().simple()),
            kind,
            dice_color: "#cccccc".to_string(),
            label_color: "#222222".to_string(),
            metalness: 0.2,
            roughness: 0.8,
            texture: DieTextures::default(),
        }
    }
}

/// Why a proposed dice set was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiceSetError {
    #[error("duplicate die id {0}")]
    DuplicateId(String),
    #[error("die {id} cannot change type from {from} to {to}")]
    TypeChanged { id: String, from: DieKind, to: DieKind },
    #[error("a dice set may hold at most {max} dice")]
    TooMany { max: usize },
}

/// Ordered dice descriptors, kept consistent with the room's notation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiceConfiguration {
    pub dice: Vec<DieDescriptor>,
}

impl DiceConfiguration {
    /// Build the configuration for `notation`, reusing descriptors from
    /// `self` whose type matches, in order. Missing dice get defaults.
    pub fn rebuilt_for(&self, notation: &DiceNotation) -> Self {
        let mut pool: Vec<Option<&DieDescriptor>> = self.dice.iter().map(Some).collect();
        let dice = notation
            .set
            .iter()
            .map(|kind| {
                pool.iter_mut()
                    .find(|slot| matches!(slot, Some(d) if d.kind == *kind))
                    .and_then(Option::take)
                    .cloned()
                    .unwrap_or_else(|| DieDescriptor::new(*kind))
            })
            .collect();
        Self { dice }
    }

    /// Notation describing this configuration with the given constant.
    pub fn to_notation(&self, constant: i32) -> DiceNotation {
        DiceNotation::new(self.kinds(), constant)
    }

    /// Die types in order.
    pub fn kinds(&self) -> Vec<DieKind> {
        self.dice.iter().map(|d| d.kind).collect()
    }

    /// Check that `proposed` may replace `self`.
    pub fn validate_replacement(&self, proposed: &DiceConfiguration) -> Result<(), DiceSetError> {
        if proposed.dice.len() > crate::dice::MAX_DICE {
            return Err(DiceSetError::TooMany { max: crate::dice::MAX_DICE });
        }
        let mut seen = BTreeSet::new();
        for die in &proposed.dice {
            if !seen.insert(die.id.as_str()) {
                return Err(DiceSetError::DuplicateId(die.id.clone()));
            }
            if let Some(existing) = self.dice.iter().find(|d| d.id == die.id) {
                if existing.kind != die.kind {
                    return Err(DiceSetError::TypeChanged {
                        id: die.id.clone(),
                        from: existing.kind,
                        to: die.kind,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.dice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dice.is_empty()
    }
}

// =============================================================================
// Appearance & physics
// =============================================================================

/// Shared look of the dice tray.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub background_color: String,
    #[serde(default)]
    pub background_image: Option<String>,
    #[serde(default)]
    pub use_builtin_background: bool,
    /// Die size in world units.
    pub scale: f64,
    /// Simulation speed multiplier.
    pub simulation_speed: f64,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            background_color: "#212121".to_string(),
            background_image: None,
            use_builtin_background: false,
            scale: 100.0,
            simulation_speed: 1.0,
        }
    }
}

impl Appearance {
    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(format!("scale must be positive, got {}", self.scale));
        }
        if !(self.simulation_speed.is_finite() && self.simulation_speed > 0.0) {
            return Err(format!(
                "simulation speed must be positive, got {}",
                self.simulation_speed
            ));
        }
        Ok(())
    }
}

/// Named physics constant set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicsPreset {
    #[default]
    Normal,
    Moon,
    Jupiter,
    Ice,
    Bouncy,
}

/// Gravity is given in m/s² and scaled into world units.
pub const GRAVITY_SCALE: f64 = 800.0;

/// Contact constants selected by a preset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicsConstants {
    /// Vertical acceleration, already scaled to world units.
    pub gravity: f64,
    pub friction: f64,
    pub restitution: f64,
}

impl PhysicsPreset {
    pub const ALL: [PhysicsPreset; 5] = [
        PhysicsPreset::Normal,
        PhysicsPreset::Moon,
        PhysicsPreset::Jupiter,
        PhysicsPreset::Ice,
        PhysicsPreset::Bouncy,
    ];

    pub fn constants(self) -> PhysicsConstants {
        let (mut gravity, mut friction, mut restitution) = (-9.8, 0.1, 0.7);
        match self {
            PhysicsPreset::Normal => {}
            PhysicsPreset::Moon => gravity = -1.6,
            PhysicsPreset::Jupiter => gravity = -24.8,
            PhysicsPreset::Ice => friction = 0.0,
            PhysicsPreset::Bouncy => restitution = 1.1,
        }
        PhysicsConstants {
            gravity: gravity * GRAVITY_SCALE,
            friction,
            restitution,
        }
    }
}

// =============================================================================
// Room
// =============================================================================

/// One room as held by the registry.
#[derive(Clone, Debug)]
pub struct Room {
    pub name: String,
    /// Salted digest of the room password. Private iff present.
    pub password_digest: Option<String>,
    /// Joined connections in join order.
    pub users: Vec<ConnectionId>,
    pub notation: DiceNotation,
    pub dice: DiceConfiguration,
    pub appearance: Appearance,
    pub preset: PhysicsPreset,
    /// Ticket of the outstanding roll. `Some` means the latch is closed.
    pub rolling: Option<u64>,
    /// Ticket of the armed drain timer while the room is empty.
    pub drain: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle phase of a live room.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomPhase {
    /// At least one member.
    Active,
    /// No members, deletion timer armed.
    Draining,
}

impl Room {
    /// A fresh room with default dice, appearance and preset.
    pub fn new(name: String, password_digest: Option<String>) -> Self {
        let notation = DiceNotation::new(vec![DieKind::D6], 0);
        let dice = DiceConfiguration::default().rebuilt_for(&notation);
        Self {
            name,
            password_digest,
            users: Vec::new(),
            notation,
            dice,
            appearance: Appearance::default(),
            preset: PhysicsPreset::default(),
            rolling: None,
            drain: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_private(&self) -> bool {
        self.password_digest.is_some()
    }

    pub fn is_rolling(&self) -> bool {
        self.rolling.is_some()
    }

    pub fn phase(&self) -> RoomPhase {
        if self.users.is_empty() {
            RoomPhase::Draining
        } else {
            RoomPhase::Active
        }
    }

    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.users.contains(&conn)
    }

    /// Add a member. Returns false if already present.
    pub fn add_user(&mut self, conn: ConnectionId) -> bool {
        if self.contains(conn) {
            return false;
        }
        self.users.push(conn);
        true
    }

    /// Remove a member. Returns false if absent.
    pub fn remove_user(&mut self, conn: ConnectionId) -> bool {
        let before = self.users.len();
        self.users.retain(|u| *u != conn);
        self.users.len() != before
    }

    /// Replace the notation and rebuild the dice to match.
    pub fn apply_notation(&mut self, notation: DiceNotation) {
        self.dice = self.dice.rebuilt_for(&notation);
        self.notation = DiceNotation::new(notation.set, notation.constant);
    }

    /// Replace the dice and re-derive the notation, keeping the constant.
    pub fn apply_dice(&mut self, dice: DiceConfiguration) {
        self.notation = dice.to_notation(self.notation.constant);
        self.dice = dice;
    }
}
