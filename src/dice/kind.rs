//! Die Types
//!
//! The fixed set of supported dice and everything that depends only on the
//! type: value range, face count, physical constants, and the mapping
//! between a rolled value and the face ordinal that carries its label.

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};

/// A supported die type.
///
/// Ordering follows the canonical notation order (`d4` first).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DieKind {
    /// Tetrahedron, value read from the top vertex.
    D4,
    /// Cube.
    D6,
    /// Octahedron.
    D8,
    /// Ten faces labelled 0..9.
    D9,
    /// Ten faces, the "0" face counts as 10.
    D10,
    /// Dodecahedron.
    D12,
    /// Icosahedron.
    D20,
    /// Ten faces labelled 00..90, the tens die of a percentile pair.
    D100,
}

/// How face ordinals relate to values for a die type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceLabelling {
    /// Face `n` shows value `n`.
    OneBased,
    /// Face `n` shows value `n - 1`.
    ZeroBased,
    /// Face `n` shows `n - 1`, and the `0` face is read as 10.
    ZeroAsTen,
    /// Face `n` shows `(n - 1) * 10`.
    Tens,
}

impl DieKind {
    /// Every supported type, in canonical order.
    pub const ALL: [DieKind; 8] = [
        DieKind::D4,
        DieKind::D6,
        DieKind::D8,
        DieKind::D9,
        DieKind::D10,
        DieKind::D12,
        DieKind::D20,
        DieKind::D100,
    ];

    /// Look up a type by its side count as written in notation (`6` for `d6`).
    pub fn from_sides(sides: u32) -> Option<Self> {
        match sides {
            4 => Some(DieKind::D4),
            6 => Some(DieKind::D6),
            8 => Some(DieKind::D8),
            9 => Some(DieKind::D9),
            10 => Some(DieKind::D10),
            12 => Some(DieKind::D12),
            20 => Some(DieKind::D20),
            100 => Some(DieKind::D100),
            _ => None,
        }
    }

    /// Side count as written in notation.
    pub fn sides(self) -> u32 {
        match self {
            DieKind::D4 => 4,
            DieKind::D6 => 6,
            DieKind::D8 => 8,
            DieKind::D9 => 9,
            DieKind::D10 => 10,
            DieKind::D12 => 12,
            DieKind::D20 => 20,
            DieKind::D100 => 100,
        }
    }

    /// Number of labelled faces on the physical body.
    pub fn face_count(self) -> u8 {
        match self {
            DieKind::D4 => 4,
            DieKind::D6 => 6,
            DieKind::D8 => 8,
            DieKind::D9 | DieKind::D10 | DieKind::D100 => 10,
            DieKind::D12 => 12,
            DieKind::D20 => 20,
        }
    }

    /// Face labelling scheme.
    pub fn labelling(self) -> FaceLabelling {
        match self {
            DieKind::D4 | DieKind::D6 | DieKind::D8 | DieKind::D12 | DieKind::D20 => {
                FaceLabelling::OneBased
            }
            DieKind::D9 => FaceLabelling::ZeroBased,
            DieKind::D10 => FaceLabelling::ZeroAsTen,
            DieKind::D100 => FaceLabelling::Tens,
        }
    }

    /// Smallest value this die can show.
    pub fn min_value(self) -> i32 {
        match self.labelling() {
            FaceLabelling::OneBased | FaceLabelling::ZeroAsTen => 1,
            FaceLabelling::ZeroBased | FaceLabelling::Tens => 0,
        }
    }

    /// Largest value this die can show.
    pub fn max_value(self) -> i32 {
        match self.labelling() {
            FaceLabelling::OneBased => self.face_count() as i32,
            FaceLabelling::ZeroBased => 9,
            FaceLabelling::ZeroAsTen => 10,
            FaceLabelling::Tens => 90,
        }
    }

    /// Distance between consecutive values (10 for the tens die).
    pub fn value_step(self) -> i32 {
        match self.labelling() {
            FaceLabelling::Tens => 10,
            _ => 1,
        }
    }

    /// Whether `value` is something this die can show.
    pub fn is_valid_value(self, value: i32) -> bool {
        value >= self.min_value()
            && value <= self.max_value()
            && (value - self.min_value()) % self.value_step() == 0
    }

    /// Face ordinal (material index, 1-based) carrying `value`.
    pub fn face_for_value(self, value: i32) -> Option<u8> {
        if !self.is_valid_value(value) {
            return None;
        }
        let face = match self.labelling() {
            FaceLabelling::OneBased => value,
            FaceLabelling::ZeroBased => value + 1,
            FaceLabelling::ZeroAsTen => (value % 10) + 1,
            FaceLabelling::Tens => value / 10 + 1,
        };
        Some(face as u8)
    }

    /// Value shown by face ordinal `face` (1-based). `None` for blank faces.
    pub fn value_for_face(self, face: u8) -> Option<i32> {
        if face == 0 || face > self.face_count() {
            return None;
        }
        let face = face as i32;
        let value = match self.labelling() {
            FaceLabelling::OneBased => face,
            FaceLabelling::ZeroBased => face - 1,
            FaceLabelling::ZeroAsTen => {
                if face == 1 { 10 } else { face - 1 }
            }
            FaceLabelling::Tens => (face - 1) * 10,
        };
        Some(value)
    }

    /// Simulation mass.
    pub fn mass(self) -> f64 {
        match self {
            DieKind::D4 | DieKind::D6 => 300.0,
            DieKind::D8 => 340.0,
            DieKind::D9 | DieKind::D10 | DieKind::D12 | DieKind::D100 => 350.0,
            DieKind::D20 => 400.0,
        }
    }

    /// Inertia factor applied to the initial spin of a throw.
    pub fn inertia(self) -> f64 {
        match self {
            DieKind::D4 => 5.0,
            DieKind::D6 => 13.0,
            DieKind::D8 => 10.0,
            DieKind::D9 | DieKind::D10 | DieKind::D100 => 9.0,
            DieKind::D12 => 8.0,
            DieKind::D20 => 6.0,
        }
    }
}

impl fmt::Display for DieKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Error returned when a string names no known die type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown die type: {0}")]
pub struct UnknownDieKind(pub String);

impl FromStr for DieKind {
    type Err = UnknownDieKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('d')
            .or_else(|| s.strip_prefix('D'))
            .and_then(|sides| sides.parse::<u32>().ok())
            .and_then(DieKind::from_sides)
            .ok_or_else(|| UnknownDieKind(s.to_string()))
    }
}
