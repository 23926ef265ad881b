//! Face Reconciliation
//!
//! A client simulates every roll locally, so the face a die settles on is
//! whatever its own physics produced. The value it must display is the one
//! the server broadcast. Rather than re-simulating until the two agree
//! (which may never happen), the die is relabelled after it settles: its
//! material indices are rotated so the face that ended up on top carries
//! the authoritative label. The body's transform is never touched.
//!
//! ## Read-out
//!
//! The rolled face is the labelled face whose rotated outward normal makes
//! the smallest angle with a reference axis: `+Z` (toward the camera) for
//! every type except the d4, which is read from the face lying on the
//! table (`-Z`) since its value sits on the top vertex.
//!
//! ## Relabelling
//!
//! For faced dice, every labelled material `m` of an `n`-faced die becomes
//! `((m - 1 + delta) mod n) + 1`, where `delta` is the difference between
//! the authoritative and physical face ordinals. The d4 keeps its
//! materials and instead swaps to one of four corner-label permutations,
//! where permutation `k` raises every corner label by `k` (mod 4).

use crate::core::vec3::{Quat, Vec3};
use crate::dice::DieKind;
use super::geometry::DieGeometry;

/// Corner labels of each d4 face under each permutation.
///
/// `D4_CORNER_LABELS[k][m - 1]` lists the labels drawn on the face with
/// material `m`, in texture order. Texture slot `i` lands on the face's
/// vertex at position `2 - i`.
pub const D4_CORNER_LABELS: [[[u8; 3]; 4]; 4] = [
    [[2, 4, 3], [1, 3, 4], [2, 1, 4], [1, 2, 3]],
    [[3, 1, 4], [2, 4, 1], [3, 2, 1], [2, 3, 4]],
    [[4, 2, 1], [3, 1, 2], [4, 3, 2], [3, 4, 1]],
    [[1, 3, 2], [4, 2, 3], [1, 4, 3], [4, 1, 2]],
];

/// Relabelling failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// The value cannot appear on this die type.
    #[error("{kind} cannot show {value}")]
    OutOfRange { kind: DieKind, value: i32 },

    /// Result count differs from die count.
    #[error("expected {expected} results, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Current face labelling of one die.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaceLabels {
    kind: DieKind,
    /// Material index per geometry face.
    materials: Vec<u8>,
    /// Active d4 corner permutation, always 0 for other types.
    d4_shift: u8,
}

impl FaceLabels {
    /// Labelling as built, before any reconciliation.
    pub fn new(kind: DieKind) -> Self {
        Self {
            kind,
            materials: DieGeometry::for_kind(kind).materials(),
            d4_shift: 0,
        }
    }

    pub fn kind(&self) -> DieKind {
        self.kind
    }

    /// Material index per geometry face, for the renderer.
    pub fn materials(&self) -> &[u8] {
        &self.materials
    }

    pub fn d4_shift(&self) -> u8 {
        self.d4_shift
    }

    /// Corner labels to draw, for a d4.
    pub fn d4_corner_labels(&self) -> Option<&'static [[u8; 3]; 4]> {
        match self.kind {
            DieKind::D4 => Some(&D4_CORNER_LABELS[self.d4_shift as usize]),
            _ => None,
        }
    }

    /// Value read when the face with material `material` is selected.
    fn value_of_material(&self, material: u8) -> Option<i32> {
        if self.kind == DieKind::D4 {
            if material == 0 || material > 4 {
                return None;
            }
            let value = (material as i32 - 1 + self.d4_shift as i32) % 4 + 1;
            return Some(value);
        }
        self.kind.value_for_face(material)
    }
}

/// Axis the rolled face is compared against.
pub fn reference_axis(kind: DieKind) -> Vec3 {
    match kind {
        DieKind::D4 => Vec3::DOWN,
        _ => Vec3::UP,
    }
}

/// Index of the labelled geometry face selected by `orientation`.
pub fn selected_face(kind: DieKind, orientation: Quat) -> Option<usize> {
    let axis = reference_axis(kind);
    let geometry = DieGeometry::for_kind(kind);
    geometry
        .faces
        .iter()
        .enumerate()
        .filter(|(_, face)| face.material != 0)
        .map(|(i, face)| (i, orientation.rotate(face.normal).angle_to(axis)))
        .fold(None, |best: Option<(usize, f64)>, (i, angle)| match best {
            Some((_, best_angle)) if best_angle <= angle => best,
            _ => Some((i, angle)),
        })
        .map(|(i, _)| i)
}

/// Value a settled die shows in its current labelling.
pub fn read_value(labels: &FaceLabels, orientation: Quat) -> Option<i32> {
    let face = selected_face(labels.kind, orientation)?;
    labels.value_of_material(labels.materials[face])
}

/// Relabel a die that physically shows `physical` so it shows
/// `authoritative`. Returns the applied shift (0 when nothing changed).
pub fn reconcile(
    labels: &mut FaceLabels,
    physical: i32,
    authoritative: i32,
) -> Result<i32, ReconcileError> {
    let kind = labels.kind;
    let out_of_range = |value| ReconcileError::OutOfRange { kind, value };
    let target = kind.face_for_value(authoritative).ok_or_else(|| out_of_range(authoritative))?;
    let current = kind.face_for_value(physical).ok_or_else(|| out_of_range(physical))?;

    let delta = target as i32 - current as i32;
    if delta == 0 {
        return Ok(0);
    }

    if kind == DieKind::D4 {
        labels.d4_shift = (labels.d4_shift as i32 + delta).rem_euclid(4) as u8;
        return Ok(delta);
    }

    let n = kind.face_count() as i32;
    for material in labels.materials.iter_mut().filter(|m| **m != 0) {
        *material = ((*material as i32 - 1 + delta).rem_euclid(n) + 1) as u8;
    }
    Ok(delta)
}

/// Reconcile a whole roll, die by die.
pub fn reconcile_all(
    dice: &mut [FaceLabels],
    physical: &[i32],
    authoritative: &[i32],
) -> Result<(), ReconcileError> {
    for len in [physical.len(), authoritative.len()] {
        if len != dice.len() {
            return Err(ReconcileError::CountMismatch { expected: dice.len(), actual: len });
        }
    }
    for ((labels, p), a) in dice.iter_mut().zip(physical).zip(authoritative) {
        reconcile(labels, *p, *a)?;
    }
    Ok(())
}
