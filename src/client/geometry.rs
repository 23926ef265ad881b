//! Die Geometry
//!
//! Vertex and face tables for every die shape, with one outward normal per
//! face. Each face row lists its vertex indices followed by the material
//! index that carries its label; material `0` marks an unlabelled face
//! (the second half of each d10 kite).
//!
//! Only what face read-out needs is kept here. Mesh building, UVs and
//! textures belong to the renderer.

use std::sync::OnceLock;

use crate::core::vec3::Vec3;
use crate::dice::DieKind;

/// One polygonal face.
#[derive(Clone, Debug)]
pub struct Face {
    /// Vertex indices, counter-clockwise seen from outside.
    pub vertices: Vec<usize>,
    /// Initial material index, `0` if unlabelled.
    pub material: u8,
    /// Unit outward normal in body space.
    pub normal: Vec3,
}

/// Body-space description of one die shape.
#[derive(Clone, Debug)]
pub struct DieGeometry {
    /// Unit-length vertices.
    pub vertices: Vec<Vec3>,
    pub faces: Vec<Face>,
}

impl DieGeometry {
    /// Geometry shared by every die of `kind`.
    ///
    /// d9, d10 and d100 share the ten-sided body.
    pub fn for_kind(kind: DieKind) -> &'static DieGeometry {
        static SHAPES: OnceLock<[DieGeometry; 6]> = OnceLock::new();
        let shapes = SHAPES.get_or_init(|| {
            [
                DieGeometry::build(&D4_VERTICES, D4_FACES),
                DieGeometry::build(&D6_VERTICES, D6_FACES),
                DieGeometry::build(&D8_VERTICES, D8_FACES),
                DieGeometry::build(&d10_vertices(), D10_FACES),
                DieGeometry::build(&d12_vertices(), D12_FACES),
                DieGeometry::build(&d20_vertices(), D20_FACES),
            ]
        });
        let index = match kind {
            DieKind::D4 => 0,
            DieKind::D6 => 1,
            DieKind::D8 => 2,
            DieKind::D9 | DieKind::D10 | DieKind::D100 => 3,
            DieKind::D12 => 4,
            DieKind::D20 => 5,
        };
        &shapes[index]
    }

    fn build(raw_vertices: &[[f64; 3]], rows: &[&[usize]]) -> Self {
        let vertices: Vec<Vec3> = raw_vertices
            .iter()
            .map(|v| Vec3::from_array(*v).normalize())
            .collect();

        let faces = rows
            .iter()
            .map(|row| {
                let (indices, material) = row.split_at(row.len() - 1);
                let (a, b, c) = (vertices[indices[0]], vertices[indices[1]], vertices[indices[2]]);
                Face {
                    vertices: indices.to_vec(),
                    material: material[0] as u8,
                    normal: (c - b).cross(a - b).normalize(),
                }
            })
            .collect();

        Self { vertices, faces }
    }

    /// Initial material index of every face, in face order.
    pub fn materials(&self) -> Vec<u8> {
        self.faces.iter().map(|f| f.material).collect()
    }

    /// Body-space centroid of a face.
    pub fn centroid(&self, face: &Face) -> Vec3 {
        let sum = face
            .vertices
            .iter()
            .fold(Vec3::ZERO, |acc, i| acc + self.vertices[*i]);
        sum.scale(1.0 / face.vertices.len() as f64)
    }
}

// =============================================================================
// Shape tables
// =============================================================================

const D4_VERTICES: [[f64; 3]; 4] = [[1.0, 1.0, 1.0], [-1.0, -1.0, 1.0], [-1.0, 1.0, -1.0], [1.0, -1.0, -1.0]];
const D4_FACES: &[&[usize]] = &[&[1, 0, 2, 1], &[0, 1, 3, 2], &[0, 3, 2, 3], &[1, 2, 3, 4]];

const D6_VERTICES: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, 1.0],
];
const D6_FACES: &[&[usize]] = &[
    &[0, 3, 2, 1, 1], &[1, 2, 6, 5, 2], &[0, 1, 5, 4, 3],
    &[3, 7, 6, 2, 4], &[0, 4, 7, 3, 5], &[4, 5, 6, 7, 6],
];

const D8_VERTICES: [[f64; 3]; 6] = [
    [1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, -1.0],
];
const D8_FACES: &[&[usize]] = &[
    &[0, 2, 4, 1], &[0, 4, 3, 2], &[0, 3, 5, 3], &[0, 5, 2, 4],
    &[1, 3, 4, 5], &[1, 4, 2, 6], &[1, 2, 5, 7], &[1, 5, 3, 8],
];

/// Ten vertices alternating slightly above and below the equator, plus
/// the two poles.
fn d10_vertices() -> Vec<[f64; 3]> {
    let step = std::f64::consts::TAU / 10.0;
    let mut vertices: Vec<[f64; 3]> = (0..10)
        .map(|i| {
            let b = step * i as f64;
            let z = if i % 2 == 1 { 0.105 } else { -0.105 };
            [b.cos(), b.sin(), z]
        })
        .collect();
    vertices.push([0.0, 0.0, -1.0]);
    vertices.push([0.0, 0.0, 1.0]);
    vertices
}

const D10_FACES: &[&[usize]] = &[
    &[5, 7, 11, 2], &[4, 2, 10, 3], &[1, 3, 11, 4], &[0, 8, 10, 5], &[7, 9, 11, 6],
    &[8, 6, 10, 7], &[9, 1, 11, 8], &[2, 0, 10, 9], &[3, 5, 11, 10], &[6, 4, 10, 1],
    &[1, 0, 2, 0], &[1, 2, 3, 0], &[3, 2, 4, 0], &[3, 4, 5, 0], &[5, 4, 6, 0],
    &[5, 6, 7, 0], &[7, 6, 8, 0], &[7, 8, 9, 0], &[9, 8, 0, 0], &[9, 0, 1, 0],
];

fn golden_ratio() -> f64 {
    (1.0 + 5f64.sqrt()) / 2.0
}

fn d12_vertices() -> Vec<[f64; 3]> {
    let p = golden_ratio();
    let q = 1.0 / p;
    vec![
        [0.0, q, p], [0.0, q, -p], [0.0, -q, p], [0.0, -q, -p], [p, 0.0, q],
        [p, 0.0, -q], [-p, 0.0, q], [-p, 0.0, -q], [q, p, 0.0], [q, -p, 0.0], [-q, p, 0.0],
        [-q, -p, 0.0], [1.0, 1.0, 1.0], [1.0, 1.0, -1.0], [1.0, -1.0, 1.0], [1.0, -1.0, -1.0],
        [-1.0, 1.0, 1.0], [-1.0, 1.0, -1.0], [-1.0, -1.0, 1.0], [-1.0, -1.0, -1.0],
    ]
}

const D12_FACES: &[&[usize]] = &[
    &[2, 14, 4, 12, 0, 1], &[15, 9, 11, 19, 3, 2], &[16, 10, 17, 7, 6, 3],
    &[6, 7, 19, 11, 18, 4], &[6, 18, 2, 0, 16, 5], &[18, 11, 9, 14, 2, 6],
    &[1, 17, 10, 8, 13, 7], &[1, 13, 5, 15, 3, 8], &[13, 8, 12, 4, 5, 9],
    &[5, 4, 14, 9, 15, 10], &[0, 12, 8, 10, 16, 11], &[3, 19, 7, 17, 1, 12],
];

fn d20_vertices() -> Vec<[f64; 3]> {
    let t = golden_ratio();
    vec![
        [-1.0, t, 0.0], [1.0, t, 0.0], [-1.0, -t, 0.0], [1.0, -t, 0.0],
        [0.0, -1.0, t], [0.0, 1.0, t], [0.0, -1.0, -t], [0.0, 1.0, -t],
        [t, 0.0, -1.0], [t, 0.0, 1.0], [-t, 0.0, -1.0], [-t, 0.0, 1.0],
    ]
}

const D20_FACES: &[&[usize]] = &[
    &[0, 11, 5, 1], &[0, 5, 1, 2], &[0, 1, 7, 3], &[0, 7, 10, 4], &[0, 10, 11, 5],
    &[1, 5, 9, 6], &[5, 11, 4, 7], &[11, 10, 2, 8], &[10, 7, 6, 9], &[7, 1, 8, 10],
    &[3, 9, 4, 11], &[3, 4, 2, 12], &[3, 2, 6, 13], &[3, 6, 8, 14], &[3, 8, 9, 15],
    &[4, 9, 5, 16], &[2, 4, 11, 17], &[6, 2, 10, 18], &[8, 6, 7, 19], &[9, 8, 1, 20],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normals_point_outward() {
        for kind in DieKind::ALL {
            let geometry = DieGeometry::for_kind(kind);
            for face in &geometry.faces {
                let centroid = geometry.centroid(face);
                assert!(face.normal.dot(centroid) > 0.0, "{kind} face {:?}", face.vertices);
                assert!((face.normal.length() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_every_label_appears_once() {
        for kind in DieKind::ALL {
            let mut labelled: Vec<u8> = DieGeometry::for_kind(kind)
                .materials()
                .into_iter()
                .filter(|m| *m != 0)
                .collect();
            labelled.sort_unstable();
            let expected: Vec<u8> = (1..=kind.face_count()).collect();
            assert_eq!(labelled, expected, "{kind}");
        }
    }

    #[test]
    fn test_d6_opposite_faces() {
        let geometry = DieGeometry::for_kind(DieKind::D6);
        let normal_of = |m: u8| geometry.faces.iter().find(|f| f.material == m).unwrap().normal;
        assert!(normal_of(6).approx_eq(Vec3::UP, 1e-9));
        assert!(normal_of(1).approx_eq(Vec3::DOWN, 1e-9));
        assert!(normal_of(4).approx_eq(Vec3::new(0.0, 1.0, 0.0), 1e-9));
    }

    #[test]
    fn test_shared_ten_sided_body() {
        let d10 = DieGeometry::for_kind(DieKind::D10) as *const DieGeometry;
        let d100 = DieGeometry::for_kind(DieKind::D100) as *const DieGeometry;
        assert_eq!(d10, d100);
        assert_eq!(DieGeometry::for_kind(DieKind::D9).faces.len(), 20);
    }

    #[test]
    fn test_vertices_are_unit_length() {
        for kind in DieKind::ALL {
            for v in &DieGeometry::for_kind(kind).vertices {
                assert!((v.length() - 1.0).abs() < 1e-9);
            }
        }
    }
}
