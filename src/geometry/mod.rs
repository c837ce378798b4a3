//! Mesh asset geometry: flat attribute buffers, polygon topology, and the
//! explicit recompute calls (normals, bounds) that keep derived data
//! consistent after mutation. Nothing here is recomputed implicitly.

pub mod codec;

use glam::Vec3;
use std::collections::HashMap;

pub type VertexId = u32;
pub type FaceId = u32;

/// Canonical undirected edge key: always stored as `min(a,b)-max(a,b)` so
/// both traversal directions hash to the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    a: VertexId,
    b: VertexId,
}

impl EdgeKey {
    pub fn new(a: VertexId, b: VertexId) -> Self {
        if a <= b {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }

    pub fn endpoints(&self) -> (VertexId, VertexId) {
        (self.a, self.b)
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.a == v || self.b == v
    }
}

/// Axis-aligned bounding box; callers mostly consume it as center/extent.
/// The derived `Default` is the degenerate box at the origin, same as
/// [`Aabb::EMPTY`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    pub fn center(&self) -> [f32; 3] {
        ((self.min + self.max) * 0.5).to_array()
    }

    pub fn extent(&self) -> [f32; 3] {
        ((self.max - self.min) * 0.5).to_array()
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }
}

/// Optional per-vertex skinning attributes (joint palette indices + weights).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkinAttributes {
    pub joints: Vec<[u16; 4]>,
    pub weights: Vec<[f32; 4]>,
}

/// Geometry for one mesh asset. Positions/normals are `[f32; 3]` per vertex,
/// uvs `[f32; 2]`, indices a triangle list, and `faces` the polygon topology
/// (variable-length ordered vertex rings: quads and n-gons, not just tris).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub colors: Option<Vec<[f32; 3]>>,
    pub indices: Vec<u32>,
    pub faces: Vec<Vec<u32>>,
    pub skin: Option<SkinAttributes>,
    bounds: Aabb,
}

impl MeshGeometry {
    /// Build geometry from raw buffers; normals and bounds are derived once.
    pub fn from_buffers(
        positions: Vec<[f32; 3]>,
        uvs: Vec<[f32; 2]>,
        indices: Vec<u32>,
        faces: Vec<Vec<u32>>,
    ) -> Self {
        let mut geometry = Self {
            positions,
            normals: Vec::new(),
            uvs,
            colors: None,
            indices,
            faces,
            skin: None,
            bounds: Aabb::EMPTY,
        };
        geometry.recompute_normals();
        geometry.recompute_bounds();
        geometry
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Verify that every index in the triangle list and the polygon topology
    /// addresses a live vertex. A failure here is corrupted geometry, not a
    /// UI race, and is reported loudly in development builds.
    pub fn validate(&self) -> bool {
        let count = self.positions.len() as u32;
        let bad_index = self.indices.iter().find(|&&i| i >= count);
        let bad_face = self
            .faces
            .iter()
            .flat_map(|face| face.iter())
            .find(|&&i| i >= count);
        if let Some(&index) = bad_index.or(bad_face) {
            log::error!(
                "geometry index {} out of range (vertex count {})",
                index,
                count
            );
            debug_assert!(false, "geometry index {index} exceeds vertex count {count}");
            return false;
        }
        true
    }

    /// Area-weighted normal recompute from the triangle index list. Vertices
    /// untouched by any triangle fall back to +Y.
    pub fn recompute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let p0 = Vec3::from(self.positions[i0]);
            let p1 = Vec3::from(self.positions[i1]);
            let p2 = Vec3::from(self.positions[i2]);
            // Unnormalized cross product: larger triangles weigh more.
            let face_normal = (p1 - p0).cross(p2 - p0);
            accum[i0] += face_normal;
            accum[i1] += face_normal;
            accum[i2] += face_normal;
        }
        self.normals = accum
            .into_iter()
            .map(|n| {
                if n.length_squared() > 1e-12 {
                    n.normalize().to_array()
                } else {
                    [0.0, 1.0, 0.0]
                }
            })
            .collect();
    }

    pub fn recompute_bounds(&mut self) {
        let mut iter = self.positions.iter().map(|&p| Vec3::from(p));
        let Some(first) = iter.next() else {
            self.bounds = Aabb::EMPTY;
            return;
        };
        let (mut min, mut max) = (first, first);
        for p in iter {
            min = min.min(p);
            max = max.max(p);
        }
        self.bounds = Aabb { min, max };
    }

    /// Map each canonical edge to the faces that border it, in topology
    /// order. Boundary edges have one entry; non-manifold edges more than
    /// two.
    pub fn edge_faces(&self) -> HashMap<EdgeKey, Vec<FaceId>> {
        let mut map: HashMap<EdgeKey, Vec<FaceId>> = HashMap::new();
        for (face_id, face) in self.faces.iter().enumerate() {
            for i in 0..face.len() {
                let a = face[i];
                let b = face[(i + 1) % face.len()];
                map.entry(EdgeKey::new(a, b))
                    .or_default()
                    .push(face_id as FaceId);
            }
        }
        map
    }

    /// Per-vertex neighbor list with edge lengths, built from the polygon
    /// topology (falling back to the triangle list when no topology is
    /// present). This is the graph surface-falloff propagation walks.
    pub fn vertex_adjacency(&self) -> Vec<Vec<(VertexId, f32)>> {
        let mut adjacency = vec![Vec::new(); self.positions.len()];
        let mut push_edge = |adjacency: &mut Vec<Vec<(VertexId, f32)>>, a: u32, b: u32| {
            let (ai, bi) = (a as usize, b as usize);
            if ai >= self.positions.len() || bi >= self.positions.len() {
                return;
            }
            if adjacency[ai].iter().any(|&(v, _)| v == b) {
                return;
            }
            let length = (Vec3::from(self.positions[ai]) - Vec3::from(self.positions[bi])).length();
            adjacency[ai].push((b, length));
            adjacency[bi].push((a, length));
        };
        if self.faces.is_empty() {
            for tri in self.indices.chunks_exact(3) {
                push_edge(&mut adjacency, tri[0], tri[1]);
                push_edge(&mut adjacency, tri[1], tri[2]);
                push_edge(&mut adjacency, tri[2], tri[0]);
            }
        } else {
            for face in &self.faces {
                for i in 0..face.len() {
                    push_edge(&mut adjacency, face[i], face[(i + 1) % face.len()]);
                }
            }
        }
        adjacency
    }

    /// Ordered edge ring of one polygon face.
    pub fn face_edges(&self, face_id: FaceId) -> Vec<EdgeKey> {
        let Some(face) = self.faces.get(face_id as usize) else {
            return Vec::new();
        };
        (0..face.len())
            .map(|i| EdgeKey::new(face[i], face[(i + 1) % face.len()]))
            .collect()
    }
}

/// Unit quad in the XY plane: 4 vertices, 2 triangles, 1 quad face.
/// Shared by tests across the crate.
#[cfg(test)]
pub(crate) fn unit_quad() -> MeshGeometry {
    MeshGeometry::from_buffers(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
        vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        vec![0, 1, 2, 0, 2, 3],
        vec![vec![0, 1, 2, 3]],
    )
}

/// Closed band of `segments` quads (two stacked vertex rings), the classic
/// cylinder-side strip used to exercise ring walks.
#[cfg(test)]
pub(crate) fn quad_ring(segments: u32) -> MeshGeometry {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    for ring in 0..2 {
        let y = ring as f32;
        for s in 0..segments {
            let angle = s as f32 / segments as f32 * std::f32::consts::TAU;
            positions.push([angle.cos(), y, angle.sin()]);
            uvs.push([s as f32 / segments as f32, y]);
        }
    }
    let mut indices = Vec::new();
    let mut faces = Vec::new();
    for s in 0..segments {
        let next = (s + 1) % segments;
        let (b0, b1) = (s, next);
        let (t0, t1) = (segments + s, segments + next);
        faces.push(vec![b0, b1, t1, t0]);
        indices.extend_from_slice(&[b0, b1, t1, b0, t1, t0]);
    }
    MeshGeometry::from_buffers(positions, uvs, indices, faces)
}
