//! Edge-ring and face-loop topology walks.
//!
//! An edge loop repeatedly crosses each quad adjacent to the current edge
//! to the opposite edge until it hits a boundary, a non-quad face, or an
//! edge it already visited (closed ring). A face loop is the analogous walk
//! across shared edges. On non-manifold topology (more than two faces on
//! the crossing edge) the walk takes the first untraversed face in topology
//! order and stops when that face has no unique opposite edge; both walks
//! therefore always terminate.

use crate::geometry::{EdgeKey, FaceId, MeshGeometry};
use std::collections::{HashMap, HashSet};

/// Opposite edge of `edge` within a quad ring; `None` for non-quads or when
/// the edge is not part of the ring.
fn opposite_edge(face: &[u32], edge: EdgeKey) -> Option<EdgeKey> {
    if face.len() != 4 {
        return None;
    }
    let position = (0..4).find(|&i| EdgeKey::new(face[i], face[(i + 1) % 4]) == edge)?;
    Some(EdgeKey::new(
        face[(position + 2) % 4],
        face[(position + 3) % 4],
    ))
}

/// Walk one direction of an edge ring: enter `start_face` across `seed`,
/// keep crossing to opposite edges, and collect every edge reached.
fn walk_edge_ring(
    geometry: &MeshGeometry,
    edge_faces: &HashMap<EdgeKey, Vec<FaceId>>,
    seed: EdgeKey,
    start_face: FaceId,
    out: &mut HashSet<EdgeKey>,
) {
    let mut edge = seed;
    let mut face = start_face;
    let mut visited_faces = HashSet::new();
    loop {
        if !visited_faces.insert(face) {
            return; // closed ring
        }
        let Some(ring) = geometry.faces.get(face as usize) else {
            return;
        };
        let Some(next_edge) = opposite_edge(ring, edge) else {
            return; // non-quad face ends the strip
        };
        if !out.insert(next_edge) {
            return; // already collected: the ring closed
        }
        // Cross to the next face sharing next_edge; first untraversed face
        // in topology order on non-manifold edges.
        let next_face = edge_faces
            .get(&next_edge)
            .and_then(|faces| faces.iter().find(|&&f| !visited_faces.contains(&f)))
            .copied();
        match next_face {
            Some(f) => {
                edge = next_edge;
                face = f;
            }
            None => return, // boundary
        }
    }
}

/// Expand every selected edge into its full ring. The result always
/// contains the input edges.
pub fn extend_edge_loops(
    geometry: &MeshGeometry,
    selected: &HashSet<EdgeKey>,
) -> HashSet<EdgeKey> {
    let edge_faces = geometry.edge_faces();
    let mut out = selected.clone();
    for &seed in selected {
        let Some(faces) = edge_faces.get(&seed) else {
            continue;
        };
        for &face in faces {
            walk_edge_ring(geometry, &edge_faces, seed, face, &mut out);
        }
    }
    out
}

/// Walk one direction of a face loop: leave `seed_face` through `edge`,
/// enter the neighbor, leave it through the opposite edge, and so on.
fn walk_face_loop(
    geometry: &MeshGeometry,
    edge_faces: &HashMap<EdgeKey, Vec<FaceId>>,
    seed_face: FaceId,
    mut edge: EdgeKey,
    out: &mut HashSet<FaceId>,
) {
    let mut face = seed_face;
    loop {
        let next_face = edge_faces
            .get(&edge)
            .and_then(|faces| faces.iter().find(|&&f| f != face && !out.contains(&f)))
            .copied();
        let Some(next) = next_face else {
            return; // boundary or loop closed
        };
        out.insert(next);
        let Some(ring) = geometry.faces.get(next as usize) else {
            return;
        };
        let Some(next_edge) = opposite_edge(ring, edge) else {
            return; // non-quad ends the loop
        };
        face = next;
        edge = next_edge;
    }
}

/// Expand every selected face into its loops. A bare face does not pick a
/// direction, so the walk leaves through all four edges of the seed quad
/// (both loop axes); boundary edges simply terminate immediately.
pub fn extend_face_loops(geometry: &MeshGeometry, selected: &HashSet<FaceId>) -> HashSet<FaceId> {
    let edge_faces = geometry.edge_faces();
    let mut out = selected.clone();
    for &seed in selected {
        let Some(ring) = geometry.faces.get(seed as usize) else {
            continue;
        };
        if ring.len() != 4 {
            continue;
        }
        for i in 0..4 {
            let edge = EdgeKey::new(ring[i], ring[(i + 1) % 4]);
            walk_face_loop(geometry, &edge_faces, seed, edge, &mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{quad_ring, unit_quad};

    #[test]
    fn closed_ring_of_eight_quads_selects_eight_edges() {
        let ring = quad_ring(8);
        // Vertical edge of quad 0: bottom vertex 0, top vertex 8.
        let seed = HashSet::from([EdgeKey::new(0, 8)]);
        let loop_edges = extend_edge_loops(&ring, &seed);
        assert_eq!(loop_edges.len(), 8);
        for s in 0..8u32 {
            assert!(loop_edges.contains(&EdgeKey::new(s, s + 8)), "missing seam {s}");
        }
    }

    #[test]
    fn loop_selection_is_idempotent_under_repetition() {
        let ring = quad_ring(8);
        let seed = HashSet::from([EdgeKey::new(3, 11)]);
        let first = extend_edge_loops(&ring, &seed);
        let second = extend_edge_loops(&ring, &first);
        let third = extend_edge_loops(&ring, &second);
        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[test]
    fn horizontal_seed_walks_the_cap_rings() {
        let ring = quad_ring(8);
        // Bottom-ring edge: walking crosses no quads vertically, so the
        // opposite edges are the top ring; both rings are quad-connected.
        let seed = HashSet::from([EdgeKey::new(0, 1)]);
        let loop_edges = extend_edge_loops(&ring, &seed);
        // Opposite of a bottom edge within its quad is the matching top
        // edge; the walk terminates at the band boundary above it.
        assert!(loop_edges.contains(&EdgeKey::new(8, 9)));
        assert_eq!(loop_edges.len(), 2);
    }

    #[test]
    fn boundary_strip_terminates_without_wrapping() {
        // A single quad: opposite edge exists but has no second face.
        let quad = unit_quad();
        let seed = HashSet::from([EdgeKey::new(0, 1)]);
        let loop_edges = extend_edge_loops(&quad, &seed);
        assert_eq!(
            loop_edges,
            HashSet::from([EdgeKey::new(0, 1), EdgeKey::new(2, 3)])
        );
    }

    #[test]
    fn non_quad_faces_stop_the_walk() {
        // Quad glued to a triangle: the walk must not cross the triangle.
        let geometry = MeshGeometry::from_buffers(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [2.0, 0.5, 0.0],
            ],
            vec![[0.0, 0.0]; 5],
            vec![0, 1, 2, 0, 2, 3, 1, 4, 2],
            vec![vec![0, 1, 2, 3], vec![1, 4, 2]],
        );
        let seed = HashSet::from([EdgeKey::new(0, 3)]);
        let loop_edges = extend_edge_loops(&geometry, &seed);
        assert_eq!(
            loop_edges,
            HashSet::from([EdgeKey::new(0, 3), EdgeKey::new(1, 2)])
        );
    }

    #[test]
    fn face_loop_wraps_the_whole_band() {
        let ring = quad_ring(8);
        let seed = HashSet::from([2u32]);
        let loop_faces = extend_face_loops(&ring, &seed);
        assert_eq!(loop_faces, (0..8u32).collect::<HashSet<_>>());
        // Repetition is stable.
        assert_eq!(extend_face_loops(&ring, &loop_faces), loop_faces);
    }

    #[test]
    fn face_loop_on_single_quad_is_just_the_quad() {
        let quad = unit_quad();
        let seed = HashSet::from([0u32]);
        assert_eq!(extend_face_loops(&quad, &seed), seed);
    }
}
