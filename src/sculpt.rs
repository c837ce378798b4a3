//! Proportional / soft-selection deformation.
//!
//! A weight in [0, 1] is computed per vertex from the current sub-selection
//! and a falloff radius, then a drag applies positional deltas scaled by
//! those weights. FIXED mode replays every update against a pre-drag
//! snapshot (stable under fast mouse movement); DYNAMIC mode applies
//! incremental deltas to the live buffer and lets the weights follow the
//! moving selection centroid.

use crate::geometry::{MeshGeometry, VertexId};
use crate::store::EntityId;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Net drag displacement below this magnitude is treated as a click, not a
/// deformation; the drag is discarded without committing.
pub const DRAG_COMMIT_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FalloffKind {
    /// Euclidean distance from the selection centroid.
    #[default]
    Volume,
    /// Geodesic-like distance propagated across mesh connectivity, so the
    /// falloff never bleeds across disconnected but spatially close
    /// surface patches.
    Surface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DragMode {
    /// Replay `snapshot + delta * weight` on every update; path independent.
    #[default]
    Fixed,
    /// Apply only the incremental delta each update; weights may evolve
    /// mid-drag, results are path dependent.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SculptSettings {
    pub enabled: bool,
    pub radius: f32,
    pub mode: DragMode,
    pub falloff: FalloffKind,
    pub heatmap_visible: bool,
}

impl Default for SculptSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 1.0,
            mode: DragMode::Fixed,
            falloff: FalloffKind::Volume,
            heatmap_visible: false,
        }
    }
}

/// Cubic Hermite smoothstep on [0, 1]; C¹ at both ends, so the falloff has
/// no visible crease at the radius boundary.
fn smoothstep01(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

struct DragState {
    entity: EntityId,
    mesh_id: u32,
    selected: Vec<VertexId>,
    snapshot: Vec<[f32; 3]>,
    /// Cumulative delta applied so far (drag-local space).
    applied: Vec3,
    /// Entity max-axis scale captured at drag start.
    scale_factor: f32,
}

#[derive(Default)]
pub struct SculptSystem {
    settings: SculptSettings,
    weights: HashMap<u32, Vec<f32>>,
    drag: Option<DragState>,
    weights_dirty: bool,
    /// Meshes whose weight buffer changed since the last GPU upload.
    pending_upload: HashSet<u32>,
}

impl SculptSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> &SculptSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SculptSettings) {
        if settings != self.settings {
            self.settings = settings;
            self.weights_dirty = true;
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.settings.enabled != enabled {
            self.settings.enabled = enabled;
            self.weights_dirty = true;
        }
    }

    pub fn set_radius(&mut self, radius: f32) {
        let radius = radius.max(0.0);
        if self.settings.radius != radius {
            self.settings.radius = radius;
            self.weights_dirty = true;
        }
    }

    pub fn set_mode(&mut self, mode: DragMode) {
        self.settings.mode = mode;
    }

    pub fn set_falloff(&mut self, falloff: FalloffKind) {
        if self.settings.falloff != falloff {
            self.settings.falloff = falloff;
            self.weights_dirty = true;
        }
    }

    pub fn set_heatmap_visible(&mut self, visible: bool) {
        self.settings.heatmap_visible = visible;
    }

    /// Selection changed; weights must be recomputed before the next frame.
    pub fn mark_selection_changed(&mut self) {
        self.weights_dirty = true;
    }

    pub fn take_weights_dirty(&mut self) -> bool {
        std::mem::take(&mut self.weights_dirty)
    }

    pub fn weights(&self, mesh_id: u32) -> Option<&[f32]> {
        self.weights.get(&mesh_id).map(|w| w.as_slice())
    }

    /// True once per weight-buffer change: steady-state frames skip the
    /// heatmap re-upload.
    pub fn take_pending_upload(&mut self, mesh_id: u32) -> bool {
        self.pending_upload.remove(&mesh_id)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn drag_entity(&self) -> Option<EntityId> {
        self.drag.as_ref().map(|d| d.entity)
    }

    pub fn drop_mesh(&mut self, mesh_id: u32) {
        self.weights.remove(&mesh_id);
        self.pending_upload.remove(&mesh_id);
        if self.drag.as_ref().is_some_and(|d| d.mesh_id == mesh_id) {
            self.drag = None;
        }
    }

    /// Recompute the weight buffer for one mesh from the selected vertex
    /// set. `max_axis_scale` divides the radius so the effective world-space
    /// radius stays invariant under non-uniform entity scaling.
    pub fn recalculate(
        &mut self,
        mesh_id: u32,
        geometry: &MeshGeometry,
        selected: &HashSet<VertexId>,
        max_axis_scale: f32,
    ) {
        let weights = if self.settings.enabled {
            let radius = (self.settings.radius / max_axis_scale.max(1e-6)).max(1e-6);
            match self.settings.falloff {
                FalloffKind::Volume => {
                    volume_weights(&geometry.positions, selected, radius)
                }
                FalloffKind::Surface => surface_weights(geometry, selected, radius),
            }
        } else {
            // Soft selection off: hard 1/0 weights, still useful for the
            // selection heatmap overlay.
            (0..geometry.vertex_count() as u32)
                .map(|v| if selected.contains(&v) { 1.0 } else { 0.0 })
                .collect()
        };
        self.weights.insert(mesh_id, weights);
        self.pending_upload.insert(mesh_id);
    }

    /// Begin a vertex drag: no-op (returns false) when the sub-selection
    /// flattens to no vertices. Snapshots the full position buffer and
    /// recomputes weights once; no vertex moves yet.
    pub fn start_vertex_drag(
        &mut self,
        entity: EntityId,
        mesh_id: u32,
        geometry: &MeshGeometry,
        selected: &HashSet<VertexId>,
        max_axis_scale: f32,
    ) -> bool {
        if selected.is_empty() {
            return false;
        }
        self.recalculate(mesh_id, geometry, selected, max_axis_scale);
        let mut ordered: Vec<VertexId> = selected.iter().copied().collect();
        ordered.sort_unstable();
        self.drag = Some(DragState {
            entity,
            mesh_id,
            selected: ordered,
            snapshot: geometry.positions.clone(),
            applied: Vec3::ZERO,
            scale_factor: max_axis_scale,
        });
        true
    }

    /// Apply the drag at cumulative displacement `delta` (from drag start).
    ///
    /// FIXED: full replay from the snapshot, so the result depends only on
    /// `delta`, never on how many updates happened, and zero-weight
    /// vertices are restored to their snapshot value so nothing drifts.
    /// DYNAMIC: only the increment since the last call is applied to the
    /// live buffer; VOLUME weights are first re-evaluated from the moving
    /// selection centroid.
    pub fn update_vertex_drag(&mut self, geometry: &mut MeshGeometry, delta: Vec3) {
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        if geometry.positions.len() != drag.snapshot.len() {
            log::error!("vertex drag aborted: position buffer resized mid-drag");
            self.drag = None;
            return;
        }

        match self.settings.mode {
            DragMode::Fixed => {
                let weights = self
                    .weights
                    .get(&drag.mesh_id)
                    .map(|w| w.as_slice())
                    .unwrap_or(&[]);
                for (i, position) in geometry.positions.iter_mut().enumerate() {
                    let w = weights.get(i).copied().unwrap_or(0.0);
                    let base = Vec3::from(drag.snapshot[i]);
                    *position = (base + delta * w).to_array();
                }
            }
            DragMode::Dynamic => {
                if self.settings.falloff == FalloffKind::Volume && self.settings.enabled {
                    let selected: HashSet<VertexId> = drag.selected.iter().copied().collect();
                    let radius =
                        (self.settings.radius / drag.scale_factor.max(1e-6)).max(1e-6);
                    let weights = volume_weights(&geometry.positions, &selected, radius);
                    self.weights.insert(drag.mesh_id, weights);
                    self.pending_upload.insert(drag.mesh_id);
                }
                let increment = delta - drag.applied;
                let weights = self
                    .weights
                    .get(&drag.mesh_id)
                    .map(|w| w.as_slice())
                    .unwrap_or(&[]);
                for (i, position) in geometry.positions.iter_mut().enumerate() {
                    let w = weights.get(i).copied().unwrap_or(0.0);
                    if w != 0.0 {
                        let moved = Vec3::from(*position) + increment * w;
                        *position = moved.to_array();
                    }
                }
            }
        }
        if let Some(drag) = self.drag.as_mut() {
            drag.applied = delta;
        }
    }

    /// Finish the drag. A net displacement below `DRAG_COMMIT_EPSILON`
    /// restores the snapshot and commits nothing; otherwise normals and
    /// bounds are recomputed from the mutated buffers and the mesh id is
    /// returned so the caller can emit its geometry-changed notification
    /// exactly once.
    pub fn end_vertex_drag(&mut self, geometry: &mut MeshGeometry) -> Option<u32> {
        let drag = self.drag.take()?;
        if drag.applied.length() < DRAG_COMMIT_EPSILON {
            if geometry.positions.len() == drag.snapshot.len() {
                geometry.positions = drag.snapshot;
            }
            return None;
        }
        geometry.recompute_normals();
        geometry.recompute_bounds();
        Some(drag.mesh_id)
    }

    /// Cancel tracking without touching geometry or weights. The live
    /// buffer keeps whatever the drag already applied; a hard revert is the
    /// caller's job (it holds the committed state).
    pub fn clear_deformation(&mut self) {
        self.drag = None;
    }
}

fn volume_weights(
    positions: &[[f32; 3]],
    selected: &HashSet<VertexId>,
    radius: f32,
) -> Vec<f32> {
    if selected.is_empty() {
        return vec![0.0; positions.len()];
    }
    let mut centroid = Vec3::ZERO;
    let mut count = 0.0;
    for &v in selected {
        if let Some(&p) = positions.get(v as usize) {
            centroid += Vec3::from(p);
            count += 1.0;
        }
    }
    if count == 0.0 {
        return vec![0.0; positions.len()];
    }
    centroid /= count;

    positions
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            if selected.contains(&(i as u32)) {
                return 1.0;
            }
            let distance = Vec3::from(p).distance(centroid);
            if distance > radius {
                0.0
            } else {
                smoothstep01(1.0 - distance / radius)
            }
        })
        .collect()
}

/// Min-heap entry for the bounded Dijkstra propagation.
struct Frontier {
    distance: f32,
    vertex: VertexId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.vertex == other.vertex
    }
}
impl Eq for Frontier {}
impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want nearest-first.
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

fn surface_weights(
    geometry: &MeshGeometry,
    selected: &HashSet<VertexId>,
    radius: f32,
) -> Vec<f32> {
    let count = geometry.vertex_count();
    let adjacency = geometry.vertex_adjacency();
    let mut distance = vec![f32::INFINITY; count];
    let mut heap = BinaryHeap::new();
    for &v in selected {
        if (v as usize) < count {
            distance[v as usize] = 0.0;
            heap.push(Frontier {
                distance: 0.0,
                vertex: v,
            });
        }
    }
    while let Some(Frontier { distance: d, vertex }) = heap.pop() {
        if d > distance[vertex as usize] {
            continue; // stale entry
        }
        for &(neighbor, edge_length) in &adjacency[vertex as usize] {
            let next = d + edge_length;
            if next <= radius && next < distance[neighbor as usize] {
                distance[neighbor as usize] = next;
                heap.push(Frontier {
                    distance: next,
                    vertex: neighbor,
                });
            }
        }
    }
    (0..count)
        .map(|i| {
            if selected.contains(&(i as u32)) {
                1.0
            } else if distance[i].is_finite() {
                smoothstep01(1.0 - distance[i] / radius)
            } else {
                0.0
            }
        })
        .collect()
}
