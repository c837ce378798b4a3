//! Selection engine: converts screen-space input (point, rectangle, brush)
//! into entity ids or mesh sub-element ids, tracked as one object selection
//! plus a four-set sub-selection (vertex/edge/face/UV) against the single
//! active mesh entity.

pub mod loops;

use crate::assets::MeshAssets;
use crate::geometry::{EdgeKey, FaceId, MeshGeometry, VertexId};
use crate::store::{EntityId, EntityStore};
use glam::{Mat4, Vec2, Vec3};
use std::collections::HashSet;

/// Selection granularity, set externally by the editing-mode controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentMode {
    #[default]
    Object,
    Vertex,
    Edge,
    Face,
    Uv,
}

/// Set mutation applied by `modify_sub_selection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectAction {
    Set,
    Add,
    Remove,
    Toggle,
}

/// A batch of sub-element ids, tagged with their granularity.
#[derive(Debug, Clone)]
pub enum SubElems {
    Vertices(Vec<VertexId>),
    Edges(Vec<(VertexId, VertexId)>),
    Faces(Vec<FaceId>),
    Uvs(Vec<VertexId>),
}

/// Result of a single-click component pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickedComponent {
    Vertex(VertexId),
    Edge(EdgeKey),
    Face(FaceId),
}

/// Screen-space rectangle with normalized corners; containment is half-open
/// (`min <= v < max` per axis) so adjacent marquees never double-select.
#[derive(Debug, Clone, Copy)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }
}

/// The four independent sub-selection sets. UV vertices share the vertex
/// index space but are a visually and operationally distinct selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubSelection {
    pub vertices: HashSet<VertexId>,
    pub edges: HashSet<EdgeKey>,
    pub faces: HashSet<FaceId>,
    pub uv_vertices: HashSet<VertexId>,
}

impl SubSelection {
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.edges.clear();
        self.faces.clear();
        self.uv_vertices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
            && self.edges.is_empty()
            && self.faces.is_empty()
            && self.uv_vertices.is_empty()
    }

    /// Flatten every populated set down to the vertex ids it implies: an
    /// edge contributes its endpoints, a face all its ring vertices.
    pub fn as_vertices(&self, geometry: &MeshGeometry) -> HashSet<VertexId> {
        let mut out = self.vertices.clone();
        out.extend(self.uv_vertices.iter().copied());
        for edge in &self.edges {
            let (a, b) = edge.endpoints();
            out.insert(a);
            out.insert(b);
        }
        for &face in &self.faces {
            if let Some(ring) = geometry.faces.get(face as usize) {
                out.extend(ring.iter().copied());
            }
        }
        out
    }
}

const VERTEX_PICK_RADIUS_PX: f32 = 8.0;
const EDGE_PICK_RADIUS_PX: f32 = 5.0;

pub struct SelectionSystem {
    mode: ComponentMode,
    selected: Vec<EntityId>,
    active: Option<EntityId>,
    sub: SubSelection,
    view_proj: Mat4,
}

impl Default for SelectionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionSystem {
    pub fn new() -> Self {
        Self {
            mode: ComponentMode::Object,
            selected: Vec::new(),
            active: None,
            sub: SubSelection::default(),
            view_proj: Mat4::IDENTITY,
        }
    }

    pub fn set_view_projection(&mut self, view_proj: Mat4) {
        self.view_proj = view_proj;
    }

    pub fn mode(&self) -> ComponentMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ComponentMode) {
        self.mode = mode;
    }

    pub fn selected(&self) -> &[EntityId] {
        &self.selected
    }

    pub fn active(&self) -> Option<EntityId> {
        self.active
    }

    pub fn sub(&self) -> &SubSelection {
        &self.sub
    }

    /// Replace the object selection wholesale. Unknown/stale ids are skipped
    /// individually; a changed active entity clears the sub-selection.
    /// Returns true when the selection actually changed.
    pub fn set_selected(&mut self, ids: &[EntityId], store: &EntityStore) -> bool {
        let mut next = Vec::with_capacity(ids.len());
        for &id in ids {
            if store.contains(id) && !next.contains(&id) {
                next.push(id);
            }
        }
        let next_active = next.first().copied();
        let changed = next != self.selected;
        if next_active != self.active {
            self.sub.clear();
        }
        self.selected = next;
        self.active = next_active;
        changed
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.selected.is_empty() || !self.sub.is_empty();
        self.selected.clear();
        self.active = None;
        self.sub.clear();
        changed
    }

    pub fn clear_sub(&mut self) -> bool {
        let changed = !self.sub.is_empty();
        self.sub.clear();
        changed
    }

    /// Drop all references to a deleted entity.
    pub fn drop_entity(&mut self, id: EntityId) {
        self.selected.retain(|&s| s != id);
        if self.active == Some(id) {
            self.active = self.selected.first().copied();
            self.sub.clear();
        }
    }

    /// Project a world-space point to screen pixels (top-left origin) and
    /// NDC depth. Points behind the camera never produce a hit.
    pub fn project(&self, world: Vec3, view_w: f32, view_h: f32) -> Option<(Vec2, f32)> {
        let clip = self.view_proj * world.extend(1.0);
        if clip.w <= 1e-6 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let screen = Vec2::new(
            (ndc.x * 0.5 + 0.5) * view_w,
            (1.0 - (ndc.y * 0.5 + 0.5)) * view_h,
        );
        Some((screen, ndc.z))
    }

    /// Nearest entity under the cursor: each candidate's world-space bounds
    /// are projected to a screen rectangle; hits rank by depth, then by
    /// smaller on-screen area, then by creation order. Creation order comes
    /// from the store's sequence counter, not the slot index, which the
    /// freelist recycles.
    pub fn select_entity_at(
        &self,
        store: &EntityStore,
        assets: &MeshAssets,
        x: f32,
        y: f32,
        view_w: f32,
        view_h: f32,
    ) -> Option<EntityId> {
        let cursor = Vec2::new(x, y);
        let mut best: Option<(f32, f32, u64, EntityId)> = None;
        for id in store.iter_active() {
            let mesh_id = store.mesh_type(id);
            if mesh_id == 0 {
                continue;
            }
            let Some(geometry) = assets.get(mesh_id) else {
                continue;
            };
            let Some(world) = store.world_matrix(id) else {
                continue;
            };
            let mut min = Vec2::splat(f32::INFINITY);
            let mut max = Vec2::splat(f32::NEG_INFINITY);
            let mut depth = f32::INFINITY;
            let mut visible = false;
            for corner in geometry.bounds().corners() {
                if let Some((screen, d)) = self.project(world.transform_point3(corner), view_w, view_h)
                {
                    min = min.min(screen);
                    max = max.max(screen);
                    depth = depth.min(d);
                    visible = true;
                }
            }
            if !visible
                || cursor.x < min.x
                || cursor.x > max.x
                || cursor.y < min.y
                || cursor.y > max.y
            {
                continue;
            }
            let area = (max.x - min.x) * (max.y - min.y);
            let seq = store.creation_order(id);
            let candidate = (depth, area, seq, id);
            let better = match &best {
                None => true,
                Some((bd, ba, bs, _)) => {
                    match depth.total_cmp(bd) {
                        std::cmp::Ordering::Less => true,
                        std::cmp::Ordering::Greater => false,
                        std::cmp::Ordering::Equal => match area.total_cmp(ba) {
                            std::cmp::Ordering::Less => true,
                            std::cmp::Ordering::Greater => false,
                            std::cmp::Ordering::Equal => seq < *bs,
                        },
                    }
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        best.map(|(_, _, _, id)| id)
    }

    /// All mesh entities whose projected world position falls inside `rect`.
    pub fn select_entities_in_rect(
        &self,
        store: &EntityStore,
        rect: Rect,
        view_w: f32,
        view_h: f32,
    ) -> Vec<EntityId> {
        store
            .iter_active()
            .filter(|&id| {
                let Some(world) = store.world_matrix(id) else {
                    return false;
                };
                let origin = world.transform_point3(Vec3::ZERO);
                self.project(origin, view_w, view_h)
                    .is_some_and(|(screen, _)| rect.contains(screen))
            })
            .collect()
    }

    /// All vertex ids of `entity`'s mesh whose projection falls inside
    /// `rect`.
    pub fn select_vertices_in_rect(
        &self,
        store: &EntityStore,
        geometry: &MeshGeometry,
        entity: EntityId,
        rect: Rect,
        view_w: f32,
        view_h: f32,
    ) -> Vec<VertexId> {
        let Some(world) = store.world_matrix(entity) else {
            return Vec::new();
        };
        geometry
            .positions
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| {
                let world_pos = world.transform_point3(Vec3::from(p));
                self.project(world_pos, view_w, view_h)
                    .filter(|&(screen, _)| rect.contains(screen))
                    .map(|_| i as VertexId)
            })
            .collect()
    }

    /// Single-click component pick with the fixed priority vertex > edge >
    /// face: nearest vertex inside a pixel radius wins; failing that the
    /// nearest edge inside a narrower segment-distance threshold; failing
    /// that the front-most face containing the cursor (point-in-polygon over
    /// the face's triangulated fan).
    pub fn pick_mesh_component(
        &self,
        store: &EntityStore,
        geometry: &MeshGeometry,
        entity: EntityId,
        x: f32,
        y: f32,
        view_w: f32,
        view_h: f32,
    ) -> Option<PickedComponent> {
        let projected = self.project_vertices(store, geometry, entity, view_w, view_h)?;
        let cursor = Vec2::new(x, y);

        if let Some(vertex) = nearest_vertex(&projected, cursor, VERTEX_PICK_RADIUS_PX) {
            return Some(PickedComponent::Vertex(vertex));
        }
        if let Some(edge) = nearest_edge(geometry, &projected, cursor, EDGE_PICK_RADIUS_PX) {
            return Some(PickedComponent::Edge(edge));
        }
        front_face_at(geometry, &projected, cursor).map(PickedComponent::Face)
    }

    /// Mode-filtered variant of `pick_mesh_component`: only the stage
    /// matching the active granularity runs, so clicking the middle of a
    /// face in face mode is never shadowed by a nearby vertex.
    pub fn pick_component_for_mode(
        &self,
        store: &EntityStore,
        geometry: &MeshGeometry,
        entity: EntityId,
        x: f32,
        y: f32,
        view_w: f32,
        view_h: f32,
    ) -> Option<PickedComponent> {
        let projected = self.project_vertices(store, geometry, entity, view_w, view_h)?;
        let cursor = Vec2::new(x, y);
        match self.mode {
            ComponentMode::Vertex | ComponentMode::Uv => {
                nearest_vertex(&projected, cursor, VERTEX_PICK_RADIUS_PX)
                    .map(PickedComponent::Vertex)
            }
            ComponentMode::Edge => {
                nearest_edge(geometry, &projected, cursor, EDGE_PICK_RADIUS_PX)
                    .map(PickedComponent::Edge)
            }
            ComponentMode::Face => front_face_at(geometry, &projected, cursor).map(PickedComponent::Face),
            ComponentMode::Object => None,
        }
    }

    /// All vertices inside a screen-space brush circle, added to (or
    /// replacing) the vertex sub-selection.
    pub fn select_vertices_in_brush(
        &mut self,
        store: &EntityStore,
        geometry: &MeshGeometry,
        entity: EntityId,
        x: f32,
        y: f32,
        view_w: f32,
        view_h: f32,
        radius_px: f32,
        additive: bool,
    ) -> usize {
        let Some(projected) = self.project_vertices(store, geometry, entity, view_w, view_h) else {
            return 0;
        };
        let cursor = Vec2::new(x, y);
        let hits: Vec<VertexId> = projected
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                p.filter(|&(screen, _)| screen.distance(cursor) <= radius_px)
                    .map(|_| i as VertexId)
            })
            .collect();
        if !additive {
            self.sub.vertices.clear();
        }
        let count = hits.len();
        self.sub.vertices.extend(hits);
        count
    }

    /// Extend the current edge or face sub-selection into full topology
    /// loops. Other granularities are a no-op.
    pub fn select_loop(&mut self, geometry: &MeshGeometry) {
        match self.mode {
            ComponentMode::Edge => {
                self.sub.edges = loops::extend_edge_loops(geometry, &self.sub.edges);
            }
            ComponentMode::Face => {
                self.sub.faces = loops::extend_face_loops(geometry, &self.sub.faces);
            }
            _ => {}
        }
    }

    /// Apply a set mutation to one sub-selection set. Out-of-range ids are
    /// skipped individually so a partially valid batch still applies; every
    /// action is idempotent and order-independent within a single call.
    pub fn modify_sub(&mut self, elems: SubElems, action: SelectAction, geometry: &MeshGeometry) {
        let vertex_count = geometry.vertex_count() as u32;
        let face_count = geometry.faces.len() as u32;
        match elems {
            SubElems::Vertices(ids) => {
                let valid = ids.into_iter().filter(|&v| v < vertex_count);
                apply_action(&mut self.sub.vertices, valid, action);
            }
            SubElems::Edges(pairs) => {
                let valid = pairs
                    .into_iter()
                    .filter(|&(a, b)| a < vertex_count && b < vertex_count && a != b)
                    .map(|(a, b)| EdgeKey::new(a, b));
                apply_action(&mut self.sub.edges, valid, action);
            }
            SubElems::Faces(ids) => {
                let valid = ids.into_iter().filter(|&f| f < face_count);
                apply_action(&mut self.sub.faces, valid, action);
            }
            SubElems::Uvs(ids) => {
                let valid = ids.into_iter().filter(|&v| v < vertex_count);
                apply_action(&mut self.sub.uv_vertices, valid, action);
            }
        }
    }

    pub fn selection_as_vertices(&self, geometry: &MeshGeometry) -> HashSet<VertexId> {
        self.sub.as_vertices(geometry)
    }

    fn project_vertices(
        &self,
        store: &EntityStore,
        geometry: &MeshGeometry,
        entity: EntityId,
        view_w: f32,
        view_h: f32,
    ) -> Option<Vec<Option<(Vec2, f32)>>> {
        let world = store.world_matrix(entity)?;
        Some(
            geometry
                .positions
                .iter()
                .map(|&p| self.project(world.transform_point3(Vec3::from(p)), view_w, view_h))
                .collect(),
        )
    }
}

fn apply_action<T: std::hash::Hash + Eq + Copy>(
    set: &mut HashSet<T>,
    ids: impl Iterator<Item = T>,
    action: SelectAction,
) {
    match action {
        SelectAction::Set => {
            set.clear();
            set.extend(ids);
        }
        SelectAction::Add => set.extend(ids),
        SelectAction::Remove => {
            for id in ids {
                set.remove(&id);
            }
        }
        SelectAction::Toggle => {
            // Dedupe first: toggling must flip each id once per call
            // regardless of repetition in the batch.
            let unique: HashSet<T> = ids.collect();
            for id in unique {
                if !set.insert(id) {
                    set.remove(&id);
                }
            }
        }
    }
}

fn nearest_vertex(
    projected: &[Option<(Vec2, f32)>],
    cursor: Vec2,
    radius_px: f32,
) -> Option<VertexId> {
    let mut best: Option<(f32, VertexId)> = None;
    for (i, p) in projected.iter().enumerate() {
        let Some((screen, _)) = p else { continue };
        let distance = screen.distance(cursor);
        if distance <= radius_px && best.map_or(true, |(bd, _)| distance < bd) {
            best = Some((distance, i as VertexId));
        }
    }
    best.map(|(_, v)| v)
}

fn nearest_edge(
    geometry: &MeshGeometry,
    projected: &[Option<(Vec2, f32)>],
    cursor: Vec2,
    radius_px: f32,
) -> Option<EdgeKey> {
    let mut best: Option<(f32, EdgeKey)> = None;
    let mut consider = |a: u32, b: u32| {
        let (Some(Some((pa, _))), Some(Some((pb, _)))) =
            (projected.get(a as usize), projected.get(b as usize))
        else {
            return;
        };
        let distance = point_segment_distance(cursor, *pa, *pb);
        let key = EdgeKey::new(a, b);
        if distance <= radius_px && best.map_or(true, |(bd, _)| distance < bd) {
            best = Some((distance, key));
        }
    };
    if geometry.faces.is_empty() {
        for tri in geometry.indices.chunks_exact(3) {
            consider(tri[0], tri[1]);
            consider(tri[1], tri[2]);
            consider(tri[2], tri[0]);
        }
    } else {
        for face in &geometry.faces {
            for i in 0..face.len() {
                consider(face[i], face[(i + 1) % face.len()]);
            }
        }
    }
    best.map(|(_, e)| e)
}

fn front_face_at(
    geometry: &MeshGeometry,
    projected: &[Option<(Vec2, f32)>],
    cursor: Vec2,
) -> Option<FaceId> {
    let mut best: Option<(f32, FaceId)> = None;
    for (face_id, face) in geometry.faces.iter().enumerate() {
        if face.len() < 3 {
            continue;
        }
        // Triangulated fan around the first ring vertex.
        for i in 1..face.len() - 1 {
            let ids = [face[0], face[i], face[i + 1]];
            let mut screen = [Vec2::ZERO; 3];
            let mut depth = 0.0;
            let mut ok = true;
            for (slot, &v) in ids.iter().enumerate() {
                match projected.get(v as usize).copied().flatten() {
                    Some((p, d)) => {
                        screen[slot] = p;
                        depth += d / 3.0;
                    }
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            if !ok || !point_in_triangle(cursor, screen[0], screen[1], screen[2]) {
                continue;
            }
            if best.map_or(true, |(bd, _)| depth < bd) {
                best = Some((depth, face_id as FaceId));
            }
        }
    }
    best.map(|(_, f)| f)
}

fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let length_sq = ab.length_squared();
    if length_sq <= 1e-12 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / length_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let sign = |p1: Vec2, p2: Vec2, p3: Vec2| (p1.x - p3.x) * (p2.y - p3.y) - (p2.x - p3.x) * (p1.y - p3.y);
    let d1 = sign(p, a, b);
    let d2 = sign(p, b, c);
    let d3 = sign(p, c, a);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::unit_quad;

    const VIEW_W: f32 = 400.0;
    const VIEW_H: f32 = 400.0;

    /// Identity view-projection: NDC x/y map straight to the viewport, so a
    /// world point (wx, wy) lands at ((wx*0.5+0.5)*w, (1-(wy*0.5+0.5))*h).
    fn system_with_quad(store: &mut EntityStore) -> (SelectionSystem, EntityId) {
        let mut selection = SelectionSystem::new();
        selection.set_view_projection(Mat4::IDENTITY);
        let entity = store.create_entity("quad");
        store.set_mesh_type(entity, 1);
        store.set_world_matrix(entity, Mat4::IDENTITY);
        (selection, entity)
    }

    #[test]
    fn rect_containment_is_half_open() {
        let rect = Rect::from_corners(Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0));
        assert!(rect.contains(Vec2::new(0.0, 0.0)));
        assert!(rect.contains(Vec2::new(99.9, 50.0)));
        assert!(!rect.contains(Vec2::new(100.0, 50.0)));
    }

    #[test]
    fn rect_selection_picks_only_contained_vertex() {
        // Two-vertex segment at screen (10,10) and (200,200); box
        // (0,0)-(100,100) must select exactly the first.
        let mut store = EntityStore::new();
        let (selection, entity) = system_with_quad(&mut store);
        // Screen (10,10) <- ndc (-0.95, 0.95); screen (200,200) <- ndc (0,0).
        let geometry = MeshGeometry::from_buffers(
            vec![[-0.95, 0.95, 0.0], [0.0, 0.0, 0.0]],
            vec![[0.0, 0.0], [1.0, 1.0]],
            Vec::new(),
            Vec::new(),
        );
        let rect = Rect::from_corners(Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0));
        let hits =
            selection.select_vertices_in_rect(&store, &geometry, entity, rect, VIEW_W, VIEW_H);
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn behind_camera_points_never_hit() {
        let mut store = EntityStore::new();
        let (mut selection, entity) = system_with_quad(&mut store);
        // Perspective-style matrix mapping w to -z; a point with z = +1 has
        // negative w and must be culled.
        let vp = Mat4::from_cols_array_2d(&[
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, -1.0],
            [0.0, 0.0, 0.0, 0.0],
        ]);
        selection.set_view_projection(vp);
        let geometry = MeshGeometry::from_buffers(
            vec![[0.0, 0.0, 1.0]],
            vec![[0.0, 0.0]],
            Vec::new(),
            Vec::new(),
        );
        let rect = Rect::from_corners(Vec2::ZERO, Vec2::new(VIEW_W, VIEW_H));
        let hits =
            selection.select_vertices_in_rect(&store, &geometry, entity, rect, VIEW_W, VIEW_H);
        assert!(hits.is_empty());
    }

    #[test]
    fn toggle_twice_restores_original_set() {
        let mut selection = SelectionSystem::new();
        let quad = unit_quad();
        selection.modify_sub(SubElems::Vertices(vec![0, 1]), SelectAction::Set, &quad);
        let before = selection.sub().clone();
        selection.modify_sub(SubElems::Vertices(vec![1, 2]), SelectAction::Toggle, &quad);
        selection.modify_sub(SubElems::Vertices(vec![1, 2]), SelectAction::Toggle, &quad);
        assert_eq!(*selection.sub(), before);
    }

    #[test]
    fn edge_keys_canonicalize_across_direction() {
        let mut selection = SelectionSystem::new();
        let quad = unit_quad();
        selection.modify_sub(SubElems::Edges(vec![(0, 1)]), SelectAction::Add, &quad);
        selection.modify_sub(SubElems::Edges(vec![(1, 0)]), SelectAction::Add, &quad);
        assert_eq!(selection.sub().edges.len(), 1);
        selection.modify_sub(SubElems::Edges(vec![(1, 0)]), SelectAction::Remove, &quad);
        assert!(selection.sub().edges.is_empty());
    }

    #[test]
    fn out_of_range_ids_are_skipped_not_rejected() {
        let mut selection = SelectionSystem::new();
        let quad = unit_quad();
        selection.modify_sub(
            SubElems::Vertices(vec![0, 99, 2]),
            SelectAction::Set,
            &quad,
        );
        let mut expected = HashSet::new();
        expected.insert(0);
        expected.insert(2);
        assert_eq!(selection.sub().vertices, expected);
        selection.modify_sub(SubElems::Faces(vec![7]), SelectAction::Add, &quad);
        assert!(selection.sub().faces.is_empty());
    }

    #[test]
    fn as_vertices_flattens_every_granularity() {
        let mut selection = SelectionSystem::new();
        let quad = unit_quad();
        selection.modify_sub(SubElems::Edges(vec![(0, 1)]), SelectAction::Add, &quad);
        selection.modify_sub(SubElems::Faces(vec![0]), SelectAction::Add, &quad);
        let vertices = selection.selection_as_vertices(&quad);
        assert_eq!(vertices, HashSet::from([0, 1, 2, 3]));
    }

    #[test]
    fn switching_active_entity_clears_sub_selection() {
        let mut store = EntityStore::new();
        let (mut selection, a) = system_with_quad(&mut store);
        let b = store.create_entity("other");
        let quad = unit_quad();
        selection.set_selected(&[a], &store);
        selection.modify_sub(SubElems::Vertices(vec![0]), SelectAction::Set, &quad);
        assert!(!selection.sub().is_empty());
        selection.set_selected(&[b], &store);
        assert!(selection.sub().is_empty());
        assert_eq!(selection.active(), Some(b));
    }

    #[test]
    fn set_selected_skips_stale_ids() {
        let mut store = EntityStore::new();
        let (mut selection, a) = system_with_quad(&mut store);
        let b = store.create_entity("gone");
        store.delete_entity(b);
        assert!(selection.set_selected(&[b, a, a], &store));
        assert_eq!(selection.selected(), &[a]);
    }

    #[test]
    fn component_pick_prefers_vertex_then_edge_then_face() {
        let mut store = EntityStore::new();
        let (selection, entity) = system_with_quad(&mut store);
        // Quad spanning ndc [-0.5, 0.5]^2 -> screen [100, 300]^2.
        let geometry = MeshGeometry::from_buffers(
            vec![
                [-0.5, -0.5, 0.0],
                [0.5, -0.5, 0.0],
                [0.5, 0.5, 0.0],
                [-0.5, 0.5, 0.0],
            ],
            vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            vec![0, 1, 2, 0, 2, 3],
            vec![vec![0, 1, 2, 3]],
        );
        // Vertex 0 is at screen (100, 300).
        let hit = selection
            .pick_mesh_component(&store, &geometry, entity, 103.0, 298.0, VIEW_W, VIEW_H)
            .unwrap();
        assert_eq!(hit, PickedComponent::Vertex(0));
        // Middle of the bottom edge, well away from any vertex.
        let hit = selection
            .pick_mesh_component(&store, &geometry, entity, 200.0, 301.0, VIEW_W, VIEW_H)
            .unwrap();
        assert_eq!(hit, PickedComponent::Edge(EdgeKey::new(0, 1)));
        // Dead center of the face.
        let hit = selection
            .pick_mesh_component(&store, &geometry, entity, 200.0, 200.0, VIEW_W, VIEW_H)
            .unwrap();
        assert_eq!(hit, PickedComponent::Face(0));
        // Far outside everything.
        assert!(selection
            .pick_mesh_component(&store, &geometry, entity, 10.0, 10.0, VIEW_W, VIEW_H)
            .is_none());
    }

    #[test]
    fn mode_filtered_pick_ignores_other_granularities() {
        let mut store = EntityStore::new();
        let (mut selection, entity) = system_with_quad(&mut store);
        let geometry = MeshGeometry::from_buffers(
            vec![
                [-0.5, -0.5, 0.0],
                [0.5, -0.5, 0.0],
                [0.5, 0.5, 0.0],
                [-0.5, 0.5, 0.0],
            ],
            vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            vec![0, 1, 2, 0, 2, 3],
            vec![vec![0, 1, 2, 3]],
        );
        selection.set_mode(ComponentMode::Face);
        // Clicking right on a vertex still returns the face in face mode.
        let hit = selection
            .pick_component_for_mode(&store, &geometry, entity, 102.0, 298.0, VIEW_W, VIEW_H)
            .unwrap();
        assert_eq!(hit, PickedComponent::Face(0));
    }

    #[test]
    fn brush_select_replaces_or_extends() {
        let mut store = EntityStore::new();
        let (mut selection, entity) = system_with_quad(&mut store);
        let geometry = MeshGeometry::from_buffers(
            vec![[-0.5, -0.5, 0.0], [0.5, 0.5, 0.0]],
            vec![[0.0, 0.0], [1.0, 1.0]],
            Vec::new(),
            Vec::new(),
        );
        // Vertex 0 at screen (100, 300), vertex 1 at (300, 100).
        selection.select_vertices_in_brush(
            &store, &geometry, entity, 100.0, 300.0, VIEW_W, VIEW_H, 20.0, false,
        );
        assert_eq!(selection.sub().vertices, HashSet::from([0]));
        selection.select_vertices_in_brush(
            &store, &geometry, entity, 300.0, 100.0, VIEW_W, VIEW_H, 20.0, true,
        );
        assert_eq!(selection.sub().vertices, HashSet::from([0, 1]));
        selection.select_vertices_in_brush(
            &store, &geometry, entity, 300.0, 100.0, VIEW_W, VIEW_H, 20.0, false,
        );
        assert_eq!(selection.sub().vertices, HashSet::from([1]));
    }

    #[test]
    fn entity_pick_prefers_nearer_then_smaller() {
        let mut store = EntityStore::new();
        let mut assets = MeshAssets::new();
        let mut selection = SelectionSystem::new();
        selection.set_view_projection(Mat4::IDENTITY);
        assets.register(1, unit_quad());

        let near = store.create_entity("near");
        store.set_mesh_type(near, 1);
        store.set_world_matrix(near, Mat4::from_translation(Vec3::new(0.0, 0.0, -0.5)));
        let far = store.create_entity("far");
        store.set_mesh_type(far, 1);
        store.set_world_matrix(far, Mat4::from_translation(Vec3::new(0.0, 0.0, 0.5)));

        // Both quads cover screen center-right; the nearer one wins.
        let hit = selection.select_entity_at(&store, &assets, 250.0, 150.0, VIEW_W, VIEW_H);
        assert_eq!(hit, Some(near));
    }

    #[test]
    fn exact_tie_picks_older_entity_even_after_slot_reuse() {
        let mut store = EntityStore::new();
        let mut assets = MeshAssets::new();
        let mut selection = SelectionSystem::new();
        selection.set_view_projection(Mat4::IDENTITY);
        assets.register(1, unit_quad());

        // "newer" reclaims the deleted placeholder's slot 0, so its slot
        // index is lower than "older"'s even though it was created last.
        let placeholder = store.create_entity("placeholder");
        let older = store.create_entity("older");
        store.set_mesh_type(older, 1);
        store.set_world_matrix(older, Mat4::IDENTITY);
        store.delete_entity(placeholder);
        let newer = store.create_entity("newer");
        store.set_mesh_type(newer, 1);
        store.set_world_matrix(newer, Mat4::IDENTITY);
        assert!(newer.index() < older.index());

        let hit = selection.select_entity_at(&store, &assets, 250.0, 150.0, VIEW_W, VIEW_H);
        assert_eq!(hit, Some(older));
    }

    #[test]
    fn drop_entity_clears_active_references() {
        let mut store = EntityStore::new();
        let (mut selection, a) = system_with_quad(&mut store);
        let b = store.create_entity("b");
        selection.set_selected(&[a, b], &store);
        selection.drop_entity(a);
        assert_eq!(selection.selected(), &[b]);
        assert_eq!(selection.active(), Some(b));
    }
}
