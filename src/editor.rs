//! Top-level editor runtime.
//!
//! `Editor` owns every subsystem and is the single entry point the UI layer
//! talks to. Commands mutate the entity store, scene graph, selection, and
//! sculpt state; `tick` then flushes the dirty transforms, geometry, and
//! weight buffers to the render backend and submits the frame.

use crate::assets::{GeometryChannels, MeshAssets, PartialGeometry};
use crate::events::{EditorEvent, EventBus};
use crate::geometry::MeshGeometry;
use crate::gpu::RenderBackend;
use crate::graph::SceneGraph;
use crate::render::MeshRenderSystem;
use crate::sculpt::{DragMode, FalloffKind, SculptSettings, SculptSystem};
use crate::select::{ComponentMode, Rect, SelectAction, SelectionSystem, SubElems};
use crate::serialization::{EntityRow, SceneSnapshot};
use crate::store::{Component, EntityId, EntityStore};
use glam::{Mat4, Vec3};
use std::collections::{HashMap, HashSet};

pub struct Editor<B: RenderBackend> {
    store: EntityStore,
    graph: SceneGraph,
    assets: MeshAssets,
    selection: SelectionSystem,
    sculpt: SculptSystem,
    render: MeshRenderSystem,
    events: EventBus,
    backend: B,
    /// Geometry channels changed since the last tick, per mesh id.
    dirty_geometry: HashMap<u32, GeometryChannels>,
    /// Pre-drag position buffer of the active drag, for cancel.
    drag_revert: Option<(u32, Vec<[f32; 3]>)>,
}

impl<B: RenderBackend> Editor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            store: EntityStore::new(),
            graph: SceneGraph::new(),
            assets: MeshAssets::new(),
            selection: SelectionSystem::new(),
            sculpt: SculptSystem::new(),
            render: MeshRenderSystem::new(),
            events: EventBus::new(),
            backend,
            dirty_geometry: HashMap::new(),
            drag_revert: None,
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn assets(&self) -> &MeshAssets {
        &self.assets
    }

    pub fn selection(&self) -> &SelectionSystem {
        &self.selection
    }

    pub fn sculpt(&self) -> &SculptSystem {
        &self.sculpt
    }

    pub fn render(&self) -> &MeshRenderSystem {
        &self.render
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn on_event(&mut self, listener: impl FnMut(&EditorEvent) + 'static) {
        self.events.on(listener);
    }

    // ========================================================================
    // Entity lifecycle
    // ========================================================================

    pub fn create_entity(&mut self, name: &str) -> EntityId {
        let id = self.store.create_entity(name);
        self.graph.register(id);
        id
    }

    pub fn delete_entity(&mut self, id: EntityId) -> bool {
        if !self.store.delete_entity(id) {
            return false;
        }
        self.graph.remove(id);
        let was_selected = self.selection.selected().contains(&id);
        self.selection.drop_entity(id);
        if was_selected {
            self.sculpt.mark_selection_changed();
            self.events.emit(&EditorEvent::SelectionChanged {
                ids: self.selection.selected().to_vec(),
            });
        }
        true
    }

    /// Reparent `child` under `parent` (or to the root with `None`).
    /// Refused, with a warning, when it would create a cycle.
    pub fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) -> bool {
        self.graph.attach(child, parent)
    }

    pub fn set_position(&mut self, id: EntityId, position: [f32; 3]) {
        self.store.set_position(id, position);
        self.graph.set_dirty(id);
    }

    pub fn set_rotation_deg(&mut self, id: EntityId, rotation: [f32; 3]) {
        self.store.set_rotation_deg(id, rotation);
        self.graph.set_dirty(id);
    }

    pub fn set_scale(&mut self, id: EntityId, scale: [f32; 3]) {
        self.store.set_scale(id, scale);
        self.graph.set_dirty(id);
        // Effective sculpt radius depends on entity scale.
        self.sculpt.mark_selection_changed();
    }

    pub fn set_mesh_type(&mut self, id: EntityId, mesh_type: u32) {
        self.store.set_mesh_type(id, mesh_type);
    }

    pub fn set_material_index(&mut self, id: EntityId, material: u32) {
        self.store.set_material_index(id, material);
    }

    pub fn set_base_color(&mut self, id: EntityId, color: [f32; 3]) {
        self.store.set_base_color(id, color);
    }

    pub fn set_texture_index(&mut self, id: EntityId, texture: i32) {
        self.store.set_texture_index(id, texture);
    }

    pub fn set_effect_index(&mut self, id: EntityId, effect: f32) {
        self.store.set_effect_index(id, effect);
    }

    // ========================================================================
    // Mesh assets
    // ========================================================================

    pub fn register_mesh_asset(&mut self, mesh_id: u32, geometry: MeshGeometry) {
        self.assets.register(mesh_id, geometry);
        if let Some(geometry) = self.assets.get(mesh_id) {
            self.render.register_mesh(&mut self.backend, mesh_id, geometry);
        }
        self.dirty_geometry.remove(&mesh_id);
    }

    pub fn remove_mesh_asset(&mut self, mesh_id: u32) {
        if self.assets.remove(mesh_id).is_none() {
            return;
        }
        self.render.unregister_mesh(&mut self.backend, mesh_id);
        self.sculpt.drop_mesh(mesh_id);
        self.dirty_geometry.remove(&mesh_id);
    }

    /// Apply a partial geometry update and queue the changed channels for
    /// upload on the next tick.
    pub fn update_asset_geometry(&mut self, mesh_id: u32, update: PartialGeometry) {
        let channels = self.assets.update_geometry(mesh_id, update);
        if !channels.any() {
            return;
        }
        self.dirty_geometry.entry(mesh_id).or_default().merge(channels);
        if channels.positions {
            self.sculpt.mark_selection_changed();
        }
        self.events.emit(&EditorEvent::GeometryChanged { mesh_id });
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn set_component_mode(&mut self, mode: ComponentMode) {
        if self.selection.mode() == mode {
            return;
        }
        self.selection.set_mode(mode);
        if self.selection.clear_sub() {
            self.sculpt.mark_selection_changed();
            self.events.emit(&EditorEvent::SubSelectionChanged);
        }
    }

    pub fn set_selected(&mut self, ids: &[EntityId]) {
        if self.selection.set_selected(ids, &self.store) {
            self.sculpt.mark_selection_changed();
            self.events.emit(&EditorEvent::SelectionChanged {
                ids: self.selection.selected().to_vec(),
            });
        }
    }

    pub fn clear_selection(&mut self) {
        if self.selection.clear() {
            self.sculpt.mark_selection_changed();
            self.events
                .emit(&EditorEvent::SelectionChanged { ids: Vec::new() });
        }
    }

    /// Click selection. In object mode picks the entity under the cursor;
    /// in component modes picks a vertex, edge, or face of the active
    /// entity and applies `action` to its sub-selection set.
    pub fn click_select(
        &mut self,
        x: f32,
        y: f32,
        view_w: f32,
        view_h: f32,
        action: SelectAction,
    ) {
        if self.selection.mode() == ComponentMode::Object {
            let hit = self
                .selection
                .select_entity_at(&self.store, &self.assets, x, y, view_w, view_h);
            match (hit, action) {
                (Some(id), _) => self.merge_object_selection(&[id], action),
                (None, SelectAction::Set) => self.clear_selection(),
                (None, _) => {}
            }
            return;
        }
        let Some((entity, mesh_id)) = self.active_mesh() else {
            return;
        };
        let Some(geometry) = self.assets.get(mesh_id) else {
            return;
        };
        let picked = self
            .selection
            .pick_component_for_mode(&self.store, geometry, entity, x, y, view_w, view_h);
        let Some(picked) = picked else {
            if action == SelectAction::Set {
                self.clear_sub_selection();
            }
            return;
        };
        let elems = match picked {
            // UV mode picks in geometric space but edits the UV vertex set.
            crate::select::PickedComponent::Vertex(v)
                if self.selection.mode() == ComponentMode::Uv =>
            {
                SubElems::Uvs(vec![v])
            }
            crate::select::PickedComponent::Vertex(v) => SubElems::Vertices(vec![v]),
            crate::select::PickedComponent::Edge(e) => {
                SubElems::Edges(vec![e.endpoints()])
            }
            crate::select::PickedComponent::Face(f) => SubElems::Faces(vec![f]),
        };
        self.modify_sub_selection(elems, action);
    }

    /// Apply `action` to the object selection list with `hits` as the
    /// operand. Set replaces; the others merge with what is already
    /// selected.
    fn merge_object_selection(&mut self, hits: &[EntityId], action: SelectAction) {
        if action == SelectAction::Set {
            self.set_selected(hits);
            return;
        }
        let mut ids = self.selection.selected().to_vec();
        match action {
            SelectAction::Add => {
                for &id in hits {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
            SelectAction::Remove => ids.retain(|id| !hits.contains(id)),
            SelectAction::Toggle => {
                for &id in hits {
                    if let Some(at) = ids.iter().position(|&e| e == id) {
                        ids.remove(at);
                    } else {
                        ids.push(id);
                    }
                }
            }
            SelectAction::Set => {}
        }
        self.set_selected(&ids);
    }

    /// Marquee selection: entities in object mode, vertices of the active
    /// entity otherwise.
    pub fn rect_select(
        &mut self,
        rect: Rect,
        view_w: f32,
        view_h: f32,
        action: SelectAction,
    ) {
        if self.selection.mode() == ComponentMode::Object {
            let hits = self
                .selection
                .select_entities_in_rect(&self.store, rect, view_w, view_h);
            self.merge_object_selection(&hits, action);
            return;
        }
        let Some((entity, mesh_id)) = self.active_mesh() else {
            return;
        };
        let Some(geometry) = self.assets.get(mesh_id) else {
            return;
        };
        let hits = self.selection.select_vertices_in_rect(
            &self.store,
            geometry,
            entity,
            rect,
            view_w,
            view_h,
        );
        let elems = if self.selection.mode() == ComponentMode::Uv {
            SubElems::Uvs(hits)
        } else {
            SubElems::Vertices(hits)
        };
        self.modify_sub_selection(elems, action);
    }

    pub fn brush_select(
        &mut self,
        x: f32,
        y: f32,
        view_w: f32,
        view_h: f32,
        radius_px: f32,
        additive: bool,
    ) {
        let Some((entity, mesh_id)) = self.active_mesh() else {
            return;
        };
        let Some(geometry) = self.assets.get(mesh_id) else {
            return;
        };
        let hit_count = self.selection.select_vertices_in_brush(
            &self.store,
            geometry,
            entity,
            x,
            y,
            view_w,
            view_h,
            radius_px,
            additive,
        );
        if hit_count > 0 || !additive {
            self.sculpt.mark_selection_changed();
            self.events.emit(&EditorEvent::SubSelectionChanged);
        }
    }

    /// Grow the edge or face sub-selection into full topology loops.
    pub fn select_loop(&mut self) {
        let Some((_, mesh_id)) = self.active_mesh() else {
            return;
        };
        let Some(geometry) = self.assets.get(mesh_id) else {
            return;
        };
        self.selection.select_loop(geometry);
        self.sculpt.mark_selection_changed();
        self.events.emit(&EditorEvent::SubSelectionChanged);
    }

    pub fn modify_sub_selection(&mut self, elems: SubElems, action: SelectAction) {
        let Some((_, mesh_id)) = self.active_mesh() else {
            return;
        };
        let Some(geometry) = self.assets.get(mesh_id) else {
            return;
        };
        self.selection.modify_sub(elems, action, geometry);
        self.sculpt.mark_selection_changed();
        self.events.emit(&EditorEvent::SubSelectionChanged);
    }

    pub fn clear_sub_selection(&mut self) {
        if self.selection.clear_sub() {
            self.sculpt.mark_selection_changed();
            self.events.emit(&EditorEvent::SubSelectionChanged);
        }
    }

    pub fn focus_selected(&mut self) {
        let ids = self.selection.selected().to_vec();
        if !ids.is_empty() {
            self.events.emit(&EditorEvent::FocusRequested { ids });
        }
    }

    // ========================================================================
    // Sculpt
    // ========================================================================

    pub fn set_sculpt_enabled(&mut self, enabled: bool) {
        self.sculpt.set_enabled(enabled);
    }

    pub fn set_sculpt_radius(&mut self, radius: f32) {
        self.sculpt.set_radius(radius);
    }

    pub fn set_sculpt_mode(&mut self, mode: DragMode) {
        self.sculpt.set_mode(mode);
    }

    pub fn set_sculpt_falloff(&mut self, falloff: FalloffKind) {
        self.sculpt.set_falloff(falloff);
    }

    pub fn set_heatmap_visible(&mut self, visible: bool) {
        self.sculpt.set_heatmap_visible(visible);
    }

    /// Begin dragging the sub-selected vertices of the active entity.
    /// Returns false when there is no active mesh entity or the
    /// sub-selection flattens to no vertices.
    pub fn begin_vertex_drag(&mut self) -> bool {
        let Some((entity, mesh_id)) = self.active_mesh() else {
            return false;
        };
        let Some(geometry) = self.assets.get(mesh_id) else {
            return false;
        };
        let selected = self.selection.selection_as_vertices(geometry);
        let scale = self.store.max_axis_scale(entity);
        if !self
            .sculpt
            .start_vertex_drag(entity, mesh_id, geometry, &selected, scale)
        {
            return false;
        }
        self.drag_revert = Some((mesh_id, geometry.positions.clone()));
        true
    }

    /// Move the drag to cumulative displacement `delta` from its start.
    pub fn update_vertex_drag(&mut self, delta: Vec3) {
        let Some(mesh_id) = self.drag_revert.as_ref().map(|(m, _)| *m) else {
            return;
        };
        let Some(geometry) = self.assets.get_mut(mesh_id) else {
            return;
        };
        self.sculpt.update_vertex_drag(geometry, delta);
        self.dirty_geometry
            .entry(mesh_id)
            .or_default()
            .merge(GeometryChannels {
                positions: true,
                ..Default::default()
            });
    }

    /// Commit the drag. Displacements below the commit epsilon are
    /// discarded (a click, not a sculpt).
    pub fn end_vertex_drag(&mut self) {
        let Some((mesh_id, _)) = self.drag_revert.take() else {
            return;
        };
        let Some(geometry) = self.assets.get_mut(mesh_id) else {
            self.sculpt.clear_deformation();
            return;
        };
        let committed = self.sculpt.end_vertex_drag(geometry).is_some();
        let channels = GeometryChannels {
            positions: true,
            normals: committed,
            ..Default::default()
        };
        self.dirty_geometry.entry(mesh_id).or_default().merge(channels);
        if committed {
            self.events.emit(&EditorEvent::GeometryChanged { mesh_id });
        }
    }

    /// Abort the drag and restore the pre-drag position buffer.
    pub fn cancel_vertex_drag(&mut self) {
        let Some((mesh_id, snapshot)) = self.drag_revert.take() else {
            return;
        };
        self.sculpt.clear_deformation();
        if let Some(geometry) = self.assets.get_mut(mesh_id) {
            if geometry.positions.len() == snapshot.len() {
                geometry.positions = snapshot;
                self.dirty_geometry
                    .entry(mesh_id)
                    .or_default()
                    .merge(GeometryChannels {
                        positions: true,
                        ..Default::default()
                    });
            }
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn snapshot(&self) -> SceneSnapshot {
        let mut entities = Vec::with_capacity(self.store.active_count());
        for id in self.store.iter_active() {
            let Some(name) = self.store.name(id) else {
                continue;
            };
            let parent = self
                .graph
                .parent(id)
                .and_then(|p| self.store.name(p))
                .map(str::to_string);
            entities.push(EntityRow {
                name: name.to_string(),
                position: self.store.position(id).unwrap_or([0.0; 3]),
                rotation_deg: self.store.rotation_deg(id).unwrap_or([0.0; 3]),
                scale: self.store.scale(id).unwrap_or([1.0; 3]),
                components: self.store.components(id),
                mesh_type: self.store.mesh_type(id),
                material_index: self.store.material_index(id),
                base_color: self.store.base_color(id).unwrap_or([1.0; 3]),
                texture_index: self.store.texture_index(id),
                effect_index: self.store.effect_index(id),
                parent,
            });
        }
        SceneSnapshot {
            entities,
            sculpt: *self.sculpt.settings(),
        }
    }

    /// Replace the current scene with the snapshot's contents. Runtime
    /// state (selection, drags, GPU buckets) resets; mesh assets are kept.
    pub fn restore(&mut self, snapshot: &SceneSnapshot) {
        self.store = EntityStore::new();
        self.graph = SceneGraph::new();
        self.selection.clear();
        self.selection.clear_sub();
        self.sculpt.clear_deformation();
        self.sculpt.set_settings(snapshot.sculpt);
        self.drag_revert = None;

        for row in &snapshot.entities {
            let id = self.create_entity(&row.name);
            self.store.set_position(id, row.position);
            self.store.set_rotation_deg(id, row.rotation_deg);
            self.store.set_scale(id, row.scale);
            self.store.set_mesh_type(id, row.mesh_type);
            self.store.set_material_index(id, row.material_index);
            self.store.set_base_color(id, row.base_color);
            self.store.set_texture_index(id, row.texture_index);
            self.store.set_effect_index(id, row.effect_index);
            for component in [
                Component::Mesh,
                Component::Light,
                Component::Camera,
                Component::Skin,
            ] {
                if row.components & component.bit() != 0 {
                    self.store.add_component(id, component);
                }
            }
        }
        // Second pass: rows may reference parents defined after them.
        for row in &snapshot.entities {
            if let Some(parent_name) = &row.parent {
                let child = self.store.resolve(&row.name);
                let parent = self.store.resolve(parent_name);
                if let (Some(child), Some(parent)) = (child, parent) {
                    self.graph.attach(child, Some(parent));
                } else {
                    log::warn!(
                        "scene row '{}' references missing parent '{}'",
                        row.name,
                        parent_name
                    );
                }
            }
        }
        self.sculpt.mark_selection_changed();
        self.events
            .emit(&EditorEvent::SelectionChanged { ids: Vec::new() });
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Advance one frame: settle world transforms, flush dirty geometry and
    /// soft-selection weights to the GPU, rebuild draw buckets, and submit.
    pub fn tick(&mut self, view_proj: Mat4) {
        self.selection.set_view_projection(view_proj);
        self.graph.update(&mut self.store);

        for (mesh_id, channels) in self.dirty_geometry.drain() {
            if let Some(geometry) = self.assets.get(mesh_id) {
                self.render
                    .update_mesh_geometry(&mut self.backend, mesh_id, geometry, channels);
            }
        }

        if self.sculpt.take_weights_dirty() {
            if let Some((entity, mesh_id)) = active_mesh_of(&self.selection, &self.store, &self.assets)
            {
                if let Some(geometry) = self.assets.get(mesh_id) {
                    let selected = self.selection.selection_as_vertices(geometry);
                    let scale = self.store.max_axis_scale(entity);
                    self.sculpt.recalculate(mesh_id, geometry, &selected, scale);
                }
            }
        }
        // Heatmap weights may also move mid-drag (DYNAMIC falloff refresh).
        // Only re-upload when the buffer actually changed since last frame.
        let weight_mesh = match self.drag_revert.as_ref() {
            Some(&(mesh_id, _)) => Some(mesh_id),
            None => active_mesh_of(&self.selection, &self.store, &self.assets).map(|(_, m)| m),
        };
        if let Some(mesh_id) = weight_mesh {
            if self.sculpt.take_pending_upload(mesh_id) {
                if let Some(weights) = self.sculpt.weights(mesh_id) {
                    self.render
                        .update_soft_selection(&mut self.backend, mesh_id, weights);
                }
            }
        }

        self.render.prepare_buckets(&self.store);
        let selected_slots: HashSet<u32> = self
            .selection
            .selected()
            .iter()
            .map(|id| id.index())
            .collect();
        self.render
            .render_frame(&mut self.backend, &self.store, &selected_slots);
    }

    fn active_mesh(&self) -> Option<(EntityId, u32)> {
        active_mesh_of(&self.selection, &self.store, &self.assets)
    }
}

fn active_mesh_of(
    selection: &SelectionSystem,
    store: &EntityStore,
    assets: &MeshAssets,
) -> Option<(EntityId, u32)> {
    let entity = selection.active()?;
    let mesh_id = store.mesh_type(entity);
    if mesh_id == 0 || assets.get(mesh_id).is_none() {
        return None;
    }
    Some((entity, mesh_id))
}
