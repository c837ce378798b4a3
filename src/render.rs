//! Batched instanced mesh rendering.
//!
//! Owns the GPU-resident buffers per mesh-type id, groups active entities
//! into `(material, mesh)` buckets once per frame, and submits one
//! instanced draw per non-empty bucket. Bucket vectors are pooled (cleared
//! each frame, never freed) so steady-state frames allocate nothing.

use crate::assets::GeometryChannels;
use crate::geometry::MeshGeometry;
use crate::gpu::{BufferId, DrawBatch, RenderBackend, RenderMode};
use crate::store::EntityStore;
use std::collections::{HashMap, HashSet};

/// Hard cap on instances per draw call; buckets beyond it are truncated
/// (degrade, don't fail the frame).
pub const MAX_INSTANCES_PER_DRAW: usize = 1024;

/// Floats per packed instance: world matrix (16) + base color (3) +
/// selected flag (1) + texture index (1) + effect index (1).
pub const INSTANCE_FLOATS: usize = 22;

/// Entities with an effect index above this render in the separate overlay
/// pass instead of the opaque pass.
pub const EFFECT_EXCLUDE_THRESHOLD: f32 = 99.5;

/// GPU buffer set for one registered mesh.
#[derive(Debug, Clone)]
pub struct MeshBuffers {
    pub vertex_count: u32,
    pub index_count: u32,
    pub positions: BufferId,
    pub normals: BufferId,
    pub uvs: BufferId,
    pub colors: Option<BufferId>,
    pub indices: BufferId,
    pub soft_weights: BufferId,
    pub skin: Option<(BufferId, BufferId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub material: u32,
    pub mesh: u32,
}

pub struct MeshRenderSystem {
    meshes: HashMap<u32, MeshBuffers>,
    // Pooled bucket slot lists, reused (cleared, not freed) across frames.
    opaque: HashMap<BucketKey, Vec<u32>>,
    excluded: HashMap<BucketKey, Vec<u32>>,
    key_scratch: Vec<(BucketKey, bool)>,
    instance_scratch: Vec<f32>,
    upload_scratch: Vec<u8>,
    bone_palette: Vec<[f32; 16]>,
    render_mode: RenderMode,
    truncation_warned: bool,
}

impl Default for MeshRenderSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshRenderSystem {
    pub fn new() -> Self {
        Self {
            meshes: HashMap::new(),
            opaque: HashMap::new(),
            excluded: HashMap::new(),
            key_scratch: Vec::new(),
            instance_scratch: Vec::with_capacity(MAX_INSTANCES_PER_DRAW * INSTANCE_FLOATS),
            upload_scratch: Vec::new(),
            bone_palette: Vec::new(),
            render_mode: RenderMode::Lit,
            truncation_warned: false,
        }
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.render_mode = mode;
    }

    pub fn set_bone_palette(&mut self, palette: Vec<[f32; 16]>) {
        self.bone_palette = palette;
    }

    pub fn mesh(&self, mesh_id: u32) -> Option<&MeshBuffers> {
        self.meshes.get(&mesh_id)
    }

    /// Allocate (or fully replace) every buffer for a mesh id.
    pub fn register_mesh<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        mesh_id: u32,
        geometry: &MeshGeometry,
    ) {
        if let Some(old) = self.meshes.remove(&mesh_id) {
            destroy_mesh_buffers(backend, old);
        }
        let vertex_count = geometry.vertex_count() as u32;

        let positions = create_with(backend, &mut self.upload_scratch, |s| {
            pack_f32x3(s, &geometry.positions)
        });
        let normals = create_with(backend, &mut self.upload_scratch, |s| {
            pack_f32x3(s, &geometry.normals)
        });
        let uvs = create_with(backend, &mut self.upload_scratch, |s| {
            pack_f32x2(s, &geometry.uvs)
        });
        let colors = geometry.colors.as_ref().map(|colors| {
            create_with(backend, &mut self.upload_scratch, |s| pack_f32x3(s, colors))
        });
        let indices = create_with(backend, &mut self.upload_scratch, |s| {
            pack_u32(s, &geometry.indices)
        });
        // Soft-selection weights start at zero for every vertex.
        let soft_weights = create_with(backend, &mut self.upload_scratch, |s| {
            s.extend(std::iter::repeat(0u8).take(vertex_count as usize * 4))
        });
        let skin = geometry.skin.as_ref().map(|skin| {
            let joints = create_with(backend, &mut self.upload_scratch, |s| {
                pack_u16x4(s, &skin.joints)
            });
            let weights = create_with(backend, &mut self.upload_scratch, |s| {
                pack_f32x4(s, &skin.weights)
            });
            (joints, weights)
        });

        self.meshes.insert(
            mesh_id,
            MeshBuffers {
                vertex_count,
                index_count: geometry.indices.len() as u32,
                positions,
                normals,
                uvs,
                colors,
                indices,
                soft_weights,
                skin,
            },
        );
        log::info!(
            "registered mesh {mesh_id}: {vertex_count} vertices, {} indices",
            geometry.indices.len()
        );
    }

    pub fn unregister_mesh<B: RenderBackend>(&mut self, backend: &mut B, mesh_id: u32) {
        if let Some(buffers) = self.meshes.remove(&mesh_id) {
            destroy_mesh_buffers(backend, buffers);
        }
        self.opaque.retain(|key, _| key.mesh != mesh_id);
        self.excluded.retain(|key, _| key.mesh != mesh_id);
    }

    /// Partial geometry update. A changed vertex count invalidates every
    /// per-vertex buffer and triggers full re-registration; otherwise each
    /// dirty channel gets a whole-buffer overwrite into the existing
    /// allocation (no sub-range diffing), preserving buffer identity.
    pub fn update_mesh_geometry<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        mesh_id: u32,
        geometry: &MeshGeometry,
        channels: GeometryChannels,
    ) {
        if !channels.any() {
            return;
        }
        let Some(mesh) = self.meshes.get_mut(&mesh_id) else {
            return; // unknown mesh: UI race, not an error
        };
        if geometry.vertex_count() as u32 != mesh.vertex_count {
            self.register_mesh(backend, mesh_id, geometry);
            return;
        }
        if channels.positions {
            write_with(backend, mesh.positions, &mut self.upload_scratch, |s| {
                pack_f32x3(s, &geometry.positions)
            });
        }
        if channels.normals {
            write_with(backend, mesh.normals, &mut self.upload_scratch, |s| {
                pack_f32x3(s, &geometry.normals)
            });
        }
        if channels.uvs {
            write_with(backend, mesh.uvs, &mut self.upload_scratch, |s| {
                pack_f32x2(s, &geometry.uvs)
            });
        }
        if channels.colors {
            match (&geometry.colors, mesh.colors) {
                (Some(colors), Some(buffer)) => {
                    write_with(backend, buffer, &mut self.upload_scratch, |s| {
                        pack_f32x3(s, colors)
                    });
                }
                (Some(colors), None) => {
                    mesh.colors = Some(create_with(backend, &mut self.upload_scratch, |s| {
                        pack_f32x3(s, colors)
                    }));
                }
                (None, Some(buffer)) => {
                    backend.destroy_buffer(buffer);
                    mesh.colors = None;
                }
                (None, None) => {}
            }
        }
        if channels.indices {
            if geometry.indices.len() as u32 == mesh.index_count {
                write_with(backend, mesh.indices, &mut self.upload_scratch, |s| {
                    pack_u32(s, &geometry.indices)
                });
            } else {
                backend.destroy_buffer(mesh.indices);
                mesh.indices = create_with(backend, &mut self.upload_scratch, |s| {
                    pack_u32(s, &geometry.indices)
                });
                mesh.index_count = geometry.indices.len() as u32;
            }
        }
    }

    /// Replace (never patch) the soft-selection weight buffer, so values
    /// beyond the live vertex count can never go stale.
    pub fn update_soft_selection<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        mesh_id: u32,
        weights: &[f32],
    ) {
        let Some(mesh) = self.meshes.get_mut(&mesh_id) else {
            return;
        };
        self.upload_scratch.clear();
        for &w in weights {
            self.upload_scratch.extend_from_slice(&w.to_le_bytes());
        }
        if weights.len() as u32 == mesh.vertex_count {
            backend.write_buffer(mesh.soft_weights, &self.upload_scratch);
        } else {
            backend.destroy_buffer(mesh.soft_weights);
            mesh.soft_weights = backend.create_buffer(&self.upload_scratch);
        }
    }

    /// One pass over every active entity, grouping slots by
    /// `(material, mesh)` and splitting opaque from overlay-excluded by the
    /// effect-index threshold. The per-bucket slot vectors are cleared, not
    /// reallocated.
    pub fn prepare_buckets(&mut self, store: &EntityStore) {
        for bucket in self.opaque.values_mut() {
            bucket.clear();
        }
        for bucket in self.excluded.values_mut() {
            bucket.clear();
        }
        for slot in 0..store.slot_count() {
            if !store.is_slot_active(slot) {
                continue;
            }
            let mesh = store.mesh_type_at(slot);
            if mesh == 0 || !self.meshes.contains_key(&mesh) {
                continue;
            }
            let key = BucketKey {
                material: store.material_at(slot),
                mesh,
            };
            let buckets = if store.effect_at(slot) > EFFECT_EXCLUDE_THRESHOLD {
                &mut self.excluded
            } else {
                &mut self.opaque
            };
            buckets.entry(key).or_default().push(slot as u32);
        }
    }

    /// Slots currently grouped under one bucket (post `prepare_buckets`).
    pub fn bucket_slots(&self, key: BucketKey, overlay: bool) -> &[u32] {
        let buckets = if overlay { &self.excluded } else { &self.opaque };
        buckets.get(&key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Submit one instanced draw per non-empty bucket, opaque pass first,
    /// then the excluded overlay pass, in sorted key order. Buckets larger
    /// than `MAX_INSTANCES_PER_DRAW` are truncated with a one-time warning.
    pub fn render_frame<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        store: &EntityStore,
        selected_slots: &HashSet<u32>,
    ) {
        self.key_scratch.clear();
        for (&key, slots) in &self.opaque {
            if !slots.is_empty() {
                self.key_scratch.push((key, false));
            }
        }
        for (&key, slots) in &self.excluded {
            if !slots.is_empty() {
                self.key_scratch.push((key, true));
            }
        }
        self.key_scratch.sort_unstable_by_key(|&(key, overlay)| (overlay, key));

        let keys = std::mem::take(&mut self.key_scratch);
        for &(key, overlay) in &keys {
            let buckets = if overlay { &self.excluded } else { &self.opaque };
            let Some(slots) = buckets.get(&key) else {
                continue;
            };
            if slots.len() > MAX_INSTANCES_PER_DRAW && !self.truncation_warned {
                self.truncation_warned = true;
                log::warn!(
                    "bucket ({}, {}) exceeds {} instances; truncating",
                    key.material,
                    key.mesh,
                    MAX_INSTANCES_PER_DRAW
                );
            }
            self.instance_scratch.clear();
            let mut count = 0u32;
            for &slot in slots.iter().take(MAX_INSTANCES_PER_DRAW) {
                let slot = slot as usize;
                self.instance_scratch
                    .extend_from_slice(&store.world_at(slot).to_cols_array());
                self.instance_scratch
                    .extend_from_slice(&store.base_color_at(slot));
                self.instance_scratch.push(if selected_slots.contains(&(slot as u32)) {
                    1.0
                } else {
                    0.0
                });
                self.instance_scratch.push(store.texture_at(slot) as f32);
                self.instance_scratch.push(store.effect_at(slot));
                count += 1;
            }
            let skinned = self
                .meshes
                .get(&key.mesh)
                .is_some_and(|m| m.skin.is_some());
            if skinned {
                backend.bind_bone_palette(&self.bone_palette);
            }
            backend.draw(&DrawBatch {
                mesh_id: key.mesh,
                material_index: key.material,
                instance_count: count,
                instance_data: &self.instance_scratch,
                mode: self.render_mode,
                skinned,
                overlay,
            });
        }
        self.key_scratch = keys;
    }
}

fn destroy_mesh_buffers<B: RenderBackend>(backend: &mut B, buffers: MeshBuffers) {
    backend.destroy_buffer(buffers.positions);
    backend.destroy_buffer(buffers.normals);
    backend.destroy_buffer(buffers.uvs);
    if let Some(colors) = buffers.colors {
        backend.destroy_buffer(colors);
    }
    backend.destroy_buffer(buffers.indices);
    backend.destroy_buffer(buffers.soft_weights);
    if let Some((joints, weights)) = buffers.skin {
        backend.destroy_buffer(joints);
        backend.destroy_buffer(weights);
    }
}

fn create_with<B: RenderBackend>(
    backend: &mut B,
    scratch: &mut Vec<u8>,
    fill: impl FnOnce(&mut Vec<u8>),
) -> BufferId {
    scratch.clear();
    fill(scratch);
    backend.create_buffer(scratch)
}

fn write_with<B: RenderBackend>(
    backend: &mut B,
    buffer: BufferId,
    scratch: &mut Vec<u8>,
    fill: impl FnOnce(&mut Vec<u8>),
) {
    scratch.clear();
    fill(scratch);
    backend.write_buffer(buffer, scratch);
}

fn pack_f32x3(out: &mut Vec<u8>, data: &[[f32; 3]]) {
    for value in data {
        for c in value {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
}

fn pack_f32x2(out: &mut Vec<u8>, data: &[[f32; 2]]) {
    for value in data {
        for c in value {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
}

fn pack_f32x4(out: &mut Vec<u8>, data: &[[f32; 4]]) {
    for value in data {
        for c in value {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
}

fn pack_u16x4(out: &mut Vec<u8>, data: &[[u16; 4]]) {
    for value in data {
        for c in value {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
}

fn pack_u32(out: &mut Vec<u8>, data: &[u32]) {
    for value in data {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::GeometryChannels;
    use crate::geometry::unit_quad;
    use crate::gpu::NullBackend;

    fn spawn_mesh_entity(
        store: &mut EntityStore,
        mesh: u32,
        material: u32,
        effect: f32,
    ) -> crate::store::EntityId {
        let id = store.create_entity("e");
        store.set_mesh_type(id, mesh);
        store.set_material_index(id, material);
        store.set_effect_index(id, effect);
        id
    }

    #[test]
    fn same_vertex_count_update_preserves_buffer_identity() {
        let mut backend = NullBackend::new();
        let mut render = MeshRenderSystem::new();
        let mut quad = unit_quad();
        render.register_mesh(&mut backend, 1, &quad);
        let before = render.mesh(1).unwrap().clone();

        quad.positions[0] = [5.0, 0.0, 0.0];
        render.update_mesh_geometry(
            &mut backend,
            1,
            &quad,
            GeometryChannels {
                positions: true,
                ..Default::default()
            },
        );
        let after = render.mesh(1).unwrap();
        assert_eq!(after.positions, before.positions);
        assert_eq!(after.indices, before.indices);
        assert_eq!(backend.write_count, 1);
    }

    #[test]
    fn changed_vertex_count_triggers_full_reregistration() {
        let mut backend = NullBackend::new();
        let mut render = MeshRenderSystem::new();
        render.register_mesh(&mut backend, 1, &unit_quad());
        let before = render.mesh(1).unwrap().clone();

        let mut grown = unit_quad();
        grown.positions.push([2.0, 0.0, 0.0]);
        grown.uvs.push([0.5, 0.5]);
        grown.recompute_normals();
        render.update_mesh_geometry(
            &mut backend,
            1,
            &grown,
            GeometryChannels {
                positions: true,
                ..Default::default()
            },
        );
        let after = render.mesh(1).unwrap();
        assert_ne!(after.positions, before.positions);
        assert_eq!(after.vertex_count, 5);
        // Old buffers were released, not leaked.
        assert_eq!(backend.live_buffer_count(), 5);
    }

    #[test]
    fn buckets_split_on_material_mesh_and_effect() {
        let mut backend = NullBackend::new();
        let mut render = MeshRenderSystem::new();
        render.register_mesh(&mut backend, 1, &unit_quad());
        render.register_mesh(&mut backend, 2, &unit_quad());

        let mut store = EntityStore::new();
        spawn_mesh_entity(&mut store, 1, 0, 0.0);
        spawn_mesh_entity(&mut store, 1, 0, 0.0);
        spawn_mesh_entity(&mut store, 1, 3, 0.0);
        spawn_mesh_entity(&mut store, 2, 0, 0.0);
        spawn_mesh_entity(&mut store, 1, 0, 100.0); // ghosted preview
        render.prepare_buckets(&store);

        assert_eq!(
            render.bucket_slots(BucketKey { material: 0, mesh: 1 }, false),
            &[0, 1]
        );
        assert_eq!(
            render.bucket_slots(BucketKey { material: 3, mesh: 1 }, false),
            &[2]
        );
        assert_eq!(
            render.bucket_slots(BucketKey { material: 0, mesh: 2 }, false),
            &[3]
        );
        assert_eq!(
            render.bucket_slots(BucketKey { material: 0, mesh: 1 }, true),
            &[4]
        );
    }

    #[test]
    fn bucket_vectors_are_pooled_across_frames() {
        let mut backend = NullBackend::new();
        let mut render = MeshRenderSystem::new();
        render.register_mesh(&mut backend, 1, &unit_quad());

        let mut store = EntityStore::new();
        let id = spawn_mesh_entity(&mut store, 1, 0, 0.0);
        render.prepare_buckets(&store);
        let key = BucketKey { material: 0, mesh: 1 };
        assert_eq!(render.bucket_slots(key, false).len(), 1);

        store.delete_entity(id);
        render.prepare_buckets(&store);
        // Cleared, but the pooled vector (and its map entry) survives.
        assert!(render.bucket_slots(key, false).is_empty());
        assert!(render.opaque.contains_key(&key));
    }

    #[test]
    fn render_emits_one_draw_per_bucket_with_packed_instances() {
        let mut backend = NullBackend::new();
        let mut render = MeshRenderSystem::new();
        render.register_mesh(&mut backend, 1, &unit_quad());

        let mut store = EntityStore::new();
        let a = spawn_mesh_entity(&mut store, 1, 0, 0.0);
        spawn_mesh_entity(&mut store, 1, 0, 0.0);
        spawn_mesh_entity(&mut store, 1, 0, 200.0);
        store.set_base_color(a, [1.0, 0.5, 0.25]);

        render.prepare_buckets(&store);
        let selected = HashSet::from([a.index()]);
        render.render_frame(&mut backend, &store, &selected);

        assert_eq!(backend.draws.len(), 2);
        let opaque = &backend.draws[0];
        assert_eq!(opaque.instance_count, 2);
        assert!(!opaque.overlay);
        let overlay = &backend.draws[1];
        assert_eq!(overlay.instance_count, 1);
        assert!(overlay.overlay);
    }

    #[test]
    fn oversized_bucket_is_truncated_not_dropped() {
        // Surfaces the truncation warning under --nocapture.
        let _ = env_logger::builder().is_test(true).try_init();
        let mut backend = NullBackend::new();
        let mut render = MeshRenderSystem::new();
        render.register_mesh(&mut backend, 1, &unit_quad());

        let mut store = EntityStore::new();
        for _ in 0..MAX_INSTANCES_PER_DRAW + 5 {
            spawn_mesh_entity(&mut store, 1, 0, 0.0);
        }
        render.prepare_buckets(&store);
        render.render_frame(&mut backend, &store, &HashSet::new());
        assert_eq!(backend.draws.len(), 1);
        assert_eq!(
            backend.draws[0].instance_count,
            MAX_INSTANCES_PER_DRAW as u32
        );
    }

    #[test]
    fn soft_selection_upload_replaces_wholesale() {
        let mut backend = NullBackend::new();
        let mut render = MeshRenderSystem::new();
        render.register_mesh(&mut backend, 1, &unit_quad());
        let buffer = render.mesh(1).unwrap().soft_weights;
        render.update_soft_selection(&mut backend, 1, &[1.0, 0.5, 0.0, 0.0]);
        assert_eq!(render.mesh(1).unwrap().soft_weights, buffer);
        assert_eq!(backend.buffers[&buffer], 16);
    }

    #[test]
    fn skinned_mesh_binds_the_bone_palette() {
        let mut backend = NullBackend::new();
        let mut render = MeshRenderSystem::new();
        let mut quad = unit_quad();
        quad.skin = Some(crate::geometry::SkinAttributes {
            joints: vec![[0, 0, 0, 0]; 4],
            weights: vec![[1.0, 0.0, 0.0, 0.0]; 4],
        });
        render.register_mesh(&mut backend, 1, &quad);
        render.set_bone_palette(vec![[0.0; 16]; 2]);

        let mut store = EntityStore::new();
        spawn_mesh_entity(&mut store, 1, 0, 0.0);
        render.prepare_buckets(&store);
        render.render_frame(&mut backend, &store, &HashSet::new());
        assert_eq!(backend.bone_palette_binds, 1);
        assert!(backend.draws[0].skinned);
    }
}
