//! Dense columnar entity storage.
//!
//! Every per-entity attribute lives in its own contiguous column indexed by
//! slot, so the render hot loop walks flat arrays instead of chasing
//! pointers. Handles are generation-tagged: deleting a slot bumps its
//! generation, so a stale `EntityId` held across a deletion resolves to
//! nothing instead of aliasing whatever reclaimed the slot.
//!
//! Unknown-id mutation is deliberately a no-op; selection input races
//! against deletion during normal interactive use and must not be fatal.

use glam::Mat4;
use std::collections::HashMap;

/// Generation-tagged entity handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Component bits carried in the per-slot bitmask.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Mesh = 1 << 0,
    Light = 1 << 1,
    Camera = 1 << 2,
    Skin = 1 << 3,
}

impl Component {
    pub fn bit(self) -> u32 {
        self as u32
    }
}

#[derive(Default)]
pub struct EntityStore {
    names: Vec<String>,
    name_to_id: HashMap<String, EntityId>,
    generations: Vec<u32>,
    active: Vec<bool>,
    created_seq: Vec<u64>,
    next_seq: u64,

    positions: Vec<[f32; 3]>,
    rotations_deg: Vec<[f32; 3]>,
    scales: Vec<[f32; 3]>,
    world: Vec<Mat4>,
    components: Vec<u32>,
    mesh_types: Vec<u32>,
    material_indices: Vec<u32>,
    base_colors: Vec<[f32; 3]>,
    texture_indices: Vec<i32>,
    effect_indices: Vec<f32>,

    free: Vec<u32>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a slot (reusing the freelist when possible) and register the
    /// name. Duplicate names get a numeric suffix so the registry stays a
    /// bijection.
    pub fn create_entity(&mut self, name: &str) -> EntityId {
        let mut unique = name.to_string();
        let mut suffix = 1usize;
        while self.name_to_id.contains_key(&unique) {
            suffix += 1;
            unique = format!("{name} {suffix}");
        }

        let index = match self.free.pop() {
            Some(slot) => {
                let i = slot as usize;
                self.names[i] = unique.clone();
                self.active[i] = true;
                self.created_seq[i] = self.next_seq;
                self.positions[i] = [0.0; 3];
                self.rotations_deg[i] = [0.0; 3];
                self.scales[i] = [1.0; 3];
                self.world[i] = Mat4::IDENTITY;
                self.components[i] = 0;
                self.mesh_types[i] = 0;
                self.material_indices[i] = 0;
                self.base_colors[i] = [1.0; 3];
                self.texture_indices[i] = -1;
                self.effect_indices[i] = 0.0;
                slot
            }
            None => {
                self.names.push(unique.clone());
                self.generations.push(0);
                self.active.push(true);
                self.created_seq.push(self.next_seq);
                self.positions.push([0.0; 3]);
                self.rotations_deg.push([0.0; 3]);
                self.scales.push([1.0; 3]);
                self.world.push(Mat4::IDENTITY);
                self.components.push(0);
                self.mesh_types.push(0);
                self.material_indices.push(0);
                self.base_colors.push([1.0; 3]);
                self.texture_indices.push(-1);
                self.effect_indices.push(0.0);
                (self.names.len() - 1) as u32
            }
        };

        self.next_seq += 1;
        let id = EntityId {
            index,
            generation: self.generations[index as usize],
        };
        self.name_to_id.insert(unique, id);
        id
    }

    /// Monotonic creation sequence number. Slot indices are recycled through
    /// the freelist, so slot order is not creation order; picking tie-breaks
    /// use this instead.
    pub fn creation_order(&self, id: EntityId) -> u64 {
        self.slot(id).map(|i| self.created_seq[i]).unwrap_or(u64::MAX)
    }

    /// Deactivate the slot and recycle it. The handle's generation is
    /// retired atomically with the removal, so the name map never points at
    /// a dead slot. Returns false (no-op) for unknown or stale ids.
    pub fn delete_entity(&mut self, id: EntityId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let i = id.index as usize;
        self.active[i] = false;
        self.generations[i] = self.generations[i].wrapping_add(1);
        self.name_to_id.remove(&self.names[i]);
        self.free.push(id.index);
        true
    }

    pub fn contains(&self, id: EntityId) -> bool {
        let i = id.index as usize;
        i < self.active.len() && self.active[i] && self.generations[i] == id.generation
    }

    fn slot(&self, id: EntityId) -> Option<usize> {
        self.contains(id).then_some(id.index as usize)
    }

    pub fn resolve(&self, name: &str) -> Option<EntityId> {
        self.name_to_id.get(name).copied()
    }

    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.slot(id).map(|i| self.names[i].as_str())
    }

    /// Slot capacity, including inactive slots. The per-slot accessors below
    /// are the iteration surface for the render hot loop.
    pub fn slot_count(&self) -> usize {
        self.names.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    pub fn id_at_slot(&self, slot: usize) -> Option<EntityId> {
        if slot < self.active.len() && self.active[slot] {
            Some(EntityId {
                index: slot as u32,
                generation: self.generations[slot],
            })
        } else {
            None
        }
    }

    pub fn iter_active(&self) -> impl Iterator<Item = EntityId> + '_ {
        (0..self.slot_count()).filter_map(|slot| self.id_at_slot(slot))
    }

    // --- component bitmask ---

    pub fn add_component(&mut self, id: EntityId, component: Component) {
        if let Some(i) = self.slot(id) {
            self.components[i] |= component.bit();
        }
    }

    pub fn remove_component(&mut self, id: EntityId, component: Component) {
        if let Some(i) = self.slot(id) {
            self.components[i] &= !component.bit();
        }
    }

    pub fn has_component(&self, id: EntityId, component: Component) -> bool {
        self.slot(id)
            .map(|i| self.components[i] & component.bit() != 0)
            .unwrap_or(false)
    }

    pub fn components(&self, id: EntityId) -> u32 {
        self.slot(id).map(|i| self.components[i]).unwrap_or(0)
    }

    // --- transform columns ---

    pub fn position(&self, id: EntityId) -> Option<[f32; 3]> {
        self.slot(id).map(|i| self.positions[i])
    }

    pub fn set_position(&mut self, id: EntityId, position: [f32; 3]) {
        if let Some(i) = self.slot(id) {
            self.positions[i] = position;
        }
    }

    pub fn rotation_deg(&self, id: EntityId) -> Option<[f32; 3]> {
        self.slot(id).map(|i| self.rotations_deg[i])
    }

    pub fn set_rotation_deg(&mut self, id: EntityId, rotation: [f32; 3]) {
        if let Some(i) = self.slot(id) {
            self.rotations_deg[i] = rotation;
        }
    }

    pub fn scale(&self, id: EntityId) -> Option<[f32; 3]> {
        self.slot(id).map(|i| self.scales[i])
    }

    pub fn set_scale(&mut self, id: EntityId, scale: [f32; 3]) {
        if let Some(i) = self.slot(id) {
            self.scales[i] = scale;
        }
    }

    /// Largest axis scale factor, used to keep sculpt radii invariant under
    /// non-uniform scaling.
    pub fn max_axis_scale(&self, id: EntityId) -> f32 {
        self.scale(id)
            .map(|s| s[0].abs().max(s[1].abs()).max(s[2].abs()).max(1e-6))
            .unwrap_or(1.0)
    }

    pub fn world_matrix(&self, id: EntityId) -> Option<Mat4> {
        self.slot(id).map(|i| self.world[i])
    }

    pub fn set_world_matrix(&mut self, id: EntityId, world: Mat4) {
        if let Some(i) = self.slot(id) {
            self.world[i] = world;
        }
    }

    // --- render attribute columns ---

    pub fn mesh_type(&self, id: EntityId) -> u32 {
        self.slot(id).map(|i| self.mesh_types[i]).unwrap_or(0)
    }

    pub fn set_mesh_type(&mut self, id: EntityId, mesh_type: u32) {
        if let Some(i) = self.slot(id) {
            self.mesh_types[i] = mesh_type;
            if mesh_type != 0 {
                self.components[i] |= Component::Mesh.bit();
            } else {
                self.components[i] &= !Component::Mesh.bit();
            }
        }
    }

    pub fn material_index(&self, id: EntityId) -> u32 {
        self.slot(id).map(|i| self.material_indices[i]).unwrap_or(0)
    }

    pub fn set_material_index(&mut self, id: EntityId, material: u32) {
        if let Some(i) = self.slot(id) {
            self.material_indices[i] = material;
        }
    }

    pub fn base_color(&self, id: EntityId) -> Option<[f32; 3]> {
        self.slot(id).map(|i| self.base_colors[i])
    }

    pub fn set_base_color(&mut self, id: EntityId, color: [f32; 3]) {
        if let Some(i) = self.slot(id) {
            self.base_colors[i] = color;
        }
    }

    pub fn texture_index(&self, id: EntityId) -> i32 {
        self.slot(id).map(|i| self.texture_indices[i]).unwrap_or(-1)
    }

    pub fn set_texture_index(&mut self, id: EntityId, texture: i32) {
        if let Some(i) = self.slot(id) {
            self.texture_indices[i] = texture;
        }
    }

    pub fn effect_index(&self, id: EntityId) -> f32 {
        self.slot(id).map(|i| self.effect_indices[i]).unwrap_or(0.0)
    }

    pub fn set_effect_index(&mut self, id: EntityId, effect: f32) {
        if let Some(i) = self.slot(id) {
            self.effect_indices[i] = effect;
        }
    }

    // --- slot-indexed accessors for the render hot loop ---
    // Valid only while the slot is active; callers must not cache slot
    // indices across a frame boundary with deletions.

    pub fn world_at(&self, slot: usize) -> &Mat4 {
        &self.world[slot]
    }

    pub fn mesh_type_at(&self, slot: usize) -> u32 {
        self.mesh_types[slot]
    }

    pub fn material_at(&self, slot: usize) -> u32 {
        self.material_indices[slot]
    }

    pub fn base_color_at(&self, slot: usize) -> [f32; 3] {
        self.base_colors[slot]
    }

    pub fn texture_at(&self, slot: usize) -> i32 {
        self.texture_indices[slot]
    }

    pub fn effect_at(&self, slot: usize) -> f32 {
        self.effect_indices[slot]
    }

    pub fn is_slot_active(&self, slot: usize) -> bool {
        self.active.get(slot).copied().unwrap_or(false)
    }
}
