//! Render backend abstraction.
//!
//! The mesh render system talks to the GPU exclusively through this trait:
//! opaque buffer handles, whole-buffer writes, and instanced draw
//! submissions. Shader text and API bindings live behind the trait, on the
//! other side of the process's graphics context.

use std::collections::HashMap;

/// Opaque GPU buffer handle. Identity is meaningful: an unchanged handle
/// across a geometry update means the underlying allocation was reused.
pub type BufferId = u64;

/// Shading selector passed to the backend as a per-draw integer, not a
/// pipeline permutation; switching modes never re-buckets anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum RenderMode {
    #[default]
    Lit = 0,
    Normals = 1,
    Albedo = 2,
    WeightPaint = 3,
}

/// One instanced draw submission.
#[derive(Debug, Clone)]
pub struct DrawBatch<'a> {
    pub mesh_id: u32,
    pub material_index: u32,
    pub instance_count: u32,
    /// Packed per-instance attributes (see `render::INSTANCE_FLOATS`).
    pub instance_data: &'a [f32],
    pub mode: RenderMode,
    pub skinned: bool,
    /// Drawn in the separate overlay pass (ghosted/preview entities).
    pub overlay: bool,
}

pub trait RenderBackend {
    fn create_buffer(&mut self, bytes: &[u8]) -> BufferId;
    fn write_buffer(&mut self, buffer: BufferId, bytes: &[u8]);
    fn destroy_buffer(&mut self, buffer: BufferId);
    /// Bind the global bone-matrix palette for skinned draws.
    fn bind_bone_palette(&mut self, matrices: &[[f32; 16]]);
    fn draw(&mut self, batch: &DrawBatch);
}

/// Record of one submitted draw, kept by `NullBackend`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRecord {
    pub mesh_id: u32,
    pub material_index: u32,
    pub instance_count: u32,
    pub mode: RenderMode,
    pub skinned: bool,
    pub overlay: bool,
}

/// Backend that allocates nothing and records everything; the headless
/// stand-in used by tests and by editor instances without a GPU context.
#[derive(Default)]
pub struct NullBackend {
    next_buffer: BufferId,
    /// Live buffer sizes in bytes, keyed by handle.
    pub buffers: HashMap<BufferId, usize>,
    pub write_count: u64,
    pub bone_palette_binds: u64,
    pub draws: Vec<DrawRecord>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

impl RenderBackend for NullBackend {
    fn create_buffer(&mut self, bytes: &[u8]) -> BufferId {
        self.next_buffer += 1;
        self.buffers.insert(self.next_buffer, bytes.len());
        self.next_buffer
    }

    fn write_buffer(&mut self, buffer: BufferId, bytes: &[u8]) {
        if let Some(size) = self.buffers.get_mut(&buffer) {
            *size = bytes.len();
            self.write_count += 1;
        } else {
            log::warn!("write to unknown buffer {buffer} dropped");
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn bind_bone_palette(&mut self, _matrices: &[[f32; 16]]) {
        self.bone_palette_binds += 1;
    }

    fn draw(&mut self, batch: &DrawBatch) {
        self.draws.push(DrawRecord {
            mesh_id: batch.mesh_id,
            material_index: batch.material_index,
            instance_count: batch.instance_count,
            mode: batch.mode,
            skinned: batch.skinned,
            overlay: batch.overlay,
        });
    }
}
