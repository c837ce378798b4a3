//! Runtime core of an interactive mesh editor: a dense columnar entity
//! store, a dirty-flag scene graph, component-level selection with loop
//! and soft-selection support, proportional vertex deformation, and a
//! batched instanced renderer behind a pluggable backend trait.

pub mod assets;
pub mod editor;
pub mod events;
pub mod geometry;
pub mod gpu;
pub mod graph;
pub mod render;
pub mod sculpt;
pub mod select;
pub mod serialization;
pub mod store;

pub use assets::{GeometryChannels, MeshAssets, PartialGeometry};
pub use editor::Editor;
pub use events::{EditorEvent, EventBus};
pub use geometry::{Aabb, EdgeKey, FaceId, MeshGeometry, SkinAttributes, VertexId};
pub use gpu::{BufferId, DrawBatch, NullBackend, RenderBackend, RenderMode};
pub use graph::SceneGraph;
pub use render::MeshRenderSystem;
pub use sculpt::{DragMode, FalloffKind, SculptSettings, SculptSystem};
pub use select::{
    ComponentMode, PickedComponent, Rect, SelectAction, SelectionSystem, SubElems, SubSelection,
};
pub use serialization::{load_scene_from_file, save_scene_to_file, SceneSnapshot};
pub use store::{Component, EntityId, EntityStore};
