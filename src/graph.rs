//! Transform hierarchy over entity ids.
//!
//! The graph owns only links and dirty flags; local TRS lives in the entity
//! store and the cached world matrix is written back into the store's world
//! column. `update` walks roots top-down and recomputes exactly the dirty
//! subtrees, so a clean frame costs one traversal and zero matrix math.

use crate::store::{EntityId, EntityStore};
use glam::{EulerRot, Mat4, Quat, Vec3};
use std::collections::HashMap;

struct Node {
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    dirty: bool,
}

#[derive(Default)]
pub struct SceneGraph {
    nodes: HashMap<EntityId, Node>,
    // Registration order; keeps traversal deterministic.
    order: Vec<EntityId>,
}

/// Local transform composition. Rotation order is Z (roll) · Y (yaw) ·
/// X (pitch), angles in degrees.
pub fn compose_local_matrix(
    position: [f32; 3],
    rotation_deg: [f32; 3],
    scale: [f32; 3],
) -> Mat4 {
    let rotation = Quat::from_euler(
        EulerRot::ZYX,
        rotation_deg[2].to_radians(),
        rotation_deg[1].to_radians(),
        rotation_deg[0].to_radians(),
    );
    Mat4::from_scale_rotation_translation(Vec3::from(scale), rotation, Vec3::from(position))
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: EntityId) {
        if self.nodes.contains_key(&id) {
            return;
        }
        self.nodes.insert(
            id,
            Node {
                parent: None,
                children: Vec::new(),
                dirty: true,
            },
        );
        self.order.push(id);
    }

    /// Drop the node. Its children are reparented to the removed node's own
    /// parent so subtrees are never silently orphaned.
    pub fn remove(&mut self, id: EntityId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        if let Some(parent) = node.parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|&c| c != id);
            }
        }
        for child in node.children {
            if let Some(child_node) = self.nodes.get_mut(&child) {
                child_node.parent = node.parent;
            }
            if let Some(parent) = node.parent {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.push(child);
                }
            }
            self.set_dirty(child);
        }
        self.order.retain(|&o| o != id);
    }

    /// Reparent `child` under `parent` (or detach to root with `None`).
    /// Refuses, returning false and leaving the graph untouched, when the
    /// move would create a cycle, i.e. when `child` appears on the new
    /// parent's ancestor chain.
    pub fn attach(&mut self, child: EntityId, parent: Option<EntityId>) -> bool {
        if !self.nodes.contains_key(&child) {
            return false;
        }
        if let Some(parent_id) = parent {
            if !self.nodes.contains_key(&parent_id) {
                return false;
            }
            let mut ancestor = Some(parent_id);
            while let Some(current) = ancestor {
                if current == child {
                    log::warn!("refusing reparent: would create a hierarchy cycle");
                    return false;
                }
                ancestor = self.nodes.get(&current).and_then(|n| n.parent);
            }
        }

        let old_parent = self.nodes[&child].parent;
        if let Some(old) = old_parent {
            if let Some(old_node) = self.nodes.get_mut(&old) {
                old_node.children.retain(|&c| c != child);
            }
        }
        if let Some(new) = parent {
            if let Some(new_node) = self.nodes.get_mut(&new) {
                new_node.children.push(child);
            }
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = parent;
        }
        self.set_dirty(child);
        true
    }

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: EntityId) -> &[EntityId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn roots(&self) -> Vec<EntityId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.nodes.get(id).is_some_and(|n| n.parent.is_none()))
            .collect()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Mark `id` and every descendant stale. World matrices are only
    /// recomputed for marked nodes on the next `update`.
    pub fn set_dirty(&mut self, id: EntityId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&current) {
                node.dirty = true;
                stack.extend(node.children.iter().copied());
            }
        }
    }

    /// Recompute stale world matrices parent-before-child, writing results
    /// into the store's world column. Returns the number of matrices
    /// recomputed; zero when nothing was dirty.
    pub fn update(&mut self, store: &mut EntityStore) -> usize {
        let mut recomputed = 0;
        let mut stack: Vec<(EntityId, Mat4)> = self
            .roots()
            .into_iter()
            .rev()
            .map(|id| (id, Mat4::IDENTITY))
            .collect();

        while let Some((id, parent_world)) = stack.pop() {
            let world = {
                let Some(node) = self.nodes.get_mut(&id) else {
                    continue;
                };
                if node.dirty {
                    node.dirty = false;
                    let local = match (
                        store.position(id),
                        store.rotation_deg(id),
                        store.scale(id),
                    ) {
                        (Some(p), Some(r), Some(s)) => compose_local_matrix(p, r, s),
                        // Entity deleted out from under the graph; treat as
                        // identity until the editor prunes the node.
                        _ => Mat4::IDENTITY,
                    };
                    let world = parent_world * local;
                    store.set_world_matrix(id, world);
                    recomputed += 1;
                    world
                } else {
                    store.world_matrix(id).unwrap_or(Mat4::IDENTITY)
                }
            };
            if let Some(node) = self.nodes.get(&id) {
                for &child in node.children.iter().rev() {
                    stack.push((child, world));
                }
            }
        }
        recomputed
    }
}
