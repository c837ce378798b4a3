//! Mesh asset registry.
//!
//! Owns the authoritative `MeshGeometry` per mesh-type id and applies the
//! partial geometry updates coming from the UI surface, reporting which
//! channels changed so the render system can scope its uploads.

use crate::geometry::{MeshGeometry, SkinAttributes};
use std::collections::HashMap;

/// Partial geometry update: any subset of channels may be present.
#[derive(Debug, Clone, Default)]
pub struct PartialGeometry {
    pub positions: Option<Vec<[f32; 3]>>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 3]>>,
    pub indices: Option<Vec<u32>>,
    pub faces: Option<Vec<Vec<u32>>>,
    pub skin: Option<SkinAttributes>,
}

/// Which GPU channels a geometry mutation dirtied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryChannels {
    pub positions: bool,
    pub normals: bool,
    pub uvs: bool,
    pub colors: bool,
    pub indices: bool,
}

impl GeometryChannels {
    pub const ALL: Self = Self {
        positions: true,
        normals: true,
        uvs: true,
        colors: true,
        indices: true,
    };

    pub fn any(&self) -> bool {
        self.positions || self.normals || self.uvs || self.colors || self.indices
    }

    pub fn merge(&mut self, other: GeometryChannels) {
        self.positions |= other.positions;
        self.normals |= other.normals;
        self.uvs |= other.uvs;
        self.colors |= other.colors;
        self.indices |= other.indices;
    }
}

#[derive(Default)]
pub struct MeshAssets {
    geometries: HashMap<u32, MeshGeometry>,
}

impl MeshAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mesh_id: u32, geometry: MeshGeometry) {
        geometry.validate();
        self.geometries.insert(mesh_id, geometry);
    }

    pub fn remove(&mut self, mesh_id: u32) -> Option<MeshGeometry> {
        self.geometries.remove(&mesh_id)
    }

    pub fn get(&self, mesh_id: u32) -> Option<&MeshGeometry> {
        self.geometries.get(&mesh_id)
    }

    pub fn get_mut(&mut self, mesh_id: u32) -> Option<&mut MeshGeometry> {
        self.geometries.get_mut(&mesh_id)
    }

    pub fn mesh_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.geometries.keys().copied()
    }

    /// Merge a partial update into the stored geometry. Bounds are always
    /// refreshed when positions move; normals are refreshed only when the
    /// caller moved positions without supplying its own normals. Unknown
    /// mesh ids are a silent no-op (UI races against asset removal).
    pub fn update_geometry(&mut self, mesh_id: u32, update: PartialGeometry) -> GeometryChannels {
        let Some(geometry) = self.geometries.get_mut(&mesh_id) else {
            log::warn!("geometry update for unknown mesh {mesh_id} ignored");
            return GeometryChannels::default();
        };

        let mut dirtied = GeometryChannels::default();
        let moved_positions = update.positions.is_some();
        let supplied_normals = update.normals.is_some();

        if let Some(positions) = update.positions {
            geometry.positions = positions;
            dirtied.positions = true;
        }
        if let Some(normals) = update.normals {
            geometry.normals = normals;
            dirtied.normals = true;
        }
        if let Some(uvs) = update.uvs {
            geometry.uvs = uvs;
            dirtied.uvs = true;
        }
        if let Some(colors) = update.colors {
            geometry.colors = Some(colors);
            dirtied.colors = true;
        }
        if let Some(indices) = update.indices {
            geometry.indices = indices;
            dirtied.indices = true;
        }
        if let Some(faces) = update.faces {
            geometry.faces = faces;
        }
        if let Some(skin) = update.skin {
            geometry.skin = Some(skin);
        }

        if moved_positions {
            geometry.recompute_bounds();
            if !supplied_normals {
                geometry.recompute_normals();
                dirtied.normals = true;
            }
        }
        geometry.validate();
        dirtied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::unit_quad;

    #[test]
    fn position_update_refreshes_normals_and_bounds() {
        let mut assets = MeshAssets::new();
        assets.register(1, unit_quad());

        let moved = vec![
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 2.0, 0.0],
            [0.0, 2.0, 0.0],
        ];
        let dirtied = assets.update_geometry(
            1,
            PartialGeometry {
                positions: Some(moved),
                ..Default::default()
            },
        );
        assert!(dirtied.positions);
        assert!(dirtied.normals); // recomputed, not supplied
        assert!(!dirtied.uvs);
        let geometry = assets.get(1).unwrap();
        assert_eq!(geometry.bounds().center(), [1.0, 1.0, 0.0]);
    }

    #[test]
    fn supplied_normals_are_kept_verbatim() {
        let mut assets = MeshAssets::new();
        assets.register(1, unit_quad());
        let canted = vec![[0.0, 0.0, 1.0]; 4];
        assets.update_geometry(
            1,
            PartialGeometry {
                positions: Some(unit_quad().positions),
                normals: Some(canted.clone()),
                ..Default::default()
            },
        );
        assert_eq!(assets.get(1).unwrap().normals, canted);
    }

    #[test]
    fn unknown_mesh_update_is_a_noop() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut assets = MeshAssets::new();
        let dirtied = assets.update_geometry(
            42,
            PartialGeometry {
                positions: Some(vec![[0.0; 3]]),
                ..Default::default()
            },
        );
        assert!(!dirtied.any());
    }

    #[test]
    fn channel_merge_accumulates() {
        let mut channels = GeometryChannels {
            positions: true,
            ..Default::default()
        };
        channels.merge(GeometryChannels {
            indices: true,
            ..Default::default()
        });
        assert!(channels.positions && channels.indices && !channels.uvs);
    }
}
