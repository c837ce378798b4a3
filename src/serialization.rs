//! Scene persistence.
//!
//! Scenes are saved as pretty-printed JSON: one row per entity plus the
//! sculpt settings. Runtime-only state (generation counters, cached world
//! matrices, dirty flags, GPU handles) never touches disk; it is rebuilt
//! on load.

use crate::sculpt::SculptSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Persistent state of one entity. Parents are stored by name so rows stay
/// stable across id reuse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRow {
    pub name: String,
    pub position: [f32; 3],
    pub rotation_deg: [f32; 3],
    pub scale: [f32; 3],
    pub components: u32,
    pub mesh_type: u32,
    pub material_index: u32,
    pub base_color: [f32; 3],
    pub texture_index: i32,
    pub effect_index: f32,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub entities: Vec<EntityRow>,
    #[serde(default)]
    pub sculpt: SculptSettings,
}

pub fn save_scene_to_file(scene: &SceneSnapshot, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(scene)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_scene_from_file(path: &Path) -> Result<SceneSnapshot> {
    let json = std::fs::read_to_string(path)?;
    let scene: SceneSnapshot = serde_json::from_str(&json)?;
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sculpt::FalloffKind;
    use crate::store::Component;

    fn sample_row(name: &str, parent: Option<&str>) -> EntityRow {
        EntityRow {
            name: name.to_string(),
            position: [1.0, 2.0, 3.0],
            rotation_deg: [10.0, 20.0, 30.0],
            scale: [1.0, 1.0, 1.0],
            components: Component::Mesh.bit(),
            mesh_type: 4,
            material_index: 2,
            base_color: [0.8, 0.2, 0.1],
            texture_index: -1,
            effect_index: 0.0,
            parent: parent.map(str::to_string),
        }
    }

    #[test]
    fn test_empty_scene_serialization() {
        let scene = SceneSnapshot::default();
        let json = serde_json::to_string_pretty(&scene).unwrap();
        let loaded: SceneSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.entities.len(), 0);
    }

    #[test]
    fn test_entity_rows_roundtrip() {
        let scene = SceneSnapshot {
            entities: vec![sample_row("Body", None), sample_row("Arm", Some("Body"))],
            sculpt: SculptSettings {
                enabled: true,
                radius: 2.5,
                falloff: FalloffKind::Surface,
                ..Default::default()
            },
        };

        let json = serde_json::to_string_pretty(&scene).unwrap();
        let loaded: SceneSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.entities.len(), 2);
        assert_eq!(loaded.entities[1].parent.as_deref(), Some("Body"));
        assert_eq!(loaded.entities[0].rotation_deg, [10.0, 20.0, 30.0]);
        assert!(loaded.sculpt.enabled);
        assert_eq!(loaded.sculpt.radius, 2.5);
        assert_eq!(loaded.sculpt.falloff, FalloffKind::Surface);
    }

    #[test]
    fn test_runtime_fields_are_not_serialized() {
        let scene = SceneSnapshot {
            entities: vec![sample_row("Body", None)],
            sculpt: SculptSettings::default(),
        };
        let json = serde_json::to_string_pretty(&scene).unwrap();
        assert!(!json.contains("generation"));
        assert!(!json.contains("world"));
        assert!(!json.contains("dirty"));
    }

    #[test]
    fn test_missing_sculpt_section_defaults() {
        let json = r#"{ "entities": [] }"#;
        let loaded: SceneSnapshot = serde_json::from_str(json).unwrap();
        assert!(!loaded.sculpt.enabled);
        assert_eq!(loaded.sculpt.radius, 1.0);
    }

    #[test]
    fn test_save_load_stress_loop_via_file() {
        let mut scene = SceneSnapshot {
            entities: vec![
                sample_row("Body", None),
                sample_row("Arm", Some("Body")),
                sample_row("Hand", Some("Arm")),
            ],
            sculpt: SculptSettings::default(),
        };

        let mut path = std::env::temp_dir();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!(
            "meshcore_scene_stress_{}_{}.json",
            std::process::id(),
            nonce
        ));

        for _ in 0..50 {
            super::save_scene_to_file(&scene, &path).unwrap();
            scene = super::load_scene_from_file(&path).unwrap();
            assert_eq!(scene.entities.len(), 3);
            assert_eq!(scene.entities[2].parent.as_deref(), Some("Arm"));
        }

        let _ = std::fs::remove_file(path);
    }
}
