//! Named model meshes for the catalog's mesh-backed kinds.
//!
//! Loading is asynchronous and happens once, before any track exists.
//! [`AssetLibrary`] can only be obtained from [`AssetLibrary::preload`].

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use rapier3d::na::{Isometry3, Point2, Point3, Vector3};

use crate::error::{MarblieError, Result};
use crate::geometry::{MERGE_TOLERANCE, MeshData, cuboid, lathe, torus};
use crate::track::catalog::required_models;

/// Produces the meshes of a named model.
pub trait ModelSource {
    fn load(&self, name: &str) -> impl Future<Output = Result<Vec<MeshData>>>;
}

// ============================================================================
// glTF source
// ============================================================================

/// Reads `.glb` files, either from a directory or from in-memory bytes.
#[derive(Debug, Clone)]
pub struct GltfModelSource {
    root: Option<PathBuf>,
    bytes: HashMap<String, Arc<[u8]>>,
}

impl GltfModelSource {
    /// File name of each model below the asset directory.
    pub fn file_name(name: &str) -> Option<&'static str> {
        Some(match name {
            "FunnelTrack" => "funnel.glb",
            "LogoTrackBack" => "logo-back.glb",
            "LogoTrackText" => "logo-text.glb",
            "RingTrack" => "ring.glb",
            "ConeTrack" => "cone.glb",
            "RingLongTrack" => "ring-long.glb",
            "StarterTrack" => "starter.glb",
            "TrayTrack" => "tray.glb",
            "TubeTrack" => "tube.glb",
            "LightCube" => "light-cube.glb",
            "LightCubeBase" => "light-cube-base.glb",
            _ => return None,
        })
    }

    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            bytes: HashMap::new(),
        }
    }

    /// In-memory source; `models` maps model names to `.glb` bytes.
    pub fn from_bytes(models: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            root: None,
            bytes: models
                .into_iter()
                .map(|(name, bytes)| (name, Arc::from(bytes)))
                .collect(),
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        if let Some(bytes) = self.bytes.get(name) {
            return Ok(bytes.to_vec());
        }
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| MarblieError::MissingAsset(name.to_string()))?;
        let file = Self::file_name(name).ok_or_else(|| MarblieError::MissingAsset(name.to_string()))?;
        let path = root.join(file);
        std::fs::read(&path).map_err(|e| MarblieError::Asset {
            name: name.to_string(),
            reason: format!("{}: {e}", path.display()),
        })
    }
}

impl ModelSource for GltfModelSource {
    async fn load(&self, name: &str) -> Result<Vec<MeshData>> {
        let bytes = self.read(name)?;
        decode_glb(name, &bytes)
    }
}

/// Extracts every triangle primitive of every mesh in a glTF binary.
pub fn decode_glb(name: &str, bytes: &[u8]) -> Result<Vec<MeshData>> {
    let (document, buffers, _images) = gltf::import_slice(bytes).map_err(|e| MarblieError::Asset {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    let mut meshes = Vec::new();
    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                continue;
            }
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<Point3<f32>> = positions.map(Point3::from).collect();
            let flat: Vec<u32> = reader
                .read_indices()
                .map(|read| read.into_u32().collect())
                .unwrap_or_else(|| (0..positions.len() as u32).collect());
            let indices = flat
                .chunks_exact(3)
                .map(|t| [t[0], t[1], t[2]])
                .collect();
            meshes.push(MeshData::new(positions, indices));
        }
    }

    if meshes.is_empty() {
        return Err(MarblieError::Asset {
            name: name.to_string(),
            reason: "no triangle meshes".into(),
        });
    }
    Ok(meshes)
}

// ============================================================================
// Procedural source
// ============================================================================

/// Built-in stand-ins for every model, so the app runs without asset files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProceduralModelSource;

impl ModelSource for ProceduralModelSource {
    async fn load(&self, name: &str) -> Result<Vec<MeshData>> {
        procedural_model(name).ok_or_else(|| MarblieError::MissingAsset(name.to_string()))
    }
}

fn shell(points: &[(f32, f32)]) -> Vec<Point2<f32>> {
    points.iter().map(|&(r, h)| Point2::new(r, h)).collect()
}

/// Turns a Y-axis solid of revolution so its axis runs along Z.
fn lay_down(mesh: MeshData) -> MeshData {
    mesh.transformed(&Isometry3::rotation(Vector3::x() * std::f32::consts::FRAC_PI_2))
}

fn procedural_model(name: &str) -> Option<Vec<MeshData>> {
    let mesh = match name {
        "FunnelTrack" => lathe(
            &shell(&[(0.8, -1.5), (3.0, 1.0), (2.8, 1.0), (0.6, -1.5)]),
            32,
        )
        .translated(Vector3::new(3.0, 0.0, 0.0)),
        "ConeTrack" => lathe(
            &shell(&[(0.2, 1.5), (2.5, -1.0), (2.3, -1.0), (0.0, 1.3)]),
            32,
        )
        .translated(Vector3::new(2.5, 0.0, 0.0)),
        "RingTrack" => torus(2.0, 0.3, 32, 12).translated(Vector3::new(2.3, 0.0, 0.0)),
        "RingLongTrack" => MeshData::merge([
            torus(2.0, 0.3, 32, 12).translated(Vector3::new(2.3, 0.0, -1.5)),
            torus(2.0, 0.3, 32, 12).translated(Vector3::new(2.3, 0.0, 1.5)),
        ]),
        "TubeTrack" => lay_down(lathe(
            &shell(&[(1.0, -4.0), (1.0, 4.0), (0.9, 4.0), (0.9, -4.0)]),
            24,
        ))
        .translated(Vector3::new(1.0, 0.0, 0.0)),
        "StarterTrack" => MeshData::merge([
            cuboid(Vector3::new(0.9, 0.1, 2.0), Vector3::new(0.9, -0.5, 0.0)),
            cuboid(Vector3::new(0.1, 0.5, 2.0), Vector3::new(0.1, 0.0, 0.0)),
            cuboid(Vector3::new(0.1, 0.5, 2.0), Vector3::new(1.7, 0.0, 0.0)),
            cuboid(Vector3::new(0.9, 0.5, 0.1), Vector3::new(0.9, 0.0, 1.9)),
        ]),
        "TrayTrack" => MeshData::merge([
            cuboid(Vector3::new(1.0, 0.1, 4.0), Vector3::new(1.0, -0.5, 0.0)),
            cuboid(Vector3::new(0.1, 0.5, 4.0), Vector3::new(1.9, 0.0, 0.0)),
            cuboid(Vector3::new(1.0, 0.5, 0.1), Vector3::new(1.0, 0.0, 3.9)),
            cuboid(Vector3::new(1.0, 0.5, 0.1), Vector3::new(1.0, 0.0, -3.9)),
        ]),
        "LogoTrackBack" => cuboid(Vector3::new(0.15, 1.015, 3.94), Vector3::new(0.15, 0.0, 0.0)),
        "LogoTrackText" => cuboid(Vector3::new(0.05, 0.6, 3.0), Vector3::new(0.35, 0.0, 0.0)),
        "LightCubeBase" => cuboid(Vector3::new(0.5, 0.5, 0.5), Vector3::new(0.5, 0.0, 0.0)),
        "LightCube" => cuboid(Vector3::new(0.4, 0.4, 0.4), Vector3::new(1.4, 0.0, 0.0)),
        _ => return None,
    };
    Some(vec![mesh])
}

// ============================================================================
// Library
// ============================================================================

/// Visual meshes of one model plus their vertex-welded collider versions.
#[derive(Debug, Clone)]
pub struct Model {
    pub meshes: Vec<Arc<MeshData>>,
    pub welded: Vec<Arc<MeshData>>,
}

/// Every model the catalog needs, loaded up front.
#[derive(Debug, Clone)]
pub struct AssetLibrary {
    models: HashMap<String, Model>,
}

impl AssetLibrary {
    /// Loads every model named by the rules table from `source`.
    pub async fn preload<S: ModelSource>(source: &S) -> Result<Self> {
        let mut models = HashMap::new();
        for name in required_models() {
            let meshes = source.load(name).await?;
            if meshes.iter().all(MeshData::is_empty) {
                return Err(MarblieError::Asset {
                    name: name.to_string(),
                    reason: "model has no triangles".into(),
                });
            }
            let welded = meshes
                .iter()
                .map(|m| Arc::new(m.merge_vertices(MERGE_TOLERANCE)))
                .collect();
            let meshes = meshes.into_iter().map(Arc::new).collect();
            tracing::debug!("[marblie] loaded model {name}");
            models.insert(name.to_string(), Model { meshes, welded });
        }
        tracing::info!("[marblie] preloaded {} models", models.len());
        Ok(Self { models })
    }

    pub fn model(&self, name: &str) -> Result<&Model> {
        self.models
            .get(name)
            .ok_or_else(|| MarblieError::MissingAsset(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_library() -> AssetLibrary {
    pollster::block_on(AssetLibrary::preload(&ProceduralModelSource)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl ModelSource for Failing {
        async fn load(&self, name: &str) -> Result<Vec<MeshData>> {
            Err(MarblieError::MissingAsset(name.to_string()))
        }
    }

    #[test]
    fn test_procedural_preload_covers_catalog() {
        let library = test_library();
        assert_eq!(library.len(), required_models().len());
        for name in required_models() {
            let model = library.model(name).unwrap();
            assert!(!model.meshes.is_empty());
            assert_eq!(model.meshes.len(), model.welded.len());
        }
    }

    #[test]
    fn test_preload_fails_on_missing_model() {
        let result = pollster::block_on(AssetLibrary::preload(&Failing));
        assert!(matches!(result, Err(MarblieError::MissingAsset(_))));
    }

    #[test]
    fn test_unknown_model_is_missing() {
        let library = test_library();
        assert!(matches!(library.model("Nope"), Err(MarblieError::MissingAsset(_))));
    }

    #[test]
    fn test_gltf_source_reports_missing_file() {
        let source = GltfModelSource::from_dir("/nonexistent/marblie-assets");
        let result = pollster::block_on(source.load("FunnelTrack"));
        assert!(matches!(result, Err(MarblieError::Asset { .. })));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_glb("x", b"not a glb").is_err());
    }

    #[test]
    fn test_welding_shrinks_cuboid_models() {
        let library = test_library();
        let model = library.model("LightCube").unwrap();
        assert!(model.welded[0].positions.len() <= model.meshes[0].positions.len());
    }
}
