//! Persisted track layouts.
//!
//! A layout is a JSON array of records, one per track, in track-list order:
//!
//! ```json
//! [{ "type": "StraightTrack", "id": "...",
//!    "position": { "x": 0, "y": -1, "z": -4 },
//!    "rotation": { "x": 0.26, "y": 0, "z": 0 },
//!    "scale": { "x": 1, "y": 1, "z": 1 } }]
//! ```
//!
//! `scale` is written for Straight pieces only and `curvePoints` for Curve
//! pieces only.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rapier3d::na::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::entity::{Stage, TrackId};
use crate::error::{MarblieError, Result};
use crate::track::{Track, TrackKind};
use crate::util::EulerXyz;

/// Storage key holding the serialized layout.
pub const STORAGE_KEY: &str = "trackData";

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Xyz {
    x: f32,
    y: f32,
    z: f32,
}

impl From<Vector3<f32>> for Xyz {
    fn from(v: Vector3<f32>) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Xyz> for Vector3<f32> {
    fn from(v: Xyz) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<TrackId>,
    position: Xyz,
    rotation: Xyz,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scale: Option<Xyz>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    curve_points: Option<[Xyz; 3]>,
}

/// One placed track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub kind: TrackKind,
    /// `None` asks for a fresh id.
    pub id: Option<TrackId>,
    pub position: Vector3<f32>,
    pub rotation: EulerXyz,
    pub scale: Option<Vector3<f32>>,
    pub curve_points: Option<[Point3<f32>; 3]>,
}

impl TrackRecord {
    pub fn new(kind: TrackKind, position: Vector3<f32>) -> Self {
        Self {
            kind,
            id: None,
            position,
            rotation: EulerXyz::default(),
            scale: None,
            curve_points: None,
        }
    }

    pub fn rotated(mut self, rotation: EulerXyz) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_curve_points(mut self, points: [Point3<f32>; 3]) -> Self {
        self.curve_points = Some(points);
        self
    }

    /// Captures the current visual state of `track`.
    pub fn capture(stage: &Stage, track: &Track) -> Option<Self> {
        let transform = track.transform(stage)?;
        Some(Self {
            kind: track.kind,
            id: Some(track.id.clone()),
            position: transform.translation,
            rotation: track.rotation(),
            scale: (track.kind == TrackKind::Straight).then(|| track.scale()),
            curve_points: track.curve_points().copied(),
        })
    }

    fn to_raw(&self) -> RawRecord {
        RawRecord {
            type_name: self.kind.type_name().to_string(),
            id: self.id.clone(),
            position: self.position.into(),
            rotation: Xyz {
                x: self.rotation.x,
                y: self.rotation.y,
                z: self.rotation.z,
            },
            scale: self.scale.map(Xyz::from),
            curve_points: self.curve_points.map(|p| p.map(|p| Xyz::from(p.coords))),
        }
    }

    fn from_raw(raw: RawRecord) -> Option<Self> {
        let Some(kind) = TrackKind::from_type_name(&raw.type_name) else {
            tracing::warn!("[marblie] skipping unknown track type {:?}", raw.type_name);
            return None;
        };
        Some(Self {
            kind,
            id: raw.id,
            position: raw.position.into(),
            rotation: EulerXyz::new(raw.rotation.x, raw.rotation.y, raw.rotation.z),
            scale: raw.scale.map(Vector3::from),
            curve_points: raw
                .curve_points
                .map(|p| p.map(|p| Point3::from(Vector3::from(p)))),
        })
    }
}

// ============================================================================
// Layout
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layout {
    pub records: Vec<TrackRecord>,
}

impl Layout {
    /// Parses a layout. Records that fail to parse or name an unknown type
    /// are skipped; a document that is not a JSON array is an error.
    pub fn from_json(json: &str) -> Result<Self> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let records = values
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value::<RawRecord>(value) {
                Ok(raw) => TrackRecord::from_raw(raw),
                Err(e) => {
                    tracing::warn!("[marblie] skipping malformed track record {index}: {e}");
                    None
                }
            })
            .collect();
        Ok(Self { records })
    }

    pub fn to_json(&self) -> Result<String> {
        let raw: Vec<RawRecord> = self.records.iter().map(TrackRecord::to_raw).collect();
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    /// Snapshot of every active track, in list order.
    pub fn capture(stage: &Stage, tracks: &[Track]) -> Self {
        Self {
            records: tracks
                .iter()
                .filter_map(|t| TrackRecord::capture(stage, t))
                .collect(),
        }
    }

    /// The layout shown on first launch.
    pub fn default_layout() -> Self {
        let degrees = |d: f32| EulerXyz::about_x(d.to_radians());
        let v = Vector3::new;
        Self {
            records: vec![
                TrackRecord::new(TrackKind::Starter, v(0.0, 7.51, 6.7)),
                TrackRecord::new(TrackKind::Straight, v(0.0, -1.0, -4.0)).rotated(degrees(15.0)),
                TrackRecord::new(TrackKind::Straight, v(0.0, -7.0, 5.0)).rotated(degrees(-10.0)),
                TrackRecord::new(TrackKind::Curve, v(0.0, 6.0, 5.0)).with_curve_points([
                    Point3::new(0.0, 0.0, 3.5),
                    Point3::new(0.0, -3.0, 0.0),
                    Point3::new(0.0, -3.0, -3.5),
                ]),
                TrackRecord::new(TrackKind::Windmill, v(0.0, 0.5, 0.0)),
                TrackRecord::new(TrackKind::Funnel, v(0.0, -3.5, 5.0)),
                TrackRecord::new(TrackKind::Tray, v(0.0, -9.0, -3.0)),
                TrackRecord::new(TrackKind::Logo, v(0.0, 9.0, 1.0)).rotated(degrees(9.0)),
                TrackRecord::new(TrackKind::Ring, v(0.0, 0.0, -5.0)).rotated(degrees(80.0)),
            ],
        }
    }

    /// Reads the stored layout, falling back to the default one when nothing
    /// is stored or the stored document cannot be parsed.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match store.get(STORAGE_KEY) {
            Ok(Some(json)) => Self::from_json(&json).unwrap_or_else(|e| {
                tracing::warn!("[marblie] stored layout unreadable, using default: {e}");
                Self::default_layout()
            }),
            Ok(None) => Self::default_layout(),
            Err(e) => {
                tracing::warn!("[marblie] layout storage unavailable, using default: {e}");
                Self::default_layout()
            }
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.set(STORAGE_KEY, &self.to_json()?)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Storage
// ============================================================================

/// String key-value persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// In-process store; clones share their contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Browser `localStorage`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorageStore;

#[cfg(target_arch = "wasm32")]
impl LocalStorageStore {
    fn storage() -> Result<web_sys::Storage> {
        web_sys::window()
            .ok_or_else(|| MarblieError::Storage("no window".into()))?
            .local_storage()
            .map_err(|e| MarblieError::Storage(format!("{e:?}")))?
            .ok_or_else(|| MarblieError::Storage("localStorage disabled".into()))
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Self::storage()?
            .get_item(key)
            .map_err(|e| MarblieError::Storage(format!("{e:?}")))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|e| MarblieError::Storage(format!("{e:?}")))
    }
}

/// Store that always fails, for exercising degraded paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStore;

impl KeyValueStore for UnavailableStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(MarblieError::Storage("storage unavailable".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(MarblieError::Storage("storage unavailable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_roundtrip_preserves_order() {
        let mut layout = Layout::default_layout();
        layout.records[1].id = Some(TrackId::from("straight-1"));
        layout.records[1].scale = Some(Vector3::new(1.0, 1.0, 0.6));

        let json = layout.to_json().unwrap();
        let parsed = Layout::from_json(&json).unwrap();
        assert_eq!(parsed, layout);
        let kinds: Vec<_> = parsed.records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds[0], TrackKind::Starter);
        assert_eq!(kinds[8], TrackKind::Ring);
    }

    #[test]
    fn test_wire_field_names() {
        let layout = Layout {
            records: vec![
                TrackRecord::new(TrackKind::Curve, Vector3::zeros()).with_curve_points([
                    Point3::new(0.0, 0.0, 3.5),
                    Point3::new(0.0, -3.0, 0.0),
                    Point3::new(0.0, 0.0, -3.5),
                ]),
            ],
        };
        let json = layout.to_json().unwrap();
        assert!(json.contains("\"type\": \"CurveTrack\""));
        assert!(json.contains("\"curvePoints\""));
        assert!(!json.contains("\"scale\""));
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let json = r#"[
            { "type": "StarterTrack", "id": "a", "position": {"x":0,"y":7.51,"z":6.7}, "rotation": {"x":0,"y":0,"z":0} },
            { "type": "BogusTrack", "id": "b", "position": {"x":0,"y":0,"z":0}, "rotation": {"x":0,"y":0,"z":0} },
            { "type": "RingTrack", "id": "c", "position": {"x":0,"y":0,"z":-5}, "rotation": {"x":1.4,"y":0,"z":0} }
        ]"#;
        let layout = Layout::from_json(json).unwrap();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.records[0].kind, TrackKind::Starter);
        assert_eq!(layout.records[1].id, Some(TrackId::from("c")));
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let json = r#"[
            { "type": "TrayTrack", "position": {"x":0,"y":-9,"z":-3}, "rotation": {"x":0,"y":0,"z":0} },
            { "type": "StraightTrack", "position": "nowhere" }
        ]"#;
        let layout = Layout::from_json(json).unwrap();
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.records[0].id, None);
    }

    #[test]
    fn test_malformed_document_falls_back_to_default() {
        let store = MemoryStore::new();
        store.set(STORAGE_KEY, "{ not json").unwrap();
        assert!(Layout::from_json("{ not json").is_err());
        assert_eq!(Layout::load(&store), Layout::default_layout());
    }

    #[test]
    fn test_empty_and_unavailable_store_use_default() {
        assert_eq!(Layout::load(&MemoryStore::new()), Layout::default_layout());
        assert_eq!(Layout::load(&UnavailableStore), Layout::default_layout());
        assert!(Layout::default_layout().save(&UnavailableStore).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStore::new();
        let layout = Layout {
            records: vec![TrackRecord::new(TrackKind::Cone, Vector3::new(0.0, 1.0, 2.0))],
        };
        layout.save(&store).unwrap();
        assert_eq!(Layout::load(&store.clone()), layout);
    }
}
