//! Per-kind interaction rules.
//!
//! Every behavior that differs between track kinds is a row of [`TRACK_RULES`];
//! the controller and the factories look rows up instead of branching on names.

use serde::{Deserialize, Serialize};

/// Closed set of track piece kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackKind {
    Straight,
    Curve,
    Windmill,
    Funnel,
    Tray,
    Ring,
    RingLong,
    Cone,
    Tube,
    Starter,
    Logo,
    LightCube,
}

/// Kinds the "random" factory picks from.
pub const RANDOM_KINDS: [TrackKind; 4] = [
    TrackKind::Ring,
    TrackKind::RingLong,
    TrackKind::Cone,
    TrackKind::Tube,
];

/// Which drag handles appear while a track is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleSet {
    None,
    /// Left and right, on the track's local Z axis.
    Ends,
    /// Left, middle and right, on the curve control points.
    EndsAndMiddle,
}

/// How a handle drag changes the attached track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformRule {
    Rotate,
    RotateScale,
    CurveReshape,
}

/// Where a kind's colliders come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColliderSource {
    /// Floor and two walls as cuboids sized from the current depth.
    Cuboids,
    /// Trimesh of the swept curve mesh.
    SweptTrimesh,
    /// Two crossed sets of cuboids on a spinning blade body.
    Blades,
    ModelTrimesh,
    ModelConvexHull,
}

/// One row of the rules table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackRules {
    pub kind: TrackKind,
    /// Name used in persisted layouts.
    pub type_name: &'static str,
    pub deletable: bool,
    pub handles: HandleSet,
    pub rule: Option<TransformRule>,
    /// Length range for the handle-to-track vector.
    pub clamp: Option<(f32, f32)>,
    pub collider: ColliderSource,
    /// Named models making up the visual, in part order.
    pub models: &'static [&'static str],
}

pub static TRACK_RULES: [TrackRules; 12] = [
    TrackRules {
        kind: TrackKind::Straight,
        type_name: "StraightTrack",
        deletable: true,
        handles: HandleSet::Ends,
        rule: Some(TransformRule::RotateScale),
        clamp: Some((2.0, 7.0)),
        collider: ColliderSource::Cuboids,
        models: &[],
    },
    TrackRules {
        kind: TrackKind::Curve,
        type_name: "CurveTrack",
        deletable: true,
        handles: HandleSet::EndsAndMiddle,
        rule: Some(TransformRule::CurveReshape),
        clamp: Some((0.5, 7.0)),
        collider: ColliderSource::SweptTrimesh,
        models: &[],
    },
    TrackRules {
        kind: TrackKind::Windmill,
        type_name: "WindmillTrack",
        deletable: true,
        handles: HandleSet::None,
        rule: None,
        clamp: None,
        collider: ColliderSource::Blades,
        models: &[],
    },
    TrackRules {
        kind: TrackKind::Funnel,
        type_name: "FunnelTrack",
        deletable: true,
        handles: HandleSet::None,
        rule: None,
        clamp: None,
        collider: ColliderSource::ModelTrimesh,
        models: &["FunnelTrack"],
    },
    TrackRules {
        kind: TrackKind::Tray,
        type_name: "TrayTrack",
        deletable: false,
        handles: HandleSet::None,
        rule: None,
        clamp: None,
        collider: ColliderSource::ModelTrimesh,
        models: &["TrayTrack"],
    },
    TrackRules {
        kind: TrackKind::Ring,
        type_name: "RingTrack",
        deletable: true,
        handles: HandleSet::Ends,
        rule: Some(TransformRule::Rotate),
        clamp: None,
        collider: ColliderSource::ModelTrimesh,
        models: &["RingTrack"],
    },
    TrackRules {
        kind: TrackKind::RingLong,
        type_name: "RingLongTrack",
        deletable: true,
        handles: HandleSet::Ends,
        rule: Some(TransformRule::Rotate),
        clamp: None,
        collider: ColliderSource::ModelTrimesh,
        models: &["RingLongTrack"],
    },
    TrackRules {
        kind: TrackKind::Cone,
        type_name: "ConeTrack",
        deletable: true,
        handles: HandleSet::None,
        rule: None,
        clamp: None,
        collider: ColliderSource::ModelTrimesh,
        models: &["ConeTrack"],
    },
    TrackRules {
        kind: TrackKind::Tube,
        type_name: "TubeTrack",
        deletable: true,
        handles: HandleSet::Ends,
        rule: Some(TransformRule::Rotate),
        clamp: None,
        collider: ColliderSource::ModelTrimesh,
        models: &["TubeTrack"],
    },
    TrackRules {
        kind: TrackKind::Starter,
        type_name: "StarterTrack",
        deletable: false,
        handles: HandleSet::None,
        rule: None,
        clamp: None,
        collider: ColliderSource::ModelTrimesh,
        models: &["StarterTrack"],
    },
    TrackRules {
        kind: TrackKind::Logo,
        type_name: "LogoTrack",
        deletable: false,
        handles: HandleSet::Ends,
        rule: Some(TransformRule::Rotate),
        clamp: None,
        collider: ColliderSource::ModelConvexHull,
        models: &["LogoTrackBack", "LogoTrackText"],
    },
    TrackRules {
        kind: TrackKind::LightCube,
        type_name: "LightCube",
        deletable: true,
        handles: HandleSet::Ends,
        rule: Some(TransformRule::Rotate),
        clamp: None,
        collider: ColliderSource::ModelConvexHull,
        models: &["LightCubeBase", "LightCube"],
    },
];

impl TrackKind {
    pub const ALL: [TrackKind; 12] = [
        TrackKind::Straight,
        TrackKind::Curve,
        TrackKind::Windmill,
        TrackKind::Funnel,
        TrackKind::Tray,
        TrackKind::Ring,
        TrackKind::RingLong,
        TrackKind::Cone,
        TrackKind::Tube,
        TrackKind::Starter,
        TrackKind::Logo,
        TrackKind::LightCube,
    ];

    pub fn rules(self) -> &'static TrackRules {
        // Rows are stored in declaration order.
        &TRACK_RULES[self as usize]
    }

    pub fn type_name(self) -> &'static str {
        self.rules().type_name
    }

    /// Looks up a kind by its persisted name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        TRACK_RULES.iter().find(|r| r.type_name == name).map(|r| r.kind)
    }

    pub fn is_deletable(self) -> bool {
        self.rules().deletable
    }

    /// Emissive kinds respond to day/night switching.
    pub fn is_illuminated(self) -> bool {
        matches!(self, TrackKind::Logo | TrackKind::LightCube)
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Every model name referenced by the table, deduplicated, in table order.
pub fn required_models() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Vec::new();
    for rules in &TRACK_RULES {
        for name in rules.models {
            if !names.contains(name) {
                names.push(name);
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_match_kinds() {
        for kind in TrackKind::ALL {
            assert_eq!(kind.rules().kind, kind);
        }
    }

    #[test]
    fn test_type_names_roundtrip() {
        for kind in TrackKind::ALL {
            assert_eq!(TrackKind::from_type_name(kind.type_name()), Some(kind));
        }
        assert_eq!(TrackKind::from_type_name("BogusTrack"), None);
    }

    #[test]
    fn test_undeletable_kinds() {
        let fixed: Vec<_> = TrackKind::ALL
            .into_iter()
            .filter(|k| !k.is_deletable())
            .collect();
        assert_eq!(fixed, vec![TrackKind::Tray, TrackKind::Starter, TrackKind::Logo]);
    }

    #[test]
    fn test_handles_imply_rule() {
        for rules in &TRACK_RULES {
            assert_eq!(rules.handles == HandleSet::None, rules.rule.is_none(), "{:?}", rules.kind);
        }
    }

    #[test]
    fn test_required_models() {
        let models = required_models();
        assert_eq!(models.len(), 11);
        assert!(models.contains(&"LightCubeBase"));
    }
}
