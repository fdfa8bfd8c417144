//! Rendering systems for marblie.
//!
//! The orchestrator's scene graph is the source of truth. These systems
//! mirror its nodes into `Mesh3d` / `StandardMaterial` entities, its lights
//! into bevy lights, and the orbit camera into the `Camera3d`.

use std::collections::HashMap;

use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;
use rapier3d::na::{Point3, UnitQuaternion, Vector3};

use crate::bevy::MarblieRes;
use crate::geometry::MeshData;
use crate::scene::{LightId, LightKind, Material, NodeId};

/// Ambient brightness per unit of scene intensity.
const AMBIENT_SCALE: f32 = 300.0;
/// Directional illuminance (lux) per unit of scene intensity.
const DIRECTIONAL_SCALE: f32 = 4_000.0;
/// Point light power (lumens) per unit of scene intensity.
const POINT_SCALE: f32 = 40_000.0;
/// Emissive luminance per unit of material emissive intensity.
const EMISSIVE_SCALE: f32 = 4.0;

/// Marker for the single 3D camera.
#[derive(Component)]
pub struct MainCamera;

/// Root entity of a mirrored scene node.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneNodeVisual(pub NodeId);

/// Entity of a mirrored point or directional light.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneLightVisual(pub LightId);

struct RenderedPart {
    entity: Entity,
    revision: u64,
    material: Handle<StandardMaterial>,
    source: Material,
}

struct RenderedNode {
    root: Entity,
    parts: Vec<RenderedPart>,
}

/// Bookkeeping between scene ids and bevy entities.
#[derive(Resource, Default)]
pub struct RenderedScene {
    nodes: HashMap<NodeId, RenderedNode>,
    lights: HashMap<LightId, Entity>,
}

impl RenderedScene {
    pub fn node_entity(&self, id: NodeId) -> Option<Entity> {
        self.nodes.get(&id).map(|n| n.root)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn vec3(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn point3(p: &Point3<f32>) -> Vec3 {
    vec3(&p.coords)
}

fn quat(q: &UnitQuaternion<f32>) -> Quat {
    let c = q.quaternion().coords;
    Quat::from_xyzw(c.x, c.y, c.z, c.w)
}

fn to_mesh(data: &MeshData) -> Mesh {
    let positions: Vec<[f32; 3]> = data.positions.iter().map(|p| [p.x, p.y, p.z]).collect();
    let indices: Vec<u32> = data.indices.iter().flatten().copied().collect();
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_indices(Indices::U32(indices));
    mesh.compute_smooth_normals();
    mesh
}

fn apply_material(target: &mut StandardMaterial, source: &Material) {
    let [r, g, b, a] = source.color;
    let [er, eg, eb] = source.emissive;
    target.base_color = Color::srgba(r, g, b, a);
    target.emissive = LinearRgba::rgb(er, eg, eb) * (source.emissive_intensity * EMISSIVE_SCALE);
    target.perceptual_roughness = source.roughness;
    target.metallic = source.metalness;
    target.unlit = source.unlit;
    target.alpha_mode = if a < 1.0 { AlphaMode::Blend } else { AlphaMode::Opaque };
}

fn standard_material(source: &Material) -> StandardMaterial {
    let mut material = StandardMaterial::default();
    apply_material(&mut material, source);
    material
}

// ============================================================================
// Systems
// ============================================================================

/// Spawns the camera once at startup.
pub fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Camera3d::default(),
        MainCamera,
        AmbientLight::default(),
        Transform::default(),
    ));
    tracing::info!("[marblie] camera spawned");
}

/// System to copy the orbit camera and the sky color into bevy.
pub fn sync_camera(
    marblie: Option<Res<MarblieRes>>,
    mut cameras: Query<(&mut Transform, &mut Projection), With<MainCamera>>,
    clear_color: Option<ResMut<ClearColor>>,
) {
    let Some(marblie) = marblie else {
        return;
    };
    let camera = marblie.0.camera();
    for (mut transform, mut projection) in &mut cameras {
        *transform = Transform::from_translation(point3(&camera.position))
            .looking_at(point3(&camera.target), Vec3::Y);
        if let Projection::Perspective(perspective) = &mut *projection {
            perspective.fov = camera.fov_y;
            perspective.near = camera.near;
            perspective.far = camera.far;
        }
    }
    if let Some(mut clear_color) = clear_color {
        let [r, g, b] = marblie.0.clear_color();
        clear_color.0 = Color::srgb(r, g, b);
    }
}

/// System to mirror scene nodes: spawn new ones, update poses, materials and
/// rebuilt meshes, and despawn removed ones.
pub fn sync_scene_nodes(
    mut commands: Commands,
    marblie: Option<Res<MarblieRes>>,
    mut rendered: ResMut<RenderedScene>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut roots: Query<(&mut Transform, &mut Visibility), With<SceneNodeVisual>>,
) {
    let Some(marblie) = marblie else {
        return;
    };
    let scene = &marblie.0.stage().scene;

    for (id, node) in scene.nodes() {
        let transform = Transform {
            translation: vec3(&node.transform.translation),
            rotation: quat(&node.transform.rotation),
            scale: vec3(&node.transform.scale),
        };
        let visibility = if node.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };

        let entry = rendered.nodes.entry(id).or_insert_with(|| RenderedNode {
            root: commands
                .spawn((SceneNodeVisual(id), transform, visibility))
                .id(),
            parts: Vec::new(),
        });
        if let Ok((mut current, mut current_visibility)) = roots.get_mut(entry.root) {
            *current = transform;
            *current_visibility = visibility;
        }

        for (index, part) in node.parts.iter().enumerate() {
            match entry.parts.get_mut(index) {
                None => {
                    let material = materials.add(standard_material(&part.material));
                    let entity = commands
                        .spawn((
                            Mesh3d(meshes.add(to_mesh(&part.mesh))),
                            MeshMaterial3d(material.clone()),
                            Transform::default(),
                            ChildOf(entry.root),
                        ))
                        .id();
                    entry.parts.push(RenderedPart {
                        entity,
                        revision: part.revision,
                        material,
                        source: part.material,
                    });
                }
                Some(rendered_part) => {
                    if rendered_part.revision != part.revision {
                        commands
                            .entity(rendered_part.entity)
                            .insert(Mesh3d(meshes.add(to_mesh(&part.mesh))));
                        rendered_part.revision = part.revision;
                    }
                    if rendered_part.source != part.material {
                        if let Some(material) = materials.get_mut(&rendered_part.material) {
                            apply_material(material, &part.material);
                        }
                        rendered_part.source = part.material;
                    }
                }
            }
        }
    }

    rendered.nodes.retain(|id, node| {
        if scene.contains(*id) {
            return true;
        }
        commands.entity(node.root).despawn();
        false
    });
}

/// System to mirror scene lights. Ambient light goes onto the camera.
pub fn sync_scene_lights(
    mut commands: Commands,
    marblie: Option<Res<MarblieRes>>,
    mut rendered: ResMut<RenderedScene>,
    mut lights: Query<
        (&mut Transform, Option<&mut PointLight>, Option<&mut DirectionalLight>),
        With<SceneLightVisual>,
    >,
    mut ambient: Query<&mut AmbientLight, With<MainCamera>>,
) {
    let Some(marblie) = marblie else {
        return;
    };
    let scene = &marblie.0.stage().scene;

    for (id, light) in scene.lights() {
        let [r, g, b] = light.color;
        let color = Color::srgb(r, g, b);
        let position = scene.light_position(id).map_or(Vec3::ZERO, |p| point3(&p));

        let transform = match light.kind {
            LightKind::Ambient => {
                for mut ambient in &mut ambient {
                    ambient.color = color;
                    ambient.brightness = light.intensity * AMBIENT_SCALE;
                }
                continue;
            }
            LightKind::Directional => {
                Transform::from_translation(position).looking_at(Vec3::ZERO, Vec3::Y)
            }
            LightKind::Point { .. } => Transform::from_translation(position),
        };

        let Some(&entity) = rendered.lights.get(&id) else {
            let entity = match light.kind {
                LightKind::Point { range } => commands.spawn((
                    SceneLightVisual(id),
                    PointLight {
                        color,
                        intensity: light.intensity * POINT_SCALE,
                        range,
                        ..default()
                    },
                    transform,
                )),
                _ => commands.spawn((
                    SceneLightVisual(id),
                    DirectionalLight {
                        color,
                        illuminance: light.intensity * DIRECTIONAL_SCALE,
                        shadows_enabled: true,
                        ..default()
                    },
                    transform,
                )),
            }
            .id();
            rendered.lights.insert(id, entity);
            continue;
        };

        if let Ok((mut current, point, directional)) = lights.get_mut(entity) {
            *current = transform;
            if let Some(mut point) = point {
                point.color = color;
                point.intensity = light.intensity * POINT_SCALE;
            }
            if let Some(mut directional) = directional {
                directional.color = color;
                directional.illuminance = light.intensity * DIRECTIONAL_SCALE;
            }
        }
    }

    rendered.lights.retain(|id, entity| {
        if scene.light(*id).is_some() {
            return true;
        }
        commands.entity(*entity).despawn();
        false
    });
}

/// System to draw physics collider outlines while debug drawing is on.
pub fn draw_debug_lines(marblie: Option<Res<MarblieRes>>, mut gizmos: Gizmos) {
    let Some(marblie) = marblie else {
        return;
    };
    for line in marblie.0.debug_lines() {
        let [h, s, l, a] = line.hsla;
        gizmos.line(point3(&line.start), point3(&line.end), Color::hsla(h, s, l, a));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_conversion_keeps_triangles() {
        let data = crate::geometry::cuboid(Vector3::repeat(1.0), Vector3::zeros());
        let mesh = to_mesh(&data);
        assert_eq!(mesh.count_vertices(), data.positions.len());
        assert_eq!(mesh.indices().map(Indices::len), Some(data.indices.len() * 3));
    }

    #[test]
    fn test_translucent_material_blends() {
        let material = standard_material(&Material {
            color: [1.0, 1.0, 1.0, 0.4],
            ..Material::default()
        });
        assert!(matches!(material.alpha_mode, AlphaMode::Blend));
        let opaque = standard_material(&Material::colored([0.5, 0.5, 0.5]));
        assert!(matches!(opaque.alpha_mode, AlphaMode::Opaque));
    }
}
