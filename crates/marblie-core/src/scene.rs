//! Engine-independent scene graph.
//!
//! Nodes carry a transform, mesh parts and a role describing what they
//! represent. The render layer mirrors this graph; the transform controller
//! ray-casts against it.

use std::collections::BTreeMap;
use std::sync::Arc;

use rapier3d::na::{Point3, UnitQuaternion, Vector3};
use rapier3d::parry::query::{Ray, RayCast};
use rapier3d::parry::shape::Triangle;

use crate::entity::{MarbleId, TrackId};
use crate::geometry::{BoundingSphere, MeshData};

/// Identifier of a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

/// Identifier of a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LightId(u64);

/// Translation, rotation and non-uniform scale of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    pub fn transform_point(&self, p: &Point3<f32>) -> Point3<f32> {
        Point3::from(self.translation + self.rotation * p.coords.component_mul(&self.scale))
    }

    /// Maps a world-space ray into this transform's local space.
    ///
    /// The returned ray is not normalized, so hit parameters stay comparable
    /// with the world-space ray.
    pub fn inverse_transform_ray(&self, ray: &Ray) -> Ray {
        let inv_scale = self.scale.map(|s| if s.abs() > f32::EPSILON { 1.0 / s } else { 0.0 });
        let inv_rot = self.rotation.inverse();
        let origin = (inv_rot * (ray.origin.coords - self.translation)).component_mul(&inv_scale);
        let dir = (inv_rot * ray.dir).component_mul(&inv_scale);
        Ray::new(Point3::from(origin), dir)
    }
}

/// What a node stands for, used by picking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRole {
    Track(TrackId),
    Marble(MarbleId),
    Handle(HandleRole),
    Backdrop,
}

/// Position of a drag handle relative to its track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleRole {
    Left,
    Middle,
    Right,
}

/// Surface description used by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// sRGB base color with alpha.
    pub color: [f32; 4],
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
    pub roughness: f32,
    pub metalness: f32,
    /// Unlit materials ignore scene lighting (handles).
    pub unlit: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
            emissive: [0.0, 0.0, 0.0],
            emissive_intensity: 0.0,
            roughness: 0.5,
            metalness: 0.0,
            unlit: false,
        }
    }
}

impl Material {
    pub fn colored(color: [f32; 3]) -> Self {
        Self {
            color: [color[0], color[1], color[2], 1.0],
            ..Default::default()
        }
    }
}

/// A mesh with its material, owned by a node.
#[derive(Debug, Clone)]
pub struct MeshPart {
    pub mesh: Arc<MeshData>,
    pub material: Material,
    /// Bumped whenever `mesh` is replaced.
    pub revision: u64,
    bounds: BoundingSphere,
}

impl MeshPart {
    pub fn new(mesh: Arc<MeshData>, material: Material) -> Self {
        let bounds = mesh.bounding_sphere();
        Self {
            mesh,
            material,
            revision: 0,
            bounds,
        }
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.bounds
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub role: NodeRole,
    pub transform: Transform,
    pub parts: Vec<MeshPart>,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Point { range: f32 },
    Directional,
    Ambient,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
    /// Node the light follows; `None` for world-space lights.
    pub parent: Option<NodeId>,
    /// Offset from the parent origin (or world position when unparented).
    pub offset: Vector3<f32>,
}

/// Nearest ray intersection returned by [`Scene::raycast`].
#[derive(Debug, Clone, PartialEq)]
pub struct SceneHit {
    pub node: NodeId,
    pub role: NodeRole,
    pub distance: f32,
    pub point: Point3<f32>,
}

/// The scene graph. Iteration order is creation order.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: BTreeMap<NodeId, Node>,
    lights: BTreeMap<LightId, Light>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // ------------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------------

    pub fn add_node(&mut self, role: NodeRole, transform: Transform) -> NodeId {
        let id = NodeId(self.allocate());
        self.nodes.insert(
            id,
            Node {
                role,
                transform,
                parts: Vec::new(),
                visible: true,
            },
        );
        id
    }

    /// Removes a node and every light parented to it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        self.lights.retain(|_, light| light.parent != Some(id));
        self.nodes.remove(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn transform(&self, id: NodeId) -> Option<Transform> {
        self.nodes.get(&id).map(|n| n.transform)
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.transform = transform;
        }
    }

    pub fn set_translation(&mut self, id: NodeId, translation: Vector3<f32>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.transform.translation = translation;
        }
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vector3<f32>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.transform.scale = scale;
        }
    }

    /// Appends a mesh part and returns its index within the node.
    pub fn add_part(&mut self, id: NodeId, mesh: Arc<MeshData>, material: Material) -> Option<usize> {
        let node = self.nodes.get_mut(&id)?;
        node.parts.push(MeshPart::new(mesh, material));
        Some(node.parts.len() - 1)
    }

    /// Swaps the mesh of an existing part, bumping its revision.
    pub fn replace_mesh(&mut self, id: NodeId, part: usize, mesh: Arc<MeshData>) {
        if let Some(part) = self.nodes.get_mut(&id).and_then(|n| n.parts.get_mut(part)) {
            part.bounds = mesh.bounding_sphere();
            part.mesh = mesh;
            part.revision += 1;
        }
    }

    pub fn material_mut(&mut self, id: NodeId, part: usize) -> Option<&mut Material> {
        self.nodes
            .get_mut(&id)
            .and_then(|n| n.parts.get_mut(part))
            .map(|p| &mut p.material)
    }

    // ------------------------------------------------------------------------
    // Lights
    // ------------------------------------------------------------------------

    pub fn add_light(&mut self, light: Light) -> LightId {
        let id = LightId(self.allocate());
        self.lights.insert(id, light);
        id
    }

    pub fn remove_light(&mut self, id: LightId) -> Option<Light> {
        self.lights.remove(&id)
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(&id)
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(&id)
    }

    pub fn lights(&self) -> impl Iterator<Item = (LightId, &Light)> {
        self.lights.iter().map(|(id, light)| (*id, light))
    }

    /// World position of a light, following its parent node.
    pub fn light_position(&self, id: LightId) -> Option<Point3<f32>> {
        let light = self.lights.get(&id)?;
        match light.parent {
            Some(parent) => self
                .nodes
                .get(&parent)
                .map(|n| n.transform.transform_point(&Point3::from(light.offset))),
            None => Some(Point3::from(light.offset)),
        }
    }

    // ------------------------------------------------------------------------
    // Picking
    // ------------------------------------------------------------------------

    /// Nearest visible node surface hit by `ray`, among nodes accepted by `filter`.
    pub fn raycast(&self, ray: &Ray, filter: impl Fn(&NodeRole) -> bool) -> Option<SceneHit> {
        let mut best: Option<(f32, NodeId)> = None;

        for (id, node) in &self.nodes {
            if !node.visible || !filter(&node.role) {
                continue;
            }
            let local_ray = node.transform.inverse_transform_ray(ray);
            for part in &node.parts {
                let max = best.map_or(f32::MAX, |(toi, _)| toi);
                if let Some(toi) = cast_part(part, &local_ray, max) {
                    best = Some((toi, *id));
                }
            }
        }

        best.and_then(|(toi, id)| {
            self.nodes.get(&id).map(|node| SceneHit {
                node: id,
                role: node.role.clone(),
                distance: toi,
                point: ray.point_at(toi),
            })
        })
    }
}

fn cast_part(part: &MeshPart, ray: &Ray, max_toi: f32) -> Option<f32> {
    let sphere = part.bounds;
    let to_center = sphere.center - ray.origin;
    let dir_len_sq = ray.dir.norm_squared();
    if dir_len_sq <= f32::EPSILON {
        return None;
    }
    // Closest approach of the ray to the bounding sphere centre.
    let along = to_center.dot(&ray.dir) / dir_len_sq;
    let closest = ray.point_at(along.max(0.0));
    if (closest - sphere.center).norm() > sphere.radius {
        return None;
    }

    let mesh = &part.mesh;
    let mut best: Option<f32> = None;
    for [a, b, c] in &mesh.indices {
        let triangle = Triangle::new(
            mesh.positions[*a as usize],
            mesh.positions[*b as usize],
            mesh.positions[*c as usize],
        );
        let limit = best.unwrap_or(max_toi);
        if let Some(toi) = triangle.cast_local_ray(ray, limit, true) {
            if toi < limit {
                best = Some(toi);
            }
        }
    }
    best
}
