//! Retained-mode scene graph: a node arena with parent/child links and
//! cached world matrices.
//!
//! Node ids are never reused, so a stale id held across a scene swap resolves
//! to nothing instead of to an unrelated node.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Analytic shape of a mesh, in the node's local frame.
///
/// Capsules and cylinders run along local Y, planes lie in local XY.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    Sphere { radius: f32 },
    /// `length` is the distance between the two hemisphere centres.
    Capsule { radius: f32, length: f32 },
    Box { width: f32, height: f32, depth: f32 },
    Cylinder { radius: f32, height: f32 },
    Plane { width: f32, height: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaterialKind {
    Physical,
    Phong,
    /// Mirror-like floor; `clip_bias` offsets the reflection clip plane.
    Reflector { clip_bias: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub color: Vec3,
    pub opacity: f32,
    pub transparent: bool,
    pub kind: MaterialKind,
}

impl Material {
    /// Physically based material from an `r, g, b, a` color.
    pub fn from_rgba(rgba: [f32; 4]) -> Self {
        Self {
            color: Vec3::new(rgba[0], rgba[1], rgba[2]),
            opacity: rgba[3],
            transparent: rgba[3] < 1.0,
            kind: MaterialKind::Physical,
        }
    }

    pub fn phong(color: Vec3) -> Self {
        Self {
            color,
            opacity: 1.0,
            transparent: false,
            kind: MaterialKind::Phong,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub primitive: Primitive,
    pub material: Material,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightKind {
    Directional,
    Spot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettings {
    pub map_size: u32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub decay: f32,
    pub penumbra: f32,
    pub cast_shadow: bool,
    pub shadow: ShadowSettings,
    /// World-space point the light looks at.
    pub target: Vec3,
}

/// Pool of identical meshes drawn with per-instance matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancedMesh {
    pub primitive: Primitive,
    pub material: Material,
    capacity: usize,
    count: usize,
    matrices: Vec<Mat4>,
    pub needs_update: bool,
}

impl InstancedMesh {
    pub fn new(primitive: Primitive, material: Material, capacity: usize) -> Self {
        Self {
            primitive,
            material,
            capacity,
            count: 0,
            matrices: vec![Mat4::IDENTITY; capacity],
            needs_update: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of instances currently drawn.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Sets the drawn instance count, clamped to the capacity.
    pub fn set_count(&mut self, count: usize) {
        self.count = count.min(self.capacity);
    }

    /// Writes instance `index`; indices past the capacity are ignored.
    pub fn set_matrix_at(&mut self, index: usize, matrix: Mat4) {
        if let Some(slot) = self.matrices.get_mut(index) {
            *slot = matrix;
        }
    }

    pub fn matrix_at(&self, index: usize) -> Option<Mat4> {
        self.matrices.get(index).copied()
    }

    /// Matrices of the drawn instances.
    pub fn active_matrices(&self) -> &[Mat4] {
        &self.matrices[..self.count]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    Light(Light),
    Instanced(InstancedMesh),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    world: Mat4,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            kind,
            parent: None,
            children: Vec::new(),
            world: Mat4::IDENTITY,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// World matrix as of the last world-matrix update.
    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_light_mut(&mut self) -> Option<&mut Light> {
        match &mut self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn as_instanced_mut(&mut self) -> Option<&mut InstancedMesh> {
        match &mut self.kind {
            NodeKind::Instanced(pool) => Some(pool),
            _ => None,
        }
    }
}

/// Node arena rooted at a single scene node.
#[derive(Debug, Clone)]
pub struct SceneGraph {
    nodes: HashMap<NodeId, Node>,
    next_id: usize,
    root: NodeId,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: HashMap::new(),
            next_id: 0,
            root: NodeId(0),
        };
        graph.root = graph.add(Node::group("Scene"));
        graph
    }

    /// The scene root every drawn node hangs from.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts a detached node.
    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    /// Inserts `node` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.add(node);
        self.attach(parent, id);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Moves `child` under `parent`, detaching it from any previous parent.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return;
        }
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    /// Unlinks `id` from its parent; the subtree stays alive.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get_mut(&id).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|&child| child != id);
        }
    }

    /// Detaches and drops `id` and all of its descendants.
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        self.detach(id);
        for node in self.descendants(id) {
            self.nodes.remove(&node);
        }
    }

    /// `id` followed by its descendants in depth-first preorder.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            order.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Whether `id` hangs from the scene root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.nodes.get(&node).and_then(|n| n.parent);
        }
        false
    }

    /// Attached nodes named `name`, in traversal order.
    pub fn find_all_by_name(&self, name: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.nodes.get(id).is_some_and(|node| node.name == name))
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.find_all_by_name(name).into_iter().next()
    }

    /// Recomputes world matrices for `id` and its subtree from the parent's
    /// cached world matrix.
    pub fn update_world_matrix(&mut self, id: NodeId) {
        let parent_world = self
            .nodes
            .get(&id)
            .and_then(|node| node.parent)
            .and_then(|parent| self.nodes.get(&parent))
            .map_or(Mat4::IDENTITY, |parent| parent.world);
        let mut stack = vec![(id, parent_world)];
        while let Some((current, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&current) else {
                continue;
            };
            node.world = parent_world * node.local_matrix();
            let world = node.world;
            stack.extend(node.children.iter().map(|&child| (child, world)));
        }
    }

    pub fn update_world_matrices(&mut self) {
        self.update_world_matrix(self.root);
    }

    /// Transforms a point from `id`'s local frame to world space using the
    /// cached world matrix.
    pub fn local_to_world(&self, id: NodeId, point: Vec3) -> Option<Vec3> {
        self.nodes
            .get(&id)
            .map(|node| node.world.transform_point3(point))
    }

    pub fn world_to_local(&self, id: NodeId, point: Vec3) -> Option<Vec3> {
        self.nodes
            .get(&id)
            .map(|node| node.world.inverse().transform_point3(point))
    }

    /// World-space position of `id`.
    pub fn world_position(&self, id: NodeId) -> Option<Vec3> {
        self.local_to_world(id, Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_moves_between_parents() {
        let mut graph = SceneGraph::new();
        let a = graph.add_child(graph.root(), Node::group("a"));
        let b = graph.add_child(graph.root(), Node::group("b"));
        let leaf = graph.add_child(a, Node::group("leaf"));
        graph.attach(b, leaf);
        assert!(graph.get(a).unwrap().children().is_empty());
        assert_eq!(graph.get(b).unwrap().children(), &[leaf]);
        assert_eq!(graph.get(leaf).unwrap().parent(), Some(b));
    }

    #[test]
    fn world_matrices_compose_down_the_tree() {
        let mut graph = SceneGraph::new();
        let mut parent = Node::group("parent");
        parent.position = Vec3::new(1.0, 0.0, 0.0);
        parent.rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let parent = graph.add_child(graph.root(), parent);
        let mut child = Node::group("child");
        child.position = Vec3::new(0.0, 0.0, 1.0);
        let child = graph.add_child(parent, child);
        graph.update_world_matrices();
        let world = graph.world_position(child).unwrap();
        assert!((world - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
        let back = graph.world_to_local(child, world).unwrap();
        assert!(back.length() < 1e-5);
    }

    #[test]
    fn remove_drops_subtree_and_ids_are_not_reused() {
        let mut graph = SceneGraph::new();
        let a = graph.add_child(graph.root(), Node::group("a"));
        let leaf = graph.add_child(a, Node::group("leaf"));
        graph.remove(a);
        assert!(!graph.contains(a));
        assert!(!graph.contains(leaf));
        assert_eq!(graph.len(), 1);
        let next = graph.add(Node::group("next"));
        assert!(next.index() > leaf.index());
    }

    #[test]
    fn name_lookup_only_sees_attached_nodes() {
        let mut graph = SceneGraph::new();
        let loose = graph.add(Node::group("target"));
        assert_eq!(graph.find_by_name("target"), None);
        graph.attach(graph.root(), loose);
        assert_eq!(graph.find_by_name("target"), Some(loose));
        assert!(graph.is_attached(loose));
        graph.detach(loose);
        assert!(!graph.is_attached(loose));
    }

    #[test]
    fn instanced_pool_clamps_to_capacity() {
        let material = Material::phong(Vec3::ONE);
        let mut pool = InstancedMesh::new(Primitive::Sphere { radius: 1.0 }, material, 2);
        pool.set_matrix_at(5, Mat4::from_translation(Vec3::X));
        pool.set_count(10);
        assert_eq!(pool.count(), 2);
        assert_eq!(pool.active_matrices().len(), 2);
        assert_eq!(pool.matrix_at(5), None);
    }

    #[test]
    fn transparency_follows_alpha() {
        assert!(Material::from_rgba([1.0, 1.0, 1.0, 0.5]).transparent);
        assert!(!Material::from_rgba([1.0, 1.0, 1.0, 1.0]).transparent);
    }
}
