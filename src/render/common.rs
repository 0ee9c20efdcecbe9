use glam::{Mat4, Vec3, Vec4};

use crate::camera::OrbitCamera;
use crate::scene_graph::{Material, NodeId, NodeKind, Primitive, SceneGraph};

/// Scene background, also used as the clear color.
pub const BACKGROUND: Vec3 = Vec3::new(1.0, 0.9, 0.9);

const FALLBACK_LIGHT_POSITION: Vec3 = Vec3::new(3.0, 5.0, 3.0);

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

impl CameraParams {
    pub fn from_camera(camera: &OrbitCamera, aspect: f32) -> Self {
        Self {
            view_proj: camera.view_proj(aspect),
            position: camera.position,
        }
    }
}

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl LightParams {
    /// Uses the first attached light below `root`, or a light above and
    /// behind the default camera.
    pub fn from_graph(graph: &SceneGraph, root: NodeId) -> Self {
        graph
            .descendants(root)
            .into_iter()
            .filter_map(|id| graph.get(id))
            .find_map(|node| match &node.kind {
                NodeKind::Light(light) => Some(Self {
                    position: node.world_matrix().w_axis.truncate(),
                    color: light.color,
                    intensity: light.intensity,
                }),
                _ => None,
            })
            .unwrap_or(Self {
                position: FALLBACK_LIGHT_POSITION,
                color: Vec3::ONE,
                intensity: 1.0,
            })
    }
}

/// One shape to draw with its world transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub primitive: Primitive,
    pub model: Mat4,
    pub color: Vec4,
}

impl DrawItem {
    fn new(primitive: Primitive, model: Mat4, material: &Material) -> Self {
        Self {
            primitive,
            model,
            color: material.color.extend(material.opacity),
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.color.w < 1.0
    }
}

/// Flattens the meshes and active instances below `root` into draw items,
/// opaque items first.
///
/// Expects world matrices to be current.
pub fn collect_draw_items(graph: &SceneGraph, root: NodeId) -> Vec<DrawItem> {
    let mut items = Vec::new();
    for id in graph.descendants(root) {
        let Some(node) = graph.get(id) else {
            continue;
        };
        let world = node.world_matrix();
        match &node.kind {
            NodeKind::Mesh(mesh) => items.push(DrawItem::new(mesh.primitive, world, &mesh.material)),
            NodeKind::Instanced(pool) => items.extend(
                pool.active_matrices()
                    .iter()
                    .map(|matrix| DrawItem::new(pool.primitive, world * *matrix, &pool.material)),
            ),
            NodeKind::Group | NodeKind::Light(_) => {}
        }
    }
    items.sort_by_key(DrawItem::is_transparent);
    items
}

/// Hashable identity of a primitive's exact dimensions.
pub fn primitive_key(primitive: Primitive) -> [u32; 4] {
    match primitive {
        Primitive::Sphere { radius } => [0, radius.to_bits(), 0, 0],
        Primitive::Capsule { radius, length } => [1, radius.to_bits(), length.to_bits(), 0],
        Primitive::Box {
            width,
            height,
            depth,
        } => [2, width.to_bits(), height.to_bits(), depth.to_bits()],
        Primitive::Cylinder { radius, height } => [3, radius.to_bits(), height.to_bits(), 0],
        Primitive::Plane { width, height } => [4, width.to_bits(), height.to_bits(), 0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_scene;
    use crate::physics::{KinematicEngine, PhysicsEngine};
    use crate::updater;

    const SCENE: &str = r#"
    <mujoco>
      <worldbody>
        <light pos="0 0 2"/>
        <site name="a" pos="0 0 1"/>
        <site name="b" pos="1 0 1"/>
        <body pos="0 0 1">
          <geom type="sphere" size="0.1" rgba="1 0 0 0.5"/>
          <geom type="box" size="0.1 0.1 0.1"/>
        </body>
      </worldbody>
      <tendon><spatial><site site="a"/><site site="b"/></spatial></tendon>
    </mujoco>
    "#;

    #[test]
    fn collects_meshes_and_active_instances() {
        let loaded = KinematicEngine::new().load("draw.xml", SCENE).unwrap();
        let mut graph = SceneGraph::new();
        let scene = build_scene(&mut graph, &loaded.model);
        graph.attach(graph.root(), scene.root);
        let simulation = loaded.simulation.as_ref();
        updater::sync_bodies(&mut graph, &scene, &loaded.model, simulation);
        updater::sync_lights(&mut graph, &scene, &loaded.model, simulation);
        updater::sync_tendons(&mut graph, &scene, &loaded.model, simulation);

        let items = collect_draw_items(&graph, graph.root());
        // Two geoms, one tendon segment and its two end spheres.
        assert_eq!(items.len(), 5);
        assert!(items.last().unwrap().is_transparent());
        assert!(items[..4].iter().all(|item| !item.is_transparent()));

        let light = LightParams::from_graph(&graph, graph.root());
        assert!((light.position - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn keys_distinguish_dimensions() {
        let a = primitive_key(Primitive::Sphere { radius: 1.0 });
        let b = primitive_key(Primitive::Sphere { radius: 2.0 });
        let c = primitive_key(Primitive::Cylinder {
            radius: 1.0,
            height: 0.0,
        });
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, primitive_key(Primitive::Sphere { radius: 1.0 }));
    }

    #[test]
    fn empty_graph_uses_fallback_light() {
        let graph = SceneGraph::new();
        assert!(collect_draw_items(&graph, graph.root()).is_empty());
        let light = LightParams::from_graph(&graph, graph.root());
        assert_eq!(light.position, FALLBACK_LIGHT_POSITION);
    }
}
