//! Reconstructs a renderable scene graph from compiled model tables.

use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3};
use log::debug;

use crate::physics::{GeomType, Model};
use crate::remap;
use crate::scene_graph::{
    InstancedMesh, Light, LightKind, Material, MaterialKind, Mesh, Node, NodeId, NodeKind,
    Primitive, SceneGraph, ShadowSettings,
};

pub const ROOT_NAME: &str = "MuJoCo Root";
pub const TENDON_POOL_CAPACITY: usize = 1023;

const VISIBLE_GROUPS: i32 = 3;
const FLOOR_SIZE: f32 = 100.0;
const FLOOR_CLIP_BIAS: f32 = 0.003;
const TENDON_COLOR: Vec3 = Vec3::new(0.8, 0.3, 0.3);
const LIGHT_SHADOW: ShadowSettings = ShadowSettings {
    map_size: 1024,
    near: 1.0,
    far: 10.0,
};

/// Scene-graph handles for one loaded model.
#[derive(Debug, Clone)]
pub struct MujocoScene {
    pub root: NodeId,
    /// Body groups, indexed by body id.
    pub bodies: Vec<NodeId>,
    /// Light nodes, indexed by light id.
    pub lights: Vec<NodeId>,
    /// Instanced pool drawing tendon segments.
    pub cylinders: NodeId,
    /// Instanced pool drawing tendon joints and end caps.
    pub spheres: NodeId,
    body_of_node: HashMap<NodeId, usize>,
}

impl MujocoScene {
    /// Body id owning `node`, for body groups and geom meshes.
    pub fn body_of(&self, node: NodeId) -> Option<usize> {
        self.body_of_node.get(&node).copied()
    }
}

/// Builds the node tree for `model` under a new, detached root group.
///
/// The caller attaches `root` to the scene once it is ready to be drawn.
pub fn build_scene(graph: &mut SceneGraph, model: &Model) -> MujocoScene {
    let root = graph.add(Node::group(ROOT_NAME));
    let mut body_of_node = HashMap::new();

    let mut bodies = Vec::with_capacity(model.nbody);
    for body in 0..model.nbody {
        let parent = match body {
            0 => root,
            _ => bodies[model.body_parentid[body]],
        };
        let node = graph.add_child(parent, Node::group(model.body_name(body)));
        body_of_node.insert(node, body);
        bodies.push(node);
    }

    for geom in 0..model.ngeom {
        if model.geom_group[geom] >= VISIBLE_GROUPS {
            continue;
        }
        let body = model.geom_bodyid[geom];
        let node = graph.add_child(bodies[body], geom_node(model, geom));
        body_of_node.insert(node, body);
    }

    let cylinders = graph.add_child(
        root,
        tendon_pool("tendon cylinders", Primitive::Cylinder {
            radius: 1.0,
            height: 1.0,
        }),
    );
    let spheres = graph.add_child(
        root,
        tendon_pool("tendon spheres", Primitive::Sphere { radius: 1.0 }),
    );

    let light_parent = bodies.first().copied().unwrap_or(root);
    let lights = (0..model.nlight)
        .map(|light| {
            let kind = if model.light_directional[light] {
                LightKind::Directional
            } else {
                LightKind::Spot
            };
            // Constant term of this light's attenuation triple.
            let decay = model.light_attenuation[light * 3] as f32 * 100.0;
            graph.add_child(light_parent, light_node(format!("light {light}"), kind, decay))
        })
        .collect::<Vec<_>>();
    if model.nlight == 0 {
        graph.add_child(
            root,
            light_node("default light", LightKind::Directional, 0.0),
        );
    }

    debug!(
        "built scene graph: {} bodies, {} lights, {} nodes mapped to bodies",
        bodies.len(),
        lights.len(),
        body_of_node.len()
    );

    MujocoScene {
        root,
        bodies,
        lights,
        cylinders,
        spheres,
        body_of_node,
    }
}

/// Shape and local scale used to draw a geom.
pub fn geom_primitive(kind: GeomType, size: [f64; 3]) -> (Primitive, Vec3) {
    let [s0, s1, s2] = size.map(|value| value as f32);
    match kind {
        GeomType::Plane => (
            Primitive::Plane {
                width: FLOOR_SIZE,
                height: FLOOR_SIZE,
            },
            Vec3::ONE,
        ),
        GeomType::Sphere => (Primitive::Sphere { radius: s0 }, Vec3::ONE),
        GeomType::Capsule => (
            Primitive::Capsule {
                radius: s0,
                length: s1 * 2.0,
            },
            Vec3::ONE,
        ),
        GeomType::Ellipsoid => (Primitive::Sphere { radius: 1.0 }, Vec3::new(s0, s2, s1)),
        GeomType::Cylinder => (
            Primitive::Cylinder {
                radius: s0,
                height: s1 * 2.0,
            },
            Vec3::ONE,
        ),
        GeomType::Box => (
            Primitive::Box {
                width: s0 * 2.0,
                height: s2 * 2.0,
                depth: s1 * 2.0,
            },
            Vec3::ONE,
        ),
        _ => (Primitive::Sphere { radius: s0 * 0.5 }, Vec3::ONE),
    }
}

fn geom_node(model: &Model, geom: usize) -> Node {
    let kind = model.geom_type[geom];
    let (primitive, scale) = geom_primitive(kind, model.geom_size_at(geom));
    let mut material = Material::from_rgba(model.geom_color(geom));
    if kind == GeomType::Plane {
        material.kind = MaterialKind::Reflector {
            clip_bias: FLOOR_CLIP_BIAS,
        };
    }

    let mut node = Node::new(
        format!("geom {geom}"),
        NodeKind::Mesh(Mesh {
            primitive,
            material,
            cast_shadow: geom != 0,
            receive_shadow: kind != GeomType::Mesh,
        }),
    );
    node.position = remap::position(&model.geom_pos, geom);
    node.rotation = match kind {
        GeomType::Plane => Quat::from_rotation_x(-FRAC_PI_2),
        _ => remap::quaternion(&model.geom_quat, geom),
    };
    node.scale = scale;
    node
}

fn tendon_pool(name: &str, primitive: Primitive) -> Node {
    Node::new(
        name,
        NodeKind::Instanced(InstancedMesh::new(
            primitive,
            Material::phong(TENDON_COLOR),
            TENDON_POOL_CAPACITY,
        )),
    )
}

fn light_node(name: impl Into<String>, kind: LightKind, decay: f32) -> Node {
    Node::new(
        name,
        NodeKind::Light(Light {
            kind,
            color: Vec3::ONE,
            intensity: 1.0,
            decay,
            penumbra: 0.5,
            cast_shadow: true,
            shadow: LIGHT_SHADOW,
            target: Vec3::ZERO,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::mjcf;

    const SCENE: &str = r#"
    <mujoco model="builder">
      <worldbody>
        <geom type="plane" size="1 1 0.1" rgba="1 1 1 1"/>
        <light directional="true" attenuation="0.5 0 0"/>
        <body name="torso" pos="0 0 1">
          <geom type="box" size="0.1 0.2 0.3" rgba="1 0 0 0.5"/>
          <geom type="sphere" size="0.1" group="3"/>
          <body name="head" pos="0 0 0.5">
            <geom type="ellipsoid" size="0.1 0.2 0.3"/>
          </body>
        </body>
      </worldbody>
    </mujoco>
    "#;

    fn build() -> (SceneGraph, MujocoScene) {
        let model = mjcf::compile(SCENE).unwrap();
        let mut graph = SceneGraph::new();
        let scene = build_scene(&mut graph, &model);
        (graph, scene)
    }

    fn first_mesh(graph: &SceneGraph, body: NodeId) -> NodeId {
        graph
            .get(body)
            .unwrap()
            .children()
            .iter()
            .copied()
            .find(|&id| graph.get(id).unwrap().as_mesh().is_some())
            .unwrap()
    }

    #[test]
    fn one_group_per_body_nested_by_parent() {
        let (graph, scene) = build();
        assert_eq!(scene.bodies.len(), 3);
        let names: Vec<_> = scene
            .bodies
            .iter()
            .map(|&id| graph.get(id).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["world", "torso", "head"]);
        assert_eq!(graph.get(scene.bodies[0]).unwrap().parent(), Some(scene.root));
        assert_eq!(graph.get(scene.bodies[2]).unwrap().parent(), Some(scene.bodies[1]));
        assert_eq!(graph.get(scene.root).unwrap().name, ROOT_NAME);
        assert!(!graph.is_attached(scene.root));
    }

    #[test]
    fn hidden_groups_are_skipped_and_meshes_map_to_bodies() {
        let (graph, scene) = build();
        let torso = graph.get(scene.bodies[1]).unwrap();
        assert_eq!(torso.children().len(), 2);
        let mesh = first_mesh(&graph, scene.bodies[1]);
        assert_eq!(scene.body_of(mesh), Some(1));
        let mesh = graph.get(mesh).unwrap().as_mesh().unwrap();
        assert_eq!(
            mesh.primitive,
            Primitive::Box {
                width: 0.2,
                height: 0.6,
                depth: 0.4
            }
        );
        assert!(mesh.material.transparent);
        assert!(mesh.cast_shadow);
    }

    #[test]
    fn floor_is_a_rotated_reflector_without_shadow_casting() {
        let (graph, scene) = build();
        let floor = graph.get(first_mesh(&graph, scene.bodies[0])).unwrap();
        let mesh = floor.as_mesh().unwrap();
        assert!(!mesh.cast_shadow);
        assert!(mesh.receive_shadow);
        assert_eq!(
            mesh.material.kind,
            MaterialKind::Reflector {
                clip_bias: FLOOR_CLIP_BIAS
            }
        );
        assert!(floor.rotation.abs_diff_eq(Quat::from_rotation_x(-FRAC_PI_2), 1e-6));
    }

    #[test]
    fn ellipsoid_scales_a_unit_sphere() {
        let (primitive, scale) = geom_primitive(GeomType::Ellipsoid, [0.1, 0.2, 0.3]);
        assert_eq!(primitive, Primitive::Sphere { radius: 1.0 });
        assert_eq!(scale, Vec3::new(0.1, 0.3, 0.2));
        let (fallback, _) = geom_primitive(GeomType::Mesh, [0.4, 0.0, 0.0]);
        assert_eq!(fallback, Primitive::Sphere { radius: 0.2 });
    }

    #[test]
    fn lights_hang_from_the_world_body() {
        let (mut graph, scene) = build();
        assert_eq!(scene.lights.len(), 1);
        let light_parent = graph.get(scene.lights[0]).unwrap().parent();
        assert_eq!(light_parent, Some(scene.bodies[0]));
        let light = graph.get_mut(scene.lights[0]).unwrap().as_light_mut().unwrap();
        assert_eq!(light.kind, LightKind::Directional);
        assert_eq!(light.decay, 50.0);
        assert_eq!(light.shadow.map_size, 1024);
    }

    #[test]
    fn each_light_decays_by_its_own_attenuation() {
        let model = mjcf::compile(
            r#"<mujoco><worldbody>
              <light directional="true" attenuation="1 0 0"/>
              <light pos="0 0 2" attenuation="0.2 0.5 0.5"/>
            </worldbody></mujoco>"#,
        )
        .unwrap();
        let mut graph = SceneGraph::new();
        let scene = build_scene(&mut graph, &model);
        let decays: Vec<f32> = scene
            .lights
            .iter()
            .map(|&id| graph.get_mut(id).unwrap().as_light_mut().unwrap().decay)
            .collect();
        assert_eq!(decays.len(), 2);
        assert!((decays[0] - 100.0).abs() < 1e-4);
        assert!((decays[1] - 20.0).abs() < 1e-4);
    }

    #[test]
    fn scenes_without_lights_get_a_default_light() {
        let model =
            mjcf::compile(r#"<mujoco><worldbody><geom size="1"/></worldbody></mujoco>"#).unwrap();
        let mut graph = SceneGraph::new();
        let scene = build_scene(&mut graph, &model);
        assert!(scene.lights.is_empty());
        let root = graph.get(scene.root).unwrap();
        let has_light = root
            .children()
            .iter()
            .any(|&id| matches!(graph.get(id).unwrap().kind, NodeKind::Light(_)));
        assert!(has_light);
    }
}
