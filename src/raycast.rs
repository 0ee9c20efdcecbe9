//! Ray picking against the analytic shapes of scene-graph meshes.

use glam::Vec3;

use crate::scene_graph::{NodeId, Primitive, SceneGraph};

const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub node: NodeId,
    /// World-space distance along the ray.
    pub distance: f32,
    pub point: Vec3,
}

/// Intersects `ray` with every mesh under `root`, nearest first.
///
/// Uses cached world matrices; call [`SceneGraph::update_world_matrices`]
/// after moving nodes.
pub fn intersect(graph: &SceneGraph, root: NodeId, ray: &Ray) -> Vec<Intersection> {
    let mut hits: Vec<Intersection> = graph
        .descendants(root)
        .into_iter()
        .filter_map(|id| {
            let node = graph.get(id)?;
            let mesh = node.as_mesh()?;
            let inverse = node.world_matrix().inverse();
            let origin = inverse.transform_point3(ray.origin);
            let direction = inverse.transform_vector3(ray.direction);
            // `direction` keeps the world scale, so `t` is a world distance.
            let distance = intersect_primitive(mesh.primitive, origin, direction)?;
            Some(Intersection {
                node: id,
                distance,
                point: ray.at(distance),
            })
        })
        .collect();
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

/// Smallest positive ray parameter at which `origin + t * direction` meets
/// the shape, in the shape's local frame.
pub fn intersect_primitive(primitive: Primitive, origin: Vec3, direction: Vec3) -> Option<f32> {
    match primitive {
        Primitive::Sphere { radius } => sphere(origin, direction, Vec3::ZERO, radius),
        Primitive::Capsule { radius, length } => {
            let half = length * 0.5;
            [
                side(origin, direction, radius, half),
                sphere(origin, direction, Vec3::Y * half, radius),
                sphere(origin, direction, Vec3::NEG_Y * half, radius),
            ]
            .into_iter()
            .flatten()
            .reduce(f32::min)
        }
        Primitive::Cylinder { radius, height } => {
            let half = height * 0.5;
            [
                side(origin, direction, radius, half),
                cap(origin, direction, radius, half),
                cap(origin, direction, radius, -half),
            ]
            .into_iter()
            .flatten()
            .reduce(f32::min)
        }
        Primitive::Box {
            width,
            height,
            depth,
        } => aabb(origin, direction, Vec3::new(width, height, depth) * 0.5),
        Primitive::Plane { width, height } => {
            if direction.z.abs() < EPSILON {
                return None;
            }
            let t = -origin.z / direction.z;
            let point = origin + direction * t;
            (t > EPSILON && point.x.abs() <= width * 0.5 && point.y.abs() <= height * 0.5)
                .then_some(t)
        }
    }
}

fn smallest_root(a: f32, b: f32, c: f32) -> Option<f32> {
    if a.abs() < EPSILON {
        return None;
    }
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    let sqrt = discriminant.sqrt();
    let near = (-b - sqrt) / (2.0 * a);
    let far = (-b + sqrt) / (2.0 * a);
    [near, far].into_iter().find(|&t| t > EPSILON)
}

fn sphere(origin: Vec3, direction: Vec3, centre: Vec3, radius: f32) -> Option<f32> {
    let offset = origin - centre;
    smallest_root(
        direction.dot(direction),
        2.0 * offset.dot(direction),
        offset.dot(offset) - radius * radius,
    )
}

/// Open tube of `radius` around Y, limited to `|y| <= half`.
fn side(origin: Vec3, direction: Vec3, radius: f32, half: f32) -> Option<f32> {
    let a = direction.x * direction.x + direction.z * direction.z;
    let b = 2.0 * (origin.x * direction.x + origin.z * direction.z);
    let c = origin.x * origin.x + origin.z * origin.z - radius * radius;
    if a.abs() < EPSILON {
        return None;
    }
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    let sqrt = discriminant.sqrt();
    [(-b - sqrt) / (2.0 * a), (-b + sqrt) / (2.0 * a)]
        .into_iter()
        .find(|&t| t > EPSILON && (origin.y + direction.y * t).abs() <= half)
}

fn cap(origin: Vec3, direction: Vec3, radius: f32, y: f32) -> Option<f32> {
    if direction.y.abs() < EPSILON {
        return None;
    }
    let t = (y - origin.y) / direction.y;
    let point = origin + direction * t;
    (t > EPSILON && point.x * point.x + point.z * point.z <= radius * radius).then_some(t)
}

fn aabb(origin: Vec3, direction: Vec3, half: Vec3) -> Option<f32> {
    let mut near = f32::NEG_INFINITY;
    let mut far = f32::INFINITY;
    for axis in 0..3 {
        let (o, d, h) = (origin[axis], direction[axis], half[axis]);
        if d.abs() < EPSILON {
            if o.abs() > h {
                return None;
            }
            continue;
        }
        let (t0, t1) = ((-h - o) / d, (h - o) / d);
        near = near.max(t0.min(t1));
        far = far.min(t0.max(t1));
    }
    if near > far || far <= EPSILON {
        return None;
    }
    Some(if near > EPSILON { near } else { far })
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;
    use crate::scene_graph::{Material, Mesh, Node, NodeKind};

    fn mesh_node(name: &str, primitive: Primitive, position: Vec3) -> Node {
        let mut node = Node::new(
            name,
            NodeKind::Mesh(Mesh {
                primitive,
                material: Material::from_rgba([1.0; 4]),
                cast_shadow: true,
                receive_shadow: true,
            }),
        );
        node.position = position;
        node
    }

    #[test]
    fn sphere_hit_distance() {
        let t = intersect_primitive(Primitive::Sphere { radius: 1.0 }, Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        assert_eq!(t, Some(4.0));
    }

    #[test]
    fn capsule_caps_and_tube() {
        let capsule = Primitive::Capsule {
            radius: 0.5,
            length: 2.0,
        };
        let from_top = intersect_primitive(capsule, Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y).unwrap();
        assert!((from_top - 3.5).abs() < 1e-5);
        let from_side = intersect_primitive(capsule, Vec3::new(5.0, 0.5, 0.0), Vec3::NEG_X).unwrap();
        assert!((from_side - 4.5).abs() < 1e-5);
    }

    #[test]
    fn box_and_cylinder_and_plane() {
        let cube = Primitive::Box {
            width: 2.0,
            height: 2.0,
            depth: 2.0,
        };
        assert_eq!(intersect_primitive(cube, Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z), Some(2.0));
        assert_eq!(intersect_primitive(cube, Vec3::new(3.0, 3.0, 3.0), Vec3::NEG_Z), None);

        let cylinder = Primitive::Cylinder {
            radius: 1.0,
            height: 2.0,
        };
        assert_eq!(intersect_primitive(cylinder, Vec3::new(0.0, 4.0, 0.0), Vec3::NEG_Y), Some(3.0));

        let plane = Primitive::Plane {
            width: 2.0,
            height: 2.0,
        };
        assert_eq!(intersect_primitive(plane, Vec3::new(0.5, 0.5, 1.0), Vec3::NEG_Z), Some(1.0));
        assert_eq!(intersect_primitive(plane, Vec3::new(5.0, 0.0, 1.0), Vec3::NEG_Z), None);
    }

    #[test]
    fn scene_hits_are_sorted_and_scaled() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let far = graph.add_child(root, mesh_node("far", Primitive::Sphere { radius: 1.0 }, Vec3::new(0.0, 0.0, -10.0)));
        let mut near = mesh_node("near", Primitive::Sphere { radius: 1.0 }, Vec3::ZERO);
        near.scale = Vec3::splat(2.0);
        near.rotation = Quat::from_rotation_x(0.3);
        let near = graph.add_child(root, near);
        graph.update_world_matrices();

        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        let hits = intersect(&graph, root, &ray);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node, near);
        assert!((hits[0].distance - 3.0).abs() < 1e-4);
        assert!((hits[0].point - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-4);
        assert_eq!(hits[1].node, far);
    }

    #[test]
    fn misses_return_nothing() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        graph.add_child(root, mesh_node("ball", Primitive::Sphere { radius: 1.0 }, Vec3::ZERO));
        graph.update_world_matrices();
        let ray = Ray::new(Vec3::new(5.0, 5.0, 5.0), Vec3::X);
        assert!(intersect(&graph, root, &ray).is_empty());
    }
}
