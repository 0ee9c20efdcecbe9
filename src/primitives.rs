use std::f32::consts::{PI, TAU};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::scene_graph::Primitive;

const SEGMENTS: u32 = 24;
const RINGS: u32 = 12;

/// GPU ready mesh buffers generated for a primitive.
///
/// Vertices are laid out as `position.xyz` followed by `normal.xyz`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    pub fn for_primitive(primitive: Primitive) -> Self {
        match primitive {
            Primitive::Sphere { radius } => sphere(radius),
            Primitive::Capsule { radius, length } => capsule(radius, length),
            Primitive::Box {
                width,
                height,
                depth,
            } => cuboid(Vec3::new(width, height, depth) * 0.5),
            Primitive::Cylinder { radius, height } => cylinder(radius, height),
            Primitive::Plane { width, height } => plane(width, height),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 6
    }

    pub fn position(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[index * 6..index * 6 + 3])
    }

    pub fn normal(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[index * 6 + 3..index * 6 + 6])
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3) -> u32 {
        let index = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&position.to_array());
        self.vertices.extend_from_slice(&normal.to_array());
        index
    }

    fn push_quad(&mut self, a: u32, b: u32, c: u32, d: u32) {
        self.indices.extend_from_slice(&[a, b, c, a, c, d]);
    }
}

/// Latitude/longitude sphere whose two hemispheres can be pulled apart along
/// Y by `stretch`, which turns it into a capsule.
fn stretched_sphere(radius: f32, stretch: f32) -> TriangleMesh {
    let mut mesh = TriangleMesh::default();
    // Duplicate the equator ring so the two hemispheres can separate.
    let rings = RINGS + 1;
    for ring in 0..=rings {
        let (latitude, offset) = if ring <= RINGS / 2 {
            (ring as f32 / RINGS as f32 * PI, stretch * 0.5)
        } else {
            ((ring - 1) as f32 / RINGS as f32 * PI, -stretch * 0.5)
        };
        for segment in 0..=SEGMENTS {
            let longitude = segment as f32 / SEGMENTS as f32 * TAU;
            let normal = Vec3::new(
                latitude.sin() * longitude.cos(),
                latitude.cos(),
                latitude.sin() * longitude.sin(),
            );
            mesh.push_vertex(normal * radius + Vec3::Y * offset, normal);
        }
    }
    let stride = SEGMENTS + 1;
    for ring in 0..rings {
        for segment in 0..SEGMENTS {
            let a = ring * stride + segment;
            let b = a + stride;
            mesh.push_quad(a, a + 1, b + 1, b);
        }
    }
    mesh
}

fn sphere(radius: f32) -> TriangleMesh {
    stretched_sphere(radius, 0.0)
}

fn capsule(radius: f32, length: f32) -> TriangleMesh {
    stretched_sphere(radius, length)
}

fn cylinder(radius: f32, height: f32) -> TriangleMesh {
    let mut mesh = TriangleMesh::default();
    let half = height * 0.5;
    let stride = SEGMENTS + 1;
    for y in [half, -half] {
        for segment in 0..=SEGMENTS {
            let angle = segment as f32 / SEGMENTS as f32 * TAU;
            let normal = Vec3::new(angle.cos(), 0.0, angle.sin());
            mesh.push_vertex(normal * radius + Vec3::Y * y, normal);
        }
    }
    for segment in 0..SEGMENTS {
        mesh.push_quad(segment, segment + 1, stride + segment + 1, stride + segment);
    }
    for (y, normal) in [(half, Vec3::Y), (-half, Vec3::NEG_Y)] {
        let centre = mesh.push_vertex(Vec3::Y * y, normal);
        let first = mesh.vertex_count() as u32;
        for segment in 0..=SEGMENTS {
            let angle = segment as f32 / SEGMENTS as f32 * TAU;
            let rim = Vec3::new(angle.cos() * radius, y, angle.sin() * radius);
            mesh.push_vertex(rim, normal);
        }
        for segment in 0..SEGMENTS {
            let (a, b) = (first + segment, first + segment + 1);
            if y > 0.0 {
                mesh.indices.extend_from_slice(&[centre, b, a]);
            } else {
                mesh.indices.extend_from_slice(&[centre, a, b]);
            }
        }
    }
    mesh
}

fn cuboid(half: Vec3) -> TriangleMesh {
    let mut mesh = TriangleMesh::default();
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::Z, Vec3::NEG_X),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::X, Vec3::NEG_Y),
    ];
    for (normal, u, v) in faces {
        let centre = normal * half;
        let u = u * half;
        let v = v * half;
        let a = mesh.push_vertex(centre - u - v, normal);
        let b = mesh.push_vertex(centre + u - v, normal);
        let c = mesh.push_vertex(centre + u + v, normal);
        let d = mesh.push_vertex(centre - u + v, normal);
        mesh.push_quad(a, b, c, d);
    }
    mesh
}

fn plane(width: f32, height: f32) -> TriangleMesh {
    let mut mesh = TriangleMesh::default();
    let (x, y) = (width * 0.5, height * 0.5);
    let a = mesh.push_vertex(Vec3::new(-x, -y, 0.0), Vec3::Z);
    let b = mesh.push_vertex(Vec3::new(x, -y, 0.0), Vec3::Z);
    let c = mesh.push_vertex(Vec3::new(x, y, 0.0), Vec3::Z);
    let d = mesh.push_vertex(Vec3::new(-x, y, 0.0), Vec3::Z);
    mesh.push_quad(a, b, c, d);
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(mesh: &TriangleMesh) {
        assert_eq!(mesh.vertices.len() % 6, 0);
        assert_eq!(mesh.indices.len() % 3, 0);
        let count = mesh.vertex_count() as u32;
        assert!(mesh.indices.iter().all(|&index| index < count));
    }

    #[test]
    fn sphere_vertices_sit_on_the_radius() {
        let mesh = TriangleMesh::for_primitive(Primitive::Sphere { radius: 2.0 });
        assert_well_formed(&mesh);
        for index in 0..mesh.vertex_count() {
            assert!((mesh.position(index).length() - 2.0).abs() < 1e-4);
            assert!((mesh.normal(index).length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn capsule_spans_its_length_plus_caps() {
        let mesh = TriangleMesh::for_primitive(Primitive::Capsule {
            radius: 0.5,
            length: 2.0,
        });
        assert_well_formed(&mesh);
        let top = (0..mesh.vertex_count())
            .map(|i| mesh.position(i).y)
            .fold(f32::MIN, f32::max);
        assert!((top - 1.5).abs() < 1e-4);
    }

    #[test]
    fn box_has_flat_faces() {
        let mesh = TriangleMesh::for_primitive(Primitive::Box {
            width: 2.0,
            height: 4.0,
            depth: 6.0,
        });
        assert_well_formed(&mesh);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.indices.len(), 36);
        let max = (0..24).map(|i| mesh.position(i)).fold(Vec3::ZERO, Vec3::max);
        assert_eq!(max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn cylinder_and_plane_are_well_formed() {
        assert_well_formed(&TriangleMesh::for_primitive(Primitive::Cylinder {
            radius: 1.0,
            height: 2.0,
        }));
        let plane = TriangleMesh::for_primitive(Primitive::Plane {
            width: 10.0,
            height: 10.0,
        });
        assert_well_formed(&plane);
        assert_eq!(plane.indices.len(), 6);
    }
}
