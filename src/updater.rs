//! Per-frame transfer of simulation state into the scene graph.

use glam::{Mat4, Quat, Vec3};
use rand::Rng;

use crate::builder::{MujocoScene, TENDON_POOL_CAPACITY};
use crate::physics::{Model, Simulation};
use crate::remap;
use crate::scene_graph::SceneGraph;

/// Largest gap, in milliseconds, the simulation clock may trail the wall
/// clock before it jumps forward instead of catching up step by step.
pub const MAX_CATCH_UP_MS: f64 = 35.0;

/// Wrap points closer than this to the origin are treated as unset.
const MIN_WRAP_DISTANCE: f32 = 0.01;

/// Ornstein-Uhlenbeck style jitter applied to actuator controls.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlNoise {
    /// Correlation time in seconds.
    pub rate: f64,
    /// Stationary standard deviation.
    pub std: f64,
}

impl ControlNoise {
    pub fn is_active(&self) -> bool {
        self.std > 0.0
    }

    /// Jitters `ctrl` for one step of `timestep` seconds and mirrors the
    /// result into `values`.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        timestep: f64,
        ctrl: &mut [f64],
        values: &mut [f64],
        rng: &mut R,
    ) {
        let rate = (-timestep / self.rate.max(1e-10)).exp();
        let scale = self.std * (1.0 - rate * rate).sqrt();
        for (index, control) in ctrl.iter_mut().enumerate() {
            *control = rate * *control + scale * standard_normal(rng);
            if let Some(value) = values.get_mut(index) {
                *value = *control;
            }
        }
    }
}

/// Box-Muller sample from the standard normal distribution.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // `gen` is in [0, 1); flip it so the logarithm never sees zero.
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Copies body poses into their groups and refreshes world matrices.
///
/// Body groups nest by parent id, so each pose is written relative to the
/// parent body's world pose.
pub fn sync_bodies(
    graph: &mut SceneGraph,
    scene: &MujocoScene,
    model: &Model,
    simulation: &dyn Simulation,
) {
    let xpos = simulation.xpos();
    let xquat = simulation.xquat();
    for (body, &node) in scene.bodies.iter().enumerate().take(model.nbody) {
        let position = remap::position(xpos, body);
        let rotation = remap::quaternion(xquat, body);
        let (position, rotation) = if body == 0 {
            (position, rotation)
        } else {
            let parent = model.body_parentid[body];
            let parent_position = remap::position(xpos, parent);
            let parent_inverse = remap::quaternion(xquat, parent).inverse();
            (
                parent_inverse * (position - parent_position),
                (parent_inverse * rotation).normalize(),
            )
        };
        if let Some(group) = graph.get_mut(node) {
            group.position = position;
            group.rotation = rotation;
        }
    }
    graph.update_world_matrix(scene.root);
}

/// Places each light and aims it along its direction.
///
/// Expects body world matrices to be current.
pub fn sync_lights(
    graph: &mut SceneGraph,
    scene: &MujocoScene,
    model: &Model,
    simulation: &dyn Simulation,
) {
    for (light, &node) in scene.lights.iter().enumerate().take(model.nlight) {
        let world = remap::position(simulation.light_xpos(), light);
        let direction = remap::position(simulation.light_xdir(), light);
        let Some(parent) = graph.get(node).and_then(|n| n.parent()) else {
            continue;
        };
        let local = graph.world_to_local(parent, world).unwrap_or(world);
        if let Some(entry) = graph.get_mut(node) {
            entry.position = local;
            if let Some(light) = entry.as_light_mut() {
                light.target = world + direction;
            }
        }
        graph.update_world_matrix(node);
    }
}

/// Writes tendon segments into the instanced pools and returns the number of
/// segments drawn.
pub fn sync_tendons(
    graph: &mut SceneGraph,
    scene: &MujocoScene,
    model: &Model,
    simulation: &dyn Simulation,
) -> usize {
    let wrap_xpos = simulation.wrap_xpos();
    let mut spheres = Vec::new();
    let mut cylinders = Vec::new();
    let mut segments = 0;

    for tendon in 0..model.ntendon {
        let start = simulation.ten_wrapadr()[tendon];
        let count = simulation.ten_wrapnum()[tendon];
        let radius = model.tendon_width[tendon] as f32;
        for wrap in start..(start + count).saturating_sub(1) {
            let from = remap::position(wrap_xpos, wrap);
            let to = remap::position(wrap_xpos, wrap + 1);
            let valid_from = from.length() > MIN_WRAP_DISTANCE;
            let valid_to = to.length() > MIN_WRAP_DISTANCE;

            if valid_from {
                spheres.push((segments, sphere_matrix(from, radius)));
            }
            if valid_to {
                spheres.push((segments + 1, sphere_matrix(to, radius)));
            }
            if valid_from && valid_to {
                cylinders.push((segments, segment_matrix(from, to, radius)));
                segments += 1;
            }
        }
    }

    if let Some(pool) = graph.get_mut(scene.cylinders).and_then(|n| n.as_instanced_mut()) {
        for (index, matrix) in cylinders {
            pool.set_matrix_at(index, matrix);
        }
        pool.set_count(segments);
        pool.needs_update = true;
    }
    if let Some(pool) = graph.get_mut(scene.spheres).and_then(|n| n.as_instanced_mut()) {
        for (index, matrix) in spheres {
            pool.set_matrix_at(index, matrix);
        }
        pool.set_count(if segments > 0 { segments + 1 } else { 0 });
        pool.needs_update = true;
    }
    segments.min(TENDON_POOL_CAPACITY)
}

fn sphere_matrix(centre: Vec3, radius: f32) -> Mat4 {
    Mat4::from_scale_rotation_translation(Vec3::splat(radius), Quat::IDENTITY, centre)
}

/// Unit cylinder along Y stretched between `from` and `to`.
fn segment_matrix(from: Vec3, to: Vec3, radius: f32) -> Mat4 {
    let rotation = (to - from)
        .try_normalize()
        .map_or(Quat::IDENTITY, |dir| Quat::from_rotation_arc(Vec3::Y, dir));
    Mat4::from_scale_rotation_translation(
        Vec3::new(radius, from.distance(to), radius),
        rotation,
        (from + to) * 0.5,
    )
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::builder::{build_scene, TENDON_POOL_CAPACITY};
    use crate::physics::{KinematicEngine, PhysicsEngine};

    const CHAIN: &str = r#"
    <mujoco>
      <compiler angle="radian"/>
      <worldbody>
        <light pos="0 0 3" dir="0 0 -1"/>
        <site name="a" pos="0 0 1"/>
        <body name="upper" pos="0 0 1">
          <joint type="hinge" axis="0 1 0"/>
          <geom type="capsule" fromto="0 0 0 1 0 0" size="0.05"/>
          <site name="b" pos="1 0 0"/>
          <body name="lower" pos="1 0 0">
            <geom type="sphere" size="0.1"/>
            <site name="c" pos="0 0 -1"/>
          </body>
        </body>
      </worldbody>
      <tendon>
        <spatial width="0.02">
          <site site="a"/><site site="b"/><site site="c"/>
        </spatial>
      </tendon>
    </mujoco>
    "#;

    #[test]
    fn noise_decays_towards_zero_without_variance() {
        let noise = ControlNoise { rate: 0.1, std: 0.0 };
        assert!(!noise.is_active());
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctrl = [1.0, -2.0];
        let mut values = [0.0; 2];
        noise.apply(0.1, &mut ctrl, &mut values, &mut rng);
        let rate = (-1.0f64).exp();
        assert!((ctrl[0] - rate).abs() < 1e-12);
        assert_eq!(values, ctrl);
    }

    #[test]
    fn standard_normal_has_unit_spread() {
        let mut rng = StdRng::seed_from_u64(42);
        let samples: Vec<f64> = (0..20_000).map(|_| standard_normal(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05);
        assert!((var - 1.0).abs() < 0.05);
        assert!(samples.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn bodies_follow_rotated_joints_in_world_space() {
        let mut loaded = KinematicEngine::new().load("chain.xml", CHAIN).unwrap();
        let mut graph = SceneGraph::new();
        let scene = build_scene(&mut graph, &loaded.model);
        graph.attach(graph.root(), scene.root);

        loaded.simulation.qpos_mut()[0] = std::f64::consts::FRAC_PI_2;
        loaded.simulation.forward();
        sync_bodies(&mut graph, &scene, &loaded.model, loaded.simulation.as_ref());

        // Engine (0, 0, 0) for `lower` is renderer (0, 0, 0).
        let lower = graph.world_position(scene.bodies[2]).unwrap();
        assert!(lower.length() < 1e-5);
        let upper = graph.world_position(scene.bodies[1]).unwrap();
        assert!((upper - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn lights_are_placed_and_aimed() {
        let loaded = KinematicEngine::new().load("chain.xml", CHAIN).unwrap();
        let mut graph = SceneGraph::new();
        let scene = build_scene(&mut graph, &loaded.model);
        sync_bodies(&mut graph, &scene, &loaded.model, loaded.simulation.as_ref());
        sync_lights(&mut graph, &scene, &loaded.model, loaded.simulation.as_ref());
        let node = graph.get_mut(scene.lights[0]).unwrap();
        assert!((node.position - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-6);
        let light = node.as_light_mut().unwrap();
        assert!((light.target - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn tendon_segments_fill_the_pools() {
        let loaded = KinematicEngine::new().load("chain.xml", CHAIN).unwrap();
        let mut graph = SceneGraph::new();
        let scene = build_scene(&mut graph, &loaded.model);
        let segments = sync_tendons(&mut graph, &scene, &loaded.model, loaded.simulation.as_ref());
        assert_eq!(segments, 2);

        let cylinders = graph.get_mut(scene.cylinders).unwrap().as_instanced_mut().unwrap();
        assert_eq!(cylinders.count(), 2);
        let first = cylinders.matrix_at(0).unwrap();
        let (scale, _, translation) = first.to_scale_rotation_translation();
        assert!((scale.y - 1.0).abs() < 1e-5);
        assert!((scale.x - 0.02).abs() < 1e-6);
        assert!((translation - Vec3::new(0.5, 1.0, 0.0)).length() < 1e-5);

        let spheres = graph.get_mut(scene.spheres).unwrap().as_instanced_mut().unwrap();
        assert_eq!(spheres.count(), 3);
        assert!(spheres.count() <= TENDON_POOL_CAPACITY);
    }

    /// One spatial tendon threaded through `sites` sites in a ring.
    fn long_tendon(sites: usize) -> String {
        let mut xml = String::from("<mujoco><worldbody>");
        for i in 0..sites {
            let angle = i as f64 * 0.01;
            xml += &format!(
                r#"<site name="s{i}" pos="{:.4} {:.4} 1"/>"#,
                2.0 * angle.cos(),
                2.0 * angle.sin()
            );
        }
        xml += r#"</worldbody><tendon><spatial width="0.01">"#;
        for i in 0..sites {
            xml += &format!(r#"<site site="s{i}"/>"#);
        }
        xml += "</spatial></tendon></mujoco>";
        xml
    }

    #[test]
    fn oversized_tendons_are_clamped_to_the_pools() {
        let loaded = KinematicEngine::new()
            .load("long.xml", &long_tendon(1200))
            .unwrap();
        assert_eq!(loaded.simulation.ten_wrapnum()[0], 1200);
        let mut graph = SceneGraph::new();
        let scene = build_scene(&mut graph, &loaded.model);
        let segments = sync_tendons(&mut graph, &scene, &loaded.model, loaded.simulation.as_ref());
        assert_eq!(segments, TENDON_POOL_CAPACITY);

        let cylinders = graph.get_mut(scene.cylinders).unwrap().as_instanced_mut().unwrap();
        assert_eq!(cylinders.count(), TENDON_POOL_CAPACITY);
        let spheres = graph.get_mut(scene.spheres).unwrap().as_instanced_mut().unwrap();
        assert_eq!(spheres.count(), TENDON_POOL_CAPACITY);
    }
}
