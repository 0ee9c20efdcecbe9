//! Built-in engine: forward kinematics over the compiled body tree plus a
//! damped joint-space integrator.
//!
//! There is no gravity and no contact handling. Each degree of freedom gets a
//! lumped inertia from the mass of the subtree it moves, which is enough for
//! actuators and dragging to produce plausible motion.

use glam::{DQuat, DVec3};
use log::info;

use super::{mjcf, JointType, LoadedScene, Model, PhysicsEngine, Simulation};
use crate::error::ModelError;

const MIN_INERTIA: f64 = 1e-3;
const ROTATIONAL_INERTIA_SCALE: f64 = 0.05;
const BASE_DAMPING: f64 = 1.0;

/// Engine handle that compiles scenes with [`mjcf::compile`].
#[derive(Debug, Default, Clone, Copy)]
pub struct KinematicEngine;

impl KinematicEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PhysicsEngine for KinematicEngine {
    fn load(&mut self, file_name: &str, xml: &str) -> Result<LoadedScene, ModelError> {
        let model = mjcf::compile(xml)?;
        info!(
            "compiled {file_name}: {} bodies, {} dofs, timestep {}",
            model.nbody, model.nv, model.timestep
        );
        let simulation = KinematicSimulation::new(&model);
        Ok(LoadedScene {
            model,
            simulation: Box::new(simulation),
        })
    }
}

#[derive(Debug, Clone)]
pub struct KinematicSimulation {
    model: Model,
    dof_inertia: Vec<f64>,
    time: f64,

    qpos: Vec<f64>,
    qvel: Vec<f64>,
    ctrl: Vec<f64>,
    mocap_pos: Vec<f64>,
    mocap_quat: Vec<f64>,
    qfrc_applied: Vec<f64>,

    xpos: Vec<f64>,
    xquat: Vec<f64>,
    xanchor: Vec<DVec3>,
    xaxis: Vec<DVec3>,
    site_xpos: Vec<f64>,
    light_xpos: Vec<f64>,
    light_xdir: Vec<f64>,
    ten_wrapadr: Vec<usize>,
    ten_wrapnum: Vec<usize>,
    wrap_xpos: Vec<f64>,
}

impl KinematicSimulation {
    pub fn new(model: &Model) -> Self {
        let model = model.clone();
        let dof_inertia = lumped_inertia(&model);
        let mut sim = Self {
            dof_inertia,
            time: 0.0,
            qpos: model.qpos0.clone(),
            qvel: vec![0.0; model.nv],
            ctrl: vec![0.0; model.nu],
            mocap_pos: vec![0.0; model.nmocap * 3],
            mocap_quat: vec![0.0; model.nmocap * 4],
            qfrc_applied: vec![0.0; model.nv],
            xpos: vec![0.0; model.nbody * 3],
            xquat: vec![0.0; model.nbody * 4],
            xanchor: vec![DVec3::ZERO; model.njnt],
            xaxis: vec![DVec3::Z; model.njnt],
            site_xpos: vec![0.0; model.nsite * 3],
            light_xpos: vec![0.0; model.nlight * 3],
            light_xdir: vec![0.0; model.nlight * 3],
            ten_wrapadr: model.tendon_adr.clone(),
            ten_wrapnum: model.tendon_num.clone(),
            wrap_xpos: vec![0.0; model.wrap_site.len() * 3],
            model,
        };
        sim.reset_data();
        sim
    }

    /// Joint velocities, one entry per degree of freedom.
    pub fn qvel(&self) -> &[f64] {
        &self.qvel
    }

    fn body_frame(&self, body: usize) -> (DVec3, DQuat) {
        (vec3_at(&self.xpos, body), quat_at(&self.xquat, body))
    }

    fn joints_of(&self, body: usize) -> std::ops::Range<usize> {
        let start = self.model.body_jntadr[body];
        if start < 0 {
            return 0..0;
        }
        let start = start as usize;
        start..start + self.model.body_jntnum[body]
    }

    fn kinematics(&mut self) {
        for body in 0..self.model.nbody {
            let (mut pos, mut quat) = if body == 0 {
                (DVec3::ZERO, DQuat::IDENTITY)
            } else {
                let (parent_pos, parent_quat) = self.body_frame(self.model.body_parentid[body]);
                let mocap = self.model.body_mocapid[body];
                if mocap >= 0 {
                    let mocap = mocap as usize;
                    (
                        vec3_at(&self.mocap_pos, mocap),
                        quat_at(&self.mocap_quat, mocap),
                    )
                } else {
                    (
                        parent_pos + parent_quat * vec3_at(&self.model.body_pos, body),
                        parent_quat * quat_at(&self.model.body_quat, body),
                    )
                }
            };

            for joint in self.joints_of(body) {
                let adr = self.model.jnt_qposadr[joint];
                let local_anchor = vec3_at(&self.model.jnt_pos, joint);
                let local_axis = vec3_at(&self.model.jnt_axis, joint);
                match self.model.jnt_type[joint] {
                    JointType::Free => {
                        pos = DVec3::from_slice(&self.qpos[adr..adr + 3]);
                        quat = wxyz_quat(&self.qpos[adr + 3..adr + 7]);
                    }
                    JointType::Ball => {
                        let anchor = pos + quat * local_anchor;
                        quat = quat * wxyz_quat(&self.qpos[adr..adr + 4]);
                        pos = anchor - quat * local_anchor;
                    }
                    JointType::Hinge => {
                        let anchor = pos + quat * local_anchor;
                        let angle = self.qpos[adr] - self.model.qpos0[adr];
                        quat = quat * DQuat::from_axis_angle(local_axis, angle);
                        pos = anchor - quat * local_anchor;
                    }
                    JointType::Slide => {
                        let offset = self.qpos[adr] - self.model.qpos0[adr];
                        pos += quat * local_axis * offset;
                    }
                }
                self.xanchor[joint] = pos + quat * local_anchor;
                self.xaxis[joint] = quat * local_axis;
            }

            self.xpos[body * 3..body * 3 + 3].copy_from_slice(&pos.to_array());
            self.xquat[body * 4..body * 4 + 4]
                .copy_from_slice(&[quat.w, quat.x, quat.y, quat.z]);
        }

        for site in 0..self.model.nsite {
            let (pos, quat) = self.body_frame(self.model.site_bodyid[site]);
            let world = pos + quat * vec3_at(&self.model.site_pos, site);
            self.site_xpos[site * 3..site * 3 + 3].copy_from_slice(&world.to_array());
        }

        for light in 0..self.model.nlight {
            let (pos, quat) = self.body_frame(self.model.light_bodyid[light]);
            let world = pos + quat * vec3_at(&self.model.light_pos, light);
            let dir = quat * vec3_at(&self.model.light_dir, light);
            self.light_xpos[light * 3..light * 3 + 3].copy_from_slice(&world.to_array());
            self.light_xdir[light * 3..light * 3 + 3].copy_from_slice(&dir.to_array());
        }

        for (wrap, &site) in self.model.wrap_site.iter().enumerate() {
            let src = &self.site_xpos[site * 3..site * 3 + 3];
            self.wrap_xpos[wrap * 3..wrap * 3 + 3].copy_from_slice(src);
        }
    }

    fn integrate(&mut self, dt: f64) {
        let mut force = self.qfrc_applied.clone();
        for (actuator, &joint) in self.model.actuator_trnid.iter().enumerate() {
            if joint >= 0 {
                let dof = self.model.jnt_dofadr[joint as usize];
                force[dof] += self.model.actuator_gear[actuator] * self.ctrl[actuator];
            }
        }

        for joint in 0..self.model.njnt {
            let dof = self.model.jnt_dofadr[joint];
            let count = self.model.jnt_type[joint].nv();
            for d in dof..dof + count {
                let inertia = self.dof_inertia[d];
                let damping = self.model.jnt_damping[joint] + BASE_DAMPING * inertia;
                // Semi-implicit in the damping term.
                self.qvel[d] = (self.qvel[d] * inertia + dt * force[d]) / (inertia + dt * damping);
            }
        }

        for joint in 0..self.model.njnt {
            let adr = self.model.jnt_qposadr[joint];
            let dof = self.model.jnt_dofadr[joint];
            match self.model.jnt_type[joint] {
                JointType::Hinge | JointType::Slide => self.qpos[adr] += self.qvel[dof] * dt,
                JointType::Ball => {
                    let omega = DVec3::from_slice(&self.qvel[dof..dof + 3]);
                    let quat = wxyz_quat(&self.qpos[adr..adr + 4]);
                    let next = (quat * DQuat::from_scaled_axis(omega * dt)).normalize();
                    self.qpos[adr..adr + 4].copy_from_slice(&[next.w, next.x, next.y, next.z]);
                }
                JointType::Free => {
                    for axis in 0..3 {
                        self.qpos[adr + axis] += self.qvel[dof + axis] * dt;
                    }
                    let omega = DVec3::from_slice(&self.qvel[dof + 3..dof + 6]);
                    let quat = wxyz_quat(&self.qpos[adr + 3..adr + 7]);
                    let next = (quat * DQuat::from_scaled_axis(omega * dt)).normalize();
                    self.qpos[adr + 3..adr + 7]
                        .copy_from_slice(&[next.w, next.x, next.y, next.z]);
                }
            }
        }
    }
}

impl Simulation for KinematicSimulation {
    fn step(&mut self) {
        let dt = self.model.timestep;
        self.integrate(dt);
        self.time += dt;
        self.kinematics();
    }

    fn forward(&mut self) {
        self.kinematics();
    }

    fn reset_data(&mut self) {
        self.time = 0.0;
        self.qpos.copy_from_slice(&self.model.qpos0);
        self.qvel.fill(0.0);
        self.ctrl.fill(0.0);
        self.qfrc_applied.fill(0.0);
        for body in 0..self.model.nbody {
            let mocap = self.model.body_mocapid[body];
            if mocap >= 0 {
                let mocap = mocap as usize;
                self.mocap_pos[mocap * 3..mocap * 3 + 3]
                    .copy_from_slice(&self.model.body_pos[body * 3..body * 3 + 3]);
                self.mocap_quat[mocap * 4..mocap * 4 + 4]
                    .copy_from_slice(&self.model.body_quat[body * 4..body * 4 + 4]);
            }
        }
        self.kinematics();
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn apply_force(&mut self, force: DVec3, torque: DVec3, point: DVec3, body: usize) {
        let mut current = body;
        while current != 0 {
            let (_, quat) = self.body_frame(current);
            for joint in self.joints_of(current) {
                let dof = self.model.jnt_dofadr[joint];
                let moment = torque + (point - self.xanchor[joint]).cross(force);
                match self.model.jnt_type[joint] {
                    JointType::Hinge => self.qfrc_applied[dof] += self.xaxis[joint].dot(moment),
                    JointType::Slide => self.qfrc_applied[dof] += self.xaxis[joint].dot(force),
                    JointType::Ball => {
                        let local = quat.inverse() * moment;
                        add3(&mut self.qfrc_applied[dof..dof + 3], local);
                    }
                    JointType::Free => {
                        add3(&mut self.qfrc_applied[dof..dof + 3], force);
                        let local = quat.inverse() * moment;
                        add3(&mut self.qfrc_applied[dof + 3..dof + 6], local);
                    }
                }
            }
            current = self.model.body_parentid[current];
        }
    }

    fn xpos(&self) -> &[f64] {
        &self.xpos
    }

    fn xquat(&self) -> &[f64] {
        &self.xquat
    }

    fn light_xpos(&self) -> &[f64] {
        &self.light_xpos
    }

    fn light_xdir(&self) -> &[f64] {
        &self.light_xdir
    }

    fn ten_wrapadr(&self) -> &[usize] {
        &self.ten_wrapadr
    }

    fn ten_wrapnum(&self) -> &[usize] {
        &self.ten_wrapnum
    }

    fn wrap_xpos(&self) -> &[f64] {
        &self.wrap_xpos
    }

    fn qpos(&self) -> &[f64] {
        &self.qpos
    }

    fn qpos_mut(&mut self) -> &mut [f64] {
        &mut self.qpos
    }

    fn ctrl(&self) -> &[f64] {
        &self.ctrl
    }

    fn ctrl_mut(&mut self) -> &mut [f64] {
        &mut self.ctrl
    }

    fn mocap_pos(&self) -> &[f64] {
        &self.mocap_pos
    }

    fn mocap_pos_mut(&mut self) -> &mut [f64] {
        &mut self.mocap_pos
    }

    fn qfrc_applied(&self) -> &[f64] {
        &self.qfrc_applied
    }

    fn qfrc_applied_mut(&mut self) -> &mut [f64] {
        &mut self.qfrc_applied
    }
}

fn lumped_inertia(model: &Model) -> Vec<f64> {
    let mut subtree = model.body_mass.clone();
    for body in (1..model.nbody).rev() {
        let parent = model.body_parentid[body];
        subtree[parent] += subtree[body];
    }
    let mut inertia = vec![MIN_INERTIA; model.nv];
    for joint in 0..model.njnt {
        let mass = subtree[model.jnt_bodyid[joint]].max(MIN_INERTIA);
        let dof = model.jnt_dofadr[joint];
        let rotational = mass * ROTATIONAL_INERTIA_SCALE;
        match model.jnt_type[joint] {
            JointType::Slide => inertia[dof] = mass,
            JointType::Hinge => inertia[dof] = rotational.max(MIN_INERTIA),
            JointType::Ball => inertia[dof..dof + 3].fill(rotational.max(MIN_INERTIA)),
            JointType::Free => {
                inertia[dof..dof + 3].fill(mass);
                inertia[dof + 3..dof + 6].fill(rotational.max(MIN_INERTIA));
            }
        }
    }
    inertia
}

fn vec3_at(buffer: &[f64], index: usize) -> DVec3 {
    DVec3::from_slice(&buffer[index * 3..index * 3 + 3])
}

fn quat_at(buffer: &[f64], index: usize) -> DQuat {
    wxyz_quat(&buffer[index * 4..index * 4 + 4])
}

fn wxyz_quat(values: &[f64]) -> DQuat {
    let quat = DQuat::from_xyzw(values[1], values[2], values[3], values[0]);
    if quat.length_squared() > 0.0 {
        quat.normalize()
    } else {
        DQuat::IDENTITY
    }
}

fn add3(target: &mut [f64], value: DVec3) {
    target[0] += value.x;
    target[1] += value.y;
    target[2] += value.z;
}

#[cfg(test)]
mod tests {
    use super::*;

    const PENDULUM: &str = r#"
    <mujoco model="pendulum">
      <compiler angle="radian"/>
      <worldbody>
        <light pos="0 0 2" dir="0 0 -1"/>
        <site name="anchor" pos="0 0 1"/>
        <body name="arm" pos="0 0 1">
          <joint name="hinge" type="hinge" axis="0 1 0"/>
          <geom type="capsule" fromto="0 0 0 1 0 0" size="0.05" mass="1"/>
          <site name="tip" pos="1 0 0"/>
        </body>
        <body name="puck" pos="0 2 0" >
          <freejoint/>
          <geom type="sphere" size="0.1" mass="2"/>
        </body>
        <body name="target" mocap="true" pos="3 0 0"/>
      </worldbody>
      <tendon>
        <spatial><site site="anchor"/><site site="tip"/></spatial>
      </tendon>
      <actuator><motor joint="hinge" gear="2"/></actuator>
    </mujoco>
    "#;

    fn load() -> LoadedScene {
        KinematicEngine::new().load("pendulum.xml", PENDULUM).unwrap()
    }

    #[test]
    fn forward_places_bodies_sites_and_lights() {
        let scene = load();
        let sim = &scene.simulation;
        assert_eq!(&sim.xpos()[3..6], &[0.0, 0.0, 1.0]);
        assert_eq!(&sim.xpos()[6..9], &[0.0, 2.0, 0.0]);
        assert_eq!(&sim.xpos()[9..12], &[3.0, 0.0, 0.0]);
        assert_eq!(&sim.light_xpos()[..3], &[0.0, 0.0, 2.0]);
        assert_eq!(sim.ten_wrapnum(), &[2]);
        assert_eq!(&sim.wrap_xpos()[3..6], &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn hinge_angle_rotates_child_frame() {
        let mut scene = load();
        let sim = &mut scene.simulation;
        sim.qpos_mut()[0] = std::f64::consts::FRAC_PI_2;
        sim.forward();
        // Rotating +90 degrees about Y takes the tip from +X to -Z.
        let tip = &sim.wrap_xpos()[3..6];
        assert!((tip[0] - 0.0).abs() < 1e-9);
        assert!((tip[2] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn mocap_bodies_follow_mocap_pos() {
        let mut scene = load();
        let sim = &mut scene.simulation;
        sim.mocap_pos_mut()[0] = 4.0;
        sim.forward();
        assert_eq!(sim.xpos()[9], 4.0);
    }

    #[test]
    fn applied_force_pushes_free_body() {
        let mut scene = load();
        let sim = &mut scene.simulation;
        for _ in 0..50 {
            sim.qfrc_applied_mut().fill(0.0);
            sim.apply_force(DVec3::X * 10.0, DVec3::ZERO, DVec3::new(0.0, 2.0, 0.0), 2);
            sim.step();
        }
        assert!(sim.xpos()[6] > 0.0);
        assert!(sim.time() > 0.09);
    }

    #[test]
    fn motor_drives_hinge_and_reset_restores() {
        let mut scene = load();
        let sim = &mut scene.simulation;
        sim.ctrl_mut()[0] = 1.0;
        for _ in 0..20 {
            sim.step();
        }
        assert!(sim.qpos()[0] > 0.0);
        sim.reset_data();
        assert_eq!(sim.qpos()[0], 0.0);
        assert_eq!(sim.time(), 0.0);
        assert_eq!(sim.ctrl()[0], 0.0);
    }

    #[test]
    fn force_on_hinged_body_produces_joint_torque() {
        let mut scene = load();
        let sim = &mut scene.simulation;
        // Pushing the tip down (-Z) rotates positively about +Y.
        sim.apply_force(DVec3::NEG_Z, DVec3::ZERO, DVec3::new(1.0, 0.0, 1.0), 1);
        assert!((sim.qfrc_applied()[0] - 1.0).abs() < 1e-9);
    }
}
