//! Seam between the viewer and the physics engine.
//!
//! The viewer never owns simulation logic. It talks to an engine through
//! [`PhysicsEngine`], reads the immutable [`Model`] tables once per scene and
//! reads/writes the [`Simulation`] buffers every frame. Buffers are flat and
//! indexed by element id exactly as the engine lays them out; the viewer does
//! not validate indices.

pub mod kinematic;
pub mod mjcf;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub use kinematic::{KinematicEngine, KinematicSimulation};

/// Geometry type codes, numbered as the engine numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum GeomType {
    Plane = 0,
    HeightField = 1,
    Sphere = 2,
    Capsule = 3,
    Ellipsoid = 4,
    Cylinder = 5,
    Box = 6,
    Mesh = 7,
    Sdf = 8,
}

impl GeomType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "plane" => Self::Plane,
            "hfield" => Self::HeightField,
            "sphere" => Self::Sphere,
            "capsule" => Self::Capsule,
            "ellipsoid" => Self::Ellipsoid,
            "cylinder" => Self::Cylinder,
            "box" => Self::Box,
            "mesh" => Self::Mesh,
            "sdf" => Self::Sdf,
            _ => return None,
        })
    }
}

/// Joint type codes, numbered as the engine numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum JointType {
    Free = 0,
    Ball = 1,
    Slide = 2,
    Hinge = 3,
}

impl JointType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "free" => Self::Free,
            "ball" => Self::Ball,
            "slide" => Self::Slide,
            "hinge" => Self::Hinge,
            _ => return None,
        })
    }

    /// Number of `qpos` entries used by the joint.
    pub fn nq(self) -> usize {
        match self {
            Self::Free => 7,
            Self::Ball => 4,
            Self::Slide | Self::Hinge => 1,
        }
    }

    /// Number of degrees of freedom (`qvel` entries) of the joint.
    pub fn nv(self) -> usize {
        match self {
            Self::Free => 6,
            Self::Ball => 3,
            Self::Slide | Self::Hinge => 1,
        }
    }
}

/// Static description of a loaded scene.
///
/// Per-element attributes are stored as flat buffers with a fixed stride
/// (`geom_size` holds three values per geom, `geom_rgba` four, and so on).
/// Quaternions are stored `w, x, y, z`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub nbody: usize,
    pub njnt: usize,
    pub ngeom: usize,
    pub nsite: usize,
    pub nlight: usize,
    pub nmat: usize,
    pub ntendon: usize,
    pub nu: usize,
    pub nkey: usize,
    pub nmocap: usize,
    pub nq: usize,
    pub nv: usize,

    pub timestep: f64,

    /// NUL separated names; the model name comes first.
    pub names: Vec<u8>,
    pub name_bodyadr: Vec<usize>,

    pub body_parentid: Vec<usize>,
    pub body_rootid: Vec<usize>,
    pub body_jntadr: Vec<i32>,
    pub body_jntnum: Vec<usize>,
    pub body_mocapid: Vec<i32>,
    pub body_mass: Vec<f64>,
    pub body_pos: Vec<f64>,
    pub body_quat: Vec<f64>,

    pub jnt_type: Vec<JointType>,
    pub jnt_bodyid: Vec<usize>,
    pub jnt_qposadr: Vec<usize>,
    pub jnt_dofadr: Vec<usize>,
    pub jnt_pos: Vec<f64>,
    pub jnt_axis: Vec<f64>,
    pub jnt_damping: Vec<f64>,

    pub geom_type: Vec<GeomType>,
    pub geom_group: Vec<i32>,
    pub geom_bodyid: Vec<usize>,
    pub geom_matid: Vec<i32>,
    pub geom_size: Vec<f64>,
    pub geom_pos: Vec<f64>,
    pub geom_quat: Vec<f64>,
    pub geom_rgba: Vec<f32>,

    pub site_bodyid: Vec<usize>,
    pub site_pos: Vec<f64>,

    pub mat_rgba: Vec<f32>,

    pub light_bodyid: Vec<usize>,
    pub light_directional: Vec<bool>,
    pub light_attenuation: Vec<f64>,
    pub light_pos: Vec<f64>,
    pub light_dir: Vec<f64>,

    pub tendon_width: Vec<f64>,
    pub tendon_adr: Vec<usize>,
    pub tendon_num: Vec<usize>,
    /// Site ids along each tendon path, addressed by `tendon_adr`/`tendon_num`.
    pub wrap_site: Vec<usize>,

    /// Joint driven by each actuator, -1 for other transmissions.
    pub actuator_trnid: Vec<i32>,
    pub actuator_gear: Vec<f64>,

    pub qpos0: Vec<f64>,
    pub key_qpos: Vec<f64>,
}

impl Model {
    /// Decodes the NUL terminated name starting at `adr` in the names buffer.
    pub fn name_at(&self, adr: usize) -> String {
        let start = adr.min(self.names.len());
        let end = self.names[start..]
            .iter()
            .position(|&byte| byte == 0)
            .map_or(self.names.len(), |offset| start + offset);
        String::from_utf8_lossy(&self.names[start..end]).into_owned()
    }

    /// Name of body `body`, empty for unnamed bodies.
    pub fn body_name(&self, body: usize) -> String {
        self.name_at(self.name_bodyadr[body])
    }

    /// Size triple of geom `geom`.
    pub fn geom_size_at(&self, geom: usize) -> [f64; 3] {
        let base = geom * 3;
        [
            self.geom_size[base],
            self.geom_size[base + 1],
            self.geom_size[base + 2],
        ]
    }

    /// Effective color of geom `geom`: the material color when one is
    /// assigned, otherwise the geom's own color.
    pub fn geom_color(&self, geom: usize) -> [f32; 4] {
        let (table, index) = match self.geom_matid[geom] {
            id if id >= 0 => (&self.mat_rgba, id as usize),
            _ => (&self.geom_rgba, geom),
        };
        let base = index * 4;
        [table[base], table[base + 1], table[base + 2], table[base + 3]]
    }

    /// `qpos` address of the first joint of `body`'s kinematic root.
    pub fn root_qposadr(&self, body: usize) -> Option<usize> {
        let root = self.body_rootid[body];
        let joint = self.body_jntadr[root];
        (joint >= 0).then(|| self.jnt_qposadr[joint as usize])
    }

    /// Checks that every table matches its declared element count.
    pub fn validate(&self) -> Result<(), ModelError> {
        let checks: [(&'static str, usize, usize); 24] = [
            ("name_bodyadr", self.nbody, self.name_bodyadr.len()),
            ("body_parentid", self.nbody, self.body_parentid.len()),
            ("body_rootid", self.nbody, self.body_rootid.len()),
            ("body_jntadr", self.nbody, self.body_jntadr.len()),
            ("body_mocapid", self.nbody, self.body_mocapid.len()),
            ("body_mass", self.nbody, self.body_mass.len()),
            ("body_pos", self.nbody * 3, self.body_pos.len()),
            ("body_quat", self.nbody * 4, self.body_quat.len()),
            ("jnt_type", self.njnt, self.jnt_type.len()),
            ("jnt_qposadr", self.njnt, self.jnt_qposadr.len()),
            ("geom_type", self.ngeom, self.geom_type.len()),
            ("geom_group", self.ngeom, self.geom_group.len()),
            ("geom_bodyid", self.ngeom, self.geom_bodyid.len()),
            ("geom_matid", self.ngeom, self.geom_matid.len()),
            ("geom_size", self.ngeom * 3, self.geom_size.len()),
            ("geom_pos", self.ngeom * 3, self.geom_pos.len()),
            ("geom_quat", self.ngeom * 4, self.geom_quat.len()),
            ("geom_rgba", self.ngeom * 4, self.geom_rgba.len()),
            ("mat_rgba", self.nmat * 4, self.mat_rgba.len()),
            ("light_directional", self.nlight, self.light_directional.len()),
            ("light_attenuation", self.nlight * 3, self.light_attenuation.len()),
            ("tendon_width", self.ntendon, self.tendon_width.len()),
            ("qpos0", self.nq, self.qpos0.len()),
            ("key_qpos", self.nkey * self.nq, self.key_qpos.len()),
        ];
        for (table, expected, actual) in checks {
            if expected != actual {
                return Err(ModelError::TableSize {
                    table,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Mutable simulation state owned by the engine.
///
/// Dropping the value releases the engine-side resources.
pub trait Simulation {
    /// Advances the simulation by one model timestep.
    fn step(&mut self);
    /// Recomputes derived quantities (poses, wrap points) without advancing time.
    fn forward(&mut self);
    /// Restores the initial state.
    fn reset_data(&mut self);
    /// Simulation time in seconds.
    fn time(&self) -> f64;
    /// Adds a force and torque acting at world `point` on `body` to `qfrc_applied`.
    fn apply_force(&mut self, force: DVec3, torque: DVec3, point: DVec3, body: usize);

    fn xpos(&self) -> &[f64];
    fn xquat(&self) -> &[f64];
    fn light_xpos(&self) -> &[f64];
    fn light_xdir(&self) -> &[f64];
    fn ten_wrapadr(&self) -> &[usize];
    fn ten_wrapnum(&self) -> &[usize];
    fn wrap_xpos(&self) -> &[f64];

    fn qpos(&self) -> &[f64];
    fn qpos_mut(&mut self) -> &mut [f64];
    fn ctrl(&self) -> &[f64];
    fn ctrl_mut(&mut self) -> &mut [f64];
    fn mocap_pos(&self) -> &[f64];
    fn mocap_pos_mut(&mut self) -> &mut [f64];
    fn qfrc_applied(&self) -> &[f64];
    fn qfrc_applied_mut(&mut self) -> &mut [f64];
}

/// A compiled scene: its static model and a fresh simulation for it.
pub struct LoadedScene {
    pub model: Model,
    pub simulation: Box<dyn Simulation>,
}

impl std::fmt::Debug for LoadedScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedScene")
            .field("nbody", &self.model.nbody)
            .field("time", &self.simulation.time())
            .finish()
    }
}

/// Handle to a physics engine able to compile MJCF scenes.
///
/// The viewer receives the handle from its caller and passes it explicitly;
/// there is no process-wide engine instance.
pub trait PhysicsEngine {
    fn load(&mut self, file_name: &str, xml: &str) -> Result<LoadedScene, ModelError>;
}

impl<E: PhysicsEngine + ?Sized> PhysicsEngine for Box<E> {
    fn load(&mut self, file_name: &str, xml: &str) -> Result<LoadedScene, ModelError> {
        (**self).load(file_name, xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_model() -> Model {
        Model {
            nbody: 2,
            names: b"demo\0world\0arm\0".to_vec(),
            name_bodyadr: vec![5, 11],
            ..Model::default()
        }
    }

    #[test]
    fn body_names_stop_at_terminator() {
        let model = named_model();
        assert_eq!(model.body_name(0), "world");
        assert_eq!(model.body_name(1), "arm");
        assert_eq!(model.name_at(0), "demo");
    }

    #[test]
    fn name_without_terminator_runs_to_end() {
        let model = Model {
            names: b"tail".to_vec(),
            ..Model::default()
        };
        assert_eq!(model.name_at(0), "tail");
        assert_eq!(model.name_at(10), "");
    }

    #[test]
    fn material_color_wins_over_geom_color() {
        let model = Model {
            ngeom: 2,
            nmat: 1,
            geom_matid: vec![-1, 0],
            geom_rgba: vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
            mat_rgba: vec![0.0, 0.0, 1.0, 0.5],
            ..Model::default()
        };
        assert_eq!(model.geom_color(0), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(model.geom_color(1), [0.0, 0.0, 1.0, 0.5]);
    }

    #[test]
    fn validate_reports_short_tables() {
        let model = Model {
            nbody: 1,
            name_bodyadr: vec![0],
            ..Model::default()
        };
        let err = model.validate().unwrap_err();
        assert!(matches!(
            err,
            ModelError::TableSize {
                table: "body_parentid",
                ..
            }
        ));
    }
}
