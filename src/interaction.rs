//! Pointer dragging of simulated bodies.
//!
//! A drag grabs the first body-owned mesh under the pointer and keeps a
//! virtual handle at a fixed distance along the pointer ray. While the
//! simulation runs, the handle pulls the body with a spring force; while it
//! is paused, the body is teleported a fraction of the way each frame.

use glam::{DVec3, Vec3};
use log::debug;

use crate::builder::MujocoScene;
use crate::physics::{Model, Simulation};
use crate::raycast::{self, Ray};
use crate::remap;
use crate::scene_graph::{NodeId, SceneGraph};

/// Spring gain of the drag force, per unit body mass.
pub const DRAG_STIFFNESS: f64 = 250.0;
/// Fraction of the handle offset applied per paused frame.
pub const PAUSED_DRAG_GAIN: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub body: usize,
    /// Mesh that was hit.
    pub node: NodeId,
    /// Hit point in the mesh's local frame.
    pub local_hit: Vec3,
    /// Hit point carried along with the mesh, in world space.
    pub world_hit: Vec3,
    /// Pointer handle in world space.
    pub current_world: Vec3,
    pub grab_distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
}

#[derive(Debug, Clone, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn session(&self) -> Option<&DragSession> {
        match &self.state {
            DragState::Dragging(session) => Some(session),
            DragState::Idle => None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.session().is_some()
    }

    /// Starts a drag when the nearest mesh along `ray` belongs to a
    /// non-world body. Returns whether a drag started.
    pub fn pointer_down(&mut self, graph: &SceneGraph, scene: &MujocoScene, ray: &Ray) -> bool {
        let hits = raycast::intersect(graph, scene.root, ray);
        let Some(hit) = hits.first() else {
            debug!("pointer down hit nothing");
            return false;
        };
        let Some(body) = scene.body_of(hit.node).filter(|&body| body > 0) else {
            debug!("pointer down hit static geometry");
            return false;
        };
        let Some(local_hit) = graph.world_to_local(hit.node, hit.point) else {
            return false;
        };

        debug!("grabbed body {body} at {:?}", hit.point);
        self.state = DragState::Dragging(DragSession {
            body,
            node: hit.node,
            local_hit,
            world_hit: hit.point,
            current_world: hit.point,
            grab_distance: hit.distance,
        });
        true
    }

    /// Moves the handle along the new pointer ray.
    pub fn pointer_move(&mut self, ray: &Ray) {
        if let DragState::Dragging(session) = &mut self.state {
            session.current_world = ray.at(session.grab_distance);
        }
    }

    pub fn pointer_up(&mut self) {
        if self.is_dragging() {
            debug!("drag released");
        }
        self.state = DragState::Idle;
    }

    /// Re-derives the world hit point from the grabbed mesh's current pose.
    ///
    /// Ends the drag if the mesh no longer exists.
    pub fn refresh(&mut self, graph: &SceneGraph) {
        if let DragState::Dragging(session) = &mut self.state {
            match graph.local_to_world(session.node, session.local_hit) {
                Some(world) => session.world_hit = world,
                None => self.state = DragState::Idle,
            }
        }
    }

    /// Adds the spring force pulling the grabbed body towards the handle.
    pub fn apply_force(&self, model: &Model, simulation: &mut dyn Simulation) {
        let Some(session) = self.session() else {
            return;
        };
        let stretch = remap::to_physics_position(session.current_world - session.world_hit);
        let force = stretch * model.body_mass[session.body] * DRAG_STIFFNESS;
        let point = remap::to_physics_position(session.world_hit);
        simulation.apply_force(force, DVec3::ZERO, point, session.body);
    }

    /// Moves the grabbed body part of the way towards the handle.
    ///
    /// Mocap bodies move through `mocap_pos`; other bodies shift the first
    /// three coordinates of their root joint.
    pub fn apply_offset(&self, model: &Model, simulation: &mut dyn Simulation) {
        let Some(session) = self.session() else {
            return;
        };
        let offset = remap::to_physics_position(
            (session.current_world - session.world_hit) * PAUSED_DRAG_GAIN,
        );
        let (buffer, adr) = match model.body_mocapid[session.body] {
            mocap if mocap >= 0 => (simulation.mocap_pos_mut(), mocap as usize * 3),
            _ => match model.root_qposadr(session.body) {
                Some(adr) => (simulation.qpos_mut(), adr),
                None => {
                    debug!("body {} has no root joint to move", session.body);
                    return;
                }
            },
        };
        for (slot, delta) in buffer[adr..adr + 3].iter_mut().zip(offset.to_array()) {
            *slot += delta;
        }
    }
}
