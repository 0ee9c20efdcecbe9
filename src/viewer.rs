//! The viewer: one engine handle, one scene graph, one active scene.
//!
//! Shells drive it with [`Viewer::frame`] once per animation frame, forward
//! pointer input through the `pointer_*` methods and route host messages to
//! [`Viewer::handle_message`].

use glam::Vec2;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::builder::{build_scene, MujocoScene};
use crate::camera::OrbitCamera;
use crate::config::ViewerParams;
use crate::error::ViewerError;
use crate::interaction::DragController;
use crate::library::SceneLibrary;
use crate::physics::{KinematicEngine, LoadedScene, Model, PhysicsEngine, Simulation};
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::scene_graph::SceneGraph;
use crate::updater::{self, ControlNoise, MAX_CATCH_UP_MS};

/// Claim on the next scene swap.
///
/// Only the most recently issued ticket may complete; older ones are
/// discarded when finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadTicket {
    generation: u64,
    scene_name: String,
}

impl ReloadTicket {
    pub fn scene_name(&self) -> &str {
        &self.scene_name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Loaded,
    /// A newer reload was requested after this ticket was issued.
    Superseded,
}

/// Work done by one call to [`Viewer::frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub steps: usize,
    pub tendon_segments: usize,
}

struct ActiveScene {
    name: String,
    loaded: LoadedScene,
    handles: MujocoScene,
}

pub struct Viewer<E: PhysicsEngine = KinematicEngine> {
    engine: E,
    library: SceneLibrary,
    graph: SceneGraph,
    camera: OrbitCamera,
    params: ViewerParams,
    drag: DragController,
    rng: StdRng,
    active: Option<ActiveScene>,
    actuator_values: Vec<f64>,
    /// Wall-clock time, in milliseconds, the simulation has been advanced to.
    mujoco_time: f64,
    latest_generation: u64,
}

impl<E: PhysicsEngine> Viewer<E> {
    pub fn new(engine: E, library: SceneLibrary, params: ViewerParams) -> Self {
        Self::with_rng(engine, library, params, StdRng::from_entropy())
    }

    /// Viewer whose control noise is reproducible.
    pub fn with_seed(engine: E, library: SceneLibrary, params: ViewerParams, seed: u64) -> Self {
        Self::with_rng(engine, library, params, StdRng::seed_from_u64(seed))
    }

    fn with_rng(engine: E, library: SceneLibrary, params: ViewerParams, rng: StdRng) -> Self {
        Self {
            engine,
            library,
            graph: SceneGraph::new(),
            camera: OrbitCamera::default(),
            params,
            drag: DragController::new(),
            rng,
            active: None,
            actuator_values: Vec::new(),
            mujoco_time: 0.0,
            latest_generation: 0,
        }
    }

    pub fn library(&self) -> &SceneLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut SceneLibrary {
        &mut self.library
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    pub fn params(&self) -> &ViewerParams {
        &self.params
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn scene_name(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.name.as_str())
    }

    pub fn scene(&self) -> Option<&MujocoScene> {
        self.active.as_ref().map(|active| &active.handles)
    }

    pub fn model(&self) -> Option<&Model> {
        self.active.as_ref().map(|active| &active.loaded.model)
    }

    pub fn simulation(&self) -> Option<&dyn Simulation> {
        self.active
            .as_ref()
            .map(|active| active.loaded.simulation.as_ref())
    }

    /// Control values after noise, one per actuator.
    pub fn actuator_values(&self) -> &[f64] {
        &self.actuator_values
    }

    pub fn mujoco_time(&self) -> f64 {
        self.mujoco_time
    }

    /// Issues the ticket for loading `scene_name`, superseding earlier ones.
    pub fn begin_reload(&mut self, scene_name: impl Into<String>) -> ReloadTicket {
        self.latest_generation += 1;
        ReloadTicket {
            generation: self.latest_generation,
            scene_name: scene_name.into(),
        }
    }

    pub fn is_current(&self, ticket: &ReloadTicket) -> bool {
        ticket.generation == self.latest_generation
    }

    /// Loads the ticket's scene from the library and swaps it in.
    ///
    /// On error the previous scene stays active.
    pub fn finish_reload(&mut self, ticket: ReloadTicket) -> Result<ReloadOutcome, ViewerError> {
        if !self.is_current(&ticket) {
            debug!(
                "discarding superseded reload of {} (generation {})",
                ticket.scene_name, ticket.generation
            );
            return Ok(ReloadOutcome::Superseded);
        }

        let name = ticket.scene_name;
        let xml = self.library.read(&name)?;
        let mut loaded = self
            .engine
            .load(&name, xml)
            .map_err(|source| ViewerError::Model {
                name: name.clone(),
                source,
            })?;
        loaded.simulation.forward();

        let handles = build_scene(&mut self.graph, &loaded.model);
        if let Some(previous) = self.active.take() {
            self.graph.remove(previous.handles.root);
        }
        let root = self.graph.root();
        self.graph.attach(root, handles.root);

        self.drag.pointer_up();
        self.camera.reset();
        self.actuator_values = loaded.simulation.ctrl().to_vec();
        self.actuator_values.resize(loaded.model.nu, 0.0);

        info!(
            "Loaded scene {name}: {} bodies, {} geoms, {} lights, {} tendons",
            loaded.model.nbody, loaded.model.ngeom, loaded.model.nlight, loaded.model.ntendon
        );
        self.active = Some(ActiveScene {
            name,
            loaded,
            handles,
        });
        self.sync_scene();
        Ok(ReloadOutcome::Loaded)
    }

    pub fn load_scene(&mut self, scene_name: &str) -> Result<(), ViewerError> {
        let ticket = self.begin_reload(scene_name);
        self.finish_reload(ticket).map(|_| ())
    }

    /// Stores `content` in the library under `file_name` and loads it.
    pub fn load_xml(&mut self, file_name: &str, content: &str) -> Result<(), ViewerError> {
        self.library.write_file(file_name, content);
        self.load_scene(file_name)
    }

    /// Reloads the active scene from the library.
    pub fn reload(&mut self) -> Result<(), ViewerError> {
        let name = self.scene_name().ok_or(ViewerError::NoScene)?.to_string();
        self.load_scene(&name)
    }

    /// Applies a host request and returns the reply to post back.
    pub fn handle_message(&mut self, message: InboundMessage) -> OutboundMessage {
        let (name, result) = match message {
            InboundMessage::LoadScene { scene_name } => {
                let result = self.load_scene(&scene_name);
                (scene_name, result)
            }
            InboundMessage::LoadXmlContent { file_name, content } => {
                let result = self.load_xml(&file_name, &content);
                (file_name, result)
            }
        };
        match result {
            Ok(()) => OutboundMessage::SceneLoaded { scene_name: name },
            Err(err) => {
                warn!("{err}");
                OutboundMessage::Error {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Advances the simulation to `time_ms` and refreshes the scene graph.
    pub fn frame(&mut self, time_ms: f64) -> FrameStats {
        let Some(active) = self.active.as_mut() else {
            return FrameStats::default();
        };
        let LoadedScene { model, simulation } = &mut active.loaded;
        let model: &Model = model;
        let simulation: &mut dyn Simulation = &mut **simulation;
        let handles = &active.handles;
        let mut stats = FrameStats::default();

        if self.params.paused {
            if self.drag.is_dragging() {
                self.drag.refresh(&self.graph);
                self.drag.apply_offset(model, simulation);
            }
            simulation.forward();
        } else {
            let timestep = model.timestep;
            if timestep <= 0.0 {
                warn!("model timestep {timestep} is not positive; not stepping");
            } else {
                if time_ms - self.mujoco_time > MAX_CATCH_UP_MS {
                    self.mujoco_time = time_ms;
                }
                let noise = ControlNoise {
                    rate: self.params.ctrl_noise_rate,
                    std: self.params.ctrl_noise_std,
                };
                while self.mujoco_time < time_ms {
                    if noise.is_active() {
                        noise.apply(
                            timestep,
                            simulation.ctrl_mut(),
                            &mut self.actuator_values,
                            &mut self.rng,
                        );
                    }
                    simulation.qfrc_applied_mut().fill(0.0);
                    if self.drag.is_dragging() {
                        updater::sync_bodies(&mut self.graph, handles, model, &*simulation);
                        self.drag.refresh(&self.graph);
                        self.drag.apply_force(model, simulation);
                    }
                    simulation.step();
                    self.mujoco_time += timestep * 1000.0;
                    stats.steps += 1;
                }
            }
        }

        stats.tendon_segments = self.sync_scene();
        stats
    }

    /// Copies the current simulation state into the scene graph and returns
    /// the number of tendon segments drawn.
    fn sync_scene(&mut self) -> usize {
        let Some(active) = self.active.as_ref() else {
            return 0;
        };
        let model = &active.loaded.model;
        let simulation = active.loaded.simulation.as_ref();
        updater::sync_bodies(&mut self.graph, &active.handles, model, simulation);
        updater::sync_lights(&mut self.graph, &active.handles, model, simulation);
        updater::sync_tendons(&mut self.graph, &active.handles, model, simulation)
    }

    pub fn is_paused(&self) -> bool {
        self.params.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.params.paused = paused;
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.params.paused = !self.params.paused;
        info!(
            "simulation {}",
            if self.params.paused { "paused" } else { "resumed" }
        );
        self.params.paused
    }

    /// Restores the initial state of the active scene.
    pub fn reset(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.loaded.simulation.reset_data();
        active.loaded.simulation.forward();
        self.sync_scene();
    }

    /// Copies keyframe `key` into `qpos`; returns false when it does not exist.
    pub fn load_keyframe(&mut self, key: usize) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let model = &active.loaded.model;
        if key >= model.nkey {
            return false;
        }
        let nq = model.nq;
        let values = &model.key_qpos[key * nq..(key + 1) * nq];
        active.loaded.simulation.qpos_mut()[..nq].copy_from_slice(values);
        active.loaded.simulation.forward();
        debug!("loaded keyframe {key}");
        self.sync_scene();
        true
    }

    /// Loads the configured keyframe and advances the selection, wrapping
    /// around. Returns the keyframe that was loaded.
    pub fn next_keyframe(&mut self) -> Option<usize> {
        let nkey = self.model()?.nkey;
        if nkey == 0 {
            return None;
        }
        let key = self.params.keyframe % nkey;
        self.load_keyframe(key);
        self.params.keyframe = (key + 1) % nkey;
        Some(key)
    }

    pub fn set_noise_rate(&mut self, rate: f64) {
        self.params.ctrl_noise_rate = rate.max(0.0);
    }

    pub fn set_noise_std(&mut self, std: f64) {
        self.params.ctrl_noise_std = std.max(0.0);
    }

    /// Starts a drag under the pointer; `ndc` is in normalized device
    /// coordinates. Returns whether a body was grabbed.
    pub fn pointer_down(&mut self, ndc: Vec2, aspect: f32) -> bool {
        let Some(active) = self.active.as_ref() else {
            return false;
        };
        let ray = self.camera.ray_from_ndc(ndc, aspect);
        self.drag.pointer_down(&self.graph, &active.handles, &ray)
    }

    pub fn pointer_move(&mut self, ndc: Vec2, aspect: f32) {
        let ray = self.camera.ray_from_ndc(ndc, aspect);
        self.drag.pointer_move(&ray);
    }

    pub fn pointer_up(&mut self) {
        self.drag.pointer_up();
    }
}
