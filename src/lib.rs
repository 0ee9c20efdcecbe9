//! Viewer core for MuJoCo MJCF scenes.
//!
//! A compiled model is mirrored into a renderer-side scene graph (one group
//! per body, one mesh per visual geom, pooled tendon cylinders), kept in
//! sync with the simulation every frame, and made interactive by dragging
//! bodies with spring forces. Platform shells live in `main.rs` (winit and
//! wgpu) and [`web`] (canvas and `postMessage`); everything else is
//! headless and testable.

pub mod app;
pub mod builder;
pub mod camera;
pub mod config;
pub mod error;
pub mod input;
pub mod interaction;
pub mod library;
pub mod physics;
pub mod primitives;
pub mod protocol;
pub mod raycast;
pub mod remap;
pub mod render;
pub mod scene_graph;
pub mod updater;
pub mod viewer;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use builder::{build_scene, MujocoScene};
pub use camera::OrbitCamera;
pub use config::{ViewerConfig, ViewerParams};
pub use error::{ConfigError, ModelError, ProtocolError, ViewerError};
pub use input::{InputEvent, InputState, KeyCode, MouseButton, NamedKey, ViewerCommand};
pub use interaction::DragController;
pub use library::SceneLibrary;
pub use physics::{KinematicEngine, LoadedScene, Model, PhysicsEngine, Simulation};
pub use protocol::{InboundMessage, OutboundMessage};
pub use render::{CameraParams, DrawItem, LightParams, Renderer};
pub use scene_graph::{NodeId, SceneGraph};
pub use viewer::{FrameStats, ReloadOutcome, ReloadTicket, Viewer};
