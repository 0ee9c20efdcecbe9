//! Glue shared by the native and web shells: viewport tracking, routing of
//! queued input to the viewer and camera, and console summaries.

use glam::Vec2;
use parking_lot::RwLock;

use crate::input::{command_for_key, to_ndc, InputEvent, MouseButton, ViewerCommand};
use crate::physics::PhysicsEngine;
use crate::render::{collect_draw_items, CameraParams, DrawItem, LightParams};
use crate::viewer::Viewer;

/// Radians of orbit per pixel of pointer travel.
const ORBIT_SPEED: f32 = 0.005;
/// World units of pan per pixel, per unit of camera distance.
const PAN_SPEED: f32 = 0.002;
/// Distance factor applied per 100 units of wheel travel.
const ZOOM_STEP: f32 = 0.9;

#[derive(Debug)]
pub struct WindowViewport {
    size: RwLock<(u32, u32)>,
}

impl WindowViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RwLock::new((width.max(1), height.max(1))),
        }
    }

    pub fn update(&self, width: u32, height: u32) {
        *self.size.write() = (width.max(1), height.max(1));
    }

    pub fn size(&self) -> Vec2 {
        let (width, height) = *self.size.read();
        Vec2::new(width as f32, height as f32)
    }

    pub fn aspect(&self) -> f32 {
        let size = self.size();
        size.x / size.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    /// Left button held over empty space or static geometry.
    Orbit { last: Vec2 },
    Pan { last: Vec2 },
    /// Left button grabbed a body.
    Drag,
}

/// Turns queued pointer and key events into viewer and camera actions.
///
/// A left press over a body starts a drag; anywhere else it orbits the
/// camera. The right and middle buttons pan, the wheel zooms.
#[derive(Debug, Clone, Copy)]
pub struct InputRouter {
    gesture: Gesture,
}

impl Default for InputRouter {
    fn default() -> Self {
        Self {
            gesture: Gesture::Idle,
        }
    }
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.gesture == Gesture::Drag
    }

    pub fn handle<E: PhysicsEngine>(
        &mut self,
        viewer: &mut Viewer<E>,
        viewport: &WindowViewport,
        event: InputEvent,
    ) {
        let size = viewport.size();
        let aspect = viewport.aspect();
        match event {
            InputEvent::PointerDown { button, position } => {
                self.gesture = if button == MouseButton::LEFT {
                    if viewer.pointer_down(to_ndc(position, size), aspect) {
                        Gesture::Drag
                    } else {
                        Gesture::Orbit { last: position }
                    }
                } else {
                    Gesture::Pan { last: position }
                };
            }
            InputEvent::PointerMove { position } => match &mut self.gesture {
                Gesture::Drag => viewer.pointer_move(to_ndc(position, size), aspect),
                Gesture::Orbit { last } => {
                    let delta = position - *last;
                    *last = position;
                    viewer
                        .camera_mut()
                        .rotate(-delta.x * ORBIT_SPEED, delta.y * ORBIT_SPEED);
                }
                Gesture::Pan { last } => {
                    let delta = position - *last;
                    *last = position;
                    let camera = viewer.camera_mut();
                    let scale = camera.position.distance(camera.target) * PAN_SPEED;
                    camera.pan(-delta.x * scale, delta.y * scale);
                }
                Gesture::Idle => {}
            },
            InputEvent::PointerUp { .. } => {
                if self.gesture == Gesture::Drag {
                    viewer.pointer_up();
                }
                self.gesture = Gesture::Idle;
            }
            InputEvent::Wheel { delta } => {
                viewer.camera_mut().zoom(ZOOM_STEP.powf(delta / 100.0));
            }
            InputEvent::KeyDown(key) => {
                if let Some(command) = command_for_key(key) {
                    apply_command(viewer, command);
                }
            }
        }
    }
}

/// Runs a bound command, logging failures.
pub fn apply_command<E: PhysicsEngine>(viewer: &mut Viewer<E>, command: ViewerCommand) {
    match command {
        ViewerCommand::TogglePause => {
            viewer.toggle_pause();
        }
        ViewerCommand::Reset => viewer.reset(),
        ViewerCommand::Reload => {
            if let Err(err) = viewer.reload() {
                log::error!("reload failed: {err}");
            }
        }
        ViewerCommand::NextKeyframe => match viewer.next_keyframe() {
            Some(key) => log::info!("loaded keyframe {key}"),
            None => log::info!("scene has no keyframes"),
        },
        ViewerCommand::ResetCamera => viewer.camera_mut().reset(),
    }
}

/// Everything a renderer needs for one frame.
pub fn frame_inputs<E: PhysicsEngine>(
    viewer: &Viewer<E>,
    aspect: f32,
) -> (CameraParams, LightParams, Vec<DrawItem>) {
    let graph = viewer.graph();
    (
        CameraParams::from_camera(viewer.camera(), aspect),
        LightParams::from_graph(graph, graph.root()),
        collect_draw_items(graph, graph.root()),
    )
}

/// Counts and body names of the active scene.
pub fn scene_summary<E: PhysicsEngine>(viewer: &Viewer<E>) -> Vec<String> {
    let (Some(name), Some(model)) = (viewer.scene_name(), viewer.model()) else {
        return vec!["No scene loaded".to_string()];
    };
    let mut lines = vec![format!(
        "Loaded scene {name} with {} bodies, {} geoms, {} lights, {} tendons, {} actuators, {} keyframes",
        model.nbody, model.ngeom, model.nlight, model.ntendon, model.nu, model.nkey
    )];
    lines.extend((0..model.nbody).map(|body| {
        let mocap = if model.body_mocapid[body] >= 0 { " mocap" } else { "" };
        format!(
            " - body {body} {} (parent {}, mass {:.3}{mocap})",
            model.body_name(body),
            model.body_parentid[body],
            model.body_mass[body]
        )
    }));
    lines
}

/// World positions of every body group, in renderer axes.
pub fn final_state<E: PhysicsEngine>(viewer: &Viewer<E>) -> Vec<String> {
    let (Some(model), Some(scene), Some(simulation)) =
        (viewer.model(), viewer.scene(), viewer.simulation())
    else {
        return Vec::new();
    };
    let mut lines = vec![format!("Final body states (t = {:.3} s):", simulation.time())];
    for (body, &node) in scene.bodies.iter().enumerate() {
        let Some(position) = viewer.graph().world_position(node) else {
            continue;
        };
        lines.push(format!(
            " - {} pos=({:.3}, {:.3}, {:.3})",
            model.body_name(body),
            position.x,
            position.y,
            position.z
        ));
    }
    lines
}

pub fn print_summary<E: PhysicsEngine>(viewer: &Viewer<E>) {
    for line in scene_summary(viewer) {
        println!("{line}");
    }
}

pub fn print_final_state<E: PhysicsEngine>(viewer: &Viewer<E>) {
    for line in final_state(viewer) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerParams;
    use crate::input::{KeyCode, NamedKey};
    use crate::library::SceneLibrary;
    use crate::physics::KinematicEngine;

    fn viewer() -> Viewer {
        let mut viewer = Viewer::with_seed(
            KinematicEngine::new(),
            SceneLibrary::bundled(),
            ViewerParams::default(),
            3,
        );
        viewer.load_scene("simple.xml").unwrap();
        viewer
    }

    #[test]
    fn pressing_on_empty_space_orbits() {
        let mut viewer = viewer();
        let viewport = WindowViewport::new(800, 600);
        let mut router = InputRouter::new();
        let before = viewer.camera().position;
        router.handle(
            &mut viewer,
            &viewport,
            InputEvent::PointerDown {
                button: MouseButton::LEFT,
                position: Vec2::new(5.0, 5.0),
            },
        );
        assert!(!router.is_dragging());
        router.handle(
            &mut viewer,
            &viewport,
            InputEvent::PointerMove {
                position: Vec2::new(45.0, 5.0),
            },
        );
        assert_ne!(viewer.camera().position, before);
        router.handle(
            &mut viewer,
            &viewport,
            InputEvent::PointerUp {
                button: MouseButton::LEFT,
                position: Vec2::new(45.0, 5.0),
            },
        );
        assert!(!viewer.drag().is_dragging());
    }

    #[test]
    fn keys_drive_commands() {
        let mut viewer = viewer();
        let viewport = WindowViewport::new(800, 600);
        let mut router = InputRouter::new();
        router.handle(
            &mut viewer,
            &viewport,
            InputEvent::KeyDown(KeyCode::Named(NamedKey::Space)),
        );
        assert!(viewer.is_paused());
        viewer.camera_mut().zoom(0.5);
        router.handle(&mut viewer, &viewport, InputEvent::KeyDown(KeyCode::Character('C')));
        assert_eq!(*viewer.camera(), crate::camera::OrbitCamera::default());
    }

    #[test]
    fn wheel_zooms_towards_target() {
        let mut viewer = viewer();
        let viewport = WindowViewport::new(800, 600);
        let before = viewer.camera().position.distance(viewer.camera().target);
        InputRouter::new().handle(&mut viewer, &viewport, InputEvent::Wheel { delta: 100.0 });
        let after = viewer.camera().position.distance(viewer.camera().target);
        assert!((after - before * ZOOM_STEP).abs() < 1e-4);
    }

    #[test]
    fn summaries_list_every_body() {
        let viewer = viewer();
        let summary = scene_summary(&viewer);
        assert!(summary[0].starts_with("Loaded scene simple.xml with 4 bodies"));
        assert_eq!(summary.len(), 5);
        assert!(summary.iter().any(|line| line.contains("target") && line.contains("mocap")));
        let state = final_state(&viewer);
        assert_eq!(state.len(), 5);
        assert!(state[2].starts_with(" - box pos=(0.000, 0.600,"));
    }

    #[test]
    fn frame_inputs_cover_the_scene() {
        let viewer = viewer();
        let (camera, _light, items) = frame_inputs(&viewer, 4.0 / 3.0);
        assert_eq!(camera.position, viewer.camera().position);
        // Floor, box, ball and target; no tendons.
        assert_eq!(items.len(), 4);
    }
}
