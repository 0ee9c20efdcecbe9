#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = native::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::any::Any;
    use std::fmt;
    use std::panic::{self, AssertUnwindSafe};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Instant;

    use anyhow::{anyhow, Context, Result};
    use clap::Parser;
    use glam::Vec2;
    use log::{info, warn};
    use pollster::block_on;
    use winit::dpi::LogicalSize;
    use winit::event::{
        ElementState, Event, KeyboardInput, MouseButton as WinitMouseButton, MouseScrollDelta,
        WindowEvent,
    };
    use winit::event_loop::{ControlFlow, EventLoop};
    use winit::platform::run_return::EventLoopExtRunReturn;
    use winit::window::WindowBuilder;

    use mjcf_viewer::app::{frame_inputs, print_final_state, print_summary, InputRouter, WindowViewport};
    use mjcf_viewer::{
        InputState, KeyCode, KinematicEngine, MouseButton, NamedKey, Renderer, SceneLibrary,
        Viewer, ViewerConfig,
    };

    /// Frame interval used when simulating without a window.
    const HEADLESS_FRAME_MS: f64 = 1000.0 / 60.0;

    #[derive(Debug, Parser)]
    #[command(name = "mjcf-viewer", version, about = "View and drag MuJoCo MJCF scenes")]
    struct Cli {
        /// Scene to open: a library name or a path to an MJCF file.
        scene: Option<String>,
        /// Read the scene library from this directory instead of the bundled scenes.
        #[arg(long)]
        scenes_dir: Option<PathBuf>,
        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the scene summary and final state without opening a window.
        #[arg(long)]
        summary_only: bool,
        /// Frames to simulate at 60 Hz before printing the final state in
        /// summary mode.
        #[arg(long, default_value_t = 0)]
        frames: u32,
        /// Start with the simulation paused.
        #[arg(long)]
        paused: bool,
        /// Seed for control noise.
        #[arg(long)]
        seed: Option<u64>,
    }

    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        let mut config = match &cli.config {
            Some(path) => ViewerConfig::load(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => ViewerConfig::default(),
        };
        if let Some(scene) = &cli.scene {
            config.initial_scene = scene.clone();
        }
        if cli.scenes_dir.is_some() {
            config.scenes_dir = cli.scenes_dir.clone();
        }
        if cli.seed.is_some() {
            config.seed = cli.seed;
        }
        config.params.paused |= cli.paused;

        let mut library = match &config.scenes_dir {
            Some(dir) => SceneLibrary::from_dir(dir)
                .with_context(|| format!("failed to read scenes from {}", dir.display()))?,
            None => SceneLibrary::bundled(),
        };
        let scene_name = import_scene_file(&mut library, &config.initial_scene)?;

        let engine = KinematicEngine::new();
        let mut viewer = match config.seed {
            Some(seed) => Viewer::with_seed(engine, library, config.params, seed),
            None => Viewer::new(engine, library, config.params),
        };
        viewer
            .load_scene(&scene_name)
            .with_context(|| format!("failed to load scene {scene_name}"))?;
        print_summary(&viewer);

        if cli.summary_only {
            run_headless(viewer, cli.frames);
            return Ok(());
        }

        match run_interactive(&mut viewer, &config) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                    );
                    run_headless(viewer, cli.frames);
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Adds `scene` to the library when it names a file on disk that the
    /// library does not already hold, returning the library name to load.
    fn import_scene_file(library: &mut SceneLibrary, scene: &str) -> Result<String> {
        let path = Path::new(scene);
        if library.contains(scene) || !path.is_file() {
            return Ok(scene.to_string());
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("{scene} has no file name"))?;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        library.write_file(name.clone(), text);
        Ok(name)
    }

    fn run_headless(mut viewer: Viewer, frames: u32) {
        let mut steps = 0;
        for frame in 1..=frames {
            steps += viewer.frame(frame as f64 * HEADLESS_FRAME_MS).steps;
        }
        if frames > 0 {
            println!("Simulated {frames} frame(s), {steps} step(s)");
        }
        print_final_state(&viewer);
    }

    fn run_interactive(viewer: &mut Viewer, config: &ViewerConfig) -> Result<()> {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));
        let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
        panic::set_hook(default_hook);
        let event_loop =
            event_loop.map_err(|panic| WindowInitError::from_panic("event loop", panic))?;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title("MJCF Viewer")
                .with_inner_size(LogicalSize::new(
                    config.window.width as f64,
                    config.window.height as f64,
                ))
                .build(&event_loop)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let renderer = block_on(Renderer::new(Arc::clone(&window)))?;
        let size = window.inner_size();
        let mut app = AppState {
            renderer,
            viewer,
            input: InputState::new(),
            viewport: WindowViewport::new(size.width, size.height),
            router: InputRouter::new(),
            started: Instant::now(),
            last_error: None,
        };

        let mut event_loop = event_loop;
        event_loop.run_return(|event, _, control_flow| {
            *control_flow = ControlFlow::Poll;
            if let Err(err) = app.process_event(&event, control_flow) {
                app.last_error = Some(err);
                control_flow.set_exit();
            }
        });

        print_final_state(&*app.viewer);
        match app.last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    struct AppState<'a> {
        renderer: Renderer,
        viewer: &'a mut Viewer,
        input: InputState,
        viewport: WindowViewport,
        router: InputRouter,
        started: Instant,
        last_error: Option<anyhow::Error>,
    }

    #[derive(Debug)]
    struct WindowInitError {
        message: String,
    }

    impl WindowInitError {
        fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {}", panic_message(panic)),
            }
        }

        fn from_error(stage: &str, err: impl fmt::Display) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {err}"),
            }
        }
    }

    impl fmt::Display for WindowInitError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.message)
        }
    }

    impl std::error::Error for WindowInitError {}

    fn panic_message(panic: Box<dyn Any + Send>) -> String {
        match panic.downcast::<String>() {
            Ok(msg) => *msg,
            Err(panic) => match panic.downcast::<&'static str>() {
                Ok(msg) => (*msg).to_string(),
                Err(_) => "unknown panic".into(),
            },
        }
    }

    impl AppState<'_> {
        fn process_event(
            &mut self,
            event: &Event<()>,
            control_flow: &mut ControlFlow,
        ) -> Result<()> {
            match event {
                Event::WindowEvent { event, window_id }
                    if *window_id == self.renderer.window_id() =>
                {
                    match event {
                        WindowEvent::CloseRequested => {
                            control_flow.set_exit();
                        }
                        WindowEvent::Resized(size) => {
                            self.renderer.resize(*size);
                            self.viewport.update(size.width, size.height);
                        }
                        WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                            self.renderer.resize(**new_inner_size);
                            self.viewport
                                .update(new_inner_size.width, new_inner_size.height);
                        }
                        WindowEvent::KeyboardInput { input, .. } => {
                            self.handle_keyboard(input);
                        }
                        WindowEvent::MouseInput { state, button, .. } => {
                            self.handle_mouse_button(*state, *button);
                        }
                        WindowEvent::CursorMoved { position, .. } => {
                            let pos = Vec2::new(position.x as f32, position.y as f32);
                            self.input.set_mouse_position(pos);
                        }
                        WindowEvent::MouseWheel { delta, .. } => {
                            let amount = match delta {
                                MouseScrollDelta::LineDelta(_, lines) => lines * 100.0,
                                MouseScrollDelta::PixelDelta(pixels) => pixels.y as f32,
                            };
                            self.input.scroll(amount);
                        }
                        _ => {}
                    }
                }
                Event::RedrawRequested(window_id) if *window_id == self.renderer.window_id() => {
                    let (camera, light, items) =
                        frame_inputs(&*self.viewer, self.renderer.aspect());
                    self.renderer.update_globals(&camera, &light);
                    if let Err(err) = self.renderer.render(&items) {
                        match err {
                            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                                let size = self.renderer.window().inner_size();
                                self.renderer.resize(size);
                            }
                            wgpu::SurfaceError::OutOfMemory => {
                                return Err(anyhow!("GPU is out of memory"));
                            }
                            wgpu::SurfaceError::Timeout => {
                                warn!("Surface timeout; retrying next frame");
                            }
                        }
                    }
                }
                Event::MainEventsCleared => {
                    for input in self.input.drain_events() {
                        self.router.handle(&mut *self.viewer, &self.viewport, input);
                    }
                    let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
                    self.viewer.frame(elapsed_ms);
                    self.renderer.window().request_redraw();
                }
                Event::LoopDestroyed => info!("event loop finished"),
                _ => {}
            }
            Ok(())
        }

        fn handle_keyboard(&self, input: &KeyboardInput) {
            let Some(keycode) = input.virtual_keycode.and_then(map_keycode) else {
                return;
            };
            match input.state {
                ElementState::Pressed => self.input.set_key_down(keycode),
                ElementState::Released => self.input.set_key_up(keycode),
            }
        }

        fn handle_mouse_button(&self, state: ElementState, button: WinitMouseButton) {
            let button = match button {
                WinitMouseButton::Left => MouseButton::LEFT,
                WinitMouseButton::Middle => MouseButton::MIDDLE,
                WinitMouseButton::Right => MouseButton::RIGHT,
                WinitMouseButton::Other(value) => MouseButton::new(value as u8),
            };
            match state {
                ElementState::Pressed => self.input.set_mouse_button_down(button),
                ElementState::Released => self.input.set_mouse_button_up(button),
            }
        }
    }

    fn map_keycode(code: winit::event::VirtualKeyCode) -> Option<KeyCode> {
        use winit::event::VirtualKeyCode as Key;
        Some(match code {
            Key::Space => KeyCode::Named(NamedKey::Space),
            Key::Return => KeyCode::Named(NamedKey::Enter),
            Key::Escape => KeyCode::Named(NamedKey::Escape),
            Key::Back => KeyCode::Named(NamedKey::Backspace),
            Key::Left => KeyCode::Named(NamedKey::Left),
            Key::Right => KeyCode::Named(NamedKey::Right),
            Key::Up => KeyCode::Named(NamedKey::Up),
            Key::Down => KeyCode::Named(NamedKey::Down),
            Key::Key0 => KeyCode::Digit(0),
            Key::Key1 => KeyCode::Digit(1),
            Key::Key2 => KeyCode::Digit(2),
            Key::Key3 => KeyCode::Digit(3),
            Key::Key4 => KeyCode::Digit(4),
            Key::Key5 => KeyCode::Digit(5),
            Key::Key6 => KeyCode::Digit(6),
            Key::Key7 => KeyCode::Digit(7),
            Key::Key8 => KeyCode::Digit(8),
            Key::Key9 => KeyCode::Digit(9),
            Key::C => KeyCode::Character('C'),
            Key::K => KeyCode::Character('K'),
            Key::R => KeyCode::Character('R'),
            _ => return None,
        })
    }
}
