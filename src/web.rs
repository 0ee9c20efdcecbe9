//! Browser shell: canvas rendering, an animation loop and the host message
//! channel.
//!
//! The embedding page sends `LOAD_SCENE` / `LOAD_XML_CONTENT` messages with
//! `window.postMessage`; replies go to `window.parent`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use gloo_events::EventListener;
use log::{error, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{window, HtmlCanvasElement, MessageEvent, Response};

use crate::app::{apply_command, frame_inputs, InputRouter, WindowViewport};
use crate::config::ViewerParams;
use crate::input::wasm::WasmInputHandler;
use crate::input::{InputState, ViewerCommand};
use crate::library::{SceneLibrary, DEFAULT_SCENE, SCENE_MENU};
use crate::physics::KinematicEngine;
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::render::Renderer;
use crate::viewer::{ReloadOutcome, Viewer};

/// Where scenes missing from the library are fetched from.
const SCENE_URL_PREFIX: &str = "./examples/scenes/";

#[wasm_bindgen(start)]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

#[wasm_bindgen]
pub struct WasmViewer {
    inner: Rc<RefCell<WebState>>,
}

#[wasm_bindgen]
impl WasmViewer {
    #[wasm_bindgen(constructor)]
    pub fn new(canvas_id: &str) -> Result<WasmViewer, JsValue> {
        let window = window().ok_or_else(|| JsValue::from_str("window not available"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("document not available"))?;
        let canvas = document
            .get_element_by_id(canvas_id)
            .ok_or_else(|| JsValue::from_str("canvas element not found"))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| JsValue::from_str("element is not a canvas"))?;

        let renderer = Renderer::new(canvas.clone()).map_err(to_js)?;
        let input = Arc::new(InputState::new());
        let input_handler = WasmInputHandler::attach(&canvas, Arc::clone(&input)).map_err(to_js)?;

        let mut viewer = Viewer::new(
            KinematicEngine::new(),
            SceneLibrary::bundled(),
            ViewerParams::default(),
        );
        viewer.load_scene(DEFAULT_SCENE).map_err(to_js)?;

        let state = WebState {
            viewport: WindowViewport::new(canvas.width(), canvas.height()),
            canvas,
            renderer,
            viewer,
            input,
            router: InputRouter::new(),
            _input_handler: input_handler,
            message_listener: None,
            animation_closure: None,
        };
        let inner = Rc::new(RefCell::new(state));

        let weak = Rc::downgrade(&inner);
        let listener = EventListener::new(&window, "message", move |event| {
            let Some(event) = event.dyn_ref::<MessageEvent>() else {
                return;
            };
            on_host_message(&weak, event.data());
        });
        inner.borrow_mut().message_listener = Some(listener);

        Ok(Self { inner })
    }

    pub fn start(&self) -> Result<(), JsValue> {
        schedule_animation_loop(Rc::clone(&self.inner)).map_err(to_js)
    }

    /// Returns the new paused state.
    pub fn toggle_pause(&self) -> bool {
        self.inner.borrow_mut().viewer.toggle_pause()
    }

    pub fn reset(&self) {
        self.inner.borrow_mut().viewer.reset();
    }

    pub fn reload(&self) {
        apply_command(&mut self.inner.borrow_mut().viewer, ViewerCommand::Reload);
    }

    pub fn load_keyframe(&self, key: usize) -> bool {
        self.inner.borrow_mut().viewer.load_keyframe(key)
    }

    pub fn set_noise(&self, rate: f64, std: f64) {
        let mut state = self.inner.borrow_mut();
        state.viewer.set_noise_rate(rate);
        state.viewer.set_noise_std(std);
    }

    pub fn load_scene(&self, scene_name: String) {
        request_scene(&self.inner, scene_name);
    }

    /// Scene menu as `[label, file]` pairs.
    pub fn scene_menu(&self) -> js_sys::Array {
        SCENE_MENU
            .iter()
            .map(|(label, file)| {
                js_sys::Array::of2(&JsValue::from_str(label), &JsValue::from_str(file))
            })
            .collect()
    }
}

struct WebState {
    canvas: HtmlCanvasElement,
    renderer: Renderer,
    viewer: Viewer,
    input: Arc<InputState>,
    viewport: WindowViewport,
    router: InputRouter,
    _input_handler: WasmInputHandler,
    message_listener: Option<EventListener>,
    animation_closure: Option<Closure<dyn FnMut(f64)>>,
}

impl WebState {
    fn tick(&mut self, now_ms: f64) -> Result<()> {
        self.sync_canvas_size();
        for event in self.input.drain_events() {
            self.router.handle(&mut self.viewer, &self.viewport, event);
        }
        self.viewer.frame(now_ms);

        let (camera, light, items) = frame_inputs(&self.viewer, self.renderer.aspect());
        self.renderer.update_globals(&camera, &light);
        self.renderer.render(&items).map_err(|err| {
            let message = err
                .as_string()
                .unwrap_or_else(|| "unknown canvas error".to_string());
            anyhow!("render failed: {message}")
        })
    }

    /// Follows CSS layout changes of the canvas.
    fn sync_canvas_size(&mut self) {
        let width = self.canvas.client_width().max(0) as u32;
        let height = self.canvas.client_height().max(0) as u32;
        if width == 0 || height == 0 || (width, height) == self.renderer.size() {
            return;
        }
        self.renderer.resize((width, height));
        self.viewport.update(width, height);
    }
}

fn schedule_animation_loop(app: Rc<RefCell<WebState>>) -> Result<()> {
    let window = window().ok_or_else(|| anyhow!("window not available"))?;
    let mut state = app.borrow_mut();
    let app_clone = Rc::clone(&app);

    let closure = Closure::wrap(Box::new(move |now_ms: f64| {
        if let Err(err) = app_clone.borrow_mut().tick(now_ms) {
            error!("{err}");
        }
        if let Err(err) = schedule_animation_loop(Rc::clone(&app_clone)) {
            error!("{err}");
        }
    }) as Box<dyn FnMut(f64)>);

    window
        .request_animation_frame(closure.as_ref().unchecked_ref())
        .map_err(|err| anyhow!("requestAnimationFrame failed: {err:?}"))?;

    state.animation_closure = Some(closure);
    Ok(())
}

fn on_host_message(app: &Weak<RefCell<WebState>>, data: JsValue) {
    let Some(app) = app.upgrade() else {
        return;
    };
    let text = match data.as_string() {
        Some(text) => text,
        None => match js_sys::JSON::stringify(&data) {
            Ok(text) => String::from(text),
            Err(_) => return,
        },
    };
    let message = match InboundMessage::decode(&text) {
        Ok(Some(message)) => message,
        Ok(None) => return,
        Err(err) => {
            warn!("ignoring host message: {err}");
            return;
        }
    };
    match message {
        InboundMessage::LoadScene { scene_name } => request_scene(&app, scene_name),
        message @ InboundMessage::LoadXmlContent { .. } => {
            let reply = app.borrow_mut().viewer.handle_message(message);
            post_to_host(&reply);
        }
    }
}

/// Loads `scene_name`, fetching it first when the library lacks it. Replies
/// to the host unless a newer load overtook this one.
fn request_scene(app: &Rc<RefCell<WebState>>, scene_name: String) {
    let (ticket, cached) = {
        let mut state = app.borrow_mut();
        let cached = state.viewer.library().contains(&scene_name);
        (state.viewer.begin_reload(scene_name.clone()), cached)
    };
    let app = Rc::clone(app);
    spawn_local(async move {
        let fetched = if cached {
            Ok(None)
        } else {
            fetch_text(&format!("{SCENE_URL_PREFIX}{scene_name}"))
                .await
                .map(Some)
        };

        let mut state = app.borrow_mut();
        if !state.viewer.is_current(&ticket) {
            info!("dropping superseded load of {scene_name}");
            return;
        }
        let outcome = fetched.and_then(|text| {
            if let Some(text) = text {
                state.viewer.library_mut().write_file(scene_name.clone(), text);
            }
            state.viewer.finish_reload(ticket).map_err(anyhow::Error::from)
        });
        drop(state);

        match outcome {
            Ok(ReloadOutcome::Loaded) => post_to_host(&OutboundMessage::SceneLoaded { scene_name }),
            Ok(ReloadOutcome::Superseded) => {}
            Err(err) => {
                warn!("{err:#}");
                post_to_host(&OutboundMessage::Error {
                    error: format!("{err:#}"),
                });
            }
        }
    });
}

async fn fetch_text(url: &str) -> Result<String> {
    let window = window().ok_or_else(|| anyhow!("window not available"))?;
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|err| anyhow!("failed to fetch {url}: {err:?}"))?
        .dyn_into::<Response>()
        .map_err(|_| anyhow!("fetch of {url} did not return a response"))?;
    if !response.ok() {
        return Err(anyhow!("failed to fetch {url}: HTTP {}", response.status()));
    }
    let text = response
        .text()
        .map_err(|err| anyhow!("failed to read {url}: {err:?}"))?;
    JsFuture::from(text)
        .await
        .map_err(|err| anyhow!("failed to read {url}: {err:?}"))?
        .as_string()
        .ok_or_else(|| anyhow!("{url} is not text"))
}

fn post_to_host(message: &OutboundMessage) {
    let Some(window) = window() else {
        return;
    };
    let payload = match message.encode() {
        Ok(text) => js_sys::JSON::parse(&text).unwrap_or_else(|_| JsValue::from_str(&text)),
        Err(err) => {
            error!("failed to encode reply: {err}");
            return;
        }
    };
    let target = match window.parent() {
        Ok(Some(parent)) => parent,
        _ => window,
    };
    if let Err(err) = target.post_message(&payload, "*") {
        error!("postMessage failed: {err:?}");
    }
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}
