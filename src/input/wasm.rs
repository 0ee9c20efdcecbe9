use std::sync::Arc;

use anyhow::{anyhow, Result};
use glam::Vec2;
use gloo_events::{EventListener, EventListenerOptions};
use wasm_bindgen::JsCast;
use web_sys::{window, HtmlCanvasElement, KeyboardEvent, MouseEvent, WheelEvent};

use super::{InputState, KeyCode, MouseButton, NamedKey};

/// DOM listeners feeding [`InputState`]; dropping the handler detaches them.
pub struct WasmInputHandler {
    listeners: Vec<EventListener>,
}

impl WasmInputHandler {
    pub fn attach(canvas: &HtmlCanvasElement, input: Arc<InputState>) -> Result<Self> {
        let window = window().ok_or_else(|| anyhow!("window not available"))?;
        let document = window
            .document()
            .ok_or_else(|| anyhow!("document not available"))?;

        let mut listeners = Vec::new();

        // Keys are read from the document so the canvas does not need focus.
        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(&document, "keydown", move |event| {
                let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                    return;
                };
                if let Some(code) = map_key(event) {
                    event.prevent_default();
                    input_state.set_key_down(code);
                }
            }));
        }

        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(&document, "keyup", move |event| {
                let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                    return;
                };
                if let Some(code) = map_key(event) {
                    input_state.set_key_up(code);
                }
            }));
        }

        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(canvas, "mousedown", move |event| {
                let Some(event) = event.dyn_ref::<MouseEvent>() else {
                    return;
                };
                input_state.set_mouse_position(offset(event));
                input_state.set_mouse_button_down(MouseButton::new(event.button() as u8));
            }));
        }

        // Releases are caught on the document so a drag that leaves the
        // canvas still ends.
        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(&document, "mouseup", move |event| {
                let Some(event) = event.dyn_ref::<MouseEvent>() else {
                    return;
                };
                input_state.set_mouse_button_up(MouseButton::new(event.button() as u8));
            }));
        }

        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(canvas, "mousemove", move |event| {
                if let Some(event) = event.dyn_ref::<MouseEvent>() {
                    input_state.set_mouse_position(offset(event));
                }
            }));
        }

        {
            let input_state = Arc::clone(&input);
            let options = EventListenerOptions::enable_prevent_default();
            listeners.push(EventListener::new_with_options(
                canvas,
                "wheel",
                options,
                move |event| {
                    let Some(event) = event.dyn_ref::<WheelEvent>() else {
                        return;
                    };
                    event.prevent_default();
                    input_state.scroll(-event.delta_y() as f32);
                },
            ));
        }

        {
            // Right-button orbit panning would otherwise open the context menu.
            let options = EventListenerOptions::enable_prevent_default();
            listeners.push(EventListener::new_with_options(
                canvas,
                "contextmenu",
                options,
                |event| event.prevent_default(),
            ));
        }

        Ok(Self { listeners })
    }
}

impl Drop for WasmInputHandler {
    fn drop(&mut self) {
        self.listeners.clear();
    }
}

fn offset(event: &MouseEvent) -> Vec2 {
    Vec2::new(event.offset_x() as f32, event.offset_y() as f32)
}

fn map_key(event: &KeyboardEvent) -> Option<KeyCode> {
    let key = event.key();
    match key.as_str() {
        "Backspace" => Some(KeyCode::Named(NamedKey::Backspace)),
        " " => Some(KeyCode::Named(NamedKey::Space)),
        other => KeyCode::from_name(other),
    }
}
