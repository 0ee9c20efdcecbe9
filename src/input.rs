use std::collections::HashSet;

use glam::Vec2;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

#[cfg(target_arch = "wasm32")]
pub mod wasm;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return None;
        };
        if ch.is_ascii_alphabetic() {
            return Some(Self::Character(ch.to_ascii_uppercase()));
        }
        if ch.is_ascii_digit() {
            return Some(Self::Digit(ch as u8 - b'0'));
        }
        None
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" | " " => Space,
        "Enter" | "Return" => Enter,
        "Escape" | "Esc" => Escape,
        "Backspace" => Backspace,
        "Left" | "ArrowLeft" => Left,
        "Right" | "ArrowRight" => Right,
        "Up" | "ArrowUp" => Up,
        "Down" | "ArrowDown" => Down,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Escape,
    Backspace,
    Left,
    Right,
    Up,
    Down,
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const MIDDLE: Self = Self(1);
    pub const RIGHT: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// Pointer and keyboard events in the order the platform delivered them.
///
/// Positions are in window pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { button: MouseButton, position: Vec2 },
    PointerMove { position: Vec2 },
    PointerUp { button: MouseButton, position: Vec2 },
    /// Positive deltas scroll away from the user.
    Wheel { delta: f32 },
    KeyDown(KeyCode),
}

/// Viewer actions bound to keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewerCommand {
    TogglePause,
    Reset,
    Reload,
    NextKeyframe,
    ResetCamera,
}

/// Key bindings: Space pauses, Backspace resets, R reloads, K steps through
/// keyframes and C recentres the camera.
pub fn command_for_key(key: KeyCode) -> Option<ViewerCommand> {
    match key {
        KeyCode::Named(NamedKey::Space) => Some(ViewerCommand::TogglePause),
        KeyCode::Named(NamedKey::Backspace) => Some(ViewerCommand::Reset),
        KeyCode::Character('R') => Some(ViewerCommand::Reload),
        KeyCode::Character('K') => Some(ViewerCommand::NextKeyframe),
        KeyCode::Character('C') => Some(ViewerCommand::ResetCamera),
        _ => None,
    }
}

/// Converts a pixel position to normalized device coordinates.
pub fn to_ndc(position: Vec2, viewport: Vec2) -> Vec2 {
    let size = viewport.max(Vec2::ONE);
    Vec2::new(
        position.x / size.x * 2.0 - 1.0,
        1.0 - position.y / size.y * 2.0,
    )
}

/// Input snapshot shared between platform callbacks and the frame loop.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    mouse_buttons: RwLock<HashSet<MouseButton>>,
    mouse_position: RwLock<Vec2>,
    events: Mutex<Vec<InputEvent>>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        if self.keys.write().insert(key) {
            self.events.lock().push(InputEvent::KeyDown(key));
        }
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.mouse_buttons.write().insert(button);
        let position = self.mouse_position();
        self.events
            .lock()
            .push(InputEvent::PointerDown { button, position });
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) {
        self.mouse_buttons.write().remove(&button);
        let position = self.mouse_position();
        self.events
            .lock()
            .push(InputEvent::PointerUp { button, position });
    }

    pub fn set_mouse_position(&self, position: Vec2) {
        *self.mouse_position.write() = position;
        self.events.lock().push(InputEvent::PointerMove { position });
    }

    pub fn scroll(&self, delta: f32) {
        self.events.lock().push(InputEvent::Wheel { delta });
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.read().contains(&button)
    }

    pub fn mouse_position(&self) -> Vec2 {
        *self.mouse_position.read()
    }

    /// Takes all events queued since the last call.
    pub fn drain_events(&self) -> Vec<InputEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}
