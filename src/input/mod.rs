//! Unified input events
//!
//! Native window callbacks are folded into one [`InputEvent`] shape by the
//! [`InputTranslator`] the window owns. Listeners receive each event
//! synchronously and in registration order.

pub mod translator;
pub mod window;

use cgmath::Vector2;
use winit::event::MouseButton;
use winit::keyboard::{KeyCode, ModifiersState};
use winit::window::WindowId;

pub use translator::{FileDrop, InputTranslator};
pub use window::AppWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Press,
    Release,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputKind {
    Cursor,
    MouseButton(MouseButton),
    Key(KeyCode),
    Char(char),
    Scroll { x: f32, y: f32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
    pub logo: bool,
}

impl From<ModifiersState> for Modifiers {
    fn from(state: ModifiersState) -> Self {
        Self {
            shift: state.shift_key(),
            control: state.control_key(),
            alt: state.alt_key(),
            logo: state.super_key(),
        }
    }
}

/// One input occurrence, stamped with the window state at the time it happened.
///
/// Events without a button state (cursor, character, scroll) carry
/// [`Action::Release`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    pub window: WindowId,
    pub window_size: (u32, u32),
    pub kind: InputKind,
    pub action: Action,
    pub mods: Modifiers,
    pub cursor: Vector2<f32>,
    /// True from any mouse-button press until the next release
    pub drag: bool,
}

impl InputEvent {
    pub fn is_down(&self) -> bool {
        self.action != Action::Release
    }

    pub fn is_up(&self) -> bool {
        self.action == Action::Release
    }

    pub fn key(&self) -> Option<KeyCode> {
        match self.kind {
            InputKind::Key(code) => Some(code),
            _ => None,
        }
    }

    pub fn mouse_button(&self) -> Option<MouseButton> {
        match self.kind {
            InputKind::MouseButton(button) => Some(button),
            _ => None,
        }
    }
}

/// Anything that reacts to input events
pub trait InputListener {
    fn on_input(&mut self, event: &InputEvent);
}
