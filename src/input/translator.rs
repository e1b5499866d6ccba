use std::path::PathBuf;

use cgmath::{vec2, Vector2};
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use super::{Action, InputEvent, InputKind, Modifiers};

/// Pixels per scroll line when the platform reports pixel deltas
const PIXELS_PER_LINE: f32 = 20.0;

/// A file dropped onto the window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDrop(pub PathBuf);

/// Converts native window events into [`InputEvent`]s.
///
/// Owns the small amount of state the events are stamped with: cursor
/// position, modifier keys, window size and the drag flag.
#[derive(Debug, Clone)]
pub struct InputTranslator {
    window: WindowId,
    window_size: (u32, u32),
    cursor: Vector2<f32>,
    mods: Modifiers,
    drag: bool,
}

impl InputTranslator {
    pub fn new(window: WindowId, window_size: (u32, u32)) -> Self {
        Self {
            window,
            window_size,
            cursor: vec2(0.0, 0.0),
            mods: Modifiers::default(),
            drag: false,
        }
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    pub fn cursor(&self) -> Vector2<f32> {
        self.cursor
    }

    pub fn is_dragging(&self) -> bool {
        self.drag
    }

    pub fn set_window_size(&mut self, size: (u32, u32)) {
        self.window_size = size;
    }

    pub fn set_modifiers(&mut self, mods: Modifiers) {
        self.mods = mods;
    }

    /// Every input event carried by one native event. Most produce one; a key
    /// press that types text also produces a `Char` per character.
    pub fn translate(&mut self, event: &WindowEvent) -> Vec<InputEvent> {
        match event {
            WindowEvent::Resized(size) => {
                self.set_window_size((size.width, size.height));
                Vec::new()
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.set_modifiers(modifiers.state().into());
                Vec::new()
            }
            WindowEvent::CursorMoved { position, .. } => {
                vec![self.cursor_moved(position.x as f32, position.y as f32)]
            }
            WindowEvent::MouseInput { state, button, .. } => {
                vec![self.mouse_button(*button, action_of(*state, false))]
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let (x, y) = match delta {
                    MouseScrollDelta::LineDelta(x, y) => (*x, *y),
                    MouseScrollDelta::PixelDelta(p) => {
                        (p.x as f32 / PIXELS_PER_LINE, p.y as f32 / PIXELS_PER_LINE)
                    }
                };
                vec![self.scroll(x, y)]
            }
            WindowEvent::KeyboardInput { event, .. } => self.keyboard(event),
            _ => Vec::new(),
        }
    }

    fn keyboard(&mut self, event: &KeyEvent) -> Vec<InputEvent> {
        let mut out = Vec::new();
        if let PhysicalKey::Code(code) = event.physical_key {
            out.push(self.key(code, action_of(event.state, event.repeat)));
        }
        if event.state == ElementState::Pressed {
            if let Some(text) = &event.text {
                out.extend(
                    text.chars()
                        .filter(|c| !c.is_control())
                        .map(|c| self.char(c)),
                );
            }
        }
        out
    }

    /// The dropped path, if `event` is a file drop
    pub fn file_drop(event: &WindowEvent) -> Option<FileDrop> {
        match event {
            WindowEvent::DroppedFile(path) => Some(FileDrop(path.clone())),
            _ => None,
        }
    }

    pub fn cursor_moved(&mut self, x: f32, y: f32) -> InputEvent {
        self.cursor = vec2(x, y);
        self.stamp(InputKind::Cursor, Action::Release)
    }

    pub fn mouse_button(&mut self, button: MouseButton, action: Action) -> InputEvent {
        self.drag = action != Action::Release;
        self.stamp(InputKind::MouseButton(button), action)
    }

    pub fn key(&mut self, code: KeyCode, action: Action) -> InputEvent {
        self.stamp(InputKind::Key(code), action)
    }

    pub fn char(&mut self, c: char) -> InputEvent {
        self.stamp(InputKind::Char(c), Action::Release)
    }

    pub fn scroll(&mut self, x: f32, y: f32) -> InputEvent {
        self.stamp(InputKind::Scroll { x, y }, Action::Release)
    }

    fn stamp(&self, kind: InputKind, action: Action) -> InputEvent {
        InputEvent {
            window: self.window,
            window_size: self.window_size,
            kind,
            action,
            mods: self.mods,
            cursor: self.cursor,
            drag: self.drag,
        }
    }
}

fn action_of(state: ElementState, repeat: bool) -> Action {
    match (state, repeat) {
        (ElementState::Released, _) => Action::Release,
        (ElementState::Pressed, true) => Action::Repeat,
        (ElementState::Pressed, false) => Action::Press,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    fn translator() -> InputTranslator {
        InputTranslator::new(WindowId::from(1u64), (1280, 720))
    }

    #[test]
    fn test_drag_spans_press_to_release() {
        let mut input = translator();
        assert!(!input.cursor_moved(10.0, 10.0).drag);

        let press = input.mouse_button(MouseButton::Left, Action::Press);
        assert!(press.drag && press.is_down());

        let moved = input.cursor_moved(20.0, 15.0);
        assert!(moved.drag);
        assert_eq!(moved.cursor, vec2(20.0, 15.0));
        assert!(input.key(KeyCode::KeyW, Action::Press).drag);

        let release = input.mouse_button(MouseButton::Left, Action::Release);
        assert!(!release.drag && release.is_up());
        assert!(!input.cursor_moved(30.0, 15.0).drag);
    }

    #[test]
    fn test_events_carry_cursor_and_modifiers() {
        let mut input = translator();
        input.cursor_moved(4.0, 8.0);
        input.set_modifiers(Modifiers {
            shift: true,
            ..Modifiers::default()
        });

        let event = input.key(KeyCode::KeyA, Action::Repeat);
        assert_eq!(event.cursor, vec2(4.0, 8.0));
        assert!(event.mods.shift && !event.mods.control);
        assert!(event.is_down());
        assert_eq!(event.key(), Some(KeyCode::KeyA));
        assert_eq!(event.window, WindowId::from(1u64));
    }

    #[test]
    fn test_resize_updates_stamped_size() {
        let mut input = translator();
        assert!(input
            .translate(&WindowEvent::Resized(PhysicalSize::new(640, 480)))
            .is_empty());
        assert_eq!(input.char('x').window_size, (640, 480));
    }

    #[test]
    fn test_file_drop_is_separate() {
        let mut input = translator();
        let event = WindowEvent::DroppedFile(PathBuf::from("texture.png"));
        assert!(input.translate(&event).is_empty());
        assert_eq!(
            InputTranslator::file_drop(&event),
            Some(FileDrop(PathBuf::from("texture.png")))
        );
    }

    #[test]
    fn test_scroll_payload() {
        let mut input = translator();
        let event = input.scroll(0.0, -2.0);
        assert_eq!(event.kind, InputKind::Scroll { x: 0.0, y: -2.0 });
        assert!(event.mouse_button().is_none());
    }
}
