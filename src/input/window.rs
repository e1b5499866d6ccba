use std::sync::Arc;

use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

use super::{FileDrop, InputEvent, InputListener, InputTranslator};
use crate::error::AppError;

/// Everything one native window event turned into
#[derive(Debug, Default)]
pub struct WindowInput {
    pub events: Vec<InputEvent>,
    pub dropped: Option<FileDrop>,
}

/// The native window plus the input state it stamps onto events
pub struct AppWindow {
    window: Arc<Window>,
    input: InputTranslator,
}

impl AppWindow {
    pub fn create(
        event_loop: &ActiveEventLoop,
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, AppError> {
        let window = event_loop.create_window(
            WindowAttributes::default()
                .with_title(title)
                .with_inner_size(LogicalSize::new(width, height))
                .with_resizable(false),
        )?;
        let window = Arc::new(window);
        let size = window.inner_size();
        let input = InputTranslator::new(window.id(), (size.width, size.height));
        Ok(Self { window, input })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn size(&self) -> (u32, u32) {
        self.input.window_size()
    }

    pub fn input(&self) -> &InputTranslator {
        &self.input
    }

    /// Translates a native event
    pub fn handle(&mut self, event: &WindowEvent) -> WindowInput {
        WindowInput {
            events: self.input.translate(event),
            dropped: InputTranslator::file_drop(event),
        }
    }

    /// Delivers each event to every listener, in order
    pub fn dispatch(events: &[InputEvent], listeners: &mut [&mut dyn InputListener]) {
        for event in events {
            for listener in listeners.iter_mut() {
                listener.on_input(event);
            }
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}
