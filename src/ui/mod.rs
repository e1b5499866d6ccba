//! Immediate-mode overlay
//!
//! [`UiManager`] owns the ImGui context and draws it over the presented
//! frame. [`panel`] holds the light theme and the fixed side panel that
//! shows frame timing and the sculpting controls.

pub mod manager;
pub mod panel;

pub use manager::UiManager;
pub use panel::{sculpt_panel, PanelState};
