//! The fixed side panel and the theme it is drawn with

use imgui::{Condition, Style, StyleColor, StyleVar, WindowFlags};

use crate::performance::FrameMetrics;
use crate::sculpt::{BrushMode, SculptSettings, Solver};

const ACCENT: [f32; 3] = [0.90, 0.11, 0.05];
const TITLE_COLOR: [f32; 4] = [1.0, 1.0, 0.5, 1.0];

/// Light grey theme with a red accent
pub fn make_light_theme(style: &mut Style) {
    style.window_min_size = [160.0, 20.0];
    style.frame_padding = [4.0, 2.0];
    style.item_spacing = [6.0, 2.0];
    style.item_inner_spacing = [6.0, 4.0];
    style.alpha = 0.8;
    style.window_rounding = 0.0;
    style.frame_rounding = 0.0;
    style.indent_spacing = 4.0;
    style.columns_min_spacing = 50.0;
    style.grab_min_size = 14.0;
    style.grab_rounding = 4.0;
    style.scrollbar_size = 16.0;
    style.scrollbar_rounding = 2.0;

    let accent = |alpha: f32| [ACCENT[0], ACCENT[1], ACCENT[2], alpha];
    style[StyleColor::Text] = [0.0, 0.0, 0.0, 1.0];
    style[StyleColor::TextDisabled] = [0.6, 0.6, 0.6, 1.0];
    style[StyleColor::WindowBg] = [0.94, 0.94, 0.94, 1.0];
    style[StyleColor::ChildBg] = [0.0, 0.0, 0.0, 0.0];
    style[StyleColor::Border] = [0.0, 0.0, 0.0, 0.39];
    style[StyleColor::BorderShadow] = [1.0, 1.0, 1.0, 0.1];
    style[StyleColor::FrameBg] = [1.0, 1.0, 1.0, 1.0];
    style[StyleColor::FrameBgHovered] = accent(0.4);
    style[StyleColor::FrameBgActive] = accent(0.9);
    style[StyleColor::TitleBg] = [0.25, 0.25, 0.25, 1.0];
    style[StyleColor::TitleBgCollapsed] = [1.0, 1.0, 1.0, 0.51];
    style[StyleColor::TitleBgActive] = [0.82, 0.82, 0.82, 1.0];
    style[StyleColor::MenuBarBg] = [0.86, 0.86, 0.86, 1.0];
    style[StyleColor::ScrollbarBg] = [0.25, 0.25, 0.25, 0.53];
    style[StyleColor::ScrollbarGrab] = [0.69, 0.69, 0.69, 0.8];
    style[StyleColor::ScrollbarGrabHovered] = [0.49, 0.49, 0.49, 0.8];
    style[StyleColor::ScrollbarGrabActive] = [0.49, 0.49, 0.49, 1.0];
    style[StyleColor::CheckMark] = accent(1.0);
    style[StyleColor::SliderGrab] = accent(0.78);
    style[StyleColor::SliderGrabActive] = accent(1.0);
    style[StyleColor::Button] = accent(0.4);
    style[StyleColor::ButtonHovered] = accent(1.0);
    style[StyleColor::ButtonActive] = [0.06, 0.53, 0.25, 1.0];
}

/// An undecorated window pinned to `position` with a fixed `size`. The
/// name is repeated as a colored heading.
pub fn fixed_window<F: FnOnce()>(ui: &imgui::Ui, name: &str, position: [f32; 2], size: [f32; 2], build: F) {
    let _rounding = ui.push_style_var(StyleVar::WindowRounding(0.0));
    let _min_size = ui.push_style_var(StyleVar::WindowMinSize([0.0, 0.0]));
    ui.window(name)
        .position(position, Condition::Always)
        .size(size, Condition::Always)
        .flags(
            WindowFlags::NO_TITLE_BAR
                | WindowFlags::NO_RESIZE
                | WindowFlags::NO_MOVE
                | WindowFlags::NO_SAVED_SETTINGS,
        )
        .build(|| {
            ui.text_colored(TITLE_COLOR, name);
            ui.separator();
            build();
        });
}

/// What the side panel shows besides the editable settings
#[derive(Debug, Clone, Default)]
pub struct PanelState {
    pub metrics: FrameMetrics,
    /// Recent frame times in milliseconds
    pub frame_times: Vec<f32>,
    pub brush_active: bool,
    pub brush_scale: f32,
    pub vr: bool,
}

/// Frame timing and the sculpting controls. Returns true when a request to
/// reset the sculpted plane was made.
pub fn sculpt_panel(
    ui: &imgui::Ui,
    width: f32,
    state: &PanelState,
    settings: &mut SculptSettings,
) -> bool {
    let height = ui.io().display_size[1];
    if height <= 0.0 {
        return false;
    }

    let mut reset = false;
    fixed_window(ui, "gl-sculpting-kelvinlets", [0.0, 0.0], [width, height], || {
        let metrics = &state.metrics;
        ui.text(format!(
            "{:.3} ms/frame ({:.1} FPS)",
            metrics.frame_time_ms, metrics.fps
        ));
        if !state.frame_times.is_empty() {
            ui.plot_lines("##frame_times", &state.frame_times)
                .graph_size([width - 16.0, 40.0])
                .scale_min(0.0)
                .scale_max(50.0)
                .build();
        }
        if state.vr {
            ui.text("HMD connected");
        }
        ui.separator();

        let mut mode = BrushMode::ALL
            .iter()
            .position(|m| *m == settings.mode)
            .unwrap_or(0);
        let names = BrushMode::ALL.map(|m| m.name());
        if ui.combo_simple_string("Brush", &mut mode, &names) {
            settings.mode = BrushMode::ALL[mode];
        }

        ui.slider("Radius", 0.05, 2.0, &mut settings.radius);
        ui.slider("Stiffness", 0.1, 10.0, &mut settings.stiffness);
        ui.slider("Poisson ratio", 0.0, 0.49, &mut settings.compressibility);

        let mut solver = settings.solver.index();
        let mut max_error = settings.solver.max_error().unwrap_or(1e-3);
        let mut changed = ui.combo_simple_string("Solver", &mut solver, &Solver::NAMES);
        if settings.solver.max_error().is_some() {
            changed |= ui
                .input_float("Max error", &mut max_error)
                .display_format("%.5f")
                .build();
        }
        if changed {
            if let Some(next) = Solver::from_index(solver, max_error.max(1e-6)) {
                settings.solver = next;
            }
        }

        ui.separator();
        ui.text(format!(
            "Brush: {} (scale {:.2})",
            if state.brush_active { "down" } else { "up" },
            state.brush_scale
        ));
        ui.text_disabled("Left drag sculpts, scroll scales");
        ui.text_disabled("Right drag + WASDQE flies");
        reset = ui.button("Reset plane");
    });
    reset
}
