use std::time::Instant;

use cgmath::{Vector2, Zero};
use winit::{
    application::ApplicationHandler,
    event::{Event, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::KeyCode,
    window::WindowId,
};

use crate::config::{AppConfig, PANEL_WIDTH};
use crate::error::{AppError, GfxResult};
use crate::gfx::camera::FlyCamera;
use crate::gfx::device::{BufferUsage, RenderDevice, SharedDevice};
use crate::gfx::framebuffer::RenderTarget;
use crate::gfx::rendering::{Blit, FrameStatus, RenderEngine};
use crate::gfx::scene::{Scene, SceneObject};
use crate::gfx::texture::{Texture2D, TextureSetup};
use crate::input::{AppWindow, FileDrop, InputEvent, InputKind, InputListener};
use crate::performance::PerformanceMonitor;
use crate::sculpt::{BrushPose, Sculptor};
use crate::ui::{sculpt_panel, PanelState, UiManager};
use crate::vr::{Controller, Eye, Hand, Hmd, VrRuntime};

const BRUSH_DEPTH_STEP: f32 = 0.05;
const BRUSH_SCALE_STEP: f32 = 0.1;
const MIN_BRUSH_SCALE: f32 = 0.1;
const MAX_BRUSH_SCALE: f32 = 10.0;

/// Mouse state steering the desktop brush.
///
/// Left drag moves the brush over the plane `z = depth`; scrolling grows or
/// shrinks it, and with Shift held pushes it in or out of the plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushInput {
    pub held: bool,
    pub cursor: Vector2<f32>,
    pub depth: f32,
    pub scale: f32,
}

impl Default for BrushInput {
    fn default() -> Self {
        Self {
            held: false,
            cursor: Vector2::zero(),
            depth: 0.0,
            scale: 1.0,
        }
    }
}

impl InputListener for BrushInput {
    fn on_input(&mut self, event: &InputEvent) {
        self.cursor = event.cursor;
        match event.kind {
            InputKind::MouseButton(MouseButton::Left) => self.held = event.is_down(),
            InputKind::Scroll { y, .. } if event.mods.shift => {
                self.depth += y * BRUSH_DEPTH_STEP;
            }
            InputKind::Scroll { y, .. } => {
                self.scale = (self.scale * (1.0 + BRUSH_SCALE_STEP * y))
                    .clamp(MIN_BRUSH_SCALE, MAX_BRUSH_SCALE);
            }
            _ => {}
        }
    }
}

/// Brush pose under the mouse, while the left button drags and the camera is
/// not being steered
fn desktop_brush(
    camera: &FlyCamera,
    brush: &BrushInput,
    window_size: (u32, u32),
    time: f32,
) -> Option<BrushPose> {
    if !brush.held || camera.is_looking() {
        return None;
    }
    let hit = camera
        .screen_ray(brush.cursor, window_size)?
        .intersect_plane_z(brush.depth)?;
    Some(BrushPose {
        scale: brush.scale,
        ..BrushPose::new(hit, time)
    })
}

/// Brush pose of a tracked controller holding its trigger
fn controller_brush(controller: &Controller, scale: f32, time: f32) -> Option<BrushPose> {
    if !(controller.tracked && controller.trigger) {
        return None;
    }
    Some(BrushPose {
        orientation: controller.pose.orientation,
        scale,
        ..BrushPose::new(controller.pose.position, time)
    })
}

/// Starts, continues or ends a stroke on the scene's sculpt target
fn apply_stroke(
    sculptor: &mut Sculptor,
    scene: &mut Scene,
    pose: Option<BrushPose>,
) -> GfxResult<bool> {
    let Some(pose) = pose else {
        if sculptor.is_active() {
            sculptor.end();
        }
        return Ok(false);
    };
    if !sculptor.is_active() {
        sculptor.begin(pose);
        return Ok(false);
    }
    let Some(target) = scene.sculpt_target_mut() else {
        return Ok(false);
    };
    if !sculptor.stroke(pose, &mut target.geometry.vertices) {
        return Ok(false);
    }
    target.refresh()?;
    Ok(true)
}

/// Headset plus the per-eye targets and controller objects it renders
struct VrSession {
    hmd: Hmd,
    eyes: [RenderTarget; 2],
    controllers: [usize; 2],
}

impl VrSession {
    fn new(device: &SharedDevice, hmd: Hmd, scene: &mut Scene) -> GfxResult<Self> {
        let (width, height) = hmd.render_target_size();
        let eyes = [
            RenderTarget::new(device, width, height)?,
            RenderTarget::new(device, width, height)?,
        ];

        let model = hmd.controller_model();
        let mut add_controller = |name: &str| -> GfxResult<usize> {
            let mut texture = Texture2D::new(device);
            texture.setup(
                &TextureSetup::rgba8(model.texture_width, model.texture_height, Some(&model.rgba))
                    .with_mipmaps(true),
            )?;
            let mut object =
                SceneObject::new(device, name, model.geometry.clone(), BufferUsage::Static)?;
            object.texture = Some(texture);
            object.visible = false;
            Ok(scene.add_object(object))
        };
        let controllers = [
            add_controller("Left Controller")?,
            add_controller("Right Controller")?,
        ];

        Ok(Self {
            hmd,
            eyes,
            controllers,
        })
    }

    fn place_controllers(&self, scene: &mut Scene) {
        for (hand, index) in [Hand::Left, Hand::Right].into_iter().zip(self.controllers) {
            let controller = self.hmd.controller(hand);
            if let Some(object) = scene.objects.get_mut(index) {
                object.visible = controller.tracked;
                object.model = controller.pose.matrix();
            }
        }
    }

    fn submit(&mut self) -> GfxResult<()> {
        let left = self.eyes[0].color.handle()?;
        let right = self.eyes[1].color.handle()?;
        if let Err(e) = self.hmd.submit(left, right) {
            log::error!("VR submit failed: {e}");
        }
        Ok(())
    }
}

/// Everything that only exists once the window is up
struct Context {
    window: AppWindow,
    engine: RenderEngine,
    ui: UiManager,
    scene: Scene,
    blit: Blit,
    vr: Option<VrSession>,
}

impl Context {
    fn new(
        event_loop: &ActiveEventLoop,
        config: &AppConfig,
        vr_runtime: Option<Box<dyn VrRuntime>>,
    ) -> Result<Self, AppError> {
        let window = AppWindow::create(event_loop, &config.title, config.width, config.height)?;
        let (width, height) = window.size();

        let engine = pollster::block_on(RenderEngine::new(window.window().clone(), width, height))?;
        let device = engine.device().clone();

        let ui = UiManager::new(
            engine.wgpu_device().raw_device(),
            engine.wgpu_device().queue(),
            engine.surface_format(),
            window.window(),
        );

        let mut scene = Scene::new(&device, config)?;
        let blit = Blit::new(&device)?;

        let vr = match vr_runtime {
            Some(runtime) => {
                let hmd = Hmd::new(runtime, &config.model_load)?;
                Some(VrSession::new(&device, hmd, &mut scene)?)
            }
            None => None,
        };

        log::info!(
            "{} ready: {}x{}, objects {:?}",
            config.title,
            width,
            height,
            scene.get_object_names()
        );

        Ok(Self {
            window,
            engine,
            ui,
            scene,
            blit,
            vr,
        })
    }
}

pub struct GfxApp {
    state: AppState,
}

struct AppState {
    config: AppConfig,
    vr_runtime: Option<Box<dyn VrRuntime>>,
    context: Option<Context>,
    camera: FlyCamera,
    brush: BrushInput,
    sculptor: Sculptor,
    monitor: PerformanceMonitor,
    start: Instant,
    last_update: Instant,
    error: Option<AppError>,
}

impl GfxApp {
    pub fn new(config: AppConfig) -> Self {
        let camera = FlyCamera::new(
            config.camera_position,
            config.yfov,
            config.near_clip,
            config.far_clip,
        );
        let sculptor = Sculptor::new(config.sculpt);
        let now = Instant::now();
        Self {
            state: AppState {
                config,
                vr_runtime: None,
                context: None,
                camera,
                brush: BrushInput::default(),
                sculptor,
                monitor: PerformanceMonitor::new(),
                start: now,
                last_update: now,
                error: None,
            },
        }
    }

    /// Renders both eyes of `runtime` and sculpts with its right controller
    pub fn with_vr(mut self, runtime: Box<dyn VrRuntime>) -> Self {
        self.state.vr_runtime = Some(runtime);
        self
    }

    /// Runs the event loop until the window closes. Initialization failures
    /// end the loop and are returned here.
    pub fn run(mut self) -> Result<(), AppError> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self.state)?;

        match self.state.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl AppState {
    fn redraw(&mut self) -> GfxResult<()> {
        let Some(ctx) = self.context.as_mut() else {
            return Ok(());
        };

        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;
        let time = now.duration_since(self.start).as_secs_f32();

        self.camera.update(dt);

        let pose = match ctx.vr.as_mut() {
            Some(vr) => {
                if let Err(e) = vr.hmd.update() {
                    log::error!("VR update failed: {e}");
                }
                vr.place_controllers(&mut ctx.scene);
                controller_brush(vr.hmd.controller(Hand::Right), self.brush.scale, time)
            }
            None => desktop_brush(&self.camera, &self.brush, ctx.window.size(), time),
        };
        apply_stroke(&mut self.sculptor, &mut ctx.scene, pose)?;

        let device = ctx.engine.device().clone();
        let clear = Some(self.config.clear_color);
        match ctx.vr.as_ref() {
            Some(vr) => {
                let (near, far) = (self.config.near_clip, self.config.far_clip);
                for (eye, target) in [Eye::Left, Eye::Right].into_iter().zip(&vr.eyes) {
                    target.framebuffer.bind()?;
                    device.clear(clear, Some(1.0));
                    ctx.scene.draw(vr.hmd.eye_view_proj(eye, near, far))?;
                }
                device.bind_framebuffer(None);
                device.clear(clear, Some(1.0));
                ctx.blit.draw(&vr.eyes[0].color)?;
            }
            None => {
                let (width, height) = ctx.window.size();
                device.bind_framebuffer(None);
                device.clear(clear, Some(1.0));
                let aspect = width as f32 / height.max(1) as f32;
                ctx.scene.draw(self.camera.view_proj_matrix(aspect))?;
            }
        }

        self.monitor.tick();
        let panel = PanelState {
            metrics: self.monitor.metrics(),
            frame_times: self.monitor.frame_time_history(),
            brush_active: self.sculptor.is_active(),
            brush_scale: self.brush.scale,
            vr: ctx.vr.is_some(),
        };
        let settings = &mut self.sculptor.settings;
        let window = ctx.window.window().clone();
        let ui = &mut ctx.ui;
        let mut reset = false;
        let status = ctx.engine.render_frame(|device, queue, encoder, view| {
            ui.update_logic(&window, |frame| {
                reset = sculpt_panel(frame, PANEL_WIDTH, &panel, settings);
            });
            ui.render_display_only(device, queue, encoder, view);
        });

        if status == FrameStatus::Presented {
            if let Some(vr) = ctx.vr.as_mut() {
                vr.submit()?;
            }
        }
        if reset {
            self.sculptor.end();
            ctx.scene.reset_sculpt_target(&self.config)?;
        }
        Ok(())
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.context.is_some() {
            return;
        }
        match Context::new(event_loop, &self.config, self.vr_runtime.take()) {
            Ok(ctx) => {
                ctx.window.request_redraw();
                self.context = Some(ctx);
            }
            Err(e) => {
                log::error!("initialization failed: {e}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(ctx) = self.context.as_mut() else {
            return;
        };

        // UI first; releases still reach the scene so no button stays stuck
        let ui_event: Event<()> = Event::WindowEvent {
            window_id,
            event: event.clone(),
        };
        let captured = ctx.ui.handle_input(ctx.window.window(), &ui_event);
        let input = ctx.window.handle(&event);
        let events: Vec<InputEvent> = if captured {
            input.events.into_iter().filter(InputEvent::is_up).collect()
        } else {
            input.events
        };

        if events
            .iter()
            .any(|e| e.key() == Some(KeyCode::Escape) && e.is_down())
        {
            event_loop.exit();
            return;
        }
        AppWindow::dispatch(&events, &mut [&mut self.camera, &mut self.brush]);

        if let Some(FileDrop(path)) = input.dropped {
            match Texture2D::load_image(ctx.engine.device(), &path) {
                Ok(texture) => {
                    log::info!(
                        "loaded {} ({}x{})",
                        path.display(),
                        texture.width(),
                        texture.height()
                    );
                    ctx.scene.set_texture(texture);
                }
                Err(e) => log::error!("{e}"),
            }
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => ctx.engine.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    log::error!("frame failed: {e}");
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ctx) = self.context.as_ref() {
            ctx.window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::recording::{DeviceCall, RecordingDevice};
    use crate::input::{Action, InputTranslator, Modifiers};
    use crate::math::Pose;
    use cgmath::{vec3, Quaternion, Rotation3, Rad};

    fn translator() -> InputTranslator {
        InputTranslator::new(WindowId::from(1u64), (800, 600))
    }

    #[test]
    fn test_brush_input_follows_left_button() {
        let mut brush = BrushInput::default();
        let mut input = translator();
        input.cursor_moved(100.0, 200.0);

        brush.on_input(&input.mouse_button(MouseButton::Left, Action::Press));
        assert!(brush.held);
        assert_eq!(brush.cursor, Vector2::new(100.0, 200.0));

        brush.on_input(&input.mouse_button(MouseButton::Right, Action::Release));
        assert!(brush.held);
        brush.on_input(&input.mouse_button(MouseButton::Left, Action::Release));
        assert!(!brush.held);
    }

    #[test]
    fn test_scroll_scales_and_shift_scroll_pushes() {
        let mut brush = BrushInput::default();
        let mut input = translator();

        brush.on_input(&input.scroll(0.0, 2.0));
        assert!((brush.scale - 1.2).abs() < 1e-6);
        assert_eq!(brush.depth, 0.0);

        input.set_modifiers(Modifiers {
            shift: true,
            ..Default::default()
        });
        brush.on_input(&input.scroll(0.0, -2.0));
        assert!((brush.depth + 0.1).abs() < 1e-6);
        assert!((brush.scale - 1.2).abs() < 1e-6);

        input.set_modifiers(Modifiers::default());
        for _ in 0..100 {
            brush.on_input(&input.scroll(0.0, -5.0));
        }
        assert_eq!(brush.scale, MIN_BRUSH_SCALE);
    }

    #[test]
    fn test_desktop_brush_hits_plane_under_cursor() {
        let camera = FlyCamera::new(vec3(0.0, 0.0, 5.0), 1.0, 0.1, 100.0);
        let mut brush = BrushInput {
            cursor: Vector2::new(400.0, 300.0),
            ..Default::default()
        };
        assert!(desktop_brush(&camera, &brush, (800, 600), 0.0).is_none());

        brush.held = true;
        brush.scale = 2.0;
        let pose = desktop_brush(&camera, &brush, (800, 600), 1.5).unwrap();
        assert!(pose.position.x.abs() < 1e-3 && pose.position.y.abs() < 1e-3);
        assert!(pose.position.z.abs() < 1e-3);
        assert_eq!(pose.scale, 2.0);
        assert_eq!(pose.time, 1.5);

        brush.depth = 1.0;
        let pose = desktop_brush(&camera, &brush, (800, 600), 1.5).unwrap();
        assert!((pose.position.z - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_controller_brush_needs_trigger_and_tracking() {
        let orientation = Quaternion::from_angle_y(Rad(0.5));
        let mut controller = Controller {
            pose: Pose::new(orientation, vec3(1.0, 2.0, 3.0)),
            trigger: true,
            tracked: false,
        };
        assert!(controller_brush(&controller, 1.0, 0.0).is_none());

        controller.tracked = true;
        let pose = controller_brush(&controller, 0.5, 2.0).unwrap();
        assert_eq!(pose.position, vec3(1.0, 2.0, 3.0));
        assert_eq!(pose.orientation, orientation);
        assert_eq!(pose.scale, 0.5);

        controller.trigger = false;
        assert!(controller_brush(&controller, 1.0, 0.0).is_none());
    }

    #[test]
    fn test_stroke_lifecycle_uploads_moved_plane() {
        let (recorder, device) = RecordingDevice::shared();
        let config = AppConfig::default().with_plane(2.0, 2);
        let mut scene = Scene::new(&device, &config).unwrap();
        let mut sculptor = Sculptor::default();
        let uploads = || recorder.count(|c| matches!(c, DeviceCall::BufferSubData { .. }));

        let at = |z: f32, time: f32| Some(BrushPose::new(vec3(0.0, 0.0, z), time));

        assert!(!apply_stroke(&mut sculptor, &mut scene, at(0.0, 0.0)).unwrap());
        assert!(sculptor.is_active());
        assert_eq!(uploads(), 0);

        assert!(apply_stroke(&mut sculptor, &mut scene, at(0.2, 0.1)).unwrap());
        assert_eq!(uploads(), 1);
        // The plane's center vertices sit under the brush tip and follow it
        let vertices = &scene.sculpt_target().unwrap().geometry.vertices;
        assert!(vertices.iter().any(|v| v.z > 0.1));

        assert!(!apply_stroke(&mut sculptor, &mut scene, None).unwrap());
        assert!(!sculptor.is_active());
        assert_eq!(uploads(), 1);
    }
}
