use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use glint_engine::{DisplaySurface, EngineError, Gpu, PathTraceKernel, RenderEngine};
use glint_math::CameraState;
use glint_scene::Scene;

const WINDOW_TITLE_PREFIX: &str = "glint";
const TITLE_REFRESH_MS: u64 = 200;
const SCENE_SPHERES: usize = 300;

/// Everything the render loop needs, built once the window exists.
struct Viewer {
    gpu: Arc<Gpu>,
    display: DisplaySurface,
    engine: RenderEngine<PathTraceKernel>,
    camera: CameraState,
}

impl Viewer {
    fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window)?;
        let gpu = Arc::new(Gpu::new(&instance, Some(&surface))?);

        let camera = CameraState::new(size.width, size.height);
        let kernel = PathTraceKernel::new(&gpu)?;
        let mut engine = RenderEngine::new(gpu.clone(), kernel, camera)?;
        let display = DisplaySurface::new(
            &gpu,
            surface,
            (size.width, size.height),
            engine.display_link(),
        )?;

        let scene = Scene::random(SCENE_SPHERES, rand::random());
        engine.init_scene(&scene)?;

        Ok(Self {
            gpu,
            display,
            engine,
            camera,
        })
    }
}

/// Application state
struct App {
    window: Option<Arc<Window>>,
    viewer: Option<Viewer>,

    // Input state
    left_mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
    last_title_update: Instant,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            viewer: None,
            left_mouse_pressed: false,
            last_mouse_pos: None,
            last_title_update: Instant::now(),
        }
    }

    /// Device faults have no retry policy: log and stop the loop.
    fn fail(event_loop: &ActiveEventLoop, context: &str, err: EngineError) {
        log::error!("{context}: {err}");
        event_loop.exit();
    }

    fn refresh_title(&mut self) {
        let elapsed = self.last_title_update.elapsed();
        if elapsed.as_millis() < u128::from(TITLE_REFRESH_MS) {
            return;
        }

        if let (Some(window), Some(viewer)) = (&self.window, &mut self.viewer) {
            let frames = viewer.engine.take_title_frames();
            let fps = frames as f32 / elapsed.as_secs_f32();
            let (width, height) = (viewer.camera.resolution.x, viewer.camera.resolution.y);
            window.set_title(&format!(
                "{WINDOW_TITLE_PREFIX}: {fps:.0} FPS @ {width} x {height}, passes: {}",
                viewer.engine.pass_counter()
            ));
        }
        self.last_title_update = Instant::now();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window_attrs = Window::default_attributes()
                .with_title(WINDOW_TITLE_PREFIX)
                .with_inner_size(winit::dpi::PhysicalSize::new(1280, 720));

            let window = match event_loop.create_window(window_attrs) {
                Ok(window) => Arc::new(window),
                Err(err) => {
                    log::error!("failed to create window: {err}");
                    event_loop.exit();
                    return;
                }
            };

            match Viewer::new(window.clone()) {
                Ok(viewer) => {
                    self.viewer = Some(viewer);
                    self.window = Some(window);
                    log::info!("window and renderer initialized");
                }
                Err(err) => {
                    log::error!("failed to initialize renderer: {err:#}");
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if physical_size.width == 0 || physical_size.height == 0 {
                    return;
                }
                if let Some(viewer) = &mut self.viewer {
                    viewer
                        .camera
                        .set_resolution(physical_size.width, physical_size.height);
                    let camera = viewer.camera;
                    if let Err(err) = viewer.engine.resize(camera) {
                        Self::fail(event_loop, "resize failed", err);
                        return;
                    }
                    viewer
                        .display
                        .resize(&viewer.gpu, (physical_size.width, physical_size.height));
                    log::info!(
                        "resized to {}x{}",
                        physical_size.width,
                        physical_size.height
                    );
                }
            }
            WindowEvent::MouseInput { button, state, .. } => {
                if button == MouseButton::Left {
                    self.left_mouse_pressed = state == ElementState::Pressed;
                    if !self.left_mouse_pressed {
                        self.last_mouse_pos = None;
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.left_mouse_pressed {
                    if let Some(last_pos) = self.last_mouse_pos {
                        let delta_x = position.x - last_pos.0;
                        let delta_y = position.y - last_pos.1;

                        if let Some(viewer) = &mut self.viewer {
                            let sensitivity = 0.005;
                            viewer.camera.orbit(
                                -delta_x as f32 * sensitivity,
                                -delta_y as f32 * sensitivity,
                            );
                            let camera = viewer.camera;
                            if let Err(err) = viewer.engine.update_camera(camera) {
                                Self::fail(event_loop, "camera update failed", err);
                                return;
                            }
                        }
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if let Some(viewer) = &mut self.viewer {
                    let scroll_amount = match delta {
                        winit::event::MouseScrollDelta::LineDelta(_, y) => y,
                        winit::event::MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                    };

                    viewer.camera.dolly(scroll_amount * 0.3);
                    let camera = viewer.camera;
                    if let Err(err) = viewer.engine.update_camera(camera) {
                        Self::fail(event_loop, "camera update failed", err);
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::KeyR),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if let Some(viewer) = &mut self.viewer {
                    let scene = Scene::random(SCENE_SPHERES, rand::random());
                    if let Err(err) = viewer.engine.init_scene(&scene) {
                        Self::fail(event_loop, "scene reload failed", err);
                        return;
                    }
                    if let Err(err) = viewer.engine.reset() {
                        Self::fail(event_loop, "accumulation reset failed", err);
                        return;
                    }
                    log::info!("scene reloaded");
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(viewer) = &mut self.viewer {
                    let frame = match viewer.engine.render_pass() {
                        Ok(frame) => frame,
                        Err(err) => {
                            Self::fail(event_loop, "render pass failed", err);
                            return;
                        }
                    };

                    match viewer.display.present(&viewer.gpu, &frame) {
                        Ok(()) => {}
                        Err(EngineError::Surface(wgpu::SurfaceError::Lost))
                        | Err(EngineError::Surface(wgpu::SurfaceError::Outdated)) => {
                            let size = viewer.display.size();
                            viewer.display.resize(&viewer.gpu, size);
                        }
                        Err(EngineError::Surface(wgpu::SurfaceError::Timeout)) => {
                            log::warn!("surface timeout, skipping frame");
                        }
                        Err(err) => {
                            Self::fail(event_loop, "present failed", err);
                            return;
                        }
                    }
                }

                self.refresh_title();

                // Progressive refinement: keep the passes coming
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("starting glint viewer");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}
