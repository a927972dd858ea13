//! Botcraft - terrain map viewer
//!
//! Loads or generates a tile map, synthesizes its mesh with compute kernels
//! and flies an orbit camera over it.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use botcraft::backend::{
    list_adapters, select_adapter, GraphicsBackend, SoftwareBackend, WgpuBackend,
};
use botcraft::camera::{CameraController, CameraEvent};
use botcraft::cli::Args;
use botcraft::error::FrameError;
use botcraft::map::Map;
use botcraft::params::{Configuration, Control};
use botcraft::rendering::TerrainRenderer;

/// Wheel rotation units per pixel of touchpad scrolling
const PIXELS_PER_WHEEL_UNIT: f32 = 20.0;

/// Main application state
struct App {
    config: Configuration,
    map: Map,

    // Window and rendering
    window: Option<Arc<Window>>,
    backend: Option<WgpuBackend>,
    renderer: Option<TerrainRenderer>,

    camera: CameraController,
    paused: bool,
    next_frame: Instant,
}

impl App {
    fn new(config: Configuration, map: Map) -> Self {
        let camera = CameraController::new(
            &config.camera,
            map.latitudinal_size(),
            map.longitudinal_size(),
        );
        Self {
            config,
            map,
            window: None,
            backend: None,
            renderer: None,
            camera,
            paused: false,
            next_frame: Instant::now(),
        }
    }

    fn aspect_ratio(&self) -> f32 {
        match &self.window {
            Some(window) => {
                let size = window.inner_size();
                size.width.max(1) as f32 / size.height.max(1) as f32
            }
            None => self.config.window.aspect_ratio(),
        }
    }

    fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        if !self.paused {
            // Resume without a catch-up jump
            self.camera.reset_clock();
            self.next_frame = Instant::now();
        }
        log::info!("{}", if self.paused { "Paused" } else { "Resumed" });
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode, state: ElementState) {
        if key == KeyCode::Escape && state == ElementState::Pressed {
            event_loop.exit();
            return;
        }
        let Some(control) = self.config.controls.control(key) else {
            return;
        };
        let pressed = state == ElementState::Pressed;
        if control == Control::PauseResume {
            if pressed {
                self.toggle_pause();
            }
            return;
        }
        self.camera.handle(CameraEvent::Control { control, pressed });
    }

    /// Render a single frame
    fn render_frame(&mut self, event_loop: &ActiveEventLoop) {
        self.camera.tick();
        let transformation = self.camera.transformation(self.aspect_ratio());

        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        match backend.begin_frame() {
            Ok(()) => {}
            Err(FrameError::Lost) | Err(FrameError::Timeout) => return,
            Err(FrameError::OutOfMemory) => {
                log::error!("Out of memory while acquiring a frame");
                event_loop.exit();
                return;
            }
        }
        if let Some(renderer) = &self.renderer {
            renderer.render(backend, &transformation);
        }
        backend.end_frame();
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.paused {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }
        let now = Instant::now();
        if now >= self.next_frame {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            self.next_frame = now + self.config.graphics.frame_interval();
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame));
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        let window_attributes = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(WgpuBackend::new(Arc::clone(&window), &self.config)) {
            Ok(mut backend) => {
                match TerrainRenderer::new(&mut backend, &self.config, &self.map) {
                    Ok(renderer) => self.renderer = Some(renderer),
                    // Known gap: the window stays open without a 3D view
                    Err(e) => log::error!("Terrain view unavailable: {}", e),
                }
                self.backend = Some(backend);
            }
            Err(e) => log::error!("Graphics device unavailable: {}", e),
        }

        log::info!("Botcraft is running, press ESC to quit");
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state,
                        physical_key: PhysicalKey::Code(key),
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, key, state),
            WindowEvent::MouseWheel { delta, .. } => {
                // Scrolling away from the user zooms in
                let rotation = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y,
                    MouseScrollDelta::PixelDelta(position) => {
                        -(position.y as f32) / PIXELS_PER_WHEEL_UNIT
                    }
                };
                self.camera.handle(CameraEvent::Wheel(rotation));
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.camera.handle(CameraEvent::Pointer {
                        x: position.x as f32,
                        y: position.y as f32,
                        width: size.width as f32,
                        height: size.height as f32,
                    });
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(backend) = self.backend.as_mut() {
                    backend.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if !self.paused {
                    self.render_frame(event_loop);
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Device resources go before the device itself
        if let (Some(renderer), Some(backend)) = (self.renderer.take(), self.backend.as_mut()) {
            renderer.dispose(backend);
        }
        self.backend = None;
    }
}

fn print_devices(config: &Configuration) {
    let adapters = list_adapters();
    if adapters.is_empty() {
        println!("No graphics adapters found");
        return;
    }
    let chosen = select_adapter(
        &adapters
            .iter()
            .cloned()
            .map(|mut adapter| {
                // Presentation can only be probed with a window
                adapter.presentable = true;
                adapter
            })
            .collect::<Vec<_>>(),
        &config.device,
        config.graphics.hardware_accelerated,
    );
    for (index, adapter) in adapters.iter().enumerate() {
        println!(
            "{} [{}] {} ({:?}), compute kernels: {}{}",
            if chosen == Some(index) { "*" } else { " " },
            adapter.platform,
            adapter.name,
            adapter.class,
            if adapter.compute { "yes" } else { "no" },
            if chosen == Some(index) { ", selected" } else { "" },
        );
    }
}

/// Build the mesh on the CPU and report what a frame would draw
fn run_headless(config: &Configuration, map: &Map) -> anyhow::Result<()> {
    let mut backend = SoftwareBackend::new();
    let renderer = TerrainRenderer::new(&mut backend, config, map)
        .context("failed to build the terrain mesh")?;

    let camera = CameraController::new(
        &config.camera,
        map.latitudinal_size(),
        map.longitudinal_size(),
    );
    backend
        .begin_frame()
        .map_err(|e| anyhow::anyhow!("frame unavailable: {}", e))?;
    renderer.render(&mut backend, &camera.transformation(config.window.aspect_ratio()));
    backend.end_frame();

    let normals = backend.read_shared(renderer.vertex_streams().normals);
    let upward = normals.chunks_exact(3).filter(|n| n[1] > 0.0).count();
    log::info!(
        "Mesh of {}x{} tiles: {} vertices ({} facing up), {} kernel dispatches, {} draw calls",
        map.latitudinal_size(),
        map.longitudinal_size(),
        renderer.vertex_count(),
        upward,
        backend.dispatches(),
        backend.draws().len()
    );

    renderer.dispose(&mut backend);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.configuration()?;

    if args.list_devices {
        print_devices(&config);
        return Ok(());
    }

    let map = args.map_source().build(&config.generation)?;
    log::info!(
        "Map of {}x{} tiles ready",
        map.latitudinal_size(),
        map.longitudinal_size()
    );
    if let Some(path) = &args.save {
        map.save(path)?;
    }

    if args.headless {
        return run_headless(&config, &map);
    }

    let mut app = App::new(config, map);
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.run_app(&mut app)?;
    Ok(())
}
