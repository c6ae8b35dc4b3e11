use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, anyhow};
use clap::Parser;
use glam::Vec2;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use lineart::config::{ViewerArgs, init_tracing};
use lineart::import::{LoadInput, LoadOutcome, ModelLoader, ModelSource, ModelType};
use lineart::renderer::capture::save_png;
use lineart::renderer::{Camera, GpuState, PendingCapture};
use lineart::scene::demo::demo_scene;
use lineart::ui::{
    PanelStatus, UiActions, apply_theme, draw_drop_hint, draw_help_overlay, draw_loading_overlay,
    draw_side_panel,
};
use lineart::viewer::{FrameLoop, Stage, StyleParams};

#[derive(Default)]
struct InputState {
    orbiting: bool,
    panning: bool,
    cursor: Option<Vec2>,
    orbit_delta: Vec2,
    pan_delta: Vec2,
    hovering_files: bool,
}

struct App {
    args: ViewerArgs,

    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    egui_state: Option<egui_winit::State>,
    egui_renderer: Option<egui_wgpu::Renderer>,
    egui_ctx: egui::Context,

    camera: Camera,
    style: StyleParams,
    stage: Stage,
    frame_loop: FrameLoop,
    loader: ModelLoader,
    input: InputState,

    /// Paths from drop events not yet handed to the loader.
    pending_drops: Vec<PathBuf>,
    /// The last dropped batch, reloaded when the model type changes.
    last_drop: Option<Vec<PathBuf>>,
    load_error: Option<String>,
    notice: Option<String>,
    snapshot_requested: bool,

    frame_count: u32,
    fps_timer: Instant,
    fps: f32,

    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(args: ViewerArgs) -> Self {
        let style = args.initial_style();
        let mut camera = Camera::default();
        camera.set_fov_degrees(style.fov());

        let mut app = Self {
            args,
            window: None,
            gpu: None,
            egui_state: None,
            egui_renderer: None,
            egui_ctx: egui::Context::default(),
            camera,
            style,
            stage: Stage::new(),
            frame_loop: FrameLoop::new(),
            loader: ModelLoader::new(),
            input: InputState::default(),
            pending_drops: Vec::new(),
            last_drop: None,
            load_error: None,
            notice: None,
            snapshot_requested: false,
            frame_count: 0,
            fps_timer: Instant::now(),
            fps: 0.0,
            fatal: None,
        };
        app.request_initial_model();
        app
    }

    fn request_initial_model(&mut self) {
        let threshold = self.style.threshold();
        match self.args.model.clone() {
            Some(path) if path.is_dir() => {
                info!(path = %path.display(), "opening model folder");
                self.last_drop = Some(vec![path.clone()]);
                self.loader
                    .request(LoadInput::Dropped(vec![path]), self.style.model_type(), threshold);
            }
            Some(path) => {
                let model_type = ModelType::from_path(&path).unwrap_or(self.style.model_type());
                info!(path = %path.display(), %model_type, "opening model");
                self.loader
                    .request(LoadInput::Source(ModelSource::File(path)), model_type, threshold);
            }
            None => {
                self.loader.request(
                    LoadInput::Scene {
                        name: "demo".into(),
                        scene: demo_scene(),
                    },
                    self.style.model_type(),
                    threshold,
                );
            }
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> anyhow::Result<()> {
        let gpu = pollster::block_on(GpuState::new(window.clone())).context("GPU initialisation failed")?;

        let egui_state = egui_winit::State::new(
            self.egui_ctx.clone(),
            self.egui_ctx.viewport_id(),
            &window,
            Some(window.scale_factor() as f32),
            None,
            Some(2048),
        );

        let egui_renderer = egui_wgpu::Renderer::new(&gpu.device, gpu.config.format, None, 1, false);

        apply_theme(&self.egui_ctx);

        self.window = Some(window);
        self.gpu = Some(gpu);
        self.egui_state = Some(egui_state);
        self.egui_renderer = Some(egui_renderer);
        Ok(())
    }

    fn flush_drops(&mut self) {
        if self.pending_drops.is_empty() {
            return;
        }
        let paths = std::mem::take(&mut self.pending_drops);
        info!(count = paths.len(), model_type = %self.style.model_type(), "loading dropped items");
        self.last_drop = Some(paths.clone());
        self.notice = None;
        self.loader
            .request(LoadInput::Dropped(paths), self.style.model_type(), self.style.threshold());
    }

    fn apply_load_outcomes(&mut self) {
        while let Some(outcome) = self.loader.try_recv() {
            match outcome {
                LoadOutcome::Loaded(model) => {
                    let report = self.stage.attach(*model);
                    debug!(disposed = report.disposed, "replaced model");
                    self.load_error = None;
                    self.frame_loop.reset_recenter();
                    // the slider may have moved while the load was running
                    self.stage.rebuild_hard_edges(self.style.threshold());
                }
                LoadOutcome::Failed { generation, error } => {
                    warn!(generation, "keeping current model: {error}");
                    self.load_error = Some(error.to_string());
                }
            }
        }
    }

    fn update(&mut self) {
        self.frame_count += 1;
        let elapsed = self.fps_timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            self.fps = self.frame_count as f32 / elapsed;
            self.frame_count = 0;
            self.fps_timer = Instant::now();
        }

        self.apply_load_outcomes();

        let Some(gpu) = &self.gpu else { return };
        let resolution = Vec2::new(gpu.config.width as f32, gpu.config.height as f32);

        if self.input.orbit_delta != Vec2::ZERO {
            self.camera.process_mouse_movement(self.input.orbit_delta);
        }
        if self.input.pan_delta != Vec2::ZERO {
            self.camera.process_pan(self.input.pan_delta, resolution.y);
        }
        self.input.orbit_delta = Vec2::ZERO;
        self.input.pan_delta = Vec2::ZERO;
    }

    fn render(&mut self) {
        let (Some(window), Some(egui_state)) = (&self.window, &mut self.egui_state) else {
            return;
        };

        let raw_input = egui_state.take_egui_input(window);

        let mut edit = self.style.edit();
        let previous_type = edit.model_type;
        let variants = self.stage.variants();
        let status = PanelStatus {
            model_name: self.stage.name(),
            triangles: self.stage.triangle_count(),
            hard_edges: variants.map_or(0, |v| v.hard_edge_count()),
            conditional_edges: variants.map_or(0, |v| v.conditional_edge_count()),
            fps: self.fps,
            loading: self.loader.is_loading(),
            error: self.load_error.as_deref(),
            notice: self.notice.as_deref(),
            capture_supported: self.gpu.as_ref().is_some_and(GpuState::capture_supported),
        };
        let hovering = self.input.hovering_files;

        let mut ui_actions = UiActions::default();
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            ui_actions = draw_side_panel(ctx, &mut edit, &status);
            draw_help_overlay(ctx);
            if status.loading {
                draw_loading_overlay(ctx);
            } else if hovering {
                draw_drop_hint(ctx, edit.model_type);
            }
        });

        self.handle_ui_actions(ui_actions);

        let Some(gpu) = &self.gpu else { return };
        let resolution = Vec2::new(gpu.config.width as f32, gpu.config.height as f32);
        self.frame_loop.tick_with_edit(
            &mut self.stage,
            &mut self.style,
            edit,
            &mut self.camera,
            resolution,
        );
        if self.style.model_type() != previous_type {
            self.reload_last_drop();
        }

        let Some(gpu) = &mut self.gpu else { return };
        let Some(window) = &self.window else { return };
        let Some(egui_state) = &mut self.egui_state else {
            return;
        };
        let Some(egui_renderer) = &mut self.egui_renderer else {
            return;
        };

        egui_state.handle_platform_output(window, full_output.platform_output);

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.reconfigure();
                return;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("out of GPU memory, skipping frame");
                return;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        gpu.sync_stage(&self.stage);
        gpu.update_camera(&self.camera);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        for (id, delta) in full_output.textures_delta.set {
            egui_renderer.update_texture(&gpu.device, &gpu.queue, id, &delta);
        }

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Main Encoder"),
            });

        egui_renderer.update_buffers(
            &gpu.device,
            &gpu.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        gpu.render_stage(&view, &mut encoder, &self.stage);

        // The snapshot is taken before the panel is drawn over the canvas.
        let capture = if std::mem::take(&mut self.snapshot_requested) {
            match PendingCapture::record(&gpu.device, &mut encoder, &output.texture) {
                Ok(pending) => Some(pending),
                Err(e) => {
                    warn!("snapshot unavailable: {e}");
                    self.load_error = Some(e.to_string());
                    None
                }
            }
        } else {
            None
        };

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut render_pass = render_pass.forget_lifetime();
            egui_renderer.render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in full_output.textures_delta.free {
            egui_renderer.free_texture(&id);
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));

        if let Some(pending) = capture {
            let saved = pending
                .finish(&gpu.device)
                .and_then(|image| save_png(&image, &self.args.snapshot));
            match saved {
                Ok(()) => self.notice = Some(format!("Saved {}", self.args.snapshot.display())),
                Err(e) => {
                    warn!("snapshot failed: {e}");
                    self.load_error = Some(e.to_string());
                }
            }
        }

        output.present();
        window.request_redraw();
    }

    fn reload_last_drop(&mut self) {
        let Some(paths) = self.last_drop.clone() else {
            return;
        };
        info!(model_type = %self.style.model_type(), "reloading last drop");
        self.loader
            .request(LoadInput::Dropped(paths), self.style.model_type(), self.style.threshold());
    }

    fn handle_ui_actions(&mut self, actions: UiActions) {
        if actions.download {
            self.snapshot_requested = true;
        }
        if actions.reset_camera {
            self.camera.reset();
            self.frame_loop.reset_recenter();
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::KeyR => {
                self.camera.reset();
                self.frame_loop.reset_recenter();
            }
            KeyCode::KeyL => {
                let mut edit = self.style.edit();
                edit.use_shader = !edit.use_shader;
                self.style.apply(edit);
            }
            _ => {}
        }
    }

    fn handle_cursor(&mut self, position: Vec2) {
        if let Some(previous) = self.input.cursor.replace(position) {
            let delta = position - previous;
            if self.input.orbiting {
                self.input.orbit_delta += delta;
            } else if self.input.panning {
                self.input.pan_delta += delta;
            }
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.loader.stop();
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window_attrs = Window::default_attributes()
            .with_title("Line Art Viewer")
            .with_inner_size(PhysicalSize::new(1600, 900));

        let started = event_loop
            .create_window(window_attrs)
            .map_err(|e| anyhow!("failed to create window: {e}"))
            .and_then(|window| self.init_gpu(Arc::new(window)));
        if let Err(e) = started {
            error!("{e:#}");
            self.fatal = Some(e);
            self.shutdown(event_loop);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(egui_state) = &mut self.egui_state {
            if let Some(window) = &self.window {
                let response = egui_state.on_window_event(window, &event);
                if response.consumed {
                    return;
                }
            }
        }

        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),

            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(size);
                    self.camera.set_aspect(size.width as f32, size.height as f32);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let (PhysicalKey::Code(key), ElementState::Pressed) = (event.physical_key, event.state) {
                    if !self.egui_ctx.wants_keyboard_input() {
                        self.handle_key(key);
                    }
                }
            }

            WindowEvent::MouseInput { button, state, .. } => {
                let pressed = state == ElementState::Pressed;
                let free = !pressed || !self.egui_ctx.wants_pointer_input();
                match button {
                    MouseButton::Left if free => self.input.orbiting = pressed,
                    MouseButton::Right | MouseButton::Middle if free => self.input.panning = pressed,
                    _ => {}
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.handle_cursor(Vec2::new(position.x as f32, position.y as f32));
            }

            WindowEvent::CursorLeft { .. } => {
                self.input.cursor = None;
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    winit::event::MouseScrollDelta::LineDelta(_, y) => y,
                    winit::event::MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 50.0,
                };
                self.camera.process_scroll(scroll);
            }

            WindowEvent::HoveredFile(_) => self.input.hovering_files = true,
            WindowEvent::HoveredFileCancelled => self.input.hovering_files = false,
            WindowEvent::DroppedFile(path) => {
                self.input.hovering_files = false;
                self.pending_drops.push(path);
            }

            WindowEvent::RedrawRequested => {
                self.update();
                self.render();
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        // every file of one drop arrives in the same event batch
        self.flush_drops();
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = ViewerArgs::parse();
    init_tracing(args.verbose, args.quiet);

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(args);
    event_loop.run_app(&mut app).context("event loop failed")?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
