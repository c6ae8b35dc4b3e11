use std::sync::Arc;

use tracing::{debug, info};

use crate::error::GpuError;
use crate::renderer::buffers::{
    LineBuffers, MeshBuffers, SurfaceUniform, conditional_instance_layout, mesh_vertex_layout,
    segment_instance_layout,
};
use crate::renderer::camera::{Camera, CameraUniform};
use crate::viewer::{ModelVariants, Stage, VariantContent};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Lines on the surface must win against the background fill.
const BACKGROUND_DEPTH_BIAS: wgpu::DepthBiasState = wgpu::DepthBiasState {
    constant: 1,
    slope_scale: 1.0,
    clamp: 0.0,
};

/// GPU copies of the variants of the displayed model.
pub struct GpuModel {
    textured: Vec<MeshBuffers>,
    background: Option<MeshBuffers>,
    hard_edges: Option<LineBuffers>,
    conditional: Option<LineBuffers>,
    content_revision: u64,
    edges_revision: u64,
}

impl GpuModel {
    fn upload(gpu: &GpuState, variants: &ModelVariants, stage: &Stage) -> Self {
        let mut model = Self {
            textured: Vec::new(),
            background: None,
            hard_edges: None,
            conditional: None,
            content_revision: stage.content_revision(),
            edges_revision: stage.edges_revision(),
        };

        if let VariantContent::Textured(parts) = &variants.textured.content {
            model.textured = parts
                .iter()
                .map(|part| {
                    MeshBuffers::new(
                        &gpu.device,
                        &gpu.queue,
                        &gpu.material_bind_group_layout,
                        &part.mesh,
                        SurfaceUniform::lit(part.base_color),
                        "Textured Vertex Buffer",
                    )
                })
                .collect();
        }
        if let VariantContent::Background(part) = &variants.background.content {
            model.background = Some(MeshBuffers::new(
                &gpu.device,
                &gpu.queue,
                &gpu.material_bind_group_layout,
                &part.mesh,
                SurfaceUniform::flat(part.base_color),
                "Background Vertex Buffer",
            ));
        }
        model.hard_edges = Self::upload_hard_edges(gpu, variants);
        if let VariantContent::ConditionalEdges { segments, .. } = &variants.conditional.content {
            model.conditional = Some(LineBuffers::new(
                &gpu.device,
                &gpu.queue,
                &gpu.material_bind_group_layout,
                segments,
                "Conditional Edge Instance Buffer",
            ));
        }
        model
    }

    fn upload_hard_edges(gpu: &GpuState, variants: &ModelVariants) -> Option<LineBuffers> {
        let VariantContent::HardEdges { segments, .. } = &variants.hard_edges.content else {
            return None;
        };
        Some(LineBuffers::new(
            &gpu.device,
            &gpu.queue,
            &gpu.material_bind_group_layout,
            segments,
            "Hard Edge Instance Buffer",
        ))
    }

    fn destroy(&self) {
        for part in &self.textured {
            part.destroy();
        }
        if let Some(background) = &self.background {
            background.destroy();
        }
        for buffers in [&self.hard_edges, &self.conditional].into_iter().flatten() {
            buffers.destroy();
        }
    }
}

pub struct GpuState {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,

    pipeline_shaded: wgpu::RenderPipeline,
    pipeline_background: wgpu::RenderPipeline,
    pipeline_lines: wgpu::RenderPipeline,
    pipeline_conditional: wgpu::RenderPipeline,

    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    material_bind_group_layout: wgpu::BindGroupLayout,

    model: Option<GpuModel>,
    depth_texture: wgpu::TextureView,
    capture_supported: bool,
}

fn uniform_layout_entry() -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

struct PipelineSpec<'a> {
    label: &'a str,
    vs: &'a str,
    fs: &'a str,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    blend: Option<wgpu::BlendState>,
    depth_compare: wgpu::CompareFunction,
    bias: wgpu::DepthBiasState,
}

fn create_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
    spec: PipelineSpec<'_>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(spec.label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some(spec.vs),
            buffers: spec.buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(spec.fs),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: spec.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: spec.depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: spec.bias,
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

impl GpuState {
    pub async fn new(window: Arc<winit::window::Window>) -> Result<Self, GpuError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;
        info!(adapter = ?adapter.get_info().name, backend = ?adapter.get_info().backend, "selected GPU adapter");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(GpuError::NoSurfaceFormat)?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        // Snapshots copy the presented frame back, when the surface allows it.
        let capture_supported = surface_caps.usages.contains(wgpu::TextureUsages::COPY_SRC);
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if capture_supported {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        let config = wgpu::SurfaceConfiguration {
            usage,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        debug!(format = ?surface_format, capture_supported, "configured surface");

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Line Art Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders.wgsl").into()),
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Buffer"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Camera Bind Group Layout"),
                entries: &[uniform_layout_entry()],
            });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let material_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Material Bind Group Layout"),
                entries: &[uniform_layout_entry()],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Model Pipeline Layout"),
            bind_group_layouts: &[&camera_bind_group_layout, &material_bind_group_layout],
            push_constant_ranges: &[],
        });

        let mesh_layout = [mesh_vertex_layout()];
        let segment_layout = [segment_instance_layout()];
        let conditional_layout = [conditional_instance_layout()];

        let pipeline_shaded = create_pipeline(
            &device,
            &shader,
            &pipeline_layout,
            config.format,
            PipelineSpec {
                label: "Shaded Pipeline",
                vs: "vs_mesh",
                fs: "fs_mesh",
                buffers: &mesh_layout,
                blend: Some(wgpu::BlendState::REPLACE),
                depth_compare: wgpu::CompareFunction::Less,
                bias: wgpu::DepthBiasState::default(),
            },
        );

        let pipeline_background = create_pipeline(
            &device,
            &shader,
            &pipeline_layout,
            config.format,
            PipelineSpec {
                label: "Background Pipeline",
                vs: "vs_mesh",
                fs: "fs_mesh",
                buffers: &mesh_layout,
                blend: Some(wgpu::BlendState::REPLACE),
                depth_compare: wgpu::CompareFunction::Less,
                bias: BACKGROUND_DEPTH_BIAS,
            },
        );

        let pipeline_lines = create_pipeline(
            &device,
            &shader,
            &pipeline_layout,
            config.format,
            PipelineSpec {
                label: "Hard Edge Pipeline",
                vs: "vs_line",
                fs: "fs_line",
                buffers: &segment_layout,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                depth_compare: wgpu::CompareFunction::LessEqual,
                bias: wgpu::DepthBiasState::default(),
            },
        );

        let pipeline_conditional = create_pipeline(
            &device,
            &shader,
            &pipeline_layout,
            config.format,
            PipelineSpec {
                label: "Conditional Edge Pipeline",
                vs: "vs_conditional",
                fs: "fs_conditional",
                buffers: &conditional_layout,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                depth_compare: wgpu::CompareFunction::LessEqual,
                bias: wgpu::DepthBiasState::default(),
            },
        );

        let depth_texture = Self::create_depth_texture(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            pipeline_shaded,
            pipeline_background,
            pipeline_lines,
            pipeline_conditional,
            camera_buffer,
            camera_bind_group,
            material_bind_group_layout,
            model: None,
            depth_texture,
            capture_supported,
        })
    }

    fn create_depth_texture(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
    ) -> wgpu::TextureView {
        let size = wgpu::Extent3d {
            width: config.width.max(1),
            height: config.height.max(1),
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = Self::create_depth_texture(&self.device, &self.config);
        }
    }

    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    pub fn capture_supported(&self) -> bool {
        self.capture_supported
    }

    pub fn update_camera(&self, camera: &Camera) {
        let uniform = CameraUniform::from_camera(camera);
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[uniform]));
    }

    /// Brings the GPU copies in line with the stage. A new model replaces
    /// every buffer; a threshold change replaces only the hard edges. Line
    /// materials are written every call.
    pub fn sync_stage(&mut self, stage: &Stage) {
        let Some(variants) = stage.variants() else {
            if let Some(old) = self.model.take() {
                old.destroy();
            }
            return;
        };

        let current = self
            .model
            .as_ref()
            .is_some_and(|model| model.content_revision == stage.content_revision());
        if !current {
            if let Some(old) = self.model.take() {
                old.destroy();
            }
            debug!(revision = stage.content_revision(), "uploading model variants");
            self.model = Some(GpuModel::upload(self, variants, stage));
        }

        let refreshed = match &self.model {
            Some(model) if model.edges_revision != stage.edges_revision() => {
                GpuModel::upload_hard_edges(self, variants)
            }
            _ => None,
        };
        if let (Some(model), Some(hard_edges)) = (self.model.as_mut(), refreshed) {
            if let Some(old) = model.hard_edges.replace(hard_edges) {
                old.destroy();
            }
            model.edges_revision = stage.edges_revision();
        }

        if let Some(model) = &self.model {
            if let (Some(buffers), VariantContent::HardEdges { material, .. }) =
                (&model.hard_edges, &variants.hard_edges.content)
            {
                buffers.write_material(&self.queue, material);
            }
            if let (Some(buffers), VariantContent::ConditionalEdges { material, .. }) =
                (&model.conditional, &variants.conditional.content)
            {
                buffers.write_material(&self.queue, material);
            }
        }
    }

    /// Draws the visible variants over a white clear.
    pub fn render_stage(
        &self,
        view: &wgpu::TextureView,
        encoder: &mut wgpu::CommandEncoder,
        stage: &Stage,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Model Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_texture,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let (Some(model), Some(variants)) = (&self.model, stage.variants()) else {
            return;
        };
        render_pass.set_bind_group(0, &self.camera_bind_group, &[]);

        if variants.background.visible {
            if let Some(background) = &model.background {
                render_pass.set_pipeline(&self.pipeline_background);
                background.draw(&mut render_pass);
            }
        }

        if variants.textured.visible {
            render_pass.set_pipeline(&self.pipeline_shaded);
            for part in &model.textured {
                part.draw(&mut render_pass);
            }
        }

        if let (true, Some(buffers), VariantContent::HardEdges { material, .. }) = (
            variants.hard_edges.visible,
            &model.hard_edges,
            &variants.hard_edges.content,
        ) {
            if material.visible {
                render_pass.set_pipeline(&self.pipeline_lines);
                buffers.draw(&mut render_pass);
            }
        }

        if let (true, Some(buffers), VariantContent::ConditionalEdges { material, .. }) = (
            variants.conditional.visible,
            &model.conditional,
            &variants.conditional.content,
        ) {
            if material.visible {
                render_pass.set_pipeline(&self.pipeline_conditional);
                buffers.draw(&mut render_pass);
            }
        }
    }
}
