//! [`Backend`] that renders with wgpu.

use std::{collections::HashMap, sync::mpsc};

use wgpu::{
    util::{BufferInitDescriptor, DeviceExt as _},
    *,
};

use crate::{
    Backend, Blend, Gpu, GpuError, Load, Pass, PixelBuffer, Resolution, Shader, TargetName,
};

/// Format of every off-screen render target.
const TARGET_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
const BACKGROUND: Color = Color::BLACK;

const VERTEX_ATTRIBUTES: [VertexAttribute; 3] =
    vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32];

/// A render target allocated by the [`WgpuBackend`].
pub struct GpuTarget {
    texture: Texture,
    view: TextureView,
    bind_group: BindGroup,
    resolution: Resolution,
}

/// Objects shared by every pass pipeline.
struct PassResources {
    texture_layout: BindGroupLayout,
    layout: PipelineLayout,
    module: ShaderModule,
}

enum Screen {
    Window {
        surface: Surface,
        config: SurfaceConfiguration,
        pipeline: RenderPipeline,
    },
    Offscreen(GpuTarget),
}

/// Renders passes on a [`Gpu`], presenting either to a window surface or to an off-screen target.
pub struct WgpuBackend {
    gpu: Gpu,
    texture_layout: BindGroupLayout,
    sampler_group: BindGroup,
    pipelines: HashMap<(Shader, Blend), RenderPipeline>,
    screen: Screen,
}

impl WgpuBackend {
    /// Creates a backend that presents into a window `surface` of the given size.
    ///
    /// All shader programs are built here, so a driver rejecting one of them fails construction
    /// instead of a later frame.
    pub fn with_surface(gpu: Gpu, surface: Surface, size: Resolution) -> Result<Self, GpuError> {
        let caps = surface.get_capabilities(gpu.adapter());
        // Targets hold values that are already display-encoded, so avoid a second sRGB encode.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| GpuError::Shader("adapter cannot render to window surface".into()))?;

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width().max(1),
            height: size.height().max(1),
            present_mode: PresentMode::Fifo,
            alpha_mode: CompositeAlphaMode::Auto,
            view_formats: Vec::new(),
        };
        log::debug!("configuring window surface at {size} (format: {format:?})");
        surface.configure(gpu.device(), &config);

        Self::build(gpu, |gpu, resources| {
            let pipeline = create_pipeline(
                gpu.device(),
                resources,
                Shader::Copy,
                Blend::Replace,
                format,
            );
            Ok(Screen::Window {
                surface,
                config,
                pipeline,
            })
        })
    }

    /// Creates a backend that presents into an off-screen target of size `display`.
    pub fn headless(gpu: Gpu, display: Resolution) -> Result<Self, GpuError> {
        Self::build(gpu, |gpu, resources| {
            Ok(Screen::Offscreen(allocate(
                gpu,
                &resources.texture_layout,
                "screen",
                display,
            )?))
        })
    }

    fn build(
        gpu: Gpu,
        screen: impl FnOnce(&Gpu, &PassResources) -> Result<Screen, GpuError>,
    ) -> Result<Self, GpuError> {
        let device = gpu.device().clone();
        device.push_error_scope(ErrorFilter::Validation);

        let sampler_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("sampler_layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("texture_layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });
        let sampler_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("linear_sampler"),
            layout: &sampler_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Sampler(&device.create_sampler(&SamplerDescriptor {
                    label: Some("linear_sampler"),
                    mag_filter: FilterMode::Linear,
                    min_filter: FilterMode::Linear,
                    ..Default::default()
                })),
            }],
        });
        let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("pass_layout"),
            bind_group_layouts: &[&sampler_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("pass_shader"),
            source: ShaderSource::Wgsl(include_str!("shaders/pass.wgsl").into()),
        });
        let resources = PassResources {
            texture_layout,
            layout,
            module,
        };

        let mut pipelines = HashMap::new();
        for shader in Shader::ALL {
            for blend in [Blend::Replace, Blend::Over] {
                pipelines.insert(
                    (shader, blend),
                    create_pipeline(&device, &resources, shader, blend, TARGET_FORMAT),
                );
            }
        }
        let screen = screen(&gpu, &resources)?;

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::Shader(error.to_string()));
        }
        log::debug!("built {} pass pipelines", pipelines.len());

        Ok(Self {
            gpu,
            texture_layout: resources.texture_layout,
            sampler_group,
            pipelines,
            screen,
        })
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    /// Reads back the off-screen screen target. Returns `None` when presenting to a window.
    pub fn read_screen(&mut self) -> Result<Option<PixelBuffer>, GpuError> {
        match &self.screen {
            Screen::Offscreen(target) => read_back(&self.gpu, target).map(Some),
            Screen::Window { .. } => Ok(None),
        }
    }

    fn acquire_frame(
        &self,
        surface: &Surface,
        config: &SurfaceConfiguration,
    ) -> Result<SurfaceTexture, GpuError> {
        match surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                log::debug!("surface error: {}", err);
                surface.configure(self.gpu.device(), config);
                Ok(surface.get_current_texture()?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn encode(
        &self,
        pass: &Pass,
        source: &GpuTarget,
        view: &TextureView,
        pipeline: &RenderPipeline,
    ) -> CommandBuffer {
        let device = self.gpu.device();
        let vertices = device.create_buffer_init(&BufferInitDescriptor {
            label: Some(pass.label),
            contents: bytemuck::cast_slice(pass.mesh.vertices()),
            usage: BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&BufferInitDescriptor {
            label: Some(pass.label),
            contents: bytemuck::cast_slice(pass.mesh.indices()),
            usage: BufferUsages::INDEX,
        });

        let mut enc = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some(pass.label),
        });
        {
            let load = match pass.load {
                Load::Clear => LoadOp::Clear(BACKGROUND),
                Load::Keep => LoadOp::Load,
            };
            let mut rpass = enc.begin_render_pass(&RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: Operations { load, store: true },
                })],
                ..Default::default()
            });
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &self.sampler_group, &[]);
            rpass.set_bind_group(1, &source.bind_group, &[]);
            rpass.set_vertex_buffer(0, vertices.slice(..));
            rpass.set_index_buffer(indices.slice(..), IndexFormat::Uint16);
            rpass.draw_indexed(0..pass.mesh.indices().len() as u32, 0, 0..1);
        }
        enc.finish()
    }
}

impl Backend for WgpuBackend {
    type Target = GpuTarget;

    fn create_target(
        &mut self,
        name: TargetName,
        resolution: Resolution,
    ) -> Result<GpuTarget, GpuError> {
        allocate(&self.gpu, &self.texture_layout, name.as_str(), resolution)
    }

    fn upload(&mut self, target: &GpuTarget, pixels: &PixelBuffer) -> Result<(), GpuError> {
        let res = target.resolution;
        if pixels.resolution() != res {
            return Err(GpuError::BufferSize {
                len: pixels.data().len(),
                resolution: res,
            });
        }
        self.gpu.queue().write_texture(
            target.texture.as_image_copy(),
            pixels.data(),
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(res.width() * 4),
                rows_per_image: None,
            },
            extent(res),
        );
        Ok(())
    }

    fn draw(
        &mut self,
        pass: &Pass,
        source: &GpuTarget,
        dest: Option<&GpuTarget>,
    ) -> Result<(), GpuError> {
        if pass.mesh.is_empty() {
            return Ok(());
        }
        let pipeline = &self.pipelines[&(pass.shader, pass.blend)];

        match (dest, &self.screen) {
            (Some(dest), _) => {
                let cmd = self.encode(pass, source, &dest.view, pipeline);
                self.gpu.queue().submit([cmd]);
            }
            (None, Screen::Offscreen(screen)) => {
                let cmd = self.encode(pass, source, &screen.view, pipeline);
                self.gpu.queue().submit([cmd]);
            }
            (
                None,
                Screen::Window {
                    surface,
                    config,
                    pipeline,
                },
            ) => {
                let frame = self.acquire_frame(surface, config)?;
                let view = frame.texture.create_view(&TextureViewDescriptor::default());
                let cmd = self.encode(pass, source, &view, pipeline);
                self.gpu.queue().submit([cmd]);
                frame.present();
            }
        }
        Ok(())
    }

    fn read(&mut self, target: &GpuTarget) -> Result<PixelBuffer, GpuError> {
        read_back(&self.gpu, target)
    }

    fn display_resolution(&self) -> Resolution {
        match &self.screen {
            Screen::Window { config, .. } => Resolution::new(config.width, config.height),
            Screen::Offscreen(target) => target.resolution,
        }
    }

    fn resize_display(&mut self, size: Resolution) -> Result<(), GpuError> {
        log::debug!("resizing screen to {size}");
        match &mut self.screen {
            Screen::Window {
                surface, config, ..
            } => {
                config.width = size.width().max(1);
                config.height = size.height().max(1);
                surface.configure(self.gpu.device(), config);
            }
            Screen::Offscreen(target) => {
                if target.resolution != size {
                    *target = allocate(&self.gpu, &self.texture_layout, "screen", size)?;
                }
            }
        }
        Ok(())
    }
}

fn extent(res: Resolution) -> Extent3d {
    Extent3d {
        width: res.width(),
        height: res.height(),
        depth_or_array_layers: 1,
    }
}

fn allocate(
    gpu: &Gpu,
    layout: &BindGroupLayout,
    label: &'static str,
    resolution: Resolution,
) -> Result<GpuTarget, GpuError> {
    let device = gpu.device();
    device.push_error_scope(ErrorFilter::OutOfMemory);
    device.push_error_scope(ErrorFilter::Validation);

    let texture = device.create_texture(&TextureDescriptor {
        label: Some(label),
        size: extent(resolution),
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: TextureUsages::TEXTURE_BINDING
            | TextureUsages::RENDER_ATTACHMENT
            | TextureUsages::COPY_DST
            | TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[BindGroupEntry {
            binding: 0,
            resource: BindingResource::TextureView(&view),
        }],
    });

    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());
    if let Some(error) = validation.or(oom) {
        return Err(GpuError::Allocation {
            label,
            resolution,
            message: error.to_string(),
        });
    }

    Ok(GpuTarget {
        texture,
        view,
        bind_group,
        resolution,
    })
}

fn read_back(gpu: &Gpu, target: &GpuTarget) -> Result<PixelBuffer, GpuError> {
    let res = target.resolution;
    let width_bytes = res.width() * 4;
    let stride = width_bytes.next_multiple_of(COPY_BYTES_PER_ROW_ALIGNMENT);
    let buffer = gpu.device().create_buffer(&BufferDescriptor {
        label: Some("readback"),
        size: u64::from(stride) * u64::from(res.height()),
        usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut enc = gpu.device().create_command_encoder(&Default::default());
    enc.copy_texture_to_buffer(
        target.texture.as_image_copy(),
        ImageCopyBuffer {
            buffer: &buffer,
            layout: ImageDataLayout {
                bytes_per_row: Some(stride),
                ..Default::default()
            },
        },
        extent(res),
    );
    let index = gpu.queue().submit([enc.finish()]);

    let (sender, recv) = mpsc::channel();
    buffer.slice(..).map_async(MapMode::Read, move |result| {
        sender.send(result).ok();
    });
    gpu.device().poll(MaintainBase::WaitForSubmissionIndex(index));
    recv.recv()
        .map_err(|_| GpuError::Readback("map callback was dropped".into()))?
        .map_err(|err| GpuError::Readback(err.to_string()))?;

    let mut data = Vec::with_capacity(res.num_pixels() * 4);
    {
        let view = buffer.slice(..).get_mapped_range();
        for row in view.chunks(stride as usize) {
            data.extend_from_slice(&row[..width_bytes as usize]);
        }
    }
    buffer.unmap();

    PixelBuffer::new(res, data)
}

fn create_pipeline(
    device: &Device,
    resources: &PassResources,
    shader: Shader,
    blend: Blend,
    format: TextureFormat,
) -> RenderPipeline {
    let blend = match blend {
        Blend::Replace => None,
        Blend::Over => Some(BlendState {
            color: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::Zero,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            },
        }),
    };

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(shader.entry_point()),
        layout: Some(&resources.layout),
        vertex: VertexState {
            module: &resources.module,
            entry_point: "vert",
            buffers: &[VertexBufferLayout {
                array_stride: std::mem::size_of::<crate::Vertex>() as BufferAddress,
                step_mode: VertexStepMode::Vertex,
                attributes: &VERTEX_ATTRIBUTES,
            }],
        },
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: MultisampleState::default(),
        fragment: Some(FragmentState {
            module: &resources.module,
            entry_point: shader.entry_point(),
            targets: &[Some(ColorTargetState {
                format,
                blend,
                write_mask: ColorWrites::ALL,
            })],
        }),
        multiview: None,
    })
}
