//! YUV to RGB render pipeline
//!
//! Draws one letterboxed quad sampling the three plane textures. The quad is
//! generated in the vertex shader, so there are no vertex or index buffers;
//! the only per-frame upload is the uniform block.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::texture::TextureManager;

/// Vertices in the shader's quad (two triangles)
const QUAD_VERTEX_COUNT: u32 = 6;

/// Uniform block shared by both shader stages
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct VideoUniforms {
    /// Letterbox scale in clip space
    scale: [f32; 2],
    _pad: [f32; 2],

    /// YUV to RGB, one row per output channel, offsets in the last column
    color_matrix: [[f32; 4]; 4],
}

impl VideoUniforms {
    fn letterboxed(scale: (f32, f32)) -> Self {
        Self {
            scale: [scale.0, scale.1],
            _pad: [0.0; 2],
            color_matrix: BT601_LIMITED,
        }
    }
}

/// BT.601 limited range, the DVD color space
const BT601_LIMITED: [[f32; 4]; 4] = [
    [1.164,  0.000,  1.596, -0.871],
    [1.164, -0.392, -0.813,  0.529],
    [1.164,  2.017,  0.000, -1.081],
    [0.000,  0.000,  0.000,  1.000],
];

/// Pipeline, uniform buffer and the bind groups feeding the YUV shader
///
/// Group 0 holds the uniforms and sampler and lives as long as the pipeline.
/// Group 1 holds the plane views and is rebuilt whenever the textures are.
pub struct YuvPipeline {
    pipeline: wgpu::RenderPipeline,
    uniforms: wgpu::Buffer,
    last_uniforms: VideoUniforms,
    planes_layout: wgpu::BindGroupLayout,
    globals: wgpu::BindGroup,
    planes: Option<wgpu::BindGroup>,
}

impl YuvPipeline {
    pub fn new(device: &wgpu::Device, sampler: &wgpu::Sampler, surface_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("yuv_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/yuv.wgsl").into()),
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("yuv_globals_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<VideoUniforms>() as u64),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        // Y, U and V planes at bindings 0, 1 and 2
        let plane_entries: Vec<_> = (0..3)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        let planes_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("yuv_planes_layout"),
            entries: &plane_entries,
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("yuv_pipeline_layout"),
            bind_group_layouts: &[&globals_layout, &planes_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("yuv_pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let initial = VideoUniforms::letterboxed((1.0, 1.0));
        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("yuv_uniforms"),
            contents: bytemuck::bytes_of(&initial),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let globals = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("yuv_globals"),
            layout: &globals_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        Self {
            pipeline,
            uniforms,
            last_uniforms: initial,
            planes_layout,
            globals,
            planes: None,
        }
    }

    /// Drop the plane bind group; the next draw rebinds the current textures
    pub fn planes_changed(&mut self) {
        self.planes = None;
    }

    /// Record a pass that clears `target` to black and draws the video
    ///
    /// Nothing is drawn until the first frame has been uploaded.
    pub fn draw(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        textures: &TextureManager,
        scale: (f32, f32),
    ) {
        let uniforms = VideoUniforms::letterboxed(scale);
        if uniforms != self.last_uniforms {
            queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));
            self.last_uniforms = uniforms;
        }

        if self.planes.is_none() {
            self.planes = textures.views().map(|views| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("yuv_planes"),
                    layout: &self.planes_layout,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(views[0]) },
                        wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(views[1]) },
                        wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(views[2]) },
                    ],
                })
            });
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("yuv_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        if let Some(planes) = &self.planes {
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.globals, &[]);
            pass.set_bind_group(1, planes, &[]);
            pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        }
    }
}
