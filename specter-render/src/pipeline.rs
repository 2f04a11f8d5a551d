//! Bind group layouts and the fixed pipeline set.
//!
//! Avatar drawing uses seven pipelines built once at context creation: the
//! two material families (layered, PBS) each in depth-prepass, less-depth
//! color, and equal-depth color variants, plus the debug line pipeline.
//! Color passes blend with straight alpha and never write depth; only the
//! prepass writes depth.

use crate::binding::{LAYERED_TEXTURE_COUNT, PBS_TEXTURE_COUNT};
use crate::command::{DrawPass, PartKind};
use crate::context::RenderConfig;
use crate::debug::line_vertex_buffer_layout;
use crate::mesh::vertex_buffer_layout;
use crate::uniforms::{MaterialUniforms, PartUniforms};

/// Layouts shared by every avatar pipeline.
///
/// Group 0 is the dynamic-offset uniform pair (part state at binding 0,
/// material state at binding 1); group 1 is the per-family texture set.
pub struct BindGroupLayouts {
    pub uniforms: wgpu::BindGroupLayout,
    pub layered_textures: wgpu::BindGroupLayout,
    pub pbs_textures: wgpu::BindGroupLayout,
}

impl BindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniforms = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Avatar Uniform Bind Group Layout"),
            entries: &[
                // Binding 0: per-draw part uniforms (transforms + skinning)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<PartUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
                // Binding 1: layered material uniforms (PBS draws point at
                // the zeroed slot written at the start of each frame)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<MaterialUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        Self {
            uniforms,
            layered_textures: texture_layout(
                device,
                "Layered Texture Bind Group Layout",
                LAYERED_TEXTURE_COUNT,
            ),
            pbs_textures: texture_layout(
                device,
                "PBS Texture Bind Group Layout",
                PBS_TEXTURE_COUNT,
            ),
        }
    }
}

/// Sampler at binding 0, `texture_count` 2D float textures at 1..=count.
fn texture_layout(
    device: &wgpu::Device,
    label: &str,
    texture_count: usize,
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(texture_count + 1);
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });
    for slot in 0..texture_count {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot as u32 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// All pipelines needed for one frame of avatar drawing.
pub struct PipelineSet {
    pub layered_prepass: wgpu::RenderPipeline,
    pub layered_color_less: wgpu::RenderPipeline,
    pub layered_color_equal: wgpu::RenderPipeline,
    pub pbs_prepass: wgpu::RenderPipeline,
    pub pbs_color_less: wgpu::RenderPipeline,
    pub pbs_color_equal: wgpu::RenderPipeline,
    pub debug_line: wgpu::RenderPipeline,
}

/// Depth/color behavior for one skinned mesh pipeline variant.
struct PassMode {
    depth_write: bool,
    depth_compare: wgpu::CompareFunction,
    color_writes: wgpu::ColorWrites,
}

const PREPASS: PassMode = PassMode {
    depth_write: true,
    depth_compare: wgpu::CompareFunction::Less,
    color_writes: wgpu::ColorWrites::empty(),
};
const COLOR_LESS: PassMode = PassMode {
    depth_write: false,
    depth_compare: wgpu::CompareFunction::Less,
    color_writes: wgpu::ColorWrites::ALL,
};
const COLOR_EQUAL: PassMode = PassMode {
    depth_write: false,
    depth_compare: wgpu::CompareFunction::Equal,
    color_writes: wgpu::ColorWrites::ALL,
};

impl PipelineSet {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts, config: &RenderConfig) -> Self {
        let layered_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Avatar Layered Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/avatar.wgsl").into()),
        });
        let pbs_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Avatar PBS Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/avatar_pbs.wgsl").into()),
        });
        let debug_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Debug Line Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/debug_line.wgsl").into()),
        });

        let layered_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Layered Pipeline Layout"),
            bind_group_layouts: &[&layouts.uniforms, &layouts.layered_textures],
            push_constant_ranges: &[],
        });
        let pbs_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("PBS Pipeline Layout"),
            bind_group_layouts: &[&layouts.uniforms, &layouts.pbs_textures],
            push_constant_ranges: &[],
        });
        let debug_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Debug Line Pipeline Layout"),
            bind_group_layouts: &[&layouts.uniforms],
            push_constant_ranges: &[],
        });

        let mesh = |label: &str, layout: &wgpu::PipelineLayout, module, mode: &PassMode| {
            skinned_pipeline(device, config, label, layout, module, mode)
        };

        Self {
            layered_prepass: mesh(
                "Layered Depth Prepass",
                &layered_layout,
                &layered_module,
                &PREPASS,
            ),
            layered_color_less: mesh(
                "Layered Color",
                &layered_layout,
                &layered_module,
                &COLOR_LESS,
            ),
            layered_color_equal: mesh(
                "Layered Color (Equal Depth)",
                &layered_layout,
                &layered_module,
                &COLOR_EQUAL,
            ),
            pbs_prepass: mesh("PBS Depth Prepass", &pbs_layout, &pbs_module, &PREPASS),
            pbs_color_less: mesh("PBS Color", &pbs_layout, &pbs_module, &COLOR_LESS),
            pbs_color_equal: mesh(
                "PBS Color (Equal Depth)",
                &pbs_layout,
                &pbs_module,
                &COLOR_EQUAL,
            ),
            debug_line: debug_line_pipeline(device, config, &debug_layout, &debug_module),
        }
    }

    /// Pipeline for a planned draw command.
    pub fn for_draw(&self, kind: PartKind, pass: DrawPass) -> &wgpu::RenderPipeline {
        match (kind, pass) {
            (PartKind::Layered, DrawPass::DepthPrepass) => &self.layered_prepass,
            (PartKind::Layered, DrawPass::Color { depth_equal: false }) => &self.layered_color_less,
            (PartKind::Layered, DrawPass::Color { depth_equal: true }) => &self.layered_color_equal,
            (PartKind::Pbs, DrawPass::DepthPrepass) => &self.pbs_prepass,
            (PartKind::Pbs, DrawPass::Color { depth_equal: false }) => &self.pbs_color_less,
            (PartKind::Pbs, DrawPass::Color { depth_equal: true }) => &self.pbs_color_equal,
        }
    }
}

fn skinned_pipeline(
    device: &wgpu::Device,
    config: &RenderConfig,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    mode: &PassMode,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[vertex_buffer_layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: config.color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: mode.color_writes,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: config.depth_format,
            depth_write_enabled: mode.depth_write,
            depth_compare: mode.depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: config.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

/// Joint lines draw over everything: depth test Always, no depth write.
fn debug_line_pipeline(
    device: &wgpu::Device,
    config: &RenderConfig,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Debug Line Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[line_vertex_buffer_layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: config.color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::LineList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: config.depth_format,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: config.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}
