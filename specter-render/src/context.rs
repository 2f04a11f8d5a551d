//! Renderer context: owns GPU resources, consumes provider messages, and
//! records avatar draws into a caller-supplied encoder.
//!
//! One context serves the application lifetime. Per frame the caller runs
//! [`RenderContext::begin_frame`] once, then [`RenderContext::render_avatar`]
//! once per eye; uniform and line data appended by the second call never
//! aliases the first call's offsets, so both recordings stay valid until the
//! caller submits them in order.

use anyhow::bail;
use bytemuck::Zeroable;
use glam::{Mat4, Vec3};
use smallvec::SmallVec;
use tracing::debug;

use specter_avatar::{
    AssetId, AssetPayload, Avatar, MAX_JOINTS, MaterialState, ProviderMessage, RenderPart,
    compute_skin_matrices, compute_world_pose,
};

use crate::binding::{LAYERED_TEXTURE_COUNT, TextureBindGroupCache};
use crate::buffer::StreamBuffer;
use crate::cache::{AssetCache, AssetResource};
use crate::command::{DrawPass, PartKind, plan_avatar};
use crate::debug::{LineVertex, append_joint_lines};
use crate::mesh::{mesh_upload_bytes, upload_mesh};
use crate::pipeline::{BindGroupLayouts, PipelineSet};
use crate::texture::{self, create_fallback_texture, upload_texture};
use crate::uniforms::{
    MATERIAL_UNIFORMS_STRIDE, MapAvailability, MaterialUniforms, PART_UNIFORMS_STRIDE,
    PartUniforms, UNIFORM_ALIGNMENT, pack_material, pack_part,
};

/// Render target and budget configuration, fixed at context creation.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    pub sample_count: u32,
    /// Upper bound on retained mesh/texture GPU bytes.
    pub asset_budget_bytes: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            color_format: wgpu::TextureFormat::Rgba8UnormSrgb,
            depth_format: wgpu::TextureFormat::Depth32Float,
            sample_count: 1,
            asset_budget_bytes: 256 * 1024 * 1024,
        }
    }
}

/// A fully resolved draw, ready for pass recording.
struct PreparedDraw {
    kind: PartKind,
    pass: DrawPass,
    part_offset: u32,
    material_offset: u32,
    texture_key: u64,
    mesh_id: AssetId,
    /// Joint line vertex range for this part, relative to the call's base.
    line_range: Option<(u32, u32)>,
}

pub struct RenderContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RenderConfig,
    layouts: BindGroupLayouts,
    pipelines: PipelineSet,
    sampler: wgpu::Sampler,
    fallback_texture: texture::TextureResource,
    assets: AssetCache<AssetResource>,
    part_uniforms: StreamBuffer,
    material_uniforms: StreamBuffer,
    line_vertices: StreamBuffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_bind_groups: TextureBindGroupCache,
    elapsed_seconds: f32,
}

impl RenderContext {
    /// Device features needed by [`RenderContext::new`].
    pub fn required_features() -> wgpu::Features {
        texture::required_features()
    }

    pub fn new(device: wgpu::Device, queue: wgpu::Queue, config: RenderConfig) -> Self {
        let layouts = BindGroupLayouts::new(&device);
        let pipelines = PipelineSet::new(&device, &layouts, &config);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Avatar Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let fallback_texture = create_fallback_texture(&device, &queue);
        let part_uniforms = StreamBuffer::new(
            &device,
            wgpu::BufferUsages::UNIFORM,
            UNIFORM_ALIGNMENT,
            "Avatar Part Uniforms",
        );
        let material_uniforms = StreamBuffer::new(
            &device,
            wgpu::BufferUsages::UNIFORM,
            UNIFORM_ALIGNMENT,
            "Avatar Material Uniforms",
        );
        let line_vertices = StreamBuffer::new(
            &device,
            wgpu::BufferUsages::VERTEX,
            wgpu::COPY_BUFFER_ALIGNMENT,
            "Debug Line Vertices",
        );
        let uniform_bind_group = create_uniform_bind_group(
            &device,
            &layouts.uniforms,
            &part_uniforms,
            &material_uniforms,
        );

        Self {
            device,
            queue,
            config,
            layouts,
            pipelines,
            sampler,
            fallback_texture,
            assets: AssetCache::new(),
            part_uniforms,
            material_uniforms,
            line_vertices,
            uniform_bind_group,
            texture_bind_groups: TextureBindGroupCache::new(),
            elapsed_seconds: 0.0,
        }
    }

    /// Total seconds accumulated by [`RenderContext::begin_frame`]. Drives
    /// time-varying material masks.
    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed_seconds
    }

    pub fn assets(&self) -> &AssetCache<AssetResource> {
        &self.assets
    }

    /// Process queued provider messages.
    ///
    /// A valid avatar specification replaces `avatar` (resources already in
    /// the cache count as delivered immediately). Asset payloads are
    /// uploaded, cached by id, and acknowledged to the active avatar.
    pub fn drain_messages(
        &mut self,
        messages: impl IntoIterator<Item = ProviderMessage>,
        avatar: &mut Option<Avatar>,
    ) -> anyhow::Result<()> {
        for message in messages {
            match message {
                ProviderMessage::AvatarSpec(spec) => {
                    let mut next = Avatar::from_spec(spec)?;
                    let resident: Vec<AssetId> = next
                        .referenced_assets()
                        .iter()
                        .copied()
                        .filter(|id| self.assets.contains(*id))
                        .collect();
                    for id in resident {
                        next.asset_delivered(id);
                    }
                    debug!(
                        components = next.components.len(),
                        assets = next.referenced_assets().len(),
                        loading = next.is_loading(),
                        "avatar specification accepted"
                    );
                    *avatar = Some(next);
                }
                ProviderMessage::AssetLoaded { id, payload } => {
                    self.load_asset(id, &payload)?;
                    if let Some(avatar) = avatar {
                        avatar.asset_delivered(id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Upload one asset payload and retain it under `id`.
    ///
    /// Unsupported texture encodings and non-renderable payload kinds leave
    /// the cache untouched without error; malformed data and budget
    /// exhaustion fail the load.
    pub fn load_asset(&mut self, id: AssetId, payload: &AssetPayload) -> anyhow::Result<()> {
        match payload {
            AssetPayload::Mesh(data) => {
                self.check_budget(mesh_upload_bytes(data))?;
                let resource = upload_mesh(&self.device, data)?;
                self.assets.insert(id, AssetResource::Mesh(resource));
            }
            AssetPayload::Texture(data) => {
                self.check_budget(data.data.len() as u64)?;
                if let Some(resource) = upload_texture(&self.device, &self.queue, data)? {
                    self.assets.insert(id, AssetResource::Texture(resource));
                    // Cached groups may still bind the fallback for this id.
                    self.texture_bind_groups.clear();
                }
            }
            AssetPayload::Other => {
                debug!(id = id.0, "ignoring asset with no renderable payload");
            }
        }
        Ok(())
    }

    fn check_budget(&self, incoming: u64) -> anyhow::Result<()> {
        let budget = self.config.asset_budget_bytes;
        let retained = self.assets.total_bytes();
        if retained + incoming > budget {
            bail!(
                "avatar asset budget exhausted: {} retained + {} incoming > {} budget",
                retained,
                incoming,
                budget
            );
        }
        Ok(())
    }

    /// Start a new frame: advance the material clock and reclaim per-frame
    /// buffer space. Call once per frame, before any `render_avatar`.
    pub fn begin_frame(&mut self, delta_seconds: f32) {
        self.elapsed_seconds += delta_seconds;
        self.part_uniforms.reset();
        self.material_uniforms.reset();
        self.line_vertices.reset();
    }

    /// Record one view of the avatar into `encoder`.
    ///
    /// Attachments are loaded, not cleared; the caller owns the clear. Parts
    /// whose mesh has not arrived are skipped; nothing here fails the frame.
    #[allow(clippy::too_many_arguments)]
    pub fn render_avatar(
        &mut self,
        avatar: &Avatar,
        visibility_mask: u32,
        view: &Mat4,
        projection: &Mat4,
        viewer_position: Vec3,
        debug_joints: bool,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
    ) {
        let plan = plan_avatar(avatar, visibility_mask);
        if plan.is_empty() {
            return;
        }

        // Size the uniform arenas for this call up front; growing later would
        // orphan offsets already handed to the recorded pass.
        let layered_draws = plan
            .iter()
            .filter(|cmd| cmd.kind == PartKind::Layered)
            .count() as u64;
        let part_bytes = self.part_uniforms.used() + PART_UNIFORMS_STRIDE * plan.len() as u64;
        let material_bytes =
            self.material_uniforms.used() + MATERIAL_UNIFORMS_STRIDE * (layered_draws + 1);
        let grew = self.part_uniforms.ensure_capacity(&self.device, part_bytes)
            | self.material_uniforms.ensure_capacity(&self.device, material_bytes);
        if grew {
            self.uniform_bind_group = create_uniform_bind_group(
                &self.device,
                &self.layouts.uniforms,
                &self.part_uniforms,
                &self.material_uniforms,
            );
        }

        // Shared zeroed material slot for draws without layered state.
        let null_material = MaterialUniforms::zeroed();
        let null_material_offset = self
            .material_uniforms
            .write(&self.queue, bytemuck::bytes_of(&null_material)) as u32;

        let view_proj = *projection * *view;
        let mut prepared: SmallVec<[PreparedDraw; 16]> = SmallVec::new();
        let mut lines: Vec<LineVertex> = Vec::new();

        for command in &plan {
            let mesh_component = &avatar.components[command.mesh_part.0 as usize];
            let mesh_part = &mesh_component.render_parts[command.mesh_part.1 as usize];
            let (mesh_id, pose) = match mesh_part {
                RenderPart::SkinnedMesh(mesh) => (mesh.mesh_asset, &mesh.skinned_pose),
                RenderPart::SkinnedMeshPbs(mesh) => (mesh.mesh_asset, &mesh.skinned_pose),
                // The planner never points mesh_part at a projector.
                RenderPart::Projector(_) => continue,
            };
            let Some(mesh_resource) = self.assets.mesh(mesh_id) else {
                // Still loading; the part reappears once the mesh arrives.
                continue;
            };

            let mut world_pose = [Mat4::IDENTITY; MAX_JOINTS];
            compute_world_pose(pose, &mut world_pose);
            let joint_count = pose.joint_count().min(mesh_resource.inverse_bind.len());
            let mut skin = [Mat4::IDENTITY; MAX_JOINTS];
            compute_skin_matrices(
                &world_pose[..joint_count],
                &mesh_resource.inverse_bind[..joint_count],
                &mut skin[..joint_count],
            );

            let part = pack_part(
                &command.world,
                &view_proj,
                viewer_position,
                self.elapsed_seconds,
                &skin[..joint_count],
            );
            let part_offset = self
                .part_uniforms
                .write(&self.queue, bytemuck::bytes_of(&part)) as u32;

            let (material_offset, texture_key) = match command.kind {
                PartKind::Layered => {
                    let source = &avatar.components[command.material_part.0 as usize].render_parts
                        [command.material_part.1 as usize];
                    let Some(material) = layered_material(source) else {
                        continue;
                    };
                    let ids = layered_texture_ids(material);
                    let maps = MapAvailability {
                        alpha: self.assets.texture(ids[0]).is_some(),
                        normal: self.assets.texture(ids[1]).is_some(),
                        parallax: self.assets.texture(ids[2]).is_some(),
                        roughness: self.assets.texture(ids[3]).is_some(),
                    };
                    let uniforms =
                        pack_material(material, maps, command.projector_inv.as_ref());
                    let offset = self
                        .material_uniforms
                        .write(&self.queue, bytemuck::bytes_of(&uniforms))
                        as u32;
                    let key = self.texture_bind_groups.ensure_layered(
                        &self.device,
                        &self.layouts.layered_textures,
                        &self.sampler,
                        &self.assets,
                        &self.fallback_texture.view,
                        &ids,
                    );
                    (offset, key)
                }
                PartKind::Pbs => {
                    let RenderPart::SkinnedMeshPbs(mesh) = mesh_part else {
                        continue;
                    };
                    let key = self.texture_bind_groups.ensure_pbs(
                        &self.device,
                        &self.layouts.pbs_textures,
                        &self.sampler,
                        &self.assets,
                        &self.fallback_texture.view,
                        &[mesh.albedo_texture, mesh.surface_texture],
                    );
                    (null_material_offset, key)
                }
            };

            // One line batch per drawn part; prepass and decal copies skip it.
            let line_range = if debug_joints
                && command.projector_inv.is_none()
                && command.pass != DrawPass::DepthPrepass
            {
                let start = lines.len() as u32;
                let joints = pose.joint_count();
                append_joint_lines(&world_pose[..joints], &pose.parents[..joints], &mut lines);
                let count = lines.len() as u32 - start;
                (count > 0).then_some((start, count))
            } else {
                None
            };

            prepared.push(PreparedDraw {
                kind: command.kind,
                pass: command.pass,
                part_offset,
                material_offset,
                texture_key,
                mesh_id,
                line_range,
            });
        }

        let line_base = if lines.is_empty() {
            0
        } else {
            let bytes: &[u8] = bytemuck::cast_slice(&lines);
            self.line_vertices
                .ensure_capacity(&self.device, self.line_vertices.used() + bytes.len() as u64);
            self.line_vertices.write(&self.queue, bytes)
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Avatar Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in &prepared {
            let Some(mesh_resource) = self.assets.mesh(draw.mesh_id) else {
                continue;
            };
            let Some(textures) = self.texture_bind_groups.get(draw.texture_key) else {
                continue;
            };
            pass.set_pipeline(self.pipelines.for_draw(draw.kind, draw.pass));
            pass.set_bind_group(
                0,
                &self.uniform_bind_group,
                &[draw.part_offset, draw.material_offset],
            );
            pass.set_bind_group(1, textures, &[]);
            pass.set_vertex_buffer(0, mesh_resource.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh_resource.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..mesh_resource.index_count, 0, 0..1);
        }

        if !lines.is_empty() {
            let line_bytes = (lines.len() * std::mem::size_of::<LineVertex>()) as u64;
            pass.set_pipeline(&self.pipelines.debug_line);
            pass.set_vertex_buffer(
                0,
                self.line_vertices
                    .buffer()
                    .slice(line_base..line_base + line_bytes),
            );
            for draw in &prepared {
                if let Some((start, count)) = draw.line_range {
                    pass.set_bind_group(
                        0,
                        &self.uniform_bind_group,
                        &[draw.part_offset, null_material_offset],
                    );
                    pass.draw(start..start + count, 0..1);
                }
            }
        }
    }
}

fn create_uniform_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    part_uniforms: &StreamBuffer,
    material_uniforms: &StreamBuffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Avatar Uniform Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: part_uniforms.buffer(),
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<PartUniforms>() as u64),
                }),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: material_uniforms.buffer(),
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<MaterialUniforms>() as u64),
                }),
            },
        ],
    })
}

/// The material a layered draw binds: the part's own, or the projector's.
fn layered_material(part: &RenderPart) -> Option<&MaterialState> {
    match part {
        RenderPart::SkinnedMesh(mesh) => Some(&mesh.material),
        RenderPart::Projector(projector) => Some(&projector.material),
        RenderPart::SkinnedMeshPbs(_) => None,
    }
}

/// Texture ids in binding order: four single maps, then the layer surfaces.
fn layered_texture_ids(material: &MaterialState) -> [AssetId; LAYERED_TEXTURE_COUNT] {
    let mut ids = [AssetId::NONE; LAYERED_TEXTURE_COUNT];
    ids[0] = material.alpha_mask.texture;
    ids[1] = material.normal_map.texture;
    ids[2] = material.parallax_map.texture;
    ids[3] = material.roughness_map.texture;
    for (slot, layer) in material.active_layers().iter().enumerate() {
        ids[4 + slot] = layer.sample_texture;
    }
    ids
}
