//! Skinned mesh upload and vertex layout.

use anyhow::bail;
use glam::Mat4;
use wgpu::util::DeviceExt;

use specter_avatar::{MAX_JOINTS, MeshData, MeshVertex, SkinnedPose, compute_world_pose};

/// Byte stride of [`MeshVertex`] on the GPU.
pub const VERTEX_STRIDE: u64 = std::mem::size_of::<MeshVertex>() as u64;

/// Shader locations in declaration order:
/// - Location 0: position (Float32x3)
/// - Location 1: normal (Float32x3)
/// - Location 2: tangent (Float32x4, w = handedness)
/// - Location 3: uv (Float32x2)
/// - Location 4: blend indices (Uint8x4)
/// - Location 5: blend weights (Float32x4)
const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 6] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 12,
        shader_location: 1,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x4,
        offset: 24,
        shader_location: 2,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 40,
        shader_location: 3,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Uint8x4,
        offset: 48,
        shader_location: 4,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x4,
        offset: 52,
        shader_location: 5,
    },
];

/// Vertex buffer layout for all skinned mesh pipelines.
pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: VERTEX_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

/// GPU-resident mesh with the skinning data needed at draw time.
pub struct MeshResource {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    /// Joints in the mesh bind pose.
    pub joint_count: u32,
    /// Inverse bind-pose world matrix per joint, indexed like the pose.
    pub inverse_bind: Vec<Mat4>,
    pub gpu_bytes: u64,
}

/// Invert the bind pose's joint world transforms.
///
/// Skin matrices are later formed as `joint_world * inverse_bind[joint]`, so
/// a mesh drawn in its bind pose reproduces its authored vertex positions.
pub fn compute_inverse_bind_pose(bind_pose: &SkinnedPose) -> Vec<Mat4> {
    let count = bind_pose.joint_count();
    let mut world = [Mat4::IDENTITY; MAX_JOINTS];
    compute_world_pose(bind_pose, &mut world);
    world[..count].iter().map(|m| m.inverse()).collect()
}

/// Upload mesh data into dedicated vertex/index buffers.
pub fn upload_mesh(device: &wgpu::Device, data: &MeshData) -> anyhow::Result<MeshResource> {
    if data.vertices.is_empty() {
        bail!("mesh has no vertices");
    }
    if data.indices.is_empty() {
        bail!("mesh has no indices");
    }
    if let Some(max_index) = data.indices.iter().copied().max() {
        if max_index as usize >= data.vertices.len() {
            bail!(
                "mesh index {} out of range for {} vertices",
                max_index,
                data.vertices.len()
            );
        }
    }

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Avatar Mesh Vertices"),
        contents: vertex_bytes,
        usage: wgpu::BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Avatar Mesh Indices"),
        contents: index_bytes,
        usage: wgpu::BufferUsages::INDEX,
    });

    let inverse_bind = compute_inverse_bind_pose(&data.bind_pose);

    tracing::debug!(
        vertices = data.vertices.len(),
        indices = data.indices.len(),
        joints = inverse_bind.len(),
        "uploaded mesh"
    );

    Ok(MeshResource {
        vertex_buffer,
        index_buffer,
        index_count: data.indices.len() as u32,
        joint_count: inverse_bind.len() as u32,
        inverse_bind,
        gpu_bytes: vertex_bytes.len() as u64 + index_bytes.len() as u64,
    })
}

/// Estimate GPU bytes for budget checks without uploading.
pub fn mesh_upload_bytes(data: &MeshData) -> u64 {
    (data.vertices.len() * std::mem::size_of::<MeshVertex>() + data.indices.len() * 2) as u64
}
