//! Joint hierarchy visualization.
//!
//! When enabled, each skinned part draws one line per non-root joint, from
//! the parent's pose-space position (white) to the joint's (red). Vertices
//! are generated on the CPU in part space and transformed by the part's
//! world matrix like the mesh itself.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Line endpoint color at the parent joint.
const PARENT_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
/// Line endpoint color at the child joint.
const JOINT_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

/// Byte stride of [`LineVertex`] on the GPU.
pub const LINE_VERTEX_STRIDE: u64 = std::mem::size_of::<LineVertex>() as u64;

const LINE_ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x4,
        offset: 12,
        shader_location: 1,
    },
];

pub fn line_vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: LINE_VERTEX_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &LINE_ATTRIBUTES,
    }
}

/// Append parent-to-joint line segments for one evaluated pose.
///
/// `world_pose` holds the pose-space joint matrices; `parents` pairs with it
/// index-for-index. Joints with no parent contribute nothing.
pub fn append_joint_lines(world_pose: &[Mat4], parents: &[i32], out: &mut Vec<LineVertex>) {
    let count = world_pose.len().min(parents.len());
    for joint in 1..count {
        let parent = parents[joint];
        if parent < 0 {
            continue;
        }
        let parent_position = world_pose[parent as usize].w_axis.truncate();
        let joint_position = world_pose[joint].w_axis.truncate();
        out.push(LineVertex {
            position: parent_position.to_array(),
            color: PARENT_COLOR,
        });
        out.push(LineVertex {
            position: joint_position.to_array(),
            color: JOINT_COLOR,
        });
    }
}
