//! GPU uniform layouts shared with the WGSL shaders.
//!
//! Both structs stream through dynamic-offset uniform slots in bind group 0:
//! binding 0 carries [`PartUniforms`] per draw, binding 1 carries
//! [`MaterialUniforms`] for layered draws. Field order and padding here must
//! match `shaders/avatar.wgsl` exactly.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use specter_avatar::{MAX_JOINTS, MAX_MATERIAL_LAYERS, MaterialState};

use crate::buffer::align_up;

/// Dynamic-offset alignment for uniform bindings.
pub const UNIFORM_ALIGNMENT: u64 = 256;

/// Aligned slot size for one [`PartUniforms`] write.
pub const PART_UNIFORMS_STRIDE: u64 =
    align_up(std::mem::size_of::<PartUniforms>() as u64, UNIFORM_ALIGNMENT);

/// Aligned slot size for one [`MaterialUniforms`] write.
pub const MATERIAL_UNIFORMS_STRIDE: u64 =
    align_up(std::mem::size_of::<MaterialUniforms>() as u64, UNIFORM_ALIGNMENT);

/// Per-draw transform and skinning state (binding 0).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct PartUniforms {
    pub world: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    /// xyz = viewer world position, w = elapsed seconds
    pub viewer_pos_elapsed: [f32; 4],
    /// Skin matrices; slots past the mesh joint count hold identity
    pub joints: [[[f32; 4]; 4]; MAX_JOINTS],
}

/// One layer slot of the layered material table.
///
/// Inactive slots are all-zero; the shader loop is bounded by `layer_count`
/// and never reads them.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LayerUniform {
    pub color: [f32; 4],
    pub sample_scale_offset: [f32; 4],
    pub sample_parameters: [f32; 4],
    pub mask_parameters: [f32; 4],
    pub mask_axis: [f32; 4],
    /// x = sample mode, y = blend mode, z = mask type
    pub modes: [u32; 4],
}

/// Layered material state (binding 1).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub base_color: [f32; 4],
    pub base_mask_parameters: [f32; 4],
    pub base_mask_axis: [f32; 4],
    pub alpha_scale_offset: [f32; 4],
    pub normal_scale_offset: [f32; 4],
    pub parallax_scale_offset: [f32; 4],
    pub roughness_scale_offset: [f32; 4],
    pub projector_inv: [[f32; 4]; 4],
    /// x = base mask type, y = active layer count, z = projector enable
    pub controls: [u32; 4],
    /// x/y/z/w = alpha, normal, parallax, roughness map present
    pub map_flags: [u32; 4],
    pub layers: [LayerUniform; MAX_MATERIAL_LAYERS],
}

/// Which single-texture maps have resolved GPU textures this frame.
///
/// Driven by cache residency rather than the declarative ids, so a map only
/// takes effect once its texture has actually arrived.
#[derive(Clone, Copy, Default)]
pub struct MapAvailability {
    pub alpha: bool,
    pub normal: bool,
    pub parallax: bool,
    pub roughness: bool,
}

/// Fill a [`PartUniforms`] value for one draw.
pub fn pack_part(
    world: &Mat4,
    view_proj: &Mat4,
    viewer_position: Vec3,
    elapsed_seconds: f32,
    skin_matrices: &[Mat4],
) -> PartUniforms {
    let mut uniforms = PartUniforms::zeroed();
    uniforms.world = world.to_cols_array_2d();
    uniforms.view_proj = view_proj.to_cols_array_2d();
    uniforms.viewer_pos_elapsed = [
        viewer_position.x,
        viewer_position.y,
        viewer_position.z,
        elapsed_seconds,
    ];
    let identity = Mat4::IDENTITY.to_cols_array_2d();
    for (slot, uniform) in uniforms.joints.iter_mut().enumerate() {
        *uniform = match skin_matrices.get(slot) {
            Some(matrix) => matrix.to_cols_array_2d(),
            None => identity,
        };
    }
    uniforms
}

/// Fill a [`MaterialUniforms`] value from a declarative material.
///
/// Starts from `zeroed()` so every inactive layer slot is structurally zero
/// regardless of previous frames.
pub fn pack_material(
    material: &MaterialState,
    maps: MapAvailability,
    projector_inv: Option<&Mat4>,
) -> MaterialUniforms {
    let mut uniforms = MaterialUniforms::zeroed();
    uniforms.base_color = material.base_color.to_array();
    uniforms.base_mask_parameters = material.base_mask_parameters.to_array();
    uniforms.base_mask_axis = material.base_mask_axis.to_array();
    uniforms.alpha_scale_offset = material.alpha_mask.scale_offset.to_array();
    uniforms.normal_scale_offset = material.normal_map.scale_offset.to_array();
    uniforms.parallax_scale_offset = material.parallax_map.scale_offset.to_array();
    uniforms.roughness_scale_offset = material.roughness_map.scale_offset.to_array();
    uniforms.map_flags = [
        maps.alpha as u32,
        maps.normal as u32,
        maps.parallax as u32,
        maps.roughness as u32,
    ];

    let layers = material.active_layers();
    uniforms.controls[0] = material.base_mask_type as u32;
    uniforms.controls[1] = layers.len() as u32;
    for (slot, layer) in layers.iter().enumerate() {
        uniforms.layers[slot] = LayerUniform {
            color: layer.color.to_array(),
            sample_scale_offset: layer.sample_scale_offset.to_array(),
            sample_parameters: layer.sample_parameters.to_array(),
            mask_parameters: layer.mask_parameters.to_array(),
            mask_axis: layer.mask_axis.to_array(),
            modes: [
                layer.sample_mode as u32,
                layer.blend_mode as u32,
                layer.mask_type as u32,
                0,
            ],
        };
    }

    if let Some(matrix) = projector_inv {
        uniforms.projector_inv = matrix.to_cols_array_2d();
        uniforms.controls[2] = 1;
    }

    uniforms
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;
    use specter_avatar::{LayerBlendMode, LayerSampleMode, MaskType, MaterialLayer};

    #[test]
    fn uniform_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<LayerUniform>(), 96);
        assert_eq!(std::mem::size_of::<MaterialUniforms>(), 976);
        assert_eq!(std::mem::size_of::<PartUniforms>(), 4240);
        assert_eq!(PART_UNIFORMS_STRIDE, 4352);
        assert_eq!(MATERIAL_UNIFORMS_STRIDE, 1024);
    }

    #[test]
    fn unused_layer_slots_are_byte_zero() {
        let mut material = MaterialState::default();
        material.base_color = Vec4::new(1.0, 0.5, 0.25, 1.0);
        let mut layer = MaterialLayer::default();
        layer.blend_mode = LayerBlendMode::Multiply;
        layer.sample_mode = LayerSampleMode::Color;
        layer.color = Vec4::splat(0.5);
        assert!(material.push_layer(layer));
        assert!(material.push_layer(layer));

        let uniforms = pack_material(&material, MapAvailability::default(), None);
        assert_eq!(uniforms.controls[1], 2);
        for slot in 2..MAX_MATERIAL_LAYERS {
            let bytes = bytemuck::bytes_of(&uniforms.layers[slot]);
            assert!(bytes.iter().all(|b| *b == 0), "slot {slot} not zeroed");
        }
    }

    #[test]
    fn layer_table_preserves_order_and_modes() {
        let mut material = MaterialState::default();
        for index in 0..3 {
            let mut layer = MaterialLayer::default();
            layer.sample_mode = LayerSampleMode::Texture;
            layer.blend_mode = LayerBlendMode::Add;
            layer.mask_type = MaskType::Fresnel;
            layer.color = Vec4::splat(index as f32);
            assert!(material.push_layer(layer));
        }

        let uniforms = pack_material(&material, MapAvailability::default(), None);
        for (slot, layer) in uniforms.layers[..3].iter().enumerate() {
            assert_eq!(layer.color[0], slot as f32);
            assert_eq!(layer.modes[0], LayerSampleMode::Texture as u32);
            assert_eq!(layer.modes[1], LayerBlendMode::Add as u32);
            assert_eq!(layer.modes[2], MaskType::Fresnel as u32);
        }
    }

    #[test]
    fn map_flags_track_resolved_textures() {
        let material = MaterialState::default();
        let maps = MapAvailability {
            alpha: true,
            roughness: true,
            ..Default::default()
        };
        let uniforms = pack_material(&material, maps, None);
        assert_eq!(uniforms.map_flags, [1, 0, 0, 1]);
    }

    #[test]
    fn projector_matrix_sets_enable_flag() {
        let material = MaterialState::default();
        let matrix = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));

        let without = pack_material(&material, MapAvailability::default(), None);
        assert_eq!(without.controls[2], 0);

        let with = pack_material(&material, MapAvailability::default(), Some(&matrix));
        assert_eq!(with.controls[2], 1);
        assert_eq!(with.projector_inv, matrix.to_cols_array_2d());
    }

    #[test]
    fn part_pack_pads_joints_with_identity() {
        let skin = [Mat4::from_translation(Vec3::X)];
        let uniforms = pack_part(&Mat4::IDENTITY, &Mat4::IDENTITY, Vec3::ZERO, 2.5, &skin);
        assert_eq!(uniforms.joints[0], skin[0].to_cols_array_2d());
        assert_eq!(uniforms.joints[1], Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(uniforms.joints[MAX_JOINTS - 1], Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(uniforms.viewer_pos_elapsed[3], 2.5);
    }
}
