//! Material descriptions for avatar render parts.
//!
//! Providers hand these over declaratively; the renderer packs them into
//! uniform state. Two families exist: the layered/masked material used by
//! most avatar geometry (base color plus up to [`MAX_MATERIAL_LAYERS`]
//! blended layers) and a slim physically-based variant with exactly an
//! albedo and a surface map.

use glam::Vec4;

use crate::asset::AssetId;

/// Maximum blend layers per material. Matches the shader's layer table.
pub const MAX_MATERIAL_LAYERS: usize = 8;

/// How a layer's color contribution combines with the running result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum LayerBlendMode {
    #[default]
    Add = 0,
    Multiply = 1,
}

impl LayerBlendMode {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Multiply,
            _ => Self::Add,
        }
    }
}

/// Where a layer's color sample comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum LayerSampleMode {
    /// Flat layer color, no texture fetch.
    #[default]
    Color = 0,
    Texture = 1,
    /// Texture fetch, red channel replicated.
    TextureSingleChannel = 2,
    /// Height-map driven UV displacement before the fetch.
    Parallax = 3,
}

impl LayerSampleMode {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Texture,
            2 => Self::TextureSingleChannel,
            3 => Self::Parallax,
            _ => Self::Color,
        }
    }
}

/// Spatial/temporal mask shaping a layer's (or the base's) contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum MaskType {
    #[default]
    None = 0,
    /// Distance falloff from a point along `mask_axis`.
    Positional = 1,
    /// View-reflection lookup, mask parameters shape the lobe.
    ViewReflection = 2,
    /// View-angle fresnel falloff.
    Fresnel = 3,
    /// Time-driven pulse travelling along `mask_axis`.
    Pulse = 4,
}

impl MaskType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Positional,
            2 => Self::ViewReflection,
            3 => Self::Fresnel,
            4 => Self::Pulse,
            _ => Self::None,
        }
    }
}

/// A texture reference plus its UV scale (xy) and offset (zw).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureMap {
    pub texture: AssetId,
    pub scale_offset: Vec4,
}

impl Default for TextureMap {
    fn default() -> Self {
        Self {
            texture: AssetId::NONE,
            scale_offset: Vec4::new(1.0, 1.0, 0.0, 0.0),
        }
    }
}

/// One entry of the ordered layer table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialLayer {
    pub blend_mode: LayerBlendMode,
    pub sample_mode: LayerSampleMode,
    pub mask_type: MaskType,
    pub color: Vec4,
    pub sample_parameters: Vec4,
    pub sample_texture: AssetId,
    pub sample_scale_offset: Vec4,
    pub mask_parameters: Vec4,
    pub mask_axis: Vec4,
}

impl MaterialLayer {
    /// The all-zero inactive slot. Every field reads as "contribute
    /// nothing" so padding slots never affect shading.
    pub const INACTIVE: Self = Self {
        blend_mode: LayerBlendMode::Add,
        sample_mode: LayerSampleMode::Color,
        mask_type: MaskType::None,
        color: Vec4::ZERO,
        sample_parameters: Vec4::ZERO,
        sample_texture: AssetId::NONE,
        sample_scale_offset: Vec4::ZERO,
        mask_parameters: Vec4::ZERO,
        mask_axis: Vec4::ZERO,
    };
}

impl Default for MaterialLayer {
    fn default() -> Self {
        Self::INACTIVE
    }
}

/// Layered/masked material: base color + four optional single maps + an
/// ordered layer table.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialState {
    pub base_color: Vec4,
    pub base_mask_type: MaskType,
    pub base_mask_parameters: Vec4,
    pub base_mask_axis: Vec4,
    pub alpha_mask: TextureMap,
    pub normal_map: TextureMap,
    pub parallax_map: TextureMap,
    pub roughness_map: TextureMap,
    pub layer_count: u32,
    pub layers: [MaterialLayer; MAX_MATERIAL_LAYERS],
}

impl MaterialState {
    /// Appends a layer; returns false once the table is full.
    pub fn push_layer(&mut self, layer: MaterialLayer) -> bool {
        let index = self.layer_count as usize;
        if index >= MAX_MATERIAL_LAYERS {
            return false;
        }
        self.layers[index] = layer;
        self.layer_count += 1;
        true
    }

    /// The populated prefix of the layer table, clamped to capacity.
    pub fn active_layers(&self) -> &[MaterialLayer] {
        let count = (self.layer_count as usize).min(MAX_MATERIAL_LAYERS);
        &self.layers[..count]
    }
}

impl Default for MaterialState {
    fn default() -> Self {
        Self {
            base_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            base_mask_type: MaskType::None,
            base_mask_parameters: Vec4::ZERO,
            base_mask_axis: Vec4::ZERO,
            alpha_mask: TextureMap::default(),
            normal_map: TextureMap::default(),
            parallax_map: TextureMap::default(),
            roughness_map: TextureMap::default(),
            layer_count: 0,
            layers: [MaterialLayer::INACTIVE; MAX_MATERIAL_LAYERS],
        }
    }
}

/// Physically-based material: albedo + packed surface map, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PbsMaterialState {
    pub albedo_texture: AssetId,
    pub surface_texture: AssetId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_from_u32_roundtrip() {
        assert_eq!(LayerBlendMode::from_u32(0), LayerBlendMode::Add);
        assert_eq!(LayerBlendMode::from_u32(1), LayerBlendMode::Multiply);
        assert_eq!(LayerSampleMode::from_u32(3), LayerSampleMode::Parallax);
        assert_eq!(MaskType::from_u32(4), MaskType::Pulse);
    }

    #[test]
    fn test_enum_from_u32_unknown_falls_back() {
        assert_eq!(LayerBlendMode::from_u32(99), LayerBlendMode::Add);
        assert_eq!(LayerSampleMode::from_u32(99), LayerSampleMode::Color);
        assert_eq!(MaskType::from_u32(99), MaskType::None);
    }

    #[test]
    fn test_push_layer_respects_capacity() {
        let mut material = MaterialState::default();
        for _ in 0..MAX_MATERIAL_LAYERS {
            assert!(material.push_layer(MaterialLayer {
                color: Vec4::ONE,
                ..MaterialLayer::INACTIVE
            }));
        }
        assert!(!material.push_layer(MaterialLayer::INACTIVE));
        assert_eq!(material.layer_count as usize, MAX_MATERIAL_LAYERS);
    }

    #[test]
    fn test_active_layers_clamps_hostile_count() {
        let mut material = MaterialState::default();
        material.layer_count = 1000;
        assert_eq!(material.active_layers().len(), MAX_MATERIAL_LAYERS);
    }

    #[test]
    fn test_inactive_layer_is_all_zero_parameters() {
        let layer = MaterialLayer::default();
        assert_eq!(layer.color, Vec4::ZERO);
        assert_eq!(layer.sample_scale_offset, Vec4::ZERO);
        assert_eq!(layer.sample_texture, AssetId::NONE);
        assert_eq!(layer.mask_type, MaskType::None);
    }
}
