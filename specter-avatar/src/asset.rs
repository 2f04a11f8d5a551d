//! CPU-side asset payloads delivered by the avatar provider.
//!
//! Assets are referenced by opaque 64-bit ids. The provider loads them on
//! its own schedule and delivers each as a typed payload; the renderer
//! uploads payloads to the GPU and caches the result under the same id.

use bytemuck::{Pod, Zeroable};

use crate::skeleton::SkinnedPose;

/// Opaque asset identifier assigned by the provider. Zero means "no asset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AssetId(pub u64);

impl AssetId {
    pub const NONE: Self = Self(0);

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// One skinned mesh vertex, laid out exactly as uploaded to the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
    /// Joint indices into the part's skinned pose.
    pub blend_indices: [u8; 4],
    /// Per-joint weights, expected to sum to 1.
    pub blend_weights: [f32; 4],
}

/// CPU-side mesh payload: vertex/index data plus the rest-state skeleton.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
    /// Bind pose; its per-joint inverse is computed at upload time.
    pub bind_pose: SkinnedPose,
}

/// Encodings the provider delivers textures in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// Uncompressed 8-bit RGB, tightly packed rows.
    Rgb24,
    /// BC1: 8 bytes per 4x4 block.
    Dxt1,
    /// BC3: 16 bytes per 4x4 block.
    Dxt5,
    /// ASTC 6x6. Not consumed by this renderer.
    AstcRgb6x6,
}

/// CPU-side texture payload. `data` holds every mip level back to back,
/// largest first, dimensions halving (floor, min 1) per level.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub data: Vec<u8>,
}

/// Typed payload of a load-completion message.
#[derive(Debug, Clone)]
pub enum AssetPayload {
    Mesh(MeshData),
    Texture(TextureData),
    /// Payload kinds this renderer does not consume (e.g. audio). Produces
    /// no cached resource; not an error.
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_is_tightly_packed() {
        // position 12 + normal 12 + tangent 16 + uv 8 + indices 4 + weights 16
        assert_eq!(std::mem::size_of::<MeshVertex>(), 68);
        assert_eq!(std::mem::align_of::<MeshVertex>(), 4);
    }

    #[test]
    fn test_asset_id_none() {
        assert!(AssetId::NONE.is_none());
        assert!(AssetId::default().is_none());
        assert!(!AssetId(7).is_none());
    }
}
