//! Texture decode planning and GPU upload.
//!
//! Provider textures arrive as a mip chain in one of a few source encodings.
//! Planning is pure CPU work (validation, RGB24 expansion, per-level byte
//! accounting); upload hands the planned bytes to wgpu in layer-major order.

use anyhow::bail;
use wgpu::util::DeviceExt;

use specter_avatar::{TextureData, TextureFormat};

/// BC1 stores a 4x4 texel block in 8 bytes.
const BC1_BLOCK_BYTES: u32 = 8;
/// BC3 stores a 4x4 texel block in 16 bytes.
const BC3_BLOCK_BYTES: u32 = 16;

/// GPU-resident texture with its default view.
pub struct TextureResource {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub gpu_bytes: u64,
}

/// Validated upload: GPU format plus tightly packed mip data, largest first.
pub(crate) struct TextureUploadPlan {
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub data: Vec<u8>,
}

/// Features required to upload every supported texture encoding.
pub fn required_features() -> wgpu::Features {
    wgpu::Features::TEXTURE_COMPRESSION_BC
}

/// Byte size of one mip level in a block-compressed chain.
///
/// Partial blocks round up to a full block, matching the physical size the
/// GPU copy expects for the tail of the chain.
pub(crate) fn compressed_level_bytes(width: u32, height: u32, block_bytes: u32) -> u32 {
    block_bytes * width.div_ceil(4) * height.div_ceil(4)
}

fn max_mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).leading_zeros()
}

/// Validate a provider texture and produce its GPU upload bytes.
///
/// Returns `Ok(None)` for source encodings with no GPU path; the caller
/// leaves the asset unresolved and draws fall back to the default texture.
pub(crate) fn plan_texture_upload(data: &TextureData) -> anyhow::Result<Option<TextureUploadPlan>> {
    if data.width == 0 || data.height == 0 {
        bail!("texture has zero extent ({}x{})", data.width, data.height);
    }
    if data.mip_count == 0 {
        bail!("texture has no mip levels");
    }
    if data.mip_count > max_mip_count(data.width, data.height) {
        bail!(
            "texture {}x{} cannot carry {} mip levels",
            data.width,
            data.height,
            data.mip_count
        );
    }

    match data.format {
        TextureFormat::Rgb24 => {
            // No packed 24-bit GPU format; expand each level to RGBA8.
            let mut expanded = Vec::new();
            let mut cursor = 0usize;
            let (mut width, mut height) = (data.width, data.height);
            for level in 0..data.mip_count {
                let level_bytes = (width * height * 3) as usize;
                let Some(source) = data.data.get(cursor..cursor + level_bytes) else {
                    bail!(
                        "texture data truncated at mip {} ({} of {} bytes)",
                        level,
                        data.data.len(),
                        cursor + level_bytes
                    );
                };
                expanded.reserve(source.len() / 3 * 4);
                for texel in source.chunks_exact(3) {
                    expanded.extend_from_slice(&[texel[0], texel[1], texel[2], 0xff]);
                }
                cursor += level_bytes;
                width = (width / 2).max(1);
                height = (height / 2).max(1);
            }
            Ok(Some(TextureUploadPlan {
                format: wgpu::TextureFormat::Rgba8Unorm,
                width: data.width,
                height: data.height,
                mip_count: data.mip_count,
                data: expanded,
            }))
        }
        TextureFormat::Dxt1 | TextureFormat::Dxt5 => {
            let (format, block_bytes) = match data.format {
                TextureFormat::Dxt1 => (wgpu::TextureFormat::Bc1RgbaUnorm, BC1_BLOCK_BYTES),
                _ => (wgpu::TextureFormat::Bc3RgbaUnorm, BC3_BLOCK_BYTES),
            };
            // Texture creation requires a block-aligned base level; smaller
            // mips may round to partial blocks.
            if data.width % 4 != 0 || data.height % 4 != 0 {
                bail!(
                    "compressed texture is {}x{}; the base level must be 4-aligned",
                    data.width,
                    data.height
                );
            }
            let mut total = 0usize;
            let (mut width, mut height) = (data.width, data.height);
            for _ in 0..data.mip_count {
                total += compressed_level_bytes(width, height, block_bytes) as usize;
                width = (width / 2).max(1);
                height = (height / 2).max(1);
            }
            let Some(source) = data.data.get(..total) else {
                bail!(
                    "texture data truncated ({} of {} bytes)",
                    data.data.len(),
                    total
                );
            };
            Ok(Some(TextureUploadPlan {
                format,
                width: data.width,
                height: data.height,
                mip_count: data.mip_count,
                data: source.to_vec(),
            }))
        }
        TextureFormat::AstcRgb6x6 => {
            tracing::warn!(
                "texture encoding {:?} has no GPU path, leaving asset unresolved",
                data.format
            );
            Ok(None)
        }
    }
}

/// Upload a provider texture.
///
/// `Ok(None)` means the encoding is unsupported and the asset stays absent;
/// errors mean the data itself is malformed.
pub fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    data: &TextureData,
) -> anyhow::Result<Option<TextureResource>> {
    let Some(plan) = plan_texture_upload(data)? else {
        return Ok(None);
    };

    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("Avatar Texture"),
            size: wgpu::Extent3d {
                width: plan.width,
                height: plan.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: plan.mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: plan.format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &plan.data,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    tracing::debug!(
        width = plan.width,
        height = plan.height,
        mips = plan.mip_count,
        format = ?plan.format,
        "uploaded texture"
    );

    Ok(Some(TextureResource {
        texture,
        view,
        gpu_bytes: plan.data.len() as u64,
    }))
}

/// Create the 1x1 white texture bound wherever a real texture is absent.
pub fn create_fallback_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> TextureResource {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("Fallback Texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &[0xff, 0xff, 0xff, 0xff],
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureResource {
        texture,
        view,
        gpu_bytes: 4,
    }
}
