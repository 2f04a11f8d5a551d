//! Texture bind groups, cached per requested texture set.
//!
//! Keys hash the asset ids a draw asks for, not the views they resolve to,
//! so any texture arrival invalidates the whole cache (via [`TextureBindGroupCache::clear`]);
//! absent ids resolve to the fallback texture until their asset is delivered.

use std::hash::{Hash, Hasher};

use hashbrown::HashMap;

use specter_avatar::AssetId;

use crate::cache::{AssetCache, AssetResource};

/// Layered family texture slots: alpha, normal, parallax, roughness, then
/// the eight layer surfaces. Sampler sits at binding 0, textures at 1..=12.
pub const LAYERED_TEXTURE_COUNT: usize = 12;

/// PBS family texture slots: albedo and surface at bindings 1..=2.
pub const PBS_TEXTURE_COUNT: usize = 2;

/// Key for detecting when a draw can reuse a cached texture bind group.
#[derive(Hash, PartialEq, Eq)]
enum TextureBindKey {
    Layered([AssetId; LAYERED_TEXTURE_COUNT]),
    Pbs([AssetId; PBS_TEXTURE_COUNT]),
}

impl TextureBindKey {
    fn hash_value(&self) -> u64 {
        let mut hasher = xxhash_rust::xxh3::Xxh3::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Bind groups keyed by [`TextureBindKey`] hash.
pub struct TextureBindGroupCache {
    groups: HashMap<u64, wgpu::BindGroup>,
}

impl TextureBindGroupCache {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    /// Drop every cached group. Called when a texture asset is delivered,
    /// since existing groups may reference the fallback (or a replaced
    /// texture) for ids that now resolve differently.
    pub fn clear(&mut self) {
        self.groups.clear();
    }

    pub fn get(&self, key: u64) -> Option<&wgpu::BindGroup> {
        self.groups.get(&key)
    }

    /// Get or create the bind group for a layered draw's texture set.
    /// Returns the cache key to look it up during pass recording.
    #[allow(clippy::too_many_arguments)]
    pub fn ensure_layered(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        cache: &AssetCache<AssetResource>,
        fallback: &wgpu::TextureView,
        ids: &[AssetId; LAYERED_TEXTURE_COUNT],
    ) -> u64 {
        let key = TextureBindKey::Layered(*ids).hash_value();
        self.groups.entry(key).or_insert_with(|| {
            let mut entries = Vec::with_capacity(LAYERED_TEXTURE_COUNT + 1);
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
            for (slot, id) in ids.iter().enumerate() {
                entries.push(wgpu::BindGroupEntry {
                    binding: slot as u32 + 1,
                    resource: wgpu::BindingResource::TextureView(resolve_view(
                        cache, fallback, *id,
                    )),
                });
            }
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Layered Texture Bind Group"),
                layout,
                entries: &entries,
            })
        });
        key
    }

    /// Get or create the bind group for a PBS draw's texture pair.
    pub fn ensure_pbs(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        cache: &AssetCache<AssetResource>,
        fallback: &wgpu::TextureView,
        ids: &[AssetId; PBS_TEXTURE_COUNT],
    ) -> u64 {
        let key = TextureBindKey::Pbs(*ids).hash_value();
        self.groups.entry(key).or_insert_with(|| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("PBS Texture Bind Group"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(resolve_view(
                            cache, fallback, ids[0],
                        )),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(resolve_view(
                            cache, fallback, ids[1],
                        )),
                    },
                ],
            })
        });
        key
    }
}

impl Default for TextureBindGroupCache {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_view<'a>(
    cache: &'a AssetCache<AssetResource>,
    fallback: &'a wgpu::TextureView,
    id: AssetId,
) -> &'a wgpu::TextureView {
    if id.is_none() {
        return fallback;
    }
    match cache.texture(id) {
        Some(texture) => &texture.view,
        None => fallback,
    }
}
