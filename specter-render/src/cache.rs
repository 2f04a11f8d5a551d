//! GPU asset cache keyed by provider asset id.
//!
//! Loaded meshes and textures are retained for the lifetime of the context;
//! draw code looks resources up by id each frame and skips anything that has
//! not arrived yet.

use hashbrown::HashMap;

use specter_avatar::AssetId;

use crate::mesh::MeshResource;
use crate::texture::TextureResource;

/// GPU-resident payload for a loaded asset.
pub enum AssetResource {
    Mesh(MeshResource),
    Texture(TextureResource),
}

/// Anything the cache can account for against the asset budget.
pub trait ResourceFootprint {
    /// Approximate GPU bytes held by this resource.
    fn gpu_bytes(&self) -> u64;
}

impl ResourceFootprint for AssetResource {
    fn gpu_bytes(&self) -> u64 {
        match self {
            AssetResource::Mesh(mesh) => mesh.gpu_bytes,
            AssetResource::Texture(texture) => texture.gpu_bytes,
        }
    }
}

/// Id-keyed resource map with byte accounting.
///
/// Insertion is last-write-wins: re-delivering an asset id replaces the
/// previous resource and the byte count follows.
pub struct AssetCache<R> {
    entries: HashMap<AssetId, R>,
    total_bytes: u64,
}

impl<R: ResourceFootprint> AssetCache<R> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            total_bytes: 0,
        }
    }

    /// Look up a resource, `None` until the asset has been delivered.
    pub fn get(&self, id: AssetId) -> Option<&R> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Store a resource under `id`, replacing any previous entry.
    pub fn insert(&mut self, id: AssetId, resource: R) {
        let added = resource.gpu_bytes();
        if let Some(previous) = self.entries.insert(id, resource) {
            self.total_bytes -= previous.gpu_bytes();
        }
        self.total_bytes += added;
    }

    pub fn remove(&mut self, id: AssetId) -> Option<R> {
        let removed = self.entries.remove(&id);
        if let Some(resource) = &removed {
            self.total_bytes -= resource.gpu_bytes();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total GPU bytes across all retained resources.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

impl<R: ResourceFootprint> Default for AssetCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetCache<AssetResource> {
    /// Typed lookup for mesh draws. `None` if absent or not a mesh.
    pub fn mesh(&self, id: AssetId) -> Option<&MeshResource> {
        match self.get(id) {
            Some(AssetResource::Mesh(mesh)) => Some(mesh),
            _ => None,
        }
    }

    /// Typed lookup for texture binds. `None` if absent or not a texture.
    pub fn texture(&self, id: AssetId) -> Option<&TextureResource> {
        match self.get(id) {
            Some(AssetResource::Texture(texture)) => Some(texture),
            _ => None,
        }
    }
}
