//! wgpu renderer for Specter avatars
//!
//! Consumes the `specter-avatar` data model and turns it into GPU work: a
//! [`RenderContext`](context::RenderContext) ingests provider messages,
//! uploads mesh/texture assets into an id-keyed cache, and each frame plans
//! a draw list from the avatar hierarchy and records it into a
//! caller-supplied encoder. Pose evaluation happens on the CPU; skinning
//! runs in the vertex shader from streamed joint matrices.
//!
//! # Modules
//!
//! - [`context`] - the renderer context and per-frame entry points
//! - [`command`] - CPU draw planning (visibility, prepass, projectors)
//! - [`cache`] - id-keyed GPU asset cache with byte accounting
//! - [`mesh`] / [`texture`] - asset upload paths
//! - [`uniforms`] - shader-facing uniform layouts and packing
//! - [`binding`] - cached texture bind groups
//! - [`pipeline`] - bind group layouts and the fixed pipeline set
//! - [`buffer`] - per-frame streaming buffers
//! - [`debug`] - joint hierarchy line visualization

pub mod binding;
pub mod buffer;
pub mod cache;
pub mod command;
pub mod context;
pub mod debug;
pub mod mesh;
pub mod pipeline;
pub mod texture;
pub mod uniforms;

// Re-export the working set most callers need
pub use cache::{AssetCache, AssetResource};
pub use command::{DrawCommand, DrawPass, DrawPlan, PartKind, plan_avatar};
pub use context::{RenderConfig, RenderContext};
pub use mesh::MeshResource;
pub use texture::TextureResource;
