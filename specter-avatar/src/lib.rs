//! Avatar data model and pose evaluation for the Specter renderer
//!
//! This crate holds everything CPU-side about an avatar: the skeleton and
//! its pose evaluator, material descriptions, controller input, recorded
//! playback packets, asset payload types, and the avatar instance with its
//! per-frame update driver. `specter-render` consumes these types to drive
//! the GPU; nothing here depends on a graphics API.
//!
//! # Modules
//!
//! - [`transform`] - TRS transforms, matrix conversion, plane reflection
//! - [`skeleton`] - parent-indexed skeletons and world-pose evaluation
//! - [`material`] - layered/masked and physically-based material state
//! - [`input`] - per-hand controller state and button/touch bits
//! - [`packet`] - recorded pose packets for playback
//! - [`asset`] - asset ids and mesh/texture payloads
//! - [`avatar`] - avatar instances, provider intake, pose updates

pub mod asset;
pub mod avatar;
pub mod input;
pub mod material;
pub mod packet;
pub mod skeleton;
pub mod transform;

// Re-export the working set most callers need
pub use asset::{AssetId, AssetPayload, MeshData, MeshVertex, TextureData, TextureFormat};
pub use avatar::{
    Avatar,
    AvatarComponent,
    AvatarSpec,
    // Capability bits
    CAPABILITY_BASE,
    CAPABILITY_BODY,
    CAPABILITY_HANDS,
    CAPABILITY_VOICE,
    ProjectorPart,
    ProviderMessage,
    RenderPart,
    SkinnedMeshPart,
    SkinnedMeshPbsPart,
    SpecError,
    // Visibility bits
    VISIBILITY_FIRST_PERSON,
    VISIBILITY_SELF_OCCLUDING,
    VISIBILITY_THIRD_PERSON,
    VOICE_SAMPLE_CAPACITY,
};
pub use input::HandInputState;
pub use material::{
    LayerBlendMode, LayerSampleMode, MAX_MATERIAL_LAYERS, MaskType, MaterialLayer, MaterialState,
    PbsMaterialState, TextureMap,
};
pub use packet::{PacketFrame, PoseKeyframe, PosePacket};
pub use skeleton::{MAX_JOINTS, SkinnedPose, compute_skin_matrices, compute_world_pose};
pub use transform::{Transform, mirrored_view, reflection_matrix};
