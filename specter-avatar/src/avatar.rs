//! Avatar instances: component hierarchy, provider intake, and the
//! per-frame pose update driver.
//!
//! # Architecture
//!
//! The provider describes an avatar once (an [`AvatarSpec`] message); the
//! description is validated at that boundary and becomes an [`Avatar`]
//! instance. After that, two things happen per frame:
//!
//! 1. `update_pose` refreshes component transforms from either live
//!    tracking input or a recorded [`PosePacket`] (never both), then
//!    finalizes smoothing with the elapsed delta.
//! 2. The renderer walks `components` and draws each [`RenderPart`].
//!
//! Render parts form a closed sum type; adding a kind is a compile-time
//! change, not a runtime fallthrough.

use thiserror::Error;

use crate::asset::AssetId;
use crate::input::HandInputState;
use crate::material::{MAX_MATERIAL_LAYERS, MaterialState};
use crate::packet::PosePacket;
use crate::skeleton::{MAX_JOINTS, SkinnedPose};
use crate::transform::Transform;

/// Part is drawn in the first-person (own eyes) view.
pub const VISIBILITY_FIRST_PERSON: u32 = 1 << 0;
/// Part is drawn in the third-person (mirror) view.
pub const VISIBILITY_THIRD_PERSON: u32 = 1 << 1;
/// Part depth-prepasses against itself before shading.
pub const VISIBILITY_SELF_OCCLUDING: u32 = 1 << 2;

/// Avatar has a tracked body/torso.
pub const CAPABILITY_BODY: u32 = 1 << 0;
/// Avatar has tracked hands.
pub const CAPABILITY_HANDS: u32 = 1 << 1;
/// Avatar has a base cone/platform.
pub const CAPABILITY_BASE: u32 = 1 << 2;
/// Avatar visualizes microphone amplitude.
pub const CAPABILITY_VOICE: u32 = 1 << 3;

/// Most samples folded into one voice-visualization update (1 s at 48 kHz).
pub const VOICE_SAMPLE_CAPACITY: usize = 48000;

const VOICE_ATTACK_RATE: f32 = 16.0;
const VOICE_DECAY_RATE: f32 = 3.0;

/// Skinned mesh drawn with the layered/masked material.
#[derive(Debug, Clone)]
pub struct SkinnedMeshPart {
    pub local_transform: Transform,
    pub visibility_mask: u32,
    pub mesh_asset: AssetId,
    pub material: MaterialState,
    pub skinned_pose: SkinnedPose,
}

/// Skinned mesh drawn with the physically-based two-map material.
#[derive(Debug, Clone)]
pub struct SkinnedMeshPbsPart {
    pub local_transform: Transform,
    pub visibility_mask: u32,
    pub mesh_asset: AssetId,
    pub albedo_texture: AssetId,
    pub surface_texture: AssetId,
    pub skinned_pose: SkinnedPose,
}

/// Decal projected onto another part's geometry.
///
/// `component_index`/`render_part_index` form a non-owning back-reference
/// into the same hierarchy, resolved at render time. The projector's own
/// local transform defines the projection volume.
#[derive(Debug, Clone)]
pub struct ProjectorPart {
    pub local_transform: Transform,
    pub component_index: u32,
    pub render_part_index: u32,
    pub material: MaterialState,
}

/// One drawable unit attached to a component.
#[derive(Debug, Clone)]
pub enum RenderPart {
    SkinnedMesh(SkinnedMeshPart),
    SkinnedMeshPbs(SkinnedMeshPbsPart),
    Projector(ProjectorPart),
}

impl RenderPart {
    /// Collects the asset ids this part references, in slot order.
    fn collect_assets(&self, out: &mut Vec<AssetId>) {
        let mut push = |id: AssetId| {
            if !id.is_none() && !out.contains(&id) {
                out.push(id);
            }
        };
        match self {
            RenderPart::SkinnedMesh(part) => {
                push(part.mesh_asset);
                push(part.material.alpha_mask.texture);
                push(part.material.normal_map.texture);
                push(part.material.parallax_map.texture);
                push(part.material.roughness_map.texture);
                for layer in part.material.active_layers() {
                    push(layer.sample_texture);
                }
            }
            RenderPart::SkinnedMeshPbs(part) => {
                push(part.mesh_asset);
                push(part.albedo_texture);
                push(part.surface_texture);
            }
            RenderPart::Projector(part) => {
                push(part.material.alpha_mask.texture);
                push(part.material.normal_map.texture);
                push(part.material.parallax_map.texture);
                push(part.material.roughness_map.texture);
                for layer in part.material.active_layers() {
                    push(layer.sample_texture);
                }
            }
        }
    }
}

/// One node of the avatar hierarchy: a transform plus its render parts.
#[derive(Debug, Clone)]
pub struct AvatarComponent {
    pub name: String,
    pub transform: Transform,
    pub render_parts: Vec<RenderPart>,
}

/// Provider-authored avatar description. Validated by [`Avatar::from_spec`].
#[derive(Debug, Clone, Default)]
pub struct AvatarSpec {
    pub capabilities: u32,
    pub components: Vec<AvatarComponent>,
    /// Component posed from the head transform, if any.
    pub body_component: Option<u32>,
    pub left_hand_component: Option<u32>,
    pub right_hand_component: Option<u32>,
}

/// Rejection reasons for a malformed [`AvatarSpec`].
///
/// This is the one boundary where external data is validated; past it, the
/// in-core joint/layer invariants hold by construction.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("component index {index} out of range ({count} components)")]
    ComponentIndexOutOfRange { index: u32, count: usize },
    #[error(
        "component {component} part {part}: {joints} joints exceeds the limit of {max}",
        max = MAX_JOINTS
    )]
    TooManyJoints {
        component: usize,
        part: usize,
        joints: u32,
    },
    #[error(
        "component {component} part {part}: joint {joint} has parent {parent}, \
         parents must precede children"
    )]
    UnorderedJoints {
        component: usize,
        part: usize,
        joint: usize,
        parent: i32,
    },
    #[error(
        "component {component} part {part}: {layers} layers exceeds the limit of {max}",
        max = MAX_MATERIAL_LAYERS
    )]
    TooManyLayers {
        component: usize,
        part: usize,
        layers: u32,
    },
}

/// Messages delivered by the provider's poll-drained queue.
#[derive(Debug, Clone)]
pub enum ProviderMessage {
    /// A new avatar description. Creates an instance and triggers one load
    /// per referenced asset.
    AvatarSpec(AvatarSpec),
    /// A load completion for a previously referenced asset.
    AssetLoaded {
        id: AssetId,
        payload: crate::asset::AssetPayload,
    },
}

/// A live avatar instance.
#[derive(Debug, Clone)]
pub struct Avatar {
    pub capabilities: u32,
    pub components: Vec<AvatarComponent>,
    body_component: Option<u32>,
    left_hand_component: Option<u32>,
    right_hand_component: Option<u32>,
    /// Distinct asset ids referenced by this avatar, first-reference order.
    referenced_assets: Vec<AssetId>,
    /// Referenced assets not yet delivered by the provider.
    pending_assets: u32,
    playback_time: f32,
    elapsed_seconds: f32,
    voice_amplitude: f32,
    voice_target: f32,
    pub head: Transform,
    pub left_hand_input: HandInputState,
    pub right_hand_input: HandInputState,
}

impl Avatar {
    /// Validates a provider spec and instantiates the avatar.
    ///
    /// Projector back-references are not range-checked here; they resolve
    /// (or skip, with a log) against the live hierarchy at render time.
    pub fn from_spec(spec: AvatarSpec) -> Result<Self, SpecError> {
        let count = spec.components.len();
        for index in [
            spec.body_component,
            spec.left_hand_component,
            spec.right_hand_component,
        ]
        .into_iter()
        .flatten()
        {
            if index as usize >= count {
                return Err(SpecError::ComponentIndexOutOfRange { index, count });
            }
        }

        for (ci, component) in spec.components.iter().enumerate() {
            for (pi, part) in component.render_parts.iter().enumerate() {
                match part {
                    RenderPart::SkinnedMesh(mesh) => {
                        validate_pose(ci, pi, &mesh.skinned_pose)?;
                        validate_material(ci, pi, &mesh.material)?;
                    }
                    RenderPart::SkinnedMeshPbs(mesh) => {
                        validate_pose(ci, pi, &mesh.skinned_pose)?;
                    }
                    RenderPart::Projector(projector) => {
                        validate_material(ci, pi, &projector.material)?;
                    }
                }
            }
        }

        let mut referenced_assets = Vec::new();
        for component in &spec.components {
            for part in &component.render_parts {
                part.collect_assets(&mut referenced_assets);
            }
        }
        let pending_assets = referenced_assets.len() as u32;
        tracing::debug!(
            components = count,
            assets = pending_assets,
            "avatar instantiated from spec"
        );

        Ok(Self {
            capabilities: spec.capabilities,
            components: spec.components,
            body_component: spec.body_component,
            left_hand_component: spec.left_hand_component,
            right_hand_component: spec.right_hand_component,
            referenced_assets,
            pending_assets,
            playback_time: 0.0,
            elapsed_seconds: 0.0,
            voice_amplitude: 0.0,
            voice_target: 0.0,
            head: Transform::IDENTITY,
            left_hand_input: HandInputState::default(),
            right_hand_input: HandInputState::default(),
        })
    }

    /// Asset ids the provider should begin loading, deduplicated.
    pub fn referenced_assets(&self) -> &[AssetId] {
        &self.referenced_assets
    }

    /// Marks one referenced asset as delivered (any payload kind counts).
    pub fn asset_delivered(&mut self, id: AssetId) {
        if self.pending_assets > 0 {
            self.pending_assets -= 1;
        }
        tracing::debug!(id = id.0, remaining = self.pending_assets, "asset delivered");
    }

    /// True while referenced assets are still in flight. Informational:
    /// rendering degrades per part rather than gating on this.
    pub fn is_loading(&self) -> bool {
        self.pending_assets > 0
    }

    /// Seconds into the current playback loop.
    pub fn playback_time(&self) -> f32 {
        self.playback_time
    }

    /// Total seconds accumulated across `finalize` calls.
    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed_seconds
    }

    /// Smoothed voice amplitude in [0, 1].
    pub fn voice_amplitude(&self) -> f32 {
        self.voice_amplitude
    }

    /// Advances the avatar's pose by `delta_seconds`.
    ///
    /// With a non-empty `packet` the avatar replays recorded input: the
    /// playback cursor advances by `delta_seconds` and wraps modulo the
    /// packet duration, carrying the remainder into the next loop. Without
    /// one, the live tracking inputs pose the avatar. Exactly one path runs
    /// per call; both end in [`Avatar::finalize`].
    pub fn update_pose(
        &mut self,
        delta_seconds: f32,
        head: Transform,
        left_hand: HandInputState,
        right_hand: HandInputState,
        packet: Option<&PosePacket>,
    ) {
        match packet {
            Some(packet) if !packet.is_empty() => {
                let duration = packet.duration_seconds();
                self.playback_time += delta_seconds;
                if duration > 0.0 && self.playback_time > duration {
                    // Loop: wrap the cursor, keep the overshoot. The
                    // resample below fully restates the pose at the
                    // wrapped time.
                    self.playback_time %= duration;
                }
                if let Some(frame) = packet.sample(self.playback_time) {
                    self.apply_body(frame.head);
                    self.apply_hands(frame.left_hand, frame.right_hand);
                }
            }
            _ => {
                self.apply_body(head);
                self.apply_hands(left_hand, right_hand);
            }
        }
        self.finalize(delta_seconds);
    }

    /// Folds up to [`VOICE_SAMPLE_CAPACITY`] microphone samples into the
    /// voice-visualization target amplitude. Excess samples are ignored.
    pub fn update_voice_visualization(&mut self, samples: &[f32]) {
        if self.capabilities & CAPABILITY_VOICE == 0 || samples.is_empty() {
            return;
        }
        let samples = &samples[..samples.len().min(VOICE_SAMPLE_CAPACITY)];
        let mean_square: f32 =
            samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        self.voice_target = mean_square.sqrt().min(1.0);
    }

    /// Applies per-frame smoothing: accumulates elapsed time and eases the
    /// voice amplitude toward (then past) its target.
    pub fn finalize(&mut self, delta_seconds: f32) {
        self.elapsed_seconds += delta_seconds;
        let attack = (delta_seconds * VOICE_ATTACK_RATE).min(1.0);
        self.voice_amplitude += (self.voice_target - self.voice_amplitude) * attack;
        let decay = (delta_seconds * VOICE_DECAY_RATE).min(1.0);
        self.voice_target -= self.voice_target * decay;
    }

    fn apply_body(&mut self, head: Transform) {
        self.head = head;
        if self.capabilities & CAPABILITY_BODY == 0 {
            return;
        }
        if let Some(component) = self.component_mut(self.body_component) {
            component.transform = head;
        }
    }

    fn apply_hands(&mut self, left: HandInputState, right: HandInputState) {
        self.left_hand_input = left;
        self.right_hand_input = right;
        if self.capabilities & CAPABILITY_HANDS == 0 {
            return;
        }
        if left.is_active {
            if let Some(component) = self.component_mut(self.left_hand_component) {
                component.transform = left.transform;
            }
        }
        if right.is_active {
            if let Some(component) = self.component_mut(self.right_hand_component) {
                component.transform = right.transform;
            }
        }
    }

    fn component_mut(&mut self, index: Option<u32>) -> Option<&mut AvatarComponent> {
        index.and_then(|i| self.components.get_mut(i as usize))
    }
}

fn validate_pose(component: usize, part: usize, pose: &SkinnedPose) -> Result<(), SpecError> {
    if pose.joint_count() > MAX_JOINTS {
        return Err(SpecError::TooManyJoints {
            component,
            part,
            joints: pose.joint_count,
        });
    }
    for joint in 0..pose.joint_count() {
        let parent = pose.parents[joint];
        if parent >= joint as i32 {
            return Err(SpecError::UnorderedJoints {
                component,
                part,
                joint,
                parent,
            });
        }
    }
    Ok(())
}

fn validate_material(
    component: usize,
    part: usize,
    material: &MaterialState,
) -> Result<(), SpecError> {
    if material.layer_count as usize > MAX_MATERIAL_LAYERS {
        return Err(SpecError::TooManyLayers {
            component,
            part,
            layers: material.layer_count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketFrame, PosePacket};
    use glam::Vec3;

    fn mesh_part(mesh_asset: AssetId) -> RenderPart {
        RenderPart::SkinnedMesh(SkinnedMeshPart {
            local_transform: Transform::IDENTITY,
            visibility_mask: VISIBILITY_FIRST_PERSON,
            mesh_asset,
            material: MaterialState::default(),
            skinned_pose: SkinnedPose::from_joints(&[(Transform::IDENTITY, -1)]),
        })
    }

    fn spec_with_components(n: usize) -> AvatarSpec {
        AvatarSpec {
            capabilities: CAPABILITY_BODY | CAPABILITY_HANDS | CAPABILITY_VOICE,
            components: (0..n)
                .map(|i| AvatarComponent {
                    name: format!("component_{}", i),
                    transform: Transform::IDENTITY,
                    render_parts: vec![mesh_part(AssetId(100 + i as u64))],
                })
                .collect(),
            body_component: Some(0),
            left_hand_component: if n > 1 { Some(1) } else { None },
            right_hand_component: if n > 2 { Some(2) } else { None },
        }
    }

    #[test]
    fn test_from_spec_builds_instance() {
        let avatar = Avatar::from_spec(spec_with_components(3)).unwrap();
        assert_eq!(avatar.components.len(), 3);
        assert_eq!(avatar.referenced_assets().len(), 3);
        assert!(avatar.is_loading());
    }

    #[test]
    fn test_from_spec_rejects_bad_component_index() {
        let mut spec = spec_with_components(2);
        spec.right_hand_component = Some(9);
        assert!(matches!(
            Avatar::from_spec(spec),
            Err(SpecError::ComponentIndexOutOfRange { index: 9, .. })
        ));
    }

    #[test]
    fn test_from_spec_rejects_unordered_joints() {
        let mut spec = spec_with_components(1);
        let mut pose = SkinnedPose::from_joints(&[
            (Transform::IDENTITY, -1),
            (Transform::IDENTITY, 0),
        ]);
        pose.parents[1] = 1; // self-parented
        spec.components[0].render_parts[0] = RenderPart::SkinnedMesh(SkinnedMeshPart {
            local_transform: Transform::IDENTITY,
            visibility_mask: 0,
            mesh_asset: AssetId(1),
            material: MaterialState::default(),
            skinned_pose: pose,
        });
        assert!(matches!(
            Avatar::from_spec(spec),
            Err(SpecError::UnorderedJoints { joint: 1, .. })
        ));
    }

    #[test]
    fn test_from_spec_rejects_layer_overflow() {
        let mut spec = spec_with_components(1);
        if let RenderPart::SkinnedMesh(mesh) = &mut spec.components[0].render_parts[0] {
            mesh.material.layer_count = MAX_MATERIAL_LAYERS as u32 + 1;
        }
        assert!(matches!(
            Avatar::from_spec(spec),
            Err(SpecError::TooManyLayers { .. })
        ));
    }

    #[test]
    fn test_referenced_assets_deduplicate() {
        let mut spec = spec_with_components(1);
        spec.components[0].render_parts.push(mesh_part(AssetId(100)));
        let avatar = Avatar::from_spec(spec).unwrap();
        assert_eq!(avatar.referenced_assets(), &[AssetId(100)]);
    }

    #[test]
    fn test_asset_delivery_clears_loading() {
        let mut avatar = Avatar::from_spec(spec_with_components(2)).unwrap();
        assert!(avatar.is_loading());
        avatar.asset_delivered(AssetId(100));
        avatar.asset_delivered(AssetId(101));
        assert!(!avatar.is_loading());
        // Extra deliveries are harmless
        avatar.asset_delivered(AssetId(999));
        assert!(!avatar.is_loading());
    }

    #[test]
    fn test_live_update_poses_body_and_hands() {
        let mut avatar = Avatar::from_spec(spec_with_components(3)).unwrap();
        let head = Transform::from_position(Vec3::new(0.0, 1.7, 0.0));
        let left = HandInputState {
            transform: Transform::from_position(Vec3::new(-0.3, 1.2, -0.2)),
            is_active: true,
            ..Default::default()
        };
        let right = HandInputState {
            transform: Transform::from_position(Vec3::new(0.3, 1.2, -0.2)),
            is_active: false,
            ..Default::default()
        };
        avatar.update_pose(0.016, head, left, right, None);

        assert_eq!(avatar.components[0].transform.position, head.position);
        assert_eq!(
            avatar.components[1].transform.position,
            left.transform.position
        );
        // Inactive hand stays where it was
        assert_eq!(avatar.components[2].transform.position, Vec3::ZERO);
    }

    #[test]
    fn test_playback_cursor_carries_remainder() {
        let mut avatar = Avatar::from_spec(spec_with_components(1)).unwrap();
        let mut packet = PosePacket::new();
        packet.record(0.0, PacketFrame::default());
        packet.record(
            2.0,
            PacketFrame {
                head: Transform::from_position(Vec3::new(4.0, 0.0, 0.0)),
                ..Default::default()
            },
        );

        let idle = Transform::IDENTITY;
        let hands = HandInputState::default();
        avatar.update_pose(1.5, idle, hands, hands, Some(&packet));
        assert!((avatar.playback_time() - 1.5).abs() < 1e-6);

        avatar.update_pose(1.0, idle, hands, hands, Some(&packet));
        assert!(
            (avatar.playback_time() - 0.5).abs() < 1e-6,
            "cursor should wrap 2.5 -> 0.5, got {}",
            avatar.playback_time()
        );
        // Pose restates from the wrapped cursor: x = 4.0 * 0.5 / 2.0
        assert!((avatar.components[0].transform.position.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_packet_overrides_live_input() {
        let mut avatar = Avatar::from_spec(spec_with_components(1)).unwrap();
        let mut packet = PosePacket::new();
        packet.record(
            0.0,
            PacketFrame {
                head: Transform::from_position(Vec3::new(7.0, 0.0, 0.0)),
                ..Default::default()
            },
        );
        packet.record(1.0, PacketFrame::default());

        let live_head = Transform::from_position(Vec3::new(-9.0, 0.0, 0.0));
        let hands = HandInputState::default();
        avatar.update_pose(0.0, live_head, hands, hands, Some(&packet));
        assert_eq!(avatar.components[0].transform.position.x, 7.0);
    }

    #[test]
    fn test_empty_packet_falls_back_to_live() {
        let mut avatar = Avatar::from_spec(spec_with_components(1)).unwrap();
        let packet = PosePacket::new();
        let head = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));
        let hands = HandInputState::default();
        avatar.update_pose(0.016, head, hands, hands, Some(&packet));
        assert_eq!(avatar.components[0].transform.position.x, 2.0);
    }

    #[test]
    fn test_voice_amplitude_rises_and_decays() {
        let mut avatar = Avatar::from_spec(spec_with_components(1)).unwrap();
        avatar.update_voice_visualization(&[0.5; 1024]);
        avatar.finalize(0.1);
        let peak = avatar.voice_amplitude();
        assert!(peak > 0.0, "amplitude should rise after voice input");

        for _ in 0..100 {
            avatar.finalize(0.1);
        }
        assert!(
            avatar.voice_amplitude() < peak * 0.1,
            "amplitude should decay without further input"
        );
    }

    #[test]
    fn test_voice_intake_is_bounded() {
        let mut avatar = Avatar::from_spec(spec_with_components(1)).unwrap();
        let samples = vec![0.25; VOICE_SAMPLE_CAPACITY + 1000];
        avatar.update_voice_visualization(&samples);
        avatar.finalize(0.016);
        assert!(avatar.voice_amplitude() > 0.0);
    }

    #[test]
    fn test_elapsed_time_accumulates() {
        let mut avatar = Avatar::from_spec(spec_with_components(1)).unwrap();
        let hands = HandInputState::default();
        avatar.update_pose(0.25, Transform::IDENTITY, hands, hands, None);
        avatar.update_pose(0.5, Transform::IDENTITY, hands, hands, None);
        assert!((avatar.elapsed_seconds() - 0.75).abs() < 1e-6);
    }
}
