//! Skeleton pose evaluation.
//!
//! Skeletons arrive as flat joint arrays in topological order: every joint's
//! parent sits at a strictly smaller index, roots carry a negative parent.
//! That ordering lets [`compute_world_pose`] run a single forward pass with
//! no sorting and no cycle detection.
//!
//! The same evaluator serves two purposes: once at mesh-load time over the
//! bind pose (whose per-joint inverse is then cached for skinning), and every
//! frame over the animated pose. Skinning composes the two:
//! `skin[i] = world[i] * inverse_bind[i]`.

use glam::Mat4;

use crate::transform::Transform;

/// Maximum joints per skinned mesh pose. Matches the shader's bone array.
pub const MAX_JOINTS: usize = 64;

/// A flat, parent-indexed skeleton pose.
///
/// Only the first `joint_count` entries of `locals`/`parents` are
/// meaningful; the rest stay at their identity/negative defaults. `names`
/// is diagnostic only and may be empty.
#[derive(Debug, Clone)]
pub struct SkinnedPose {
    pub joint_count: u32,
    pub locals: [Transform; MAX_JOINTS],
    pub parents: [i32; MAX_JOINTS],
    pub names: Vec<String>,
}

impl SkinnedPose {
    pub fn empty() -> Self {
        Self {
            joint_count: 0,
            locals: [Transform::IDENTITY; MAX_JOINTS],
            parents: [-1; MAX_JOINTS],
            names: Vec::new(),
        }
    }

    /// Builds a pose from `(local, parent)` pairs in joint order.
    ///
    /// Caller contract: `joints.len() <= MAX_JOINTS` and parents precede
    /// children.
    pub fn from_joints(joints: &[(Transform, i32)]) -> Self {
        debug_assert!(
            joints.len() <= MAX_JOINTS,
            "{} joints exceeds the {} joint limit",
            joints.len(),
            MAX_JOINTS
        );
        let mut pose = Self::empty();
        pose.joint_count = joints.len() as u32;
        for (i, (local, parent)) in joints.iter().enumerate() {
            pose.locals[i] = *local;
            pose.parents[i] = *parent;
        }
        pose
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joint_count as usize
    }
}

impl Default for SkinnedPose {
    fn default() -> Self {
        Self::empty()
    }
}

/// Computes world-space joint matrices in a single forward pass.
///
/// `world[i] = world[parent[i]] * local[i]` for non-root joints,
/// `world[i] = local[i]` for roots.
///
/// Caller contract (checked in debug builds only): `out` holds at least
/// `joint_count` entries and `parents[i] < i` for every non-root joint.
/// Violating the ordering reads stale parent slots in release builds.
pub fn compute_world_pose(pose: &SkinnedPose, out: &mut [Mat4]) {
    let count = pose.joint_count();
    debug_assert!(
        count <= MAX_JOINTS,
        "joint count {} exceeds the {} joint limit",
        count,
        MAX_JOINTS
    );
    debug_assert!(
        out.len() >= count,
        "world pose buffer holds {} entries, need {}",
        out.len(),
        count
    );
    for i in 0..count {
        let parent = pose.parents[i];
        debug_assert!(
            parent < i as i32,
            "joint {} has parent {}, parents must precede children",
            i,
            parent
        );
        let local = pose.locals[i].to_matrix();
        out[i] = if parent < 0 {
            local
        } else {
            out[parent as usize] * local
        };
    }
}

/// Composes skinning matrices: `skin[i] = world[i] * inverse_bind[i]`.
///
/// For a skeleton sitting exactly in its bind pose this yields identity for
/// every joint.
pub fn compute_skin_matrices(world: &[Mat4], inverse_bind: &[Mat4], out: &mut [Mat4]) {
    debug_assert!(
        world.len() == inverse_bind.len(),
        "world/inverse-bind length mismatch: {} vs {}",
        world.len(),
        inverse_bind.len()
    );
    debug_assert!(
        out.len() >= world.len(),
        "skin matrix buffer holds {} entries, need {}",
        out.len(),
        world.len()
    );
    for ((dst, world), inverse_bind) in out.iter_mut().zip(world).zip(inverse_bind) {
        *dst = *world * *inverse_bind;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn translate(x: f32, y: f32, z: f32) -> Transform {
        Transform::from_position(Vec3::new(x, y, z))
    }

    fn world_position(m: &Mat4) -> Vec3 {
        m.w_axis.truncate()
    }

    #[test]
    fn test_root_world_equals_local() {
        let pose = SkinnedPose::from_joints(&[(translate(3.0, -1.0, 2.0), -1)]);
        let mut world = [Mat4::IDENTITY; MAX_JOINTS];
        compute_world_pose(&pose, &mut world);
        assert_eq!(world[0], pose.locals[0].to_matrix());
    }

    #[test]
    fn test_three_joint_translate_chain() {
        let step = translate(0.0, 1.0, 0.0);
        let pose = SkinnedPose::from_joints(&[(step, -1), (step, 0), (step, 1)]);
        let mut world = [Mat4::IDENTITY; MAX_JOINTS];
        compute_world_pose(&pose, &mut world);
        assert_eq!(world_position(&world[0]), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(world_position(&world[1]), Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(world_position(&world[2]), Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn test_world_pose_composition_law() {
        let joints = [
            (translate(0.0, 1.0, 0.0), -1),
            (
                Transform::new(
                    Vec3::new(0.5, 0.0, 0.0),
                    Quat::from_rotation_y(0.8),
                    Vec3::splat(1.25),
                ),
                0,
            ),
            (translate(0.0, 0.0, 2.0), 0),
            (
                Transform::new(
                    Vec3::new(0.0, -0.5, 0.1),
                    Quat::from_rotation_x(-0.4),
                    Vec3::ONE,
                ),
                1,
            ),
        ];
        let pose = SkinnedPose::from_joints(&joints);
        let mut world = [Mat4::IDENTITY; MAX_JOINTS];
        compute_world_pose(&pose, &mut world);

        for i in 0..pose.joint_count() {
            let local = pose.locals[i].to_matrix();
            let expected = match pose.parents[i] {
                p if p < 0 => local,
                p => world[p as usize] * local,
            };
            assert!(
                world[i].abs_diff_eq(expected, 1e-6),
                "composition law broken at joint {}",
                i
            );
        }
    }

    #[test]
    fn test_branching_skeleton() {
        // Two children hanging off the same root move independently.
        let pose = SkinnedPose::from_joints(&[
            (translate(1.0, 0.0, 0.0), -1),
            (translate(0.0, 1.0, 0.0), 0),
            (translate(0.0, 0.0, 1.0), 0),
        ]);
        let mut world = [Mat4::IDENTITY; MAX_JOINTS];
        compute_world_pose(&pose, &mut world);
        assert_eq!(world_position(&world[1]), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(world_position(&world[2]), Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_empty_pose_leaves_buffer_untouched() {
        let pose = SkinnedPose::empty();
        let mut world = [Mat4::from_translation(Vec3::splat(9.0)); 4];
        compute_world_pose(&pose, &mut world);
        assert_eq!(world[0], Mat4::from_translation(Vec3::splat(9.0)));
    }

    #[test]
    fn test_skinning_identity_at_bind_pose() {
        let joints = [
            (translate(0.0, 1.0, 0.0), -1),
            (
                Transform::new(
                    Vec3::new(0.0, 0.8, 0.0),
                    Quat::from_rotation_z(0.3),
                    Vec3::ONE,
                ),
                0,
            ),
            (translate(0.2, 0.6, 0.0), 1),
        ];
        let pose = SkinnedPose::from_joints(&joints);
        let mut bind_world = [Mat4::IDENTITY; MAX_JOINTS];
        compute_world_pose(&pose, &mut bind_world);

        let count = pose.joint_count();
        let inverse_bind: Vec<Mat4> = bind_world[..count].iter().map(|m| m.inverse()).collect();

        let mut skin = vec![Mat4::ZERO; count];
        compute_skin_matrices(&bind_world[..count], &inverse_bind, &mut skin);
        for (i, m) in skin.iter().enumerate() {
            assert!(
                m.abs_diff_eq(Mat4::IDENTITY, 1e-5),
                "joint {} not identity in bind pose: {:?}",
                i,
                m
            );
        }
    }

    #[test]
    fn test_skin_matrices_move_with_pose() {
        // Bind: joint 1 sits 1 unit above the root. Pose: 2 units above.
        // A vertex rigidly bound to joint 1 should move up by exactly 1.
        let bind = SkinnedPose::from_joints(&[
            (Transform::IDENTITY, -1),
            (translate(0.0, 1.0, 0.0), 0),
        ]);
        let mut bind_world = [Mat4::IDENTITY; 2];
        compute_world_pose(&bind, &mut bind_world);
        let inverse_bind: Vec<Mat4> = bind_world.iter().map(|m| m.inverse()).collect();

        let posed = SkinnedPose::from_joints(&[
            (Transform::IDENTITY, -1),
            (translate(0.0, 2.0, 0.0), 0),
        ]);
        let mut posed_world = [Mat4::IDENTITY; 2];
        compute_world_pose(&posed, &mut posed_world);

        let mut skin = [Mat4::ZERO; 2];
        compute_skin_matrices(&posed_world, &inverse_bind, &mut skin);

        let vertex = Vec3::new(0.3, 1.0, 0.0);
        let skinned = skin[1].transform_point3(vertex);
        assert!(skinned.abs_diff_eq(Vec3::new(0.3, 2.0, 0.0), 1e-5));
    }
}
