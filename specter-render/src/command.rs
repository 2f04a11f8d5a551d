//! Frame draw planning.
//!
//! Traversal runs on the CPU and emits an ordered command list before any
//! GPU state is touched. [`plan_avatar`] applies visibility masking, expands
//! self-occluding parts into a depth prepass plus an equal-depth color pass,
//! and resolves projector back-references to their target meshes. Submission
//! then walks the list without revisiting any of those decisions.

use glam::Mat4;
use smallvec::SmallVec;
use tracing::warn;

use specter_avatar::{Avatar, ProjectorPart, RenderPart, VISIBILITY_SELF_OCCLUDING};

/// Which depth/color pass a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawPass {
    /// Depth-only pass: writes depth, masks color.
    DepthPrepass,
    /// Color pass; never writes depth. `depth_equal` selects the equal-depth
    /// test used after a prepass (and for projected decals).
    Color { depth_equal: bool },
}

/// Which material family a command binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Layered,
    Pbs,
}

/// One planned draw.
#[derive(Debug, Clone, Copy)]
pub struct DrawCommand {
    /// (component, render part) supplying mesh, pose, and world placement.
    pub mesh_part: (u32, u32),
    /// (component, render part) supplying the material. Differs from
    /// `mesh_part` only for projected decals.
    pub material_part: (u32, u32),
    /// Component world composed with the part's local transform.
    pub world: Mat4,
    pub kind: PartKind,
    pub pass: DrawPass,
    /// Inverse world-projection matrix for decal sampling.
    pub projector_inv: Option<Mat4>,
}

/// Inline capacity covering a typical avatar (body, two hands, decals).
pub type DrawPlan = SmallVec<[DrawCommand; 16]>;

/// Walk the avatar hierarchy and plan this frame's draws.
///
/// A part whose visibility mask shares no bits with `visibility_mask`
/// contributes nothing. Projectors are gated on their target's visibility
/// and skipped with a warning when the back-reference does not resolve to a
/// layered skinned mesh.
pub fn plan_avatar(avatar: &Avatar, visibility_mask: u32) -> DrawPlan {
    let mut plan = DrawPlan::new();

    for (component_index, component) in avatar.components.iter().enumerate() {
        let component_world = component.transform.to_matrix();
        for (part_index, part) in component.render_parts.iter().enumerate() {
            let at = (component_index as u32, part_index as u32);
            match part {
                RenderPart::SkinnedMesh(mesh) => {
                    if mesh.visibility_mask & visibility_mask == 0 {
                        continue;
                    }
                    let world = component_world * mesh.local_transform.to_matrix();
                    push_mesh_passes(&mut plan, at, world, PartKind::Layered, mesh.visibility_mask);
                }
                RenderPart::SkinnedMeshPbs(mesh) => {
                    if mesh.visibility_mask & visibility_mask == 0 {
                        continue;
                    }
                    let world = component_world * mesh.local_transform.to_matrix();
                    push_mesh_passes(&mut plan, at, world, PartKind::Pbs, mesh.visibility_mask);
                }
                RenderPart::Projector(projector) => {
                    plan_projector(
                        &mut plan,
                        avatar,
                        at,
                        &component_world,
                        projector,
                        visibility_mask,
                    );
                }
            }
        }
    }

    plan
}

fn push_mesh_passes(
    plan: &mut DrawPlan,
    at: (u32, u32),
    world: Mat4,
    kind: PartKind,
    part_visibility: u32,
) {
    if part_visibility & VISIBILITY_SELF_OCCLUDING != 0 {
        plan.push(DrawCommand {
            mesh_part: at,
            material_part: at,
            world,
            kind,
            pass: DrawPass::DepthPrepass,
            projector_inv: None,
        });
        plan.push(DrawCommand {
            mesh_part: at,
            material_part: at,
            world,
            kind,
            pass: DrawPass::Color { depth_equal: true },
            projector_inv: None,
        });
    } else {
        plan.push(DrawCommand {
            mesh_part: at,
            material_part: at,
            world,
            kind,
            pass: DrawPass::Color { depth_equal: false },
            projector_inv: None,
        });
    }
}

fn plan_projector(
    plan: &mut DrawPlan,
    avatar: &Avatar,
    at: (u32, u32),
    projector_component_world: &Mat4,
    projector: &ProjectorPart,
    visibility_mask: u32,
) {
    let Some(target_component) = avatar.components.get(projector.component_index as usize) else {
        warn!(
            component = projector.component_index,
            "projector targets a component out of range, skipping"
        );
        return;
    };
    let Some(target_part) = target_component
        .render_parts
        .get(projector.render_part_index as usize)
    else {
        warn!(
            component = projector.component_index,
            part = projector.render_part_index,
            "projector targets a render part out of range, skipping"
        );
        return;
    };
    let RenderPart::SkinnedMesh(target) = target_part else {
        warn!(
            component = projector.component_index,
            part = projector.render_part_index,
            "projector target is not a layered skinned mesh, skipping"
        );
        return;
    };
    if target.visibility_mask & visibility_mask == 0 {
        return;
    }

    let projector_world = *projector_component_world * projector.local_transform.to_matrix();
    let target_world = target_component.transform.to_matrix() * target.local_transform.to_matrix();
    plan.push(DrawCommand {
        mesh_part: (projector.component_index, projector.render_part_index),
        material_part: at,
        world: target_world,
        kind: PartKind::Layered,
        pass: DrawPass::Color { depth_equal: true },
        projector_inv: Some(projector_world.inverse()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use specter_avatar::{
        AssetId, AvatarComponent, AvatarSpec, MaterialState, SkinnedMeshPart, SkinnedMeshPbsPart,
        SkinnedPose, Transform, VISIBILITY_FIRST_PERSON, VISIBILITY_THIRD_PERSON,
    };

    fn mesh_part(visibility_mask: u32) -> RenderPart {
        RenderPart::SkinnedMesh(SkinnedMeshPart {
            local_transform: Transform::IDENTITY,
            visibility_mask,
            mesh_asset: AssetId(1),
            material: MaterialState::default(),
            skinned_pose: SkinnedPose::empty(),
        })
    }

    fn pbs_part(visibility_mask: u32) -> RenderPart {
        RenderPart::SkinnedMeshPbs(SkinnedMeshPbsPart {
            local_transform: Transform::IDENTITY,
            visibility_mask,
            mesh_asset: AssetId(2),
            albedo_texture: AssetId(3),
            surface_texture: AssetId(4),
            skinned_pose: SkinnedPose::empty(),
        })
    }

    fn projector_part(component_index: u32, render_part_index: u32) -> RenderPart {
        RenderPart::Projector(ProjectorPart {
            local_transform: Transform::from_position(Vec3::new(0.0, 0.5, 0.0)),
            component_index,
            render_part_index,
            material: MaterialState::default(),
        })
    }

    fn avatar_with(components: Vec<AvatarComponent>) -> Avatar {
        Avatar::from_spec(AvatarSpec {
            components,
            ..Default::default()
        })
        .unwrap()
    }

    fn component(name: &str, parts: Vec<RenderPart>) -> AvatarComponent {
        AvatarComponent {
            name: name.into(),
            transform: Transform::IDENTITY,
            render_parts: parts,
        }
    }

    #[test]
    fn disjoint_visibility_produces_zero_draws() {
        let avatar = avatar_with(vec![component(
            "body",
            vec![mesh_part(VISIBILITY_FIRST_PERSON)],
        )]);
        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        assert!(plan.is_empty());
    }

    #[test]
    fn matching_visibility_draws_once_without_self_occlusion() {
        let avatar = avatar_with(vec![component(
            "body",
            vec![mesh_part(VISIBILITY_FIRST_PERSON | VISIBILITY_THIRD_PERSON)],
        )]);
        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].pass, DrawPass::Color { depth_equal: false });
        assert_eq!(plan[0].kind, PartKind::Layered);
    }

    #[test]
    fn self_occluding_part_gets_prepass_then_equal_color() {
        let avatar = avatar_with(vec![component(
            "body",
            vec![mesh_part(VISIBILITY_FIRST_PERSON | VISIBILITY_SELF_OCCLUDING)],
        )]);
        let plan = plan_avatar(&avatar, VISIBILITY_FIRST_PERSON);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].pass, DrawPass::DepthPrepass);
        assert_eq!(plan[1].pass, DrawPass::Color { depth_equal: true });
        assert_eq!(plan[0].mesh_part, plan[1].mesh_part);
    }

    #[test]
    fn pbs_parts_plan_with_pbs_kind() {
        let avatar = avatar_with(vec![component(
            "hand",
            vec![pbs_part(VISIBILITY_THIRD_PERSON | VISIBILITY_SELF_OCCLUDING)],
        )]);
        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|cmd| cmd.kind == PartKind::Pbs));
    }

    #[test]
    fn world_composes_component_and_part_transforms() {
        let mut body = component("body", vec![]);
        body.transform = Transform::from_position(Vec3::new(0.0, 1.0, 0.0));
        body.render_parts.push(RenderPart::SkinnedMesh(SkinnedMeshPart {
            local_transform: Transform::from_position(Vec3::new(2.0, 0.0, 0.0)),
            visibility_mask: VISIBILITY_THIRD_PERSON,
            mesh_asset: AssetId(1),
            material: MaterialState::default(),
            skinned_pose: SkinnedPose::empty(),
        }));
        let avatar = avatar_with(vec![body]);

        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        assert_eq!(plan.len(), 1);
        let placed = plan[0].world.transform_point3(Vec3::ZERO);
        assert!(placed.abs_diff_eq(Vec3::new(2.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn projector_draws_target_mesh_with_projector_material() {
        let avatar = avatar_with(vec![
            component("body", vec![mesh_part(VISIBILITY_THIRD_PERSON)]),
            component("decal", vec![projector_part(0, 0)]),
        ]);
        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        assert_eq!(plan.len(), 2);

        let decal = &plan[1];
        assert_eq!(decal.mesh_part, (0, 0));
        assert_eq!(decal.material_part, (1, 0));
        assert_eq!(decal.pass, DrawPass::Color { depth_equal: true });
        assert!(decal.projector_inv.is_some());
    }

    #[test]
    fn projector_inverse_maps_world_back_to_projector_space() {
        let mut holder = component("decal", vec![projector_part(0, 0)]);
        holder.transform = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));
        let avatar = avatar_with(vec![
            component("body", vec![mesh_part(VISIBILITY_THIRD_PERSON)]),
            holder,
        ]);

        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        let inv = plan[1].projector_inv.unwrap();
        // Projector world origin sits at component (1,0,0) plus local (0,0.5,0).
        let back = inv.transform_point3(Vec3::new(1.0, 0.5, 0.0));
        assert!(back.abs_diff_eq(Vec3::ZERO, 1e-6));
    }

    #[test]
    fn projector_skips_out_of_range_component() {
        let avatar = avatar_with(vec![
            component("body", vec![mesh_part(VISIBILITY_THIRD_PERSON)]),
            component("decal", vec![projector_part(9, 0)]),
        ]);
        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        assert_eq!(plan.len(), 1);
        assert!(plan[0].projector_inv.is_none());
    }

    #[test]
    fn projector_skips_out_of_range_part() {
        let avatar = avatar_with(vec![
            component("body", vec![mesh_part(VISIBILITY_THIRD_PERSON)]),
            component("decal", vec![projector_part(0, 5)]),
        ]);
        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn projector_skips_non_layered_target() {
        let avatar = avatar_with(vec![
            component("hand", vec![pbs_part(VISIBILITY_THIRD_PERSON)]),
            component("decal", vec![projector_part(0, 0)]),
        ]);
        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].kind, PartKind::Pbs);
    }

    #[test]
    fn projector_respects_target_visibility() {
        let avatar = avatar_with(vec![
            component("body", vec![mesh_part(VISIBILITY_FIRST_PERSON)]),
            component("decal", vec![projector_part(0, 0)]),
        ]);
        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        assert!(plan.is_empty());
    }

    #[test]
    fn mixed_components_preserve_declaration_order() {
        let avatar = avatar_with(vec![
            component(
                "body",
                vec![
                    mesh_part(VISIBILITY_THIRD_PERSON),
                    mesh_part(VISIBILITY_FIRST_PERSON),
                ],
            ),
            component("hand", vec![pbs_part(VISIBILITY_THIRD_PERSON)]),
        ]);
        let plan = plan_avatar(&avatar, VISIBILITY_THIRD_PERSON);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].mesh_part, (0, 0));
        assert_eq!(plan[1].mesh_part, (1, 0));
    }
}
