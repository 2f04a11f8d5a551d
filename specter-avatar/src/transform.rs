//! Rigid transform math shared by the skeleton evaluator and the renderer.
//!
//! Avatar providers describe poses as position/orientation/scale triples.
//! The renderer wants 4x4 affine matrices. Conversion lives here, along with
//! the plane-reflection helper used for mirrored (third-person) rendering.

use glam::{Mat4, Quat, Vec3, Vec4};

/// A TRS transform: translation, then rotation, then non-uniform scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(position: Vec3, orientation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            orientation,
            scale,
        }
    }

    /// Translation-only transform, identity rotation and unit scale.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Composes the TRS matrix (scale applied first, translation last).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.orientation, self.position)
    }

    /// Decomposes an affine matrix back into position/orientation/scale.
    ///
    /// Only defined for matrices that came from a TRS composition with
    /// nonzero scale. Singular or sheared input yields an unspecified
    /// orientation/scale pair.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, orientation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            orientation,
            scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Householder reflection about a plane.
///
/// The plane is `(nx, ny, nz, d)` with unit normal `n` and plane equation
/// `dot(n, p) + d == 0`. Points on the plane are fixed; everything else maps
/// to its mirror image.
pub fn reflection_matrix(plane: Vec4) -> Mat4 {
    let (x, y, z, d) = (plane.x, plane.y, plane.z, plane.w);
    Mat4::from_cols(
        Vec4::new(1.0 - 2.0 * x * x, -2.0 * x * y, -2.0 * x * z, 0.0),
        Vec4::new(-2.0 * y * x, 1.0 - 2.0 * y * y, -2.0 * y * z, 0.0),
        Vec4::new(-2.0 * z * x, -2.0 * z * y, 1.0 - 2.0 * z * z, 0.0),
        Vec4::new(-2.0 * d * x, -2.0 * d * y, -2.0 * d * z, 1.0),
    )
}

/// View matrix for rendering the scene mirrored about `plane`.
///
/// Composes as `view * reflection`, so world geometry is reflected before
/// the camera transform applies. The viewer position handed to shading
/// should be reflected through the same plane.
pub fn mirrored_view(view: &Mat4, plane: Vec4) -> Mat4 {
    *view * reflection_matrix(plane)
}
