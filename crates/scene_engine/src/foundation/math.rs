//! Math utilities and types
//!
//! Provides the fundamental math types used by the scene graph: vector and
//! matrix aliases over `nalgebra`, and the position/rotation/scale
//! [`Transform`] every scene node carries.

pub use nalgebra::{
    Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
///
/// The matrix form is `translation * rotation * scale`, mapping points from
/// the node's local space into the space of the container holding the node.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in container space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Set the scale, builder style
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Inverse transformation matrix (container space to local space)
    ///
    /// Built from the inverted components so a zero scale axis degrades to
    /// infinities on that axis instead of failing a general matrix inversion.
    pub fn to_inverse_matrix(&self) -> Mat4 {
        let inv_scale = Vec3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        Mat4::new_nonuniform_scaling(&inv_scale)
            * self.rotation.inverse().to_homogeneous()
            * Mat4::new_translation(&-self.position)
    }

    /// Create a transform from a transformation matrix
    ///
    /// Assumes the matrix is a translation * rotation * scale composition;
    /// shear is dropped.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let position = Vec3::new(matrix.m14, matrix.m24, matrix.m34);

        let scale_x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
        let scale_y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
        let scale_z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
        let scale = Vec3::new(scale_x, scale_y, scale_z);

        // Degenerate axes keep an identity rotation column
        let safe = |s: f32| if s > f32::EPSILON { s } else { 1.0 };
        let rotation_matrix = Matrix3::new(
            matrix.m11 / safe(scale_x), matrix.m12 / safe(scale_y), matrix.m13 / safe(scale_z),
            matrix.m21 / safe(scale_x), matrix.m22 / safe(scale_y), matrix.m23 / safe(scale_z),
            matrix.m31 / safe(scale_x), matrix.m32 / safe(scale_y), matrix.m33 / safe(scale_z),
        );
        let rotation = Quat::from_matrix(&rotation_matrix);

        Self {
            position,
            rotation,
            scale,
        }
    }
}

/// Largest factor by which the linear part of `matrix` can stretch a vector
///
/// This is the spectral norm of the upper 3x3 block. Used to re-derive a
/// sphere radius after an affine transform: with non-uniform scale or shear the
/// sphere would become an ellipsoid, and the spectral norm gives the radius of
/// the smallest sphere around that ellipsoid.
pub fn max_stretch(matrix: &Mat4) -> f32 {
    let linear: Mat3 = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    linear
        .singular_values()
        .iter()
        .copied()
        .fold(0.0_f32, f32::max)
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Extension trait for Mat4 with camera helpers used to build view frustums
pub trait Mat4Ext {
    /// Create a right-handed perspective projection matrix (depth range 0..1)
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = (near * far) / (near - far);
        result[(3, 2)] = -1.0;

        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_inverse_matrix_round_trip() {
        let transform = Transform::from_position_rotation(
            Vec3::new(3.0, -2.0, 7.0),
            Quat::from_axis_angle(&Vec3::y_axis(), constants::HALF_PI),
        )
        .with_scale(Vec3::new(2.0, 1.0, 0.5));

        let product = transform.to_matrix() * transform.to_inverse_matrix();
        assert_relative_eq!(product, Mat4::identity(), epsilon = EPSILON);
    }

    #[test]
    fn test_from_matrix_decomposition() {
        let transform = Transform::from_position_rotation(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_axis_angle(&Vec3::z_axis(), 0.3),
        )
        .with_scale(Vec3::new(2.0, 3.0, 4.0));

        let decomposed = Transform::from_matrix(&transform.to_matrix());
        assert_relative_eq!(decomposed.position, transform.position, epsilon = EPSILON);
        assert_relative_eq!(decomposed.scale, transform.scale, epsilon = EPSILON);
        assert_relative_eq!(decomposed.rotation, transform.rotation, epsilon = EPSILON);
    }

    #[test]
    fn test_max_stretch_non_uniform_scale() {
        let matrix = Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 1.0, 1.0));
        assert_relative_eq!(max_stretch(&matrix), 2.0, epsilon = EPSILON);

        let rotated = Mat4::from_axis_angle(&Vec3::y_axis(), 0.7) * matrix;
        assert_relative_eq!(max_stretch(&rotated), 2.0, epsilon = EPSILON);
    }
}
