/// 3D transformation matrices and orbit camera state
use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};
use std::f32::consts::FRAC_PI_2;

/// Keeps the orbit from flipping over the poles
const MAX_ELEVATION: f32 = FRAC_PI_2 - 0.01;

/// Spherical position of a camera around its target (angles in radians)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitState {
    pub azimuth: f32,
    pub elevation: f32,
    pub radius: f32,
}

impl OrbitState {
    pub fn new(azimuth: f32, elevation: f32, radius: f32) -> Self {
        Self {
            azimuth,
            elevation: elevation.clamp(-MAX_ELEVATION, MAX_ELEVATION),
            radius,
        }
    }

    /// Orbit that reproduces `eye` when looking at `target`
    pub fn from_eye(eye: &Point3<f32>, target: &Point3<f32>) -> Self {
        let offset = eye - target;
        let radius = offset.norm();
        if radius < f32::EPSILON {
            return Self::new(0.0, 0.0, 0.0);
        }
        let elevation = (offset.y / radius).clamp(-1.0, 1.0).asin();
        let azimuth = offset.x.atan2(offset.z);
        Self::new(azimuth, elevation, radius)
    }

    /// Rotate by delta amounts (in radians)
    pub fn rotate(&mut self, d_azimuth: f32, d_elevation: f32) {
        self.azimuth += d_azimuth;
        self.elevation = (self.elevation + d_elevation).clamp(-MAX_ELEVATION, MAX_ELEVATION);
    }

    /// Scale the distance to the target, never collapsing onto it
    pub fn zoom(&mut self, factor: f32) {
        self.radius = (self.radius * factor).max(0.1);
    }

    pub fn eye(&self, target: &Point3<f32>) -> Point3<f32> {
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        let (sin_el, cos_el) = self.elevation.sin_cos();
        target + Vector3::new(sin_az * cos_el, sin_el, cos_az * cos_el) * self.radius
    }
}

/// Transform builder for 3D transformations
pub struct Transform;

impl Transform {
    /// Create a translation matrix
    pub fn translation_matrix(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    /// Create a scale matrix
    pub fn scale_matrix(sx: f32, sy: f32, sz: f32) -> Matrix4<f32> {
        Matrix4::new_nonuniform_scaling(&Vector3::new(sx, sy, sz))
    }

    /// Compose translation * rotation * scale, the order model formats use
    pub fn compose(
        translation: &Vector3<f32>,
        rotation: &UnitQuaternion<f32>,
        scale: &Vector3<f32>,
    ) -> Matrix4<f32> {
        Matrix4::new_translation(translation)
            * rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(scale)
    }

    pub fn translation_of(matrix: &Matrix4<f32>) -> Point3<f32> {
        Point3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)])
    }

    pub fn set_translation(matrix: &mut Matrix4<f32>, position: &Point3<f32>) {
        matrix[(0, 3)] = position.x;
        matrix[(1, 3)] = position.y;
        matrix[(2, 3)] = position.z;
    }

    /// Create a model-view-projection matrix
    pub fn mvp_matrix(
        model: &Matrix4<f32>,
        view: &Matrix4<f32>,
        projection: &Matrix4<f32>,
    ) -> Matrix4<f32> {
        projection * view * model
    }
}
