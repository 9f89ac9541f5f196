/// Camera and projection utilities
use nalgebra::{Matrix4, Point3, Vector3};

use crate::config::CameraConfig;
use crate::transform::Transform;

/// Default film size (35mm) used to map screen offsets into world units
const FILM_GAUGE: f32 = 35.0;

/// Perspective camera for rendering and for placing thrown objects
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view in radians
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub film_gauge: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_config(&CameraConfig::default(), width, height)
    }

    pub fn from_config(config: &CameraConfig, width: u32, height: u32) -> Self {
        Self {
            position: Point3::from(config.position),
            target: Point3::from(config.look_at),
            up: Vector3::y(),
            fov: config.fov.to_radians(),
            aspect: aspect_ratio(width, height),
            near: config.near,
            far: config.far,
            film_gauge: FILM_GAUGE,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = aspect_ratio(width, height);
    }

    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    /// Create the projection matrix
    pub fn projection_matrix(&self) -> Matrix4<f32> {
        Matrix4::new_perspective(self.aspect, self.fov, self.near, self.far)
    }

    /// Unit vector the camera is looking along
    pub fn world_direction(&self) -> Vector3<f32> {
        (self.target - self.position)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| -Vector3::z())
    }

    pub fn film_width(&self) -> f32 {
        self.film_gauge * self.aspect.min(1.0)
    }

    pub fn film_height(&self) -> f32 {
        self.film_gauge / self.aspect.max(1.0)
    }

    /// Where a thrown object starts for a click at a relative screen offset.
    ///
    /// `relative_x` grows towards the left edge and `relative_y` towards the
    /// top, both in `[-0.5, 0.5]` with the screen centre at zero. The offset
    /// is scaled by the film size and pushed forward onto the near plane.
    pub fn launch_point(&self, relative_x: f32, relative_y: f32) -> Point3<f32> {
        let forward = self.world_direction();
        let left = self.up.cross(&forward) * (relative_x * self.film_width());
        let top = self.up * (relative_y * self.film_height());
        self.position + left + top + forward * self.near
    }

    /// World point for normalized device coordinates (`z = -1` near plane,
    /// `z = 1` far plane)
    pub fn unproject(&self, ndc: &Point3<f32>) -> Option<Point3<f32>> {
        let inverse = (self.projection_matrix() * self.view_matrix()).try_inverse()?;
        let world = inverse * ndc.to_homogeneous();
        if world.w.abs() <= f32::EPSILON {
            return None;
        }
        Some(Point3::from(world.xyz() / world.w))
    }

    /// Unit vector from the eye through the pixel at a relative screen
    /// offset, using the same offsets as [`Camera::launch_point`]
    pub fn cursor_direction(&self, relative_x: f32, relative_y: f32) -> Vector3<f32> {
        self.unproject(&Point3::new(-2.0 * relative_x, 2.0 * relative_y, 1.0))
            .and_then(|far| (far - self.position).try_normalize(f32::EPSILON))
            .unwrap_or_else(|| self.world_direction())
    }

    /// Project a 3D point to screen space; the third value is NDC depth
    pub fn project_to_screen(
        &self,
        point: &Point3<f32>,
        model_matrix: &Matrix4<f32>,
        width: u32,
        height: u32,
    ) -> Option<(f32, f32, f32)> {
        let mvp =
            Transform::mvp_matrix(model_matrix, &self.view_matrix(), &self.projection_matrix());
        let clip = mvp * point.to_homogeneous();

        // Behind the eye or on its plane
        if clip.w <= 1e-6 {
            return None;
        }

        let ndc = clip.xyz() / clip.w;
        if ndc.z < -1.0 || ndc.z > 1.0 {
            return None;
        }

        let screen_x = (ndc.x + 1.0) * 0.5 * width as f32;
        let screen_y = (1.0 - ndc.y) * 0.5 * height as f32;

        Some((screen_x, screen_y, ndc.z))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
    width.max(1) as f32 / height.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_camera_creation() {
        let camera = Camera::new(800, 600);
        assert!((camera.aspect - 800.0 / 600.0).abs() < 1e-6);
        assert_eq!(camera.position, Point3::new(10.0, 10.0, 0.0));
        assert_eq!(camera.target, Point3::origin());
    }

    #[test]
    fn test_film_size_follows_aspect() {
        let wide = Camera::new(800, 400);
        assert_relative_eq!(wide.film_width(), 35.0);
        assert_relative_eq!(wide.film_height(), 17.5);

        let tall = Camera::new(400, 800);
        assert_relative_eq!(tall.film_width(), 17.5);
        assert_relative_eq!(tall.film_height(), 35.0);
    }

    #[test]
    fn test_launch_point_at_screen_centre() {
        let camera = Camera::new(800, 600);
        let point = camera.launch_point(0.0, 0.0);
        let expected = camera.position + camera.world_direction() * camera.near;
        assert_relative_eq!(point, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_launch_point_offsets() {
        let mut camera = Camera::new(600, 600);
        camera.position = Point3::new(0.0, 0.0, 5.0);
        camera.target = Point3::origin();
        // Looking down -z with +y up, the camera's left is -x
        let point = camera.launch_point(0.5, 0.5);
        assert_relative_eq!(point.x, -17.5, epsilon = 1e-4);
        assert_relative_eq!(point.y, 17.5, epsilon = 1e-4);
        assert_relative_eq!(point.z, 5.0 - camera.near, epsilon = 1e-4);
    }

    #[test]
    fn test_cursor_direction() {
        let camera = Camera::new(800, 600);
        assert_relative_eq!(
            camera.cursor_direction(0.0, 0.0),
            camera.world_direction(),
            epsilon = 1e-3
        );

        // Client (40, 150) on an 800x600 viewport
        let direction = camera.cursor_direction(0.45, 0.25);
        let point = camera.position + direction * 30.0;
        let (x, y, _) = camera
            .project_to_screen(&point, &Matrix4::identity(), 800, 600)
            .unwrap();
        assert_relative_eq!(x, 40.0, epsilon = 1.0);
        assert_relative_eq!(y, 150.0, epsilon = 1.0);
    }

    #[test]
    fn test_unproject_inverts_projection() {
        let camera = Camera::new(800, 600);
        let point = Point3::new(1.0, 2.0, -1.5);
        let (x, y, depth) = camera
            .project_to_screen(&point, &Matrix4::identity(), 800, 600)
            .unwrap();
        let ndc = Point3::new(x / 400.0 - 1.0, 1.0 - y / 300.0, depth);
        assert_relative_eq!(camera.unproject(&ndc).unwrap(), point, epsilon = 1e-2);
    }

    #[test]
    fn test_project_target_to_centre() {
        let camera = Camera::new(800, 600);
        let (x, y, depth) = camera
            .project_to_screen(&camera.target, &Matrix4::identity(), 800, 600)
            .unwrap();
        assert_relative_eq!(x, 400.0, epsilon = 1e-2);
        assert_relative_eq!(y, 300.0, epsilon = 1e-2);
        assert!(depth > -1.0 && depth < 1.0);
    }

    #[test]
    fn test_point_behind_camera_is_clipped() {
        let camera = Camera::new(800, 600);
        let behind = camera.position - camera.world_direction() * 5.0;
        assert!(camera
            .project_to_screen(&behind, &Matrix4::identity(), 800, 600)
            .is_none());
    }
}
