use glam::{Mat4, Vec2, Vec3};

use crate::raycast::Ray;
use crate::render::CameraParams;
use crate::scene::CameraSettings;

/// Perspective camera looking down -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl From<CameraSettings> for Camera {
    fn from(settings: CameraSettings) -> Self {
        Self {
            position: settings.position,
            fov: settings.fov,
            near: settings.near,
            far: settings.far,
        }
    }
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        let target = self.position + Vec3::NEG_Z;
        Mat4::look_at_rh(self.position, target, Vec3::Y)
    }

    /// Projection with a [0, 1] depth range, as wgpu expects.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(
            self.fov.to_radians(),
            aspect.max(0.01),
            self.near,
            self.far,
        )
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view()
    }

    pub fn params(&self, aspect: f32) -> CameraParams {
        CameraParams {
            view_proj: self.view_proj(aspect),
            position: self.position,
        }
    }

    /// Ray from the camera through a point given in normalized device coordinates.
    pub fn ray_through(&self, ndc: Vec2, aspect: f32) -> Ray {
        let far = self
            .view_proj(aspect)
            .inverse()
            .project_point3(ndc.extend(1.0));
        Ray::new(self.position, far - self.position)
    }

    /// Projects a world point to normalized device coordinates.
    pub fn project(&self, point: Vec3, aspect: f32) -> Vec3 {
        self.view_proj(aspect).project_point3(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::from(CameraSettings::default())
    }

    #[test]
    fn centre_ray_points_down_negative_z() {
        let ray = camera().ray_through(Vec2::ZERO, 16.0 / 9.0);
        assert_eq!(ray.origin, Vec3::new(-3.0, 0.0, 30.0));
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn ray_passes_through_projected_point() {
        let camera = camera();
        let aspect = 4.0 / 3.0;
        let target = Vec3::new(10.0, -11.0, -7.0);
        let ndc = camera.project(target, aspect);
        let ray = camera.ray_through(ndc.truncate(), aspect);
        let to_target = (target - ray.origin).normalize();
        assert!((ray.direction - to_target).length() < 1e-3);
    }
}
