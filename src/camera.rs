use ultraviolet::{projection, Mat4, Vec3};

use crate::{config_loader::CameraPosition, render::shader_types::CameraPushConstants};

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub z_near: f32,
    pub z_far: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            z_near: 0.1,
            z_far: 100.0,
            fov: 45.0,
        }
    }
}

/// Perspective camera looking along `forward()`, yaw and pitch in radians.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub settings: CameraSettings,
    viewport: (u32, u32),
}

impl Camera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 10.0),
            yaw: 0.0,
            pitch: 0.0,
            settings,
            viewport: (1, 1),
        }
    }

    pub fn from_cached(cached: &CameraPosition, settings: CameraSettings) -> Self {
        Self {
            position: cached.position,
            yaw: cached.yaw,
            pitch: cached.pitch,
            ..Self::new(settings)
        }
    }

    pub fn cached_position(&self) -> CameraPosition {
        CameraPosition {
            position: self.position,
            pitch: self.pitch,
            yaw: self.yaw,
        }
    }

    /// Returns `false` when nothing changed, zero sized viewports are ignored.
    pub fn on_resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || self.viewport == (width, height) {
            return false;
        }
        self.viewport = (width, height);
        true
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.viewport.0 as f32 / self.viewport.1 as f32
    }

    /// in world-space
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            -self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            -self.yaw.cos() * self.pitch.cos(),
        )
    }

    /// in world-space
    pub const fn up() -> Vec3 {
        Vec3::new(0.0, 1.0, 0.0)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.position + self.forward(), Camera::up())
    }

    pub fn projection_matrix(&self) -> Mat4 {
        projection::rh_yup::perspective_vk(
            self.settings.fov.to_radians(),
            self.aspect_ratio(),
            self.settings.z_near,
            self.settings.z_far,
        )
    }

    pub fn push_constants(&self, frame_index: u32) -> CameraPushConstants {
        CameraPushConstants::new(
            self.view_matrix().inversed(),
            self.projection_matrix().inversed(),
            self.position,
            frame_index,
        )
    }
}

#[cfg(test)]
mod tests {
    use ultraviolet::Vec4;

    use super::*;

    fn approx_eq(a: Vec3, b: Vec3) -> bool {
        (a - b).mag() < 1e-4
    }

    #[test]
    fn looks_down_negative_z_by_default() {
        let camera = Camera::new(CameraSettings::default());

        assert!(approx_eq(camera.forward(), Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn inverse_view_maps_origin_to_position() {
        let mut camera = Camera::new(CameraSettings::default());
        camera.position = Vec3::new(1.0, 3.0, -2.0);
        camera.yaw = 0.7;
        camera.pitch = -0.2;

        let constants = camera.push_constants(5);
        let [x, y, z, w] = constants.inverse_view.map(Vec4::from);
        let inverse_view = Mat4::new(x, y, z, w);

        assert!(approx_eq(
            inverse_view.transform_point3(Vec3::zero()),
            camera.position
        ));
        assert_eq!(constants.frame_index, 5);
    }

    #[test]
    fn resize_ignores_zero_and_repeats() {
        let mut camera = Camera::new(CameraSettings::default());

        assert!(camera.on_resize(1600, 900));
        assert!(!camera.on_resize(1600, 900));
        assert!(!camera.on_resize(0, 900));
        assert!((camera.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn cached_position_round_trips() {
        let mut camera = Camera::new(CameraSettings::default());
        camera.position = Vec3::new(4.0, 1.0, 2.0);
        camera.yaw = 1.5;

        let restored = Camera::from_cached(&camera.cached_position(), CameraSettings::default());

        assert_eq!(restored.position, camera.position);
        assert_eq!(restored.yaw, 1.5);
    }
}
