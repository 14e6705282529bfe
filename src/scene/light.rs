use serde::{Deserialize, Serialize};
use ultraviolet::Vec3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum LightKind {
    #[default]
    Directional,
    Point,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Light {
    pub position: Vec3,
    pub intensity: f32,
    pub color: Vec3,
    pub kind: LightKind,
    /// Normalized, only used by directional lights.
    pub direction: Vec3,
    /// Falloff distance of point lights.
    pub radius: f32,
}

impl Light {
    pub fn directional(direction: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalized(),
            intensity,
            kind: LightKind::Directional,
            ..Default::default()
        }
    }

    pub fn point(position: Vec3, color: Vec3, radius: f32) -> Self {
        Self {
            position,
            color,
            radius,
            kind: LightKind::Point,
            ..Default::default()
        }
    }
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            intensity: 1.0,
            color: Vec3::one(),
            kind: LightKind::Directional,
            direction: Vec3::zero(),
            radius: 10.0,
        }
    }
}
