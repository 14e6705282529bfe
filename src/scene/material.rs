use serde::{Deserialize, Serialize};
use ultraviolet::Vec3;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Material {
    pub name: String,
    pub albedo: Vec3,
    pub roughness: f32,
    pub metallic: f32,
    pub emission_color: Vec3,
    pub emission_power: f32,
    /// File name inside the texture directory, `None` means albedo only.
    pub texture: Option<String>,
    pub tiling: f32,
}

impl Material {
    pub fn colored(name: &str, albedo: Vec3) -> Self {
        Self {
            name: name.to_string(),
            albedo,
            ..Default::default()
        }
    }

    pub fn emission(&self) -> Vec3 {
        self.emission_color * self.emission_power
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            albedo: Vec3::one(),
            roughness: 1.0,
            metallic: 0.0,
            emission_color: Vec3::zero(),
            emission_power: 0.0,
            texture: None,
            tiling: 1.0,
        }
    }
}
