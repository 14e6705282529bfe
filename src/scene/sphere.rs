use ultraviolet::Vec3;

use super::Aabb;

/// Procedural primitive, intersected analytically by the sphere intersection shader.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub material_index: u32,
}

impl Sphere {
    pub fn aabb(&self) -> Aabb {
        let extent = Vec3::broadcast(self.radius.abs());
        Aabb {
            min: self.center - extent,
            max: self.center + extent,
        }
    }
}
