mod light;
mod material;
mod mesh;
mod sphere;
mod vertex;

pub use light::*;
pub use material::*;
pub use mesh::*;
pub use sphere::*;
pub use vertex::*;

use ultraviolet::{Mat4, Vec3};

/// Everything the renderer draws, handed over whole every frame.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub static_meshes: Vec<Mesh>,
    /// Replaced every frame a moving entity changed.
    pub dynamic_meshes: Vec<Mesh>,
    /// Only traced when the scene contains no meshes.
    pub spheres: Vec<Sphere>,
    pub materials: Vec<Material>,
    pub lights: Vec<Light>,
}

impl Scene {
    /// Static and dynamic meshes in upload order.
    pub fn meshes(&self) -> impl Iterator<Item = &Mesh> {
        self.static_meshes.iter().chain(self.dynamic_meshes.iter())
    }

    pub fn mesh_count(&self) -> usize {
        self.static_meshes.len() + self.dynamic_meshes.len()
    }

    /// A ground plane lit by a sun and a lamp, players are added as dynamic meshes.
    pub fn with_ground() -> Self {
        Self {
            static_meshes: vec![Mesh::quad(20.0, 2, Mat4::identity())],
            dynamic_meshes: Vec::new(),
            spheres: Vec::new(),
            materials: vec![
                Material::colored("Local player", Vec3::new(0.2, 0.8, 0.2)),
                Material::colored("Remote player", Vec3::new(0.8, 0.2, 0.2)),
                Material {
                    roughness: 0.9,
                    ..Material::colored("Ground", Vec3::broadcast(0.6))
                },
            ],
            lights: vec![
                Light::directional(Vec3::new(-0.4, -1.0, -0.3), 1.0),
                Light::point(Vec3::new(0.0, 3.0, 0.0), Vec3::new(1.0, 0.9, 0.7), 10.0),
            ],
        }
    }
}
