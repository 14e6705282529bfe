use ultraviolet::{Mat4, Vec3};

use super::Vertex;

/// Object space bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(mut points: impl Iterator<Item = Vec3>) -> Self {
        let Some(first) = points.next() else {
            return Self::default();
        };
        points.fold(
            Self {
                min: first,
                max: first,
            },
            |aabb, point| Self {
                min: aabb.min.min_by_component(point),
                max: aabb.max.max_by_component(point),
            },
        )
    }
}

/// Triangulated geometry. Every three indices form one triangle.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material_index: u32,
    pub transform: Mat4,
    pub aabb: Aabb,
}

impl Mesh {
    pub fn new(
        name: impl Into<String>,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        material_index: u32,
        transform: Mat4,
    ) -> Self {
        let mut mesh = Self {
            name: name.into(),
            vertices,
            indices,
            material_index,
            transform,
            aabb: Aabb::default(),
        };
        mesh.recalculate_aabb();
        mesh
    }

    pub fn recalculate_aabb(&mut self) {
        self.aabb = Aabb::from_points(self.vertices.iter().map(|vertex| vertex.position));
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis aligned cube centered on the origin, four vertices per face so every
    /// face keeps its own normal.
    pub fn cube(size: f32, material_index: u32, transform: Mat4) -> Self {
        let h = size * 0.5;
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([0.0, 0.0, 1.0], [[-h, -h, h], [h, -h, h], [h, h, h], [-h, h, h]]),
            ([0.0, 0.0, -1.0], [[h, -h, -h], [-h, -h, -h], [-h, h, -h], [h, h, -h]]),
            ([1.0, 0.0, 0.0], [[h, -h, h], [h, -h, -h], [h, h, -h], [h, h, h]]),
            ([-1.0, 0.0, 0.0], [[-h, -h, -h], [-h, -h, h], [-h, h, h], [-h, h, -h]]),
            ([0.0, 1.0, 0.0], [[-h, h, h], [h, h, h], [h, h, -h], [-h, h, -h]]),
            ([0.0, -1.0, 0.0], [[-h, -h, -h], [h, -h, -h], [h, -h, h], [-h, -h, h]]),
        ];
        let tex_coords = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

        let vertices = faces
            .iter()
            .flat_map(|(normal, corners)| {
                corners
                    .iter()
                    .zip(tex_coords)
                    .map(move |(corner, tex_coord)| Vertex::new(*corner, *normal, tex_coord))
            })
            .collect();
        let indices = (0..6u32)
            .flat_map(|face| {
                let base = face * 4;
                [base, base + 1, base + 2, base + 2, base + 3, base]
            })
            .collect();

        Self::new("Cube", vertices, indices, material_index, transform)
    }

    /// Square in the XZ plane facing +Y.
    pub fn quad(size: f32, material_index: u32, transform: Mat4) -> Self {
        let h = size * 0.5;
        let up = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex::new([-h, 0.0, h], up, [0.0, 0.0]),
            Vertex::new([h, 0.0, h], up, [1.0, 0.0]),
            Vertex::new([h, 0.0, -h], up, [1.0, 1.0]),
            Vertex::new([-h, 0.0, -h], up, [0.0, 1.0]),
        ];
        Self::new("Quad", vertices, vec![0, 1, 2, 2, 3, 0], material_index, transform)
    }
}
