use std::mem::size_of;

use ash::vk;
use ultraviolet::{Mat3, Mat4};

use crate::{
    render::shader_types::{AabbPositions, GpuLight, GpuMaterial, GpuVertex},
    scene::{Mesh, Scene},
    texture_cache::TextureCache,
    vulkan::{
        acceleration_structure::SceneGeometry,
        error::DeviceError,
        resources::{BufferKey, GpuResources, MemoryLocation},
    },
};

/// All meshes of a scene baked into world space and concatenated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlattenedGeometry {
    pub vertices: Vec<GpuVertex>,
    pub indices: Vec<u32>,
    /// One entry per triangle.
    pub material_indices: Vec<u32>,
}

/// Inverse transpose of the upper 3x3, keeps normals perpendicular under
/// non-uniform scale.
fn normal_matrix(transform: &Mat4) -> Mat3 {
    let [x, y, z, _] = transform.cols;
    Mat3::new(x.xyz(), y.xyz(), z.xyz())
        .inversed()
        .transposed()
}

/// Static meshes first, then dynamic ones, each in their given order. Normals are
/// transformed but not renormalized.
pub fn flatten_meshes(static_meshes: &[Mesh], dynamic_meshes: &[Mesh]) -> FlattenedGeometry {
    let meshes = || static_meshes.iter().chain(dynamic_meshes);
    let vertex_count = meshes().map(|mesh| mesh.vertices.len()).sum();
    let index_count = meshes().map(|mesh| mesh.indices.len()).sum();

    let mut flattened = FlattenedGeometry {
        vertices: Vec::with_capacity(vertex_count),
        indices: Vec::with_capacity(index_count),
        material_indices: Vec::with_capacity(index_count / 3),
    };

    for mesh in meshes() {
        let vertex_offset = flattened.vertices.len() as u32;
        let normal_matrix = normal_matrix(&mesh.transform);

        flattened.vertices.extend(mesh.vertices.iter().map(|vertex| {
            GpuVertex::new(
                mesh.transform.transform_point3(vertex.position),
                normal_matrix * vertex.normal,
                vertex.tex_coord.into(),
            )
        }));
        flattened
            .indices
            .extend(mesh.indices.iter().map(|index| index + vertex_offset));
        flattened
            .material_indices
            .extend(std::iter::repeat(mesh.material_index).take(mesh.triangle_count()));
    }

    flattened
}

/// Element counts the device buffers were last sized for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneCounts {
    pub meshes: usize,
    pub vertices: usize,
    pub indices: usize,
    pub materials: usize,
    pub lights: usize,
    pub spheres: usize,
    /// Entries in the material index buffer, triangles or spheres depending on the mode.
    pub material_indices: usize,
}

impl SceneCounts {
    fn of(scene: &Scene, flattened: &FlattenedGeometry, material_indices: &[u32]) -> Self {
        Self {
            meshes: scene.mesh_count(),
            vertices: flattened.vertices.len(),
            indices: flattened.indices.len(),
            materials: scene.materials.len(),
            lights: scene.lights.len(),
            spheres: scene.spheres.len(),
            material_indices: material_indices.len(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneBuffer {
    Vertices,
    Indices,
    Materials,
    MaterialIndices,
    Lights,
    Aabbs,
}

impl SceneBuffer {
    fn usage(self) -> vk::BufferUsageFlags {
        let storage =
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
        match self {
            SceneBuffer::Vertices | SceneBuffer::Indices | SceneBuffer::Aabbs => {
                storage | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
            }
            SceneBuffer::Materials | SceneBuffer::MaterialIndices | SceneBuffer::Lights => storage,
        }
    }
}

/// The buffers currently backing each scene binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneBuffers {
    pub vertices: BufferKey,
    pub indices: BufferKey,
    pub materials: BufferKey,
    pub material_indices: BufferKey,
    pub lights: BufferKey,
    pub aabbs: BufferKey,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncReport {
    pub counts: SceneCounts,
    /// Buffers that were replaced by a new allocation this call.
    pub reallocated: Vec<SceneBuffer>,
    pub geometry: Option<SceneGeometry>,
    pub buffers: SceneBuffers,
}

#[derive(Default)]
struct BufferSlots {
    vertices: Option<BufferKey>,
    indices: Option<BufferKey>,
    materials: Option<BufferKey>,
    material_indices: Option<BufferKey>,
    lights: Option<BufferKey>,
    aabbs: Option<BufferKey>,
}

impl BufferSlots {
    fn slot(&mut self, buffer: SceneBuffer) -> &mut Option<BufferKey> {
        match buffer {
            SceneBuffer::Vertices => &mut self.vertices,
            SceneBuffer::Indices => &mut self.indices,
            SceneBuffer::Materials => &mut self.materials,
            SceneBuffer::MaterialIndices => &mut self.material_indices,
            SceneBuffer::Lights => &mut self.lights,
            SceneBuffer::Aabbs => &mut self.aabbs,
        }
    }
}

/// Mirrors a [`Scene`] into host visible storage buffers. Buffers are only
/// reallocated when the element count they were sized for changes, their
/// contents are rewritten on every sync.
#[derive(Default)]
pub struct SceneUploader {
    slots: BufferSlots,
    counts: Option<SceneCounts>,
}

impl SceneUploader {
    pub fn sync(
        &mut self,
        resources: &mut GpuResources,
        textures: &mut TextureCache,
        scene: &Scene,
    ) -> Result<SyncReport, DeviceError> {
        let mut flattened = flatten_meshes(&scene.static_meshes, &scene.dynamic_meshes);
        replace_invalid_material_indices(&mut flattened.material_indices, scene.materials.len());

        let triangles = has_triangles(&flattened);
        let material_indices = material_index_entries(scene, &flattened, triangles);
        let counts = SceneCounts::of(scene, &flattened, &material_indices);
        let previous = self.counts.unwrap_or_default();
        let first_sync = self.counts.is_none();

        let mut reallocated = Vec::new();
        let mut ensure = |buffer: SceneBuffer,
                          count_changed: bool,
                          size: usize|
         -> Result<BufferKey, DeviceError> {
            let (handle, fresh) =
                self.ensure(resources, buffer, first_sync || count_changed, size)?;
            if fresh {
                reallocated.push(buffer);
            }
            Ok(handle)
        };

        let mesh_count_changed = counts.meshes != previous.meshes;
        let buffers = SceneBuffers {
            vertices: ensure(
                SceneBuffer::Vertices,
                mesh_count_changed || counts.vertices != previous.vertices,
                counts.vertices * size_of::<GpuVertex>(),
            )?,
            indices: ensure(
                SceneBuffer::Indices,
                mesh_count_changed || counts.indices != previous.indices,
                counts.indices * size_of::<u32>(),
            )?,
            materials: ensure(
                SceneBuffer::Materials,
                counts.materials != previous.materials,
                counts.materials * size_of::<GpuMaterial>(),
            )?,
            material_indices: ensure(
                SceneBuffer::MaterialIndices,
                counts.material_indices != previous.material_indices,
                counts.material_indices * size_of::<u32>(),
            )?,
            lights: ensure(
                SceneBuffer::Lights,
                counts.lights != previous.lights,
                counts.lights * size_of::<GpuLight>(),
            )?,
            aabbs: ensure(
                SceneBuffer::Aabbs,
                counts.spheres != previous.spheres,
                counts.spheres * size_of::<AabbPositions>(),
            )?,
        };

        resources.write_buffer(buffers.vertices, bytemuck::cast_slice(&flattened.vertices));
        resources.write_buffer(buffers.indices, bytemuck::cast_slice(&flattened.indices));
        resources.write_buffer(buffers.material_indices, bytemuck::cast_slice(&material_indices));

        let mut materials: Vec<_> = scene
            .materials
            .iter()
            .map(|material| GpuMaterial::new(material, GpuMaterial::NO_TEXTURE))
            .collect();
        resources.write_buffer(buffers.materials, bytemuck::cast_slice(&materials));
        for (gpu, material) in materials.iter_mut().zip(&scene.materials) {
            if let Some(file_name) = &material.texture {
                gpu.texture_index = textures.resolve(resources, file_name)?;
            }
        }
        resources.write_buffer(buffers.materials, bytemuck::cast_slice(&materials));

        let lights: Vec<GpuLight> = scene.lights.iter().map(GpuLight::from).collect();
        resources.write_buffer(buffers.lights, bytemuck::cast_slice(&lights));

        let aabbs: Vec<AabbPositions> = scene
            .spheres
            .iter()
            .map(|sphere| {
                let aabb = sphere.aabb();
                AabbPositions {
                    min: aabb.min.into(),
                    max: aabb.max.into(),
                }
            })
            .collect();
        resources.write_buffer(buffers.aabbs, bytemuck::cast_slice(&aabbs));

        let geometry = if triangles {
            Some(SceneGeometry::Triangles {
                vertex_buffer: buffers.vertices,
                index_buffer: buffers.indices,
                vertex_count: counts.vertices as u32,
                index_count: counts.indices as u32,
            })
        } else if counts.spheres > 0 {
            Some(SceneGeometry::Procedural {
                aabb_buffer: buffers.aabbs,
                primitive_count: counts.spheres as u32,
            })
        } else {
            None
        };

        if reallocated.is_empty() {
            log::debug!("Scene synced without reallocation");
        } else {
            log::info!(
                "Scene synced: {} meshes, {} vertices, {} triangles, {} materials, {} lights, {} spheres, reallocated {reallocated:?}",
                counts.meshes,
                counts.vertices,
                counts.indices / 3,
                counts.materials,
                counts.lights,
                counts.spheres
            );
        }
        self.counts = Some(counts);

        Ok(SyncReport {
            counts,
            reallocated,
            geometry,
            buffers,
        })
    }

    /// Returns the buffer for `buffer` and whether it was freshly allocated.
    fn ensure(
        &mut self,
        resources: &mut GpuResources,
        buffer: SceneBuffer,
        count_changed: bool,
        size: usize,
    ) -> Result<(BufferKey, bool), DeviceError> {
        let slot = self.slots.slot(buffer);
        if let Some(live) = slot.filter(|&handle| resources.buffer(handle).is_some()) {
            if !count_changed {
                return Ok((live, false));
            }
        }

        if let Some(old) = slot.take() {
            resources.dispose_buffer(old);
        }
        let handle = resources.create_buffer(
            size as vk::DeviceSize,
            buffer.usage(),
            MemoryLocation::HostVisible,
        )?;
        log::debug!("Allocated {size} bytes for {buffer:?}");
        *slot = Some(handle);
        Ok((handle, true))
    }

    pub fn buffers(&self) -> Option<SceneBuffers> {
        let slots = &self.slots;
        Some(SceneBuffers {
            vertices: slots.vertices?,
            indices: slots.indices?,
            materials: slots.materials?,
            material_indices: slots.material_indices?,
            lights: slots.lights?,
            aabbs: slots.aabbs?,
        })
    }

    pub fn counts(&self) -> Option<SceneCounts> {
        self.counts
    }

    pub fn release(&mut self, resources: &mut GpuResources) {
        let slots = std::mem::take(&mut self.slots);
        for handle in [
            slots.vertices,
            slots.indices,
            slots.materials,
            slots.material_indices,
            slots.lights,
            slots.aabbs,
        ]
        .into_iter()
        .flatten()
        {
            resources.dispose_buffer(handle);
        }
        self.counts = None;
    }
}

/// Meshes without a single triangle leave the scene to its spheres.
fn has_triangles(flattened: &FlattenedGeometry) -> bool {
    flattened.indices.len() >= 3
}

/// One material index per triangle, or per sphere when the scene is procedural.
fn material_index_entries(
    scene: &Scene,
    flattened: &FlattenedGeometry,
    triangles: bool,
) -> Vec<u32> {
    if triangles {
        return flattened.material_indices.clone();
    }
    let material_count = scene.materials.len();
    let mut entries: Vec<u32> = scene
        .spheres
        .iter()
        .map(|sphere| sphere.material_index)
        .collect();
    replace_invalid_material_indices(&mut entries, material_count);
    entries
}

fn replace_invalid_material_indices(material_indices: &mut [u32], material_count: usize) {
    let mut invalid = 0;
    for index in material_indices.iter_mut() {
        if *index as usize >= material_count {
            *index = 0;
            invalid += 1;
        }
    }
    if invalid > 0 {
        log::warn!(
            "{invalid} primitives reference a material outside 0..{material_count}, using material 0"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ultraviolet::{Vec2, Vec3};

    use super::*;
    use crate::{
        scene::{Light, Material, Sphere, Vertex},
        vulkan::{
            device::RayTracingDevice,
            test_device::{DeviceCall, RecordingDevice},
        },
    };

    fn resources() -> (Arc<RecordingDevice>, GpuResources) {
        let device = Arc::new(RecordingDevice::default());
        let resources = GpuResources::new(device.clone());
        (device, resources)
    }

    fn quad_and_cube() -> Scene {
        Scene {
            static_meshes: vec![Mesh::quad(1.0, 0, Mat4::identity())],
            dynamic_meshes: vec![Mesh::cube(
                1.0,
                1,
                Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0)),
            )],
            materials: vec![Material::default(), Material::default()],
            lights: vec![Light::default()],
            ..Default::default()
        }
    }

    fn raw(resources: &GpuResources, handle: BufferKey) -> vk::Buffer {
        resources.buffer(handle).unwrap().raw.buffer
    }

    fn read<T: bytemuck::Pod>(device: &RecordingDevice, buffer: vk::Buffer, count: usize) -> Vec<T> {
        device.buffer_contents(buffer)[..count * size_of::<T>()]
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    #[test]
    fn flattening_keeps_buffers_parallel() {
        let scene = quad_and_cube();
        let mut second_cube = Mesh::cube(2.0, 0, Mat4::identity());
        second_cube.indices.truncate(9);
        let dynamic = vec![scene.dynamic_meshes[0].clone(), second_cube];

        let flattened = flatten_meshes(&scene.static_meshes, &dynamic);

        assert_eq!(flattened.vertices.len(), 4 + 24 + 24);
        assert_eq!(flattened.indices.len(), 6 + 36 + 9);
        assert_eq!(flattened.material_indices.len(), 2 + 12 + 3);
        assert!(flattened
            .indices
            .iter()
            .all(|&index| (index as usize) < flattened.vertices.len()));
        assert_eq!(flattened.indices[6], 4);
        assert_eq!(flattened.indices[42], 28);
    }

    #[test]
    fn translation_moves_positions_and_keeps_normals() {
        let translation = Vec3::new(3.0, -2.0, 0.5);
        let vertices = vec![
            Vertex {
                position: Vec3::new(1.0, 2.0, 3.0),
                normal: Vec3::new(0.0, 0.6, 0.8),
                tex_coord: Vec2::new(0.25, 0.75),
            },
            Vertex {
                position: Vec3::new(-1.0, 0.0, 4.0),
                normal: Vec3::new(1.0, 0.0, 0.0),
                tex_coord: Vec2::zero(),
            },
        ];
        let mesh = Mesh::new(
            "Translated",
            vertices.clone(),
            vec![0, 1, 0],
            0,
            Mat4::from_translation(translation),
        );

        let flattened = flatten_meshes(&[mesh], &[]);

        for (input, output) in vertices.iter().zip(&flattened.vertices) {
            assert_eq!(output.position, <[f32; 3]>::from(input.position + translation));
            assert_eq!(output.normal, <[f32; 3]>::from(input.normal));
            assert_eq!(output.uv, <[f32; 2]>::from(input.tex_coord));
        }
    }

    #[test]
    fn non_uniform_scale_keeps_normals_perpendicular() {
        let scale = Mat4::from_nonuniform_scale(Vec3::new(4.0, 1.0, 1.0));
        let mesh = Mesh::new(
            "Slanted",
            vec![Vertex {
                position: Vec3::zero(),
                normal: Vec3::new(1.0, 1.0, 0.0),
                tex_coord: Vec2::zero(),
            }],
            Vec::new(),
            0,
            scale,
        );

        let flattened = flatten_meshes(&[mesh], &[]);
        let normal = Vec3::from(flattened.vertices[0].normal);

        // The surface direction (1, -1, 0) becomes (4, -1, 0) under the scale.
        assert!(normal.dot(Vec3::new(4.0, -1.0, 0.0)).abs() < 1e-6);
    }

    #[test]
    fn quad_then_cube_material_indices() {
        let (device, mut resources) = resources();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();

        let report = uploader
            .sync(&mut resources, &mut textures, &quad_and_cube())
            .unwrap();

        let material_indices: Vec<u32> = read(
            &device,
            raw(&resources, report.buffers.material_indices),
            14,
        );
        assert_eq!(material_indices[..2], [0, 0]);
        assert_eq!(material_indices[2..], [1; 12]);
        assert_eq!(
            report.geometry,
            Some(SceneGeometry::Triangles {
                vertex_buffer: report.buffers.vertices,
                index_buffer: report.buffers.indices,
                vertex_count: 28,
                index_count: 42,
            })
        );
    }

    #[test]
    fn identical_scene_reallocates_once() {
        let (device, mut resources) = resources();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();
        let scene = quad_and_cube();

        let first = uploader.sync(&mut resources, &mut textures, &scene).unwrap();
        let allocations = device.created_buffer_sizes().len();
        let vertex_writes = device.writes_to(raw(&resources, first.buffers.vertices));
        let second = uploader.sync(&mut resources, &mut textures, &scene).unwrap();

        assert_eq!(first.reallocated.len(), 6);
        assert!(second.reallocated.is_empty());
        assert_eq!(second.buffers, first.buffers);
        assert_eq!(device.created_buffer_sizes().len(), allocations);
        assert_eq!(resources.pending_free_count(), 0);
        // Contents are still rewritten.
        assert_eq!(
            device.writes_to(raw(&resources, first.buffers.vertices)),
            vertex_writes + 1
        );
    }

    #[test]
    fn only_changed_counts_reallocate() {
        let (_device, mut resources) = resources();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();
        let mut scene = quad_and_cube();
        let first = uploader.sync(&mut resources, &mut textures, &scene).unwrap();

        scene.lights.push(Light::default());
        let second = uploader.sync(&mut resources, &mut textures, &scene).unwrap();

        assert_eq!(second.reallocated, vec![SceneBuffer::Lights]);
        assert_ne!(second.buffers.lights, first.buffers.lights);
        assert_eq!(second.buffers.vertices, first.buffers.vertices);
        assert_eq!(resources.pending_free_count(), 1);
    }

    #[test]
    fn moving_a_mesh_keeps_capacity() {
        let (_device, mut resources) = resources();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();
        let mut scene = quad_and_cube();
        uploader.sync(&mut resources, &mut textures, &scene).unwrap();

        scene.dynamic_meshes[0].transform = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let report = uploader.sync(&mut resources, &mut textures, &scene).unwrap();

        assert!(report.reallocated.is_empty());
    }

    #[test]
    fn materials_are_uploaded_before_and_after_texture_resolution() {
        let directory = tempfile::tempdir().unwrap();
        image::RgbaImage::new(2, 2)
            .save(directory.path().join("checker.png"))
            .unwrap();
        let (device, mut resources) = resources();
        let mut textures = TextureCache::new(directory.path());
        let mut uploader = SceneUploader::default();
        let mut scene = quad_and_cube();
        scene.materials[1].texture = Some("checker.png".to_string());
        scene.materials.push(Material {
            texture: Some("missing.png".to_string()),
            ..Material::default()
        });

        let report = uploader.sync(&mut resources, &mut textures, &scene).unwrap();
        let materials_buffer = raw(&resources, report.buffers.materials);

        assert_eq!(device.writes_to(materials_buffer), 2);
        let materials: Vec<GpuMaterial> = read(&device, materials_buffer, 3);
        let texture_indices: Vec<i32> = materials.iter().map(|m| m.texture_index).collect();
        assert_eq!(texture_indices, vec![-1, 0, -1]);
    }

    #[test]
    fn texture_device_failure_fails_the_sync() {
        let directory = tempfile::tempdir().unwrap();
        image::RgbaImage::new(2, 2)
            .save(directory.path().join("checker.png"))
            .unwrap();
        let (device, mut resources) = resources();
        device.fail_image_creation();
        let mut textures = TextureCache::new(directory.path());
        let mut uploader = SceneUploader::default();
        let mut scene = quad_and_cube();
        scene.materials[1].texture = Some("checker.png".to_string());

        let result = uploader.sync(&mut resources, &mut textures, &scene);

        assert!(matches!(
            result,
            Err(DeviceError::NoCompatibleMemoryType { .. })
        ));
    }

    #[test]
    fn buffer_allocation_failure_fails_the_sync() {
        let (device, mut resources) = resources();
        device.fail_buffer_creation();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();

        let result = uploader.sync(&mut resources, &mut textures, &quad_and_cube());

        assert!(result.is_err());
        assert!(uploader.buffers().is_none());
    }

    #[test]
    fn invalid_material_index_falls_back_to_zero() {
        let (device, mut resources) = resources();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();
        let mut scene = quad_and_cube();
        scene.dynamic_meshes[0].material_index = 7;

        let report = uploader.sync(&mut resources, &mut textures, &scene).unwrap();

        let material_indices: Vec<u32> = read(
            &device,
            raw(&resources, report.buffers.material_indices),
            14,
        );
        assert!(material_indices.iter().all(|&index| index == 0));
    }

    #[test]
    fn spheres_without_meshes_are_procedural() {
        let (device, mut resources) = resources();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();
        let scene = Scene {
            spheres: vec![
                Sphere {
                    center: Vec3::new(0.0, 1.0, 0.0),
                    radius: 1.0,
                    material_index: 1,
                },
                Sphere {
                    center: Vec3::new(3.0, 0.5, 0.0),
                    radius: 0.5,
                    material_index: 0,
                },
            ],
            materials: vec![Material::default(), Material::default()],
            ..Default::default()
        };

        let report = uploader.sync(&mut resources, &mut textures, &scene).unwrap();

        assert_eq!(
            report.geometry,
            Some(SceneGeometry::Procedural {
                aabb_buffer: report.buffers.aabbs,
                primitive_count: 2,
            })
        );
        let aabbs: Vec<AabbPositions> = read(&device, raw(&resources, report.buffers.aabbs), 2);
        assert_eq!(aabbs[0].min, [-1.0, 0.0, -1.0]);
        assert_eq!(aabbs[1].max, [3.5, 1.0, 0.5]);
        let material_indices: Vec<u32> =
            read(&device, raw(&resources, report.buffers.material_indices), 2);
        assert_eq!(material_indices, vec![1, 0]);
    }

    fn point_mesh_and_spheres(sphere_count: usize) -> Scene {
        Scene {
            static_meshes: vec![Mesh::new(
                "point",
                vec![Vertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0])],
                Vec::new(),
                0,
                Mat4::identity(),
            )],
            spheres: (0..sphere_count)
                .map(|i| Sphere {
                    center: Vec3::new(i as f32 * 2.0, 1.0, 0.0),
                    radius: 0.5,
                    material_index: 0,
                })
                .collect(),
            materials: vec![Material::default()],
            ..Default::default()
        }
    }

    #[test]
    fn meshes_without_triangles_fall_back_to_spheres() {
        let (device, mut resources) = resources();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();

        let report = uploader
            .sync(&mut resources, &mut textures, &point_mesh_and_spheres(8))
            .unwrap();

        assert_eq!(
            report.geometry,
            Some(SceneGeometry::Procedural {
                aabb_buffer: report.buffers.aabbs,
                primitive_count: 8,
            })
        );
        assert_eq!(report.counts.material_indices, 8);
        let material_indices: Vec<u32> =
            read(&device, raw(&resources, report.buffers.material_indices), 8);
        assert_eq!(material_indices, vec![0; 8]);
    }

    #[test]
    fn switching_to_procedural_resizes_material_indices() {
        let (device, mut resources) = resources();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();
        let mut scene = point_mesh_and_spheres(8);
        scene.static_meshes[0].indices = vec![0, 0, 0];
        let first = uploader.sync(&mut resources, &mut textures, &scene).unwrap();
        assert_eq!(first.counts.material_indices, 1);

        scene.static_meshes.clear();
        let second = uploader.sync(&mut resources, &mut textures, &scene).unwrap();

        assert!(second.reallocated.contains(&SceneBuffer::MaterialIndices));
        let record = resources.buffer(second.buffers.material_indices).unwrap();
        assert_eq!(record.requested_size, 8 * size_of::<u32>() as vk::DeviceSize);
        assert!(device.buffer_contents(record.raw.buffer).len() >= 32);
        assert!(matches!(
            second.geometry,
            Some(SceneGeometry::Procedural { primitive_count: 8, .. })
        ));
    }

    #[test]
    fn empty_scene_still_backs_every_binding() {
        let (device, mut resources) = resources();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();

        let report = uploader
            .sync(&mut resources, &mut textures, &Scene::default())
            .unwrap();

        assert_eq!(report.geometry, None);
        assert_eq!(
            device.count(|call| matches!(call, DeviceCall::CreateBuffer { .. })),
            6
        );
        assert!(device.created_buffer_sizes().iter().all(|&size| size > 0));
        let vertices = resources.buffer(report.buffers.vertices).unwrap();
        assert_eq!(vertices.requested_size, 0);
        assert!(device.buffer_device_address(&vertices.raw) > 0);
    }

    #[test]
    fn release_disposes_every_buffer() {
        let (_device, mut resources) = resources();
        let mut textures = TextureCache::new("textures");
        let mut uploader = SceneUploader::default();
        uploader
            .sync(&mut resources, &mut textures, &quad_and_cube())
            .unwrap();

        uploader.release(&mut resources);

        assert_eq!(resources.pending_free_count(), 6);
        assert!(uploader.buffers().is_none());
        assert!(uploader.counts().is_none());
    }
}
