//! Device layout mirrors of the scene data. Every struct is `#[repr(C)]` with the
//! padding the shaders' std430 declarations expect.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ultraviolet::{Mat4, Vec3};

use crate::scene::{Light, LightKind, Material};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub _pad0: f32,
    pub normal: [f32; 3],
    pub _pad1: f32,
    pub uv: [f32; 2],
    pub _pad2: [f32; 2],
}

impl GpuVertex {
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.into(),
            normal: normal.into(),
            uv,
            ..Default::default()
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub albedo: [f32; 3],
    pub roughness: f32,
    pub emission: [f32; 3],
    pub metallic: f32,
    /// Slot in the texture array, -1 when untextured.
    pub texture_index: i32,
    pub tiling: f32,
    pub _pad: [f32; 2],
}

impl GpuMaterial {
    pub const NO_TEXTURE: i32 = -1;

    pub fn new(material: &Material, texture_index: i32) -> Self {
        Self {
            albedo: material.albedo.into(),
            roughness: material.roughness,
            emission: material.emission().into(),
            metallic: material.metallic,
            texture_index,
            tiling: material.tiling,
            _pad: [0.0; 2],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub position: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    /// 0 directional, 1 point.
    pub light_type: f32,
    pub direction: [f32; 3],
    pub radius: f32,
}

impl GpuLight {
    pub const DIRECTIONAL: f32 = 0.0;
    pub const POINT: f32 = 1.0;
}

impl From<&Light> for GpuLight {
    fn from(light: &Light) -> Self {
        let light_type = match light.kind {
            LightKind::Directional => Self::DIRECTIONAL,
            LightKind::Point => Self::POINT,
        };
        Self {
            position: light.position.into(),
            intensity: light.intensity,
            color: light.color.into(),
            light_type,
            direction: light.direction.into(),
            radius: light.radius,
        }
    }
}

/// One box of procedural geometry, the layout of `VkAabbPositionsKHR`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct AabbPositions {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

/// `VkAccelerationStructureInstanceKHR` with the bitfields packed by hand.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    /// Row major 3x4 object to world matrix.
    pub transform: [f32; 12],
    pub custom_index_and_mask: u32,
    pub sbt_offset_and_flags: u32,
    pub blas_reference: u64,
}

impl InstanceRecord {
    pub const IDENTITY: [f32; 12] = [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    ];
    pub const VISIBLE_TO_ALL: u8 = 0xFF;

    /// A single identity instance that is hit from both sides.
    pub fn new(blas_reference: vk::DeviceAddress, sbt_record_offset: u32) -> Self {
        let flags = vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw();
        Self {
            transform: Self::IDENTITY,
            custom_index_and_mask: (u32::from(Self::VISIBLE_TO_ALL) << 24),
            sbt_offset_and_flags: (flags << 24) | (sbt_record_offset & 0x00FF_FFFF),
            blas_reference,
        }
    }

    pub fn custom_index(&self) -> u32 {
        self.custom_index_and_mask & 0x00FF_FFFF
    }

    pub fn mask(&self) -> u8 {
        (self.custom_index_and_mask >> 24) as u8
    }

    pub fn sbt_record_offset(&self) -> u32 {
        self.sbt_offset_and_flags & 0x00FF_FFFF
    }

    pub fn flags(&self) -> vk::GeometryInstanceFlagsKHR {
        vk::GeometryInstanceFlagsKHR::from_raw(self.sbt_offset_and_flags >> 24)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraPushConstants {
    pub inverse_view: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    pub position: [f32; 3],
    pub frame_index: u32,
}

impl CameraPushConstants {
    pub fn new(
        inverse_view: Mat4,
        inverse_projection: Mat4,
        position: Vec3,
        frame_index: u32,
    ) -> Self {
        Self {
            inverse_view: inverse_view.cols.map(|column| column.into()),
            inverse_projection: inverse_projection.cols.map(|column| column.into()),
            position: position.into(),
            frame_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn layouts_match_shader_declarations() {
        assert_eq!(size_of::<GpuVertex>(), 48);
        assert_eq!(size_of::<GpuMaterial>(), 48);
        assert_eq!(size_of::<GpuLight>(), 48);
        assert_eq!(size_of::<AabbPositions>(), 24);
        assert_eq!(size_of::<InstanceRecord>(), 64);
        assert_eq!(size_of::<CameraPushConstants>(), 144);
    }

    #[test]
    fn instance_packs_mask_and_flags() {
        let instance = InstanceRecord::new(0xABCD_0000, 1);

        assert_eq!(instance.custom_index(), 0);
        assert_eq!(instance.mask(), 0xFF);
        assert_eq!(instance.sbt_record_offset(), 1);
        assert_eq!(
            instance.flags(),
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE
        );
        assert_eq!(instance.blas_reference, 0xABCD_0000);
        assert_eq!(instance.transform, InstanceRecord::IDENTITY);
    }

    #[test]
    fn light_kind_is_encoded_numerically() {
        let point = Light {
            kind: LightKind::Point,
            ..Light::default()
        };
        let directional = Light {
            kind: LightKind::Directional,
            ..Light::default()
        };

        assert_eq!(GpuLight::from(&point).light_type, 1.0);
        assert_eq!(GpuLight::from(&directional).light_type, 0.0);
    }

    #[test]
    fn material_carries_emission_and_texture() {
        let material = Material {
            emission_color: Vec3::new(1.0, 0.5, 0.0),
            emission_power: 2.0,
            ..Material::default()
        };

        let gpu = GpuMaterial::new(&material, 3);

        assert_eq!(gpu.emission, [2.0, 1.0, 0.0]);
        assert_eq!(gpu.texture_index, 3);
        assert_eq!(gpu.roughness, 1.0);
    }
}
