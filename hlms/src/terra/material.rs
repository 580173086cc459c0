//! Terra material parameters and their GPU record.

use redlilium_hlms_core::math::{Vec3, Vec4};
use redlilium_hlms_core::BufferWriter;
use static_assertions::const_assert;

use crate::datablock::Datablock;
use crate::pbs::Brdf;

/// Texture slots of a Terra datablock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerraTexture {
    Diffuse = 0,
    DetailWeight,
    Detail0,
    Detail1,
    Detail2,
    Detail3,
    DetailNm0,
    DetailNm1,
    DetailNm2,
    DetailNm3,
    DetailRoughness0,
    DetailRoughness1,
    DetailRoughness2,
    DetailRoughness3,
    DetailMetalness0,
    DetailMetalness1,
    DetailMetalness2,
    DetailMetalness3,
    Reflection,
}

pub const NUM_TEXTURE_TYPES: usize = TerraTexture::Reflection as usize + 1;

impl TerraTexture {
    pub fn detail(idx: usize) -> usize {
        Self::Detail0 as usize + idx
    }

    pub fn detail_normal(idx: usize) -> usize {
        Self::DetailNm0 as usize + idx
    }

    pub fn detail_roughness(idx: usize) -> usize {
        Self::DetailRoughness0 as usize + idx
    }

    pub fn detail_metalness(idx: usize) -> usize {
        Self::DetailMetalness0 as usize + idx
    }

    /// Whether textures of this type hold colour rather than data.
    pub fn is_srgb(ty: usize) -> bool {
        let data = ty == Self::DetailWeight as usize
            || (Self::DetailNm0 as usize..=Self::DetailMetalness3 as usize).contains(&ty);
        !data
    }
}

const RECORD_FLOATS: usize = 28;

/// Bytes per material in the pool: 28 floats and one `u16` descriptor index
/// per texture type, padded to 16 bytes.
pub const MATERIAL_SIZE_IN_GPU: usize =
    (RECORD_FLOATS * 4 + NUM_TEXTURE_TYPES * 2).div_ceil(16) * 16;

const_assert!(MATERIAL_SIZE_IN_GPU == 160);

const INV_PI: f32 = std::f32::consts::FRAC_1_PI;

/// Detail offset/scale that leaves UVs untouched. Anything else enables the
/// offset code in the shader.
pub fn identity_offset_scale() -> Vec4 {
    Vec4::new(0.0, 0.0, 1.0, 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerraMaterial {
    /// Diffuse colour, already divided by pi.
    k_d: Vec3,
    pub roughness: [f32; 4],
    pub metalness: [f32; 4],
    /// UV offset in `xy`, scale in `zw`, per detail map.
    pub detail_offset_scale: [Vec4; 4],
    pub brdf: Brdf,
}

impl Default for TerraMaterial {
    fn default() -> Self {
        Self {
            k_d: Vec3::new(INV_PI, INV_PI, INV_PI),
            roughness: [1.0; 4],
            metalness: [1.0; 4],
            detail_offset_scale: [identity_offset_scale(); 4],
            brdf: Brdf::DEFAULT,
        }
    }
}

impl TerraMaterial {
    pub fn with_brdf(mut self, brdf: Brdf) -> Self {
        self.brdf = brdf;
        self
    }

    pub fn set_diffuse(&mut self, colour: Vec3) {
        self.k_d = colour * INV_PI;
    }

    pub fn diffuse(&self) -> Vec3 {
        self.k_d * std::f32::consts::PI
    }

    pub fn set_roughness(&mut self, detail: usize, roughness: f32) {
        if roughness <= 1e-6 {
            log::warn!(
                "terra: very low roughness ({roughness}) on detail map {detail} can cause NaNs \
                 in the pixel shader"
            );
        }
        self.roughness[detail] = roughness;
    }

    pub fn set_metalness(&mut self, detail: usize, metalness: f32) {
        self.metalness[detail] = metalness;
    }

    /// Returns true when the change toggles the offset code in the shader,
    /// i.e. renderables using this material must be hashed again.
    pub fn set_detail_offset_scale(&mut self, detail: usize, offset_scale: Vec4) -> bool {
        let identity = identity_offset_scale();
        let was_identity = self.detail_offset_scale[detail] == identity;
        self.detail_offset_scale[detail] = offset_scale;
        was_identity != (offset_scale == identity)
    }

    pub(crate) fn write_gpu_record(&self, datablock: &Datablock, writer: &mut BufferWriter) {
        writer.write_vec3_w(&self.k_d, 1.0);
        writer.write_f32s(&self.roughness);
        writer.write_f32s(&self.metalness);
        for offset_scale in &self.detail_offset_scale {
            writer.write_vec4(offset_scale);
        }
        for idx in datablock.descriptor_indices() {
            writer.write(idx);
        }
        let written = RECORD_FLOATS * 4 + NUM_TEXTURE_TYPES * 2;
        writer.write_bytes(&[0u8; MATERIAL_SIZE_IN_GPU][..MATERIAL_SIZE_IN_GPU - written]);
    }
}
