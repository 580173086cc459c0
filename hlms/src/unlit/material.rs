//! Unlit material parameters and their GPU records.

use redlilium_hlms_core::math::{Mat4, Vec4};
use redlilium_hlms_core::BufferWriter;
use static_assertions::const_assert;

use crate::datablock::Datablock;
use crate::pbs::BlendMode;

/// Texture slots of an Unlit datablock. Every slot is a diffuse layer.
pub const NUM_TEXTURE_TYPES: usize = 16;

/// Alpha test threshold (padded to a vec4), colour and one `u16` descriptor
/// index per texture type.
pub const MATERIAL_SIZE_IN_GPU: usize = 16 + 16 + NUM_TEXTURE_TYPES * 2;

const_assert!(MATERIAL_SIZE_IN_GPU == 64);

/// One texture matrix per texture type, in the pool's tex buffer.
pub const ANIMATION_MATRICES_SIZE_IN_GPU: usize = 64 * NUM_TEXTURE_TYPES;

/// Identity swizzle: `r` from R, `g` from G and so on.
pub const SWIZZLE_IDENTITY: u8 = 0x1B;

/// Channel selectors of [`UnlitMaterial::set_texture_swizzle`].
pub mod channel {
    pub const R: u8 = 0;
    pub const G: u8 = 1;
    pub const B: u8 = 2;
    pub const A: u8 = 3;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnlitMaterial {
    /// Multiplies the texture colour. Ignored unless `has_colour` is set.
    pub colour: Vec4,
    pub has_colour: bool,
    /// UV set sampled by every texture type.
    pub uv_source: [u8; NUM_TEXTURE_TYPES],
    /// How each layer blends over the previous ones.
    pub blend_modes: [BlendMode; NUM_TEXTURE_TYPES],
    pub texture_matrices: [Mat4; NUM_TEXTURE_TYPES],
    pub enabled_animation_matrices: [bool; NUM_TEXTURE_TYPES],
    /// Texture types that sample a planar reflection.
    pub planar_reflection: [bool; NUM_TEXTURE_TYPES],
    /// Two bits per output channel, `r` in the highest pair.
    pub texture_swizzles: [u8; NUM_TEXTURE_TYPES],
}

impl Default for UnlitMaterial {
    fn default() -> Self {
        Self {
            colour: Vec4::new(1.0, 1.0, 1.0, 1.0),
            has_colour: false,
            uv_source: [0; NUM_TEXTURE_TYPES],
            blend_modes: [BlendMode::NormalPremul; NUM_TEXTURE_TYPES],
            texture_matrices: [Mat4::identity(); NUM_TEXTURE_TYPES],
            enabled_animation_matrices: [false; NUM_TEXTURE_TYPES],
            planar_reflection: [false; NUM_TEXTURE_TYPES],
            texture_swizzles: [SWIZZLE_IDENTITY; NUM_TEXTURE_TYPES],
        }
    }
}

impl UnlitMaterial {
    pub fn with_colour(mut self, colour: Vec4) -> Self {
        self.colour = colour;
        self.has_colour = true;
        self
    }

    pub fn with_blend_mode(mut self, texture_type: usize, mode: BlendMode) -> Self {
        self.blend_modes[texture_type] = mode;
        self
    }

    pub fn with_uv_source(mut self, texture_type: usize, uv_set: u8) -> Self {
        self.uv_source[texture_type] = uv_set;
        self
    }

    /// Animate the UVs of `texture_type` with `matrix`.
    pub fn set_animation_matrix(&mut self, texture_type: usize, matrix: Mat4) {
        self.texture_matrices[texture_type] = matrix;
        self.enabled_animation_matrices[texture_type] = true;
    }

    pub fn set_planar_reflection(&mut self, texture_type: usize, enabled: bool) {
        self.planar_reflection[texture_type] = enabled;
    }

    /// Route source channels `r g b a` into the output channels.
    pub fn set_texture_swizzle(&mut self, texture_type: usize, r: u8, g: u8, b: u8, a: u8) {
        self.texture_swizzles[texture_type] = (r & 3) << 6 | (g & 3) << 4 | (b & 3) << 2 | (a & 3);
    }

    pub fn is_animated(&self, texture_type: usize) -> bool {
        self.enabled_animation_matrices[texture_type]
    }

    /// Swizzle of `texture_type` as GLSL components, e.g. `"xyzw"`.
    pub fn swizzle_string(&self, texture_type: usize) -> String {
        const COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];
        let mask = self.texture_swizzles[texture_type];
        (0..4)
            .map(|j| COMPONENTS[usize::from((mask >> (6 - 2 * j)) & 3)])
            .collect()
    }

    pub(crate) fn write_gpu_record(&self, datablock: &Datablock, writer: &mut BufferWriter) {
        writer.write_f32s(&[datablock.alpha_test_threshold, 0.0, 0.0, 0.0]);
        writer.write_vec4(&self.colour);
        for idx in datablock.descriptor_indices() {
            writer.write(idx);
        }
    }

    /// Texture matrices of every type, enabled or not.
    pub(crate) fn write_animation_matrices(&self, writer: &mut BufferWriter) {
        for matrix in &self.texture_matrices {
            writer.write_mat4(matrix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datablock::MaterialData;
    use crate::types::{CompareFunction, TextureGpu, TextureId};
    use redlilium_hlms_core::buffer_writer::read_f32;
    use redlilium_hlms_core::math::Vec3;

    #[test]
    fn test_record_layout() {
        let material = UnlitMaterial::default().with_colour(Vec4::new(0.5, 0.25, 0.125, 1.0));
        let mut datablock = Datablock::new("unlit", MaterialData::Unlit(material.clone()))
            .with_alpha_test(CompareFunction::Less, 0.75);
        datablock
            .set_texture(3, Some(TextureGpu::new(TextureId(7), "layer", 32, 32)))
            .unwrap();
        let datablock = datablock.baked();

        let mut bytes = vec![0u8; MATERIAL_SIZE_IN_GPU];
        let mut writer = BufferWriter::new(&mut bytes);
        material.write_gpu_record(&datablock, &mut writer);
        assert_eq!(writer.finish(MATERIAL_SIZE_IN_GPU, "unlit").unwrap(), 64);

        let floats: Vec<f32> = bytes[..32]
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(floats[0], 0.75);
        assert_eq!(&floats[4..8], &[0.5, 0.25, 0.125, 1.0]);

        let indices: Vec<u16> = bytes[32..]
            .chunks_exact(2)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(indices[3], 0);
        assert!(indices.iter().enumerate().all(|(i, &idx)| i == 3 || idx == u16::MAX));
    }

    #[test]
    fn test_animation_matrices_cover_every_type() {
        let mut material = UnlitMaterial::default();
        material.set_animation_matrix(1, Mat4::new_translation(&Vec3::new(0.5, 0.0, 0.0)));

        let mut bytes = vec![0u8; ANIMATION_MATRICES_SIZE_IN_GPU];
        let mut writer = BufferWriter::new(&mut bytes);
        material.write_animation_matrices(&mut writer);
        assert_eq!(writer.finish(ANIMATION_MATRICES_SIZE_IN_GPU, "matrices").unwrap(), 1024);
        assert_eq!(read_f32(&bytes, 16 + 3), 0.5);
        assert_eq!(read_f32(&bytes, 3), 0.0);
        assert!(material.is_animated(1));
        assert!(!material.is_animated(0));
    }

    #[test]
    fn test_swizzle_strings() {
        let mut material = UnlitMaterial::default();
        assert_eq!(material.swizzle_string(0), "xyzw");
        material.set_texture_swizzle(0, channel::R, channel::R, channel::R, channel::G);
        assert_eq!(material.swizzle_string(0), "xxxy");
        material.set_texture_swizzle(1, channel::A, channel::B, channel::G, channel::R);
        assert_eq!(material.swizzle_string(1), "wzyx");
    }
}
