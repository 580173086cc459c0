//! PBS material parameters and their GPU record.

use bitflags::bitflags;
use redlilium_hlms_core::math::{Vec3, Vec4};
use redlilium_hlms_core::BufferWriter;
use static_assertions::const_assert;

use crate::backend::GpuBuffer;
use crate::datablock::Datablock;

/// Texture slots of a PBS datablock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PbsTexture {
    Diffuse = 0,
    Normal,
    Specular,
    Roughness,
    DetailWeight,
    Detail0,
    Detail1,
    Detail2,
    Detail3,
    DetailNm0,
    DetailNm1,
    DetailNm2,
    DetailNm3,
    Emissive,
    Reflection,
}

pub const NUM_TEXTURE_TYPES: usize = PbsTexture::Reflection as usize + 1;

impl PbsTexture {
    pub fn detail(idx: usize) -> usize {
        Self::Detail0 as usize + idx
    }

    pub fn detail_normal(idx: usize) -> usize {
        Self::DetailNm0 as usize + idx
    }
}

const RECORD_FLOATS: usize = 56;

/// Bytes per material in the pool: 56 floats and one `u16` descriptor index
/// per texture type, padded to 16 bytes.
pub const MATERIAL_SIZE_IN_GPU: usize =
    (RECORD_FLOATS * 4 + NUM_TEXTURE_TYPES * 2).div_ceil(16) * 16;

const_assert!(MATERIAL_SIZE_IN_GPU == 256);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Workflow {
    #[default]
    Specular,
    /// Specular colour is the fresnel F0.
    SpecularAsFresnel,
    Metallic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransparencyMode {
    #[default]
    None,
    /// Fades diffuse and specular.
    Transparent,
    /// Keeps specular, fades diffuse.
    Fade,
    /// Screen-space refractions.
    Refractive,
}

/// BRDF selection in the low bits, modifier flags in the high bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Brdf(pub u32);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BrdfFlags: u32 {
        const UNCORRELATED = 1 << 31;
        const SEPARATE_DIFFUSE_FRESNEL = 1 << 30;
        const LEGACY_MATH = 1 << 29;
        const FULL_LEGACY = 1 << 28;
    }
}

impl Brdf {
    pub const MASK: u32 = 0xFFF;
    pub const DEFAULT: Brdf = Brdf(0);
    pub const COOK_TORRANCE: Brdf = Brdf(1);
    pub const BLINN_PHONG: Brdf = Brdf(2);
    pub const DEFAULT_UNCORRELATED: Brdf = Brdf(BrdfFlags::UNCORRELATED.bits());

    pub fn base(self) -> u32 {
        self.0 & Self::MASK
    }

    pub fn flags(self) -> BrdfFlags {
        BrdfFlags::from_bits_truncate(self.0)
    }

    pub fn with_flags(self, flags: BrdfFlags) -> Self {
        Brdf(self.0 | flags.bits())
    }
}

impl Default for Brdf {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Detail map blending, spliced into the pixel shader as a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    NormalNonPremul,
    NormalPremul,
    Add,
    Subtract,
    Multiply,
    Multiply2x,
    Screen,
    Overlay,
    Lighten,
    Darken,
    GrainExtract,
    GrainMerge,
    Difference,
}

impl BlendMode {
    pub fn piece_name(self) -> &'static str {
        match self {
            Self::NormalNonPremul => "NormalNonPremul",
            Self::NormalPremul => "NormalPremul",
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Multiply => "Multiply",
            Self::Multiply2x => "Multiply2x",
            Self::Screen => "Screen",
            Self::Overlay => "Overlay",
            Self::Lighten => "Lighten",
            Self::Darken => "Darken",
            Self::GrainExtract => "GrainExtract",
            Self::GrainMerge => "GrainMerge",
            Self::Difference => "Difference",
        }
    }

    /// `@insertpiece( Name)`, as the templates expect it.
    pub fn piece(self) -> String {
        format!("@insertpiece( {})", self.piece_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PbsMaterial {
    pub workflow: Workflow,
    pub brdf: Brdf,
    pub transparency_mode: TransparencyMode,
    pub transparency: f32,
    pub use_alpha_from_textures: bool,
    pub two_sided_lighting: bool,
    pub receive_shadows: bool,
    /// Per-channel fresnel instead of a scalar.
    pub separate_fresnel: bool,
    pub use_emissive_as_lightmap: bool,
    /// Const buffer of the manually placed cubemap probe the reflection
    /// texture was captured by. Bound at slot 3 with the material buffer.
    pub manual_probe: Option<GpuBuffer>,

    pub background_diffuse: Vec4,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub roughness: f32,
    pub fresnel: Vec3,
    pub emissive: Vec3,
    pub normal_map_weight: f32,
    pub refraction_strength: f32,
    pub clear_coat: f32,
    pub clear_coat_roughness: f32,
    pub detail_normal_weights: [f32; 4],
    pub detail_weights: [f32; 4],
    /// `xy` offset, `zw` scale.
    pub detail_offset_scale: [Vec4; 4],
    pub blend_modes: [BlendMode; 4],
    /// UV set of every texture type but the reflection.
    pub uv_source: [u8; NUM_TEXTURE_TYPES - 1],
    pub user_values: [Vec4; 2],
}

impl Default for PbsMaterial {
    fn default() -> Self {
        Self {
            workflow: Workflow::default(),
            brdf: Brdf::default(),
            transparency_mode: TransparencyMode::default(),
            transparency: 1.0,
            use_alpha_from_textures: true,
            two_sided_lighting: false,
            receive_shadows: true,
            separate_fresnel: false,
            use_emissive_as_lightmap: false,
            manual_probe: None,
            background_diffuse: Vec4::new(1.0, 1.0, 1.0, 1.0),
            diffuse: Vec3::new(1.0, 1.0, 1.0) / std::f32::consts::PI,
            specular: Vec3::new(1.0, 1.0, 1.0),
            roughness: 1.0,
            fresnel: Vec3::new(0.818, 0.818, 0.818),
            emissive: Vec3::zeros(),
            normal_map_weight: 1.0,
            refraction_strength: 0.075,
            clear_coat: 0.0,
            clear_coat_roughness: 0.0,
            detail_normal_weights: [1.0; 4],
            detail_weights: [1.0; 4],
            detail_offset_scale: [Vec4::new(0.0, 0.0, 1.0, 1.0); 4],
            blend_modes: [BlendMode::default(); 4],
            uv_source: [0; NUM_TEXTURE_TYPES - 1],
            user_values: [Vec4::zeros(); 2],
        }
    }
}

impl PbsMaterial {
    pub fn metallic() -> Self {
        Self {
            workflow: Workflow::Metallic,
            ..Default::default()
        }
    }

    pub fn with_transparency(mut self, value: f32, mode: TransparencyMode) -> Self {
        self.transparency = value;
        self.transparency_mode = mode;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn has_emissive_constant(&self) -> bool {
        self.emissive != Vec3::zeros()
    }

    /// Transparency is premultiplied into the colours uploaded to the GPU.
    fn premultiplied(&self) -> (Vec3, Vec3) {
        if self.transparency_mode != TransparencyMode::Transparent {
            return (self.diffuse, self.fresnel);
        }
        let fresnel = if self.workflow != Workflow::Metallic {
            self.fresnel * self.transparency
        } else {
            self.fresnel
        };
        (self.diffuse * self.transparency * self.transparency, fresnel)
    }

    pub(crate) fn write_gpu_record(&self, datablock: &Datablock, writer: &mut BufferWriter) {
        let (diffuse, fresnel) = self.premultiplied();
        writer.write_vec4(&self.background_diffuse);
        writer.write_vec3_w(&diffuse, datablock.alpha_test_threshold);
        writer.write_vec3_w(&self.specular, self.roughness);
        writer.write_vec3_w(&fresnel, self.transparency);
        writer.write_f32s(&self.detail_normal_weights);
        writer.write_f32s(&self.detail_weights);
        for offset_scale in &self.detail_offset_scale {
            writer.write_vec4(offset_scale);
        }
        writer.write_vec3_w(&self.emissive, self.normal_map_weight);
        writer.write_f32s(&[
            self.refraction_strength,
            self.clear_coat,
            self.clear_coat_roughness,
            0.0,
        ]);
        for value in &self.user_values {
            writer.write_vec4(value);
        }
        for idx in datablock.descriptor_indices() {
            writer.write(idx);
        }
        let written = RECORD_FLOATS * 4 + NUM_TEXTURE_TYPES * 2;
        writer.write_bytes(&[0u8; MATERIAL_SIZE_IN_GPU][..MATERIAL_SIZE_IN_GPU - written]);
    }
}
