//! Texture, sampler and pipeline-state handles consumed by the HLMS.

use std::sync::Arc;

use redlilium_hlms_core::IdString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SamplerId(pub u32);

/// The subset of pixel formats whose layout changes shader code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rg8Unorm,
    Rg8Snorm,
    R8Unorm,
    Rgba16Float,
    R16Float,
    R32Float,
    Rg16Float,
    Depth32Float,
    Depth24Stencil8,
    Bc5Unorm,
    Bc5Snorm,
}

impl PixelFormat {
    pub fn is_signed(self) -> bool {
        matches!(self, Self::Rg8Snorm | Self::Bc5Snorm)
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float | Self::Depth24Stencil8)
    }

    pub fn num_components(self) -> u32 {
        match self {
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Rgba16Float => 4,
            Self::Rg8Unorm
            | Self::Rg8Snorm
            | Self::Rg16Float
            | Self::Bc5Unorm
            | Self::Bc5Snorm => 2,
            Self::R8Unorm | Self::R16Float | Self::R32Float => 1,
            Self::Depth32Float | Self::Depth24Stencil8 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    #[default]
    Tex2d,
    Tex2dArray,
    Cube,
    CubeArray,
    Tex3d,
}

/// A texture as far as the HLMS cares: identity, name and shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureGpu {
    pub id: TextureId,
    pub name: IdString,
    pub width: u32,
    pub height: u32,
    /// Depth or number of array slices.
    pub depth: u32,
    pub num_mipmaps: u8,
    pub msaa: u8,
    pub format: PixelFormat,
    pub texture_type: TextureType,
}

impl TextureGpu {
    pub fn new(id: TextureId, name: &str, width: u32, height: u32) -> Self {
        Self {
            id,
            name: IdString::new(name),
            width,
            height,
            depth: 1,
            num_mipmaps: 1,
            msaa: 1,
            format: PixelFormat::default(),
            texture_type: TextureType::default(),
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_type(mut self, texture_type: TextureType) -> Self {
        self.texture_type = texture_type;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_mipmaps(mut self, num_mipmaps: u8) -> Self {
        self.num_mipmaps = num_mipmaps;
        self
    }

    pub fn with_msaa(mut self, samples: u8) -> Self {
        self.msaa = samples;
        self
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self.texture_type,
            TextureType::Tex2dArray | TextureType::CubeArray
        )
    }

    pub fn is_cubemap(&self) -> bool {
        matches!(self.texture_type, TextureType::Cube | TextureType::CubeArray)
    }

    pub fn is_msaa(&self) -> bool {
        self.msaa > 1
    }
}

/// Textures bound together in one descriptor set.
///
/// Sets are shared through `Arc`; the object packer compares them with
/// `Arc::ptr_eq` to skip redundant binds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorSetTexture {
    pub textures: Vec<TextureGpu>,
}

impl DescriptorSetTexture {
    pub fn new(textures: Vec<TextureGpu>) -> Self {
        Self { textures }
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetSampler {
    pub samplers: Vec<SamplerId>,
}

impl DescriptorSetSampler {
    pub fn new(samplers: Vec<SamplerId>) -> Self {
        Self { samplers }
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }
}

/// True when both options point at the same shared set (or are both empty).
pub fn same_set<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Depth/alpha comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    #[default]
    AlwaysPass,
    AlwaysFail,
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
}

impl CompareFunction {
    /// Operator spelled the way the shader templates expect it.
    pub fn cmp_string(self) -> &'static str {
        match self {
            Self::AlwaysPass => "true ||",
            Self::AlwaysFail => "false &&",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterEqual => ">=",
            Self::Greater => ">",
        }
    }
}

/// Rasterizer/depth state. Only its pipeline-cache id matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Macroblock {
    pub id: u16,
    pub depth_write: bool,
    pub depth_check: bool,
}

impl Macroblock {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            depth_write: true,
            depth_check: true,
        }
    }
}

/// Blending state. Only its id and transparency flags matter here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Blendblock {
    pub id: u16,
    /// The blend factors make this block transparent.
    pub auto_transparent: bool,
    pub alpha_to_coverage: bool,
}

impl Blendblock {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn transparent(mut self) -> Self {
        self.auto_transparent = true;
        self
    }

    pub fn with_alpha_to_coverage(mut self) -> Self {
        self.alpha_to_coverage = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_set_by_pointer() {
        let a = Some(Arc::new(DescriptorSetSampler::new(vec![SamplerId(1)])));
        let b = Some(Arc::new(DescriptorSetSampler::new(vec![SamplerId(1)])));
        assert!(same_set(&a, &a.clone()));
        assert!(!same_set(&a, &b));
        assert!(same_set::<DescriptorSetSampler>(&None, &None));
    }

    #[test]
    fn test_format_queries() {
        assert!(PixelFormat::Bc5Snorm.is_signed());
        assert!(PixelFormat::Depth32Float.is_depth());
        assert_eq!(PixelFormat::Rg8Unorm.num_components(), 2);
    }

    #[test]
    fn test_default_pass_samplers() {
        let samplers = crate::scene::PassSamplers::default();
        assert_eq!(samplers.trilinear, SamplerId(0));
        assert_eq!(samplers.shadow_map, SamplerId::default());
    }
}
