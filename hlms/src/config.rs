//! Runtime configuration of an [`Hlms`](crate::Hlms) instance.

use redlilium_hlms_core::{Result, StructuralError};
use serde::{Deserialize, Serialize};

/// Filtering used when sampling shadow maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadowFilter {
    /// Hardware 2x2 PCF.
    Pcf2x2,
    /// 3x3 PCF (4 taps with texture gather).
    #[default]
    Pcf3x3,
    /// 4x4 PCF (9 taps with texture gather).
    Pcf4x4,
    /// Exponential shadow maps.
    ExponentialShadowMaps,
}

/// How the ambient term is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AmbientLightMode {
    /// Fixed when upper and lower hemisphere colours match, hemisphere otherwise.
    #[default]
    Auto,
    Fixed,
    Hemisphere,
    SphericalHarmonics,
    SphericalHarmonicsMonochrome,
    /// Disable ambient entirely.
    None,
}

/// Tunables shared by every material kind.
///
/// Every field has a default, so a JSON document only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HlmsConfig {
    /// Size in bytes of each object constant buffer.
    pub const_buffer_size: usize,
    /// Size in bytes of each object texture buffer.
    pub tex_buffer_size: usize,
    /// Put light arrays in three dedicated buffers instead of the pass buffer.
    pub use_light_buffers: bool,
    pub shadow_filter: ShadowFilter,
    pub ambient_light_mode: AmbientLightMode,
    /// Exponent of exponential shadow maps.
    pub esm_k: u16,
    /// Materials per material buffer.
    pub slots_per_pool: u32,
    pub fast_shader_build_hack: bool,
    pub lower_gpu_overhead: bool,
    pub debug_pssm_splits: bool,
    pub area_light_approx_limit: u16,
    pub area_light_ltc_limit: u16,
    pub static_branch_lights: bool,
    /// Caps non-casting directional lights. 0 means no cap.
    pub num_lights_limit: u16,
    pub fine_light_mask: bool,
    pub obb_restraint_approx: bool,
    pub obb_restraint_ltc: bool,
    pub pcc_vct_min_distance: f32,
    pub inv_pcc_vct_distance: f32,
    pub max_spec_ibl_mipmap: f32,
    /// Texture slots consumed before pass textures. `None` uses the material default.
    pub reserved_tex_slots: Option<u16>,
}

impl Default for HlmsConfig {
    fn default() -> Self {
        Self {
            const_buffer_size: 65536,
            tex_buffer_size: 4 * 1024 * 1024,
            use_light_buffers: false,
            shadow_filter: ShadowFilter::default(),
            ambient_light_mode: AmbientLightMode::default(),
            esm_k: 600,
            slots_per_pool: 256,
            fast_shader_build_hack: false,
            lower_gpu_overhead: false,
            debug_pssm_splits: false,
            area_light_approx_limit: 1,
            area_light_ltc_limit: 1,
            static_branch_lights: false,
            num_lights_limit: 0,
            fine_light_mask: true,
            obb_restraint_approx: false,
            obb_restraint_ltc: false,
            pcc_vct_min_distance: 1.0,
            inv_pcc_vct_distance: 1.0,
            max_spec_ibl_mipmap: 1.0,
            reserved_tex_slots: None,
        }
    }
}

impl HlmsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a (possibly partial) JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| StructuralError::invalid_params(format!("hlms config: {err}")))
    }

    pub fn with_const_buffer_size(mut self, size: usize) -> Self {
        self.const_buffer_size = size;
        self
    }

    pub fn with_tex_buffer_size(mut self, size: usize) -> Self {
        self.tex_buffer_size = size;
        self
    }

    pub fn with_light_buffers(mut self, enabled: bool) -> Self {
        self.use_light_buffers = enabled;
        self
    }

    pub fn with_shadow_filter(mut self, filter: ShadowFilter) -> Self {
        self.shadow_filter = filter;
        self
    }

    pub fn with_ambient_light_mode(mut self, mode: AmbientLightMode) -> Self {
        self.ambient_light_mode = mode;
        self
    }

    pub fn with_esm_k(mut self, k: u16) -> Self {
        self.esm_k = k;
        self
    }

    pub fn with_slots_per_pool(mut self, slots: u32) -> Self {
        self.slots_per_pool = slots;
        self
    }

    pub fn with_area_light_limits(mut self, approx: u16, ltc: u16) -> Self {
        self.area_light_approx_limit = approx;
        self.area_light_ltc_limit = ltc;
        self
    }

    pub fn with_static_branch_lights(mut self, enabled: bool) -> Self {
        self.static_branch_lights = enabled;
        self
    }

    pub fn with_num_lights_limit(mut self, limit: u16) -> Self {
        self.num_lights_limit = limit;
        self
    }

    pub fn with_obb_restraint(mut self, approx: bool, ltc: bool) -> Self {
        self.obb_restraint_approx = approx;
        self.obb_restraint_ltc = ltc;
        self
    }

    pub fn with_lower_gpu_overhead(mut self, enabled: bool) -> Self {
        self.lower_gpu_overhead = enabled;
        self
    }

    pub fn with_reserved_tex_slots(mut self, slots: u16) -> Self {
        self.reserved_tex_slots = Some(slots);
        self
    }

    /// Number of floats in one object texture buffer.
    pub fn tex_buffer_floats(&self) -> usize {
        self.tex_buffer_size / 4
    }
}
