//! Property and piece keys of the PBS kind. Terra reuses most of them.

use redlilium_hlms_core::IdString;

use crate::properties::id_strings;

id_strings! {
    USE_LIGHT_BUFFERS = "use_light_buffers";
    HW_GAMMA_READ = "hw_gamma_read";
    HW_GAMMA_WRITE = "hw_gamma_write";
    MATERIALS_PER_BUFFER = "materials_per_buffer";
    LOWER_GPU_OVERHEAD = "lower_gpu_overhead";
    DEBUG_PSSM_SPLITS = "debug_pssm_splits";
    HAS_PLANAR_REFLECTIONS = "has_planar_reflections";

    NUM_TEXTURES = "num_textures";
    NUM_SAMPLERS = "num_samplers";
    DIFFUSE_MAP = "diffuse_map";
    NORMAL_MAP_TEX = "normal_map_tex";
    SPECULAR_MAP = "specular_map";
    ROUGHNESS_MAP = "roughness_map";
    EMISSIVE_MAP = "emissive_map";
    ENVPROBE_MAP = "envprobe_map";
    DETAIL_WEIGHT_MAP = "detail_weight_map";

    NORMAL_MAP = "normal_map";
    FRESNEL_SCALAR = "fresnel_scalar";
    USE_TEXTURE_ALPHA = "use_texture_alpha";
    TRANSPARENT_MODE = "transparent_mode";
    FRESNEL_WORKFLOW = "fresnel_workflow";
    METALLIC_WORKFLOW = "metallic_workflow";
    TWO_SIDED_LIGHTING = "two_sided_lighting";
    RECEIVE_SHADOWS = "receive_shadows";
    USE_PLANAR_REFLECTIONS = "use_planar_reflections";

    NORMAL_SAMPLING_FORMAT = "normal_sampling_format";
    NORMAL_RG_UNORM = "normal_rg_unorm";
    NORMAL_RG_SNORM = "normal_rg_snorm";

    NORMAL_WEIGHT = "normal_weight";
    NORMAL_WEIGHT_TEX = "normal_weight_tex";
    DETAIL_WEIGHTS = "detail_weights";
    DETAIL_MAPS_DIFFUSE = "detail_maps_diffuse";
    DETAIL_MAPS_NORMAL = "detail_maps_normal";
    FIRST_VALID_DETAIL_MAP_NM = "first_valid_detail_map_nm";
    EMISSIVE_CONSTANT = "emissive_constant";
    EMISSIVE_AS_LIGHTMAP = "emissive_as_lightmap";

    PCF_3X3 = "pcf_3x3";
    PCF_4X4 = "pcf_4x4";
    PCF_ITERATIONS = "pcf_iterations";
    EXPONENTIAL_SHADOW_MAPS = "exponential_shadow_maps";

    ENV_MAP_SCALE = "envmap_scale";
    LTC_TEXTURE_AVAILABLE = "ltc_texture_available";
    AMBIENT_FIXED = "ambient_fixed";
    AMBIENT_HEMISPHERE = "ambient_hemisphere";
    AMBIENT_SH = "ambient_sh";
    AMBIENT_SH_MONOCHROME = "ambient_sh_monochrome";
    TARGET_ENVPROBE_MAP = "target_envprobe_map";
    PARALLAX_CORRECT_CUBEMAPS = "parallax_correct_cubemaps";
    USE_PARALLAX_CORRECT_CUBEMAPS = "use_parallax_correct_cubemaps";
    ENABLE_CUBEMAPS_AUTO = "hlms_enable_cubemaps_auto";
    CUBEMAPS_USE_DPM = "hlms_cubemaps_use_dpm";
    IRRADIANCE_VOLUMES = "irradiance_volumes";
    VCT_NUM_PROBES = "vct_num_probes";
    VCT_CONE_DIRS = "vct_cone_dirs";
    VCT_DISABLE_DIFFUSE = "vct_disable_diffuse";
    VCT_DISABLE_SPECULAR = "vct_disable_specular";
    VCT_ANISOTROPIC = "vct_anisotropic";
    VCT_ENABLE_SPECULAR_SDF_QUALITY = "vct_enable_specular_sdf_quality";
    VCT_AMBIENT_HEMISPHERE = "vct_ambient_hemisphere";
    IRRADIANCE_FIELD = "irradiance_field";
    OBB_RESTRAINT_APPROX = "obb_restraint_approx";
    OBB_RESTRAINT_LTC = "obb_restraint_ltc";

    BRDF_DEFAULT = "BRDF_Default";
    BRDF_COOK_TORRANCE = "BRDF_CookTorrance";
    BRDF_BLINN_PHONG = "BRDF_BlinnPhong";
    FRESNEL_SEPARATE_DIFFUSE = "fresnel_separate_diffuse";
    GGX_HEIGHT_CORRELATED = "GGX_height_correlated";
    LEGACY_MATH_BRDF = "legacy_math_brdf";
    ROUGHNESS_IS_SHININESS = "roughness_is_shininess";

    USE_ENVPROBE_MAP = "use_envprobe_map";
    NEEDS_VIEW_DIR = "needs_view_dir";
    NEEDS_REFL_DIR = "needs_refl_dir";
    NEEDS_ENV_BRDF = "needs_env_brdf";

    DECALS_SAMPLER = "decalsSampler";

    /// Texture units reserved for the listener, right before planar reflections.
    EXTRA_PASS_TEXTURES = "extra_pass_textures";
}

pub const UV_DETAIL_WEIGHT: IdString = IdString::from_static("uv_detail_weight");

/// `uv_*` source keys, indexed by texture type (reflection excluded).
pub const UV_SOURCES: [IdString; 14] = [
    IdString::from_static("uv_diffuse"),
    IdString::from_static("uv_normal"),
    IdString::from_static("uv_specular"),
    IdString::from_static("uv_roughness"),
    UV_DETAIL_WEIGHT,
    IdString::from_static("uv_detail0"),
    IdString::from_static("uv_detail1"),
    IdString::from_static("uv_detail2"),
    IdString::from_static("uv_detail3"),
    IdString::from_static("uv_detail_nm0"),
    IdString::from_static("uv_detail_nm1"),
    IdString::from_static("uv_detail_nm2"),
    IdString::from_static("uv_detail_nm3"),
    IdString::from_static("uv_emissive"),
];

pub const DETAIL_MAPS: [IdString; 4] = [
    IdString::from_static("detail_map0"),
    IdString::from_static("detail_map1"),
    IdString::from_static("detail_map2"),
    IdString::from_static("detail_map3"),
];

pub const DETAIL_OFFSETS: [IdString; 4] = [
    IdString::from_static("detail_offsets0"),
    IdString::from_static("detail_offsets1"),
    IdString::from_static("detail_offsets2"),
    IdString::from_static("detail_offsets3"),
];

pub const DETAIL_NORMAL_WEIGHTS: [IdString; 4] = [
    IdString::from_static("normal_weight_detail0"),
    IdString::from_static("normal_weight_detail1"),
    IdString::from_static("normal_weight_detail2"),
    IdString::from_static("normal_weight_detail3"),
];

/// Pixel-shader piece keys of the detail blend modes.
pub const BLEND_MODES: [IdString; 4] = [
    IdString::from_static("blend_mode_idx0"),
    IdString::from_static("blend_mode_idx1"),
    IdString::from_static("blend_mode_idx2"),
    IdString::from_static("blend_mode_idx3"),
];

/// Properties an alpha-tested caster still needs to sample diffuse alpha.
pub fn required_by_alpha_test(key: IdString) -> bool {
    key == NUM_TEXTURES
        || key == DIFFUSE_MAP
        || key == DETAIL_WEIGHT_MAP
        || key == DETAIL_WEIGHTS
        || key == UV_DETAIL_WEIGHT
        || key == DETAIL_MAPS_DIFFUSE
        || key == crate::properties::base::UV_COUNT
        || DETAIL_MAPS.contains(&key)
        || DETAIL_OFFSETS.contains(&key)
        || UV_SOURCES[5..9].contains(&key)
        || BLEND_MODES.contains(&key)
        || (0..8).any(|set| key == crate::properties::base::uv_count(set))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_test_set() {
        assert!(required_by_alpha_test(DIFFUSE_MAP));
        assert!(required_by_alpha_test(IdString::new("uv_detail2")));
        assert!(required_by_alpha_test(IdString::new("hlms_uv_count7")));
        assert!(!required_by_alpha_test(NORMAL_MAP));
        assert!(!required_by_alpha_test(IdString::new("uv_detail_nm0")));
    }
}
