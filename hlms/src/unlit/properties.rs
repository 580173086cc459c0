//! Property and piece keys of the Unlit kind.

use redlilium_hlms_core::IdString;

use crate::properties::id_strings;

id_strings! {
    HW_GAMMA_READ = "hw_gamma_read";
    MATERIALS_PER_BUFFER = "materials_per_buffer";
    LOWER_GPU_OVERHEAD = "lower_gpu_overhead";
    EXPONENTIAL_SHADOW_MAPS = "exponential_shadow_maps";

    NUM_TEXTURES = "num_textures";
    NUM_SAMPLERS = "num_samplers";
    DIFFUSE = "diffuse";
    DIFFUSE_MAP = "diffuse_map";
    TEXTURE_MATRIX = "texture_matrix";
    HAS_PLANAR_REFLECTIONS = "has_planar_reflections";

    OUT_UV_COUNT = "out_uv_count";
    OUT_UV_HALF_COUNT = "out_uv_half_count";
}

/// `diffuse_mapN`: set when texture type `N` has a texture.
pub fn diffuse_map(idx: usize) -> IdString {
    IdString::indexed("diffuse_map", idx)
}

/// `uv_diffuseN`: interpolant holding the UVs of texture type `N`.
pub fn uv_diffuse(idx: usize) -> IdString {
    IdString::indexed("uv_diffuse", idx)
}

/// Pixel piece `uv_diffuse_swizzleN`: `xy` or `zw` of that interpolant.
pub fn uv_diffuse_swizzle(idx: usize) -> IdString {
    IdString::indexed("uv_diffuse_swizzle", idx)
}

/// Pixel piece `blend_mode_idxN`.
pub fn blend_mode_idx(idx: usize) -> IdString {
    IdString::indexed("blend_mode_idx", idx)
}

/// Pixel piece `diffuse_mapN_tex_swizzle`.
pub fn tex_swizzle(idx: usize) -> IdString {
    IdString::indexed_with_suffix("diffuse_map", idx, "_tex_swizzle")
}

/// `out_uvN...` keys of UV output `N`.
pub fn out_uv(idx: usize, suffix: &str) -> IdString {
    IdString::indexed_with_suffix("out_uv", idx, suffix)
}
