//! Property keys shared by every material kind.
//!
//! Keys are hashed at compile time; the names match the identifiers used by
//! the shader templates.

use redlilium_hlms_core::IdString;

/// Declares a list of `pub const NAME: IdString` keys.
macro_rules! id_strings {
    ($($(#[$meta:meta])* $name:ident = $value:literal;)*) => {
        $(
            $(#[$meta])*
            pub const $name: IdString = IdString::from_static($value);
        )*
    };
}

pub(crate) use id_strings;

/// Keys every material kind understands.
pub mod base {
    use super::*;

    id_strings! {
        SKELETON = "hlms_skeleton";
        BONES_PER_VERTEX = "hlms_bones_per_vertex";
        POSE = "hlms_pose";
        POSE_HALF_PRECISION = "hlms_pose_half";
        POSE_NORMALS = "hlms_pose_normals";

        NORMAL = "hlms_normal";
        QTANGENT = "hlms_qtangent";
        TANGENT = "hlms_tangent";
        TANGENT4 = "hlms_tangent4";
        COLOUR = "hlms_colour";

        IDENTITY_WORLD = "hlms_identity_world";
        IDENTITY_VIEWPROJ = "hlms_identity_viewproj";

        UV_COUNT = "hlms_uv_count";

        LIGHTS_DIRECTIONAL = "hlms_lights_directional";
        LIGHTS_DIR_NON_CASTER = "hlms_lights_directional_non_caster";
        LIGHTS_POINT = "hlms_lights_point";
        LIGHTS_SPOT = "hlms_lights_spot";
        LIGHTS_AREA_APPROX = "hlms_lights_area_approx";
        LIGHTS_AREA_LTC = "hlms_lights_area_ltc";
        LIGHTS_AREA_TEX_MASK = "hlms_lights_area_tex_mask";
        LIGHTS_AREA_TEX_COLOUR = "hlms_lights_area_tex_colour";
        ALL_POINT_LIGHTS = "hlms_all_point_lights";

        PSO_CLIP_DISTANCES = "hlms_pso_clip_distances";
        GLOBAL_CLIP_PLANES = "hlms_global_clip_planes";
        EMULATE_CLIP_DISTANCES = "hlms_emulate_clip_distances";
        DUAL_PARABOLOID_MAPPING = "hlms_dual_paraboloid_mapping";
        INSTANCED_STEREO = "hlms_instanced_stereo";
        STATIC_BRANCH_LIGHTS = "hlms_static_branch_lights";
        STATIC_BRANCH_SHADOW_MAP_LIGHTS = "hlms_static_branch_shadow_map_lights";

        NUM_SHADOW_MAP_LIGHTS = "hlms_num_shadow_map_lights";
        NUM_SHADOW_MAP_TEXTURES = "hlms_num_shadow_map_textures";
        PSSM_SPLITS = "hlms_pssm_splits";
        PSSM_BLEND = "hlms_pssm_blend";
        PSSM_FADE = "hlms_pssm_fade";
        SHADOW_CASTER = "hlms_shadowcaster";
        SHADOW_CASTER_DIRECTIONAL = "hlms_shadowcaster_directional";
        SHADOW_CASTER_POINT = "hlms_shadowcaster_point";
        SHADOW_USES_DEPTH_TEXTURE = "hlms_shadow_uses_depth_texture";
        RENDER_DEPTH_ONLY = "hlms_render_depth_only";
        FINE_LIGHT_MASK = "hlms_fine_light_mask";

        USE_UV_BAKING = "hlms_use_uv_baking";
        UV_BAKING = "hlms_uv_baking";
        BAKE_LIGHTING_ONLY = "hlms_bake_lighting_only";
        MSAA_SAMPLES = "hlms_msaa_samples";
        GEN_NORMALS_GBUF = "hlms_gen_normals_gbuffer";
        PREPASS = "hlms_prepass";
        USE_PREPASS = "hlms_use_prepass";
        USE_PREPASS_MSAA = "hlms_use_prepass_msaa";
        USE_SSR = "hlms_use_ssr";
        SS_REFRACTIONS_AVAILABLE = "hlms_ss_refractions_available";

        FORWARD_PLUS = "hlms_forwardplus";
        FORWARD_PLUS_FLIP_Y = "hlms_forwardplus_flipY";
        FORWARD_PLUS_DEBUG = "hlms_forwardplus_debug";
        FORWARD3D = "forward3d";
        FORWARD_CLUSTERED = "forward_clustered";
        FORWARD3D_NUM_SLICES = "forward3d_num_slices";
        FWD_CLUSTERED_WIDTH_X_HEIGHT = "fwd_clustered_width_x_height";
        FWD_CLUSTERED_WIDTH = "fwd_clustered_width";
        FWD_CLUSTERED_LIGHTS_PER_CELL = "fwd_clustered_lights_per_cell";
        ENABLE_DECALS = "hlms_enable_decals";
        DECALS_DIFFUSE = "hlms_decals_diffuse";
        DECALS_NORMALS = "hlms_decals_normals";
        DECALS_EMISSIVE = "hlms_decals_emissive";

        VPOS = "hlms_vpos";
        SCREEN_POS_INT = "hlms_screen_pos_int";
        SCREEN_POS_UV = "hlms_screen_pos_uv";
        SCREEN_SPACE_REFRACTIONS = "hlms_screen_space_refractions";
        VERTEX_ID = "hlms_vertex_id";

        ALPHA_TEST = "alpha_test";
        ALPHA_TEST_SHADOW_CASTER_ONLY = "alpha_test_shadow_caster_only";
        ALPHA_BLEND = "hlms_alphablend";
        ALPHA_TO_COVERAGE = "hlms_alpha_to_coverage";

        NO_REVERSE_DEPTH = "hlms_no_reverse_depth";
        FAST_SHADER_BUILD_HACK = "fast_shader_build_hack";
        TEX_GATHER = "hlms_tex_gather";

        SAMPLER_STATE_START = "samplerStateStart";
        SET0_TEXTURE_SLOT_END = "Set0TextureSlotEnd";
        SET1_TEXTURE_SLOT_END = "Set1TextureSlotEnd";
    }

    const UV_COUNT_NAMES: [IdString; 8] = [
        IdString::from_static("hlms_uv_count0"),
        IdString::from_static("hlms_uv_count1"),
        IdString::from_static("hlms_uv_count2"),
        IdString::from_static("hlms_uv_count3"),
        IdString::from_static("hlms_uv_count4"),
        IdString::from_static("hlms_uv_count5"),
        IdString::from_static("hlms_uv_count6"),
        IdString::from_static("hlms_uv_count7"),
    ];

    /// `hlms_uv_countN`: components of UV set `N`.
    pub fn uv_count(set: usize) -> IdString {
        UV_COUNT_NAMES
            .get(set)
            .copied()
            .unwrap_or_else(|| IdString::indexed("hlms_uv_count", set))
    }

    /// `hlms_shadowmapN...` per shadow map texture.
    pub fn shadow_map(idx: usize, suffix: &str) -> IdString {
        IdString::indexed_with_suffix("hlms_shadowmap", idx, suffix)
    }
}

/// Pipeline-state keys. Stripped from the merged set once the entry is cached.
pub mod pso {
    use super::*;

    id_strings! {
        MACROBLOCK = "PsoMacroblock";
        BLENDBLOCK = "PsoBlendblock";
        INPUT_LAYOUT_ID = "InputLayoutId";
    }
}

/// Piece keys shared by every kind.
pub mod pieces {
    use super::*;

    id_strings! {
        ALPHA_TEST_CMP_FUNC = "alpha_test_cmp_func";
    }
}
