//! PBS permutation properties.
//!
//! `pre_create` turns a datablock and a vertex layout into renderable
//! properties, `pre_caster` strips them down for depth-only rendering and
//! `notify_properties_merged` assigns texture units once the pass properties
//! are known.

use redlilium_hlms_core::math::Vec4;
use redlilium_hlms_core::{
    ArrayBinding, DescBindingKind, IdString, PropertyStore, Result, RootLayout, StructuralError,
};

use super::material::{Brdf, BrdfFlags, PbsMaterial, PbsTexture, TransparencyMode, Workflow};
use super::properties::*;
use crate::backend::RenderSystem;
use crate::buffers::INSTANCE_BUFFER_SLOT;
use crate::config::HlmsConfig;
use crate::datablock::{Datablock, MaterialData};
use crate::properties::base;
use crate::renderable::Renderable;
use crate::worker::{ShaderStage, WorkerContext};

/// Const buffer slot of the material pool.
pub const MATERIAL_BUFFER_SLOT: u16 = 1;
/// Const buffer slot of the manual cubemap probe.
pub const MANUAL_PROBE_SLOT: u16 = 3;
/// First of the three light buffer slots.
pub const LIGHT_BUFFER_SLOT: u16 = 4;
/// Vertex buffer slot of the pose offsets.
pub const POSE_BUFFER_SLOT: u16 = 7;

/// Per-texture-type properties, in the order the templates declare them.
const TEXTURE_PROPERTIES: [(&str, PbsTexture); 7] = [
    ("diffuse_map", PbsTexture::Diffuse),
    ("normal_map_tex", PbsTexture::Normal),
    ("specular_map", PbsTexture::Specular),
    ("roughness_map", PbsTexture::Roughness),
    ("emissive_map", PbsTexture::Emissive),
    ("envprobe_map", PbsTexture::Reflection),
    ("detail_weight_map", PbsTexture::DetailWeight),
];

/// `name = idx + 1`, `name_idx = idx` and, with separate samplers,
/// `name_sampler`. The `+ 1` keeps descriptor 0 distinguishable from "unset".
pub(crate) fn set_texture_property(
    ctx: &mut WorkerContext,
    name: &str,
    datablock: &Datablock,
    texture_type: usize,
    separate_samplers: bool,
) {
    let Some(idx) = datablock.index_to_descriptor_texture(texture_type) else {
        return;
    };
    ctx.set(IdString::new(name), i32::from(idx) + 1);
    ctx.set(IdString::new(&format!("{name}_idx")), i32::from(idx));
    if separate_samplers {
        if let Some(sampler) = datablock.index_to_descriptor_sampler(texture_type) {
            ctx.set(IdString::new(&format!("{name}_sampler")), i32::from(sampler));
        }
    }
}

fn set_detail_map_properties(
    ctx: &mut WorkerContext,
    datablock: &Datablock,
    material: &PbsMaterial,
    separate_samplers: bool,
) {
    let mut first_normal_map = 4;
    let mut has_diffuse_maps = false;
    let mut has_normal_maps = false;
    let mut any_detail_weight = false;

    for i in 0..4 {
        let detail = PbsTexture::detail(i);
        let detail_nm = PbsTexture::detail_normal(i);
        set_texture_property(ctx, &format!("detail_map{i}"), datablock, detail, separate_samplers);
        let name = format!("detail_map_nm{i}");
        set_texture_property(ctx, &name, datablock, detail_nm, separate_samplers);

        if datablock.texture(detail).is_some() {
            ctx.set_piece(ShaderStage::Pixel, BLEND_MODES[i], material.blend_modes[i].piece());
            has_diffuse_maps = true;
        }
        if datablock.texture(detail_nm).is_some() {
            first_normal_map = first_normal_map.min(i as i32);
            has_normal_maps = true;
        }
        if material.detail_offset_scale[i] != Vec4::new(0.0, 0.0, 1.0, 1.0) {
            ctx.set(DETAIL_OFFSETS[i], 1);
        }
        if material.detail_weights[i] != 1.0
            && (datablock.texture(detail).is_some() || datablock.texture(detail_nm).is_some())
        {
            any_detail_weight = true;
        }
    }

    if has_diffuse_maps {
        ctx.set(DETAIL_MAPS_DIFFUSE, 4);
    }
    if has_normal_maps {
        ctx.set(DETAIL_MAPS_NORMAL, 4);
    }
    ctx.set(FIRST_VALID_DETAIL_MAP_NM, first_normal_map);
    if any_detail_weight {
        ctx.set(DETAIL_WEIGHTS, 1);
    }
}

pub(crate) fn set_brdf_properties(ctx: &mut WorkerContext, brdf: Brdf) {
    let flags = brdf.flags();
    match brdf.base() {
        base if base == Brdf::DEFAULT.base() => {
            ctx.set(BRDF_DEFAULT, 1);
            if !flags.contains(BrdfFlags::UNCORRELATED) {
                ctx.set(GGX_HEIGHT_CORRELATED, 1);
            }
        }
        base if base == Brdf::COOK_TORRANCE.base() => ctx.set(BRDF_COOK_TORRANCE, 1),
        base if base == Brdf::BLINN_PHONG.base() => ctx.set(BRDF_BLINN_PHONG, 1),
        _ => {}
    }
    if flags.contains(BrdfFlags::SEPARATE_DIFFUSE_FRESNEL) {
        ctx.set(FRESNEL_SEPARATE_DIFFUSE, 1);
    }
    if flags.contains(BrdfFlags::LEGACY_MATH) {
        ctx.set(LEGACY_MATH_BRDF, 1);
    }
    if flags.contains(BrdfFlags::FULL_LEGACY) {
        ctx.set(ROUGHNESS_IS_SHININESS, 1);
    }
}

/// Check that every normal map of the datablock can be sampled the same way
/// and that the mesh has the attributes normal mapping needs.
fn set_normal_map_properties(ctx: &mut WorkerContext, datablock: &Datablock) -> Result<()> {
    let normal_maps: Vec<_> = std::iter::once(PbsTexture::Normal as usize)
        .chain((0..4).map(PbsTexture::detail_normal))
        .filter_map(|ty| datablock.texture(ty))
        .collect();

    ctx.properties.set_bool(NORMAL_MAP, !normal_maps.is_empty());
    let Some(first) = normal_maps.first() else {
        return Ok(());
    };

    let can_normal_map =
        (ctx.get(base::NORMAL) != 0 && ctx.get(base::TANGENT) != 0) || ctx.get(base::QTANGENT) != 0;
    if !can_normal_map {
        return Err(StructuralError::invalid_state(
            "Renderable can't use normal maps but datablock wants normal maps. Generate Tangents \
             for this mesh to fix the problem or use a datablock without normal maps.",
        ));
    }

    let signed = first.format.is_signed();
    let format = if signed { NORMAL_RG_SNORM } else { NORMAL_RG_UNORM };
    ctx.set(NORMAL_SAMPLING_FORMAT, format.as_property_value());
    ctx.set(format, format.as_property_value());

    if normal_maps.iter().any(|texture| texture.format.is_signed() != signed) {
        return Err(StructuralError::invalid_state(
            "Renderable can't use normal maps and detailed normal maps which have different \
             signed conventions in the same datablock. e.g. SNORM vs UNORM",
        ));
    }
    Ok(())
}

fn materials_per_buffer(config: &HlmsConfig) -> i32 {
    if config.fast_shader_build_hack {
        2
    } else {
        config.slots_per_pool as i32
    }
}

/// Renderable properties of a PBS datablock.
pub(crate) fn pre_create(
    ctx: &mut WorkerContext,
    renderable: &Renderable,
    datablock: &Datablock,
    material: &PbsMaterial,
    config: &HlmsConfig,
    render_system: &dyn RenderSystem,
) -> Result<()> {
    let metallic = material.workflow == Workflow::Metallic;
    ctx.properties.set_bool(FRESNEL_SCALAR, material.separate_fresnel || metallic);
    ctx.properties.set_bool(FRESNEL_WORKFLOW, material.workflow == Workflow::SpecularAsFresnel);
    ctx.properties.set_bool(METALLIC_WORKFLOW, metallic);

    if material.two_sided_lighting {
        ctx.set(TWO_SIDED_LIGHTING, 1);
    }
    if material.receive_shadows {
        ctx.set(RECEIVE_SHADOWS, 1);
    }
    if material.transparency_mode == TransparencyMode::Refractive {
        ctx.set(base::SCREEN_SPACE_REFRACTIONS, 1);
        ctx.set(base::VPOS, 1);
        ctx.set(base::SCREEN_POS_INT, 1);
        ctx.set(base::SCREEN_POS_UV, 1);
    }
    set_brdf_properties(ctx, material.brdf);

    for (ty, &uv_source) in material.uv_source.iter().enumerate() {
        ctx.set(UV_SOURCES[ty], i32::from(uv_source));
        if datablock.texture(ty).is_some() && ctx.get(base::uv_count(usize::from(uv_source))) < 2 {
            return Err(StructuralError::invalid_state(format!(
                "Renderable needs at least 2 coordinates in UV set #{uv_source}. Either change \
                 the mesh, or change the UV source settings"
            )));
        }
    }

    let mut num_normal_weights = 0;
    let has_normal_map = datablock.texture(PbsTexture::Normal as usize).is_some();
    if material.normal_map_weight != 1.0 && has_normal_map {
        ctx.set(NORMAL_WEIGHT_TEX, 1);
        num_normal_weights += 1;
    }
    for i in 0..4 {
        let has_detail_nm = datablock.texture(PbsTexture::detail_normal(i)).is_some();
        if has_detail_nm && material.detail_normal_weights[i] != 1.0 {
            ctx.set(DETAIL_NORMAL_WEIGHTS[i], 1);
            num_normal_weights += 1;
        }
    }
    ctx.set(NORMAL_WEIGHT, num_normal_weights);

    let separate_samplers = render_system.has_separate_samplers();
    if datablock.textures_desc_set().is_some() {
        set_detail_map_properties(ctx, datablock, material, separate_samplers);
    } else {
        ctx.set(FIRST_VALID_DETAIL_MAP_NM, 4);
    }

    if let Some(samplers) = datablock.samplers_desc_set() {
        ctx.set(NUM_SAMPLERS, samplers.len() as i32);
    }

    if let Some(textures) = datablock.textures_desc_set() {
        let reflection = datablock.texture(PbsTexture::Reflection as usize);
        ctx.set(NUM_TEXTURES, (textures.len() - usize::from(reflection.is_some())) as i32);

        for (name, ty) in TEXTURE_PROPERTIES {
            set_texture_property(ctx, name, datablock, ty as usize, separate_samplers);
        }

        // The probe is identified by name so a pass rendering into it can
        // detect the hazard.
        if let Some(reflection) = reflection {
            if material.manual_probe.is_some() {
                ctx.set(USE_PARALLAX_CORRECT_CUBEMAPS, 1);
            }
            ctx.set(ENVPROBE_MAP, reflection.name.as_property_value());
        }
    }

    let emissive_map = datablock.texture(PbsTexture::Emissive as usize).is_some();
    if material.has_emissive_constant() {
        ctx.set(EMISSIVE_CONSTANT, 1);
    }
    if emissive_map && material.use_emissive_as_lightmap {
        ctx.set(EMISSIVE_AS_LIGHTMAP, 1);
    }

    set_normal_map_properties(ctx, datablock)?;

    let auto_transparent = datablock.blendblock[0].auto_transparent;
    if material.use_alpha_from_textures
        && (auto_transparent || material.transparency_mode == TransparencyMode::Refractive)
        && (ctx.get(DIFFUSE_MAP) != 0 || ctx.get(DETAIL_MAPS_DIFFUSE) != 0)
    {
        ctx.set(USE_TEXTURE_ALPHA, 1);
        if material.transparency_mode == TransparencyMode::Transparent {
            ctx.set(TRANSPARENT_MODE, 1);
        }
    }

    if renderable.custom_parameter & 0x80 != 0 {
        ctx.set(USE_PLANAR_REFLECTIONS, 1);
    }

    ctx.set(MATERIALS_PER_BUFFER, materials_per_buffer(config));
    Ok(())
}

/// Keep only what depth-only (or alpha-tested) rendering needs.
///
/// Running it twice gives the same result, and the kept properties are a
/// subset of the regular ones apart from the texture count, which shrinks
/// to what alpha testing samples.
pub(crate) fn pre_caster(ctx: &mut WorkerContext, datablock: &Datablock, config: &HlmsConfig) {
    let alpha_test = datablock.has_alpha_test();

    ctx.properties.retain(|key, _| {
        key == FIRST_VALID_DETAIL_MAP_NM
            || key == HW_GAMMA_READ
            || key == UV_SOURCES[0]
            || key == crate::properties::pso::INPUT_LAYOUT_ID
            || key == base::SKELETON
            || key == base::POSE
            || key == base::POSE_HALF_PRECISION
            || key == base::POSE_NORMALS
            || key == base::BONES_PER_VERTEX
            || key == base::DUAL_PARABOLOID_MAPPING
            || key == base::ALPHA_TEST
            || key == base::ALPHA_BLEND
            || (alpha_test && required_by_alpha_test(key))
    });
    if ctx.properties.contains(FIRST_VALID_DETAIL_MAP_NM) {
        ctx.set(FIRST_VALID_DETAIL_MAP_NM, 0);
    }

    if alpha_test {
        if let Some(samplers) = datablock.samplers_desc_set() {
            ctx.set(NUM_SAMPLERS, samplers.len() as i32);
        }

        // Declare no more textures than alpha testing samples.
        let num_textures = std::iter::once(PbsTexture::Diffuse as usize)
            .chain((0..4).map(PbsTexture::detail))
            .filter_map(|ty| datablock.index_to_descriptor_texture(ty))
            .map(|idx| i32::from(idx) + 1)
            .max()
            .unwrap_or(0);
        ctx.set(NUM_TEXTURES, num_textures);

        if let MaterialData::Pbs(material) = &datablock.material {
            for i in 0..4 {
                if datablock.texture(PbsTexture::detail(i)).is_some() {
                    let piece = material.blend_modes[i].piece();
                    ctx.set_piece(ShaderStage::Pixel, BLEND_MODES[i], piece);
                }
            }
        }
    }

    ctx.set(MATERIALS_PER_BUFFER, materials_per_buffer(config));
}

/// Texture units of pass-level textures, derived from pass properties alone
/// so the pass packer and the merge step agree on them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PassTextureUnits {
    /// Named registers, in unit order.
    pub registers: Vec<(String, i32)>,
    pub decals_sampler: Option<i32>,
    /// Unit of the parallax-corrected cubemap.
    pub cubemap: Option<i32>,
    /// First unit handed to the listener.
    pub listener_start: i32,
    pub planar_reflections: Option<i32>,
    /// First unit of per-material textures.
    pub end: i32,
}

pub(crate) fn pass_texture_units(props: &PropertyStore, reserved: u16) -> PassTextureUnits {
    let mut units = PassTextureUnits::default();
    let mut unit = i32::from(reserved);
    let mut reg = |units: &mut PassTextureUnits, unit: &mut i32, name: &str| {
        units.registers.push((name.to_owned(), *unit));
        *unit += 1;
    };

    if props.is_set(base::FORWARD_PLUS) {
        reg(&mut units, &mut unit, "f3dGrid");
        reg(&mut units, &mut unit, "f3dLightList");
    }

    let mut depth_texture_defined = false;
    if props.is_set(base::USE_PREPASS) {
        reg(&mut units, &mut unit, "gBuf_normals");
        reg(&mut units, &mut unit, "gBuf_shadowRoughness");
        if props.is_set(base::USE_PREPASS_MSAA) {
            reg(&mut units, &mut unit, "gBuf_depthTexture");
            depth_texture_defined = true;
        } else {
            unit += 1;
        }
        if props.is_set(base::USE_SSR) {
            reg(&mut units, &mut unit, "ssrTexture");
        }
    }

    if props.is_set(base::SS_REFRACTIONS_AVAILABLE) {
        if !depth_texture_defined && !props.is_set(base::USE_PREPASS_MSAA) {
            reg(&mut units, &mut unit, "gBuf_depthTexture");
        } else {
            reg(&mut units, &mut unit, "depthTextureNoMsaa");
        }
        reg(&mut units, &mut unit, "refractionMap");
    }

    if props.is_set(IRRADIANCE_VOLUMES) && !props.is_set(base::SHADOW_CASTER) {
        reg(&mut units, &mut unit, "irradianceVolume");
    }

    if props.get(VCT_NUM_PROBES) > 0 {
        reg(&mut units, &mut unit, "vctProbe");
        if props.is_set(VCT_ANISOTROPIC) {
            reg(&mut units, &mut unit, "vctProbeX");
            reg(&mut units, &mut unit, "vctProbeY");
            reg(&mut units, &mut unit, "vctProbeZ");
        }
    }

    if props.is_set(IRRADIANCE_FIELD) {
        reg(&mut units, &mut unit, "ifdColour");
        reg(&mut units, &mut unit, "ifdDepth");
    }

    if props.get(base::LIGHTS_AREA_TEX_MASK) > 0 {
        reg(&mut units, &mut unit, "areaLightMasks");
    }

    // Always occupies its unit; the merge step decides whether it is named.
    if props.is_set(LTC_TEXTURE_AVAILABLE) {
        reg(&mut units, &mut unit, "ltcMatrix");
    }

    if props.is_set(base::ENABLE_DECALS) {
        units.decals_sampler = Some(unit);
        let diffuse = props.get(base::DECALS_DIFFUSE);
        let emissive = props.get(base::DECALS_EMISSIVE);
        if diffuse != 0 {
            reg(&mut units, &mut unit, "decalsDiffuseTex");
        }
        if props.is_set(base::DECALS_NORMALS) {
            reg(&mut units, &mut unit, "decalsNormalsTex");
        }
        if emissive != 0 && emissive != diffuse {
            reg(&mut units, &mut unit, "decalsEmissiveTex");
        }
    }

    let num_shadow_maps = props.get(base::NUM_SHADOW_MAP_TEXTURES);
    if props.get(base::NUM_SHADOW_MAP_LIGHTS) != 0 {
        for i in 0..num_shadow_maps {
            reg(&mut units, &mut unit, &format!("texShadowMap{i}"));
        }
    } else {
        unit += num_shadow_maps;
    }

    if props.is_set(PARALLAX_CORRECT_CUBEMAPS) {
        units.cubemap = Some(unit);
        unit += 1;
    }

    units.listener_start = unit;
    unit += props.get(EXTRA_PASS_TEXTURES);

    if props.is_set(HAS_PLANAR_REFLECTIONS) {
        units.planar_reflections = Some(unit);
        unit += 1;
    }

    units.end = unit;
    units
}

/// Derive the properties that depend on both pass and renderable, then
/// assign every texture unit.
pub(crate) fn notify_properties_merged(ctx: &mut WorkerContext, reserved: u16) {
    let has_vct = ctx.get(VCT_NUM_PROBES) > 0;
    if ctx.get(base::DECALS_NORMALS) != 0 || has_vct {
        let can_normal_map = (ctx.get(base::NORMAL) != 0 && ctx.get(base::TANGENT) != 0)
            || ctx.get(base::QTANGENT) != 0;
        ctx.properties.set_bool(NORMAL_MAP, can_normal_map);
    }

    if ctx.get(HAS_PLANAR_REFLECTIONS) == 0 {
        ctx.set(USE_PLANAR_REFLECTIONS, 0);
    }
    if ctx.get(base::POSE) > 0 {
        ctx.set(base::VERTEX_ID, 1);
    }

    let env_probe_map = ctx.get(ENVPROBE_MAP);
    let target_env_probe_map = ctx.get(TARGET_ENVPROBE_MAP);
    let can_use_manual_probe = env_probe_map != 0 && env_probe_map != target_env_probe_map;
    let parallax_correct = ctx.get(PARALLAX_CORRECT_CUBEMAPS) != 0;
    if can_use_manual_probe || parallax_correct {
        ctx.set(USE_ENVPROBE_MAP, 1);
        if !can_use_manual_probe {
            // Rendering into our own probe: fall back to the automatic ones.
            ctx.set(USE_PARALLAX_CORRECT_CUBEMAPS, 1);
        }
    }
    if ctx.get(USE_PARALLAX_CORRECT_CUBEMAPS) != 0 && !parallax_correct {
        log::warn!("object with a manual cubemap probe rendered in a pass without cubemap probes");
    }

    let has_irradiance_field = ctx.get(IRRADIANCE_FIELD) != 0;
    let needs_env_brdf = [
        base::USE_SSR,
        USE_ENVPROBE_MAP,
        USE_PLANAR_REFLECTIONS,
        AMBIENT_HEMISPHERE,
        AMBIENT_SH,
        ENABLE_CUBEMAPS_AUTO,
    ]
    .into_iter()
    .any(|key| ctx.get(key) != 0)
        || has_irradiance_field
        || has_vct;
    if needs_env_brdf {
        ctx.set(NEEDS_REFL_DIR, 1);
        ctx.set(NEEDS_ENV_BRDF, 1);
    }

    if [
        base::LIGHTS_SPOT,
        base::FORWARD_PLUS,
        base::LIGHTS_AREA_APPROX,
        base::LIGHTS_AREA_LTC,
    ]
    .into_iter()
    .any(|key| ctx.get(key) != 0)
        || needs_env_brdf
        || has_irradiance_field
        || has_vct
    {
        ctx.set(NEEDS_VIEW_DIR, 1);
    }

    if ctx.get(base::SCREEN_SPACE_REFRACTIONS) != 0
        && ctx.get(base::SS_REFRACTIONS_AVAILABLE) == 0
    {
        log::warn!("a refractive material is rendered in a pass where refractions are unavailable");
    }

    let units = pass_texture_units(&ctx.properties, reserved);
    let ltc_needed = needs_env_brdf || ctx.get(base::LIGHTS_AREA_LTC) > 0;
    for (name, unit) in &units.registers {
        if name == "ltcMatrix" && !ltc_needed {
            continue;
        }
        ctx.set_texture_reg(ShaderStage::Pixel, name.as_str(), *unit);
    }
    if let Some(unit) = units.decals_sampler {
        ctx.set(DECALS_SAMPLER, unit);
    }
    if let Some(unit) = units.planar_reflections {
        if ctx.get(USE_PLANAR_REFLECTIONS) != 0 {
            ctx.set_texture_reg(ShaderStage::Pixel, "planarReflectionTex", unit);
        }
    }

    let sampler_state_start = units.end;
    let mut unit = sampler_state_start;
    for i in 0..ctx.get(NUM_TEXTURES) {
        ctx.set_texture_reg(ShaderStage::Pixel, format!("textureMaps{i}"), unit);
        unit += 1;
    }

    if can_use_manual_probe {
        ctx.set_texture_reg(ShaderStage::Pixel, "texEnvProbeMap", unit);
        unit += 1;
    } else if let (true, Some(cubemap)) = (parallax_correct, units.cubemap) {
        ctx.set_texture_reg(ShaderStage::Pixel, "texEnvProbeMap", cubemap);
    }

    ctx.set(base::SAMPLER_STATE_START, sampler_state_start);
    ctx.set(base::SET0_TEXTURE_SLOT_END, sampler_state_start);
    ctx.set(base::SET1_TEXTURE_SLOT_END, unit);
}

/// Set 0 holds every pass-level binding, set 1 the per-material textures.
///
/// Const buffers: pass (0), material (1), instance (2), manual probe (3),
/// light buffers (4..6), pose offsets (7).
pub(crate) fn setup_root_layout(
    layout: &mut RootLayout,
    props: &PropertyStore,
    reserved: u16,
) -> Result<()> {
    let mut const_end = INSTANCE_BUFFER_SLOT + 1;
    if props.is_set(USE_PARALLAX_CORRECT_CUBEMAPS) && props.is_set(ENVPROBE_MAP) {
        const_end = MANUAL_PROBE_SLOT + 1;
    }
    if props.is_set(USE_LIGHT_BUFFERS) {
        const_end = LIGHT_BUFFER_SLOT + 3;
    }
    if props.get(base::POSE) > 0 {
        const_end = POSE_BUFFER_SLOT + 1;
    }
    layout.set_range(0, DescBindingKind::ConstBuffer, 0, const_end);
    setup_texture_ranges(layout, props, reserved)?;
    Ok(())
}

/// Tex buffers, textures and samplers shared by PBS and Terra.
pub(crate) fn setup_texture_ranges(
    layout: &mut RootLayout,
    props: &PropertyStore,
    reserved: u16,
) -> Result<()> {
    let mut tex_buffer_end = reserved;
    if props.is_set(base::FORWARD_PLUS) {
        tex_buffer_end += 2;
    }
    layout.set_range(0, DescBindingKind::TexBuffer, 0, tex_buffer_end);

    let set0_end = (props.get(base::SET0_TEXTURE_SLOT_END) as u16).max(tex_buffer_end);
    layout.set_range(0, DescBindingKind::Texture, tex_buffer_end, set0_end);
    layout.set_range(0, DescBindingKind::Sampler, tex_buffer_end, set0_end);

    let set1_start = props.get(base::SAMPLER_STATE_START) as u16;
    let set1_end = (props.get(base::SET1_TEXTURE_SLOT_END) as u16).max(set1_start);
    layout.set_range(1, DescBindingKind::Texture, set1_start, set1_end);
    layout.set_range(1, DescBindingKind::Sampler, set1_start, set1_end);

    let num_shadow_maps = props.get(base::NUM_SHADOW_MAP_TEXTURES);
    if num_shadow_maps > 0 && props.contains(IdString::new("texShadowMap0")) {
        let first = props.get(IdString::new("texShadowMap0")) as u16;
        let shadow_maps = ArrayBinding::new(first, num_shadow_maps as u16);
        layout.add_array_binding(DescBindingKind::Texture, shadow_maps)?;
    }
    Ok(())
}
