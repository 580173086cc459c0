//! Terra permutation properties.
//!
//! Terra is PBS with a fixed metallic workflow, four detail layers and
//! terrain maps in the first texture units. Cells never cast shadows, so the
//! caster permutation carries no renderable properties at all.

use redlilium_hlms_core::{
    ArrayBinding, DescBindingKind, IdString, PropertyStore, Result, RootLayout, StructuralError,
};

use super::material::{identity_offset_scale, TerraMaterial, TerraTexture};
use super::properties::{
    DETAIL_MAP_NM_PREFIX, DETAIL_MAP_PREFIX, METALNESS_MAP_PREFIX, ROUGHNESS_MAP_PREFIX, USE_SKIRTS,
};
use crate::backend::RenderSystem;
use crate::buffers::INSTANCE_BUFFER_SLOT;
use crate::config::HlmsConfig;
use crate::datablock::Datablock;
use crate::pbs::hash::{set_brdf_properties, set_texture_property, LIGHT_BUFFER_SLOT};
use crate::pbs::properties::*;
use crate::properties::base;
use crate::renderable::Renderable;
use crate::worker::{ShaderStage, WorkerContext};

/// Sampler slot of the terrain normal and shadow maps.
pub const TERRAIN_SAMPLER_SLOT: u16 = 1;

/// Terrain maps and the stage that samples each, in texture unit order.
pub const TERRAIN_TEXTURES: [(ShaderStage, &str); 3] = [
    (ShaderStage::Vertex, "heightMap"),
    (ShaderStage::Pixel, "terrainNormals"),
    (ShaderStage::Pixel, "terrainShadows"),
];

fn set_detail_map_properties(
    ctx: &mut WorkerContext,
    datablock: &Datablock,
    material: &TerraMaterial,
    separate_samplers: bool,
) {
    let mut first_normal_map = 4;
    let mut has_diffuse_maps = false;
    let mut has_normal_maps = false;

    for i in 0..4 {
        let layers = [
            (DETAIL_MAP_PREFIX, TerraTexture::detail(i)),
            (DETAIL_MAP_NM_PREFIX, TerraTexture::detail_normal(i)),
            (ROUGHNESS_MAP_PREFIX, TerraTexture::detail_roughness(i)),
            (METALNESS_MAP_PREFIX, TerraTexture::detail_metalness(i)),
        ];
        for (prefix, ty) in layers {
            set_texture_property(ctx, &format!("{prefix}{i}"), datablock, ty, separate_samplers);
        }

        if datablock.texture(TerraTexture::detail(i)).is_some() {
            has_diffuse_maps = true;
        }
        if datablock.texture(TerraTexture::detail_normal(i)).is_some() {
            first_normal_map = first_normal_map.min(i as i32);
            has_normal_maps = true;
        }
        if material.detail_offset_scale[i] != identity_offset_scale() {
            ctx.set(DETAIL_OFFSETS[i], 1);
        }
    }

    if has_diffuse_maps {
        ctx.set(DETAIL_MAPS_DIFFUSE, 4);
    }
    if has_normal_maps {
        ctx.set(DETAIL_MAPS_NORMAL, 4);
    }
    ctx.set(FIRST_VALID_DETAIL_MAP_NM, first_normal_map);
}

/// Renderable properties of a terrain cell.
pub(crate) fn pre_create(
    ctx: &mut WorkerContext,
    renderable: &Renderable,
    datablock: &Datablock,
    material: &TerraMaterial,
    _config: &HlmsConfig,
    render_system: &dyn RenderSystem,
) -> Result<()> {
    let cell = renderable.terrain.as_ref().ok_or_else(|| {
        StructuralError::invalid_params("the terra hlms can only render terrain cells")
    })?;
    if datablock.has_alpha_test() {
        return Err(StructuralError::not_implemented(format!(
            "alpha testing is not supported by terra (datablock {})",
            datablock.name
        )));
    }

    ctx.properties.set_bool(USE_SKIRTS, cell.use_skirts);
    ctx.set(FRESNEL_SCALAR, 1);
    ctx.set(FRESNEL_WORKFLOW, 0);
    ctx.set(METALLIC_WORKFLOW, 1);
    ctx.set(RECEIVE_SHADOWS, 1);
    set_brdf_properties(ctx, material.brdf);

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
        let reflection = datablock.texture(TerraTexture::Reflection as usize);
        ctx.set(NUM_TEXTURES, (textures.len() - usize::from(reflection.is_some())) as i32);

        for (name, texture) in [
            ("diffuse_map", TerraTexture::Diffuse),
            ("envprobe_map", TerraTexture::Reflection),
            ("detail_weight_map", TerraTexture::DetailWeight),
        ] {
            set_texture_property(ctx, name, datablock, texture as usize, separate_samplers);
        }

        // The probe is identified by name so a pass rendering into it can
        // detect the hazard.
        if let Some(reflection) = reflection {
            ctx.set(ENVPROBE_MAP, reflection.name.as_property_value());
        }
    }

    let normal_maps = (0..4).any(|i| datablock.texture(TerraTexture::detail_normal(i)).is_some());
    ctx.properties.set_bool(NORMAL_MAP, normal_maps);
    if normal_maps {
        // Terrain normal maps are always signed two-channel textures.
        ctx.set(NORMAL_SAMPLING_FORMAT, NORMAL_RG_SNORM.as_property_value());
        ctx.set(NORMAL_RG_SNORM, NORMAL_RG_SNORM.as_property_value());
    }

    if renderable.custom_parameter & 0x80 != 0 {
        ctx.set(USE_PLANAR_REFLECTIONS, 1);
    }
    Ok(())
}

/// Terrain does not cast shadows through the hlms.
pub(crate) fn pre_caster(ctx: &mut WorkerContext) {
    ctx.properties.clear();
}

/// PBS texture units, plus the terrain maps in the reserved units.
pub(crate) fn notify_properties_merged(ctx: &mut WorkerContext, reserved: u16) {
    crate::pbs::hash::notify_properties_merged(ctx, reserved);
    for (unit, (stage, name)) in TERRAIN_TEXTURES.iter().enumerate() {
        ctx.set_texture_reg(*stage, *name, unit as i32);
    }
}

/// Three sets: terrain maps (0), pass-level bindings (1) and per-material
/// textures (2).
///
/// Const buffers: pass (0), material (1), instance (2), light buffers (4..6).
pub(crate) fn setup_root_layout(
    layout: &mut RootLayout,
    props: &PropertyStore,
    reserved: u16,
) -> Result<()> {
    let mut const_end = INSTANCE_BUFFER_SLOT + 1;
    if props.is_set(USE_LIGHT_BUFFERS) {
        const_end = LIGHT_BUFFER_SLOT + 3;
    }
    layout.set_range(0, DescBindingKind::ConstBuffer, 0, const_end);
    layout.set_range(0, DescBindingKind::Texture, 0, reserved);
    let sampler_end = reserved.max(TERRAIN_SAMPLER_SLOT);
    layout.set_range(0, DescBindingKind::Sampler, TERRAIN_SAMPLER_SLOT, sampler_end);

    let mut tex_buffer_end = reserved;
    if props.is_set(base::FORWARD_PLUS) {
        tex_buffer_end += 2;
    }
    layout.set_range(1, DescBindingKind::TexBuffer, reserved, tex_buffer_end);

    let set0_end = (props.get(base::SET0_TEXTURE_SLOT_END) as u16).max(tex_buffer_end);
    layout.set_range(1, DescBindingKind::Texture, tex_buffer_end, set0_end);
    layout.set_range(1, DescBindingKind::Sampler, tex_buffer_end, set0_end);

    let set2_start = (props.get(base::SAMPLER_STATE_START) as u16).max(set0_end);
    let set2_end = (props.get(base::SET1_TEXTURE_SLOT_END) as u16).max(set2_start);
    layout.set_range(2, DescBindingKind::Texture, set2_start, set2_end);
    layout.set_range(2, DescBindingKind::Sampler, set2_start, set2_end);

    let num_shadow_maps = props.get(base::NUM_SHADOW_MAP_TEXTURES);
    if num_shadow_maps > 0 && props.contains(IdString::new("texShadowMap0")) {
        let first = props.get(IdString::new("texShadowMap0")) as u16;
        let shadow_maps = ArrayBinding::new(first, num_shadow_maps as u16);
        layout.add_array_binding(DescBindingKind::Texture, shadow_maps)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{Capabilities, DummyRenderSystem};
    use crate::datablock::MaterialData;
    use crate::pbs::{Brdf, BrdfFlags};
    use crate::terra::{TerrainCell, TerrainInfo};
    use crate::types::{CompareFunction, DescriptorSetTexture, TextureGpu, TextureId};
    use redlilium_hlms_core::math::Vec4;
    use redlilium_hlms_core::StructuralErrorKind;

    fn texture(id: u32) -> TextureGpu {
        TextureGpu::new(TextureId(id), &format!("terrain{id}"), 256, 256)
    }

    fn cell(use_skirts: bool) -> Renderable {
        let maps = vec![texture(100), texture(101), texture(102)];
        let maps = Arc::new(DescriptorSetTexture::new(maps));
        let mut cell = TerrainCell::new(Arc::new(TerrainInfo::new(256, 256, maps)), use_skirts);
        cell.set_origin(0, 0, 64, 64, 0);
        Renderable::new(crate::DatablockId(0), Vec::new()).with_terrain(cell)
    }

    fn datablock(material: TerraMaterial, layers: &[(usize, u32)]) -> Datablock {
        let mut datablock = Datablock::new("terrain", MaterialData::Terra(material));
        for &(ty, id) in layers {
            datablock.set_texture(ty, Some(texture(id))).unwrap();
        }
        datablock.baked()
    }

    fn run_pre_create(
        datablock: &Datablock,
        renderable: &Renderable,
        rs: &DummyRenderSystem,
    ) -> Result<WorkerContext> {
        let mut ctx = WorkerContext::new();
        let MaterialData::Terra(material) = &datablock.material else {
            unreachable!()
        };
        pre_create(&mut ctx, renderable, datablock, material, &HlmsConfig::default(), rs)?;
        Ok(ctx)
    }

    #[test]
    fn test_fixed_metallic_workflow() {
        let datablock = datablock(TerraMaterial::default(), &[]);
        let ctx = run_pre_create(&datablock, &cell(true), &DummyRenderSystem::new()).unwrap();
        assert_eq!(ctx.get(USE_SKIRTS), 1);
        assert_eq!(ctx.get(METALLIC_WORKFLOW), 1);
        assert_eq!(ctx.get(FRESNEL_SCALAR), 1);
        assert_eq!(ctx.get(RECEIVE_SHADOWS), 1);
        assert_eq!(ctx.get(BRDF_DEFAULT), 1);
        assert_eq!(ctx.get(GGX_HEIGHT_CORRELATED), 1);
        assert_eq!(ctx.get(FIRST_VALID_DETAIL_MAP_NM), 4);
        assert_eq!(ctx.get(NORMAL_MAP), 0);
    }

    #[test]
    fn test_detail_layers() {
        let mut material = TerraMaterial::default()
            .with_brdf(Brdf::COOK_TORRANCE.with_flags(BrdfFlags::SEPARATE_DIFFUSE_FRESNEL));
        material.set_detail_offset_scale(2, Vec4::new(0.0, 0.0, 8.0, 8.0));
        let datablock = datablock(
            material,
            &[
                (TerraTexture::Diffuse as usize, 1),
                (TerraTexture::detail(1), 2),
                (TerraTexture::detail_normal(2), 3),
                (TerraTexture::detail_roughness(1), 4),
            ],
        );
        let ctx = run_pre_create(&datablock, &cell(false), &DummyRenderSystem::new()).unwrap();

        assert_eq!(ctx.get(USE_SKIRTS), 0);
        assert_eq!(ctx.get(BRDF_COOK_TORRANCE), 1);
        assert_eq!(ctx.get(FRESNEL_SEPARATE_DIFFUSE), 1);
        assert_eq!(ctx.get(NUM_TEXTURES), 4);
        assert_eq!(ctx.get(DIFFUSE_MAP), 1);
        assert_eq!(ctx.get(IdString::new("detail_map1")), 2);
        assert_eq!(ctx.get(IdString::new("detail_map1_idx")), 1);
        assert_eq!(ctx.get(IdString::new("roughness_map1")), 4);
        assert!(!ctx.properties.contains(IdString::new("detail_map0")));
        assert_eq!(ctx.get(DETAIL_MAPS_DIFFUSE), 4);
        assert_eq!(ctx.get(DETAIL_MAPS_NORMAL), 4);
        assert_eq!(ctx.get(FIRST_VALID_DETAIL_MAP_NM), 2);
        assert_eq!(ctx.get(DETAIL_OFFSETS[2]), 1);
        assert_eq!(ctx.get(DETAIL_OFFSETS[1]), 0);
        assert_eq!(ctx.get(NORMAL_MAP), 1);
        assert_eq!(ctx.get(NORMAL_SAMPLING_FORMAT), NORMAL_RG_SNORM.as_property_value());
    }

    #[test]
    fn test_reflection_is_not_a_material_texture() {
        let datablock = datablock(
            TerraMaterial::default(),
            &[(TerraTexture::Diffuse as usize, 1), (TerraTexture::Reflection as usize, 9)],
        );
        let rs = DummyRenderSystem::new().with_capabilities(Capabilities::SEPARATE_SAMPLERS);
        let ctx = run_pre_create(&datablock, &cell(false), &rs).unwrap();
        assert_eq!(ctx.get(NUM_TEXTURES), 1);
        assert_eq!(ctx.get(NUM_SAMPLERS), 2);
        assert_eq!(ctx.get(ENVPROBE_MAP), IdString::new("terrain9").as_property_value());
        assert_eq!(ctx.get(IdString::new("diffuse_map_sampler")), 0);
    }

    #[test]
    fn test_requires_terrain_cell() {
        let datablock = datablock(TerraMaterial::default(), &[]);
        let plain = Renderable::new(crate::DatablockId(0), Vec::new());
        let err = run_pre_create(&datablock, &plain, &DummyRenderSystem::new()).unwrap_err();
        assert_eq!(err.kind, StructuralErrorKind::InvalidParams);
    }

    #[test]
    fn test_alpha_test_not_supported() {
        let datablock = datablock(TerraMaterial::default(), &[])
            .with_alpha_test(CompareFunction::Less, 0.5);
        let err = run_pre_create(&datablock, &cell(false), &DummyRenderSystem::new()).unwrap_err();
        assert_eq!(err.kind, StructuralErrorKind::NotImplemented);
    }

    #[test]
    fn test_caster_has_no_properties() {
        let datablock = datablock(TerraMaterial::default(), &[(TerraTexture::Diffuse as usize, 1)]);
        let mut ctx = run_pre_create(&datablock, &cell(false), &DummyRenderSystem::new()).unwrap();
        pre_caster(&mut ctx);
        assert!(ctx.properties.is_empty());
    }

    #[test]
    fn test_terrain_maps_take_reserved_units() {
        let mut ctx = WorkerContext::new();
        ctx.set(base::FORWARD_PLUS, 1);
        ctx.set(NUM_TEXTURES, 2);
        notify_properties_merged(&mut ctx, 3);

        assert_eq!(ctx.texture_reg("heightMap"), Some(0));
        assert_eq!(ctx.texture_reg("terrainNormals"), Some(1));
        assert_eq!(ctx.texture_reg("terrainShadows"), Some(2));
        assert_eq!(ctx.texture_reg("f3dGrid"), Some(3));
        assert_eq!(ctx.get(base::SAMPLER_STATE_START), 5);
        assert_eq!(ctx.texture_reg("textureMaps1"), Some(6));
    }

    #[test]
    fn test_root_layout_validates() {
        let mut ctx = WorkerContext::new();
        ctx.set(base::FORWARD_PLUS, 1);
        ctx.set(base::NUM_SHADOW_MAP_TEXTURES, 2);
        ctx.set(base::NUM_SHADOW_MAP_LIGHTS, 1);
        ctx.set(USE_LIGHT_BUFFERS, 1);
        ctx.set(NUM_TEXTURES, 3);
        notify_properties_merged(&mut ctx, 3);

        let mut layout = RootLayout::new();
        setup_root_layout(&mut layout, &ctx.properties, 3).unwrap();
        layout.validate("terra").unwrap();

        assert_eq!(layout.range(0, DescBindingKind::ConstBuffer).end, LIGHT_BUFFER_SLOT + 3);
        assert_eq!(layout.range(0, DescBindingKind::Texture).end, 3);
        assert_eq!(layout.range(1, DescBindingKind::TexBuffer).start, 3);
        assert_eq!(layout.range(1, DescBindingKind::Texture).start, 5);
        assert_eq!(layout.range(2, DescBindingKind::Texture).start, 7);
        assert_eq!(layout.range(2, DescBindingKind::Texture).end, 10);
        assert_eq!(layout.array_bindings(DescBindingKind::Texture).len(), 1);
    }
}
