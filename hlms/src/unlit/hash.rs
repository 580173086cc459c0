//! Unlit permutation properties.
//!
//! Every texture type is one layer blended over the previous ones. Layers
//! sampling the same UV set without an animation matrix share one
//! interpolant half, so at most two layers fit in each `vec4` output.

use redlilium_hlms_core::{
    DescBindingKind, IdString, PropertyStore, Result, RootLayout, StructuralError,
};

use super::material::{UnlitMaterial, NUM_TEXTURE_TYPES};
use super::properties::*;
use crate::backend::RenderSystem;
use crate::buffers::{INSTANCE_BUFFER_SLOT, WORLD_MATRIX_TEX_SLOT};
use crate::config::HlmsConfig;
use crate::datablock::{Datablock, MaterialData};
use crate::properties::{base, pso};
use crate::renderable::Renderable;
use crate::types::TextureType;
use crate::worker::{ShaderStage, WorkerContext};

/// Const buffer slot of the material pool.
pub const MATERIAL_BUFFER_SLOT: u16 = 1;
/// Tex buffer slot of the pool's texture animation matrices.
pub const ANIMATION_MATRICES_TEX_SLOT: u16 = 1;

/// One interpolated UV set handed from the vertex to the pixel shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UvOutput {
    source: u8,
    /// First texture type reading it.
    tex_unit: usize,
    animated: bool,
}

/// UV outputs of `datablock`, and the output each texture type reads.
fn assign_uv_outputs(
    datablock: &Datablock,
    material: &UnlitMaterial,
) -> (Vec<UvOutput>, [Option<usize>; NUM_TEXTURE_TYPES]) {
    let mut outputs: Vec<UvOutput> = Vec::new();
    let mut assigned = [None; NUM_TEXTURE_TYPES];

    for (ty, slot) in assigned.iter_mut().enumerate() {
        if datablock.texture(ty).is_none() {
            continue;
        }
        let source = material.uv_source[ty];
        let animated = material.is_animated(ty);
        let shared = if animated {
            None
        } else {
            outputs.iter().position(|out| out.source == source && !out.animated)
        };
        *slot = Some(shared.unwrap_or_else(|| {
            outputs.push(UvOutput {
                source,
                tex_unit: ty,
                animated,
            });
            outputs.len() - 1
        }));
    }
    (outputs, assigned)
}

/// Pixel pieces of the texture layers: blend modes, UV swizzles and texture
/// swizzles. Pieces are dropped for casters, so alpha testing sets them again.
fn set_layer_pieces(ctx: &mut WorkerContext, datablock: &Datablock, material: &UnlitMaterial) {
    let (_, assigned) = assign_uv_outputs(datablock, material);
    for ty in 0..NUM_TEXTURE_TYPES {
        ctx.set_piece(ShaderStage::Pixel, blend_mode_idx(ty), material.blend_modes[ty].piece());
        if let Some(raw) = assigned[ty] {
            let swizzle = if raw % 2 == 0 { "xy" } else { "zw" };
            ctx.set_piece(ShaderStage::Pixel, uv_diffuse_swizzle(ty), swizzle);
            ctx.set_piece(ShaderStage::Pixel, tex_swizzle(ty), material.swizzle_string(ty));
        }
    }
}

fn materials_per_buffer(config: &HlmsConfig) -> i32 {
    if config.fast_shader_build_hack {
        2
    } else {
        config.slots_per_pool as i32
    }
}

/// Renderable properties of an Unlit datablock.
pub(crate) fn pre_create(
    ctx: &mut WorkerContext,
    _renderable: &Renderable,
    datablock: &Datablock,
    material: &UnlitMaterial,
    config: &HlmsConfig,
    render_system: &dyn RenderSystem,
) -> Result<()> {
    // Unlit never lights nor skins.
    for key in [
        base::SKELETON,
        base::NORMAL,
        base::QTANGENT,
        base::TANGENT,
        base::BONES_PER_VERTEX,
    ] {
        ctx.set(key, 0);
    }

    if let Some(textures) = datablock.textures_desc_set() {
        ctx.set(NUM_TEXTURES, textures.len() as i32);
        for (idx, texture) in textures.textures.iter().enumerate() {
            if texture.texture_type == TextureType::Tex2dArray {
                ctx.set(IdString::indexed_with_suffix("is_texture", idx, "_array"), 1);
            }
        }
    }
    ctx.properties.set_bool(DIFFUSE, material.has_colour);
    if let Some(samplers) = datablock.samplers_desc_set() {
        ctx.set(NUM_SAMPLERS, samplers.len() as i32);
    }

    let separate_samplers = render_system.has_separate_samplers();
    let mut max_used_plus_one = 0;
    let mut has_planar_reflection = false;
    for ty in 0..NUM_TEXTURE_TYPES {
        let Some(texture) = datablock.texture(ty) else {
            continue;
        };
        let source = material.uv_source[ty];
        if ctx.get(base::uv_count(usize::from(source))) < 2 {
            return Err(StructuralError::invalid_state(format!(
                "Renderable must have at least 2 coordinates in UV set #{source}. Either change \
                 the mesh, or change the UV source settings"
            )));
        }

        ctx.set(diffuse_map(ty), 1);
        if let Some(idx) = datablock.index_to_descriptor_texture(ty) {
            ctx.set(IdString::indexed_with_suffix("diffuse_map", ty, "_idx"), i32::from(idx));
            if separate_samplers {
                if let Some(sampler) = datablock.index_to_descriptor_sampler(ty) {
                    let key = IdString::indexed_with_suffix("diffuse_map", ty, "_sampler");
                    ctx.set(key, i32::from(sampler));
                }
            }
        }
        if texture.texture_type == TextureType::Tex2dArray {
            ctx.set(IdString::indexed_with_suffix("diffuse_map", ty, "_array"), 1);
        }
        if material.planar_reflection[ty] {
            ctx.set(IdString::indexed_with_suffix("diffuse_map", ty, "_reflection"), 1);
            has_planar_reflection = true;
        }
        max_used_plus_one = ty as i32 + 1;
    }

    let (outputs, assigned) = assign_uv_outputs(datablock, material);
    for (ty, raw) in assigned.iter().enumerate() {
        if let Some(raw) = raw {
            ctx.set(uv_diffuse(ty), (*raw >> 1) as i32);
        }
    }
    set_layer_pieces(ctx, datablock, material);

    if datablock.textures_desc_set().is_some() {
        ctx.set(DIFFUSE_MAP, max_used_plus_one);
    }
    if outputs.iter().any(|out| out.animated) {
        ctx.set(TEXTURE_MATRIX, 1);
    }
    if has_planar_reflection {
        ctx.set(base::VPOS, 1);
        ctx.set(HAS_PLANAR_REFLECTIONS, 1);
    }

    let num_outputs = outputs.len();
    ctx.set(OUT_UV_COUNT, num_outputs as i32);
    for (i, out) in outputs.iter().enumerate() {
        ctx.set(out_uv(i, "_out_uv"), (i >> 1) as i32);
        ctx.properties.set_bool(out_uv(i, "_texture_matrix"), out.animated);
        ctx.set(out_uv(i, "_tex_unit"), out.tex_unit as i32);
        ctx.set(out_uv(i, "_source_uv"), i32::from(out.source));
        ctx.set_piece(
            ShaderStage::Vertex,
            out_uv(i, "_swizzle"),
            if i % 2 == 1 { "zw" } else { "xy" },
        );
    }
    let half_count = (num_outputs + 1) >> 1;
    ctx.set(OUT_UV_HALF_COUNT, half_count as i32);
    for i in 0..half_count {
        let components = if (i << 1) == num_outputs - 1 { 2 } else { 4 };
        ctx.set(IdString::indexed("out_uv_half_count", i), components);
    }

    ctx.set(MATERIALS_PER_BUFFER, materials_per_buffer(config));
    Ok(())
}

/// Keep only what depth-only rendering needs. Alpha-tested casters sample
/// the layers, so they keep everything and get their pieces back.
pub(crate) fn pre_caster(ctx: &mut WorkerContext, datablock: &Datablock, config: &HlmsConfig) {
    if datablock.has_alpha_test() {
        if let MaterialData::Unlit(material) = &datablock.material {
            set_layer_pieces(ctx, datablock, material);
        }
    } else {
        ctx.properties.retain(|key, _| {
            key == HW_GAMMA_READ
                || key == pso::INPUT_LAYOUT_ID
                || key == base::SKELETON
                || key == base::BONES_PER_VERTEX
                || key == base::DUAL_PARABOLOID_MAPPING
                || key == base::ALPHA_TEST
                || key == base::ALPHA_BLEND
        });
    }
    ctx.set(MATERIALS_PER_BUFFER, materials_per_buffer(config));
}

/// Assign a texture unit to every texture of the material's set.
pub(crate) fn notify_properties_merged(ctx: &mut WorkerContext) {
    let start = ctx.get(base::SAMPLER_STATE_START);
    let mut unit = start;
    for i in 0..ctx.get(NUM_TEXTURES).max(0) as usize {
        let array = ctx.get(IdString::indexed_with_suffix("is_texture", i, "_array")) != 0;
        let name = if array {
            format!("textureMapsArray{i}")
        } else {
            format!("textureMaps{i}")
        };
        ctx.set_texture_reg(ShaderStage::Pixel, name, unit);
        unit += 1;
    }
    ctx.set(base::SET0_TEXTURE_SLOT_END, start);
    ctx.set(base::SET1_TEXTURE_SLOT_END, unit);
}

/// Const buffers: pass (0), material (1), instance (2). Tex buffers: world
/// view projection (0) and texture matrices (1). Textures and samplers start
/// after the reserved slots and the listener's pass textures.
pub(crate) fn setup_root_layout(
    layout: &mut RootLayout,
    props: &PropertyStore,
    reserved: u16,
) -> Result<()> {
    layout.set_range(0, DescBindingKind::ConstBuffer, 0, INSTANCE_BUFFER_SLOT + 1);

    let tex_buffer_end = if props.is_set(TEXTURE_MATRIX) {
        ANIMATION_MATRICES_TEX_SLOT + 1
    } else {
        WORLD_MATRIX_TEX_SLOT + 1
    };
    layout.set_range(0, DescBindingKind::TexBuffer, 0, tex_buffer_end);

    let start = (props.get(base::SAMPLER_STATE_START) as u16).max(reserved);
    let end = (props.get(base::SET1_TEXTURE_SLOT_END) as u16).max(start);
    layout.set_range(0, DescBindingKind::Texture, start, end);
    layout.set_range(0, DescBindingKind::Sampler, start, end);
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::backend::{Capabilities, DummyRenderSystem};
    use crate::renderable::{VertexElement, VertexSemantic};
    use crate::types::{CompareFunction, TextureGpu, TextureId};
    use redlilium_hlms_core::math::Mat4;
    use redlilium_hlms_core::StructuralErrorKind;

    fn texture(id: u32) -> TextureGpu {
        TextureGpu::new(TextureId(id), &format!("layer{id}"), 128, 128)
    }

    fn renderable(uv_sets: &[u8]) -> Renderable {
        let mut elements = vec![VertexElement::new(VertexSemantic::Position, 3)];
        for (idx, &components) in uv_sets.iter().enumerate() {
            elements.push(VertexElement::tex_coord(idx as u8, components));
        }
        Renderable::new(crate::DatablockId(0), elements)
    }

    fn renderable_ctx(renderable: &Renderable) -> WorkerContext {
        let mut ctx = WorkerContext::new();
        for element in &renderable.vertex_elements {
            if element.semantic == VertexSemantic::TexCoord {
                ctx.set(base::uv_count(usize::from(element.index)), i32::from(element.components));
            }
        }
        ctx
    }

    fn datablock(material: UnlitMaterial, layers: &[(usize, u32)]) -> Datablock {
        let mut datablock = Datablock::new("unlit", MaterialData::Unlit(material));
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
        let mut ctx = renderable_ctx(renderable);
        let MaterialData::Unlit(material) = &datablock.material else {
            unreachable!()
        };
        pre_create(&mut ctx, renderable, datablock, material, &HlmsConfig::default(), rs)?;
        Ok(ctx)
    }

    #[test]
    fn test_layers_share_uv_outputs() {
        let mut material = UnlitMaterial::default().with_uv_source(2, 1);
        material.set_animation_matrix(3, Mat4::identity());
        let datablock = datablock(material, &[(0, 1), (1, 2), (2, 3), (3, 4)]);
        let rs = DummyRenderSystem::new();
        let ctx = run_pre_create(&datablock, &renderable(&[2, 2]), &rs).unwrap();

        // Layers 0 and 1 read UV set 0 through output 0, layer 2 reads set 1
        // through output 1 and the animated layer 3 gets output 2.
        assert_eq!(ctx.get(OUT_UV_COUNT), 3);
        assert_eq!(ctx.get(OUT_UV_HALF_COUNT), 2);
        assert_eq!(ctx.get(uv_diffuse(1)), 0);
        assert_eq!(ctx.get(uv_diffuse(3)), 1);
        assert_eq!(ctx.piece(ShaderStage::Pixel, uv_diffuse_swizzle(1)), Some("xy"));
        assert_eq!(ctx.piece(ShaderStage::Pixel, uv_diffuse_swizzle(2)), Some("zw"));
        assert_eq!(ctx.piece(ShaderStage::Vertex, out_uv(1, "_swizzle")), Some("zw"));
        assert_eq!(ctx.get(out_uv(1, "_source_uv")), 1);
        assert_eq!(ctx.get(out_uv(2, "_texture_matrix")), 1);
        assert_eq!(ctx.get(out_uv(2, "_tex_unit")), 3);
        assert_eq!(ctx.get(IdString::new("out_uv_half_count0")), 4);
        assert_eq!(ctx.get(IdString::new("out_uv_half_count1")), 2);
        assert_eq!(ctx.get(TEXTURE_MATRIX), 1);
        assert_eq!(ctx.get(DIFFUSE_MAP), 4);
        assert_eq!(ctx.get(NUM_TEXTURES), 4);
    }

    #[test]
    fn test_layer_properties() {
        let mut material =
            UnlitMaterial::default().with_colour(redlilium_hlms_core::math::Vec4::zeros());
        material.set_planar_reflection(5, true);
        let datablock = datablock(material, &[(5, 9)]);
        let rs = DummyRenderSystem::new().with_capabilities(Capabilities::SEPARATE_SAMPLERS);
        let ctx = run_pre_create(&datablock, &renderable(&[2]), &rs).unwrap();

        assert_eq!(ctx.get(diffuse_map(5)), 1);
        assert_eq!(ctx.get(IdString::new("diffuse_map5_idx")), 0);
        assert_eq!(ctx.get(IdString::new("diffuse_map5_sampler")), 0);
        assert_eq!(ctx.get(IdString::new("diffuse_map5_reflection")), 1);
        assert_eq!(ctx.get(HAS_PLANAR_REFLECTIONS), 1);
        assert_eq!(ctx.get(base::VPOS), 1);
        assert_eq!(ctx.get(DIFFUSE), 1);
        assert_eq!(ctx.get(DIFFUSE_MAP), 6);
        assert_eq!(ctx.piece(ShaderStage::Pixel, tex_swizzle(5)), Some("xyzw"));
        assert_eq!(
            ctx.piece(ShaderStage::Pixel, blend_mode_idx(0)),
            Some("@insertpiece( NormalPremul)")
        );
        assert!(!ctx.properties.contains(TEXTURE_MATRIX));
    }

    #[test]
    fn test_array_layers_flagged() {
        let mut datablock = Datablock::new("arr", MaterialData::Unlit(UnlitMaterial::default()));
        datablock
            .set_texture(0, Some(texture(1).with_type(TextureType::Tex2dArray)))
            .unwrap();
        let datablock = datablock.baked();
        let rs = DummyRenderSystem::new();
        let mut ctx = run_pre_create(&datablock, &renderable(&[2]), &rs).unwrap();
        assert_eq!(ctx.get(IdString::new("diffuse_map0_array")), 1);
        assert_eq!(ctx.get(IdString::new("is_texture0_array")), 1);

        ctx.set(base::SAMPLER_STATE_START, 2);
        notify_properties_merged(&mut ctx);
        assert_eq!(ctx.texture_reg("textureMapsArray0"), Some(2));
        assert_eq!(ctx.texture_reg("textureMaps0"), None);
    }

    #[rstest]
    #[case::missing_set(&[2], 1)]
    #[case::single_coordinate(&[2, 1], 1)]
    fn test_uv_set_needs_two_coordinates(#[case] uv_sets: &[u8], #[case] source: u8) {
        let material = UnlitMaterial::default().with_uv_source(0, source);
        let datablock = datablock(material, &[(0, 1)]);
        let rs = DummyRenderSystem::new();
        let err = run_pre_create(&datablock, &renderable(uv_sets), &rs).unwrap_err();
        assert_eq!(err.kind, StructuralErrorKind::InvalidState);
        assert!(err.context.contains("UV set #1"));
    }

    #[test]
    fn test_opaque_caster_keeps_whitelist_only() {
        let datablock = datablock(UnlitMaterial::default(), &[(0, 1)]);
        let rs = DummyRenderSystem::new();
        let mut ctx = run_pre_create(&datablock, &renderable(&[2]), &rs).unwrap();
        ctx.set(pso::INPUT_LAYOUT_ID, 3);
        pre_caster(&mut ctx, &datablock, &HlmsConfig::default());

        let keys: Vec<IdString> = ctx.properties.iter().map(|p| p.key).collect();
        assert!(keys.contains(&pso::INPUT_LAYOUT_ID));
        assert!(keys.contains(&MATERIALS_PER_BUFFER));
        assert!(!keys.contains(&DIFFUSE_MAP));
        assert!(!keys.contains(&OUT_UV_COUNT));
    }

    #[test]
    fn test_alpha_tested_caster_is_idempotent() {
        let mut datablock = Datablock::new("cutout", MaterialData::Unlit(UnlitMaterial::default()))
            .with_alpha_test(CompareFunction::Greater, 0.5);
        datablock.set_texture(0, Some(texture(1))).unwrap();
        let datablock = datablock.baked();
        let rs = DummyRenderSystem::new();
        let full = run_pre_create(&datablock, &renderable(&[2]), &rs).unwrap();

        let mut caster = full.clone();
        for pieces in &mut caster.pieces {
            pieces.clear();
        }
        pre_caster(&mut caster, &datablock, &HlmsConfig::default());
        assert!(caster.properties.iter().all(|p| full.properties.contains(p.key)));
        assert_eq!(caster.piece(ShaderStage::Pixel, uv_diffuse_swizzle(0)), Some("xy"));

        let mut again = caster.clone();
        pre_caster(&mut again, &datablock, &HlmsConfig::default());
        assert_eq!(again.properties, caster.properties);
        assert_eq!(again.pieces, caster.pieces);
    }

    #[test]
    fn test_root_layout_validates() {
        let mut ctx = WorkerContext::new();
        ctx.set(TEXTURE_MATRIX, 1);
        ctx.set(NUM_TEXTURES, 3);
        ctx.set(base::SAMPLER_STATE_START, 3);
        notify_properties_merged(&mut ctx);
        assert_eq!(ctx.texture_reg("textureMaps2"), Some(5));

        let mut layout = RootLayout::new();
        setup_root_layout(&mut layout, &ctx.properties, 2).unwrap();
        layout.validate("unlit test").unwrap();
        assert_eq!(layout.range(0, DescBindingKind::ConstBuffer).end, 3);
        assert_eq!(layout.range(0, DescBindingKind::TexBuffer).end, 2);
        assert_eq!(layout.range(0, DescBindingKind::Texture).start, 3);
        assert_eq!(layout.range(0, DescBindingKind::Texture).end, 6);
    }
}
