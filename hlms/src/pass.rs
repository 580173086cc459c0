//! Pass properties every material kind shares.
//!
//! [`set_common_pass_properties`] runs after the kind-specific pass
//! properties and before the listener hook. Besides the properties it returns
//! the light counts the pass packer needs to size its light arrays, which
//! differ from the property values when limits or static branching pad them.

use redlilium_hlms_core::{IdString, PropertyStore, Result, StructuralError};

use crate::backend::{Capabilities, RenderSystem};
use crate::config::HlmsConfig;
use crate::properties::base;
use crate::scene::{LightType, PassScene, PrePassMode, ShadowMapDef, ShadowNode};

/// Light counts of a non-caster pass, before padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightCounts {
    /// Shadow-casting directional lights.
    pub caster_directional: usize,
    /// Every directional light of the global list.
    pub real_directional: usize,
    pub real_area_approx: usize,
    pub real_area_approx_with_mask: usize,
    pub real_area_ltc: usize,
}

/// The first `count` active shadow maps of `node`, with their index in the node.
pub fn active_shadow_maps(
    node: &ShadowNode,
    count: usize,
) -> impl Iterator<Item = (usize, &ShadowMapDef)> {
    node.shadow_maps
        .iter()
        .enumerate()
        .filter(|(_, map)| map.is_active())
        .take(count)
}

/// Number of shadow maps sampled by a receiver pass: one per active casting
/// light, plus the extra PSSM splits of the first directional light.
pub fn num_shadow_map_lights(node: &ShadowNode) -> usize {
    let splits = node.num_pssm_splits();
    node.num_active_casting_lights() + splits.saturating_sub(1)
}

fn set_f32(properties: &mut PropertyStore, key: IdString, value: f32) {
    properties.set(key, value.to_bits() as i32);
}

fn set_shadow_map_properties(
    properties: &mut PropertyStore,
    scene: &PassScene,
    node: &ShadowNode,
    config: &HlmsConfig,
) -> Result<()> {
    let splits = node.num_pssm_splits();
    properties.set(base::PSSM_SPLITS, splits as i32);
    properties.set_bool(base::PSSM_BLEND, !node.pssm_blends.is_empty());
    properties.set_bool(base::PSSM_FADE, node.pssm_fade != 0.0);

    let num_lights = num_shadow_map_lights(node);
    properties.set(base::NUM_SHADOW_MAP_LIGHTS, num_lights as i32);
    properties.set(
        base::NUM_SHADOW_MAP_TEXTURES,
        node.contiguous_textures.len() as i32,
    );

    let static_branch = config.static_branch_lights && num_lights > splits;
    if static_branch {
        properties.set(base::STATIC_BRANCH_SHADOW_MAP_LIGHTS, 1);
    }

    for (i, (_, map)) in active_shadow_maps(node, num_lights).enumerate() {
        properties.set(base::shadow_map(i, ""), map.contiguous_texture as i32);

        let full_texture = map.uv_offset.x != 0.0
            || map.uv_offset.y != 0.0
            || map.uv_length.x != 1.0
            || map.uv_length.y != 1.0;
        if full_texture || static_branch {
            properties.set(base::shadow_map(i, "_uvs_fulltex"), 1);
        }

        let uv_max = map.uv_offset + map.uv_length;
        set_f32(properties, base::shadow_map(i, "_uv_min_x"), map.uv_offset.x);
        set_f32(properties, base::shadow_map(i, "_uv_min_y"), map.uv_offset.y);
        set_f32(properties, base::shadow_map(i, "_uv_max_x"), uv_max.x);
        set_f32(properties, base::shadow_map(i, "_uv_max_y"), uv_max.y);
        properties.set(base::shadow_map(i, "_array_idx"), map.array_idx as i32);

        let light_type = map
            .light
            .and_then(|idx| scene.lights.get(idx))
            .map(|light| light.light_type);

        if static_branch {
            set_f32(properties, base::shadow_map(i, "_uv_length_x"), map.uv_length.x);
            set_f32(properties, base::shadow_map(i, "_uv_length_y"), map.uv_length.y);
            if light_type == Some(LightType::Directional) {
                properties.set(base::shadow_map(i, "_is_directional_light"), 1);
            }
            continue;
        }

        match light_type {
            Some(LightType::Directional) => {
                properties.set(base::shadow_map(i, "_is_directional_light"), 1);
            }
            Some(LightType::Point) => {
                properties.set(base::shadow_map(i, "_is_point_light"), 1);
                set_f32(properties, base::shadow_map(i, "_uv_length_x"), map.uv_length.x);
                set_f32(properties, base::shadow_map(i, "_uv_length_y"), map.uv_length.y);
            }
            Some(LightType::Spotlight) => {
                properties.set(base::shadow_map(i, "_is_spot"), 1);
            }
            _ => {}
        }
    }

    let mut uses_depth = None;
    for texture in &node.contiguous_textures {
        let is_depth = texture.format.is_depth();
        if uses_depth.is_some_and(|prev| prev != is_depth) {
            return Err(StructuralError::invalid_state(format!(
                "shadow map texture {} mixes depth and colour formats; either all shadow \
                 maps are depth textures or none are",
                texture.name
            )));
        }
        uses_depth = Some(is_depth);
    }
    properties.set_bool(base::SHADOW_USES_DEPTH_TEXTURE, uses_depth.unwrap_or(false));
    Ok(())
}

/// Gather light counts the way forward+ shading expects them: every
/// directional and area light of the global list, plus the point and spot
/// lights that cast shadows.
fn set_light_count_properties(
    properties: &mut PropertyStore,
    scene: &PassScene,
    config: &HlmsConfig,
    static_branch_shadow_maps: bool,
) -> LightCounts {
    let mut counts = LightCounts::default();
    let mut num_point = 0usize;
    let mut num_spot = 0usize;

    if let Some(node) = &scene.shadow_node {
        for light in node.casting_lights.iter().flatten().filter_map(|&idx| scene.lights.get(idx)) {
            match light.light_type {
                LightType::Directional => counts.caster_directional += 1,
                LightType::Point => num_point += 1,
                LightType::Spotlight => num_spot += 1,
                LightType::AreaApprox | LightType::AreaLtc => {}
            }
        }
    }

    let mut area_approx = 0usize;
    let mut area_ltc = 0usize;
    for light in &scene.lights {
        match light.light_type {
            LightType::Directional => counts.real_directional += 1,
            LightType::AreaApprox => {
                area_approx += 1;
                if light.has_texture_mask() {
                    counts.real_area_approx_with_mask += 1;
                }
            }
            LightType::AreaLtc => area_ltc += 1,
            LightType::Point | LightType::Spotlight => {}
        }
    }

    let mut num_directional = counts.real_directional;
    let limit = usize::from(config.num_lights_limit);
    if limit > 0 && num_directional > counts.caster_directional {
        num_directional = counts.caster_directional + limit;
        properties.set(base::STATIC_BRANCH_LIGHTS, 1);
    }

    if !static_branch_shadow_maps && num_point > 0 && num_directional == 0 && num_spot == 0 {
        properties.set(base::ALL_POINT_LIGHTS, 1);
    }

    // Cumulative: directional, then point, then spot.
    num_point += num_directional;
    num_spot += num_point;

    let approx_limit = usize::from(config.area_light_approx_limit);
    let ltc_limit = usize::from(config.area_light_ltc_limit);
    counts.real_area_approx = area_approx.min(approx_limit);
    counts.real_area_ltc = area_ltc.min(ltc_limit);

    properties.set(base::LIGHTS_DIRECTIONAL, counts.caster_directional as i32);
    properties.set(base::LIGHTS_DIR_NON_CASTER, num_directional as i32);
    properties.set(base::LIGHTS_POINT, num_point as i32);
    properties.set(base::LIGHTS_SPOT, num_spot as i32);
    if counts.real_area_approx > 0 {
        properties.set(base::LIGHTS_AREA_APPROX, approx_limit as i32);
    }
    if counts.real_area_ltc > 0 {
        properties.set(base::LIGHTS_AREA_LTC, ltc_limit as i32);
    }
    if counts.real_area_approx_with_mask > 0 {
        properties.set(base::LIGHTS_AREA_TEX_MASK, 1);
    }
    counts
}

/// Map every shadow map to the index of its light in the light array the
/// shader iterates (`hlms_shadowmapN_light_idx`).
fn set_shadow_light_indices(
    properties: &mut PropertyStore,
    node: &ShadowNode,
    counts: &LightCounts,
    static_branch_shadow_maps: bool,
) {
    let mut shadow_map_idx = 0usize;
    let mut light_idx = 0i32;

    let first_dir_splits = match node.num_pssm_splits() {
        0 => usize::from(counts.caster_directional > 0),
        splits => splits,
    };
    for _ in 0..first_dir_splits {
        properties.set(base::shadow_map(shadow_map_idx, "_light_idx"), light_idx);
        shadow_map_idx += 1;
    }
    if first_dir_splits > 0 {
        light_idx += 1;
    }

    for _ in 1..counts.caster_directional {
        properties.set(base::shadow_map(shadow_map_idx, "_light_idx"), light_idx);
        shadow_map_idx += 1;
        light_idx += 1;
    }

    if static_branch_shadow_maps {
        properties.set(base::LIGHTS_POINT, 0);
        return;
    }

    let num_directional = properties.get(base::LIGHTS_DIR_NON_CASTER);
    let num_lights = properties.get(base::LIGHTS_SPOT);
    light_idx += num_directional - counts.caster_directional as i32;
    for _ in num_directional..num_lights {
        properties.set(base::shadow_map(shadow_map_idx, "_light_idx"), light_idx);
        shadow_map_idx += 1;
        light_idx += 1;
    }
}

/// Set the pass properties shared by every kind. Returns the light counts of
/// a receiver pass (all zero for casters).
pub fn set_common_pass_properties(
    properties: &mut PropertyStore,
    scene: &PassScene,
    caster: bool,
    dual_paraboloid: bool,
    config: &HlmsConfig,
    render_system: &dyn RenderSystem,
) -> Result<LightCounts> {
    let capabilities = render_system.capabilities();
    if !render_system.is_reverse_depth() {
        properties.set(base::NO_REVERSE_DEPTH, 1);
    }

    let mut counts = LightCounts::default();

    if !caster {
        let mut static_branch_shadow_maps = false;
        if let Some(node) = &scene.shadow_node {
            set_shadow_map_properties(properties, scene, node, config)?;
            static_branch_shadow_maps = properties.is_set(base::STATIC_BRANCH_SHADOW_MAP_LIGHTS);
        }

        if let Some(baking) = &scene.uv_baking {
            properties.set(base::USE_UV_BAKING, 1);
            properties.set(base::UV_BAKING, i32::from(baking.uv_set));
            if baking.lighting_only {
                properties.set(base::BAKE_LIGHTING_ONLY, 1);
            }
        }
        if scene.instanced_stereo {
            properties.set(base::INSTANCED_STEREO, 1);
        }
        if scene.gen_normals_gbuffer {
            properties.set(base::GEN_NORMALS_GBUF, 1);
        }

        if let Some(forward_plus) = &scene.forward_plus {
            properties.set(base::FORWARD_PLUS, 1);
            forward_plus.data.set_pass_properties(properties);
            properties.set_bool(
                base::FORWARD_PLUS_FLIP_Y,
                scene.target.requires_texture_flipping,
            );

            let [diffuse, normals, emissive] = scene.active_decal_textures();
            if scene.decals.is_some() {
                properties.set(base::ENABLE_DECALS, 1);
                if diffuse.is_some() {
                    properties.set(base::DECALS_DIFFUSE, 1);
                }
                if normals.is_some() {
                    properties.set(base::DECALS_NORMALS, 1);
                }
                let merged = scene.decals.as_ref().is_some_and(|d| d.diffuse_merged_emissive);
                if emissive.is_some() {
                    properties.set(base::DECALS_EMISSIVE, 2);
                } else if merged && diffuse.is_some() {
                    properties.set(base::DECALS_EMISSIVE, 1);
                }
            }
        }

        counts = set_light_count_properties(properties, scene, config, static_branch_shadow_maps);

        if let Some(node) = &scene.shadow_node {
            set_shadow_light_indices(properties, node, &counts, static_branch_shadow_maps);
        }
    } else {
        properties.set(base::SHADOW_CASTER, 1);
        match scene.caster_light().map(|light| light.light_type) {
            Some(LightType::Directional) => properties.set(base::SHADOW_CASTER_DIRECTIONAL, 1),
            Some(LightType::Point) => properties.set(base::SHADOW_CASTER_POINT, 1),
            _ => {}
        }
        properties.set_bool(base::DUAL_PARABOLOID_MAPPING, dual_paraboloid);

        for key in [
            base::FORWARD3D,
            base::NUM_SHADOW_MAP_LIGHTS,
            base::NUM_SHADOW_MAP_TEXTURES,
            base::PSSM_SPLITS,
            base::LIGHTS_DIRECTIONAL,
            base::LIGHTS_DIR_NON_CASTER,
            base::LIGHTS_POINT,
            base::LIGHTS_SPOT,
            base::LIGHTS_AREA_APPROX,
        ] {
            properties.set(key, 0);
        }
        properties.set_bool(base::SHADOW_USES_DEPTH_TEXTURE, !scene.target.has_colour());
    }

    if scene.camera.is_reflected() {
        properties.set(base::PSO_CLIP_DISTANCES, 1);
        properties.set(base::GLOBAL_CLIP_PLANES, 1);
        if !capabilities.contains(Capabilities::USER_CLIP_PLANES) {
            properties.set(base::EMULATE_CLIP_DISTANCES, 1);
        }
    }

    properties.set_bool(base::RENDER_DEPTH_ONLY, !scene.target.has_colour());

    match scene.prepass.mode {
        PrePassMode::Create => {
            properties.set(base::PREPASS, 1);
            properties.set(base::GEN_NORMALS_GBUF, 1);
        }
        PrePassMode::Use => {
            properties.set(base::USE_PREPASS, 1);
            properties.set(base::VPOS, 1);
            properties.set(base::SCREEN_POS_INT, 1);
            if let Some(first) = scene.prepass.textures.first().filter(|t| t.is_msaa()) {
                properties.set(base::USE_PREPASS_MSAA, i32::from(first.msaa));
            }
            if scene.prepass.ssr.is_some() {
                properties.set(base::USE_SSR, 1);
            }
        }
        PrePassMode::None => {}
    }

    properties.set(base::MSAA_SAMPLES, i32::from(scene.target.msaa));

    if scene.refractions.is_some() {
        properties.set(base::VPOS, 1);
        properties.set(base::SCREEN_POS_INT, 1);
        properties.set(base::SS_REFRACTIONS_AVAILABLE, 1);
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyRenderSystem;
    use crate::scene::{Camera, Light, PassTarget};
    use crate::types::{PixelFormat, TextureGpu, TextureId};
    use redlilium_hlms_core::math::{Quat, Vec2, Vec3, Vec4};
    use redlilium_hlms_core::StructuralErrorKind;

    fn shadow_texture(id: u32, format: PixelFormat) -> TextureGpu {
        TextureGpu::new(TextureId(id), &format!("shadow{id}"), 1024, 1024).with_format(format)
    }

    fn scene_with_pssm() -> PassScene {
        let lights = vec![
            Light::directional(Vec3::new(0.0, -1.0, 0.0)),
            Light::point(Vec3::new(1.0, 2.0, 3.0)),
        ];
        let node = ShadowNode {
            contiguous_textures: vec![
                shadow_texture(1, PixelFormat::Depth32Float),
                shadow_texture(2, PixelFormat::Depth32Float),
            ],
            shadow_maps: vec![
                ShadowMapDef::new(0, 0).with_uv(Vec2::zeros(), Vec2::new(0.5, 1.0)),
                ShadowMapDef::new(0, 0).with_uv(Vec2::new(0.5, 0.0), Vec2::new(0.5, 1.0)),
                ShadowMapDef::new(1, 1),
            ],
            casting_lights: vec![Some(0), Some(1)],
            pssm_splits: vec![0.1, 10.0, 100.0],
            pssm_blends: Vec::new(),
            pssm_fade: 0.0,
        };
        PassScene::new(Camera::default(), PassTarget::default())
            .with_lights(lights)
            .with_shadow_node(node)
    }

    #[test]
    fn test_pssm_and_point_shadow_maps() {
        let rs = DummyRenderSystem::new();
        let mut properties = PropertyStore::new();
        let counts = set_common_pass_properties(
            &mut properties,
            &scene_with_pssm(),
            false,
            false,
            &HlmsConfig::default(),
            &rs,
        )
        .unwrap();

        assert_eq!(properties.get(base::PSSM_SPLITS), 2);
        assert_eq!(properties.get(base::NUM_SHADOW_MAP_LIGHTS), 3);
        assert_eq!(properties.get(base::NUM_SHADOW_MAP_TEXTURES), 2);
        assert_eq!(properties.get(base::shadow_map(1, "_uvs_fulltex")), 1);
        assert_eq!(
            properties.get(base::shadow_map(1, "_uv_max_x")),
            1.0f32.to_bits() as i32
        );
        assert_eq!(properties.get(base::shadow_map(2, "")), 1);
        assert_eq!(properties.get(base::shadow_map(2, "_is_point_light")), 1);
        assert!(!properties.contains(base::shadow_map(2, "_uvs_fulltex")));
        assert_eq!(properties.get(base::SHADOW_USES_DEPTH_TEXTURE), 1);

        assert_eq!(counts.caster_directional, 1);
        assert_eq!(properties.get(base::LIGHTS_DIRECTIONAL), 1);
        assert_eq!(properties.get(base::LIGHTS_DIR_NON_CASTER), 1);
        assert_eq!(properties.get(base::LIGHTS_POINT), 2);
        assert_eq!(properties.get(base::LIGHTS_SPOT), 2);

        assert_eq!(properties.get(base::shadow_map(0, "_light_idx")), 0);
        assert_eq!(properties.get(base::shadow_map(1, "_light_idx")), 0);
        assert_eq!(properties.get(base::shadow_map(2, "_light_idx")), 1);
    }

    #[test]
    fn test_mixed_shadow_formats_fail() {
        let rs = DummyRenderSystem::new();
        let mut scene = scene_with_pssm();
        if let Some(node) = scene.shadow_node.as_mut() {
            node.contiguous_textures[1].format = PixelFormat::R32Float;
        }
        let err = set_common_pass_properties(
            &mut PropertyStore::new(),
            &scene,
            false,
            false,
            &HlmsConfig::default(),
            &rs,
        )
        .unwrap_err();
        assert_eq!(err.kind, StructuralErrorKind::InvalidState);
    }

    #[test]
    fn test_caster_zeroes_light_counts() {
        let rs = DummyRenderSystem::new();
        let mut scene = scene_with_pssm();
        scene.caster_shadow_map = Some(2);
        scene.target = PassTarget::default().depth_only();
        let mut properties = PropertyStore::new();
        set_common_pass_properties(&mut properties, &scene, true, true, &HlmsConfig::default(), &rs)
            .unwrap();

        assert_eq!(properties.get(base::SHADOW_CASTER), 1);
        assert_eq!(properties.get(base::SHADOW_CASTER_POINT), 1);
        assert_eq!(properties.get(base::DUAL_PARABOLOID_MAPPING), 1);
        assert!(properties.contains(base::LIGHTS_SPOT));
        assert_eq!(properties.get(base::LIGHTS_SPOT), 0);
        assert_eq!(properties.get(base::SHADOW_USES_DEPTH_TEXTURE), 1);
        assert_eq!(properties.get(base::RENDER_DEPTH_ONLY), 1);
    }

    #[test]
    fn test_area_lights_are_clamped() {
        let rs = DummyRenderSystem::new();
        let area = |masked: bool| {
            let light = Light::area(
                LightType::AreaApprox,
                Vec3::zeros(),
                Quat::identity(),
                Vec2::new(1.0, 1.0),
            );
            if masked {
                light.with_texture_light_mask(0, 0)
            } else {
                light
            }
        };
        let scene = PassScene::default().with_lights(vec![area(true), area(false), area(false)]);
        let config = HlmsConfig::default().with_area_light_limits(2, 1);
        let mut properties = PropertyStore::new();
        let counts = set_common_pass_properties(&mut properties, &scene, false, false, &config, &rs)
            .unwrap();

        assert_eq!(counts.real_area_approx, 2);
        assert_eq!(properties.get(base::LIGHTS_AREA_APPROX), 2);
        assert_eq!(properties.get(base::LIGHTS_AREA_TEX_MASK), 1);
        assert!(!properties.contains(base::LIGHTS_AREA_LTC));
    }

    #[test]
    fn test_directional_limit_enables_static_branch() {
        let rs = DummyRenderSystem::new();
        let lights = (0..5)
            .map(|_| Light::directional(Vec3::new(0.0, -1.0, 0.0)))
            .collect();
        let scene = PassScene::default().with_lights(lights);
        let config = HlmsConfig::default().with_num_lights_limit(2);
        let mut properties = PropertyStore::new();
        let counts = set_common_pass_properties(&mut properties, &scene, false, false, &config, &rs)
            .unwrap();

        assert_eq!(counts.real_directional, 5);
        assert_eq!(properties.get(base::LIGHTS_DIR_NON_CASTER), 2);
        assert_eq!(properties.get(base::STATIC_BRANCH_LIGHTS), 1);
    }

    #[test]
    fn test_reflected_camera_without_clip_planes() {
        let rs = DummyRenderSystem::new().with_capabilities(Capabilities::HW_GAMMA);
        let camera = Camera::default().with_reflection_plane(Vec4::new(0.0, 1.0, 0.0, 0.0));
        let scene = PassScene::new(camera, PassTarget::default());
        let mut properties = PropertyStore::new();
        let config = HlmsConfig::default();
        set_common_pass_properties(&mut properties, &scene, false, false, &config, &rs).unwrap();
        assert_eq!(properties.get(base::NO_REVERSE_DEPTH), 1);
        assert_eq!(properties.get(base::PSO_CLIP_DISTANCES), 1);
        assert_eq!(properties.get(base::EMULATE_CLIP_DISTANCES), 1);
    }
}
