//! PBS pass buffer.
//!
//! One const buffer per pass, written in the order the shaders declare it:
//!
//! 1. view-projection (two eyes, cull matrix and eye offset with instanced
//!    stereo), clip plane, camera position of point-light casters,
//! 2. receivers only: view, shadow receivers, ambient, irradiance volume,
//!    PSSM splits, the three light arrays (unless they live in their own
//!    buffers) and the data of every active lighting subsystem,
//! 3. casters only: ESM view-Z row and depth range,
//! 4. listener bytes.
//!
//! Terra renders with the same pass layout.

use redlilium_hlms_core::math::{
    inverse_affine, mat4_linear, transform_affine, Mat3, Mat4, Vec3, Vec4,
};
use redlilium_hlms_core::{BufferWriter, PropertyStore, Result, StructuralError};

use super::hash::pass_texture_units;
use super::properties::*;
use crate::backend::{Capabilities, UnmapOptions};
use crate::buffers::align_up;
use crate::config::{AmbientLightMode, HlmsConfig, ShadowFilter};
use crate::hlms::{Hlms, PreparedPass};
use crate::pass::{active_shadow_maps, set_common_pass_properties, LightCounts};
use crate::properties::base;
use crate::scene::{
    flip_projection_y, CubemapProbes, ForwardPlus, IrradianceField, IrradianceVolume, Light,
    LightType, PassDataProvider, PassScene, PlanarReflections, ShadowNode, VoxelConeTracing,
};
use crate::types::TextureType;

/// Bytes of the punctual light array: 32 shadowed lights of 96 bytes.
pub const LIGHT0_CEILING: usize = SHADOWED_LIGHT_BYTES * 32;

/// Area lights of each kind a pass can hold.
pub const LIGHT_AREA_CEILING_LIGHTS: usize = 8;

const SHADOWED_LIGHT_BYTES: usize = 96;
const DIRECTIONAL_LIGHT_BYTES: usize = 48;

/// `vec4` members of an area light record, OBB restraint included.
fn area_approx_vars(config: &HlmsConfig) -> usize {
    7 + if config.obb_restraint_approx { 4 } else { 0 }
}

fn area_ltc_vars(config: &HlmsConfig) -> usize {
    7 + if config.obb_restraint_ltc { 3 } else { 0 }
}

/// Sizes of the three light buffers.
pub(crate) fn light_buffer_ceilings(config: &HlmsConfig) -> [usize; 3] {
    [
        LIGHT0_CEILING,
        area_approx_vars(config) * 16 * LIGHT_AREA_CEILING_LIGHTS,
        area_ltc_vars(config) * 16 * LIGHT_AREA_CEILING_LIGHTS,
    ]
}

/// `Auto` picks fixed, hemisphere or no ambient from the hemisphere colours.
pub(crate) fn resolve_ambient_mode(mode: AmbientLightMode, scene: &PassScene) -> AmbientLightMode {
    if mode != AmbientLightMode::Auto {
        return mode;
    }
    let upper = scene.ambient.upper_hemisphere.xyz();
    if upper == scene.ambient.lower_hemisphere {
        if upper == Vec3::zeros() {
            AmbientLightMode::None
        } else {
            AmbientLightMode::Fixed
        }
    } else {
        AmbientLightMode::Hemisphere
    }
}

/// Everything the size computation and the writer must agree on.
struct PassLayout<'a> {
    caster: bool,
    stereo: bool,
    reflected: bool,
    point_caster: bool,
    esm: bool,
    reverse_depth: bool,
    ambient: AmbientLightMode,
    env_map_scale: f32,
    vct_hemisphere: bool,
    shadow_node: Option<&'a ShadowNode>,
    num_shadow_map_lights: usize,
    pssm_splits: usize,
    pssm_blend: bool,
    pssm_fade: bool,
    num_lights: usize,
    num_directional: usize,
    num_area_approx: usize,
    num_area_ltc: usize,
    approx_vars: usize,
    ltc_vars: usize,
    forward_plus: Option<&'a ForwardPlus>,
    planar: Option<&'a PlanarReflections>,
    pcc: Option<&'a CubemapProbes>,
    vct: Option<&'a VoxelConeTracing>,
    ifd: Option<&'a IrradianceField>,
    irradiance_volume: Option<&'a IrradianceVolume>,
}

impl<'a> PassLayout<'a> {
    fn new(
        scene: &'a PassScene,
        props: &PropertyStore,
        caster: bool,
        config: &HlmsConfig,
        reverse_depth: bool,
    ) -> Self {
        let receiver = !caster;
        let shadow_node = scene.shadow_node.as_ref().filter(|_| receiver);
        let vct = scene.vct.as_ref().filter(|_| receiver);
        Self {
            caster,
            stereo: scene.instanced_stereo,
            reflected: scene.camera.is_reflected(),
            point_caster: props.is_set(base::SHADOW_CASTER_POINT),
            esm: config.shadow_filter == ShadowFilter::ExponentialShadowMaps,
            reverse_depth,
            ambient: resolve_ambient_mode(config.ambient_light_mode, scene),
            env_map_scale: scene.ambient.env_map_scale(),
            vct_hemisphere: vct.is_some_and(|vct| vct.needs_ambient_hemisphere),
            shadow_node,
            num_shadow_map_lights: props.get(base::NUM_SHADOW_MAP_LIGHTS).max(0) as usize,
            pssm_splits: shadow_node.map_or(0, ShadowNode::num_pssm_splits),
            pssm_blend: shadow_node.is_some_and(|node| !node.pssm_blends.is_empty()),
            pssm_fade: shadow_node.is_some_and(|node| node.pssm_fade != 0.0),
            num_lights: props.get(base::LIGHTS_SPOT).max(0) as usize,
            num_directional: props.get(base::LIGHTS_DIR_NON_CASTER).max(0) as usize,
            num_area_approx: props.get(base::LIGHTS_AREA_APPROX).max(0) as usize,
            num_area_ltc: props.get(base::LIGHTS_AREA_LTC).max(0) as usize,
            approx_vars: area_approx_vars(config),
            ltc_vars: area_ltc_vars(config),
            forward_plus: scene.forward_plus.as_ref().filter(|_| receiver),
            planar: scene.planar_reflections.as_ref().filter(|_| receiver),
            pcc: scene.active_cubemap_probes().filter(|_| receiver),
            vct,
            ifd: scene.irradiance_field.as_ref().filter(|_| receiver),
            irradiance_volume: scene.irradiance_volume.as_ref().filter(|_| receiver),
        }
    }

    fn writes_upper_hemisphere(&self) -> bool {
        matches!(self.ambient, AmbientLightMode::Fixed | AmbientLightMode::Hemisphere)
            || self.env_map_scale != 1.0
            || self.vct_hemisphere
    }

    fn writes_lower_hemisphere(&self) -> bool {
        self.ambient == AmbientLightMode::Hemisphere || self.vct_hemisphere
    }

    fn num_pssm_floats(&self) -> usize {
        let blends = if self.pssm_blend { self.pssm_splits.saturating_sub(1) } else { 0 };
        self.pssm_splits + blends + usize::from(self.pssm_fade)
    }

    /// Bytes of the three light arrays.
    fn light_bytes(&self) -> [usize; 3] {
        if self.caster {
            return [0; 3];
        }
        let light0 = if self.num_shadow_map_lights > 0 {
            SHADOWED_LIGHT_BYTES * self.num_lights
        } else {
            DIRECTIONAL_LIGHT_BYTES * self.num_directional
        };
        [
            light0,
            self.approx_vars * 16 * self.num_area_approx,
            self.ltc_vars * 16 * self.num_area_ltc,
        ]
    }

    /// Bytes of the pass buffer, light arrays and listener excluded.
    fn pass_bytes(&self, scene: &PassScene) -> usize {
        let mut size = 64;
        if self.stereo {
            size += 64 + 16;
            if self.forward_plus.is_some() {
                size += 64;
            }
        }
        if self.reflected {
            size += 16;
        }
        if self.point_caster {
            size += 16;
        }

        if self.caster {
            if self.esm {
                size += 16;
            }
            return size + 16;
        }

        size += 64;
        let per_shadow_map = 64 + if self.esm { 16 } else { 0 } + 16 + 16;
        size += per_shadow_map * self.num_shadow_map_lights;
        if scene.uv_baking.is_some() {
            size += 16;
        }
        size += 48 + 16 + 16 + 16;
        if self.writes_upper_hemisphere() {
            size += 16;
        }
        if self.writes_lower_hemisphere() {
            size += 32;
        }
        size += match self.ambient {
            AmbientLightMode::SphericalHarmonics => 28 * 4,
            AmbientLightMode::SphericalHarmonicsMonochrome => 12 * 4,
            _ => 0,
        };
        if self.irradiance_volume.is_some() {
            size += (8 + 16) * 4;
        }
        size += align_up(self.num_pssm_floats(), 4) * 4;

        let providers: [Option<&dyn PassDataProvider>; 5] = [
            self.forward_plus.map(|f| f.data.as_ref()),
            self.planar.map(|p| p.data.as_ref()),
            self.pcc.map(|p| p.data.as_ref()),
            self.vct.map(|v| v.data.as_ref()),
            self.ifd.map(|i| i.data.as_ref()),
        ];
        size + providers.iter().flatten().map(|p| p.const_buffer_size()).sum::<usize>()
    }
}

impl Hlms {
    /// Pass properties, cache registration and pass buffer of PBS and Terra.
    pub(crate) fn prepare_pbs_pass(
        &mut self,
        scene: &PassScene,
        caster: bool,
        dual_paraboloid: bool,
    ) -> Result<PreparedPass> {
        let render_system = self.render_system.clone();
        let capabilities = render_system.capabilities();
        let config = &self.config;

        let mut props = PropertyStore::new();
        set_pbs_pass_properties(&mut props, scene, caster, config, capabilities);
        let light_counts = set_common_pass_properties(
            &mut props,
            scene,
            caster,
            dual_paraboloid,
            config,
            render_system.as_ref(),
        )?;

        self.listener.prepare_pass_hash(scene, caster, dual_paraboloid, &mut props);
        let extra_textures = self.listener.get_num_extra_pass_textures(&props, caster);
        if extra_textures > 0 {
            props.set(EXTRA_PASS_TEXTURES, i32::from(extra_textures));
        }
        props.set_bool(USE_LIGHT_BUFFERS, config.use_light_buffers);
        props.set_bool(HW_GAMMA_READ, capabilities.contains(Capabilities::HW_GAMMA));
        props.set(HW_GAMMA_WRITE, 1);

        let hash = self.caches.add_pass(&props)?;

        let reverse_depth = render_system.is_reverse_depth();
        let layout = PassLayout::new(scene, &props, caster, config, reverse_depth);
        let listener_bytes = self.listener.get_pass_buffer_size(scene, caster, dual_paraboloid);
        let pass_bytes = layout.pass_bytes(scene) + listener_bytes;
        let light_bytes = layout.light_bytes();

        let ceiling = self.kind.pass_buffer_ceiling();
        if pass_bytes > ceiling {
            return Err(StructuralError::ceiling_exceeded(format!(
                "{} pass buffer needs {pass_bytes} bytes, the ceiling is {ceiling}",
                self.kind.name()
            )));
        }
        let ceilings = light_buffer_ceilings(config);
        for (idx, (&bytes, ceiling)) in light_bytes.iter().zip(ceilings).enumerate() {
            if bytes > ceiling {
                return Err(StructuralError::ceiling_exceeded(format!(
                    "{} light array {idx} needs {bytes} bytes, the ceiling is {ceiling}",
                    self.kind.name()
                )));
            }
        }

        let mut projection = scene.camera.projection;
        if scene.target.requires_texture_flipping {
            flip_projection_y(&mut projection);
        }
        let view = scene.camera.view;
        let view_proj = projection * view;

        let inline_lights = !config.use_light_buffers;
        let map_size = if inline_lights {
            pass_bytes + light_bytes.iter().sum::<usize>()
        } else {
            pass_bytes
        };
        log::trace!(
            "{} pass {hash:#x}: {map_size} bytes, light arrays {light_bytes:?} ({})",
            self.kind.name(),
            if inline_lights { "inline" } else { "buffers" }
        );

        let pass_buffer = self.pass_ring.next_buffer(render_system.as_ref())?;
        let mut light_buffers: [Option<_>; 3] = [None, None, None];
        if !inline_lights {
            for (slot, ring) in light_buffers.iter_mut().zip(self.light_rings.iter_mut()) {
                *slot = Some(ring.next_buffer(render_system.as_ref())?);
            }
        }

        {
            let mut mapped = pass_buffer.map(0, map_size)?;
            let mut writer = BufferWriter::new(&mut mapped);
            write_camera_block(&mut writer, scene, &layout, &view_proj);

            if !caster {
                write_receiver_block(&mut writer, scene, &layout, config, &view)?;
                if inline_lights {
                    write_light_arrays(&mut writer, scene, &layout, &light_counts, &view);
                } else {
                    for (idx, buffer) in light_buffers.iter().enumerate() {
                        let Some(buffer) = buffer.as_ref().filter(|_| light_bytes[idx] > 0) else {
                            continue;
                        };
                        let mut mapped = buffer.map(0, light_bytes[idx])?;
                        let mut light_writer = BufferWriter::new(&mut mapped);
                        let write = match idx {
                            0 => write_punctual_lights,
                            1 => write_area_approx_lights,
                            _ => write_area_ltc_lights,
                        };
                        write(&mut light_writer, scene, &layout, &light_counts, &view);
                        let label = format!("{} light buffer {idx}", self.kind.name());
                        light_writer.finish(light_bytes[idx], &label)?;
                    }
                }
                write_subsystems(&mut writer, &layout, &view)?;
            } else {
                if layout.esm {
                    writer.write_f32s(&view_row(&view, 2));
                }
                let (near, far) = scene.caster_depth_range();
                writer.write_f32s(&[near, 1.0 / (far - near), 0.0, 0.0]);
            }

            self.listener.prepare_pass_buffer(scene, caster, dual_paraboloid, &mut writer);
            writer.finish(map_size, &format!("{} pass buffer", self.kind.name()))?;
        }
        for buffer in light_buffers.iter().flatten() {
            buffer.unmap(UnmapOptions::KeepPersistent);
        }
        pass_buffer.unmap(UnmapOptions::KeepPersistent);

        let shadow_sampler = if layout.esm {
            scene.samplers.shadow_map_esm
        } else if props.is_set(base::SHADOW_USES_DEPTH_TEXTURE) {
            scene.samplers.shadow_map_compare
        } else {
            scene.samplers.shadow_map
        };
        let tex_unit_slot_start = pass_texture_units(&props, self.reserved_tex_slots).end as u16;

        let mut view_projs = [Mat4::identity(); 5];
        view_projs[0] = view_proj;
        Ok(PreparedPass {
            hash,
            caster,
            scene: scene.clone(),
            properties: props,
            pass_buffer,
            pass_buffer_bytes: map_size,
            light_buffers,
            view,
            view_proj: view_projs,
            tex_unit_slot_start,
            shadow_sampler,
            light_counts,
        })
    }
}

/// Properties set before the shared ones.
fn set_pbs_pass_properties(
    props: &mut PropertyStore,
    scene: &PassScene,
    caster: bool,
    config: &HlmsConfig,
    capabilities: Capabilities,
) {
    let esm = config.shadow_filter == ShadowFilter::ExponentialShadowMaps;
    if let Some(node) = &scene.shadow_node {
        if esm {
            props.set(EXPONENTIAL_SHADOW_MAPS, i32::from(config.esm_k));
        }
        if !caster {
            if capabilities.contains(Capabilities::TEXTURE_GATHER) {
                props.set(base::TEX_GATHER, 1);
            }
            match config.shadow_filter {
                ShadowFilter::Pcf3x3 => {
                    props.set(PCF_3X3, 1);
                    props.set(PCF_ITERATIONS, 4);
                }
                ShadowFilter::Pcf4x4 => {
                    props.set(PCF_4X4, 1);
                    props.set(PCF_ITERATIONS, 9);
                }
                ShadowFilter::Pcf2x2 => props.set(PCF_ITERATIONS, 1),
                ShadowFilter::ExponentialShadowMaps => {}
            }
            if config.debug_pssm_splits && node.num_pssm_splits() > 0 {
                props.set(DEBUG_PSSM_SPLITS, 1);
            }
        }
    }

    if scene.instanced_stereo {
        props.set(base::VPOS, 1);
    }

    if !caster {
        set_receiver_lighting_properties(props, scene, config);
    }

    if config.lower_gpu_overhead {
        props.set(LOWER_GPU_OVERHEAD, 1);
    }
}

fn set_receiver_lighting_properties(
    props: &mut PropertyStore,
    scene: &PassScene,
    config: &HlmsConfig,
) {
    if scene.ltc_matrix.is_some() {
        props.set(LTC_TEXTURE_AVAILABLE, 1);
    }

    match resolve_ambient_mode(config.ambient_light_mode, scene) {
        AmbientLightMode::Fixed => props.set(AMBIENT_FIXED, 1),
        AmbientLightMode::Hemisphere => props.set(AMBIENT_HEMISPHERE, 1),
        AmbientLightMode::SphericalHarmonics => props.set(AMBIENT_SH, 1),
        AmbientLightMode::SphericalHarmonicsMonochrome => {
            props.set(AMBIENT_SH, 1);
            props.set(AMBIENT_SH_MONOCHROME, 1);
        }
        AmbientLightMode::Auto | AmbientLightMode::None => {}
    }
    if scene.ambient.env_map_scale() != 1.0 {
        props.set(ENV_MAP_SCALE, 1);
    }

    // Never sample the cubemap being rendered to.
    if let Some(target) = scene
        .target
        .colour_texture
        .as_ref()
        .filter(|tex| scene.target.has_colour() && tex.texture_type == TextureType::Cube)
    {
        props.set(TARGET_ENVPROBE_MAP, target.name.as_property_value());
    }

    if let Some(pcc) = scene.active_cubemap_probes() {
        props.set(PARALLAX_CORRECT_CUBEMAPS, 1);
        if pcc.automatic {
            props.set(ENABLE_CUBEMAPS_AUTO, 1);
            if pcc.use_dpm {
                props.set(CUBEMAPS_USE_DPM, 1);
            }
        }
    }

    if let Some(vct) = &scene.vct {
        props.set(VCT_NUM_PROBES, 1);
        props.set(VCT_CONE_DIRS, if vct.num_cones >= 6 { 6 } else { 4 });
        props.set_bool(VCT_ANISOTROPIC, vct.anisotropic);
        props.set_bool(VCT_ENABLE_SPECULAR_SDF_QUALITY, vct.specular_sdf_quality);
        props.set_bool(VCT_AMBIENT_HEMISPHERE, vct.needs_ambient_hemisphere);
        if scene.cubemap_probes.as_ref().is_some_and(|pcc| pcc.rendering) {
            props.set(VCT_DISABLE_SPECULAR, 1);
        }
    }

    if scene.irradiance_field.is_some() {
        props.set(IRRADIANCE_FIELD, 1);
        props.set(VCT_DISABLE_DIFFUSE, 1);
    }
    if scene.irradiance_volume.is_some() {
        props.set(IRRADIANCE_VOLUMES, 1);
    }
    if scene
        .area_light_masks
        .as_ref()
        .is_some_and(|masks| masks.format.num_components() > 2)
    {
        props.set(base::LIGHTS_AREA_TEX_COLOUR, 1);
    }
    props.set_bool(OBB_RESTRAINT_APPROX, config.obb_restraint_approx);
    props.set_bool(OBB_RESTRAINT_LTC, config.obb_restraint_ltc);

    if let Some(planar) = &scene.planar_reflections {
        props.set(HAS_PLANAR_REFLECTIONS, planar.max_active_actors() as i32);
    }
    if config.fine_light_mask {
        props.set(base::FINE_LIGHT_MASK, 1);
    }
}

fn view_row(m: &Mat4, row: usize) -> [f32; 4] {
    [m[(row, 0)], m[(row, 1)], m[(row, 2)], m[(row, 3)]]
}

fn write_camera_block(
    writer: &mut BufferWriter,
    scene: &PassScene,
    layout: &PassLayout,
    view_proj: &Mat4,
) {
    let camera = &scene.camera;
    if !layout.stereo {
        writer.write_mat4(view_proj);
    } else {
        let flip = scene.target.requires_texture_flipping;
        for eye in 0..2 {
            let mut eye_projection = camera.vr_projection(eye);
            if flip {
                flip_projection_y(&mut eye_projection);
            }
            writer.write_mat4(&(eye_projection * camera.vr_view(eye)));
        }
        if layout.forward_plus.is_some() {
            let mut cull_projection = camera.culling_projection;
            if flip {
                flip_projection_y(&mut cull_projection);
            }
            let to_cull_clip =
                cull_projection * camera.culling_view * inverse_affine(&camera.vr_view(0));
            writer.write_mat4(&to_cull_clip);
        }
        let left_to_right = camera.vr.as_ref().map_or(Vec3::zeros(), |vr| vr.left_to_right);
        writer.write_vec3_w(&left_to_right, 0.0);
    }

    if let Some(plane) = &camera.reflection_plane {
        writer.write_vec4(plane);
    }
    if layout.point_caster {
        writer.write_vec3_w(&camera.position, 1.0);
    }
}

fn write_receiver_block(
    writer: &mut BufferWriter,
    scene: &PassScene,
    layout: &PassLayout,
    config: &HlmsConfig,
    view: &Mat4,
) -> Result<()> {
    writer.write_mat4(view);

    if let Some(node) = layout.shadow_node {
        for (_, map) in active_shadow_maps(node, layout.num_shadow_map_lights) {
            writer.write_mat4(&map.view_projection);
            if layout.esm {
                writer.write_f32s(&view_row(&map.view, 2));
            }
            let is_point = map
                .light
                .and_then(|idx| scene.lights.get(idx))
                .is_some_and(|light| light.light_type == LightType::Point);
            let depth_start = if is_point && !layout.esm && layout.reverse_depth {
                map.far
            } else {
                map.near
            };
            writer.write_f32s(&[depth_start, 1.0 / (map.far - map.near), 0.0, 0.0]);

            let texture = node.contiguous_textures.get(map.contiguous_texture).ok_or_else(|| {
                StructuralError::invalid_state(format!(
                    "shadow map uses contiguous texture {} but the node has {}",
                    map.contiguous_texture,
                    node.contiguous_textures.len()
                ))
            })?;
            let (width, height) = (texture.width as f32, texture.height as f32);
            writer.write_f32s(&[1.0 / width, 1.0 / height, width, height]);
        }
    }

    let (width, height) = (scene.target.width as f32, scene.target.height as f32);
    if let Some(baking) = &scene.uv_baking {
        writer.write_f32s(&[
            baking.offset.x * 2.0 / width,
            baking.offset.y * 2.0 / height,
            0.0,
            0.0,
        ]);
    }

    // Cubemaps are left handed.
    let view3 = mat4_linear(view);
    let mut cubemap = view3;
    for row in 0..3 {
        cubemap[(row, 2)] = -cubemap[(row, 2)];
    }
    let inv_cubemap = cubemap.try_inverse().unwrap_or_else(Mat3::identity);
    for row in 0..3 {
        writer.write_f32s(&[
            inv_cubemap[(row, 0)],
            inv_cubemap[(row, 1)],
            inv_cubemap[(row, 2)],
            0.0,
        ]);
    }

    writer.write_f32s(&[
        config.pcc_vct_min_distance,
        config.inv_pcc_vct_distance,
        scene.target.right_eye_viewport_left,
        config.max_spec_ibl_mipmap,
    ]);
    writer.write_f32s(&[width / height, 0.0, 0.0, 0.0]);
    writer.write_f32s(&[1.0 / width, 1.0 / height, width, height]);

    let ambient = &scene.ambient;
    if layout.writes_upper_hemisphere() {
        writer.write_vec3_w(&ambient.upper_hemisphere.xyz(), layout.env_map_scale);
    }
    if layout.writes_lower_hemisphere() {
        writer.write_vec3_w(&ambient.lower_hemisphere, 1.0);
        let dir = (view3 * ambient.hemisphere_dir)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::zeros);
        writer.write_vec3_w(&dir, 1.0);
    }
    match layout.ambient {
        AmbientLightMode::SphericalHarmonics => {
            writer.write_f32s(&ambient.spherical_harmonics);
            writer.pad_f32(1);
        }
        AmbientLightMode::SphericalHarmonicsMonochrome => {
            for coefficient in ambient.spherical_harmonics.iter().step_by(3) {
                writer.write_f32(*coefficient);
            }
            writer.pad_f32(3);
        }
        _ => {}
    }

    if let Some(volume) = layout.irradiance_volume {
        let tex = &volume.texture;
        let (tex_width, tex_height, tex_depth) =
            (tex.width as f32, tex.height as f32, tex.depth as f32);
        let cell = volume.cell_size;
        let origin = volume.origin.component_div(&cell);
        writer.write_f32s(&[
            origin.x / tex_width,
            origin.y,
            origin.z / tex_depth,
            volume.max_power * volume.power_scale,
        ]);
        writer.write_f32s(&[
            1.0 / (tex_width * cell.x),
            1.0 / cell.y,
            1.0 / (tex_depth * cell.z),
            1.0 / tex_height,
        ]);
        writer.write_mat4(&view.try_inverse().unwrap_or_else(Mat4::identity));
    }

    if let Some(node) = layout.shadow_node.filter(|_| layout.pssm_splits > 0) {
        writer.write_f32s(&node.pssm_splits[1..=layout.pssm_splits]);
        if layout.pssm_blend {
            for i in 0..layout.pssm_splits.saturating_sub(1) {
                writer.write_f32(node.pssm_blends.get(i).copied().unwrap_or(0.0));
            }
        }
        if layout.pssm_fade {
            writer.write_f32(node.pssm_fade);
        }
    }
    let pssm_floats = layout.num_pssm_floats();
    writer.pad_f32(align_up(pssm_floats, 4) - pssm_floats);
    Ok(())
}

fn write_light_arrays(
    writer: &mut BufferWriter,
    scene: &PassScene,
    layout: &PassLayout,
    counts: &LightCounts,
    view: &Mat4,
) {
    write_punctual_lights(writer, scene, layout, counts, view);
    write_area_approx_lights(writer, scene, layout, counts, view);
    write_area_ltc_lights(writer, scene, layout, counts, view);
}

/// Stands in for directional slots the static branch reserves but no light fills.
fn blank_light() -> Light {
    Light::directional(Vec3::new(0.0, 0.0, -1.0))
        .with_colour(Vec3::zeros(), Vec3::zeros())
        .with_light_mask(0)
}

/// Light position in view space: directions are rotated, positions transformed.
fn view_space_position(light: &Light, view: &Mat4, view3: &Mat3) -> Vec3 {
    let pos = light.as_4d().xyz();
    if light.light_type == LightType::Directional {
        view3 * pos
    } else {
        transform_affine(view, &pos)
    }
}

fn write_punctual_lights(
    writer: &mut BufferWriter,
    scene: &PassScene,
    layout: &PassLayout,
    counts: &LightCounts,
    view: &Mat4,
) {
    let view3 = mat4_linear(view);

    let Some(node) = layout.shadow_node.filter(|_| layout.num_shadow_map_lights > 0) else {
        // Without shadow maps only directional lights live here.
        let written = counts.real_directional.min(layout.num_directional);
        for light in scene
            .lights
            .iter()
            .filter(|light| light.light_type == LightType::Directional)
            .take(written)
        {
            let pos = view3 * light.as_4d().xyz();
            writer.write_vec3_u32(&pos, light.light_mask);
            writer.write_vec3_u32(&(light.diffuse * light.power_scale), written as u32);
            writer.write_vec3_w(&(light.specular * light.power_scale), 0.0);
        }
        writer.pad_f32((layout.num_directional - written) * 12);
        return;
    };

    // Shadow-casting directional lights first, then the remaining directional
    // lights, then the shadow-casting point and spot lights.
    let blank = blank_light();
    let mut casting = node.casting_lights.iter().flatten().filter_map(|&idx| scene.lights.get(idx));
    let mut non_casting = scene
        .lights
        .iter()
        .enumerate()
        .filter(|(idx, light)| {
            light.light_type == LightType::Directional && !node.is_affected(*idx)
        })
        .map(|(_, light)| light);
    let non_caster_dirs = counts.real_directional.saturating_sub(counts.caster_directional) as u32;

    for i in 0..layout.num_lights {
        let light = if i >= counts.caster_directional && i < layout.num_directional {
            if i < counts.real_directional {
                non_casting.next().unwrap_or(&blank)
            } else {
                &blank
            }
        } else {
            casting.next().unwrap_or(&blank)
        };

        writer.write_vec3_u32(&view_space_position(light, view, &view3), light.light_mask);
        writer.write_vec3_u32(&(light.diffuse * light.power_scale), non_caster_dirs);
        writer.write_vec3_w(&(light.specular * light.power_scale), 0.0);
        writer.write_f32s(&[
            light.attenuation_range,
            light.attenuation_linear,
            light.attenuation_quadratic,
            0.0,
        ]);
        writer.write_vec3_w(&(view3 * light.direction), 1.0 / light.rect_size.x);
        if light.light_type == LightType::AreaApprox {
            let tangent = view3 * (light.orientation * Vec3::x());
            writer.write_vec3_w(&tangent, 1.0 / light.rect_size.y);
        } else {
            let cos_inner = (light.spot_inner * 0.5).cos();
            let cos_outer = (light.spot_outer * 0.5).cos();
            writer.write_f32s(&[
                1.0 / (cos_inner - cos_outer),
                cos_outer,
                light.spot_falloff,
                1.0 / light.rect_size.y,
            ]);
        }
    }
}

/// Top three rows of the inverse of the restraining box in view space.
fn write_obb_restraint(writer: &mut BufferWriter, light: &Light, view: &Mat4) {
    match &light.obb_restraint {
        Some(obb) => writer.write_mat4x3(&inverse_affine(&(view * obb))),
        None => writer.pad_f32(12),
    }
}

fn write_area_approx_lights(
    writer: &mut BufferWriter,
    scene: &PassScene,
    layout: &PassLayout,
    counts: &LightCounts,
    view: &Mat4,
) {
    let view3 = mat4_linear(view);
    let num_mipmaps = scene
        .area_light_masks
        .as_ref()
        .map_or(0.0, |masks| f32::from(masks.num_mipmaps.saturating_sub(1)));
    let spec_mip_factor = num_mipmaps * 2.0 / 0.98;

    // Textured lights first.
    let mut lights: Vec<&Light> = scene
        .lights
        .iter()
        .filter(|light| light.light_type == LightType::AreaApprox)
        .take(counts.real_area_approx)
        .collect();
    lights.sort_by_key(|light| light.texture_light_mask_idx);

    let obb = layout.approx_vars > 7;
    for light in &lights {
        writer.write_vec3_u32(&transform_affine(view, &light.position), light.light_mask);
        writer.write_vec3_w(
            &(light.diffuse * light.power_scale),
            num_mipmaps * (f32::from(light.diffuse_mip_start) / 65535.0),
        );
        writer.write_vec3_w(&(light.specular * light.power_scale), spec_mip_factor);
        writer.write_f32s(&[
            light.attenuation_range,
            light.attenuation_linear,
            light.attenuation_quadratic,
            f32::from(light.texture_light_mask_idx),
        ]);
        writer.write_vec3_w(&(view3 * light.direction), 1.0 / light.rect_size.x);
        writer.write_vec3_w(&(view3 * (light.orientation * Vec3::x())), 1.0 / light.rect_size.y);
        writer.write_f32(if light.double_sided { 1.0 } else { 0.0 });
        writer.write_u32(counts.real_area_approx as u32);
        writer.write_u32(counts.real_area_approx_with_mask as u32);
        writer.write_f32(0.0);
        if obb {
            writer.write_vec3_w(&light.obb_fade_factor, 0.0);
            write_obb_restraint(writer, light, view);
        }
    }
    writer.pad_f32((layout.num_area_approx - lights.len()) * 4 * layout.approx_vars);
}

fn write_area_ltc_lights(
    writer: &mut BufferWriter,
    scene: &PassScene,
    layout: &PassLayout,
    counts: &LightCounts,
    view: &Mat4,
) {
    let view3 = mat4_linear(view);
    let lights: Vec<&Light> = scene
        .lights
        .iter()
        .filter(|light| light.light_type == LightType::AreaLtc)
        .take(counts.real_area_ltc)
        .collect();

    let obb = layout.ltc_vars > 7;
    for light in &lights {
        let pos = transform_affine(view, &light.position);
        writer.write_vec3_u32(&pos, light.light_mask);
        writer.write_vec3_w(&(light.diffuse * light.power_scale), light.attenuation_range);
        writer.write_vec3_w(
            &(light.specular * light.power_scale),
            if light.double_sided { 1.0 } else { 0.0 },
        );

        let half = light.rect_size * 0.5;
        let x_axis = view3 * (light.orientation * Vec3::x()) * half.x;
        let y_axis = view3 * (light.orientation * Vec3::y()) * half.y;
        let corners = [
            pos - x_axis - y_axis,
            pos + x_axis - y_axis,
            pos + x_axis + y_axis,
            pos - x_axis + y_axis,
        ];
        writer.write_vec3_u32(&corners[0], counts.real_area_ltc as u32);
        for (corner, fade) in corners[1..].iter().zip(light.obb_fade_factor.iter()) {
            writer.write_vec3_w(corner, *fade);
        }
        if obb {
            write_obb_restraint(writer, light, view);
        }
    }
    writer.pad_f32((layout.num_area_ltc - lights.len()) * 4 * layout.ltc_vars);
}

/// Each subsystem must write exactly the bytes it declared.
fn fill_provider(
    writer: &mut BufferWriter,
    provider: &dyn PassDataProvider,
    view: &Mat4,
) -> Result<()> {
    let start = writer.bytes_written();
    provider.fill_const_buffer(view, writer);
    let written = writer.bytes_written() - start;
    if written != provider.const_buffer_size() {
        return Err(StructuralError::size_mismatch(format!(
            "{} wrote {written} pass bytes but declared {}",
            provider.name(),
            provider.const_buffer_size()
        )));
    }
    Ok(())
}

fn write_subsystems(writer: &mut BufferWriter, layout: &PassLayout, view: &Mat4) -> Result<()> {
    if let Some(forward_plus) = layout.forward_plus {
        fill_provider(writer, forward_plus.data.as_ref(), view)?;
    }
    if let Some(planar) = layout.planar {
        fill_provider(writer, planar.data.as_ref(), view)?;
    }
    if let Some(pcc) = layout.pcc {
        fill_provider(writer, pcc.data.as_ref(), view)?;
    }
    if let Some(vct) = layout.vct {
        fill_provider(writer, vct.data.as_ref(), view)?;
    }
    if let Some(ifd) = layout.ifd {
        fill_provider(writer, ifd.data.as_ref(), view)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::backend::{BufferId, BufferKind, DummyRenderSystem, GpuBuffer, RenderSystem};
    use crate::hlms::MaterialKind;
    use crate::scene::{Ambient, Camera, PassTarget, ShadowMapDef, UvBaking};
    use crate::types::{PixelFormat, TextureGpu, TextureId};
    use redlilium_hlms_core::math::{Quat, Vec2};
    use redlilium_hlms_core::StructuralErrorKind;

    /// Writes `floats` copies of `value`.
    struct FixedData {
        floats: usize,
        value: f32,
    }

    impl PassDataProvider for FixedData {
        fn name(&self) -> &str {
            "fixed"
        }

        fn const_buffer_size(&self) -> usize {
            self.floats * 4
        }

        fn fill_const_buffer(&self, _view: &Mat4, writer: &mut BufferWriter) {
            for _ in 0..self.floats {
                writer.write_f32(self.value);
            }
        }
    }

    fn hlms(config: HlmsConfig) -> Hlms {
        let rs: Arc<dyn RenderSystem> = Arc::new(DummyRenderSystem::new());
        Hlms::new(MaterialKind::Pbs, config, rs).unwrap()
    }

    fn shadow_scene(num_points: usize) -> PassScene {
        let mut lights = vec![Light::directional(Vec3::new(0.0, -1.0, 0.0))];
        lights.extend((0..num_points).map(|i| Light::point(Vec3::new(i as f32, 1.0, 0.0))));
        let mut shadow_maps = vec![ShadowMapDef::new(0, 0)];
        shadow_maps.extend((0..num_points).map(|i| ShadowMapDef::new(i + 1, 0)));
        let node = ShadowNode {
            contiguous_textures: vec![TextureGpu::new(TextureId(9), "shadows", 2048, 2048)
                .with_format(PixelFormat::Depth32Float)],
            shadow_maps,
            casting_lights: (0..=num_points).map(Some).collect(),
            ..Default::default()
        };
        PassScene::new(Camera::default(), PassTarget::new(800, 600))
            .with_lights(lights)
            .with_shadow_node(node)
    }

    fn with_scene(mut scene: PassScene, edit: impl FnOnce(&mut PassScene)) -> PassScene {
        edit(&mut scene);
        scene
    }

    fn data(floats: usize) -> Arc<dyn PassDataProvider> {
        Arc::new(FixedData { floats, value: 1.0 })
    }

    fn forward_plus() -> ForwardPlus {
        ForwardPlus {
            data: data(4),
            grid: GpuBuffer::new(BufferId(40), BufferKind::Tex, 256),
            light_list: GpuBuffer::new(BufferId(41), BufferKind::Tex, 256),
        }
    }

    fn cubemap_probes(rendering: bool) -> CubemapProbes {
        CubemapProbes {
            data: data(12),
            texture: TextureGpu::new(TextureId(20), "probes", 256, 256),
            automatic: false,
            use_dpm: false,
            rendering,
        }
    }

    fn voxel_cone_tracing() -> VoxelConeTracing {
        VoxelConeTracing {
            data: data(8),
            textures: vec![TextureGpu::new(TextureId(21), "voxels", 64, 64)],
            anisotropic: false,
            num_cones: 4,
            specular_sdf_quality: false,
            needs_ambient_hemisphere: true,
        }
    }

    fn irradiance_field() -> IrradianceField {
        IrradianceField {
            data: data(4),
            irradiance: TextureGpu::new(TextureId(22), "irradiance", 128, 128),
            depth_variance: TextureGpu::new(TextureId(23), "depth_variance", 128, 128),
        }
    }

    fn irradiance_volume() -> IrradianceVolume {
        IrradianceVolume {
            texture: TextureGpu::new(TextureId(24), "volume", 32, 32),
            origin: Vec3::zeros(),
            cell_size: Vec3::new(1.0, 1.0, 1.0),
            max_power: 1.0,
            power_scale: 1.0,
        }
    }

    /// One directional light split in three, with blends and a fade.
    fn pssm_scene() -> PassScene {
        let node = ShadowNode {
            contiguous_textures: vec![TextureGpu::new(TextureId(9), "pssm", 2048, 2048)
                .with_format(PixelFormat::Depth32Float)],
            shadow_maps: (0..3).map(|_| ShadowMapDef::new(0, 0)).collect(),
            casting_lights: vec![Some(0)],
            pssm_splits: vec![0.1, 10.0, 50.0, 200.0],
            pssm_blends: vec![0.1, 0.2],
            pssm_fade: 0.5,
        };
        PassScene::new(Camera::default(), PassTarget::new(800, 600))
            .with_lights(vec![Light::directional(Vec3::new(0.0, -1.0, 0.0))])
            .with_shadow_node(node)
    }

    fn point_caster_scene() -> PassScene {
        let mut scene = shadow_scene(1);
        scene.caster_shadow_map = Some(1);
        scene.target = PassTarget::new(512, 512).depth_only();
        scene
    }

    fn sh_ambient() -> Ambient {
        Ambient {
            spherical_harmonics: [0.5; 27],
            ..Default::default()
        }
    }

    fn area_light(light_type: LightType, rect_size: Vec2) -> Light {
        Light::area(light_type, Vec3::zeros(), Quat::identity(), rect_size)
    }

    fn ambient(upper: Vec4, lower: Vec3) -> Ambient {
        Ambient {
            upper_hemisphere: upper,
            lower_hemisphere: lower,
            ..Default::default()
        }
    }

    // Receivers always write view-proj (64), view (64), cubemap rotation (48),
    // IBL distances (16), aspect ratio (16) and target size (16): 224 bytes.
    #[rstest]
    #[case::empty(PassScene::default(), HlmsConfig::default(), false, 224)]
    #[case::stereo(
        with_scene(PassScene::default(), |s| s.instanced_stereo = true),
        HlmsConfig::default(),
        false,
        224 + 64 + 16
    )]
    #[case::stereo_forward_plus(
        with_scene(PassScene::default(), |s| {
            s.instanced_stereo = true;
            s.forward_plus = Some(forward_plus());
        }),
        HlmsConfig::default(),
        false,
        224 + 64 + 16 + 64 + 16
    )]
    #[case::reflected(
        with_scene(PassScene::default(), |s| {
            s.camera.reflection_plane = Some(Vec4::new(0.0, 1.0, 0.0, 0.0));
        }),
        HlmsConfig::default(),
        false,
        224 + 16
    )]
    #[case::uv_baking(
        with_scene(PassScene::default(), |s| {
            s.uv_baking = Some(UvBaking {
                uv_set: 1,
                lighting_only: false,
                offset: Vec2::new(0.5, 0.5),
            });
        }),
        HlmsConfig::default(),
        false,
        224 + 16
    )]
    #[case::fixed_ambient(
        PassScene::default()
            .with_ambient(ambient(Vec4::new(0.2, 0.2, 0.2, 1.0), Vec3::new(0.2, 0.2, 0.2))),
        HlmsConfig::default(),
        false,
        224 + 16
    )]
    #[case::env_map_scale_only(
        PassScene::default().with_ambient(ambient(Vec4::new(0.0, 0.0, 0.0, 2.0), Vec3::zeros())),
        HlmsConfig::default(),
        false,
        224 + 16
    )]
    #[case::hemisphere(
        PassScene::default()
            .with_ambient(ambient(Vec4::new(0.4, 0.4, 0.4, 1.0), Vec3::new(0.1, 0.1, 0.1))),
        HlmsConfig::default(),
        false,
        224 + 16 + 32
    )]
    #[case::spherical_harmonics(
        PassScene::default().with_ambient(sh_ambient()),
        HlmsConfig::default().with_ambient_light_mode(AmbientLightMode::SphericalHarmonics),
        false,
        224 + 28 * 4
    )]
    #[case::mono_spherical_harmonics(
        PassScene::default().with_ambient(sh_ambient()),
        HlmsConfig::default()
            .with_ambient_light_mode(AmbientLightMode::SphericalHarmonicsMonochrome),
        false,
        224 + 12 * 4
    )]
    #[case::irradiance_volume(
        with_scene(PassScene::default(), |s| s.irradiance_volume = Some(irradiance_volume())),
        HlmsConfig::default(),
        false,
        224 + (8 + 16) * 4
    )]
    #[case::cubemap_probes(
        with_scene(PassScene::default(), |s| s.cubemap_probes = Some(cubemap_probes(false))),
        HlmsConfig::default(),
        false,
        224 + 12 * 4
    )]
    #[case::cubemap_probes_rendering(
        with_scene(PassScene::default(), |s| s.cubemap_probes = Some(cubemap_probes(true))),
        HlmsConfig::default(),
        false,
        224
    )]
    #[case::voxel_cone_tracing(
        with_scene(PassScene::default(), |s| s.vct = Some(voxel_cone_tracing())),
        HlmsConfig::default(),
        false,
        224 + 16 + 32 + 8 * 4
    )]
    #[case::irradiance_field(
        with_scene(PassScene::default(), |s| s.irradiance_field = Some(irradiance_field())),
        HlmsConfig::default(),
        false,
        224 + 4 * 4
    )]
    #[case::directional(
        PassScene::default().with_lights(vec![Light::directional(Vec3::new(0.0, -1.0, 0.0))]),
        HlmsConfig::default(),
        false,
        224 + 48
    )]
    #[case::shadows(shadow_scene(2), HlmsConfig::default(), false, 224 + 3 * 96 + 3 * 96)]
    #[case::shadows_light_buffers(
        shadow_scene(2),
        HlmsConfig::default().with_light_buffers(true),
        false,
        224 + 3 * 96
    )]
    #[case::esm(
        shadow_scene(1),
        HlmsConfig::default().with_shadow_filter(ShadowFilter::ExponentialShadowMaps),
        false,
        224 + 2 * (96 + 16) + 2 * 96
    )]
    // Three splits, two blends and a fade pad to eight floats.
    #[case::pssm(pssm_scene(), HlmsConfig::default(), false, 224 + 3 * 96 + 8 * 4 + 96)]
    #[case::area_lights(
        PassScene::default().with_lights(vec![
            area_light(LightType::AreaApprox, Vec2::new(2.0, 1.0)),
            area_light(LightType::AreaLtc, Vec2::new(1.0, 1.0)),
        ]),
        HlmsConfig::default().with_obb_restraint(true, true),
        false,
        224 + (7 + 4) * 16 + (7 + 3) * 16
    )]
    #[case::area_light_limit(
        PassScene::default().with_lights(vec![
            area_light(LightType::AreaApprox, Vec2::new(2.0, 1.0)),
        ]),
        HlmsConfig::default().with_area_light_limits(2, 2),
        false,
        224 + 2 * 7 * 16
    )]
    #[case::caster(PassScene::default(), HlmsConfig::default(), true, 64 + 16)]
    #[case::point_caster_esm(
        point_caster_scene(),
        HlmsConfig::default().with_shadow_filter(ShadowFilter::ExponentialShadowMaps),
        true,
        64 + 16 + 16 + 16
    )]
    fn test_pass_buffer_bytes(
        #[case] scene: PassScene,
        #[case] config: HlmsConfig,
        #[case] caster: bool,
        #[case] expected: usize,
    ) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut hlms = hlms(config.clone());
        // The writer rejects a pass buffer that was not filled to the computed size.
        let prepared = hlms.prepare_pbs_pass(&scene, caster, false).unwrap();
        assert_eq!(prepared.pass_buffer_bytes, expected);
        assert!(prepared.pass_buffer.size() >= expected);

        let layout = PassLayout::new(&scene, &prepared.properties, caster, &config, true);
        let lights: usize = layout.light_bytes().iter().sum();
        let inline = if config.use_light_buffers { 0 } else { lights };
        assert_eq!(layout.pass_bytes(&scene) + inline, expected);
        let num_light_buffers = if config.use_light_buffers { 3 } else { 0 };
        assert_eq!(prepared.light_buffers.iter().flatten().count(), num_light_buffers);
    }

    #[test]
    fn test_directional_lights_without_shadows() {
        let mut hlms = hlms(HlmsConfig::default());
        let light = Light::directional(Vec3::new(0.0, 0.0, -1.0))
            .with_colour(Vec3::new(1.0, 0.5, 0.25), Vec3::new(1.0, 1.0, 1.0))
            .with_power_scale(2.0)
            .with_light_mask(0xF0);
        let scene = PassScene::default().with_lights(vec![light]);
        let prepared = hlms.prepare_pbs_pass(&scene, false, false).unwrap();
        assert_eq!(prepared.properties.get(AMBIENT_FIXED), 0);

        // view-proj, view, cubemap, distances, aspect, window, pssm padding (none)
        let lights_start = (16 + 16 + 12 + 4 + 4 + 4) as usize;
        let buffer = &prepared.pass_buffer;
        assert_eq!(buffer.read_f32(lights_start + 2), 1.0);
        assert_eq!(buffer.read_u32(lights_start + 3), 0xF0);
        assert_eq!(buffer.read_f32(lights_start + 4), 2.0);
        assert_eq!(buffer.read_f32(lights_start + 5), 1.0);
        assert_eq!(buffer.read_u32(lights_start + 7), 1);
    }

    #[test]
    fn test_ambient_auto_resolution() {
        let black = PassScene::default();
        assert_eq!(resolve_ambient_mode(AmbientLightMode::Auto, &black), AmbientLightMode::None);

        let fixed = PassScene::default().with_ambient(Ambient {
            upper_hemisphere: Vec4::new(0.2, 0.2, 0.2, 1.0),
            lower_hemisphere: Vec3::new(0.2, 0.2, 0.2),
            ..Default::default()
        });
        assert_eq!(resolve_ambient_mode(AmbientLightMode::Auto, &fixed), AmbientLightMode::Fixed);

        let hemi = PassScene::default().with_ambient(Ambient {
            upper_hemisphere: Vec4::new(0.4, 0.4, 0.4, 1.0),
            lower_hemisphere: Vec3::new(0.1, 0.1, 0.1),
            ..Default::default()
        });
        assert_eq!(
            resolve_ambient_mode(AmbientLightMode::Auto, &hemi),
            AmbientLightMode::Hemisphere
        );
        assert_eq!(resolve_ambient_mode(AmbientLightMode::Fixed, &hemi), AmbientLightMode::Fixed);
    }

    #[test]
    fn test_light_array_ceiling() {
        let mut hlms = hlms(HlmsConfig::default());
        let err = hlms.prepare_pbs_pass(&shadow_scene(40), false, false).unwrap_err();
        assert_eq!(err.kind, StructuralErrorKind::BufferCeilingExceeded);
    }

    #[test]
    fn test_caster_pass_layout() {
        let config = HlmsConfig::default().with_shadow_filter(ShadowFilter::ExponentialShadowMaps);
        let mut hlms = hlms(config);
        let mut scene = shadow_scene(1);
        scene.caster_shadow_map = Some(1);
        scene.target = PassTarget::new(512, 512).depth_only();
        if let Some(node) = scene.shadow_node.as_mut() {
            node.shadow_maps[1] = ShadowMapDef::new(1, 0).with_depth_range(0.5, 10.5);
        }
        let prepared = hlms.prepare_pbs_pass(&scene, true, false).unwrap();
        assert_eq!(prepared.properties.get(base::SHADOW_CASTER_POINT), 1);
        assert_eq!(prepared.properties.get(EXPONENTIAL_SHADOW_MAPS), 600);

        // view-proj, camera position, ESM row, depth range
        let buffer = &prepared.pass_buffer;
        assert_eq!(buffer.read_f32(19), 1.0);
        assert_eq!(buffer.read_f32(24), 0.5);
        assert_eq!(buffer.read_f32(25), 0.1);
        assert_eq!(prepared.shadow_sampler, scene.samplers.shadow_map_esm);
    }

    #[test]
    fn test_provider_size_mismatch() {
        struct Liar;
        impl PassDataProvider for Liar {
            fn name(&self) -> &str {
                "liar"
            }
            fn const_buffer_size(&self) -> usize {
                32
            }
            fn fill_const_buffer(&self, _view: &Mat4, writer: &mut BufferWriter) {
                writer.pad_f32(4);
            }
        }

        let mut hlms = hlms(HlmsConfig::default());
        let mut scene = PassScene::default();
        scene.planar_reflections = Some(PlanarReflections {
            data: Arc::new(Liar),
            textures: vec![TextureGpu::new(TextureId(3), "planar", 256, 256)],
        });
        let err = hlms.prepare_pbs_pass(&scene, false, false).unwrap_err();
        assert_eq!(err.kind, StructuralErrorKind::SizeMismatch);
    }

    #[test]
    fn test_subsystem_data_follows_lights() {
        let mut hlms = hlms(HlmsConfig::default());
        let mut scene = PassScene::default();
        scene.planar_reflections = Some(PlanarReflections {
            data: Arc::new(FixedData { floats: 8, value: 7.0 }),
            textures: vec![TextureGpu::new(TextureId(3), "planar", 256, 256)],
        });
        let prepared = hlms.prepare_pbs_pass(&scene, false, false).unwrap();
        assert_eq!(prepared.properties.get(HAS_PLANAR_REFLECTIONS), 1);

        let planar_start = 16 + 16 + 12 + 4 + 4 + 4;
        assert_eq!(prepared.pass_buffer.read_f32(planar_start), 7.0);
        assert_eq!(prepared.pass_buffer.read_f32(planar_start + 7), 7.0);
        assert!(prepared.tex_unit_slot_start > hlms.reserved_tex_slots());
    }
}
