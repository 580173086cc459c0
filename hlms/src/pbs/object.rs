//! Per-draw packing of PBS renderables.
//!
//! Every draw appends four `u32` to the instance const buffer:
//!
//! | word | content |
//! |------|---------|
//! | 0 | material slot (9 bits), plus the vec4 offset of the draw's tex data for animated draws |
//! | 1 | shadow constant bias (`f32` bits) |
//! | 2 | light mask |
//! | 3 | planar reflection actor |
//!
//! Non-animated draws write world (and world-view outside caster passes) to
//! the tex buffer at a stride the shader derives from the draw id, so the
//! const cursor is re-synced to the tex cursor before each of them.

use std::sync::Arc;

use redlilium_hlms_core::math::{concatenate_affine, mat4_rows, mat4x3_rows};
use redlilium_hlms_core::{Result, StructuralError};

use super::hash::{
    pass_texture_units, LIGHT_BUFFER_SLOT, MANUAL_PROBE_SLOT, MATERIAL_BUFFER_SLOT,
    POSE_BUFFER_SLOT,
};
use super::properties::{ENVPROBE_MAP, USE_PARALLAX_CORRECT_CUBEMAPS, USE_PLANAR_REFLECTIONS};
use crate::backend::GpuBuffer;
use crate::cache::ShaderCacheEntry;
use crate::command_buffer::{Command, CommandBuffer, ShaderStages};
use crate::datablock::{DatablockId, MaterialData};
use crate::hlms::{Hlms, MaterialKind};
use crate::renderable::QueuedRenderable;
use crate::scene::PassScene;
use crate::terra::hash::TERRAIN_SAMPLER_SLOT;
use crate::types::{same_set, DescriptorSetSampler, SamplerId, TextureGpu};

/// A pass-level resource bound when the material kind changes.
enum PassBinding<'a> {
    Buffer(&'a GpuBuffer),
    Texture(&'a TextureGpu, Option<SamplerId>),
}

/// Resolve a pass texture register to the scene resource behind it.
fn pass_binding<'a>(
    scene: &'a PassScene,
    shadow_sampler: SamplerId,
    name: &str,
) -> Option<PassBinding<'a>> {
    let samplers = &scene.samplers;
    let texture = |tex: Option<&'a TextureGpu>, sampler: Option<SamplerId>| {
        tex.map(|t| PassBinding::Texture(t, sampler))
    };

    if let Some(idx) = name.strip_prefix("texShadowMap") {
        let idx: usize = idx.parse().ok()?;
        let node = scene.shadow_node.as_ref()?;
        return texture(node.contiguous_textures.get(idx), Some(shadow_sampler));
    }

    let [decal_diffuse, decal_normals, decal_emissive] = scene.active_decal_textures();
    match name {
        "f3dGrid" => scene.forward_plus.as_ref().map(|f| PassBinding::Buffer(&f.grid)),
        "f3dLightList" => scene.forward_plus.as_ref().map(|f| PassBinding::Buffer(&f.light_list)),
        "gBuf_normals" => texture(scene.prepass.textures.first(), None),
        "gBuf_shadowRoughness" => texture(scene.prepass.textures.get(1), None),
        "gBuf_depthTexture" => texture(
            scene.prepass.msaa_depth.as_ref().or(scene.depth_texture.as_ref()),
            None,
        ),
        "ssrTexture" => texture(scene.prepass.ssr.as_ref(), None),
        "depthTextureNoMsaa" => texture(scene.depth_texture_no_msaa.as_ref(), None),
        "refractionMap" => texture(scene.refractions.as_ref(), None),
        "irradianceVolume" => texture(
            scene.irradiance_volume.as_ref().map(|v| &v.texture),
            Some(samplers.trilinear),
        ),
        "vctProbe" | "vctProbeX" | "vctProbeY" | "vctProbeZ" => {
            let idx = ["vctProbe", "vctProbeX", "vctProbeY", "vctProbeZ"]
                .iter()
                .position(|n| *n == name)?;
            texture(scene.vct.as_ref()?.textures.get(idx), Some(samplers.trilinear))
        }
        "ifdColour" => texture(
            scene.irradiance_field.as_ref().map(|i| &i.irradiance),
            Some(samplers.trilinear),
        ),
        "ifdDepth" => texture(
            scene.irradiance_field.as_ref().map(|i| &i.depth_variance),
            Some(samplers.trilinear),
        ),
        "areaLightMasks" => {
            texture(scene.area_light_masks.as_ref(), Some(samplers.area_light_masks))
        }
        "ltcMatrix" => texture(scene.ltc_matrix.as_ref(), Some(samplers.trilinear)),
        "decalsDiffuseTex" => texture(decal_diffuse, Some(samplers.decals)),
        "decalsNormalsTex" => texture(decal_normals, Some(samplers.decals)),
        "decalsEmissiveTex" => texture(decal_emissive, Some(samplers.decals)),
        _ => None,
    }
}

/// Samplers of the terrain normal and shadow maps. Without separate samplers
/// every texture unit needs its own entry.
fn terrain_samplers(scene: &PassScene, separate_samplers: bool) -> Arc<DescriptorSetSampler> {
    let sampler = scene.samplers.area_light_masks;
    let samplers = if separate_samplers { vec![sampler] } else { vec![sampler; 2] };
    Arc::new(DescriptorSetSampler::new(samplers))
}

impl Hlms {
    /// Bind the pass buffer, light buffers and pass textures after a draw of
    /// another material kind. Shared by PBS and Terra.
    pub(crate) fn bind_pass_resources(
        &mut self,
        datablock: DatablockId,
        caster: bool,
        commands: &mut CommandBuffer,
    ) -> Result<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| StructuralError::invalid_state("no pass has been prepared"))?;

        let pass_buffer = &prepared.pass_buffer;
        commands.push(Command::ShaderBuffer {
            stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
            slot: 0,
            buffer: pass_buffer.id(),
            offset: 0,
            size: pass_buffer.size(),
        });
        if self.kind == MaterialKind::Terra && !caster {
            commands.push(Command::Samplers {
                slot: TERRAIN_SAMPLER_SLOT,
                set: terrain_samplers(&prepared.scene, self.render_system.has_separate_samplers()),
            });
        }
        for (idx, buffer) in prepared.light_buffers.iter().enumerate() {
            if let Some(buffer) = buffer {
                commands.push(Command::ShaderBuffer {
                    stages: ShaderStages::PIXEL,
                    slot: LIGHT_BUFFER_SLOT + idx as u16,
                    buffer: buffer.id(),
                    offset: 0,
                    size: buffer.size(),
                });
            }
        }

        let scene = &prepared.scene;
        let units = pass_texture_units(&prepared.properties, self.reserved_tex_slots);
        for (name, unit) in &units.registers {
            let slot = *unit as u16;
            match pass_binding(scene, prepared.shadow_sampler, name) {
                Some(PassBinding::Buffer(buffer)) => commands.push(Command::TexBuffer {
                    stages: ShaderStages::PIXEL,
                    slot,
                    buffer: buffer.id(),
                    offset: 0,
                    size: buffer.size(),
                }),
                Some(PassBinding::Texture(texture, sampler)) => commands.push(Command::Texture {
                    slot,
                    texture: texture.id,
                    sampler,
                }),
                None => {
                    return Err(StructuralError::invalid_state(format!(
                        "pass texture {name} at unit {slot} has no resource in the scene"
                    )))
                }
            }
        }
        if let (Some(unit), Some(pcc)) = (units.cubemap, scene.active_cubemap_probes()) {
            commands.push(Command::Texture {
                slot: unit as u16,
                texture: pcc.texture.id,
                sampler: Some(scene.samplers.trilinear),
            });
        }

        self.memo.reset();
        if self.kind == MaterialKind::Terra {
            // Cells carry everything in their const record.
            self.objects.bind_instance_buffer_if_room(commands, 16);
        } else {
            self.objects.bind_instance_buffer_if_room(commands, 4);
            self.objects
                .rebind_tex_buffer(self.render_system.as_ref(), commands, false, 0)?;
        }

        let datablock = self.datablocks.require(datablock)?;
        self.listener
            .hlms_type_changed(caster, commands, datablock, units.listener_start as u16);
        Ok(())
    }

    pub(crate) fn fill_pbs_buffers(
        &mut self,
        entry: &ShaderCacheEntry,
        queued: &QueuedRenderable<'_>,
        caster: bool,
        type_changed: bool,
        commands: &mut CommandBuffer,
    ) -> Result<u32> {
        let renderable = queued.renderable;
        if type_changed {
            self.bind_pass_resources(renderable.datablock, caster, commands)?;
        }

        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| StructuralError::invalid_state("no pass has been prepared"))?;
        let datablock = self.datablocks.require(renderable.datablock)?;
        let MaterialData::Pbs(material) = &datablock.material else {
            return Err(StructuralError::invalid_params(format!(
                "datablock {} is not a PBS material",
                datablock.name
            )));
        };
        let slot = datablock.pool_slot().ok_or_else(|| {
            StructuralError::invalid_state(format!("datablock {} has no pool slot", datablock.name))
        })?;
        let reads_material = !caster || datablock.has_alpha_test();

        // Casters without alpha test never read the material.
        if reads_material && self.memo.pool != Some(slot.pool) {
            let buffer = self.pools.buffer(slot.pool).ok_or_else(|| {
                StructuralError::invalid_state(format!(
                    "material pool {:?} does not exist",
                    slot.pool
                ))
            })?;
            commands.push(Command::ShaderBuffer {
                stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
                slot: MATERIAL_BUFFER_SLOT,
                buffer: buffer.id(),
                offset: 0,
                size: buffer.size(),
            });
            self.memo.pool = Some(slot.pool);
        }

        let props = &entry.properties;
        if props.is_set(USE_PARALLAX_CORRECT_CUBEMAPS) && props.is_set(ENVPROBE_MAP) {
            let probe = material
                .manual_probe
                .as_ref()
                .filter(|p| self.memo.manual_probe != Some(p.id()));
            if let Some(probe) = probe {
                commands.push(Command::ShaderBuffer {
                    stages: ShaderStages::PIXEL,
                    slot: MANUAL_PROBE_SLOT,
                    buffer: probe.id(),
                    offset: 0,
                    size: probe.size(),
                });
                self.memo.manual_probe = Some(probe.id());
            }
        }

        let skeletal = renderable.has_skeleton_animation();
        let pose = renderable.pose.as_ref();
        let animated = skeletal || pose.is_some();
        let draw_stride = 16 * (1 + usize::from(!caster));
        let pose_floats = pose.map_or(0, |p| 4 + p.weights_num_floats());
        let tex_floats = if skeletal {
            12 * renderable.bone_matrices.len() + pose_floats
        } else if pose.is_some() {
            pose_floats + 12 + 16
        } else {
            draw_stride
        };

        if !animated && self.objects.current_const_buffer().is_some() {
            let draw = self.objects.tex_cursor() >> (2 + usize::from(!caster));
            self.objects.set_const_cursor(draw);
        }

        let render_system = self.render_system.as_ref();
        let exceeds_tex = self.objects.exceeds_tex(tex_floats);
        if self.objects.exceeds_const(4) || exceeds_tex {
            self.objects.map_next_const_buffer(render_system, commands)?;
            if exceeds_tex {
                self.objects.map_next_tex_buffer(render_system, commands, tex_floats)?;
            } else {
                self.objects.rebind_tex_buffer(render_system, commands, true, tex_floats)?;
            }
        }

        let material_slot = slot.slot & 0x1FF;
        let index_word = if animated {
            ((self.objects.tex_cursor() >> 2) as u32) << 9 | material_slot
        } else {
            material_slot
        };
        let bias = datablock.shadow_constant_bias * prepared.scene.camera.constant_bias_scale;
        self.objects.push_const(&[
            index_word,
            bias.to_bits(),
            queued.movable.light_mask,
            u32::from(renderable.custom_parameter & 0x7F),
        ])?;

        let world = &queued.movable.world;
        let mut floats = Vec::with_capacity(tex_floats);
        for bone in &renderable.bone_matrices {
            floats.extend_from_slice(&mat4x3_rows(bone));
        }
        if let Some(pose) = pose {
            let flags = u32::from(pose.half_precision) | u32::from(pose.normals) << 1;
            floats.extend([
                f32::from_bits(pose.base_vertex),
                f32::from_bits(pose.num_vertices),
                f32::from_bits(pose.num_poses() as u32),
                f32::from_bits(flags),
            ]);
            floats.extend_from_slice(&pose.weights);
            floats.resize(floats.len() + pose.weights_num_floats() - pose.weights.len(), 0.0);
            commands.push(Command::ShaderBuffer {
                stages: ShaderStages::VERTEX,
                slot: POSE_BUFFER_SLOT,
                buffer: pose.buffer.id(),
                offset: 0,
                size: pose.buffer.size(),
            });
        }
        if !skeletal {
            let world_view = concatenate_affine(&prepared.view, world);
            if pose.is_some() {
                floats.extend_from_slice(&mat4x3_rows(world));
                floats.extend_from_slice(&mat4_rows(&world_view));
            } else {
                floats.extend_from_slice(&mat4_rows(world));
                if !caster {
                    floats.extend_from_slice(&mat4_rows(&world_view));
                }
            }
        }
        debug_assert_eq!(floats.len(), tex_floats);
        self.objects.push_tex(&floats)?;
        if animated {
            self.objects.align_tex_cursor(draw_stride);
        }

        if reads_material {
            let tex_unit = prepared.tex_unit_slot_start;
            let textures = datablock.textures_desc_set().cloned();
            if !same_set(&self.memo.textures, &textures) {
                if let Some(set) = &textures {
                    commands.push(Command::Textures {
                        slot: tex_unit,
                        hazardous_cubemap: datablock
                            .cubemap_idx_in_desc_set()
                            .map(|idx| tex_unit + idx),
                        set: set.clone(),
                    });
                    if !render_system.has_separate_samplers() {
                        if let Some(samplers) = datablock.samplers_desc_set() {
                            commands.push(Command::Samplers {
                                slot: tex_unit,
                                set: samplers.clone(),
                            });
                        }
                    }
                }
                self.memo.textures = textures;
            }

            let samplers = datablock.samplers_desc_set().cloned();
            if render_system.has_separate_samplers() && !same_set(&self.memo.samplers, &samplers) {
                if let Some(set) = &samplers {
                    commands.push(Command::Samplers {
                        slot: tex_unit,
                        set: set.clone(),
                    });
                }
                self.memo.samplers = samplers;
            }
        }

        if !caster && props.is_set(USE_PLANAR_REFLECTIONS) {
            if let Some(planar) = &prepared.scene.planar_reflections {
                let actor = renderable.custom_parameter & 0x7F;
                if self.memo.planar_actor != Some(actor) {
                    let texture = planar.textures.get(usize::from(actor)).ok_or_else(|| {
                        StructuralError::invalid_state(format!(
                            "planar reflection actor {actor} has no texture ({} active)",
                            planar.textures.len()
                        ))
                    })?;
                    // Planar reflections take the last pass texture unit.
                    commands.push(Command::Texture {
                        slot: prepared.tex_unit_slot_start - 1,
                        texture: texture.id,
                        sampler: Some(prepared.scene.samplers.planar_reflections),
                    });
                    self.memo.planar_actor = Some(actor);
                }
            }
        }

        Ok((self.objects.const_cursor() >> 2) as u32 - 1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{BufferId, BufferKind, DummyRenderSystem};
    use crate::config::HlmsConfig;
    use crate::datablock::Datablock;
    use crate::hlms::MaterialKind;
    use crate::pbs::PbsMaterial;
    use crate::renderable::{MovableData, PoseAnimation, Renderable, VertexElement, VertexSemantic};
    use crate::types::CompareFunction;
    use crate::worker::WorkerContext;
    use redlilium_hlms_core::math::{Mat4, Vec3};

    struct Fixture {
        hlms: Hlms,
        renderable: Renderable,
        entry: Arc<ShaderCacheEntry>,
        commands: CommandBuffer,
    }

    impl Fixture {
        fn new(
            caster: bool,
            datablock: Datablock,
            build: impl FnOnce(Renderable) -> Renderable,
        ) -> Self {
            let rs = Arc::new(DummyRenderSystem::new());
            let mut hlms = Hlms::new(MaterialKind::Pbs, HlmsConfig::default(), rs).unwrap();
            let id = hlms.create_datablock(datablock).unwrap();
            let pass = hlms.prepare_pass_hash(&PassScene::default(), caster, false).unwrap();

            let mut renderable = build(Renderable::new(
                id,
                vec![
                    VertexElement::new(VertexSemantic::Position, 3),
                    VertexElement::new(VertexSemantic::Normal, 3),
                    VertexElement::tex_coord(0, 2),
                ],
            ));
            let mut ctx = WorkerContext::new();
            renderable.set_hashes(hlms.calculate_hash_for(&mut ctx, &renderable).unwrap());
            let entry = hlms.get_material(&pass, &renderable, caster).unwrap();
            Self {
                hlms,
                renderable,
                entry,
                commands: CommandBuffer::new(),
            }
        }

        fn plain(caster: bool) -> Self {
            let datablock = Datablock::new("plain", MaterialData::Pbs(PbsMaterial::default()));
            Self::new(caster, datablock, |r| r)
        }

        fn draw(
            &mut self,
            renderable: &Renderable,
            movable: &MovableData,
            caster: bool,
            last_hash: u32,
        ) -> u32 {
            let entry = self.entry.clone();
            let queued = QueuedRenderable::new(renderable, movable);
            self.hlms
                .fill_buffers_for(&entry, &queued, caster, last_hash, &mut self.commands)
                .unwrap()
        }
    }

    #[test]
    fn test_instance_indices_and_world_readback() {
        let mut fx = Fixture::plain(false);
        let renderable = fx.renderable.clone();
        let movable = MovableData::new(Mat4::new_translation(&Vec3::new(5.0, 6.0, 7.0)));
        let hash = fx.entry.hash;

        assert_eq!(fx.draw(&renderable, &movable, false, 0), 0);
        assert_eq!(fx.draw(&renderable, &movable, false, hash), 1);
        assert_eq!(fx.draw(&renderable, &movable, false, hash), 2);

        assert_eq!(fx.commands.count_shader_buffers(0), 1);
        assert_eq!(fx.commands.count_shader_buffers(MATERIAL_BUFFER_SLOT), 1);

        let objects = fx.hlms.object_buffers();
        let tex = objects.current_tex_buffer().unwrap();
        assert_eq!(tex.read_f32(64 + 3), 5.0);
        assert_eq!(tex.read_f32(64 + 16 + 7), 6.0);
        let consts = objects.current_const_buffer().unwrap();
        assert_eq!(consts.read_u32(8 + 2), u32::MAX);
    }

    #[test]
    fn test_caster_skips_material_buffer() {
        let mut fx = Fixture::plain(true);
        let renderable = fx.renderable.clone();
        let movable = MovableData::default();

        assert_eq!(fx.draw(&renderable, &movable, true, 0), 0);
        assert_eq!(fx.draw(&renderable, &movable, true, fx.entry.hash), 1);
        assert_eq!(fx.commands.count_shader_buffers(MATERIAL_BUFFER_SLOT), 0);
        assert_eq!(fx.hlms.object_buffers().tex_cursor(), 32);
    }

    #[test]
    fn test_alpha_tested_caster_reads_material() {
        let datablock = Datablock::new("cutout", MaterialData::Pbs(PbsMaterial::default()))
            .with_alpha_test(CompareFunction::Greater, 0.5)
            .with_shadow_constant_bias(0.25);
        let mut fx = Fixture::new(true, datablock, |r| r);
        let renderable = fx.renderable.clone();

        fx.draw(&renderable, &MovableData::default(), true, 0);
        assert_eq!(fx.commands.count_shader_buffers(MATERIAL_BUFFER_SLOT), 1);
        let consts = fx.hlms.object_buffers().current_const_buffer().unwrap();
        assert_eq!(f32::from_bits(consts.read_u32(1)), 0.25);
    }

    #[test]
    fn test_skeletal_draw_encodes_tex_offset() {
        let mut fx = Fixture::plain(false);
        let plain = fx.renderable.clone();
        let skinned = {
            let mut renderable = plain.clone().with_bones(vec![Mat4::identity(); 3]);
            let mut ctx = WorkerContext::new();
            renderable.set_hashes(fx.hlms.calculate_hash_for(&mut ctx, &renderable).unwrap());
            renderable
        };
        let movable = MovableData::default();
        let hash = fx.entry.hash;

        assert_eq!(fx.draw(&plain, &movable, false, 0), 0);
        assert_eq!(fx.draw(&skinned, &movable, false, hash), 1);
        // 32 + 36 floats, realigned to 96: the next plain draw is instance 3.
        assert_eq!(fx.hlms.object_buffers().tex_cursor(), 96);
        assert_eq!(fx.draw(&plain, &movable, false, hash), 3);

        let consts = fx.hlms.object_buffers().current_const_buffer().unwrap();
        let slot = fx.hlms.datablock(plain.datablock).unwrap().pool_slot().unwrap().slot;
        assert_eq!(consts.read_u32(4), (8 << 9) | slot);
    }

    #[test]
    fn test_pose_binds_pose_buffer() {
        let pose = PoseAnimation {
            weights: vec![0.5, 0.25],
            half_precision: false,
            normals: true,
            buffer: GpuBuffer::new(BufferId(900), BufferKind::Tex, 4096),
            base_vertex: 12,
            num_vertices: 40,
        };
        let mut fx = Fixture::new(
            false,
            Datablock::new("morph", MaterialData::Pbs(PbsMaterial::default())),
            |r| r.with_pose(pose),
        );
        let renderable = fx.renderable.clone();

        fx.draw(&renderable, &MovableData::default(), false, 0);
        assert_eq!(fx.commands.count_shader_buffers(POSE_BUFFER_SLOT), 1);

        let tex = fx.hlms.object_buffers().current_tex_buffer().unwrap();
        assert_eq!(tex.read_u32(0), 12);
        assert_eq!(tex.read_u32(1), 40);
        assert_eq!(tex.read_u32(2), 2);
        assert_eq!(tex.read_u32(3), 2);
        assert_eq!(tex.read_f32(5), 0.25);
        assert_eq!(tex.read_f32(6), 0.0);
        // 4 + 4 + 28 floats, realigned to the next 32.
        assert_eq!(fx.hlms.object_buffers().tex_cursor(), 64);
    }
}
