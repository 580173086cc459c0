//! Per-draw packing of terrain cells.
//!
//! A cell is one 16-word record in the instance const buffer (see
//! [`TerrainCell::gpu_record`](super::TerrainCell::gpu_record)). Nothing goes
//! to the tex buffer, so the instance index is simply the record index.

use redlilium_hlms_core::{Result, StructuralError};

use crate::command_buffer::{Command, CommandBuffer, ShaderStages};
use crate::datablock::MaterialData;
use crate::hlms::Hlms;
use crate::pbs::hash::MATERIAL_BUFFER_SLOT;
use crate::pbs::properties::HAS_PLANAR_REFLECTIONS;
use crate::renderable::QueuedRenderable;
use crate::types::same_set;

const CELL_WORDS: usize = 16;

impl Hlms {
    pub(crate) fn fill_terra_buffers(
        &mut self,
        queued: &QueuedRenderable<'_>,
        caster: bool,
        type_changed: bool,
        commands: &mut CommandBuffer,
    ) -> Result<u32> {
        let renderable = queued.renderable;
        let cell = renderable.terrain.as_ref().ok_or_else(|| {
            StructuralError::invalid_params("the terra hlms can only render terrain cells")
        })?;
        if type_changed {
            self.bind_pass_resources(renderable.datablock, caster, commands)?;
        }

        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| StructuralError::invalid_state("no pass has been prepared"))?;
        let datablock = self.datablocks.require(renderable.datablock)?;
        if !matches!(datablock.material, MaterialData::Terra(_)) {
            return Err(StructuralError::invalid_params(format!(
                "datablock {} is not a terra material",
                datablock.name
            )));
        }
        let slot = datablock.pool_slot().ok_or_else(|| {
            StructuralError::invalid_state(format!("datablock {} has no pool slot", datablock.name))
        })?;

        if (!caster || datablock.has_alpha_test()) && self.memo.pool != Some(slot.pool) {
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

        let terrain_textures = Some(cell.terrain.textures.clone());
        if !same_set(&self.memo.terrain_textures, &terrain_textures) {
            commands.push(Command::Textures {
                slot: 0,
                hazardous_cubemap: None,
                set: cell.terrain.textures.clone(),
            });
            self.memo.terrain_textures = terrain_textures;
        }

        let render_system = self.render_system.as_ref();
        if self.objects.exceeds_const(CELL_WORDS) {
            self.objects.map_next_const_buffer(render_system, commands)?;
        }
        self.objects.push_const(&cell.gpu_record())?;

        if !caster {
            if prepared.properties.is_set(HAS_PLANAR_REFLECTIONS)
                && renderable.custom_parameter & 0x80 != 0
            {
                if let Some(planar) = &prepared.scene.planar_reflections {
                    let actor = renderable.custom_parameter & 0x7F;
                    if self.memo.planar_actor != Some(actor) {
                        let texture = planar.textures.get(usize::from(actor)).ok_or_else(|| {
                            StructuralError::invalid_state(format!(
                                "planar reflection actor {actor} has no texture ({} active)",
                                planar.textures.len()
                            ))
                        })?;
                        commands.push(Command::Texture {
                            slot: prepared.tex_unit_slot_start - 1,
                            texture: texture.id,
                            sampler: Some(prepared.scene.samplers.planar_reflections),
                        });
                        self.memo.planar_actor = Some(actor);
                    }
                }
            }

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

        Ok((self.objects.const_cursor() / CELL_WORDS) as u32 - 1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::DummyRenderSystem;
    use crate::config::HlmsConfig;
    use crate::datablock::{Datablock, DatablockId};
    use crate::hlms::MaterialKind;
    use crate::renderable::{MovableData, Renderable};
    use crate::scene::PassScene;
    use crate::terra::hash::TERRAIN_SAMPLER_SLOT;
    use crate::terra::{TerraMaterial, TerraTexture, TerrainCell, TerrainInfo};
    use crate::types::{DescriptorSetTexture, TextureGpu, TextureId};
    use crate::worker::WorkerContext;
    use crate::ShaderCacheEntry;

    fn terrain(first_id: u32) -> Arc<TerrainInfo> {
        let maps = (0..3)
            .map(|i| {
                let id = first_id + i;
                TextureGpu::new(TextureId(id), &format!("terrain_map{id}"), 128, 128)
            })
            .collect();
        Arc::new(TerrainInfo::new(128, 128, Arc::new(DescriptorSetTexture::new(maps))))
    }

    fn cell(terrain: &Arc<TerrainInfo>, id: DatablockId, x: i32, z: i32) -> Renderable {
        let mut cell = TerrainCell::new(terrain.clone(), true);
        cell.set_origin(x, z, 32, 32, 0);
        Renderable::new(id, Vec::new()).with_terrain(cell)
    }

    struct Fixture {
        hlms: Hlms,
        datablock: DatablockId,
        entry: Arc<ShaderCacheEntry>,
        commands: CommandBuffer,
    }

    impl Fixture {
        fn new(caster: bool) -> Self {
            let _ = env_logger::builder().is_test(true).try_init();
            let rs = Arc::new(DummyRenderSystem::new());
            let mut hlms = Hlms::new(MaterialKind::Terra, HlmsConfig::default(), rs).unwrap();
            let material = MaterialData::Terra(TerraMaterial::default());
            let mut datablock = Datablock::new("ground", material);
            datablock
                .set_texture(
                    TerraTexture::Diffuse as usize,
                    Some(TextureGpu::new(TextureId(40), "ground_diffuse", 512, 512)),
                )
                .unwrap();
            let datablock = hlms.create_datablock(datablock).unwrap();
            let pass = hlms.prepare_pass_hash(&PassScene::default(), caster, false).unwrap();

            let mut renderable = cell(&terrain(1), datablock, 0, 0);
            let mut ctx = WorkerContext::new();
            renderable.set_hashes(hlms.calculate_hash_for(&mut ctx, &renderable).unwrap());
            let entry = hlms.get_material(&pass, &renderable, caster).unwrap();
            Self {
                hlms,
                datablock,
                entry,
                commands: CommandBuffer::new(),
            }
        }

        fn draw(&mut self, renderable: &Renderable, caster: bool, last_hash: u32) -> u32 {
            let entry = self.entry.clone();
            let movable = MovableData::default();
            let queued = QueuedRenderable::new(renderable, &movable);
            self.hlms
                .fill_buffers_for(&entry, &queued, caster, last_hash, &mut self.commands)
                .unwrap()
        }

        fn terrain_texture_binds(&self) -> usize {
            self.commands
                .iter()
                .filter(|cmd| matches!(cmd, Command::Textures { slot: 0, .. }))
                .count()
        }
    }

    #[test]
    fn test_cells_write_one_record_each() {
        let mut fx = Fixture::new(false);
        let terrain = terrain(1);
        let hash = fx.entry.hash;

        assert_eq!(fx.draw(&cell(&terrain, fx.datablock, 0, 0), false, 0), 0);
        let second = cell(&terrain, fx.datablock, 32, 64);
        assert_eq!(fx.draw(&second, false, hash), 1);

        let objects = fx.hlms.object_buffers();
        assert_eq!(objects.const_cursor(), 32);
        assert!(objects.current_tex_buffer().is_none());
        let consts = objects.current_const_buffer().unwrap();
        assert_eq!(consts.read_u32(16 + 4), 32);
        assert_eq!(consts.read_u32(16 + 5), 64);
        assert_eq!(consts.read_u32(16), second.terrain.as_ref().unwrap().vertices_per_line);
    }

    #[test]
    fn test_type_change_binds_terrain_samplers() {
        let mut fx = Fixture::new(false);
        let renderable = cell(&terrain(1), fx.datablock, 0, 0);
        fx.draw(&renderable, false, 0);

        assert_eq!(fx.commands.count_shader_buffers(0), 1);
        assert_eq!(fx.commands.count_shader_buffers(MATERIAL_BUFFER_SLOT), 1);
        let samplers = fx
            .commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::Samplers { slot, set } if *slot == TERRAIN_SAMPLER_SLOT => Some(set.len()),
                _ => None,
            })
            .unwrap();
        assert_eq!(samplers, 2);
    }

    #[test]
    fn test_terrain_maps_memoised_per_terrain() {
        let mut fx = Fixture::new(false);
        let first = terrain(1);
        let other = terrain(10);
        let hash = fx.entry.hash;

        fx.draw(&cell(&first, fx.datablock, 0, 0), false, 0);
        fx.draw(&cell(&first, fx.datablock, 32, 0), false, hash);
        assert_eq!(fx.terrain_texture_binds(), 1);

        fx.draw(&cell(&other, fx.datablock, 0, 0), false, hash);
        assert_eq!(fx.terrain_texture_binds(), 2);
    }

    #[test]
    fn test_material_textures_after_pass_textures() {
        let mut fx = Fixture::new(false);
        let renderable = cell(&terrain(1), fx.datablock, 0, 0);
        fx.draw(&renderable, false, 0);

        let start = fx.hlms.tex_unit_slot_start().unwrap();
        assert!(start >= 3);
        assert!(fx
            .commands
            .iter()
            .any(|cmd| matches!(cmd, Command::Textures { slot, .. } if *slot == start)));
    }

    #[test]
    fn test_caster_skips_material() {
        let mut fx = Fixture::new(true);
        let renderable = cell(&terrain(1), fx.datablock, 0, 0);
        assert_eq!(fx.draw(&renderable, true, 0), 0);

        assert_eq!(fx.commands.count_shader_buffers(MATERIAL_BUFFER_SLOT), 0);
        assert!(!fx
            .commands
            .iter()
            .any(|cmd| {
                matches!(cmd, Command::Samplers { slot, .. } if *slot == TERRAIN_SAMPLER_SLOT)
            }));
    }

    #[test]
    fn test_plain_renderable_rejected() {
        let mut fx = Fixture::new(false);
        let plain = Renderable::new(fx.datablock, Vec::new());
        let entry = fx.entry.clone();
        let movable = MovableData::default();
        let err = fx
            .hlms
            .fill_buffers_for(
                &entry,
                &QueuedRenderable::new(&plain, &movable),
                false,
                0,
                &mut fx.commands,
            )
            .unwrap_err();
        assert_eq!(err.kind, redlilium_hlms_core::StructuralErrorKind::InvalidParams);
    }
}
