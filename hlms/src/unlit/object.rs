//! Per-draw packing of Unlit renderables.
//!
//! Each draw appends `[material slot, shadow bias bits, identity projection, 0]`
//! to the instance const buffer and its world-view-projection matrix to the
//! tex buffer, so both cursors advance in lockstep.

use redlilium_hlms_core::math::mat4_rows;
use redlilium_hlms_core::{Result, StructuralError};

use super::hash::{ANIMATION_MATRICES_TEX_SLOT, MATERIAL_BUFFER_SLOT};
use crate::command_buffer::{Command, CommandBuffer, ShaderStages};
use crate::datablock::MaterialData;
use crate::hlms::Hlms;
use crate::renderable::QueuedRenderable;
use crate::types::same_set;

impl Hlms {
    pub(crate) fn fill_unlit_buffers(
        &mut self,
        queued: &QueuedRenderable<'_>,
        caster: bool,
        type_changed: bool,
        commands: &mut CommandBuffer,
    ) -> Result<u32> {
        let renderable = queued.renderable;
        let rs = self.render_system.clone();
        let render_system = rs.as_ref();

        if type_changed {
            let pass_buffer = &self.prepared_pass()?.pass_buffer;
            commands.push(Command::ShaderBuffer {
                stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
                slot: 0,
                buffer: pass_buffer.id(),
                offset: 0,
                size: pass_buffer.size(),
            });

            self.memo.reset();
            self.objects.bind_instance_buffer_if_room(commands, 4);
            self.objects.rebind_tex_buffer(render_system, commands, false, 0)?;

            let datablock = self.datablocks.require(renderable.datablock)?;
            self.listener
                .hlms_type_changed(caster, commands, datablock, self.reserved_tex_slots);
        }

        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| StructuralError::invalid_state("no pass has been prepared"))?;
        let datablock = self.datablocks.require(renderable.datablock)?;
        if !matches!(datablock.material, MaterialData::Unlit(_)) {
            return Err(StructuralError::invalid_params(format!(
                "datablock {} is not an Unlit material",
                datablock.name
            )));
        }
        let slot = datablock.pool_slot().ok_or_else(|| {
            StructuralError::invalid_state(format!("datablock {} has no pool slot", datablock.name))
        })?;

        if !caster && self.memo.pool != Some(slot.pool) {
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
            if let Some(matrices) = self.pools.extra_buffer(slot.pool) {
                commands.push(Command::TexBuffer {
                    stages: ShaderStages::VERTEX,
                    slot: ANIMATION_MATRICES_TEX_SLOT,
                    buffer: matrices.id(),
                    offset: 0,
                    size: matrices.size(),
                });
            }
            self.memo.pool = Some(slot.pool);
        }

        let exceeds_tex = self.objects.exceeds_tex(16);
        if self.objects.exceeds_const(4) || exceeds_tex {
            self.objects.map_next_const_buffer(render_system, commands)?;
            if exceeds_tex {
                self.objects.map_next_tex_buffer(render_system, commands, 16)?;
            } else {
                self.objects.rebind_tex_buffer(render_system, commands, true, 16)?;
            }
        }

        let identity_projection = renderable.use_identity_projection;
        let bias = datablock.shadow_constant_bias * prepared.scene.camera.constant_bias_scale;
        self.objects
            .push_const(&[slot.slot, bias.to_bits(), u32::from(identity_projection), 0])?;

        let view_proj_idx = if prepared.scene.instanced_stereo {
            4
        } else {
            usize::from(identity_projection)
        };
        let world_view_proj = prepared.view_proj[view_proj_idx] * queued.movable.world;
        self.objects.push_tex(&mat4_rows(&world_view_proj))?;

        if !caster {
            let tex_unit = prepared.tex_unit_slot_start;
            let textures = datablock.textures_desc_set().cloned();
            if !same_set(&self.memo.textures, &textures) {
                if let Some(set) = &textures {
                    commands.push(Command::Textures {
                        slot: tex_unit,
                        hazardous_cubemap: None,
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
                    self.memo.samplers = samplers;
                }
            }
        }

        Ok((self.objects.const_cursor() >> 2) as u32 - 1)
    }
}
