//! Extension hooks.
//!
//! [`HlmsListener`] is the only open extension point of the material system.
//! Every method has a no-op default, so a listener overrides just the hooks
//! it needs. Pass-buffer hooks must agree with each other:
//! [`HlmsListener::prepare_pass_buffer`] writes exactly the bytes
//! [`HlmsListener::get_pass_buffer_size`] declared, and the pass packer
//! fails with a size mismatch otherwise.

use redlilium_hlms_core::math::Vec4;
use redlilium_hlms_core::{
    BufferWriter, DescBindingKind, IdString, PropertyStore, Result, RootLayout, StructuralError,
};

use crate::backend::{GpuBuffer, RenderSystem, UnmapOptions};
use crate::cache::{PassCache, ShaderCacheEntry};
use crate::command_buffer::{Command, CommandBuffer, ShaderStages};
use crate::datablock::Datablock;
use crate::renderable::{QueuedRenderable, Renderable};
use crate::scene::PassScene;
use crate::types::{Blendblock, Macroblock};
use crate::worker::WorkerContext;

/// Where the object packer just wrote a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectDataContext {
    pub instance_idx: u32,
    /// Index of the const buffer the draw landed in, within this frame.
    pub const_buffer_idx: usize,
    pub caster: bool,
}

pub trait HlmsListener: Send + Sync {
    /// Extra bytes appended to the pass buffer. Must be a multiple of 16.
    fn get_pass_buffer_size(
        &self,
        _scene: &PassScene,
        _caster: bool,
        _dual_paraboloid: bool,
    ) -> usize {
        0
    }

    fn prepare_pass_buffer(
        &self,
        _scene: &PassScene,
        _caster: bool,
        _dual_paraboloid: bool,
        _writer: &mut BufferWriter,
    ) {
    }

    /// Last chance to edit pass properties before the pass cache lookup.
    fn prepare_pass_hash(
        &self,
        _scene: &PassScene,
        _caster: bool,
        _dual_paraboloid: bool,
        _properties: &mut PropertyStore,
    ) {
    }

    /// Texture slots this listener binds in `hlms_type_changed`. Must depend
    /// only on `properties`.
    fn get_num_extra_pass_textures(&self, _properties: &PropertyStore, _caster: bool) -> u16 {
        0
    }

    fn calculate_hash_for_pre_create(&self, _renderable: &Renderable, _ctx: &mut WorkerContext) {}

    /// Called with the merged properties before a permutation is finalized.
    /// Only derive properties from existing ones here.
    fn properties_merged_pre_generation_step(&self, _pass: &PassCache, _ctx: &mut WorkerContext) {}

    /// Adjust the root layout. Must depend only on `properties`.
    fn setup_root_layout(&self, _layout: &mut RootLayout, _properties: &PropertyStore) {}

    fn shader_cache_entry_created(&mut self, _entry: &ShaderCacheEntry) {}

    /// The previous draw used another material kind. `tex_unit` is the first
    /// slot reserved through `get_num_extra_pass_textures`.
    fn hlms_type_changed(
        &mut self,
        _caster: bool,
        _commands: &mut CommandBuffer,
        _datablock: &Datablock,
        _tex_unit: u16,
    ) {
    }

    /// Called after the object packer wrote a draw.
    fn object_data_filled(
        &mut self,
        _render_system: &dyn RenderSystem,
        _object: ObjectDataContext,
        _queued: &QueuedRenderable<'_>,
        _commands: &mut CommandBuffer,
    ) -> Result<()> {
        Ok(())
    }

    fn apply_strong_macroblock_rules(&self, _macroblock: &mut Macroblock) {}

    fn apply_strong_blendblock_rules(&self, _blendblock: &mut Blendblock) {}

    fn pre_command_buffer_execution(&mut self, _commands: &mut CommandBuffer) {}

    fn frame_ended(&mut self) {}
}

/// Listener that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultListener;

impl HlmsListener for DefaultListener {}

pub const USE_ARBITRARY_COLOUR: IdString = IdString::from_static("use_arbitrary_colour");
pub const PER_OBJECT_DATA_SLOT_PROPERTY: IdString = IdString::from_static("MyPerObjectDataSlot");

/// Default const buffer slot of the per-object colour buffer.
pub const PER_OBJECT_DATA_SLOT: u16 = 4;

const FLOATS_PER_OBJECT: usize = 4;
const MAX_BUFFER_SIZE: usize = 65536;

/// Uploads one colour per draw into a const buffer that mirrors the object
/// const ring: one colour buffer per object const buffer, indexed by the
/// instance index.
///
/// Renderables without [`Renderable::custom_colour`] still get a (white)
/// record so instance indices stay aligned.
#[derive(Debug)]
pub struct PerObjectColourListener {
    slot: u16,
    buffers: Vec<GpuBuffer>,
    current: Option<usize>,
}

impl Default for PerObjectColourListener {
    fn default() -> Self {
        Self::new(PER_OBJECT_DATA_SLOT)
    }
}

impl PerObjectColourListener {
    pub fn new(slot: u16) -> Self {
        Self {
            slot,
            buffers: Vec::new(),
            current: None,
        }
    }

    pub fn slot(&self) -> u16 {
        self.slot
    }

    pub fn current_buffer(&self) -> Option<&GpuBuffer> {
        self.current.and_then(|idx| self.buffers.get(idx))
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    fn bind(&self, commands: &mut CommandBuffer) {
        if let Some(buffer) = self.current_buffer() {
            commands.push(Command::ShaderBuffer {
                stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
                slot: self.slot,
                buffer: buffer.id(),
                offset: 0,
                size: buffer.size(),
            });
        }
    }

    fn unmap_current(&self) {
        if let Some(buffer) = self.current_buffer() {
            buffer.unmap(UnmapOptions::KeepPersistent);
        }
    }
}

impl HlmsListener for PerObjectColourListener {
    fn calculate_hash_for_pre_create(&self, renderable: &Renderable, ctx: &mut WorkerContext) {
        if renderable.custom_colour.is_some() {
            ctx.set(USE_ARBITRARY_COLOUR, 1);
            ctx.set(PER_OBJECT_DATA_SLOT_PROPERTY, i32::from(self.slot));
        }
    }

    fn setup_root_layout(&self, layout: &mut RootLayout, properties: &PropertyStore) {
        if properties.get(USE_ARBITRARY_COLOUR) != 0 {
            let range = layout.range_mut(0, DescBindingKind::ConstBuffer);
            range.end = range.end.max(self.slot + 1);
        }
    }

    fn hlms_type_changed(
        &mut self,
        caster: bool,
        commands: &mut CommandBuffer,
        _datablock: &Datablock,
        _tex_unit: u16,
    ) {
        if !caster {
            self.bind(commands);
        }
    }

    fn object_data_filled(
        &mut self,
        render_system: &dyn RenderSystem,
        object: ObjectDataContext,
        queued: &QueuedRenderable<'_>,
        commands: &mut CommandBuffer,
    ) -> Result<()> {
        if object.caster {
            return Ok(());
        }

        if self.current != Some(object.const_buffer_idx) {
            self.unmap_current();
            while self.buffers.len() <= object.const_buffer_idx {
                let size = MAX_BUFFER_SIZE.min(render_system.max_const_buffer_size());
                self.buffers
                    .push(render_system.create_const_buffer(size, "per_object_colour")?);
            }
            self.current = Some(object.const_buffer_idx);
            self.bind(commands);
        }

        let buffer = self
            .current_buffer()
            .ok_or_else(|| StructuralError::invalid_state("per-object colour buffer missing"))?;
        let offset = object.instance_idx as usize * FLOATS_PER_OBJECT * 4;
        if offset + FLOATS_PER_OBJECT * 4 > buffer.size() {
            return Err(StructuralError::ceiling_exceeded(format!(
                "per-object colour of instance {} is past the end of a {} byte buffer",
                object.instance_idx,
                buffer.size()
            )));
        }

        let colour = queued
            .renderable
            .custom_colour
            .unwrap_or_else(|| Vec4::new(1.0, 1.0, 1.0, 1.0));
        let mut mapped = buffer.map(offset, FLOATS_PER_OBJECT * 4)?;
        let mut writer = BufferWriter::new(&mut mapped);
        writer.write_vec4(&colour);
        writer.finish(FLOATS_PER_OBJECT * 4, "per-object colour")?;
        Ok(())
    }

    fn pre_command_buffer_execution(&mut self, _commands: &mut CommandBuffer) {
        self.unmap_current();
    }

    fn frame_ended(&mut self) {
        self.current = None;
    }
}
