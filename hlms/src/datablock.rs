//! Materials ("datablocks"), their arena and the GPU pools holding their records.
//!
//! A [`Datablock`] carries the state every kind shares (pipeline blocks,
//! alpha test, shadow bias, textures and samplers) plus the kind-specific
//! [`MaterialData`]. Textures are assigned per texture *type*; baking turns
//! them into shared descriptor sets and the per-type descriptor indices the
//! shader properties refer to.
//!
//! Each datablock owns one slot in a [`MaterialPools`] const buffer. Dirty
//! datablocks are re-baked and re-uploaded once per pass.

use std::sync::Arc;

use bitflags::bitflags;
use redlilium_hlms_core::{BufferWriter, IdString, Result, StructuralError};

use crate::backend::{GpuBuffer, RenderSystem};
use crate::hlms::MaterialKind;
use crate::pbs::PbsMaterial;
use crate::terra::TerraMaterial;
use crate::types::{
    Blendblock, CompareFunction, DescriptorSetSampler, DescriptorSetTexture, Macroblock,
    SamplerId, TextureGpu,
};
use crate::unlit::UnlitMaterial;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatablockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(pub u32);

/// A datablock's slot in a material pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolSlot {
    pub pool: PoolId,
    pub slot: u32,
}

bitflags! {
    /// What needs to be rebuilt before the datablock can be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u8 {
        const TEXTURES = 1 << 0;
        const SAMPLERS = 1 << 1;
        const CONST_BUFFER = 1 << 2;
    }
}

impl Default for DirtyFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Kind-specific material parameters.
#[derive(Debug, Clone)]
pub enum MaterialData {
    Pbs(PbsMaterial),
    Unlit(UnlitMaterial),
    Terra(TerraMaterial),
}

impl MaterialData {
    pub fn kind(&self) -> MaterialKind {
        match self {
            Self::Pbs(_) => MaterialKind::Pbs,
            Self::Unlit(_) => MaterialKind::Unlit,
            Self::Terra(_) => MaterialKind::Terra,
        }
    }

    fn num_texture_types(&self) -> usize {
        match self {
            Self::Pbs(_) => crate::pbs::NUM_TEXTURE_TYPES,
            Self::Unlit(_) => crate::unlit::NUM_TEXTURE_TYPES,
            Self::Terra(_) => crate::terra::NUM_TEXTURE_TYPES,
        }
    }
}

/// A material instance.
#[derive(Debug, Clone)]
pub struct Datablock {
    pub name: IdString,
    /// `[regular, shadow caster]`.
    pub macroblock: [Macroblock; 2],
    /// `[regular, shadow caster]`.
    pub blendblock: [Blendblock; 2],
    pub alpha_test: CompareFunction,
    pub alpha_test_threshold: f32,
    pub alpha_test_shadow_caster_only: bool,
    pub shadow_constant_bias: f32,
    pub material: MaterialData,

    textures: Vec<Option<TextureGpu>>,
    samplers: Vec<Option<SamplerId>>,
    texture_to_descriptor: Vec<Option<u8>>,
    textures_desc_set: Option<Arc<DescriptorSetTexture>>,
    samplers_desc_set: Option<Arc<DescriptorSetSampler>>,
    /// Descriptor index of the reflection cubemap, if any.
    cubemap_idx_in_desc_set: Option<u16>,
    dirty: DirtyFlags,
    slot: Option<PoolSlot>,
}

impl Datablock {
    pub fn new(name: &str, material: MaterialData) -> Self {
        let num_types = material.num_texture_types();
        Self {
            name: IdString::new(name),
            macroblock: [Macroblock::new(0); 2],
            blendblock: [Blendblock::new(0); 2],
            alpha_test: CompareFunction::AlwaysPass,
            alpha_test_threshold: 0.5,
            alpha_test_shadow_caster_only: false,
            shadow_constant_bias: 0.01,
            material,
            textures: vec![None; num_types],
            samplers: vec![None; num_types],
            texture_to_descriptor: vec![None; num_types],
            textures_desc_set: None,
            samplers_desc_set: None,
            cubemap_idx_in_desc_set: None,
            dirty: DirtyFlags::CONST_BUFFER,
            slot: None,
        }
    }

    pub fn with_macroblocks(mut self, regular: Macroblock, caster: Macroblock) -> Self {
        self.macroblock = [regular, caster];
        self
    }

    pub fn with_blendblocks(mut self, regular: Blendblock, caster: Blendblock) -> Self {
        self.blendblock = [regular, caster];
        self
    }

    pub fn with_alpha_test(mut self, func: CompareFunction, threshold: f32) -> Self {
        self.alpha_test = func;
        self.alpha_test_threshold = threshold;
        self
    }

    pub fn with_shadow_constant_bias(mut self, bias: f32) -> Self {
        self.shadow_constant_bias = bias;
        self
    }

    pub fn kind(&self) -> MaterialKind {
        self.material.kind()
    }

    pub fn has_alpha_test(&self) -> bool {
        self.alpha_test != CompareFunction::AlwaysPass
    }

    /// Assign (or clear) the texture of a texture type.
    pub fn set_texture(&mut self, texture_type: usize, texture: Option<TextureGpu>) -> Result<()> {
        let entry = self.textures.get_mut(texture_type).ok_or_else(|| {
            StructuralError::invalid_params(format!(
                "texture type {texture_type} out of range for a {:?} material",
                self.material.kind()
            ))
        })?;
        *entry = texture;
        self.dirty |= DirtyFlags::TEXTURES | DirtyFlags::CONST_BUFFER;
        Ok(())
    }

    pub fn set_sampler(&mut self, texture_type: usize, sampler: SamplerId) -> Result<()> {
        let entry = self.samplers.get_mut(texture_type).ok_or_else(|| {
            StructuralError::invalid_params(format!("sampler type {texture_type} out of range"))
        })?;
        *entry = Some(sampler);
        self.dirty |= DirtyFlags::SAMPLERS | DirtyFlags::CONST_BUFFER;
        Ok(())
    }

    pub fn texture(&self, texture_type: usize) -> Option<&TextureGpu> {
        self.textures.get(texture_type).and_then(Option::as_ref)
    }

    /// Index in the baked texture set of the texture of `texture_type`.
    pub fn index_to_descriptor_texture(&self, texture_type: usize) -> Option<u8> {
        self.texture_to_descriptor.get(texture_type).copied().flatten()
    }

    /// Samplers are baked parallel to textures.
    pub fn index_to_descriptor_sampler(&self, texture_type: usize) -> Option<u8> {
        self.index_to_descriptor_texture(texture_type)
    }

    pub fn textures_desc_set(&self) -> Option<&Arc<DescriptorSetTexture>> {
        self.textures_desc_set.as_ref()
    }

    pub fn samplers_desc_set(&self) -> Option<&Arc<DescriptorSetSampler>> {
        self.samplers_desc_set.as_ref()
    }

    pub fn cubemap_idx_in_desc_set(&self) -> Option<u16> {
        self.cubemap_idx_in_desc_set
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
    }

    /// True while hashing has to wait for baked descriptor sets.
    pub fn has_dirty_descriptors(&self) -> bool {
        self.dirty
            .intersects(DirtyFlags::TEXTURES | DirtyFlags::SAMPLERS)
    }

    pub fn pool_slot(&self) -> Option<PoolSlot> {
        self.slot
    }

    /// Rebuild the descriptor sets from the per-type textures.
    ///
    /// Identical textures share one descriptor entry. `reflection_type` names
    /// the cubemap type whose index is recorded as a potential hazard.
    fn bake_descriptor_sets(&mut self, reflection_type: Option<usize>) {
        let mut textures: Vec<TextureGpu> = Vec::new();
        let mut samplers: Vec<SamplerId> = Vec::new();
        self.cubemap_idx_in_desc_set = None;

        for ty in 0..self.textures.len() {
            self.texture_to_descriptor[ty] = match &self.textures[ty] {
                Some(texture) => {
                    let idx = match textures.iter().position(|t| t.id == texture.id) {
                        Some(idx) => idx,
                        None => {
                            textures.push(texture.clone());
                            samplers.push(self.samplers[ty].unwrap_or(SamplerId(0)));
                            textures.len() - 1
                        }
                    };
                    if Some(ty) == reflection_type {
                        self.cubemap_idx_in_desc_set = Some(idx as u16);
                    }
                    Some(idx as u8)
                }
                None => None,
            };
        }

        if textures.is_empty() {
            self.textures_desc_set = None;
            self.samplers_desc_set = None;
        } else {
            self.textures_desc_set = Some(Arc::new(DescriptorSetTexture::new(textures)));
            self.samplers_desc_set = Some(Arc::new(DescriptorSetSampler::new(samplers)));
        }
        self.dirty
            .remove(DirtyFlags::TEXTURES | DirtyFlags::SAMPLERS);
    }

    /// Bytes of this datablock's record in its material pool.
    fn write_gpu_record(&self, writer: &mut BufferWriter) {
        match &self.material {
            MaterialData::Pbs(material) => material.write_gpu_record(self, writer),
            MaterialData::Unlit(material) => material.write_gpu_record(self, writer),
            MaterialData::Terra(material) => material.write_gpu_record(self, writer),
        }
    }

    #[cfg(test)]
    pub(crate) fn baked(mut self) -> Self {
        self.bake_descriptor_sets(reflection_texture_type(self.kind()));
        self
    }

    /// Descriptor indices of every texture type, `0xFFFF` when unused.
    pub(crate) fn descriptor_indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.texture_to_descriptor
            .iter()
            .map(|idx| idx.map_or(u16::MAX, u16::from))
    }
}

/// Index of the reflection cubemap type of a kind.
fn reflection_texture_type(kind: MaterialKind) -> Option<usize> {
    match kind {
        MaterialKind::Pbs => Some(crate::pbs::PbsTexture::Reflection as usize),
        MaterialKind::Terra => Some(crate::terra::TerraTexture::Reflection as usize),
        MaterialKind::Unlit => None,
    }
}

/// One material buffer and its free slots.
#[derive(Debug)]
struct MaterialPool {
    buffer: GpuBuffer,
    extra: Option<GpuBuffer>,
    free_slots: Vec<u32>,
}

/// Const buffers holding per-material records, `slots_per_pool` per buffer.
#[derive(Debug)]
pub struct MaterialPools {
    kind: MaterialKind,
    record_size: usize,
    extra_record_size: usize,
    slots_per_pool: u32,
    pools: Vec<MaterialPool>,
}

impl MaterialPools {
    pub fn new(kind: MaterialKind, slots_per_pool: u32) -> Self {
        let (record_size, extra_record_size) = match kind {
            MaterialKind::Pbs => (crate::pbs::MATERIAL_SIZE_IN_GPU, 0),
            MaterialKind::Unlit => (
                crate::unlit::MATERIAL_SIZE_IN_GPU,
                crate::unlit::ANIMATION_MATRICES_SIZE_IN_GPU,
            ),
            MaterialKind::Terra => (crate::terra::MATERIAL_SIZE_IN_GPU, 0),
        };
        Self {
            kind,
            record_size,
            extra_record_size,
            slots_per_pool: slots_per_pool.max(1),
            pools: Vec::new(),
        }
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Take a free slot, creating a new pool when all are full.
    pub fn request_slot(&mut self, render_system: &dyn RenderSystem) -> Result<PoolSlot> {
        if let Some((idx, pool)) = self
            .pools
            .iter_mut()
            .enumerate()
            .find(|(_, pool)| !pool.free_slots.is_empty())
        {
            if let Some(slot) = pool.free_slots.pop() {
                return Ok(PoolSlot {
                    pool: PoolId(idx as u32),
                    slot,
                });
            }
        }

        let size = self.record_size * self.slots_per_pool as usize;
        let buffer = render_system.create_const_buffer(size, "hlms_material_buffer")?;
        let extra = if self.extra_record_size > 0 {
            Some(render_system.create_tex_buffer(
                self.extra_record_size * self.slots_per_pool as usize,
                "hlms_material_extra_buffer",
            )?)
        } else {
            None
        };
        log::debug!(
            "{:?}: new material pool #{} ({} slots of {} bytes)",
            self.kind,
            self.pools.len(),
            self.slots_per_pool,
            self.record_size
        );
        let free_slots: Vec<u32> = (1..self.slots_per_pool).rev().collect();
        self.pools.push(MaterialPool {
            buffer,
            extra,
            free_slots,
        });
        Ok(PoolSlot {
            pool: PoolId(self.pools.len() as u32 - 1),
            slot: 0,
        })
    }

    pub fn release_slot(&mut self, slot: PoolSlot) {
        if let Some(pool) = self.pools.get_mut(slot.pool.0 as usize) {
            pool.free_slots.push(slot.slot);
        }
    }

    pub fn buffer(&self, pool: PoolId) -> Option<&GpuBuffer> {
        self.pools.get(pool.0 as usize).map(|p| &p.buffer)
    }

    /// Per-pool tex buffer (Unlit texture animation matrices).
    pub fn extra_buffer(&self, pool: PoolId) -> Option<&GpuBuffer> {
        self.pools.get(pool.0 as usize).and_then(|p| p.extra.as_ref())
    }

    fn upload(&self, datablock: &Datablock) -> Result<()> {
        let slot = datablock.slot.ok_or_else(|| {
            StructuralError::invalid_state(format!("datablock {} has no pool slot", datablock.name))
        })?;
        let pool = self.pools.get(slot.pool.0 as usize).ok_or_else(|| {
            StructuralError::invalid_state(format!("pool {:?} does not exist", slot.pool))
        })?;
        {
            let offset = self.record_size * slot.slot as usize;
            let mut mapped = pool.buffer.map(offset, self.record_size)?;
            let mut writer = BufferWriter::new(&mut mapped);
            datablock.write_gpu_record(&mut writer);
            writer.finish(self.record_size, "material record")?;
        }
        if let (Some(extra), MaterialData::Unlit(material)) = (&pool.extra, &datablock.material) {
            let offset = self.extra_record_size * slot.slot as usize;
            let mut mapped = extra.map(offset, self.extra_record_size)?;
            let mut writer = BufferWriter::new(&mut mapped);
            material.write_animation_matrices(&mut writer);
            writer.finish(self.extra_record_size, "unlit animation matrices")?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.pools.clear();
    }
}

/// Owner of every datablock of one [`Hlms`](crate::Hlms).
#[derive(Debug, Default)]
pub struct DatablockArena {
    entries: Vec<Option<Datablock>>,
    free: Vec<u32>,
}

impl DatablockArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, datablock: Datablock) -> DatablockId {
        match self.free.pop() {
            Some(idx) => {
                self.entries[idx as usize] = Some(datablock);
                DatablockId(idx)
            }
            None => {
                self.entries.push(Some(datablock));
                DatablockId(self.entries.len() as u32 - 1)
            }
        }
    }

    pub fn remove(&mut self, id: DatablockId) -> Option<Datablock> {
        let removed = self.entries.get_mut(id.0 as usize).and_then(Option::take);
        if removed.is_some() {
            self.free.push(id.0);
        }
        removed
    }

    pub fn get(&self, id: DatablockId) -> Option<&Datablock> {
        self.entries.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: DatablockId) -> Option<&mut Datablock> {
        self.entries.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Resolve `id` or fail with a descriptive error.
    pub fn require(&self, id: DatablockId) -> Result<&Datablock> {
        self.get(id)
            .ok_or_else(|| StructuralError::invalid_params(format!("unknown datablock {id:?}")))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (DatablockId, &Datablock)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(idx, e)| e.as_ref().map(|d| (DatablockId(idx as u32), d)))
    }

    /// Assign a pool slot to a freshly inserted datablock.
    pub(crate) fn assign_slot(&mut self, id: DatablockId, slot: PoolSlot) {
        if let Some(datablock) = self.get_mut(id) {
            datablock.slot = Some(slot);
        }
    }

    /// Bake descriptor sets and upload records of every dirty datablock.
    pub(crate) fn upload_dirty(&mut self, pools: &MaterialPools) -> Result<usize> {
        let mut uploaded = 0;
        for datablock in self.entries.iter_mut().flatten() {
            if datablock.dirty.is_empty() {
                continue;
            }
            if datablock.has_dirty_descriptors() {
                datablock.bake_descriptor_sets(reflection_texture_type(datablock.kind()));
            }
            pools.upload(datablock)?;
            datablock.dirty = DirtyFlags::empty();
            uploaded += 1;
        }
        Ok(uploaded)
    }
}
