//! The per-kind material system.
//!
//! One [`Hlms`] exists per [`MaterialKind`]. It owns the kind's datablocks,
//! the pass/renderable/shader caches and every GPU buffer ring written while
//! rendering. The frame loop is:
//!
//! 1. [`Hlms::prepare_pass_hash`] once per pass,
//! 2. per visible renderable [`Hlms::calculate_hash_for`] (only when the
//!    renderable or its datablock changed), [`Hlms::get_material`] and
//!    [`Hlms::fill_buffers_for`],
//! 3. [`Hlms::pre_command_buffer_execution`] and
//!    [`Hlms::post_command_buffer_execution`] around command replay,
//! 4. [`Hlms::frame_ended`].
//!
//! Kind-specific packing lives in the `pbs`, `unlit` and `terra` modules as
//! further `impl Hlms` blocks.

use std::sync::Arc;

use redlilium_hlms_core::math::Mat4;
use redlilium_hlms_core::{PropertyStore, Result, RootLayout, StructuralError};

use crate::backend::{BufferId, GpuBuffer, RenderSystem, UnmapOptions};
use crate::buffers::{ObjectBuffers, PassBufferRing};
use crate::cache::{kind_id_from_hash, HlmsCaches, PassCache, ShaderCacheEntry};
use crate::command_buffer::CommandBuffer;
use crate::config::HlmsConfig;
use crate::datablock::{
    Datablock, DatablockArena, DatablockId, DirtyFlags, MaterialData, MaterialPools, PoolId,
};
use crate::listener::{DefaultListener, HlmsListener, ObjectDataContext};
use crate::pass::LightCounts;
use crate::properties::{base, pieces, pso};
use crate::renderable::{QueuedRenderable, Renderable, VertexSemantic};
use crate::scene::PassScene;
use crate::types::{DescriptorSetSampler, DescriptorSetTexture, SamplerId};
use crate::worker::{ShaderStage, WorkerContext};
use crate::{pbs, terra, unlit};

/// The material families. Closed set, dispatched with `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    Pbs,
    Unlit,
    Terra,
}

impl MaterialKind {
    pub const ALL: [MaterialKind; 3] = [Self::Pbs, Self::Unlit, Self::Terra];

    /// Id stored in the top bits of renderable and shader hashes. Never 0, so
    /// a zero hash always means "not hashed yet".
    pub fn id(self) -> u32 {
        match self {
            Self::Pbs => 1,
            Self::Unlit => 3,
            Self::Terra => 7,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pbs => "pbs",
            Self::Unlit => "unlit",
            Self::Terra => "terra",
        }
    }

    /// Texture units taken before the first pass texture.
    pub fn default_reserved_tex_slots(self) -> u16 {
        match self {
            Self::Pbs => 1,
            Self::Unlit => 2,
            Self::Terra => 3,
        }
    }

    /// Largest pass buffer, light arrays excluded.
    pub fn pass_buffer_ceiling(self) -> usize {
        match self {
            Self::Pbs | Self::Terra => 16384,
            Self::Unlit => 2048,
        }
    }
}

/// State captured by `prepare_pass_hash` and read by every draw of the pass.
#[derive(Debug, Clone)]
pub(crate) struct PreparedPass {
    pub hash: u32,
    pub caster: bool,
    pub scene: PassScene,
    pub properties: PropertyStore,
    pub pass_buffer: GpuBuffer,
    /// Bytes written to `pass_buffer`.
    pub pass_buffer_bytes: usize,
    /// Light arrays, when they live outside the pass buffer.
    pub light_buffers: [Option<GpuBuffer>; 3],
    pub view: Mat4,
    /// Unlit only: the projections a draw may pick from.
    pub view_proj: [Mat4; 5],
    /// First texture unit of per-material textures.
    pub tex_unit_slot_start: u16,
    pub shadow_sampler: SamplerId,
    pub light_counts: LightCounts,
}

/// Last bound per-draw state. Binds are skipped while it matches.
#[derive(Debug, Default)]
pub(crate) struct BindMemo {
    pub textures: Option<Arc<DescriptorSetTexture>>,
    pub samplers: Option<Arc<DescriptorSetSampler>>,
    pub pool: Option<PoolId>,
    pub manual_probe: Option<BufferId>,
    pub planar_actor: Option<u8>,
    pub terrain_textures: Option<Arc<DescriptorSetTexture>>,
}

impl BindMemo {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub struct Hlms {
    pub(crate) kind: MaterialKind,
    pub(crate) config: HlmsConfig,
    pub(crate) reserved_tex_slots: u16,
    pub(crate) render_system: Arc<dyn RenderSystem>,
    pub(crate) listener: Box<dyn HlmsListener>,
    pub(crate) caches: HlmsCaches,
    pub(crate) datablocks: DatablockArena,
    pub(crate) pools: MaterialPools,
    pub(crate) pass_ring: PassBufferRing,
    pub(crate) light_rings: [PassBufferRing; 3],
    pub(crate) objects: ObjectBuffers,
    pub(crate) ctx: WorkerContext,
    pub(crate) prepared: Option<PreparedPass>,
    pub(crate) memo: BindMemo,
}

impl std::fmt::Debug for Hlms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hlms")
            .field("kind", &self.kind)
            .field("render_system", &self.render_system.name())
            .field("datablocks", &self.datablocks.len())
            .field("passes", &self.caches.num_passes())
            .field("renderables", &self.caches.num_renderables())
            .field("shaders", &self.caches.num_shaders())
            .finish()
    }
}

impl Hlms {
    pub fn new(
        kind: MaterialKind,
        config: HlmsConfig,
        render_system: Arc<dyn RenderSystem>,
    ) -> Result<Self> {
        if config.const_buffer_size < 16 || config.tex_buffer_size < 256 {
            return Err(StructuralError::invalid_params(format!(
                "{}: object buffers of {} / {} bytes are too small",
                kind.name(),
                config.const_buffer_size,
                config.tex_buffer_size
            )));
        }
        let reserved_tex_slots = config
            .reserved_tex_slots
            .unwrap_or_else(|| kind.default_reserved_tex_slots());
        let objects = ObjectBuffers::new(
            render_system.as_ref(),
            config.const_buffer_size,
            config.tex_buffer_size,
        );
        let pass_ring_size = match kind {
            MaterialKind::Unlit => kind.pass_buffer_ceiling(),
            MaterialKind::Pbs | MaterialKind::Terra => {
                let lights = pbs::pass::light_buffer_ceilings(&config);
                kind.pass_buffer_ceiling() + lights.iter().sum::<usize>()
            }
        };
        let [light0, light1, light2] = pbs::pass::light_buffer_ceilings(&config);

        log::info!(
            "{} hlms on {}: {} reserved texture slots, light buffers {}",
            kind.name(),
            render_system.name(),
            reserved_tex_slots,
            if config.use_light_buffers { "on" } else { "off" }
        );

        Ok(Self {
            kind,
            reserved_tex_slots,
            listener: Box::new(DefaultListener),
            caches: HlmsCaches::new(),
            datablocks: DatablockArena::new(),
            pools: MaterialPools::new(kind, config.slots_per_pool),
            pass_ring: PassBufferRing::new("hlms_pass_buffer", pass_ring_size),
            light_rings: [
                PassBufferRing::new("hlms_light_buffer0", light0),
                PassBufferRing::new("hlms_light_buffer1", light1),
                PassBufferRing::new("hlms_light_buffer2", light2),
            ],
            objects,
            ctx: WorkerContext::new(),
            prepared: None,
            memo: BindMemo::default(),
            config,
            render_system,
        })
    }

    pub fn with_listener(mut self, listener: Box<dyn HlmsListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn kind(&self) -> MaterialKind {
        self.kind
    }

    pub fn config(&self) -> &HlmsConfig {
        &self.config
    }

    pub fn reserved_tex_slots(&self) -> u16 {
        self.reserved_tex_slots
    }

    pub fn render_system(&self) -> &dyn RenderSystem {
        self.render_system.as_ref()
    }

    pub fn listener(&self) -> &dyn HlmsListener {
        self.listener.as_ref()
    }

    pub fn caches(&self) -> &HlmsCaches {
        &self.caches
    }

    pub fn datablocks(&self) -> &DatablockArena {
        &self.datablocks
    }

    pub fn material_pools(&self) -> &MaterialPools {
        &self.pools
    }

    pub fn object_buffers(&self) -> &ObjectBuffers {
        &self.objects
    }

    /// Pass buffer written by the last `prepare_pass_hash`.
    pub fn pass_buffer(&self) -> Option<&GpuBuffer> {
        self.prepared.as_ref().map(|p| &p.pass_buffer)
    }

    /// Bytes the last `prepare_pass_hash` wrote to the pass buffer.
    pub fn pass_buffer_bytes(&self) -> Option<usize> {
        self.prepared.as_ref().map(|p| p.pass_buffer_bytes)
    }

    pub fn light_buffer(&self, idx: usize) -> Option<&GpuBuffer> {
        self.prepared
            .as_ref()
            .and_then(|p| p.light_buffers.get(idx))
            .and_then(Option::as_ref)
    }

    /// Texture unit of the first per-material texture in the current pass.
    pub fn tex_unit_slot_start(&self) -> Option<u16> {
        self.prepared.as_ref().map(|p| p.tex_unit_slot_start)
    }

    pub fn create_datablock(&mut self, datablock: Datablock) -> Result<DatablockId> {
        if datablock.kind() != self.kind {
            return Err(StructuralError::invalid_params(format!(
                "datablock {} is {:?} but this hlms is {:?}",
                datablock.name,
                datablock.kind(),
                self.kind
            )));
        }
        let slot = self.pools.request_slot(self.render_system.as_ref())?;
        let id = self.datablocks.insert(datablock);
        self.datablocks.assign_slot(id, slot);
        Ok(id)
    }

    pub fn destroy_datablock(&mut self, id: DatablockId) -> Option<Datablock> {
        let datablock = self.datablocks.remove(id)?;
        if let Some(slot) = datablock.pool_slot() {
            self.pools.release_slot(slot);
        }
        Some(datablock)
    }

    pub fn datablock(&self, id: DatablockId) -> Option<&Datablock> {
        self.datablocks.get(id)
    }

    /// Mutable access. The GPU record is re-uploaded on the next pass.
    pub fn datablock_mut(&mut self, id: DatablockId) -> Option<&mut Datablock> {
        let datablock = self.datablocks.get_mut(id)?;
        datablock.mark_dirty(DirtyFlags::CONST_BUFFER);
        Some(datablock)
    }

    /// Bake and upload every dirty datablock. Returns how many were uploaded.
    pub fn upload_dirty_datablocks(&mut self) -> Result<usize> {
        self.datablocks.upload_dirty(&self.pools)
    }

    /// Compute the regular and shadow caster renderable hashes.
    ///
    /// Returns `(0, 0)` while the datablock's descriptor sets are out of date;
    /// call again after the next upload.
    pub fn calculate_hash_for(
        &mut self,
        ctx: &mut WorkerContext,
        renderable: &Renderable,
    ) -> Result<(u32, u32)> {
        let datablock = self.datablocks.require(renderable.datablock)?;
        if datablock.kind() != self.kind {
            return Err(StructuralError::invalid_params(format!(
                "renderable uses {:?} datablock {} in the {:?} hlms",
                datablock.kind(),
                datablock.name,
                self.kind
            )));
        }
        if datablock.has_dirty_descriptors() {
            log::trace!("hash of {} deferred: descriptors not baked", datablock.name);
            return Ok((0, 0));
        }

        ctx.clear();
        set_base_renderable_properties(ctx, renderable, datablock);
        self.listener.calculate_hash_for_pre_create(renderable, ctx);

        let (config, rs) = (&self.config, self.render_system.as_ref());
        match &datablock.material {
            MaterialData::Pbs(material) => {
                pbs::hash::pre_create(ctx, renderable, datablock, material, config, rs)?
            }
            MaterialData::Unlit(material) => {
                unlit::hash::pre_create(ctx, renderable, datablock, material, config, rs)?
            }
            MaterialData::Terra(material) => {
                terra::hash::pre_create(ctx, renderable, datablock, material, config, rs)?
            }
        }
        let hash = self.caches.add_renderable(self.kind, ctx)?;

        set_base_caster_properties(ctx, renderable, datablock);
        match &datablock.material {
            MaterialData::Pbs(_) => pbs::hash::pre_caster(ctx, datablock, &self.config),
            MaterialData::Unlit(_) => unlit::hash::pre_caster(ctx, datablock, &self.config),
            MaterialData::Terra(_) => terra::hash::pre_caster(ctx),
        }
        ctx.set(pso::MACROBLOCK, i32::from(datablock.macroblock[1].id));
        ctx.set(pso::BLENDBLOCK, i32::from(datablock.blendblock[1].id));
        let caster_hash = self.caches.add_renderable(self.kind, ctx)?;

        Ok((hash, caster_hash))
    }

    /// Derive the pass properties, register the pass and write its buffer.
    pub fn prepare_pass_hash(
        &mut self,
        scene: &PassScene,
        caster: bool,
        dual_paraboloid: bool,
    ) -> Result<PassCache> {
        self.upload_dirty_datablocks()?;
        self.memo.reset();

        let prepared = match self.kind {
            MaterialKind::Pbs | MaterialKind::Terra => {
                self.prepare_pbs_pass(scene, caster, dual_paraboloid)?
            }
            MaterialKind::Unlit => self.prepare_unlit_pass(scene, caster, dual_paraboloid)?,
        };
        if self.kind != MaterialKind::Terra {
            self.objects.ensure_tex_buffer(self.render_system.as_ref())?;
        }

        let pass = PassCache {
            hash: prepared.hash,
            kind: self.kind,
            caster,
            properties: prepared.properties.clone(),
        };
        self.prepared = Some(prepared);
        Ok(pass)
    }

    /// Look up (or build) the shader permutation of `renderable` in `pass`.
    pub fn get_material(
        &mut self,
        pass: &PassCache,
        renderable: &Renderable,
        caster: bool,
    ) -> Result<Arc<ShaderCacheEntry>> {
        let renderable_hash = if caster {
            renderable.hlms_caster_hash
        } else {
            renderable.hlms_hash
        };
        if renderable_hash == 0 {
            return Err(StructuralError::invalid_state(
                "renderable has no hash; calculate_hash_for was deferred or never ran",
            ));
        }
        if kind_id_from_hash(renderable_hash) != self.kind.id() {
            return Err(StructuralError::invalid_state(format!(
                "renderable hash {renderable_hash:#x} does not belong to the {} hlms",
                self.kind.name()
            )));
        }

        let hash = renderable_hash | pass.hash;
        if let Some(entry) = self.caches.shader(hash) {
            return Ok(entry.clone());
        }
        self.create_shader_cache_entry(hash, pass, renderable_hash, renderable)
    }

    fn create_shader_cache_entry(
        &mut self,
        hash: u32,
        pass: &PassCache,
        renderable_hash: u32,
        renderable: &Renderable,
    ) -> Result<Arc<ShaderCacheEntry>> {
        let cached = self.caches.renderable(renderable_hash).cloned().ok_or_else(|| {
            StructuralError::invalid_state(format!(
                "renderable hash {renderable_hash:#x} is not cached"
            ))
        })?;
        let datablock = self.datablocks.require(renderable.datablock)?;

        let ctx = &mut self.ctx;
        ctx.clear();
        ctx.properties = cached.properties;
        ctx.pieces = cached.pieces;
        ctx.properties.merge_from(&pass.properties);

        if ctx.get(base::ALPHA_TO_COVERAGE) != 0 && ctx.get(base::MSAA_SAMPLES) <= 1 {
            ctx.set(base::ALPHA_TO_COVERAGE, 0);
        }
        match self.kind {
            MaterialKind::Pbs => {
                pbs::hash::notify_properties_merged(ctx, self.reserved_tex_slots)
            }
            MaterialKind::Unlit => unlit::hash::notify_properties_merged(ctx),
            MaterialKind::Terra => {
                terra::hash::notify_properties_merged(ctx, self.reserved_tex_slots)
            }
        }
        self.listener.properties_merged_pre_generation_step(pass, ctx);

        let input_layout_id = u16::try_from(ctx.get(pso::INPUT_LAYOUT_ID)).map_err(|_| {
            StructuralError::invalid_state(format!(
                "input layout id {} does not fit in 16 bits",
                ctx.get(pso::INPUT_LAYOUT_ID)
            ))
        })?;
        for key in [pso::MACROBLOCK, pso::BLENDBLOCK, pso::INPUT_LAYOUT_ID] {
            ctx.properties.unset(key);
        }

        let caster = ctx.get(base::SHADOW_CASTER) != 0;
        let mut macroblock = datablock.macroblock[usize::from(caster)];
        let mut blendblock = datablock.blendblock[usize::from(caster)];
        if self.kind != MaterialKind::Unlit && ctx.get(base::USE_PREPASS) != 0 {
            macroblock.depth_write = false;
        }
        self.listener.apply_strong_macroblock_rules(&mut macroblock);
        self.listener.apply_strong_blendblock_rules(&mut blendblock);

        let mut root_layout = RootLayout::new();
        let (props, slots) = (&ctx.properties, self.reserved_tex_slots);
        match self.kind {
            MaterialKind::Pbs => pbs::hash::setup_root_layout(&mut root_layout, props, slots)?,
            MaterialKind::Unlit => unlit::hash::setup_root_layout(&mut root_layout, props, slots)?,
            MaterialKind::Terra => terra::hash::setup_root_layout(&mut root_layout, props, slots)?,
        }
        self.listener.setup_root_layout(&mut root_layout, &ctx.properties);
        let label = format!("{} shader {hash:#010x}", self.kind.name());
        if let Err(err) = root_layout.validate(&label) {
            log::error!("{err}\n{}", root_layout.dump());
            return Err(err);
        }

        let entry = ShaderCacheEntry {
            hash,
            kind: self.kind,
            caster,
            properties: ctx.properties.clone(),
            pieces: ctx.pieces.clone(),
            texture_regs: ctx.texture_regs.clone(),
            root_layout,
            macroblock,
            blendblock,
            input_layout_id,
        };
        let entry = self.caches.insert_shader(entry);
        log::debug!(
            "{} shader cache entry {:#010x} ({} properties, caster {})",
            self.kind.name(),
            hash,
            entry.properties.len(),
            caster
        );
        self.listener.shader_cache_entry_created(&entry);
        Ok(entry)
    }

    /// Write the per-draw data of `queued` and emit the binds it needs.
    /// Returns the instance index the shader reads its data with.
    pub fn fill_buffers_for(
        &mut self,
        entry: &ShaderCacheEntry,
        queued: &QueuedRenderable<'_>,
        caster: bool,
        last_cache_hash: u32,
        commands: &mut CommandBuffer,
    ) -> Result<u32> {
        if self.prepared.is_none() {
            return Err(StructuralError::invalid_state(
                "fill_buffers_for called before prepare_pass_hash",
            ));
        }
        let type_changed = kind_id_from_hash(last_cache_hash) != self.kind.id();
        let instance_idx = match self.kind {
            MaterialKind::Pbs => {
                self.fill_pbs_buffers(entry, queued, caster, type_changed, commands)?
            }
            MaterialKind::Unlit => self.fill_unlit_buffers(queued, caster, type_changed, commands)?,
            MaterialKind::Terra => self.fill_terra_buffers(queued, caster, type_changed, commands)?,
        };

        let object = ObjectDataContext {
            instance_idx,
            const_buffer_idx: self.objects.current_const_index().unwrap_or(0),
            caster,
        };
        self.listener
            .object_data_filled(self.render_system.as_ref(), object, queued, commands)?;
        Ok(instance_idx)
    }

    /// Per-draw path of mobile render queues. Desktop only uses the fast path.
    pub fn fill_buffers_for_slow_path(
        &mut self,
        _entry: &ShaderCacheEntry,
        _queued: &QueuedRenderable<'_>,
        _caster: bool,
        _last_cache_hash: u32,
        _commands: &mut CommandBuffer,
    ) -> Result<u32> {
        Err(StructuralError::not_implemented(
            "Trying to use slow-path on a desktop implementation. Change the RenderQueue settings.",
        ))
    }

    /// Flush mapped buffers before `commands` is replayed.
    pub fn pre_command_buffer_execution(&mut self, commands: &mut CommandBuffer) {
        self.objects.unmap(UnmapOptions::KeepPersistent);
        self.listener.pre_command_buffer_execution(commands);
    }

    /// The replayed commands may have rebound anything.
    pub fn post_command_buffer_execution(&mut self, _commands: &mut CommandBuffer) {
        self.memo.reset();
    }

    pub fn frame_ended(&mut self) {
        self.pass_ring.frame_ended();
        for ring in &mut self.light_rings {
            ring.frame_ended();
        }
        self.objects.frame_ended();
        self.listener.frame_ended();
        self.memo.reset();
        self.prepared = None;
    }

    /// Drop every cached permutation, e.g. after a render system change.
    /// Renderables must be hashed again.
    pub fn clear_shader_cache(&mut self) {
        log::info!(
            "{}: clearing {} shaders, {} renderables and {} passes",
            self.kind.name(),
            self.caches.num_shaders(),
            self.caches.num_renderables(),
            self.caches.num_passes()
        );
        self.caches.clear();
    }

    pub(crate) fn prepared_pass(&self) -> Result<&PreparedPass> {
        self.prepared
            .as_ref()
            .ok_or_else(|| StructuralError::invalid_state("no pass has been prepared"))
    }
}

/// Properties every kind derives from the vertex layout and the datablock.
fn set_base_renderable_properties(
    ctx: &mut WorkerContext,
    renderable: &Renderable,
    datablock: &Datablock,
) {
    if renderable.has_skeleton_animation() {
        ctx.set(base::SKELETON, 1);
    }
    if let Some(pose) = &renderable.pose {
        ctx.set(base::POSE, pose.num_poses() as i32);
        ctx.properties.set_bool(base::POSE_HALF_PRECISION, pose.half_precision);
        ctx.properties.set_bool(base::POSE_NORMALS, pose.normals);
    }

    let mut num_uv_sets = 0;
    for element in &renderable.vertex_elements {
        match element.semantic {
            VertexSemantic::Normal if element.components < 4 => ctx.set(base::NORMAL, 1),
            VertexSemantic::Normal => ctx.set(base::QTANGENT, 1),
            VertexSemantic::Tangent => {
                ctx.set(base::TANGENT, 1);
                if element.components == 4 {
                    ctx.set(base::TANGENT4, 1);
                }
            }
            VertexSemantic::Diffuse => ctx.set(base::COLOUR, 1),
            VertexSemantic::TexCoord => {
                ctx.set(base::uv_count(usize::from(element.index)), i32::from(element.components));
                num_uv_sets += 1;
            }
            VertexSemantic::BlendWeights if renderable.has_skeleton_animation() => {
                ctx.set(base::BONES_PER_VERTEX, i32::from(element.components));
            }
            _ => {}
        }
    }
    ctx.set(base::UV_COUNT, num_uv_sets);
    ctx.set(pso::INPUT_LAYOUT_ID, i32::from(renderable.input_layout_id));

    if datablock.has_alpha_test() {
        ctx.set(base::ALPHA_TEST, 1);
        ctx.set_piece(
            ShaderStage::Pixel,
            pieces::ALPHA_TEST_CMP_FUNC,
            datablock.alpha_test.cmp_string(),
        );
    }
    if datablock.alpha_test_shadow_caster_only {
        ctx.set(base::ALPHA_TEST_SHADOW_CASTER_ONLY, 1);
    }
    let blendblock = &datablock.blendblock[0];
    ctx.properties.set_bool(base::ALPHA_BLEND, blendblock.auto_transparent);
    ctx.properties.set_bool(base::ALPHA_TO_COVERAGE, blendblock.alpha_to_coverage);

    if renderable.use_identity_world {
        ctx.set(base::IDENTITY_WORLD, 1);
    }
    if renderable.use_identity_projection {
        ctx.set(base::IDENTITY_VIEWPROJ, 1);
    }
    ctx.set(pso::MACROBLOCK, i32::from(datablock.macroblock[0].id));
    ctx.set(pso::BLENDBLOCK, i32::from(datablock.blendblock[0].id));
}

/// Turn the regular properties in `ctx` into the caster starting point.
fn set_base_caster_properties(
    ctx: &mut WorkerContext,
    renderable: &Renderable,
    datablock: &Datablock,
) {
    ctx.set(base::NORMAL, 0);
    ctx.set(base::QTANGENT, 0);

    let blendblock = &datablock.blendblock[1];
    ctx.properties.set_bool(base::ALPHA_BLEND, blendblock.auto_transparent);
    ctx.properties.set_bool(base::ALPHA_TO_COVERAGE, blendblock.alpha_to_coverage);

    for pieces in &mut ctx.pieces {
        pieces.clear();
    }
    if datablock.has_alpha_test() {
        ctx.set_piece(
            ShaderStage::Pixel,
            pieces::ALPHA_TEST_CMP_FUNC,
            datablock.alpha_test.cmp_string(),
        );
    }
    if let Some(shadow_id) = renderable.shadow_input_layout_id {
        ctx.set(pso::INPUT_LAYOUT_ID, i32::from(shadow_id));
    }
}
