//! Pass, renderable and shader caches.
//!
//! A renderable hash and a pass hash occupy disjoint bits, so the shader
//! cache key of a draw is simply `renderable_hash | pass_hash`:
//!
//! ```text
//!  31   29 28                     8 7        0
//! +-------+------------------------+----------+
//! | kind  |   renderable entry     |   pass   |
//! +-------+------------------------+----------+
//! ```

use std::sync::Arc;

use redlilium_hlms_core::{PropertyStore, Result, RootLayout, StructuralError};
use static_assertions::const_assert_eq;

use crate::hlms::MaterialKind;
use crate::types::{Blendblock, Macroblock};
use crate::worker::{PiecesMap, TextureRegister, WorkerContext, NUM_SHADER_STAGES};

pub const HLMS_TYPE_BITS: u32 = 3;
pub const RENDERABLE_BITS: u32 = 21;
pub const PASS_BITS: u32 = 8;

pub const PASS_SHIFT: u32 = 0;
pub const RENDERABLE_SHIFT: u32 = PASS_SHIFT + PASS_BITS;
pub const HLMS_TYPE_SHIFT: u32 = RENDERABLE_SHIFT + RENDERABLE_BITS;

const_assert_eq!(HLMS_TYPE_BITS + RENDERABLE_BITS + PASS_BITS, 32);

/// Kind id stored in the top bits of a renderable or shader hash.
pub fn kind_id_from_hash(hash: u32) -> u32 {
    (hash >> HLMS_TYPE_SHIFT) & ((1 << HLMS_TYPE_BITS) - 1)
}

/// Result of `prepare_pass_hash`.
#[derive(Debug, Clone, PartialEq)]
pub struct PassCache {
    pub hash: u32,
    pub kind: MaterialKind,
    pub caster: bool,
    pub properties: PropertyStore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderableCacheEntry {
    pub properties: PropertyStore,
    pub pieces: [PiecesMap; NUM_SHADER_STAGES],
}

/// A finished shader permutation.
#[derive(Debug, Clone)]
pub struct ShaderCacheEntry {
    pub hash: u32,
    pub kind: MaterialKind,
    pub caster: bool,
    /// Merged renderable and pass properties, PSO keys stripped.
    pub properties: PropertyStore,
    pub pieces: [PiecesMap; NUM_SHADER_STAGES],
    pub texture_regs: Vec<TextureRegister>,
    pub root_layout: RootLayout,
    pub macroblock: Macroblock,
    pub blendblock: Blendblock,
    pub input_layout_id: u16,
}

#[derive(Debug, Default)]
pub struct HlmsCaches {
    passes: Vec<PropertyStore>,
    renderables: Vec<RenderableCacheEntry>,
    /// Sorted by hash.
    shaders: Vec<Arc<ShaderCacheEntry>>,
}

impl HlmsCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or append a pass property set and return its hash.
    pub fn add_pass(&mut self, properties: &PropertyStore) -> Result<u32> {
        let idx = match self.passes.iter().position(|p| p == properties) {
            Some(idx) => idx,
            None => {
                if self.passes.len() >= 1 << PASS_BITS {
                    return Err(StructuralError::ceiling_exceeded(format!(
                        "more than {} distinct pass permutations",
                        1 << PASS_BITS
                    )));
                }
                self.passes.push(properties.clone());
                log::debug!(
                    "pass cache entry #{} ({} properties)",
                    self.passes.len() - 1,
                    properties.len()
                );
                self.passes.len() - 1
            }
        };
        Ok((idx as u32) << PASS_SHIFT)
    }

    pub fn pass_properties(&self, hash: u32) -> Option<&PropertyStore> {
        let idx = (hash >> PASS_SHIFT) & ((1 << PASS_BITS) - 1);
        self.passes.get(idx as usize)
    }

    /// Find or append the renderable permutation held by `ctx`.
    pub fn add_renderable(&mut self, kind: MaterialKind, ctx: &WorkerContext) -> Result<u32> {
        let idx = match self
            .renderables
            .iter()
            .position(|e| e.properties == ctx.properties && e.pieces == ctx.pieces)
        {
            Some(idx) => idx,
            None => {
                if self.renderables.len() >= 1 << RENDERABLE_BITS {
                    return Err(StructuralError::ceiling_exceeded(format!(
                        "more than {} distinct renderable permutations",
                        1 << RENDERABLE_BITS
                    )));
                }
                self.renderables.push(RenderableCacheEntry {
                    properties: ctx.properties.clone(),
                    pieces: ctx.pieces.clone(),
                });
                self.renderables.len() - 1
            }
        };
        Ok(((idx as u32) << RENDERABLE_SHIFT) | (kind.id() << HLMS_TYPE_SHIFT))
    }

    pub fn renderable(&self, hash: u32) -> Option<&RenderableCacheEntry> {
        let idx = (hash >> RENDERABLE_SHIFT) & ((1 << RENDERABLE_BITS) - 1);
        self.renderables.get(idx as usize)
    }

    pub fn shader(&self, hash: u32) -> Option<&Arc<ShaderCacheEntry>> {
        self.shaders
            .binary_search_by_key(&hash, |e| e.hash)
            .ok()
            .map(|idx| &self.shaders[idx])
    }

    pub fn insert_shader(&mut self, entry: ShaderCacheEntry) -> Arc<ShaderCacheEntry> {
        let entry = Arc::new(entry);
        match self.shaders.binary_search_by_key(&entry.hash, |e| e.hash) {
            Ok(idx) => self.shaders[idx] = entry.clone(),
            Err(idx) => self.shaders.insert(idx, entry.clone()),
        }
        entry
    }

    pub fn num_passes(&self) -> usize {
        self.passes.len()
    }

    pub fn num_renderables(&self) -> usize {
        self.renderables.len()
    }

    pub fn num_shaders(&self) -> usize {
        self.shaders.len()
    }

    /// Compiled permutations only; pass and renderable entries stay valid.
    pub fn clear_shaders(&mut self) {
        self.shaders.clear();
    }

    pub fn clear(&mut self) {
        self.passes.clear();
        self.renderables.clear();
        self.shaders.clear();
    }
}
