//! Per-worker scratch state.
//!
//! Every hashing call works on a [`WorkerContext`]: the properties and
//! pieces of the permutation being built, plus the texture registers the
//! merge step assigns. Workers hashing renderables in parallel each own one;
//! pass-scope work uses the context owned by the [`Hlms`](crate::Hlms).

use std::collections::BTreeMap;

use redlilium_hlms_core::{IdString, PropertyStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex = 0,
    Pixel = 1,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 2] = [Self::Vertex, Self::Pixel];
}

pub const NUM_SHADER_STAGES: usize = ShaderStage::ALL.len();

/// Template pieces of one stage, keyed by piece name.
pub type PiecesMap = BTreeMap<IdString, String>;

/// A texture unit assigned to a named shader sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureRegister {
    pub stage: ShaderStage,
    pub name: String,
    pub unit: i32,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerContext {
    pub properties: PropertyStore,
    pub pieces: [PiecesMap; NUM_SHADER_STAGES],
    pub texture_regs: Vec<TextureRegister>,
}

impl WorkerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: IdString, value: i32) {
        self.properties.set(key, value);
    }

    pub fn get(&self, key: IdString) -> i32 {
        self.properties.get(key)
    }

    pub fn set_piece(&mut self, stage: ShaderStage, key: IdString, value: impl Into<String>) {
        self.pieces[stage as usize].insert(key, value.into());
    }

    pub fn piece(&self, stage: ShaderStage, key: IdString) -> Option<&str> {
        self.pieces[stage as usize].get(&key).map(String::as_str)
    }

    /// Insert a piece into every stage.
    pub fn set_piece_all_stages(&mut self, key: IdString, value: &str) {
        for pieces in &mut self.pieces {
            pieces.insert(key, value.to_owned());
        }
    }

    /// Assign `unit` to the sampler `name`. The unit is also exposed to the
    /// templates as the property `name`.
    pub fn set_texture_reg(&mut self, stage: ShaderStage, name: impl Into<String>, unit: i32) {
        let name = name.into();
        self.properties.set(IdString::new(&name), unit);
        self.texture_regs.push(TextureRegister { stage, name, unit });
    }

    pub fn texture_reg(&self, name: &str) -> Option<i32> {
        self.texture_regs
            .iter()
            .find(|reg| reg.name == name)
            .map(|reg| reg.unit)
    }

    /// Forget everything, keeping allocations.
    pub fn clear(&mut self) {
        self.properties.clear();
        for pieces in &mut self.pieces {
            pieces.clear();
        }
        self.texture_regs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pieces_are_per_stage() {
        let mut ctx = WorkerContext::new();
        let key = IdString::new("alpha_test_cmp_func");
        ctx.set_piece(ShaderStage::Pixel, key, "<");
        assert_eq!(ctx.piece(ShaderStage::Pixel, key), Some("<"));
        assert_eq!(ctx.piece(ShaderStage::Vertex, key), None);

        ctx.set_piece_all_stages(key, ">=");
        assert_eq!(ctx.piece(ShaderStage::Vertex, key), Some(">="));
    }

    #[test]
    fn test_clear() {
        let mut ctx = WorkerContext::new();
        ctx.set(IdString::new("hlms_skeleton"), 1);
        ctx.set_texture_reg(ShaderStage::Pixel, "texShadowMap0", 3);
        assert_eq!(ctx.texture_reg("texShadowMap0"), Some(3));
        assert_eq!(ctx.get(IdString::new("texShadowMap0")), 3);
        ctx.clear();
        assert!(ctx.properties.is_empty());
        assert!(ctx.texture_regs.is_empty());
    }
}
