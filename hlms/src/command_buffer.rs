//! Bind commands recorded while packing draws.

use std::sync::Arc;

use bitflags::bitflags;

use crate::backend::BufferId;
use crate::types::{DescriptorSetSampler, DescriptorSetTexture, SamplerId, TextureId};

bitflags! {
    /// Shader stages a buffer is bound to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u8 {
        const VERTEX = 1 << 0;
        const PIXEL = 1 << 1;
    }
}

impl Default for ShaderStages {
    fn default() -> Self {
        Self::VERTEX | Self::PIXEL
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Bind a constant or read-only buffer range.
    ShaderBuffer {
        stages: ShaderStages,
        slot: u16,
        buffer: BufferId,
        offset: usize,
        size: usize,
    },
    /// Bind a texture buffer range.
    TexBuffer {
        stages: ShaderStages,
        slot: u16,
        buffer: BufferId,
        offset: usize,
        size: usize,
    },
    /// Bind a single texture (and optionally its sampler).
    Texture {
        slot: u16,
        texture: TextureId,
        sampler: Option<SamplerId>,
    },
    /// Bind a texture descriptor set. `hazardous_cubemap` names a slot whose
    /// texture may also be the current render target.
    Textures {
        slot: u16,
        hazardous_cubemap: Option<u16>,
        set: Arc<DescriptorSetTexture>,
    },
    Samplers {
        slot: u16,
        set: Arc<DescriptorSetSampler>,
    },
}

/// Commands in recording order.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Number of `ShaderBuffer` commands bound to `slot`.
    pub fn count_shader_buffers(&self, slot: u16) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::ShaderBuffer { slot: s, .. } if *s == slot))
            .count()
    }
}
