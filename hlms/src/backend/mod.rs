//! Render-system seam.
//!
//! The HLMS never talks to a graphics API directly. It asks a [`RenderSystem`]
//! for buffers and capability bits, writes into mapped [`GpuBuffer`] ranges
//! and records bind commands into a
//! [`CommandBuffer`](crate::command_buffer::CommandBuffer) that the renderer
//! replays later.
//!
//! # Available render systems
//!
//! - [`DummyRenderSystem`]: keeps buffer contents in host memory, used by the
//!   tests and benchmarks for readback.

pub mod dummy;

use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use redlilium_hlms_core::{Result, StructuralError};

pub use dummy::DummyRenderSystem;

bitflags! {
    /// Optional render-system features the HLMS adapts to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// `textureGather` is available (cheaper PCF).
        const TEXTURE_GATHER = 1 << 0;
        /// Textures and samplers are bound separately.
        const SEPARATE_SAMPLERS = 1 << 1;
        /// Depth is stored reversed (1 near, 0 far).
        const REVERSE_DEPTH = 1 << 2;
        /// sRGB reads and writes are done in hardware.
        const HW_GAMMA = 1 << 3;
        /// Clip distances are supported by the pipeline.
        const USER_CLIP_PLANES = 1 << 4;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::REVERSE_DEPTH | Self::HW_GAMMA | Self::USER_CLIP_PLANES
    }
}

/// How a buffer is exposed to shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Uniform / constant buffer.
    Const,
    /// Texture buffer (`samplerBuffer` / `Buffer<float4>`).
    Tex,
    /// Read-only structured buffer.
    ReadOnly,
}

/// What to do with a persistent mapping on unmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmapOptions {
    /// Flush the written range but keep the buffer mapped.
    KeepPersistent,
    /// Drop the mapping entirely.
    UnmapAll,
}

/// Identifier of a buffer, unique per render system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    /// Size in bytes.
    pub size: usize,
    pub kind: BufferKind,
}

impl BufferDescriptor {
    pub fn new(size: usize, kind: BufferKind) -> Self {
        Self {
            label: None,
            size,
            kind,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A buffer shared between the HLMS and the render system.
///
/// Cloning is cheap; clones refer to the same storage.
#[derive(Debug, Clone)]
pub struct GpuBuffer {
    id: BufferId,
    kind: BufferKind,
    size: usize,
    storage: Arc<Mutex<Vec<u8>>>,
}

impl GpuBuffer {
    pub fn new(id: BufferId, kind: BufferKind, size: usize) -> Self {
        Self {
            id,
            kind,
            size,
            storage: Arc::new(Mutex::new(vec![0u8; size])),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Map `len` bytes starting at `offset` for writing.
    pub fn map(&self, offset: usize, len: usize) -> Result<MappedMutexGuard<'_, [u8]>> {
        if offset + len > self.size {
            return Err(StructuralError::invalid_params(format!(
                "buffer {:?}: mapping {}..{} exceeds its {} bytes",
                self.id,
                offset,
                offset + len,
                self.size
            )));
        }
        log::trace!("GpuBuffer {:?}: map {}..{}", self.id, offset, offset + len);
        Ok(MutexGuard::map(self.storage.lock(), |bytes| {
            &mut bytes[offset..offset + len]
        }))
    }

    pub fn unmap(&self, options: UnmapOptions) {
        log::trace!("GpuBuffer {:?}: unmap ({:?})", self.id, options);
    }

    /// Copy of `len` bytes starting at `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        let storage = self.storage.lock();
        let end = (offset + len).min(storage.len());
        storage[offset.min(end)..end].to_vec()
    }

    /// The `index`-th float of the buffer.
    pub fn read_f32(&self, index: usize) -> f32 {
        let storage = self.storage.lock();
        redlilium_hlms_core::buffer_writer::read_f32(&storage, index)
    }

    /// The `index`-th 32-bit word of the buffer.
    pub fn read_u32(&self, index: usize) -> u32 {
        let storage = self.storage.lock();
        redlilium_hlms_core::buffer_writer::read_u32(&storage, index)
    }
}

impl PartialEq for GpuBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GpuBuffer {}

/// Everything the HLMS needs from a render system.
pub trait RenderSystem: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer>;

    /// Largest constant buffer in bytes.
    fn max_const_buffer_size(&self) -> usize {
        65536
    }

    /// Largest texture buffer in bytes.
    fn max_tex_buffer_size(&self) -> usize {
        128 * 1024 * 1024
    }

    /// Offset alignment in bytes when binding a texture buffer sub-range.
    fn tex_buffer_alignment(&self) -> usize {
        256
    }

    fn create_const_buffer(&self, size: usize, label: &str) -> Result<GpuBuffer> {
        self.create_buffer(&BufferDescriptor::new(size, BufferKind::Const).with_label(label))
    }

    fn create_tex_buffer(&self, size: usize, label: &str) -> Result<GpuBuffer> {
        self.create_buffer(&BufferDescriptor::new(size, BufferKind::Tex).with_label(label))
    }

    fn create_readonly_buffer(&self, size: usize, label: &str) -> Result<GpuBuffer> {
        self.create_buffer(&BufferDescriptor::new(size, BufferKind::ReadOnly).with_label(label))
    }

    fn is_reverse_depth(&self) -> bool {
        self.capabilities().contains(Capabilities::REVERSE_DEPTH)
    }

    fn has_separate_samplers(&self) -> bool {
        self.capabilities()
            .contains(Capabilities::SEPARATE_SAMPLERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_out_of_range() {
        let buffer = GpuBuffer::new(BufferId(0), BufferKind::Const, 16);
        assert!(buffer.map(8, 16).is_err());
        assert!(buffer.map(0, 16).is_ok());
    }

    #[test]
    fn test_clones_share_storage() {
        let buffer = GpuBuffer::new(BufferId(3), BufferKind::Tex, 16);
        let clone = buffer.clone();
        {
            let mut mapped = buffer.map(4, 4).unwrap();
            mapped.copy_from_slice(&7u32.to_ne_bytes());
        }
        assert_eq!(clone.read_u32(1), 7);
        assert_eq!(clone, buffer);
    }
}
