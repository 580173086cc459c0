//! In-memory render system.
//!
//! Buffers live in host memory so tests can read back exactly what the HLMS
//! packed.

use std::sync::atomic::{AtomicU32, Ordering};

use redlilium_hlms_core::{Result, StructuralError};

use super::{BufferDescriptor, BufferId, BufferKind, Capabilities, GpuBuffer, RenderSystem};

#[derive(Debug)]
pub struct DummyRenderSystem {
    capabilities: Capabilities,
    tex_buffer_alignment: usize,
    max_const_buffer_size: usize,
    next_id: AtomicU32,
}

impl DummyRenderSystem {
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities::default(),
            tex_buffer_alignment: 256,
            max_const_buffer_size: 65536,
            next_id: AtomicU32::new(0),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_tex_buffer_alignment(mut self, bytes: usize) -> Self {
        self.tex_buffer_alignment = bytes;
        self
    }

    pub fn with_max_const_buffer_size(mut self, bytes: usize) -> Self {
        self.max_const_buffer_size = bytes;
        self
    }

    /// Number of buffers created so far.
    pub fn buffers_created(&self) -> u32 {
        self.next_id.load(Ordering::Relaxed)
    }
}

impl Default for DummyRenderSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSystem for DummyRenderSystem {
    fn name(&self) -> &'static str {
        "Dummy Render System"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer> {
        if descriptor.kind == BufferKind::Const && descriptor.size > self.max_const_buffer_size {
            return Err(StructuralError::invalid_params(format!(
                "const buffer {:?} of {} bytes exceeds the {} byte limit",
                descriptor.label, descriptor.size, self.max_const_buffer_size
            )));
        }
        let id = BufferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        log::trace!(
            "DummyRenderSystem: creating {:?} buffer {:?} (size: {})",
            descriptor.kind,
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::new(id, descriptor.kind, descriptor.size))
    }

    fn max_const_buffer_size(&self) -> usize {
        self.max_const_buffer_size
    }

    fn tex_buffer_alignment(&self) -> usize {
        self.tex_buffer_alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let rs = DummyRenderSystem::new();
        let a = rs.create_const_buffer(64, "a").unwrap();
        let b = rs.create_tex_buffer(64, "b").unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(b.kind(), BufferKind::Tex);
        assert_eq!(rs.buffers_created(), 2);
    }

    #[test]
    fn test_const_limit() {
        let rs = DummyRenderSystem::new().with_max_const_buffer_size(1024);
        assert!(rs.create_const_buffer(2048, "big").is_err());
        assert!(rs.create_tex_buffer(2048, "tex").is_ok());
    }
}
