//! GPU buffer rings owned by an [`Hlms`](crate::Hlms) instance.
//!
//! Two kinds of rings live here:
//!
//! - [`PassBufferRing`]: one constant buffer per prepared pass. A pass takes
//!   the next buffer, allocating a new one when every buffer of the ring has
//!   been used this frame. [`PassBufferRing::frame_ended`] rewinds the ring.
//! - [`ObjectBuffers`]: the per-draw constant ring (4 or 16 `u32` per draw)
//!   and texture-buffer ring (world matrices, bone palettes, pose weights).
//!
//! # Rotation
//!
//! When a draw does not fit in the mapped constant buffer the next one is
//! mapped and bound at slot 2. The texture buffer either rotates too (the
//! draw does not fit in what is left of it) or is re-windowed: the bound
//! range restarts at the current cursor, aligned to the render system's
//! texture-buffer offset alignment, so the shader keeps indexing from 0.
//! The first buffer mapped in a frame is not counted as a rotation.

use redlilium_hlms_core::{Result, StructuralError};

use crate::backend::{GpuBuffer, RenderSystem, UnmapOptions};
use crate::command_buffer::{Command, CommandBuffer, ShaderStages};

/// Constant buffer slot of the per-draw instance data.
pub const INSTANCE_BUFFER_SLOT: u16 = 2;

/// Texture buffer slot of the per-draw world matrices.
pub const WORLD_MATRIX_TEX_SLOT: u16 = 0;

/// Ring of constant buffers used for pass data.
#[derive(Debug)]
pub struct PassBufferRing {
    label: &'static str,
    buffer_size: usize,
    buffers: Vec<GpuBuffer>,
    next: usize,
}

impl PassBufferRing {
    pub fn new(label: &'static str, buffer_size: usize) -> Self {
        Self {
            label,
            buffer_size,
            buffers: Vec::new(),
            next: 0,
        }
    }

    /// Take the next buffer of the ring, allocating when the ring is exhausted.
    pub fn next_buffer(&mut self, render_system: &dyn RenderSystem) -> Result<GpuBuffer> {
        if self.next >= self.buffers.len() {
            let buffer = render_system.create_const_buffer(self.buffer_size, self.label)?;
            log::debug!(
                "{}: allocated buffer #{} ({} bytes)",
                self.label,
                self.buffers.len(),
                self.buffer_size
            );
            self.buffers.push(buffer);
        }
        let buffer = self.buffers[self.next].clone();
        self.next += 1;
        Ok(buffer)
    }

    /// Buffer returned by the last [`next_buffer`](Self::next_buffer) call.
    pub fn current(&self) -> Option<&GpuBuffer> {
        self.next.checked_sub(1).and_then(|idx| self.buffers.get(idx))
    }

    /// Buffers taken this frame.
    pub fn used(&self) -> usize {
        self.next
    }

    /// Buffers allocated over the ring's lifetime.
    pub fn allocated(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn frame_ended(&mut self) {
        self.next = 0;
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.next = 0;
    }
}

/// Rotation counters, reset every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    pub const_rotations: u32,
    pub tex_rotations: u32,
    pub tex_rewindows: u32,
}

/// Per-draw constant and texture buffer rings.
#[derive(Debug)]
pub struct ObjectBuffers {
    const_buffer_size: usize,
    tex_buffer_size: usize,
    /// In floats.
    tex_alignment: usize,

    const_buffers: Vec<GpuBuffer>,
    tex_buffers: Vec<GpuBuffer>,

    current_const: Option<usize>,
    /// In `u32` words from the start of the current const buffer.
    const_cursor: usize,

    current_tex: Option<usize>,
    /// Start of the bound tex window, in floats from the buffer start.
    tex_window_start: usize,
    /// In floats from the window start.
    tex_cursor: usize,

    stats: RingStats,
}

impl ObjectBuffers {
    pub fn new(
        render_system: &dyn RenderSystem,
        const_buffer_size: usize,
        tex_buffer_size: usize,
    ) -> Self {
        Self {
            const_buffer_size: const_buffer_size.min(render_system.max_const_buffer_size()),
            tex_buffer_size: tex_buffer_size.min(render_system.max_tex_buffer_size()),
            tex_alignment: (render_system.tex_buffer_alignment() / 4).max(1),
            const_buffers: Vec::new(),
            tex_buffers: Vec::new(),
            current_const: None,
            const_cursor: 0,
            current_tex: None,
            tex_window_start: 0,
            tex_cursor: 0,
            stats: RingStats::default(),
        }
    }

    /// Make sure at least one texture buffer exists.
    pub fn ensure_tex_buffer(&mut self, render_system: &dyn RenderSystem) -> Result<()> {
        if self.tex_buffers.is_empty() {
            self.tex_buffers
                .push(render_system.create_tex_buffer(self.tex_buffer_size, "hlms_tex_buffer")?);
            log::debug!("allocated object tex buffer #0 ({} bytes)", self.tex_buffer_size);
        }
        Ok(())
    }

    fn const_words(&self) -> usize {
        match self.current_const {
            Some(_) => self.const_buffer_size / 4,
            None => 0,
        }
    }

    fn tex_window_len(&self) -> usize {
        match self.current_tex {
            Some(_) => self.tex_buffer_size / 4 - self.tex_window_start,
            None => 0,
        }
    }

    /// True when `words` more `u32` do not fit in the mapped const buffer.
    pub fn exceeds_const(&self, words: usize) -> bool {
        self.current_const.is_none() || self.const_cursor + words > self.const_words()
    }

    /// True when `floats` more floats do not fit in the mapped tex window.
    pub fn exceeds_tex(&self, floats: usize) -> bool {
        self.current_tex.is_none() || self.tex_cursor + floats > self.tex_window_len()
    }

    /// Map the next const buffer and bind it at [`INSTANCE_BUFFER_SLOT`].
    pub fn map_next_const_buffer(
        &mut self,
        render_system: &dyn RenderSystem,
        commands: &mut CommandBuffer,
    ) -> Result<()> {
        let next = match self.current_const {
            Some(idx) => {
                self.stats.const_rotations += 1;
                idx + 1
            }
            None => 0,
        };
        if next >= self.const_buffers.len() {
            let buffer =
                render_system.create_const_buffer(self.const_buffer_size, "hlms_const_buffer")?;
            log::debug!(
                "allocated object const buffer #{} ({} bytes)",
                self.const_buffers.len(),
                self.const_buffer_size
            );
            self.const_buffers.push(buffer);
        }
        self.current_const = Some(next);
        self.const_cursor = 0;

        let buffer = &self.const_buffers[next];
        commands.push(Command::ShaderBuffer {
            stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
            slot: INSTANCE_BUFFER_SLOT,
            buffer: buffer.id(),
            offset: 0,
            size: buffer.size(),
        });
        Ok(())
    }

    /// Map the next tex buffer (or the first one of the frame) and bind it whole.
    pub fn map_next_tex_buffer(
        &mut self,
        render_system: &dyn RenderSystem,
        commands: &mut CommandBuffer,
        min_floats: usize,
    ) -> Result<()> {
        if min_floats * 4 > self.tex_buffer_size {
            return Err(StructuralError::ceiling_exceeded(format!(
                "a single draw needs {} bytes of tex buffer but buffers hold {}",
                min_floats * 4,
                self.tex_buffer_size
            )));
        }
        let next = match self.current_tex {
            Some(idx) => {
                self.stats.tex_rotations += 1;
                idx + 1
            }
            None => 0,
        };
        if next >= self.tex_buffers.len() {
            let buffer = render_system.create_tex_buffer(self.tex_buffer_size, "hlms_tex_buffer")?;
            log::debug!(
                "allocated object tex buffer #{} ({} bytes)",
                self.tex_buffers.len(),
                self.tex_buffer_size
            );
            self.tex_buffers.push(buffer);
        }
        self.current_tex = Some(next);
        self.tex_window_start = 0;
        self.tex_cursor = 0;
        self.bind_tex_window(commands);
        Ok(())
    }

    /// Bind the tex buffer again, optionally restarting the window at the cursor.
    pub fn rebind_tex_buffer(
        &mut self,
        render_system: &dyn RenderSystem,
        commands: &mut CommandBuffer,
        reset: bool,
        min_floats: usize,
    ) -> Result<()> {
        if self.current_tex.is_none() {
            return self.map_next_tex_buffer(render_system, commands, min_floats);
        }
        if reset {
            let total = self.tex_buffer_size / 4;
            let absolute = align_up(self.tex_window_start + self.tex_cursor, self.tex_alignment);
            self.tex_window_start = absolute.min(total);
            self.tex_cursor = 0;
            self.stats.tex_rewindows += 1;
            if self.tex_window_len() < min_floats {
                return self.map_next_tex_buffer(render_system, commands, min_floats);
            }
        }
        self.bind_tex_window(commands);
        Ok(())
    }

    fn bind_tex_window(&self, commands: &mut CommandBuffer) {
        if let Some(buffer) = self.current_tex_buffer() {
            commands.push(Command::TexBuffer {
                stages: ShaderStages::VERTEX,
                slot: WORLD_MATRIX_TEX_SLOT,
                buffer: buffer.id(),
                offset: self.tex_window_start * 4,
                size: self.tex_window_len() * 4,
            });
        }
    }

    /// Bind the current const buffer at [`INSTANCE_BUFFER_SLOT`] when another
    /// `words` fit in it.
    pub fn bind_instance_buffer_if_room(&self, commands: &mut CommandBuffer, words: usize) {
        if let Some(buffer) = self.current_const_buffer() {
            if self.const_cursor + words <= self.const_words() {
                commands.push(Command::ShaderBuffer {
                    stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
                    slot: INSTANCE_BUFFER_SLOT,
                    buffer: buffer.id(),
                    offset: 0,
                    size: buffer.size(),
                });
            }
        }
    }

    /// Append `words` at the const cursor.
    pub fn push_const(&mut self, words: &[u32]) -> Result<()> {
        let buffer = self
            .current_const_buffer()
            .ok_or_else(|| StructuralError::invalid_state("no object const buffer is mapped"))?;
        {
            let mut mapped = buffer.map(self.const_cursor * 4, words.len() * 4)?;
            mapped.copy_from_slice(bytemuck::cast_slice(words));
        }
        self.const_cursor += words.len();
        Ok(())
    }

    /// Append `floats` at the tex cursor.
    pub fn push_tex(&mut self, floats: &[f32]) -> Result<()> {
        let buffer = self
            .current_tex_buffer()
            .ok_or_else(|| StructuralError::invalid_state("no object tex buffer is mapped"))?;
        {
            let offset = (self.tex_window_start + self.tex_cursor) * 4;
            let mut mapped = buffer.map(offset, floats.len() * 4)?;
            mapped.copy_from_slice(bytemuck::cast_slice(floats));
        }
        self.tex_cursor += floats.len();
        Ok(())
    }

    /// Advance the tex cursor to the next multiple of `floats`, clamped to the window.
    pub fn align_tex_cursor(&mut self, floats: usize) {
        self.tex_cursor = align_up(self.tex_cursor, floats).min(self.tex_window_len());
    }

    pub fn const_cursor(&self) -> usize {
        self.const_cursor
    }

    pub fn set_const_cursor(&mut self, words: usize) {
        self.const_cursor = words;
    }

    pub fn tex_cursor(&self) -> usize {
        self.tex_cursor
    }

    pub fn tex_window_start(&self) -> usize {
        self.tex_window_start
    }

    pub fn current_const_buffer(&self) -> Option<&GpuBuffer> {
        self.current_const.and_then(|idx| self.const_buffers.get(idx))
    }

    pub fn current_tex_buffer(&self) -> Option<&GpuBuffer> {
        self.current_tex.and_then(|idx| self.tex_buffers.get(idx))
    }

    /// Index of the mapped const buffer within this frame's ring.
    pub fn current_const_index(&self) -> Option<usize> {
        self.current_const
    }

    pub fn num_const_buffers(&self) -> usize {
        self.const_buffers.len()
    }

    pub fn num_tex_buffers(&self) -> usize {
        self.tex_buffers.len()
    }

    pub fn stats(&self) -> RingStats {
        self.stats
    }

    /// Flush the mapped buffers before the command buffer is replayed.
    pub fn unmap(&self, options: UnmapOptions) {
        if let Some(buffer) = self.current_const_buffer() {
            buffer.unmap(options);
        }
        if let Some(buffer) = self.current_tex_buffer() {
            buffer.unmap(options);
        }
    }

    /// Rewind both rings. Buffers are kept for the next frame.
    pub fn frame_ended(&mut self) {
        self.current_const = None;
        self.const_cursor = 0;
        self.current_tex = None;
        self.tex_window_start = 0;
        self.tex_cursor = 0;
        self.stats = RingStats::default();
    }

    pub fn clear(&mut self) {
        self.frame_ended();
        self.const_buffers.clear();
        self.tex_buffers.clear();
    }
}

/// Round `value` up to a multiple of `multiple`.
#[inline]
pub fn align_up(value: usize, multiple: usize) -> usize {
    if multiple == 0 {
        return value;
    }
    value.div_ceil(multiple) * multiple
}
