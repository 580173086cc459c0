//! Sequential packing of GPU constant data.
//!
//! The HLMS serializes pass and object data field by field in the exact order
//! the shader declares its structs. [`BufferWriter`] wraps the mapped byte span,
//! advances a cursor on every write and keeps the count of bytes written so the
//! caller can compare it against the size it computed beforehand.
//!
//! Writes past the end of the span are dropped and latch an overflow flag;
//! [`BufferWriter::finish`] reports it.

use bytemuck::Pod;

use crate::error::{Result, StructuralError};
use crate::math::{mat4_rows, mat4x3_rows, Mat4, Vec3, Vec4};

pub struct BufferWriter<'a> {
    data: &'a mut [u8],
    cursor: usize,
    overflowed: bool,
}

impl<'a> BufferWriter<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data,
            cursor: 0,
            overflowed: false,
        }
    }

    /// Append any plain-old-data value.
    pub fn write<T: Pod>(&mut self, value: T) {
        self.write_bytes(bytemuck::bytes_of(&value));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.cursor + bytes.len();
        if end > self.data.len() {
            self.overflowed = true;
            return;
        }
        self.data[self.cursor..end].copy_from_slice(bytes);
        self.cursor = end;
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write(value);
    }

    pub fn write_f32s(&mut self, values: &[f32]) {
        self.write_bytes(bytemuck::cast_slice(values));
    }

    /// `xyz` followed by `w`.
    pub fn write_vec3_w(&mut self, v: &Vec3, w: f32) {
        self.write_f32s(&[v.x, v.y, v.z, w]);
    }

    /// `xyz` followed by the raw bits of `w`.
    pub fn write_vec3_u32(&mut self, v: &Vec3, w: u32) {
        self.write_f32s(&[v.x, v.y, v.z]);
        self.write_u32(w);
    }

    pub fn write_vec4(&mut self, v: &Vec4) {
        self.write_f32s(&[v.x, v.y, v.z, v.w]);
    }

    /// 16 floats, row-major.
    pub fn write_mat4(&mut self, m: &Mat4) {
        self.write_f32s(&mat4_rows(m));
    }

    /// The top three rows of `m` (12 floats).
    pub fn write_mat4x3(&mut self, m: &Mat4) {
        self.write_f32s(&mat4x3_rows(m));
    }

    /// Write `count` zero floats.
    pub fn pad_f32(&mut self, count: usize) {
        for _ in 0..count {
            self.write_f32(0.0);
        }
    }

    /// Advance `count` floats without touching their contents.
    pub fn skip_f32(&mut self, count: usize) {
        let end = self.cursor + count * 4;
        if end > self.data.len() {
            self.overflowed = true;
            self.cursor = self.data.len();
        } else {
            self.cursor = end;
        }
    }

    pub fn bytes_written(&self) -> usize {
        self.cursor
    }

    pub fn floats_written(&self) -> usize {
        self.cursor / 4
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Check that exactly `expected` bytes were written.
    pub fn finish(self, expected: usize, label: &str) -> Result<usize> {
        if self.overflowed {
            return Err(StructuralError::size_mismatch(format!(
                "{label}: writes overflowed the mapped range of {} bytes",
                self.data.len()
            )));
        }
        if self.cursor != expected {
            return Err(StructuralError::size_mismatch(format!(
                "{label}: wrote {} bytes but {} were computed",
                self.cursor, expected
            )));
        }
        Ok(self.cursor)
    }
}

/// Read the `index`-th `f32` of a byte span.
pub fn read_f32(bytes: &[u8], index: usize) -> f32 {
    bytemuck::pod_read_unaligned(&bytes[index * 4..index * 4 + 4])
}

/// Read the `index`-th `u32` of a byte span.
pub fn read_u32(bytes: &[u8], index: usize) -> u32 {
    bytemuck::pod_read_unaligned(&bytes[index * 4..index * 4 + 4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StructuralErrorKind;

    #[test]
    fn test_sequential_writes() {
        let mut storage = vec![0u8; 32];
        let mut writer = BufferWriter::new(&mut storage);
        writer.write_f32(1.5);
        writer.write_u32(7);
        writer.write_vec3_w(&Vec3::new(1.0, 2.0, 3.0), 4.0);
        assert_eq!(writer.bytes_written(), 24);
        assert_eq!(writer.finish(24, "test").unwrap(), 24);

        assert_eq!(read_f32(&storage, 0), 1.5);
        assert_eq!(read_u32(&storage, 1), 7);
        assert_eq!(read_f32(&storage, 5), 4.0);
    }

    #[test]
    fn test_size_mismatch() {
        let mut storage = vec![0u8; 16];
        let mut writer = BufferWriter::new(&mut storage);
        writer.write_f32(1.0);
        let err = writer.finish(16, "pass").unwrap_err();
        assert_eq!(err.kind, StructuralErrorKind::SizeMismatch);
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut storage = vec![0u8; 8];
        let mut writer = BufferWriter::new(&mut storage);
        writer.write_f32s(&[1.0, 2.0, 3.0]);
        assert!(writer.overflowed());
        assert_eq!(writer.bytes_written(), 0);
        assert!(writer.finish(0, "tiny").is_err());
    }

    #[test]
    fn test_skip_leaves_contents() {
        let mut storage = vec![0xFFu8; 12];
        let mut writer = BufferWriter::new(&mut storage);
        writer.skip_f32(1);
        writer.pad_f32(1);
        writer.write_f32(3.0);
        assert_eq!(writer.finish(12, "skip").unwrap(), 12);
        assert_eq!(read_u32(&storage, 0), u32::MAX);
        assert_eq!(read_f32(&storage, 1), 0.0);
    }
}
