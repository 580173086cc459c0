//! Hashed identifiers for property names.

use std::fmt;

use xxhash_rust::{const_xxh32, xxh32};

const SEED: u32 = 0;

/// A 32-bit hash of a property or piece name.
///
/// Names are never stored; two `IdString`s are equal when their hashes are.
/// Use [`IdString::from_static`] to build constants at compile time.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IdString(u32);

impl IdString {
    /// Hash a name at compile time.
    pub const fn from_static(name: &'static str) -> Self {
        Self(const_xxh32::xxh32(name.as_bytes(), SEED))
    }

    /// Hash a name built at runtime (e.g. `hlms_shadowmap3_uv_min_x`).
    pub fn new(name: &str) -> Self {
        Self(xxh32::xxh32(name.as_bytes(), SEED))
    }

    /// Hash `prefix` immediately followed by the decimal `index`.
    pub fn indexed(prefix: &str, index: usize) -> Self {
        Self::new(&format!("{prefix}{index}"))
    }

    /// Hash `prefix`, the decimal `index` and `suffix`.
    pub fn indexed_with_suffix(prefix: &str, index: usize, suffix: &str) -> Self {
        Self::new(&format!("{prefix}{index}{suffix}"))
    }

    /// Wrap a raw hash value.
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// The hash reinterpreted as `i32`, the way it is stored in a property value.
    pub const fn as_property_value(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Debug for IdString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdString({:#010x})", self.0)
    }
}

impl fmt::Display for IdString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<&str> for IdString {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFFUSE_MAP: IdString = IdString::from_static("diffuse_map");

    #[test]
    fn test_const_and_runtime_hash_agree() {
        assert_eq!(DIFFUSE_MAP, IdString::new("diffuse_map"));
        assert_ne!(DIFFUSE_MAP, IdString::new("normal_map"));
    }

    #[test]
    fn test_indexed_names() {
        assert_eq!(
            IdString::indexed("hlms_shadowmap", 3),
            IdString::new("hlms_shadowmap3")
        );
        assert_eq!(
            IdString::indexed_with_suffix("hlms_shadowmap", 1, "_uv_min_x"),
            IdString::new("hlms_shadowmap1_uv_min_x")
        );
    }
}
