//! Structural error type.
//!
//! Every failure raised by the HLMS is a configuration problem that cannot be
//! fixed by retrying inside the same frame: an invalid root layout, a mesh that
//! lacks the vertex data a material needs, a pass that does not fit in its
//! buffer. They all share one error type carrying a kind and a context string
//! naming the offending set, slot, material or renderable.

use std::fmt;

/// Classification of a [`StructuralError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralErrorKind {
    /// A root layout violates a binding-range rule.
    InvalidRootLayout,
    /// Material and renderable state are incompatible.
    InvalidState,
    /// The requested entry point is not supported by this implementation.
    NotImplemented,
    /// A pass or light buffer would exceed its hard ceiling.
    BufferCeilingExceeded,
    /// The bytes written to a buffer differ from the computed size.
    SizeMismatch,
    /// Malformed input (e.g. unparsable JSON).
    InvalidParams,
}

impl fmt::Display for StructuralErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidRootLayout => "invalid root layout",
            Self::InvalidState => "invalid state",
            Self::NotImplemented => "not implemented",
            Self::BufferCeilingExceeded => "buffer ceiling exceeded",
            Self::SizeMismatch => "size mismatch",
            Self::InvalidParams => "invalid parameters",
        };
        f.write_str(name)
    }
}

/// A fatal configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralError {
    pub kind: StructuralErrorKind,
    pub context: String,
}

impl StructuralError {
    /// Create a new error of the given kind.
    pub fn new(kind: StructuralErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
        }
    }

    pub fn invalid_root_layout(context: impl Into<String>) -> Self {
        Self::new(StructuralErrorKind::InvalidRootLayout, context)
    }

    pub fn invalid_state(context: impl Into<String>) -> Self {
        Self::new(StructuralErrorKind::InvalidState, context)
    }

    pub fn not_implemented(context: impl Into<String>) -> Self {
        Self::new(StructuralErrorKind::NotImplemented, context)
    }

    pub fn ceiling_exceeded(context: impl Into<String>) -> Self {
        Self::new(StructuralErrorKind::BufferCeilingExceeded, context)
    }

    pub fn size_mismatch(context: impl Into<String>) -> Self {
        Self::new(StructuralErrorKind::SizeMismatch, context)
    }

    pub fn invalid_params(context: impl Into<String>) -> Self {
        Self::new(StructuralErrorKind::InvalidParams, context)
    }
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.context)
    }
}

impl std::error::Error for StructuralError {}

/// Result alias used throughout the HLMS crates.
pub type Result<T> = std::result::Result<T, StructuralError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StructuralError::not_implemented("slow path");
        assert_eq!(err.to_string(), "not implemented: slow path");

        let err = StructuralError::invalid_root_layout("set 0 overlaps set 1");
        assert_eq!(
            err.to_string(),
            "invalid root layout: set 0 overlaps set 1"
        );
    }

    #[test]
    fn test_error_kind_preserved() {
        let err = StructuralError::size_mismatch("pass buffer");
        assert_eq!(err.kind, StructuralErrorKind::SizeMismatch);
        assert_eq!(err.context, "pass buffer");
    }
}
