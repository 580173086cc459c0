//! Unlit: layered diffuse textures with per-layer blend modes.
//!
//! The pass buffer carries only view-projection matrices, and each draw
//! stores its own world-view-projection in the tex buffer.

mod material;
mod object;
mod pass;

pub(crate) mod hash;
pub mod properties;

pub use material::{
    channel, UnlitMaterial, ANIMATION_MATRICES_SIZE_IN_GPU, MATERIAL_SIZE_IN_GPU, NUM_TEXTURE_TYPES,
    SWIZZLE_IDENTITY,
};
