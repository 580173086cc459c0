//! Physically based shading.
//!
//! - `hash`: renderable properties, caster reduction and texture units
//! - `pass`: the pass buffer and its light arrays
//! - `object`: per-draw instance data and binds
//!
//! Terra shares the pass half of this module.

mod material;
mod object;

pub(crate) mod hash;
pub(crate) mod pass;
pub mod properties;

pub use material::{
    BlendMode, Brdf, BrdfFlags, PbsMaterial, PbsTexture, TransparencyMode, Workflow,
    MATERIAL_SIZE_IN_GPU, NUM_TEXTURE_TYPES,
};
pub use pass::{LIGHT0_CEILING, LIGHT_AREA_CEILING_LIGHTS};
