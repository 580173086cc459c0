//! Terrain rendering on top of the PBS lighting model.
//!
//! Cells are drawn without vertex buffers: the vertex shader rebuilds each
//! vertex from a 16-word cell record and the terrain height map. The pass
//! buffer is the PBS one.

mod cell;
mod material;
mod object;

pub(crate) mod hash;
pub mod properties;

pub use cell::{TerrainCell, TerrainInfo};
pub use material::{
    identity_offset_scale, TerraMaterial, TerraTexture, MATERIAL_SIZE_IN_GPU, NUM_TEXTURE_TYPES,
};
