//! # RedLilium HLMS
//!
//! Shader permutation selection and per-frame GPU buffer packing for the
//! PBS, Unlit and Terra material kinds.
//!
//! ## Overview
//!
//! - [`Hlms`] - one material kind: caches, datablocks and buffer rings
//! - [`HlmsListener`] - the extension hooks
//! - [`PassScene`] - everything a pass reads about the scene
//! - [`RenderSystem`] - the seam to the graphics API, with a [`DummyRenderSystem`]
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_hlms::{Hlms, HlmsConfig, MaterialKind, WorkerContext};
//!
//! let mut hlms = Hlms::new(MaterialKind::Pbs, HlmsConfig::default(), render_system)?;
//! let pass = hlms.prepare_pass_hash(&scene, false, false)?;
//! for (renderable, movable) in visible {
//!     let entry = hlms.get_material(&pass, renderable, false)?;
//!     let instance = hlms.fill_buffers_for(&entry, &queued, false, last_hash, &mut commands)?;
//! }
//! hlms.pre_command_buffer_execution(&mut commands);
//! ```

pub mod backend;
pub mod buffers;
pub mod cache;
pub mod command_buffer;
pub mod config;
pub mod datablock;
pub mod hlms;
pub mod listener;
pub mod pass;
pub mod pbs;
pub mod properties;
pub mod renderable;
pub mod scene;
pub mod terra;
pub mod types;
pub mod unlit;
pub mod worker;

pub use backend::{Capabilities, DummyRenderSystem, GpuBuffer, RenderSystem, UnmapOptions};
pub use cache::{PassCache, ShaderCacheEntry};
pub use command_buffer::{Command, CommandBuffer, ShaderStages};
pub use config::{AmbientLightMode, HlmsConfig, ShadowFilter};
pub use datablock::{Datablock, DatablockId, MaterialData};
pub use hlms::{Hlms, MaterialKind};
pub use listener::{DefaultListener, HlmsListener, PerObjectColourListener};
pub use renderable::{MovableData, QueuedRenderable, Renderable, VertexElement, VertexSemantic};
pub use scene::{Camera, Light, LightType, PassScene, PassTarget, ShadowNode};
pub use worker::WorkerContext;

pub use redlilium_hlms_core::{Result, StructuralError, StructuralErrorKind};

/// HLMS library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs the crate version once at start-up.
pub fn init() {
    redlilium_hlms_core::init();
    log::info!("RedLilium HLMS v{} initialized", VERSION);
}
