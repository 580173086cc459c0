//! # RedLilium HLMS Core
//!
//! Leaf building blocks shared by every material implementation of the
//! RedLilium HLMS:
//!
//! - [`IdString`] - hashed property names
//! - [`PropertyStore`] - the sparse property bag that selects shader permutations
//! - [`RootLayout`] - per-set descriptor binding ranges and their validation
//! - [`BufferWriter`] - bounds-checked packing of GPU constant data
//! - [`StructuralError`] - fatal configuration errors

pub mod buffer_writer;
pub mod error;
pub mod id_string;
pub mod math;
pub mod property;
pub mod root_layout;

pub use buffer_writer::BufferWriter;
pub use error::{Result, StructuralError, StructuralErrorKind};
pub use id_string::IdString;
pub use property::PropertyStore;
pub use root_layout::{
    ArrayBinding, DescBindingKind, DescBindingRange, RootLayout, MAX_BOUND_DESCRIPTOR_SETS,
};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs the crate version once at start-up.
pub fn init() {
    log::info!("RedLilium HLMS core v{} initialized", VERSION);
}
