//! # Mosh Core
//!
//! AVI index rewriting for datamoshing: parse the idx1 frame table,
//! reorder/duplicate/re-flag its records, and mux a structurally valid
//! container back out without touching the compressed payloads.

// ============================================================================
// Container Structure
// ============================================================================
pub mod riff;
pub mod index;
pub mod frame;
pub mod table;

// ============================================================================
// Glitch Transforms
// ============================================================================
pub mod transform;

// ============================================================================
// Rebuild / IO
// ============================================================================
pub mod mux;
pub mod container;

// ============================================================================
// Metadata
// ============================================================================
pub mod probe;

pub mod error;

#[cfg(test)]
mod fixture;

pub use container::AviFile;
pub use error::AviError;
pub use frame::Frame;
pub use index::{FrameKind, IndexRecord, AVIIF_KEYFRAME};
pub use mux::RebuildReport;
pub use riff::FourCc;
pub use table::FrameTable;
pub use transform::{Transform, TransformChain};

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
