//! Error taxonomy shared by every stage of the load → transform → rebuild
//! pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AviError {
    /// Structural violation of the RIFF/AVI/idx1 shape.
    #[error("Format error: {0}")]
    Format(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Fewer bytes in the buffer than a declared size implies.
    #[error("Truncated {what}: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("Frame index {index} out of range (table has {len} records)")]
    OutOfRange { index: usize, len: usize },
    /// A frame table was used against a buffer it was not derived from.
    #[error("Stale frame table: built for buffer generation {table}, buffer is at generation {buffer}")]
    StaleReference { table: u64, buffer: u64 },
    #[error("Invalid transform: {0}")]
    InvalidTransform(String),
    #[error("Recipe error: {0}")]
    Recipe(#[from] serde_json::Error),
}

impl AviError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        AviError::Format(msg.into())
    }
}
