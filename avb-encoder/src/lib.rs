//! AVB Encoder Library
//!
//! This library writes an in-memory [`AvbFile`] object graph back to the
//! `.avb` container format. Writing happens in two passes: [`plan`] assigns
//! every reachable object its chunk index, then [`writer`] encodes each
//! object with references rewritten through that mapping.

pub mod plan;
pub mod writer;

pub use plan::WritePlan;
pub use writer::{write_file, write_to, AvbFileExt, WriteSummary};

use avb_core::{AvbFile, ByteOrder};

/// Result type for avb-encoder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for avb-encoder operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("AVB core error: {0}")]
    Core(#[from] avb_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{class} record does not end with the closing tag")]
    UnterminatedRecord { class: &'static str },
}

/// Writer configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteOptions {
    /// Byte order of the output session
    pub byte_order: ByteOrder,
    /// Stamp the current time as the save time (otherwise keep the header's)
    pub update_save_time: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Little,
            update_save_time: true,
        }
    }
}

impl WriteOptions {
    /// Keeps the source file's byte order and save time, for faithful rewrites
    pub fn preserving(file: &AvbFile) -> Self {
        Self {
            byte_order: file.byte_order(),
            update_save_time: false,
        }
    }
}
