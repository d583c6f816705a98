//! Read session configuration

/// Options for opening a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadOptions {
    /// Reject references beyond the chunk table (disable for raw inspection)
    pub check_refs: bool,
    /// Read buffer capacity in bytes
    pub buffer_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            check_refs: true,
            buffer_size: 8 * 1024,
        }
    }
}

impl ReadOptions {
    /// Tolerates out-of-range references, for tools that inspect damaged files
    pub fn raw_inspection() -> Self {
        Self {
            check_refs: false,
            ..Self::default()
        }
    }
}
