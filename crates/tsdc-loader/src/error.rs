//! Errors produced while parsing a DSO container.

use thiserror::Error;

/// Errors produced by [`crate::file_data::load`].
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The container ended before a section's declared length was
    /// satisfied.
    #[error("truncated {section}: need {needed} more byte(s)")]
    Truncated { section: &'static str, needed: usize },

    /// The file did not start with the expected magic word.
    #[error("bad magic: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u32, found: u32 },

    /// The format version word named a version this loader does not parse.
    #[error("unsupported DSO version: {0}")]
    UnsupportedVersion(u32),

    /// A section's declared byte length did not evenly divide its element
    /// size, or its declared count did not match the bytes actually
    /// present.
    #[error("section length mismatch in {section}: expected {expected}, found {found}")]
    SectionLengthMismatch {
        section: &'static str,
        expected: u32,
        found: u32,
    },

    /// A fixup entry named a code offset outside the code segment.
    #[error("fixup offset {offset} out of range for code segment of {code_size} word(s)")]
    FixupOutOfRange { offset: u32, code_size: u32 },
}

impl LoaderError {
    /// CLI exit code for this error: all loader errors are file errors.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
