//! The `FileData` contract.
//!
//! `tsdc-core` never parses a DSO container itself -- that is the loader's
//! job (`tsdc-loader`, a separate collaborator crate). This module
//! only defines the trait the disassembler programs against, so the core
//! crate has zero knowledge of file formats.

/// Read-only view over a loaded DSO file, as delivered by the container
/// loader. The identifier fixup is assumed already applied:
/// `identifier` answers cross-table references directly, it does not parse
/// the fixup table itself.
pub trait FileData {
    /// Number of 32-bit words in the code segment.
    fn code_size(&self) -> u32;

    /// The code-segment word at index `at`.
    fn op(&self, at: u32) -> u32;

    /// Resolves the identifier-table reference recorded at code offset
    /// `at`, given the raw word found there. Returns `None` if `raw` is the
    /// "no identifier" sentinel.
    fn identifier(&self, at: u32, raw: u32) -> Option<String>;

    /// Resolves a string-table index to its string value. Used by the AST
    /// lift, not by the disassembler.
    fn string_table(&self, raw: u32) -> String;

    /// Resolves a float-table index to its value. Used by the AST lift,
    /// not by the disassembler.
    fn float_table(&self, raw: u32) -> f64;
}
