//! Errors for the AST lift and the top-level decompile pipeline.

use thiserror::Error;

/// Failures specific to the region-to-AST lift: an expression-stack
/// underflow, or a region shape the lift does not expect to see (internal
/// invariant violations use `debug_assert!`/`unreachable!` instead -- this
/// variant is for malformed input that reaches the lift, such as an
/// unresolvable call-argument count).
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("expression stack underflow lifting block at address {addr}")]
    StackUnderflow { addr: u32 },

    #[error("unmatched PushFrame/Call argument count at address {addr}")]
    UnmatchedCallFrame { addr: u32 },
}

/// Composes every stage's error into one type for `decompile()`.
#[derive(Debug, Error)]
pub enum DecompileError {
    #[error(transparent)]
    Loader(#[from] tsdc_loader::LoaderError),
    /// A disassembly/CFG-build failure surfaced directly -- `analyze()`
    /// hasn't run yet, so this can never be the dominator internal
    /// invariant (that only ever arrives wrapped in `Analysis`).
    #[error(transparent)]
    Core(#[from] tsdc_core::CoreError),
    #[error(transparent)]
    Analysis(#[from] tsdc_analysis::AnalysisError),
    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl DecompileError {
    /// Process exit code this error should produce, mirroring the CLI's
    /// convention of distinct codes per pipeline stage.
    pub fn exit_code(&self) -> i32 {
        match self {
            DecompileError::Loader(_) => 1,
            DecompileError::Core(_) => 2,
            DecompileError::Analysis(_) => 3,
            DecompileError::Emit(_) => 3,
        }
    }
}
