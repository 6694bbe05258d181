//! Core error types for tsdc-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering every
//! fatal failure mode of the disassembler and control-flow builder. None of
//! these are recovered locally -- they abort the current file's
//! decompilation and propagate to the CLI.

use thiserror::Error;

/// Fatal errors produced while disassembling a DSO code segment or building
/// its control-flow graphs.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The code segment ended in the middle of an instruction's operands.
    #[error("truncated code segment at offset {offset}: expected {expected} more word(s)")]
    TruncatedCode { offset: u32, expected: u32 },

    /// A 32-bit word at `offset` does not match any known opcode.
    #[error("unknown opcode {raw:#x} at offset {offset}")]
    UnknownOpcode { offset: u32, raw: u32 },

    /// A branch's `target_addr` does not name an existing instruction.
    #[error("branch at offset {offset} targets {target}, which is not an instruction boundary")]
    InvalidBranchTarget { offset: u32, target: u32 },

    /// An `AdvanceString` instruction carried an unrecognized sub-kind tag.
    #[error("invalid advance-string kind {raw:#x} at offset {offset}")]
    InvalidAdvanceStringKind { offset: u32, raw: u32 },

    /// A region-graph (or CFG) node had more than two successors, which the
    /// Torque encoding never produces.
    #[error("node at {addr:#x} has {count} successors (at most 2 is representable)")]
    TooManySuccessors { addr: u32, count: usize },

    /// A node flagged as a cycle start did not end in a branch instruction.
    #[error("cyclic block at {addr:#x} does not end in a branch")]
    CyclicBlockNotBranch { addr: u32 },

    /// The dominator algorithm failed to assign an immediate dominator to a
    /// node reachable from the entry -- this indicates a bug in this crate,
    /// not a malformed input, since every reachable non-entry node must
    /// have one.
    #[error("internal invariant violated: node {addr:#x} reachable but has no immediate dominator")]
    MissingDominator { addr: u32 },
}
