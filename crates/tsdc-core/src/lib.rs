//! Bytecode-level decompiler primitives: the opcode table, disassembler,
//! CFG builder, and dominator computation. Everything in this crate is
//! parametric over [`FileData`] -- it never touches a DSO container
//! directly, so it has no knowledge of any file format.

pub mod cfg;
pub mod dominator;
pub mod disassembler;
pub mod error;
pub mod file_data;
pub mod instruction;
pub mod opcode;

pub use cfg::{BasicBlock, Cfg, build_cfgs};
pub use disassembler::{disassemble, Disassembly};
pub use dominator::{back_edges, natural_loop, BackEdge, Dominators};
pub use error::CoreError;
pub use file_data::FileData;
pub use instruction::{CallType, Ident, Instruction, Op};
pub use opcode::{AdvanceStringKind, BinaryOp, BranchKind, ConvertTarget, Opcode};
