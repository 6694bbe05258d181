//! The instruction model.
//!
//! [`Instruction`] is an immutable record: an `addr`, a tagged [`Op`]
//! payload, and an `is_branch_target` flag set by the disassembler's
//! branch-target pass. Node polymorphism is modeled as one tagged enum with
//! per-variant fields rather than a class hierarchy.

use serde::{Deserialize, Serialize};

use crate::opcode::{AdvanceStringKind, BinaryOp, BranchKind, ConvertTarget};

/// A single decoded instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Code-segment offset of this instruction's opcode word.
    pub addr: u32,
    /// The decoded operation and its operands.
    pub op: Op,
    /// Set by the disassembler's branch-target pass if some
    /// branch in the code segment targets this instruction.
    pub is_branch_target: bool,
}

impl Instruction {
    pub fn new(addr: u32, op: Op) -> Self {
        Instruction {
            addr,
            op,
            is_branch_target: false,
        }
    }

    /// `true` if this instruction ends a basic block with no fall-through
    /// (`Return`) or a branch (which may still fall through on one arm).
    pub fn is_branch(&self) -> bool {
        matches!(self.op, Op::Branch { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self.op, Op::Return { .. })
    }

    pub fn is_func_decl(&self) -> bool {
        matches!(self.op, Op::FunctionDecl { .. })
    }
}

/// An identifier reference resolved through the loader's fixup table. `None`
/// means the raw word was the "no identifier" sentinel.
pub type Ident = Option<String>;

/// The decoded operation and its operands for one instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    FunctionDecl {
        name: Ident,
        namespace: Ident,
        package: Ident,
        has_body: bool,
        end_addr: u32,
        args: Vec<Ident>,
    },
    CreateObject {
        parent_name: Ident,
        is_datablock: bool,
        fail_jump_addr: u32,
    },
    AddObject {
        place_at_root: bool,
    },
    EndObject {
        value: bool,
    },

    Branch {
        target_addr: u32,
        kind: BranchKind,
    },

    Return {
        returns_value: bool,
    },

    Binary {
        op: BinaryOp,
    },
    UnaryNeg,
    Not,
    NotF,
    OnesCompl,
    StringCompare,

    SetCurVar {
        name: Ident,
    },
    SetCurVarArray,
    LoadVar,
    SaveVar,

    SetCurObject {
        is_new: bool,
    },
    SetCurField {
        name: Ident,
    },
    SetCurFieldArray,
    LoadField,
    SaveField,

    ConvertToType {
        target: ConvertTarget,
    },

    /// Small integer immediates are encoded directly in the instruction
    /// stream, so the value is decoded eagerly.
    LoadImmediateUint(i64),
    /// Float immediates are float-table indices; resolving them to an
    /// `f64` is the AST lift's job, not the disassembler's, so
    /// the raw index is kept as-is.
    LoadImmediateFloat(u32),
    /// String-table index; resolved by the AST lift.
    LoadImmediateStringRef(u32),
    /// Identifier references are resolved eagerly through the loader's
    /// fixup table, same as every other identifier operand.
    LoadImmediateIdentRef(Ident),
    /// Tag-string-table index; resolved by the AST lift.
    LoadImmediateTagRef(u32),

    Call {
        name: Ident,
        namespace: Ident,
        call_type: CallType,
    },

    AdvanceString {
        kind: AdvanceStringKind,
    },
    Rewind {
        terminate: bool,
    },

    Push,
    PushFrame,
    DebugBreak,
    Unused,
}

/// How a `Call` instruction dispatches: a plain function, a method on the
/// current object, or an explicit parent-namespace call (`Parent::foo()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallType {
    Function,
    Method,
    Parent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instruction_has_branch_target_unset() {
        let i = Instruction::new(0, Op::Push);
        assert_eq!(i.addr, 0);
        assert!(!i.is_branch_target);
    }

    #[test]
    fn is_branch_detects_branch_variant() {
        let i = Instruction::new(
            4,
            Op::Branch {
                target_addr: 10,
                kind: BranchKind::JmpIfNot,
            },
        );
        assert!(i.is_branch());
        assert!(!i.is_return());
        assert!(!i.is_func_decl());
    }

    #[test]
    fn is_return_detects_return_variant() {
        let i = Instruction::new(8, Op::Return { returns_value: true });
        assert!(i.is_return());
        assert!(!i.is_branch());
    }

    #[test]
    fn is_func_decl_detects_function_decl_variant() {
        let i = Instruction::new(
            0,
            Op::FunctionDecl {
                name: Some("foo".into()),
                namespace: None,
                package: None,
                has_body: true,
                end_addr: 40,
                args: vec![Some("%a".into())],
            },
        );
        assert!(i.is_func_decl());
    }

    #[test]
    fn serde_roundtrip() {
        let i = Instruction::new(
            12,
            Op::Call {
                name: Some("echo".into()),
                namespace: None,
                call_type: CallType::Function,
            },
        );
        let json = serde_json::to_string(&i).unwrap();
        let back: Instruction = serde_json::from_str(&json).unwrap();
        assert_eq!(i, back);
    }
}
