//! The opcode table.
//!
//! Enumerates every DSO opcode, classifies it (jump / return / function-decl
//! / unused), and defines the small sub-enums (`BranchKind`,
//! `ConvertTarget`, `AdvanceStringKind`) that instruction operands are typed
//! over. This module owns *classification*, not decoding -- the
//! type-specific operand layout for each opcode lives in
//! [`crate::disassembler`], which dispatches on the variants defined here.

use serde::{Deserialize, Serialize};

/// Every opcode the DSO code segment may contain.
///
/// Binary arithmetic/comparison/logic opcodes are folded into a single
/// [`Opcode::Binary`] tag carrying a [`BinaryOp`], matching how
/// `Instruction::Binary` is a single tagged operation rather than one
/// instruction variant per operator -- the distinction that matters to the
/// decompiler is "this consumes two stack values and produces one", not
/// which specific arithmetic operator it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    FuncDecl,
    CreateObject,
    AddObject,
    EndObject,

    Jmp,
    JmpIf,
    JmpIff,
    JmpIfNot,
    JmpIffNot,
    JmpIfNp,
    JmpIfNotNp,

    Return,

    Binary(BinaryOp),
    UnaryNeg,
    Not,
    NotF,
    OnesCompl,
    StringCompare,

    SetCurVar,
    SetCurVarArray,
    LoadVar,
    SaveVar,

    SetCurObject,
    SetCurObjectNew,
    SetCurField,
    SetCurFieldArray,
    LoadField,
    SaveField,

    Convert(ConvertTarget),

    LoadImmediateUint,
    LoadImmediateFloat,
    LoadImmediateStringRef,
    LoadImmediateIdentRef,
    LoadImmediateTagRef,

    CallFunction,
    CallMethod,
    CallParent,

    AdvanceString(AdvanceStringKind),
    Rewind,
    RewindTerminate,

    Push,
    PushFrame,
    DebugBreak,

    Unused,
}

/// Binary operators folded under [`Opcode::Binary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    Xor,
    Shl,
    Shr,
    And,
    Or,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
}

/// Branch sub-kinds. `Jmp` is unconditional; the `_Np` ("no pop") variants
/// leave the tested operand on the stack instead of consuming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchKind {
    Jmp,
    JmpIf,
    JmpIff,
    JmpIfNot,
    JmpIffNot,
    JmpIfNp,
    JmpIfNotNp,
}

impl BranchKind {
    /// `Jmp` is the only unconditional branch.
    pub fn is_unconditional(&self) -> bool {
        matches!(self, BranchKind::Jmp)
    }

    /// `true` for the `_Not` family: the fall-through side is the "then"
    /// side once the condition is inverted to a positive sense.
    pub fn inverts_condition(&self) -> bool {
        matches!(self, BranchKind::JmpIfNot | BranchKind::JmpIffNot | BranchKind::JmpIfNotNp)
    }

    /// `true` for the `_Np` family, which does not pop the tested operand.
    pub fn no_pop(&self) -> bool {
        matches!(self, BranchKind::JmpIfNp | BranchKind::JmpIfNotNp)
    }
}

/// Conversion target for `OP_*_TO_*` opcodes. `None` clears the "STR"
/// return-value flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvertTarget {
    Float,
    Uint,
    String,
    None,
}

/// Sub-kind of an `AdvanceString` instruction (string-building).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvanceStringKind {
    Plain,
    AppendChar(u8),
    Comma,
    Null,
}

impl Opcode {
    /// `true` for any branch opcode (conditional or not).
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Opcode::Jmp
                | Opcode::JmpIf
                | Opcode::JmpIff
                | Opcode::JmpIfNot
                | Opcode::JmpIffNot
                | Opcode::JmpIfNp
                | Opcode::JmpIfNotNp
        )
    }

    /// `true` for `Return`, which has no fall-through successor.
    pub fn is_return(&self) -> bool {
        matches!(self, Opcode::Return)
    }

    /// `true` for `FuncDecl`, which opens a function's code region.
    pub fn is_func_decl(&self) -> bool {
        matches!(self, Opcode::FuncDecl)
    }

    /// `true` for unused/filler opcodes, preserved but never executed.
    pub fn is_unused(&self) -> bool {
        matches!(self, Opcode::Unused)
    }

    /// `true` for every instruction the disassembler's "STR" tracker marks
    /// as producing a visible value: every `Load*`, `Save*` of
    /// string operands, string-to-string converts, immediates, calls, and
    /// rewinds.
    pub fn sets_returnable_value(&self) -> bool {
        matches!(
            self,
            Opcode::LoadVar
                | Opcode::LoadField
                | Opcode::SaveVar
                | Opcode::SaveField
                | Opcode::LoadImmediateUint
                | Opcode::LoadImmediateFloat
                | Opcode::LoadImmediateStringRef
                | Opcode::LoadImmediateIdentRef
                | Opcode::LoadImmediateTagRef
                | Opcode::CallFunction
                | Opcode::CallMethod
                | Opcode::CallParent
                | Opcode::Rewind
                | Opcode::RewindTerminate
                | Opcode::Convert(ConvertTarget::String)
        )
    }

    /// `true` for the converts that clear the "STR" flag (`*_to_None`).
    pub fn clears_returnable_value(&self) -> bool {
        matches!(self, Opcode::Convert(ConvertTarget::None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jump_classification() {
        assert!(Opcode::Jmp.is_jump());
        assert!(Opcode::JmpIfNotNp.is_jump());
        assert!(!Opcode::Return.is_jump());
        assert!(!Opcode::Push.is_jump());
    }

    #[test]
    fn branch_kind_inversion() {
        assert!(BranchKind::JmpIfNot.inverts_condition());
        assert!(BranchKind::JmpIffNot.inverts_condition());
        assert!(!BranchKind::JmpIf.inverts_condition());
        assert!(!BranchKind::Jmp.inverts_condition());
    }

    #[test]
    fn branch_kind_no_pop() {
        assert!(BranchKind::JmpIfNp.no_pop());
        assert!(BranchKind::JmpIfNotNp.no_pop());
        assert!(!BranchKind::JmpIf.no_pop());
    }

    #[test]
    fn branch_kind_unconditional_only_jmp() {
        assert!(BranchKind::Jmp.is_unconditional());
        assert!(!BranchKind::JmpIf.is_unconditional());
    }

    #[test]
    fn returnable_value_classification() {
        assert!(Opcode::LoadImmediateUint.sets_returnable_value());
        assert!(Opcode::CallFunction.sets_returnable_value());
        assert!(!Opcode::Push.sets_returnable_value());
        assert!(Opcode::Convert(ConvertTarget::None).clears_returnable_value());
        assert!(!Opcode::Convert(ConvertTarget::Float).clears_returnable_value());
    }

    #[test]
    fn func_decl_and_unused_classification() {
        assert!(Opcode::FuncDecl.is_func_decl());
        assert!(!Opcode::Return.is_func_decl());
        assert!(Opcode::Unused.is_unused());
        assert!(!Opcode::Push.is_unused());
    }
}
