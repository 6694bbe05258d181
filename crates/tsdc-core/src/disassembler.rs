//! The disassembler.
//!
//! Linear sweep of the code segment. At each step a 32-bit opcode word is
//! read and dispatched to a type-specific decoder that consumes the
//! expected number of operand words from the same stream. Identifier
//! operands are resolved eagerly through [`FileData::identifier`]; string-
//! and float-table operands are left as raw indices for the AST lift.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::file_data::FileData;
use crate::instruction::{CallType, Ident, Instruction, Op};
use crate::opcode::{AdvanceStringKind, BinaryOp, BranchKind, ConvertTarget};

/// The raw opcode tag word, before operand decoding. One DSO build's worth
/// of opcode assignments -- the exact integer values are an internal detail
/// of this crate, not part of the public contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
enum RawTag {
    FuncDecl = 0,
    CreateObject = 1,
    AddObject = 2,
    EndObject = 3,
    Jmp = 4,
    JmpIf = 5,
    JmpIff = 6,
    JmpIfNot = 7,
    JmpIffNot = 8,
    JmpIfNp = 9,
    JmpIfNotNp = 10,
    Return = 11,
    Add = 12,
    Sub = 13,
    Mul = 14,
    Div = 15,
    Mod = 16,
    BitAnd = 17,
    BitOr = 18,
    Xor = 19,
    Shl = 20,
    Shr = 21,
    And = 22,
    Or = 23,
    CmpEq = 24,
    CmpNe = 25,
    CmpLt = 26,
    CmpLe = 27,
    CmpGt = 28,
    CmpGe = 29,
    Neg = 30,
    Not = 31,
    NotF = 32,
    OnesCompl = 33,
    CompareStr = 34,
    SetCurVar = 35,
    SetCurVarArray = 36,
    LoadVar = 37,
    SaveVar = 38,
    SetCurObject = 39,
    SetCurObjectNew = 40,
    SetCurField = 41,
    SetCurFieldArray = 42,
    LoadField = 43,
    SaveField = 44,
    ToFloat = 45,
    ToUint = 46,
    ToString = 47,
    ToNone = 48,
    LoadImmedUint = 49,
    LoadImmedFloat = 50,
    LoadImmedStringRef = 51,
    LoadImmedIdentRef = 52,
    LoadImmedTagRef = 53,
    CallFunction = 54,
    CallMethod = 55,
    CallParent = 56,
    AdvanceStringPlain = 57,
    AdvanceStringAppendChar = 58,
    AdvanceStringComma = 59,
    AdvanceStringNull = 60,
    Rewind = 61,
    RewindTerminate = 62,
    Push = 63,
    PushFrame = 64,
    DebugBreak = 65,
    Unused = 66,
}

impl RawTag {
    fn from_word(word: u32) -> Option<RawTag> {
        use RawTag::*;
        const TABLE: &[RawTag] = &[
            FuncDecl, CreateObject, AddObject, EndObject, Jmp, JmpIf, JmpIff, JmpIfNot,
            JmpIffNot, JmpIfNp, JmpIfNotNp, Return, Add, Sub, Mul, Div, Mod, BitAnd, BitOr, Xor,
            Shl, Shr, And, Or, CmpEq, CmpNe, CmpLt, CmpLe, CmpGt, CmpGe, Neg, Not, NotF,
            OnesCompl, CompareStr, SetCurVar, SetCurVarArray, LoadVar, SaveVar, SetCurObject,
            SetCurObjectNew, SetCurField, SetCurFieldArray, LoadField, SaveField, ToFloat,
            ToUint, ToString, ToNone, LoadImmedUint, LoadImmedFloat, LoadImmedStringRef,
            LoadImmedIdentRef, LoadImmedTagRef, CallFunction, CallMethod, CallParent,
            AdvanceStringPlain, AdvanceStringAppendChar, AdvanceStringComma, AdvanceStringNull,
            Rewind, RewindTerminate, Push, PushFrame, DebugBreak, Unused,
        ];
        TABLE.get(word as usize).copied()
    }

    #[cfg(test)]
    fn word(self) -> u32 {
        self as u32
    }
}

/// The outcome of disassembling a whole code segment: an address-ordered
/// map of instructions plus the order in which they were produced (which is
/// the same order for a well-formed segment, but kept distinct in case a
/// future producer needs to separate the two.
#[derive(Debug, Default)]
pub struct Disassembly {
    instructions: BTreeMap<u32, Instruction>,
    order: Vec<u32>,
}

impl Disassembly {
    pub fn get(&self, addr: u32) -> Option<&Instruction> {
        self.instructions.get(&addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.order.iter().map(move |a| &self.instructions[a])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The address immediately after `addr`'s instruction, if any.
    pub fn next_addr(&self, addr: u32) -> Option<u32> {
        self.instructions
            .range((std::ops::Bound::Excluded(addr), std::ops::Bound::Unbounded))
            .next()
            .map(|(a, _)| *a)
    }
}

/// A small cursor over the code segment, tracking the next word to read.
struct Cursor<'f, F: FileData + ?Sized> {
    file: &'f F,
    pos: u32,
}

impl<'f, F: FileData + ?Sized> Cursor<'f, F> {
    fn next_word(&mut self) -> Result<u32, CoreError> {
        if self.pos >= self.file.code_size() {
            return Err(CoreError::TruncatedCode {
                offset: self.pos,
                expected: 1,
            });
        }
        let w = self.file.op(self.pos);
        self.pos += 1;
        Ok(w)
    }

    fn next_ident(&mut self) -> Result<Ident, CoreError> {
        let at = self.pos;
        let raw = self.next_word()?;
        Ok(self.file.identifier(at, raw))
    }

    fn next_bool(&mut self) -> Result<bool, CoreError> {
        Ok(self.next_word()? != 0)
    }
}

/// Disassembles the full code segment of `file`.
pub fn disassemble<F: FileData + ?Sized>(file: &F) -> Result<Disassembly, CoreError> {
    let mut disasm = Disassembly::default();
    let mut cursor = Cursor { file, pos: 0 };
    let mut returnable_value = false;

    tracing::debug!(code_size = file.code_size(), "disassemble: starting sweep");

    while cursor.pos < file.code_size() {
        let addr = cursor.pos;
        let raw = cursor.next_word()?;
        let tag = RawTag::from_word(raw).ok_or(CoreError::UnknownOpcode { offset: addr, raw })?;

        let op = decode_operands(tag, &mut cursor, &mut returnable_value)?;
        disasm.instructions.insert(addr, Instruction::new(addr, op));
        disasm.order.push(addr);
    }

    // Branch-target pass: every branch's target must name an existing
    // instruction, and we flag that instruction as a branch target.
    let targets: Vec<(u32, u32)> = disasm
        .iter()
        .filter_map(|i| match &i.op {
            Op::Branch { target_addr, .. } => Some((i.addr, *target_addr)),
            _ => None,
        })
        .collect();

    for (from, target) in targets {
        if !disasm.instructions.contains_key(&target) {
            return Err(CoreError::InvalidBranchTarget {
                offset: from,
                target,
            });
        }
        disasm.instructions.get_mut(&target).unwrap().is_branch_target = true;
    }

    let branch_target_count = disasm.iter().filter(|i| i.is_branch_target).count();
    tracing::debug!(
        instructions = disasm.len(),
        branch_targets = branch_target_count,
        "disassemble: sweep complete"
    );

    Ok(disasm)
}

fn decode_operands<F: FileData + ?Sized>(
    tag: RawTag,
    c: &mut Cursor<'_, F>,
    returnable_value: &mut bool,
) -> Result<Op, CoreError> {
    use RawTag::*;

    let op = match tag {
        FuncDecl => {
            let name = c.next_ident()?;
            let namespace = c.next_ident()?;
            let package = c.next_ident()?;
            let has_body = c.next_bool()?;
            let end_addr = c.next_word()?;
            let argc = c.next_word()?;
            let mut args = Vec::with_capacity(argc as usize);
            for _ in 0..argc {
                args.push(c.next_ident()?);
            }
            Op::FunctionDecl {
                name,
                namespace,
                package,
                has_body,
                end_addr,
                args,
            }
        }
        CreateObject => {
            let parent_name = c.next_ident()?;
            let is_datablock = c.next_bool()?;
            let fail_jump_addr = c.next_word()?;
            Op::CreateObject {
                parent_name,
                is_datablock,
                fail_jump_addr,
            }
        }
        AddObject => Op::AddObject {
            place_at_root: c.next_bool()?,
        },
        EndObject => Op::EndObject {
            value: c.next_bool()?,
        },

        Jmp | JmpIf | JmpIff | JmpIfNot | JmpIffNot | JmpIfNp | JmpIfNotNp => {
            let kind = match tag {
                Jmp => BranchKind::Jmp,
                JmpIf => BranchKind::JmpIf,
                JmpIff => BranchKind::JmpIff,
                JmpIfNot => BranchKind::JmpIfNot,
                JmpIffNot => BranchKind::JmpIffNot,
                JmpIfNp => BranchKind::JmpIfNp,
                JmpIfNotNp => BranchKind::JmpIfNotNp,
                _ => unreachable!(),
            };
            let target_addr = c.next_word()?;
            Op::Branch { target_addr, kind }
        }

        Return => {
            let returns_value = *returnable_value;
            *returnable_value = false;
            Op::Return { returns_value }
        }

        Add | Sub | Mul | Div | Mod | BitAnd | BitOr | Xor | Shl | Shr | And | Or | CmpEq
        | CmpNe | CmpLt | CmpLe | CmpGt | CmpGe => {
            let op = match tag {
                Add => BinaryOp::Add,
                Sub => BinaryOp::Sub,
                Mul => BinaryOp::Mul,
                Div => BinaryOp::Div,
                Mod => BinaryOp::Mod,
                BitAnd => BinaryOp::BitAnd,
                BitOr => BinaryOp::BitOr,
                Xor => BinaryOp::Xor,
                Shl => BinaryOp::Shl,
                Shr => BinaryOp::Shr,
                And => BinaryOp::And,
                Or => BinaryOp::Or,
                CmpEq => BinaryOp::CmpEq,
                CmpNe => BinaryOp::CmpNe,
                CmpLt => BinaryOp::CmpLt,
                CmpLe => BinaryOp::CmpLe,
                CmpGt => BinaryOp::CmpGt,
                CmpGe => BinaryOp::CmpGe,
                _ => unreachable!(),
            };
            Op::Binary { op }
        }
        Neg => Op::UnaryNeg,
        Not => Op::Not,
        NotF => Op::NotF,
        OnesCompl => Op::OnesCompl,
        CompareStr => Op::StringCompare,

        SetCurVar => {
            let name = c.next_ident()?;
            Op::SetCurVar { name }
        }
        SetCurVarArray => Op::SetCurVarArray,
        LoadVar => {
            *returnable_value = true;
            Op::LoadVar
        }
        SaveVar => {
            *returnable_value = true;
            Op::SaveVar
        }

        SetCurObject => Op::SetCurObject { is_new: false },
        SetCurObjectNew => Op::SetCurObject { is_new: true },
        SetCurField => {
            let name = c.next_ident()?;
            Op::SetCurField { name }
        }
        SetCurFieldArray => Op::SetCurFieldArray,
        LoadField => {
            *returnable_value = true;
            Op::LoadField
        }
        SaveField => {
            *returnable_value = true;
            Op::SaveField
        }

        ToFloat => Op::ConvertToType {
            target: ConvertTarget::Float,
        },
        ToUint => Op::ConvertToType {
            target: ConvertTarget::Uint,
        },
        ToString => {
            *returnable_value = true;
            Op::ConvertToType {
                target: ConvertTarget::String,
            }
        }
        ToNone => {
            *returnable_value = false;
            Op::ConvertToType {
                target: ConvertTarget::None,
            }
        }

        LoadImmedUint => {
            *returnable_value = true;
            let raw = c.next_word()?;
            Op::LoadImmediateUint(raw as i32 as i64)
        }
        LoadImmedFloat => {
            *returnable_value = true;
            Op::LoadImmediateFloat(c.next_word()?)
        }
        LoadImmedStringRef => {
            *returnable_value = true;
            Op::LoadImmediateStringRef(c.next_word()?)
        }
        LoadImmedIdentRef => {
            *returnable_value = true;
            Op::LoadImmediateIdentRef(c.next_ident()?)
        }
        LoadImmedTagRef => {
            *returnable_value = true;
            Op::LoadImmediateTagRef(c.next_word()?)
        }

        CallFunction | CallMethod | CallParent => {
            *returnable_value = true;
            let name = c.next_ident()?;
            let namespace = c.next_ident()?;
            let call_type = match tag {
                CallFunction => CallType::Function,
                CallMethod => CallType::Method,
                CallParent => CallType::Parent,
                _ => unreachable!(),
            };
            Op::Call {
                name,
                namespace,
                call_type,
            }
        }

        AdvanceStringPlain => Op::AdvanceString {
            kind: AdvanceStringKind::Plain,
        },
        AdvanceStringAppendChar => {
            let ch = c.next_word()? as u8;
            Op::AdvanceString {
                kind: AdvanceStringKind::AppendChar(ch),
            }
        }
        AdvanceStringComma => Op::AdvanceString {
            kind: AdvanceStringKind::Comma,
        },
        AdvanceStringNull => Op::AdvanceString {
            kind: AdvanceStringKind::Null,
        },
        Rewind => {
            *returnable_value = true;
            Op::Rewind { terminate: false }
        }
        RewindTerminate => {
            *returnable_value = true;
            Op::Rewind { terminate: true }
        }

        Push => Op::Push,
        PushFrame => Op::PushFrame,
        DebugBreak => Op::DebugBreak,
        Unused => Op::Unused,
    };

    Ok(op)
}

/// Convenience used by the CFG builder: the address immediately following
/// `instr`, used to compute fall-through edges without re-scanning.
pub fn fallthrough_addr(disasm: &Disassembly, instr: &Instruction) -> Option<u32> {
    disasm.next_addr(instr.addr)
}
