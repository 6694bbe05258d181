//! The AST node model that the region-to-AST lift produces and the token
//! stream consumes. Node polymorphism follows the same tagged-enum shape
//! `tsdc-core` uses for `Op`, rather than a trait-object hierarchy.

use serde::{Deserialize, Serialize};

use tsdc_analysis::FunctionHeader;
use tsdc_core::{BinaryOp, CallType, Ident};

/// An assignment target: a variable, a field on the current object, or
/// either of those indexed by an array expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Var(Ident),
    VarArray(Ident, Box<Expr>),
    Field(Ident),
    FieldArray(Ident, Box<Expr>),
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StrLit { value: String, tag: bool },
    VarRef(Ident),
    VarRefArray(Ident, Box<Expr>),
    FieldRef(Ident),
    FieldRefArray(Ident, Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    StringCompare {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        name: Ident,
        namespace: Ident,
        call_type: CallType,
        args: Vec<Expr>,
    },
    /// An assignment used in expression position (e.g. as a call argument).
    Assign(Box<Stmt>),
    /// A string built up through `AdvanceString`/`Rewind` concatenation.
    Concat { parts: Vec<Expr>, tag: bool },
}

/// Unary operators. `StringCompare` is excluded -- it always takes two
/// operands, so it is modeled as `Expr::StringCompare` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    NotF,
    OnesCompl,
}

/// One statement in a function or script body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Expr),
    /// `target op= value` when `op` is `Some`, otherwise a plain `target =
    /// value`. Pretty-printing further recognizes `x = x + 1` / `x = x - 1`
    /// and renders `x++` / `x--` instead of the literal addition/subtraction.
    Assignment {
        target: Target,
        value: Expr,
        op: Option<BinaryOp>,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    /// Unconditional jump to an address with no structured equivalent. Only
    /// produced for irreducible control flow; rendered through a fallback
    /// label/jump pairing since there is no `goto` keyword in the token
    /// stream's keyword list.
    Goto(u32),
    /// Conditional jump used the same way, when the branch itself could not
    /// be folded into an `If`/`While`.
    ConditionalGoto { cond: Expr, target_addr: u32 },
    FunctionDecl {
        header: FunctionHeader,
        body: Vec<Stmt>,
    },
    ObjectDecl {
        parent_name: Ident,
        is_datablock: bool,
        fields: Vec<Stmt>,
        children: Vec<Stmt>,
        place_at_root: bool,
    },
}

/// A fully lifted program: the main script's statements plus every function
/// declaration found elsewhere in the code segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// Recognizes `x + 1` / `x - 1` shaped compound values for a target whose
/// assignment `op` already matched the lift's "reads itself back" check,
/// returning the `++` / `--` spelling if it matches.
pub fn compound_increment(op: Option<BinaryOp>, value: &Expr) -> Option<bool> {
    let op = op?;
    if !matches!(op, BinaryOp::Add | BinaryOp::Sub) {
        return None;
    }
    let Expr::Binary { rhs, .. } = value else {
        return None;
    };
    if !matches!(rhs.as_ref(), Expr::IntLit(1)) {
        return None;
    }
    Some(matches!(op, BinaryOp::Add))
}
