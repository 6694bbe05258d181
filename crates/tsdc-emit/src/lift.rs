//! Region-to-AST lift: walks a `VirtualRegion` tree with a bytecode-to-
//! expression stack simulator, producing the `Stmt`/`Expr` tree `token`
//! then flattens into a stream.

use std::rc::Rc;

use tsdc_analysis::{FunctionHeader, VirtualRegion};
use tsdc_core::{AdvanceStringKind, BasicBlock, FileData, Ident, Instruction, Op};

use crate::ast::{Expr, Stmt, Target, UnaryOp};
use crate::error::EmitError;

/// One object literal under construction between a `CreateObject` and its
/// matching `EndObject`. Nested `CreateObject`s (children) stack on top.
#[derive(Default)]
struct ObjectFrame {
    parent_name: Ident,
    is_datablock: bool,
    place_at_root: bool,
    fields: Vec<Stmt>,
    children: Vec<Stmt>,
}

/// Context threaded by mutable reference across every block in one
/// function/script: the "current" var/field target `SetCurVar`/
/// `SetCurField` establish, in-progress object literals, in-progress
/// string concatenation, and call-argument frame markers. The expression
/// stack itself is NOT part of this context -- it is local to each
/// `lift_body` call, fresh for every nested `Conditional`/`Loop`/`Function`
/// body, while this context's fields persist across them the same way the
/// underlying bytecode registers do.
#[derive(Default)]
struct LiftCtx {
    cur_var: Ident,
    cur_var_index: Option<Box<Expr>>,
    cur_field: Ident,
    cur_field_index: Option<Box<Expr>>,
    concat_parts: Vec<Expr>,
    object_stack: Vec<ObjectFrame>,
    /// Stack depth recorded at each `PushFrame`, so `Call` knows how many
    /// values above it are this call's arguments.
    frame_stack: Vec<usize>,
    /// Head address of each loop currently being lifted, innermost last --
    /// used to recognize `Goto(loop head)` as `Continue`.
    loop_heads: Vec<u32>,
}

/// Lifts one CFG's root region into its statement list. `is_function`
/// tells the caller whether to wrap the result in a `FunctionDecl` --
/// the caller already knows this from the CFG's entry block, since a
/// single-block function body collapses to a bare region with no
/// `Function` wrapper of its own.
pub fn lift_cfg_root(
    region: VirtualRegion,
    header: Option<FunctionHeader>,
    file: &dyn FileData,
) -> Result<Vec<Stmt>, EmitError> {
    let mut ctx = LiftCtx::default();
    let elems = flatten_root(region);
    let body = lift_body(&elems, file, &mut ctx)?;
    match header {
        Some(header) => Ok(vec![Stmt::FunctionDecl { header, body }]),
        None => Ok(body),
    }
}

fn flatten_root(region: VirtualRegion) -> Vec<VirtualRegion> {
    match region {
        VirtualRegion::Sequence(elems) => elems,
        VirtualRegion::Function { body, .. } => body,
        other => vec![other],
    }
}

fn lift_body(
    elems: &[VirtualRegion],
    file: &dyn FileData,
    ctx: &mut LiftCtx,
) -> Result<Vec<Stmt>, EmitError> {
    let mut stack: Vec<Expr> = Vec::new();
    let mut out: Vec<Stmt> = Vec::new();
    for elem in elems {
        lift_element(elem, &mut stack, &mut out, file, ctx)?;
    }
    flush_stack(&mut stack, &mut out);
    Ok(out)
}

/// Emits whatever is left on the expression stack as statements: a bare
/// call result nobody consumed becomes `Expr(call)`, a dangling assignment
/// becomes the assignment itself rather than a redundant wrapper.
fn flush_stack(stack: &mut Vec<Expr>, out: &mut Vec<Stmt>) {
    for expr in stack.drain(..) {
        match expr {
            Expr::Assign(stmt) => out.push(*stmt),
            other => out.push(Stmt::Expr(other)),
        }
    }
}

fn lift_element(
    region: &VirtualRegion,
    stack: &mut Vec<Expr>,
    out: &mut Vec<Stmt>,
    file: &dyn FileData,
    ctx: &mut LiftCtx,
) -> Result<(), EmitError> {
    match region {
        VirtualRegion::Instruction(block) | VirtualRegion::LoopFooter(block) => {
            lift_block(block, stack, out, file, ctx)
        }
        VirtualRegion::Sequence(elems) => {
            for e in elems {
                lift_element(e, stack, out, file, ctx)?;
            }
            Ok(())
        }
        VirtualRegion::Function { header, body } => {
            let mut inner_ctx = LiftCtx::default();
            let stmts = lift_body(body, file, &mut inner_ctx)?;
            out.push(Stmt::FunctionDecl {
                header: header.clone(),
                body: stmts,
            });
            Ok(())
        }
        VirtualRegion::Conditional {
            head_block,
            then_body,
            else_body,
        } => {
            lift_block(head_block, stack, out, file, ctx)?;
            let cond = stack.pop().unwrap_or(Expr::IntLit(0));
            let then_stmts = lift_body(then_body, file, ctx)?;
            let else_stmts = lift_body(else_body, file, ctx)?;
            out.push(Stmt::If {
                cond,
                then_body: then_stmts,
                else_body: else_stmts,
            });
            Ok(())
        }
        VirtualRegion::Loop { infinite, body } => {
            out.push(lift_loop(body, *infinite, file, ctx)?);
            Ok(())
        }
        VirtualRegion::ConditionalGoto {
            head_block,
            target_addr,
        } => {
            lift_block(head_block, stack, out, file, ctx)?;
            let cond = stack.pop().unwrap_or(Expr::IntLit(0));
            out.push(Stmt::ConditionalGoto {
                cond,
                target_addr: *target_addr,
            });
            Ok(())
        }
        VirtualRegion::Goto { target_addr } => {
            if ctx.loop_heads.last() == Some(target_addr) {
                out.push(Stmt::Continue);
            } else {
                out.push(Stmt::Goto(*target_addr));
            }
            Ok(())
        }
        VirtualRegion::Break => {
            out.push(Stmt::Break);
            Ok(())
        }
        VirtualRegion::Continue => {
            out.push(Stmt::Continue);
            Ok(())
        }
    }
}

/// `infinite` loops have a single body element and no separate exit test --
/// rendered as `while (1) { ... }`, since there's no literal `true` keyword
/// in this language. Loops with an exit test put the head (holding the
/// test) first and the repeated work after; the head's trailing comparison
/// is read off the expression stack as the condition, the same way a
/// `Conditional`'s head is.
fn lift_loop(
    elems: &[VirtualRegion],
    infinite: bool,
    file: &dyn FileData,
    ctx: &mut LiftCtx,
) -> Result<Stmt, EmitError> {
    let head_addr = region_addr(&elems[0]);
    ctx.loop_heads.push(head_addr);
    let result = (|| {
        if infinite {
            let body = lift_body(elems, file, ctx)?;
            return Ok(Stmt::While {
                cond: Expr::IntLit(1),
                body,
            });
        }

        let mut stack = Vec::new();
        let mut head_stmts = Vec::new();
        lift_element(&elems[0], &mut stack, &mut head_stmts, file, ctx)?;
        let cond = stack.pop().unwrap_or(Expr::IntLit(1));
        flush_stack(&mut stack, &mut head_stmts);

        let mut body = head_stmts;
        body.extend(lift_body(&elems[1..], file, ctx)?);
        Ok(Stmt::While { cond, body })
    })();
    ctx.loop_heads.pop();
    result
}

/// The address a `Goto`/`Continue` recognition check compares against: the
/// leader address of whatever this region's first real block is.
fn region_addr(region: &VirtualRegion) -> u32 {
    match region {
        VirtualRegion::Instruction(b) | VirtualRegion::LoopFooter(b) => b.addr,
        VirtualRegion::Sequence(elems) => elems.first().map(region_addr).unwrap_or(0),
        VirtualRegion::Function { body, .. } => body.first().map(region_addr).unwrap_or(0),
        VirtualRegion::Conditional { head_block, .. } => head_block.addr,
        VirtualRegion::Loop { body, .. } => body.first().map(region_addr).unwrap_or(0),
        VirtualRegion::ConditionalGoto { head_block, .. } => head_block.addr,
        VirtualRegion::Goto { target_addr } => *target_addr,
        VirtualRegion::Break | VirtualRegion::Continue => 0,
    }
}

fn lift_block(
    block: &Rc<BasicBlock>,
    stack: &mut Vec<Expr>,
    out: &mut Vec<Stmt>,
    file: &dyn FileData,
    ctx: &mut LiftCtx,
) -> Result<(), EmitError> {
    for instr in &block.instructions {
        lift_instr(instr, stack, out, file, ctx)?;
    }
    Ok(())
}

fn pop(stack: &mut Vec<Expr>, addr: u32) -> Result<Expr, EmitError> {
    stack.pop().ok_or(EmitError::StackUnderflow { addr })
}

fn var_target(ctx: &LiftCtx) -> Target {
    match ctx.cur_var_index.clone() {
        Some(idx) => Target::VarArray(ctx.cur_var.clone(), idx),
        None => Target::Var(ctx.cur_var.clone()),
    }
}

fn var_expr(ctx: &LiftCtx) -> Expr {
    match ctx.cur_var_index.clone() {
        Some(idx) => Expr::VarRefArray(ctx.cur_var.clone(), idx),
        None => Expr::VarRef(ctx.cur_var.clone()),
    }
}

fn field_target(ctx: &LiftCtx) -> Target {
    match ctx.cur_field_index.clone() {
        Some(idx) => Target::FieldArray(ctx.cur_field.clone(), idx),
        None => Target::Field(ctx.cur_field.clone()),
    }
}

fn field_expr(ctx: &LiftCtx) -> Expr {
    match ctx.cur_field_index.clone() {
        Some(idx) => Expr::FieldRefArray(ctx.cur_field.clone(), idx),
        None => Expr::FieldRef(ctx.cur_field.clone()),
    }
}

fn target_matches_expr(target: &Target, expr: &Expr) -> bool {
    match (target, expr) {
        (Target::Var(a), Expr::VarRef(b)) => a == b,
        (Target::VarArray(a, _), Expr::VarRefArray(b, _)) => a == b,
        (Target::Field(a), Expr::FieldRef(b)) => a == b,
        (Target::FieldArray(a, _), Expr::FieldRefArray(b, _)) => a == b,
        _ => false,
    }
}

/// Builds an assignment, recognizing the op-compound shape: a `Binary`
/// whose left operand reads back the same target becomes `target op= rhs`
/// instead of `target = target op rhs`.
fn build_assignment(target: Target, value: Expr) -> Stmt {
    match value {
        Expr::Binary { op, lhs, rhs } if target_matches_expr(&target, &lhs) => Stmt::Assignment {
            target,
            value: *rhs,
            op: Some(op),
        },
        other => Stmt::Assignment {
            target,
            value: other,
            op: None,
        },
    }
}

fn unary(stack: &mut Vec<Expr>, addr: u32, op: UnaryOp) -> Result<(), EmitError> {
    let operand = pop(stack, addr)?;
    stack.push(Expr::Unary {
        op,
        operand: Box::new(operand),
    });
    Ok(())
}

fn lift_instr(
    instr: &Instruction,
    stack: &mut Vec<Expr>,
    out: &mut Vec<Stmt>,
    file: &dyn FileData,
    ctx: &mut LiftCtx,
) -> Result<(), EmitError> {
    match &instr.op {
        // Metadata only -- the header is captured by the caller from the
        // CFG's entry block, and the branch condition is whatever is left
        // on the stack by the instructions preceding it.
        Op::FunctionDecl { .. } | Op::Branch { .. } | Op::DebugBreak | Op::Unused | Op::Push => {}

        Op::CreateObject {
            parent_name,
            is_datablock,
            ..
        } => {
            ctx.object_stack.push(ObjectFrame {
                parent_name: parent_name.clone(),
                is_datablock: *is_datablock,
                place_at_root: false,
                fields: Vec::new(),
                children: Vec::new(),
            });
        }
        Op::AddObject { place_at_root } => {
            if let Some(frame) = ctx.object_stack.last_mut() {
                frame.place_at_root = *place_at_root;
            }
        }
        Op::EndObject { .. } => {
            if let Some(frame) = ctx.object_stack.pop() {
                let decl = Stmt::ObjectDecl {
                    parent_name: frame.parent_name,
                    is_datablock: frame.is_datablock,
                    fields: frame.fields,
                    children: frame.children,
                    place_at_root: frame.place_at_root,
                };
                match ctx.object_stack.last_mut() {
                    Some(parent) => parent.children.push(decl),
                    None => out.push(decl),
                }
            }
        }

        Op::Return { returns_value } => {
            let value = if *returns_value { stack.pop() } else { None };
            out.push(Stmt::Return(value));
        }

        Op::Binary { op } => {
            let rhs = pop(stack, instr.addr)?;
            let lhs = pop(stack, instr.addr)?;
            stack.push(Expr::Binary {
                op: *op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Op::UnaryNeg => unary(stack, instr.addr, UnaryOp::Neg)?,
        Op::Not => unary(stack, instr.addr, UnaryOp::Not)?,
        Op::NotF => unary(stack, instr.addr, UnaryOp::NotF)?,
        Op::OnesCompl => unary(stack, instr.addr, UnaryOp::OnesCompl)?,
        Op::StringCompare => {
            let rhs = pop(stack, instr.addr)?;
            let lhs = pop(stack, instr.addr)?;
            stack.push(Expr::StringCompare {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }

        Op::SetCurVar { name } => {
            ctx.cur_var = name.clone();
            ctx.cur_var_index = None;
        }
        Op::SetCurVarArray => {
            let index = pop(stack, instr.addr)?;
            ctx.cur_var_index = Some(Box::new(index));
        }
        Op::LoadVar => stack.push(var_expr(ctx)),
        Op::SaveVar => {
            let value = pop(stack, instr.addr)?;
            let stmt = build_assignment(var_target(ctx), value);
            stack.push(Expr::Assign(Box::new(stmt)));
        }

        Op::SetCurObject { .. } => {
            // Object scoping is already captured structurally by the
            // Create/Add/EndObject nesting; the "current object" register
            // itself has no separate AST shape to preserve.
        }
        Op::SetCurField { name } => {
            ctx.cur_field = name.clone();
            ctx.cur_field_index = None;
        }
        Op::SetCurFieldArray => {
            let index = pop(stack, instr.addr)?;
            ctx.cur_field_index = Some(Box::new(index));
        }
        Op::LoadField => stack.push(field_expr(ctx)),
        Op::SaveField => {
            let value = pop(stack, instr.addr)?;
            let stmt = build_assignment(field_target(ctx), value);
            match ctx.object_stack.last_mut() {
                Some(frame) => frame.fields.push(stmt),
                None => stack.push(Expr::Assign(Box::new(stmt))),
            }
        }

        // No expression shape change is modeled for type coercion --
        // the value's Rust-level representation is already untyped.
        Op::ConvertToType { .. } => {}

        Op::LoadImmediateUint(v) => stack.push(Expr::IntLit(*v)),
        Op::LoadImmediateFloat(raw) => stack.push(Expr::FloatLit(file.float_table(*raw))),
        Op::LoadImmediateStringRef(raw) => stack.push(Expr::StrLit {
            value: file.string_table(*raw),
            tag: false,
        }),
        Op::LoadImmediateIdentRef(ident) => stack.push(Expr::StrLit {
            value: ident.clone().unwrap_or_default(),
            tag: false,
        }),
        Op::LoadImmediateTagRef(raw) => stack.push(Expr::StrLit {
            value: file.string_table(*raw),
            tag: true,
        }),

        Op::Call {
            name,
            namespace,
            call_type,
        } => {
            let frame_start = ctx.frame_stack.pop().unwrap_or(0);
            if frame_start > stack.len() {
                return Err(EmitError::UnmatchedCallFrame { addr: instr.addr });
            }
            let args: Vec<Expr> = stack.split_off(frame_start);
            stack.push(Expr::Call {
                name: name.clone(),
                namespace: namespace.clone(),
                call_type: *call_type,
                args,
            });
        }
        Op::PushFrame => ctx.frame_stack.push(stack.len()),

        Op::AdvanceString { kind } => match kind {
            AdvanceStringKind::AppendChar(ch) => {
                ctx.concat_parts.push(Expr::StrLit {
                    value: (*ch as char).to_string(),
                    tag: false,
                });
            }
            AdvanceStringKind::Plain | AdvanceStringKind::Comma | AdvanceStringKind::Null => {
                let part = pop(stack, instr.addr)?;
                ctx.concat_parts.push(part);
            }
        },
        Op::Rewind { terminate } => {
            let last = pop(stack, instr.addr)?;
            ctx.concat_parts.push(last);
            let parts = std::mem::take(&mut ctx.concat_parts);
            stack.push(Expr::Concat {
                parts,
                tag: *terminate,
            });
        }
    }
    Ok(())
}
