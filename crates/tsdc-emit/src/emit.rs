//! Flattens a lifted statement tree into the token stream.

use tsdc_core::{BinaryOp, CallType};

use crate::ast::{compound_increment, Expr, Stmt, Target};
use crate::token::Token;

/// Emits every statement in `body` in order, each one terminated the way
/// its shape requires (blocks get no trailing `;`, expressions do).
pub fn emit_program(body: &[Stmt]) -> Vec<Token> {
    let mut out = Vec::new();
    for stmt in body {
        emit_stmt(stmt, &mut out);
    }
    out
}

fn emit_stmt(stmt: &Stmt, out: &mut Vec<Token>) {
    match stmt {
        Stmt::Expr(expr) => {
            emit_expr(expr, out);
            out.push(Token::Punct(";"));
            out.push(Token::Newline);
        }
        Stmt::Assignment { target, value, op } => {
            if let Some(inc) = compound_increment(*op, value) {
                emit_target(target, out);
                out.push(Token::Punct(if inc { "++" } else { "--" }));
                out.push(Token::Punct(";"));
                out.push(Token::Newline);
                return;
            }
            emit_target(target, out);
            out.push(Token::Punct(assign_punct(*op)));
            emit_expr(value, out);
            out.push(Token::Punct(";"));
            out.push(Token::Newline);
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            out.push(Token::Keyword("if"));
            out.push(Token::Punct("("));
            emit_expr(cond, out);
            out.push(Token::Punct(")"));
            out.push(Token::Punct("{"));
            out.push(Token::Newline);
            out.push(Token::Indent(1));
            for s in then_body {
                emit_stmt(s, out);
            }
            out.push(Token::Indent(-1));
            out.push(Token::Punct("}"));
            if !else_body.is_empty() {
                out.push(Token::Keyword("else"));
                out.push(Token::Punct("{"));
                out.push(Token::Newline);
                out.push(Token::Indent(1));
                for s in else_body {
                    emit_stmt(s, out);
                }
                out.push(Token::Indent(-1));
                out.push(Token::Punct("}"));
            }
            out.push(Token::Newline);
        }
        Stmt::While { cond, body } => {
            out.push(Token::Keyword("while"));
            out.push(Token::Punct("("));
            emit_expr(cond, out);
            out.push(Token::Punct(")"));
            out.push(Token::Punct("{"));
            out.push(Token::Newline);
            out.push(Token::Indent(1));
            for s in body {
                emit_stmt(s, out);
            }
            out.push(Token::Indent(-1));
            out.push(Token::Punct("}"));
            out.push(Token::Newline);
        }
        Stmt::Return(value) => {
            out.push(Token::Keyword("return"));
            if let Some(v) = value {
                emit_expr(v, out);
            }
            out.push(Token::Punct(";"));
            out.push(Token::Newline);
        }
        Stmt::Break => {
            out.push(Token::Keyword("break"));
            out.push(Token::Punct(";"));
            out.push(Token::Newline);
        }
        Stmt::Continue => {
            out.push(Token::Keyword("continue"));
            out.push(Token::Punct(";"));
            out.push(Token::Newline);
        }
        Stmt::Goto(target) => {
            // No `goto` keyword in this language's surface syntax -- only
            // reachable for irreducible control flow, so this fallback
            // spelling only ever shows up in that degenerate case.
            out.push(Token::Ident("goto".to_string()));
            out.push(Token::Ident(format!("L{target}")));
            out.push(Token::Punct(";"));
            out.push(Token::Newline);
        }
        Stmt::ConditionalGoto { cond, target_addr } => {
            out.push(Token::Keyword("if"));
            out.push(Token::Punct("("));
            emit_expr(cond, out);
            out.push(Token::Punct(")"));
            out.push(Token::Ident("goto".to_string()));
            out.push(Token::Ident(format!("L{target_addr}")));
            out.push(Token::Punct(";"));
            out.push(Token::Newline);
        }
        Stmt::FunctionDecl { header, body } => {
            out.push(Token::Keyword("function"));
            if let Some(ns) = &header.namespace {
                out.push(Token::Ident(ns.clone()));
                out.push(Token::Punct("::"));
            }
            out.push(Token::Ident(header.name.clone().unwrap_or_default()));
            out.push(Token::Punct("("));
            for (i, arg) in header.args.iter().enumerate() {
                if i > 0 {
                    out.push(Token::Punct(","));
                }
                out.push(Token::Ident(arg.clone().unwrap_or_default()));
            }
            out.push(Token::Punct(")"));
            out.push(Token::Punct("{"));
            out.push(Token::Newline);
            out.push(Token::Indent(1));
            for s in body {
                emit_stmt(s, out);
            }
            out.push(Token::Indent(-1));
            out.push(Token::Punct("}"));
            out.push(Token::Newline);
        }
        Stmt::ObjectDecl {
            parent_name,
            is_datablock,
            fields,
            children,
            place_at_root: _,
        } => {
            out.push(Token::Keyword(if *is_datablock { "datablock" } else { "new" }));
            out.push(Token::Ident(parent_name.clone().unwrap_or_default()));
            out.push(Token::Punct("("));
            out.push(Token::Punct(")"));
            out.push(Token::Punct("{"));
            out.push(Token::Newline);
            out.push(Token::Indent(1));
            for s in fields {
                emit_stmt(s, out);
            }
            for s in children {
                emit_stmt(s, out);
            }
            out.push(Token::Indent(-1));
            out.push(Token::Punct("}"));
            out.push(Token::Punct(";"));
            out.push(Token::Newline);
        }
    }
}

fn assign_punct(op: Option<BinaryOp>) -> &'static str {
    match op {
        None => "=",
        Some(BinaryOp::Add) => "+=",
        Some(BinaryOp::Sub) => "-=",
        Some(BinaryOp::Mul) => "*=",
        Some(BinaryOp::Div) => "/=",
        Some(BinaryOp::Mod) => "%=",
        Some(BinaryOp::BitAnd) => "&=",
        Some(BinaryOp::BitOr) => "|=",
        Some(BinaryOp::Xor) => "^=",
        Some(BinaryOp::Shl) => "<<=",
        Some(BinaryOp::Shr) => ">>=",
        // Logical and comparison ops never appear on a Binary's left operand
        // matching its own target, so `build_assignment` never produces
        // these as a compound op; kept only so the match stays exhaustive.
        Some(_) => "=",
    }
}

fn binary_punct(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::Xor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
        BinaryOp::CmpEq => "==",
        BinaryOp::CmpNe => "!=",
        BinaryOp::CmpLt => "<",
        BinaryOp::CmpLe => "<=",
        BinaryOp::CmpGt => ">",
        BinaryOp::CmpGe => ">=",
    }
}

fn emit_target(target: &Target, out: &mut Vec<Token>) {
    match target {
        Target::Var(name) => out.push(Token::Ident(name.clone().unwrap_or_default())),
        Target::VarArray(name, index) => {
            out.push(Token::Ident(name.clone().unwrap_or_default()));
            out.push(Token::Punct("["));
            emit_expr(index, out);
            out.push(Token::Punct("]"));
        }
        Target::Field(name) => {
            out.push(Token::Punct("."));
            out.push(Token::Ident(name.clone().unwrap_or_default()));
        }
        Target::FieldArray(name, index) => {
            out.push(Token::Punct("."));
            out.push(Token::Ident(name.clone().unwrap_or_default()));
            out.push(Token::Punct("["));
            emit_expr(index, out);
            out.push(Token::Punct("]"));
        }
    }
}

fn emit_expr(expr: &Expr, out: &mut Vec<Token>) {
    match expr {
        Expr::IntLit(v) => out.push(Token::NumLit(v.to_string())),
        Expr::FloatLit(v) => out.push(Token::NumLit(v.to_string())),
        Expr::StrLit { value, tag } => out.push(Token::StrLit {
            value: value.clone(),
            tag: *tag,
        }),
        Expr::VarRef(name) => out.push(Token::Ident(name.clone().unwrap_or_default())),
        Expr::VarRefArray(name, index) => {
            out.push(Token::Ident(name.clone().unwrap_or_default()));
            out.push(Token::Punct("["));
            emit_expr(index, out);
            out.push(Token::Punct("]"));
        }
        Expr::FieldRef(name) => {
            out.push(Token::Punct("."));
            out.push(Token::Ident(name.clone().unwrap_or_default()));
        }
        Expr::FieldRefArray(name, index) => {
            out.push(Token::Punct("."));
            out.push(Token::Ident(name.clone().unwrap_or_default()));
            out.push(Token::Punct("["));
            emit_expr(index, out);
            out.push(Token::Punct("]"));
        }
        Expr::Binary { op, lhs, rhs } => {
            out.push(Token::Punct("("));
            emit_expr(lhs, out);
            out.push(Token::Punct(binary_punct(*op)));
            emit_expr(rhs, out);
            out.push(Token::Punct(")"));
        }
        Expr::StringCompare { lhs, rhs } => {
            out.push(Token::Punct("("));
            emit_expr(lhs, out);
            out.push(Token::Punct("$="));
            emit_expr(rhs, out);
            out.push(Token::Punct(")"));
        }
        Expr::Unary { op, operand } => {
            out.push(Token::Punct(match op {
                crate::ast::UnaryOp::Neg => "-",
                crate::ast::UnaryOp::Not | crate::ast::UnaryOp::NotF => "!",
                crate::ast::UnaryOp::OnesCompl => "~",
            }));
            emit_expr(operand, out);
        }
        Expr::Call {
            name,
            namespace,
            call_type,
            args,
        } => {
            match call_type {
                CallType::Parent => {
                    out.push(Token::Ident("Parent".to_string()));
                    out.push(Token::Punct("::"));
                    out.push(Token::Ident(name.clone().unwrap_or_default()));
                }
                CallType::Function => {
                    if let Some(ns) = namespace {
                        out.push(Token::Ident(ns.clone()));
                        out.push(Token::Punct("::"));
                    }
                    out.push(Token::Ident(name.clone().unwrap_or_default()));
                }
                CallType::Method => {
                    // The first argument is the implicit receiver: `recv.method(rest...)`.
                    let mut args_iter = args.iter();
                    if let Some(recv) = args_iter.next() {
                        emit_expr(recv, out);
                        out.push(Token::Punct("."));
                        out.push(Token::Ident(name.clone().unwrap_or_default()));
                        out.push(Token::Punct("("));
                        for (i, arg) in args_iter.enumerate() {
                            if i > 0 {
                                out.push(Token::Punct(","));
                            }
                            emit_expr(arg, out);
                        }
                        out.push(Token::Punct(")"));
                        return;
                    }
                    out.push(Token::Ident(name.clone().unwrap_or_default()));
                }
            }
            out.push(Token::Punct("("));
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push(Token::Punct(","));
                }
                emit_expr(arg, out);
            }
            out.push(Token::Punct(")"));
        }
        Expr::Assign(stmt) => {
            // Rare: an assignment consumed as a sub-expression rather than
            // flushed to its own statement. Parenthesize so `(a = b)`
            // reads unambiguously wherever it lands.
            out.push(Token::Punct("("));
            emit_stmt(stmt, out);
            // emit_stmt always appends `;`+`Newline`; drop both so this
            // reads as an expression, not a nested statement.
            out.pop();
            out.pop();
            out.push(Token::Punct(")"));
        }
        Expr::Concat { parts, tag } => {
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(Token::Punct("@"));
                }
                emit_expr(part, out);
            }
            if parts.is_empty() {
                out.push(Token::StrLit {
                    value: String::new(),
                    tag: *tag,
                });
            }
        }
    }
}
