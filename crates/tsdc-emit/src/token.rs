//! The token stream: the AST-emission interface's output contract. Not a
//! formatted string -- no column alignment, no blank-line policy. That is a
//! pretty printer's job, and the pretty printer is out of scope here.

use std::fmt;

/// One token of the emitted stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(&'static str),
    Ident(String),
    StrLit { value: String, tag: bool },
    /// Pre-formatted so the emitter, not the consumer, decides integer vs.
    /// float rendering.
    NumLit(String),
    Punct(&'static str),
    Newline,
    /// Signed indent delta: `+1` on block entry, `-1` on block exit.
    Indent(i32),
}

/// A minimal, explicitly non-production renderer: single space between
/// tokens, one newline per `Newline`, brace-matched indentation. Useful for
/// test assertions and manual debug runs of `decompile`, nothing more.
pub struct DebugDisplay<'a>(pub &'a [Token]);

impl fmt::Display for DebugDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth: i32 = 0;
        let mut at_line_start = true;
        for tok in self.0 {
            match tok {
                Token::Newline => {
                    writeln!(f)?;
                    at_line_start = true;
                }
                Token::Indent(delta) => {
                    depth += delta;
                }
                other => {
                    if at_line_start {
                        write!(f, "{}", "    ".repeat(depth.max(0) as usize))?;
                        at_line_start = false;
                    } else {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", render(other))?;
                }
            }
        }
        Ok(())
    }
}

fn render(tok: &Token) -> String {
    match tok {
        Token::Keyword(k) => k.to_string(),
        Token::Ident(s) => s.clone(),
        Token::StrLit { value, tag } => {
            if *tag {
                format!("'{value}'")
            } else {
                format!("\"{value}\"")
            }
        }
        Token::NumLit(s) => s.clone(),
        Token::Punct(p) => p.to_string(),
        Token::Newline | Token::Indent(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_simple_if_block() {
        let toks = vec![
            Token::Keyword("if"),
            Token::Punct("("),
            Token::Ident("x".into()),
            Token::Punct(")"),
            Token::Punct("{"),
            Token::Newline,
            Token::Indent(1),
            Token::Keyword("return"),
            Token::Punct(";"),
            Token::Newline,
            Token::Indent(-1),
            Token::Punct("}"),
        ];
        let rendered = DebugDisplay(&toks).to_string();
        assert!(rendered.contains("if ( x )"));
        assert!(rendered.contains("    return ;"));
    }
}
