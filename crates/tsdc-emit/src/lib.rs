//! Top-level decompile pipeline: disassemble -> build CFGs -> structural
//! analysis -> AST lift -> token emission.
//!
//! [`decompile`] is the main entry point, running the whole pipeline over
//! one loaded file and returning a flat token stream ready for a caller to
//! print or feed to a pretty printer of its own.

pub mod ast;
pub mod emit;
pub mod error;
mod lift;
pub mod token;

use tracing::{debug, info};

use tsdc_analysis::{analyze, FunctionHeader};
use tsdc_core::{build_cfgs, disassemble, FileData};
use tsdc_loader::DsoFile;

pub use ast::{Expr, Program, Stmt, Target, UnaryOp};
pub use error::{DecompileError, EmitError};
pub use token::Token;

/// Loads `bytes` as a DSO container and runs the full pipeline over it.
/// This is the path the CLI drives; [`decompile`] itself stays generic
/// over any [`FileData`] so tests can feed it hand-built fixtures.
pub fn decompile_bytes(bytes: &[u8], version: Option<u32>) -> Result<Vec<Token>, DecompileError> {
    let file = DsoFile::load(bytes, version)?;
    decompile(&file)
}

/// Runs the full pipeline over `file` and returns the emitted token
/// stream: the main script's statements first, then every function
/// declaration found in the code segment, in the order their CFGs were
/// built (main-script span first, then each function span in address
/// order -- see `tsdc_core::build_cfgs`).
pub fn decompile(file: &dyn FileData) -> Result<Vec<Token>, DecompileError> {
    // 1. Linear disassembly of the whole code segment.
    let disasm = disassemble(file)?;
    info!(instructions = disasm.len(), "decompile: disassembled");

    // 2. Split into one CFG for the main script and one per function body.
    let cfgs = build_cfgs(&disasm)?;
    info!(cfg_count = cfgs.len(), "decompile: CFGs built");

    // 3. Structural analysis + 4. AST lift, per CFG.
    let mut program = Program::default();
    for cfg in &cfgs {
        let entry_block = cfg
            .block(cfg.entry_addr())
            .expect("CFG entry address always has a block");
        let header = entry_block
            .is_function
            .then(|| FunctionHeader::from_block(entry_block));

        let region = analyze(cfg)?;
        debug!(entry = cfg.entry_addr(), is_function = header.is_some(), "decompile: region analyzed");
        let stmts = lift::lift_cfg_root(region, header, file)?;
        program.body.extend(stmts);
    }

    // 5. Flatten the lifted AST into the token stream.
    let tokens = emit::emit_program(&program.body);
    info!(tokens = tokens.len(), "decompile: emission complete");
    Ok(tokens)
}
