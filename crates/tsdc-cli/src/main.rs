//! `tsdc` binary: decompiles a single DSO file to TorqueScript text.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use tsdc_emit::token::{DebugDisplay, Token};
use tsdc_emit::decompile_bytes;

/// DSO bytecode decompiler.
#[derive(Parser)]
#[command(name = "tsdc", about = "Decompiles a Torque Game Engine DSO file")]
struct Cli {
    /// Path to the compiled `.dso` file.
    input: PathBuf,

    /// DSO format version to expect; the file is rejected if its header
    /// names a different one.
    #[arg(long)]
    version: Option<u32>,

    /// Print the raw token stream (one per line) instead of rendering it
    /// through the debug pretty printer.
    #[arg(long)]
    dump_tokens: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    process::exit(run(&cli));
}

/// Runs the decompile pipeline and prints its output.
///
/// Returns the process exit code: 0 success, 1 file error, 2 disassembly
/// error, 3 structural error.
fn run(cli: &Cli) -> i32 {
    let bytes = match fs::read(&cli.input) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: failed to read '{}': {e}", cli.input.display());
            return 1;
        }
    };

    let tokens = match decompile_bytes(&bytes, cli.version) {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_code();
        }
    };

    if cli.dump_tokens {
        for tok in &tokens {
            println!("{}", dump_one(tok));
        }
    } else {
        println!("{}", DebugDisplay(&tokens));
    }

    0
}

/// One-line debug spelling of a single token, for `--dump-tokens`.
fn dump_one(tok: &Token) -> String {
    match tok {
        Token::Keyword(k) => format!("Keyword({k})"),
        Token::Ident(s) => format!("Ident({s})"),
        Token::StrLit { value, tag } => format!("StrLit({value:?}, tag={tag})"),
        Token::NumLit(s) => format!("NumLit({s})"),
        Token::Punct(p) => format!("Punct({p})"),
        Token::Newline => "Newline".to_string(),
        Token::Indent(d) => format!("Indent({d})"),
    }
}
