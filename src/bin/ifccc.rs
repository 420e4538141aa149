//! The compiler driver. Reads a single source file and writes x86-64
//! AT&T assembly to stdout, per spec.md §6's invocation contract.
//!
//! Grounded on `parishoffman-smol`'s `bin/smolc.rs` (`clap::Parser` +
//! an `Output`-style emit enum), trimmed to spec.md's single positional
//! argument and exit-code contract: no `-O` flag (no optimizer exists;
//! see DESIGN.md), and `--emit` only distinguishes debug IR output from
//! the real assembly output.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use ifcc_rs::back::emit_function;
use ifcc_rs::front::parse;
use ifcc_rs::middle::liveness;
use ifcc_rs::middle::regalloc::{allocate, build_interference};
use ifcc_rs::Module;

#[derive(Debug, Parser)]
#[command(version, about = "compiles a small C subset to x86-64 assembly", long_about = None)]
struct Args {
    /// Path to the source file to compile.
    file: PathBuf,
    /// What to print on stdout.
    #[arg(value_enum, long, default_value_t = Emit::Asm)]
    emit: Emit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// The per-function IR listing (debug only; not part of the
    /// externally observable contract).
    Ir,
    /// The resulting x86-64 AT&T assembly (spec.md §6's default output).
    Asm,
}

/// The one process-level error this driver distinguishes from in-language
/// diagnostics (spec.md §6: "missing or unreadable file -> stderr, exit
/// 1"). In-language errors/warnings go through `DiagnosticSink` instead.
#[derive(Debug, thiserror::Error)]
#[error("cannot read file {path}: {source}")]
struct SourceReadError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let source = match read_source(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };

    let program = match parse(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };

    let module = Module::compile(&program);
    module
        .diagnostics
        .report(&mut std::io::stderr())
        .expect("stderr should be writable");
    if module.has_error() {
        // spec.md §7: any Error diagnostic ends the run before any
        // assembly reaches stdout.
        return ExitCode::from(1);
    }

    match args.emit {
        Emit::Ir => {
            for cfg in module.emittable_functions() {
                print!("{}", cfg.dump_ir());
            }
        }
        Emit::Asm => {
            let mut out = String::new();
            for cfg in module.emittable_functions() {
                let live = liveness::analyze(cfg);
                let graph = build_interference(cfg, &live);
                let alloc = allocate(&graph);
                emit_function(cfg, &alloc, &mut out);
            }
            print!("{out}");
        }
    }
    ExitCode::SUCCESS
}

fn read_source(path: &PathBuf) -> Result<String, SourceReadError> {
    std::fs::read_to_string(path).map_err(|source| SourceReadError {
        path: path.clone(),
        source,
    })
}
