//! `ifcc-rs` compiles a small C-like language to x86-64 AT&T assembly.
//!
//! `front` turns source text into a typed AST (`front::ast`); `middle`
//! lowers that AST through a CFG-based IR, runs liveness analysis, and
//! allocates registers; `back` emits the resulting x86-64 assembly text.
//! The surface grammar itself is treated as a thin, self-contained
//! collaborator (see `front::lex`'s module doc) rather than the focus of
//! this crate: the hard engineering lives in `middle` and `back`.

pub mod common;
pub mod diag;
pub mod front;
pub mod middle;
pub mod back;
pub mod module;

pub use diag::{Diagnostic, DiagnosticSink};
pub use module::Module;

