//! The front end.
//!
//! spec.md §1 treats lexing/parsing of the surface grammar as an external
//! collaborator: the core (`middle`/`back`) only depends on the typed AST
//! shapes (`ast`) and the type/symbol model (`symbol`) a validated,
//! scope-resolved parse tree is assumed to produce. `lex`/`parse` are a
//! minimal, self-contained implementation of that collaborator so the CLI
//! binary has an actual front end to drive the core with (see `lex.rs`'s
//! module doc for why it isn't a port of the original grammar).

pub mod ast;
pub mod lex;
pub mod parse;
pub mod symbol;

pub use ast::*;
pub use parse::{parse, ParseError};
pub use symbol::*;
