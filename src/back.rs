//! The back end: x86-64 AT&T assembly emission (spec.md §4.5).

pub mod emit;

pub use emit::emit_function;
