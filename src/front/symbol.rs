//! Types, symbols, and the per-function scope stack.
//!
//! `ScopeFrame` only holds the insertion-ordered name -> [`SymbolId`]
//! mapping; the symbols themselves (and the stack-offset bookkeeping) live
//! on the owning `CFG` (see `middle::cfg`), per spec.md §9's
//! "stable indices into a per-CFG Vec<Symbol>" note.

use derive_more::Display;

use crate::common::Id;

/// The closed set of value types this language supports.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Type {
    #[display("int")]
    Int,
    #[display("char")]
    Char,
    #[display("void")]
    Void,
}

impl Type {
    /// Storage size in bytes. `void` is legal only as a return type.
    pub fn size(self) -> i32 {
        match self {
            Type::Int => 4,
            Type::Char => 1,
            Type::Void => 0,
        }
    }
}

/// An index into a CFG's symbol table. Stable for the symbol's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

/// A named storage location or compiler-generated temporary.
///
/// Temporaries use the reserved prefix `!T` followed by a stable numeric id
/// and are always `used` (see `CFG::create_new_tempvar`).
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: Id,
    pub ty: Type,
    /// Positive byte offset from the frame pointer; the emitter encodes it
    /// as a negative displacement, e.g. offset 24 -> `-24(%rbp)`.
    pub offset: i32,
    pub line: u32,
    pub used: bool,
    /// Reserved; arrays are a Non-goal (spec.md §1) and this is never
    /// populated by lowering.
    pub array_size: Option<u32>,
}

impl Symbol {
    pub fn is_temp(&self) -> bool {
        self.name.starts_with("!T")
    }
}

/// One lexical block's bindings, innermost-to-outermost search order is the
/// caller's responsibility (the scope stack lives on `CFG`).
#[derive(Default, Debug)]
pub struct ScopeFrame {
    // Insertion order matters: unused-variable warnings are emitted in the
    // order symbols were declared.
    bindings: Vec<(Id, SymbolId)>,
}

impl ScopeFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a binding. Returns `false` without modifying the frame if
    /// `name` already exists in THIS frame (shadowing across frames is
    /// allowed; redeclaration within a frame is not).
    pub fn insert(&mut self, name: Id, id: SymbolId) -> bool {
        if self.bindings.iter().any(|(n, _)| *n == name) {
            return false;
        }
        self.bindings.push((name, id));
        true
    }

    pub fn get(&self, name: Id) -> Option<SymbolId> {
        self.bindings
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, id)| *id)
    }

    pub fn contains(&self, name: Id) -> bool {
        self.bindings.iter().any(|(n, _)| *n == name)
    }

    /// Bindings in declaration order, for unused-variable reporting.
    pub fn iter(&self) -> impl Iterator<Item = (Id, SymbolId)> + '_ {
        self.bindings.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_redeclaration_in_same_frame() {
        let mut frame = ScopeFrame::new();
        let name: Id = "x".to_string().into();
        assert!(frame.insert(name, SymbolId(0)));
        assert!(!frame.insert(name, SymbolId(1)));
    }

    #[test]
    fn type_sizes() {
        assert_eq!(Type::Int.size(), 4);
        assert_eq!(Type::Char.size(), 1);
        assert_eq!(Type::Void.size(), 0);
    }
}
