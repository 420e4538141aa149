//! The three-address IR instruction set.
//!
//! Generalizes `middle::tir`'s five-operation tagged enum (`Copy`/`Const`/
//! `Arith`/`Read`/`Print`) to the full operation list spec.md §3 requires.
//! Operand layouts follow `original_source/compiler/ir.cpp`'s
//! `IRInstr::genAsm` argument order.

use derive_more::Display;

use crate::front::symbol::{SymbolId, Type};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum BinOp {
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Mod,
    #[display("&")]
    BAnd,
    #[display("|")]
    BOr,
    #[display("^")]
    BXor,
    #[display("<")]
    Lt,
    #[display("<=")]
    Leq,
    #[display(">")]
    Gt,
    #[display(">=")]
    Geq,
    #[display("==")]
    Eq,
    #[display("!=")]
    Neq,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum UnOp {
    #[display("-")]
    Neg,
    #[display("~")]
    Not,
    #[display("!")]
    LNot,
    #[display("++")]
    Inc,
    #[display("--")]
    Dec,
}

/// One three-address IR instruction. Each instruction writes at most one
/// destination `SymbolId`.
#[derive(Clone, Debug)]
pub enum Instr {
    /// `dst = lhs op rhs`
    Binary {
        op: BinOp,
        dst: SymbolId,
        lhs: SymbolId,
        rhs: SymbolId,
    },
    /// `dst = op operand`
    Unary {
        op: UnOp,
        dst: SymbolId,
        operand: SymbolId,
    },
    /// Materialize an immediate into a fresh temporary. `ty` distinguishes
    /// `int` from `char` literals (both carried as `int`-sized values; see
    /// DESIGN.md's char-widening resolution).
    LdConst { literal: String, dst: SymbolId, ty: Type },
    /// Materialize a variable as an expression value. A naming/usage
    /// marker: the lowering helper that emits this returns `src` directly
    /// rather than moving it into a fresh temporary.
    LdVar { src: SymbolId },
    /// Set flags from a value; the emitter attaches the owning block's
    /// conditional jump to its `exit_false` successor on zero.
    CmpNz { src: SymbolId },
    /// `dst = src`
    VarAssign { dst: SymbolId, src: SymbolId },
    /// Callee-side parameter record, emitted once per formal parameter at
    /// the head of a function's entry block.
    ParamDecl { ty: Type, sym: SymbolId },
    /// Caller-side argument push, consulted by the `Call` emitter.
    Param { arg: SymbolId },
    /// `dst = call name(args...)`; `dst` is absent for void callees.
    Call {
        name: String,
        args: Vec<SymbolId>,
        dst: Option<SymbolId>,
    },
    /// `ret value` or bare `ret` for void functions.
    Ret { value: Option<SymbolId> },
    /// No-op placeholder.
    Nothing,
}

impl Instr {
    /// Symbols read by this instruction (spec.md §4.3 `use(I)`).
    pub fn uses(&self) -> Vec<SymbolId> {
        match self {
            Instr::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instr::Unary { operand, .. } => vec![*operand],
            Instr::LdConst { .. } => vec![],
            Instr::LdVar { src } => vec![*src],
            Instr::CmpNz { src } => vec![*src],
            Instr::VarAssign { src, .. } => vec![*src],
            Instr::ParamDecl { .. } => vec![],
            Instr::Param { arg } => vec![*arg],
            Instr::Call { args, .. } => args.clone(),
            Instr::Ret { value } => value.into_iter().copied().collect(),
            Instr::Nothing => vec![],
        }
    }

    /// Symbols written by this instruction (spec.md §4.3 `def(I)`).
    pub fn defs(&self) -> Vec<SymbolId> {
        match self {
            Instr::Binary { dst, .. } => vec![*dst],
            Instr::Unary { dst, .. } => vec![*dst],
            Instr::LdConst { dst, .. } => vec![*dst],
            Instr::LdVar { .. } => vec![],
            Instr::CmpNz { .. } => vec![],
            Instr::VarAssign { dst, .. } => vec![*dst],
            Instr::ParamDecl { sym, .. } => vec![*sym],
            Instr::Param { .. } => vec![],
            Instr::Call { dst, .. } => dst.into_iter().copied().collect(),
            Instr::Ret { .. } => vec![],
            Instr::Nothing => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_uses_both_operands_and_defs_dst() {
        let i = Instr::Binary {
            op: BinOp::Add,
            dst: SymbolId(2),
            lhs: SymbolId(0),
            rhs: SymbolId(1),
        };
        assert_eq!(i.uses(), vec![SymbolId(0), SymbolId(1)]);
        assert_eq!(i.defs(), vec![SymbolId(2)]);
    }

    #[test]
    fn call_defs_empty_for_void() {
        let i = Instr::Call {
            name: "f".into(),
            args: vec![SymbolId(0)],
            dst: None,
        };
        assert_eq!(i.uses(), vec![SymbolId(0)]);
        assert!(i.defs().is_empty());
    }

    #[test]
    fn ret_void_has_no_uses() {
        let i = Instr::Ret { value: None };
        assert!(i.uses().is_empty());
    }
}
