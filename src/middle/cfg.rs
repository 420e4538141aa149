//! Basic blocks and the per-function control-flow graph.
//!
//! Basic blocks are owned in an index-addressed arena (`CFG::blocks`);
//! successor fields are [`BlockId`] indices rather than raw pointers, per
//! spec.md §9's ownership re-architecture. Symbols are likewise owned in a
//! per-CFG `Vec<Symbol>` and referenced everywhere else by [`SymbolId`].

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::trace;

use crate::common::Map;
use crate::diag::DiagnosticSink;
use crate::front::symbol::{ScopeFrame, Symbol, SymbolId, Type};
use crate::middle::ir::Instr;

/// Index into `CFG::blocks`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

/// A straight-line IR sequence with up to two successors.
pub struct BasicBlock {
    /// Empty string means a fallthrough block: no label is emitted.
    pub label: String,
    pub instrs: Vec<Instr>,
    /// Taken unconditionally, unless `exit_false` is set and the block's
    /// last `CmpNz` result is zero.
    pub exit_true: Option<BlockId>,
    /// Taken on the zero condition set by the block's last `CmpNz`.
    pub exit_false: Option<BlockId>,
    /// Guards against double emission during recursive traversal.
    pub visited: Cell<bool>,
}

impl BasicBlock {
    fn new(label: impl Into<String>) -> Self {
        BasicBlock {
            label: label.into(),
            instrs: Vec::new(),
            exit_true: None,
            exit_false: None,
            visited: Cell::new(false),
        }
    }

    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }
}

/// The function-wide signature table, shared read-only from `Module` for
/// call-site arity/name resolution (spec.md §9: "Build it in two passes").
pub type Signatures = Rc<Map<String, (Type, Vec<Type>)>>;

/// One function's control-flow graph.
pub struct CFG {
    pub name: String,
    pub return_type: Type,
    /// Parameter types in declaration order, paired with their symbols.
    pub params: Vec<(Type, SymbolId)>,
    pub blocks: Vec<BasicBlock>,
    symbols: Vec<Symbol>,
    scopes: VecDeque<ScopeFrame>,
    next_free_symbol_index: i32,
    next_label: u32,
    signatures: Signatures,
    /// Filled in by the register allocator: Symbol -> physical register
    /// index in `[0..K)`. Spilled symbols have no entry.
    pub register_assignment: Map<SymbolId, u8>,
}

impl CFG {
    pub fn new(name: impl Into<String>, return_type: Type, arg_count: usize, signatures: Signatures) -> Self {
        let extra_stack_args = arg_count.saturating_sub(6) as i32;
        let mut cfg = CFG {
            name: name.into(),
            return_type,
            params: Vec::new(),
            blocks: Vec::new(),
            symbols: Vec::new(),
            scopes: VecDeque::new(),
            next_free_symbol_index: 1 + 4 * extra_stack_args.max(0),
            next_label: 0,
            signatures,
            register_assignment: Map::new(),
        };
        cfg.push_scope();
        cfg.blocks.push(BasicBlock::new(""));
        cfg
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn signature(&self, name: &str) -> Option<&(Type, Vec<Type>)> {
        self.signatures.get(name)
    }

    // -- scope stack -----------------------------------------------------

    pub fn push_scope(&mut self) {
        self.scopes.push_front(ScopeFrame::new());
    }

    /// Pop the innermost frame, reporting unused-variable warnings for any
    /// non-temporary symbol that was never read (spec.md §4.1).
    pub fn pop_scope(&mut self, diag: &DiagnosticSink) {
        let frame = self.scopes.pop_front().expect("pop_scope without a matching push_scope");
        for (_, id) in frame.iter() {
            let sym = &self.symbols[id.0 as usize];
            if !sym.used && !sym.is_temp() {
                diag.push_warning(
                    sym.line,
                    format!("Variable {} not used (declared in line {})", sym.name, sym.line),
                );
            }
        }
    }

    /// Insert `name` into the innermost frame. Fails (returns `None`) if
    /// `name` already exists in that frame; shadowing an outer frame is
    /// fine.
    pub fn add_symbol(&mut self, name: crate::common::Id, ty: Type, line: u32) -> Option<SymbolId> {
        let id = self.alloc_symbol(name, ty, line, false);
        let front = self.scopes.front_mut().expect("scope stack is never empty");
        if front.insert(name, id) {
            Some(id)
        } else {
            // Roll back: keep the symbol table append-only is fine since
            // the slot is simply orphaned, matching the original's
            // behavior of still constructing storage before reporting the
            // redeclaration error.
            None
        }
    }

    pub fn get_symbol(&self, name: crate::common::Id) -> Option<SymbolId> {
        self.scopes.iter().find_map(|frame| frame.get(name))
    }

    pub fn mark_used(&mut self, id: SymbolId) {
        self.symbols[id.0 as usize].used = true;
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Allocate a function-wide temporary. Temporaries are not scoped:
    /// they accumulate in the function's temp space until the function
    /// ends, and are always marked `used`.
    pub fn create_new_tempvar(&mut self, ty: Type) -> SymbolId {
        let offset = self.aligned_offset(ty);
        let name: crate::common::Id = format!("!T{offset}").into();
        let id = self.push_symbol(Symbol {
            name,
            ty,
            offset,
            line: 0,
            used: true,
            array_size: None,
        });
        trace!("tempvar {} : {} at offset {}", name, ty, offset);
        id
    }

    fn alloc_symbol(&mut self, name: crate::common::Id, ty: Type, line: u32, used: bool) -> SymbolId {
        let offset = self.aligned_offset(ty);
        self.push_symbol(Symbol {
            name,
            ty,
            offset,
            line,
            used,
            array_size: None,
        })
    }

    /// Slot size is never less than 4 bytes: per DESIGN.md's char-widening
    /// resolution, `char` is carried as a 4-byte value through allocation
    /// and emission (the emitter only ever issues `movl`), so a `char`
    /// symbol's spill slot must be 4-byte-aligned and 4 bytes wide like an
    /// `int`'s, not the 1-byte slot its `Type::size()` alone would imply.
    fn aligned_offset(&mut self, ty: Type) -> i32 {
        let size = ty.size().max(4);
        let aligned = self.next_free_symbol_index.div_ceil(size) * size;
        self.next_free_symbol_index = aligned + size;
        aligned
    }

    fn push_symbol(&mut self, sym: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(sym);
        id
    }

    pub fn frame_size(&self) -> i32 {
        self.next_free_symbol_index
    }

    // -- basic blocks ------------------------------------------------

    pub fn new_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(label));
        id
    }

    pub fn fresh_label(&mut self) -> String {
        let label = format!(".L{}", self.next_label);
        self.next_label += 1;
        label
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    fn sym_name(&self, id: SymbolId) -> String {
        self.symbol(id).name.to_string()
    }

    /// A textual listing of every block and instruction, in the style of
    /// the original `IRInstr::operator<<` debug form (`dest = lhs op
    /// rhs`), used only by the CLI's `--emit=ir` debug output (spec.md §9
    /// describes this as a `Display`-shaped concern, not part of the
    /// externally observable assembly contract).
    pub fn dump_ir(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        writeln!(out, "function {}: {} ({} params)", self.name, self.return_type, self.params.len()).unwrap();
        for (i, block) in self.blocks.iter().enumerate() {
            let label = if block.label.is_empty() {
                format!("bb{i}")
            } else {
                block.label.clone()
            };
            writeln!(out, "{label}:").unwrap();
            for instr in &block.instrs {
                writeln!(out, "    {}", self.format_instr(instr)).unwrap();
            }
            match (block.exit_true, block.exit_false) {
                (Some(t), Some(f)) => {
                    writeln!(out, "    -> true: bb{}, false: bb{}", t.0, f.0).unwrap();
                }
                (Some(t), None) => writeln!(out, "    -> bb{}", t.0).unwrap(),
                (None, _) => {}
            }
        }
        out
    }

    fn format_instr(&self, instr: &Instr) -> String {
        let name = |id: SymbolId| self.sym_name(id);
        match instr {
            Instr::Binary { op, dst, lhs, rhs } => format!("{} = {} {op} {}", name(*dst), name(*lhs), name(*rhs)),
            Instr::Unary { op, dst, operand } => format!("{} = {op} {}", name(*dst), name(*operand)),
            Instr::LdConst { literal, dst, ty } => format!("{} = {literal} ({ty})", name(*dst)),
            Instr::LdVar { src } => format!("ldvar {}", name(*src)),
            Instr::CmpNz { src } => format!("cmpNZ {}", name(*src)),
            Instr::VarAssign { dst, src } => format!("{} = {}", name(*dst), name(*src)),
            Instr::ParamDecl { ty, sym } => format!("param_decl {}: {ty}", name(*sym)),
            Instr::Param { arg } => format!("param {}", name(*arg)),
            Instr::Call { name: callee, args, dst } => {
                let args = args.iter().map(|a| name(*a)).collect::<Vec<_>>().join(", ");
                match dst {
                    Some(d) => format!("{} = call {callee}({args})", name(*d)),
                    None => format!("call {callee}({args})"),
                }
            }
            Instr::Ret { value } => match value {
                Some(v) => format!("ret {}", name(*v)),
                None => "ret".to_string(),
            },
            Instr::Nothing => "nothing".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn empty_sigs() -> Signatures {
        Rc::new(Map::new())
    }

    #[test]
    fn offsets_are_aligned_and_advance() {
        let mut cfg = CFG::new("f", Type::Void, 0, empty_sigs());
        let a = cfg.add_symbol("a".to_string().into(), Type::Char, 1).unwrap();
        let b = cfg.add_symbol("b".to_string().into(), Type::Int, 2).unwrap();
        assert_eq!(cfg.symbol(a).offset % 4, 0);
        assert_eq!(cfg.symbol(b).offset % 4, 0);
        assert!(cfg.symbol(b).offset >= cfg.symbol(a).offset + 4);
    }

    #[test]
    fn char_slot_is_4_bytes_wide_like_an_int() {
        // A char's stack slot must not overlap the next symbol's: the
        // emitter always issues 4-byte `movl`, even for `char`.
        let mut cfg = CFG::new("f", Type::Void, 0, empty_sigs());
        let c = cfg.add_symbol("c".to_string().into(), Type::Char, 1).unwrap();
        let n = cfg.add_symbol("n".to_string().into(), Type::Int, 2).unwrap();
        assert_eq!(cfg.symbol(n).offset - cfg.symbol(c).offset, 4);
    }

    #[test]
    fn redeclaration_in_same_frame_fails() {
        let mut cfg = CFG::new("f", Type::Void, 0, empty_sigs());
        let name: crate::common::Id = "x".to_string().into();
        assert!(cfg.add_symbol(name, Type::Int, 1).is_some());
        assert!(cfg.add_symbol(name, Type::Int, 2).is_none());
    }

    #[test]
    fn shadowing_across_frames_is_allowed() {
        let mut cfg = CFG::new("f", Type::Void, 0, empty_sigs());
        let name: crate::common::Id = "x".to_string().into();
        assert!(cfg.add_symbol(name, Type::Int, 1).is_some());
        cfg.push_scope();
        assert!(cfg.add_symbol(name, Type::Int, 2).is_some());
    }

    #[test]
    fn stack_arg_reservation_for_many_params() {
        let cfg = CFG::new("f", Type::Int, 7, empty_sigs());
        assert_eq!(cfg.frame_size(), 1 + 4 * 1);
    }

    #[test]
    fn pop_scope_warns_on_unused() {
        let diag = DiagnosticSink::new();
        let mut cfg = CFG::new("f", Type::Void, 0, empty_sigs());
        cfg.add_symbol("x".to_string().into(), Type::Int, 3);
        cfg.pop_scope(&diag);
        assert!(!diag.has_error());
        let msgs = diag.diagnostics();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].to_string().contains("Variable x not used"));
    }
}
