//! AST -> IR lowering (spec.md §4.2).
//!
//! A syntax-directed walk over the typed AST that appends IR instructions
//! into the CFG's basic-block arena, wiring block successors for `if`,
//! `if`/`else`, and `while` exactly as spec.md describes. Lowering never
//! stops on an error: every helper records a diagnostic and hands back a
//! best-effort sentinel symbol so downstream constructs still get lowered
//! and can surface their own diagnostics.

use log::trace;

use crate::common::Id;
use crate::diag::DiagnosticSink;
use crate::front::ast;
use crate::front::symbol::{SymbolId, Type};
use crate::middle::cfg::{BlockId, CFG};
use crate::middle::ir::{BinOp as IrBinOp, Instr, UnOp as IrUnOp};

pub struct Lowerer<'a> {
    cfg: &'a mut CFG,
    diag: &'a DiagnosticSink,
    current: BlockId,
}

impl<'a> Lowerer<'a> {
    pub fn new(cfg: &'a mut CFG, diag: &'a DiagnosticSink) -> Self {
        let entry = cfg.entry();
        Lowerer {
            cfg,
            diag,
            current: entry,
        }
    }

    fn push(&mut self, instr: Instr) {
        let current = self.current;
        self.cfg.block_mut(current).push(instr);
    }

    /// A well-typed, never-read placeholder returned in place of a value
    /// that couldn't be computed because of an earlier diagnostic.
    fn sentinel(&mut self) -> SymbolId {
        self.cfg.create_new_tempvar(Type::Int)
    }

    pub fn lower_function(&mut self, func: &ast::Function) {
        for p in &func.params {
            if p.ty == Type::Void {
                self.diag
                    .push_error(p.line, "Can't create a variable of type void".to_string());
                continue;
            }
            match self.cfg.add_symbol(p.name, p.ty, p.line) {
                Some(sym) => {
                    self.cfg.mark_used(sym); // parameters are never warned as unused
                    self.cfg.params.push((p.ty, sym));
                    self.push(Instr::ParamDecl { ty: p.ty, sym });
                }
                None => {
                    self.diag.push_error(
                        p.line,
                        format!("The variable {} has already been declared", p.name),
                    );
                }
            }
        }
        self.lower_block_inline(&func.body, func.name, func.return_type);
        // Pop the frame `CFG::new` pushed for parameters (shared with the
        // body's top-level locals, see `lower_block_inline`): this is the
        // only point it's ever popped, so it's also where unused-variable
        // warnings for top-level locals and parameters surface.
        self.cfg.pop_scope(self.diag);
    }

    /// Lower a block without pushing a fresh scope frame: the function
    /// body's top-level declarations share the frame `lower_function`
    /// already populated with parameters (so a local redeclaring a
    /// parameter name is a same-frame redeclaration error, not shadowing,
    /// matching the scope nesting implied by spec.md §4.1's "a function's
    /// environment is a stack of ScopeFrames" combined with §4.2's
    /// parameter-registration rule).
    fn lower_block_inline(&mut self, block: &ast::Block, func_name: Id, return_type: Type) {
        for stmt in &block.stmts {
            self.lower_stmt(stmt, func_name, return_type);
        }
    }

    fn lower_block(&mut self, block: &ast::Block, func_name: Id, return_type: Type) {
        self.cfg.push_scope();
        for stmt in &block.stmts {
            self.lower_stmt(stmt, func_name, return_type);
        }
        self.cfg.pop_scope(self.diag);
    }

    fn lower_stmt(&mut self, stmt: &ast::Stmt, func_name: Id, return_type: Type) {
        match stmt {
            ast::Stmt::Decl { ty, declarators } => self.lower_decl(*ty, declarators),
            ast::Stmt::Assign { name, value, line } => self.lower_assign(*name, value, *line),
            ast::Stmt::ExprStmt(expr) => {
                if let ast::Expr::Call { callee, args, line } = expr {
                    self.lower_call(*callee, args, *line);
                } else {
                    self.lower_expr(expr);
                }
            }
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch: None,
            } => self.lower_if(cond, then_branch, func_name, return_type),
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch: Some(else_branch),
            } => self.lower_if_else(cond, then_branch, else_branch, func_name, return_type),
            ast::Stmt::While { cond, body } => self.lower_while(cond, body, func_name, return_type),
            ast::Stmt::Block(block) => self.lower_block(block, func_name, return_type),
            ast::Stmt::Return { value, line } => self.lower_return(value.as_ref(), *line, func_name, return_type),
        }
    }

    fn lower_decl(&mut self, ty: Type, declarators: &[ast::Declarator]) {
        if ty == Type::Void {
            for d in declarators {
                self.diag
                    .push_error(d.line, "Can't create a variable of type void".to_string());
            }
            return;
        }
        for d in declarators {
            match self.cfg.add_symbol(d.name, ty, d.line) {
                Some(sym) => {
                    if let Some(init) = &d.init {
                        let src = self.lower_expr(init);
                        self.push(Instr::VarAssign { dst: sym, src });
                    }
                }
                None => {
                    self.diag.push_error(
                        d.line,
                        format!("The variable {} has already been declared", d.name),
                    );
                }
            }
        }
    }

    fn lower_assign(&mut self, name: Id, value: &ast::Expr, line: u32) {
        let target = self.cfg.get_symbol(name);
        let src = self.lower_expr(value);
        match target {
            Some(dst) => self.push(Instr::VarAssign { dst, src }),
            None => self
                .diag
                .push_error(line, format!("Symbol not found: {name}")),
        }
    }

    fn lower_return(&mut self, value: Option<&ast::Expr>, line: u32, func_name: Id, return_type: Type) {
        match (return_type, value) {
            (Type::Void, Some(_)) => {
                self.diag.push_error(
                    line,
                    format!("Void function {func_name} should not return a value"),
                );
                self.push(Instr::Ret { value: None });
            }
            (Type::Void, None) => self.push(Instr::Ret { value: None }),
            (_, None) => {
                self.diag.push_error(
                    line,
                    format!("Non void function {func_name} should return a value"),
                );
                self.push(Instr::Ret { value: None });
            }
            (_, Some(expr)) => {
                let v = self.lower_expr(expr);
                self.push(Instr::Ret { value: Some(v) });
            }
        }
    }

    fn lower_if(&mut self, cond: &ast::Expr, then_branch: &ast::Block, func_name: Id, return_type: Type) {
        let cond_sym = self.lower_expr(cond);
        self.push(Instr::CmpNz { src: cond_sym });

        let original_exit_true = self.cfg.block(self.current).exit_true;
        let true_block = self.cfg.new_block("");
        let false_label = self.cfg.fresh_label();
        let false_block = self.cfg.new_block(false_label);

        {
            let cur = self.current;
            let b = self.cfg.block_mut(cur);
            b.exit_true = Some(true_block);
            b.exit_false = Some(false_block);
        }
        self.cfg.block_mut(true_block).exit_true = Some(false_block);
        self.cfg.block_mut(false_block).exit_true = original_exit_true;

        self.current = true_block;
        self.lower_block(then_branch, func_name, return_type);

        self.current = false_block;
    }

    fn lower_if_else(
        &mut self,
        cond: &ast::Expr,
        then_branch: &ast::Block,
        else_branch: &ast::Block,
        func_name: Id,
        return_type: Type,
    ) {
        let cond_sym = self.lower_expr(cond);
        self.push(Instr::CmpNz { src: cond_sym });

        let true_block = self.cfg.new_block("");
        let else_label = self.cfg.fresh_label();
        let else_block = self.cfg.new_block(else_label);
        let end_label = self.cfg.fresh_label();
        let end_block = self.cfg.new_block(end_label);

        {
            let cur = self.current;
            let b = self.cfg.block_mut(cur);
            b.exit_true = Some(true_block);
            b.exit_false = Some(else_block);
        }
        self.cfg.block_mut(true_block).exit_true = Some(end_block);
        self.cfg.block_mut(else_block).exit_true = Some(end_block);

        self.current = true_block;
        self.lower_block(then_branch, func_name, return_type);

        self.current = else_block;
        self.lower_block(else_branch, func_name, return_type);

        self.current = end_block;
    }

    fn lower_while(&mut self, cond: &ast::Expr, body: &ast::Block, func_name: Id, return_type: Type) {
        let cond_label = self.cfg.fresh_label();
        let cond_block = self.cfg.new_block(cond_label);
        let body_block = self.cfg.new_block("");
        let end_label = self.cfg.fresh_label();
        let end_block = self.cfg.new_block(end_label);

        self.cfg.block_mut(self.current).exit_true = Some(cond_block);

        self.current = cond_block;
        let cond_sym = self.lower_expr(cond);
        self.push(Instr::CmpNz { src: cond_sym });
        self.cfg.block_mut(cond_block).exit_true = Some(body_block);
        self.cfg.block_mut(cond_block).exit_false = Some(end_block);

        self.current = body_block;
        self.lower_block(body, func_name, return_type);
        self.cfg.block_mut(body_block).exit_true = Some(cond_block);

        self.current = end_block;
    }

    // -- expressions -------------------------------------------------

    fn lower_expr(&mut self, expr: &ast::Expr) -> SymbolId {
        match expr {
            ast::Expr::Ident { name, line } => self.lower_ident(*name, *line),
            ast::Expr::IntLit { value, .. } => self.lower_const(value.to_string(), Type::Int),
            ast::Expr::CharLit { value, .. } => self.lower_const((*value as u32).to_string(), Type::Char),
            ast::Expr::Paren(inner) => self.lower_expr(inner),
            ast::Expr::Binary { op, lhs, rhs, .. } => self.lower_binary(*op, lhs, rhs),
            ast::Expr::Unary { op, operand, line } => self.lower_unary(*op, operand, *line),
            ast::Expr::Call { callee, args, line } => match self.lower_call(*callee, args, *line) {
                Some(dst) => dst,
                None => {
                    self.diag.push_error(
                        *line,
                        "Invalid operation with function returning void".to_string(),
                    );
                    self.sentinel()
                }
            },
        }
    }

    fn lower_ident(&mut self, name: Id, line: u32) -> SymbolId {
        match self.cfg.get_symbol(name) {
            Some(sym) => {
                self.cfg.mark_used(sym);
                self.push(Instr::LdVar { src: sym });
                sym
            }
            None => {
                self.diag.push_error(line, format!("Symbol not found: {name}"));
                self.sentinel()
            }
        }
    }

    fn lower_const(&mut self, literal: String, ty: Type) -> SymbolId {
        // Character literals widen to a 4-byte destination at this point
        // (see DESIGN.md's char-widening resolution); `ty` on the
        // instruction still tags the literal's source type.
        let dst = self.cfg.create_new_tempvar(Type::Int);
        self.push(Instr::LdConst {
            literal,
            dst,
            ty,
        });
        dst
    }

    fn lower_binary(&mut self, op: ast::BinOp, lhs: &ast::Expr, rhs: &ast::Expr) -> SymbolId {
        let lhs_sym = self.lower_expr(lhs);
        let rhs_sym = self.lower_expr(rhs);
        let dst = self.cfg.create_new_tempvar(Type::Int);
        let ir_op = match op {
            ast::BinOp::Add => IrBinOp::Add,
            ast::BinOp::Sub => IrBinOp::Sub,
            ast::BinOp::Mul => IrBinOp::Mul,
            ast::BinOp::Div => IrBinOp::Div,
            ast::BinOp::Mod => IrBinOp::Mod,
            ast::BinOp::BAnd => IrBinOp::BAnd,
            ast::BinOp::BOr => IrBinOp::BOr,
            ast::BinOp::BXor => IrBinOp::BXor,
            ast::BinOp::Lt => IrBinOp::Lt,
            ast::BinOp::Leq => IrBinOp::Leq,
            ast::BinOp::Gt => IrBinOp::Gt,
            ast::BinOp::Geq => IrBinOp::Geq,
            ast::BinOp::Eq => IrBinOp::Eq,
            ast::BinOp::Neq => IrBinOp::Neq,
        };
        self.push(Instr::Binary {
            op: ir_op,
            dst,
            lhs: lhs_sym,
            rhs: rhs_sym,
        });
        dst
    }

    fn lower_unary(&mut self, op: ast::UnOp, operand: &ast::Expr, _line: u32) -> SymbolId {
        if op == ast::UnOp::Plus {
            // Unary `+` is a no-op: return the operand's value unchanged.
            return self.lower_expr(operand);
        }
        let operand_sym = self.lower_expr(operand);
        let dst = self.cfg.create_new_tempvar(Type::Int);
        let ir_op = match op {
            ast::UnOp::Neg => IrUnOp::Neg,
            ast::UnOp::Not => IrUnOp::Not,
            ast::UnOp::LNot => IrUnOp::LNot,
            ast::UnOp::Inc => IrUnOp::Inc,
            ast::UnOp::Dec => IrUnOp::Dec,
            ast::UnOp::Plus => unreachable!("handled above"),
        };
        self.push(Instr::Unary {
            op: ir_op,
            dst,
            operand: operand_sym,
        });
        if matches!(op, ast::UnOp::Inc | ast::UnOp::Dec) {
            // Prefix inc/dec writes back when the operand names a variable.
            if let ast::Expr::Ident { name, .. } = operand {
                if let Some(target) = self.cfg.get_symbol(*name) {
                    self.push(Instr::VarAssign { dst: target, src: dst });
                }
            }
        }
        dst
    }

    fn lower_call(&mut self, callee: Id, args: &[ast::Expr], line: u32) -> Option<SymbolId> {
        let sig = self.cfg.signature(callee.as_str()).cloned();
        let Some((return_type, param_types)) = sig else {
            self.diag
                .push_error(line, format!("Function {callee} has not been declared"));
            return None;
        };
        if args.len() != param_types.len() {
            self.diag.push_error(
                line,
                format!(
                    "Wrong number of parameters in function call to {callee}: expected {} but found {}",
                    param_types.len(),
                    args.len()
                ),
            );
        }
        let mut arg_syms = Vec::with_capacity(args.len());
        for arg in args {
            let sym = self.lower_expr(arg);
            self.push(Instr::Param { arg: sym });
            arg_syms.push(sym);
        }
        let dst = if return_type == Type::Void {
            None
        } else {
            Some(self.cfg.create_new_tempvar(return_type))
        };
        trace!("call {callee} with {} args -> {:?}", arg_syms.len(), dst);
        self.push(Instr::Call {
            name: callee.to_string(),
            args: arg_syms,
            dst,
        });
        dst
    }
}

pub fn lower_function(cfg: &mut CFG, diag: &DiagnosticSink, func: &ast::Function) {
    Lowerer::new(cfg, diag).lower_function(func);
}
