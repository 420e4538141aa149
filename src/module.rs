//! The compilation context: the process-scoped function table and the
//! shared diagnostic sink (spec.md §9's two-pass construction).

use std::rc::Rc;

use crate::common::Map;
use crate::diag::DiagnosticSink;
use crate::front::ast;
use crate::front::symbol::Type;
use crate::middle::cfg::{Signatures, CFG};
use crate::middle::lower::lower_function;

/// `putchar`/`getchar` are externally linked: their signatures exist only
/// for type/arity checking and no CFG or assembly is ever emitted for
/// them (spec.md §6).
const BUILTINS: &[(&str, Type, &[Type])] = &[
    ("putchar", Type::Int, &[Type::Int]),
    ("getchar", Type::Int, &[]),
];

pub struct Module {
    pub functions: Map<String, CFG>,
    pub diagnostics: DiagnosticSink,
}

impl Module {
    /// Lower an entire program: first register every function's
    /// signature (plus the two builtins), then lower each body with that
    /// table available for call resolution.
    pub fn compile(program: &ast::Program) -> Self {
        let diagnostics = DiagnosticSink::new();
        let mut sig_map: Map<String, (Type, Vec<Type>)> = Map::new();
        for (name, ret, params) in BUILTINS {
            sig_map.insert((*name).to_string(), (*ret, params.to_vec()));
        }
        for func in &program.functions {
            let params: Vec<Type> = func.params.iter().map(|p| p.ty).collect();
            sig_map.insert(func.name.to_string(), (func.return_type, params));
        }
        let signatures: Signatures = Rc::new(sig_map);

        let mut functions = Map::new();
        for func in &program.functions {
            let mut cfg = CFG::new(
                func.name.to_string(),
                func.return_type,
                func.params.len(),
                signatures.clone(),
            );
            lower_function(&mut cfg, &diagnostics, func);
            functions.insert(func.name.to_string(), cfg);
        }

        Module {
            functions,
            diagnostics,
        }
    }

    pub fn has_error(&self) -> bool {
        self.diagnostics.has_error()
    }

    /// Functions that actually get assembly emitted: everything except
    /// the builtins, in name order (builtins never have a CFG here since
    /// they're not in `program.functions`, but filtering by name keeps
    /// the invariant explicit and centralizes the carve-out).
    pub fn emittable_functions(&self) -> impl Iterator<Item = &CFG> {
        self.functions
            .values()
            .filter(|cfg| cfg.name != "putchar" && cfg.name != "getchar")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Id;
    use crate::front::ast::*;

    fn id(s: &str) -> Id {
        s.to_string().into()
    }

    fn simple_return_42() -> Program {
        Program {
            functions: vec![Function {
                return_type: Type::Int,
                name: id("main"),
                params: vec![],
                body: Block {
                    stmts: vec![Stmt::Return {
                        value: Some(Expr::IntLit { value: 42, line: 1 }),
                        line: 1,
                    }],
                },
                line: 1,
            }],
        }
    }

    #[test]
    fn compiles_without_error() {
        let module = Module::compile(&simple_return_42());
        assert!(!module.has_error());
        assert_eq!(module.functions.len(), 1);
    }

    #[test]
    fn undeclared_symbol_is_an_error() {
        let program = Program {
            functions: vec![Function {
                return_type: Type::Int,
                name: id("main"),
                params: vec![],
                body: Block {
                    stmts: vec![Stmt::Return {
                        value: Some(Expr::Ident {
                            name: id("y"),
                            line: 3,
                        }),
                        line: 3,
                    }],
                },
                line: 1,
            }],
        };
        let module = Module::compile(&program);
        assert!(module.has_error());
        let msgs = module.diagnostics.diagnostics();
        assert!(msgs.iter().any(|d| d.to_string().contains("Symbol not found: y")));
    }
}
