//! The parser: a straightforward recursive-descent parser for the
//! C-subset grammar producing the typed AST, per spec.md §6's described
//! construct list. See `lex.rs` for why this is hand-written rather than
//! ported from the original ANTLR grammar.

use std::fmt::Debug;

use derive_more::derive::Display;

use super::ast::*;
use super::lex::{Lexer, Token, TokenKind};
use super::symbol::Type;

#[derive(Display)]
#[display("Parse error: {}", self.0)]
pub struct ParseError(String);

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl From<super::lex::LexError> for ParseError {
    fn from(e: super::lex::LexError) -> Self {
        ParseError(e.to_string())
    }
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser::new(tokens).parse_program()
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn new(tokens: Vec<Token<'src>>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn line(&self) -> u32 {
        self.peek()
            .map(|t| t.line)
            .or_else(|| self.tokens.last().map(|t| t.line))
            .unwrap_or(1)
    }

    fn bump(&mut self) -> Option<Token<'src>> {
        let tok = self.tokens.get(self.pos).copied();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        match self.bump() {
            Some(tok) if tok.kind == kind => Ok(tok),
            Some(tok) => Err(ParseError(format!(
                "expected {kind} but found {} at line {}",
                tok.kind, tok.line
            ))),
            None => Err(ParseError(format!("expected {kind} but reached end of input"))),
        }
    }

    fn at_type_keyword(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Int | TokenKind::Char | TokenKind::Void))
    }

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        match self.bump() {
            Some(t) if t.kind == TokenKind::Int => Ok(Type::Int),
            Some(t) if t.kind == TokenKind::Char => Ok(Type::Char),
            Some(t) if t.kind == TokenKind::Void => Ok(Type::Void),
            Some(t) => Err(ParseError(format!("expected a type but found {} at line {}", t.kind, t.line))),
            None => Err(ParseError("expected a type but reached end of input".to_string())),
        }
    }

    fn parse_ident(&mut self) -> Result<(crate::common::Id, u32), ParseError> {
        let tok = self.expect(TokenKind::Ident)?;
        Ok((tok.text.to_string().into(), tok.line))
    }

    // -- top level --------------------------------------------------

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut functions = Vec::new();
        while self.peek().is_some() {
            functions.push(self.parse_function()?);
        }
        Ok(Program { functions })
    }

    fn parse_function(&mut self) -> Result<Function, ParseError> {
        let line = self.line();
        let return_type = self.parse_type()?;
        let (name, _) = self.parse_ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let p_line = self.line();
                let ty = self.parse_type()?;
                let (p_name, _) = self.parse_ident()?;
                params.push(Param { ty, name: p_name, line: p_line });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Function { return_type, name, params, body, line })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block { stmts })
    }

    // -- statements ---------------------------------------------------

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LBrace) => Ok(Stmt::Block(self.parse_block()?)),
            Some(TokenKind::If) => self.parse_if(),
            Some(TokenKind::While) => self.parse_while(),
            Some(TokenKind::Return) => self.parse_return(),
            _ if self.at_type_keyword() => self.parse_decl(),
            _ => self.parse_assign_or_call_stmt(),
        }
    }

    fn parse_decl(&mut self) -> Result<Stmt, ParseError> {
        let ty = self.parse_type()?;
        let mut declarators = Vec::new();
        loop {
            let (name, line) = self.parse_ident()?;
            let init = if self.eat(TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            declarators.push(Declarator { name, init, line });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::Decl { ty, declarators })
    }

    /// An identifier-led statement is either an assignment (`x = e;`) or a
    /// bare call statement (`f(e, ...);`); spec.md §6 lists "expression-
    /// statement call" as the only expression-statement production.
    fn parse_assign_or_call_stmt(&mut self) -> Result<Stmt, ParseError> {
        let (name, line) = self.parse_ident()?;
        if self.at(TokenKind::LParen) {
            let args = self.parse_call_args()?;
            self.expect(TokenKind::Semi)?;
            return Ok(Stmt::ExprStmt(Expr::Call { callee: name, args, line }));
        }
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expr()?;
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::Assign { name, value, line })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = self.parse_block_or_single_stmt()?;
        let else_branch = if self.eat(TokenKind::Else) {
            Some(self.parse_block_or_single_stmt()?)
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block_or_single_stmt()?;
        Ok(Stmt::While { cond, body })
    }

    /// `if`/`while` bodies accept either a `{ ... }` block or a single
    /// bare statement, wrapped into a one-statement `Block` either way so
    /// lowering always sees a scope to push/pop.
    fn parse_block_or_single_stmt(&mut self) -> Result<Block, ParseError> {
        if self.at(TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(Block { stmts: vec![self.parse_stmt()?] })
        }
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let line = self.expect(TokenKind::Return)?.line;
        let value = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::Return { value, line })
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    // -- expressions, by precedence (C operator precedence, loosest last
    //    in the chain below: bitwise OR binds loosest, unary tightest) --

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_bitor()
    }

    fn parse_bitor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_chain(Self::parse_bitxor, &[(TokenKind::Pipe, BinOp::BOr)])
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_chain(Self::parse_bitand, &[(TokenKind::Caret, BinOp::BXor)])
    }

    fn parse_bitand(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_chain(Self::parse_equality, &[(TokenKind::Amp, BinOp::BAnd)])
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_chain(
            Self::parse_relational,
            &[(TokenKind::EqEq, BinOp::Eq), (TokenKind::Neq, BinOp::Neq)],
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_chain(
            Self::parse_additive,
            &[
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Leq, BinOp::Leq),
                (TokenKind::Gt, BinOp::Gt),
                (TokenKind::Geq, BinOp::Geq),
            ],
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_chain(
            Self::parse_multiplicative,
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_chain(
            Self::parse_unary,
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Mod),
            ],
        )
    }

    /// Left-associative binary chain: parse one operand with `next`, then
    /// repeatedly consume a matching operator and another operand.
    fn parse_binop_chain(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
        ops: &[(TokenKind, BinOp)],
    ) -> Result<Expr, ParseError> {
        let mut lhs = next(self)?;
        loop {
            let Some(kind) = self.peek_kind() else { break };
            let Some(&(_, op)) = ops.iter().find(|(k, _)| *k == kind) else { break };
            let line = self.bump().unwrap().line;
            let rhs = next(self)?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => Some(UnOp::Plus),
            Some(TokenKind::Minus) => Some(UnOp::Neg),
            Some(TokenKind::Tilde) => Some(UnOp::Not),
            Some(TokenKind::Bang) => Some(UnOp::LNot),
            Some(TokenKind::PlusPlus) => Some(UnOp::Inc),
            Some(TokenKind::MinusMinus) => Some(UnOp::Dec),
            _ => None,
        };
        match op {
            Some(op) => {
                let line = self.bump().unwrap().line;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary { op, operand: Box::new(operand), line })
            }
            None => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let Some(tok) = self.peek().copied() else {
            return Err(ParseError("expected an expression but reached end of input".to_string()));
        };
        match tok.kind {
            TokenKind::IntLit => {
                self.bump();
                let value: i64 = tok
                    .text
                    .parse()
                    .map_err(|_| ParseError(format!("invalid integer literal '{}' at line {}", tok.text, tok.line)))?;
                Ok(Expr::IntLit { value, line: tok.line })
            }
            TokenKind::CharLit => {
                self.bump();
                let value = parse_char_literal(tok.text)
                    .ok_or_else(|| ParseError(format!("invalid character literal {} at line {}", tok.text, tok.line)))?;
                Ok(Expr::CharLit { value, line: tok.line })
            }
            TokenKind::Ident => {
                let (name, line) = self.parse_ident()?;
                if self.at(TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    Ok(Expr::Call { callee: name, args, line })
                } else {
                    Ok(Expr::Ident { name, line })
                }
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            _ => Err(ParseError(format!("expected an expression but found {} at line {}", tok.kind, tok.line))),
        }
    }
}

/// Unescape a lexed character-literal token's raw text (including its
/// surrounding quotes), e.g. `'A'` -> `A`, `'\n'` -> newline.
fn parse_char_literal(text: &str) -> Option<char> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = inner.chars();
    let c = chars.next()?;
    if c != '\\' {
        return if chars.next().is_none() { Some(c) } else { None };
    }
    let escaped = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some(match escaped {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_return_constant() {
        let program = parse("int main() { return 42; }").unwrap();
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name.as_str(), "main");
    }

    #[test]
    fn parses_declaration_with_multiple_initializers() {
        let program = parse("int main() { int a = 3, b = 4; return a * b + 1; }").unwrap();
        let stmts = &program.functions[0].body.stmts;
        assert!(matches!(&stmts[0], Stmt::Decl { declarators, .. } if declarators.len() == 2));
    }

    #[test]
    fn parses_if_else() {
        let program = parse("int main() { int a = 5; if (a > 3) a = 1; else a = 2; return a; }").unwrap();
        let stmts = &program.functions[0].body.stmts;
        assert!(matches!(&stmts[1], Stmt::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn parses_while_loop() {
        let program = parse("int main() { int i = 0; while (i < 10) { i = i + 1; } return i; }").unwrap();
        let stmts = &program.functions[0].body.stmts;
        assert!(matches!(&stmts[1], Stmt::While { .. }));
    }

    #[test]
    fn parses_call_with_seven_arguments() {
        let program = parse(
            "int f(int a, int b, int c, int d, int e, int g, int h) { return a; } \
             int main() { return f(1,2,3,4,5,6,7); }",
        )
        .unwrap();
        assert_eq!(program.functions[0].params.len(), 7);
    }

    #[test]
    fn char_literal_becomes_code_point() {
        let program = parse("int main() { return 'A'; }").unwrap();
        let stmts = &program.functions[0].body.stmts;
        match &stmts[0] {
            Stmt::Return { value: Some(Expr::CharLit { value, .. }), .. } => assert_eq!(*value, 'A'),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn bitwise_or_binds_looser_than_equality() {
        // `a | b == c` should parse as `a | (b == c)`.
        let program = parse("int main() { return a | b == c; }").unwrap();
        match &program.functions[0].body.stmts[0] {
            Stmt::Return { value: Some(Expr::Binary { op: BinOp::BOr, rhs, .. }), .. } => {
                assert!(matches!(**rhs, Expr::Binary { op: BinOp::Eq, .. }));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn missing_semicolon_is_a_parse_error() {
        assert!(parse("int main() { return 1 }").is_err());
    }
}
