//! Recursive-descent parser with panic-mode error recovery.
//!
//! Declarations inside a `block` may appear in any order (a diagnostic is
//! emitted, not a hard failure, when order is violated); `call`/`procedure`
//! parameter lists require parentheses even when empty; a const declaration
//! accepts either `:=` or `=` (the latter with a diagnostic).

use log::trace;

use crate::ast::*;
use crate::error::{Diagnostic, Position};
use crate::lexer::TokenStream;
use crate::token::{Token, TokenKind};

/// Marks that a parse error was already recorded as a diagnostic and the
/// caller should run panic-mode recovery. Carries no data of its own —
/// analogous to the reference implementation's internal `ParserError`.
struct ParseFailure;

type PResult<T> = Result<T, ParseFailure>;

const SYNC_SET: &[TokenKind] = &[
    TokenKind::End,
    TokenKind::If,
    TokenKind::While,
    TokenKind::Read,
    TokenKind::Write,
    TokenKind::Begin,
    TokenKind::Var,
    TokenKind::Const,
    TokenKind::Procedure,
    TokenKind::Eof,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclKind {
    Const,
    Var,
    Proc,
}

pub struct Parser<'a> {
    tokens: TokenStream<'a>,
    current: Token,
    diagnostics: Vec<Diagnostic>,
    indent: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut tokens = TokenStream::new(source);
        let current = tokens.advance();
        Parser { tokens, current, diagnostics: Vec::new(), indent: 0 }
    }

    fn enter(&mut self, tag: &str) {
        trace!("{}<{}>", "  ".repeat(self.indent), tag);
        self.indent += 1;
    }

    fn leave(&mut self, tag: &str) {
        self.indent -= 1;
        trace!("{}</{}>", "  ".repeat(self.indent), tag);
    }

    fn pos(&self) -> Position {
        self.current.pos
    }

    fn error(&mut self, message: impl Into<String>) -> ParseFailure {
        self.diagnostics.push(Diagnostic::error(self.pos(), message));
        ParseFailure
    }

    fn advance(&mut self) -> Token {
        let next = self.tokens.advance();
        std::mem::replace(&mut self.current, next)
    }

    fn eat(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.current.kind == kind {
            Ok(self.advance())
        } else {
            let found = self.current.clone();
            Err(self.error(format!("expected {}, found {} ('{}')", kind, found.kind, found.lexeme)))
        }
    }

    /// Panic-mode recovery: advance one token, then advance until a `;`
    /// (consumed) or a synchronisation-point token (left on the input).
    fn synchronize(&mut self) {
        if self.current.kind == TokenKind::Eof {
            return;
        }
        self.advance();
        while self.current.kind != TokenKind::Eof {
            if self.current.kind == TokenKind::Semicolon {
                self.advance();
                return;
            }
            if SYNC_SET.contains(&self.current.kind) {
                return;
            }
            self.advance();
        }
    }

    pub fn parse(mut self) -> (Program, Vec<Diagnostic>) {
        let program = self.parse_program();
        self.diagnostics.extend(self.tokens.diagnostics().iter().cloned());
        (program, self.diagnostics)
    }

    fn parse_program(&mut self) -> Program {
        self.enter("Program");
        let mut name = "unknown".to_string();

        let header = (|| -> PResult<()> {
            self.eat(TokenKind::Program)?;
            if self.current.kind == TokenKind::Identifier {
                name = self.current.lexeme.clone();
            }
            self.eat(TokenKind::Identifier)?;
            self.eat(TokenKind::Semicolon)?;
            Ok(())
        })();
        if header.is_err() {
            self.synchronize();
        }

        let block = self.parse_block();
        self.leave("Program");
        Program { name, block }
    }

    fn parse_block(&mut self) -> Block {
        self.enter("Block");
        let mut consts = Vec::new();
        let mut vars = Vec::new();
        let mut procs = Vec::new();
        let mut last_kind: Option<DeclKind> = None;

        loop {
            match self.current.kind {
                TokenKind::Const => {
                    if matches!(last_kind, Some(DeclKind::Var) | Some(DeclKind::Proc)) {
                        self.diagnostics.push(Diagnostic::warning(
                            self.pos(),
                            "const declaration after var/procedure — PL/0 conventionally declares const first",
                        ));
                    }
                    if self.parse_const_decl(&mut consts).is_err() {
                        self.synchronize();
                    }
                    last_kind = Some(DeclKind::Const);
                }
                TokenKind::Var => {
                    if last_kind == Some(DeclKind::Proc) {
                        self.diagnostics.push(Diagnostic::warning(
                            self.pos(),
                            "var declaration after procedure — PL/0 conventionally declares var before procedures",
                        ));
                    }
                    if self.parse_var_decl(&mut vars).is_err() {
                        self.synchronize();
                    }
                    last_kind = Some(DeclKind::Var);
                }
                TokenKind::Procedure => {
                    if self.parse_proc_chain(&mut procs).is_err() {
                        self.synchronize();
                    }
                    last_kind = Some(DeclKind::Proc);
                }
                _ => break,
            }
        }

        // A procedure chain that ends without another `procedure` leaves its
        // trailing ';' on the input (see `parse_proc_chain`) rather than
        // guess whether it terminates the chain or separates it from the
        // body; that guess belongs here, where the body is actually next.
        if self.current.kind == TokenKind::Semicolon {
            self.advance();
        }

        let body = match self.parse_body() {
            Ok(b) => b,
            Err(_) => {
                self.synchronize();
                Stmt::NoOp
            }
        };

        self.leave("Block");
        Block { consts, vars, procs, body }
    }

    fn parse_const_decl(&mut self, out: &mut Vec<ConstDecl>) -> PResult<()> {
        self.enter("ConstDecl");
        self.eat(TokenKind::Const)?;
        loop {
            let name_tok = self.eat(TokenKind::Identifier)?;
            if self.current.kind == TokenKind::Assign {
                self.advance();
            } else {
                // Tolerate '=' where ':=' was intended.
                self.diagnostics.push(Diagnostic::warning(self.pos(), "use ':=' not '=' in a const declaration"));
                self.eat(TokenKind::Equal)?;
            }
            let val_tok = self.eat(TokenKind::Integer)?;
            out.push(ConstDecl { name: name_tok.lexeme.clone(), value: val_tok.int_value(), pos: name_tok.pos });

            if self.current.kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(TokenKind::Semicolon)?;
        self.leave("ConstDecl");
        Ok(())
    }

    fn parse_var_decl(&mut self, out: &mut Vec<VarDecl>) -> PResult<()> {
        self.enter("VarDecl");
        self.eat(TokenKind::Var)?;
        loop {
            let tok = self.eat(TokenKind::Identifier)?;
            out.push(VarDecl { name: tok.lexeme.clone(), pos: tok.pos });
            if self.current.kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(TokenKind::Semicolon)?;
        self.leave("VarDecl");
        Ok(())
    }

    /// `<proc> := procedure <id> ( [ <id> { , <id> } ] ) ; <block> { ; <proc> }`
    fn parse_proc_chain(&mut self, out: &mut Vec<ProcedureDecl>) -> PResult<()> {
        loop {
            self.enter("Procedure");
            let mut name = None;
            let mut params = Vec::new();
            let mut pos = self.pos();

            let header = (|| -> PResult<()> {
                let tok = self.eat(TokenKind::Procedure)?;
                pos = tok.pos;
                name = Some(self.eat(TokenKind::Identifier)?.lexeme);
                self.eat(TokenKind::LParen)?;
                if self.current.kind == TokenKind::Identifier {
                    params.push(self.advance().lexeme);
                    while self.current.kind == TokenKind::Comma {
                        self.advance();
                        params.push(self.eat(TokenKind::Identifier)?.lexeme);
                    }
                }
                self.eat(TokenKind::RParen)?;
                self.eat(TokenKind::Semicolon)?;
                Ok(())
            })();
            if header.is_err() {
                self.synchronize();
            }

            let block = self.parse_block();

            self.leave("Procedure");
            if let Some(name) = name {
                out.push(ProcedureDecl { name, params, block, pos });
            }

            // `{; <proc>}` — only continue the chain if the token after the
            // next `;` is another `procedure`; otherwise leave the `;` for
            // the enclosing block's body to consume as a separator.
            if self.current.kind == TokenKind::Semicolon {
                if self.tokens.peek_token_type() == TokenKind::Procedure {
                    self.advance();
                    continue;
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn parse_body(&mut self) -> PResult<Stmt> {
        self.enter("Body");
        self.eat(TokenKind::Begin)?;
        let mut children = vec![self.safe_statement()];
        // A statement that failed and recovered may already have consumed
        // its separating ';' inside `synchronize`, so the next statement
        // isn't gated on seeing one explicitly — only skip a ';' that is
        // still sitting on the input.
        while self.current.kind != TokenKind::End && self.current.kind != TokenKind::Eof {
            if self.current.kind == TokenKind::Semicolon {
                self.advance();
            }
            children.push(self.safe_statement());
        }
        self.eat(TokenKind::End)?;
        self.leave("Body");
        Ok(Stmt::Compound { children })
    }

    fn safe_statement(&mut self) -> Stmt {
        match self.parse_statement() {
            Ok(s) => s,
            Err(_) => {
                self.synchronize();
                Stmt::NoOp
            }
        }
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        self.enter("Statement");
        let node = match self.current.kind {
            TokenKind::Identifier => {
                let tok = self.advance();
                self.eat(TokenKind::Assign)?;
                let expr = self.parse_exp()?;
                Stmt::Assign { target: VarRef { name: tok.lexeme, pos: tok.pos }, expr }
            }
            TokenKind::If => {
                self.advance();
                let cond = self.parse_lexp()?;
                self.eat(TokenKind::Then)?;
                let then_branch = Box::new(self.parse_statement()?);
                let else_branch = if self.current.kind == TokenKind::Else {
                    self.advance();
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                Stmt::If { cond, then_branch, else_branch }
            }
            TokenKind::While => {
                self.advance();
                let cond = self.parse_lexp()?;
                self.eat(TokenKind::Do)?;
                let body = Box::new(self.parse_statement()?);
                Stmt::While { cond, body }
            }
            TokenKind::Call => {
                self.advance();
                let name_tok = self.eat(TokenKind::Identifier)?;
                self.eat(TokenKind::LParen)?;
                let mut args = Vec::new();
                if Self::starts_expr(self.current.kind) {
                    args.push(self.parse_exp()?);
                    while self.current.kind == TokenKind::Comma {
                        self.advance();
                        args.push(self.parse_exp()?);
                    }
                }
                self.eat(TokenKind::RParen)?;
                Stmt::Call { name: name_tok.lexeme, args, pos: name_tok.pos }
            }
            TokenKind::Read => {
                self.advance();
                self.eat(TokenKind::LParen)?;
                let mut vars = Vec::new();
                if self.current.kind == TokenKind::Identifier {
                    let tok = self.advance();
                    vars.push(VarRef { name: tok.lexeme, pos: tok.pos });
                    while self.current.kind == TokenKind::Comma {
                        self.advance();
                        let tok = self.eat(TokenKind::Identifier)?;
                        vars.push(VarRef { name: tok.lexeme, pos: tok.pos });
                    }
                }
                self.eat(TokenKind::RParen)?;
                Stmt::Read { vars }
            }
            TokenKind::Write => {
                self.advance();
                self.eat(TokenKind::LParen)?;
                let mut exprs = vec![self.parse_exp()?];
                while self.current.kind == TokenKind::Comma {
                    self.advance();
                    exprs.push(self.parse_exp()?);
                }
                self.eat(TokenKind::RParen)?;
                Stmt::Write { exprs }
            }
            TokenKind::Begin => {
                self.indent -= 1;
                let body = self.parse_body()?;
                self.indent += 1;
                body
            }
            TokenKind::End | TokenKind::Semicolon => Stmt::NoOp,
            other => {
                return Err(self.error(format!("illegal start of statement: {other} ('{}')", self.current.lexeme)));
            }
        };
        self.leave("Statement");
        Ok(node)
    }

    fn starts_expr(kind: TokenKind) -> bool {
        matches!(kind, TokenKind::Plus | TokenKind::Minus | TokenKind::Identifier | TokenKind::Integer | TokenKind::LParen)
    }

    fn parse_lexp(&mut self) -> PResult<Expr> {
        self.enter("Condition");
        let node = if self.current.kind == TokenKind::Odd {
            let pos = self.pos();
            self.advance();
            let expr = self.parse_exp()?;
            Expr::UnaryOp { op: UnaryOpKind::Odd, expr: Box::new(expr), pos }
        } else {
            let left = self.parse_exp()?;
            let (op, pos) = match self.current.kind {
                TokenKind::Equal => (BinOpKind::Eq, self.pos()),
                TokenKind::NotEqual => (BinOpKind::Neq, self.pos()),
                TokenKind::Less => (BinOpKind::Lss, self.pos()),
                TokenKind::LessEqual => (BinOpKind::Leq, self.pos()),
                TokenKind::Greater => (BinOpKind::Gtr, self.pos()),
                TokenKind::GreaterEqual => (BinOpKind::Geq, self.pos()),
                _ => return Err(self.error("condition is missing a relational operator")),
            };
            self.advance();
            let right = self.parse_exp()?;
            Expr::BinOp { left: Box::new(left), op, right: Box::new(right), pos }
        };
        self.leave("Condition");
        Ok(node)
    }

    fn parse_exp(&mut self) -> PResult<Expr> {
        self.enter("Expression");
        let mut node = if matches!(self.current.kind, TokenKind::Plus | TokenKind::Minus) {
            let pos = self.pos();
            let negate = self.current.kind == TokenKind::Minus;
            self.advance();
            let term = self.parse_term()?;
            if negate {
                Expr::UnaryOp { op: UnaryOpKind::Neg, expr: Box::new(term), pos }
            } else {
                term
            }
        } else {
            self.parse_term()?
        };

        while matches!(self.current.kind, TokenKind::Plus | TokenKind::Minus) {
            let pos = self.pos();
            let op = if self.current.kind == TokenKind::Plus { BinOpKind::Add } else { BinOpKind::Sub };
            self.advance();
            let right = self.parse_term()?;
            node = Expr::BinOp { left: Box::new(node), op, right: Box::new(right), pos };
        }
        self.leave("Expression");
        Ok(node)
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        self.enter("Term");
        let mut node = self.parse_factor()?;
        while matches!(self.current.kind, TokenKind::Times | TokenKind::Slash) {
            let pos = self.pos();
            let op = if self.current.kind == TokenKind::Times { BinOpKind::Mul } else { BinOpKind::Div };
            self.advance();
            let right = self.parse_factor()?;
            node = Expr::BinOp { left: Box::new(node), op, right: Box::new(right), pos };
        }
        self.leave("Term");
        Ok(node)
    }

    fn parse_factor(&mut self) -> PResult<Expr> {
        self.enter("Factor");
        let node = match self.current.kind {
            TokenKind::Identifier => {
                let tok = self.advance();
                Expr::Var { name: tok.lexeme, pos: tok.pos }
            }
            TokenKind::Integer => {
                let tok = self.advance();
                Expr::Num { value: tok.int_value(), pos: tok.pos }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_exp()?;
                self.eat(TokenKind::RParen)?;
                inner
            }
            _ => return Err(self.error("expected an identifier, integer, or '(' in an expression")),
        };
        self.leave("Factor");
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;

    fn has_errors(diags: &[Diagnostic]) -> bool {
        diags.iter().any(|d| d.severity == Severity::Error)
    }

    #[test]
    fn parses_minimal_program() {
        let (prog, diags) = Parser::new("program p; var x; begin x := 1 end").parse();
        assert!(!has_errors(&diags));
        assert_eq!(prog.name, "p");
        assert_eq!(prog.block.vars.len(), 1);
    }

    #[test]
    fn out_of_order_declarations_are_accepted_with_warning() {
        let src = "program p; var x; const c := 1; begin x := c end";
        let (prog, diags) = Parser::new(src).parse();
        assert_eq!(prog.block.consts.len(), 1);
        assert_eq!(prog.block.vars.len(), 1);
        assert!(diags.iter().any(|d| d.severity == Severity::Warning));
    }

    #[test]
    fn const_accepts_equal_sign_with_warning() {
        let (prog, diags) = Parser::new("program p; const c = 5; begin write(c) end").parse();
        assert_eq!(prog.block.consts[0].value, 5);
        assert!(diags.iter().any(|d| d.message.contains(":=")));
    }

    #[test]
    fn call_requires_parentheses() {
        let (_prog, diags) = Parser::new("program p; procedure q(); begin end; begin call q end").parse();
        assert!(has_errors(&diags));
    }

    #[test]
    fn recovers_after_syntax_error_and_keeps_parsing() {
        let src = "program p; var x; begin x := ; write(1) end";
        let (prog, diags) = Parser::new(src).parse();
        assert!(has_errors(&diags));
        // The second statement after the synchronising ';' still parses.
        if let Stmt::Compound { children } = &prog.block.body {
            assert_eq!(children.len(), 2);
        } else {
            panic!("expected compound body");
        }
    }

    #[test]
    fn procedure_chain_and_nested_procedures() {
        let src = "program p; var r; procedure a(); begin end; procedure b(); begin end; begin call a(); call b() end";
        let (prog, diags) = Parser::new(src).parse();
        assert!(!has_errors(&diags));
        assert_eq!(prog.block.procs.len(), 2);
    }
}
