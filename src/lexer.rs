//! Lexer for PL/0 source text.
//!
//! The parser only depends on a token interface (one-token lookahead plus
//! `peek_token_type`); this is a minimal concrete implementation of that
//! interface so the crate is runnable end to end.

use crate::error::{Diagnostic, Position};
use crate::token::{Token, TokenKind};

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    _source: &'a str,
    pub diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer { chars: source.chars().collect(), pos: 0, line: 1, column: 0, _source: source, diagnostics: Vec::new() }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        if self.current() == Some('\n') {
            self.line += 1;
            self.column = 0;
        }
        self.pos += 1;
        if self.pos < self.chars.len() {
            self.column += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn make_identifier(&mut self) -> Token {
        let start_col = self.column;
        let start = self.pos;
        while matches!(self.current(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = TokenKind::keyword(&text.to_lowercase()).unwrap_or(TokenKind::Identifier);
        Token::new(kind, text, Position::new(self.line, start_col))
    }

    fn make_integer(&mut self) -> Token {
        let start_col = self.column;
        let start = self.pos;
        while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Token::new(TokenKind::Integer, text, Position::new(self.line, start_col))
    }

    /// Produce the next token, recording a diagnostic for illegal input but
    /// never failing — an ILLEGAL token is returned instead.
    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            let Some(c) = self.current() else {
                return Token::new(TokenKind::Eof, "", Position::new(self.line, self.column));
            };
            let start_col = self.column;
            let pos = Position::new(self.line, start_col);

            if c.is_alphabetic() || c == '_' {
                return self.make_identifier();
            }
            if c.is_ascii_digit() {
                return self.make_integer();
            }

            match c {
                ':' => {
                    if self.peek_char() == Some('=') {
                        self.advance();
                        self.advance();
                        return Token::new(TokenKind::Assign, ":=", pos);
                    }
                    self.diagnostics.push(Diagnostic::error(
                        pos,
                        "lone ':' — did you mean the assignment operator ':='?",
                    ));
                    self.advance();
                    return Token::new(TokenKind::Illegal, ":", pos);
                }
                '<' => {
                    self.advance();
                    match self.current() {
                        Some('>') => {
                            self.advance();
                            return Token::new(TokenKind::NotEqual, "<>", pos);
                        }
                        Some('=') => {
                            self.advance();
                            return Token::new(TokenKind::LessEqual, "<=", pos);
                        }
                        _ => return Token::new(TokenKind::Less, "<", pos),
                    }
                }
                '>' => {
                    self.advance();
                    if self.current() == Some('=') {
                        self.advance();
                        return Token::new(TokenKind::GreaterEqual, ">=", pos);
                    }
                    return Token::new(TokenKind::Greater, ">", pos);
                }
                '+' => { self.advance(); return Token::new(TokenKind::Plus, "+", pos); }
                '-' => { self.advance(); return Token::new(TokenKind::Minus, "-", pos); }
                '*' => { self.advance(); return Token::new(TokenKind::Times, "*", pos); }
                '/' => { self.advance(); return Token::new(TokenKind::Slash, "/", pos); }
                '(' => { self.advance(); return Token::new(TokenKind::LParen, "(", pos); }
                ')' => { self.advance(); return Token::new(TokenKind::RParen, ")", pos); }
                ',' => { self.advance(); return Token::new(TokenKind::Comma, ",", pos); }
                ';' => { self.advance(); return Token::new(TokenKind::Semicolon, ";", pos); }
                '=' => { self.advance(); return Token::new(TokenKind::Equal, "=", pos); }
                other => {
                    self.diagnostics.push(Diagnostic::error(pos, format!("illegal character '{other}'")));
                    self.advance();
                    return Token::new(TokenKind::Illegal, other.to_string(), pos);
                }
            }
        }
    }
}

/// A lazy token source with one-token lookahead and a `peek_token_type`
/// oracle the parser's procedure-chain logic needs.
pub struct TokenStream<'a> {
    lexer: Lexer<'a>,
    lookahead: Token,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let lookahead = lexer.next_token();
        TokenStream { lexer, lookahead }
    }

    pub fn current(&self) -> &Token {
        &self.lookahead
    }

    pub fn advance(&mut self) -> Token {
        std::mem::replace(&mut self.lookahead, self.lexer.next_token())
    }

    /// Peek the type of the token after the current one, without consuming it.
    pub fn peek_token_type(&mut self) -> TokenKind {
        // Lexing is side-effect-free aside from `self.lexer`'s internal
        // cursor, so we can snapshot and restore it around a speculative read.
        let saved_pos = self.lexer.pos;
        let saved_line = self.lexer.line;
        let saved_col = self.lexer.column;
        let saved_diag_len = self.lexer.diagnostics.len();

        let next = self.lexer.next_token();

        self.lexer.pos = saved_pos;
        self.lexer.line = saved_line;
        self.lexer.column = saved_col;
        self.lexer.diagnostics.truncate(saved_diag_len);

        next.kind
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.lexer.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_keywords_and_identifiers() {
        let mut s = TokenStream::new("program Foo; var x;");
        let mut kinds = Vec::new();
        loop {
            let t = s.advance();
            let done = t.kind == TokenKind::Eof;
            kinds.push(t.kind);
            if done { break; }
        }
        assert_eq!(
            kinds,
            vec![
                TokenKind::Program,
                TokenKind::Identifier,
                TokenKind::Semicolon,
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let mut s = TokenStream::new("BEGIN End");
        assert_eq!(s.advance().kind, TokenKind::Begin);
        assert_eq!(s.advance().kind, TokenKind::End);
    }

    #[test]
    fn lone_colon_is_illegal_with_diagnostic() {
        let mut s = TokenStream::new("x : = 1");
        s.advance(); // x
        let colon = s.advance();
        assert_eq!(colon.kind, TokenKind::Illegal);
        assert_eq!(s.diagnostics().len(), 1);
    }

    #[test]
    fn peek_token_type_does_not_consume() {
        let mut s = TokenStream::new("a ; procedure");
        s.advance(); // a
        assert_eq!(s.current().kind, TokenKind::Semicolon);
        assert_eq!(s.peek_token_type(), TokenKind::Procedure);
        assert_eq!(s.current().kind, TokenKind::Semicolon);
    }

    #[test]
    fn relational_operators() {
        let mut s = TokenStream::new("<> <= >= < >");
        assert_eq!(s.advance().kind, TokenKind::NotEqual);
        assert_eq!(s.advance().kind, TokenKind::LessEqual);
        assert_eq!(s.advance().kind, TokenKind::GreaterEqual);
        assert_eq!(s.advance().kind, TokenKind::Less);
        assert_eq!(s.advance().kind, TokenKind::Greater);
    }
}
