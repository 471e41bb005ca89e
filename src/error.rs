//! Error types for every phase of the compiler and VM.
//!
//! Covers four categories: lexical, syntax, static semantic, and runtime.
//! Each carries enough context to reproduce the diagnostics the reference
//! implementation printed to the console.

use std::fmt;

use crate::instruction::Instruction;

/// A source position: 1-based line and column, matching the lexer's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Severity of a non-fatal diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A diagnostic produced by the lexer, parser, generator, or semantic pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub pos: Position,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(pos: Position, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, pos, message: message.into() }
    }

    pub fn error(pos: Position, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Error, pos, message: message.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{} at {}: {}", tag, self.pos, self.message)
    }
}

/// The top-level error type for the whole pipeline.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum PlError {
    #[error("lexical error at {pos}: {message}")]
    Lexical { pos: Position, message: String },

    #[error("syntax error at {pos}: {message}")]
    Syntax { pos: Position, message: String },

    #[error("semantic error at {pos}: {message}")]
    Semantic { pos: Position, message: String },

    #[error("runtime error at p={pc} ({instruction:?}): {message}")]
    Runtime { pc: usize, instruction: Instruction, message: String },
}

pub type PlResult<T> = Result<T, PlError>;
