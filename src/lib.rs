pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod instruction;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod symtab;
pub mod token;
pub mod vm;

pub use ast::Program;
pub use config::{CompileOptions, VmOptions};
pub use error::{Diagnostic, PlError, PlResult, Position, Severity};
pub use instruction::Code;
pub use parser::Parser;
pub use semantic::SemanticAnalyzer;
pub use vm::Machine;

/// Parse `source`, returning the AST alongside every diagnostic the parser
/// and lexer collected along the way. Syntax errors do not stop parsing —
/// panic-mode recovery keeps the parser producing a best-effort tree, so
/// callers must check `diagnostics` for `Severity::Error` before trusting
/// the result enough to generate code from it.
pub fn parse(source: &str) -> (Program, Vec<Diagnostic>) {
    Parser::new(source).parse()
}

/// Run the optional lint pass over an already-parsed program. Never
/// mutates the program and has no bearing on what `compile` emits.
pub fn lint(program: &Program) -> Vec<Diagnostic> {
    SemanticAnalyzer::new().analyze(program)
}

/// Lower a parsed program straight into P-code.
pub fn compile(program: &Program) -> PlResult<Code> {
    codegen::generate(program)
}

/// Like [`compile`], but with explicit `CompileOptions`.
pub fn compile_with_options(program: &Program, options: CompileOptions) -> PlResult<Code> {
    codegen::generate_with_options(program, options)
}

/// Parse and compile `source` in one step, failing on the first syntax or
/// semantic error encountered.
pub fn compile_source(source: &str) -> PlResult<Code> {
    let (program, diagnostics) = parse(source);
    if let Some(d) = diagnostics.iter().find(|d| d.severity == Severity::Error) {
        return Err(PlError::Syntax { pos: d.pos, message: d.message.clone() });
    }
    compile(&program)
}

/// Run already-generated code against stdin/stdout.
pub fn run(code: &Code) -> PlResult<()> {
    vm::run_stdio(code)
}

/// Like [`run`], but with explicit `VmOptions`.
pub fn run_with_options(code: &Code, options: VmOptions) -> PlResult<()> {
    vm::run_stdio_with_options(code, options)
}
