//! Single-pass backpatching code generator.
//!
//! Lowers the AST straight into a flat `Code` vector. Forward jumps are
//! emitted with a placeholder target and patched once the real address is
//! known; procedure entry addresses are patched into their symbol as soon
//! as the first instruction of their body is emitted.

use log::trace;

use crate::ast::*;
use crate::config::CompileOptions;
use crate::error::{PlError, PlResult, Position};
use crate::instruction::{Code, OpCode, OprCode};
use crate::symtab::{SymbolKind, SymbolTable};

/// First local slot available for procedure arguments handed off to a
/// callee's frame, one past SL/DL/RA.
const ARG_BASE_ADDR: i64 = 3;

pub struct CodeGenerator {
    code: Code,
    symbols: SymbolTable,
    options: CompileOptions,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::with_options(CompileOptions::default())
    }

    pub fn with_options(options: CompileOptions) -> Self {
        CodeGenerator { code: Code::new(), symbols: SymbolTable::new(), options }
    }

    pub fn generate(mut self, program: &Program) -> PlResult<Code> {
        self.symbols.enter_scope();
        self.gen_block(&program.block)?;
        self.symbols.exit_scope();
        Ok(self.code)
    }

    fn gen_block(&mut self, block: &Block) -> PlResult<()> {
        let jmp_idx = self.code.emit(OpCode::Jmp, 0, 0);

        for c in &block.consts {
            self.symbols.define_const(&c.name, c.value).map_err(|m| self.semantic(c.pos, m))?;
        }
        for v in &block.vars {
            self.symbols.define_var(&v.name).map_err(|m| self.semantic(v.pos, m))?;
        }
        for p in &block.procs {
            self.symbols.define_proc(&p.name, p.params.len()).map_err(|m| self.semantic(p.pos, m))?;
            let entry = self.code.len() as i64;
            self.symbols.set_proc_addr(&p.name, entry);
            self.gen_procedure(p)?;
        }

        let body_start = self.code.len() as i64;
        self.code.patch(jmp_idx, body_start);

        let frame_size = self.symbols.frame_size();
        self.code.emit(OpCode::Int, 0, frame_size);
        self.gen_stmt(&block.body)?;
        self.code.emit(OpCode::Opr, 0, OprCode::Ret as i64);
        Ok(())
    }

    fn gen_procedure(&mut self, proc: &ProcedureDecl) -> PlResult<()> {
        trace!("procedure {} at {}", proc.name, self.code.len());
        self.symbols.enter_scope();
        for param in &proc.params {
            self.symbols.define_var(param).map_err(|m| self.semantic(proc.pos, m))?;
        }
        self.gen_block(&proc.block)?;
        self.symbols.exit_scope();
        Ok(())
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> PlResult<()> {
        match stmt {
            Stmt::NoOp => {}
            Stmt::Compound { children } => {
                for child in children {
                    self.gen_stmt(child)?;
                }
            }
            Stmt::Assign { target, expr } => {
                self.gen_expr(expr)?;
                let (sym, level_diff) = self.lookup(&target.name, target.pos)?;
                if sym.kind != SymbolKind::Var {
                    return Err(self.semantic(target.pos, format!("cannot assign to '{}': not a variable", target.name)));
                }
                self.symbols.mark_initialized(&target.name);
                self.code.emit(OpCode::Sto, level_diff as i64, sym.addr);
            }
            Stmt::If { cond, then_branch, else_branch } => {
                self.gen_expr(cond)?;
                let jpc_idx = self.code.emit(OpCode::Jpc, 0, 0);
                self.gen_stmt(then_branch)?;
                match else_branch {
                    Some(else_stmt) => {
                        let jmp_idx = self.code.emit(OpCode::Jmp, 0, 0);
                        self.code.patch(jpc_idx, self.code.len() as i64);
                        self.gen_stmt(else_stmt)?;
                        self.code.patch(jmp_idx, self.code.len() as i64);
                    }
                    None => self.code.patch(jpc_idx, self.code.len() as i64),
                }
            }
            Stmt::While { cond, body } => {
                let start = self.code.len() as i64;
                self.gen_expr(cond)?;
                let jpc_idx = self.code.emit(OpCode::Jpc, 0, 0);
                self.gen_stmt(body)?;
                self.code.emit(OpCode::Jmp, 0, start);
                self.code.patch(jpc_idx, self.code.len() as i64);
            }
            Stmt::Call { name, args, pos } => {
                let (sym, level_diff) = self.lookup(name, *pos)?;
                if sym.kind != SymbolKind::Proc {
                    return Err(self.semantic(*pos, format!("cannot call '{name}': not a procedure")));
                }
                if sym.param_count != args.len() {
                    return Err(self.semantic(
                        *pos,
                        format!("'{name}' expects {} argument(s), found {}", sym.param_count, args.len()),
                    ));
                }
                for (i, arg) in args.iter().enumerate() {
                    self.gen_expr(arg)?;
                    self.code.emit(OpCode::Sto, -1, ARG_BASE_ADDR + i as i64);
                }
                self.code.emit(OpCode::Cal, level_diff as i64, sym.addr);
            }
            Stmt::Read { vars } => {
                for v in vars {
                    self.code.emit(OpCode::Red, 0, 0);
                    let (sym, level_diff) = self.lookup(&v.name, v.pos)?;
                    if sym.kind != SymbolKind::Var {
                        return Err(self.semantic(v.pos, format!("cannot read into '{}': not a variable", v.name)));
                    }
                    self.symbols.mark_initialized(&v.name);
                    self.code.emit(OpCode::Sto, level_diff as i64, sym.addr);
                }
            }
            Stmt::Write { exprs } => {
                for e in exprs {
                    self.gen_expr(e)?;
                    self.code.emit(OpCode::Wrt, 0, 0);
                }
                self.code.emit(OpCode::Opr, 0, OprCode::Line as i64);
            }
        }
        Ok(())
    }

    fn gen_expr(&mut self, expr: &Expr) -> PlResult<()> {
        match expr {
            Expr::Num { value, .. } => {
                self.code.emit(OpCode::Lit, 0, *value);
            }
            Expr::Var { name, pos } => {
                let (sym, level_diff) = self.lookup(name, *pos)?;
                match sym.kind {
                    SymbolKind::Const => {
                        self.code.emit(OpCode::Lit, 0, sym.value);
                    }
                    SymbolKind::Var => {
                        self.code.emit(OpCode::Lod, level_diff as i64, sym.addr);
                    }
                    SymbolKind::Proc => {
                        return Err(self.semantic(*pos, format!("cannot use procedure '{name}' as a value")));
                    }
                }
            }
            Expr::UnaryOp { op, expr, pos } => {
                self.gen_expr(expr)?;
                let code = match op {
                    UnaryOpKind::Neg => OprCode::Neg,
                    UnaryOpKind::Odd => OprCode::Odd,
                };
                let _ = pos;
                self.code.emit(OpCode::Opr, 0, code as i64);
            }
            Expr::BinOp { left, op, right, .. } => {
                self.gen_expr(left)?;
                self.gen_expr(right)?;
                let code = match op {
                    BinOpKind::Add => OprCode::Add,
                    BinOpKind::Sub => OprCode::Sub,
                    BinOpKind::Mul => OprCode::Mul,
                    BinOpKind::Div => OprCode::Div,
                    BinOpKind::Eq => OprCode::Eql,
                    BinOpKind::Neq => OprCode::Neq,
                    BinOpKind::Lss => OprCode::Lss,
                    BinOpKind::Leq => OprCode::Leq,
                    BinOpKind::Gtr => OprCode::Gtr,
                    BinOpKind::Geq => OprCode::Geq,
                };
                self.code.emit(OpCode::Opr, 0, code as i64);
            }
        }
        Ok(())
    }

    fn lookup(&mut self, name: &str, pos: Position) -> PlResult<(crate::symtab::Symbol, usize)> {
        self.symbols
            .lookup(name, self.options.mark_references)
            .ok_or_else(|| self.semantic_undefined(pos, name))
    }

    fn semantic(&self, pos: Position, message: impl Into<String>) -> PlError {
        PlError::Semantic { pos, message: message.into() }
    }

    fn semantic_undefined(&self, pos: Position, name: &str) -> PlError {
        let suggestion = self
            .symbols
            .all_visible_symbols()
            .iter()
            .map(|s| (s.name.as_str(), crate::semantic::levenshtein(name, &s.name)))
            .filter(|(_, d)| *d <= 2)
            .min_by_key(|(_, d)| *d)
            .map(|(n, _)| n.to_string());
        let message = match suggestion {
            Some(close) => format!("undefined identifier '{name}' — did you mean '{close}'?"),
            None => format!("undefined identifier '{name}'"),
        };
        PlError::Semantic { pos, message }
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a parsed program straight into executable code. Convenience
/// wrapper for callers that don't need the generator object itself.
pub fn generate(program: &Program) -> PlResult<Code> {
    CodeGenerator::new().generate(program)
}

/// Like [`generate`], but with explicit `CompileOptions`.
pub fn generate_with_options(program: &Program, options: CompileOptions) -> PlResult<Code> {
    CodeGenerator::with_options(options).generate(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::OpCode;
    use crate::parser::Parser;

    fn compile(src: &str) -> Code {
        let (program, diags) = Parser::new(src).parse();
        assert!(diags.iter().all(|d| d.severity != crate::error::Severity::Error), "{diags:?}");
        generate(&program).expect("codegen should succeed")
    }

    #[test]
    fn emission_is_monotonic_and_backpatches_forward_jumps() {
        let code = compile("program p; var x; begin if x = 0 then x := 1 end");
        // The leading JMP's target must land inside the emitted range.
        assert_eq!(code[0].f, OpCode::Jmp);
        assert!((code[0].a as usize) <= code.len());
    }

    #[test]
    fn undefined_identifier_is_a_semantic_error() {
        let (program, _) = Parser::new("program p; begin write(y) end").parse();
        let err = generate(&program).unwrap_err();
        assert!(matches!(err, PlError::Semantic { .. }));
    }

    #[test]
    fn call_arity_mismatch_is_rejected() {
        let src = "program p; procedure q(a); begin end; begin call q() end";
        let (program, _) = Parser::new(src).parse();
        assert!(generate(&program).is_err());
    }

    #[test]
    fn call_emits_argument_handoff_before_cal() {
        let src = "program p; procedure q(a); begin end; begin call q(5) end";
        let code = compile(src);
        let cal_idx = code.iter().position(|(_, i)| i.f == OpCode::Cal).unwrap();
        assert_eq!(code[cal_idx - 1].f, OpCode::Sto);
        assert_eq!(code[cal_idx - 1].l, -1);
        assert_eq!(code[cal_idx - 1].a, 3);
    }

    #[test]
    fn expression_stack_effect_is_balanced() {
        let code = compile("program p; var x; begin x := 1 + 2 * 3 end");
        // LIT 1, LIT 2, LIT 3, OPR MUL, OPR ADD, STO 0 x
        assert!(code.iter().filter(|(_, i)| i.f == OpCode::Lit).count() == 3);
    }

    /// Net effect on `T` of a single instruction, ignoring control flow
    /// (none of LIT/LOD/OPR/STO touch `P` directly).
    fn stack_delta(instr: &crate::instruction::Instruction) -> i64 {
        use crate::instruction::OprCode::*;
        match instr.f {
            OpCode::Lit | OpCode::Lod => 1,
            OpCode::Sto => -1,
            OpCode::Opr => match OprCode::from_i64(instr.a).unwrap() {
                Neg | Odd | Ret | Line => 0,
                Add | Sub | Mul | Div | Eql | Neq | Lss | Geq | Gtr | Leq => -1,
            },
            _ => 0,
        }
    }

    #[derive(Debug, Clone)]
    enum ArbExpr {
        Num(i64),
        Var,
        Bin(Box<ArbExpr>, BinOpKind, Box<ArbExpr>),
        Neg(Box<ArbExpr>),
    }

    fn arb_expr() -> impl proptest::strategy::Strategy<Value = ArbExpr> {
        use proptest::prelude::*;
        let leaf = prop_oneof![
            (-100i64..100).prop_map(ArbExpr::Num),
            Just(ArbExpr::Var),
        ];
        leaf.prop_recursive(4, 16, 4, |inner| {
            prop_oneof![
                inner.clone().prop_map(|e| ArbExpr::Neg(Box::new(e))),
                (inner.clone(), inner).prop_map(|(l, r)| ArbExpr::Bin(Box::new(l), BinOpKind::Add, Box::new(r))),
            ]
        })
    }

    fn to_ast(e: &ArbExpr) -> Expr {
        let pos = Position::default();
        match e {
            ArbExpr::Num(v) => Expr::Num { value: *v, pos },
            ArbExpr::Var => Expr::Var { name: "x".to_string(), pos },
            ArbExpr::Neg(inner) => Expr::UnaryOp { op: UnaryOpKind::Neg, expr: Box::new(to_ast(inner)), pos },
            ArbExpr::Bin(l, op, r) => {
                Expr::BinOp { left: Box::new(to_ast(l)), op: op.clone(), right: Box::new(to_ast(r)), pos }
            }
        }
    }

    proptest::proptest! {
        /// Invariant 5 (expression half): lowering any `Expr` leaves `T`
        /// exactly one above its entry value.
        #[test]
        fn expression_lowering_leaves_stack_one_higher(e in arb_expr()) {
            let mut gen = CodeGenerator::new();
            gen.symbols.enter_scope();
            gen.symbols.define_var("x").unwrap();
            gen.gen_expr(&to_ast(&e)).unwrap();
            let net: i64 = gen.code.iter().map(|(_, i)| stack_delta(i)).sum();
            proptest::prop_assert_eq!(net, 1);
        }
    }
}
