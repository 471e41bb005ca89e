//! Optional semantic lint pass.
//!
//! Runs independently of code generation and has no effect on the emitted
//! instructions — it exists purely to surface diagnostics earlier and with
//! friendlier wording: unused variables, "did you mean" suggestions for
//! typo'd identifiers, statically-detectable division by zero, and
//! always-true/always-false conditions. Wired to the `--lint` CLI flag.

use crate::ast::*;
use crate::config::CompileOptions;
use crate::error::{Diagnostic, Position};
use crate::symtab::{SymbolKind, SymbolTable};

/// Classic Levenshtein edit distance, used to suggest a likely-intended
/// identifier when a lookup fails.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut row: Vec<usize> = (0..=m).collect();

    for i in 1..=n {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=m {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = tmp;
        }
    }
    row[m]
}

pub struct SemanticAnalyzer {
    symbols: SymbolTable,
    diagnostics: Vec<Diagnostic>,
    options: CompileOptions,
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self::with_options(CompileOptions::default())
    }

    pub fn with_options(options: CompileOptions) -> Self {
        SemanticAnalyzer { symbols: SymbolTable::new(), diagnostics: Vec::new(), options }
    }

    pub fn analyze(mut self, program: &Program) -> Vec<Diagnostic> {
        self.symbols.enter_scope();
        self.visit_block(&program.block);
        self.symbols.exit_scope();
        self.diagnostics
    }

    fn suggest(&self, name: &str) -> Option<String> {
        self.symbols
            .all_visible_symbols()
            .iter()
            .map(|s| (s.name.clone(), levenshtein(name, &s.name)))
            .filter(|(_, d)| *d <= 2 && *d < name.len())
            .min_by_key(|(_, d)| *d)
            .map(|(n, _)| n)
    }

    fn undefined(&mut self, pos: Position, name: &str, what: &str) {
        let suggestion = self.suggest(name).map(|s| format!(" — did you mean '{s}'?")).unwrap_or_default();
        self.diagnostics.push(Diagnostic::error(pos, format!("{what} '{name}' is not defined{suggestion}")));
    }

    fn visit_block(&mut self, block: &Block) {
        for c in &block.consts {
            if self.symbols.define_const(&c.name, c.value).is_err() {
                self.diagnostics.push(Diagnostic::error(c.pos, format!("'{}' is already defined in this scope", c.name)));
            }
        }
        for v in &block.vars {
            if self.symbols.define_var(&v.name).is_err() {
                self.diagnostics.push(Diagnostic::error(v.pos, format!("'{}' is already defined in this scope", v.name)));
            }
        }
        for p in &block.procs {
            if self.symbols.define_proc(&p.name, p.params.len()).is_err() {
                self.diagnostics.push(Diagnostic::error(p.pos, format!("'{}' is already defined in this scope", p.name)));
            }
        }
        for p in &block.procs {
            self.visit_procedure(p);
        }

        self.visit_stmt(&block.body);

        for sym in self.symbols.symbols_in_current_scope() {
            if sym.kind == SymbolKind::Var && !sym.referenced {
                self.diagnostics.push(Diagnostic::warning(Position::default(), format!("variable '{}' is never used", sym.name)));
            }
        }
    }

    fn visit_procedure(&mut self, proc: &ProcedureDecl) {
        self.symbols.enter_scope();
        for param in &proc.params {
            let _ = self.symbols.define_var(param);
        }
        self.visit_block(&proc.block);
        self.symbols.exit_scope();
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::NoOp => {}
            Stmt::Compound { children } => children.iter().for_each(|c| self.visit_stmt(c)),
            Stmt::Assign { target, expr } => {
                self.visit_expr(expr);
                match self.symbols.lookup(&target.name, self.options.mark_references) {
                    None => self.undefined(target.pos, &target.name, "variable"),
                    Some((sym, _)) if sym.kind == SymbolKind::Const => {
                        self.diagnostics.push(Diagnostic::error(target.pos, format!("cannot assign to constant '{}'", target.name)));
                    }
                    Some((sym, _)) if sym.kind == SymbolKind::Proc => {
                        self.diagnostics.push(Diagnostic::error(target.pos, format!("cannot assign to procedure '{}'", target.name)));
                    }
                    Some(_) => self.symbols.mark_initialized(&target.name),
                }
            }
            Stmt::If { cond, then_branch, else_branch } => {
                self.check_condition_foldable(cond);
                self.visit_expr(cond);
                self.visit_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.visit_stmt(e);
                }
            }
            Stmt::While { cond, body } => {
                self.check_condition_foldable(cond);
                self.visit_expr(cond);
                self.visit_stmt(body);
            }
            Stmt::Call { name, args, pos } => {
                match self.symbols.lookup(name, self.options.mark_references) {
                    None => self.undefined(*pos, name, "procedure"),
                    Some((sym, _)) if sym.kind != SymbolKind::Proc => {
                        self.diagnostics.push(Diagnostic::error(*pos, format!("'{name}' is not a procedure")));
                    }
                    Some((sym, _)) if sym.param_count != args.len() => {
                        self.diagnostics.push(Diagnostic::error(
                            *pos,
                            format!("'{name}' expects {} argument(s), found {}", sym.param_count, args.len()),
                        ));
                    }
                    Some(_) => {}
                }
                for a in args {
                    self.visit_expr(a);
                }
            }
            Stmt::Read { vars } => {
                for v in vars {
                    match self.symbols.lookup(&v.name, self.options.mark_references) {
                        None => self.undefined(v.pos, &v.name, "variable"),
                        Some((sym, _)) if sym.kind != SymbolKind::Var => {
                            self.diagnostics.push(Diagnostic::error(v.pos, format!("cannot read into '{}': not a variable", v.name)));
                        }
                        Some(_) => self.symbols.mark_initialized(&v.name),
                    }
                }
            }
            Stmt::Write { exprs } => exprs.iter().for_each(|e| self.visit_expr(e)),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Num { .. } => {}
            Expr::Var { name, pos } => match self.symbols.lookup(name, self.options.mark_references) {
                None => self.undefined(*pos, name, "identifier"),
                Some((sym, _)) if sym.kind == SymbolKind::Proc => {
                    self.diagnostics.push(Diagnostic::error(*pos, format!("procedure '{name}' cannot be used as a value")));
                }
                Some(_) => {}
            },
            Expr::UnaryOp { expr, .. } => self.visit_expr(expr),
            Expr::BinOp { left, op, right, pos } => {
                self.visit_expr(left);
                self.visit_expr(right);
                if *op == BinOpKind::Div && self.is_statically_zero(right) {
                    self.diagnostics.push(Diagnostic::error(*pos, "division by zero"));
                }
            }
        }
    }

    fn is_statically_zero(&mut self, expr: &Expr) -> bool {
        match expr {
            Expr::Num { value, .. } => *value == 0,
            Expr::Var { name, .. } => self
                .symbols
                .lookup(name, false)
                .map(|(sym, _)| sym.kind == SymbolKind::Const && sym.value == 0)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Conditions built entirely out of literals fold to a constant truth
    /// value — flag it, since the branch or loop is then dead code or an
    /// infinite loop.
    fn check_condition_foldable(&mut self, cond: &Expr) {
        if let Some(value) = self.fold_bool(cond) {
            let pos = cond.pos();
            let verdict = if value { "always true" } else { "always false" };
            self.diagnostics.push(Diagnostic::warning(pos, format!("condition is {verdict}")));
        }
    }

    fn fold_bool(&self, expr: &Expr) -> Option<bool> {
        match expr {
            Expr::UnaryOp { op: UnaryOpKind::Odd, expr, .. } => self.fold_int(expr).map(|v| v & 1 == 1),
            Expr::BinOp { left, op, right, .. } => {
                let (l, r) = (self.fold_int(left)?, self.fold_int(right)?);
                Some(match op {
                    BinOpKind::Eq => l == r,
                    BinOpKind::Neq => l != r,
                    BinOpKind::Lss => l < r,
                    BinOpKind::Leq => l <= r,
                    BinOpKind::Gtr => l > r,
                    BinOpKind::Geq => l >= r,
                    _ => return None,
                })
            }
            _ => None,
        }
    }

    fn fold_int(&self, expr: &Expr) -> Option<i64> {
        match expr {
            Expr::Num { value, .. } => Some(*value),
            Expr::UnaryOp { op: UnaryOpKind::Neg, expr, .. } => self.fold_int(expr).map(|v| -v),
            Expr::BinOp { left, op, right, .. } => {
                let (l, r) = (self.fold_int(left)?, self.fold_int(right)?);
                match op {
                    BinOpKind::Add => Some(l + r),
                    BinOpKind::Sub => Some(l - r),
                    BinOpKind::Mul => Some(l * r),
                    BinOpKind::Div if r != 0 => Some(l / r),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;
    use crate::parser::Parser;

    fn lint(src: &str) -> Vec<Diagnostic> {
        let (program, _) = Parser::new(src).parse();
        SemanticAnalyzer::new().analyze(&program)
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
    }

    #[test]
    fn unused_variable_is_a_warning() {
        let diags = lint("program p; var x, y; begin y := 1; write(y) end");
        assert!(diags.iter().any(|d| d.severity == Severity::Warning && d.message.contains('x')));
    }

    #[test]
    fn typo_suggests_closest_identifier() {
        let diags = lint("program p; var count; begin count := 1; write(coutn) end");
        assert!(diags.iter().any(|d| d.message.contains("did you mean 'count'")));
    }

    #[test]
    fn division_by_zero_constant_is_flagged() {
        let diags = lint("program p; const z := 0; var x; begin x := 1 / z end");
        assert!(diags.iter().any(|d| d.message.contains("division by zero")));
    }

    #[test]
    fn always_false_condition_is_flagged() {
        let diags = lint("program p; begin if 1 = 2 then write(1) end");
        assert!(diags.iter().any(|d| d.message.contains("always false")));
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let diags = lint("program p; procedure q(a, b); begin end; begin call q(1) end");
        assert!(diags.iter().any(|d| d.severity == Severity::Error && d.message.contains("expects 2")));
    }
}
