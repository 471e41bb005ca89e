//! Abstract syntax tree for PL/0.
//!
//! The tree is a closed sum of node kinds. Every node carries
//! the source position of its defining token so the parser, code
//! generator, and optional semantic pass can all report accurate
//! diagnostics without re-threading position information separately.

use crate::error::Position;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnaryOpKind {
    Neg,
    Odd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Num { value: i64, pos: Position },
    Var { name: String, pos: Position },
    BinOp { left: Box<Expr>, op: BinOpKind, right: Box<Expr>, pos: Position },
    UnaryOp { op: UnaryOpKind, expr: Box<Expr>, pos: Position },
}

impl Expr {
    pub fn pos(&self) -> Position {
        match self {
            Expr::Num { pos, .. }
            | Expr::Var { pos, .. }
            | Expr::BinOp { pos, .. }
            | Expr::UnaryOp { pos, .. } => *pos,
        }
    }
}

/// A bare variable reference used as an assignment target or `read` slot —
/// distinct from `Expr::Var` because these contexts never evaluate an
/// expression, only resolve a storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub name: String,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Assign { target: VarRef, expr: Expr },
    If { cond: Expr, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    Call { name: String, args: Vec<Expr>, pos: Position },
    Read { vars: Vec<VarRef> },
    Write { exprs: Vec<Expr> },
    Compound { children: Vec<Stmt> },
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstDecl {
    pub name: String,
    pub value: i64,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    pub name: String,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureDecl {
    pub name: String,
    pub params: Vec<String>,
    pub block: Block,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub consts: Vec<ConstDecl>,
    pub vars: Vec<VarDecl>,
    pub procs: Vec<ProcedureDecl>,
    pub body: Stmt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub name: String,
    pub block: Block,
}

/// A node reference for the tree printer below — borrows rather than
/// rebuilding the AST, since printing never needs to own anything.
enum Node<'a> {
    Program(&'a Program),
    Block(&'a Block),
    Const(&'a ConstDecl),
    Var(&'a VarDecl),
    Proc(&'a ProcedureDecl),
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

fn label(node: &Node) -> String {
    match node {
        Node::Program(p) => format!("Program: {}", p.name),
        Node::Block(_) => "Block".to_string(),
        Node::Const(c) => format!("Const: {} = {}", c.name, c.value),
        Node::Var(v) => format!("Var: {}", v.name),
        Node::Proc(p) => format!("Procedure: {}({})", p.name, p.params.join(", ")),
        Node::Stmt(Stmt::Assign { target, .. }) => format!("Assign (:=): {}", target.name),
        Node::Stmt(Stmt::If { .. }) => "If".to_string(),
        Node::Stmt(Stmt::While { .. }) => "While".to_string(),
        Node::Stmt(Stmt::Call { name, .. }) => format!("Call: {name}"),
        Node::Stmt(Stmt::Read { .. }) => "Read".to_string(),
        Node::Stmt(Stmt::Write { .. }) => "Write".to_string(),
        Node::Stmt(Stmt::Compound { .. }) => "Compound Stmt".to_string(),
        Node::Stmt(Stmt::NoOp) => "NoOp".to_string(),
        Node::Expr(Expr::Num { value, .. }) => format!("Num: {value}"),
        Node::Expr(Expr::Var { name, .. }) => format!("Var: {name}"),
        Node::Expr(Expr::BinOp { op, .. }) => format!("BinOp: {op:?}"),
        Node::Expr(Expr::UnaryOp { op, .. }) => format!("Unary: {op:?}"),
    }
}

fn children<'a>(node: &Node<'a>) -> Vec<Node<'a>> {
    match node {
        Node::Program(p) => vec![Node::Block(&p.block)],
        Node::Block(b) => b
            .consts
            .iter()
            .map(Node::Const)
            .chain(b.vars.iter().map(Node::Var))
            .chain(b.procs.iter().map(Node::Proc))
            .chain(std::iter::once(Node::Stmt(&b.body)))
            .collect(),
        Node::Const(_) | Node::Var(_) => vec![],
        Node::Proc(p) => vec![Node::Block(&p.block)],
        Node::Stmt(Stmt::Compound { children }) => children.iter().map(Node::Stmt).collect(),
        Node::Stmt(Stmt::Assign { expr, .. }) => vec![Node::Expr(expr)],
        Node::Stmt(Stmt::If { cond, then_branch, else_branch }) => {
            let mut out = vec![Node::Expr(cond), Node::Stmt(then_branch)];
            if let Some(e) = else_branch {
                out.push(Node::Stmt(e));
            }
            out
        }
        Node::Stmt(Stmt::While { cond, body }) => vec![Node::Expr(cond), Node::Stmt(body)],
        Node::Stmt(Stmt::Call { args, .. }) => args.iter().map(Node::Expr).collect(),
        Node::Stmt(Stmt::Read { .. }) | Node::Stmt(Stmt::Write { .. }) | Node::Stmt(Stmt::NoOp) => vec![],
        Node::Expr(Expr::BinOp { left, right, .. }) => vec![Node::Expr(left), Node::Expr(right)],
        Node::Expr(Expr::UnaryOp { expr, .. }) => vec![Node::Expr(expr)],
        Node::Expr(Expr::Num { .. }) | Node::Expr(Expr::Var { .. }) => vec![],
    }
}

fn print_recursive(out: &mut String, node: &Node, prefix: &str, is_last: bool) {
    let connector = if is_last { "└── " } else { "├── " };
    out.push_str(&format!("{prefix}{connector}{}\n", label(node)));

    let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
    let kids = children(node);
    let count = kids.len();
    for (i, child) in kids.iter().enumerate() {
        print_recursive(out, child, &child_prefix, i == count - 1);
    }
}

/// Renders `program` as an indented tree using `└──`/`├──` connectors, one
/// node per line.
pub fn print_tree(program: &Program) -> String {
    let mut out = String::new();
    print_recursive(&mut out, &Node::Program(program), "", true);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn tree_printer_shows_nested_connectors() {
        let (program, _) = Parser::new("program p; var x; begin x := 1 + 2 end").parse();
        let tree = print_tree(&program);
        assert!(tree.starts_with("└── Program: p\n"));
        assert!(tree.contains("Var: x"));
        assert!(tree.contains("Assign (:=): x"));
        assert!(tree.contains("BinOp: Add"));
    }
}
