//! The P-code instruction set and the append-only vector that holds it.
//!
//! The forward-reference backpatching scheme needs a container whose
//! indices never move: `emit` returns an opaque handle (here, a plain
//! `usize` index) and `patch` is the only way to change an already-emitted
//! instruction's `a` field.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Lit,
    Lod,
    Sto,
    Cal,
    Int,
    Jmp,
    Jpc,
    Opr,
    Red,
    Wrt,
}

impl OpCode {
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Lit => "LIT",
            OpCode::Lod => "LOD",
            OpCode::Sto => "STO",
            OpCode::Cal => "CAL",
            OpCode::Int => "INT",
            OpCode::Jmp => "JMP",
            OpCode::Jpc => "JPC",
            OpCode::Opr => "OPR",
            OpCode::Red => "RED",
            OpCode::Wrt => "WRT",
        }
    }
}

/// `OPR`'s subcodes, carried in the instruction's `a` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum OprCode {
    Ret = 0,
    Neg = 1,
    Add = 2,
    Sub = 3,
    Mul = 4,
    Div = 5,
    Odd = 6,
    Eql = 7,
    Neq = 8,
    Lss = 9,
    Geq = 10,
    Gtr = 11,
    Leq = 12,
    Line = 13,
}

impl OprCode {
    pub fn from_i64(v: i64) -> Option<OprCode> {
        use OprCode::*;
        Some(match v {
            0 => Ret,
            1 => Neg,
            2 => Add,
            3 => Sub,
            4 => Mul,
            5 => Div,
            6 => Odd,
            7 => Eql,
            8 => Neq,
            9 => Lss,
            10 => Geq,
            11 => Gtr,
            12 => Leq,
            13 => Line,
            _ => return None,
        })
    }
}

/// A single three-field P-code instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub f: OpCode,
    pub l: i64,
    pub a: i64,
}

impl Instruction {
    pub fn new(f: OpCode, l: i64, a: i64) -> Self {
        Instruction { f, l, a }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.f.name(), self.l, self.a)
    }
}

/// An append-only vector of instructions with index-stable backpatching.
#[derive(Debug, Clone, Default)]
pub struct Code {
    instructions: Vec<Instruction>,
}

impl Code {
    pub fn new() -> Self {
        Code { instructions: Vec::new() }
    }

    /// Append an instruction, returning the index it was stored at.
    pub fn emit(&mut self, f: OpCode, l: i64, a: i64) -> usize {
        self.instructions.push(Instruction::new(f, l, a));
        self.instructions.len() - 1
    }

    /// Overwrite the `a` field of a previously emitted instruction.
    pub fn patch(&mut self, index: usize, a: i64) {
        self.instructions[index].a = a;
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Instruction)> {
        self.instructions.iter().enumerate()
    }

    /// Render a human-readable textual dump: `index f l a` per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (i, instr) in self.iter() {
            out.push_str(&format!("{}\t{}\t{}\t{}\n", i, instr.f.name(), instr.l, instr.a));
        }
        out
    }
}

impl std::ops::Index<usize> for Code {
    type Output = Instruction;
    fn index(&self, index: usize) -> &Instruction {
        &self.instructions[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_returns_stable_index() {
        let mut code = Code::new();
        let idx = code.emit(OpCode::Jmp, 0, 0);
        code.emit(OpCode::Int, 0, 3);
        code.patch(idx, 2);
        assert_eq!(code[idx].a, 2);
        assert_eq!(code.len(), 2);
    }

    #[test]
    fn dump_format_is_whitespace_separated() {
        let mut code = Code::new();
        code.emit(OpCode::Lit, 0, 42);
        let dump = code.dump();
        assert_eq!(dump.trim(), "0\tLIT\t0\t42");
    }

    proptest::proptest! {
        /// Invariant 1: `emit` never modifies existing entries; only `patch`
        /// does, and only at indices `emit` previously returned.
        #[test]
        fn emission_monotonicity(
            initial_values in proptest::collection::vec(-1000i64..1000, 1..30),
            patches in proptest::collection::vec((0usize..30, -1000i64..1000), 0..30),
        ) {
            let mut code = Code::new();
            let mut model: Vec<i64> = Vec::new();
            for a in &initial_values {
                code.emit(OpCode::Lit, 0, *a);
                model.push(*a);
            }
            for (idx, new_a) in &patches {
                if *idx < model.len() {
                    code.patch(*idx, *new_a);
                    model[*idx] = *new_a;
                }
            }
            for (i, expected) in model.iter().enumerate() {
                proptest::prop_assert_eq!(code[i].a, *expected);
            }
            proptest::prop_assert_eq!(code.len(), model.len());
        }
    }
}
