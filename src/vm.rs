//! The P-code stack machine.
//!
//! Fetch-decode-execute over a flat `Code` vector and a single growable
//! stack. Nested procedures are realized through the classic static-link
//! (SL) / dynamic-link (DL) / return-address (RA) frame header occupying
//! offsets `B+0`, `B+1`, `B+2`; `base(l)` walks `l` static links from `B`
//! to resolve a non-local variable's frame.

use std::io::{self, BufRead, Write as IoWrite};

use crate::config::VmOptions;
use crate::error::{PlError, PlResult};
use crate::instruction::{Code, Instruction, OpCode, OprCode};

/// Observes each instruction just before it executes. Used to implement
/// `--trace`; production callers can pass a no-op closure.
pub trait Tracer {
    fn on_fetch(&mut self, p: usize, instr: &Instruction, b: usize, t: usize, stack: &[i64]);
}

pub struct NullTracer;
impl Tracer for NullTracer {
    fn on_fetch(&mut self, _p: usize, _instr: &Instruction, _b: usize, _t: usize, _stack: &[i64]) {}
}

/// Prints a single line per instruction, matching the reference
/// implementation's interactive debug trace.
pub struct StderrTracer;
impl Tracer for StderrTracer {
    fn on_fetch(&mut self, p: usize, instr: &Instruction, b: usize, t: usize, stack: &[i64]) {
        let top = t.min(stack.len() - 1);
        let prefix: &[i64] = if top == 0 { &[] } else { &stack[1..=top] };
        eprintln!("p={p:<4} {instr:<14} b={b:<4} t={t:<4} stack={prefix:?}");
    }
}

pub struct Machine<'a, R, W> {
    code: &'a Code,
    stack: Vec<i64>,
    p: usize,
    b: usize,
    t: usize,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: IoWrite> Machine<'a, R, W> {
    /// Builds a machine with default `VmOptions` (a 4096-cell stack).
    pub fn new(code: &'a Code, input: R, output: W) -> Self {
        Self::with_options(code, input, output, VmOptions::default())
    }

    pub fn with_options(code: &'a Code, input: R, output: W, options: VmOptions) -> Self {
        Machine { code, stack: vec![0; options.stack_size], p: 0, b: 1, t: 0, input, output }
    }

    fn base(&self, mut l: i64) -> PlResult<usize> {
        let mut b1 = self.b;
        while l > 0 {
            b1 = usize::try_from(self.read(b1)?)
                .map_err(|_| self.fault("stack address out of range"))?;
            l -= 1;
        }
        Ok(b1)
    }

    fn read(&self, addr: usize) -> PlResult<i64> {
        self.stack.get(addr).copied().ok_or_else(|| self.fault("stack address out of range"))
    }

    fn write_slot(&mut self, addr: usize, value: i64) -> PlResult<()> {
        if addr >= self.stack.len() {
            return Err(self.fault("stack overflow"));
        }
        self.stack[addr] = value;
        Ok(())
    }

    fn fault(&self, message: impl Into<String>) -> PlError {
        let instruction = self.code.get(self.p.saturating_sub(1)).copied().unwrap_or(Instruction::new(OpCode::Opr, 0, 0));
        PlError::Runtime { pc: self.p.saturating_sub(1), instruction, message: message.into() }
    }

    /// Run to completion (a `RET` from the outermost frame), invoking
    /// `tracer` before each fetch.
    pub fn run(&mut self, tracer: &mut dyn Tracer) -> PlResult<()> {
        self.stack[1] = 0;
        self.stack[2] = 0;
        self.stack[3] = 0;

        loop {
            if self.p >= self.code.len() {
                return Ok(());
            }
            let instr = *self.code.get(self.p).expect("bounds checked above");
            tracer.on_fetch(self.p, &instr, self.b, self.t, &self.stack);
            self.p += 1;

            match instr.f {
                OpCode::Lit => {
                    self.t += 1;
                    self.write_slot(self.t, instr.a)?;
                }
                OpCode::Lod => {
                    let base = self.base(instr.l)?;
                    let v = self.read(base + instr.a as usize)?;
                    self.t += 1;
                    self.write_slot(self.t, v)?;
                }
                OpCode::Sto => {
                    let v = self.read(self.t)?;
                    if instr.l == -1 {
                        let addr = self.t + instr.a as usize;
                        self.write_slot(addr, v)?;
                    } else {
                        let base = self.base(instr.l)?;
                        self.write_slot(base + instr.a as usize, v)?;
                    }
                    self.t -= 1;
                }
                OpCode::Cal => {
                    let sl = self.base(instr.l)? as i64;
                    self.write_slot(self.t + 1, sl)?;
                    self.write_slot(self.t + 2, self.b as i64)?;
                    self.write_slot(self.t + 3, self.p as i64)?;
                    self.b = self.t + 1;
                    self.p = instr.a as usize;
                }
                OpCode::Int => {
                    let new_t = self.t as i64 + instr.a;
                    if new_t < 0 || new_t as usize >= self.stack.len() {
                        return Err(self.fault("stack overflow"));
                    }
                    self.t = new_t as usize;
                }
                OpCode::Jmp => self.p = instr.a as usize,
                OpCode::Jpc => {
                    if self.read(self.t)? == 0 {
                        self.p = instr.a as usize;
                    }
                    self.t -= 1;
                }
                OpCode::Red => {
                    let value = self.read_int()?;
                    self.t += 1;
                    self.write_slot(self.t, value)?;
                }
                OpCode::Wrt => {
                    let v = self.read(self.t)?;
                    writeln!(self.output, "{v}").map_err(|e| self.fault(e.to_string()))?;
                    self.t -= 1;
                }
                OpCode::Opr => {
                    let should_halt = self.exec_opr(instr.a)?;
                    if should_halt {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn read_int(&mut self) -> PlResult<i64> {
        write!(self.output, "? ").map_err(|e| self.fault(e.to_string()))?;
        self.output.flush().map_err(|e| self.fault(e.to_string()))?;
        let mut line = String::new();
        self.input.read_line(&mut line).map_err(|e| self.fault(e.to_string()))?;
        line.trim().parse::<i64>().map_err(|_| self.fault(format!("'{}' is not a valid integer", line.trim())))
    }

    /// Executes an `OPR` subcode. Returns `true` when the subcode was `RET`
    /// from the outermost frame and the program should halt.
    fn exec_opr(&mut self, a: i64) -> PlResult<bool> {
        let code = OprCode::from_i64(a).ok_or_else(|| self.fault(format!("unknown OPR subcode {a}")))?;
        match code {
            OprCode::Ret => {
                let frame = self.b;
                let ra = self.read(frame + 2)?;
                let dl = self.read(frame + 1)?;
                self.p = ra as usize;
                self.b = dl as usize;
                self.t = frame - 1;
                if ra == 0 {
                    return Ok(true);
                }
            }
            OprCode::Neg => {
                let v = self.read(self.t)?;
                self.write_slot(self.t, -v)?;
            }
            OprCode::Add | OprCode::Sub | OprCode::Mul | OprCode::Div => {
                let rhs = self.read(self.t)?;
                self.t -= 1;
                let lhs = self.read(self.t)?;
                let result = match code {
                    OprCode::Add => lhs + rhs,
                    OprCode::Sub => lhs - rhs,
                    OprCode::Mul => lhs * rhs,
                    OprCode::Div => {
                        if rhs == 0 {
                            return Err(self.fault("division by zero"));
                        }
                        lhs / rhs
                    }
                    _ => unreachable!(),
                };
                self.write_slot(self.t, result)?;
            }
            OprCode::Odd => {
                let v = self.read(self.t)?;
                self.write_slot(self.t, v & 1)?;
            }
            OprCode::Eql | OprCode::Neq | OprCode::Lss | OprCode::Geq | OprCode::Gtr | OprCode::Leq => {
                let rhs = self.read(self.t)?;
                self.t -= 1;
                let lhs = self.read(self.t)?;
                let result = match code {
                    OprCode::Eql => lhs == rhs,
                    OprCode::Neq => lhs != rhs,
                    OprCode::Lss => lhs < rhs,
                    OprCode::Geq => lhs >= rhs,
                    OprCode::Gtr => lhs > rhs,
                    OprCode::Leq => lhs <= rhs,
                    _ => unreachable!(),
                };
                self.write_slot(self.t, result as i64)?;
            }
            OprCode::Line => {
                writeln!(self.output).map_err(|e| self.fault(e.to_string()))?;
            }
        }
        Ok(false)
    }
}

/// Run `code` against stdin/stdout with no tracing — the common case.
pub fn run_stdio(code: &Code) -> PlResult<()> {
    run_stdio_with_options(code, VmOptions::default())
}

/// Run `code` tracing every fetch to stderr.
pub fn run_stdio_traced(code: &Code) -> PlResult<()> {
    run_stdio_traced_with_options(code, VmOptions::default())
}

/// Run `code` against stdin/stdout with no tracing, using `options`.
pub fn run_stdio_with_options(code: &Code, options: VmOptions) -> PlResult<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut machine = Machine::with_options(code, stdin.lock(), stdout.lock(), options);
    machine.run(&mut NullTracer)
}

/// Run `code` tracing every fetch to stderr, using `options`.
pub fn run_stdio_traced_with_options(code: &Code, options: VmOptions) -> PlResult<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut machine = Machine::with_options(code, stdin.lock(), stdout.lock(), options);
    machine.run(&mut StderrTracer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::generate;
    use crate::parser::Parser;
    use std::io::Cursor;

    fn run_capture(src: &str, input: &str) -> String {
        let (program, diags) = Parser::new(src).parse();
        assert!(diags.iter().all(|d| d.severity != crate::error::Severity::Error), "{diags:?}");
        let code = generate(&program).expect("codegen should succeed");
        let mut out = Vec::new();
        {
            let mut machine = Machine::new(&code, Cursor::new(input.as_bytes()), &mut out);
            machine.run(&mut NullTracer).expect("vm should run to completion");
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn arithmetic_and_write() {
        let out = run_capture("program p; begin write(1 + 2 * 3) end", "");
        assert_eq!(out.trim(), "7");
    }

    #[test]
    fn while_loop_accumulates() {
        let src = "program p; var i, s; begin i := 0; s := 0; while i < 5 do begin s := s + i; i := i + 1 end; write(s) end";
        assert_eq!(run_capture(src, "").trim(), "10");
    }

    #[test]
    fn if_else_picks_branch() {
        let src = "program p; var x; begin x := 5; if x > 10 then write(1) else write(0) end";
        assert_eq!(run_capture(src, "").trim(), "0");
    }

    #[test]
    fn nested_procedure_with_parameter() {
        let src = "program p; procedure double(n); var r; begin r := n * 2; write(r) end; begin call double(21) end";
        assert_eq!(run_capture(src, "").trim(), "42");
    }

    #[test]
    fn recursive_procedure_computes_factorial() {
        let src = "program p; var result; \
                   procedure fact(n); \
                   begin \
                     if n <= 1 then result := 1; \
                     if n > 1 then begin call fact(n - 1); result := result * n end \
                   end; \
                   begin call fact(5); write(result) end";
        assert_eq!(run_capture(src, "").trim(), "120");
    }

    #[test]
    fn static_link_reaches_enclosing_scope_variable() {
        let src = "program p; var x; \
                   procedure outer(); var y; \
                     procedure inner(); begin x := y + 1 end; \
                   begin y := 41; call inner() end; \
                   begin x := 0; call outer(); write(x) end";
        assert_eq!(run_capture(src, "").trim(), "42");
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let src = "program p; var x; begin x := 1 / 0 end";
        let (program, _) = Parser::new(src).parse();
        let code = generate(&program).expect("codegen should succeed");
        let mut out = Vec::new();
        let mut machine = Machine::new(&code, Cursor::new(&b""[..]), &mut out);
        let err = machine.run(&mut NullTracer).unwrap_err();
        assert!(matches!(err, PlError::Runtime { .. }));
    }

    #[test]
    fn odd_is_a_bitwise_parity_check() {
        let src = "program p; var x; begin if odd 7 then x := 1 else x := 0; write(x) end";
        assert_eq!(run_capture(src, "").trim(), "1");
    }
}
