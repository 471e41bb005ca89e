//! End-to-end compile-and-run scenarios, source text and expected output
//! taken verbatim from the language reference.

use std::io::Cursor;

use pl0::error::Severity;
use pl0::vm::{Machine, NullTracer};

fn run(source: &str) -> String {
    let (program, diagnostics) = pl0::parse(source);
    assert!(
        diagnostics.iter().all(|d| d.severity != Severity::Error),
        "unexpected parse diagnostics: {diagnostics:?}"
    );
    let code = pl0::compile(&program).expect("code generation should succeed");
    let mut out = Vec::new();
    {
        let mut machine = Machine::new(&code, Cursor::new(&b""[..]), &mut out);
        machine.run(&mut NullTracer).expect("the program should run to completion");
    }
    String::from_utf8(out).unwrap()
}

#[test]
fn s1_arithmetic() {
    let out = run("program p; var x; begin x:=1+2*3; write(x) end");
    assert_eq!(out.trim(), "7");
}

#[test]
fn s2_while_sum() {
    let out = run("program s; var i,s; begin i:=1; s:=0; while i<=5 do begin s:=s+i; i:=i+1 end; write(s) end");
    assert_eq!(out.trim(), "15");
}

#[test]
fn s3_if_else() {
    let out = run("program c; var x; begin x:=10; if odd x then write(1) else write(0) end");
    assert_eq!(out.trim(), "0");
}

#[test]
fn s4_nested_procedure_with_parameter() {
    let out = run("program n; var r; procedure sq(x); begin r:=x*x end; begin call sq(6); write(r) end");
    assert_eq!(out.trim(), "36");
}

#[test]
fn s5_recursion() {
    let out = run(
        "program f; var r; procedure fact(n); begin if n=1 then r:=1 else begin call fact(n-1); r:=n*r end end; begin call fact(5); write(r) end",
    );
    assert_eq!(out.trim(), "120");
}

#[test]
fn s6_static_link_access() {
    let out = run(
        "program o; var a; procedure outer(x); procedure inner(y); begin a:=x+y end; begin call inner(10) end; begin call outer(7); write(a) end",
    );
    assert_eq!(out.trim(), "17");
}
