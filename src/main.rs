use std::fs;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use log::info;

use pl0::config::VmOptions;
use pl0::error::Severity;
use pl0::vm::{Machine, NullTracer, StderrTracer, Tracer};

/// PL/0 compiler and stack-machine execution environment.
#[derive(ClapParser, Debug)]
#[command(name = "pl0", version, about)]
struct Cli {
    /// Source file to compile and run.
    file: String,

    /// Print the parsed AST before running.
    #[arg(long)]
    ast: bool,

    /// Print the generated P-code before running.
    #[arg(long)]
    code: bool,

    /// Trace every VM fetch to stderr.
    #[arg(long)]
    trace: bool,

    /// Run the optional semantic lint pass and print its findings.
    #[arg(long)]
    lint: bool,

    /// Number of stack cells to allocate for the VM (raised to 2000 if
    /// smaller).
    #[arg(long, default_value_t = 4096)]
    stack_size: usize,

    /// Increase log verbosity (repeat for more: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let source = match fs::read_to_string(&cli.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read '{}': {e}", cli.file);
            return ExitCode::from(2);
        }
    };

    info!("parsing {}", cli.file);
    let (program, diagnostics) = pl0::parse(&source);
    for d in &diagnostics {
        eprintln!("{d}");
    }
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        return ExitCode::from(1);
    }

    if cli.lint {
        let lints = pl0::lint(&program);
        for d in &lints {
            eprintln!("{d}");
        }
    }

    if cli.ast {
        print!("{}", pl0::ast::print_tree(&program));
    }

    info!("generating code");
    let code = match pl0::compile(&program) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };

    if cli.code {
        print!("{}", code.dump());
    }

    info!("running ({} instructions)", code.len());
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let vm_options = VmOptions::new(cli.stack_size);
    let mut machine = Machine::with_options(&code, stdin.lock(), stdout.lock(), vm_options);
    let mut tracer: Box<dyn Tracer> = if cli.trace { Box::new(StderrTracer) } else { Box::new(NullTracer) };
    match machine.run(tracer.as_mut()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
    }
}
