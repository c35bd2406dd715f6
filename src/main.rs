use std::fs;
use std::panic;
use std::process;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use wisp::ast::Value;
use wisp::builtinops::get_builtin_ops;
use wisp::evaluator::{self, Environment};
use wisp::{ARGS_BINDING, ENDL, render_scope};

const USAGE: &str = "\
usage: wisp [-i]                   start the interactive interpreter
       wisp -f <file> [args...]    run a source file
       wisp -c <code> [args...]    run code given on the command line
       wisp -h | --help            show this message

Remaining arguments are available to the program as the list `args`.
Set WISP_LOG (e.g. WISP_LOG=debug) to enable diagnostic logging on stderr.";

/// What the command line asked for
enum Mode {
    Repl,
    Help,
    File { path: String, args: Vec<String> },
    Code { code: String, args: Vec<String> },
}

fn parse_args(args: &[String]) -> Option<Mode> {
    match args {
        [] => Some(Mode::Repl),
        [flag] if flag == "-i" => Some(Mode::Repl),
        [flag] if flag == "-h" || flag == "--help" => Some(Mode::Help),
        [flag, path, rest @ ..] if flag == "-f" => Some(Mode::File {
            path: path.clone(),
            args: rest.to_vec(),
        }),
        [flag, code, rest @ ..] if flag == "-c" => Some(Mode::Code {
            code: code.clone(),
            args: rest.to_vec(),
        }),
        _ => None,
    }
}

/// Install the stderr subscriber. `WISP_LOG` wins over `RUST_LOG`; the default is `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("WISP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(mode) = parse_args(&args) else {
        eprintln!("invalid arguments");
        eprintln!("{USAGE}");
        process::exit(2);
    };

    match mode {
        Mode::Help => println!("{USAGE}"),
        Mode::Repl => {
            let result = panic::catch_unwind(|| {
                run_repl();
            });

            if let Err(panic_info) = result {
                eprintln!("The REPL encountered an unexpected error and must exit.");

                if let Some(msg) = panic_info.downcast_ref::<&str>() {
                    eprintln!("Error: {msg}");
                } else if let Some(msg) = panic_info.downcast_ref::<String>() {
                    eprintln!("Error: {msg}");
                } else {
                    eprintln!("Error: Unknown panic occurred");
                }

                process::exit(1);
            }
        }
        Mode::File { path, args } => {
            let source = match fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("could not read {path}: {e}");
                    process::exit(1);
                }
            };
            tracing::debug!(path = %path, "running file");
            process::exit(run_batch(&source, args));
        }
        Mode::Code { code, args } => process::exit(run_batch(&code, args)),
    }
}

/// Run a whole program non-interactively, returning the process exit status
fn run_batch(source: &str, program_args: Vec<String>) -> i32 {
    let mut env = evaluator::create_global_env();
    env.set(
        ARGS_BINDING,
        Value::List(program_args.into_iter().map(Value::from).collect()),
    );

    match evaluator::run(source, &mut env) {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}

fn run_repl() {
    println!("Wisp interpreter");
    println!("Type !help for commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not initialize REPL: {e}");
            process::exit(1);
        }
    };
    let mut env = evaluator::create_global_env();

    // Lines that evaluated successfully, for !export
    let mut session = String::new();

    loop {
        match rl.readline(">>> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // Add the line to history
                let _ = rl.add_history_entry(line);

                // Handle special commands
                match line {
                    "!quit" | "!q" => break,
                    "!help" | "!h" => {
                        print_help();
                        continue;
                    }
                    "!env" | "!e" => {
                        print_environment(&env);
                        continue;
                    }
                    "!export" | "!x" => {
                        export_session(&mut rl, &session);
                        continue;
                    }
                    _ => {}
                }

                match evaluator::run(line, &mut env) {
                    Ok(result) => {
                        println!(" => {}", result.debug());
                        session.push_str(line);
                        session.push('\n');
                    }
                    Err(e) => eprintln!("{e}"),
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }
}

fn export_session(rl: &mut DefaultEditor, session: &str) {
    let path = match rl.readline("File to export to: ") {
        Ok(path) => path.trim().to_owned(),
        Err(err) => {
            eprintln!("Error: {err:?}");
            return;
        }
    };
    if path.is_empty() {
        return;
    }

    match fs::write(&path, session) {
        Ok(()) => println!("Exported session to {path}"),
        Err(e) => eprintln!("could not write {path}: {e}"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  !help, !h    - Show this help message");
    println!("  !env, !e     - Show the current bindings");
    println!("  !export, !x  - Write every successfully evaluated line to a file");
    println!("  !quit, !q    - Exit the interpreter");
    println!("  Ctrl+C       - Exit the interpreter");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (defun square (n) (* n n))");
    println!("  (map square (range 0 5))");
    println!("  (for x '(1 2 3) (print x))");
    println!();
}

fn print_environment(env: &Environment<'_>) {
    let bindings = env.get_all_bindings();

    // Reserved names are resolved without being stored, so list them separately
    let reserved: Vec<&str> = get_builtin_ops()
        .iter()
        .map(|op| op.name)
        .chain([ENDL])
        .collect();
    println!("Reserved names ({}):", reserved.len());
    let mut col = 0;
    for name in reserved {
        print!("  {name:<12}");
        col += 1;
        if col % 6 == 0 {
            println!();
        }
    }
    if col % 6 != 0 {
        println!();
    }
    println!();

    println!("Bindings ({} total):", bindings.len());
    println!("{}", render_scope(&bindings));
}
