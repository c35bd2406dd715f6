//! End-to-end tests: whole programs through the public API and the `wisp` binary.
#![expect(clippy::unwrap_used)] // test code OK

use std::fs;
use std::process::Command;

use pretty_assertions::assert_eq;

use wisp::ast::{Value, atom, nil, val};
use wisp::{ARGS_BINDING, ErrorKind, create_global_env, run};

fn run_program(source: &str) -> Result<Value, ErrorKind> {
    let mut env = create_global_env();
    run(source, &mut env).map_err(|e| e.kind)
}

#[test]
fn test_recursive_programs() {
    let program = r#"
        ; classic recursion
        (defun fact (n)
            (if (<= n 1)
                1
                (* n (fact (- n 1)))))

        (defun fib (n)
            (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))

        (list (fact 5) (fib 10))
    "#;
    assert_eq!(run_program(program), Ok(val([120, 55])));
}

#[test]
fn test_collatz_with_while() {
    let program = r#"
        (defun collatz-steps (n)
            (scope
                (define steps 0)
                (while (!= n 1)
                    (define n (if (= (% n 2) 0) (/ n 2) (+ (* 3 n) 1)))
                    (define steps (+ steps 1)))
                steps))
        (collatz-steps 27)
    "#;
    assert_eq!(run_program(program), Ok(val(111)));
}

#[test]
fn test_higher_order_pipeline() {
    let program = r#"
        (define squares (map (lambda (n) (* n n)) (range 0 10)))
        (define evens (filter (lambda (n) (= (% n 2) 0)) squares))
        (list evens (reduce + 0 evens))
    "#;
    assert_eq!(
        run_program(program),
        Ok(val(vec![val([0, 4, 16, 36, 64]), val(120)]))
    );
}

#[test]
fn test_closure_snapshot_and_counter() {
    let program = r#"
        (define rate 2)
        (defun scale (x) (* x rate))
        (define rate 100)
        (scale 21)
    "#;
    assert_eq!(run_program(program), Ok(val(42)));

    let program = r#"
        (defun make-counter (start)
            (lambda (step) (+ start step)))
        (define from-ten (make-counter 10))
        (list (from-ten 1) (from-ten 5))
    "#;
    assert_eq!(run_program(program), Ok(val([11, 15])));
}

#[test]
fn test_string_building() {
    let program = r#"
        (define words '("lisp" "is" "fun"))
        (reduce (lambda (acc w) (+ acc (+ w " "))) "" words)
    "#;
    assert_eq!(run_program(program), Ok(val("lisp is fun ")));

    assert_eq!(
        run_program(r#"(debug (list 1 2.5 "s" 'a @))"#),
        Ok(val(r#"(1 2.5 "s" a @)"#))
    );
    assert_eq!(run_program("(display (+ 1 2.0))"), Ok(val("3")));
}

#[test]
fn test_code_as_data() {
    let program = r#"
        (define form '(+ 1 2))
        (define form (push form 3))
        (list form (eval form) (eval (head (parse "(* 6 7)"))))
    "#;
    assert_eq!(
        run_program(program),
        Ok(val(vec![
            val(vec![atom("+"), val(1), val(2), val(3)]),
            val(6),
            val(42),
        ]))
    );
}

#[test]
fn test_program_errors() {
    let cases = [
        ("(head (list))", ErrorKind::IndexOutOfRange),
        ("(define x 1) (+ x \"a\")", ErrorKind::InvalidBinOp),
        ("(defun f (a b) a) (f 1)", ErrorKind::TooFewArgs),
        ("(print undefined)", ErrorKind::AtomNotDefined),
        ("(print \"unterminated)", ErrorKind::MalformedProgram),
        ("(1 2 3)", ErrorKind::CallNonFunction),
        ("(int '(1))", ErrorKind::BadCast),
        ("(/ 10 0)", ErrorKind::InvalidArgument),
    ];
    for (source, kind) in cases {
        assert_eq!(run_program(source), Err(kind), "for {source}");
    }

    // A failing form stops the program; earlier bindings persist
    let mut env = create_global_env();
    assert!(run("(define a 1) (head '()) (define b 2)", &mut env).is_err());
    assert_eq!(env.get("a").unwrap(), val(1));
    assert!(env.get("b").is_err());
}

#[test]
fn test_include_and_files() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("lib.wisp");
    fs::write(&lib, "(defun square (x) (* x x))\n(define base 3)\n").unwrap();
    let out = dir.path().join("out.txt");

    let program = format!(
        r#"
        (include "{lib}")
        (write-file "{out}" (display (map square (range 0 base))))
        (read-file "{out}")
        "#,
        lib = lib.display(),
        out = out.display(),
    );
    assert_eq!(run_program(&program), Ok(val("(0 1 4)")));
    assert_eq!(fs::read_to_string(&out).unwrap(), "(0 1 4)");
}

#[test]
fn test_include_keeps_program_args() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("lib.wisp");
    fs::write(&lib, "(define arg-count (len args))\n(define newline endl)\n").unwrap();

    let mut env = create_global_env();
    env.set(ARGS_BINDING, val(["alpha", "beta"]));
    let program = format!(
        r#"(include "{lib}") (list (len args) arg-count (= newline endl))"#,
        lib = lib.display(),
    );
    assert_eq!(run(&program, &mut env).unwrap(), val([2, 2, 1]));
    assert_eq!(env.get("args").unwrap(), val(["alpha", "beta"]));
}

#[test]
fn test_empty_and_comment_programs() {
    assert_eq!(run_program(""), Ok(Value::Unit));
    assert_eq!(run_program("; nothing here\n; at all"), Ok(Value::Unit));
    assert_eq!(run_program("(list)"), Ok(nil()));
}

fn wisp() -> Command {
    Command::new(env!("CARGO_BIN_EXE_wisp"))
}

#[test]
fn test_cli_inline_code_and_args() {
    let output = wisp()
        .args(["-c", "(print (+ 1 2.0)) (print (len args) (head args))", "alpha", "beta"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "3\n2 alpha\n");
}

#[test]
fn test_cli_runs_file() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("main.wisp");
    fs::write(&script, "(for x (range 1 4) (print \"line\" x))").unwrap();

    let output = wisp().arg("-f").arg(&script).output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "line 1\nline 2\nline 3\n"
    );
}

#[test]
fn test_cli_failures() {
    let output = wisp().args(["-c", "(head (list))"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("with message \"index out of range\""),
        "stderr was {stderr}"
    );

    let output = wisp().args(["--bogus"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("invalid arguments"));

    let output = wisp().args(["-c", "(exit 3)"]).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
}
