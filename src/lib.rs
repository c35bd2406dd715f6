//! Wisp - a small dynamically-typed Lisp
//!
//! This crate provides a reader that turns s-expression text into a homogeneous
//! [`Value`](ast::Value) representation, and a tree-walking evaluator that
//! interprets that representation directly. There is no bytecode and no
//! ahead-of-time compilation: every form is evaluated by recursive descent over
//! the value tree.
//!
//! ```lisp
//! ; values
//! 42 -7 3.14 "text" @        ; int, int, float, string, unit
//! '(1 2 3)                   ; quoted list
//!
//! ; definitions
//! (define x 5)
//! (defun square (n) (* n n))
//!
//! ; control flow
//! (if (< x 10) "small" "large")
//! (for i (range 0 3) (print i))
//! (map (lambda (n) (* n n)) (range 0 4))   ; => (0 1 4 9)
//! ```
//!
//! ## Semantics at a glance
//!
//! - Mixed `Int`/`Float` arithmetic and comparison promote to `Float`.
//! - `@` (unit) absorbs every arithmetic operator: `(+ @ 1)` is `@`.
//! - Truthiness: every value except the integer `0` is true.
//! - Closures capture a *snapshot* of the free variables their body mentions
//!   at creation time; later redefinitions are not visible inside them.
//! - Builtin and special-form names are reserved. They are resolved before
//!   any user binding, so `(define + 1)` succeeds but `+` keeps meaning
//!   addition. This is a fixed restriction of the language.
//! - Evaluation recurses on the native stack. Deep non-tail recursion in user
//!   programs can exhaust it; there is no depth guard.
//!
//! ## Modules
//!
//! - `ast`: the value model, arithmetic and rendering
//! - `parser`: s-expression reader
//! - `evaluator`: environments, eval/apply and the special forms
//! - `builtinops`: the static builtin registry and regular builtins

use std::fmt;

use crate::ast::{Bindings, Value};

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod parser;

pub use evaluator::{Environment, create_global_env, eval, run};
pub use parser::parse;

/// Name of the reserved variable holding the process's command-line arguments.
pub const ARGS_BINDING: &str = "args";

/// Reserved constant that always evaluates to a newline string.
pub const ENDL: &str = "endl";

/// The closed set of failures the reader and evaluator can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("too few arguments to function")]
    TooFewArgs,
    #[error("too many arguments to function")]
    TooManyArgs,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("mismatched types")]
    MismatchedTypes,
    #[error("called non-function")]
    CallNonFunction,
    #[error("invalid lambda")]
    InvalidLambda,
    #[error("invalid binary operation")]
    InvalidBinOp,
    #[error("cannot order expression")]
    InvalidOrder,
    #[error("cannot cast")]
    BadCast,
    #[error("atom not defined")]
    AtomNotDefined,
    #[error("evaluated empty list")]
    EvalEmptyList,
    #[error("index out of range")]
    IndexOutOfRange,
    /// Raised only by the reader
    #[error("malformed program")]
    MalformedProgram,
    /// Unreachable-state guard
    #[error("internal virtual machine error")]
    InternalError,
}

/// A failure raised by the reader or evaluator.
///
/// Carries the offending value, the local bindings of the scope it was raised
/// in, and the fixed message of its [`ErrorKind`]. Operations on bare values
/// (casts, arithmetic) have no scope at hand; the evaluator attaches one as the
/// error unwinds through `apply`.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub cause: Box<Value>,
    pub scope: Option<Bindings>,
}

impl Error {
    /// Create an error without scope information
    pub fn new(kind: ErrorKind, cause: Value) -> Self {
        Error {
            kind,
            cause: Box::new(cause),
            scope: None,
        }
    }

    /// Create an error raised inside the given scope
    pub fn in_scope(kind: ErrorKind, cause: Value, scope: &Bindings) -> Self {
        Error {
            kind,
            cause: Box::new(cause),
            scope: Some(scope.clone()),
        }
    }

    /// Attach a scope snapshot unless the error already carries one
    pub fn or_scope(mut self, scope: &Bindings) -> Self {
        if self.scope.is_none() {
            self.scope = Some(scope.clone());
        }
        self
    }

    /// Create a MalformedProgram error with a context snippet around `error_offset`
    pub fn malformed(input: &str, error_offset: usize) -> Self {
        const MAX_CONTEXT: usize = 40;

        let context_start = error_offset.saturating_sub(10);
        let context: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut snippet = String::new();
        if context_start > 0 {
            snippet.push_str("[...]");
        }
        snippet.push_str(&context);
        if context_start + context.chars().count() < input.chars().count() {
            snippet.push_str("[...]");
        }

        Error::new(ErrorKind::MalformedProgram, Value::String(snippet))
    }
}

/// Render a scope the way error descriptions and the REPL's `!env` show it
pub fn render_scope(scope: &Bindings) -> String {
    if scope.is_empty() {
        return "{ }".to_owned();
    }
    let entries: Vec<String> = scope
        .iter()
        .map(|(name, value)| format!("'{name}' : {}", value.debug()))
        .collect();
    format!("{{ {} }}", entries.join(", "))
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let scope = match &self.scope {
            Some(scope) => render_scope(scope),
            None => render_scope(&Bindings::new()),
        };
        write!(
            f,
            "error: the expression `{}` failed in scope {scope} with message \"{}\"",
            self.cause.debug(),
            self.kind
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{atom, val};

    #[test]
    fn test_error_description_shape() {
        let mut scope = Bindings::new();
        scope.insert("x".to_owned(), val(5));
        scope.insert("name".to_owned(), val("wisp"));

        let err = Error::in_scope(ErrorKind::AtomNotDefined, atom("y"), &scope);
        assert_eq!(
            err.to_string(),
            "error: the expression `y` failed in scope { 'name' : \"wisp\", 'x' : 5 } with message \"atom not defined\""
        );

        let err = Error::new(ErrorKind::BadCast, val("text"));
        assert_eq!(
            err.to_string(),
            "error: the expression `\"text\"` failed in scope { } with message \"cannot cast\""
        );
    }

    #[test]
    fn test_or_scope_keeps_innermost_scope() {
        let mut inner = Bindings::new();
        inner.insert("a".to_owned(), val(1));
        let mut outer = Bindings::new();
        outer.insert("b".to_owned(), val(2));

        let err = Error::new(ErrorKind::InvalidBinOp, val(1))
            .or_scope(&inner)
            .or_scope(&outer);
        assert_eq!(err.scope.unwrap(), inner);
    }

    #[test]
    fn test_error_source_is_kind() {
        use std::error::Error as _;
        let err = Error::new(ErrorKind::IndexOutOfRange, val(3));
        assert_eq!(
            err.source().unwrap().to_string(),
            "index out of range".to_owned()
        );
    }

    #[test]
    fn test_malformed_context_snippet() {
        let source = "(define x 1) (print \"unterminated";
        let err = Error::malformed(source, 19);
        assert_eq!(err.kind, ErrorKind::MalformedProgram);
        match *err.cause {
            Value::String(snippet) => {
                assert!(snippet.starts_with("[...]"));
                assert!(snippet.contains("\"unterminated"));
            }
            other => panic!("expected string context, got {other:?}"),
        }
    }
}
