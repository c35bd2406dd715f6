//! Built-in operations registry.
//!
//! Every name the language reserves lives in one static table, built once at
//! first use and never modified afterwards. [`Environment::get`] consults this
//! table before any user binding, so builtins cannot be shadowed.
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: every argument is evaluated before application (e.g. `+`, `map`, `head`)
//! - **Special Forms**: receive their arguments unevaluated and decide what to
//!   evaluate and when (e.g. `if`, `define`, `while`)
//!
//! Special forms are implemented next to the evaluator; the regular builtins are
//! implemented here. Both share one signature, and both have their argument
//! count checked against [`Arity`] by `apply` before they run.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the [`BuiltinFn`] signature
//! 2. **Add it to BUILTIN_OPS** with its name, kind and arity
//! 3. **Add tests** covering the success path and each error kind it can raise

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::sync::LazyLock;

use rand::Rng;

use crate::ast::{IntType, Value};
use crate::evaluator::{
    Environment, apply, eval, eval_define, eval_defun, eval_do, eval_for,
    eval_if, eval_lambda, eval_quote, eval_scope, eval_while, run,
};
use crate::{ARGS_BINDING, Error, ErrorKind, parser};

/// Canonical signature of every builtin: arguments (evaluated or not, depending on
/// the [`OpKind`]) and the caller's environment
pub type BuiltinFn = fn(Vec<Value>, &mut Environment<'_>) -> Result<Value, Error>;

/// Represents the implementation of a builtin (function or special form)
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Receives its arguments already evaluated
    Function(BuiltinFn),
    /// Receives its arguments unevaluated
    SpecialForm(BuiltinFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Accepted argument counts of a builtin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive on both ends
    Range(usize, usize),
    Any,
}

impl Arity {
    /// Check an argument count, reporting which direction it is off in
    pub fn validate(&self, arg_count: usize) -> Result<(), ErrorKind> {
        let (min, max) = match *self {
            Arity::Exact(n) => (n, Some(n)),
            Arity::AtLeast(n) => (n, None),
            Arity::Range(lo, hi) => (lo, Some(hi)),
            Arity::Any => (0, None),
        };
        if arg_count < min {
            Err(ErrorKind::TooFewArgs)
        } else if max.is_some_and(|max| arg_count > max) {
            Err(ErrorKind::TooManyArgs)
        } else {
            Ok(())
        }
    }
}

/// Definition of a builtin operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The reserved name of this operation
    pub name: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Names are unique in the registry
        self.name == other.name
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    pub(crate) fn function(&self) -> BuiltinFn {
        match self.op_kind {
            OpKind::Function(f) | OpKind::SpecialForm(f) => f,
        }
    }
}

//
// Builtin Function Implementations
//

/// Move a validated argument vector into a fixed-size array.
/// Arity is checked by `apply`, so a mismatch here is an interpreter bug.
pub(crate) fn take<const N: usize>(args: Vec<Value>) -> Result<[Value; N], Error> {
    <[Value; N]>::try_from(args)
        .map_err(|args| Error::new(ErrorKind::InternalError, Value::List(args)))
}

/// Numeric operands only; anything else is a type mismatch
fn require_number(value: &Value) -> Result<(), Error> {
    if value.is_number() {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::MismatchedTypes, value.clone()))
    }
}

/// Convert a user index to a position in `0..limit`
fn checked_index(index: &Value, limit: usize) -> Result<usize, Error> {
    let raw = index.as_int()?;
    usize::try_from(raw)
        .ok()
        .filter(|&i| i < limit)
        .ok_or_else(|| Error::new(ErrorKind::IndexOutOfRange, index.clone()))
}

macro_rules! fold_arithmetic {
    ($name:ident, $method:ident) => {
        fn $name(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
            let mut iter = args.into_iter();
            let Some(mut acc) = iter.next() else {
                return Err(Error::new(ErrorKind::TooFewArgs, Value::Unit));
            };
            for arg in iter {
                acc = acc.$method(&arg)?;
            }
            Ok(acc)
        }
    };
}

fold_arithmetic!(builtin_sum, add);
fold_arithmetic!(builtin_product, mul);

macro_rules! binary_arithmetic {
    ($name:ident, $method:ident) => {
        fn $name(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
            let [left, right] = take(args)?;
            left.$method(&right)
        }
    };
}

binary_arithmetic!(builtin_subtract, sub);
binary_arithmetic!(builtin_divide, div);
binary_arithmetic!(builtin_remainder, rem);

// Comparisons answer with the integers 1 and 0
macro_rules! comparison {
    ($name:ident, |$a:ident, $b:ident| $body:expr) => {
        fn $name(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
            let [$a, $b] = take(args)?;
            Ok(Value::from($body))
        }
    };
}

comparison!(builtin_eq, |a, b| a == b);
comparison!(builtin_neq, |a, b| a != b);
comparison!(builtin_less, |a, b| a.lt(&b)?);
comparison!(builtin_less_eq, |a, b| a.le(&b)?);
comparison!(builtin_greater, |a, b| a.gt(&b)?);
comparison!(builtin_greater_eq, |a, b| a.ge(&b)?);

fn builtin_list(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    Ok(Value::List(args))
}

fn builtin_push(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let mut iter = args.into_iter();
    let mut list = iter.next().unwrap_or(Value::Unit);
    for item in iter {
        list.push(item)?;
    }
    Ok(list)
}

fn builtin_pop(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [mut list] = take(args)?;
    list.pop()
}

fn builtin_head(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [list] = take(args)?;
    list.head()
}

fn builtin_tail(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [list] = take(args)?;
    list.tail()
}

fn builtin_index(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [list, index] = take(args)?;
    let items = list.as_list()?;
    let position = checked_index(&index, items.len())?;
    Ok(items[position].clone())
}

fn builtin_insert(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [list, index, item] = take(args)?;
    let mut items = list.into_list()?;
    // Inserting at the end is allowed
    let position = checked_index(&index, items.len() + 1)?;
    items.insert(position, item);
    Ok(Value::List(items))
}

fn builtin_remove(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [list, index] = take(args)?;
    let mut items = list.into_list()?;
    let position = checked_index(&index, items.len())?;
    items.remove(position);
    Ok(Value::List(items))
}

fn builtin_len(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [list] = take(args)?;
    let len = list.as_list()?.len();
    IntType::try_from(len)
        .map(Value::Int)
        .map_err(|_| Error::new(ErrorKind::InternalError, list.clone()))
}

/// `[low, high)` stepping by the integer literal 1, so float ranges step by 1.0.
/// Stops early once adding 1 no longer changes a float.
fn builtin_range(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [mut low, high] = take(args)?;
    require_number(&low)?;
    require_number(&high)?;

    let mut result = Vec::new();
    if low.ge(&high)? {
        return Ok(Value::List(result));
    }
    if matches!(high, Value::Float(h) if h.is_infinite()) {
        return Err(Error::new(ErrorKind::InvalidArgument, high));
    }
    let step = Value::Int(1);
    while low.lt(&high)? {
        let next = low.add(&step)?;
        let advanced = next.gt(&low)?;
        result.push(low);
        if !advanced {
            break;
        }
        low = next;
    }
    Ok(Value::List(result))
}

fn builtin_map(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [function, list] = take(args)?;
    let mut result = Vec::new();
    for item in list.into_list()? {
        result.push(apply(&function, vec![item], env)?);
    }
    Ok(Value::List(result))
}

fn builtin_filter(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [function, list] = take(args)?;
    let mut result = Vec::new();
    for item in list.into_list()? {
        if apply(&function, vec![item.clone()], env)?.as_bool() {
            result.push(item);
        }
    }
    Ok(Value::List(result))
}

fn builtin_reduce(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [function, init, list] = take(args)?;
    let mut acc = init;
    for item in list.into_list()? {
        acc = apply(&function, vec![acc, item], env)?;
    }
    Ok(acc)
}

fn builtin_cast_to_int(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [value] = take(args)?;
    value.cast_to_int()
}

fn builtin_cast_to_float(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [value] = take(args)?;
    value.cast_to_float()
}

fn builtin_type(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [value] = take(args)?;
    Ok(Value::from(value.type_name()))
}

fn builtin_display(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [value] = take(args)?;
    Ok(Value::String(value.display()))
}

fn builtin_debug(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [value] = take(args)?;
    Ok(Value::String(value.debug()))
}

/// The argument has already been evaluated once; this evaluates the result again
fn builtin_eval(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [expr] = take(args)?;
    eval(&expr, env)
}

fn builtin_parse(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [source] = take(args)?;
    let Value::String(text) = &source else {
        return Err(Error::new(ErrorKind::InvalidArgument, source));
    };
    parser::parse(text).map(Value::List)
}

//
// I/O builtins
//

fn builtin_print(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let line: Vec<String> = args.iter().map(Value::display).collect();
    println!("{}", line.join(" "));
    Ok(args.into_iter().last().unwrap_or(Value::Unit))
}

fn builtin_input(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let prompt = args.into_iter().next();
    if let Some(prompt) = &prompt {
        print!("{}", prompt.display());
        // A failed flush only loses the prompt
        let _ = io::stdout().flush();
    }

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|_| Error::new(ErrorKind::InvalidArgument, prompt.unwrap_or(Value::Unit)))?;
    let trimmed = line.trim_end_matches(['\n', '\r']);
    Ok(Value::from(trimmed))
}

fn builtin_exit(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let code = match args.first() {
        Some(code) => code.as_int()?,
        None => 0,
    };
    tracing::debug!(code, "exit requested by program");
    std::process::exit(i32::try_from(code).unwrap_or(1))
}

fn read_source_file(path: &Value) -> Result<String, Error> {
    let name = path.as_string()?;
    fs::read_to_string(name).map_err(|e| {
        tracing::debug!(path = name, error = %e, "could not read file");
        Error::new(ErrorKind::InvalidArgument, path.clone())
    })
}

fn builtin_read_file(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [path] = take(args)?;
    read_source_file(&path).map(Value::String)
}

/// Answers 1 when the file was written, 0 otherwise
fn builtin_write_file(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [path, content] = take(args)?;
    let written = fs::write(path.as_string()?, content.as_string()?);
    if let Err(e) = &written {
        tracing::debug!(path = %path, error = %e, "could not write file");
    }
    Ok(Value::from(written.is_ok()))
}

/// Runs a file in a fresh root environment, then merges its bindings into the caller's.
/// The file sees the caller's `args`.
fn builtin_include(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [path] = take(args)?;
    let source = read_source_file(&path)?;
    tracing::debug!(path = %path, "including file");

    let mut included = Environment::new();
    if let Ok(program_args) = env.get(ARGS_BINDING) {
        included.set(ARGS_BINDING, program_args);
    }
    let result = run(&source, &mut included)?;
    env.combine(&included);
    Ok(result)
}

/// Uniform in `[low, high)`; integer bounds give an integer
fn builtin_random(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    let [low, high] = take(args)?;
    require_number(&low)?;
    require_number(&high)?;
    if !low.lt(&high)? {
        return Err(Error::new(ErrorKind::InvalidArgument, Value::List(vec![low, high])));
    }

    let mut rng = rand::thread_rng();
    if let (Value::Int(lo), Value::Int(hi)) = (&low, &high) {
        return Ok(Value::Int(rng.gen_range(*lo..*hi)));
    }

    // The sampler needs a finite span
    let (lo, hi) = (low.as_float()?, high.as_float()?);
    if !(lo.is_finite() && hi.is_finite() && (hi - lo).is_finite()) {
        return Err(Error::new(ErrorKind::InvalidArgument, Value::List(vec![low, high])));
    }
    Ok(Value::Float(rng.gen_range(lo..hi)))
}

/// Global registry of all builtin operations, built once at first use.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn function(name: &'static str, f: BuiltinFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::Function(f),
            arity,
        }
    }

    fn special_form(name: &'static str, f: BuiltinFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::SpecialForm(f),
            arity,
        }
    }

    use Arity::{Any, AtLeast, Exact, Range};

    vec![
        // Meta operations
        function("eval", builtin_eval, Exact(1)),
        function("type", builtin_type, Exact(1)),
        function("parse", builtin_parse, Exact(1)),
        // Special forms
        special_form("do", eval_do, Any),
        special_form("if", eval_if, Exact(3)),
        special_form("scope", eval_scope, Any),
        special_form("quote", eval_quote, Any),
        special_form("defun", eval_defun, Exact(3)),
        special_form("define", eval_define, Exact(2)),
        special_form("lambda", eval_lambda, Exact(2)),
        special_form("for", eval_for, AtLeast(2)),
        special_form("while", eval_while, AtLeast(1)),
        // Comparison operations
        function("=", builtin_eq, Exact(2)),
        function("!=", builtin_neq, Exact(2)),
        function(">", builtin_greater, Exact(2)),
        function("<", builtin_less, Exact(2)),
        function(">=", builtin_greater_eq, Exact(2)),
        function("<=", builtin_less_eq, Exact(2)),
        // Arithmetic operations
        function("+", builtin_sum, AtLeast(2)),
        function("-", builtin_subtract, Exact(2)),
        function("*", builtin_product, AtLeast(2)),
        function("/", builtin_divide, Exact(2)),
        function("%", builtin_remainder, Exact(2)),
        // List operations
        function("list", builtin_list, Any),
        function("push", builtin_push, AtLeast(1)),
        function("pop", builtin_pop, Exact(1)),
        function("head", builtin_head, Exact(1)),
        function("tail", builtin_tail, Exact(1)),
        function("first", builtin_head, Exact(1)),
        function("last", builtin_pop, Exact(1)),
        function("index", builtin_index, Exact(2)),
        function("insert", builtin_insert, Exact(3)),
        function("remove", builtin_remove, Exact(2)),
        function("len", builtin_len, Exact(1)),
        function("range", builtin_range, Exact(2)),
        // Functional operations
        function("map", builtin_map, Exact(2)),
        function("filter", builtin_filter, Exact(2)),
        function("reduce", builtin_reduce, Exact(3)),
        // IO operations
        function("exit", builtin_exit, Range(0, 1)),
        function("quit", builtin_exit, Range(0, 1)),
        function("print", builtin_print, AtLeast(1)),
        function("input", builtin_input, Range(0, 1)),
        function("include", builtin_include, Exact(1)),
        function("read-file", builtin_read_file, Exact(1)),
        function("write-file", builtin_write_file, Exact(2)),
        function("random", builtin_random, Exact(2)),
        // Formatting operations
        function("debug", builtin_debug, Exact(1)),
        function("display", builtin_display, Exact(1)),
        // Casting operations
        function("int", builtin_cast_to_int, Exact(1)),
        function("float", builtin_cast_to_float, Exact(1)),
    ]
});

/// Lazy static map from name to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        ops.iter().map(|op| (op.name, op)).collect()
    });

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its reserved name
pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_NAME.get(name).copied()
}
