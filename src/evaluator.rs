use std::collections::BTreeSet;

use crate::ast::{Bindings, Value};
use crate::builtinops::{find_builtin_op, take};
use crate::parser::parse;
use crate::{ARGS_BINDING, ENDL, Error, ErrorKind};

/// Value of a name that cannot be rebound: a builtin or the `endl` constant
fn reserved_value(name: &str) -> Option<Value> {
    if name == ENDL {
        return Some(Value::from("\n"));
    }
    find_builtin_op(name).map(Value::Builtin)
}

fn is_reserved(name: &str) -> bool {
    name == ENDL || find_builtin_op(name).is_some()
}

/// Environment for variable bindings
///
/// A frame owns its local bindings and borrows its parent for lookups only.
/// Writes always land in the local frame, so a call never mutates its caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Environment<'p> {
    bindings: Bindings,
    parent: Option<&'p Environment<'p>>,
}

impl<'p> Environment<'p> {
    pub fn new() -> Self {
        Environment {
            bindings: Bindings::new(),
            parent: None,
        }
    }

    /// A child frame seeded with `bindings`, falling back to `parent` on lookup
    pub(crate) fn with_parent(bindings: Bindings, parent: &'p Environment<'p>) -> Self {
        Environment {
            bindings,
            parent: Some(parent),
        }
    }

    /// Bindings of this frame only
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Bind a name in this frame
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Resolve a name: reserved names first, then this frame, then the parent chain
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        if let Some(value) = reserved_value(name) {
            return Ok(value);
        }
        self.lookup(name).cloned().ok_or_else(|| {
            Error::in_scope(
                ErrorKind::AtomNotDefined,
                Value::Atom(name.to_owned()),
                &self.bindings,
            )
        })
    }

    /// Whether [`Environment::get`] would succeed for `name`
    pub fn has(&self, name: &str) -> bool {
        is_reserved(name) || self.lookup(name).is_some()
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings
            .get(name)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }

    /// Copy another frame's bindings into this one; the other frame wins on conflicts
    pub fn combine(&mut self, other: &Environment<'_>) {
        for (name, value) in &other.bindings {
            self.bindings.insert(name.clone(), value.clone());
        }
    }

    /// Get all bindings in this environment and its parents
    /// Returns a map sorted by name, inner frames shadowing outer ones
    pub fn get_all_bindings(&self) -> Bindings {
        // Start with parent bindings (so they can be overridden by local bindings)
        let mut bindings = self
            .parent
            .map(Environment::get_all_bindings)
            .unwrap_or_default();

        // Add/override with local bindings
        for (name, value) in &self.bindings {
            bindings.insert(name.clone(), value.clone());
        }
        bindings
    }
}

/// Evaluate an expression
pub fn eval(expr: &Value, env: &mut Environment<'_>) -> Result<Value, Error> {
    match expr {
        Value::Quote(inner) => Ok((**inner).clone()),

        // Variable lookup
        Value::Atom(name) => env.get(name),

        Value::List(elements) => eval_list(expr, elements, env),

        // Self-evaluating forms
        Value::Unit
        | Value::Int(_)
        | Value::Float(_)
        | Value::String(_)
        | Value::Lambda { .. }
        | Value::Builtin(_) => Ok(expr.clone()),
    }
}

/// Evaluate a list of argument expressions left to right
fn eval_args(args: &[Value], env: &mut Environment<'_>) -> Result<Vec<Value>, Error> {
    args.iter().map(|arg| eval(arg, env)).collect()
}

/// Evaluate a call form: the head first, then the arguments unless the head is a special form
fn eval_list(expr: &Value, elements: &[Value], env: &mut Environment<'_>) -> Result<Value, Error> {
    match elements {
        [] => Err(Error::in_scope(
            ErrorKind::EvalEmptyList,
            expr.clone(),
            env.bindings(),
        )),

        [func_expr, arg_exprs @ ..] => {
            let func = eval(func_expr, env)?;
            let args = match &func {
                Value::Builtin(op) if op.is_special_form() => arg_exprs.to_vec(),
                _ => eval_args(arg_exprs, env)?,
            };
            apply(&func, args, env)
        }
    }
}

/// Apply a callable to arguments in the caller's environment
pub fn apply(func: &Value, args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    match func {
        Value::Lambda {
            params,
            body,
            captured,
        } => {
            if args.len() != params.len() {
                let kind = if args.len() < params.len() {
                    ErrorKind::TooFewArgs
                } else {
                    ErrorKind::TooManyArgs
                };
                return Err(Error::in_scope(kind, Value::List(args), env.bindings()));
            }
            tracing::trace!(params = ?params, "applying lambda");

            let mut frame = Environment::with_parent(captured.clone(), env);
            for (param, arg) in params.iter().zip(args) {
                frame.set(param.clone(), arg);
            }
            eval(body, &mut frame)
        }

        Value::Builtin(op) => {
            op.arity
                .validate(args.len())
                .map_err(|kind| Error::in_scope(kind, func.clone(), env.bindings()))?;
            tracing::trace!(name = op.name, args = args.len(), "applying builtin");

            (op.function())(args, env).map_err(|err| err.or_scope(env.bindings()))
        }

        _ => Err(Error::in_scope(
            ErrorKind::CallNonFunction,
            func.clone(),
            env.bindings(),
        )),
    }
}

/// Collect every atom name mentioned anywhere in `expr`, quoted or not
fn collect_atoms<'v>(expr: &'v Value, names: &mut BTreeSet<&'v str>) {
    match expr {
        Value::Atom(name) => {
            names.insert(name);
        }
        Value::Quote(inner) => collect_atoms(inner, names),
        Value::List(items) => items.iter().for_each(|item| collect_atoms(item, names)),
        _ => {}
    }
}

/// Build a closure over the current bindings of the free names its body mentions
fn make_lambda(params: &Value, body: &Value, env: &Environment<'_>) -> Result<Value, Error> {
    let Value::List(param_list) = params else {
        return Err(Error::in_scope(
            ErrorKind::InvalidLambda,
            params.clone(),
            env.bindings(),
        ));
    };

    let params = param_list
        .iter()
        .map(|param| match param {
            Value::Atom(name) => Ok(name.clone()),
            other => Err(Error::in_scope(
                ErrorKind::InvalidLambda,
                other.clone(),
                env.bindings(),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut mentioned = BTreeSet::new();
    collect_atoms(body, &mut mentioned);

    let mut captured = Bindings::new();
    for name in mentioned {
        // Reserved names resolve without a snapshot
        if is_reserved(name) || params.iter().any(|p| p == name) {
            continue;
        }
        if let Some(value) = env.lookup(name) {
            captured.insert(name.to_owned(), value.clone());
        }
    }

    Ok(Value::Lambda {
        params,
        body: Box::new(body.clone()),
        captured,
    })
}

//
// Special forms
//
// Each receives its arguments unevaluated; arity has already been checked by `apply`.
//

/// `(if cond then else)`
pub(crate) fn eval_if(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [condition, then_expr, else_expr] = take(args)?;
    if eval(&condition, env)?.as_bool() {
        eval(&then_expr, env)
    } else {
        eval(&else_expr, env)
    }
}

/// Evaluate forms in order, returning the last result or unit
fn eval_sequence(forms: &[Value], env: &mut Environment<'_>) -> Result<Value, Error> {
    let mut result = Value::Unit;
    for form in forms {
        result = eval(form, env)?;
    }
    Ok(result)
}

/// `(do forms...)` in the current environment
pub(crate) fn eval_do(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    eval_sequence(&args, env)
}

/// `(scope forms...)` in a child environment discarded afterwards
pub(crate) fn eval_scope(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let mut child = Environment::with_parent(Bindings::new(), env);
    eval_sequence(&args, &mut child)
}

/// `(quote forms...)` yields its arguments as a list
pub(crate) fn eval_quote(args: Vec<Value>, _env: &mut Environment<'_>) -> Result<Value, Error> {
    Ok(Value::List(args))
}

pub(crate) fn eval_lambda(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [params, body] = take(args)?;
    make_lambda(&params, &body, env)
}

/// `(defun name (params...) body)` binds and returns the closure
pub(crate) fn eval_defun(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [name, params, body] = take(args)?;
    let lambda = make_lambda(&params, &body, env)?;
    env.set(name.display(), lambda.clone());
    Ok(lambda)
}

/// `(define name expr)` binds and returns the value of `expr`
pub(crate) fn eval_define(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [name, expr] = take(args)?;
    let value = eval(&expr, env)?;
    env.set(name.display(), value.clone());
    Ok(value)
}

/// `(for var list body...)`; the loop variable stays bound afterwards
pub(crate) fn eval_for(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [var, list_expr, body @ ..] = args.as_slice() else {
        return Err(Error::new(ErrorKind::InternalError, Value::List(args)));
    };
    let var = var.as_atom()?;

    let mut result = Value::Unit;
    for item in eval(list_expr, env)?.into_list()? {
        env.set(var, item);
        result = eval_sequence(body, env)?;
    }
    Ok(result)
}

/// `(while cond body...)`
pub(crate) fn eval_while(args: Vec<Value>, env: &mut Environment<'_>) -> Result<Value, Error> {
    let [condition, body @ ..] = args.as_slice() else {
        return Err(Error::new(ErrorKind::InternalError, Value::List(args)));
    };

    let mut result = Value::Unit;
    while eval(condition, env)?.as_bool() {
        result = eval_sequence(body, env)?;
    }
    Ok(result)
}

/// Create the root environment every program starts in
pub fn create_global_env() -> Environment<'static> {
    let mut env = Environment::new();
    env.set(ARGS_BINDING, Value::List(Vec::new()));
    env
}

/// Parse `source` and evaluate each top-level form in order.
///
/// Returns the value of the last form, or unit for an empty program. Bindings
/// made by the program remain in `env` afterwards.
#[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
pub fn run(source: &str, env: &mut Environment<'_>) -> Result<Value, Error> {
    let forms = parse(source)?;
    tracing::debug!(forms = forms.len(), "parsed program");
    eval_sequence(&forms, env)
}
