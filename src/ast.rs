//! This module defines the core value type shared by the reader and the evaluator.
//! The main enum, [`Value`], covers every runtime datum: numbers, strings, atoms,
//! quoted forms, lists, lambdas, builtins and unit. Lists double as the source
//! representation of programs, so the reader produces `Value`s and the evaluator
//! walks them directly.
//!
//! Values have plain value semantics: cloning a list copies it, and nothing is
//! shared between variants. Arithmetic, ordering and casts are fallible methods
//! returning [`Error`] with the offending value; the evaluator attaches the scope.
//! Ergonomic helpers such as [`val`], [`atom`] and [`nil`] are provided for building
//! values in code and tests.

use std::collections::BTreeMap;
use std::fmt;

use crate::builtinops::BuiltinOp;
use crate::{Error, ErrorKind};

/// Type alias for integer values in the interpreter
pub type IntType = i64;

/// Type alias for floating point values in the interpreter
pub type FloatType = f64;

/// A set of name to value bindings, ordered by name
pub type Bindings = BTreeMap<String, Value>;

/// Check if a character may appear in an atom
///
/// Atoms start with an alphabetic or punctuation character; digits are allowed
/// after the first character. Parentheses and both quote characters delimit
/// other syntax and never belong to an atom.
pub(crate) fn is_symbol_char(c: char) -> bool {
    (c.is_alphabetic() || c.is_ascii_punctuation()) && !matches!(c, '(' | ')' | '"' | '\'')
}

/// Core value type of the interpreter
///
/// To build values, use the helper functions:
/// - `val(42)`, `val(2.5)`, `val("text")` for literals
/// - `atom("name")` for atoms, `nil()` for the empty list
/// - `val([1, 2, 3])` for homogeneous lists, `val(vec![atom("f"), val(1)])` for mixed ones
#[derive(Clone)]
pub enum Value {
    /// The canonical "no value", also absorbing every arithmetic operator
    Unit,
    Int(IntType),
    Float(FloatType),
    /// Inert text data
    String(String),
    /// An unevaluated reference to a binding
    Atom(String),
    /// Suppresses evaluation of its single child
    Quote(Box<Value>),
    /// The universal compound, also used as the source form of calls
    List(Vec<Value>),
    /// User-defined closure; `captured` holds the free variables of `body`
    /// as they were bound when the lambda was created
    Lambda {
        params: Vec<String>,
        body: Box<Value>,
        captured: Bindings,
    },
    /// A native operation from the builtin registry
    Builtin(&'static BuiltinOp),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "Unit"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(n) => write!(f, "Float({n:?})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Atom(s) => write!(f, "Atom({s})"),
            Value::Quote(inner) => write!(f, "Quote({inner:?})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Lambda { params, body, .. } => {
                write!(f, "Lambda(params={params:?}, body={body:?})")
            }
            Value::Builtin(op) => write!(f, "Builtin({})", op.name),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(IntType::from(b))
    }
}

impl From<FloatType> for Value {
    fn from(n: FloatType) -> Self {
        Value::Float(n)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Unit
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Int(IntType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper function for creating atoms
pub fn atom<S: AsRef<str>>(name: S) -> Value {
    Value::Atom(name.as_ref().to_owned())
}

/// Helper function for creating values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating the empty list
pub fn nil() -> Value {
    Value::List(vec![])
}

#[derive(Clone, Copy, PartialEq)]
enum RenderMode {
    /// User-facing: strings are written raw
    Display,
    /// Round-trippable through the reader: strings are quoted and escaped
    Debug,
}

struct Rendered<'a>(&'a Value, RenderMode);

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Rendered(value, mode) = *self;
        match value {
            Value::Unit => write!(f, "@"),
            Value::Int(n) => write!(f, "{n}"),
            // `-0` would read back as the integer 0
            Value::Float(n) if mode == RenderMode::Debug && *n == 0.0 && n.is_sign_negative() => {
                write!(f, "-0.0")
            }
            Value::Float(n) => write!(f, "{n}"),
            Value::Atom(name) => write!(f, "{name}"),
            Value::String(s) if mode == RenderMode::Display => write!(f, "{s}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            // Children of compound values always use the debug form
            Value::Quote(inner) => write!(f, "'{}", inner.debug()),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", Rendered(item, RenderMode::Debug))?;
                }
                write!(f, ")")
            }
            Value::Lambda { params, body, .. } => {
                write!(f, "(lambda (")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") {})", body.debug())
            }
            Value::Builtin(op) => write!(f, "<builtin:{}>", op.name),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Rendered(self, RenderMode::Display))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            // The integer side is promoted before comparing
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as FloatType) == *b
            }
            (Value::String(a), Value::String(b)) | (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Quote(a), Value::Quote(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Lambdas compare by shape; the captured snapshot is not part of identity
            (
                Value::Lambda {
                    params: p1,
                    body: b1,
                    ..
                },
                Value::Lambda {
                    params: p2,
                    body: b2,
                    ..
                },
            ) => p1 == p2 && b1 == b2,
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            _ => false, // Different variants are never equal
        }
    }
}

/// Generates a binary arithmetic method following the shared contract:
/// unit absorbs, Int op Int stays Int, any Float promotes both sides.
macro_rules! numeric_op {
    ($name:ident, $int_op:expr, $float_op:expr) => {
        pub fn $name(&self, other: &Value) -> Result<Value, Error> {
            if matches!(self, Value::Unit) || matches!(other, Value::Unit) {
                return Ok(Value::Unit);
            }
            self.numeric_binop(other, $int_op, $float_op)
        }
    };
}

impl Value {
    /// Wrap a value in a quote
    pub fn quote(inner: Value) -> Value {
        Value::Quote(Box::new(inner))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Truthiness: anything not equal to integer zero
    pub fn as_bool(&self) -> bool {
        *self != Value::Int(0)
    }

    /// Integer view of a number; floats truncate toward zero
    pub fn as_int(&self) -> Result<IntType, Error> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Float(n) => Ok(*n as IntType),
            _ => Err(Error::new(ErrorKind::BadCast, self.clone())),
        }
    }

    /// Float view of a number
    pub fn as_float(&self) -> Result<FloatType, Error> {
        match self {
            Value::Float(n) => Ok(*n),
            Value::Int(n) => Ok(*n as FloatType),
            _ => Err(Error::new(ErrorKind::BadCast, self.clone())),
        }
    }

    pub fn as_string(&self) -> Result<&str, Error> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(Error::new(ErrorKind::BadCast, self.clone())),
        }
    }

    pub fn as_atom(&self) -> Result<&str, Error> {
        match self {
            Value::Atom(name) => Ok(name),
            _ => Err(Error::new(ErrorKind::BadCast, self.clone())),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], Error> {
        match self {
            Value::List(items) => Ok(items),
            _ => Err(Error::new(ErrorKind::BadCast, self.clone())),
        }
    }

    /// Owned variant of [`Value::as_list`]
    pub fn into_list(self) -> Result<Vec<Value>, Error> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(Error::new(ErrorKind::BadCast, other)),
        }
    }

    /// Cast to an `Int` value (the `int` builtin)
    pub fn cast_to_int(&self) -> Result<Value, Error> {
        self.as_int().map(Value::Int)
    }

    /// Cast to a `Float` value (the `float` builtin)
    pub fn cast_to_float(&self) -> Result<Value, Error> {
        self.as_float().map(Value::Float)
    }

    /// Append an item to the end of this list
    pub fn push(&mut self, item: Value) -> Result<(), Error> {
        match self {
            Value::List(items) => {
                items.push(item);
                Ok(())
            }
            _ => Err(Error::new(ErrorKind::MismatchedTypes, self.clone())),
        }
    }

    /// Remove and return the last item of this list
    pub fn pop(&mut self) -> Result<Value, Error> {
        match self {
            Value::List(items) => match items.pop() {
                Some(last) => Ok(last),
                None => Err(Error::new(ErrorKind::IndexOutOfRange, self.clone())),
            },
            _ => Err(Error::new(ErrorKind::MismatchedTypes, self.clone())),
        }
    }

    /// First item of this list
    pub fn head(&self) -> Result<Value, Error> {
        self.as_list()?
            .first()
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::IndexOutOfRange, self.clone()))
    }

    /// Every item but the first; empty when the list has at most one item
    pub fn tail(&self) -> Result<Value, Error> {
        let items = self.as_list()?;
        Ok(Value::List(items.iter().skip(1).cloned().collect()))
    }

    /// Name of this value's type as reported by the `type` builtin
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Quote(_) => "quote",
            Value::Atom(_) => "atom",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::List(_) => "list",
            Value::String(_) => "string",
            // Both kinds of callable share one type name
            Value::Lambda { .. } | Value::Builtin(_) => "function",
            Value::Unit => "unit",
        }
    }

    /// User-facing rendering: strings are written without quotes
    pub fn display(&self) -> String {
        Rendered(self, RenderMode::Display).to_string()
    }

    /// Reader-compatible rendering: strings are quoted and escaped
    pub fn debug(&self) -> String {
        Rendered(self, RenderMode::Debug).to_string()
    }

    /// Shared numeric path for every binary arithmetic operator
    fn numeric_binop(
        &self,
        other: &Value,
        int_op: fn(IntType, IntType) -> Option<IntType>,
        float_op: fn(FloatType, FloatType) -> FloatType,
    ) -> Result<Value, Error> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => int_op(*a, *b)
                .map(Value::Int)
                .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, other.clone())),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                Ok(Value::Float(float_op(self.as_float()?, other.as_float()?)))
            }
            _ => Err(Error::new(ErrorKind::InvalidBinOp, self.clone())),
        }
    }

    /// Addition; also concatenates two strings or two lists
    pub fn add(&self, other: &Value) -> Result<Value, Error> {
        match (self, other) {
            (Value::Unit, _) | (_, Value::Unit) => Ok(Value::Unit),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                let mut joined = a.clone();
                joined.extend(b.iter().cloned());
                Ok(Value::List(joined))
            }
            _ => self.numeric_binop(
                other,
                |a, b| Some(a.wrapping_add(b)),
                |a, b| a + b,
            ),
        }
    }

    numeric_op!(sub, |a, b| Some(a.wrapping_sub(b)), |a, b| a - b);
    numeric_op!(mul, |a, b| Some(a.wrapping_mul(b)), |a, b| a * b);
    // Truncating division; zero divisors and i64::MIN / -1 are rejected
    numeric_op!(div, IntType::checked_div, |a, b| a / b);
    // Float remainder has fmod semantics: the sign follows the dividend
    numeric_op!(rem, IntType::checked_rem, |a, b| a % b);

    /// Strict ordering; only numbers can be ordered
    pub fn lt(&self, other: &Value) -> Result<bool, Error> {
        if !other.is_number() {
            return Err(Error::new(ErrorKind::InvalidBinOp, self.clone()));
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a < b),
            (Value::Int(_) | Value::Float(_), _) => Ok(self.as_float()? < other.as_float()?),
            _ => Err(Error::new(ErrorKind::InvalidOrder, self.clone())),
        }
    }

    pub fn le(&self, other: &Value) -> Result<bool, Error> {
        Ok(self == other || self.lt(other)?)
    }

    pub fn gt(&self, other: &Value) -> Result<bool, Error> {
        Ok(!self.le(other)?)
    }

    pub fn ge(&self, other: &Value) -> Result<bool, Error> {
        Ok(!self.lt(other)?)
    }
}
