use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{CoercionError, EvalError, TruthinessError};
use crate::record::Record;

/// The kinds of value an expression can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Bool,
    Str,
    Uint,
    BoolSlice,
    StrSlice,
    UintSlice,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Bool => "bool",
            Kind::Str => "string",
            Kind::Uint => "uint",
            Kind::BoolSlice => "[]bool",
            Kind::StrSlice => "[]string",
            Kind::UintSlice => "[]uint",
        })
    }
}

/// The result of evaluating an expression.
///
/// Slices are always homogeneous; there is no slice-of-slices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Str(String),
    Uint(u64),
    BoolSlice(Vec<bool>),
    StrSlice(Vec<String>),
    UintSlice(Vec<u64>),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Bool(_) => Kind::Bool,
            Value::Str(_) => Kind::Str,
            Value::Uint(_) => Kind::Uint,
            Value::BoolSlice(_) => Kind::BoolSlice,
            Value::StrSlice(_) => Kind::StrSlice,
            Value::UintSlice(_) => Kind::UintSlice,
        }
    }

    pub fn as_bool(&self) -> Result<bool, CoercionError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch(Kind::Bool)),
        }
    }

    pub fn as_str(&self) -> Result<&str, CoercionError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(other.mismatch(Kind::Str)),
        }
    }

    pub fn as_uint(&self) -> Result<u64, CoercionError> {
        match self {
            Value::Uint(u) => Ok(*u),
            other => Err(other.mismatch(Kind::Uint)),
        }
    }

    fn mismatch(&self, expected: Kind) -> CoercionError {
        CoercionError {
            expected,
            found: self.kind().to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "'{s}'"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::BoolSlice(items) => write_slice(f, Kind::BoolSlice, items, |f, b| write!(f, "{b}")),
            Value::StrSlice(items) => write_slice(f, Kind::StrSlice, items, |f, s| write!(f, "'{s}'")),
            Value::UintSlice(items) => write_slice(f, Kind::UintSlice, items, |f, u| write!(f, "{u}")),
        }
    }
}

fn write_slice<T>(
    f: &mut fmt::Formatter<'_>,
    kind: Kind,
    items: &[T],
    mut write_item: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    write!(f, "{kind}{{")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_item(f, item)?;
    }
    f.write_str("}")
}

impl TryFrom<Param> for Value {
    type Error = EvalError;

    /// Narrow a raw runtime value to one of the result kinds.
    fn try_from(param: Param) -> Result<Self, EvalError> {
        match param {
            Param::Bool(b) => Ok(Value::Bool(b)),
            Param::Str(s) => Ok(Value::Str(s)),
            Param::BoolSlice(items) => Ok(Value::BoolSlice(items)),
            Param::StrSlice(items) => Ok(Value::StrSlice(items)),
            Param::Int(_) | Param::IntSlice(_) | Param::List(_) => {
                // Lists are tried in the same kind order as equality.
                if let Ok(u) = param.coerce_uint() {
                    return Ok(Value::Uint(u));
                }
                if let Ok(items) = param.coerce_str_slice() {
                    return Ok(Value::StrSlice(items));
                }
                if let Ok(items) = param.coerce_uint_slice() {
                    return Ok(Value::UintSlice(items));
                }
                if let Ok(items) = param.coerce_bool_slice() {
                    return Ok(Value::BoolSlice(items));
                }
                Err(EvalError::UnsupportedResult(param.type_name()))
            }
            Param::Null | Param::Record(_) => Err(EvalError::UnsupportedResult(param.type_name())),
        }
    }
}

// ── Runtime values ──────────────────────────────────────────────────

/// An opaque runtime value supplied by the caller.
///
/// Integers of every native width are widened losslessly into `Int`;
/// whether they fit the unsigned representation is decided at coercion.
#[derive(Debug, Clone)]
pub enum Param {
    Null,
    Bool(bool),
    Str(String),
    Int(i128),
    BoolSlice(Vec<bool>),
    StrSlice(Vec<String>),
    IntSlice(Vec<i128>),
    /// A dynamically typed sequence, coerced element by element.
    List(Vec<Param>),
    Record(Arc<dyn Record>),
}

impl Param {
    /// Wrap a record so it can be placed in an [`Environment`].
    pub fn record(record: impl Record + 'static) -> Self {
        Param::Record(Arc::new(record))
    }

    /// Human readable name of the runtime type, used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Param::Null => "null".to_string(),
            Param::Bool(_) => "bool".to_string(),
            Param::Str(_) => "string".to_string(),
            Param::Int(i) if *i < 0 => "negative int".to_string(),
            Param::Int(_) => "int".to_string(),
            Param::BoolSlice(_) => "[]bool".to_string(),
            Param::StrSlice(_) => "[]string".to_string(),
            Param::IntSlice(_) => "[]int".to_string(),
            Param::List(_) => "list".to_string(),
            Param::Record(r) => r.type_name().to_string(),
        }
    }

    fn mismatch(&self, expected: Kind) -> CoercionError {
        CoercionError {
            expected,
            found: self.type_name(),
        }
    }

    pub fn coerce_str(&self) -> Result<&str, CoercionError> {
        match self {
            Param::Str(s) => Ok(s),
            other => Err(other.mismatch(Kind::Str)),
        }
    }

    /// Any integer width is accepted; signed values must be non-negative.
    pub fn coerce_uint(&self) -> Result<u64, CoercionError> {
        match self {
            Param::Int(i) => u64::try_from(*i).map_err(|_| self.mismatch(Kind::Uint)),
            other => Err(other.mismatch(Kind::Uint)),
        }
    }

    pub fn coerce_bool(&self) -> Result<bool, CoercionError> {
        match self {
            Param::Bool(b) => Ok(*b),
            other => Err(other.mismatch(Kind::Bool)),
        }
    }

    pub fn coerce_str_slice(&self) -> Result<Vec<String>, CoercionError> {
        match self {
            Param::StrSlice(items) => Ok(items.clone()),
            Param::List(items) => items
                .iter()
                .map(|p| p.coerce_str().map(str::to_string))
                .collect::<Result<_, _>>()
                .map_err(|_| self.mismatch(Kind::StrSlice)),
            other => Err(other.mismatch(Kind::StrSlice)),
        }
    }

    /// A single negative or non-integer element fails the whole coercion.
    pub fn coerce_uint_slice(&self) -> Result<Vec<u64>, CoercionError> {
        match self {
            Param::IntSlice(items) => items
                .iter()
                .map(|i| u64::try_from(*i))
                .collect::<Result<_, _>>()
                .map_err(|_| self.mismatch(Kind::UintSlice)),
            Param::List(items) => items
                .iter()
                .map(Param::coerce_uint)
                .collect::<Result<_, _>>()
                .map_err(|_| self.mismatch(Kind::UintSlice)),
            other => Err(other.mismatch(Kind::UintSlice)),
        }
    }

    pub fn coerce_bool_slice(&self) -> Result<Vec<bool>, CoercionError> {
        match self {
            Param::BoolSlice(items) => Ok(items.clone()),
            Param::List(items) => items
                .iter()
                .map(Param::coerce_bool)
                .collect::<Result<_, _>>()
                .map_err(|_| self.mismatch(Kind::BoolSlice)),
            other => Err(other.mismatch(Kind::BoolSlice)),
        }
    }

    /// Relaxed boolean interpretation used by `$and` / `$or`.
    ///
    /// Strings are truthy when non-empty and integers when non-zero.
    pub fn truthy(&self) -> Result<bool, TruthinessError> {
        match self {
            Param::Bool(b) => Ok(*b),
            Param::Str(s) => Ok(!s.is_empty()),
            Param::Int(i) => Ok(*i != 0),
            other => Err(TruthinessError(other.type_name())),
        }
    }
}

impl PartialEq for Param {
    /// Records compare by identity; everything else structurally.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Param::Null, Param::Null) => true,
            (Param::Bool(a), Param::Bool(b)) => a == b,
            (Param::Str(a), Param::Str(b)) => a == b,
            (Param::Int(a), Param::Int(b)) => a == b,
            (Param::BoolSlice(a), Param::BoolSlice(b)) => a == b,
            (Param::StrSlice(a), Param::StrSlice(b)) => a == b,
            (Param::IntSlice(a), Param::IntSlice(b)) => a == b,
            (Param::List(a), Param::List(b)) => a == b,
            (Param::Record(a), Param::Record(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Param {
    fn from(b: bool) -> Self {
        Param::Bool(b)
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Str(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::Str(s)
    }
}

impl From<Vec<bool>> for Param {
    fn from(items: Vec<bool>) -> Self {
        Param::BoolSlice(items)
    }
}

impl From<Vec<String>> for Param {
    fn from(items: Vec<String>) -> Self {
        Param::StrSlice(items)
    }
}

impl From<Vec<&str>> for Param {
    fn from(items: Vec<&str>) -> Self {
        Param::StrSlice(items.into_iter().map(str::to_string).collect())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Param::Null, Into::into)
    }
}

macro_rules! int_params {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Param {
                fn from(i: $ty) -> Self {
                    Param::Int(i128::from(i))
                }
            }

            impl From<Vec<$ty>> for Param {
                fn from(items: Vec<$ty>) -> Self {
                    Param::IntSlice(items.into_iter().map(i128::from).collect())
                }
            }
        )*
    };
}

int_params!(i8, i16, i32, i64, u8, u16, u32, u64);

// `usize`/`isize` have no `From` impl into `i128`; every supported target
// fits them in 64 bits.
impl From<usize> for Param {
    fn from(i: usize) -> Self {
        Param::Int(i as i128)
    }
}

impl From<isize> for Param {
    fn from(i: isize) -> Self {
        Param::Int(i as i128)
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => Param::Bool(b),
            Value::Str(s) => Param::Str(s),
            Value::Uint(u) => Param::Int(i128::from(u)),
            Value::BoolSlice(items) => Param::BoolSlice(items),
            Value::StrSlice(items) => Param::StrSlice(items),
            Value::UintSlice(items) => Param::IntSlice(items.into_iter().map(i128::from).collect()),
        }
    }
}

// ── Environment ─────────────────────────────────────────────────────

/// Named runtime values visible to one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: BTreeMap<String, Param>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a variable, returning the previous value bound to that name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Param>) -> Option<Param> {
        self.vars.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Param>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Environment::new();
        for (k, v) in iter {
            env.insert(k, v);
        }
        env
    }
}
