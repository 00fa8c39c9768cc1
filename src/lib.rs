//! A small policy-expression language for authorization conditions.
//!
//! Expression text such as `$and($eq(request.UserId, 7), $in(role, []string{'admin', 'owner'}))`
//! is parsed into an [`Expr`] tree and evaluated against an [`Environment`]
//! of caller-supplied values, producing a typed [`Value`].

pub mod ast;
pub mod error;
pub mod from_json;
pub mod interpreter;
pub mod parser;
pub mod record;
pub mod value;

pub use ast::{Expr, SliceKind};
pub use error::{CoercionError, Error, EvalError, ParseError, ParseErrorKind, TruthinessError};
pub use interpreter::Evaluator;
pub use record::{FieldAccessor, Record, StructuralAccessor};
pub use value::{Environment, Kind, Param, Value};

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ── Core API ───────────────────────────────────────────────────────

/// Parses and evaluates expressions in one step.
///
/// Holds no mutable state; clone it or share it by reference across threads.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    evaluator: Evaluator,
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter::default()
    }

    /// Resolve `var.field` references with a custom accessor.
    pub fn with_accessor(accessor: impl FieldAccessor + 'static) -> Self {
        Interpreter {
            evaluator: Evaluator::with_accessor(accessor),
        }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn parse(&self, expr: &str) -> Result<Expr> {
        Ok(parser::parse(expr)?)
    }

    /// Parse `expr` and evaluate it against `env`.
    pub fn eval(&self, expr: &str, env: &Environment) -> Result<Value> {
        let parsed = self.parse(expr)?;
        Ok(self.evaluator.evaluate(&parsed, env)?)
    }

    pub fn eval_bool(&self, expr: &str, env: &Environment) -> Result<bool> {
        let value = self.eval(expr, env)?;
        Ok(value.as_bool().map_err(EvalError::from)?)
    }

    pub fn eval_str(&self, expr: &str, env: &Environment) -> Result<String> {
        let value = self.eval(expr, env)?;
        Ok(value.as_str().map_err(EvalError::from)?.to_string())
    }

    pub fn eval_uint(&self, expr: &str, env: &Environment) -> Result<u64> {
        let value = self.eval(expr, env)?;
        Ok(value.as_uint().map_err(EvalError::from)?)
    }
}
