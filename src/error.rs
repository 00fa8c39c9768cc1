use std::fmt;

use crate::value::Kind;

/// What went wrong while parsing expression text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("expected `{0}`")]
    Expected(&'static str),
    #[error("expected `[]bool{{`, `[]string{{` or `[]uint{{`")]
    ExpectedSliceType,
    #[error("expected closing quote")]
    UnterminatedString,
    #[error("invalid integer literal: {0}")]
    InvalidInteger(String),
    #[error("expected digit")]
    ExpectedDigit,
    #[error("invalid struct field reference: {0}")]
    InvalidFieldRef(String),
    #[error("invalid terminator for expression sequence")]
    InvalidSequenceTerminator,
    #[error("expected {0} literal in slice")]
    SliceElementKind(Kind),
}

/// A parse error and the byte offset at which it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// 0-based byte offset from the start of the expression text
    pub offset: usize,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, offset: usize) -> Self {
        ParseError { kind, offset }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.offset)
    }
}

impl std::error::Error for ParseError {}

/// A runtime value could not be interpreted as the requested kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, got {found}")]
pub struct CoercionError {
    pub expected: Kind,
    /// Type name of the offending runtime value.
    pub found: String,
}

/// The value has no boolean interpretation, not even a relaxed one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot determine truthiness of {0}")]
pub struct TruthinessError(pub String);

/// Failure while walking a syntactically valid expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("variable {0} not found")]
    VariableNotFound(String),
    #[error("unsupported type in {context}: {found}")]
    UnsupportedType { context: &'static str, found: String },
    #[error("mismatched types in {context}: {left} != {right}")]
    MismatchedTypes {
        context: &'static str,
        left: String,
        right: String,
    },
    #[error("unexpected type for $in() query: {0}")]
    UnexpectedQueryType(String),
    #[error("no such field: {field} in {record}")]
    NoSuchField { field: String, record: String },
    #[error("unexpected type in {kind} slice: {found}")]
    SliceElement { kind: Kind, found: String },
    #[error("unsupported result type: {0}")]
    UnsupportedResult(String),
    #[error(transparent)]
    Coercion(#[from] CoercionError),
}

/// Any failure surfaced by the [`Interpreter`](crate::Interpreter) facade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
}
