//! Expression tree produced by the parser and walked by the interpreter.
//!
//! Nodes are immutable once built and exclusively owned by their parent,
//! so a tree can be shared across threads and evaluated any number of times.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::value::Kind;

/// Element kind of a slice literal: `[]bool{..}`, `[]string{..}`, `[]uint{..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceKind {
    Bool,
    Str,
    Uint,
}

impl SliceKind {
    /// Opening text of the literal, including the brace.
    pub fn prefix(self) -> &'static str {
        match self {
            SliceKind::Bool => "[]bool{",
            SliceKind::Str => "[]string{",
            SliceKind::Uint => "[]uint{",
        }
    }

    /// Kind every element must evaluate to.
    pub fn element_kind(self) -> Kind {
        match self {
            SliceKind::Bool => Kind::Bool,
            SliceKind::Str => Kind::Str,
            SliceKind::Uint => Kind::Uint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `true`
    True,
    /// `false`
    False,
    /// `'text'` (no escapes; cannot contain `'`)
    Str(String),
    /// Base-10 digit run that fits in 32 bits.
    Uint(u32),
    /// `[]bool{..}`, `[]string{..}` or `[]uint{..}`
    Slice { kind: SliceKind, elements: Vec<Expr> },
    /// `$eq(left, right)`
    Eq(Box<Expr>, Box<Expr>),
    /// `$in(element, collection)`
    In { element: Box<Expr>, collection: Box<Expr> },
    /// `$and(a, b, ...)`; true when empty.
    And(Vec<Expr>),
    /// `$or(a, b, ...)`; false when empty.
    Or(Vec<Expr>),
    /// `name`
    Var(String),
    /// `name.field`
    Field { var: String, field: String },
}

impl Expr {
    /// Kind of a literal node, `None` for operators and references.
    pub fn literal_kind(&self) -> Option<Kind> {
        match self {
            Expr::True | Expr::False => Some(Kind::Bool),
            Expr::Str(_) => Some(Kind::Str),
            Expr::Uint(_) => Some(Kind::Uint),
            Expr::Slice { kind, .. } => Some(match kind {
                SliceKind::Bool => Kind::BoolSlice,
                SliceKind::Str => Kind::StrSlice,
                SliceKind::Uint => Kind::UintSlice,
            }),
            _ => None,
        }
    }
}

/// Renders the canonical source text, which parses back to an equal tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::True => f.write_str("true"),
            Expr::False => f.write_str("false"),
            Expr::Str(s) => write!(f, "'{s}'"),
            Expr::Uint(u) => write!(f, "{u}"),
            Expr::Slice { kind, elements } => {
                f.write_str(kind.prefix())?;
                write_list(f, elements)?;
                f.write_str("}")
            }
            Expr::Eq(left, right) => write!(f, "$eq({left}, {right})"),
            Expr::In {
                element,
                collection,
            } => write!(f, "$in({element}, {collection})"),
            Expr::And(operands) => {
                f.write_str("$and(")?;
                write_list(f, operands)?;
                f.write_str(")")
            }
            Expr::Or(operands) => {
                f.write_str("$or(")?;
                write_list(f, operands)?;
                f.write_str(")")
            }
            Expr::Var(name) => f.write_str(name),
            Expr::Field { var, field } => write!(f, "{var}.{field}"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl FromStr for Expr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse(s)
    }
}
