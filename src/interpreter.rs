use std::sync::Arc;

use tracing::{debug, instrument, trace, Level};

use crate::ast::{Expr, SliceKind};
use crate::error::EvalError;
use crate::record::{FieldAccessor, StructuralAccessor};
use crate::value::{Environment, Param, Value};

/// Walks an expression tree against an [`Environment`].
///
/// Holds no per-evaluation state, so one evaluator can be shared freely
/// between threads.
#[derive(Debug, Clone)]
pub struct Evaluator {
    accessor: Arc<dyn FieldAccessor>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::with_accessor(StructuralAccessor)
    }
}

/// Evaluate an expression with the default structural field accessor.
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
    Evaluator::default().evaluate(expr, env)
}

impl Evaluator {
    pub fn new() -> Self {
        Evaluator::default()
    }

    /// Use `accessor` to resolve `var.field` references.
    pub fn with_accessor(accessor: impl FieldAccessor + 'static) -> Self {
        Evaluator {
            accessor: Arc::new(accessor),
        }
    }

    pub fn accessor(&self) -> &dyn FieldAccessor {
        self.accessor.as_ref()
    }

    #[instrument(level = Level::TRACE, skip_all, fields(expr = %expr))]
    pub fn evaluate(&self, expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
        let result = self.eval(expr, env)?;
        Value::try_from(result)
    }

    /// Evaluate to a raw runtime value; coercion happens at the consuming node.
    fn eval(&self, expr: &Expr, env: &Environment) -> Result<Param, EvalError> {
        match expr {
            Expr::True => Ok(Param::Bool(true)),
            Expr::False => Ok(Param::Bool(false)),
            Expr::Str(s) => Ok(Param::Str(s.clone())),
            Expr::Uint(u) => Ok(Param::Int(i128::from(*u))),
            Expr::Slice { kind, elements } => self.eval_slice(*kind, elements, env),
            Expr::Eq(left, right) => self.eval_eq(left, right, env),
            Expr::In {
                element,
                collection,
            } => self.eval_in(element, collection, env),
            Expr::And(operands) => self.eval_and(operands, env),
            Expr::Or(operands) => self.eval_or(operands, env),
            Expr::Var(name) => lookup(env, name).cloned(),
            Expr::Field { var, field } => {
                let record = lookup(env, var)?;
                self.accessor.read_field(record, field)
            }
        }
    }

    fn eval_slice(
        &self,
        kind: SliceKind,
        elements: &[Expr],
        env: &Environment,
    ) -> Result<Param, EvalError> {
        let element_error = |p: &Param| EvalError::SliceElement {
            kind: kind.element_kind(),
            found: p.type_name(),
        };

        // Each element is evaluated and coerced before the next one is touched.
        match kind {
            SliceKind::Bool => elements
                .iter()
                .map(|e| {
                    let p = self.eval(e, env)?;
                    p.coerce_bool().map_err(|_| element_error(&p))
                })
                .collect::<Result<_, _>>()
                .map(Param::BoolSlice),
            SliceKind::Str => elements
                .iter()
                .map(|e| {
                    let p = self.eval(e, env)?;
                    p.coerce_str().map(str::to_string).map_err(|_| element_error(&p))
                })
                .collect::<Result<_, _>>()
                .map(Param::StrSlice),
            SliceKind::Uint => elements
                .iter()
                .map(|e| {
                    let p = self.eval(e, env)?;
                    p.coerce_uint().map(i128::from).map_err(|_| element_error(&p))
                })
                .collect::<Result<_, _>>()
                .map(Param::IntSlice),
        }
    }

    /// The left operand picks the comparison kind (string, then uint, then
    /// bool); the right operand must coerce to the same kind.
    fn eval_eq(&self, left: &Expr, right: &Expr, env: &Environment) -> Result<Param, EvalError> {
        let left = self.eval(left, env)?;
        let right = self.eval(right, env)?;
        let mismatch = || EvalError::MismatchedTypes {
            context: "equality comparison",
            left: left.type_name(),
            right: right.type_name(),
        };

        let equal = if let Ok(l) = left.coerce_str() {
            l == right.coerce_str().map_err(|_| mismatch())?
        } else if let Ok(l) = left.coerce_uint() {
            l == right.coerce_uint().map_err(|_| mismatch())?
        } else if let Ok(l) = left.coerce_bool() {
            l == right.coerce_bool().map_err(|_| mismatch())?
        } else {
            return Err(EvalError::UnsupportedType {
                context: "equality comparison",
                found: left.type_name(),
            });
        };
        Ok(Param::Bool(equal))
    }

    fn eval_in(
        &self,
        element: &Expr,
        collection: &Expr,
        env: &Environment,
    ) -> Result<Param, EvalError> {
        let collection = self.eval(collection, env)?;
        let query = self.eval(element, env)?;
        let mismatch = || EvalError::MismatchedTypes {
            context: "$in()",
            left: query.type_name(),
            right: collection.type_name(),
        };

        let found = if let Ok(q) = query.coerce_str() {
            let items = collection.coerce_str_slice().map_err(|_| mismatch())?;
            items.iter().any(|s| s == q)
        } else if let Ok(q) = query.coerce_uint() {
            let items = collection.coerce_uint_slice().map_err(|_| mismatch())?;
            items.contains(&q)
        } else if let Ok(q) = query.coerce_bool() {
            let items = collection.coerce_bool_slice().map_err(|_| mismatch())?;
            items.contains(&q)
        } else {
            return Err(EvalError::UnexpectedQueryType(query.type_name()));
        };
        Ok(Param::Bool(found))
    }

    /// An operand without a truthiness counts as false; errors from
    /// evaluating the operand itself still abort.
    fn eval_and(&self, operands: &[Expr], env: &Environment) -> Result<Param, EvalError> {
        for (idx, operand) in operands.iter().enumerate() {
            let value = self.eval(operand, env)?;
            match value.truthy() {
                Ok(true) => {}
                Ok(false) => {
                    trace!(idx, "$and short-circuit");
                    return Ok(Param::Bool(false));
                }
                Err(err) => {
                    debug!(idx, %err, "$and operand treated as false");
                    return Ok(Param::Bool(false));
                }
            }
        }
        Ok(Param::Bool(true))
    }

    fn eval_or(&self, operands: &[Expr], env: &Environment) -> Result<Param, EvalError> {
        for (idx, operand) in operands.iter().enumerate() {
            let value = self.eval(operand, env)?;
            match value.truthy() {
                Ok(true) => {
                    trace!(idx, "$or short-circuit");
                    return Ok(Param::Bool(true));
                }
                Ok(false) => {}
                Err(err) => debug!(idx, %err, "$or operand treated as false"),
            }
        }
        Ok(Param::Bool(false))
    }
}

fn lookup<'e>(env: &'e Environment, name: &str) -> Result<&'e Param, EvalError> {
    env.get(name)
        .ok_or_else(|| EvalError::VariableNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_record;
    use crate::parser::parse;

    #[derive(Debug)]
    #[allow(non_snake_case)]
    struct Flag {
        Value: bool,
    }

    impl_record!(Flag { Value });

    fn eval(input: &str, env: &Environment) -> Result<Value, EvalError> {
        evaluate(&parse(input).unwrap(), env)
    }

    #[test]
    fn and_or_swallow_truthiness_errors() {
        let env = Environment::new()
            .with("rec", Param::record(Flag { Value: true }))
            .with("nothing", Param::Null);

        assert_eq!(eval("$and(true, rec)", &env), Ok(Value::Bool(false)));
        assert_eq!(eval("$and(nothing)", &env), Ok(Value::Bool(false)));
        assert_eq!(eval("$or(rec, nothing)", &env), Ok(Value::Bool(false)));
        assert_eq!(eval("$or(rec, 'yes')", &env), Ok(Value::Bool(true)));
    }

    #[test]
    fn and_or_propagate_evaluation_errors() {
        let env = Environment::new();
        assert_eq!(
            eval("$and(true, missing)", &env),
            Err(EvalError::VariableNotFound("missing".to_string()))
        );
        assert_eq!(
            eval("$or(false, missing)", &env),
            Err(EvalError::VariableNotFound("missing".to_string()))
        );
    }

    #[test]
    fn and_or_stop_at_first_decisive_operand() {
        let env = Environment::new();
        assert_eq!(eval("$and(false, missing)", &env), Ok(Value::Bool(false)));
        assert_eq!(eval("$or(1, missing)", &env), Ok(Value::Bool(true)));
    }

    #[test]
    fn slice_elements_from_environment() {
        let env = Environment::new().with("n", 5i64).with("neg", -5i64).with("s", "x");
        assert_eq!(eval("[]uint{1, n}", &env), Ok(Value::UintSlice(vec![1, 5])));
        assert_eq!(
            eval("[]uint{1, neg}", &env),
            Err(EvalError::SliceElement {
                kind: crate::value::Kind::Uint,
                found: "negative int".to_string(),
            })
        );
        assert_eq!(eval("[]string{s}", &env), Ok(Value::StrSlice(vec!["x".to_string()])));
        assert!(eval("[]bool{s}", &env).is_err());
        assert_eq!(
            eval("[]bool{missing}", &env),
            Err(EvalError::VariableNotFound("missing".to_string()))
        );
    }

    #[test]
    fn slice_reports_first_failing_element() {
        let env = Environment::new().with("s", "x").with("neg", -1i64);
        assert_eq!(
            eval("[]bool{s, missing}", &env),
            Err(EvalError::SliceElement {
                kind: crate::value::Kind::Bool,
                found: "string".to_string(),
            })
        );
        assert_eq!(
            eval("[]uint{neg, missing}", &env),
            Err(EvalError::SliceElement {
                kind: crate::value::Kind::Uint,
                found: "negative int".to_string(),
            })
        );
        assert_eq!(
            eval("[]string{missing, neg}", &env),
            Err(EvalError::VariableNotFound("missing".to_string()))
        );
    }

    #[derive(Debug)]
    struct UpperCaseAccessor;

    impl FieldAccessor for UpperCaseAccessor {
        fn read_field(&self, value: &Param, name: &str) -> Result<Param, EvalError> {
            let s = value.coerce_str()?;
            match name {
                "upper" => Ok(Param::Str(s.to_uppercase())),
                _ => Err(EvalError::NoSuchField {
                    field: name.to_string(),
                    record: "string".to_string(),
                }),
            }
        }
    }

    #[test]
    fn custom_field_accessor() {
        let evaluator = Evaluator::with_accessor(UpperCaseAccessor);
        let env = Environment::new().with("name", "alice");
        let expr = parse("$eq(name.upper, 'ALICE')").unwrap();
        assert_eq!(evaluator.evaluate(&expr, &env), Ok(Value::Bool(true)));

        assert!(format!("{:?}", evaluator.accessor()).contains("UpperCaseAccessor"));

        let expr = parse("name.lower").unwrap();
        assert!(matches!(
            evaluator.evaluate(&expr, &env),
            Err(EvalError::NoSuchField { .. })
        ));
    }
}
