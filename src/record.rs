//! Structural field access for record-shaped runtime values.
//!
//! Rust has no runtime reflection, so a record exposes its fields through
//! the [`Record`] trait. Implementations are either generated from a field
//! list with [`impl_record!`](crate::impl_record) or come from serialized
//! data (see [`JsonRecord`](crate::from_json::JsonRecord)).

use std::fmt;

use tracing::trace;

use crate::error::EvalError;
use crate::value::Param;

/// A record whose named fields can be read by an expression.
pub trait Record: fmt::Debug + Send + Sync {
    /// Name used in error messages.
    fn type_name(&self) -> &str;

    /// Read the field with this exact name, or `None` if there is no such field.
    fn field(&self, name: &str) -> Option<Param>;
}

/// Reads a named field off an arbitrary runtime value.
///
/// Hosts can plug in a schema-aware implementation; the evaluator only
/// depends on this contract.
pub trait FieldAccessor: fmt::Debug + Send + Sync {
    fn read_field(&self, value: &Param, name: &str) -> Result<Param, EvalError>;
}

/// Default accessor: only [`Param::Record`] values have fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralAccessor;

impl FieldAccessor for StructuralAccessor {
    fn read_field(&self, value: &Param, name: &str) -> Result<Param, EvalError> {
        let Param::Record(record) = value else {
            return Err(EvalError::UnsupportedType {
                context: "field reference",
                found: value.type_name(),
            });
        };
        trace!(record = record.type_name(), field = name, "reading field");
        record.field(name).ok_or_else(|| EvalError::NoSuchField {
            field: name.to_string(),
            record: record.type_name().to_string(),
        })
    }
}

/// Implement [`Record`] for a struct by listing the fields it exposes.
///
/// Every listed field type must be `Clone + Into<Param>`. Field names are
/// matched exactly as written in the struct.
///
/// ```
/// use authz_expr::{impl_record, Environment, Interpreter, Param};
///
/// #[derive(Debug)]
/// struct Request {
///     user_id: u32,
///     admin: bool,
/// }
///
/// impl_record!(Request { user_id, admin });
///
/// let env = Environment::new().with("request", Param::record(Request { user_id: 7, admin: false }));
/// let allowed = Interpreter::new().eval_bool("$eq(request.user_id, 7)", &env).unwrap();
/// assert!(allowed);
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::record::Record for $ty {
            fn type_name(&self) -> &str {
                stringify!($ty)
            }

            fn field(&self, name: &str) -> ::core::option::Option<$crate::value::Param> {
                match name {
                    $(
                        stringify!($field) => ::core::option::Option::Some(
                            $crate::value::Param::from(::core::clone::Clone::clone(&self.$field)),
                        ),
                    )*
                    _ => ::core::option::Option::None,
                }
            }
        }
    };
}
