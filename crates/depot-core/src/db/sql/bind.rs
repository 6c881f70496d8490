use crate::{
    db::{
        connection::{Connection, DatabaseFailure, StatementHandle},
        sql::CompileError,
    },
    model::FieldKind,
    value::Value,
};

///
/// BindOp
///
/// Deferred instruction to write one parameter. The encoding is chosen at
/// compile time from the value and the column it is compared with.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BindOp {
    /// Ordinary scalar, bound as-is.
    Scalar(Value),
    /// Enum persisted by variant name.
    EnumName(String),
    /// Enum persisted by its small-integer code.
    EnumCode(i32),
    /// Fixed-width integer array packed into a blob.
    PackedIntArray(Vec<i32>),
    /// Native array parameter.
    Array(Vec<Value>),
}

impl BindOp {
    /// Encoding for `value` when it targets a column of kind `hint`.
    pub fn for_value(
        value: &Value,
        hint: Option<FieldKind>,
        native_arrays: bool,
    ) -> Result<Self, CompileError> {
        let op = match value {
            Value::Enum(e) if hint == Some(FieldKind::EnumCode) => {
                let code = e.code.ok_or_else(|| CompileError::MissingEnumCode {
                    variant: e.variant.clone(),
                })?;
                Self::EnumCode(code)
            }
            Value::Enum(e) => Self::EnumName(e.variant.clone()),
            Value::IntArray(items) if native_arrays => {
                Self::Array(items.iter().map(|i| Value::Int(i64::from(*i))).collect())
            }
            Value::IntArray(items) => Self::PackedIntArray(items.clone()),
            other => Self::Scalar(other.clone()),
        };

        Ok(op)
    }

    /// Native array of `values`, each encoded for `hint`.
    pub fn array(values: &[Value], hint: Option<FieldKind>) -> Result<Self, CompileError> {
        let items = values
            .iter()
            .map(|v| Self::for_value(v, hint, true).map(|op| op.value()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::Array(items))
    }

    /// The value handed to the connection.
    #[must_use]
    pub fn value(&self) -> Value {
        match self {
            Self::Scalar(v) => v.clone(),
            Self::EnumName(name) => Value::Text(name.clone()),
            Self::EnumCode(code) => Value::Int(i64::from(*code)),
            Self::PackedIntArray(items) => Value::Blob(Value::pack_int_array(items)),
            Self::Array(items) => Value::List(items.clone()),
        }
    }

    pub fn apply(
        &self,
        conn: &mut dyn Connection,
        handle: StatementHandle,
        index: usize,
    ) -> Result<(), DatabaseFailure> {
        conn.bind(handle, index, &self.value())
    }
}
