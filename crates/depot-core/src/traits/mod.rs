use crate::{error::InternalError, model::EntityModel, value::Value};

///
/// Record
///
/// Marshalling boundary for one mapped record type.
///
/// ## Semantics
/// - `to_values` and `from_values` use `MODEL.fields` order
/// - cached copies are value snapshots, so a looked-up record never aliases
///   the stored one
/// - `set_value` is how the write path hands back generated key values
///

pub trait Record: Clone + Send + Sync + 'static {
    const MODEL: &'static EntityModel;

    fn to_values(&self) -> Vec<Value>;

    fn from_values(values: Vec<Value>) -> Result<Self, InternalError>;

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError>;
}
