//! Static, registration-time schema descriptors for mapped record types.
//!
//! Models are built once (usually as `static` items next to the record type)
//! and passed by reference; nothing here is discovered at runtime.

pub mod entity;
pub mod field;


pub use entity::{EntityModel, FullTextModel};
pub use field::{ComputedField, FieldKind, FieldModel, Generator};
