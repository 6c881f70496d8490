///
/// FieldModel
/// Runtime field metadata used by compilation, key canonicalization and
/// row decoding.
///

#[derive(Debug, Eq, PartialEq)]
pub struct FieldModel {
    /// Field name as used in queries and keys.
    pub name: &'static str,
    /// Column name in the owning (or shadow) table.
    pub column: &'static str,
    /// Static value type.
    pub kind: FieldKind,
    /// Primary-key value generator, if the database assigns this field.
    pub generated: Option<Generator>,
    /// Computed-record directive; only meaningful on computed models.
    pub computed: Option<ComputedField>,
}

impl FieldModel {
    /// Plain stored field whose column shares the field name.
    #[must_use]
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column: name,
            kind,
            generated: None,
            computed: None,
        }
    }

    #[must_use]
    pub const fn with_column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }

    #[must_use]
    pub const fn identity(mut self) -> Self {
        self.generated = Some(Generator::Identity);
        self
    }

    #[must_use]
    pub const fn computed(mut self, computed: ComputedField) -> Self {
        self.computed = Some(computed);
        self
    }
}

///
/// FieldKind
///
/// Minimal static type surface; aligned with `Value` variants.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    Blob,
    Timestamp,
    /// Enum persisted by variant name.
    EnumName,
    /// Enum persisted by its small-integer code.
    EnumCode,
    /// Fixed-width integer array (native array or packed blob).
    IntArray,
}

///
/// Generator
///
/// How the database assigns a primary-key field on insert. Sequence-table
/// generators live outside the core; the write path only needs to learn the
/// assigned value after the statement ran.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Generator {
    Identity,
}

///
/// ComputedField
///
/// Column directive for a field of a computed (virtual) record.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ComputedField {
    /// Literal SQL that produces the value.
    pub sql: Option<&'static str>,
    /// Skip the column entirely unless the query defines it.
    pub optional: bool,
}
