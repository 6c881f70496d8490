use crate::model::field::FieldModel;
use std::{
    fmt,
    hash::{Hash, Hasher},
};

///
/// EntityModel
/// Registration-time descriptor for one mapped record type.
///
/// A model without a table is computed (virtual): its fields are produced by
/// literal SQL, per-query field definitions, or a designated shadow table.
///

pub struct EntityModel {
    /// Fully-qualified type path; doubles as the record cache id.
    pub path: &'static str,
    /// Stable external name used in diagnostics and keyset cache ids.
    pub entity_name: &'static str,
    /// Backing table, or `None` for computed records.
    pub table: Option<&'static str>,
    /// Ordered field list (authoritative for projections and row decoding).
    pub fields: &'static [FieldModel],
    /// Declared primary-key fields, in canonical declaration order.
    pub primary_key: &'static [&'static str],
    /// Full-text index definitions.
    pub full_text: &'static [FullTextModel],
    /// Table whose columns back the non-literal fields of a computed record.
    pub shadow: Option<&'static Self>,
}

impl EntityModel {
    /// Stored model with no full-text indexes.
    #[must_use]
    pub const fn stored(
        path: &'static str,
        entity_name: &'static str,
        table: &'static str,
        fields: &'static [FieldModel],
        primary_key: &'static [&'static str],
    ) -> Self {
        Self {
            path,
            entity_name,
            table: Some(table),
            fields,
            primary_key,
            full_text: &[],
            shadow: None,
        }
    }

    #[must_use]
    pub const fn is_computed(&self) -> bool {
        self.table.is_none()
    }

    #[must_use]
    pub const fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldModel> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Field positions of the primary-key columns, in declaration order.
    /// Models are validated at registration, so unknown names are skipped.
    #[must_use]
    pub fn primary_key_indexes(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|name| self.field_index(name))
            .collect()
    }

    #[must_use]
    pub fn full_text_index(&self, name: &str) -> Option<&'static FullTextModel> {
        self.full_text.iter().find(|ft| ft.name == name)
    }

    /// Table name used when rendering; computed models fall back to their
    /// shadow table.
    #[must_use]
    pub fn render_table(&self) -> Option<&'static str> {
        self.table.or_else(|| self.shadow.and_then(|s| s.table))
    }

    /// Check that every primary-key and full-text field names a real field.
    pub fn validate(&self) -> Result<(), String> {
        for pk in self.primary_key {
            if self.field(pk).is_none() {
                return Err(format!(
                    "{}: primary key field '{pk}' is not declared",
                    self.path
                ));
            }
        }
        for ft in self.full_text {
            for field in ft.fields {
                if self.field(field).is_none() {
                    return Err(format!(
                        "{}: full-text index '{}' references unknown field '{field}'",
                        self.path, ft.name
                    ));
                }
            }
        }

        Ok(())
    }
}

// Models are process-lifetime singletons; identity is the type path.
impl PartialEq for EntityModel {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for EntityModel {}

impl Hash for EntityModel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for EntityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityModel")
            .field("path", &self.path)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

///
/// FullTextModel
///

#[derive(Debug, Eq, PartialEq)]
pub struct FullTextModel {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    /// Text-search configuration (e.g. `english`) for dialects that take one.
    pub config: &'static str,
}
