use crate::db::{
    connection::DatabaseFailure,
    query::{DatePart, FullTextExpr},
    sql::{
        CompileError, SqlCompiler,
        dialect::{Dialect, DialectKind, FailureKind, classify_sql_state, render_like_full_text},
    },
};

///
/// EmbeddedDialect
///
/// ANSI-leaning in-process engine. No array parameters (int arrays travel as
/// packed blobs) and no native full-text search, so matching falls back to
/// case-insensitive LIKE over the indexed columns.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedDialect;

impl Dialect for EmbeddedDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Embedded
    }

    fn max_in_keys(&self) -> usize {
        1_000
    }

    fn supports_delete_limit(&self) -> bool {
        true
    }

    fn random_function(&self) -> &'static str {
        "rand()"
    }

    fn date_part_name(&self, part: DatePart) -> &'static str {
        match part {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::DayOfMonth => "DAY",
            DatePart::DayOfWeek => "DAY_OF_WEEK",
            DatePart::DayOfYear => "DAY_OF_YEAR",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
            DatePart::Epoch => "EPOCH",
        }
    }

    fn render_full_text(
        &self,
        c: &mut SqlCompiler<'_>,
        ft: &FullTextExpr,
    ) -> Result<(), CompileError> {
        render_like_full_text(c, ft)
    }

    fn is_private_column(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case("_rowid_")
    }

    fn is_private_index(&self, name: &str) -> bool {
        let upper = name.to_ascii_uppercase();
        upper.starts_with("PRIMARY_KEY_") || upper.starts_with("CONSTRAINT_INDEX_")
    }

    fn classify(&self, failure: &DatabaseFailure) -> FailureKind {
        // lock timeout and deadlock codes reported without a usable SQLSTATE
        match failure.vendor_code {
            Some(50200 | 40001) => FailureKind::Transient,
            Some(23505) => FailureKind::DuplicateKey,
            _ => classify_sql_state(failure),
        }
    }
}
