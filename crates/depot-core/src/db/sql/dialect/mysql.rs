use crate::{
    db::{
        connection::DatabaseFailure,
        query::{DatePart, DropIndexStatement, Expr, FullTextExpr, IntervalUnit},
        sql::{
            CompileError, SqlCompiler,
            dialect::{Dialect, DialectKind, FailureKind, classify_sql_state},
        },
    },
    value::Value,
};

///
/// MySqlDialect
///
/// Backtick quoting, native `MATCH ... AGAINST` full-text search, function
/// style date parts. No NULLS FIRST/LAST and no expression index columns.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn max_in_keys(&self) -> usize {
        1_000
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    fn supports_delete_limit(&self) -> bool {
        true
    }

    fn supports_expression_indexes(&self) -> bool {
        false
    }

    fn empty_insert_values(&self) -> &'static str {
        " () VALUES ()"
    }

    fn random_function(&self) -> &'static str {
        "rand()"
    }

    fn date_part_name(&self, part: DatePart) -> &'static str {
        match part {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::DayOfMonth => "DAYOFMONTH",
            DatePart::DayOfWeek => "DAYOFWEEK",
            DatePart::DayOfYear => "DAYOFYEAR",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
            DatePart::Epoch => "UNIX_TIMESTAMP",
        }
    }

    fn render_date_part(
        &self,
        c: &mut SqlCompiler<'_>,
        part: DatePart,
        arg: &Expr,
    ) -> Result<(), CompileError> {
        c.push_sql(self.date_part_name(part));
        c.push_sql("(");
        c.render_expr(arg)?;
        c.push_sql(")");

        Ok(())
    }

    fn render_trunc(&self, c: &mut SqlCompiler<'_>, args: &[Expr]) -> Result<(), CompileError> {
        c.push_sql("truncate(");
        c.push_list(args, ", ")?;
        if args.len() == 1 {
            c.push_sql(", 0");
        }
        c.push_sql(")");

        Ok(())
    }

    fn render_interval(&self, c: &mut SqlCompiler<'_>, amount: i64, unit: IntervalUnit) {
        c.push_sql(&format!("INTERVAL {amount} {}", unit.keyword()));
    }

    // MATCH yields a relevance score, so both modes share one rendering
    fn render_full_text(
        &self,
        c: &mut SqlCompiler<'_>,
        ft: &FullTextExpr,
    ) -> Result<(), CompileError> {
        c.push_sql("MATCH (");
        for (i, column) in ft.columns().into_iter().enumerate() {
            if i > 0 {
                c.push_sql(", ");
            }
            c.render_column(column)?;
        }
        c.push_sql(") AGAINST (");
        c.push_bind_hinted(&Value::Text(ft.query.clone()), None)?;
        c.push_sql(" IN NATURAL LANGUAGE MODE)");

        Ok(())
    }

    fn render_drop_index(
        &self,
        c: &mut SqlCompiler<'_>,
        stmt: &DropIndexStatement,
    ) -> Result<(), CompileError> {
        let table = stmt.model.table.ok_or(CompileError::NoTable {
            entity: stmt.model.path,
            action: "drop an index of",
        })?;

        c.push_sql("DROP INDEX ");
        c.push_ident(&stmt.name);
        c.push_sql(" ON ");
        c.push_ident(table);

        Ok(())
    }

    fn is_private_column(&self, name: &str) -> bool {
        name.starts_with("DB_ROW_")
    }

    fn is_private_index(&self, name: &str) -> bool {
        name == "PRIMARY"
    }

    fn classify(&self, failure: &DatabaseFailure) -> FailureKind {
        match failure.vendor_code {
            Some(1062 | 1586) => FailureKind::DuplicateKey,
            // deadlock, lock wait timeout, server gone, lost connection, too many connections
            Some(1213 | 1205 | 2006 | 2013 | 1040) => FailureKind::Transient,
            _ => match failure.sql_state.as_deref() {
                // 23000 covers every integrity violation; only 1062 is a duplicate
                Some("23000") => FailureKind::Other,
                _ => classify_sql_state(failure),
            },
        }
    }
}
