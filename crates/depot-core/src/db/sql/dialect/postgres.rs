use crate::{
    db::{
        query::{Expr, FullTextExpr, FullTextMode, IntervalUnit},
        sql::{
            BindOp, CompileError, SqlCompiler,
            dialect::{Dialect, DialectKind},
        },
    },
    value::Value,
};

///
/// PostgresDialect
///
/// Native array parameters (`= ANY(?)` instead of expanded IN lists),
/// `tsvector` full-text search, DISTINCT ON, NULLS FIRST/LAST.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    // to_tsvector('cfg', coalesce(a, '') || ' ' || coalesce(b, ''))
    fn render_document(c: &mut SqlCompiler<'_>, ft: &FullTextExpr) -> Result<(), CompileError> {
        c.push_sql("to_tsvector('");
        c.push_sql(ft.index.config);
        c.push_sql("', ");
        for (i, column) in ft.columns().into_iter().enumerate() {
            if i > 0 {
                c.push_sql(" || ' ' || ");
            }
            c.push_sql("coalesce(");
            c.render_column(column)?;
            c.push_sql(", '')");
        }
        c.push_sql(")");

        Ok(())
    }

    fn render_ts_query(c: &mut SqlCompiler<'_>, ft: &FullTextExpr) -> Result<(), CompileError> {
        c.push_sql("plainto_tsquery('");
        c.push_sql(ft.index.config);
        c.push_sql("', ");
        c.push_bind_hinted(&Value::Text(ft.query.clone()), None)?;
        c.push_sql(")");

        Ok(())
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn max_in_keys(&self) -> usize {
        10_000
    }

    fn native_arrays(&self) -> bool {
        true
    }

    fn supports_distinct_on(&self) -> bool {
        true
    }

    fn render_in(
        &self,
        c: &mut SqlCompiler<'_>,
        expr: &Expr,
        values: &[Value],
    ) -> Result<(), CompileError> {
        let hint = SqlCompiler::kind_of(expr);
        c.render_expr(expr)?;
        c.push_sql(" = ANY(");
        c.push_bind_op(BindOp::array(values, hint)?);
        c.push_sql(")");

        Ok(())
    }

    fn render_interval(&self, c: &mut SqlCompiler<'_>, amount: i64, unit: IntervalUnit) {
        c.push_sql(&format!(
            "INTERVAL '{amount} {}'",
            unit.keyword().to_ascii_lowercase()
        ));
    }

    fn render_full_text(
        &self,
        c: &mut SqlCompiler<'_>,
        ft: &FullTextExpr,
    ) -> Result<(), CompileError> {
        match ft.mode {
            FullTextMode::Match => {
                Self::render_document(c, ft)?;
                c.push_sql(" @@ ");
                Self::render_ts_query(c, ft)
            }
            FullTextMode::Rank => {
                c.push_sql("ts_rank(");
                Self::render_document(c, ft)?;
                c.push_sql(", ");
                Self::render_ts_query(c, ft)?;
                c.push_sql(")");
                Ok(())
            }
        }
    }

    fn is_private_column(&self, name: &str) -> bool {
        matches!(
            name,
            "ctid" | "xmin" | "xmax" | "cmin" | "cmax" | "tableoid" | "oid"
        )
    }

    fn is_private_index(&self, name: &str) -> bool {
        name.ends_with("_pkey")
    }
}
