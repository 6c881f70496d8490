use crate::{
    db::{
        executor::{CacheAction, Context, check_key_present, check_model},
        query::{Clause, DeleteStatement, QueryClauses, Statement, WhereClause},
    },
    error::InternalError,
    key::Key,
    obs::sink::{ExecKind, Span},
    traits::Record,
};
use std::marker::PhantomData;

///
/// DeleteExecutor
///

#[derive(Clone, Copy)]
pub(crate) struct DeleteExecutor<'a, R: Record> {
    ctx: Context<'a>,
    _marker: PhantomData<R>,
}

impl<'a, R: Record> DeleteExecutor<'a, R> {
    pub(crate) const fn new(ctx: Context<'a>) -> Self {
        Self {
            ctx,
            _marker: PhantomData,
        }
    }

    /// Delete the row with `key`; returns the affected-row count.
    pub(crate) fn delete(&self, key: &Key) -> Result<u64, InternalError> {
        check_model(R::MODEL, key.model())?;
        check_key_present(key)?;

        self.delete_where(key.clone().into())
    }

    /// Delete every row matching `where_clause`.
    pub(crate) fn delete_all(&self, where_clause: WhereClause) -> Result<u64, InternalError> {
        match &where_clause {
            WhereClause::Key(key) => check_model(R::MODEL, key.model())?,
            WhereClause::KeySet(set) => check_model(R::MODEL, set.model())?,
            WhereClause::Expr(_) => {}
        }

        self.delete_where(where_clause)
    }

    fn delete_where(&self, where_clause: WhereClause) -> Result<u64, InternalError> {
        let mut span = Span::new(ExecKind::Delete, R::MODEL.path);
        let model = R::MODEL;
        let invalidation = CacheAction::invalidation_for(model, &where_clause);

        let clauses = QueryClauses::try_from_iter([Clause::Where(where_clause)])?;
        let compiled = self
            .ctx
            .compile(&Statement::Delete(DeleteStatement { model, clauses }))?;
        invalidation.clone().apply(self.ctx.cache());

        let rows = self.ctx.run(model.path, |scope| {
            let rows = scope.update(&compiled)?;
            scope.defer(invalidation.clone());

            Ok(rows)
        })?;
        span.set_rows(rows);
        self.ctx
            .debug_log(model.path, format!("deleted {rows} rows"));

        Ok(rows)
    }
}
