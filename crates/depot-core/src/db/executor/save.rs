use crate::{
    db::{
        executor::{CacheAction, Context, check_key_present, check_model},
        query::{Expr, InsertStatement, QueryError, Statement, UpdateStatement, WhereClause},
    },
    error::InternalError,
    key::Key,
    model::{EntityModel, FieldModel},
    obs::sink::{ExecKind, Span},
    traits::Record,
};
use std::marker::PhantomData;

///
/// SaveExecutor
///
/// Inserts and updates. Full-record writes push the post-write snapshot into
/// the record cache after commit; partial writes only invalidate.
///

#[derive(Clone, Copy)]
pub(crate) struct SaveExecutor<'a, R: Record> {
    ctx: Context<'a>,
    _marker: PhantomData<R>,
}

impl<'a, R: Record> SaveExecutor<'a, R> {
    pub(crate) const fn new(ctx: Context<'a>) -> Self {
        Self {
            ctx,
            _marker: PhantomData,
        }
    }

    // ======================================================================
    // Full-record writes
    // ======================================================================

    /// Insert a new row and return the record as stored, including any
    /// identity value the database assigned.
    pub(crate) fn insert(&self, record: R) -> Result<R, InternalError> {
        let mut span = Span::new(ExecKind::Insert, R::MODEL.path);
        let model = R::MODEL;
        let values = record.to_values();

        if let Ok(key) = Key::from_record_values(model, &values) {
            self.ctx.cache().invalidate(&key);
        }

        let statement = Statement::Insert(InsertStatement::from_record_values(model, values));
        let compiled = self.ctx.compile(&statement)?;
        let identity = model.fields.iter().find(|f| f.generated.is_some());

        let (rows, stored) = self.ctx.run(model.path, |scope| {
            let (rows, generated) = scope.insert(&compiled)?;

            let mut stored = record.clone();
            if let (Some(field), Some(value)) = (identity, generated) {
                stored.set_value(field.name, value)?;
            }
            let values = stored.to_values();
            if let Ok(key) = Key::from_record_values(model, &values) {
                scope.defer(CacheAction::Store { key, values });
            }

            Ok((rows, stored))
        })?;
        span.set_rows(rows);

        Ok(stored)
    }

    /// Overwrite every stored field of the row with `record`'s key.
    /// Returns the affected-row count; zero means no such row.
    pub(crate) fn update(&self, record: &R) -> Result<u64, InternalError> {
        let mut span = Span::new(ExecKind::Update, R::MODEL.path);
        let model = R::MODEL;
        let values = record.to_values();
        let key = Key::from_record_values(model, &values)?;
        check_key_present(&key)?;

        let sets = model
            .fields
            .iter()
            .zip(&values)
            .filter(|(field, _)| field.computed.is_none() && !model.primary_key.contains(&field.name))
            .map(|(field, value)| (field, Expr::bind(value.clone())))
            .collect();

        self.ctx.cache().invalidate(&key);
        let compiled = self.ctx.compile(&Statement::Update(UpdateStatement {
            model,
            sets,
            where_clause: Some(key.clone().into()),
        }))?;

        let rows = self.ctx.run(model.path, |scope| {
            let rows = scope.update(&compiled)?;
            if rows > 0 {
                scope.defer(CacheAction::Store {
                    key: key.clone(),
                    values: values.clone(),
                });
            } else {
                scope.defer(CacheAction::Invalidate(key.clone()));
            }

            Ok(rows)
        })?;
        span.set_rows(rows);

        Ok(rows)
    }

    /// Update the row if it exists, otherwise insert it. A record without a
    /// definite key is always inserted.
    pub(crate) fn store(&self, record: R) -> Result<R, InternalError> {
        match Key::of(&record) {
            Ok(key) if !key.is_absent() => {
                if self.update(&record)? > 0 {
                    Ok(record)
                } else {
                    self.insert(record)
                }
            }
            _ => self.insert(record),
        }
    }

    // ======================================================================
    // Partial writes
    // ======================================================================

    /// Set a subset of fields on the row with `key`.
    pub(crate) fn update_partial(
        &self,
        key: &Key,
        sets: Vec<(&'static str, Expr)>,
    ) -> Result<u64, InternalError> {
        check_model(R::MODEL, key.model())?;
        check_key_present(key)?;

        self.update_where(key.clone().into(), sets)
    }

    /// Set a subset of fields on every row matching `where_clause`.
    pub(crate) fn update_partial_where(
        &self,
        where_clause: WhereClause,
        sets: Vec<(&'static str, Expr)>,
    ) -> Result<u64, InternalError> {
        match &where_clause {
            WhereClause::Key(key) => check_model(R::MODEL, key.model())?,
            WhereClause::KeySet(set) => check_model(R::MODEL, set.model())?,
            WhereClause::Expr(_) => {}
        }

        self.update_where(where_clause, sets)
    }

    // Invalidate before the statement and again after commit.
    fn update_where(
        &self,
        where_clause: WhereClause,
        sets: Vec<(&'static str, Expr)>,
    ) -> Result<u64, InternalError> {
        let mut span = Span::new(ExecKind::Update, R::MODEL.path);
        let model = R::MODEL;
        let sets = resolve_sets(model, sets)?;
        let invalidation = CacheAction::invalidation_for(model, &where_clause);

        let compiled = self.ctx.compile(&Statement::Update(UpdateStatement {
            model,
            sets,
            where_clause: Some(where_clause),
        }))?;
        invalidation.clone().apply(self.ctx.cache());

        let rows = self.ctx.run(model.path, |scope| {
            let rows = scope.update(&compiled)?;
            scope.defer(invalidation.clone());

            Ok(rows)
        })?;
        span.set_rows(rows);

        Ok(rows)
    }
}

fn resolve_sets(
    model: &'static EntityModel,
    sets: Vec<(&'static str, Expr)>,
) -> Result<Vec<(&'static FieldModel, Expr)>, QueryError> {
    sets.into_iter()
        .map(|(name, expr)| {
            model
                .field(name)
                .map(|field| (field, expr))
                .ok_or_else(|| QueryError::UnknownField {
                    entity: model.path,
                    field: name.to_string(),
                })
        })
        .collect()
}
