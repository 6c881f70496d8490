use crate::{
    db::{
        cache::{CacheCategory, CacheCoordinator, CacheKey, CacheStrategy, CacheValue},
        executor::{CacheAction, ConnectionScope, Context, check_model, row_key, row_values},
        query::{ClauseKind, Expr, Projection, Query, QueryClauses, SelectQuery, WhereClause},
        sql::CompiledStatement,
    },
    error::InternalError,
    key::{Key, KeySet},
    obs::sink::{ExecKind, Span},
    traits::Record,
    value::Value,
};
use std::{collections::HashMap, marker::PhantomData};
use tracing::warn;

///
/// Phase
///
/// Progress of one two-phase collection query.
///

enum Phase<R> {
    NotStarted,
    CacheChecked,
    KeysResolved(Vec<Key>),
    RecordsResolved(Vec<R>),
    Done(Vec<R>),
}

impl<R> Phase<R> {
    const fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::CacheChecked => "cache-checked",
            Self::KeysResolved(_) => "keys-resolved",
            Self::RecordsResolved(_) => "records-resolved",
            Self::Done(_) => "done",
        }
    }
}

///
/// LoadExecutor
///

#[derive(Clone, Copy)]
pub(crate) struct LoadExecutor<'a, R: Record> {
    ctx: Context<'a>,
    _marker: PhantomData<R>,
}

impl<'a, R: Record> LoadExecutor<'a, R> {
    pub(crate) const fn new(ctx: Context<'a>) -> Self {
        Self {
            ctx,
            _marker: PhantomData,
        }
    }

    // ======================================================================
    // Single-row loads
    // ======================================================================

    /// First row matching `query`. The record cache is consulted only when
    /// the filter is a plain key; a loaded row is cached under its own key.
    pub(crate) fn load(&self, query: &Query<R>) -> Result<Option<R>, InternalError> {
        let mut span = Span::new(ExecKind::Load, R::MODEL.path);
        let select = query.build()?;
        let cacheable = query.strategy() != Some(CacheStrategy::None)
            && !select.clauses.has_field_overrides()
            && !select.clauses.for_update();

        if cacheable
            && let Some(key) = select.clauses.where_clause().and_then(WhereClause::as_key)
            && let Some(record) = self.ctx.cache().lookup_record::<R>(key)
        {
            self.ctx.debug_log(R::MODEL.path, format!("load {key:?}: cache hit"));
            span.set_rows(1);
            return Ok(Some(record));
        }

        let compiled = self.ctx.compile_select(select)?;
        let values = self.ctx.run(R::MODEL.path, |scope| {
            let Some(row) = scope.query(&compiled)?.into_iter().next() else {
                return Ok(None);
            };
            let values = row_values(R::MODEL, &compiled.columns, row)?;
            if cacheable && let Ok(key) = Key::from_record_values(R::MODEL, &values) {
                scope.defer(CacheAction::Store {
                    key,
                    values: values.clone(),
                });
            }

            Ok(Some(values))
        })?;

        let record = values.map(R::from_values).transpose()?;
        span.set_rows(u64::from(record.is_some()));

        Ok(record)
    }

    pub(crate) fn load_by_key(&self, key: &Key) -> Result<Option<R>, InternalError> {
        check_model(R::MODEL, key.model())?;
        if key.is_absent() {
            return Ok(None);
        }

        self.load(&Query::new().filter(key.clone()))
    }

    /// Records for every key of `keys`, in key-set order; keys with no row
    /// are skipped.
    pub(crate) fn load_all(&self, keys: &KeySet) -> Result<Vec<R>, InternalError> {
        let mut span = Span::new(ExecKind::Find, R::MODEL.path);
        check_model(R::MODEL, keys.model())?;

        let records = self.resolve_records(&SelectQuery::new(R::MODEL), &keys.keys())?;
        span.set_rows(records.len() as u64);

        Ok(records)
    }

    // ======================================================================
    // Collection queries
    // ======================================================================

    pub(crate) fn find_all(&self, query: &Query<R>) -> Result<Vec<R>, InternalError> {
        let mut span = Span::new(ExecKind::Find, R::MODEL.path);
        let select = query.build()?;
        let strategy = self.effective_strategy(select, query.strategy());
        self.ctx
            .debug_log(R::MODEL.path, format!("find_all: strategy {strategy}"));

        let records = match strategy {
            CacheStrategy::Contents => self.find_contents(select)?,
            s if s.is_two_phase() => self.find_two_phase(select, s)?,
            _ => self.find_direct(select)?,
        };
        span.set_rows(records.len() as u64);

        Ok(records)
    }

    /// Keys of every matching row, in result order. Keyset caching follows
    /// the query's strategy.
    pub(crate) fn find_all_keys(&self, query: &Query<R>) -> Result<Vec<Key>, InternalError> {
        let mut span = Span::new(ExecKind::Find, R::MODEL.path);
        let select = query.build()?;
        let strategy = self.effective_strategy(select, query.strategy());
        let compiled = self.ctx.compile_select(&select.keys_only())?;

        let keys = match self.cached_keys(strategy, &compiled) {
            Some(keys) => keys,
            None => self.query_keys(strategy, &compiled)?,
        };
        span.set_rows(keys.len() as u64);

        Ok(keys)
    }

    pub(crate) fn count(&self, query: &Query<R>) -> Result<u64, InternalError> {
        let _span = Span::new(ExecKind::Count, R::MODEL.path);
        let select = query.build()?;

        // result shaping does not change a count
        let clauses = QueryClauses::try_from_iter(
            select
                .clauses
                .iter()
                .filter(|c| {
                    !matches!(
                        c.kind(),
                        ClauseKind::OrderBy | ClauseKind::Limit | ClauseKind::ForUpdate
                    )
                })
                .cloned(),
        )?;
        let count_query = SelectQuery {
            model: R::MODEL,
            projection: Projection::Exprs(vec![Expr::count_star()]),
            clauses,
        };
        let compiled = self.ctx.compile_select(&count_query)?;

        let count = self.ctx.run(R::MODEL.path, |scope| {
            let rows = scope.query(&compiled)?;
            rows.first()
                .and_then(|row| row.first())
                .and_then(Value::as_int)
                .ok_or_else(|| {
                    InternalError::executor_invariant(format!(
                        "{}: count returned no integer",
                        R::MODEL.path
                    ))
                })
        })?;

        u64::try_from(count).map_err(|_| {
            InternalError::executor_invariant(format!("{}: negative count {count}", R::MODEL.path))
        })
    }

    // ======================================================================
    // Strategies
    // ======================================================================

    // Two-phase strategies need a key per row and rows that match their
    // cached snapshot; anything else runs directly.
    fn effective_strategy(
        &self,
        select: &SelectQuery,
        requested: Option<CacheStrategy>,
    ) -> CacheStrategy {
        let strategy = requested
            .unwrap_or(self.ctx.depot().config().default_strategy)
            .resolve(select);

        if !self.ctx.cache().is_enabled() {
            return CacheStrategy::None;
        }
        if strategy.is_two_phase()
            && (!select.model.has_primary_key()
                || select.clauses.has_field_overrides()
                || select.clauses.for_update())
        {
            return CacheStrategy::None;
        }

        strategy
    }

    fn find_direct(&self, select: &SelectQuery) -> Result<Vec<R>, InternalError> {
        let compiled = self.ctx.compile_select(select)?;
        let rows = self.ctx.run(R::MODEL.path, |scope| {
            scope
                .query(&compiled)?
                .into_iter()
                .map(|row| row_values(R::MODEL, &compiled.columns, row))
                .collect::<Result<Vec<_>, _>>()
        })?;

        rows.into_iter().map(R::from_values).collect()
    }

    // Whole result cached under the compiled text and its parameters.
    fn find_contents(&self, select: &SelectQuery) -> Result<Vec<R>, InternalError> {
        let compiled = self.ctx.compile_select(select)?;
        let cache_id = CacheCoordinator::contents_cache_id(R::MODEL);
        let key = query_cache_key(&compiled);

        if let Some(hit) = self.ctx.cache().lookup(&cache_id, &key) {
            if let CacheValue::Records(rows) = hit.as_ref() {
                return rows.iter().cloned().map(R::from_values).collect();
            }
            warn!(cache_id, "contents cache entry has unexpected shape");
        }

        let rows = self.ctx.run(R::MODEL.path, |scope| {
            let rows = scope
                .query(&compiled)?
                .into_iter()
                .map(|row| row_values(R::MODEL, &compiled.columns, row))
                .collect::<Result<Vec<_>, _>>()?;
            scope.defer(CacheAction::StoreEntry {
                category: CacheCategory::Result,
                cache_id: cache_id.clone(),
                key: key.clone(),
                value: CacheValue::Records(rows.clone()),
            });

            Ok(rows)
        })?;

        rows.into_iter().map(R::from_values).collect()
    }

    // The keyset cache is checked before a connection is taken. When the
    // database has to answer the keys, the record fetch shares that
    // connection; a cached keyset only needs one for its misses.
    fn find_two_phase(
        &self,
        select: &SelectQuery,
        strategy: CacheStrategy,
    ) -> Result<Vec<R>, InternalError> {
        let compiled = self.ctx.compile_select(&select.keys_only())?;

        let mut phase = Phase::NotStarted;
        loop {
            self.ctx
                .debug_log(R::MODEL.path, format!("two-phase: {}", phase.name()));

            phase = match phase {
                Phase::NotStarted => match self.cached_keys(strategy, &compiled) {
                    Some(keys) => Phase::KeysResolved(keys),
                    None => Phase::CacheChecked,
                },
                Phase::CacheChecked => {
                    let records = self.ctx.run(R::MODEL.path, |scope| {
                        let keys = self.query_keys_in(scope, strategy, &compiled)?;
                        self.resolve_records_in(scope, select, &keys)
                    })?;
                    Phase::RecordsResolved(records)
                }
                Phase::KeysResolved(keys) => {
                    Phase::RecordsResolved(self.resolve_records(select, &keys)?)
                }
                Phase::RecordsResolved(records) => Phase::Done(records),
                Phase::Done(records) => return Ok(records),
            };
        }
    }

    // ======================================================================
    // Key phase
    // ======================================================================

    fn cached_keys(&self, strategy: CacheStrategy, compiled: &CompiledStatement) -> Option<Vec<Key>> {
        strategy.keyset_category()?;

        let cache_id = CacheCoordinator::keyset_cache_id(R::MODEL);
        let hit = self.ctx.cache().lookup(&cache_id, &query_cache_key(compiled))?;
        let CacheValue::Keys(rows) = hit.as_ref() else {
            warn!(cache_id, "keyset cache entry has unexpected shape");
            return None;
        };

        match rows
            .iter()
            .map(|values| Key::from_values(R::MODEL, values.clone()))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(keys) => Some(keys),
            Err(err) => {
                warn!(cache_id, error = %err, "cached keyset failed to decode");
                None
            }
        }
    }

    fn query_keys(
        &self,
        strategy: CacheStrategy,
        compiled: &CompiledStatement,
    ) -> Result<Vec<Key>, InternalError> {
        self.ctx.run(R::MODEL.path, |scope| {
            self.query_keys_in(scope, strategy, compiled)
        })
    }

    // Keys query on an open scope; the keyset entry is stored after commit.
    fn query_keys_in(
        &self,
        scope: &mut ConnectionScope<'_>,
        strategy: CacheStrategy,
        compiled: &CompiledStatement,
    ) -> Result<Vec<Key>, InternalError> {
        let keys = scope
            .query(compiled)?
            .into_iter()
            .map(|row| row_key(R::MODEL, &compiled.columns, row))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(category) = strategy.keyset_category() {
            scope.defer(CacheAction::StoreEntry {
                category,
                cache_id: CacheCoordinator::keyset_cache_id(R::MODEL),
                key: query_cache_key(compiled),
                value: CacheValue::Keys(keys.iter().map(|k| k.values().to_vec()).collect()),
            });
        }

        Ok(keys)
    }

    // ======================================================================
    // Record phase
    // ======================================================================

    // Keys already known: cache lookups happen before any connection is
    // taken, and a fully cached result never touches the database.
    fn resolve_records(&self, select: &SelectQuery, keys: &[Key]) -> Result<Vec<R>, InternalError> {
        let (slots, missing) = self.cached_records(keys);
        let fetched = if missing.is_empty() {
            HashMap::new()
        } else {
            let statements = self.fetch_statements(select, missing)?;
            self.ctx
                .run(R::MODEL.path, |scope| Self::fetch_in(scope, &statements))?
        };

        Self::merge(keys, slots, &fetched)
    }

    fn resolve_records_in(
        &self,
        scope: &mut ConnectionScope<'_>,
        select: &SelectQuery,
        keys: &[Key],
    ) -> Result<Vec<R>, InternalError> {
        let (slots, missing) = self.cached_records(keys);
        let fetched = if missing.is_empty() {
            HashMap::new()
        } else {
            let statements = self.fetch_statements(select, missing)?;
            Self::fetch_in(scope, &statements)?
        };

        Self::merge(keys, slots, &fetched)
    }

    // Cached snapshot per key, plus the keys that missed.
    fn cached_records(&self, keys: &[Key]) -> (Vec<Option<R>>, Vec<Key>) {
        let cache = self.ctx.cache();
        let slots: Vec<Option<R>> = keys.iter().map(|k| cache.lookup_record::<R>(k)).collect();

        let missing: Vec<Key> = keys
            .iter()
            .zip(&slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(key, _)| key.clone())
            .collect();
        self.ctx.debug_log(
            R::MODEL.path,
            format!("{} keys, {} cached", keys.len(), keys.len() - missing.len()),
        );

        (slots, missing)
    }

    // One statement per chunk of missing keys.
    fn fetch_statements(
        &self,
        select: &SelectQuery,
        missing: Vec<Key>,
    ) -> Result<Vec<CompiledStatement>, InternalError> {
        KeySet::new(R::MODEL, missing)?
            .chunks(self.ctx.depot().max_in_keys())
            .into_iter()
            .map(|chunk| {
                let query = SelectQuery {
                    model: R::MODEL,
                    projection: Projection::Record,
                    clauses: select.clauses.with_where_only(chunk.into()),
                };
                self.ctx.compile_select(&query)
            })
            .collect()
    }

    fn fetch_in(
        scope: &mut ConnectionScope<'_>,
        statements: &[CompiledStatement],
    ) -> Result<HashMap<Key, Vec<Value>>, InternalError> {
        let mut fetched = HashMap::new();
        for compiled in statements {
            for row in scope.query(compiled)? {
                let values = row_values(R::MODEL, &compiled.columns, row)?;
                let key = Key::from_record_values(R::MODEL, &values)?;
                scope.defer(CacheAction::Store {
                    key: key.clone(),
                    values: values.clone(),
                });
                fetched.insert(key, values);
            }
        }

        Ok(fetched)
    }

    // Output follows `keys`; keys whose row disappeared are dropped.
    fn merge(
        keys: &[Key],
        slots: Vec<Option<R>>,
        fetched: &HashMap<Key, Vec<Value>>,
    ) -> Result<Vec<R>, InternalError> {
        let mut records = Vec::with_capacity(keys.len());
        for (slot, key) in slots.into_iter().zip(keys) {
            let record = match slot {
                Some(record) => record,
                None => match fetched.get(key) {
                    Some(values) => R::from_values(values.clone())?,
                    None => {
                        warn!(
                            entity = R::MODEL.path,
                            ?key,
                            "row vanished between key and record phases"
                        );
                        continue;
                    }
                },
            };
            records.push(record);
        }

        Ok(records)
    }
}

fn query_cache_key(compiled: &CompiledStatement) -> CacheKey {
    CacheKey::Query {
        sql: compiled.sql.clone(),
        params: compiled.params(),
    }
}
