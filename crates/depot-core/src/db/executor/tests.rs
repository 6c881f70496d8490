use crate::{
    config::DepotConfig,
    db::{
        Depot,
        cache::CacheStrategy,
        connection::DatabaseFailure,
        query::{ColumnRef, Expr, OrderTerm, Query},
    },
    error::{ErrorClass, ErrorOrigin},
    key::{Key, KeySet},
    obs::{MetricsEvent, MetricsSink},
    test_support::{
        MEMBERSHIP, Membership, PERSON, Person, PersonSummary, Reply, ScriptedDatabase,
        cached_depot,
    },
    value::Value,
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

const KEYS_PREFIX: &str = "SELECT \"person\".\"id\" FROM";

///
/// RecordingSink
///

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<MetricsEvent>>,
}

impl RecordingSink {
    fn count(&self, wanted: MetricsEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == wanted)
            .count()
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, event: MetricsEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// Person table that answers the statements the executor issues. Record
// fetches come back in reverse order to prove the caller restores it.
fn person_table(people: Vec<Person>) -> impl Fn(&str, &[Value]) -> Reply + Send + Sync + 'static {
    move |sql, params| {
        if sql.starts_with("INSERT") {
            return Reply::Inserted {
                rows: 1,
                key: Value::Int(100),
            };
        }
        if sql.starts_with("UPDATE") || sql.starts_with("DELETE") {
            return Reply::Affected(1);
        }
        if sql.starts_with("SELECT count(*)") {
            let count = i64::try_from(people.len()).unwrap();
            return Reply::Rows(vec![vec![Value::Int(count)]]);
        }
        if sql.starts_with(KEYS_PREFIX) {
            return Reply::Rows(people.iter().map(|p| vec![Value::Int(p.id)]).collect());
        }

        let by_key = sql.contains(" IN (") || sql.contains("\"person\".\"id\" = ?");
        let rows = people
            .iter()
            .filter(|p| !by_key || params.contains(&Value::Int(p.id)))
            .rev()
            .map(Person::row)
            .collect();

        Reply::Rows(rows)
    }
}

fn people(n: i64) -> Vec<Person> {
    (1..=n)
        .map(|i| Person::new(i, &format!("p{i}"), 20 + i))
        .collect()
}

fn person_key(id: i64) -> Key {
    Key::new(&PERSON, [("id", Value::Int(id))]).unwrap()
}

fn age() -> ColumnRef {
    ColumnRef::of(&PERSON, "age")
}

fn seed(depot: &Depot, people: &[Person]) {
    for p in people {
        depot.cache().store_record(&Key::of(p).unwrap(), p);
    }
}

fn transient() -> DatabaseFailure {
    DatabaseFailure::new("could not serialize access").with_sql_state("40001")
}

// ---------------------------------------------------------------------
// Collection strategies
// ---------------------------------------------------------------------

#[test]
fn records_strategy_fetches_misses_in_one_batch_in_key_order() {
    let all = people(10);
    let db = ScriptedDatabase::new(person_table(all.clone()));
    let depot = cached_depot(&db, DepotConfig::default());
    let cached: Vec<Person> = all
        .iter()
        .filter(|p| ![3, 6, 9].contains(&p.id))
        .cloned()
        .collect();
    seed(&depot, &cached);

    let query = Query::<Person>::new()
        .filter(age().gt(0))
        .cache(CacheStrategy::Records);
    let found = depot.session().find_all(&query).unwrap();

    assert_eq!(found, all);
    let executed = db.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed[0].sql.starts_with(KEYS_PREFIX));
    assert_eq!(db.count_matching(" IN ("), 1);
    assert_eq!(
        executed[1].params,
        vec![Value::Int(3), Value::Int(6), Value::Int(9)]
    );
}

#[test]
fn two_phase_query_uses_one_connection() {
    let all = people(10);
    let db = ScriptedDatabase::new(person_table(all.clone()));
    let depot = cached_depot(&db, DepotConfig::default());
    let cached: Vec<Person> = all.iter().filter(|p| p.id % 3 != 0).cloned().collect();
    seed(&depot, &cached);

    let query = Query::<Person>::new().cache(CacheStrategy::Records);
    let found = depot.session().find_all(&query).unwrap();

    assert_eq!(found, all);
    assert_eq!(db.executed().len(), 2);
    assert_eq!((db.acquired(), db.commits()), (1, 1));
    assert_eq!(db.open_handles(), 0);
}

#[test]
fn fully_cached_two_phase_query_takes_no_connection() {
    let all = people(4);
    let db = ScriptedDatabase::new(person_table(all.clone()));
    let depot = cached_depot(&db, DepotConfig::default());
    let query = Query::<Person>::new().cache(CacheStrategy::ShortKeys);

    depot.session().find_all(&query).unwrap();
    assert_eq!(db.acquired(), 1);

    let again = depot.session().find_all(&query).unwrap();

    assert_eq!(again, all);
    assert_eq!(db.acquired(), 1);
    assert_eq!(db.executed().len(), 2);
}

#[test]
fn cached_keyset_fetches_only_record_misses() {
    let all = people(4);
    let db = ScriptedDatabase::new(person_table(all.clone()));
    let depot = cached_depot(&db, DepotConfig::default());
    let query = Query::<Person>::new().cache(CacheStrategy::LongKeys);
    depot.session().find_all(&query).unwrap();
    depot.cache().invalidate(&person_key(2));
    db.clear();

    let again = depot.session().find_all(&query).unwrap();

    assert_eq!(again, all);
    let executed = db.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].params, vec![Value::Int(2)]);
    assert_eq!(db.acquired(), 2);
}

#[test]
fn transient_failure_in_the_record_phase_retries_both_phases() {
    let all = people(3);
    let table = person_table(all.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    // the keys query succeeds, the first batched fetch fails
    let db = ScriptedDatabase::new(move |sql, params| {
        if seen.fetch_add(1, Ordering::SeqCst) == 1 {
            return Reply::Fail(transient());
        }
        table(sql, params)
    });
    let depot = cached_depot(&db, DepotConfig::default());
    seed(&depot, &all[..1]);

    let query = Query::<Person>::new().cache(CacheStrategy::Records);
    let found = depot.session().find_all(&query).unwrap();

    assert_eq!(found, all);
    assert_eq!(db.count_matching(KEYS_PREFIX), 2);
    assert_eq!((db.acquired(), db.rollbacks(), db.commits()), (2, 1, 1));
    assert_eq!(db.open_handles(), 0);
}

#[test]
fn fetched_records_are_written_to_the_cache() {
    let all = people(3);
    let db = ScriptedDatabase::new(person_table(all.clone()));
    let depot = cached_depot(&db, DepotConfig::default());

    let query = Query::<Person>::new().cache(CacheStrategy::Records);
    depot.session().find_all(&query).unwrap();

    for p in &all {
        assert_eq!(
            depot.cache().lookup_record::<Person>(&person_key(p.id)),
            Some(p.clone())
        );
    }
}

#[test]
fn short_keys_second_run_issues_no_keys_query() {
    let all = people(4);
    let db = ScriptedDatabase::new(person_table(all.clone()));
    let depot = cached_depot(&db, DepotConfig::default());
    let query = Query::<Person>::new()
        .filter(age().gt(21))
        .cache(CacheStrategy::ShortKeys);

    let first = depot.session().find_all(&query).unwrap();
    let second = depot.session().find_all(&query).unwrap();

    assert_eq!(first, all);
    assert_eq!(second, all);
    assert_eq!(db.count_matching(KEYS_PREFIX), 1);
    // records came from the cache the second time as well
    assert_eq!(db.executed().len(), 2);
}

#[test]
fn best_strategy_behaves_like_short_keys_for_stored_records() {
    let db = ScriptedDatabase::new(person_table(people(2)));
    let depot = cached_depot(&db, DepotConfig::default());
    let query = Query::<Person>::new().filter(age().gt(0));

    depot.session().find_all(&query).unwrap();
    depot.session().find_all(&query).unwrap();

    assert_eq!(db.count_matching(KEYS_PREFIX), 1);
}

#[test]
fn keyset_cache_is_not_invalidated_by_writes() {
    let db = ScriptedDatabase::new(person_table(people(2)));
    let depot = cached_depot(&db, DepotConfig::default());
    let query = Query::<Person>::new().cache(CacheStrategy::LongKeys);

    depot.session().find_all(&query).unwrap();
    depot.session().insert(Person::new(0, "late", 40)).unwrap();
    let keys = depot.session().find_all_keys(&query).unwrap();

    assert_eq!(keys, vec![person_key(1), person_key(2)]);
    assert_eq!(db.count_matching(KEYS_PREFIX), 1);
}

#[test]
fn contents_strategy_caches_the_whole_result() {
    let all = people(3);
    let db = ScriptedDatabase::new(person_table(all.clone()));
    let depot = cached_depot(&db, DepotConfig::default());
    let query = Query::<Person>::new()
        .filter(age().gt(0))
        .order_by(vec![OrderTerm::desc(age())])
        .cache(CacheStrategy::Contents);

    let first = depot.session().find_all(&query).unwrap();
    let second = depot.session().find_all(&query).unwrap();

    assert_eq!(first, second);
    assert_eq!(db.executed().len(), 1);
    assert!(!db.executed()[0].sql.starts_with(KEYS_PREFIX));
}

#[test]
fn none_strategy_always_hits_the_database() {
    let db = ScriptedDatabase::new(person_table(people(2)));
    let depot = cached_depot(&db, DepotConfig::default());
    let query = Query::<Person>::new().cache(CacheStrategy::None);

    depot.session().find_all(&query).unwrap();
    depot.session().find_all(&query).unwrap();

    assert_eq!(db.executed().len(), 2);
    assert_eq!(db.count_matching(KEYS_PREFIX), 0);
}

#[test]
fn without_a_cache_every_strategy_runs_directly() {
    let db = ScriptedDatabase::new(person_table(people(2)));
    let depot = Depot::new(Arc::new(db.clone()), DepotConfig::default()).unwrap();
    let query = Query::<Person>::new().cache(CacheStrategy::ShortKeys);

    let found = depot.session().find_all(&query).unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(db.executed().len(), 1);
    assert_eq!(db.count_matching(KEYS_PREFIX), 0);
}

#[test]
fn batched_fetch_respects_the_configured_key_cap() {
    let all = people(5);
    let db = ScriptedDatabase::new(person_table(all.clone()));
    let depot = cached_depot(&db, DepotConfig::default().with_max_in_keys(2));

    let query = Query::<Person>::new().cache(CacheStrategy::Records);
    let found = depot.session().find_all(&query).unwrap();

    assert_eq!(found, all);
    assert_eq!(db.count_matching(" IN ("), 3);
    // the keys query and every chunk share one connection
    assert_eq!((db.acquired(), db.commits()), (1, 1));
}

#[test]
fn computed_records_project_literals_and_skip_optional_fields() {
    let db = ScriptedDatabase::new(|_, _| {
        Reply::Rows(vec![vec![
            Value::Int(1),
            Value::Text("ann".into()),
            Value::Int(3),
        ]])
    });
    let depot = cached_depot(&db, DepotConfig::default());

    let found = depot
        .session()
        .find_all(&Query::<PersonSummary>::new())
        .unwrap();

    assert_eq!(
        db.executed()[0].sql,
        "SELECT \"person\".\"id\", \"person\".\"name\", length(name) AS \"name_length\" FROM \"person\""
    );
    assert_eq!(
        found,
        vec![PersonSummary {
            id: 1,
            name: "ann".into(),
            name_length: 3,
            score: None,
        }]
    );
}

#[test]
fn count_drops_result_shaping() {
    let db = ScriptedDatabase::new(person_table(people(7)));
    let depot = cached_depot(&db, DepotConfig::default());
    let query = Query::<Person>::new()
        .filter(age().gt(0))
        .order_by(vec![OrderTerm::asc(age())])
        .limit(2);

    let count = depot.session().count(&query).unwrap();

    assert_eq!(count, 7);
    assert_eq!(
        db.executed()[0].sql,
        "SELECT count(*) FROM \"person\" WHERE \"person\".\"age\" > ?"
    );
}

// ---------------------------------------------------------------------
// Single-row loads
// ---------------------------------------------------------------------

#[test]
fn load_by_key_is_served_from_the_cache() {
    let db = ScriptedDatabase::new(person_table(people(1)));
    let depot = cached_depot(&db, DepotConfig::default());
    seed(&depot, &people(1));

    let found = depot.session().load_by_key::<Person>(&person_key(1)).unwrap();

    assert_eq!(found, Some(Person::new(1, "p1", 21)));
    assert!(db.executed().is_empty());
}

#[test]
fn load_by_other_filter_caches_under_the_row_key() {
    let db = ScriptedDatabase::new(person_table(vec![Person::new(2, "bob", 33)]));
    let depot = cached_depot(&db, DepotConfig::default());
    let query = Query::<Person>::new().filter(ColumnRef::of(&PERSON, "name").eq("bob"));

    let found = depot.session().load(&query).unwrap();

    assert_eq!(found, Some(Person::new(2, "bob", 33)));
    assert_eq!(
        depot.cache().lookup_record::<Person>(&person_key(2)),
        found
    );
}

#[test]
fn load_with_no_row_returns_none() {
    let db = ScriptedDatabase::new(|_, _| Reply::Rows(Vec::new()));
    let depot = cached_depot(&db, DepotConfig::default());

    let found = depot.session().load_by_key::<Person>(&person_key(9)).unwrap();

    assert_eq!(found, None);
    assert_eq!(db.executed().len(), 1);
}

#[test]
fn load_all_keeps_set_order_and_skips_vanished_rows() {
    let db = ScriptedDatabase::new(person_table(people(3)));
    let depot = cached_depot(&db, DepotConfig::default());
    let keys = KeySet::new(&PERSON, [person_key(3), person_key(99), person_key(1)]).unwrap();

    let found = depot.session().load_all::<Person>(&keys).unwrap();

    assert_eq!(found, vec![Person::new(3, "p3", 23), Person::new(1, "p1", 21)]);
    assert_eq!(db.executed().len(), 1);
}

#[test]
fn keys_of_another_type_are_rejected() {
    let db = ScriptedDatabase::new(|_, _| Reply::Rows(Vec::new()));
    let depot = cached_depot(&db, DepotConfig::default());
    let key = Key::new(&MEMBERSHIP, [("org_id", Value::Int(1)), ("user_id", Value::Int(2))]).unwrap();

    let err = depot.session().load_by_key::<Person>(&key).unwrap_err();

    assert_eq!(err.class, ErrorClass::InvariantViolation);
    assert_eq!(err.origin, ErrorOrigin::Key);
    assert!(db.executed().is_empty());
}

// ---------------------------------------------------------------------
// Writes and cache maintenance
// ---------------------------------------------------------------------

#[test]
fn insert_writes_through_under_the_generated_key() {
    let db = ScriptedDatabase::new(person_table(Vec::new()));
    let depot = cached_depot(&db, DepotConfig::default());

    let stored = depot.session().insert(Person::new(0, "new", 18)).unwrap();

    assert_eq!(stored.id, 100);
    assert_eq!(
        db.executed()[0].sql,
        "INSERT INTO \"person\" (\"name\", \"age\") VALUES (?, ?)"
    );
    assert_eq!(
        depot.cache().lookup_record::<Person>(&person_key(100)),
        Some(stored)
    );
}

#[test]
fn update_writes_the_new_snapshot_through() {
    let db = ScriptedDatabase::new(person_table(people(1)));
    let depot = cached_depot(&db, DepotConfig::default());
    seed(&depot, &people(1));

    let changed = Person::new(1, "renamed", 60);
    let rows = depot.session().update(&changed).unwrap();

    assert_eq!(rows, 1);
    assert_eq!(
        db.executed()[0].sql,
        "UPDATE \"person\" SET \"name\" = ?, \"age\" = ? WHERE \"person\".\"id\" = ?"
    );
    assert_eq!(
        depot.cache().lookup_record::<Person>(&person_key(1)),
        Some(changed)
    );
}

#[test]
fn partial_update_only_invalidates() {
    let db = ScriptedDatabase::new(person_table(people(1)));
    let depot = cached_depot(&db, DepotConfig::default());
    seed(&depot, &people(1));

    let rows = depot
        .session()
        .update_partial::<Person>(&person_key(1), vec![("age", Expr::bind(50))])
        .unwrap();

    assert_eq!(rows, 1);
    assert_eq!(db.executed()[0].params, vec![Value::Int(50), Value::Int(1)]);
    assert!(depot.cache().lookup_record::<Person>(&person_key(1)).is_none());
}

#[test]
fn partial_update_rejects_unknown_fields() {
    let db = ScriptedDatabase::new(person_table(people(1)));
    let depot = cached_depot(&db, DepotConfig::default());

    let err = depot
        .session()
        .update_partial::<Person>(&person_key(1), vec![("nickname", Expr::bind("x"))])
        .unwrap_err();

    assert_eq!(err.origin, ErrorOrigin::Query);
    assert!(db.executed().is_empty());
}

#[test]
fn store_falls_back_to_insert_when_no_row_was_updated() {
    let db = ScriptedDatabase::new(|sql, _| {
        if sql.starts_with("UPDATE") {
            Reply::Affected(0)
        } else {
            Reply::Inserted {
                rows: 1,
                key: Value::Int(7),
            }
        }
    });
    let depot = cached_depot(&db, DepotConfig::default());

    let stored = depot.session().store(Person::new(7, "seven", 7)).unwrap();

    assert_eq!(stored, Person::new(7, "seven", 7));
    let executed = db.executed();
    assert!(executed[0].sql.starts_with("UPDATE"));
    assert_eq!(
        executed[1].sql,
        "INSERT INTO \"person\" (\"id\", \"name\", \"age\") VALUES (?, ?, ?)"
    );
}

#[test]
fn delete_by_expression_evicts_every_record_of_the_type() {
    let db = ScriptedDatabase::new(person_table(people(3)));
    let depot = cached_depot(&db, DepotConfig::default());
    seed(&depot, &people(3));
    let member = Membership::new(1, 2, "admin");
    depot.cache().store_record(&Key::of(&member).unwrap(), &member);

    depot.session().delete_all::<Person>(age().gt(100)).unwrap();

    for id in 1..=3 {
        assert!(depot.cache().lookup_record::<Person>(&person_key(id)).is_none());
    }
    assert_eq!(
        depot
            .cache()
            .lookup_record::<Membership>(&Key::of(&member).unwrap()),
        Some(member)
    );
}

#[test]
fn delete_by_key_set_invalidates_only_those_keys() {
    let db = ScriptedDatabase::new(person_table(people(3)));
    let depot = cached_depot(&db, DepotConfig::default());
    seed(&depot, &people(3));
    let doomed = KeySet::new(&PERSON, [person_key(1), person_key(3)]).unwrap();

    depot.session().delete_all::<Person>(doomed).unwrap();

    assert!(depot.cache().lookup_record::<Person>(&person_key(1)).is_none());
    assert!(depot.cache().lookup_record::<Person>(&person_key(2)).is_some());
    assert!(depot.cache().lookup_record::<Person>(&person_key(3)).is_none());
    assert!(db.executed()[0].sql.starts_with("DELETE FROM \"person\" WHERE"));
}

#[test]
fn delete_requires_a_present_key() {
    let db = ScriptedDatabase::new(person_table(people(1)));
    let depot = cached_depot(&db, DepotConfig::default());

    let err = depot.session().delete::<Person>(&person_key(0)).unwrap_err();

    assert_eq!(err.class, ErrorClass::InvariantViolation);
    assert!(db.executed().is_empty());
}

// ---------------------------------------------------------------------
// Failures and retry
// ---------------------------------------------------------------------

#[test]
fn transient_failure_is_retried_once_without_duplicate_effects() {
    let inserts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&inserts);
    let db = ScriptedDatabase::new(move |sql, _| {
        if sql.starts_with("INSERT") {
            seen.fetch_add(1, Ordering::SeqCst);
            Reply::Inserted {
                rows: 1,
                key: Value::Int(41),
            }
        } else {
            Reply::Rows(Vec::new())
        }
    });
    let depot = cached_depot(&db, DepotConfig::default());
    let sink = Arc::new(RecordingSink::default());
    db.fail_next(transient());

    let stored = depot
        .session()
        .metrics_sink(sink.clone())
        .insert(Person::new(0, "ann", 30))
        .unwrap();

    assert_eq!(stored.id, 41);
    assert_eq!(inserts.load(Ordering::SeqCst), 1);
    assert_eq!(db.count_matching("INSERT"), 2);
    assert_eq!((db.acquired(), db.rollbacks(), db.commits()), (2, 1, 1));
    assert_eq!(
        sink.count(MetricsEvent::TransientRetry {
            entity_path: PERSON.path
        }),
        1
    );
    assert_eq!(
        depot.cache().lookup_record::<Person>(&person_key(41)),
        Some(stored)
    );
}

#[test]
fn second_transient_failure_surfaces_as_database_error() {
    let db = ScriptedDatabase::new(person_table(people(2)));
    let depot = cached_depot(&db, DepotConfig::default());
    db.fail_next(transient());
    db.fail_next(transient());

    let err = depot
        .session()
        .find_all(&Query::<Person>::new().cache(CacheStrategy::None))
        .unwrap_err();

    assert_eq!(err.class, ErrorClass::Database);
    assert_eq!(
        err.cause.as_ref().and_then(|c| c.sql_state.as_deref()),
        Some("40001")
    );
    assert_eq!(db.executed().len(), 2);
}

#[test]
fn retry_can_be_disabled() {
    let db = ScriptedDatabase::new(person_table(people(2)));
    let depot = cached_depot(&db, DepotConfig::default().with_retry_transient(false));
    db.fail_next(transient());

    let err = depot
        .session()
        .count(&Query::<Person>::new())
        .unwrap_err();

    assert_eq!(err.class, ErrorClass::Database);
    assert_eq!(db.executed().len(), 1);
}

#[test]
fn duplicate_key_is_distinguishable_and_not_retried() {
    let db = ScriptedDatabase::new(person_table(Vec::new()));
    let depot = cached_depot(&db, DepotConfig::default());
    let sink = Arc::new(RecordingSink::default());
    db.fail_next(DatabaseFailure::new("unique violation").with_sql_state("23505"));

    let err = depot
        .session()
        .metrics_sink(sink.clone())
        .insert(Person::new(5, "dup", 1))
        .unwrap_err();

    assert!(err.is_duplicate_key());
    assert_eq!(err.class, ErrorClass::Conflict);
    assert_eq!(db.count_matching("INSERT"), 1);
    assert_eq!(
        sink.count(MetricsEvent::DuplicateKey {
            entity_path: PERSON.path
        }),
        1
    );
    assert!(depot.cache().lookup_record::<Person>(&person_key(5)).is_none());
}

#[test]
fn statement_handles_are_closed_when_execution_fails() {
    let db = ScriptedDatabase::new(person_table(people(2)));
    let depot = cached_depot(&db, DepotConfig::default());
    db.fail_next(DatabaseFailure::new("syntax error").with_sql_state("42601"));

    let err = depot
        .session()
        .find_all(&Query::<Person>::new().cache(CacheStrategy::None))
        .unwrap_err();

    assert_eq!(err.class, ErrorClass::Database);
    assert_eq!(db.open_handles(), 0);
    assert_eq!(db.released_failed(), 1);
    assert_eq!(db.rollbacks(), 1);
}

#[test]
fn statement_handles_are_closed_after_success() {
    let db = ScriptedDatabase::new(person_table(people(4)));
    let depot = cached_depot(&db, DepotConfig::default().with_max_in_keys(1));

    depot
        .session()
        .find_all(&Query::<Person>::new().cache(CacheStrategy::Records))
        .unwrap();

    assert_eq!(db.open_handles(), 0);
    assert_eq!(db.released_failed(), 0);
}

#[test]
fn compile_errors_never_reach_the_database() {
    let db = ScriptedDatabase::new(person_table(people(1)));
    let depot = cached_depot(&db, DepotConfig::default());
    let query = Query::<Person>::new().distinct_on(vec![age().expr()]);

    let err = depot.session().find_all(&query).unwrap_err();

    assert_eq!(err.class, ErrorClass::Unsupported);
    assert!(err.is_compile_error());
    assert_eq!(db.acquired(), 0);
}

// ---------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------

#[test]
fn transaction_defers_cache_writes_until_commit() {
    let db = ScriptedDatabase::new(person_table(Vec::new()));
    let depot = cached_depot(&db, DepotConfig::default());

    let tx = depot.begin().unwrap();
    let stored = tx.session().insert(Person::new(0, "tx", 1)).unwrap();
    assert!(depot.cache().lookup_record::<Person>(&person_key(100)).is_none());
    assert_eq!(db.commits(), 0);

    tx.commit().unwrap();

    assert_eq!(
        depot.cache().lookup_record::<Person>(&person_key(100)),
        Some(stored)
    );
    assert_eq!((db.acquired(), db.commits()), (1, 1));
}

#[test]
fn transaction_rollback_discards_queued_cache_writes() {
    let db = ScriptedDatabase::new(person_table(Vec::new()));
    let depot = cached_depot(&db, DepotConfig::default());

    let tx = depot.begin().unwrap();
    tx.session().insert(Person::new(0, "gone", 1)).unwrap();
    tx.rollback().unwrap();

    assert!(depot.cache().lookup_record::<Person>(&person_key(100)).is_none());
    assert_eq!((db.commits(), db.rollbacks()), (0, 1));
}

#[test]
fn transaction_does_not_retry_transient_failures() {
    let db = ScriptedDatabase::new(person_table(Vec::new()));
    let depot = cached_depot(&db, DepotConfig::default());
    db.fail_next(transient());

    let tx = depot.begin().unwrap();
    let err = tx.session().insert(Person::new(0, "x", 1)).unwrap_err();
    drop(tx);

    assert_eq!(err.class, ErrorClass::Database);
    assert_eq!(db.count_matching("INSERT"), 1);
    assert_eq!(db.rollbacks(), 1);
    assert_eq!(db.released_failed(), 0);
}
