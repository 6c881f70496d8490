use crate::{
    db::{
        cache::{
            CacheAdapter, CacheCategory, CacheCoordinator, CacheError, CacheKey, CacheListener,
            CacheStrategy, CacheValue, MemoryCache,
        },
        query::{Expr, Query},
    },
    key::{Key, KeySet},
    obs::{MetricsEvent, MetricsSink, with_metrics_sink},
    test_support::{MEMBERSHIP, Membership, PERSON, Person, PersonSummary},
    value::Value,
};
use std::sync::{Arc, Mutex};

fn person_key(id: i64) -> Key {
    Key::from_values(&PERSON, vec![Value::Int(id)]).unwrap()
}

fn coordinator() -> (Arc<MemoryCache>, CacheCoordinator) {
    let memory = Arc::new(MemoryCache::new());
    let coordinator = CacheCoordinator::new(memory.clone());

    (memory, coordinator)
}

fn query_key(sql: &str) -> CacheKey {
    CacheKey::Query {
        sql: sql.to_string(),
        params: vec![Value::Int(1)],
    }
}

///
/// FailingCache
///

struct FailingCache;

impl CacheAdapter for FailingCache {
    fn lookup(&self, _: &str, _: &CacheKey) -> Result<Option<Arc<CacheValue>>, CacheError> {
        Err(CacheError::Backend("down".into()))
    }

    fn store(&self, _: CacheCategory, _: &str, _: CacheKey, _: CacheValue) -> Result<(), CacheError> {
        Err(CacheError::Backend("down".into()))
    }

    fn remove(&self, _: &str, _: &CacheKey) -> Result<(), CacheError> {
        Err(CacheError::Backend("down".into()))
    }

    fn enumerate(&self, _: &str) -> Result<Vec<CacheKey>, CacheError> {
        Err(CacheError::Backend("down".into()))
    }
}

///
/// Cascade
/// Records notifications and drops a derived entry whenever a record goes.
///

#[derive(Default)]
struct Cascade {
    seen: Mutex<Vec<String>>,
}

const DERIVED: &str = "derived/person_names";

impl CacheListener for Cascade {
    fn entry_stored(
        &self,
        _: &CacheCoordinator,
        _: &CacheKey,
        old: Option<&CacheValue>,
        _: &CacheValue,
    ) {
        let label = if old.is_some() { "replaced" } else { "stored" };
        self.seen.lock().unwrap().push(label.to_string());
    }

    fn entry_removed(&self, coordinator: &CacheCoordinator, _: &CacheKey, old: Option<&CacheValue>) {
        let label = if old.is_some() { "removed" } else { "removed-missing" };
        self.seen.lock().unwrap().push(label.to_string());
        coordinator.remove(DERIVED, &query_key("names"));
    }
}

#[derive(Default)]
struct Events(Mutex<Vec<MetricsEvent>>);

impl MetricsSink for Events {
    fn record(&self, event: MetricsEvent) {
        self.0.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------
// Record cache
// ---------------------------------------------------------------------

#[test]
fn records_are_value_snapshots() {
    let (_, cache) = coordinator();
    let mut person = Person::new(1, "ann", 30);
    cache.store_record(&person_key(1), &person);

    person.age = 99;
    let mut first: Person = cache.lookup_record(&person_key(1)).unwrap();
    first.name.push_str("-changed");
    let second: Person = cache.lookup_record(&person_key(1)).unwrap();

    assert_eq!(second, Person::new(1, "ann", 30));
}

#[test]
fn absent_keys_are_never_cached() {
    let (memory, cache) = coordinator();

    cache.store_record(&person_key(0), &Person::new(0, "new", 1));

    assert_eq!(memory.len(PERSON.path), 0);
}

#[test]
fn record_entries_use_the_record_category() {
    let (memory, cache) = coordinator();
    let key = person_key(3);

    cache.store_record(&key, &Person::new(3, "c", 3));

    assert_eq!(
        memory.category(PERSON.path, &key.cache_key()),
        Some(CacheCategory::Record)
    );
}

#[test]
fn a_record_of_another_shape_is_a_miss() {
    let (_, cache) = coordinator();
    let key = Key::from_values(&PERSON, vec![Value::Int(1)]).unwrap();
    cache.store_record_values(&key, vec![Value::Int(1)]);

    assert!(cache.lookup_record::<Person>(&key).is_none());
}

#[test]
fn invalidate_set_touches_only_its_keys() {
    let (_, cache) = coordinator();
    for id in 1..=4 {
        cache.store_record(&person_key(id), &Person::new(id, "p", id));
    }
    let set = KeySet::new(&PERSON, [person_key(2), person_key(4)]).unwrap();

    cache.invalidate_set(&set);

    let left: Vec<i64> = (1..=4)
        .filter(|id| cache.lookup_record::<Person>(&person_key(*id)).is_some())
        .collect();
    assert_eq!(left, vec![1, 3]);
}

#[test]
fn invalidate_all_is_scoped_to_one_type() {
    let (memory, cache) = coordinator();
    for id in 1..=3 {
        cache.store_record(&person_key(id), &Person::new(id, "p", id));
    }
    let member = Membership::new(1, 1, "owner");
    cache.store_record(&Key::of(&member).unwrap(), &member);

    assert_eq!(cache.invalidate_all(&PERSON), 3);
    assert_eq!(memory.len(PERSON.path), 0);
    assert_eq!(memory.len(MEMBERSHIP.path), 1);
}

#[test]
fn evict_matching_applies_the_filter() {
    let (memory, cache) = coordinator();
    let id = CacheCoordinator::keyset_cache_id(&PERSON);
    cache.store(CacheCategory::ShortKeyset, &id, query_key("a"), CacheValue::Keys(Vec::new()));
    cache.store(CacheCategory::ShortKeyset, &id, query_key("b"), CacheValue::Keys(Vec::new()));

    let removed = cache.evict_matching(&id, |k| matches!(k, CacheKey::Query { sql, .. } if sql == "a"));

    assert_eq!(removed, 1);
    assert_eq!(memory.len(&id), 1);
}

// ---------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------

#[test]
fn listeners_see_old_values_and_can_cascade() {
    let (memory, cache) = coordinator();
    let cascade = Arc::new(Cascade::default());
    cache.register_listener(PERSON.path, cascade.clone());
    cache.store(CacheCategory::Result, DERIVED, query_key("names"), CacheValue::Records(Vec::new()));

    cache.store_record(&person_key(1), &Person::new(1, "a", 1));
    cache.store_record(&person_key(1), &Person::new(1, "b", 1));
    cache.invalidate(&person_key(1));
    cache.invalidate(&person_key(1));

    assert_eq!(
        *cascade.seen.lock().unwrap(),
        vec!["stored", "replaced", "removed", "removed-missing"]
    );
    assert_eq!(memory.len(DERIVED), 0);
}

#[test]
fn listeners_ignore_non_record_entries() {
    let (_, cache) = coordinator();
    let cascade = Arc::new(Cascade::default());
    cache.register_listener(PERSON.path, cascade.clone());

    cache.store(
        CacheCategory::Result,
        PERSON.path,
        query_key("x"),
        CacheValue::Records(Vec::new()),
    );

    assert!(cascade.seen.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------
// Degraded caches
// ---------------------------------------------------------------------

#[test]
fn disabled_coordinator_misses_everything() {
    let cache = CacheCoordinator::disabled();
    cache.store_record(&person_key(1), &Person::new(1, "a", 1));

    assert!(!cache.is_enabled());
    assert!(cache.lookup_record::<Person>(&person_key(1)).is_none());
    assert_eq!(cache.invalidate_all(&PERSON), 0);
}

#[test]
fn adapter_failures_become_misses() {
    let cache = CacheCoordinator::new(Arc::new(FailingCache));
    let events = Arc::new(Events::default());

    let found = with_metrics_sink(events.clone(), || {
        cache.store_record(&person_key(1), &Person::new(1, "a", 1));
        cache.invalidate(&person_key(1));
        assert_eq!(cache.invalidate_all(&PERSON), 0);
        cache.lookup_record::<Person>(&person_key(1))
    });

    assert!(found.is_none());
    let failures = events
        .0
        .lock()
        .unwrap()
        .iter()
        .filter(|e| **e == MetricsEvent::CacheFailure)
        .count();
    assert_eq!(failures, 4);
}

// ---------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------

#[test]
fn memory_cache_expires_by_category() {
    let memory = MemoryCache::new();
    let id = "tests/keys";
    memory
        .store(CacheCategory::ShortKeyset, id, query_key("s"), CacheValue::Keys(Vec::new()))
        .unwrap();
    memory
        .store(CacheCategory::LongKeyset, id, query_key("l"), CacheValue::Keys(Vec::new()))
        .unwrap();

    assert_eq!(memory.expire(CacheCategory::ShortKeyset), Ok(1));
    assert!(memory.lookup(id, &query_key("s")).unwrap().is_none());
    assert!(memory.lookup(id, &query_key("l")).unwrap().is_some());
    assert_eq!(memory.enumerate(id).unwrap(), vec![query_key("l")]);
}

#[test]
fn memory_cache_remove_of_unknown_region_is_a_no_op() {
    let memory = MemoryCache::new();

    assert_eq!(memory.remove("nowhere", &query_key("x")), Ok(()));
    assert!(memory.enumerate("nowhere").unwrap().is_empty());
}

// ---------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------

#[test]
fn best_resolves_by_query_shape() {
    let stored = Query::<Person>::new();
    let overridden = Query::<Person>::new().override_field("age", Expr::bind(1_i64));
    let computed = Query::<PersonSummary>::new();

    assert_eq!(
        CacheStrategy::Best.resolve(stored.build().unwrap()),
        CacheStrategy::ShortKeys
    );
    assert_eq!(
        CacheStrategy::Best.resolve(overridden.build().unwrap()),
        CacheStrategy::None
    );
    assert_eq!(
        CacheStrategy::Best.resolve(computed.build().unwrap()),
        CacheStrategy::None
    );
    assert_eq!(
        CacheStrategy::Contents.resolve(computed.build().unwrap()),
        CacheStrategy::Contents
    );
}

#[test]
fn only_keyset_strategies_cache_keys() {
    assert!(CacheStrategy::Records.is_two_phase());
    assert!(!CacheStrategy::Contents.is_two_phase());
    assert_eq!(CacheStrategy::Records.keyset_category(), None);
    assert_eq!(
        CacheStrategy::ShortKeys.keyset_category(),
        Some(CacheCategory::ShortKeyset)
    );
    assert_eq!(
        CacheStrategy::LongKeys.keyset_category(),
        Some(CacheCategory::LongKeyset)
    );
}

#[test]
fn cache_ids_derive_from_the_type_path() {
    assert_eq!(
        CacheCoordinator::keyset_cache_id(&PERSON),
        "test_support::Person/keys"
    );
    assert_eq!(
        CacheCoordinator::contents_cache_id(&PERSON),
        "test_support::Person/contents"
    );
}
