use crate::{
    db::{
        Db,
        registry::RegisterOptions,
        store::{MemoryStore, StoreClient},
    },
    error::{ErrorClass, ErrorOrigin},
    model::{FieldModel, RecordType},
    obs::{MetricsEvent, MetricsSink},
    record::Record,
    test_support::{fund_type, instrument_type, position_type, time_serie_type},
    value::Value,
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

fn db_with(types: &[&Arc<RecordType>]) -> (Db, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let db = Db::new();
    for ty in types {
        db.register(Arc::clone(ty), store.clone(), RegisterOptions::default())
            .expect("type should register");
    }

    (db, store)
}

fn instrument(ty: &Arc<RecordType>, name: &str, ccy: &str) -> Record {
    Record::new(ty)
        .with("name", name)
        .and_then(|r| r.with("ccy", ccy))
        .expect("instrument should populate")
}

#[test]
fn stage_allocates_ids_eagerly_and_touches_nothing_else() {
    let ty = instrument_type();
    let (db, store) = db_with(&[&ty]);
    let mut record = instrument(&ty, "GOOG", "USD");

    db.stage(&mut record).expect("stage should succeed");

    assert_eq!(record.id(), &Value::Int(1));
    assert_eq!(store.keys(""), vec!["stash.instrument:ids".to_string()]);
    assert_eq!(db.pending(&ty).expect("pending should resolve"), 1);
}

#[test]
fn missing_required_field_is_rejected_and_buffer_survives() {
    let ty = instrument_type();
    let (db, _) = db_with(&[&ty]);
    let mut good = instrument(&ty, "GOOG", "USD");
    db.stage(&mut good).expect("stage should succeed");

    let mut bad = Record::new(&ty).with("name", "IBM").expect("name should set");
    let err = db.stage(&mut bad).expect_err("missing ccy should be rejected");

    assert!(err.is_field_constraint());
    assert_eq!(db.pending(&ty).expect("pending should resolve"), 1);
}

#[test]
fn explicit_primary_key_must_be_set() {
    let ty = RecordType::builder("Currency")
        .field(FieldModel::symbol("id").primary_key())
        .field(FieldModel::text("label"))
        .build()
        .expect("currency should build");
    let (db, _) = db_with(&[&ty]);

    let mut unset = Record::new(&ty);
    let err = db.stage(&mut unset).expect_err("unset text key should be rejected");
    assert!(err.is_field_constraint());

    let mut set = Record::new(&ty).with("id", "EUR").expect("id should set");
    db.stage(&mut set).expect("explicit key should stage");
    db.flush(&ty).expect("flush should succeed");
    assert!(db.load(&ty, "EUR").expect("load should succeed").is_some());
}

#[test]
fn unregistered_type_is_reported() {
    let ty = instrument_type();
    let db = Db::new();

    let err = db.flush(&ty).expect_err("flush on unregistered type should fail");
    assert!(err.is_not_registered());
    assert!(db.query(&ty).is_err());
    assert!(!db.is_registered(&ty));
}

#[test]
fn registration_prefers_options_then_type_then_default() {
    let ty = RecordType::builder("Quote")
        .field(FieldModel::symbol("ticker"))
        .namespace("md.")
        .build()
        .expect("quote should build");
    let (db, store) = db_with(&[&ty]);
    let mut record = Record::new(&ty).with("ticker", "X").expect("ticker should set");
    db.stage(&mut record).expect("stage should succeed");
    db.flush(&ty).expect("flush should succeed");

    assert!(store.exists("md.quote").expect("exists should succeed"));

    let other = Db::new();
    other
        .register(ty, Arc::new(MemoryStore::new()), RegisterOptions::default().namespace("bad:"))
        .expect_err("separator in namespace should be rejected");
}

#[test]
fn register_configured_needs_a_default_client() {
    let err = Db::new()
        .register_configured(instrument_type())
        .expect_err("no default client should fail");
    assert_eq!(err.class, ErrorClass::NotConfigured);

    let store = Arc::new(MemoryStore::new());
    let db = Db::new()
        .with_default_client(store.clone(), RegisterOptions::default().namespace("d."))
        .with_type_options("Instrument", RegisterOptions::default().namespace("fin."));
    let ty = instrument_type();
    db.register_configured(Arc::clone(&ty)).expect("configured register should succeed");
    db.register_configured(fund_type()).expect("configured register should succeed");

    let mut record = instrument(&ty, "GOOG", "USD");
    db.stage(&mut record).expect("stage should succeed");
    assert!(store.exists("fin.instrument:ids").expect("exists should succeed"));
}

#[test]
fn stage_rejects_a_foreign_layout_under_a_registered_name() {
    let ty = instrument_type();
    let (db, _) = db_with(&[&ty]);
    let impostor = RecordType::builder("Instrument")
        .field(FieldModel::integer("name"))
        .build()
        .expect("impostor should build");

    let mut record = Record::new(&impostor).with("name", 1).expect("name should set");
    let err = db.stage(&mut record).expect_err("layout mismatch should be rejected");
    assert_eq!(err.class, ErrorClass::InvalidSchema);
}

#[test]
fn relations_resolve_both_ways() {
    let (fund, inst, pos) = (fund_type(), instrument_type(), position_type());
    let (db, _) = db_with(&[&fund, &inst, &pos]);

    let mut growth = Record::new(&fund)
        .with("name", "Growth")
        .and_then(|r| r.with("ccy", "EUR"))
        .expect("fund should populate");
    db.stage(&mut growth).expect("stage should succeed");
    let mut goog = instrument(&inst, "GOOG", "USD");
    db.stage(&mut goog).expect("stage should succeed");
    for size in [10.0, 20.0] {
        let mut p = Record::new(&pos)
            .with("instrument", goog.id().clone())
            .and_then(|r| r.with("fund", growth.id().clone()))
            .and_then(|r| r.with("size", size))
            .expect("position should populate");
        db.stage(&mut p).expect("stage should succeed");
    }
    for ty in [&fund, &inst, &pos] {
        db.flush(ty).expect("flush should succeed");
    }

    let positions = db
        .related(&growth, "positions")
        .expect("related name should resolve")
        .all()
        .expect("query should succeed");
    assert_eq!(positions.len(), 2);
    assert_eq!(
        db.related(&goog, "position_set")
            .expect("default related name should resolve")
            .count()
            .expect("count should succeed"),
        2
    );

    let back = db
        .load_related(&positions[0], "fund")
        .expect("foreign key should dereference")
        .expect("fund should exist");
    assert_eq!(back, growth);

    let err = db
        .related(&growth, "trades")
        .expect_err("unknown related name should fail");
    assert!(err.is_not_registered());
    let err = db
        .load_related(&positions[0], "size")
        .expect_err("non-relation field should fail");
    assert!(err.is_field_constraint());
}

#[test]
fn structure_accessors_check_kind_and_id() {
    let ty = fund_type();
    let (db, store) = db_with(&[&ty]);
    let mut fund = Record::new(&ty)
        .with("name", "Growth")
        .and_then(|r| r.with("ccy", "EUR"))
        .expect("fund should populate");

    let err = db
        .list::<String>(&fund, "history")
        .expect_err("unstaged record has no key yet");
    assert_eq!(err.origin, ErrorOrigin::Structure);

    db.stage(&mut fund).expect("stage should succeed");
    let mut history = db.list::<String>(&fund, "history").expect("list should open");
    history.push_back("opened".to_string());
    history.save().expect("save should succeed");
    assert!(store.exists("stash.fund:id:1:history").expect("exists should succeed"));

    let err = db
        .set::<String>(&fund, "history")
        .expect_err("history is a list, not a set");
    assert!(err.is_bad_structure());
    let err = db
        .hash_table::<Value>(&fund, "name")
        .expect_err("plain fields have no structure");
    assert!(err.is_bad_structure());
}

#[test]
fn structure_handles_inherit_registration_ttl() {
    let ty = time_serie_type();
    let store = Arc::new(MemoryStore::new());
    let db = Db::new();
    db.register(
        Arc::clone(&ty),
        store.clone(),
        RegisterOptions::default().ttl(Duration::from_millis(30)),
    )
    .expect("time serie should register");
    let mut serie = Record::new(&ty).with("ticker", "SPX").expect("ticker should set");
    db.stage(&mut serie).expect("stage should succeed");

    let mut data = db.sorted_map::<String>(&serie, "data").expect("map should open");
    data.add(20_240_102, "4.2".to_string());
    data.save().expect("save should succeed");

    std::thread::sleep(Duration::from_millis(60));
    assert!(!store.exists(data.key()).expect("exists should succeed"));
}

#[test]
fn clear_type_deletes_records_but_keeps_the_counter() {
    let ty = instrument_type();
    let (db, store) = db_with(&[&ty]);
    for name in ["A", "B"] {
        db.stage(&mut instrument(&ty, name, "USD")).expect("stage should succeed");
    }
    db.flush(&ty).expect("flush should succeed");

    assert_eq!(db.clear_type(&ty).expect("clear should succeed"), 2);
    assert_eq!(store.keys(""), vec!["stash.instrument:ids".to_string()]);

    let mut next = instrument(&ty, "C", "USD");
    db.stage(&mut next).expect("stage should succeed");
    assert_eq!(next.id(), &Value::Int(3), "ids are never reused");
}

#[test]
fn delete_id_loads_then_deletes() {
    let ty = instrument_type();
    let (db, _) = db_with(&[&ty]);
    db.stage(&mut instrument(&ty, "A", "USD")).expect("stage should succeed");
    db.flush(&ty).expect("flush should succeed");

    assert_eq!(db.delete_id(&ty, 1).expect("delete should succeed"), 1);
    assert_eq!(db.delete_id(&ty, 1).expect("second delete should succeed"), 0);
}

#[test]
fn shutdown_flushes_pending_buffers_and_clears_registry() {
    let (inst, fund) = (instrument_type(), fund_type());
    let (db, store) = db_with(&[&inst, &fund]);
    db.stage(&mut instrument(&inst, "A", "USD")).expect("stage should succeed");

    assert_eq!(db.shutdown().expect("shutdown should succeed"), 1);
    assert!(store.exists("stash.instrument").expect("exists should succeed"));
    assert!(!db.is_registered(&inst));
    assert!(db.pending(&inst).is_err());
}

#[derive(Default)]
struct CountingSink {
    events: Mutex<Vec<String>>,
}

impl MetricsSink for CountingSink {
    fn record(&self, event: MetricsEvent<'_>) {
        let label = match event {
            MetricsEvent::Stage { .. } => "stage",
            MetricsEvent::IdAllocated { .. } => "id",
            MetricsEvent::Commit { .. } => "commit",
            MetricsEvent::Delete { .. } => "delete",
            MetricsEvent::Query { .. } => "query",
        };
        self.events.lock().push(label.to_string());
    }
}

#[test]
fn db_sink_receives_events() {
    let sink = Arc::new(CountingSink::default());
    let ty = instrument_type();
    let db = Db::new().metrics_sink(sink.clone());
    db.register(Arc::clone(&ty), Arc::new(MemoryStore::new()), RegisterOptions::default())
        .expect("instrument should register");

    let mut record = instrument(&ty, "A", "USD");
    db.stage(&mut record).expect("stage should succeed");
    db.flush(&ty).expect("flush should succeed");
    db.query(&ty)
        .expect("query should build")
        .all()
        .expect("query should succeed");
    db.delete(&record).expect("delete should succeed");

    assert_eq!(
        *sink.events.lock(),
        vec!["id", "stage", "commit", "query", "delete"]
    );
}

#[test]
fn stores_can_be_shared_between_types() {
    let (inst, fund) = (instrument_type(), fund_type());
    let (db, store) = db_with(&[&inst, &fund]);
    db.stage(&mut instrument(&inst, "A", "USD")).expect("stage should succeed");
    let mut f = Record::new(&fund)
        .with("name", "A")
        .and_then(|r| r.with("ccy", "USD"))
        .expect("fund should populate");
    db.stage(&mut f).expect("stage should succeed");
    db.flush(&inst).expect("flush should succeed");
    db.flush(&fund).expect("flush should succeed");

    assert_eq!(store.hlen("stash.instrument").expect("hlen should succeed"), 1);
    assert_eq!(store.hlen("stash.fund").expect("hlen should succeed"), 1);
}
