use proptest::prelude::*;
use stashdb::{
    MemoryStore, StoreClient,
    prelude::*,
};
use std::{collections::BTreeSet, sync::Arc};
use time::macros::date;

fn instrument_type() -> Arc<RecordType> {
    RecordType::builder("Instrument")
        .field(FieldModel::symbol("name").unique())
        .field(FieldModel::symbol("ccy"))
        .field(FieldModel::date("listed").optional())
        .field(FieldModel::float("lot").optional())
        .build()
        .expect("instrument type should build")
}

fn setup() -> (Db, Arc<RecordType>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let ty = instrument_type();
    let db = Db::new();
    db.register(Arc::clone(&ty), store.clone(), RegisterOptions::default())
        .expect("instrument should register");

    (db, ty, store)
}

fn instrument(ty: &Arc<RecordType>, name: &str, ccy: &str) -> Record {
    Record::new(ty)
        .with("name", name)
        .and_then(|r| r.with("ccy", ccy))
        .expect("instrument should populate")
}

fn ids_for(db: &Db, ty: &RecordType, field: &str, value: &str) -> Vec<Value> {
    db.query(ty)
        .expect("query should build")
        .filter(field, value)
        .ids()
        .expect("ids should resolve")
}

#[test]
fn staged_record_round_trips_through_primary_key() {
    let (db, ty, _) = setup();
    let mut record = instrument(&ty, "GOOG", "USD")
        .with("listed", date!(2004 - 08 - 19))
        .and_then(|r| r.with("lot", 0.5))
        .expect("optional fields should set");
    db.stage(&mut record).expect("stage should succeed");
    assert_eq!(db.flush(&ty).expect("flush should succeed"), 1);

    let loaded = db
        .load(&ty, record.id().clone())
        .expect("load should succeed")
        .expect("record should exist");

    assert_eq!(loaded, record, "every field should survive the round trip");
}

#[test]
fn instrument_scenario() {
    let (db, ty, _) = setup();
    let mut goog = instrument(&ty, "GOOG", "USD");
    let mut ibm = instrument(&ty, "IBM", "USD");
    db.stage(&mut goog).expect("stage should succeed");
    db.stage(&mut ibm).expect("stage should succeed");
    db.flush(&ty).expect("flush should succeed");

    assert_eq!(
        ids_for(&db, &ty, "ccy", "USD"),
        vec![goog.id().clone(), ibm.id().clone()]
    );
    let unique = db
        .query(&ty)
        .expect("query should build")
        .filter("name", "GOOG")
        .get()
        .expect("unique lookup should return exactly one");
    assert_eq!(unique.id(), goog.id());

    assert_eq!(db.delete(&goog).expect("delete should succeed"), 1);
    assert_eq!(ids_for(&db, &ty, "ccy", "USD"), vec![ibm.id().clone()]);
}

#[test]
fn auto_ids_are_sequential_and_never_reused() {
    let (db, ty, _) = setup();
    let mut staged = Vec::new();
    for (name, flush) in [("A", false), ("B", true), ("C", true)] {
        let mut record = instrument(&ty, name, "USD");
        db.stage(&mut record).expect("stage should succeed");
        if flush {
            db.flush(&ty).expect("flush should succeed");
        }
        staged.push(record);
    }

    let ids = staged.iter().map(|r| r.id().clone()).collect::<Vec<_>>();
    assert_eq!(ids, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

    db.delete(&staged[1]).expect("delete should succeed");
    let mut next = instrument(&ty, "D", "USD");
    db.stage(&mut next).expect("stage should succeed");
    assert_eq!(next.id(), &Value::Int(4), "deleted id 2 is not handed out again");
}

#[test]
fn unique_pointer_is_last_write_wins() {
    let (db, ty, _) = setup();
    let mut first = instrument(&ty, "GOOG", "USD");
    let mut second = instrument(&ty, "GOOG", "EUR");
    db.stage(&mut first).expect("stage should succeed");
    db.stage(&mut second).expect("stage should succeed");
    db.flush(&ty).expect("flush should succeed");

    let found = db
        .query(&ty)
        .expect("query should build")
        .filter("name", "GOOG")
        .get()
        .expect("unique lookup should succeed");
    assert_eq!(found.id(), second.id(), "the later write owns the pointer");
}

#[test]
fn delete_removes_every_trace() {
    let (db, ty, store) = setup();
    let mut record = instrument(&ty, "GOOG", "USD")
        .with("listed", date!(2004 - 08 - 19))
        .expect("listed should set");
    db.stage(&mut record).expect("stage should succeed");
    db.flush(&ty).expect("flush should succeed");

    assert_eq!(db.delete(&record).expect("delete should succeed"), 1);

    assert_eq!(store.keys(""), vec!["stash.instrument:ids".to_string()]);
    for (field, value) in [("name", "GOOG"), ("ccy", "USD")] {
        assert!(ids_for(&db, &ty, field, value).is_empty(), "{field} should not match");
    }
    assert_eq!(db.delete(&record).expect("second delete should succeed"), 0);
}

#[test]
fn readding_the_same_id_keeps_set_cardinality() {
    let (db, ty, store) = setup();
    let mut record = instrument(&ty, "GOOG", "USD");
    for _ in 0..3 {
        db.stage(&mut record).expect("stage should succeed");
        db.flush(&ty).expect("flush should succeed");
    }

    let key = store
        .keys("stash.instrument:ccy:")
        .pop()
        .expect("ccy index should exist");
    assert_eq!(store.scard(&key).expect("scard should succeed"), 1);
}

#[test]
fn updates_move_index_membership() {
    let (db, ty, _) = setup();
    let mut record = instrument(&ty, "GOOG", "USD");
    db.stage(&mut record).expect("stage should succeed");
    db.flush(&ty).expect("flush should succeed");

    let mut loaded = db
        .load(&ty, record.id().clone())
        .expect("load should succeed")
        .expect("record should exist");
    loaded.set("ccy", "EUR").expect("ccy should set");
    db.stage(&mut loaded).expect("restage should succeed");
    db.flush(&ty).expect("flush should succeed");

    assert!(ids_for(&db, &ty, "ccy", "USD").is_empty());
    assert_eq!(ids_for(&db, &ty, "ccy", "EUR"), vec![record.id().clone()]);
}

#[test]
fn config_file_drives_registration() {
    let dir = std::env::temp_dir().join(format!("stashdb-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir should be created");
    let path = dir.join("stashdb.toml");
    std::fs::write(
        &path,
        "[backend]\nurl = \"memory://\"\nprefix = \"app.\"\n\n[types.instrument]\nnamespace = \"fin.\"\n",
    )
    .expect("config should be written");

    let db = stashdb::open(&path).expect("config should open");
    let ty = instrument_type();
    db.register_configured(Arc::clone(&ty))
        .expect("configured registration should succeed");
    let mut record = instrument(&ty, "GOOG", "USD");
    db.stage(&mut record).expect("stage should succeed");
    db.flush(&ty).expect("flush should succeed");

    assert_eq!(ids_for(&db, &ty, "name", "GOOG"), vec![Value::Int(1)]);
    std::fs::remove_dir_all(&dir).expect("temp dir should be removed");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn index_sets_hold_exactly_the_ids_carrying_each_value(
        ccys in prop::collection::vec(prop::sample::select(vec!["USD", "EUR", "JPY"]), 1..12)
    ) {
        let (db, ty, _) = setup();
        let mut expected: std::collections::BTreeMap<&str, BTreeSet<i64>> = Default::default();
        for (i, ccy) in ccys.iter().enumerate() {
            let mut record = instrument(&ty, &format!("I{i}"), ccy);
            db.stage(&mut record).expect("stage should succeed");
            let id = record.id().as_int().expect("auto ids are integers");
            expected.entry(*ccy).or_default().insert(id);
        }
        db.flush(&ty).expect("flush should succeed");

        for ccy in ["USD", "EUR", "JPY"] {
            let got = ids_for(&db, &ty, "ccy", ccy)
                .iter()
                .filter_map(Value::as_int)
                .collect::<BTreeSet<_>>();
            prop_assert_eq!(&got, &expected.get(ccy).cloned().unwrap_or_default());
        }
    }
}
