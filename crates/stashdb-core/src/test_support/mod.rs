//! Shared fixtures for unit tests: record types and a store wrapper that
//! fails on demand.

use crate::{
    db::store::{MemoryStore, StoreClient, StoreError, StoreResult},
    model::{FieldModel, RecordType},
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

/// `Instrument { name: unique symbol, ccy: indexed symbol }`.
pub(crate) fn instrument_type() -> Arc<RecordType> {
    RecordType::builder("Instrument")
        .field(FieldModel::symbol("name").unique())
        .field(FieldModel::symbol("ccy"))
        .build()
        .expect("instrument type should build")
}

/// `Fund` with free text and a structure-backed history list.
pub(crate) fn fund_type() -> Arc<RecordType> {
    RecordType::builder("Fund")
        .field(FieldModel::symbol("name").unique())
        .field(FieldModel::symbol("ccy"))
        .field(FieldModel::text("description"))
        .field(FieldModel::list("history"))
        .build()
        .expect("fund type should build")
}

/// `Position` relating an instrument to a fund.
pub(crate) fn position_type() -> Arc<RecordType> {
    RecordType::builder("Position")
        .field(FieldModel::foreign_key("instrument", "Instrument"))
        .field(FieldModel::foreign_key("fund", "Fund").related_name("positions"))
        .field(FieldModel::float("size"))
        .field(FieldModel::date("dt").optional())
        .build()
        .expect("position type should build")
}

/// `TimeSerie` keyed by ticker with an integer-keyed data map.
pub(crate) fn time_serie_type() -> Arc<RecordType> {
    RecordType::builder("TimeSerie")
        .field(FieldModel::symbol("ticker").unique())
        .field(FieldModel::sorted_map("data"))
        .build()
        .expect("time serie type should build")
}

///
/// FaultyStore
///
/// In-process store that fails the first call of one chosen command.
/// Every other call passes through to a [`MemoryStore`].
///

#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    inner: MemoryStore,
    fail_on: Mutex<Option<&'static str>>,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot failure for `command` (e.g. `"mset"`).
    pub(crate) fn fail_next(&self, command: &'static str) {
        *self.fail_on.lock() = Some(command);
    }

    pub(crate) const fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self, command: &'static str) -> StoreResult<()> {
        let mut armed = self.fail_on.lock();
        if *armed == Some(command) {
            *armed = None;
            return Err(StoreError::Unavailable(format!("injected failure on {command}")));
        }

        Ok(())
    }
}

impl StoreClient for FaultyStore {
    fn name(&self) -> &str {
        "faulty"
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check("get")?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        self.check("set")?;
        self.inner.set(key, value, ttl)
    }

    fn mset(&self, pairs: &[(String, Vec<u8>)]) -> StoreResult<()> {
        self.check("mset")?;
        self.inner.mset(pairs)
    }

    fn del(&self, keys: &[String]) -> StoreResult<u64> {
        self.check("del")?;
        self.inner.del(keys)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check("exists")?;
        self.inner.exists(key)
    }

    fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check("expire")?;
        self.inner.expire(key, ttl)
    }

    fn incr(&self, key: &str) -> StoreResult<i64> {
        self.check("incr")?;
        self.inner.incr(key)
    }

    fn hset(&self, key: &str, field: &str, value: &[u8]) -> StoreResult<bool> {
        self.check("hset")?;
        self.inner.hset(key, field, value)
    }

    fn hmset(&self, key: &str, pairs: &[(String, Vec<u8>)]) -> StoreResult<()> {
        self.check("hmset")?;
        self.inner.hmset(key, pairs)
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check("hget")?;
        self.inner.hget(key, field)
    }

    fn hmget(&self, key: &str, fields: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.check("hmget")?;
        self.inner.hmget(key, fields)
    }

    fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        self.check("hkeys")?;
        self.inner.hkeys(key)
    }

    fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        self.check("hgetall")?;
        self.inner.hgetall(key)
    }

    fn hdel(&self, key: &str, fields: &[String]) -> StoreResult<u64> {
        self.check("hdel")?;
        self.inner.hdel(key, fields)
    }

    fn hlen(&self, key: &str) -> StoreResult<u64> {
        self.check("hlen")?;
        self.inner.hlen(key)
    }

    fn sadd(&self, key: &str, members: &[Vec<u8>]) -> StoreResult<u64> {
        self.check("sadd")?;
        self.inner.sadd(key, members)
    }

    fn srem(&self, key: &str, members: &[Vec<u8>]) -> StoreResult<u64> {
        self.check("srem")?;
        self.inner.srem(key, members)
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        self.check("smembers")?;
        self.inner.smembers(key)
    }

    fn sismember(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        self.check("sismember")?;
        self.inner.sismember(key, member)
    }

    fn scard(&self, key: &str) -> StoreResult<u64> {
        self.check("scard")?;
        self.inner.scard(key)
    }

    fn sinter(&self, keys: &[String]) -> StoreResult<Vec<Vec<u8>>> {
        self.check("sinter")?;
        self.inner.sinter(keys)
    }

    fn zadd(&self, key: &str, members: &[(f64, Vec<u8>)]) -> StoreResult<u64> {
        self.check("zadd")?;
        self.inner.zadd(key, members)
    }

    fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        desc: bool,
    ) -> StoreResult<Vec<(Vec<u8>, f64)>> {
        self.check("zrangebyscore")?;
        self.inner.zrangebyscore(key, min, max, desc)
    }

    fn zcard(&self, key: &str) -> StoreResult<u64> {
        self.check("zcard")?;
        self.inner.zcard(key)
    }

    fn lpush(&self, key: &str, values: &[Vec<u8>]) -> StoreResult<u64> {
        self.check("lpush")?;
        self.inner.lpush(key, values)
    }

    fn rpush(&self, key: &str, values: &[Vec<u8>]) -> StoreResult<u64> {
        self.check("rpush")?;
        self.inner.rpush(key, values)
    }

    fn lpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check("lpop")?;
        self.inner.lpop(key)
    }

    fn rpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check("rpop")?;
        self.inner.rpop(key)
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Vec<u8>>> {
        self.check("lrange")?;
        self.inner.lrange(key, start, stop)
    }

    fn llen(&self, key: &str) -> StoreResult<u64> {
        self.check("llen")?;
        self.inner.llen(key)
    }

    fn flushdb(&self) -> StoreResult<()> {
        self.check("flushdb")?;
        self.inner.flushdb()
    }
}
