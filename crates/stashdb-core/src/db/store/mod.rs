//! Store client contract.
//!
//! The engine talks to the remote key-value store only through
//! [`StoreClient`]: a primitive command set (strings, hashes, sets, sorted
//! sets, lists) with store-agnostic names. Every call is a blocking
//! operation; values and members are raw bytes, keys and hash fields are
//! text. A client may be shared by any number of record types.

mod memory;

use std::time::Duration;
use thiserror::Error as ThisError;

pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

///
/// StoreError
///
/// Failure reported by a store client command.
///

#[derive(Clone, Debug, ThisError)]
pub enum StoreError {
    #[error("WRONGTYPE key '{key}' does not hold a {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("value at '{key}' is not an integer or out of range")]
    NotInteger { key: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store command {command} failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },
}

///
/// StoreClient
///
/// Primitive command set consumed by the commit protocol, the remote
/// structures and the query resolver.
///

pub trait StoreClient: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    // keys
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()>;
    fn mset(&self, pairs: &[(String, Vec<u8>)]) -> StoreResult<()>;
    fn del(&self, keys: &[String]) -> StoreResult<u64>;
    fn exists(&self, key: &str) -> StoreResult<bool>;
    fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;
    /// Atomically increment the integer at `key` (missing counts as 0).
    fn incr(&self, key: &str) -> StoreResult<i64>;

    // hashes
    fn hset(&self, key: &str, field: &str, value: &[u8]) -> StoreResult<bool>;
    fn hmset(&self, key: &str, pairs: &[(String, Vec<u8>)]) -> StoreResult<()>;
    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>>;
    fn hmget(&self, key: &str, fields: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>>;
    fn hkeys(&self, key: &str) -> StoreResult<Vec<String>>;
    fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;
    fn hdel(&self, key: &str, fields: &[String]) -> StoreResult<u64>;
    fn hlen(&self, key: &str) -> StoreResult<u64>;

    // sets
    fn sadd(&self, key: &str, members: &[Vec<u8>]) -> StoreResult<u64>;
    fn srem(&self, key: &str, members: &[Vec<u8>]) -> StoreResult<u64>;
    fn smembers(&self, key: &str) -> StoreResult<Vec<Vec<u8>>>;
    fn sismember(&self, key: &str, member: &[u8]) -> StoreResult<bool>;
    fn scard(&self, key: &str) -> StoreResult<u64>;
    fn sinter(&self, keys: &[String]) -> StoreResult<Vec<Vec<u8>>>;

    // sorted sets
    fn zadd(&self, key: &str, members: &[(f64, Vec<u8>)]) -> StoreResult<u64>;
    /// Members with `min <= score <= max`, ascending unless `desc`.
    fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        desc: bool,
    ) -> StoreResult<Vec<(Vec<u8>, f64)>>;
    fn zcard(&self, key: &str) -> StoreResult<u64>;

    // lists
    fn lpush(&self, key: &str, values: &[Vec<u8>]) -> StoreResult<u64>;
    fn rpush(&self, key: &str, values: &[Vec<u8>]) -> StoreResult<u64>;
    fn lpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    fn rpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    /// Inclusive range; negative indexes count from the tail.
    fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Vec<u8>>>;
    fn llen(&self, key: &str) -> StoreResult<u64>;

    /// Remove every key in the store.
    fn flushdb(&self) -> StoreResult<()>;
}
