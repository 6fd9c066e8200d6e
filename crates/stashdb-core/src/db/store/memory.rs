use crate::db::store::{StoreClient, StoreError, StoreResult};
use parking_lot::RwLock;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::atomic::{AtomicU32, Ordering as AtomicOrdering},
    time::{Duration, Instant},
};

// Writes between full sweeps of expired keys.
pub(super) const SWEEP_INTERVAL: u32 = 1024;

///
/// Slot
///
/// Container held at one key.
///

#[derive(Debug)]
enum Slot {
    Bytes(Vec<u8>),
    Hash(BTreeMap<String, Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
    Sorted(BTreeMap<Vec<u8>, f64>),
    List(VecDeque<Vec<u8>>),
}

impl Slot {
    // Containers disappear when their last element goes, as in Redis.
    fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(_) => false,
            Self::Hash(h) => h.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::Sorted(z) => z.is_empty(),
            Self::List(l) => l.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    const fn new(slot: Slot) -> Self {
        Self {
            slot,
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn wrong_type(key: &str, expected: &'static str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
    }
}

// Live set at `key` inside an already held map guard.
fn live_set<'a>(
    entries: &'a HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> StoreResult<Option<&'a BTreeSet<Vec<u8>>>> {
    match entries.get(key).filter(|entry| entry.is_live(now)) {
        None => Ok(None),
        Some(Entry {
            slot: Slot::Set(set),
            ..
        }) => Ok(Some(set)),
        Some(_) => Err(wrong_type(key, "set")),
    }
}

fn usize_to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

///
/// MemoryStore
///
/// In-process store client. A reader/writer lock guards the key map:
/// readers never observe a partially applied command and writers are
/// mutually exclusive. Expired keys are treated as absent on read, purged
/// on the next write that touches them, and swept from the whole map every
/// `SWEEP_INTERVAL` writes.
///

#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    entries: RwLock<HashMap<String, Entry>>,
    writes: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::named("memory")
    }

    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
            writes: AtomicU32::new(0),
        }
    }

    /// Live keys starting with `prefix`, sorted.
    #[must_use]
    pub fn keys(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.read();
        let mut keys = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        keys.sort();

        keys
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));

        before - entries.len()
    }

    // Run `f` against the live slot at `key` under the read lock.
    fn read<R>(&self, key: &str, f: impl FnOnce(Option<&Slot>) -> StoreResult<R>) -> StoreResult<R> {
        let now = Instant::now();
        let entries = self.entries.read();
        let slot = entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| &entry.slot);

        f(slot)
    }

    // Run `f` against the slot at `key` under the write lock, creating it
    // with `make` when absent and dropping it if `f` leaves it empty.
    fn write<R>(
        &self,
        key: &str,
        make: fn() -> Slot,
        f: impl FnOnce(&mut Slot) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let writes = self.writes.fetch_add(1, AtomicOrdering::Relaxed);
        if writes % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            entries.retain(|_, entry| entry.is_live(now));
        } else if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(make()));
        let result = f(&mut entry.slot);
        if entry.slot.is_empty() {
            entries.remove(key);
        }

        result
    }

    fn read_hash<R>(
        &self,
        key: &str,
        f: impl FnOnce(&BTreeMap<String, Vec<u8>>) -> R,
        missing: R,
    ) -> StoreResult<R> {
        self.read(key, |slot| match slot {
            None => Ok(missing),
            Some(Slot::Hash(h)) => Ok(f(h)),
            Some(_) => Err(wrong_type(key, "hash")),
        })
    }

    fn write_hash<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut BTreeMap<String, Vec<u8>>) -> R,
    ) -> StoreResult<R> {
        self.write(
            key,
            || Slot::Hash(BTreeMap::new()),
            |slot| match slot {
                Slot::Hash(h) => Ok(f(h)),
                _ => Err(wrong_type(key, "hash")),
            },
        )
    }

    fn read_set<R>(
        &self,
        key: &str,
        f: impl FnOnce(&BTreeSet<Vec<u8>>) -> R,
        missing: R,
    ) -> StoreResult<R> {
        self.read(key, |slot| match slot {
            None => Ok(missing),
            Some(Slot::Set(s)) => Ok(f(s)),
            Some(_) => Err(wrong_type(key, "set")),
        })
    }

    fn write_set<R>(&self, key: &str, f: impl FnOnce(&mut BTreeSet<Vec<u8>>) -> R) -> StoreResult<R> {
        self.write(
            key,
            || Slot::Set(BTreeSet::new()),
            |slot| match slot {
                Slot::Set(s) => Ok(f(s)),
                _ => Err(wrong_type(key, "set")),
            },
        )
    }

    fn read_sorted<R>(
        &self,
        key: &str,
        f: impl FnOnce(&BTreeMap<Vec<u8>, f64>) -> R,
        missing: R,
    ) -> StoreResult<R> {
        self.read(key, |slot| match slot {
            None => Ok(missing),
            Some(Slot::Sorted(z)) => Ok(f(z)),
            Some(_) => Err(wrong_type(key, "sorted set")),
        })
    }

    fn read_list<R>(
        &self,
        key: &str,
        f: impl FnOnce(&VecDeque<Vec<u8>>) -> R,
        missing: R,
    ) -> StoreResult<R> {
        self.read(key, |slot| match slot {
            None => Ok(missing),
            Some(Slot::List(l)) => Ok(f(l)),
            Some(_) => Err(wrong_type(key, "list")),
        })
    }

    fn write_list<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut VecDeque<Vec<u8>>) -> R,
    ) -> StoreResult<R> {
        self.write(
            key,
            || Slot::List(VecDeque::new()),
            |slot| match slot {
                Slot::List(l) => Ok(f(l)),
                _ => Err(wrong_type(key, "list")),
            },
        )
    }
}

impl StoreClient for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.read(key, |slot| match slot {
            None => Ok(None),
            Some(Slot::Bytes(b)) => Ok(Some(b.clone())),
            Some(_) => Err(wrong_type(key, "string")),
        })
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let now = Instant::now();
        let entry = Entry {
            slot: Slot::Bytes(value.to_vec()),
            expires_at: ttl.map(|ttl| now + ttl),
        };
        self.entries.write().insert(key.to_string(), entry);

        Ok(())
    }

    fn mset(&self, pairs: &[(String, Vec<u8>)]) -> StoreResult<()> {
        let mut entries = self.entries.write();
        for (key, value) in pairs {
            entries.insert(key.clone(), Entry::new(Slot::Bytes(value.clone())));
        }

        Ok(())
    }

    fn del(&self, keys: &[String]) -> StoreResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();

        Ok(usize_to_u64(removed))
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.read(key, |slot| Ok(slot.is_some()))
    }

    fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(key).filter(|entry| entry.is_live(now)) else {
            return Ok(false);
        };

        if ttl.is_zero() {
            entries.remove(key);
        } else {
            entry.expires_at = Some(now + ttl);
        }

        Ok(true)
    }

    fn incr(&self, key: &str) -> StoreResult<i64> {
        self.write(
            key,
            || Slot::Bytes(b"0".to_vec()),
            |slot| {
                let Slot::Bytes(bytes) = slot else {
                    return Err(wrong_type(key, "string"));
                };
                let next = std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|text| text.parse::<i64>().ok())
                    .and_then(|n| n.checked_add(1))
                    .ok_or_else(|| StoreError::NotInteger {
                        key: key.to_string(),
                    })?;
                *bytes = next.to_string().into_bytes();

                Ok(next)
            },
        )
    }

    fn hset(&self, key: &str, field: &str, value: &[u8]) -> StoreResult<bool> {
        self.write_hash(key, |h| h.insert(field.to_string(), value.to_vec()).is_none())
    }

    fn hmset(&self, key: &str, pairs: &[(String, Vec<u8>)]) -> StoreResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        self.write_hash(key, |h| {
            for (field, value) in pairs {
                h.insert(field.clone(), value.clone());
            }
        })
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        self.read_hash(key, |h| h.get(field).cloned(), None)
    }

    fn hmget(&self, key: &str, fields: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.read_hash(
            key,
            |h| fields.iter().map(|field| h.get(field).cloned()).collect(),
            vec![None; fields.len()],
        )
    }

    fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        self.read_hash(key, |h| h.keys().cloned().collect(), Vec::new())
    }

    fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        self.read_hash(
            key,
            |h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Vec::new(),
        )
    }

    fn hdel(&self, key: &str, fields: &[String]) -> StoreResult<u64> {
        self.write_hash(key, |h| {
            usize_to_u64(fields.iter().filter(|field| h.remove(*field).is_some()).count())
        })
    }

    fn hlen(&self, key: &str) -> StoreResult<u64> {
        self.read_hash(key, |h| usize_to_u64(h.len()), 0)
    }

    fn sadd(&self, key: &str, members: &[Vec<u8>]) -> StoreResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        self.write_set(key, |s| {
            usize_to_u64(members.iter().filter(|m| s.insert((*m).clone())).count())
        })
    }

    fn srem(&self, key: &str, members: &[Vec<u8>]) -> StoreResult<u64> {
        self.write_set(key, |s| {
            usize_to_u64(members.iter().filter(|m| s.remove(*m)).count())
        })
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        self.read_set(key, |s| s.iter().cloned().collect(), Vec::new())
    }

    fn sismember(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        self.read_set(key, |s| s.contains(member), false)
    }

    fn scard(&self, key: &str) -> StoreResult<u64> {
        self.read_set(key, |s| usize_to_u64(s.len()), 0)
    }

    fn sinter(&self, keys: &[String]) -> StoreResult<Vec<Vec<u8>>> {
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };

        // Every key is read under one guard.
        let now = Instant::now();
        let entries = self.entries.read();
        let set_at = |key: &str| live_set(&entries, key, now);

        let mut result = set_at(first.as_str())?.cloned().unwrap_or_default();
        for key in rest {
            match set_at(key.as_str())? {
                Some(other) => result.retain(|member| other.contains(member)),
                None => result.clear(),
            }
        }

        Ok(result.into_iter().collect())
    }

    fn zadd(&self, key: &str, members: &[(f64, Vec<u8>)]) -> StoreResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        self.write(
            key,
            || Slot::Sorted(BTreeMap::new()),
            |slot| match slot {
                Slot::Sorted(z) => Ok(usize_to_u64(
                    members
                        .iter()
                        .filter(|(score, member)| z.insert(member.clone(), *score).is_none())
                        .count(),
                )),
                _ => Err(wrong_type(key, "sorted set")),
            },
        )
    }

    fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        desc: bool,
    ) -> StoreResult<Vec<(Vec<u8>, f64)>> {
        self.read_sorted(
            key,
            |z| {
                let mut hits = z
                    .iter()
                    .filter(|(_, score)| **score >= min && **score <= max)
                    .map(|(member, score)| (member.clone(), *score))
                    .collect::<Vec<_>>();
                hits.sort_by(|a, b| match a.1.total_cmp(&b.1) {
                    Ordering::Equal => a.0.cmp(&b.0),
                    other => other,
                });
                if desc {
                    hits.reverse();
                }

                hits
            },
            Vec::new(),
        )
    }

    fn zcard(&self, key: &str) -> StoreResult<u64> {
        self.read_sorted(key, |z| usize_to_u64(z.len()), 0)
    }

    fn lpush(&self, key: &str, values: &[Vec<u8>]) -> StoreResult<u64> {
        if values.is_empty() {
            return self.llen(key);
        }

        self.write_list(key, |l| {
            for value in values {
                l.push_front(value.clone());
            }
            usize_to_u64(l.len())
        })
    }

    fn rpush(&self, key: &str, values: &[Vec<u8>]) -> StoreResult<u64> {
        if values.is_empty() {
            return self.llen(key);
        }

        self.write_list(key, |l| {
            l.extend(values.iter().cloned());
            usize_to_u64(l.len())
        })
    }

    fn lpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.write_list(key, VecDeque::pop_front)
    }

    fn rpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.write_list(key, VecDeque::pop_back)
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Vec<u8>>> {
        self.read_list(
            key,
            |l| {
                let len = i64::try_from(l.len()).unwrap_or(i64::MAX);
                let start = if start < 0 { (len + start).max(0) } else { start };
                let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
                if start > stop || start >= len {
                    return Vec::new();
                }

                l.iter()
                    .skip(usize::try_from(start).unwrap_or(usize::MAX))
                    .take(usize::try_from(stop - start + 1).unwrap_or(0))
                    .cloned()
                    .collect()
            },
            Vec::new(),
        )
    }

    fn llen(&self, key: &str) -> StoreResult<u64> {
        self.read_list(key, |l| usize_to_u64(l.len()), 0)
    }

    fn flushdb(&self) -> StoreResult<()> {
        self.entries.write().clear();

        Ok(())
    }
}
