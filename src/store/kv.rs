// src/store/kv.rs

//! Key-value backend abstraction.
//!
//! The store logic is written against [`Kv`]; backends provide hashes, sets,
//! and sorted sets plus one atomic write batch. [`MemoryKv`] is the
//! in-process backend used by tests and single-node setups.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// One mutation in an atomic write batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    StringSet { key: String, value: String },
    Del { key: String },
    HashSet { key: String, field: String, value: String },
    HashDel { key: String, field: String },
    SetAdd { key: String, member: String },
    SetRem { key: String, member: String },
    ZAdd { key: String, member: String, score: f64 },
    ZRem { key: String, member: String },
    ZIncr { key: String, member: String, delta: f64 },
}

/// Minimal key-value interface the store requires.
///
/// Readers must never observe a write batch partially applied.
#[async_trait]
pub trait Kv: Send + Sync {
    async fn string_get(&self, key: &str) -> Result<Option<String>>;
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool>;
    async fn set_card(&self, key: &str) -> Result<u64>;
    async fn set_pop(&self, key: &str) -> Result<Option<String>>;

    async fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>>;
    /// Ascending by (score, member), inclusive indices, negative `stop`
    /// counts from the end.
    async fn zset_range(&self, key: &str, start: isize, stop: isize)
        -> Result<Vec<(String, f64)>>;
    /// Descending counterpart of [`Kv::zset_range`].
    async fn zset_rev_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>>;

    /// Apply every mutation atomically.
    async fn apply(&self, ops: Vec<WriteOp>) -> Result<()>;
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    ZSet(BTreeMap<String, f64>),
}

/// In-process backend: one mutex over a map, which makes every batch
/// trivially atomic.
#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<HashMap<String, Value>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

fn wrong_type(key: &str) -> Error {
    Error::store(format!("wrong value type at key {key}"))
}

/// Clamp redis-style inclusive range indices to `0..len`.
fn clamp_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let n = len as isize;
    let mut start = if start < 0 { n + start } else { start };
    let mut stop = if stop < 0 { n + stop } else { stop };
    start = start.max(0);
    stop = stop.min(n - 1);
    if start > stop || len == 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

impl MemoryKv {
    fn sorted_entries(zset: &BTreeMap<String, f64>) -> Vec<(String, f64)> {
        let mut entries: Vec<(String, f64)> =
            zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
        entries.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        entries
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn string_get(&self, key: &str) -> Result<Option<String>> {
        let data = self.data.lock().expect("kv lock");
        match data.get(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut data = self.data.lock().expect("kv lock");
        let next = match data.get(key) {
            None => 1,
            Some(Value::Str(s)) => {
                s.parse::<i64>()
                    .map_err(|_| wrong_type(key))?
                    + 1
            }
            Some(_) => return Err(wrong_type(key)),
        };
        data.insert(key.to_string(), Value::Str(next.to_string()));
        Ok(next)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let data = self.data.lock().expect("kv lock");
        match data.get(key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(h.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let data = self.data.lock().expect("kv lock");
        match data.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Hash(h)) => Ok(h.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let data = self.data.lock().expect("kv lock");
        match data.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(s)) => Ok(s.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        let data = self.data.lock().expect("kv lock");
        match data.get(key) {
            None => Ok(false),
            Some(Value::Set(s)) => Ok(s.contains(member)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_card(&self, key: &str) -> Result<u64> {
        let data = self.data.lock().expect("kv lock");
        match data.get(key) {
            None => Ok(0),
            Some(Value::Set(s)) => Ok(s.len() as u64),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_pop(&self, key: &str) -> Result<Option<String>> {
        let mut data = self.data.lock().expect("kv lock");
        let popped = match data.get_mut(key) {
            None => return Ok(None),
            Some(Value::Set(s)) => {
                let member = s.iter().next().cloned();
                if let Some(m) = &member {
                    s.remove(m);
                }
                member
            }
            Some(_) => return Err(wrong_type(key)),
        };
        if matches!(data.get(key), Some(Value::Set(s)) if s.is_empty()) {
            data.remove(key);
        }
        Ok(popped)
    }

    async fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let data = self.data.lock().expect("kv lock");
        match data.get(key) {
            None => Ok(None),
            Some(Value::ZSet(z)) => Ok(z.get(member).copied()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zset_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let data = self.data.lock().expect("kv lock");
        match data.get(key) {
            None => Ok(Vec::new()),
            Some(Value::ZSet(z)) => {
                let entries = Self::sorted_entries(z);
                Ok(match clamp_range(entries.len(), start, stop) {
                    Some((a, b)) => entries[a..=b].to_vec(),
                    None => Vec::new(),
                })
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zset_rev_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let data = self.data.lock().expect("kv lock");
        match data.get(key) {
            None => Ok(Vec::new()),
            Some(Value::ZSet(z)) => {
                let mut entries = Self::sorted_entries(z);
                entries.reverse();
                Ok(match clamp_range(entries.len(), start, stop) {
                    Some((a, b)) => entries[a..=b].to_vec(),
                    None => Vec::new(),
                })
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut data = self.data.lock().expect("kv lock");
        let mut touched = Vec::new();
        for op in ops {
            match op {
                WriteOp::StringSet { key, value } => {
                    data.insert(key, Value::Str(value));
                }
                WriteOp::Del { key } => {
                    data.remove(&key);
                }
                WriteOp::HashSet { key, field, value } => {
                    match data
                        .entry(key)
                        .or_insert_with(|| Value::Hash(BTreeMap::new()))
                    {
                        Value::Hash(h) => {
                            h.insert(field, value);
                        }
                        _ => return Err(Error::store("wrong value type in batch")),
                    }
                }
                WriteOp::HashDel { key, field } => {
                    if let Some(Value::Hash(h)) = data.get_mut(&key) {
                        h.remove(&field);
                        touched.push(key);
                    }
                }
                WriteOp::SetAdd { key, member } => {
                    match data
                        .entry(key)
                        .or_insert_with(|| Value::Set(BTreeSet::new()))
                    {
                        Value::Set(s) => {
                            s.insert(member);
                        }
                        _ => return Err(Error::store("wrong value type in batch")),
                    }
                }
                WriteOp::SetRem { key, member } => {
                    if let Some(Value::Set(s)) = data.get_mut(&key) {
                        s.remove(&member);
                        touched.push(key);
                    }
                }
                WriteOp::ZAdd { key, member, score } => {
                    match data
                        .entry(key)
                        .or_insert_with(|| Value::ZSet(BTreeMap::new()))
                    {
                        Value::ZSet(z) => {
                            z.insert(member, score);
                        }
                        _ => return Err(Error::store("wrong value type in batch")),
                    }
                }
                WriteOp::ZRem { key, member } => {
                    if let Some(Value::ZSet(z)) = data.get_mut(&key) {
                        z.remove(&member);
                        touched.push(key);
                    }
                }
                WriteOp::ZIncr { key, member, delta } => {
                    match data
                        .entry(key)
                        .or_insert_with(|| Value::ZSet(BTreeMap::new()))
                    {
                        Value::ZSet(z) => {
                            *z.entry(member).or_insert(0.0) += delta;
                        }
                        _ => return Err(Error::store("wrong value type in batch")),
                    }
                }
            }
        }
        // Removal ops leave no empty containers behind.
        for key in touched {
            let empty = match data.get(&key) {
                Some(Value::Hash(h)) => h.is_empty(),
                Some(Value::Set(s)) => s.is_empty(),
                Some(Value::ZSet(z)) => z.is_empty(),
                _ => false,
            };
            if empty {
                data.remove(&key);
            }
        }
        Ok(())
    }
}
