// src/store/redis.rs

//! Redis backend for the [`Kv`] trait.
//!
//! Reads go through a multiplexed async connection; write batches are issued
//! as MULTI/EXEC pipelines so readers never observe a partial batch.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use super::kv::{Kv, WriteOp};
use crate::error::Result;

pub struct RedisKv {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisKv {
    /// Connect to the store at `url` (e.g. `redis://127.0.0.1:6379`).
    /// `idle_timeout` bounds how long a command may wait on the connection.
    pub async fn connect(url: &str, idle_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let config = redis::AsyncConnectionConfig::new().set_response_timeout(idle_timeout);
        let conn = client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;
        Ok(Self { conn })
    }

    fn conn(&self) -> redis::aio::MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl Kv for RedisKv {
    async fn string_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.conn().get(key).await?)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        Ok(self.conn().incr(key, 1).await?)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.conn().hget(key, field).await?)
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let map: std::collections::HashMap<String, String> = self.conn().hgetall(key).await?;
        Ok(map.into_iter().collect())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.conn().smembers(key).await?)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.conn().sismember(key, member).await?)
    }

    async fn set_card(&self, key: &str) -> Result<u64> {
        Ok(self.conn().scard(key).await?)
    }

    async fn set_pop(&self, key: &str) -> Result<Option<String>> {
        Ok(self.conn().spop(key).await?)
    }

    async fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        Ok(self.conn().zscore(key, member).await?)
    }

    async fn zset_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        Ok(self.conn().zrange_withscores(key, start, stop).await?)
    }

    async fn zset_rev_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        Ok(self.conn().zrevrange_withscores(key, start, stop).await?)
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                WriteOp::StringSet { key, value } => {
                    pipe.set(key, value).ignore();
                }
                WriteOp::Del { key } => {
                    pipe.del(key).ignore();
                }
                WriteOp::HashSet { key, field, value } => {
                    pipe.hset(key, field, value).ignore();
                }
                WriteOp::HashDel { key, field } => {
                    pipe.hdel(key, field).ignore();
                }
                WriteOp::SetAdd { key, member } => {
                    pipe.sadd(key, member).ignore();
                }
                WriteOp::SetRem { key, member } => {
                    pipe.srem(key, member).ignore();
                }
                WriteOp::ZAdd { key, member, score } => {
                    pipe.zadd(key, member, *score).ignore();
                }
                WriteOp::ZRem { key, member } => {
                    pipe.zrem(key, member).ignore();
                }
                WriteOp::ZIncr { key, member, delta } => {
                    pipe.zincr(key, member, *delta).ignore();
                }
            }
        }
        pipe.query_async::<()>(&mut self.conn()).await?;
        Ok(())
    }
}
