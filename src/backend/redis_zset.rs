// Hopper
// Copyright 2025 The Hopper Authors
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Queue storage backed by a Redis sorted set.
//!
//! Each queue is one sorted set whose members are task ids scored by the
//! timestamp at which they become eligible, so delayed delivery is native.
//! `pop` returns the earliest eligible entry rather than the oldest pushed
//! one, and ids pushed with the same eligibility time come out in
//! lexicographic order.

use crate::backend::redis_list::map_redis_error;
use crate::backend::{validate_queue_name, Backend, BackendError, BackendResult};
use crate::clocks::Clock;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;

/// Queue storage backed by a Redis sorted set per queue.
#[derive(Clone)]
pub struct RedisZsetBackend {
    /// Shared multiplexed connection to the Redis server.
    conn: MultiplexedConnection,

    /// Clock used to score entries and to decide which are eligible.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl RedisZsetBackend {
    /// Creates a new backend for the server identified by `conn_str`, which
    /// is a Redis URL under the `redis+zset` scheme, such as
    /// `redis+zset://localhost:6379/0`.
    pub async fn connect(
        conn_str: &str,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> BackendResult<Self> {
        let url = conn_str.replacen("redis+zset", "redis", 1);
        let client = redis::Client::open(url)
            .map_err(|e| BackendError::InvalidDsn(conn_str.to_owned(), e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self { conn, clock })
    }
}

#[async_trait::async_trait]
impl Backend for RedisZsetBackend {
    async fn len(&self, queue_name: &str) -> BackendResult<usize> {
        validate_queue_name(queue_name)?;
        let mut conn = self.conn.clone();
        let len: usize = conn.zcard(queue_name).await.map_err(map_redis_error)?;
        Ok(len)
    }

    async fn push(
        &self,
        queue_name: &str,
        task_id: &str,
        data: &str,
        delay_until: Option<i64>,
    ) -> BackendResult<String> {
        validate_queue_name(queue_name)?;
        let score = delay_until.unwrap_or_else(|| self.clock.now_ts());
        let mut conn = self.conn.clone();
        let _: () = conn.set(task_id, data).await.map_err(map_redis_error)?;
        let _: () = conn.zadd(queue_name, task_id, score).await.map_err(map_redis_error)?;
        Ok(task_id.to_owned())
    }

    async fn pop(&self, queue_name: &str) -> BackendResult<Option<String>> {
        validate_queue_name(queue_name)?;
        let now = self.clock.now_ts();
        let mut conn = self.conn.clone();
        let task_ids: Vec<String> = conn
            .zrangebyscore_limit(queue_name, "-inf", now, 0, 1)
            .await
            .map_err(map_redis_error)?;
        let task_id = match task_ids.into_iter().next() {
            Some(task_id) => task_id,
            None => return Ok(None),
        };
        let _: () = conn.zrem(queue_name, &task_id).await.map_err(map_redis_error)?;
        let data: Option<String> = conn.get(&task_id).await.map_err(map_redis_error)?;
        let _: () = conn.del(&task_id).await.map_err(map_redis_error)?;
        Ok(data)
    }

    async fn get(&self, queue_name: &str, task_id: &str) -> BackendResult<Option<String>> {
        validate_queue_name(queue_name)?;
        let mut conn = self.conn.clone();
        let removed: usize = conn.zrem(queue_name, task_id).await.map_err(map_redis_error)?;
        if removed == 0 {
            return Ok(None);
        }
        let data: Option<String> = conn.get(task_id).await.map_err(map_redis_error)?;
        let _: () = conn.del(task_id).await.map_err(map_redis_error)?;
        Ok(data)
    }

    async fn drop_all(&self, queue_name: &str) -> BackendResult<()> {
        validate_queue_name(queue_name)?;
        let mut conn = self.conn.clone();
        let task_ids: Vec<String> =
            conn.zrange(queue_name, 0, -1).await.map_err(map_redis_error)?;
        for task_id in task_ids {
            let _: () = conn.del(task_id).await.map_err(map_redis_error)?;
        }
        let _: () = conn.del(queue_name).await.map_err(map_redis_error)?;
        Ok(())
    }
}
