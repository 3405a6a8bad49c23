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

//! Queue storage backed by a Redis list.
//!
//! Each queue is one Redis list holding task ids in FIFO order, and each
//! payload lives in a separate string key named after its task id.  This
//! backend has no native delay support, so `delay_until` is ignored and
//! delayed delivery falls to the caller.

use crate::backend::{validate_queue_name, Backend, BackendError, BackendResult};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// Takes a raw Redis error `e` and converts it to our backend error type.
pub(super) fn map_redis_error(e: redis::RedisError) -> BackendError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        BackendError::Connection(e.to_string())
    } else {
        BackendError::Backend(e.to_string())
    }
}

/// Queue storage backed by a Redis list per queue.
#[derive(Clone)]
pub struct RedisListBackend {
    /// Shared multiplexed connection to the Redis server.
    conn: MultiplexedConnection,
}

impl RedisListBackend {
    /// Creates a new backend for the server identified by `conn_str`, which
    /// is a Redis URL such as `redis://localhost:6379/0`.
    pub async fn connect(conn_str: &str) -> BackendResult<Self> {
        let client = redis::Client::open(conn_str)
            .map_err(|e| BackendError::InvalidDsn(conn_str.to_owned(), e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl Backend for RedisListBackend {
    async fn len(&self, queue_name: &str) -> BackendResult<usize> {
        validate_queue_name(queue_name)?;
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(queue_name).await.map_err(map_redis_error)?;
        Ok(len)
    }

    async fn push(
        &self,
        queue_name: &str,
        task_id: &str,
        data: &str,
        _delay_until: Option<i64>,
    ) -> BackendResult<String> {
        validate_queue_name(queue_name)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(task_id, data).await.map_err(map_redis_error)?;
        let _: () = conn.rpush(queue_name, task_id).await.map_err(map_redis_error)?;
        Ok(task_id.to_owned())
    }

    async fn pop(&self, queue_name: &str) -> BackendResult<Option<String>> {
        validate_queue_name(queue_name)?;
        let mut conn = self.conn.clone();
        let task_id: Option<String> =
            conn.lpop(queue_name, None).await.map_err(map_redis_error)?;
        let task_id = match task_id {
            Some(task_id) => task_id,
            None => return Ok(None),
        };
        let data: Option<String> = conn.get(&task_id).await.map_err(map_redis_error)?;
        let _: () = conn.del(&task_id).await.map_err(map_redis_error)?;
        Ok(data)
    }

    async fn get(&self, queue_name: &str, task_id: &str) -> BackendResult<Option<String>> {
        validate_queue_name(queue_name)?;
        let mut conn = self.conn.clone();
        let removed: usize = conn.lrem(queue_name, 1, task_id).await.map_err(map_redis_error)?;
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
            conn.lrange(queue_name, 0, -1).await.map_err(map_redis_error)?;
        for task_id in task_ids {
            let _: () = conn.del(task_id).await.map_err(map_redis_error)?;
        }
        let _: () = conn.del(queue_name).await.map_err(map_redis_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::*;
    use crate::clocks::testutils::SettableClock;
    use std::sync::Arc;
    use time::macros::datetime;

    async fn setup() -> (Arc<dyn Backend>, Arc<SettableClock>) {
        let clock = Arc::new(SettableClock::new(datetime!(2024-06-01 12:00:00 UTC)));
        let backend = RedisListBackend::connect("redis://localhost:6379/0").await.unwrap();
        backend.drop_all("all").await.unwrap();
        (Arc::new(backend), clock)
    }

    generate_backend_tests!(setup().await, #[ignore = "Requires a local Redis server"]);
}
