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

//! Storage backends for queued tasks.
//!
//! Every backend presents the same five per-queue operations over a very
//! different underlying primitive: an in-memory list, a relational table, a
//! key-value list, a score-sorted set, or a managed distributed queue.  The
//! concrete client is picked from the scheme of a connection string of the
//! form `<scheme>://...` at construction time.
//!
//! Connection failures surface directly to the caller: there is no
//! reconnect or retry logic at this layer.  Task-level retries live one
//! level up, in the coordinator.

use crate::clocks::Clock;
use async_trait::async_trait;
use std::sync::Arc;

mod locmem;
pub use locmem::LocmemBackend;

#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

#[cfg(feature = "redis")]
mod redis_list;
#[cfg(feature = "redis")]
pub use redis_list::RedisListBackend;

#[cfg(feature = "redis")]
mod redis_zset;
#[cfg(feature = "redis")]
pub use redis_zset::RedisZsetBackend;

#[cfg(feature = "sqs")]
mod sqs;
#[cfg(feature = "sqs")]
pub use sqs::SqsBackend;

#[cfg(test)]
mod tests;

/// Backend errors.  Any unexpected errors that come from the underlying
/// store are classified as `Backend`, but errors we know about have more
/// specific types.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Catch-all error type for unexpected storage errors.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The connection to the underlying store failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection string could not be understood.
    #[error("Invalid connection string '{0}': {1}")]
    InvalidDsn(String, String),

    /// The queue name cannot be represented by this backend.
    #[error("Invalid queue name '{0}': only letters, digits and underscores are allowed")]
    InvalidQueueName(String),

    /// The scheme of the connection string does not name a known backend.
    #[error("No such backend scheme '{0}'")]
    UnknownScheme(String),

    /// The backend cannot support the requested operation at all.
    #[error("{0}")]
    Unsupported(&'static str),
}

/// Result type for this module.
pub type BackendResult<T> = Result<T, BackendError>;

/// Uniform interface over a concrete queue technology.
///
/// All operations are parameterized by a queue name; queues are independent
/// of each other and there is no cross-queue state.  Mutual exclusion among
/// concurrent consumers is delegated to the atomicity guarantees each
/// backend provides for `pop` and `get`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the number of tasks in the queue.
    ///
    /// The exact semantics are backend-specific: most backends count
    /// delayed entries too (a plain queue-depth semantic), while the
    /// managed-queue backend reports the provider's approximate count of
    /// visible messages.
    async fn len(&self, queue_name: &str) -> BackendResult<usize>;

    /// Stores the serialized task `data` under `task_id` in the queue and
    /// returns the effective identifier.
    ///
    /// Most backends honor the caller-supplied `task_id`; a backend that
    /// cannot (the managed-queue one) returns a provider-assigned id, which
    /// callers must adopt for subsequent addressing.
    ///
    /// If `delay_until` (Unix seconds) is given, the task must not become
    /// eligible for `pop` before that time on backends with native delay
    /// support; backends without it ignore the value.
    async fn push(
        &self,
        queue_name: &str,
        task_id: &str,
        data: &str,
        delay_until: Option<i64>,
    ) -> BackendResult<String>;

    /// Removes and returns the oldest eligible entry, or `None` if the
    /// queue is empty or every entry is still delayed.
    ///
    /// Eligible entries come back in FIFO insertion order, except on the
    /// sorted-set backend which orders by delay timestamp.  That divergence
    /// is intentional; a consumer choosing that backend has opted into
    /// timestamp ordering.
    async fn pop(&self, queue_name: &str) -> BackendResult<Option<String>>;

    /// Removes and returns the entry stored under `task_id` regardless of
    /// its position or delay state, or `None` if it is absent.
    ///
    /// Backends that cannot address individual entries fail fast with
    /// `BackendError::Unsupported`.
    async fn get(&self, queue_name: &str, task_id: &str) -> BackendResult<Option<String>>;

    /// Removes every entry from the queue, including any payload entries
    /// keyed by task id.
    async fn drop_all(&self, queue_name: &str) -> BackendResult<()>;
}

/// Resolves `conn_string` to a concrete backend client.
///
/// The scheme (the text before the first `:`) picks the implementation:
/// `locmem`, `sqlite`, `redis` (list), `redis+zset` (sorted set), or `sqs`.
/// Unknown schemes, including schemes for backends compiled out via cargo
/// features, fail with `BackendError::UnknownScheme`.
pub async fn connect(
    conn_string: &str,
    clock: Arc<dyn Clock + Send + Sync>,
) -> BackendResult<Arc<dyn Backend>> {
    let scheme = conn_string.split(':').next().unwrap_or("");
    match scheme {
        "locmem" => Ok(Arc::new(LocmemBackend::new(clock))),

        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteBackend::connect(conn_string, clock).await?)),

        #[cfg(feature = "redis")]
        "redis" => Ok(Arc::new(RedisListBackend::connect(conn_string).await?)),

        #[cfg(feature = "redis")]
        "redis+zset" => Ok(Arc::new(RedisZsetBackend::connect(conn_string, clock).await?)),

        #[cfg(feature = "sqs")]
        "sqs" => Ok(Arc::new(SqsBackend::connect(conn_string, clock).await?)),

        scheme => Err(BackendError::UnknownScheme(scheme.to_owned())),
    }
}

/// Ensures `queue_name` is safe to embed in backend-side identifiers such
/// as table names.
pub(crate) fn validate_queue_name(queue_name: &str) -> BackendResult<()> {
    if queue_name.is_empty()
        || !queue_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(BackendError::InvalidQueueName(queue_name.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod scheme_tests {
    use super::*;
    use crate::clocks::SystemClock;

    #[tokio::test]
    async fn test_connect_unknown_scheme() {
        match connect("carrierpigeon://somewhere", Arc::new(SystemClock::default())).await {
            Err(BackendError::UnknownScheme(scheme)) => assert_eq!("carrierpigeon", scheme),
            r => panic!("Unexpected result: {:?}", r.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_connect_empty_conn_string() {
        match connect("", Arc::new(SystemClock::default())).await {
            Err(BackendError::UnknownScheme(scheme)) => assert_eq!("", scheme),
            r => panic!("Unexpected result: {:?}", r.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_connect_locmem() {
        let backend = connect("locmem://", Arc::new(SystemClock::default())).await.unwrap();
        assert_eq!(0, backend.len("all").await.unwrap());
    }

    #[test]
    fn test_validate_queue_name() {
        validate_queue_name("all").unwrap();
        validate_queue_name("emails_2").unwrap();
        validate_queue_name("").unwrap_err();
        validate_queue_name("drop table").unwrap_err();
        validate_queue_name("a;b").unwrap_err();
    }
}
