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

//! Queue storage backed by an SQLite database.

use crate::backend::{validate_queue_name, Backend, BackendError, BackendResult};
use crate::clocks::Clock;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Takes a raw SQLx error `e` and converts it to our backend error type.
fn map_sqlx_error(e: sqlx::Error) -> BackendError {
    match e {
        sqlx::Error::Io(e) => BackendError::Connection(e.to_string()),
        sqlx::Error::PoolTimedOut => BackendError::Connection(e.to_string()),
        sqlx::Error::PoolClosed => BackendError::Connection(e.to_string()),
        e => BackendError::Backend(e.to_string()),
    }
}

/// Queue storage backed by an SQLite database, with one table per queue.
#[derive(Clone)]
pub struct SqliteBackend {
    /// Shared SQLite connection pool.
    pool: SqlitePool,

    /// Clock used to decide which delayed entries are eligible.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SqliteBackend {
    /// Creates a new backend for the database identified by `conn_str`.
    ///
    /// `conn_str` is an SQLite connection string such as `sqlite:/path/to/db`
    /// or `sqlite::memory:`.
    pub async fn connect(
        conn_str: &str,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> BackendResult<Self> {
        // An in-memory SQLite database exists per connection, so the pool
        // must not hand out more than one or each query would see a
        // different, empty database.
        let max_connections = if conn_str.contains(":memory:") { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(conn_str)
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self { pool, clock })
    }

    /// Validates `queue_name` and returns the name of its table, creating the
    /// table if it does not exist yet.
    async fn ensure_queue(&self, queue_name: &str) -> BackendResult<String> {
        validate_queue_name(queue_name)?;
        let table = format!("queue_{}", queue_name);
        let query_str = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                task_id TEXT NOT NULL,
                data TEXT NOT NULL,
                delay_until INTEGER NOT NULL
            )",
            table
        );
        sqlx::query(&query_str).execute(&self.pool).await.map_err(map_sqlx_error)?;
        Ok(table)
    }
}

#[async_trait::async_trait]
impl Backend for SqliteBackend {
    async fn len(&self, queue_name: &str) -> BackendResult<usize> {
        let table = self.ensure_queue(queue_name).await?;
        let query_str = format!("SELECT COUNT(*) FROM {}", table);
        let row =
            sqlx::query(&query_str).fetch_one(&self.pool).await.map_err(map_sqlx_error)?;
        let count: i64 = row.try_get(0).map_err(map_sqlx_error)?;
        usize::try_from(count).map_err(|e| BackendError::Backend(e.to_string()))
    }

    async fn push(
        &self,
        queue_name: &str,
        task_id: &str,
        data: &str,
        delay_until: Option<i64>,
    ) -> BackendResult<String> {
        let table = self.ensure_queue(queue_name).await?;
        let delay_until = delay_until.unwrap_or_else(|| self.clock.now_ts());
        let query_str =
            format!("INSERT INTO {} (task_id, data, delay_until) VALUES (?, ?, ?)", table);
        sqlx::query(&query_str)
            .bind(task_id)
            .bind(data)
            .bind(delay_until)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(task_id.to_owned())
    }

    async fn pop(&self, queue_name: &str) -> BackendResult<Option<String>> {
        let table = self.ensure_queue(queue_name).await?;
        let now = self.clock.now_ts();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let query_str = format!(
            "SELECT rowid, data FROM {} WHERE delay_until <= ? ORDER BY rowid LIMIT 1",
            table
        );
        let row = sqlx::query(&query_str)
            .bind(now)
            .fetch_optional(&mut tx)
            .await
            .map_err(map_sqlx_error)?;
        let (rowid, data) = match row {
            Some(row) => {
                let rowid: i64 = row.try_get("rowid").map_err(map_sqlx_error)?;
                let data: String = row.try_get("data").map_err(map_sqlx_error)?;
                (rowid, data)
            }
            None => return Ok(None),
        };

        let query_str = format!("DELETE FROM {} WHERE rowid = ?", table);
        sqlx::query(&query_str).bind(rowid).execute(&mut tx).await.map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(data))
    }

    async fn get(&self, queue_name: &str, task_id: &str) -> BackendResult<Option<String>> {
        let table = self.ensure_queue(queue_name).await?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let query_str =
            format!("SELECT rowid, data FROM {} WHERE task_id = ? ORDER BY rowid LIMIT 1", table);
        let row = sqlx::query(&query_str)
            .bind(task_id)
            .fetch_optional(&mut tx)
            .await
            .map_err(map_sqlx_error)?;
        let (rowid, data) = match row {
            Some(row) => {
                let rowid: i64 = row.try_get("rowid").map_err(map_sqlx_error)?;
                let data: String = row.try_get("data").map_err(map_sqlx_error)?;
                (rowid, data)
            }
            None => return Ok(None),
        };

        let query_str = format!("DELETE FROM {} WHERE rowid = ?", table);
        sqlx::query(&query_str).bind(rowid).execute(&mut tx).await.map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(data))
    }

    async fn drop_all(&self, queue_name: &str) -> BackendResult<()> {
        let table = self.ensure_queue(queue_name).await?;
        let query_str = format!("DELETE FROM {}", table);
        sqlx::query(&query_str).execute(&self.pool).await.map_err(map_sqlx_error)?;
        Ok(())
    }
}
