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

//! In-memory backend, useful for development and testing.
//!
//! State lives inside the backend instance: two coordinators only share a
//! queue if they share the same `LocmemBackend` (typically via the `Arc`
//! returned by `backend::connect`).  The store is mutex-guarded, so the
//! instance can be used from multiple threads, but there is no persistence
//! and no cross-process visibility.

use crate::backend::{Backend, BackendResult};
use crate::clocks::Clock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One queue entry: the task id plus its eligibility timestamp, if any.
struct QueueEntry {
    /// Identifier of the task, keying into the payload map.
    task_id: String,

    /// Earliest Unix timestamp at which the entry may be popped.
    delay_until: Option<i64>,
}

/// The mutable store behind a `LocmemBackend`.
#[derive(Default)]
struct LocmemState {
    /// Entries of each queue in insertion order.
    queues: HashMap<String, Vec<QueueEntry>>,

    /// Serialized task payloads keyed by task id.
    task_data: HashMap<String, String>,
}

/// An in-memory queue backend.
pub struct LocmemBackend {
    /// Clock used to decide whether delayed entries are eligible.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Queues and payloads, guarded for multi-threaded use.
    state: Mutex<LocmemState>,
}

impl LocmemBackend {
    /// Creates an empty in-memory backend.  The connection string body is
    /// ignored by this backend, so none is taken here.
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { clock, state: Mutex::new(LocmemState::default()) }
    }

    /// Locks the store, tolerating poisoning: a panicking task must not
    /// wedge every subsequent queue operation.
    fn lock(&self) -> MutexGuard<'_, LocmemState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Backend for LocmemBackend {
    async fn len(&self, queue_name: &str) -> BackendResult<usize> {
        let state = self.lock();
        Ok(state.queues.get(queue_name).map_or(0, Vec::len))
    }

    async fn push(
        &self,
        queue_name: &str,
        task_id: &str,
        data: &str,
        delay_until: Option<i64>,
    ) -> BackendResult<String> {
        let mut state = self.lock();
        state
            .queues
            .entry(queue_name.to_owned())
            .or_default()
            .push(QueueEntry { task_id: task_id.to_owned(), delay_until });
        state.task_data.insert(task_id.to_owned(), data.to_owned());
        Ok(task_id.to_owned())
    }

    async fn pop(&self, queue_name: &str) -> BackendResult<Option<String>> {
        let now = self.clock.now_ts();
        let mut state = self.lock();

        let offset = match state.queues.get(queue_name) {
            Some(queue) => queue.iter().position(|entry| match entry.delay_until {
                Some(delay_until) => now >= delay_until,
                None => true,
            }),
            None => None,
        };

        match offset {
            Some(offset) => {
                // The queue must exist for an offset to have been found.
                let entry = match state.queues.get_mut(queue_name) {
                    Some(queue) => queue.remove(offset),
                    None => return Ok(None),
                };
                Ok(state.task_data.remove(&entry.task_id))
            }
            None => Ok(None),
        }
    }

    async fn get(&self, queue_name: &str, task_id: &str) -> BackendResult<Option<String>> {
        let mut state = self.lock();

        let offset = state
            .queues
            .get(queue_name)
            .and_then(|queue| queue.iter().position(|entry| entry.task_id == task_id));

        match offset {
            Some(offset) => {
                let entry = match state.queues.get_mut(queue_name) {
                    Some(queue) => queue.remove(offset),
                    None => return Ok(None),
                };
                Ok(state.task_data.remove(&entry.task_id))
            }
            None => Ok(None),
        }
    }

    async fn drop_all(&self, queue_name: &str) -> BackendResult<()> {
        let mut state = self.lock();
        if let Some(entries) = state.queues.remove(queue_name) {
            for entry in entries {
                state.task_data.remove(&entry.task_id);
            }
        }
        Ok(())
    }
}
