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

//! High-level interface to the task queue.

use crate::backend::BackendError;
use crate::model::TaskError;
use thiserror::Error;

mod client;
pub use client::{Coordinator, Options};
mod worker;
pub use worker::{ShutdownHandle, Worker, WorkerOptions};

/// Errors raised by queue operations.
#[derive(Debug, Error, PartialEq)]
pub enum QueueError {
    /// Error from the queue storage backend.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Error building, serializing or resolving a task.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// A task ran and failed with no retries left.
    #[error("Task {task_id} failed: {reason}")]
    Execution {
        /// Identity of the failed task.
        task_id: String,

        /// The failure reported by the callable's last attempt.
        reason: String,
    },
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
