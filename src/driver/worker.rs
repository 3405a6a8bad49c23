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

//! Worker loop to consume and run queued tasks.

use crate::driver::Coordinator;
use crate::env::get_optional_var;
use crate::model::TaskStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default pause between queue polls, in milliseconds.
const DEFAULT_NAP_TIME_MS: u64 = 100;

/// Configuration options for the worker loop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerOptions {
    /// Number of tasks to consume before exiting, or 0 to keep going until
    /// told to shut down.
    pub max_tasks: usize,

    /// Pause between queue polls.
    pub nap_time: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self { max_tasks: 0, nap_time: Duration::from_millis(DEFAULT_NAP_TIME_MS) }
    }
}

impl WorkerOptions {
    /// Initializes a set of options from environment variables whose name is
    /// derived from `prefix`.
    ///
    /// The considered variables are: `<prefix>_MAX_TASKS` and
    /// `<prefix>_NAP_TIME_MS`.  Unset variables take their default values.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        let mut opts = WorkerOptions::default();
        if let Some(max_tasks) = get_optional_var::<usize>(prefix, "MAX_TASKS")? {
            opts.max_tasks = max_tasks;
        }
        if let Some(nap_time_ms) = get_optional_var::<u64>(prefix, "NAP_TIME_MS")? {
            opts.nap_time = Duration::from_millis(nap_time_ms);
        }
        Ok(opts)
    }
}

/// Handle to ask a running worker to stop after its current poll.
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    /// Flag shared with the worker loop.
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Asks the worker holding the other end of this handle to stop.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Checks whether a shutdown was requested.
    fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A worker that repeatedly consumes tasks from one queue.
pub struct Worker {
    /// The coordinator used to pop and run tasks.
    coordinator: Coordinator,

    /// Configuration of this worker.
    opts: WorkerOptions,

    /// Flag polled between tasks to decide when to stop.
    shutdown: ShutdownHandle,

    /// Number of tasks consumed so far, successfully or not.
    tasks_complete: usize,
}

impl Worker {
    /// Creates a worker that consumes tasks via `coordinator`.
    pub fn new(coordinator: Coordinator, opts: WorkerOptions) -> Self {
        Self { coordinator, opts, shutdown: ShutdownHandle::default(), tasks_complete: 0 }
    }

    /// Returns a handle that can stop this worker from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Returns a string identifying this worker in log messages.
    fn ident(&self) -> String {
        format!("Hopper worker (#{})", std::process::id())
    }

    /// Logs the startup banner.
    fn starting(&self) {
        log::info!("{} starting", self.ident());
        log::info!("Consuming from queue {}", self.coordinator.queue_name());
        if self.opts.max_tasks > 0 {
            log::info!("Will stop after {} tasks", self.opts.max_tasks);
        } else {
            log::info!("Will run until asked to stop");
        }
    }

    /// Logs the shutdown banner.
    fn stopping(&self) {
        log::info!("{} stopping after {} tasks", self.ident(), self.tasks_complete);
    }

    /// Runs at most one task off the queue, recording and logging its
    /// outcome.  Failures are logged, not propagated, so one bad task cannot
    /// take the worker down.
    async fn check_and_run_task(&mut self) {
        match self.coordinator.pop().await {
            Ok(None) => (),
            Ok(Some(task)) => {
                self.tasks_complete += 1;
                match task.status {
                    TaskStatus::Retrying => {
                        log::info!("Task {} failed; requeued for retry", task.task_id)
                    }
                    _ => log::info!("Task {} completed", task.task_id),
                }
            }
            Err(e @ crate::driver::QueueError::Execution { .. }) => {
                // The task came off the queue even though it failed.
                self.tasks_complete += 1;
                log::warn!("Task execution failed: {}", e);
            }
            Err(e) => log::warn!("Queue poll failed: {}", e),
        }
    }

    /// Runs the worker loop until a shutdown is requested or the configured
    /// task cap is reached, and returns the number of tasks consumed.
    pub async fn run(mut self) -> usize {
        self.starting();

        loop {
            if self.shutdown.is_set() {
                log::info!("Shutdown requested");
                break;
            }
            if self.opts.max_tasks > 0 && self.tasks_complete >= self.opts.max_tasks {
                break;
            }

            self.check_and_run_task().await;

            self.coordinator.clock().sleep(self.opts.nap_time).await;
        }

        self.stopping();
        self.tasks_complete
    }
}
