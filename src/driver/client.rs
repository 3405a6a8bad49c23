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

//! Client-side interface to schedule, fetch and run tasks.

use crate::backend::{self, Backend};
use crate::clocks::{Clock, SystemClock};
use crate::driver::{QueueError, QueueResult};
use crate::model::{CallableRef, Task, TaskOptions};
use crate::registry::{HookEvent, Registry, ResolvedCall};
use crate::DEFAULT_QUEUE;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Runs one attempt of `task` against its resolved callable and hooks, and
/// records its outcome on the task.
fn run_once(task: &mut Task, resolved: &ResolvedCall) -> Result<Value, String> {
    if let Some(hook) = &resolved.on_start {
        hook(task, HookEvent::Start);
    }
    match (resolved.func)(&resolved.args, &resolved.kwargs) {
        Ok(value) => {
            task.to_success();
            task.result = Some(value.clone());
            if let Some(hook) = &resolved.on_success {
                hook(task, HookEvent::Success(&value));
            }
            Ok(value)
        }
        Err(reason) => {
            task.to_failed();
            if let Some(hook) = &resolved.on_error {
                hook(task, HookEvent::Error(&reason));
            }
            Err(reason)
        }
    }
}

/// Coordinates task scheduling and execution against one queue of a backend.
#[derive(Clone)]
pub struct Coordinator {
    /// The name of the queue this coordinator operates on.
    queue_name: String,

    /// The queue storage backend.
    backend: Arc<dyn Backend>,

    /// The callables and hooks that tasks can reference.
    registry: Arc<Registry>,

    /// Clock used to stamp delayed tasks.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl Coordinator {
    /// Creates a coordinator for the default queue on the backend identified
    /// by `conn_string`.
    pub async fn connect(conn_string: &str, registry: Registry) -> QueueResult<Self> {
        Coordinator::connect_with_clock(conn_string, registry, Arc::new(SystemClock::default()))
            .await
    }

    /// Creates a coordinator for the default queue on the backend identified
    /// by `conn_string`, using `clock` as its time source.
    pub async fn connect_with_clock(
        conn_string: &str,
        registry: Registry,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> QueueResult<Self> {
        let backend = backend::connect(conn_string, clock.clone()).await?;
        Ok(Coordinator::new(backend, registry, clock))
    }

    /// Creates a coordinator for the default queue on an already-connected
    /// `backend`.
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Registry,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            queue_name: DEFAULT_QUEUE.to_owned(),
            backend,
            registry: Arc::new(registry),
            clock,
        }
    }

    /// Returns a coordinator identical to this one but operating on the
    /// queue named `queue_name`.
    pub fn with_queue<S: Into<String>>(mut self, queue_name: S) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    /// Returns the name of the queue this coordinator operates on.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Returns the clock this coordinator stamps delayed tasks with.
    pub(crate) fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        self.clock.clone()
    }

    /// Returns the number of tasks waiting on the queue, including tasks
    /// whose delay has not expired yet.
    pub async fn len(&self) -> QueueResult<usize> {
        Ok(self.backend.len(&self.queue_name).await?)
    }

    /// Deletes every task waiting on the queue.
    pub async fn drop_all(&self) -> QueueResult<()> {
        Ok(self.backend.drop_all(&self.queue_name).await?)
    }

    /// Schedules a call to `module`/`callable` with the given arguments,
    /// carrying the identity and options already present on `task`.
    ///
    /// Asynchronous tasks are serialized and handed to the backend, and the
    /// returned task carries the id the backend assigned.  Synchronous tasks
    /// run inline before this function returns.
    pub async fn push<M, C>(
        &self,
        mut task: Task,
        module: M,
        callable: C,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> QueueResult<Task>
    where
        M: Into<String>,
        C: Into<String>,
    {
        task.to_call(module, callable, args, kwargs);
        if task.is_async {
            let data = task.serialize()?;
            let task_id = self
                .backend
                .push(&self.queue_name, &task.task_id, &data, task.delay_until)
                .await?;
            task.task_id = task_id;
            Ok(task)
        } else {
            self.execute(&mut task).await?;
            Ok(task)
        }
    }

    /// Schedules a call to `module`/`callable` with the given arguments and
    /// default options.
    pub async fn task<M, C>(
        &self,
        module: M,
        callable: C,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> QueueResult<Task>
    where
        M: Into<String>,
        C: Into<String>,
    {
        self.push(Task::new(), module, callable, args, kwargs).await
    }

    /// Starts building a task with non-default options.
    pub fn options(&self) -> Options {
        Options { coordinator: self, opts: TaskOptions::default() }
    }

    /// Takes the next eligible task off the queue and runs it.
    ///
    /// Returns `None` when no task is eligible.  A task that fails with
    /// retries left goes back on the queue and this returns the task in its
    /// `Retrying` state.
    pub async fn pop(&self) -> QueueResult<Option<Task>> {
        let data = match self.backend.pop(&self.queue_name).await? {
            Some(data) => data,
            None => return Ok(None),
        };
        let mut task = Task::deserialize(&data)?;
        self.execute(&mut task).await?;
        Ok(Some(task))
    }

    /// Takes the task identified by `task_id` off the queue, regardless of
    /// its delay, and runs it.  Returns `None` if the task is not on the
    /// queue.
    pub async fn get(&self, task_id: &str) -> QueueResult<Option<Task>> {
        let data = match self.backend.get(&self.queue_name, task_id).await? {
            Some(data) => data,
            None => return Ok(None),
        };
        let mut task = Task::deserialize(&data)?;
        self.execute(&mut task).await?;
        Ok(Some(task))
    }

    /// Takes the task identified by `task_id` off the queue without running
    /// it.  Returns `None` if the task is not on the queue.
    pub async fn cancel(&self, task_id: &str) -> QueueResult<Option<Task>> {
        let data = match self.backend.get(&self.queue_name, task_id).await? {
            Some(data) => data,
            None => return Ok(None),
        };
        let mut task = Task::deserialize(&data)?;
        task.to_canceled();
        Ok(Some(task))
    }

    /// Runs `task` to completion, retrying on failure until its retry budget
    /// runs out.
    ///
    /// Returns the value the callable produced, or `None` when a failed
    /// asynchronous task went back on the queue for a later attempt.  An
    /// unknown callable fails immediately with no retries, as no amount of
    /// retrying can resolve it.
    pub async fn execute(&self, task: &mut Task) -> QueueResult<Option<Value>> {
        let resolved = self.registry.resolve(task)?;
        loop {
            match run_once(task, &resolved) {
                Ok(value) => return Ok(Some(value)),
                Err(reason) if task.retries > 0 => {
                    task.retries -= 1;
                    task.to_retrying();
                    if task.is_async {
                        let data = task.serialize()?;
                        let task_id = self
                            .backend
                            .push(&self.queue_name, &task.task_id, &data, task.delay_until)
                            .await?;
                        task.task_id = task_id;
                        return Ok(None);
                    }
                    log::debug!(
                        "Task {} failed ({}); retrying inline, {} left",
                        task.task_id,
                        reason,
                        task.retries
                    );
                }
                Err(reason) => {
                    return Err(QueueError::Execution { task_id: task.task_id.clone(), reason })
                }
            }
        }
    }
}

/// Builder for a task with non-default options, tied to the coordinator that
/// will schedule it.
#[must_use]
pub struct Options<'a> {
    /// The coordinator that will schedule the built task.
    coordinator: &'a Coordinator,

    /// The options accumulated so far.
    opts: TaskOptions,
}

impl<'a> Options<'a> {
    /// Sets the identity of the task instead of generating one.
    pub fn task_id<S: Into<String>>(mut self, task_id: S) -> Self {
        self.opts.task_id = Some(task_id.into());
        self
    }

    /// Sets how many times the task is retried after a failure.
    pub fn retries(mut self, retries: u32) -> Self {
        self.opts.retries = retries;
        self
    }

    /// Sets whether the task runs through the backend or inline.
    pub fn is_async(mut self, is_async: bool) -> Self {
        self.opts.is_async = Some(is_async);
        self
    }

    /// Sets the hook invoked right before every attempt.
    pub fn on_start<M: Into<String>, C: Into<String>>(mut self, module: M, callable: C) -> Self {
        self.opts.on_start = Some(CallableRef::new(module, callable));
        self
    }

    /// Sets the hook invoked after a successful attempt.
    pub fn on_success<M: Into<String>, C: Into<String>>(mut self, module: M, callable: C) -> Self {
        self.opts.on_success = Some(CallableRef::new(module, callable));
        self
    }

    /// Sets the hook invoked after a failed attempt.
    pub fn on_error<M: Into<String>, C: Into<String>>(mut self, module: M, callable: C) -> Self {
        self.opts.on_error = Some(CallableRef::new(module, callable));
        self
    }

    /// Records the ids of tasks this one depends on.  The dependency list is
    /// informational only and is not enforced.
    pub fn depends_on(mut self, task_ids: Vec<String>) -> Self {
        self.opts.depends_on = Some(task_ids);
        self
    }

    /// Delays the task by `seconds` from the moment it is scheduled.
    pub fn delay_by(mut self, seconds: i64) -> Self {
        self.opts.delay_by = Some(seconds);
        self
    }

    /// Delays the task until the given Unix timestamp.
    pub fn delay_until(mut self, timestamp: i64) -> Self {
        self.opts.delay_until = Some(timestamp);
        self
    }

    /// Schedules a call to `module`/`callable` with the accumulated options.
    pub async fn task<M, C>(
        self,
        module: M,
        callable: C,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> QueueResult<Task>
    where
        M: Into<String>,
        C: Into<String>,
    {
        let task = self.opts.into_task(self.coordinator.clock().now_ts())?;
        self.coordinator.push(task, module, callable, args, kwargs).await
    }
}
