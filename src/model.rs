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

//! Generic data types for the queue.
//!
//! A `Task` is a serializable unit of work: a reference to a registered
//! callable plus its arguments and execution metadata.  Task execution is
//! decoupled from task representation: the queue only cares about the
//! ability to serialize and deserialize task definitions, and the functions
//! behind a `CallableRef` are resolved through the `registry::Registry` at
//! execution time.  This means a task can be enqueued by a process that does
//! not know how to execute it, as long as the consuming process has the
//! callable registered under the same name.
//!
//! The serialized JSON form produced by `Task::serialize` is the external
//! contract that backends transport byte-for-byte.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Errors that can arise while configuring or (de)serializing a task.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// More than one delay option was provided at construction time.
    #[error("Only one of 'delay_by' or 'delay_until' can be used at a time")]
    MultipleDelay,

    /// The callable named by a task is not present in the registry.
    #[error("Unknown task callable '{module}.{callable}'")]
    UnknownCallable {
        /// The module portion of the callable reference.
        module: String,
        /// The name of the callable within that module.
        callable: String,
    },

    /// The task was asked to serialize or run before `to_call` configured it.
    #[error("Task has no callable configured; call to_call first")]
    NotConfigured,

    /// The serialized payload could not be decoded into a task.
    #[error("Cannot decode task: {0}")]
    Deserialize(String),

    /// The task could not be encoded for storage.
    #[error("Cannot encode task: {0}")]
    Serialize(String),
}

/// Result type for task configuration and serialization operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Describes where a task currently is in its lifecycle.
///
/// The status is informational: it is mutated by the lifecycle transition
/// methods on `Task` so that hooks can inspect it, but the coordinator never
/// branches on it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    /// The task has been created but has not completed execution yet.
    Waiting,

    /// The task completed successfully.
    Success,

    /// The most recent execution attempt failed.
    Failed,

    /// The task failed and has been scheduled for another attempt.
    Retrying,

    /// The task was removed from the queue before execution and never ran.
    Canceled,
}

/// A reference to a registered callable, addressed by module and name.
///
/// This is the serializable stand-in for a function pointer: the consuming
/// process resolves it through its registry before running the task.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct CallableRef {
    /// The namespace the callable was registered under.
    pub module: String,

    /// The name of the callable within that namespace.
    pub callable: String,
}

impl CallableRef {
    /// Creates a reference to the callable `module.callable`.
    pub fn new<M: Into<String>, C: Into<String>>(module: M, callable: C) -> Self {
        Self { module: module.into(), callable: callable.into() }
    }
}

/// The callable reference and arguments bound to a task by `to_call`.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    /// The function to run.
    pub target: CallableRef,

    /// Positional arguments, all JSON-serializable.
    pub args: Vec<Value>,

    /// Keyword arguments, all JSON-serializable.
    pub kwargs: Map<String, Value>,
}

/// Construction-time options for a task.
///
/// The `delay_by` convenience is mutually exclusive with `delay_until` and
/// only exists here: once built, a task carries the absolute timestamp.
#[derive(Clone, Debug, Default)]
pub struct TaskOptions {
    /// Unique identifier for the task; generated when absent.
    pub task_id: Option<String>,

    /// Number of times to retry the task if it fails.
    pub retries: u32,

    /// Whether the task goes through the backend (`true`, the default) or
    /// runs synchronously in the caller's process.
    pub is_async: Option<bool>,

    /// Hook to run when the task starts executing.
    pub on_start: Option<CallableRef>,

    /// Hook to run when the task completes successfully.
    pub on_success: Option<CallableRef>,

    /// Hook to run each time the task fails.
    pub on_error: Option<CallableRef>,

    /// Identifiers of tasks that should complete first.  Advisory metadata
    /// only: the core stores it but does not enforce any ordering.
    pub depends_on: Option<Vec<String>>,

    /// Relative delay in seconds before the task becomes eligible.
    pub delay_by: Option<i64>,

    /// Absolute Unix timestamp before which the task must not run.
    pub delay_until: Option<i64>,
}

impl TaskOptions {
    /// Builds a task from these options, with `now` (Unix seconds) used to
    /// convert a relative `delay_by` into an absolute timestamp.
    pub fn into_task(self, now: i64) -> TaskResult<Task> {
        let delay_until = match (self.delay_by, self.delay_until) {
            (Some(_), Some(_)) => return Err(TaskError::MultipleDelay),
            (Some(by), None) => Some(now + by),
            (None, until) => until,
        };

        Ok(Task {
            task_id: self.task_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            retries: self.retries,
            is_async: self.is_async.unwrap_or(true),
            status: TaskStatus::Waiting,
            on_start: self.on_start,
            on_success: self.on_success,
            on_error: self.on_error,
            depends_on: self.depends_on,
            delay_until,
            call: None,
            result: None,
        })
    }
}

/// A unit of work: a callable reference, its arguments, and execution metadata.
#[derive(Clone, Debug)]
pub struct Task {
    /// Opaque unique identity of the task within its queue.
    pub task_id: String,

    /// Countdown of remaining retry attempts.
    pub retries: u32,

    /// Whether the task is executed through the backend or inline.
    ///
    /// A synchronous task never touches the backend for its initial
    /// execution, and a failed synchronous task is retried by re-executing
    /// it in place rather than by backend resubmission.
    pub is_async: bool,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Hook invoked when the task starts executing.
    pub on_start: Option<CallableRef>,

    /// Hook invoked when the task completes successfully.
    pub on_success: Option<CallableRef>,

    /// Hook invoked each time the task fails.
    pub on_error: Option<CallableRef>,

    /// Identifiers of tasks that should complete first (advisory only).
    /// Not serialized; it does not survive a trip through the backend.
    pub depends_on: Option<Vec<String>>,

    /// Earliest Unix timestamp at which the task is eligible for `pop`.
    pub delay_until: Option<i64>,

    /// The callable and arguments configured by `to_call`.
    pub call: Option<Call>,

    /// The value produced by a successful run.
    pub result: Option<Value>,
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

impl Task {
    /// Creates a task with default options: a generated id, no retries,
    /// asynchronous execution, and no hooks or delay.
    pub fn new() -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            retries: 0,
            is_async: true,
            status: TaskStatus::Waiting,
            on_start: None,
            on_success: None,
            on_error: None,
            depends_on: None,
            delay_until: None,
            call: None,
            result: None,
        }
    }

    /// Sets the callable and its arguments to run when the task is processed.
    pub fn to_call<M, C>(&mut self, module: M, callable: C, args: Vec<Value>, kwargs: Map<String, Value>)
    where
        M: Into<String>,
        C: Into<String>,
    {
        self.call = Some(Call { target: CallableRef::new(module, callable), args, kwargs });
    }

    /// Sets the task's status to waiting.
    pub fn to_waiting(&mut self) {
        self.status = TaskStatus::Waiting;
    }

    /// Sets the task's status to success.
    pub fn to_success(&mut self) {
        self.status = TaskStatus::Success;
    }

    /// Sets the task's status to failed.
    pub fn to_failed(&mut self) {
        self.status = TaskStatus::Failed;
    }

    /// Sets the task's status to retrying.
    pub fn to_retrying(&mut self) {
        self.status = TaskStatus::Retrying;
    }

    /// Sets the task's status to canceled.
    pub fn to_canceled(&mut self) {
        self.status = TaskStatus::Canceled;
    }

    /// Serializes the task into the JSON wire format stored in the queue.
    ///
    /// The task must have been configured with `to_call` first.
    pub fn serialize(&self) -> TaskResult<String> {
        let call = self.call.as_ref().ok_or(TaskError::NotConfigured)?;

        let wire = WireTask {
            task_id: self.task_id.clone(),
            retries: self.retries,
            is_async: self.is_async,
            module: call.target.module.clone(),
            callable: call.target.callable.clone(),
            args: call.args.clone(),
            kwargs: call.kwargs.clone(),
            options: WireOptions {
                on_start: self.on_start.clone(),
                on_success: self.on_success.clone(),
                on_error: self.on_error.clone(),
                delay_until: self.delay_until,
            },
        };

        serde_json::to_string(&wire).map_err(|e| TaskError::Serialize(e.to_string()))
    }

    /// Deserializes queue data produced by `Task::serialize` into a task.
    pub fn deserialize(data: &str) -> TaskResult<Task> {
        let wire: WireTask =
            serde_json::from_str(data).map_err(|e| TaskError::Deserialize(e.to_string()))?;

        let mut task = Task::new();
        task.task_id = wire.task_id;
        task.retries = wire.retries;
        task.is_async = wire.is_async;
        task.to_call(wire.module, wire.callable, wire.args, wire.kwargs);
        task.on_start = wire.options.on_start;
        task.on_success = wire.options.on_success;
        task.on_error = wire.options.on_error;
        task.delay_until = wire.options.delay_until;
        Ok(task)
    }
}

/// The on-the-wire representation of a task.
#[derive(Deserialize, Serialize)]
struct WireTask {
    /// Opaque unique identity of the task.
    task_id: String,

    /// Remaining retry attempts.
    retries: u32,

    /// Whether the task is executed through the backend or inline.
    is_async: bool,

    /// The namespace of the callable to run.
    module: String,

    /// The name of the callable within `module`.
    callable: String,

    /// Positional arguments.
    #[serde(default)]
    args: Vec<Value>,

    /// Keyword arguments.
    #[serde(default)]
    kwargs: Map<String, Value>,

    /// Optional hook references and delay metadata.
    #[serde(default)]
    options: WireOptions,
}

/// The `options` object of the wire format.
#[derive(Default, Deserialize, Serialize)]
struct WireOptions {
    /// Hook invoked when the task starts executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_start: Option<CallableRef>,

    /// Hook invoked when the task completes successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_success: Option<CallableRef>,

    /// Hook invoked each time the task fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_error: Option<CallableRef>,

    /// Earliest Unix timestamp at which the task is eligible for `pop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delay_until: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Builds keyword arguments from `(name, value)` pairs.
    fn kwargs(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new();
        assert!(!task.task_id.is_empty());
        assert_eq!(0, task.retries);
        assert!(task.is_async);
        assert_eq!(TaskStatus::Waiting, task.status);
        assert!(task.call.is_none());
        assert!(task.result.is_none());
        assert!(task.delay_until.is_none());
    }

    #[test]
    fn test_new_task_ids_are_unique() {
        assert_ne!(Task::new().task_id, Task::new().task_id);
    }

    #[test]
    fn test_status_transitions() {
        let mut task = Task::new();
        task.to_success();
        assert_eq!(TaskStatus::Success, task.status);
        task.to_failed();
        assert_eq!(TaskStatus::Failed, task.status);
        task.to_retrying();
        assert_eq!(TaskStatus::Retrying, task.status);
        task.to_canceled();
        assert_eq!(TaskStatus::Canceled, task.status);
        task.to_waiting();
        assert_eq!(TaskStatus::Waiting, task.status);
    }

    #[test]
    fn test_options_delay_by_computes_absolute_timestamp() {
        let opts = TaskOptions { delay_by: Some(60), ..Default::default() };
        let task = opts.into_task(1000).unwrap();
        assert_eq!(Some(1060), task.delay_until);
    }

    #[test]
    fn test_options_delay_until_passes_through() {
        let opts = TaskOptions { delay_until: Some(5000), ..Default::default() };
        let task = opts.into_task(1000).unwrap();
        assert_eq!(Some(5000), task.delay_until);
    }

    #[test]
    fn test_options_both_delays_is_an_error() {
        let opts =
            TaskOptions { delay_by: Some(60), delay_until: Some(5000), ..Default::default() };
        assert_eq!(TaskError::MultipleDelay, opts.into_task(1000).unwrap_err());
    }

    #[test]
    fn test_serialize_requires_a_callable() {
        let task = Task::new();
        assert_eq!(TaskError::NotConfigured, task.serialize().unwrap_err());
    }

    #[test]
    fn test_serialize_wire_format_shape() {
        let opts = TaskOptions {
            task_id: Some("the-id".to_owned()),
            retries: 3,
            on_success: Some(CallableRef::new("myapp.hooks", "party")),
            delay_until: Some(12345),
            ..Default::default()
        };
        let mut task = opts.into_task(0).unwrap();
        task.to_call("myapp.math", "add", vec![json!(2), json!(2)], kwargs(&[("x", json!(1))]));

        let wire: Value = serde_json::from_str(&task.serialize().unwrap()).unwrap();
        assert_eq!(json!("the-id"), wire["task_id"]);
        assert_eq!(json!(3), wire["retries"]);
        assert_eq!(json!(true), wire["is_async"]);
        assert_eq!(json!("myapp.math"), wire["module"]);
        assert_eq!(json!("add"), wire["callable"]);
        assert_eq!(json!([2, 2]), wire["args"]);
        assert_eq!(json!({"x": 1}), wire["kwargs"]);
        assert_eq!(
            json!({"module": "myapp.hooks", "callable": "party"}),
            wire["options"]["on_success"]
        );
        assert_eq!(json!(12345), wire["options"]["delay_until"]);
        // Absent hooks must be omitted, not null.
        assert!(wire["options"].as_object().unwrap().get("on_start").is_none());
        assert!(wire["options"].as_object().unwrap().get("on_error").is_none());
    }

    #[test]
    fn test_serialize_deserialize_round_trip() {
        let opts = TaskOptions {
            task_id: Some("roundtrip".to_owned()),
            retries: 2,
            is_async: Some(false),
            on_start: Some(CallableRef::new("m", "start")),
            on_error: Some(CallableRef::new("m", "boom")),
            delay_until: Some(999),
            ..Default::default()
        };
        let mut task = opts.into_task(0).unwrap();
        task.to_call("m", "f", vec![json!("a"), json!(null)], kwargs(&[("k", json!([1, 2]))]));

        let restored = Task::deserialize(&task.serialize().unwrap()).unwrap();
        assert_eq!(task.task_id, restored.task_id);
        assert_eq!(task.retries, restored.retries);
        assert_eq!(task.is_async, restored.is_async);
        assert_eq!(task.call, restored.call);
        assert_eq!(task.on_start, restored.on_start);
        assert_eq!(task.on_success, restored.on_success);
        assert_eq!(task.on_error, restored.on_error);
        assert_eq!(task.delay_until, restored.delay_until);
    }

    #[test]
    fn test_deserialize_tolerates_missing_optionals() {
        let data = r#"{"task_id": "t", "retries": 0, "is_async": true,
                       "module": "m", "callable": "f"}"#;
        let task = Task::deserialize(data).unwrap();
        assert_eq!("t", task.task_id);
        let call = task.call.unwrap();
        assert!(call.args.is_empty());
        assert!(call.kwargs.is_empty());
        assert!(task.delay_until.is_none());
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        match Task::deserialize("not json at all") {
            Err(TaskError::Deserialize(_)) => (),
            r => panic!("Unexpected result: {:?}", r),
        }
    }

    #[test]
    fn test_depends_on_is_not_serialized() {
        let opts = TaskOptions {
            depends_on: Some(vec!["other-task".to_owned()]),
            ..Default::default()
        };
        let mut task = opts.into_task(0).unwrap();
        task.to_call("m", "f", vec![], Map::new());

        let restored = Task::deserialize(&task.serialize().unwrap()).unwrap();
        assert!(restored.depends_on.is_none());
    }
}
