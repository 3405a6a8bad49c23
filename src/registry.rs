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

//! Registry of callables that tasks can reference by name.
//!
//! The wire format stores a module path plus an attribute name rather than
//! the callable itself.  Instead of resolving those strings dynamically, the
//! embedding application populates a `Registry` at process start; task
//! deserialization on the consuming side then looks the reference up and
//! fails with a typed error if it is absent.

use crate::model::{CallableRef, Task, TaskError, TaskResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// The signature of a registered task function.
///
/// A task function receives the positional and keyword arguments from the
/// serialized task and either produces a JSON-serializable result or fails
/// with a reason.  Failures feed the retry state machine.
pub type TaskFn =
    Arc<dyn Fn(&[Value], &Map<String, Value>) -> Result<Value, String> + Send + Sync>;

/// The lifecycle point at which a hook is being invoked.
#[derive(Clone, Copy, Debug)]
pub enum HookEvent<'a> {
    /// The task is about to run.
    Start,

    /// The task completed with the given result.
    Success(&'a Value),

    /// The task failed with the given reason.  Fires on every attempt, not
    /// just the final one.
    Error(&'a str),
}

/// The signature of a registered lifecycle hook.
pub type HookFn = Arc<dyn Fn(&Task, HookEvent) + Send + Sync>;

/// A task's callables resolved into runnable form.
///
/// The arguments are cloned out of the task so that execution does not have
/// to re-borrow the task while hooks are holding a shared reference to it.
pub(crate) struct ResolvedCall {
    /// The function to run.
    pub(crate) func: TaskFn,

    /// Positional arguments for `func`.
    pub(crate) args: Vec<Value>,

    /// Keyword arguments for `func`.
    pub(crate) kwargs: Map<String, Value>,

    /// Hook invoked before the run.
    pub(crate) on_start: Option<HookFn>,

    /// Hook invoked after a successful run.
    pub(crate) on_success: Option<HookFn>,

    /// Hook invoked after a failed run.
    pub(crate) on_error: Option<HookFn>,
}

impl std::fmt::Debug for ResolvedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCall")
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .finish_non_exhaustive()
    }
}

/// Maps callable references to the functions and hooks of this process.
#[derive(Clone, Default)]
pub struct Registry {
    /// Registered task functions.
    tasks: HashMap<CallableRef, TaskFn>,

    /// Registered lifecycle hooks.
    hooks: HashMap<CallableRef, HookFn>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `func` as the task function for `module.callable`.
    ///
    /// Re-registering the same reference replaces the previous function.
    pub fn register_task<M, C, F>(&mut self, module: M, callable: C, func: F)
    where
        M: Into<String>,
        C: Into<String>,
        F: Fn(&[Value], &Map<String, Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.tasks.insert(CallableRef::new(module, callable), Arc::new(func));
    }

    /// Registers `hook` as the lifecycle hook for `module.callable`.
    pub fn register_hook<M, C, F>(&mut self, module: M, callable: C, hook: F)
    where
        M: Into<String>,
        C: Into<String>,
        F: Fn(&Task, HookEvent) + Send + Sync + 'static,
    {
        self.hooks.insert(CallableRef::new(module, callable), Arc::new(hook));
    }

    /// Looks up the task function behind `target`.
    fn task_fn(&self, target: &CallableRef) -> TaskResult<TaskFn> {
        match self.tasks.get(target) {
            Some(func) => Ok(func.clone()),
            None => Err(TaskError::UnknownCallable {
                module: target.module.clone(),
                callable: target.callable.clone(),
            }),
        }
    }

    /// Looks up the hook behind `target`.
    fn hook_fn(&self, target: &CallableRef) -> TaskResult<HookFn> {
        match self.hooks.get(target) {
            Some(hook) => Ok(hook.clone()),
            None => Err(TaskError::UnknownCallable {
                module: target.module.clone(),
                callable: target.callable.clone(),
            }),
        }
    }

    /// Resolves every callable referenced by `task` so that it can run.
    ///
    /// Fails with `TaskError::NotConfigured` if the task has no call bound
    /// and with `TaskError::UnknownCallable` if any reference is missing
    /// from the registry.  Both are fatal for the task and never retried.
    pub(crate) fn resolve(&self, task: &Task) -> TaskResult<ResolvedCall> {
        let call = task.call.as_ref().ok_or(TaskError::NotConfigured)?;

        let on_start = match &task.on_start {
            Some(r) => Some(self.hook_fn(r)?),
            None => None,
        };
        let on_success = match &task.on_success {
            Some(r) => Some(self.hook_fn(r)?),
            None => None,
        };
        let on_error = match &task.on_error {
            Some(r) => Some(self.hook_fn(r)?),
            None => None,
        };

        Ok(ResolvedCall {
            func: self.task_fn(&call.target)?,
            args: call.args.clone(),
            kwargs: call.kwargs.clone(),
            on_start,
            on_success,
            on_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_and_resolve_task_fn() {
        let mut registry = Registry::new();
        registry.register_task("m", "double", |args, _kwargs| {
            Ok(json!(args[0].as_i64().unwrap() * 2))
        });

        let mut task = Task::new();
        task.to_call("m", "double", vec![json!(21)], Map::new());

        let resolved = registry.resolve(&task).unwrap();
        assert_eq!(json!(42), (resolved.func)(&resolved.args, &resolved.kwargs).unwrap());
        assert!(resolved.on_start.is_none());
    }

    #[test]
    fn test_resolve_unknown_task_fn() {
        let registry = Registry::new();
        let mut task = Task::new();
        task.to_call("m", "nope", vec![], Map::new());

        assert_eq!(
            TaskError::UnknownCallable { module: "m".to_owned(), callable: "nope".to_owned() },
            registry.resolve(&task).unwrap_err()
        );
    }

    #[test]
    fn test_resolve_requires_a_call() {
        let registry = Registry::new();
        assert_eq!(TaskError::NotConfigured, registry.resolve(&Task::new()).unwrap_err());
    }

    #[test]
    fn test_resolve_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry.register_task("m", "noop", |_args, _kwargs| Ok(Value::Null));
        {
            let calls = calls.clone();
            registry.register_hook("m", "count", move |_task, _event| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        let mut task = Task::new();
        task.to_call("m", "noop", vec![], Map::new());
        task.on_start = Some(CallableRef::new("m", "count"));

        let resolved = registry.resolve(&task).unwrap();
        let hook = resolved.on_start.unwrap();
        hook(&task, HookEvent::Start);
        hook(&task, HookEvent::Error("boom"));
        assert_eq!(2, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn test_resolve_missing_hook_is_an_error() {
        let mut registry = Registry::new();
        registry.register_task("m", "noop", |_args, _kwargs| Ok(Value::Null));

        let mut task = Task::new();
        task.to_call("m", "noop", vec![], Map::new());
        task.on_success = Some(CallableRef::new("m", "missing"));

        match registry.resolve(&task) {
            Err(TaskError::UnknownCallable { callable, .. }) => assert_eq!("missing", callable),
            r => panic!("Unexpected result: {:?}", r.map(|_| ())),
        }
    }
}
