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

//! A pluggable task queue.
//!
//! This crate lets a caller enqueue a unit of work (a reference to a
//! registered function plus its arguments) onto a named queue backed by one
//! of several storage engines, and lets a worker process pull tasks off that
//! queue, execute them, and handle retries and failures.
//!
//! The `driver::Coordinator` enqueues new tasks, pops them for execution,
//! and drives the retry state machine.  Synchronous tasks run inline in the
//! caller's process and never touch the backend; asynchronous tasks are
//! serialized to a JSON wire format and handed to the configured backend.
//!
//! The `driver::Worker` is a consumer loop that repeatedly asks a
//! `Coordinator` for work until it is interrupted or reaches an optional
//! task cap.  Concurrency across tasks is achieved by running multiple
//! independent worker processes against the same backend queue; one worker
//! runs one task at a time to completion.
//!
//! Backends implement the `backend::Backend` trait (`len`, `push`, `pop`,
//! `get`, `drop_all`) and are selected from a connection string of the form
//! `<scheme>://...` at `Coordinator` construction time.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

pub mod backend;
pub mod clocks;
pub mod driver;
mod env;
pub mod model;
pub mod registry;

pub use driver::{Coordinator, QueueError, QueueResult, Worker, WorkerOptions};
pub use model::{Task, TaskError, TaskOptions, TaskStatus};
pub use registry::Registry;

/// Name of the queue that tasks go to when the caller does not pick one.
pub const DEFAULT_QUEUE: &str = "all";
