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

//! Standalone worker daemon that consumes and runs queued tasks.
//!
//! Takes the backend connection string as its only argument and registers a
//! couple of demonstration callables.  Worker behavior is tuned via the
//! `HOPPERD_MAX_TASKS` and `HOPPERD_NAP_TIME_MS` environment variables.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use hopper::{Coordinator, Registry, Worker, WorkerOptions};
use serde_json::{json, Map, Value};
use std::process::ExitCode;

/// Builds the registry of callables this daemon can run.
fn demo_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_task("demo", "add", |args: &[Value], _kwargs: &Map<String, Value>| {
        let mut total = 0;
        for arg in args {
            total += arg.as_i64().ok_or_else(|| format!("Not a number: {}", arg))?;
        }
        Ok(json!(total))
    });
    registry.register_task("demo", "echo", |args: &[Value], _kwargs: &Map<String, Value>| {
        Ok(Value::Array(args.to_vec()))
    });
    registry
}

/// Prints the usage message and the `reason` for showing it.
fn usage(reason: &str) {
    eprintln!("hopperd: {}", reason);
    eprintln!("Usage: hopperd CONN_STRING");
    eprintln!("Example: hopperd sqlite:/var/lib/hopper/queue.db");
}

/// Connects to the queue and runs the worker loop until interrupted.
async fn run(conn_string: &str) -> Result<(), String> {
    let coordinator = Coordinator::connect(conn_string, demo_registry())
        .await
        .map_err(|e| format!("Cannot connect to {}: {}", conn_string, e))?;
    let opts = WorkerOptions::from_env("HOPPERD")?;

    let worker = Worker::new(coordinator, opts);
    let handle = worker.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received; finishing current task");
            handle.shutdown();
        }
    });

    worker.run().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let conn_string = match std::env::args().nth(1) {
        Some(conn_string) => conn_string,
        None => {
            usage("Missing connection string");
            return ExitCode::FAILURE;
        }
    };

    match run(&conn_string).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hopperd: {}", e);
            ExitCode::FAILURE
        }
    }
}
