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

//! Contract tests that every backend implementation must pass.
//!
//! Each backend module instantiates this suite against its own setup
//! expression via `generate_backend_tests!` (and, for backends with native
//! delay support, `generate_backend_delay_tests!`).  Task ids are chosen so
//! that insertion order and lexicographic order coincide, which keeps the
//! FIFO expectations meaningful for the score-ordered sorted-set backend
//! where equal scores fall back to lexicographic member order.

use crate::backend::Backend;
use crate::clocks::testutils::SettableClock;
use crate::clocks::Clock;
use std::sync::Arc;
use std::time::Duration;

/// Instantiates one contract test `name` against the backend built by `setup`.
macro_rules! generate_one_backend_test [
    ( $name:ident, $setup:expr $(, #[$extra:meta] )? ) => {
        #[tokio::test]
        $(#[$extra])?
        async fn $name() {
            let (backend, clock) = $setup;
            $crate::backend::tests::$name(backend, clock).await;
        }
    }
];

pub(crate) use generate_one_backend_test;

/// Instantiates the delay-agnostic contract tests against the backend built
/// by `setup`.  The `extra` metadata parameter can be used to tag the
/// generated tests, typically with an `ignore` reason for backends that
/// need a live server.
macro_rules! generate_backend_tests [
    ( $setup:expr $(, #[$extra:meta] )? ) => {
        $crate::backend::tests::generate_one_backend_test!(
            test_push_echoes_task_id, $setup $(, #[$extra])?);
        $crate::backend::tests::generate_one_backend_test!(
            test_push_pop_fifo, $setup $(, #[$extra])?);
        $crate::backend::tests::generate_one_backend_test!(
            test_len_counts_pushes_and_pops, $setup $(, #[$extra])?);
        $crate::backend::tests::generate_one_backend_test!(
            test_pop_empty_returns_none, $setup $(, #[$extra])?);
        $crate::backend::tests::generate_one_backend_test!(
            test_get_removes_specific_entry, $setup $(, #[$extra])?);
        $crate::backend::tests::generate_one_backend_test!(
            test_get_absent_returns_none, $setup $(, #[$extra])?);
        $crate::backend::tests::generate_one_backend_test!(
            test_drop_all_empties_queue, $setup $(, #[$extra])?);
    }
];

pub(crate) use generate_backend_tests;

/// Instantiates the delay-visibility contract tests against the backend
/// built by `setup`.  Only backends with native delay support pass these.
macro_rules! generate_backend_delay_tests [
    ( $setup:expr $(, #[$extra:meta] )? ) => {
        $crate::backend::tests::generate_one_backend_test!(
            test_pop_honors_delay, $setup $(, #[$extra])?);
        $crate::backend::tests::generate_one_backend_test!(
            test_len_counts_delayed_entries, $setup $(, #[$extra])?);
        $crate::backend::tests::generate_one_backend_test!(
            test_get_ignores_delay, $setup $(, #[$extra])?);
    }
];

pub(crate) use generate_backend_delay_tests;

pub(crate) async fn test_push_echoes_task_id(
    backend: Arc<dyn Backend>,
    _clock: Arc<SettableClock>,
) {
    let id = backend.push("all", "t1", "payload 1", None).await.unwrap();
    assert_eq!("t1", id);
}

pub(crate) async fn test_push_pop_fifo(backend: Arc<dyn Backend>, _clock: Arc<SettableClock>) {
    backend.push("all", "t1", "payload 1", None).await.unwrap();
    backend.push("all", "t2", "payload 2", None).await.unwrap();
    backend.push("all", "t3", "payload 3", None).await.unwrap();

    assert_eq!(Some("payload 1".to_owned()), backend.pop("all").await.unwrap());
    assert_eq!(Some("payload 2".to_owned()), backend.pop("all").await.unwrap());
    assert_eq!(Some("payload 3".to_owned()), backend.pop("all").await.unwrap());
    assert_eq!(None, backend.pop("all").await.unwrap());
}

pub(crate) async fn test_len_counts_pushes_and_pops(
    backend: Arc<dyn Backend>,
    _clock: Arc<SettableClock>,
) {
    assert_eq!(0, backend.len("all").await.unwrap());

    backend.push("all", "t1", "payload 1", None).await.unwrap();
    backend.push("all", "t2", "payload 2", None).await.unwrap();
    backend.push("all", "t3", "payload 3", None).await.unwrap();
    assert_eq!(3, backend.len("all").await.unwrap());

    backend.pop("all").await.unwrap();
    assert_eq!(2, backend.len("all").await.unwrap());
    backend.pop("all").await.unwrap();
    backend.pop("all").await.unwrap();
    assert_eq!(0, backend.len("all").await.unwrap());
}

pub(crate) async fn test_pop_empty_returns_none(
    backend: Arc<dyn Backend>,
    _clock: Arc<SettableClock>,
) {
    assert_eq!(None, backend.pop("all").await.unwrap());
}

pub(crate) async fn test_get_removes_specific_entry(
    backend: Arc<dyn Backend>,
    _clock: Arc<SettableClock>,
) {
    backend.push("all", "t1", "payload 1", None).await.unwrap();
    backend.push("all", "t2", "payload 2", None).await.unwrap();
    backend.push("all", "t3", "payload 3", None).await.unwrap();

    assert_eq!(Some("payload 2".to_owned()), backend.get("all", "t2").await.unwrap());
    assert_eq!(2, backend.len("all").await.unwrap());

    // A removed entry must never come back.
    assert_eq!(None, backend.get("all", "t2").await.unwrap());
    assert_eq!(Some("payload 1".to_owned()), backend.pop("all").await.unwrap());
    assert_eq!(Some("payload 3".to_owned()), backend.pop("all").await.unwrap());
    assert_eq!(None, backend.pop("all").await.unwrap());
}

pub(crate) async fn test_get_absent_returns_none(
    backend: Arc<dyn Backend>,
    _clock: Arc<SettableClock>,
) {
    assert_eq!(None, backend.get("all", "missing").await.unwrap());
}

pub(crate) async fn test_drop_all_empties_queue(
    backend: Arc<dyn Backend>,
    clock: Arc<SettableClock>,
) {
    backend.push("all", "t1", "payload 1", None).await.unwrap();
    backend.push("all", "t2", "payload 2", Some(clock.now_ts() + 3600)).await.unwrap();

    backend.drop_all("all").await.unwrap();
    assert_eq!(0, backend.len("all").await.unwrap());
    assert_eq!(None, backend.pop("all").await.unwrap());

    // The queue must remain usable after being dropped.
    backend.push("all", "t3", "payload 3", None).await.unwrap();
    assert_eq!(1, backend.len("all").await.unwrap());
}

pub(crate) async fn test_pop_honors_delay(backend: Arc<dyn Backend>, clock: Arc<SettableClock>) {
    backend.push("all", "t1", "payload 1", Some(clock.now_ts() + 60)).await.unwrap();

    assert_eq!(None, backend.pop("all").await.unwrap());

    clock.advance(Duration::from_secs(59));
    assert_eq!(None, backend.pop("all").await.unwrap());

    clock.advance(Duration::from_secs(1));
    assert_eq!(Some("payload 1".to_owned()), backend.pop("all").await.unwrap());
}

pub(crate) async fn test_len_counts_delayed_entries(
    backend: Arc<dyn Backend>,
    clock: Arc<SettableClock>,
) {
    backend.push("all", "t1", "payload 1", None).await.unwrap();
    backend.push("all", "t2", "payload 2", Some(clock.now_ts() + 3600)).await.unwrap();

    // Queue depth includes entries that are not yet eligible.
    assert_eq!(2, backend.len("all").await.unwrap());
}

pub(crate) async fn test_get_ignores_delay(backend: Arc<dyn Backend>, clock: Arc<SettableClock>) {
    backend.push("all", "t1", "payload 1", Some(clock.now_ts() + 3600)).await.unwrap();

    assert_eq!(Some("payload 1".to_owned()), backend.get("all", "t1").await.unwrap());
    assert_eq!(0, backend.len("all").await.unwrap());
}
