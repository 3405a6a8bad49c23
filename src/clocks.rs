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

//! Collection of clock implementations.
//!
//! Backends consult the clock to decide whether a delayed task has become
//! eligible, and the worker uses it to nap between iterations.  Keeping the
//! clock behind a trait lets the tests drive delay semantics with a fake
//! time source instead of sleeping for real.

use async_trait::async_trait;
use std::time::Duration;
use time::OffsetDateTime;

/// Generic definition of a clock.
#[async_trait]
pub trait Clock {
    /// Returns the current UTC time.
    fn now_utc(&self) -> OffsetDateTime;

    /// Returns the current time as a Unix timestamp in seconds.
    ///
    /// Delay metadata travels on the wire as integral Unix seconds, so this
    /// is the resolution at which eligibility decisions are made.
    fn now_ts(&self) -> i64 {
        self.now_utc().unix_timestamp()
    }

    /// Pauses execution of the current task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Clock implementation that uses the system clock.
#[derive(Clone, Default)]
pub struct SystemClock {}

#[async_trait]
impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Test utilities.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use std::sync::Mutex;

    /// A clock that returns a preconfigured instant and that can be modified at will.
    pub struct SettableClock {
        /// Current fake time.
        now: Mutex<OffsetDateTime>,
    }

    impl SettableClock {
        /// Creates a new clock that returns `now` until reconfigured.
        pub fn new(now: OffsetDateTime) -> Self {
            Self { now: Mutex::new(now) }
        }

        /// Sets the new value of `now` that the clock returns.
        pub fn set(&self, now: OffsetDateTime) {
            *self.now.lock().unwrap() = now;
        }

        /// Advances the current time by `delta`.
        pub fn advance(&self, delta: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += delta;
        }
    }

    #[async_trait]
    impl Clock for SettableClock {
        fn now_utc(&self) -> OffsetDateTime {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
            tokio::task::yield_now().await;
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use time::macros::datetime;

        #[test]
        fn test_settableclock_set_and_advance() {
            let clock = SettableClock::new(datetime!(2024-06-01 10:15:00 UTC));
            assert_eq!(datetime!(2024-06-01 10:15:00 UTC), clock.now_utc());

            clock.set(datetime!(2024-06-01 11:00:00 UTC));
            assert_eq!(datetime!(2024-06-01 11:00:00 UTC), clock.now_utc());

            clock.advance(Duration::from_secs(30));
            assert_eq!(datetime!(2024-06-01 11:00:30 UTC), clock.now_utc());
        }

        #[test]
        fn test_settableclock_now_ts_is_unix_seconds() {
            let clock = SettableClock::new(datetime!(1970-01-01 00:01:40 UTC));
            assert_eq!(100, clock.now_ts());
        }

        #[tokio::test]
        async fn test_settableclock_sleep_advances_time() {
            let clock = SettableClock::new(datetime!(2024-06-01 10:40:00 UTC));
            // Sleep for an unreasonable period to ensure we don't block for long.
            clock.sleep(Duration::from_secs(3600)).await;
            assert_eq!(datetime!(2024-06-01 11:40:00 UTC), clock.now_utc());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_systemclock_trivial() {
        let clock = SystemClock::default();
        let now1 = clock.now_utc();
        assert!(now1.unix_timestamp() > 0);
        let now2 = clock.now_utc();
        assert!(now2 >= now1);
    }
}
