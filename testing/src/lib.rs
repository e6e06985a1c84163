//! # Promptbus Testing
//!
//! Testing utilities and helpers for the promptbus reducer architecture.
//!
//! This crate provides:
//! - Deterministic [`Clock`] implementations
//! - A Given-When-Then harness for reducers ([`ReducerTest`])
//! - Assertion helpers for effect lists
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use promptbus_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(NotificationReducer::new())
//!     .with_env(test_environment())
//!     .given_state(NotificationState::default())
//!     .when_action(NotificationAction::Received { item })
//!     .then_state(|state| assert_eq!(state.items.len(), 1))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use promptbus_core::environment::Clock;

/// Ergonomic given/when/then testing for reducers
pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use promptbus_testing::mocks::FixedClock;
    /// use promptbus_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }
}

/// Test helpers and utilities
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a `tracing` subscriber that writes through the test harness
    ///
    /// Honours `RUST_LOG`; safe to call from every test.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::init_test_tracing;
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
