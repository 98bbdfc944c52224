//! # Star Sync Testing
//!
//! Testing utilities and helpers for the star-sync toggle synchronizer.
//!
//! This crate provides:
//! - Deterministic implementations of Environment traits
//! - Scripted preference service and recording cache/notifier doubles
//! - A Given-When-Then helper for reducers
//! - Assertion helpers for effects
//! - Proptest strategies for sequences of user input and write outcomes
//!
//! ## Example
//!
//! ```ignore
//! use star_sync_testing::{ReducerTest, TestHarness};
//! use star_sync_core::toggle::{ToggleAction, ToggleReducer, ToggleState};
//!
//! let harness = TestHarness::new();
//!
//! ReducerTest::new(ToggleReducer::new())
//!     .with_env(harness.env.clone())
//!     .given_state(ToggleState::new("evt-1".into(), false))
//!     .when_action(ToggleAction::Toggle)
//!     .then_state(|state| assert!(state.current_value()))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use star_sync_core::environment::Clock;

/// Ergonomic reducer testing
pub mod reducer_test;

/// In-memory collaborators for synchronizer tests
pub mod preference_mocks;

/// Proptest strategies for synchronizer inputs
pub mod strategies;

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
    /// use star_sync_testing::mocks::FixedClock;
    /// use star_sync_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
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
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use preference_mocks::{
    MockPreferenceService, MockResponse, PreferenceCall, RecordingCache, RecordingNotifier,
    TestHarness,
};
pub use reducer_test::{ReducerTest, assertions};
pub use strategies::Step;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
