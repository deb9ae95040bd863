//! # Simtrack Testing
//!
//! Testing utilities for the simtrack lifecycle core:
//!
//! - [`InMemorySimStore`]: deterministic in-memory implementation of the
//!   store contract, with the same observable semantics as the Postgres
//!   store (same-SIM serialization, rollback on drop, unique identifiers)
//! - [`mocks::FixedClock`]: deterministic time
//!
//! ## Example
//!
//! ```
//! use simtrack_core::LifecycleManager;
//! use simtrack_testing::{InMemorySimStore, mocks::test_clock};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemorySimStore::new();
//! let manager = LifecycleManager::new(store).with_clock(Arc::new(test_clock()));
//! let sim = manager.create(None).await.unwrap();
//! assert_eq!(sim.iccid.len(), 19);
//! # }
//! ```

mod store;

pub use store::{InMemorySimStore, InMemoryTransaction};

/// Mock implementations for testing.
pub mod mocks {
    use chrono::{DateTime, Utc};
    use simtrack_core::environment::Clock;

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making `created_at`/`updated_at`
    /// assertions reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use simtrack_testing::mocks::FixedClock;
    /// use simtrack_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time.
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

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which should never
    /// happen in practice.
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
