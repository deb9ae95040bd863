//! # Simtrack Core
//!
//! The SIM lifecycle core: a state machine governing legal status
//! transitions for SIM cards, an immutable ordered audit trail of every
//! change, and identifier issuance (ICCID/MSISDN) that shares the same
//! transactional boundary.
//!
//! ## Components
//!
//! - [`lifecycle::LifecycleManager`]: validates and executes transitions;
//!   every mutating call is one store transaction (lock, validate, write,
//!   record, commit).
//! - [`swap::SwapOrchestrator`]: decommissions one SIM and activates its
//!   replacement in a single atomic unit.
//! - [`allocator::IdentifierAllocator`]: Luhn-valid ICCID and E.164 MSISDN
//!   candidates; store-wide uniqueness comes from the store's constraints,
//!   never an in-process cache.
//! - [`transition`]: the whole state machine as one explicit table.
//! - [`store`]: the transactional store contract the above run against.
//!
//! ## Architecture principles
//!
//! - The store is the single shared resource; no SIM state is cached
//!   between calls.
//! - Same-SIM operations linearize on the store's row lock; the audit
//!   trail is always consistent with one total order of transitions.
//! - Errors are typed and returned to the immediate caller; nothing is
//!   silently recovered except the allocator's bounded regeneration loop.
//!
//! This is a library-level contract: no network protocol or file format is
//! defined here. Web handlers, CSV import and CLI seeding are callers.

pub mod allocator;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod sim;
pub mod store;
pub mod swap;
pub mod transition;

/// Injected dependencies, abstracted for testability.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability.
    ///
    /// Production uses [`SystemClock`]; tests use the fixed clock from
    /// `simtrack-testing` so `created_at`/`updated_at` are deterministic.
    pub trait Clock: Send + Sync {
        /// Get the current time.
        fn now(&self) -> DateTime<Utc>;
    }

    /// System clock - delegates to [`Utc::now`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use allocator::IdentifierAllocator;
pub use error::{CodeUnusableReason, IdentifierKind, Result, SimError};
pub use event::{NewSimEvent, SimEvent, SimEventId, SimEventKind};
pub use lifecycle::{ImportOutcome, ImportSim, LifecycleManager};
pub use sim::{
    ActivationCode, ActivationCodeId, CodeStatus, CustomerId, SimCard, SimId, SimStatus,
    TariffPlanId, UserId,
};
pub use store::{SimStore, SimTransaction};
pub use swap::{SwapOrchestrator, SwapOutcome};
pub use transition::{Operation, is_legal_change, transition};
