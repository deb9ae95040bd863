//! Transactional store abstraction.
//!
//! The store is the single shared resource of the lifecycle core: every
//! mutating operation opens one transaction, reads current state fresh under
//! a row lock, validates, writes, appends the audit event and commits. The
//! core never caches SIM state in memory across calls.
//!
//! # Implementations
//!
//! - `PgSimStore` (in `simtrack-postgres`): production implementation on
//!   PostgreSQL, `SELECT ... FOR UPDATE` row locking.
//! - `InMemorySimStore` (in `simtrack-testing`): deterministic in-memory
//!   implementation for tests, same observable semantics.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::event::{NewSimEvent, SimEvent};
use crate::sim::{ActivationCode, ActivationCodeId, SimCard, SimId};

/// A transactional SIM store.
///
/// Implementations must be `Send + Sync`; a single store handle is shared
/// across concurrently running callers and the store (not the core) is
/// responsible for serializing same-row access.
pub trait SimStore: Send + Sync {
    /// Transaction handle type.
    type Txn<'a>: SimTransaction
    where
        Self: 'a;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::StoreUnavailable`] if a transaction cannot
    /// be started.
    fn begin(&self) -> impl Future<Output = Result<Self::Txn<'_>>> + Send;

    /// Fetch a SIM snapshot without locking it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::SimNotFound`] if no such SIM exists.
    fn sim(&self, id: SimId) -> impl Future<Output = Result<SimCard>> + Send;

    /// Fetch a SIM snapshot by ICCID, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::StoreUnavailable`] if the query fails.
    fn sim_by_iccid(&self, iccid: &str) -> impl Future<Output = Result<Option<SimCard>>> + Send;

    /// Fetch a SIM's full audit history, ordered oldest first.
    ///
    /// Ordering is by `created_at` with the insertion sequence as tie-break.
    /// Pure read; no business logic.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::StoreUnavailable`] if the query fails.
    fn events(&self, sim_id: SimId) -> impl Future<Output = Result<Vec<SimEvent>>> + Send;
}

/// A single open transaction against the store.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// every staged write, so an early `?` return can never leave a partial
/// mutation behind.
pub trait SimTransaction: Send {
    /// Read the current SIM row under an exclusive row lock.
    ///
    /// The lock is held until commit or rollback; concurrent transactions
    /// touching the same SIM serialize here.
    ///
    /// # Errors
    ///
    /// - [`crate::SimError::SimNotFound`]: no such SIM
    /// - [`crate::SimError::ConcurrencyConflict`]: lock wait timed out
    fn sim_for_update(&mut self, id: SimId) -> impl Future<Output = Result<SimCard>> + Send;

    /// Insert a new SIM row under the store's unique constraints.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::DuplicateIdentifier`] naming the
    /// constraint that fired when the ICCID or MSISDN is already taken.
    fn insert_sim(&mut self, sim: &SimCard) -> impl Future<Output = Result<()>> + Send;

    /// Persist a mutated SIM row (status, customer, tariff, `updated_at`).
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::SimNotFound`] if the row vanished.
    fn update_sim(&mut self, sim: &SimCard) -> impl Future<Output = Result<()>> + Send;

    /// Append one audit event. This is the event log writer: a pure insert
    /// inside the caller's transaction, no validation, insertion order
    /// preserved per SIM.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::StoreUnavailable`] if the insert fails.
    fn append_event(&mut self, event: NewSimEvent)
    -> impl Future<Output = Result<SimEvent>> + Send;

    /// Look up an activation code by its value, locking the row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::StoreUnavailable`] if the query fails.
    fn activation_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = Result<Option<ActivationCode>>> + Send;

    /// Mark an activation code as consumed at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::StoreUnavailable`] if the update fails.
    fn mark_code_used(
        &mut self,
        id: ActivationCodeId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// - [`crate::SimError::ConcurrencyConflict`]: serialization failure
    /// - [`crate::SimError::StoreUnavailable`]: commit failed; nothing was
    ///   applied
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Roll the transaction back explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::StoreUnavailable`] if the rollback could
    /// not be issued; staged writes are discarded regardless.
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}
