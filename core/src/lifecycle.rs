//! The SIM lifecycle manager.
//!
//! Every mutating operation here is one store transaction: lock the row,
//! consult the transition table, mutate, append the audit event(s), commit.
//! A failed call rolls back completely; callers can verify this by the
//! absence of any new [`SimEvent`].
//!
//! Concurrency: two calls against the same SIM serialize on the store's row
//! lock. The second caller either sees the first's committed result (and is
//! validated against the new status) or gets
//! [`SimError::ConcurrencyConflict`] when its lock wait times out. Retry
//! policy belongs to the caller; the manager never retries a transition.

use std::sync::Arc;

use crate::allocator::IdentifierAllocator;
use crate::environment::{Clock, SystemClock};
use crate::error::{CodeUnusableReason, IdentifierKind, Result, SimError};
use crate::event::{NewSimEvent, SimEvent, SimEventKind};
use crate::sim::{CodeStatus, CustomerId, SimCard, SimId, SimStatus, TariffPlanId, UserId};
use crate::store::{SimStore, SimTransaction};
use crate::transition::{Operation, transition};

/// One row of a bulk import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSim {
    /// Externally supplied ICCID; re-validated before insert.
    pub iccid: String,
    /// Externally supplied MSISDN, if any; re-validated before insert.
    pub msisdn: Option<String>,
    /// Tariff plan to bill against, if known.
    pub tariff_plan: Option<TariffPlanId>,
    /// Import source recorded on the audit event (e.g. `"csv"`).
    pub note: Option<String>,
}

/// What happened to one imported row.
///
/// Rows whose ICCID already exists are skipped, not failed: bulk importers
/// report per-row outcomes and a stale row must not abort the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The row was inserted; an `Imported` event documents it.
    Imported(SimCard),
    /// A SIM with this ICCID already exists; nothing was written.
    SkippedDuplicate {
        /// The colliding ICCID.
        iccid: String,
    },
}

/// Governs legal status transitions for SIM cards and records every change
/// in the audit trail, atomically.
///
/// The manager holds no SIM state of its own; each call reads current
/// status fresh inside its transaction. Handles are cheap to clone when the
/// store is.
///
/// # Examples
///
/// ```ignore
/// let manager = LifecycleManager::new(store);
/// let sim = manager.create(None).await?;
/// let sim = manager.reserve(sim.id, customer).await?;
/// let sim = manager.activate(sim.id, Some("SIM-1234"), None).await?;
/// ```
#[derive(Clone)]
pub struct LifecycleManager<S> {
    pub(crate) store: S,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) allocator: IdentifierAllocator,
    pub(crate) actor: Option<UserId>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for LifecycleManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("store", &self.store)
            .field("allocator", &self.allocator)
            .field("actor", &self.actor)
            .finish_non_exhaustive()
    }
}

impl<S: SimStore> LifecycleManager<S> {
    /// Create a manager over `store` with the system clock and default
    /// allocator configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            allocator: IdentifierAllocator::default(),
            actor: None,
        }
    }

    /// Replace the clock (tests use a fixed one).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the identifier allocator configuration.
    #[must_use]
    pub fn with_allocator(mut self, allocator: IdentifierAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Stamp subsequent audit events with the acting user.
    #[must_use]
    pub const fn with_actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    // ═══════════════════════════════════════════════════════════
    // Creation & import
    // ═══════════════════════════════════════════════════════════

    /// Create a new SIM with allocator-generated identifiers.
    ///
    /// Generates a candidate ICCID/MSISDN pair and inserts it under the
    /// store's unique constraints; on a collision the transaction rolls
    /// back and a fresh candidate is tried, up to the allocator's attempt
    /// bound. The new SIM starts `Available` with a `Created` event.
    ///
    /// # Errors
    ///
    /// - [`SimError::IdentifierSpaceExhausted`]: no free identifier within
    ///   the attempt bound; widen the configured space before retrying
    /// - [`SimError::StoreUnavailable`]: transaction failure
    pub async fn create(&self, tariff_plan: Option<TariffPlanId>) -> Result<SimCard> {
        for attempt in 1..=self.allocator.max_attempts {
            let (iccid, msisdn) = {
                let mut rng = rand::thread_rng();
                (
                    self.allocator.generate_iccid(&mut rng)?,
                    self.allocator.generate_msisdn(&mut rng),
                )
            };

            let mut txn = self.store.begin().await?;
            let now = self.clock.now();
            let sim = SimCard {
                id: SimId::new(),
                iccid,
                msisdn: Some(msisdn),
                status: SimStatus::Available,
                customer: None,
                tariff_plan,
                created_at: now,
                updated_at: now,
            };

            match txn.insert_sim(&sim).await {
                Ok(()) => {
                    txn.append_event(
                        NewSimEvent::new(sim.id, SimEventKind::Created, now)
                            .with_initial_status(SimStatus::Available)
                            .with_actor(self.actor),
                    )
                    .await?;
                    txn.commit().await?;
                    tracing::info!(sim_id = %sim.id, iccid = %sim.iccid, attempt, "sim created");
                    metrics::counter!("sim.allocator.created").increment(1);
                    return Ok(sim);
                }
                Err(SimError::DuplicateIdentifier { kind }) => {
                    let _ = txn.rollback().await;
                    tracing::warn!(
                        attempt,
                        kind = kind.as_str(),
                        "identifier collision, regenerating"
                    );
                    metrics::counter!("sim.allocator.retries", "kind" => kind.as_str())
                        .increment(1);
                }
                Err(e) => {
                    let _ = txn.rollback().await;
                    return Err(e);
                }
            }
        }
        Err(SimError::IdentifierSpaceExhausted {
            attempts: self.allocator.max_attempts,
        })
    }

    /// Import one externally supplied SIM row.
    ///
    /// The ICCID is re-validated (length, digits, Luhn checksum) even though
    /// generation would guarantee it: the checksum is a format invariant of
    /// the store, and import bypasses generation. A row whose ICCID already
    /// exists is skipped (see [`ImportOutcome`]).
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidIdentifier`]: malformed ICCID or MSISDN
    /// - [`SimError::DuplicateIdentifier`]: MSISDN collision (only the
    ///   ICCID gets the skip treatment; a colliding MSISDN on a new ICCID is
    ///   a data problem the caller must resolve)
    /// - [`SimError::StoreUnavailable`]: transaction failure
    pub async fn import(&self, row: ImportSim) -> Result<ImportOutcome> {
        self.allocator.validate_iccid(&row.iccid)?;
        if let Some(msisdn) = &row.msisdn {
            self.allocator.validate_msisdn(msisdn)?;
        }

        let mut txn = self.store.begin().await?;
        let now = self.clock.now();
        let sim = SimCard {
            id: SimId::new(),
            iccid: row.iccid.clone(),
            msisdn: row.msisdn.clone(),
            status: SimStatus::Available,
            customer: None,
            tariff_plan: row.tariff_plan,
            created_at: now,
            updated_at: now,
        };

        match txn.insert_sim(&sim).await {
            Ok(()) => {
                let note = row.note.unwrap_or_else(|| "import".to_string());
                txn.append_event(
                    NewSimEvent::new(sim.id, SimEventKind::Imported, now)
                        .with_initial_status(SimStatus::Available)
                        .with_note(note)
                        .with_actor(self.actor),
                )
                .await?;
                txn.commit().await?;
                tracing::info!(sim_id = %sim.id, iccid = %sim.iccid, "sim imported");
                metrics::counter!("sim.import.rows", "outcome" => "imported").increment(1);
                Ok(ImportOutcome::Imported(sim))
            }
            Err(SimError::DuplicateIdentifier {
                kind: IdentifierKind::Iccid,
            }) => {
                let _ = txn.rollback().await;
                tracing::info!(iccid = %row.iccid, "import skipped: iccid already present");
                metrics::counter!("sim.import.rows", "outcome" => "skipped").increment(1);
                Ok(ImportOutcome::SkippedDuplicate { iccid: row.iccid })
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Transitions
    // ═══════════════════════════════════════════════════════════

    /// Earmark an `Available` SIM for `customer`.
    ///
    /// Emits `Assigned` followed by `StatusChanged`.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidTransition`]: SIM is not `Available`
    /// - [`SimError::SimNotFound`], [`SimError::ConcurrencyConflict`],
    ///   [`SimError::StoreUnavailable`]
    pub async fn reserve(&self, sim_id: SimId, customer: CustomerId) -> Result<SimCard> {
        let op = Operation::Reserve;
        let mut txn = self.store.begin().await?;
        let mut sim = txn.sim_for_update(sim_id).await?;
        let Some((next, kind)) = transition(sim.status, op) else {
            return Self::reject(txn, &sim, op).await;
        };

        let now = self.clock.now();
        let old = sim.status;
        sim.status = next;
        sim.customer = Some(customer);
        sim.updated_at = now;
        txn.update_sim(&sim).await?;
        txn.append_event(
            NewSimEvent::new(sim.id, SimEventKind::Assigned, now)
                .with_note(format!("customer {customer}"))
                .with_actor(self.actor),
        )
        .await?;
        txn.append_event(
            NewSimEvent::new(sim.id, kind, now)
                .with_change(old, next)
                .with_actor(self.actor),
        )
        .await?;
        txn.commit().await?;
        self.committed(op, &sim, old);
        Ok(sim)
    }

    /// Put a SIM into service.
    ///
    /// Legal from `Available` and `Reserved`. If `code` is given it must be
    /// unused and unexpired, and is consumed in the same transaction. An
    /// active SIM always has an owner: either the SIM is already assigned
    /// (reserved) or the caller supplies `customer` here.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidTransition`]: wrong status, or no owner to
    ///   activate for
    /// - [`SimError::CodeUnusable`]: code missing, expired or spent
    /// - [`SimError::SimNotFound`], [`SimError::ConcurrencyConflict`],
    ///   [`SimError::StoreUnavailable`]
    pub async fn activate(
        &self,
        sim_id: SimId,
        code: Option<&str>,
        customer: Option<CustomerId>,
    ) -> Result<SimCard> {
        let op = Operation::Activate;
        let mut txn = self.store.begin().await?;
        let mut sim = txn.sim_for_update(sim_id).await?;
        let Some((next, kind)) = transition(sim.status, op) else {
            return Self::reject(txn, &sim, op).await;
        };
        if sim.customer.is_none() && customer.is_none() {
            return Self::reject(txn, &sim, op).await;
        }

        let now = self.clock.now();
        if let Some(code_value) = code {
            let Some(code_row) = txn.activation_code(code_value).await? else {
                let _ = txn.rollback().await;
                return Err(SimError::CodeUnusable(CodeUnusableReason::NotFound));
            };
            if code_row.status == CodeStatus::Used {
                let _ = txn.rollback().await;
                return Err(SimError::CodeUnusable(CodeUnusableReason::AlreadyUsed));
            }
            if !code_row.is_usable_at(now) {
                let _ = txn.rollback().await;
                return Err(SimError::CodeUnusable(CodeUnusableReason::Expired));
            }
            txn.mark_code_used(code_row.id, now).await?;
        }

        let old = sim.status;
        let newly_assigned = sim.customer.is_none();
        if sim.customer.is_none() {
            sim.customer = customer;
        }
        sim.status = next;
        sim.updated_at = now;
        txn.update_sim(&sim).await?;
        if newly_assigned {
            if let Some(customer) = sim.customer {
                txn.append_event(
                    NewSimEvent::new(sim.id, SimEventKind::Assigned, now)
                        .with_note(format!("customer {customer}"))
                        .with_actor(self.actor),
                )
                .await?;
            }
        }
        txn.append_event(
            NewSimEvent::new(sim.id, kind, now)
                .with_change(old, next)
                .with_actor(self.actor),
        )
        .await?;
        txn.commit().await?;
        self.committed(op, &sim, old);
        Ok(sim)
    }

    /// Take an `Active` SIM temporarily out of service.
    ///
    /// Emits `Suspended` with the reason as note.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidTransition`]: SIM is not `Active`
    /// - [`SimError::SimNotFound`], [`SimError::ConcurrencyConflict`],
    ///   [`SimError::StoreUnavailable`]
    pub async fn suspend(&self, sim_id: SimId, reason: &str) -> Result<SimCard> {
        self.simple_transition(sim_id, Operation::Suspend, Some(reason), false)
            .await
    }

    /// Return a `Suspended` SIM to service.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidTransition`]: SIM is not `Suspended`
    /// - [`SimError::SimNotFound`], [`SimError::ConcurrencyConflict`],
    ///   [`SimError::StoreUnavailable`]
    pub async fn resume(&self, sim_id: SimId) -> Result<SimCard> {
        self.simple_transition(sim_id, Operation::Resume, None, false)
            .await
    }

    /// Flag a SIM as lost or stolen.
    ///
    /// Legal from `Active`, `Suspended` and `Reserved`.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidTransition`]: wrong current status
    /// - [`SimError::SimNotFound`], [`SimError::ConcurrencyConflict`],
    ///   [`SimError::StoreUnavailable`]
    pub async fn report_lost(&self, sim_id: SimId, reason: &str) -> Result<SimCard> {
        self.simple_transition(sim_id, Operation::ReportLost, Some(reason), false)
            .await
    }

    /// Permanently decommission a SIM and clear its customer.
    ///
    /// Legal from every status except `Terminated` itself; there is no way
    /// back out.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidTransition`]: already terminated
    /// - [`SimError::SimNotFound`], [`SimError::ConcurrencyConflict`],
    ///   [`SimError::StoreUnavailable`]
    pub async fn terminate(&self, sim_id: SimId, reason: &str) -> Result<SimCard> {
        self.simple_transition(sim_id, Operation::Terminate, Some(reason), true)
            .await
    }

    // ═══════════════════════════════════════════════════════════
    // Read-only queries
    // ═══════════════════════════════════════════════════════════

    /// Fetch a SIM snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::SimNotFound`] or [`SimError::StoreUnavailable`].
    pub async fn sim(&self, sim_id: SimId) -> Result<SimCard> {
        self.store.sim(sim_id).await
    }

    /// Fetch a SIM's ordered audit history. Pure store delegation.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::StoreUnavailable`] if the query fails.
    pub async fn events(&self, sim_id: SimId) -> Result<Vec<SimEvent>> {
        self.store.events(sim_id).await
    }

    // ═══════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════

    /// Lock, validate against the table, apply, record, commit.
    async fn simple_transition(
        &self,
        sim_id: SimId,
        op: Operation,
        note: Option<&str>,
        clear_customer: bool,
    ) -> Result<SimCard> {
        let mut txn = self.store.begin().await?;
        let mut sim = txn.sim_for_update(sim_id).await?;
        let Some((next, kind)) = transition(sim.status, op) else {
            return Self::reject(txn, &sim, op).await;
        };

        let now = self.clock.now();
        let old = sim.status;
        sim.status = next;
        sim.updated_at = now;
        if clear_customer {
            sim.customer = None;
        }
        txn.update_sim(&sim).await?;
        let mut event = NewSimEvent::new(sim.id, kind, now)
            .with_change(old, next)
            .with_actor(self.actor);
        if let Some(note) = note {
            event = event.with_note(note);
        }
        txn.append_event(event).await?;
        txn.commit().await?;
        self.committed(op, &sim, old);
        Ok(sim)
    }

    /// Roll back and report an illegal transition. `T` is never produced.
    async fn reject<T>(txn: S::Txn<'_>, sim: &SimCard, op: Operation) -> Result<T> {
        let _ = txn.rollback().await;
        tracing::debug!(
            sim_id = %sim.id,
            operation = op.as_str(),
            status = %sim.status,
            "transition rejected"
        );
        metrics::counter!("sim.lifecycle.rejected", "operation" => op.as_str()).increment(1);
        Err(SimError::InvalidTransition {
            from: sim.status,
            operation: op,
        })
    }

    fn committed(&self, op: Operation, sim: &SimCard, old: SimStatus) {
        tracing::info!(
            sim_id = %sim.id,
            operation = op.as_str(),
            old_status = %old,
            new_status = %sim.status,
            "sim transition committed"
        );
        metrics::counter!("sim.lifecycle.transitions", "operation" => op.as_str()).increment(1);
    }
}
