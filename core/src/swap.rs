//! SIM swap: decommission one card, activate its replacement, atomically.

use crate::error::{Result, SimError};
use crate::event::{NewSimEvent, SimEventKind};
use crate::lifecycle::LifecycleManager;
use crate::sim::{CustomerId, SimCard, SimId};
use crate::store::{SimStore, SimTransaction};
use crate::transition::{Operation, transition};

/// The two snapshots a committed swap returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    /// The old SIM, now `Terminated` with its customer cleared.
    pub decommissioned: SimCard,
    /// The replacement SIM, now `Active` and owned by the customer.
    pub activated: SimCard,
}

/// Composite operation on top of the lifecycle manager: terminate the old
/// SIM, move customer and tariff to the new one, activate it, all in one
/// transaction with one commit.
///
/// If any leg fails the whole swap rolls back; no committed state ever
/// shows the customer with zero or two active SIMs.
#[derive(Debug, Clone)]
pub struct SwapOrchestrator<S> {
    manager: LifecycleManager<S>,
}

impl<S: SimStore> SwapOrchestrator<S> {
    /// Build an orchestrator over an existing manager (shares its store,
    /// clock and actor).
    #[must_use]
    pub const fn new(manager: LifecycleManager<S>) -> Self {
        Self { manager }
    }

    /// The underlying lifecycle manager.
    #[must_use]
    pub const fn manager(&self) -> &LifecycleManager<S> {
        &self.manager
    }

    /// Replace `old_id` with `new_id` for `customer`.
    ///
    /// Both rows are locked in deterministic id order so concurrent swaps
    /// touching the same pair cannot deadlock. Each leg is validated
    /// against the transition table exactly like the standalone operations;
    /// on top of the leg events, both SIMs receive a `Swapped` event naming
    /// their counterpart.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidTransition`]: old SIM already terminated, or
    ///   new SIM not activatable (this also covers `old_id == new_id`)
    /// - [`SimError::SimNotFound`]: either row missing
    /// - [`SimError::ConcurrencyConflict`], [`SimError::StoreUnavailable`]
    pub async fn swap(
        &self,
        old_id: SimId,
        new_id: SimId,
        customer: CustomerId,
    ) -> Result<SwapOutcome> {
        let manager = &self.manager;
        let mut txn = manager.store.begin().await?;

        let (first_id, second_id) = if old_id <= new_id {
            (old_id, new_id)
        } else {
            (new_id, old_id)
        };
        let first = txn.sim_for_update(first_id).await?;
        let second = if second_id == first_id {
            first.clone()
        } else {
            txn.sim_for_update(second_id).await?
        };
        let (mut old_sim, mut new_sim) = if first_id == old_id {
            (first, second)
        } else {
            (second, first)
        };

        let Some((old_next, old_kind)) = transition(old_sim.status, Operation::Terminate) else {
            let _ = txn.rollback().await;
            return Err(SimError::InvalidTransition {
                from: old_sim.status,
                operation: Operation::Terminate,
            });
        };
        let Some((new_next, new_kind)) = transition(new_sim.status, Operation::Activate) else {
            let _ = txn.rollback().await;
            return Err(SimError::InvalidTransition {
                from: new_sim.status,
                operation: Operation::Activate,
            });
        };

        let now = manager.clock.now();
        let old_prev = old_sim.status;
        let new_prev = new_sim.status;
        let tariff = old_sim.tariff_plan.take();

        old_sim.status = old_next;
        old_sim.customer = None;
        old_sim.updated_at = now;

        new_sim.status = new_next;
        new_sim.customer = Some(customer);
        new_sim.tariff_plan = tariff;
        new_sim.updated_at = now;

        txn.update_sim(&old_sim).await?;
        txn.update_sim(&new_sim).await?;

        txn.append_event(
            NewSimEvent::new(old_sim.id, old_kind, now)
                .with_change(old_prev, old_next)
                .with_note("swapped")
                .with_actor(manager.actor),
        )
        .await?;
        txn.append_event(
            NewSimEvent::new(old_sim.id, SimEventKind::Swapped, now)
                .with_note(format!("replaced by {}", new_sim.iccid))
                .with_actor(manager.actor),
        )
        .await?;
        txn.append_event(
            NewSimEvent::new(new_sim.id, new_kind, now)
                .with_change(new_prev, new_next)
                .with_actor(manager.actor),
        )
        .await?;
        txn.append_event(
            NewSimEvent::new(new_sim.id, SimEventKind::Swapped, now)
                .with_note(format!("replaces {}", old_sim.iccid))
                .with_actor(manager.actor),
        )
        .await?;

        txn.commit().await?;
        tracing::info!(
            old_sim = %old_sim.id,
            new_sim = %new_sim.id,
            customer = %customer,
            "sim swap committed"
        );
        metrics::counter!("sim.lifecycle.swaps").increment(1);

        Ok(SwapOutcome {
            decommissioned: old_sim,
            activated: new_sim,
        })
    }
}
