//! In-memory implementation of the SIM store contract.
//!
//! Transactions take the whole-store lock for their lifetime, which gives
//! the same observable behavior as the Postgres store's row locks for any
//! test working a handful of SIMs: same-SIM operations serialize, and the
//! second of two racing callers validates against the first's committed
//! result. Writes are staged on the transaction and applied on commit;
//! dropping a transaction without commit discards them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use simtrack_core::{
    ActivationCode, ActivationCodeId, CodeStatus, IdentifierKind, NewSimEvent, Result, SimCard,
    SimError, SimEvent, SimEventId, SimId, SimStore, SimTransaction,
};

#[derive(Debug, Default)]
struct Inner {
    sims: HashMap<SimId, SimCard>,
    iccids: HashMap<String, SimId>,
    msisdns: HashMap<String, SimId>,
    events: Vec<SimEvent>,
    codes: HashMap<String, ActivationCode>,
    next_seq: i64,
}

impl Inner {
    fn index_sim(&mut self, sim: &SimCard) {
        self.iccids.insert(sim.iccid.clone(), sim.id);
        if let Some(msisdn) = &sim.msisdn {
            self.msisdns.insert(msisdn.clone(), sim.id);
        }
    }
}

/// In-memory SIM store.
///
/// Cheap to clone; all clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemorySimStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemorySimStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fixture SIM directly, bypassing the lifecycle (and thus the
    /// audit trail). Test setup only.
    pub async fn seed_sim(&self, sim: SimCard) {
        let mut inner = self.inner.lock().await;
        inner.index_sim(&sim);
        inner.sims.insert(sim.id, sim);
    }

    /// Insert a fixture activation code. Test setup only.
    pub async fn seed_code(&self, code: ActivationCode) {
        let mut inner = self.inner.lock().await;
        inner.codes.insert(code.code.clone(), code);
    }

    /// Number of recorded events for one SIM.
    pub async fn event_count(&self, sim_id: SimId) -> usize {
        self.inner
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.sim_id == sim_id)
            .count()
    }

    /// Total number of SIMs in the store.
    pub async fn sim_count(&self) -> usize {
        self.inner.lock().await.sims.len()
    }

    /// All SIM snapshots, in no particular order.
    pub async fn all_sims(&self) -> Vec<SimCard> {
        self.inner.lock().await.sims.values().cloned().collect()
    }
}

impl SimStore for InMemorySimStore {
    type Txn<'a>
        = InMemoryTransaction
    where
        Self: 'a;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        Ok(InMemoryTransaction {
            guard,
            staged_sims: HashMap::new(),
            staged_events: Vec::new(),
            staged_codes: HashMap::new(),
        })
    }

    async fn sim(&self, id: SimId) -> Result<SimCard> {
        self.inner
            .lock()
            .await
            .sims
            .get(&id)
            .cloned()
            .ok_or(SimError::SimNotFound(id))
    }

    async fn sim_by_iccid(&self, iccid: &str) -> Result<Option<SimCard>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .iccids
            .get(iccid)
            .and_then(|id| inner.sims.get(id))
            .cloned())
    }

    async fn events(&self, sim_id: SimId) -> Result<Vec<SimEvent>> {
        Ok(self
            .inner
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.sim_id == sim_id)
            .cloned()
            .collect())
    }
}

/// One open transaction against an [`InMemorySimStore`].
///
/// Holds the store lock until it is committed or dropped. Staged writes
/// become visible to other callers only at commit; reads within the
/// transaction see them immediately.
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Inner>,
    staged_sims: HashMap<SimId, SimCard>,
    staged_events: Vec<SimEvent>,
    staged_codes: HashMap<String, ActivationCode>,
}

impl InMemoryTransaction {
    fn iccid_taken(&self, iccid: &str) -> bool {
        self.guard.iccids.contains_key(iccid)
            || self.staged_sims.values().any(|s| s.iccid == iccid)
    }

    fn msisdn_taken(&self, msisdn: &str) -> bool {
        self.guard.msisdns.contains_key(msisdn)
            || self
                .staged_sims
                .values()
                .any(|s| s.msisdn.as_deref() == Some(msisdn))
    }
}

impl SimTransaction for InMemoryTransaction {
    async fn sim_for_update(&mut self, id: SimId) -> Result<SimCard> {
        self.staged_sims
            .get(&id)
            .or_else(|| self.guard.sims.get(&id))
            .cloned()
            .ok_or(SimError::SimNotFound(id))
    }

    async fn insert_sim(&mut self, sim: &SimCard) -> Result<()> {
        if self.iccid_taken(&sim.iccid) {
            return Err(SimError::DuplicateIdentifier {
                kind: IdentifierKind::Iccid,
            });
        }
        if let Some(msisdn) = &sim.msisdn {
            if self.msisdn_taken(msisdn) {
                return Err(SimError::DuplicateIdentifier {
                    kind: IdentifierKind::Msisdn,
                });
            }
        }
        self.staged_sims.insert(sim.id, sim.clone());
        Ok(())
    }

    async fn update_sim(&mut self, sim: &SimCard) -> Result<()> {
        if !self.staged_sims.contains_key(&sim.id) && !self.guard.sims.contains_key(&sim.id) {
            return Err(SimError::SimNotFound(sim.id));
        }
        self.staged_sims.insert(sim.id, sim.clone());
        Ok(())
    }

    async fn append_event(&mut self, event: NewSimEvent) -> Result<SimEvent> {
        // The store lock is held, so nobody else advances the sequence
        // while this transaction is open.
        let staged = i64::try_from(self.staged_events.len()).unwrap_or(i64::MAX);
        let seq = self.guard.next_seq + 1 + staged;
        let event = SimEvent {
            id: SimEventId::new(),
            seq,
            sim_id: event.sim_id,
            kind: event.kind,
            old_status: event.old_status,
            new_status: event.new_status,
            note: event.note,
            created_by: event.created_by,
            created_at: event.created_at,
        };
        self.staged_events.push(event.clone());
        Ok(event)
    }

    async fn activation_code(&mut self, code: &str) -> Result<Option<ActivationCode>> {
        Ok(self
            .staged_codes
            .get(code)
            .or_else(|| self.guard.codes.get(code))
            .cloned())
    }

    async fn mark_code_used(&mut self, id: ActivationCodeId, at: DateTime<Utc>) -> Result<()> {
        let mut code = self
            .staged_codes
            .values()
            .find(|c| c.id == id)
            .or_else(|| self.guard.codes.values().find(|c| c.id == id))
            .cloned()
            .ok_or_else(|| SimError::StoreUnavailable("unknown activation code id".to_string()))?;
        code.status = CodeStatus::Used;
        code.used_at = Some(at);
        self.staged_codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        let inner = &mut *self.guard;
        for sim in self.staged_sims.into_values() {
            inner.index_sim(&sim);
            inner.sims.insert(sim.id, sim);
        }
        inner.next_seq += i64::try_from(self.staged_events.len()).unwrap_or(i64::MAX);
        inner.events.append(&mut self.staged_events);
        for (key, code) in self.staged_codes {
            inner.codes.insert(key, code);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        // Staged writes are simply dropped.
        Ok(())
    }
}
