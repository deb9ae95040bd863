//! `PgSimStore`: the production store implementation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use simtrack_core::{
    ActivationCode, ActivationCodeId, CodeStatus, CustomerId, IdentifierKind, NewSimEvent, Result,
    SimCard, SimError, SimEvent, SimEventId, SimEventKind, SimId, SimStatus, SimStore,
    SimTransaction, TariffPlanId, UserId,
};

/// Default bound on how long a transition waits for a row lock before the
/// call fails with [`SimError::ConcurrencyConflict`].
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgreSQL-backed SIM store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PgSimStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgSimStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Connect to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::StoreUnavailable`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(map_db_err)?;
        Ok(Self::new(pool))
    }

    /// Override the per-transaction row-lock wait bound.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::StoreUnavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SimError::StoreUnavailable(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool, for callers that manage adjacent tables
    /// (customers, tariff plans, activation codes).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl SimStore for PgSimStore {
    type Txn<'a>
        = PgSimTransaction
    where
        Self: 'a;

    async fn begin(&self) -> Result<PgSimTransaction> {
        let mut txn = self.pool.begin().await.map_err(map_db_err)?;
        // SET LOCAL scopes the timeout to this transaction; parameters
        // cannot be bound in SET, hence the format.
        let timeout_ms = self.lock_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL lock_timeout = '{timeout_ms}ms'"))
            .execute(&mut *txn)
            .await
            .map_err(map_db_err)?;
        Ok(PgSimTransaction { txn })
    }

    async fn sim(&self, id: SimId) -> Result<SimCard> {
        sqlx::query(
            r"
            SELECT id, iccid, msisdn, status, customer_id, tariff_plan_id,
                   created_at, updated_at
            FROM sim_cards
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?
        .as_ref()
        .map(row_to_sim)
        .transpose()?
        .ok_or(SimError::SimNotFound(id))
    }

    async fn sim_by_iccid(&self, iccid: &str) -> Result<Option<SimCard>> {
        sqlx::query(
            r"
            SELECT id, iccid, msisdn, status, customer_id, tariff_plan_id,
                   created_at, updated_at
            FROM sim_cards
            WHERE iccid = $1
            ",
        )
        .bind(iccid)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?
        .as_ref()
        .map(row_to_sim)
        .transpose()
    }

    async fn events(&self, sim_id: SimId) -> Result<Vec<SimEvent>> {
        let rows = sqlx::query(
            r"
            SELECT seq, id, sim_id, kind, old_status, new_status, note,
                   created_by, created_at
            FROM sim_events
            WHERE sim_id = $1
            ORDER BY seq ASC
            ",
        )
        .bind(sim_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        rows.iter().map(row_to_event).collect()
    }
}

/// One open transaction against a [`PgSimStore`].
#[derive(Debug)]
pub struct PgSimTransaction {
    txn: Transaction<'static, Postgres>,
}

impl SimTransaction for PgSimTransaction {
    async fn sim_for_update(&mut self, id: SimId) -> Result<SimCard> {
        let row = sqlx::query(
            r"
            SELECT id, iccid, msisdn, status, customer_id, tariff_plan_id,
                   created_at, updated_at
            FROM sim_cards
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(id.0)
        .fetch_optional(&mut *self.txn)
        .await
        .map_err(|e| {
            let mapped = map_db_err(e);
            if mapped == SimError::ConcurrencyConflict {
                tracing::warn!(sim_id = %id, "row lock wait timed out");
            }
            mapped
        })?;

        row.as_ref()
            .map(row_to_sim)
            .transpose()?
            .ok_or(SimError::SimNotFound(id))
    }

    async fn insert_sim(&mut self, sim: &SimCard) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO sim_cards (
                id, iccid, msisdn, status, customer_id, tariff_plan_id,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(sim.id.0)
        .bind(&sim.iccid)
        .bind(sim.msisdn.as_deref())
        .bind(sim.status.as_str())
        .bind(sim.customer.map(|c| c.0))
        .bind(sim.tariff_plan.map(|t| t.0))
        .bind(sim.created_at)
        .bind(sim.updated_at)
        .execute(&mut *self.txn)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn update_sim(&mut self, sim: &SimCard) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE sim_cards
            SET status = $2, customer_id = $3, tariff_plan_id = $4, updated_at = $5
            WHERE id = $1
            ",
        )
        .bind(sim.id.0)
        .bind(sim.status.as_str())
        .bind(sim.customer.map(|c| c.0))
        .bind(sim.tariff_plan.map(|t| t.0))
        .bind(sim.updated_at)
        .execute(&mut *self.txn)
        .await
        .map_err(map_db_err)?;

        if result.rows_affected() == 0 {
            return Err(SimError::SimNotFound(sim.id));
        }
        Ok(())
    }

    async fn append_event(&mut self, event: NewSimEvent) -> Result<SimEvent> {
        let id = SimEventId::new();
        let row = sqlx::query(
            r"
            INSERT INTO sim_events (
                id, sim_id, kind, old_status, new_status, note, created_by,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING seq
            ",
        )
        .bind(id.0)
        .bind(event.sim_id.0)
        .bind(event.kind.as_str())
        .bind(event.old_status.map(|s| s.as_str()))
        .bind(event.new_status.map(|s| s.as_str()))
        .bind(event.note.as_deref())
        .bind(event.created_by.map(|u| u.0))
        .bind(event.created_at)
        .fetch_one(&mut *self.txn)
        .await
        .map_err(map_db_err)?;

        let seq: i64 = row.try_get("seq").map_err(map_db_err)?;
        Ok(SimEvent {
            id,
            seq,
            sim_id: event.sim_id,
            kind: event.kind,
            old_status: event.old_status,
            new_status: event.new_status,
            note: event.note,
            created_by: event.created_by,
            created_at: event.created_at,
        })
    }

    async fn activation_code(&mut self, code: &str) -> Result<Option<ActivationCode>> {
        sqlx::query(
            r"
            SELECT id, code, status, expires_at, used_at
            FROM activation_codes
            WHERE code = $1
            FOR UPDATE
            ",
        )
        .bind(code)
        .fetch_optional(&mut *self.txn)
        .await
        .map_err(map_db_err)?
        .as_ref()
        .map(row_to_code)
        .transpose()
    }

    async fn mark_code_used(&mut self, id: ActivationCodeId, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE activation_codes
            SET status = $2, used_at = $3
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .bind(CodeStatus::Used.as_str())
        .bind(at)
        .execute(&mut *self.txn)
        .await
        .map_err(map_db_err)?;

        if result.rows_affected() == 0 {
            return Err(SimError::StoreUnavailable(
                "unknown activation code id".to_string(),
            ));
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.txn.commit().await.map_err(map_db_err)
    }

    async fn rollback(self) -> Result<()> {
        self.txn.rollback().await.map_err(map_db_err)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Row mapping & error mapping
// ═══════════════════════════════════════════════════════════════════════

fn row_to_sim(row: &PgRow) -> Result<SimCard> {
    Ok(SimCard {
        id: SimId(row.try_get("id").map_err(map_db_err)?),
        iccid: row.try_get("iccid").map_err(map_db_err)?,
        msisdn: row.try_get("msisdn").map_err(map_db_err)?,
        status: SimStatus::parse(&row.try_get::<String, _>("status").map_err(map_db_err)?)?,
        customer: row
            .try_get::<Option<uuid::Uuid>, _>("customer_id")
            .map_err(map_db_err)?
            .map(CustomerId),
        tariff_plan: row
            .try_get::<Option<uuid::Uuid>, _>("tariff_plan_id")
            .map_err(map_db_err)?
            .map(TariffPlanId),
        created_at: row.try_get("created_at").map_err(map_db_err)?,
        updated_at: row.try_get("updated_at").map_err(map_db_err)?,
    })
}

fn row_to_event(row: &PgRow) -> Result<SimEvent> {
    let old_status = row
        .try_get::<Option<String>, _>("old_status")
        .map_err(map_db_err)?
        .as_deref()
        .map(SimStatus::parse)
        .transpose()?;
    let new_status = row
        .try_get::<Option<String>, _>("new_status")
        .map_err(map_db_err)?
        .as_deref()
        .map(SimStatus::parse)
        .transpose()?;
    Ok(SimEvent {
        id: SimEventId(row.try_get("id").map_err(map_db_err)?),
        seq: row.try_get("seq").map_err(map_db_err)?,
        sim_id: SimId(row.try_get("sim_id").map_err(map_db_err)?),
        kind: SimEventKind::parse(&row.try_get::<String, _>("kind").map_err(map_db_err)?)?,
        old_status,
        new_status,
        note: row.try_get("note").map_err(map_db_err)?,
        created_by: row
            .try_get::<Option<uuid::Uuid>, _>("created_by")
            .map_err(map_db_err)?
            .map(UserId),
        created_at: row.try_get("created_at").map_err(map_db_err)?,
    })
}

fn row_to_code(row: &PgRow) -> Result<ActivationCode> {
    Ok(ActivationCode {
        id: ActivationCodeId(row.try_get("id").map_err(map_db_err)?),
        code: row.try_get("code").map_err(map_db_err)?,
        status: CodeStatus::parse(&row.try_get::<String, _>("status").map_err(map_db_err)?)?,
        expires_at: row.try_get("expires_at").map_err(map_db_err)?,
        used_at: row.try_get("used_at").map_err(map_db_err)?,
    })
}

/// Map a sqlx error to the core taxonomy.
///
/// - `23505` (unique violation) → [`SimError::DuplicateIdentifier`], with
///   the kind read off the constraint name
/// - `55P03` (lock not available), `40001` (serialization failure) and
///   `40P01` (deadlock detected) → [`SimError::ConcurrencyConflict`]
/// - everything else → [`SimError::StoreUnavailable`]
fn map_db_err(e: sqlx::Error) -> SimError {
    if let sqlx::Error::Database(db) = &e {
        if let Some(code) = db.code() {
            match code.as_ref() {
                "23505" => {
                    let kind = if db.constraint().is_some_and(|c| c.contains("msisdn")) {
                        IdentifierKind::Msisdn
                    } else {
                        IdentifierKind::Iccid
                    };
                    metrics::counter!("sim.store.unique_violations", "kind" => kind.as_str())
                        .increment(1);
                    return SimError::DuplicateIdentifier { kind };
                }
                "55P03" | "40001" | "40P01" => {
                    metrics::counter!("sim.store.lock_conflicts").increment(1);
                    return SimError::ConcurrencyConflict;
                }
                _ => {}
            }
        }
    }
    SimError::StoreUnavailable(e.to_string())
}
