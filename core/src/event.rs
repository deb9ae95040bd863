//! Audit-trail event types.
//!
//! Every status change a SIM undergoes is documented by a [`SimEvent`]
//! appended in the same transaction as the change itself. Events are
//! append-only: never updated, never deleted, and strictly ordered per SIM
//! by `created_at` with the insertion sequence as tie-break.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::sim::{SimId, SimStatus, UserId};

/// Unique identifier for an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimEventId(pub uuid::Uuid);

impl SimEventId {
    /// Generate a new random `SimEventId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SimEventId {
    fn default() -> Self {
        Self::new()
    }
}

/// What kind of fact an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimEventKind {
    /// SIM entered the inventory via the allocator.
    Created,
    /// SIM was assigned to a customer.
    Assigned,
    /// Generic status transition (reserve, resume, report lost).
    StatusChanged,
    /// SIM went into service.
    Activated,
    /// SIM was suspended.
    Suspended,
    /// SIM reached its terminal status.
    Terminated,
    /// SIM entered the inventory via bulk import.
    Imported,
    /// SIM took part in a swap, on either side.
    Swapped,
}

impl SimEventKind {
    /// Convert kind to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Assigned => "ASSIGNED",
            Self::StatusChanged => "STATUS_CHANGED",
            Self::Activated => "ACTIVATED",
            Self::Suspended => "SUSPENDED",
            Self::Terminated => "TERMINATED",
            Self::Imported => "IMPORTED",
            Self::Swapped => "SWAPPED",
        }
    }

    /// Parse kind from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::StoreUnavailable`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, SimError> {
        match s {
            "CREATED" => Ok(Self::Created),
            "ASSIGNED" => Ok(Self::Assigned),
            "STATUS_CHANGED" => Ok(Self::StatusChanged),
            "ACTIVATED" => Ok(Self::Activated),
            "SUSPENDED" => Ok(Self::Suspended),
            "TERMINATED" => Ok(Self::Terminated),
            "IMPORTED" => Ok(Self::Imported),
            "SWAPPED" => Ok(Self::Swapped),
            _ => Err(SimError::StoreUnavailable(format!(
                "invalid event kind: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for SimEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit event not yet persisted.
///
/// Built by the lifecycle manager and handed to
/// [`crate::store::SimTransaction::append_event`], which records it
/// verbatim; the writer never validates business rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSimEvent {
    /// The SIM this event documents.
    pub sim_id: SimId,
    /// What happened.
    pub kind: SimEventKind,
    /// Status before the change; `None` for non-status events.
    pub old_status: Option<SimStatus>,
    /// Status after the change; `None` for non-status events.
    pub new_status: Option<SimStatus>,
    /// Free-form context (suspension reason, import source, ...).
    pub note: Option<String>,
    /// User on whose behalf the operation ran, when known.
    pub created_by: Option<UserId>,
    /// When the documented change happened.
    pub created_at: DateTime<Utc>,
}

impl NewSimEvent {
    /// New event with no status pair and no note.
    #[must_use]
    pub const fn new(sim_id: SimId, kind: SimEventKind, created_at: DateTime<Utc>) -> Self {
        Self {
            sim_id,
            kind,
            old_status: None,
            new_status: None,
            note: None,
            created_by: None,
            created_at,
        }
    }

    /// Attach the before/after status pair.
    #[must_use]
    pub const fn with_change(mut self, old: SimStatus, new: SimStatus) -> Self {
        self.old_status = Some(old);
        self.new_status = Some(new);
        self
    }

    /// Record the status a freshly inserted SIM starts in.
    #[must_use]
    pub const fn with_initial_status(mut self, status: SimStatus) -> Self {
        self.new_status = Some(status);
        self
    }

    /// Attach a free-form note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Stamp the acting user.
    #[must_use]
    pub const fn with_actor(mut self, actor: Option<UserId>) -> Self {
        self.created_by = actor;
        self
    }
}

/// A persisted audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimEvent {
    /// Row identity.
    pub id: SimEventId,
    /// Monotonic insertion sequence; tie-break for equal timestamps.
    pub seq: i64,
    /// The SIM this event documents.
    pub sim_id: SimId,
    /// What happened.
    pub kind: SimEventKind,
    /// Status before the change; `None` for non-status events.
    pub old_status: Option<SimStatus>,
    /// Status after the change; `None` for non-status events.
    pub new_status: Option<SimStatus>,
    /// Free-form context.
    pub note: Option<String>,
    /// User on whose behalf the operation ran, when known.
    pub created_by: Option<UserId>,
    /// When the documented change happened.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_storage_strings() {
        let kinds = [
            SimEventKind::Created,
            SimEventKind::Assigned,
            SimEventKind::StatusChanged,
            SimEventKind::Activated,
            SimEventKind::Suspended,
            SimEventKind::Terminated,
            SimEventKind::Imported,
            SimEventKind::Swapped,
        ];
        for kind in kinds {
            assert_eq!(SimEventKind::parse(kind.as_str()), Ok(kind));
        }
        assert!(SimEventKind::parse("swapped").is_err());
    }

    #[test]
    fn builder_fills_only_what_is_asked() {
        let sim_id = SimId::new();
        let at = Utc::now();
        let event = NewSimEvent::new(sim_id, SimEventKind::StatusChanged, at)
            .with_change(SimStatus::Available, SimStatus::Reserved)
            .with_note("reserve");
        assert_eq!(event.old_status, Some(SimStatus::Available));
        assert_eq!(event.new_status, Some(SimStatus::Reserved));
        assert_eq!(event.note.as_deref(), Some("reserve"));
        assert_eq!(event.created_by, None);
    }
}
