//! SIM card state types.
//!
//! All types are `Clone` so callers receive detached snapshots; the store is
//! the only authority on current state and the lifecycle manager never holds
//! a `SimCard` across calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SimError;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for a SIM card.
///
/// Ordered so composite operations can lock multiple rows in a
/// deterministic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimId(pub uuid::Uuid);

impl SimId {
    /// Generate a new random `SimId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SimId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque reference to a customer record.
///
/// Supplied by the caller and never validated for existence here; the
/// store's foreign-key constraint is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub uuid::Uuid);

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque reference to a tariff plan record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TariffPlanId(pub uuid::Uuid);

/// Opaque reference to the user on whose behalf an operation ran.
///
/// Only used to stamp audit events; never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub uuid::Uuid);

/// Unique identifier for an activation code row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationCodeId(pub uuid::Uuid);

impl ActivationCodeId {
    /// Generate a new random `ActivationCodeId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ActivationCodeId {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Status
// ═══════════════════════════════════════════════════════════════════════

/// Lifecycle status of a SIM card.
///
/// `Terminated` is the single terminal status: every non-terminal status can
/// reach it and nothing leads back out. The full set of legal edges lives in
/// [`crate::transition::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimStatus {
    /// In inventory, unassigned.
    Available,
    /// Earmarked for a customer but not yet in service.
    Reserved,
    /// In service.
    Active,
    /// Temporarily out of service (e.g. unpaid bill); can resume.
    Suspended,
    /// Reported lost or stolen; can only be terminated.
    LostStolen,
    /// Permanently decommissioned. Terminal.
    Terminated,
}

impl SimStatus {
    /// All statuses, for exhaustive table checks.
    pub const ALL: [Self; 6] = [
        Self::Available,
        Self::Reserved,
        Self::Active,
        Self::Suspended,
        Self::LostStolen,
        Self::Terminated,
    ];

    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Reserved => "RESERVED",
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::LostStolen => "LOST_STOLEN",
            Self::Terminated => "TERMINATED",
        }
    }

    /// Parse status from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::StoreUnavailable`] if the string doesn't match a
    /// known status; a row carrying one is corrupt.
    pub fn parse(s: &str) -> Result<Self, SimError> {
        match s {
            "AVAILABLE" => Ok(Self::Available),
            "RESERVED" => Ok(Self::Reserved),
            "ACTIVE" => Ok(Self::Active),
            "SUSPENDED" => Ok(Self::Suspended),
            "LOST_STOLEN" => Ok(Self::LostStolen),
            "TERMINATED" => Ok(Self::Terminated),
            _ => Err(SimError::StoreUnavailable(format!(
                "invalid sim status: {s}"
            ))),
        }
    }

    /// Returns `true` if no transition leads out of this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for SimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// SIM card
// ═══════════════════════════════════════════════════════════════════════

/// A SIM card row, as read from or written to the store.
///
/// The lifecycle manager is the only writer of `status`, `customer`,
/// `tariff_plan` and `updated_at`; identifiers are fixed at insert time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimCard {
    /// Stable identity, assigned once at creation.
    pub id: SimId,

    /// 19-digit Luhn-valid ICCID. Globally unique.
    pub iccid: String,

    /// E.164 subscriber number. Globally unique when present.
    pub msisdn: Option<String>,

    /// Current lifecycle status.
    pub status: SimStatus,

    /// Owning customer, when reserved or in service.
    pub customer: Option<CustomerId>,

    /// Tariff plan the SIM bills against.
    pub tariff_plan: Option<TariffPlanId>,

    /// Creation timestamp. Immutable.
    pub created_at: DateTime<Utc>,

    /// Bumped on every mutation.
    pub updated_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Activation codes
// ═══════════════════════════════════════════════════════════════════════

/// Consumption state of an activation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeStatus {
    /// Not yet consumed.
    Unused,
    /// Consumed by a successful activation.
    Used,
}

impl CodeStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unused => "UNUSED",
            Self::Used => "USED",
        }
    }

    /// Parse status from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::StoreUnavailable`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, SimError> {
        match s {
            "UNUSED" => Ok(Self::Unused),
            "USED" => Ok(Self::Used),
            _ => Err(SimError::StoreUnavailable(format!(
                "invalid code status: {s}"
            ))),
        }
    }
}

/// A single-use activation code, supplied by the caller's persistence layer.
///
/// The lifecycle manager only checks usability and marks consumption;
/// issuing codes is not its concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationCode {
    /// Row identity.
    pub id: ActivationCodeId,
    /// The code value presented by the subscriber.
    pub code: String,
    /// Whether the code has been consumed.
    pub status: CodeStatus,
    /// Optional expiry; `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the code was consumed, if it was.
    pub used_at: Option<DateTime<Utc>>,
}

impl ActivationCode {
    /// Returns `true` if the code can still be consumed at `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CodeStatus::Unused && self.expires_at.is_none_or(|t| now < t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_round_trips_through_storage_strings() {
        for status in SimStatus::ALL {
            assert_eq!(SimStatus::parse(status.as_str()), Ok(status));
        }
        assert!(SimStatus::parse("active").is_err());
    }

    #[test]
    fn only_terminated_is_terminal() {
        for status in SimStatus::ALL {
            assert_eq!(status.is_terminal(), status == SimStatus::Terminated);
        }
    }

    #[test]
    fn expired_code_is_not_usable() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single();
        let now = now.unwrap_or_default();
        let code = ActivationCode {
            id: ActivationCodeId::new(),
            code: "SIM-1234".to_string(),
            status: CodeStatus::Unused,
            expires_at: Some(now - chrono::Duration::minutes(1)),
            used_at: None,
        };
        assert!(!code.is_usable_at(now));

        let fresh = ActivationCode {
            expires_at: Some(now + chrono::Duration::minutes(1)),
            ..code
        };
        assert!(fresh.is_usable_at(now));
    }
}
