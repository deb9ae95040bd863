//! Error types for SIM lifecycle and identifier allocation operations.

use crate::sim::{SimId, SimStatus};
use crate::transition::Operation;
use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Which unique identifier a store constraint or validation rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// The 19-digit ICCID printed on the SIM.
    Iccid,
    /// The E.164 subscriber number.
    Msisdn,
}

impl IdentifierKind {
    /// Human-readable identifier name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Iccid => "ICCID",
            Self::Msisdn => "MSISDN",
        }
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an activation code could not be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeUnusableReason {
    /// No code with that value exists.
    NotFound,
    /// The code exists but its expiry timestamp has passed.
    Expired,
    /// The code was already consumed by a previous activation.
    AlreadyUsed,
}

impl std::fmt::Display for CodeUnusableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotFound => "code not found",
            Self::Expired => "code expired",
            Self::AlreadyUsed => "code already used",
        })
    }
}

/// Error taxonomy for the SIM lifecycle core.
///
/// Every failure a caller can observe is one of these variants. The core
/// performs no silent recovery: a failed call has rolled back completely,
/// leaving no partial state and no stray audit event behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    // ═══════════════════════════════════════════════════════════
    // Business-rule rejections
    // ═══════════════════════════════════════════════════════════
    /// The requested transition is not legal from the SIM's current status.
    ///
    /// The SIM is left untouched; no event is recorded.
    #[error("invalid transition: {operation} is not permitted from {from}")]
    InvalidTransition {
        /// Status the SIM was in when the operation was attempted.
        from: SimStatus,
        /// The operation that was rejected.
        operation: Operation,
    },

    /// The supplied activation code is missing, expired, or already used.
    #[error("activation code unusable: {0}")]
    CodeUnusable(CodeUnusableReason),

    /// An identifier failed format or checksum validation on a direct
    /// input path (e.g. bulk import).
    #[error("invalid {kind} {value:?}: {reason}")]
    InvalidIdentifier {
        /// Which identifier was rejected.
        kind: IdentifierKind,
        /// The offending input value.
        value: String,
        /// What was wrong with it.
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Capacity
    // ═══════════════════════════════════════════════════════════
    /// The allocator could not find a free identifier within its attempt
    /// bound.
    ///
    /// This signals that the configured identifier space is too small for
    /// the requested volume, not a transient condition; the allocator does
    /// not keep retrying on its own.
    #[error("identifier space exhausted after {attempts} attempts")]
    IdentifierSpaceExhausted {
        /// How many candidates were generated and rejected.
        attempts: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Store-level failures
    // ═══════════════════════════════════════════════════════════
    /// A concurrent caller holds (or held) the row; the lock wait timed out
    /// or the transaction was chosen as a serialization victim.
    ///
    /// The caller may retry the whole operation from scratch; the core never
    /// retries on its own.
    #[error("concurrent modification detected")]
    ConcurrencyConflict,

    /// The store rejected an insert because the identifier is already taken.
    ///
    /// Consumed internally by the allocator's bounded retry loop and by the
    /// import path's duplicate-skip policy; surfaces to callers only when
    /// neither applies.
    #[error("duplicate {kind}")]
    DuplicateIdentifier {
        /// Which unique constraint fired.
        kind: IdentifierKind,
    },

    /// No SIM with the given id exists.
    #[error("sim not found: {0}")]
    SimNotFound(SimId),

    /// The underlying transaction could not be started, executed, or
    /// committed. Fatal for the current call; never partially applied.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl SimError {
    /// Returns `true` if retrying the whole operation from scratch may
    /// succeed (the caller re-reads current state first).
    ///
    /// # Examples
    ///
    /// ```
    /// # use simtrack_core::SimError;
    /// assert!(SimError::ConcurrencyConflict.is_retryable());
    /// assert!(!SimError::StoreUnavailable("down".into()).is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict)
    }

    /// Returns `true` if this error is a rejection of the caller's request
    /// rather than an infrastructure failure.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. }
                | Self::CodeUnusable(_)
                | Self::InvalidIdentifier { .. }
                | Self::DuplicateIdentifier { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_conflict_is_the_only_retryable_error() {
        assert!(SimError::ConcurrencyConflict.is_retryable());
        assert!(!SimError::IdentifierSpaceExhausted { attempts: 20 }.is_retryable());
        assert!(
            !SimError::InvalidTransition {
                from: SimStatus::Terminated,
                operation: Operation::Activate,
            }
            .is_retryable()
        );
    }

    #[test]
    fn rejections_classify_as_user_errors() {
        assert!(SimError::CodeUnusable(CodeUnusableReason::Expired).is_user_error());
        assert!(
            SimError::DuplicateIdentifier {
                kind: IdentifierKind::Iccid
            }
            .is_user_error()
        );
        assert!(!SimError::ConcurrencyConflict.is_user_error());
        assert!(!SimError::StoreUnavailable("boom".into()).is_user_error());
    }

    #[test]
    fn display_names_the_rejected_operation() {
        let err = SimError::InvalidTransition {
            from: SimStatus::Available,
            operation: Operation::Suspend,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition: suspend is not permitted from AVAILABLE"
        );
    }
}
