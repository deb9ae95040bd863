//! The SIM status state machine, as one explicit table.
//!
//! Every lifecycle operation consults [`transition`] exactly once, at the
//! top, before touching anything. Keeping the whole machine in a single
//! match (instead of scattering status checks through the service methods)
//! makes the set of legal edges auditable at a glance and directly testable:
//! an edge is legal if and only if this function returns `Some` for it.

use crate::event::SimEventKind;
use crate::sim::SimStatus;
use serde::{Deserialize, Serialize};

/// A status-changing operation a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Earmark an available SIM for a customer.
    Reserve,
    /// Put a SIM into service.
    Activate,
    /// Take an active SIM temporarily out of service.
    Suspend,
    /// Return a suspended SIM to service.
    Resume,
    /// Flag a SIM as lost or stolen.
    ReportLost,
    /// Permanently decommission a SIM.
    Terminate,
}

impl Operation {
    /// All operations, for exhaustive table checks.
    pub const ALL: [Self; 6] = [
        Self::Reserve,
        Self::Activate,
        Self::Suspend,
        Self::Resume,
        Self::ReportLost,
        Self::Terminate,
    ];

    /// Stable lowercase name, used in logs, metrics and error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reserve => "reserve",
            Self::Activate => "activate",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::ReportLost => "report_lost",
            Self::Terminate => "terminate",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Look up the edge for `operation` out of `current`.
///
/// Returns the status the SIM moves to and the event kind that documents
/// the change, or `None` when the operation is not legal from `current`,
/// in which case the caller must fail with
/// [`crate::SimError::InvalidTransition`] and leave everything untouched.
///
/// `Terminated` is absorbing: no operation, including `Terminate` itself,
/// has an edge out of it.
#[must_use]
pub const fn transition(
    current: SimStatus,
    operation: Operation,
) -> Option<(SimStatus, SimEventKind)> {
    use crate::sim::SimStatus::{Active, Available, LostStolen, Reserved, Suspended, Terminated};

    match (current, operation) {
        (Available, Operation::Reserve) => Some((Reserved, SimEventKind::StatusChanged)),
        (Available | Reserved, Operation::Activate) => Some((Active, SimEventKind::Activated)),
        (Active, Operation::Suspend) => Some((Suspended, SimEventKind::Suspended)),
        (Suspended, Operation::Resume) => Some((Active, SimEventKind::StatusChanged)),
        (Active | Suspended | Reserved, Operation::ReportLost) => {
            Some((LostStolen, SimEventKind::StatusChanged))
        }
        (Terminated, _) => None,
        (_, Operation::Terminate) => Some((Terminated, SimEventKind::Terminated)),
        _ => None,
    }
}

/// Returns `true` if some operation moves a SIM from `old` to `new`.
///
/// Used by audit verification: every `(old_status, new_status)` pair on a
/// recorded event must satisfy this.
#[must_use]
pub fn is_legal_change(old: SimStatus, new: SimStatus) -> bool {
    Operation::ALL
        .iter()
        .any(|op| matches!(transition(old, *op), Some((next, _)) if next == new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimStatus::{Active, Available, LostStolen, Reserved, Suspended, Terminated};

    #[test]
    fn table_matches_the_specified_edges() {
        // reserve
        assert_eq!(
            transition(Available, Operation::Reserve),
            Some((Reserved, SimEventKind::StatusChanged))
        );
        // activate
        assert_eq!(
            transition(Available, Operation::Activate),
            Some((Active, SimEventKind::Activated))
        );
        assert_eq!(
            transition(Reserved, Operation::Activate),
            Some((Active, SimEventKind::Activated))
        );
        // suspend / resume
        assert_eq!(
            transition(Active, Operation::Suspend),
            Some((Suspended, SimEventKind::Suspended))
        );
        assert_eq!(
            transition(Suspended, Operation::Resume),
            Some((Active, SimEventKind::StatusChanged))
        );
        // report lost
        for from in [Active, Suspended, Reserved] {
            assert_eq!(
                transition(from, Operation::ReportLost),
                Some((LostStolen, SimEventKind::StatusChanged))
            );
        }
    }

    #[test]
    fn every_non_terminal_status_can_terminate() {
        for from in SimStatus::ALL {
            let edge = transition(from, Operation::Terminate);
            if from == Terminated {
                assert_eq!(edge, None);
            } else {
                assert_eq!(edge, Some((Terminated, SimEventKind::Terminated)));
            }
        }
    }

    #[test]
    fn terminated_is_absorbing() {
        for op in Operation::ALL {
            assert_eq!(transition(Terminated, op), None);
        }
    }

    #[test]
    fn rejected_edges_stay_rejected() {
        assert_eq!(transition(Available, Operation::Suspend), None);
        assert_eq!(transition(Available, Operation::Resume), None);
        assert_eq!(transition(Available, Operation::ReportLost), None);
        assert_eq!(transition(Reserved, Operation::Reserve), None);
        assert_eq!(transition(Reserved, Operation::Suspend), None);
        assert_eq!(transition(Active, Operation::Reserve), None);
        assert_eq!(transition(Active, Operation::Activate), None);
        assert_eq!(transition(Active, Operation::Resume), None);
        assert_eq!(transition(Suspended, Operation::Suspend), None);
        assert_eq!(transition(Suspended, Operation::Activate), None);
        assert_eq!(transition(LostStolen, Operation::Resume), None);
        assert_eq!(transition(LostStolen, Operation::Activate), None);
        assert_eq!(transition(LostStolen, Operation::ReportLost), None);
    }

    #[test]
    fn legal_change_agrees_with_the_table() {
        for old in SimStatus::ALL {
            for new in SimStatus::ALL {
                let derived = Operation::ALL
                    .iter()
                    .any(|op| matches!(transition(old, *op), Some((next, _)) if next == new));
                assert_eq!(is_legal_change(old, new), derived);
            }
        }
        // spot checks
        assert!(is_legal_change(Available, Reserved));
        assert!(is_legal_change(Suspended, Active));
        assert!(!is_legal_change(Terminated, Available));
        assert!(!is_legal_change(Available, Suspended));
    }
}
