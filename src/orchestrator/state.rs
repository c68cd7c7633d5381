//! Pipeline states and progress events.
//!
//! ```text
//! Validating → [Approving] → Building → Signing → Broadcasting → Confirming → Done
//!      └──────────┴─────────────┴──────────┴───────────┴─────────────┴──→ Failed
//! ```

use std::fmt;

use alloy::primitives::TxHash;
use serde::Serialize;
use uuid::Uuid;

use crate::orchestrator::outcome::TxStatus;
use crate::transaction::OperationKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum OperationState {
    Validating,
    Approving,
    Building,
    Signing,
    Broadcasting,
    Confirming,
    Done(TxStatus),
    /// Error kind label, see `OrchestratorError::kind`.
    Failed(String),
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => f.write_str("validating"),
            Self::Approving => f.write_str("approving"),
            Self::Building => f.write_str("building"),
            Self::Signing => f.write_str("signing"),
            Self::Broadcasting => f.write_str("broadcasting"),
            Self::Confirming => f.write_str("confirming"),
            Self::Done(status) => write!(f, "done({status})"),
            Self::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// A state transition of one operation.
///
/// Approval sub-operations carry their parent's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub operation_id: Uuid,
    pub parent: Option<Uuid>,
    pub kind: OperationKind,
    pub state: OperationState,
    pub tx_hash: Option<TxHash>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(OperationState::Done(TxStatus::Failed).to_string(), "done(failed)");
        assert_eq!(
            OperationState::Failed("insufficient_balance".into()).to_string(),
            "failed(insufficient_balance)"
        );
        assert!(!OperationState::Confirming.is_terminal());
        assert!(OperationState::Done(TxStatus::Success).is_terminal());
    }

    #[test]
    fn test_event_serializes() {
        let event = ProgressEvent {
            operation_id: Uuid::nil(),
            parent: None,
            kind: OperationKind::Approval,
            state: OperationState::Broadcasting,
            tx_hash: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "approval");
        assert_eq!(json["state"]["state"], "broadcasting");
    }
}
