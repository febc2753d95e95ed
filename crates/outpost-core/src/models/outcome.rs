//! Per-change ingestion outcome

use serde::{Deserialize, Serialize};

use crate::models::{Operation, SyncRecord};

/// Why a change was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// `create` against a record that already exists
    DuplicateCreate,
    /// Submitted and stored histories diverged
    Concurrent,
    /// Submitted clock is older than the stored one
    Stale,
}

impl ConflictReason {
    pub const fn message(self) -> &'static str {
        match self {
            Self::DuplicateCreate => "Conflict detected - record already exists",
            Self::Concurrent => "Conflict detected - concurrent modification",
            Self::Stale => "Conflict detected - server version newer",
        }
    }
}

/// Class of a per-change failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    NotFound,
    Storage,
}

/// Tagged result of one change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Change is reflected in `record`; `noop` when it already was
    Applied { record: SyncRecord, noop: bool },
    /// Change was rejected; `record` is the current server version
    Conflict {
        reason: ConflictReason,
        record: SyncRecord,
    },
    /// Change could not be processed
    Error { kind: FailureKind },
}

/// Outcome of one change in a submitted batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOutcome {
    /// Position of the change in the submitted batch
    pub index: usize,
    pub record_id: Option<String>,
    pub operation: Option<Operation>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    pub message: String,
}

impl ChangeOutcome {
    pub fn applied(index: usize, operation: Operation, record: SyncRecord, noop: bool) -> Self {
        let message = if noop {
            format!("{operation} already applied")
        } else {
            format!("{operation} operation applied")
        };
        Self {
            index,
            record_id: Some(record.record_id.clone()),
            operation: Some(operation),
            status: OutcomeStatus::Applied { record, noop },
            message,
        }
    }

    pub fn conflict(
        index: usize,
        operation: Operation,
        reason: ConflictReason,
        record: SyncRecord,
    ) -> Self {
        Self {
            index,
            record_id: Some(record.record_id.clone()),
            operation: Some(operation),
            status: OutcomeStatus::Conflict { reason, record },
            message: reason.message().to_string(),
        }
    }

    pub fn failure(
        index: usize,
        record_id: Option<String>,
        operation: Option<Operation>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            index,
            record_id,
            operation,
            status: OutcomeStatus::Error { kind },
            message: message.into(),
        }
    }

    pub const fn is_applied(&self) -> bool {
        matches!(self.status, OutcomeStatus::Applied { .. })
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self.status, OutcomeStatus::Conflict { .. })
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.status, OutcomeStatus::Error { .. })
    }

    /// Resulting record for applied changes, server record for conflicts
    pub const fn record(&self) -> Option<&SyncRecord> {
        match &self.status {
            OutcomeStatus::Applied { record, .. } | OutcomeStatus::Conflict { record, .. } => {
                Some(record)
            }
            OutcomeStatus::Error { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_wire_shape() {
        let record = SyncRecord {
            owner: "user-1".into(),
            table_name: "contacts".into(),
            record_id: "r1".into(),
            payload: Some(json!({"name": "Ana"})),
            vector_clock: [("X", 1)].into_iter().collect(),
            updated_at: 10,
            tombstoned: false,
        };
        let outcome =
            ChangeOutcome::conflict(0, Operation::Create, ConflictReason::DuplicateCreate, record);

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "conflict");
        assert_eq!(value["reason"], "duplicate_create");
        assert_eq!(value["recordId"], "r1");
        assert_eq!(value["operation"], "create");
        assert_eq!(value["record"]["vectorClock"], json!({"X": 1}));

        let decoded: ChangeOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, outcome);
    }

    #[test]
    fn test_failure_has_no_record() {
        let outcome = ChangeOutcome::failure(
            3,
            None,
            None,
            FailureKind::Validation,
            "recordId is required",
        );
        assert!(outcome.is_error());
        assert!(outcome.record().is_none());
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "validation");
    }
}
