//! Client-submitted change model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::VectorClock;
use crate::error::{Error, Result};
use crate::models::RecordKey;

/// Kind of mutation a change performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether the operation must carry a payload
    pub const fn requires_payload(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "insert" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::Validation(format!("Unknown operation: {other}"))),
        }
    }
}

/// A change exactly as submitted by a client, before validation.
///
/// Every field is optional so one malformed entry can be reported on its own
/// without rejecting the rest of the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub operation: Option<String>,
    #[serde(default, alias = "data")]
    pub payload: Option<Value>,
    #[serde(default)]
    pub vector_clock: VectorClock,
    pub origin_device: Option<String>,
    /// Decode failure captured by [`ChangeRequest::from_value`]
    #[serde(skip)]
    pub malformed: Option<String>,
}

impl ChangeRequest {
    /// Decode one batch entry, keeping decode failures as a per-change problem.
    pub fn from_value(value: Value) -> Self {
        let record_id = value
            .get("recordId")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        match serde_json::from_value::<Self>(value) {
            Ok(request) => request,
            Err(error) => Self {
                record_id,
                malformed: Some(error.to_string()),
                ..Self::default()
            },
        }
    }
}

/// A validated change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub table_name: String,
    pub record_id: String,
    pub operation: Operation,
    /// Present for create/update, ignored for delete
    pub payload: Option<Value>,
    /// Clock of the version the client last saw, advanced by its own edit
    pub vector_clock: VectorClock,
    /// Authoring device, for diagnostics only
    pub origin_device: Option<String>,
}

impl Change {
    /// Key of the record this change targets
    pub fn key(&self, owner: &str) -> RecordKey {
        RecordKey::new(owner, &self.table_name, &self.record_id)
    }
}

impl TryFrom<ChangeRequest> for Change {
    type Error = Error;

    fn try_from(request: ChangeRequest) -> Result<Self> {
        if let Some(problem) = request.malformed {
            return Err(Error::Validation(format!("Malformed change: {problem}")));
        }

        let table_name = required(request.table_name, "tableName")?;
        let record_id = required(request.record_id, "recordId")?;
        let operation: Operation = required(request.operation, "operation")?.parse()?;

        let payload = if operation.requires_payload() {
            match request.payload {
                Some(Value::Null) | None => {
                    return Err(Error::Validation(format!(
                        "payload is required for {operation}"
                    )));
                }
                Some(payload) => Some(payload),
            }
        } else {
            None
        };

        Ok(Self {
            table_name,
            record_id,
            operation,
            payload,
            vector_clock: request.vector_clock,
            origin_device: request
                .origin_device
                .map(|device| device.trim().to_string())
                .filter(|device| !device.is_empty()),
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::Validation(format!("{field} is required")))
}
