//! Conflict resolution request

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;
use crate::error::{Error, Result};
use crate::models::ChangeRequest;

/// Which side of a conflict wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "client", alias = "keepClient")]
    KeepClient,
    #[serde(rename = "server", alias = "keepServer")]
    KeepServer,
}

impl Resolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepClient => "client",
            Self::KeepServer => "server",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "client" | "keepClient" | "keep-client" => Ok(Self::KeepClient),
            "server" | "keepServer" | "keep-server" => Ok(Self::KeepServer),
            _ => Err(Error::Validation(
                "Resolution must be either \"client\" or \"server\"".to_string(),
            )),
        }
    }
}

/// Follow-up call finalizing a conflict reported by ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub table_name: String,
    pub record_id: String,
    pub resolution: Resolution,
    /// The client's conflicting change, required for `KeepClient`
    #[serde(default)]
    pub change: Option<ChangeRequest>,
    /// Server clock the conflict was reported against; resolution conflicts
    /// again when the stored clock no longer matches it
    #[serde(default)]
    pub expected_clock: Option<VectorClock>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolution_names() {
        assert_eq!("client".parse::<Resolution>().unwrap(), Resolution::KeepClient);
        assert_eq!("keepServer".parse::<Resolution>().unwrap(), Resolution::KeepServer);
        assert!("both".parse::<Resolution>().is_err());

        let decoded: Resolution = serde_json::from_value(json!("keepClient")).unwrap();
        assert_eq!(decoded, Resolution::KeepClient);
        assert_eq!(serde_json::to_value(Resolution::KeepServer).unwrap(), "server");
    }
}
