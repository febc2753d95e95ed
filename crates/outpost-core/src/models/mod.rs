//! Data models for Outpost sync

mod change;
mod metadata;
mod outcome;
mod pull;
mod record;
mod resolve;

pub use change::{Change, ChangeRequest, Operation};
pub use metadata::SyncMetadata;
pub use outcome::{ChangeOutcome, ConflictReason, FailureKind, OutcomeStatus};
pub use pull::{PullRequest, PullResponse};
pub use record::{RecordKey, SyncRecord};
pub use resolve::{Resolution, ResolveRequest};
