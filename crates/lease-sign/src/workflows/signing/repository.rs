use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{Lease, LeaseId, SignatureMethod};

/// Versioned lease record. `version` is the optimistic concurrency token:
/// `update` succeeds only when the stored version still matches, so two
/// concurrent read-modify-write cycles on the same lease cannot interleave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub lease: Lease,
    pub version: u64,
}

impl LeaseRecord {
    /// Whether this lease has an envelope the reconciliation poller should
    /// still be watching.
    pub fn envelope_in_flight(&self) -> bool {
        self.lease.signature_method == Some(SignatureMethod::Envelope)
            && self.lease.envelope_id.is_some()
            && self.lease.status.is_signing_in_progress()
    }
}

/// Storage abstraction so the orchestrator can be exercised in isolation.
pub trait LeaseRepository: Send + Sync {
    fn insert(&self, lease: Lease) -> Result<LeaseRecord, RepositoryError>;

    fn fetch(&self, id: &LeaseId) -> Result<Option<LeaseRecord>, RepositoryError>;

    /// Compare-and-swap write: `record.version` carries the version the
    /// caller read. Returns the stored record with the bumped version, or
    /// [`RepositoryError::VersionConflict`] when another writer got there
    /// first.
    fn update(&self, record: LeaseRecord) -> Result<LeaseRecord, RepositoryError>;

    /// Every lease with an outstanding envelope, for reconciliation sweeps.
    fn envelopes_in_flight(&self) -> Result<Vec<LeaseRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("lease already exists")]
    Conflict,
    #[error("lease not found")]
    NotFound,
    #[error("lease was updated by another writer")]
    VersionConflict,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Trait describing outbound notification hooks (e-mail or property
/// management adapters). Dispatch is fire-and-forget: a failed notification
/// never rolls back the transition that produced it.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: LeaseNotification) -> Result<(), NotificationError>;
}

/// Notification payload emitted on lease transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseNotification {
    pub template: String,
    pub lease_id: LeaseId,
    pub details: BTreeMap<String, String>,
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
