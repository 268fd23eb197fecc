//! Lease signature orchestration: state machine, signing backends, and
//! envelope reconciliation.
//!
//! Two mutually exclusive backends drive a lease from `ready` to `active`:
//! a locally recorded simple signature and a delegated multi-party envelope
//! run by a third-party provider. The transition functions in
//! [`transition`] are the sole writers of lease status; the orchestrator
//! wraps them in a versioned commit loop so concurrent signer actions,
//! webhook deliveries, and poller sweeps cannot corrupt a lease.

pub mod domain;
pub mod envelope;
pub mod orchestrator;
pub mod poller;
pub mod repository;
pub mod router;
pub mod transition;

#[cfg(test)]
mod tests;

pub use domain::{
    DocumentRef, Lease, LeaseId, LeaseStatus, LeaseStatusView, Party, PartySignature,
    SignatureEvidence, SignatureMethod, SignerContact,
};
pub use envelope::{
    EnvelopeError, EnvelopeGateway, EnvelopeRequest, EnvelopeSigner, EnvelopeSnapshot,
    EnvelopeStatus, ProviderCallError, RetryPolicy, SignerCompletion,
};
pub use orchestrator::{
    LeaseSignatureOrchestrator, ReconcileOutcome, SigningConfig, SigningError,
};
pub use poller::{ReconciliationPoller, SweepReport};
pub use repository::{
    LeaseNotification, LeaseRecord, LeaseRepository, NotificationError, NotificationPublisher,
    RepositoryError,
};
pub use router::{signing_router, SigningRouterState};
pub use transition::TransitionError;
