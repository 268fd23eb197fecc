use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    DocumentRef, Lease, LeaseId, LeaseStatus, Party, SignatureEvidence, SignatureMethod,
    SignerContact,
};
use super::envelope::{
    EnvelopeGateway, EnvelopeRequest, EnvelopeSigner, EnvelopeSnapshot, ProviderCallError,
    RetryPolicy,
};
use super::repository::{
    LeaseNotification, LeaseRecord, LeaseRepository, NotificationPublisher, RepositoryError,
};
use super::transition::{self, Applied, TransitionError};

/// Explicit configuration for the signing workflow. Replaces any ambient
/// module state: routing order, timeout policy, and retry ceilings all
/// arrive here at construction.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    /// Envelope recipient routing order. A provider requirement, not a
    /// business rule, so it is configurable rather than hard-coded.
    pub routing_order: Vec<Party>,
    /// Overall signing window enforced by the reconciliation poller.
    pub signing_window_days: i64,
    pub provider_retry: RetryPolicy,
    /// When true, the poller voids leases whose signing window expired
    /// instead of flagging them for manual intervention.
    pub auto_void_on_timeout: bool,
    /// Default return URL for embedded signing sessions.
    pub return_url: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            routing_order: vec![Party::Tenant, Party::Owner],
            signing_window_days: 14,
            provider_retry: RetryPolicy::default(),
            auto_void_on_timeout: false,
            return_url: "http://localhost:3000/signing/complete".to_string(),
        }
    }
}

/// Error raised by the signature orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("envelope provider unavailable after {attempts} attempts: {reason}")]
    ProviderUnavailable { attempts: u32, reason: String },
    #[error("envelope provider rejected the request: {0}")]
    ProviderRejected(String),
    #[error("provider state disagrees with the local lease: {0}")]
    ProviderInconsistency(String),
    #[error("lease was modified concurrently and retries were exhausted")]
    ConcurrentModification,
}

impl From<ProviderCallError> for SigningError {
    fn from(value: ProviderCallError) -> Self {
        match value {
            ProviderCallError::Exhausted { attempts, reason } => {
                Self::ProviderUnavailable { attempts, reason }
            }
            ProviderCallError::Rejected(reason) => Self::ProviderRejected(reason),
        }
    }
}

/// Result of folding a provider snapshot into a lease.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub lease: Lease,
    /// Provider reports that disagreed with local state; surfaced for
    /// manual review, never auto-applied.
    pub notices: Vec<String>,
}

static LEASE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_lease_id() -> LeaseId {
    let id = LEASE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    LeaseId(format!("lease-{id:06}"))
}

/// Version-conflict retries before giving up. Conflicts resolve in one or
/// two rounds in practice since every mutation is a short read-modify-write.
const COMMIT_RETRY_LIMIT: u32 = 4;

/// Owns the lease signature state machine. Sole writer of lease signature
/// state: signer actions, webhook events, and poller sweeps all funnel into
/// the transition functions through the versioned commit loop here.
pub struct LeaseSignatureOrchestrator<R, G, N> {
    repository: Arc<R>,
    gateway: Arc<G>,
    notifier: Arc<N>,
    config: SigningConfig,
}

impl<R, G, N> LeaseSignatureOrchestrator<R, G, N>
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(repository: Arc<R>, gateway: Arc<G>, notifier: Arc<N>, config: SigningConfig) -> Self {
        Self {
            repository,
            gateway,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    /// Create a lease in `draft`, ahead of document generation.
    pub fn open_lease(
        &self,
        tenant: SignerContact,
        owner: SignerContact,
    ) -> Result<Lease, SigningError> {
        let lease = Lease::draft(next_lease_id(), tenant, owner);
        let stored = self.repository.insert(lease)?;
        Ok(stored.lease)
    }

    pub fn get(&self, id: &LeaseId) -> Result<Lease, SigningError> {
        let record = self.fetch(id)?;
        Ok(record.lease)
    }

    /// Record the rendered document reference, moving the lease to `ready`.
    pub fn attach_document(
        &self,
        id: &LeaseId,
        document: DocumentRef,
    ) -> Result<Lease, SigningError> {
        let (lease, applied) =
            self.commit(id, |lease| transition::attach_document(lease, document.clone()))?;
        if applied.changed {
            self.notify(&lease, "document_attached", &[]);
        }
        Ok(lease)
    }

    /// Start the signing flow with the chosen backend.
    ///
    /// For the envelope backend the provider call happens before any local
    /// write, so a creation failure leaves the lease in `ready` with no
    /// envelope id recorded. The idempotency key is the lease id: retrying
    /// after an ambiguous timeout resolves to the envelope the provider
    /// already holds rather than a second one.
    pub fn initiate_signing(
        &self,
        id: &LeaseId,
        method: SignatureMethod,
    ) -> Result<Lease, SigningError> {
        let record = self.fetch(id)?;
        let lease = &record.lease;

        // Duplicate initiation converges without touching the provider.
        if lease.signature_method == Some(method) && lease.status.is_signing_in_progress() {
            return Ok(record.lease);
        }
        if lease.status != LeaseStatus::Ready {
            return Err(TransitionError::InvalidTransition {
                from: lease.status,
                action: "initiate signing",
            }
            .into());
        }
        let document = match &lease.generated_document {
            Some(document) => document.clone(),
            None => return Err(TransitionError::DocumentNotReady.into()),
        };

        let envelope_id = match method {
            SignatureMethod::Simple => None,
            SignatureMethod::Envelope => {
                let request = self.envelope_request(lease, document);
                let gateway = Arc::clone(&self.gateway);
                let id = self
                    .config
                    .provider_retry
                    .run(|| gateway.create_envelope(&request))?;
                Some(id)
            }
        };

        let now = Utc::now();
        let (lease, applied) = self.commit(id, |lease| {
            transition::initiate(lease, method, envelope_id.clone(), now)
        })?;

        if applied.changed {
            info!(lease_id = %lease.id.0, method = method.label(), "signing initiated");
            self.notify(&lease, "signing_initiated", &[]);
        }
        Ok(lease)
    }

    /// Record a locally captured signature (simple backend only).
    pub fn record_signature(
        &self,
        id: &LeaseId,
        party: Party,
        evidence: SignatureEvidence,
    ) -> Result<Lease, SigningError> {
        let now = Utc::now();
        let before = self.fetch(id)?.lease.status;
        let (lease, applied) = self.commit(id, |lease| {
            require_method(lease, SignatureMethod::Simple)?;
            transition::apply_signature(lease, party, Some(evidence.clone()), now)
        })?;

        if applied.changed {
            self.notify_progress(before, &lease, Some(party));
        }
        Ok(lease)
    }

    /// Obtain an embedded signing session URL for one party of an
    /// outstanding envelope.
    pub fn get_signing_url(
        &self,
        id: &LeaseId,
        party: Party,
        return_url: Option<&str>,
    ) -> Result<String, SigningError> {
        let record = self.fetch(id)?;
        let lease = &record.lease;
        require_method(lease, SignatureMethod::Envelope)?;
        let envelope_id = match (&lease.envelope_id, lease.status.is_signing_in_progress()) {
            (Some(envelope_id), true) => envelope_id.clone(),
            _ => {
                return Err(TransitionError::InvalidTransition {
                    from: lease.status,
                    action: "issue a signing url",
                }
                .into())
            }
        };

        let contact = lease.contact(party).clone();
        let return_url = return_url.unwrap_or(&self.config.return_url).to_string();
        let gateway = Arc::clone(&self.gateway);
        let url = self
            .config
            .provider_retry
            .run(|| gateway.signing_url(&envelope_id, party, &contact, &return_url))?;
        Ok(url)
    }

    /// Fold an externally reported envelope snapshot into the lease. Fed by
    /// both webhook deliveries and poller sweeps; the idempotent signer
    /// updates make the two safe to run concurrently.
    pub fn observe_envelope_status(
        &self,
        id: &LeaseId,
        envelope_id: &str,
        snapshot: &EnvelopeSnapshot,
    ) -> Result<ReconcileOutcome, SigningError> {
        let record = self.fetch(id)?;
        require_method(&record.lease, SignatureMethod::Envelope)?;
        match record.lease.envelope_id.as_deref() {
            Some(known) if known == envelope_id => {}
            Some(known) => {
                return Err(SigningError::ProviderInconsistency(format!(
                    "status reported for envelope '{envelope_id}' but lease {} holds '{known}'",
                    record.lease.id.0
                )))
            }
            None => {
                return Err(TransitionError::SigningNotInitiated.into());
            }
        }

        let before = record.lease.status;
        let now = Utc::now();
        let (lease, applied) = self.commit(id, |lease| {
            require_method(lease, SignatureMethod::Envelope)?;
            transition::apply_envelope_snapshot(lease, snapshot, now)
        })?;

        for notice in &applied.notices {
            warn!(lease_id = %lease.id.0, %notice, "provider report disagrees with local state");
        }
        if applied.changed && lease.status != before {
            self.notify_progress(before, &lease, None);
        }

        Ok(ReconcileOutcome {
            lease,
            notices: applied.notices,
        })
    }

    /// Query the provider for the lease's envelope and reconcile the answer.
    /// A failed poll changes nothing; the next sweep retries.
    pub fn poll_and_reconcile(&self, id: &LeaseId) -> Result<ReconcileOutcome, SigningError> {
        let record = self.fetch(id)?;
        require_method(&record.lease, SignatureMethod::Envelope)?;
        if record.lease.status.is_terminal() {
            return Ok(ReconcileOutcome {
                lease: record.lease,
                notices: Vec::new(),
            });
        }
        let envelope_id = record
            .lease
            .envelope_id
            .clone()
            .ok_or(TransitionError::SigningNotInitiated)?;

        let gateway = Arc::clone(&self.gateway);
        let snapshot = self
            .config
            .provider_retry
            .run(|| gateway.status(&envelope_id))?;

        self.observe_envelope_status(id, &envelope_id, &snapshot)
    }

    /// Explicitly cancel an in-flight signing flow. Envelope voidance at the
    /// provider is best-effort: local state is voided regardless, since
    /// local consistency must not depend on a third party's uptime.
    pub fn void_lease(&self, id: &LeaseId, reason: Option<String>) -> Result<Lease, SigningError> {
        let (lease, applied) = self.commit(id, transition::void)?;

        if applied.changed {
            if let Some(envelope_id) = &lease.envelope_id {
                let note = reason.clone().unwrap_or_else(|| "voided by caller".to_string());
                if let Err(err) = self.gateway.void_envelope(envelope_id, &note) {
                    warn!(
                        lease_id = %lease.id.0,
                        envelope_id = %envelope_id,
                        %err,
                        "provider envelope void failed; lease voided locally"
                    );
                }
            }
            let details: Vec<(&str, String)> = reason
                .into_iter()
                .map(|value| ("reason", value))
                .collect();
            self.notify(&lease, "lease_voided", &details);
        }
        Ok(lease)
    }

    fn fetch(&self, id: &LeaseId) -> Result<LeaseRecord, SigningError> {
        Ok(self.repository.fetch(id)?.ok_or(RepositoryError::NotFound)?)
    }

    /// Versioned read-modify-write loop. Conflicting writers retry against
    /// the fresh record; unchanged outcomes skip the write entirely, which
    /// is what makes duplicate events free of conflict.
    fn commit<F>(&self, id: &LeaseId, mutate: F) -> Result<(Lease, Applied), SigningError>
    where
        F: Fn(&mut Lease) -> Result<Applied, TransitionError>,
    {
        for _ in 0..COMMIT_RETRY_LIMIT {
            let record = self.fetch(id)?;
            let mut lease = record.lease.clone();
            let applied = mutate(&mut lease)?;
            if !applied.changed {
                return Ok((record.lease, applied));
            }
            match self.repository.update(LeaseRecord {
                lease,
                version: record.version,
            }) {
                Ok(stored) => return Ok((stored.lease, applied)),
                Err(RepositoryError::VersionConflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(SigningError::ConcurrentModification)
    }

    fn envelope_request(&self, lease: &Lease, document: DocumentRef) -> EnvelopeRequest {
        let signers = self
            .config
            .routing_order
            .iter()
            .enumerate()
            .map(|(index, &party)| EnvelopeSigner {
                party,
                contact: lease.contact(party).clone(),
                routing_order: index as u32 + 1,
            })
            .collect();

        EnvelopeRequest {
            idempotency_key: lease.id.0.clone(),
            document,
            signers,
        }
    }

    fn notify_progress(&self, before: LeaseStatus, lease: &Lease, party: Option<Party>) {
        let template = match lease.status {
            LeaseStatus::Active => "lease_activated",
            LeaseStatus::Rejected => "lease_rejected",
            LeaseStatus::Voided => "lease_voided",
            _ => "signature_recorded",
        };
        let mut details: Vec<(&str, String)> =
            vec![("previous_status", before.label().to_string())];
        if let Some(party) = party {
            details.push(("party", party.label().to_string()));
        }
        self.notify(lease, template, &details);
    }

    fn notify(&self, lease: &Lease, template: &str, extra: &[(&str, String)]) {
        let mut details = BTreeMap::new();
        details.insert("status".to_string(), lease.status.label().to_string());
        if let Some(method) = lease.signature_method {
            details.insert("method".to_string(), method.label().to_string());
        }
        for (key, value) in extra {
            details.insert((*key).to_string(), value.clone());
        }

        let notification = LeaseNotification {
            template: template.to_string(),
            lease_id: lease.id.clone(),
            details,
        };
        if let Err(err) = self.notifier.publish(notification) {
            warn!(lease_id = %lease.id.0, %err, "failed to dispatch lease notification");
        }
    }
}

fn require_method(lease: &Lease, expected: SignatureMethod) -> Result<(), TransitionError> {
    match lease.signature_method {
        Some(method) if method == expected => Ok(()),
        Some(method) => Err(TransitionError::MethodMismatch { method }),
        None => Err(TransitionError::SigningNotInitiated),
    }
}
