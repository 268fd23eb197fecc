use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::workflows::signing::domain::{
    DocumentRef, Lease, LeaseId, Party, SignatureEvidence, SignatureMethod, SignerContact,
};
use crate::workflows::signing::envelope::{
    EnvelopeError, EnvelopeGateway, EnvelopeRequest, EnvelopeSnapshot, EnvelopeStatus,
    RetryPolicy, SignerCompletion,
};
use crate::workflows::signing::orchestrator::{LeaseSignatureOrchestrator, SigningConfig};
use crate::workflows::signing::poller::ReconciliationPoller;
use crate::workflows::signing::repository::{
    LeaseNotification, LeaseRecord, LeaseRepository, NotificationError, NotificationPublisher,
    RepositoryError,
};

pub(super) fn tenant_contact() -> SignerContact {
    SignerContact {
        name: "Avery Tenant".to_string(),
        email: "avery@example.com".to_string(),
    }
}

pub(super) fn owner_contact() -> SignerContact {
    SignerContact {
        name: "Morgan Owner".to_string(),
        email: "morgan@example.com".to_string(),
    }
}

pub(super) fn document() -> DocumentRef {
    DocumentRef("docs/lease-agreement.pdf".to_string())
}

pub(super) fn evidence(reference: &str) -> SignatureEvidence {
    SignatureEvidence {
        reference: reference.to_string(),
    }
}

/// Retry policy with no real sleeping so provider failure paths stay fast.
pub(super) fn test_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 0,
        max_delay_ms: 0,
    }
}

pub(super) fn signing_config() -> SigningConfig {
    SigningConfig {
        provider_retry: test_retry(),
        ..SigningConfig::default()
    }
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<HashMap<LeaseId, LeaseRecord>>,
    forced_conflicts: Mutex<u32>,
}

impl MemoryRepository {
    /// Force the next `count` updates to fail with a version conflict, as if
    /// another writer always got there first.
    pub(super) fn force_conflicts(&self, count: u32) {
        *self.forced_conflicts.lock().expect("repository mutex poisoned") = count;
    }

    pub(super) fn version_of(&self, id: &LeaseId) -> u64 {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .map(|record| record.version)
            .expect("lease present")
    }

    /// Test-only direct mutation, bypassing the orchestrator.
    pub(super) fn overwrite(&self, mutate: impl FnOnce(&mut Lease), id: &LeaseId) {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let record = guard.get_mut(id).expect("lease present");
        mutate(&mut record.lease);
        record.version += 1;
    }
}

impl LeaseRepository for MemoryRepository {
    fn insert(&self, lease: Lease) -> Result<LeaseRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&lease.id) {
            return Err(RepositoryError::Conflict);
        }
        let record = LeaseRecord { lease, version: 1 };
        guard.insert(record.lease.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &LeaseId) -> Result<Option<LeaseRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(&self, record: LeaseRecord) -> Result<LeaseRecord, RepositoryError> {
        {
            let mut forced = self.forced_conflicts.lock().expect("repository mutex poisoned");
            if *forced > 0 {
                *forced -= 1;
                return Err(RepositoryError::VersionConflict);
            }
        }

        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let stored = guard
            .get_mut(&record.lease.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != record.version {
            return Err(RepositoryError::VersionConflict);
        }
        stored.lease = record.lease;
        stored.version += 1;
        Ok(stored.clone())
    }

    fn envelopes_in_flight(&self) -> Result<Vec<LeaseRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| record.envelope_in_flight())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    events: Mutex<Vec<LeaseNotification>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<LeaseNotification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn templates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.template)
            .collect()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, notification: LeaseNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

/// Scripted stand-in for the e-signature provider. Honors idempotency keys
/// on creation and serves snapshots set by the test.
#[derive(Default)]
pub(super) struct ScriptedGateway {
    sequence: AtomicU64,
    envelopes: Mutex<HashMap<String, String>>,
    snapshots: Mutex<HashMap<String, EnvelopeSnapshot>>,
    create_errors: Mutex<VecDeque<EnvelopeError>>,
    // When > 0, the next creations record the envelope server-side but the
    // response is lost, mimicking a timeout after the provider committed.
    lose_create_responses: Mutex<u32>,
    status_errors: Mutex<VecDeque<EnvelopeError>>,
    void_error: Mutex<Option<EnvelopeError>>,
    last_request: Mutex<Option<EnvelopeRequest>>,
    create_calls: AtomicU64,
    voided: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub(super) fn queue_create_error(&self, error: EnvelopeError) {
        self.create_errors
            .lock()
            .expect("gateway mutex poisoned")
            .push_back(error);
    }

    pub(super) fn lose_next_create_response(&self) {
        *self
            .lose_create_responses
            .lock()
            .expect("gateway mutex poisoned") += 1;
    }

    pub(super) fn queue_status_error(&self, error: EnvelopeError) {
        self.status_errors
            .lock()
            .expect("gateway mutex poisoned")
            .push_back(error);
    }

    pub(super) fn fail_void(&self, error: EnvelopeError) {
        *self.void_error.lock().expect("gateway mutex poisoned") = Some(error);
    }

    pub(super) fn set_snapshot(&self, envelope_id: &str, snapshot: EnvelopeSnapshot) {
        self.snapshots
            .lock()
            .expect("gateway mutex poisoned")
            .insert(envelope_id.to_string(), snapshot);
    }

    pub(super) fn envelope_count(&self) -> usize {
        self.envelopes.lock().expect("gateway mutex poisoned").len()
    }

    pub(super) fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::Relaxed)
    }

    pub(super) fn voided(&self) -> Vec<String> {
        self.voided.lock().expect("gateway mutex poisoned").clone()
    }

    pub(super) fn last_request_routing(&self) -> Vec<Party> {
        self.last_request
            .lock()
            .expect("gateway mutex poisoned")
            .clone()
            .map(|request| request.signers.iter().map(|signer| signer.party).collect())
            .unwrap_or_default()
    }
}

impl EnvelopeGateway for ScriptedGateway {
    fn create_envelope(&self, request: &EnvelopeRequest) -> Result<String, EnvelopeError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self
            .create_errors
            .lock()
            .expect("gateway mutex poisoned")
            .pop_front()
        {
            return Err(error);
        }

        *self.last_request.lock().expect("gateway mutex poisoned") = Some(request.clone());

        let mut envelopes = self.envelopes.lock().expect("gateway mutex poisoned");
        let envelope_id = envelopes
            .entry(request.idempotency_key.clone())
            .or_insert_with(|| {
                let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                format!("env-{id:04}")
            })
            .clone();

        let mut lost = self
            .lose_create_responses
            .lock()
            .expect("gateway mutex poisoned");
        if *lost > 0 {
            *lost -= 1;
            return Err(EnvelopeError::Unavailable(
                "timed out awaiting create response".to_string(),
            ));
        }

        Ok(envelope_id)
    }

    fn signing_url(
        &self,
        envelope_id: &str,
        party: Party,
        _contact: &SignerContact,
        return_url: &str,
    ) -> Result<String, EnvelopeError> {
        Ok(format!(
            "https://sign.example.com/{envelope_id}/{}?return={return_url}",
            party.label()
        ))
    }

    fn status(&self, envelope_id: &str) -> Result<EnvelopeSnapshot, EnvelopeError> {
        if let Some(error) = self
            .status_errors
            .lock()
            .expect("gateway mutex poisoned")
            .pop_front()
        {
            return Err(error);
        }
        let snapshots = self.snapshots.lock().expect("gateway mutex poisoned");
        Ok(snapshots.get(envelope_id).cloned().unwrap_or(EnvelopeSnapshot {
            status: EnvelopeStatus::Sent,
            signers: Vec::new(),
        }))
    }

    fn void_envelope(&self, envelope_id: &str, _reason: &str) -> Result<(), EnvelopeError> {
        if let Some(error) = self.void_error.lock().expect("gateway mutex poisoned").take() {
            return Err(error);
        }
        self.voided
            .lock()
            .expect("gateway mutex poisoned")
            .push(envelope_id.to_string());
        Ok(())
    }
}

pub(super) type TestOrchestrator =
    LeaseSignatureOrchestrator<MemoryRepository, ScriptedGateway, MemoryNotifier>;
pub(super) type TestPoller =
    ReconciliationPoller<MemoryRepository, ScriptedGateway, MemoryNotifier>;

pub(super) struct Fixture {
    pub(super) orchestrator: Arc<TestOrchestrator>,
    pub(super) poller: TestPoller,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) gateway: Arc<ScriptedGateway>,
    pub(super) notifier: Arc<MemoryNotifier>,
}

pub(super) fn fixture() -> Fixture {
    fixture_with_config(signing_config())
}

pub(super) fn fixture_with_config(config: SigningConfig) -> Fixture {
    let repository = Arc::new(MemoryRepository::default());
    let gateway = Arc::new(ScriptedGateway::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let orchestrator = Arc::new(LeaseSignatureOrchestrator::new(
        repository.clone(),
        gateway.clone(),
        notifier.clone(),
        config,
    ));
    let poller = ReconciliationPoller::new(
        orchestrator.clone(),
        repository.clone(),
        notifier.clone(),
    );

    Fixture {
        orchestrator,
        poller,
        repository,
        gateway,
        notifier,
    }
}

impl Fixture {
    /// Open a lease and attach its document so signing can start.
    pub(super) fn ready_lease(&self) -> LeaseId {
        let lease = self
            .orchestrator
            .open_lease(tenant_contact(), owner_contact())
            .expect("lease opens");
        self.orchestrator
            .attach_document(&lease.id, document())
            .expect("document attaches");
        lease.id
    }

    pub(super) fn envelope_lease(&self) -> (LeaseId, String) {
        let id = self.ready_lease();
        let lease = self
            .orchestrator
            .initiate_signing(&id, SignatureMethod::Envelope)
            .expect("envelope signing initiates");
        let envelope_id = lease.envelope_id.expect("envelope id assigned");
        (id, envelope_id)
    }
}

pub(super) fn completion(party: Party, completed: bool) -> SignerCompletion {
    SignerCompletion {
        party,
        completed,
        completed_at: None,
    }
}

pub(super) fn snapshot(status: EnvelopeStatus, signers: Vec<SignerCompletion>) -> EnvelopeSnapshot {
    EnvelopeSnapshot { status, signers }
}
