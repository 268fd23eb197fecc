use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use lease_sign::workflows::signing::{
    EnvelopeError, EnvelopeGateway, EnvelopeRequest, EnvelopeSnapshot, EnvelopeStatus, Lease,
    LeaseId, LeaseNotification, LeaseRecord, LeaseRepository, NotificationError,
    NotificationPublisher, Party, RepositoryError, SignerCompletion, SignerContact,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
pub(crate) struct InMemoryLeaseRepository {
    records: Mutex<HashMap<LeaseId, LeaseRecord>>,
}

impl LeaseRepository for InMemoryLeaseRepository {
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
pub(crate) struct InMemoryNotificationPublisher {
    events: Mutex<Vec<LeaseNotification>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notification: LeaseNotification) -> Result<(), NotificationError> {
        let mut guard = self.events.lock().expect("notification mutex poisoned");
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<LeaseNotification> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

/// Simulated e-signature provider for local runs. Envelopes live in memory,
/// deduplicated by idempotency key, and complete when the demo (or a test)
/// marks each signer done.
#[derive(Default)]
pub(crate) struct SandboxEnvelopeGateway {
    sequence: AtomicU64,
    by_key: Mutex<HashMap<String, String>>,
    envelopes: Mutex<HashMap<String, EnvelopeSnapshot>>,
}

impl SandboxEnvelopeGateway {
    /// Marks one signer complete; the envelope flips to `Completed` once
    /// every signer has finished.
    pub(crate) fn complete_signer(&self, envelope_id: &str, party: Party) {
        let mut envelopes = self.envelopes.lock().expect("sandbox mutex poisoned");
        if let Some(snapshot) = envelopes.get_mut(envelope_id) {
            for signer in &mut snapshot.signers {
                if signer.party == party && !signer.completed {
                    signer.completed = true;
                    signer.completed_at = Some(Utc::now());
                }
            }
            if snapshot.signers.iter().all(|signer| signer.completed) {
                snapshot.status = EnvelopeStatus::Completed;
            }
        }
    }
}

impl EnvelopeGateway for SandboxEnvelopeGateway {
    fn create_envelope(&self, request: &EnvelopeRequest) -> Result<String, EnvelopeError> {
        let mut by_key = self.by_key.lock().expect("sandbox mutex poisoned");
        if let Some(existing) = by_key.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let envelope_id = format!("sandbox-env-{id:06}");
        let snapshot = EnvelopeSnapshot {
            status: EnvelopeStatus::Sent,
            signers: request
                .signers
                .iter()
                .map(|signer| SignerCompletion {
                    party: signer.party,
                    completed: false,
                    completed_at: None,
                })
                .collect(),
        };
        self.envelopes
            .lock()
            .expect("sandbox mutex poisoned")
            .insert(envelope_id.clone(), snapshot);
        by_key.insert(request.idempotency_key.clone(), envelope_id.clone());
        Ok(envelope_id)
    }

    fn signing_url(
        &self,
        envelope_id: &str,
        party: Party,
        _contact: &SignerContact,
        return_url: &str,
    ) -> Result<String, EnvelopeError> {
        let known = self
            .envelopes
            .lock()
            .expect("sandbox mutex poisoned")
            .contains_key(envelope_id);
        if !known {
            return Err(EnvelopeError::Rejected(format!(
                "unknown envelope {envelope_id}"
            )));
        }
        Ok(format!(
            "https://sandbox.esign.local/sign/{envelope_id}/{}?return={return_url}",
            party.label()
        ))
    }

    fn status(&self, envelope_id: &str) -> Result<EnvelopeSnapshot, EnvelopeError> {
        self.envelopes
            .lock()
            .expect("sandbox mutex poisoned")
            .get(envelope_id)
            .cloned()
            .ok_or_else(|| EnvelopeError::Rejected(format!("unknown envelope {envelope_id}")))
    }

    fn void_envelope(&self, envelope_id: &str, _reason: &str) -> Result<(), EnvelopeError> {
        let mut envelopes = self.envelopes.lock().expect("sandbox mutex poisoned");
        match envelopes.get_mut(envelope_id) {
            Some(snapshot) => {
                snapshot.status = EnvelopeStatus::Voided;
                Ok(())
            }
            None => Err(EnvelopeError::Rejected(format!(
                "unknown envelope {envelope_id}"
            ))),
        }
    }
}
