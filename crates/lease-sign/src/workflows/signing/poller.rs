//! Reconciliation sweep over leases with outstanding envelopes.
//!
//! The poller is one of three triggers feeding the orchestrator (alongside
//! signer actions and webhook deliveries); the idempotent transition
//! functions make concurrent feeds safe. Provider downtime skips the lease
//! until the next cycle; a failed poll never transitions anything.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::domain::LeaseId;
use super::envelope::EnvelopeGateway;
use super::orchestrator::{LeaseSignatureOrchestrator, SigningError};
use super::repository::{
    LeaseNotification, LeaseRepository, NotificationPublisher, RepositoryError,
};

/// Outcome of one reconciliation sweep.
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    /// Leases whose provider status was fetched and folded in.
    pub reconciled: Vec<LeaseId>,
    /// Leases skipped this cycle because the provider was unreachable.
    pub skipped: Vec<LeaseId>,
    /// Leases past the signing window, flagged for manual intervention.
    pub flagged: Vec<LeaseId>,
    /// Leases past the signing window that were voided (auto-void policy).
    pub voided: Vec<LeaseId>,
    /// Provider reports that disagreed with local state.
    pub inconsistencies: Vec<String>,
}

/// Periodically reconciles externally reported envelope status into local
/// lease state.
pub struct ReconciliationPoller<R, G, N> {
    orchestrator: Arc<LeaseSignatureOrchestrator<R, G, N>>,
    repository: Arc<R>,
    notifier: Arc<N>,
}

impl<R, G, N> ReconciliationPoller<R, G, N>
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        orchestrator: Arc<LeaseSignatureOrchestrator<R, G, N>>,
        repository: Arc<R>,
        notifier: Arc<N>,
    ) -> Self {
        Self {
            orchestrator,
            repository,
            notifier,
        }
    }

    /// Run one sweep over every lease with an in-flight envelope.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, RepositoryError> {
        let mut report = SweepReport::default();
        let window = Duration::days(self.orchestrator.config().signing_window_days);

        for record in self.repository.envelopes_in_flight()? {
            let id = record.lease.id.clone();
            match self.orchestrator.poll_and_reconcile(&id) {
                Ok(outcome) => {
                    for notice in outcome.notices {
                        report.inconsistencies.push(format!("{}: {notice}", id.0));
                    }
                    report.reconciled.push(id.clone());

                    if outcome.lease.status.is_signing_in_progress() {
                        self.enforce_signing_window(&outcome.lease.signing_initiated_at, &id, window, now, &mut report);
                    }
                }
                Err(SigningError::ProviderUnavailable { attempts, reason }) => {
                    warn!(
                        lease_id = %id.0,
                        attempts,
                        %reason,
                        "provider unreachable, lease left untouched until next sweep"
                    );
                    report.skipped.push(id);
                }
                Err(err) => {
                    // One bad lease must not sink the sweep for the rest.
                    warn!(lease_id = %id.0, %err, "reconciliation failed for lease");
                    report.inconsistencies.push(format!("{}: {err}", id.0));
                    report.skipped.push(id);
                }
            }
        }

        info!(
            reconciled = report.reconciled.len(),
            skipped = report.skipped.len(),
            flagged = report.flagged.len(),
            voided = report.voided.len(),
            "reconciliation sweep finished"
        );
        Ok(report)
    }

    fn enforce_signing_window(
        &self,
        initiated_at: &Option<DateTime<Utc>>,
        id: &LeaseId,
        window: Duration,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let expired = initiated_at
            .map(|started| started + window < now)
            .unwrap_or(false);
        if !expired {
            return;
        }

        if self.orchestrator.config().auto_void_on_timeout {
            match self
                .orchestrator
                .void_lease(id, Some("signing window expired".to_string()))
            {
                Ok(_) => report.voided.push(id.clone()),
                Err(err) => {
                    warn!(lease_id = %id.0, %err, "auto-void after window expiry failed");
                    report.skipped.push(id.clone());
                }
            }
            return;
        }

        let mut details = BTreeMap::new();
        details.insert(
            "signing_window_days".to_string(),
            self.orchestrator.config().signing_window_days.to_string(),
        );
        if let Err(err) = self.notifier.publish(LeaseNotification {
            template: "signing_window_expired".to_string(),
            lease_id: id.clone(),
            details,
        }) {
            warn!(lease_id = %id.0, %err, "failed to flag expired signing window");
        }
        report.flagged.push(id.clone());
    }
}
