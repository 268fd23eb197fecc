//! Pure transition functions for the lease signature state machine.
//!
//! These functions are the only writers of [`Lease::status`]. Every guard is
//! enforced here so concurrent callers, webhook handlers, and the poller all
//! share one set of preconditions. Signer updates are set-true-if-false and
//! therefore idempotent and commutative: any interleaving of the same events
//! yields the same final lease.

use chrono::{DateTime, Utc};

use super::domain::{DocumentRef, Lease, LeaseStatus, Party, SignatureEvidence, SignatureMethod};
use super::envelope::{EnvelopeSnapshot, EnvelopeStatus};

/// Result of applying one event to a lease.
#[derive(Debug, Default)]
pub struct Applied {
    /// Whether the lease was mutated. A `false` means the event was a
    /// duplicate and the caller should skip the persistence write.
    pub changed: bool,
    /// Human-readable notes for provider reports that disagree with local
    /// state. Surfaced for manual review, never acted on automatically.
    pub notices: Vec<String>,
}

impl Applied {
    fn changed() -> Self {
        Self {
            changed: true,
            notices: Vec::new(),
        }
    }

    fn unchanged() -> Self {
        Self::default()
    }
}

/// Guard failure raised by a transition function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} while lease is {}", from.label())]
    InvalidTransition {
        from: LeaseStatus,
        action: &'static str,
    },
    #[error("document has not been generated for this lease")]
    DocumentNotReady,
    #[error("signing has not been initiated for this lease")]
    SigningNotInitiated,
    #[error("lease is signing via the {} backend", method.label())]
    MethodMismatch { method: SignatureMethod },
}

/// Attach the rendered document reference, moving a draft lease to `ready`.
///
/// Re-attaching before signing starts replaces the reference (the document
/// service may re-render); attaching the same reference again is a no-op.
pub fn attach_document(lease: &mut Lease, document: DocumentRef) -> Result<Applied, TransitionError> {
    match lease.status {
        LeaseStatus::Draft => {
            lease.generated_document = Some(document);
            lease.status = LeaseStatus::Ready;
            Ok(Applied::changed())
        }
        LeaseStatus::Ready => {
            if lease.generated_document.as_ref() == Some(&document) {
                Ok(Applied::unchanged())
            } else {
                lease.generated_document = Some(document);
                Ok(Applied::changed())
            }
        }
        from => Err(TransitionError::InvalidTransition {
            from,
            action: "attach a document",
        }),
    }
}

/// Commit an initiated signing flow: fixes the method, records the envelope
/// id when present, and moves the lease to `awaiting_signatures`.
///
/// Re-initiating with the same method (and, for envelopes, the same envelope
/// id) is a no-op so a caller retrying after a timed-out commit converges on
/// the state the first attempt produced.
pub fn initiate(
    lease: &mut Lease,
    method: SignatureMethod,
    envelope_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<Applied, TransitionError> {
    if lease.signature_method == Some(method)
        && lease.status.is_signing_in_progress()
        && lease.envelope_id == envelope_id
    {
        return Ok(Applied::unchanged());
    }

    if lease.status != LeaseStatus::Ready {
        return Err(TransitionError::InvalidTransition {
            from: lease.status,
            action: "initiate signing",
        });
    }
    if lease.generated_document.is_none() {
        return Err(TransitionError::DocumentNotReady);
    }

    lease.signature_method = Some(method);
    lease.envelope_id = envelope_id;
    lease.signing_initiated_at = Some(now);
    lease.status = LeaseStatus::AwaitingSignatures;
    Ok(Applied::changed())
}

/// Record one party's signature. Idempotent: an already-signed party keeps
/// its original timestamp and evidence, and the call reports no change.
pub fn apply_signature(
    lease: &mut Lease,
    party: Party,
    evidence: Option<SignatureEvidence>,
    at: DateTime<Utc>,
) -> Result<Applied, TransitionError> {
    if lease.signature(party).signed {
        return Ok(Applied::unchanged());
    }

    if !lease.status.is_signing_in_progress() {
        return Err(TransitionError::InvalidTransition {
            from: lease.status,
            action: "record a signature",
        });
    }

    let signature = lease.signature_mut(party);
    signature.signed = true;
    signature.signed_at = Some(at);
    if signature.evidence.is_none() {
        signature.evidence = evidence;
    }

    lease.status = status_from_flags(lease);
    Ok(Applied::changed())
}

/// Fold one provider-reported envelope snapshot into the lease.
///
/// The advisory `envelope_last_known_status` is always refreshed. Signer
/// completions apply through [`apply_signature`]; a decline or provider-side
/// void overrides partial completion and terminates the flow for both
/// parties. Unknown provider statuses cause no transition.
pub fn apply_envelope_snapshot(
    lease: &mut Lease,
    snapshot: &EnvelopeSnapshot,
    now: DateTime<Utc>,
) -> Result<Applied, TransitionError> {
    let mut applied = Applied::unchanged();

    let observed = snapshot.status.as_str().to_string();
    if lease.envelope_last_known_status.as_deref() != Some(observed.as_str()) {
        lease.envelope_last_known_status = Some(observed);
        applied.changed = true;
    }

    match snapshot.status {
        EnvelopeStatus::Declined => {
            return terminate_from_provider(lease, LeaseStatus::Rejected, applied)
        }
        EnvelopeStatus::Voided => {
            return terminate_from_provider(lease, LeaseStatus::Voided, applied)
        }
        EnvelopeStatus::Created
        | EnvelopeStatus::Sent
        | EnvelopeStatus::Delivered
        | EnvelopeStatus::Completed => {}
        EnvelopeStatus::Other(ref raw) => {
            applied
                .notices
                .push(format!("unrecognized provider status '{raw}', no transition applied"));
            return Ok(applied);
        }
    }

    for completion in &snapshot.signers {
        if completion.completed {
            let at = completion.completed_at.unwrap_or(now);
            let step = apply_signature(lease, completion.party, None, at)?;
            applied.changed |= step.changed;
        } else if lease.signature(completion.party).signed {
            applied.notices.push(format!(
                "provider reports {} incomplete but the signature is recorded locally",
                completion.party.label()
            ));
        }
    }

    Ok(applied)
}

fn terminate_from_provider(
    lease: &mut Lease,
    terminal: LeaseStatus,
    mut applied: Applied,
) -> Result<Applied, TransitionError> {
    if lease.status == terminal {
        return Ok(applied);
    }
    if lease.status.is_signing_in_progress() {
        lease.status = terminal;
        applied.changed = true;
        return Ok(applied);
    }
    applied.notices.push(format!(
        "provider reports the envelope {} but the lease is already {}",
        terminal.label(),
        lease.status.label()
    ));
    Ok(applied)
}

/// Explicitly cancel an in-flight signing flow.
pub fn void(lease: &mut Lease) -> Result<Applied, TransitionError> {
    match lease.status {
        LeaseStatus::Voided => Ok(Applied::unchanged()),
        status if status.is_signing_in_progress() => {
            lease.status = LeaseStatus::Voided;
            Ok(Applied::changed())
        }
        from => Err(TransitionError::InvalidTransition {
            from,
            action: "void the lease",
        }),
    }
}

/// Status is a pure function of the two signer flags while signing is in
/// flight. Never written anywhere else.
fn status_from_flags(lease: &Lease) -> LeaseStatus {
    match (lease.signed_by_tenant(), lease.signed_by_owner()) {
        (true, true) => LeaseStatus::Active,
        (true, false) => LeaseStatus::SignedByTenant,
        (false, true) => LeaseStatus::SignedByOwner,
        (false, false) => LeaseStatus::AwaitingSignatures,
    }
}
