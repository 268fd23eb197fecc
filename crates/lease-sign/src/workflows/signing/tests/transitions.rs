use chrono::{Duration, TimeZone, Utc};

use super::common::*;
use crate::workflows::signing::domain::{Lease, LeaseId, LeaseStatus, Party, SignatureMethod};
use crate::workflows::signing::envelope::EnvelopeStatus;
use crate::workflows::signing::transition::{self, TransitionError};

fn draft_lease() -> Lease {
    Lease::draft(
        LeaseId("lease-test".to_string()),
        tenant_contact(),
        owner_contact(),
    )
}

fn awaiting_lease(method: SignatureMethod) -> Lease {
    let mut lease = draft_lease();
    transition::attach_document(&mut lease, document()).expect("document attaches");
    let envelope_id = match method {
        SignatureMethod::Simple => None,
        SignatureMethod::Envelope => Some("env-0001".to_string()),
    };
    let initiated_at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    transition::initiate(&mut lease, method, envelope_id, initiated_at)
        .expect("signing initiates");
    lease
}

fn assert_active_invariant(lease: &Lease) {
    assert_eq!(
        lease.status == LeaseStatus::Active,
        lease.signed_by_tenant() && lease.signed_by_owner(),
        "active status must coincide with both signatures"
    );
}

#[test]
fn attach_document_moves_draft_to_ready() {
    let mut lease = draft_lease();
    let applied = transition::attach_document(&mut lease, document()).expect("attaches");
    assert!(applied.changed);
    assert_eq!(lease.status, LeaseStatus::Ready);

    let repeat = transition::attach_document(&mut lease, document()).expect("repeat is a no-op");
    assert!(!repeat.changed);
}

#[test]
fn attach_document_rejected_once_signing_started() {
    let mut lease = awaiting_lease(SignatureMethod::Simple);
    match transition::attach_document(&mut lease, document()) {
        Err(TransitionError::InvalidTransition { from, .. }) => {
            assert_eq!(from, LeaseStatus::AwaitingSignatures)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn initiate_requires_ready_state() {
    let mut lease = draft_lease();
    match transition::initiate(&mut lease, SignatureMethod::Simple, None, Utc::now()) {
        Err(TransitionError::InvalidTransition { from, .. }) => {
            assert_eq!(from, LeaseStatus::Draft)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn initiate_requires_generated_document() {
    let mut lease = draft_lease();
    lease.status = LeaseStatus::Ready;
    assert!(matches!(
        transition::initiate(&mut lease, SignatureMethod::Simple, None, Utc::now()),
        Err(TransitionError::DocumentNotReady)
    ));
    assert_eq!(lease.status, LeaseStatus::Ready);
    assert!(lease.signature_method.is_none());
}

#[test]
fn duplicate_initiate_converges_without_change() {
    let mut lease = awaiting_lease(SignatureMethod::Envelope);
    let applied = transition::initiate(
        &mut lease,
        SignatureMethod::Envelope,
        Some("env-0001".to_string()),
        Utc::now(),
    )
    .expect("duplicate initiate accepted");
    assert!(!applied.changed);
    assert_eq!(lease.status, LeaseStatus::AwaitingSignatures);
}

#[test]
fn repeated_signature_keeps_original_timestamp_and_evidence() {
    let mut lease = awaiting_lease(SignatureMethod::Simple);
    let first_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let second_at = first_at + Duration::hours(6);

    let first = transition::apply_signature(&mut lease, Party::Tenant, Some(evidence("e1")), first_at)
        .expect("first signature applies");
    assert!(first.changed);

    let second =
        transition::apply_signature(&mut lease, Party::Tenant, Some(evidence("e2")), second_at)
            .expect("duplicate is a no-op");
    assert!(!second.changed);

    let signature = lease.signature(Party::Tenant);
    assert_eq!(signature.signed_at, Some(first_at));
    assert_eq!(signature.evidence, Some(evidence("e1")));
    assert_eq!(lease.status, LeaseStatus::SignedByTenant);
    assert_active_invariant(&lease);
}

#[test]
fn signature_order_is_commutative() {
    let tenant_at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
    let owner_at = Utc.with_ymd_and_hms(2026, 3, 2, 16, 30, 0).unwrap();

    let mut tenant_first = awaiting_lease(SignatureMethod::Simple);
    transition::apply_signature(&mut tenant_first, Party::Tenant, Some(evidence("t")), tenant_at)
        .expect("tenant signs");
    assert_eq!(tenant_first.status, LeaseStatus::SignedByTenant);
    transition::apply_signature(&mut tenant_first, Party::Owner, Some(evidence("o")), owner_at)
        .expect("owner signs");

    let mut owner_first = awaiting_lease(SignatureMethod::Simple);
    transition::apply_signature(&mut owner_first, Party::Owner, Some(evidence("o")), owner_at)
        .expect("owner signs");
    assert_eq!(owner_first.status, LeaseStatus::SignedByOwner);
    transition::apply_signature(&mut owner_first, Party::Tenant, Some(evidence("t")), tenant_at)
        .expect("tenant signs");

    assert_eq!(tenant_first, owner_first);
    assert_eq!(tenant_first.status, LeaseStatus::Active);
    assert_active_invariant(&tenant_first);
}

#[test]
fn signature_on_terminal_lease_is_rejected_unless_duplicate() {
    let mut lease = awaiting_lease(SignatureMethod::Simple);
    transition::apply_signature(&mut lease, Party::Tenant, Some(evidence("t")), Utc::now())
        .expect("tenant signs");
    transition::void(&mut lease).expect("voids");

    // Duplicate of an already-recorded signature stays a silent no-op.
    let duplicate =
        transition::apply_signature(&mut lease, Party::Tenant, Some(evidence("t2")), Utc::now())
            .expect("duplicate tolerated");
    assert!(!duplicate.changed);

    // A new signature on a voided lease is an error.
    match transition::apply_signature(&mut lease, Party::Owner, Some(evidence("o")), Utc::now()) {
        Err(TransitionError::InvalidTransition { from, .. }) => {
            assert_eq!(from, LeaseStatus::Voided)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn decline_overrides_partial_completion() {
    for seed in [LeaseStatus::AwaitingSignatures, LeaseStatus::SignedByTenant] {
        let mut lease = awaiting_lease(SignatureMethod::Envelope);
        if seed == LeaseStatus::SignedByTenant {
            transition::apply_signature(&mut lease, Party::Tenant, None, Utc::now())
                .expect("tenant completion applies");
        }

        let declined = snapshot(
            EnvelopeStatus::Declined,
            vec![completion(Party::Tenant, true)],
        );
        let applied = transition::apply_envelope_snapshot(&mut lease, &declined, Utc::now())
            .expect("decline applies");
        assert!(applied.changed);
        assert_eq!(lease.status, LeaseStatus::Rejected);
        assert_eq!(lease.envelope_last_known_status.as_deref(), Some("declined"));
        assert_active_invariant(&lease);
    }
}

#[test]
fn provider_void_terminates_the_flow() {
    let mut lease = awaiting_lease(SignatureMethod::Envelope);
    let voided = snapshot(EnvelopeStatus::Voided, Vec::new());
    transition::apply_envelope_snapshot(&mut lease, &voided, Utc::now()).expect("void applies");
    assert_eq!(lease.status, LeaseStatus::Voided);
}

#[test]
fn unknown_provider_status_causes_no_transition() {
    let mut lease = awaiting_lease(SignatureMethod::Envelope);
    let odd = snapshot(
        EnvelopeStatus::Other("processing".to_string()),
        vec![completion(Party::Tenant, true)],
    );
    let applied =
        transition::apply_envelope_snapshot(&mut lease, &odd, Utc::now()).expect("tolerated");

    assert_eq!(lease.status, LeaseStatus::AwaitingSignatures);
    assert!(!lease.signed_by_tenant(), "unknown status must not apply completions");
    assert_eq!(lease.envelope_last_known_status.as_deref(), Some("processing"));
    assert_eq!(applied.notices.len(), 1);
}

#[test]
fn incomplete_report_for_signed_party_raises_notice_without_reset() {
    let mut lease = awaiting_lease(SignatureMethod::Envelope);
    transition::apply_signature(&mut lease, Party::Tenant, None, Utc::now())
        .expect("tenant completion applies");

    let stale = snapshot(EnvelopeStatus::Sent, vec![completion(Party::Tenant, false)]);
    let applied =
        transition::apply_envelope_snapshot(&mut lease, &stale, Utc::now()).expect("tolerated");

    assert!(lease.signed_by_tenant(), "signer flags are monotonic");
    assert_eq!(applied.notices.len(), 1);
    assert_eq!(lease.status, LeaseStatus::SignedByTenant);
}

#[test]
fn envelope_completions_activate_in_any_order() {
    let tenant_done = vec![completion(Party::Tenant, true)];
    let both_done = vec![completion(Party::Tenant, true), completion(Party::Owner, true)];

    let mut forward = awaiting_lease(SignatureMethod::Envelope);
    let at = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
    transition::apply_envelope_snapshot(
        &mut forward,
        &snapshot(EnvelopeStatus::Sent, tenant_done.clone()),
        at,
    )
    .expect("tenant completion applies");
    assert_eq!(forward.status, LeaseStatus::SignedByTenant);
    transition::apply_envelope_snapshot(
        &mut forward,
        &snapshot(EnvelopeStatus::Completed, both_done.clone()),
        at,
    )
    .expect("owner completion applies");

    let mut replayed = awaiting_lease(SignatureMethod::Envelope);
    transition::apply_envelope_snapshot(
        &mut replayed,
        &snapshot(EnvelopeStatus::Completed, both_done),
        at,
    )
    .expect("combined completion applies");
    transition::apply_envelope_snapshot(
        &mut replayed,
        &snapshot(EnvelopeStatus::Completed, tenant_done),
        at,
    )
    .expect("stale replay tolerated");

    assert_eq!(forward.status, LeaseStatus::Active);
    assert_eq!(replayed.status, LeaseStatus::Active);
    assert_active_invariant(&forward);
    assert_active_invariant(&replayed);
}

#[test]
fn void_is_rejected_outside_the_signing_flow() {
    let mut active = awaiting_lease(SignatureMethod::Simple);
    transition::apply_signature(&mut active, Party::Tenant, None, Utc::now()).expect("signs");
    transition::apply_signature(&mut active, Party::Owner, None, Utc::now()).expect("signs");
    assert_eq!(active.status, LeaseStatus::Active);
    assert!(matches!(
        transition::void(&mut active),
        Err(TransitionError::InvalidTransition { .. })
    ));

    let mut ready = draft_lease();
    transition::attach_document(&mut ready, document()).expect("attaches");
    assert!(matches!(
        transition::void(&mut ready),
        Err(TransitionError::InvalidTransition { .. })
    ));

    let mut voided = awaiting_lease(SignatureMethod::Simple);
    transition::void(&mut voided).expect("voids");
    let repeat = transition::void(&mut voided).expect("repeat void tolerated");
    assert!(!repeat.changed);
}
