use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for leases under signature management.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseId(pub String);

/// The two parties whose signatures activate a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Tenant,
    Owner,
}

impl Party {
    pub const fn label(self) -> &'static str {
        match self {
            Party::Tenant => "tenant",
            Party::Owner => "owner",
        }
    }
}

/// Backend chosen when signing is initiated; immutable for the rest of the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMethod {
    Simple,
    Envelope,
}

impl SignatureMethod {
    pub const fn label(self) -> &'static str {
        match self {
            SignatureMethod::Simple => "simple",
            SignatureMethod::Envelope => "envelope",
        }
    }
}

/// Authoritative lease signature status. Written only by the transition
/// functions in this module tree; never inferred ad hoc from the signer flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Draft,
    Ready,
    AwaitingSignatures,
    SignedByTenant,
    SignedByOwner,
    Active,
    Voided,
    Rejected,
}

impl LeaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LeaseStatus::Draft => "draft",
            LeaseStatus::Ready => "ready",
            LeaseStatus::AwaitingSignatures => "awaiting_signatures",
            LeaseStatus::SignedByTenant => "signed_by_tenant",
            LeaseStatus::SignedByOwner => "signed_by_owner",
            LeaseStatus::Active => "active",
            LeaseStatus::Voided => "voided",
            LeaseStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            LeaseStatus::Active | LeaseStatus::Voided | LeaseStatus::Rejected
        )
    }

    /// Signing has been initiated and at least one signature is still pending.
    pub const fn is_signing_in_progress(self) -> bool {
        matches!(
            self,
            LeaseStatus::AwaitingSignatures
                | LeaseStatus::SignedByTenant
                | LeaseStatus::SignedByOwner
        )
    }
}

/// Contact details for one signer, in the shape the envelope provider expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerContact {
    pub name: String,
    pub email: String,
}

/// Opaque reference to the rendered lease document, owned by the external
/// document service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef(pub String);

/// Evidence captured alongside a locally recorded (simple) signature, e.g. a
/// storage key for the consent blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEvidence {
    pub reference: String,
}

/// Per-party signature progress: monotonic flag, set-once timestamp, and the
/// evidence reference for simple signatures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySignature {
    pub signed: bool,
    pub signed_at: Option<DateTime<Utc>>,
    pub evidence: Option<SignatureEvidence>,
}

/// The lease aggregate the orchestrator mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub tenant: SignerContact,
    pub owner: SignerContact,
    pub status: LeaseStatus,
    pub tenant_signature: PartySignature,
    pub owner_signature: PartySignature,
    pub signature_method: Option<SignatureMethod>,
    pub envelope_id: Option<String>,
    /// Last status string received from the envelope provider. Advisory only.
    pub envelope_last_known_status: Option<String>,
    pub generated_document: Option<DocumentRef>,
    pub signing_initiated_at: Option<DateTime<Utc>>,
}

impl Lease {
    pub fn draft(id: LeaseId, tenant: SignerContact, owner: SignerContact) -> Self {
        Self {
            id,
            tenant,
            owner,
            status: LeaseStatus::Draft,
            tenant_signature: PartySignature::default(),
            owner_signature: PartySignature::default(),
            signature_method: None,
            envelope_id: None,
            envelope_last_known_status: None,
            generated_document: None,
            signing_initiated_at: None,
        }
    }

    pub fn signature(&self, party: Party) -> &PartySignature {
        match party {
            Party::Tenant => &self.tenant_signature,
            Party::Owner => &self.owner_signature,
        }
    }

    pub(crate) fn signature_mut(&mut self, party: Party) -> &mut PartySignature {
        match party {
            Party::Tenant => &mut self.tenant_signature,
            Party::Owner => &mut self.owner_signature,
        }
    }

    pub fn contact(&self, party: Party) -> &SignerContact {
        match party {
            Party::Tenant => &self.tenant,
            Party::Owner => &self.owner,
        }
    }

    pub fn signed_by_tenant(&self) -> bool {
        self.tenant_signature.signed
    }

    pub fn signed_by_owner(&self) -> bool {
        self.owner_signature.signed
    }

    /// Sanitized representation for API responses and CLI output.
    pub fn status_view(&self) -> LeaseStatusView {
        LeaseStatusView {
            lease_id: self.id.clone(),
            status: self.status.label(),
            signature_method: self.signature_method.map(SignatureMethod::label),
            signed_by_tenant: self.signed_by_tenant(),
            signed_by_owner: self.signed_by_owner(),
            tenant_signature_date: self.tenant_signature.signed_at,
            owner_signature_date: self.owner_signature.signed_at,
            envelope_id: self.envelope_id.clone(),
            envelope_last_known_status: self.envelope_last_known_status.clone(),
        }
    }
}

/// Flat view of a lease's signature progress.
#[derive(Debug, Clone, Serialize)]
pub struct LeaseStatusView {
    pub lease_id: LeaseId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_method: Option<&'static str>,
    pub signed_by_tenant: bool,
    pub signed_by_owner: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_signature_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_signature_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope_last_known_status: Option<String>,
}
