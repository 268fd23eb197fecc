//! Envelope provider gateway contract.
//!
//! The third-party e-signature provider is reached only through
//! [`EnvelopeGateway`], so workflows and tests can swap in scripted or
//! sandboxed implementations. All calls are fallible network calls; callers
//! wrap them in [`RetryPolicy::run`], and envelope creation carries a
//! per-lease idempotency key so a retry after an ambiguous failure cannot
//! mint a second envelope.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{DocumentRef, Party, SignerContact};

/// Provider-reported envelope status. Values outside the known vocabulary
/// are preserved verbatim and never cause a local transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeStatus {
    Created,
    Sent,
    Delivered,
    Completed,
    Declined,
    Voided,
    Other(String),
}

impl EnvelopeStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "completed" => Self::Completed,
            "declined" => Self::Declined,
            "voided" => Self::Voided,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Voided => "voided",
            Self::Other(raw) => raw,
        }
    }
}

/// One signer's completion state within an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerCompletion {
    pub party: Party,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Point-in-time envelope state as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeSnapshot {
    pub status: EnvelopeStatus,
    pub signers: Vec<SignerCompletion>,
}

/// One recipient slot in an envelope creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSigner {
    pub party: Party,
    pub contact: SignerContact,
    pub routing_order: u32,
}

/// Envelope creation request. `idempotency_key` is stable per lease, so a
/// provider that already honored it returns the existing envelope id instead
/// of creating a duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeRequest {
    pub idempotency_key: String,
    pub document: DocumentRef,
    pub signers: Vec<EnvelopeSigner>,
}

/// Failure calling the envelope provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EnvelopeError {
    /// Transient transport or availability problem; safe to retry.
    #[error("envelope provider unavailable: {0}")]
    Unavailable(String),
    /// The provider understood and refused the request; retrying is useless.
    #[error("envelope provider rejected the request: {0}")]
    Rejected(String),
}

/// Boundary to the third-party e-signature provider.
pub trait EnvelopeGateway: Send + Sync {
    fn create_envelope(&self, request: &EnvelopeRequest) -> Result<String, EnvelopeError>;

    fn signing_url(
        &self,
        envelope_id: &str,
        party: Party,
        contact: &SignerContact,
        return_url: &str,
    ) -> Result<String, EnvelopeError>;

    fn status(&self, envelope_id: &str) -> Result<EnvelopeSnapshot, EnvelopeError>;

    fn void_envelope(&self, envelope_id: &str, reason: &str) -> Result<(), EnvelopeError>;
}

/// Bounded exponential backoff for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based). Doubles per attempt, capped.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Run `op`, retrying [`EnvelopeError::Unavailable`] failures up to the
    /// configured ceiling. [`EnvelopeError::Rejected`] is never retried.
    pub fn run<T>(
        &self,
        mut op: impl FnMut() -> Result<T, EnvelopeError>,
    ) -> Result<T, ProviderCallError> {
        let attempts = self.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(EnvelopeError::Rejected(reason)) => {
                    return Err(ProviderCallError::Rejected(reason))
                }
                Err(EnvelopeError::Unavailable(reason)) => {
                    tracing::warn!(attempt, %reason, "envelope provider call failed");
                    last_reason = reason;
                    if attempt < attempts {
                        thread::sleep(self.delay_before(attempt));
                    }
                }
            }
        }

        Err(ProviderCallError::Exhausted {
            attempts,
            reason: last_reason,
        })
    }
}

/// Outcome of a retried provider call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderCallError {
    #[error("envelope provider unavailable after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },
    #[error("envelope provider rejected the request: {0}")]
    Rejected(String),
}
