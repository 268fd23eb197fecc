//! Lease signature orchestration library.
//!
//! The `workflows::signing` module owns the lease signature state machine and
//! the two signing backends (locally recorded simple signatures and delegated
//! e-signature envelopes), plus the reconciliation poller that folds
//! provider-reported envelope status back into local lease state.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
