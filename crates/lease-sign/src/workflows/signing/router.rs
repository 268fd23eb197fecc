use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{
    DocumentRef, LeaseId, Party, SignatureEvidence, SignatureMethod, SignerContact,
};
use super::envelope::{EnvelopeGateway, EnvelopeSnapshot, EnvelopeStatus, SignerCompletion};
use super::orchestrator::{LeaseSignatureOrchestrator, SigningError};
use super::poller::ReconciliationPoller;
use super::repository::{LeaseRepository, NotificationPublisher, RepositoryError};
use super::transition::TransitionError;

/// Shared handler state: the orchestrator plus the poller for the on-demand
/// reconcile endpoint.
pub struct SigningRouterState<R, G, N> {
    pub orchestrator: Arc<LeaseSignatureOrchestrator<R, G, N>>,
    pub poller: Arc<ReconciliationPoller<R, G, N>>,
}

/// Router builder exposing the signature orchestration operations.
pub fn signing_router<R, G, N>(state: Arc<SigningRouterState<R, G, N>>) -> Router
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/leases", post(open_lease_handler::<R, G, N>))
        .route(
            "/api/v1/leases/:lease_id",
            get(lease_status_handler::<R, G, N>),
        )
        .route(
            "/api/v1/leases/:lease_id/document",
            post(attach_document_handler::<R, G, N>),
        )
        .route(
            "/api/v1/leases/:lease_id/signing",
            post(initiate_signing_handler::<R, G, N>),
        )
        .route(
            "/api/v1/leases/:lease_id/signatures",
            post(record_signature_handler::<R, G, N>),
        )
        .route(
            "/api/v1/leases/:lease_id/signing-url",
            get(signing_url_handler::<R, G, N>),
        )
        .route(
            "/api/v1/leases/:lease_id/void",
            post(void_lease_handler::<R, G, N>),
        )
        .route(
            "/api/v1/envelopes/webhook",
            post(envelope_webhook_handler::<R, G, N>),
        )
        .route("/api/v1/reconcile", post(reconcile_handler::<R, G, N>))
        .with_state(state)
}

/// The orchestrator is synchronous and sleeps between provider retries, so
/// handler work goes to the blocking pool instead of pinning a runtime
/// worker for the duration of a provider outage.
async fn run_blocking<F>(op: F) -> Response
where
    F: FnOnce() -> Response + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(%err, "signing handler task failed");
            let payload = json!({ "error": "internal error" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenLeaseRequest {
    pub(crate) tenant: SignerContact,
    pub(crate) owner: SignerContact,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttachDocumentRequest {
    pub(crate) reference: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InitiateSigningRequest {
    pub(crate) method: SignatureMethod,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordSignatureRequest {
    pub(crate) party: Party,
    pub(crate) evidence: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SigningUrlQuery {
    pub(crate) party: Party,
    pub(crate) return_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SigningUrlResponse {
    pub(crate) url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VoidLeaseRequest {
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

/// Inbound provider webhook payload, normalized to the local vocabulary.
#[derive(Debug, Deserialize)]
pub(crate) struct EnvelopeWebhookRequest {
    pub(crate) lease_id: String,
    pub(crate) envelope_id: String,
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) signers: Vec<SignerCompletion>,
}

pub(crate) async fn open_lease_handler<R, G, N>(
    State(state): State<Arc<SigningRouterState<R, G, N>>>,
    Json(request): Json<OpenLeaseRequest>,
) -> Response
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    run_blocking(move || {
        match state.orchestrator.open_lease(request.tenant, request.owner) {
            Ok(lease) => (StatusCode::CREATED, Json(lease.status_view())).into_response(),
            Err(err) => error_response(err),
        }
    })
    .await
}

pub(crate) async fn lease_status_handler<R, G, N>(
    State(state): State<Arc<SigningRouterState<R, G, N>>>,
    Path(lease_id): Path<String>,
) -> Response
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    run_blocking(move || match state.orchestrator.get(&LeaseId(lease_id)) {
        Ok(lease) => (StatusCode::OK, Json(lease.status_view())).into_response(),
        Err(err) => error_response(err),
    })
    .await
}

pub(crate) async fn attach_document_handler<R, G, N>(
    State(state): State<Arc<SigningRouterState<R, G, N>>>,
    Path(lease_id): Path<String>,
    Json(request): Json<AttachDocumentRequest>,
) -> Response
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    run_blocking(move || {
        match state
            .orchestrator
            .attach_document(&LeaseId(lease_id), DocumentRef(request.reference))
        {
            Ok(lease) => (StatusCode::OK, Json(lease.status_view())).into_response(),
            Err(err) => error_response(err),
        }
    })
    .await
}

pub(crate) async fn initiate_signing_handler<R, G, N>(
    State(state): State<Arc<SigningRouterState<R, G, N>>>,
    Path(lease_id): Path<String>,
    Json(request): Json<InitiateSigningRequest>,
) -> Response
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    run_blocking(move || {
        match state
            .orchestrator
            .initiate_signing(&LeaseId(lease_id), request.method)
        {
            Ok(lease) => (StatusCode::ACCEPTED, Json(lease.status_view())).into_response(),
            Err(err) => error_response(err),
        }
    })
    .await
}

pub(crate) async fn record_signature_handler<R, G, N>(
    State(state): State<Arc<SigningRouterState<R, G, N>>>,
    Path(lease_id): Path<String>,
    Json(request): Json<RecordSignatureRequest>,
) -> Response
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    run_blocking(move || {
        let evidence = SignatureEvidence {
            reference: request.evidence,
        };
        match state
            .orchestrator
            .record_signature(&LeaseId(lease_id), request.party, evidence)
        {
            Ok(lease) => (StatusCode::OK, Json(lease.status_view())).into_response(),
            Err(err) => error_response(err),
        }
    })
    .await
}

pub(crate) async fn signing_url_handler<R, G, N>(
    State(state): State<Arc<SigningRouterState<R, G, N>>>,
    Path(lease_id): Path<String>,
    Query(query): Query<SigningUrlQuery>,
) -> Response
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    run_blocking(move || {
        match state.orchestrator.get_signing_url(
            &LeaseId(lease_id),
            query.party,
            query.return_url.as_deref(),
        ) {
            Ok(url) => (StatusCode::OK, Json(SigningUrlResponse { url })).into_response(),
            Err(err) => error_response(err),
        }
    })
    .await
}

pub(crate) async fn void_lease_handler<R, G, N>(
    State(state): State<Arc<SigningRouterState<R, G, N>>>,
    Path(lease_id): Path<String>,
    Json(request): Json<VoidLeaseRequest>,
) -> Response
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    run_blocking(move || {
        match state
            .orchestrator
            .void_lease(&LeaseId(lease_id), request.reason)
        {
            Ok(lease) => (StatusCode::OK, Json(lease.status_view())).into_response(),
            Err(err) => error_response(err),
        }
    })
    .await
}

pub(crate) async fn envelope_webhook_handler<R, G, N>(
    State(state): State<Arc<SigningRouterState<R, G, N>>>,
    Json(request): Json<EnvelopeWebhookRequest>,
) -> Response
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    run_blocking(move || {
        let snapshot = EnvelopeSnapshot {
            status: EnvelopeStatus::from_provider(&request.status),
            signers: request.signers,
        };
        match state.orchestrator.observe_envelope_status(
            &LeaseId(request.lease_id),
            &request.envelope_id,
            &snapshot,
        ) {
            Ok(outcome) => (StatusCode::OK, Json(outcome.lease.status_view())).into_response(),
            Err(err) => error_response(err),
        }
    })
    .await
}

pub(crate) async fn reconcile_handler<R, G, N>(
    State(state): State<Arc<SigningRouterState<R, G, N>>>,
) -> Response
where
    R: LeaseRepository + 'static,
    G: EnvelopeGateway + 'static,
    N: NotificationPublisher + 'static,
{
    run_blocking(move || match state.poller.run_once(Utc::now()) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    })
    .await
}

fn error_response(err: SigningError) -> Response {
    let status = match &err {
        SigningError::Transition(TransitionError::DocumentNotReady) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SigningError::Transition(_) => StatusCode::CONFLICT,
        SigningError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        SigningError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        SigningError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SigningError::ProviderUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SigningError::ProviderRejected(_) => StatusCode::BAD_GATEWAY,
        SigningError::ProviderInconsistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SigningError::ConcurrentModification => StatusCode::SERVICE_UNAVAILABLE,
    };

    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}
