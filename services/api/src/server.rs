use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryLeaseRepository, InMemoryNotificationPublisher, SandboxEnvelopeGateway,
};
use crate::routes::with_signing_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lease_sign::config::AppConfig;
use lease_sign::error::AppError;
use lease_sign::telemetry;
use lease_sign::workflows::signing::{
    LeaseSignatureOrchestrator, ReconciliationPoller, SigningRouterState,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryLeaseRepository::default());
    let gateway = Arc::new(SandboxEnvelopeGateway::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let orchestrator = Arc::new(LeaseSignatureOrchestrator::new(
        repository.clone(),
        gateway,
        notifier.clone(),
        config.signing.clone(),
    ));
    let poller = Arc::new(ReconciliationPoller::new(
        orchestrator.clone(),
        repository,
        notifier,
    ));

    let app = with_signing_routes(Arc::new(SigningRouterState {
        orchestrator,
        poller,
    }))
    .layer(Extension(app_state))
    .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "lease signature orchestrator ready");

    axum::serve(listener, app).await?;
    Ok(())
}
