use crate::infra::{
    InMemoryLeaseRepository, InMemoryNotificationPublisher, SandboxEnvelopeGateway,
};
use chrono::Utc;
use clap::Args;
use lease_sign::error::AppError;
use lease_sign::workflows::signing::{
    DocumentRef, Lease, LeaseSignatureOrchestrator, Party, ReconciliationPoller,
    SignatureEvidence, SignatureMethod, SigningConfig,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the delegated envelope portion of the demo.
    #[arg(long)]
    pub(crate) skip_envelope: bool,
    /// Void the envelope lease instead of letting the signers finish.
    #[arg(long)]
    pub(crate) void_envelope: bool,
}

type DemoOrchestrator = LeaseSignatureOrchestrator<
    InMemoryLeaseRepository,
    SandboxEnvelopeGateway,
    InMemoryNotificationPublisher,
>;

struct DemoStack {
    orchestrator: Arc<DemoOrchestrator>,
    poller: Arc<
        ReconciliationPoller<
            InMemoryLeaseRepository,
            SandboxEnvelopeGateway,
            InMemoryNotificationPublisher,
        >,
    >,
    gateway: Arc<SandboxEnvelopeGateway>,
    notifier: Arc<InMemoryNotificationPublisher>,
}

fn demo_stack() -> DemoStack {
    let repository = Arc::new(InMemoryLeaseRepository::default());
    let gateway = Arc::new(SandboxEnvelopeGateway::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let orchestrator = Arc::new(LeaseSignatureOrchestrator::new(
        repository.clone(),
        gateway.clone(),
        notifier.clone(),
        SigningConfig::default(),
    ));
    let poller = Arc::new(ReconciliationPoller::new(
        orchestrator.clone(),
        repository,
        notifier.clone(),
    ));

    DemoStack {
        orchestrator,
        poller,
        gateway,
        notifier,
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let stack = demo_stack();

    println!("Lease signature orchestration demo");
    run_simple_demo(&stack)?;

    if !args.skip_envelope {
        run_envelope_demo(&stack, args.void_envelope)?;
    }

    let events = stack.notifier.events();
    if events.is_empty() {
        println!("\nNotifications: none dispatched");
    } else {
        println!("\nNotifications dispatched");
        for event in events {
            println!("- template={} -> {}", event.template, event.lease_id.0);
        }
    }

    Ok(())
}

fn run_simple_demo(stack: &DemoStack) -> Result<(), AppError> {
    println!("\nSimple backend: both signatures recorded locally");

    let lease = open_ready_lease(stack, "docs/simple-agreement.pdf")?;
    let lease = stack
        .orchestrator
        .initiate_signing(&lease.id, SignatureMethod::Simple)?;
    print_status("signing initiated", &lease);

    let lease = stack.orchestrator.record_signature(
        &lease.id,
        Party::Tenant,
        SignatureEvidence {
            reference: "consent/tenant-checkbox.png".to_string(),
        },
    )?;
    print_status("tenant signed", &lease);

    let lease = stack.orchestrator.record_signature(
        &lease.id,
        Party::Owner,
        SignatureEvidence {
            reference: "consent/owner-checkbox.png".to_string(),
        },
    )?;
    print_status("owner signed", &lease);

    Ok(())
}

fn run_envelope_demo(stack: &DemoStack, void_instead: bool) -> Result<(), AppError> {
    println!("\nEnvelope backend: delegated signing via the sandbox provider");

    let lease = open_ready_lease(stack, "docs/envelope-agreement.pdf")?;
    let lease = stack
        .orchestrator
        .initiate_signing(&lease.id, SignatureMethod::Envelope)?;
    print_status("envelope created", &lease);

    let envelope_id = match lease.envelope_id.clone() {
        Some(id) => id,
        None => {
            println!("  Envelope id missing after initiation; aborting envelope demo");
            return Ok(());
        }
    };

    let url = stack
        .orchestrator
        .get_signing_url(&lease.id, Party::Tenant, None)?;
    println!("  Tenant embedded signing URL: {url}");

    if void_instead {
        let lease = stack
            .orchestrator
            .void_lease(&lease.id, Some("demo voidance".to_string()))?;
        print_status("lease voided", &lease);
        return Ok(());
    }

    stack.gateway.complete_signer(&envelope_id, Party::Tenant);
    let report = stack.poller.run_once(Utc::now())?;
    println!(
        "  Sweep after tenant completion: {} reconciled",
        report.reconciled.len()
    );
    print_status("tenant completed", &stack.orchestrator.get(&lease.id)?);

    stack.gateway.complete_signer(&envelope_id, Party::Owner);
    stack.poller.run_once(Utc::now())?;
    print_status("owner completed", &stack.orchestrator.get(&lease.id)?);

    Ok(())
}

fn open_ready_lease(stack: &DemoStack, document: &str) -> Result<Lease, AppError> {
    let lease = stack.orchestrator.open_lease(
        lease_sign::workflows::signing::SignerContact {
            name: "Avery Tenant".to_string(),
            email: "avery@example.com".to_string(),
        },
        lease_sign::workflows::signing::SignerContact {
            name: "Morgan Owner".to_string(),
            email: "morgan@example.com".to_string(),
        },
    )?;
    print_status("lease opened", &lease);

    let lease = stack
        .orchestrator
        .attach_document(&lease.id, DocumentRef(document.to_string()))?;
    print_status("document attached", &lease);
    Ok(lease)
}

fn print_status(step: &str, lease: &Lease) {
    println!(
        "  {} -> {} is {}",
        step,
        lease.id.0,
        lease.status.label()
    );
}
