// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `serve`: wires the decision engine together and runs it until shutdown.
//!
//! Background tasks (audit dispatcher, SLO monitor, metrics listener) share
//! one [`CancellationToken`]. The API server drains first; the dispatcher then
//! flushes whatever is still queued before the process exits.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aegis_decision_core::application::authorization::AuthorizationService;
use aegis_decision_core::application::claims_resolver::ClaimsResolver;
use aegis_decision_core::application::slo_monitor::SloMonitor;
use aegis_decision_core::domain::engine_config::EngineConfigManifest;
use aegis_decision_core::domain::policy_config::PolicyBundle;
use aegis_decision_core::infrastructure::audit::{build_sinks, AuditDispatcher};
use aegis_decision_core::infrastructure::event_bus::EventBus;
use aegis_decision_core::infrastructure::jwt_verifier::JwtTokenVerifier;
use aegis_decision_core::infrastructure::policy_store::PolicyStore;
use aegis_decision_core::infrastructure::telemetry;
use aegis_decision_core::presentation::api::{app, AppState};

pub async fn run(config: EngineConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let spec = &config.spec;
    info!("Decision engine starting: name={}", config.metadata.name);

    let policies = match &spec.policy_path {
        Some(path) => PolicyStore::from_file(path).with_context(|| format!("Failed to load policy {:?}", path))?,
        None => {
            warn!("No policy_path configured; every request will be denied");
            PolicyStore::new(PolicyBundle::empty())
        }
    };

    let verifier = JwtTokenVerifier::from_config(&spec.token).context("Failed to initialize token verifier")?;
    let resolver = ClaimsResolver::new(Arc::new(verifier), spec.token.claims.clone());
    let event_bus = EventBus::with_default_capacity();
    let sinks = build_sinks(&spec.audit.sinks).context("Failed to initialize audit sinks")?;
    let audit = AuditDispatcher::from_config(&spec.audit, sinks);
    let authorization = Arc::new(AuthorizationService::new(
        resolver,
        Arc::new(policies),
        audit.clone(),
        event_bus.clone(),
    ));
    let slo_monitor = Arc::new(SloMonitor::new(&spec.slo, event_bus.clone()));

    let cancel = CancellationToken::new();
    let mut workers: Vec<JoinHandle<()>> = vec![
        tokio::spawn(audit.clone().run(cancel.clone())),
        tokio::spawn(
            slo_monitor
                .clone()
                .run(event_bus.subscribe_decisions(), cancel.clone()),
        ),
        tokio::spawn(reload_on_hangup(authorization.clone(), cancel.clone())),
    ];

    if spec.observability.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install metrics recorder")?;
        telemetry::describe_metrics();

        let addr = format!("{}:{}", spec.network.bind_address, spec.observability.metrics.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind metrics listener to {}", addr))?;
        info!("Metrics listening on {}", addr);

        let shutdown = cancel.clone().cancelled_owned();
        workers.push(tokio::spawn(async move {
            if let Err(e) = serve_metrics(handle, listener, shutdown).await {
                error!("Metrics listener failed: {}", e);
            }
        }));
    }

    let router = app(AppState {
        authorization,
        slo_monitor,
        audit,
    });

    let addr = format!("{}:{}", spec.network.bind_address, spec.network.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Decision API listening on {}", addr);

    let server_cancel = cancel.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = server_cancel.cancelled() => {}
            }
        })
        .await
        .context("HTTP server failed");

    cancel.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            error!("Background task ended abnormally: {}", e);
        }
    }
    info!("Decision engine stopped");

    served
}

async fn serve_metrics<F>(handle: PrometheusHandle, listener: TcpListener, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    );
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}

/// SIGHUP re-reads the policy file. A rejected document leaves the active
/// policy untouched.
#[cfg(unix)]
async fn reload_on_hangup(authorization: Arc<AuthorizationService>, cancel: CancellationToken) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("Failed to install SIGHUP handler; policy reload on signal disabled: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                info!("Received SIGHUP; reloading policy");
                // Outcome is logged and published by the service
                let _ = authorization.reload_policy_from_source();
            }
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_authorization: Arc<AuthorizationService>, cancel: CancellationToken) {
    cancel.cancelled().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
