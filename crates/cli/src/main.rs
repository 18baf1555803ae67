//! hookbridge entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: flags with environment fallbacks, validated
//!    into explicit settings values (see [`config`]).
//! 2. **Wire observability**: JSON `tracing` output plus optional OTLP span
//!    export (see [`observability`]).
//! 3. **Construct infrastructure**: open the SQLite installation store and
//!    build the HTTP publisher, then inject both into the listener.
//! 4. **Serve** until SIGINT or SIGTERM, then drain in-flight requests.
//!
//! The `publish` subcommand skips steps 3 and 4: it builds one event from
//! flags, publishes it once, and exits.

mod config;
mod observability;

use std::sync::Arc;

use anyhow::{Context, Result};
use bridge::{build_envelope, EventSink, InstallationResolver};
use clap::Parser;
use listener::{build_router, AppState};
use publisher::CdEventsPublisher;
use store::SqliteInstallStore;

use crate::config::{Cli, Command, Config, PublishRequest};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let telemetry = observability::init()?;

    let result = match cli.command {
        Command::Serve(args) => match args.resolve() {
            Ok(config) => serve(config).await,
            Err(err) => Err(err),
        },
        Command::Publish(args) => match args.resolve() {
            Ok(request) => publish(request).await,
            Err(err) => Err(err),
        },
    };
    if let Err(err) = &result {
        tracing::error!(error = ?err, "hookbridge stopped");
    }
    telemetry.shutdown();
    result
}

async fn serve(config: Config) -> Result<()> {
    let store = SqliteInstallStore::open(&config.db_path)
        .with_context(|| format!("open installation store {}", config.db_path.display()))?;
    let resolver = InstallationResolver::new(Arc::new(store), config.setup);
    let publisher = CdEventsPublisher::new(config.publish_timeout).context("build publisher")?;

    let settings = config.listener;
    tracing::info!(
        provider = %settings.provider,
        addr = %config.addr,
        webhook_path = %settings.webhook_path,
        callback_path = %resolver.settings().callback_path,
        db_path = %config.db_path.display(),
        setup_token = settings.setup_token.is_some(),
        default_credentials = settings.defaults.credentials.is_complete(),
        "hookbridge listening"
    );
    let app = build_router(AppState::new(settings, resolver, Arc::new(publisher)));

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    tracing::info!("hookbridge shut down");
    Ok(())
}

async fn publish(request: PublishRequest) -> Result<()> {
    let built = build_envelope(&request.event).context("build event")?;
    let publisher = CdEventsPublisher::new(request.timeout).context("build publisher")?;
    publisher
        .publish(&request.credentials, &built.body)
        .await
        .context("publish event")?;

    tracing::info!(event_type = %built.resolved_type, "event published");
    println!(
        "Published {} for service={} env={}",
        built.resolved_type, request.event.service, request.event.environment
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
