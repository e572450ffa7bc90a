use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use vddk_builder_auth::{AuthorizationGate, KubeAccessReviewer};
use vddk_builder_build::{
    BuildOrchestrator, BuildSlot, OrchestratorSettings, PodmanBuilder, SkopeoPusher,
};
use vddk_builder_config::{Config, ConfigError};
use vddk_builder_registry::RegistryProbe;
use vddk_builderd::tls::{self, TlsListener};
use vddk_builderd::{AppState, app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(ConfigError::Parse(e)) => e.exit(),
        Err(e) => return Err(anyhow::Error::new(e).context("invalid configuration")),
    };
    config.ensure_upload_dir().with_context(|| {
        format!(
            "Unable to create upload directory {}",
            config.upload_dir.display()
        )
    })?;

    let tls_config = tls::load_server_config(&config.ca_public_key, &config.private_key)
        .context("failed to load TLS certificate and key")?;

    let state = build_state(&config)?;
    tracing::info!(
        registry = %config.image_registry,
        default_image = %config.image_name,
        require_auth = config.require_auth,
        "Services initialized"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let listener =
        TlsListener::new(listener, tls_config).context("failed to start TLS listener")?;

    tracing::info!("Starting HTTPS server on port {}", config.server_port);
    axum::serve(listener, app(state, config.upload_max_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTPS server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let reviewer = KubeAccessReviewer::new(&config.kube_api_server)
        .context("failed to create Kubernetes API client")?;
    let gate = AuthorizationGate::new(config.require_auth, Arc::new(reviewer));

    let orchestrator = BuildOrchestrator::new(
        OrchestratorSettings {
            registry_host: config.image_registry.clone(),
            default_image_name: config.image_name.clone(),
            staging_dir: config.staging_dir(),
        },
        Arc::new(PodmanBuilder::new(&config.build_tool, &config.build_file)),
        Arc::new(SkopeoPusher::new(&config.push_tool)),
    );

    let probe =
        RegistryProbe::new(&config.image_registry).context("failed to create registry client")?;

    Ok(AppState {
        gate: Arc::new(gate),
        slot: BuildSlot::new(),
        orchestrator: Arc::new(orchestrator),
        probe: Arc::new(probe),
        upload_dir: config.upload_dir.clone(),
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, no longer accepting connections");
}
