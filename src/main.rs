mod email;
mod error;
mod notify;
mod pipeline;
mod prompt;
mod reprocess;
mod routes;
mod search;
mod server_config;
mod sync;
mod testing;

use std::net::SocketAddr;

use axum::extract::FromRef;
use notify::Notifier;
use pipeline::EmailPipeline;
use prompt::enrich::EnrichmentClient;
use routes::AppRouter;
use search::SearchStore;
use server_config::ServerConfig;
use sync::SyncManager;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
struct ServerState {
    http_client: HttpClient,
    store: SearchStore,
    enricher: EnrichmentClient,
    pipeline: EmailPipeline,
}

impl ServerState {
    fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;

        let store = SearchStore::new(http_client.clone(), &config.search);
        let enricher = EnrichmentClient::new(http_client.clone(), &config.ai);
        let notifier = Notifier::new(http_client.clone(), &config.notify);
        let pipeline = EmailPipeline::new(enricher.clone(), store.clone(), notifier);

        Ok(ServerState {
            http_client,
            store,
            enricher,
            pipeline,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let config = ServerConfig::load()?;
    let state = ServerState::from_config(&config)?;

    // Best-effort schema init; the /api/init-sync route can repeat it later.
    match state.store.ensure_schema().await {
        Ok(()) => tracing::info!("Search index initialized"),
        Err(e) => tracing::error!(error = %e, "Search index init failed"),
    }

    let sync_manager = SyncManager::start(
        config.accounts.clone(),
        state.pipeline.clone(),
        config.sync.lookback_days,
    );
    tracing::info!(accounts = sync_manager.account_count(), "Mailbox sync started");

    let router = AppRouter::create(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Onebox server running on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Server is down; stop the account sync tasks and wait for them to
    // close their connections.
    sync_manager.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
