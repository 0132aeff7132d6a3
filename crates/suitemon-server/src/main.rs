mod api;
mod config;

use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use suitemon_clients::audit::AuditLogClient;
use suitemon_clients::auth::{ClientCredentials, CredentialCache, TokenProvider};
use suitemon_clients::security_alert::SecurityAlertClient;
use suitemon_clients::signin::SignInClient;
use suitemon_clients::EventSource;
use suitemon_engine::orchestrator::PollOrchestrator;
use suitemon_engine::scheduler::PollScheduler;
use suitemon_engine::sink::HttpLogSink;
use suitemon_notify::WebhookNotifier;
use suitemon_rules::loader::RuleCatalog;
use suitemon_storage::poll_store::PollStore;
use suitemon_storage::state_store::SqliteStateStore;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use config::{EnvSettings, ServerConfig};

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  suitemon-server [config.toml]                         Start the polling engine");
    eprintln!("  suitemon-server init-tenants <config.toml> <seed.json>  Register tenants from a seed file");
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-tenants") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-tenants requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-tenants requires <seed.json> argument")
            })?;
            run_init_tenants(config_path, seed_path)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

#[derive(Deserialize)]
struct TenantSeed {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct TenantsSeedFile {
    tenants: Vec<TenantSeed>,
}

/// Registers monitored tenants from a JSON seed file (operator action).
fn run_init_tenants(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = PollStore::new(Path::new(&config.data_dir))?;

    let seed_content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    let seed: TenantsSeedFile = serde_json::from_str(&seed_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))?;

    let mut registered = 0u32;
    for tenant in &seed.tenants {
        match store.upsert_tenant(&tenant.id, &tenant.name) {
            Ok(()) => {
                tracing::info!(id = %tenant.id, name = %tenant.name, "Tenant registered");
                registered += 1;
            }
            Err(e) => {
                tracing::error!(id = %tenant.id, error = %e, "Failed to register tenant");
            }
        }
    }

    tracing::info!(registered, "init-tenants completed");
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let env = EnvSettings::from_env()?;

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        rules_dir = %config.rules_dir,
        poll_interval_secs = config.poll_interval_secs,
        "suitemon-server starting"
    );

    // Stores
    let data_dir = Path::new(&config.data_dir);
    let store = Arc::new(PollStore::new(data_dir)?);
    let state = Arc::new(SqliteStateStore::new(data_dir)?);

    // One credential per (tenant, scope) pair, shared by all clients.
    let credentials = ClientCredentials::new(
        config.authority_url.clone(),
        env.client_id.clone(),
        env.client_auth.clone(),
    );
    let tokens: Arc<dyn TokenProvider> = Arc::new(CredentialCache::new(Arc::new(credentials)));

    let sources: Vec<Arc<dyn EventSource>> = vec![
        Arc::new(SignInClient::new(tokens.clone(), config.graph_base_url.clone())),
        Arc::new(SecurityAlertClient::new(
            tokens.clone(),
            config.graph_base_url.clone(),
        )),
        Arc::new(AuditLogClient::new(
            tokens.clone(),
            config.management_base_url.clone(),
        )),
    ];

    let sink = Arc::new(HttpLogSink::new(
        tokens.clone(),
        env.tenant_id.clone(),
        env.sink_endpoint.clone(),
        env.sink_rule_id.clone(),
        env.sink_stream.clone(),
    ));
    let notifier = Arc::new(WebhookNotifier::new(config.alerts.clone()));
    let catalog = RuleCatalog::new(config.rules_dir.clone());

    let orchestrator = Arc::new(PollOrchestrator::new(
        store.clone(),
        state,
        sources,
        sink,
        notifier,
        catalog,
        config.run_history_retention_days,
    ));

    let scheduler = PollScheduler::new(orchestrator, config.poll_interval_secs);
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run().await;
    });

    // Read-only status API
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = api::build_router(api::ApiState {
        store: store.clone(),
        start_time: Utc::now(),
    });
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, app);

    tracing::info!(http = %http_addr, "Server started");

    tokio::select! {
        result = http_server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    scheduler_handle.abort();
    tracing::info!("Server stopped");

    Ok(())
}
