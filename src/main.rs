use anyhow::Context;
use equity_ledger::{api, config::Config, db::init_db, JsonRpcLedger, LedgerClient, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("failed to initialize database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let ledger: Arc<dyn LedgerClient> = Arc::new(JsonRpcLedger::new(config.ledger_rpc_url.clone()));
    let state = api::AppState::new(repo.clone(), config, ledger);

    // Writes left unresolved by a previous run.
    let pending = repo.in_flight_entries().await?;
    if !pending.is_empty() {
        tracing::warn!(count = pending.len(), "unresolved writes in journal; reconcile to resolve");
    }

    let app = api::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
