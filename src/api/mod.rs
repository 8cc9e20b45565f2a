pub mod assets;
pub mod health;
pub mod lifecycle;
pub mod portfolio;

use crate::config::Config;
use crate::db::Repository;
use crate::gateway::{LedgerQueryGateway, LedgerTransactionGateway};
use crate::ledger::LedgerClient;
use crate::portfolio::PortfolioAggregator;
use crate::workflow::AssetLifecycleWorkflow;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub query: LedgerQueryGateway,
    pub workflow: Arc<AssetLifecycleWorkflow>,
    pub portfolio: PortfolioAggregator,
}

impl AppState {
    /// Wires the gateways, workflow and aggregator over one ledger client.
    pub fn new(repo: Arc<Repository>, config: Config, client: Arc<dyn LedgerClient>) -> Self {
        let query = LedgerQueryGateway::new(client.clone(), config.registry_address, config.numeric);
        let transactions = Arc::new(LedgerTransactionGateway::new(
            client,
            config.registry_address,
            config.signer_address,
            config.numeric,
            config.finalization,
            repo.clone(),
        ));
        let workflow = Arc::new(AssetLifecycleWorkflow::new(query.clone(), transactions));
        let portfolio = PortfolioAggregator::new(query.clone());
        Self {
            repo,
            config,
            query,
            workflow,
            portfolio,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/platform", get(assets::get_platform))
        .route("/v1/valuations", post(assets::post_valuation))
        .route("/v1/valuations/:company_id", get(assets::get_valuation))
        .route(
            "/v1/assets",
            get(assets::list_assets).post(assets::post_asset),
        )
        .route("/v1/assets/:asset_id", get(assets::get_asset))
        .route("/v1/assets/:asset_id/status", get(assets::get_status))
        .route("/v1/assets/:asset_id/stats", get(assets::get_stats))
        .route("/v1/assets/:asset_id/activate", post(assets::post_activate))
        .route(
            "/v1/assets/:asset_id/deactivate",
            post(assets::post_deactivate),
        )
        .route("/v1/assets/:asset_id/pause", post(assets::post_pause))
        .route("/v1/assets/:asset_id/unpause", post(assets::post_unpause))
        .route("/v1/assets/:asset_id/price", post(assets::post_price))
        .route("/v1/assets/:asset_id/fees", post(assets::post_fees))
        .route(
            "/v1/assets/:asset_id/withdraw-fees",
            post(assets::post_withdraw_fees),
        )
        .route(
            "/v1/assets/:asset_id/company-withdraw",
            post(assets::post_company_withdraw),
        )
        .route("/v1/assets/:asset_id/buy", post(assets::post_buy))
        .route("/v1/assets/:asset_id/sell", post(assets::post_sell))
        .route("/v1/holdings", get(portfolio::get_holding))
        .route("/v1/portfolio", get(portfolio::get_portfolio))
        .route("/v1/lifecycle/:company_id", get(lifecycle::get_lifecycle))
        .route(
            "/v1/lifecycle/:company_id/reconcile",
            post(lifecycle::post_reconcile),
        )
        .layer(cors)
        .with_state(state)
}
