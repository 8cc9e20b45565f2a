use crate::api::AppState;
use crate::error::{AppError, DomainError};
use crate::gateway::{
    AssetDetailsView, CompanyValuationView, PlatformSnapshotView, TradingStatsView,
    TradingStatusView, TransactionOutcome, TransactionOutcomeView,
};
use crate::portfolio::PlatformAnalytics;
use crate::workflow::{CompanyInfo, IssuanceReport, IssuanceStatus};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformResponse {
    pub snapshot: PlatformSnapshotView,
    pub analytics: PlatformAnalytics,
}

pub async fn get_platform(
    State(state): State<AppState>,
) -> Result<Json<PlatformResponse>, AppError> {
    let (snapshot, analytics) = state.portfolio.platform().await?;
    Ok(Json(PlatformResponse {
        snapshot: PlatformSnapshotView::from(&snapshot),
        analytics,
    }))
}

pub async fn get_valuation(
    Path(company_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CompanyValuationView>, AppError> {
    let valuation = state.query.company_valuation(&company_id).await?;
    if !valuation.exists {
        return Err(DomainError::ValuationNotFound.into());
    }
    Ok(Json(CompanyValuationView::from(&valuation)))
}

pub async fn list_assets(
    State(state): State<AppState>,
) -> Result<Json<Vec<AssetDetailsView>>, AppError> {
    let assets = state.query.all_assets().await?;
    let details = state.query.fetch_batch_asset_details(&assets).await?;
    Ok(Json(details.iter().map(AssetDetailsView::from).collect()))
}

pub async fn get_asset(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AssetDetailsView>, AppError> {
    Ok(Json(state.query.asset_details_view(&asset_id).await?))
}

pub async fn get_status(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TradingStatusView>, AppError> {
    Ok(Json(state.query.trading_status_view(&asset_id).await?))
}

pub async fn get_stats(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TradingStatsView>, AppError> {
    Ok(Json(state.query.trading_stats_view(&asset_id).await?))
}

// =============================================================================
// Writes
// =============================================================================

fn outcome_json(state: &AppState, outcome: &TransactionOutcome) -> Json<TransactionOutcomeView> {
    Json(TransactionOutcomeView::new(
        outcome,
        state.config.numeric.share_decimals,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationRequest {
    pub company_id: String,
    pub valuation: String,
    pub initial_price: String,
    pub evaluator: String,
}

pub async fn post_valuation(
    State(state): State<AppState>,
    Json(req): Json<ValuationRequest>,
) -> Result<(StatusCode, Json<TransactionOutcomeView>), AppError> {
    let outcome = state
        .workflow
        .submit_valuation(
            &req.company_id,
            &req.valuation,
            &req.initial_price,
            &req.evaluator,
        )
        .await?;
    Ok((StatusCode::CREATED, outcome_json(&state, &outcome)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetRequest {
    pub company_id: String,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceResponse {
    pub company_id: String,
    pub asset: Option<String>,
    pub creation: TransactionOutcomeView,
    pub activation: Option<TransactionOutcomeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_error: Option<ErrorBody>,
    pub status: IssuanceStatus,
}

impl IssuanceResponse {
    fn new(report: &IssuanceReport, share_decimals: u8) -> Self {
        Self {
            company_id: report.company_id.to_string(),
            asset: report.asset.as_ref().map(crate::domain::address_hex),
            creation: TransactionOutcomeView::new(&report.creation, share_decimals),
            activation: report
                .activation
                .as_ref()
                .map(|o| TransactionOutcomeView::new(o, share_decimals)),
            activation_error: report.activation_error.as_ref().map(|e| ErrorBody {
                error: e.to_string(),
                kind: e.kind(),
            }),
            status: report.status,
        }
    }
}

/// Creates and activates the company's asset.
///
/// Responds 201 when both steps finalized and 202 when the asset exists but
/// still needs reconciliation.
pub async fn post_asset(
    State(state): State<AppState>,
    Json(req): Json<CreateAssetRequest>,
) -> Result<(StatusCode, Json<IssuanceResponse>), AppError> {
    let report = state
        .workflow
        .create_asset(
            &req.company_id,
            CompanyInfo {
                name: req.name,
                symbol: req.symbol,
            },
        )
        .await?;
    let status = if report.is_complete() {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };
    Ok((
        status,
        Json(IssuanceResponse::new(
            &report,
            state.config.numeric.share_decimals,
        )),
    ))
}

pub async fn post_activate(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionOutcomeView>, AppError> {
    let outcome = state.workflow.activate(&asset_id).await?;
    Ok(outcome_json(&state, &outcome))
}

pub async fn post_deactivate(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionOutcomeView>, AppError> {
    let outcome = state.workflow.deactivate(&asset_id).await?;
    Ok(outcome_json(&state, &outcome))
}

pub async fn post_pause(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionOutcomeView>, AppError> {
    let outcome = state.workflow.pause(&asset_id).await?;
    Ok(outcome_json(&state, &outcome))
}

pub async fn post_unpause(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionOutcomeView>, AppError> {
    let outcome = state.workflow.unpause(&asset_id).await?;
    Ok(outcome_json(&state, &outcome))
}

pub async fn post_withdraw_fees(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionOutcomeView>, AppError> {
    let outcome = state.workflow.withdraw_fees(&asset_id).await?;
    Ok(outcome_json(&state, &outcome))
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub price: String,
}

pub async fn post_price(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<PriceRequest>,
) -> Result<Json<TransactionOutcomeView>, AppError> {
    let outcome = state.workflow.update_price(&asset_id, &req.price).await?;
    Ok(outcome_json(&state, &outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeesRequest {
    pub buy_fee_rate: String,
    pub sell_fee_rate: String,
}

pub async fn post_fees(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<FeesRequest>,
) -> Result<Json<TransactionOutcomeView>, AppError> {
    let outcome = state
        .workflow
        .update_fees(&asset_id, &req.buy_fee_rate, &req.sell_fee_rate)
        .await?;
    Ok(outcome_json(&state, &outcome))
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: String,
}

pub async fn post_company_withdraw(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<TransactionOutcomeView>, AppError> {
    let outcome = state
        .workflow
        .company_withdraw(&asset_id, &req.amount)
        .await?;
    Ok(outcome_json(&state, &outcome))
}

pub async fn post_buy(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<TransactionOutcomeView>, AppError> {
    let outcome = state.workflow.buy(&asset_id, &req.amount).await?;
    Ok(outcome_json(&state, &outcome))
}

pub async fn post_sell(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<TransactionOutcomeView>, AppError> {
    let outcome = state.workflow.sell(&asset_id, &req.amount).await?;
    Ok(outcome_json(&state, &outcome))
}
