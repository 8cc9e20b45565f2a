use crate::api::AppState;
use crate::error::AppError;
use crate::gateway::UserHoldingView;
use crate::portfolio::PortfolioView;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct HoldingQuery {
    pub asset: String,
    pub user: String,
}

pub async fn get_holding(
    Query(params): Query<HoldingQuery>,
    State(state): State<AppState>,
) -> Result<Json<UserHoldingView>, AppError> {
    Ok(Json(
        state
            .query
            .user_holding_view(&params.asset, &params.user)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct PortfolioQuery {
    pub user: String,
    /// Comma-separated asset addresses; every registered asset when absent.
    pub assets: Option<String>,
}

pub async fn get_portfolio(
    Query(params): Query<PortfolioQuery>,
    State(state): State<AppState>,
) -> Result<Json<PortfolioView>, AppError> {
    let view = match params.assets.as_deref() {
        Some(list) => {
            let ids: Vec<&str> = list.split(',').map(str::trim).collect();
            state.portfolio.portfolio_for(&params.user, &ids).await?
        }
        None => state.portfolio.portfolio_for_all(&params.user).await?,
    };
    Ok(Json(view))
}
