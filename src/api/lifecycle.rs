use crate::api::AppState;
use crate::error::AppError;
use crate::workflow::LifecycleReport;
use axum::extract::{Path, State};
use axum::Json;

pub async fn get_lifecycle(
    Path(company_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LifecycleReport>, AppError> {
    Ok(Json(state.workflow.inspect(&company_id).await?))
}

/// Resolves unresolved writes and retries a missing activation.
pub async fn post_reconcile(
    Path(company_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LifecycleReport>, AppError> {
    Ok(Json(state.workflow.reconcile(&company_id).await?))
}
