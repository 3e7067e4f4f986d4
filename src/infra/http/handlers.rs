//! Report handlers: pull the authenticated identity, delegate to the
//! service, map errors to API responses.

use axum::Json;
use axum::extract::{Extension, State};
use axum::response::IntoResponse;

use crate::application::auth::Identity;
use crate::application::reports::ReportError;
use crate::domain::reports::ReportRange;

use super::error::ApiError;
use super::state::AppState;

pub async fn stock_report(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .reports
        .stock_report(&identity)
        .await
        .map_err(report_to_api)?;
    Ok(Json(report))
}

pub async fn movements_report(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(range): Json<ReportRange>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .reports
        .movements_report(&identity, range)
        .await
        .map_err(report_to_api)?;
    Ok(Json(report))
}

pub async fn orders_report(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(range): Json<ReportRange>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .reports
        .orders_report(&identity, range)
        .await
        .map_err(report_to_api)?;
    Ok(Json(report))
}

/// Liveness probe. Deliberately plain text: also exercises the capture
/// middleware's skip path for non-JSON bodies.
pub async fn health() -> &'static str {
    "ok"
}

fn report_to_api(err: ReportError) -> ApiError {
    match err {
        ReportError::InvalidRange(detail) => ApiError::invalid_range(detail),
        ReportError::Repo(repo) => ApiError::upstream_query(repo.to_string()),
    }
}
