use axum::{extract::State, routing::post, Json, Router};
use screener_runner::DailyUpdateOutcome;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// Build pipeline-trigger sub-router.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/setup", post(run_setup))
        .route("/api/update-data", post(update_data))
}

/// Rejection for a trigger that arrives while another run is in flight.
fn busy() -> ApiError {
    ApiError::Busy("a pipeline run is already in progress".into())
}

/// POST /api/setup: full backfill and summary rebuild.
async fn run_setup(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let _guard = state.run_guard.try_lock().map_err(|_| busy())?;

    let st = Arc::clone(&state);
    let report = tokio::task::spawn_blocking(move || st.backfill()).await??;

    Ok(Json(json!({
        "status": "success",
        "message": format!(
            "Setup completed: {} downloaded, {} failed, {} summarized",
            report.downloaded,
            report.failed.len(),
            report.summarized
        ),
        "report": report,
    })))
}

/// POST /api/update-data: append today's bar if the market has closed.
async fn update_data(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let _guard = state.run_guard.try_lock().map_err(|_| busy())?;

    let st = Arc::clone(&state);
    let outcome = tokio::task::spawn_blocking(move || st.daily_update()).await??;

    let body = match outcome {
        DailyUpdateOutcome::Updated(report) => json!({
            "status": "success",
            "message": format!("Updated {} symbols with the latest market data", report.updated),
            "report": report,
        }),
        DailyUpdateOutcome::NotNeeded { reason } => json!({
            "status": "info",
            "message": format!("No update needed: {reason}"),
        }),
    };
    Ok(Json(body))
}
