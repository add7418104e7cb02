use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use screener_core::indicators::EmaPeriod;
use screener_runner::{
    query, number_rows, PipelineStatus, QueryParams, QueryResponse, SortDirection, SortField,
    SummaryCache, DEFAULT_BAND_PCT,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

const NO_DATA_MESSAGE: &str = "No EMA data available. Run setup first.";

/// Build read-only data sub-router.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ema-data", get(ema_data))
        .route("/api/filtered-data", get(filtered_data))
        .route("/api/status", get(status))
}

#[derive(Debug, Default, Deserialize)]
pub struct EmaDataQuery {
    pub ema_filter: Option<String>,
    pub band_percentage: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilteredDataQuery {
    pub ema_filter: Option<String>,
    pub band_percentage: Option<f64>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
}

/// `all` (or nothing) means no band filter.
fn parse_filter(raw: Option<&str>) -> Result<Option<EmaPeriod>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(ApiError::BadRequest),
    }
}

fn parse_band(raw: Option<f64>) -> Result<f64, ApiError> {
    let band = raw.unwrap_or(DEFAULT_BAND_PCT);
    if band.is_finite() && band > 0.0 {
        Ok(band)
    } else {
        Err(ApiError::BadRequest(format!(
            "band_percentage must be a positive number, got {band}"
        )))
    }
}

/// Summary cache snapshot, read off the async runtime.
async fn load_cache(state: &Arc<AppState>) -> Result<SummaryCache, ApiError> {
    let st = Arc::clone(state);
    Ok(tokio::task::spawn_blocking(move || st.summary()).await?)
}

/// GET /api/ema-data: band-filtered rows with aggregate statistics.
async fn ema_data(
    State(state): State<Arc<AppState>>,
    Query(q): Query<EmaDataQuery>,
) -> Result<Json<Value>, ApiError> {
    let params = QueryParams {
        filter: parse_filter(q.ema_filter.as_deref())?,
        band_pct: parse_band(q.band_percentage)?,
        ..QueryParams::default()
    };

    let cache = load_cache(&state).await?;
    if cache.is_empty() {
        return Ok(Json(json!({
            "status": "no_data",
            "message": NO_DATA_MESSAGE,
            "data": [],
        })));
    }

    let response = QueryResponse::new(query(&cache, &params), &params);
    Ok(Json(json!({
        "status": "success",
        "data": response.data,
        "summary": response.summary,
    })))
}

/// GET /api/filtered-data: band filter plus search and sort.
async fn filtered_data(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FilteredDataQuery>,
) -> Result<Json<Value>, ApiError> {
    let sort: SortField = q
        .sort
        .as_deref()
        .unwrap_or("SYMBOL")
        .parse()
        .map_err(ApiError::BadRequest)?;
    let direction: SortDirection = match q.order.as_deref() {
        Some(order) => order.parse().map_err(ApiError::BadRequest)?,
        None => SortDirection::Asc,
    };
    let params = QueryParams {
        filter: parse_filter(q.ema_filter.as_deref())?,
        band_pct: parse_band(q.band_percentage)?,
        sort: Some(sort),
        direction,
        search: q.search,
    };

    let cache = load_cache(&state).await?;
    if cache.is_empty() {
        return Ok(Json(json!({
            "status": "no_data",
            "message": NO_DATA_MESSAGE,
            "data": [],
        })));
    }

    let data = number_rows(query(&cache, &params));
    Ok(Json(json!({
        "status": "success",
        "total_filtered": data.len(),
        "data": data,
    })))
}

/// GET /api/status: cache, checkpoint and manifest overview.
async fn status(State(state): State<Arc<AppState>>) -> Result<Json<PipelineStatus>, ApiError> {
    let st = Arc::clone(&state);
    let status = tokio::task::spawn_blocking(move || PipelineStatus::gather(st.config())).await?;
    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_parsing() {
        assert_eq!(parse_filter(None).unwrap(), None);
        assert_eq!(parse_filter(Some("all")).unwrap(), None);
        assert_eq!(parse_filter(Some("ALL")).unwrap(), None);
        assert_eq!(parse_filter(Some("100")).unwrap(), Some(EmaPeriod::P100));
        assert!(matches!(parse_filter(Some("60")), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn band_parsing() {
        assert_eq!(parse_band(None).unwrap(), 2.5);
        assert_eq!(parse_band(Some(1.0)).unwrap(), 1.0);
        assert!(parse_band(Some(0.0)).is_err());
        assert!(parse_band(Some(-2.0)).is_err());
    }
}
