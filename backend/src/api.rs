//! REST API
//!
//! Read-only endpoints over the cached snapshot, the historical range rows and
//! provider diagnostics.

use crate::{
    error::{Result, SignalError},
    gateway::ProviderGateway,
    history::{self, HistoryService},
    snapshot::SnapshotService,
    types::{HistoricalDay, ProviderHealth, Snapshot},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub snapshots: Arc<SnapshotService>,
    pub history: Arc<HistoryService>,
    pub gateway: Arc<ProviderGateway>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Dashboard data
        .route("/api/all", get(get_all))
        .route("/api/historical", get(get_historical))

        // Health endpoints
        .route("/api/health", get(health_check))
        .route("/api/health/providers", get(provider_health))

        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// DASHBOARD ENDPOINTS
// ============================================================================

/// GET /api/all
///
/// Latest snapshot: price, portfolio, indicators and composite score.
/// 503 only before the first snapshot was ever built.
async fn get_all(State(state): State<AppState>) -> Result<Json<Snapshot>> {
    let snapshot = state.snapshots.latest().await?;
    Ok(Json(snapshot))
}

/// GET /api/historical
///
/// Daily price and sentiment rows.
///
/// Query params: ?days=N (1..=365, default 30)
async fn get_historical(
    State(state): State<AppState>,
    Query(params): Query<HistoricalQuery>,
) -> Json<HistoricalResponse> {
    let days = history::parse_days(params.days.as_deref());
    info!("Historical range requested for {} days", days);

    Json(HistoricalResponse {
        data: state.history.range(days).await,
    })
}

// ============================================================================
// HEALTH ENDPOINTS
// ============================================================================

/// GET /api/health
///
/// Liveness plus the age of the cached snapshot
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    let updated_at = state.snapshots.last_refreshed();

    Json(HealthResponse {
        success: true,
        status: "ok",
        snapshot_updated_at: updated_at,
        snapshot_age_seconds: updated_at.map(|t| (now - t).num_seconds()),
        timestamp: now.timestamp(),
    })
}

/// GET /api/health/providers
///
/// Per-provider attempt counters since startup
async fn provider_health(State(state): State<AppState>) -> Json<ProviderHealthResponse> {
    Json(ProviderHealthResponse {
        success: true,
        data: state.gateway.provider_health(),
    })
}

// ============================================================================
// REQUEST/RESPONSE TYPES
// ============================================================================

/// Kept as a string so a malformed value falls back to the default
#[derive(Debug, Deserialize)]
pub struct HistoricalQuery {
    pub days: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoricalResponse {
    pub data: Vec<HistoricalDay>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub snapshot_updated_at: Option<DateTime<Utc>>,
    pub snapshot_age_seconds: Option<i64>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ProviderHealthResponse {
    pub success: bool,
    pub data: Vec<ProviderHealth>,
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        let status = match &self {
            SignalError::NoData(_) | SignalError::Exhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            SignalError::ProviderFailed { .. }
            | SignalError::Timeout { .. }
            | SignalError::Http(_)
            | SignalError::ParseError(_) => StatusCode::BAD_GATEWAY,
            SignalError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientTimeouts, PortfolioConfig, ProviderOrder};
    use crate::http_client::testing::StaticFetcher;
    use crate::scoring::WeightTable;
    use crate::series_cache::HistoricalSeriesCache;
    use crate::snapshot::SnapshotAssembler;
    use serde_json::json;
    use std::time::Duration;

    fn state(fetcher: StaticFetcher) -> AppState {
        let gateway = Arc::new(
            ProviderGateway::new(&ProviderOrder::default(), ClientTimeouts::default(), Arc::new(fetcher))
                .unwrap(),
        );
        let series = Arc::new(HistoricalSeriesCache::new(gateway.clone(), Duration::from_secs(1800)));
        let assembler = SnapshotAssembler::new(
            gateway.clone(),
            series,
            WeightTable::default(),
            PortfolioConfig::default(),
        );

        AppState {
            snapshots: Arc::new(SnapshotService::new(assembler, Duration::from_secs(60))),
            history: Arc::new(HistoryService::new(gateway.clone(), Duration::from_secs(3600))),
            gateway,
        }
    }

    #[tokio::test]
    async fn test_cold_start_failure_is_503() {
        let response = get_all(State(state(StaticFetcher::new()))).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_snapshot_served() {
        let fetcher = StaticFetcher::new().json(
            "api.binance.com/api/v3/ticker",
            json!({"lastPrice": "65000", "quoteVolume": "1", "priceChangePercent": "0"}),
        );
        let state = state(fetcher);

        let Json(snapshot) = get_all(State(state.clone())).await.unwrap();
        assert_eq!(snapshot.portfolio.pnl_usd, rust_decimal::Decimal::from(-184_616));

        let Json(health) = health_check(State(state.clone())).await;
        assert!(health.snapshot_updated_at.is_some());

        let Json(providers) = provider_health(State(state)).await;
        assert!(providers.data.iter().any(|p| p.provider == "binance" && p.successes == 1));
    }

    #[tokio::test]
    async fn test_historical_cold_failure_is_empty_list() {
        let Json(response) = get_historical(
            State(state(StaticFetcher::new())),
            Query(HistoricalQuery {
                days: Some("abc".into()),
            }),
        )
        .await;

        assert!(response.data.is_empty());
        assert_eq!(serde_json::to_value(&response).unwrap(), json!({"data": []}));
    }

    #[test]
    fn test_error_status_codes() {
        let response = SignalError::NoData("nothing".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = SignalError::provider("kraken", "boom").into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
