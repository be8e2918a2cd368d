//! HTTP handlers for stock alert endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::models::{AlertStatus, StockAlert};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::AlertService;
use crate::AppState;

/// Query parameters for listing alerts
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub status: Option<AlertStatus>,
    pub warehouse_id: Option<Uuid>,
}

/// List alerts, filtered by status and/or warehouse
pub async fn list_alerts(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<AlertQuery>,
) -> AppResult<Json<Vec<StockAlert>>> {
    let service = AlertService::new(state.db);
    let alerts = service.list_alerts(query.status, query.warehouse_id).await?;
    Ok(Json(alerts))
}

/// Active alerts for one item
pub async fn item_alerts(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<Vec<StockAlert>>> {
    let service = AlertService::new(state.db);
    let alerts = service.item_alerts(item_id).await?;
    Ok(Json(alerts))
}

/// Response for a completed sweep
#[derive(Serialize)]
pub struct RecalculateResponse {
    pub keys_evaluated: u64,
}

/// Run the full alert sweep
pub async fn recalculate_alerts(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<RecalculateResponse>> {
    let service = AlertService::new(state.db);
    let keys_evaluated = service.recalculate().await?;
    Ok(Json(RecalculateResponse { keys_evaluated }))
}
