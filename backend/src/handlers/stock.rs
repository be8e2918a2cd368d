//! HTTP handlers for the stock ledger endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::models::StockMovement;
use shared::types::{DateRange, PaginatedResponse, Pagination};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::stock_ledger::{
    AppliedMovement, ApplyMovementInput, BalanceSnapshot, LayerSummary, StockLedgerService,
    WarehouseValuation,
};
use crate::AppState;

/// Apply a stock movement
pub async fn apply_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ApplyMovementInput>,
) -> AppResult<Json<AppliedMovement>> {
    let service = StockLedgerService::new(state.db);
    let applied = service
        .apply_movement(Some(current_user.0.user_id), input)
        .await?;
    Ok(Json(applied))
}

/// Get the balance for one (item, warehouse) key
pub async fn get_balance(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((item_id, warehouse_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<BalanceSnapshot>> {
    let service = StockLedgerService::new(state.db);
    let balance = service.get_balance(item_id, warehouse_id).await?;
    Ok(Json(balance))
}

/// All per-warehouse balances for an item
pub async fn list_item_balances(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<Vec<BalanceSnapshot>>> {
    let service = StockLedgerService::new(state.db);
    let balances = service.list_item_balances(item_id).await?;
    Ok(Json(balances))
}

/// Query parameters for movement history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub start: Option<chrono::NaiveDate>,
    pub end: Option<chrono::NaiveDate>,
}

/// Ledger history for one (item, warehouse) key
pub async fn movement_history(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((item_id, warehouse_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<PaginatedResponse<StockMovement>>> {
    let defaults = Pagination::default();
    let pagination = Pagination {
        page: query.page.unwrap_or(defaults.page).max(1),
        per_page: query.per_page.unwrap_or(defaults.per_page).clamp(1, 500),
    };
    let range = match (query.start, query.end) {
        (Some(start), Some(end)) => Some(DateRange { start, end }),
        _ => None,
    };

    let service = StockLedgerService::new(state.db);
    let movements = service
        .movement_history(item_id, warehouse_id, pagination, range)
        .await?;
    Ok(Json(movements))
}

/// Open FIFO layers and layer-vs-balance drift for one key
pub async fn layer_summary(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((item_id, warehouse_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<LayerSummary>> {
    let service = StockLedgerService::new(state.db);
    let summary = service.layer_summary(item_id, warehouse_id).await?;
    Ok(Json(summary))
}

/// Valuation of a warehouse's current stock
pub async fn warehouse_valuation(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(warehouse_id): Path<Uuid>,
) -> AppResult<Json<WarehouseValuation>> {
    let service = StockLedgerService::new(state.db);
    let valuation = service.warehouse_valuation(warehouse_id).await?;
    Ok(Json(valuation))
}
