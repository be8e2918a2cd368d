//! HTTP handlers for the item master

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::models::InventoryItem;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::item::{
    CacheReconciliation, CreateItemInput, ItemService, SetWarehouseThresholdInput, UpdateItemInput,
};
use crate::AppState;

/// Create an inventory item
pub async fn create_item(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Json(input): Json<CreateItemInput>,
) -> AppResult<Json<InventoryItem>> {
    let service = ItemService::new(state.db);
    let item = service.create_item(input).await?;
    Ok(Json(item))
}

/// Update an inventory item
pub async fn update_item(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateItemInput>,
) -> AppResult<Json<InventoryItem>> {
    let service = ItemService::new(state.db);
    let item = service.update_item(item_id, input).await?;
    Ok(Json(item))
}

/// Get an item
pub async fn get_item(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<InventoryItem>> {
    let service = ItemService::new(state.db);
    let item = service.get_item(item_id).await?;
    Ok(Json(item))
}

/// Query parameters for listing items
#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub category: Option<String>,
}

/// List items
pub async fn list_items(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<ItemQuery>,
) -> AppResult<Json<Vec<InventoryItem>>> {
    let service = ItemService::new(state.db);
    let items = service.list_items(query.category).await?;
    Ok(Json(items))
}

/// Set per-warehouse threshold overrides for an item
pub async fn set_warehouse_thresholds(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((item_id, warehouse_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<SetWarehouseThresholdInput>,
) -> AppResult<Json<()>> {
    let service = ItemService::new(state.db);
    service
        .set_warehouse_thresholds(item_id, warehouse_id, input)
        .await?;
    Ok(Json(()))
}

/// Recompute the item's denormalized stock cache from its balances
pub async fn reconcile_item_cache(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<CacheReconciliation>> {
    let service = ItemService::new(state.db);
    let reconciliation = service.reconcile_cache(item_id).await?;
    Ok(Json(reconciliation))
}
