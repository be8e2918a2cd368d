//! HTTP handlers for transfer workflow endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use shared::models::Transfer;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::transfer::{CreateTransferInput, TransferService, TransferWithLines};
use crate::AppState;

/// Create a transfer
pub async fn create_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateTransferInput>,
) -> AppResult<Json<TransferWithLines>> {
    let service = TransferService::new(state.db);
    let transfer = service
        .create_transfer(Some(current_user.0.user_id), input)
        .await?;
    Ok(Json(transfer))
}

/// Dispatch a pending transfer
pub async fn dispatch_transfer(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<TransferWithLines>> {
    let service = TransferService::new(state.db);
    let transfer = service.dispatch(transfer_id).await?;
    Ok(Json(transfer))
}

/// Complete an in-transit transfer, posting the paired movements
pub async fn complete_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<TransferWithLines>> {
    let service = TransferService::new(state.db);
    let transfer = service
        .complete(Some(current_user.0.user_id), transfer_id)
        .await?;
    Ok(Json(transfer))
}

/// Cancel a transfer that is not completed
pub async fn cancel_transfer(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<TransferWithLines>> {
    let service = TransferService::new(state.db);
    let transfer = service.cancel(transfer_id).await?;
    Ok(Json(transfer))
}

/// Get a transfer with its lines
pub async fn get_transfer(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<TransferWithLines>> {
    let service = TransferService::new(state.db);
    let transfer = service.get_transfer(transfer_id).await?;
    Ok(Json(transfer))
}

/// List transfers
pub async fn list_transfers(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<Transfer>>> {
    let service = TransferService::new(state.db);
    let transfers = service.list_transfers().await?;
    Ok(Json(transfers))
}
