//! HTTP handlers for goods-receipt endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use shared::models::{Invoice, Payment, Purchase};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::receiving::{CreatePurchaseInput, PurchaseWithLines, ReceivingService};
use crate::AppState;

/// Create a purchase order
pub async fn create_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreatePurchaseInput>,
) -> AppResult<Json<PurchaseWithLines>> {
    let service = ReceivingService::new(state.db);
    let purchase = service
        .create_purchase(Some(current_user.0.user_id), input)
        .await?;
    Ok(Json(purchase))
}

/// Receive a purchase (restock + invoice + optional payment)
pub async fn receive_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseWithLines>> {
    let service = ReceivingService::new(state.db);
    let purchase = service
        .receive(Some(current_user.0.user_id), purchase_id)
        .await?;
    Ok(Json(purchase))
}

/// Cancel a purchase, reversing the stock if it was received
pub async fn cancel_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseWithLines>> {
    let service = ReceivingService::new(state.db);
    let purchase = service
        .cancel(Some(current_user.0.user_id), purchase_id)
        .await?;
    Ok(Json(purchase))
}

/// Get a purchase with its lines
pub async fn get_purchase(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseWithLines>> {
    let service = ReceivingService::new(state.db);
    let purchase = service.get_purchase(purchase_id).await?;
    Ok(Json(purchase))
}

/// List purchases
pub async fn list_purchases(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<Purchase>>> {
    let service = ReceivingService::new(state.db);
    let purchases = service.list_purchases().await?;
    Ok(Json(purchases))
}

/// Documents created by a receipt
#[derive(Serialize)]
pub struct PurchaseDocuments {
    pub invoices: Vec<Invoice>,
    pub payments: Vec<Payment>,
}

/// Invoice and payment records for a purchase
pub async fn get_purchase_documents(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseDocuments>> {
    let service = ReceivingService::new(state.db);
    let (invoices, payments) = service.purchase_documents(purchase_id).await?;
    Ok(Json(PurchaseDocuments { invoices, payments }))
}
