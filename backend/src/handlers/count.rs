//! HTTP handlers for count session endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use shared::models::InventoryCount;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::count::{
    ApproveCountInput, CountService, CountWithItems, CreateCountInput, SubmitRoundInput,
    VarianceLine,
};
use crate::AppState;

/// Create a count session
pub async fn create_count(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateCountInput>,
) -> AppResult<Json<CountWithItems>> {
    let service = CountService::new(state.db);
    let count = service
        .create_count(Some(current_user.0.user_id), input)
        .await?;
    Ok(Json(count))
}

/// Start counting
pub async fn start_count(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(count_id): Path<Uuid>,
) -> AppResult<Json<CountWithItems>> {
    let service = CountService::new(state.db);
    let count = service.start(count_id).await?;
    Ok(Json(count))
}

/// Submit a counting round for one line
pub async fn submit_count_round(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(count_id): Path<Uuid>,
    Json(input): Json<SubmitRoundInput>,
) -> AppResult<Json<CountWithItems>> {
    let service = CountService::new(state.db);
    let count = service
        .submit_round(current_user.0.user_id, count_id, input)
        .await?;
    Ok(Json(count))
}

/// Mark a session ready for approval
pub async fn ready_count(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(count_id): Path<Uuid>,
) -> AppResult<Json<CountWithItems>> {
    let service = CountService::new(state.db);
    let count = service.ready(count_id).await?;
    Ok(Json(count))
}

/// Approve a session, freezing system quantities
pub async fn approve_count(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(count_id): Path<Uuid>,
    Json(input): Json<ApproveCountInput>,
) -> AppResult<Json<CountWithItems>> {
    let service = CountService::new(state.db);
    let count = service
        .approve(Some(current_user.0.user_id), count_id, input)
        .await?;
    Ok(Json(count))
}

/// Close an approved session
pub async fn close_count(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(count_id): Path<Uuid>,
) -> AppResult<Json<CountWithItems>> {
    let service = CountService::new(state.db);
    let count = service.close(count_id).await?;
    Ok(Json(count))
}

/// Cancel a pre-approval session
pub async fn cancel_count(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(count_id): Path<Uuid>,
) -> AppResult<Json<CountWithItems>> {
    let service = CountService::new(state.db);
    let count = service.cancel(count_id).await?;
    Ok(Json(count))
}

/// Get a session with its lines
pub async fn get_count(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(count_id): Path<Uuid>,
) -> AppResult<Json<CountWithItems>> {
    let service = CountService::new(state.db);
    let count = service.get_count(count_id).await?;
    Ok(Json(count))
}

/// List sessions
pub async fn list_counts(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<InventoryCount>>> {
    let service = CountService::new(state.db);
    let counts = service.list_counts().await?;
    Ok(Json(counts))
}

/// Variance report for a session
pub async fn count_variance(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(count_id): Path<Uuid>,
) -> AppResult<Json<Vec<VarianceLine>>> {
    let service = CountService::new(state.db);
    let variance = service.variance_report(count_id).await?;
    Ok(Json(variance))
}
