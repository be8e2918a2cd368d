//! Route definitions for the Restaurant Management Platform

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - warehouse registry
        .nest("/warehouses", warehouse_routes())
        // Protected routes - item master
        .nest("/items", item_routes())
        // Protected routes - stock ledger
        .nest("/stock", stock_routes())
        // Protected routes - alert engine
        .nest("/alerts", alert_routes())
        // Protected routes - count sessions
        .nest("/counts", count_routes())
        // Protected routes - transfers
        .nest("/transfers", transfer_routes())
        // Protected routes - purchases / goods receipt
        .nest("/purchases", purchase_routes())
}

/// Warehouse registry routes (protected)
fn warehouse_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_warehouses).post(handlers::create_warehouse),
        )
        .route(
            "/:warehouse_id",
            get(handlers::get_warehouse).put(handlers::update_warehouse),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Item master routes (protected)
fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_items).post(handlers::create_item))
        .route(
            "/:item_id",
            get(handlers::get_item).put(handlers::update_item),
        )
        .route(
            "/:item_id/thresholds/:warehouse_id",
            put(handlers::set_warehouse_thresholds),
        )
        .route("/:item_id/reconcile", post(handlers::reconcile_item_cache))
        .route("/:item_id/balances", get(handlers::list_item_balances))
        .route("/:item_id/alerts", get(handlers::item_alerts))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Stock ledger routes (protected)
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/movements", post(handlers::apply_movement))
        .route(
            "/balances/:item_id/:warehouse_id",
            get(handlers::get_balance),
        )
        .route(
            "/movements/:item_id/:warehouse_id",
            get(handlers::movement_history),
        )
        .route(
            "/layers/:item_id/:warehouse_id",
            get(handlers::layer_summary),
        )
        .route(
            "/valuation/:warehouse_id",
            get(handlers::warehouse_valuation),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Alert engine routes (protected)
fn alert_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_alerts))
        .route("/recalculate", post(handlers::recalculate_alerts))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Count session routes (protected)
fn count_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_counts).post(handlers::create_count))
        .route("/:count_id", get(handlers::get_count))
        .route("/:count_id/start", post(handlers::start_count))
        .route("/:count_id/rounds", post(handlers::submit_count_round))
        .route("/:count_id/ready", post(handlers::ready_count))
        .route("/:count_id/approve", post(handlers::approve_count))
        .route("/:count_id/close", post(handlers::close_count))
        .route("/:count_id/cancel", post(handlers::cancel_count))
        .route("/:count_id/variance", get(handlers::count_variance))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Transfer workflow routes (protected)
fn transfer_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_transfers).post(handlers::create_transfer),
        )
        .route("/:transfer_id", get(handlers::get_transfer))
        .route("/:transfer_id/dispatch", post(handlers::dispatch_transfer))
        .route("/:transfer_id/complete", post(handlers::complete_transfer))
        .route("/:transfer_id/cancel", post(handlers::cancel_transfer))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Purchase / goods-receipt routes (protected)
fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_purchases).post(handlers::create_purchase),
        )
        .route("/:purchase_id", get(handlers::get_purchase))
        .route("/:purchase_id/receive", post(handlers::receive_purchase))
        .route("/:purchase_id/cancel", post(handlers::cancel_purchase))
        .route(
            "/:purchase_id/documents",
            get(handlers::get_purchase_documents),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}
