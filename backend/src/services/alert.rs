//! Alert engine
//!
//! A batch sweep over balances that creates, refreshes and resolves
//! threshold alerts. `recalculate` is idempotent and safe to run at any
//! time; it matches on the (item, warehouse, alert type) key so re-running
//! it without intervening movements changes nothing. Resolved alerts are
//! kept for history, never deleted.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use shared::models::{
    evaluate_conditions, AlertSeverity, AlertStatus, AlertType, StockAlert, ThresholdOverride,
    Thresholds,
};

use crate::error::{AppError, AppResult};
use crate::services::fifo::FifoTracker;

/// Alert engine over the balance store
#[derive(Clone)]
pub struct AlertService {
    db: PgPool,
}

/// Database row for a stock alert
#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    item_id: Uuid,
    warehouse_id: Uuid,
    alert_type: String,
    severity: String,
    status: String,
    threshold: Option<Decimal>,
    quantity: Decimal,
    message: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<AlertRow> for StockAlert {
    type Error = AppError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let alert_type = AlertType::from_str(&row.alert_type).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Unknown alert type: {}", row.alert_type))
        })?;
        let severity = match row.severity.as_str() {
            "low" => AlertSeverity::Low,
            "medium" => AlertSeverity::Medium,
            "high" => AlertSeverity::High,
            "critical" => AlertSeverity::Critical,
            other => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Unknown alert severity: {}",
                    other
                )))
            }
        };
        let status = match row.status.as_str() {
            "active" => AlertStatus::Active,
            "resolved" => AlertStatus::Resolved,
            other => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Unknown alert status: {}",
                    other
                )))
            }
        };
        Ok(StockAlert {
            id: row.id,
            item_id: row.item_id,
            warehouse_id: row.warehouse_id,
            alert_type,
            severity,
            status,
            threshold: row.threshold,
            quantity: row.quantity,
            message: row.message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
        })
    }
}

impl AlertService {
    /// Create a new AlertService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Full sweep over every (item, warehouse) balance. Eventually
    /// consistent with concurrent movements: a movement applied mid-sweep
    /// is picked up by the next sweep or by its own post-commit refresh.
    pub async fn recalculate(&self) -> AppResult<u64> {
        let keys = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT item_id, warehouse_id FROM stock_balances",
        )
        .fetch_all(&self.db)
        .await?;

        let count = keys.len() as u64;
        for (item_id, warehouse_id) in keys {
            self.refresh_key(item_id, warehouse_id).await?;
        }

        tracing::debug!(keys = count, "Alert sweep completed");
        Ok(count)
    }

    /// Re-evaluate one key: upsert alerts whose condition holds, resolve
    /// the active ones whose condition stopped holding.
    pub async fn refresh_key(&self, item_id: Uuid, warehouse_id: Uuid) -> AppResult<()> {
        let mut conn = self.db.acquire().await?;

        let quantity = sqlx::query_scalar::<_, Decimal>(
            "SELECT quantity FROM stock_balances WHERE item_id = $1 AND warehouse_id = $2",
        )
        .bind(item_id)
        .bind(warehouse_id)
        .fetch_optional(&mut *conn)
        .await?;

        // No balance row: the item has never moved here, nothing to alert on
        let Some(quantity) = quantity else {
            return Ok(());
        };

        let thresholds = Self::resolve_thresholds(&mut conn, item_id, warehouse_id).await?;
        let expiry = Self::soonest_layer_expiry(&mut conn, item_id, warehouse_id).await?;
        let today = Utc::now().date_naive();

        let conditions = evaluate_conditions(quantity, &thresholds, expiry, today);
        let still_true: Vec<String> = conditions
            .iter()
            .map(|c| c.alert_type.as_str().to_string())
            .collect();

        for condition in &conditions {
            // Refresh in place when an active alert already exists for the
            // key; otherwise open a new one
            let updated = sqlx::query(
                r#"
                UPDATE stock_alerts
                SET severity = $4, threshold = $5, quantity = $6, message = $7, updated_at = NOW()
                WHERE item_id = $1 AND warehouse_id = $2 AND alert_type = $3 AND status = 'active'
                "#,
            )
            .bind(item_id)
            .bind(warehouse_id)
            .bind(condition.alert_type.as_str())
            .bind(condition.severity.as_str())
            .bind(condition.threshold)
            .bind(quantity)
            .bind(&condition.message)
            .execute(&mut *conn)
            .await?;

            if updated.rows_affected() == 0 {
                sqlx::query(
                    r#"
                    INSERT INTO stock_alerts (item_id, warehouse_id, alert_type, severity,
                                              status, threshold, quantity, message)
                    VALUES ($1, $2, $3, $4, 'active', $5, $6, $7)
                    "#,
                )
                .bind(item_id)
                .bind(warehouse_id)
                .bind(condition.alert_type.as_str())
                .bind(condition.severity.as_str())
                .bind(condition.threshold)
                .bind(quantity)
                .bind(&condition.message)
                .execute(&mut *conn)
                .await?;
            }
        }

        sqlx::query(
            r#"
            UPDATE stock_alerts
            SET status = 'resolved', resolved_at = NOW(), updated_at = NOW()
            WHERE item_id = $1 AND warehouse_id = $2 AND status = 'active'
              AND alert_type <> ALL($3)
            "#,
        )
        .bind(item_id)
        .bind(warehouse_id)
        .bind(&still_true)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Resolve thresholds in override order: item-warehouse specific, item
    /// default, category default, global default.
    async fn resolve_thresholds(
        conn: &mut PgConnection,
        item_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Thresholds> {
        let warehouse_override = sqlx::query_as::<_, (Option<Decimal>, Option<Decimal>, Option<Decimal>)>(
            r#"
            SELECT min_stock, reorder_point, max_stock
            FROM item_warehouse_thresholds
            WHERE item_id = $1 AND warehouse_id = $2
            "#,
        )
        .bind(item_id)
        .bind(warehouse_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|r| ThresholdOverride {
            min_stock: r.0,
            reorder_point: r.1,
            max_stock: r.2,
        });

        let item_row = sqlx::query_as::<_, (Option<Decimal>, Option<Decimal>, Option<Decimal>, Option<String>)>(
            "SELECT min_stock, reorder_point, max_stock, category FROM inventory_items WHERE id = $1",
        )
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?;

        let (item_default, category) = match item_row {
            Some(r) => (
                Some(ThresholdOverride {
                    min_stock: r.0,
                    reorder_point: r.1,
                    max_stock: r.2,
                }),
                r.3,
            ),
            None => (None, None),
        };

        let category_default = match category {
            Some(category) => sqlx::query_as::<_, (Option<Decimal>, Option<Decimal>, Option<Decimal>)>(
                "SELECT min_stock, reorder_point, max_stock FROM category_thresholds WHERE category = $1",
            )
            .bind(category)
            .fetch_optional(&mut *conn)
            .await?
            .map(|r| ThresholdOverride {
                min_stock: r.0,
                reorder_point: r.1,
                max_stock: r.2,
            }),
            None => None,
        };

        Ok(Thresholds::resolve(
            warehouse_override.as_ref(),
            item_default.as_ref(),
            category_default.as_ref(),
        ))
    }

    async fn soonest_layer_expiry(
        conn: &mut PgConnection,
        item_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Option<NaiveDate>> {
        FifoTracker::soonest_expiry(conn, item_id, warehouse_id).await
    }

    /// List alerts, optionally filtered by status and warehouse
    pub async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        warehouse_id: Option<Uuid>,
    ) -> AppResult<Vec<StockAlert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT id, item_id, warehouse_id, alert_type, severity, status, threshold,
                   quantity, message, created_at, updated_at, resolved_at
            FROM stock_alerts
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR warehouse_id = $2)
            ORDER BY updated_at DESC
            "#,
        )
        .bind(status.map(|s| s.as_str().to_string()))
        .bind(warehouse_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockAlert::try_from).collect()
    }

    /// Active alerts for one item across warehouses
    pub async fn item_alerts(&self, item_id: Uuid) -> AppResult<Vec<StockAlert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT id, item_id, warehouse_id, alert_type, severity, status, threshold,
                   quantity, message, created_at, updated_at, resolved_at
            FROM stock_alerts
            WHERE item_id = $1 AND status = 'active'
            ORDER BY updated_at DESC
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockAlert::try_from).collect()
    }
}
