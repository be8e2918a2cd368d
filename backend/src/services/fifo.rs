//! FIFO layer tracker
//!
//! Transaction-scoped persistence for cost layers. All functions take the
//! caller's open connection so layer mutations commit or roll back together
//! with the balance and ledger writes they belong to.
//!
//! The sum of remaining quantities only matches the balance quantity while
//! every outbound movement for a key goes through FIFO consumption; the
//! weighted-average movement types bypass layers, so the two can drift.
//! `remaining_total` exposes the layer side for reconciliation reads.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use shared::models::{FifoLayer, LayerConsumption};

use crate::error::AppResult;

/// Database row for a FIFO layer
#[derive(Debug, sqlx::FromRow)]
struct FifoLayerRow {
    id: Uuid,
    item_id: Uuid,
    warehouse_id: Uuid,
    movement_id: Uuid,
    original_quantity: Decimal,
    remaining_quantity: Decimal,
    unit_price: Decimal,
    lot_number: Option<String>,
    expiry_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl From<FifoLayerRow> for FifoLayer {
    fn from(row: FifoLayerRow) -> Self {
        FifoLayer {
            id: row.id,
            item_id: row.item_id,
            warehouse_id: row.warehouse_id,
            movement_id: row.movement_id,
            original_quantity: row.original_quantity,
            remaining_quantity: row.remaining_quantity,
            unit_price: row.unit_price,
            lot_number: row.lot_number,
            expiry_date: row.expiry_date,
            created_at: row.created_at,
        }
    }
}

/// FIFO layer persistence, used inside ledger transactions
pub struct FifoTracker;

impl FifoTracker {
    /// Open a new layer for an inbound movement
    pub async fn open_layer(
        conn: &mut PgConnection,
        item_id: Uuid,
        warehouse_id: Uuid,
        movement_id: Uuid,
        quantity: Decimal,
        unit_price: Decimal,
        lot_number: Option<&str>,
        expiry_date: Option<NaiveDate>,
    ) -> AppResult<FifoLayer> {
        let row = sqlx::query_as::<_, FifoLayerRow>(
            r#"
            INSERT INTO fifo_layers (item_id, warehouse_id, movement_id, original_quantity,
                                     remaining_quantity, unit_price, lot_number, expiry_date)
            VALUES ($1, $2, $3, $4, $4, $5, $6, $7)
            RETURNING id, item_id, warehouse_id, movement_id, original_quantity,
                      remaining_quantity, unit_price, lot_number, expiry_date, created_at
            "#,
        )
        .bind(item_id)
        .bind(warehouse_id)
        .bind(movement_id)
        .bind(quantity)
        .bind(unit_price)
        .bind(lot_number)
        .bind(expiry_date)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.into())
    }

    /// Read the open layers for a key, oldest first, without locking
    pub async fn list_open(
        conn: &mut PgConnection,
        item_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Vec<FifoLayer>> {
        let rows = sqlx::query_as::<_, FifoLayerRow>(
            r#"
            SELECT id, item_id, warehouse_id, movement_id, original_quantity,
                   remaining_quantity, unit_price, lot_number, expiry_date, created_at
            FROM fifo_layers
            WHERE item_id = $1 AND warehouse_id = $2 AND remaining_quantity > 0
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(item_id)
        .bind(warehouse_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Load the open layers for a key, oldest first, locking them for the
    /// duration of the transaction
    pub async fn load_for_update(
        conn: &mut PgConnection,
        item_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Vec<FifoLayer>> {
        let rows = sqlx::query_as::<_, FifoLayerRow>(
            r#"
            SELECT id, item_id, warehouse_id, movement_id, original_quantity,
                   remaining_quantity, unit_price, lot_number, expiry_date, created_at
            FROM fifo_layers
            WHERE item_id = $1 AND warehouse_id = $2 AND remaining_quantity > 0
            ORDER BY created_at ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(item_id)
        .bind(warehouse_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Write back the remaining-quantity decrements from a consumption walk
    pub async fn persist_consumptions(
        conn: &mut PgConnection,
        consumptions: &[LayerConsumption],
    ) -> AppResult<()> {
        for consumption in consumptions {
            sqlx::query(
                "UPDATE fifo_layers SET remaining_quantity = remaining_quantity - $1 WHERE id = $2",
            )
            .bind(consumption.quantity)
            .bind(consumption.layer_id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Layer-side stock total for a key (reconciliation view)
    pub async fn remaining_total(
        conn: &mut PgConnection,
        item_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Decimal> {
        let total = sqlx::query_scalar::<_, Option<Decimal>>(
            "SELECT SUM(remaining_quantity) FROM fifo_layers WHERE item_id = $1 AND warehouse_id = $2",
        )
        .bind(item_id)
        .bind(warehouse_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(total.unwrap_or(Decimal::ZERO))
    }

    /// Soonest expiry among layers still holding stock, for the alert sweep
    pub async fn soonest_expiry(
        conn: &mut PgConnection,
        item_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Option<NaiveDate>> {
        let expiry = sqlx::query_scalar::<_, Option<NaiveDate>>(
            r#"
            SELECT MIN(expiry_date)
            FROM fifo_layers
            WHERE item_id = $1 AND warehouse_id = $2
              AND remaining_quantity > 0 AND expiry_date IS NOT NULL
            "#,
        )
        .bind(item_id)
        .bind(warehouse_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(expiry)
    }
}
