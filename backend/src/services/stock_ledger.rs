//! Stock ledger and balance engine
//!
//! `apply_movement` is the single write path for stock: it validates the
//! warehouse policy, costs the movement (FIFO layers or weighted average,
//! derived from the movement type), appends one immutable ledger row,
//! upserts the balance and keeps the item cache in sync, all inside one
//! transaction serialized per (item, warehouse) key with a row lock.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use shared::models::{
    cost_movement, CostingMethod, FifoLayer, MovementType, StockBalance, StockMovement,
    WarehouseStatus,
};
use shared::types::{DateRange, PaginatedResponse, Pagination, PaginationMeta};
use shared::validation::{validate_quantity, validate_unit_price};

use crate::error::{AppError, AppResult};
use crate::services::alert::AlertService;
use crate::services::fifo::FifoTracker;

/// Stock ledger service, the single source of truth for balances
#[derive(Clone)]
pub struct StockLedgerService {
    db: PgPool,
}

/// Database row for a ledger entry
#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: Uuid,
    item_id: Uuid,
    warehouse_id: Uuid,
    movement_type: String,
    quantity_change: Decimal,
    unit_price: Decimal,
    value_change: Decimal,
    lot_number: Option<String>,
    expiry_date: Option<NaiveDate>,
    reference: Option<String>,
    notes: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type = MovementType::from_str(&row.movement_type).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "Unknown movement type in ledger: {}",
                row.movement_type
            ))
        })?;
        Ok(StockMovement {
            id: row.id,
            item_id: row.item_id,
            warehouse_id: row.warehouse_id,
            movement_type,
            quantity_change: row.quantity_change,
            unit_price: row.unit_price,
            value_change: row.value_change,
            lot_number: row.lot_number,
            expiry_date: row.expiry_date,
            reference: row.reference,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// Balance snapshot returned by writes and reads
#[derive(Debug, Clone, Serialize)]
pub struct BalanceSnapshot {
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: Decimal,
    pub total_value: Decimal,
    pub average_unit_cost: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl From<StockBalance> for BalanceSnapshot {
    fn from(balance: StockBalance) -> Self {
        let average_unit_cost = balance.average_unit_cost();
        BalanceSnapshot {
            item_id: balance.item_id,
            warehouse_id: balance.warehouse_id,
            quantity: balance.quantity,
            total_value: balance.total_value,
            average_unit_cost,
            last_updated: balance.last_updated,
        }
    }
}

/// Input for applying a stock movement. Quantities and prices are unsigned
/// magnitudes; the movement type decides the sign.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyMovementInput {
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// The result of one applied movement
#[derive(Debug, Clone, Serialize)]
pub struct AppliedMovement {
    pub movement: StockMovement,
    pub balance: BalanceSnapshot,
}

/// Open FIFO layers for a key with the layer-vs-balance drift
#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub balance_quantity: Decimal,
    /// Sum of remaining layer quantities
    pub remaining_total: Decimal,
    /// balance_quantity - remaining_total; non-zero once weighted-average
    /// movements have bypassed the layers
    pub drift: Decimal,
    pub layers: Vec<FifoLayer>,
}

/// Per-item valuation line
#[derive(Debug, Clone, Serialize)]
pub struct ValuationLine {
    pub item_id: Uuid,
    pub item_code: String,
    pub item_name: String,
    pub quantity: Decimal,
    pub average_unit_cost: Decimal,
    pub total_value: Decimal,
}

/// Valuation summary for one warehouse
#[derive(Debug, Clone, Serialize)]
pub struct WarehouseValuation {
    pub warehouse_id: Uuid,
    pub item_count: i64,
    pub total_value: Decimal,
    pub lines: Vec<ValuationLine>,
}

impl StockLedgerService {
    /// Create a new StockLedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Apply a stock movement and return the ledger row plus the new
    /// balance snapshot. After commit the alert state for the touched key
    /// is refreshed, so the next alert read reflects this movement.
    pub async fn apply_movement(
        &self,
        actor: Option<Uuid>,
        input: ApplyMovementInput,
    ) -> AppResult<AppliedMovement> {
        let mut tx = self.db.begin().await?;
        let applied = Self::apply_movement_tx(&mut tx, actor, &input).await?;
        tx.commit().await?;

        AlertService::new(self.db.clone())
            .refresh_key(input.item_id, input.warehouse_id)
            .await?;

        Ok(applied)
    }

    /// Apply a movement on an already-open transaction. Workflows that post
    /// several coupled movements (transfers, receipts, count adjustments)
    /// call this so everything commits or rolls back as one unit.
    pub(crate) async fn apply_movement_tx(
        conn: &mut PgConnection,
        actor: Option<Uuid>,
        input: &ApplyMovementInput,
    ) -> AppResult<AppliedMovement> {
        validate_quantity(input.quantity)
            .map_err(|msg| AppError::validation("quantity", msg))?;
        if let Some(price) = input.unit_price {
            validate_unit_price(price).map_err(|msg| AppError::validation("unit_price", msg))?;
        }
        if matches!(
            input.movement_type,
            MovementType::PurchaseIn | MovementType::TransferIn
        ) && input.unit_price.is_none()
        {
            return Err(AppError::validation(
                "unit_price",
                "Unit price is required for this movement type",
            ));
        }

        // Warehouse policy checks
        let warehouse = sqlx::query_as::<_, (String, String, bool)>(
            "SELECT name, status, allow_negative_stock FROM warehouses WHERE id = $1",
        )
        .bind(input.warehouse_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Warehouse".to_string()))?;

        let (warehouse_name, status, allow_negative_stock) = warehouse;
        if input.movement_type.is_inbound()
            && WarehouseStatus::from_str(&status) != Some(WarehouseStatus::Active)
        {
            return Err(AppError::InactiveWarehouse(warehouse_name));
        }

        let item_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM inventory_items WHERE id = $1)")
                .bind(input.item_id)
                .fetch_one(&mut *conn)
                .await?;
        if !item_exists {
            return Err(AppError::NotFound("Item".to_string()));
        }

        // An active count session with movement freeze blocks this key
        let frozen = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM inventory_counts c
                JOIN count_items ci ON ci.count_id = c.id
                WHERE c.freeze_movements
                  AND c.status IN ('draft', 'counting', 'ready_for_approval')
                  AND ci.item_id = $1 AND ci.warehouse_id = $2
            )
            "#,
        )
        .bind(input.item_id)
        .bind(input.warehouse_id)
        .fetch_one(&mut *conn)
        .await?;
        if frozen {
            return Err(AppError::conflict(
                "stock_movement",
                "Item is frozen by an active count session in this warehouse",
            ));
        }

        // Lock the balance row for the key; create it first if this is the
        // first movement ever
        sqlx::query(
            r#"
            INSERT INTO stock_balances (item_id, warehouse_id, quantity, total_value)
            VALUES ($1, $2, 0, 0)
            ON CONFLICT (item_id, warehouse_id) DO NOTHING
            "#,
        )
        .bind(input.item_id)
        .bind(input.warehouse_id)
        .execute(&mut *conn)
        .await?;

        let balance_row = sqlx::query_as::<_, (Decimal, Decimal, DateTime<Utc>)>(
            r#"
            SELECT quantity, total_value, last_updated
            FROM stock_balances
            WHERE item_id = $1 AND warehouse_id = $2
            FOR UPDATE
            "#,
        )
        .bind(input.item_id)
        .bind(input.warehouse_id)
        .fetch_one(&mut *conn)
        .await?;

        let balance = StockBalance {
            item_id: input.item_id,
            warehouse_id: input.warehouse_id,
            quantity: balance_row.0,
            total_value: balance_row.1,
            last_updated: balance_row.2,
        };

        // Cost the movement; FIFO-costed types walk the locked layers
        let mut layers: Vec<FifoLayer> = Vec::new();
        if input.movement_type.costing_method() == CostingMethod::FifoLayered {
            layers = FifoTracker::load_for_update(conn, input.item_id, input.warehouse_id).await?;
        }
        let cost = cost_movement(
            &balance,
            input.movement_type,
            input.quantity,
            input.unit_price,
            &mut layers,
        );

        let new_quantity = balance.quantity + cost.quantity_change;
        if new_quantity < Decimal::ZERO && !allow_negative_stock {
            return Err(AppError::NegativeStock {
                item_id: input.item_id,
                warehouse_id: input.warehouse_id,
                resulting: new_quantity,
            });
        }
        let new_value = balance.total_value + cost.value_change;

        if cost.shortfall_quantity > Decimal::ZERO {
            tracing::warn!(
                item_id = %input.item_id,
                warehouse_id = %input.warehouse_id,
                shortfall = %cost.shortfall_quantity,
                "FIFO layers exhausted; shortfall priced at weighted average"
            );
        }

        // Append the immutable ledger row
        let movement_row = sqlx::query_as::<_, MovementRow>(
            r#"
            INSERT INTO stock_movements (item_id, warehouse_id, movement_type, quantity_change,
                                         unit_price, value_change, lot_number, expiry_date,
                                         reference, notes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, item_id, warehouse_id, movement_type, quantity_change, unit_price,
                      value_change, lot_number, expiry_date, reference, notes, created_by,
                      created_at
            "#,
        )
        .bind(input.item_id)
        .bind(input.warehouse_id)
        .bind(input.movement_type.as_str())
        .bind(cost.quantity_change)
        .bind(cost.unit_price)
        .bind(cost.value_change)
        .bind(&input.lot_number)
        .bind(input.expiry_date)
        .bind(&input.reference)
        .bind(&input.notes)
        .bind(actor)
        .fetch_one(&mut *conn)
        .await?;

        // Layer bookkeeping: inbound opens a layer, FIFO consumption
        // decrements the walked ones
        if input.movement_type.is_inbound() {
            FifoTracker::open_layer(
                conn,
                input.item_id,
                input.warehouse_id,
                movement_row.id,
                input.quantity,
                cost.unit_price,
                input.lot_number.as_deref(),
                input.expiry_date,
            )
            .await?;
        } else if !cost.layer_consumptions.is_empty() {
            FifoTracker::persist_consumptions(conn, &cost.layer_consumptions).await?;
        }

        let updated = sqlx::query_as::<_, (Decimal, Decimal, DateTime<Utc>)>(
            r#"
            UPDATE stock_balances
            SET quantity = $3, total_value = $4, last_updated = NOW()
            WHERE item_id = $1 AND warehouse_id = $2
            RETURNING quantity, total_value, last_updated
            "#,
        )
        .bind(input.item_id)
        .bind(input.warehouse_id)
        .bind(new_quantity)
        .bind(new_value)
        .fetch_one(&mut *conn)
        .await?;

        // Keep the denormalized item cache equal to the sum of live
        // balances; a recompute, not an incremental delta
        Self::refresh_item_cache(conn, input.item_id).await?;

        let movement = StockMovement::try_from(movement_row)?;
        let balance = BalanceSnapshot::from(StockBalance {
            item_id: input.item_id,
            warehouse_id: input.warehouse_id,
            quantity: updated.0,
            total_value: updated.1,
            last_updated: updated.2,
        });

        tracing::debug!(
            movement_id = %movement.id,
            movement_type = movement.movement_type.as_str(),
            quantity = %movement.quantity_change,
            "Stock movement applied"
        );

        Ok(AppliedMovement { movement, balance })
    }

    /// Recompute an item's cached stock and blended unit price from its
    /// live balances
    pub(crate) async fn refresh_item_cache(
        conn: &mut PgConnection,
        item_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE inventory_items
            SET current_stock = totals.quantity,
                unit_price = CASE WHEN totals.quantity > 0
                                  THEN totals.value / totals.quantity
                                  ELSE unit_price END,
                updated_at = NOW()
            FROM (
                SELECT COALESCE(SUM(quantity), 0) AS quantity,
                       COALESCE(SUM(total_value), 0) AS value
                FROM stock_balances
                WHERE item_id = $1
            ) AS totals
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Open FIFO layers for a key, plus the drift between the layer-side
    /// total and the balance quantity. The drift is legitimate whenever
    /// weighted-average movement types have bypassed the layers; it is
    /// reported, never repaired.
    pub async fn layer_summary(
        &self,
        item_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<LayerSummary> {
        let mut conn = self.db.acquire().await?;

        let layers = FifoTracker::list_open(&mut conn, item_id, warehouse_id).await?;
        let remaining_total = FifoTracker::remaining_total(&mut conn, item_id, warehouse_id).await?;

        let balance_quantity = sqlx::query_scalar::<_, Decimal>(
            "SELECT quantity FROM stock_balances WHERE item_id = $1 AND warehouse_id = $2",
        )
        .bind(item_id)
        .bind(warehouse_id)
        .fetch_optional(&mut *conn)
        .await?
        .unwrap_or(Decimal::ZERO);

        Ok(LayerSummary {
            item_id,
            warehouse_id,
            balance_quantity,
            remaining_total,
            drift: balance_quantity - remaining_total,
            layers,
        })
    }

    /// Current balance for one (item, warehouse) key
    pub async fn get_balance(
        &self,
        item_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<BalanceSnapshot> {
        let row = sqlx::query_as::<_, (Decimal, Decimal, DateTime<Utc>)>(
            r#"
            SELECT quantity, total_value, last_updated
            FROM stock_balances
            WHERE item_id = $1 AND warehouse_id = $2
            "#,
        )
        .bind(item_id)
        .bind(warehouse_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock balance".to_string()))?;

        Ok(BalanceSnapshot::from(StockBalance {
            item_id,
            warehouse_id,
            quantity: row.0,
            total_value: row.1,
            last_updated: row.2,
        }))
    }

    /// All per-warehouse balances for an item
    pub async fn list_item_balances(&self, item_id: Uuid) -> AppResult<Vec<BalanceSnapshot>> {
        let rows = sqlx::query_as::<_, (Uuid, Decimal, Decimal, DateTime<Utc>)>(
            r#"
            SELECT warehouse_id, quantity, total_value, last_updated
            FROM stock_balances
            WHERE item_id = $1
            ORDER BY warehouse_id
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                BalanceSnapshot::from(StockBalance {
                    item_id,
                    warehouse_id: r.0,
                    quantity: r.1,
                    total_value: r.2,
                    last_updated: r.3,
                })
            })
            .collect())
    }

    /// Ledger history for a key, newest first, optionally restricted to a
    /// date range
    pub async fn movement_history(
        &self,
        item_id: Uuid,
        warehouse_id: Uuid,
        pagination: Pagination,
        range: Option<DateRange>,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        let (start, end) = match &range {
            Some(r) => (Some(r.start), Some(r.end)),
            None => (None, None),
        };

        let total_items = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM stock_movements
            WHERE item_id = $1 AND warehouse_id = $2
              AND ($3::date IS NULL OR created_at::date >= $3)
              AND ($4::date IS NULL OR created_at::date <= $4)
            "#,
        )
        .bind(item_id)
        .bind(warehouse_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, item_id, warehouse_id, movement_type, quantity_change, unit_price,
                   value_change, lot_number, expiry_date, reference, notes, created_by,
                   created_at
            FROM stock_movements
            WHERE item_id = $1 AND warehouse_id = $2
              AND ($3::date IS NULL OR created_at::date >= $3)
              AND ($4::date IS NULL OR created_at::date <= $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(item_id)
        .bind(warehouse_id)
        .bind(start)
        .bind(end)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data: Vec<StockMovement> = rows
            .into_iter()
            .map(StockMovement::try_from)
            .collect::<Result<_, _>>()?;

        let total_pages = if pagination.per_page == 0 {
            0
        } else {
            ((total_items as u64).div_ceil(u64::from(pagination.per_page))) as u32
        };

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta {
                page: pagination.page,
                per_page: pagination.per_page,
                total_items: total_items as u64,
                total_pages,
            },
        })
    }

    /// Valuation of everything currently held in a warehouse
    pub async fn warehouse_valuation(&self, warehouse_id: Uuid) -> AppResult<WarehouseValuation> {
        let warehouse_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)")
                .bind(warehouse_id)
                .fetch_one(&self.db)
                .await?;
        if !warehouse_exists {
            return Err(AppError::NotFound("Warehouse".to_string()));
        }

        let rows = sqlx::query_as::<_, (Uuid, String, String, Decimal, Decimal)>(
            r#"
            SELECT b.item_id, i.code, i.name, b.quantity, b.total_value
            FROM stock_balances b
            JOIN inventory_items i ON i.id = b.item_id
            WHERE b.warehouse_id = $1 AND b.quantity <> 0
            ORDER BY i.code
            "#,
        )
        .bind(warehouse_id)
        .fetch_all(&self.db)
        .await?;

        let mut total_value = Decimal::ZERO;
        let lines: Vec<ValuationLine> = rows
            .into_iter()
            .map(|r| {
                total_value += r.4;
                let average_unit_cost = if r.3 > Decimal::ZERO {
                    r.4 / r.3
                } else {
                    Decimal::ZERO
                };
                ValuationLine {
                    item_id: r.0,
                    item_code: r.1,
                    item_name: r.2,
                    quantity: r.3,
                    average_unit_cost,
                    total_value: r.4,
                }
            })
            .collect();

        Ok(WarehouseValuation {
            warehouse_id,
            item_count: lines.len() as i64,
            total_value,
            lines,
        })
    }
}
