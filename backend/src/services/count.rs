//! Count & reconciliation workflow
//!
//! A physical-count session snapshots the balance engine's view at
//! creation, collects counting rounds (the most recent round per line is
//! authoritative), and freezes the system quantities at approval so later
//! ledger activity cannot retroactively change an approved discrepancy.
//! Session aggregates are recomputed by rescanning every line after each
//! mutation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use shared::models::{
    summarize, CountItem, CountRound, CountStatus, InventoryCount, MovementType,
};
use shared::validation::validate_counted_quantity;

use crate::error::{AppError, AppResult};
use crate::services::alert::AlertService;
use crate::services::stock_ledger::{ApplyMovementInput, StockLedgerService};

/// Count session workflow service
#[derive(Clone)]
pub struct CountService {
    db: PgPool,
}

/// Database row for a count session
#[derive(Debug, sqlx::FromRow)]
struct CountRow {
    id: Uuid,
    warehouse_ids: Vec<Uuid>,
    category: Option<String>,
    status: String,
    freeze_movements: bool,
    total_items: i64,
    counted_items: i64,
    discrepancies: i64,
    discrepancy_value: Decimal,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
}

impl TryFrom<CountRow> for InventoryCount {
    type Error = AppError;

    fn try_from(row: CountRow) -> Result<Self, Self::Error> {
        let status = CountStatus::from_str(&row.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Unknown count status: {}", row.status))
        })?;
        Ok(InventoryCount {
            id: row.id,
            warehouse_ids: row.warehouse_ids,
            category: row.category,
            status,
            freeze_movements: row.freeze_movements,
            total_items: row.total_items,
            counted_items: row.counted_items,
            discrepancies: row.discrepancies,
            discrepancy_value: row.discrepancy_value,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            approved_at: row.approved_at,
        })
    }
}

/// Database row for a count line
#[derive(Debug, sqlx::FromRow)]
struct CountItemRow {
    id: Uuid,
    count_id: Uuid,
    item_id: Uuid,
    warehouse_id: Uuid,
    system_quantity: Decimal,
    system_quantity_at_finalization: Option<Decimal>,
    counted_quantity: Option<Decimal>,
    unit_cost: Decimal,
    rounds: serde_json::Value,
}

impl TryFrom<CountItemRow> for CountItem {
    type Error = AppError;

    fn try_from(row: CountItemRow) -> Result<Self, Self::Error> {
        let rounds: Vec<CountRound> = serde_json::from_value(row.rounds)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Corrupt count rounds: {}", e)))?;
        Ok(CountItem {
            id: row.id,
            count_id: row.count_id,
            item_id: row.item_id,
            warehouse_id: row.warehouse_id,
            system_quantity: row.system_quantity,
            system_quantity_at_finalization: row.system_quantity_at_finalization,
            counted_quantity: row.counted_quantity,
            unit_cost: row.unit_cost,
            rounds,
        })
    }
}

/// Input for creating a count session
#[derive(Debug, Deserialize)]
pub struct CreateCountInput {
    pub warehouse_ids: Vec<Uuid>,
    pub category: Option<String>,
    pub freeze_movements: Option<bool>,
}

/// Input for one counting round on a line
#[derive(Debug, Deserialize)]
pub struct SubmitRoundInput {
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: Decimal,
    pub notes: Option<String>,
}

/// Input for approving a session
#[derive(Debug, Deserialize, Default)]
pub struct ApproveCountInput {
    /// Post adjustment movements aligning system stock with the count
    pub apply_adjustments: Option<bool>,
}

/// A count session with its lines
#[derive(Debug, serde::Serialize)]
pub struct CountWithItems {
    #[serde(flatten)]
    pub count: InventoryCount,
    pub items: Vec<CountItem>,
}

/// One line of the variance report
#[derive(Debug, serde::Serialize)]
pub struct VarianceLine {
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub system_quantity: Decimal,
    pub counted_quantity: Option<Decimal>,
    pub discrepancy: Option<Decimal>,
    pub discrepancy_value: Option<Decimal>,
}

impl CountService {
    /// Create a new CountService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a session in `draft`, snapshotting the current balance of
    /// every matched item into its lines.
    pub async fn create_count(
        &self,
        actor: Option<Uuid>,
        input: CreateCountInput,
    ) -> AppResult<CountWithItems> {
        if input.warehouse_ids.is_empty() {
            return Err(AppError::validation(
                "warehouse_ids",
                "At least one warehouse is required",
            ));
        }
        for warehouse_id in &input.warehouse_ids {
            let exists =
                sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)")
                    .bind(warehouse_id)
                    .fetch_one(&self.db)
                    .await?;
            if !exists {
                return Err(AppError::NotFound("Warehouse".to_string()));
            }
        }

        let mut tx = self.db.begin().await?;

        let count_row = sqlx::query_as::<_, CountRow>(
            r#"
            INSERT INTO inventory_counts (warehouse_ids, category, status, freeze_movements, created_by)
            VALUES ($1, $2, 'draft', $3, $4)
            RETURNING id, warehouse_ids, category, status, freeze_movements, total_items,
                      counted_items, discrepancies, discrepancy_value, created_by,
                      created_at, updated_at, approved_at
            "#,
        )
        .bind(&input.warehouse_ids)
        .bind(&input.category)
        .bind(input.freeze_movements.unwrap_or(false))
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        // Snapshot every matched (item, warehouse) balance
        let inserted = sqlx::query(
            r#"
            INSERT INTO count_items (count_id, item_id, warehouse_id, system_quantity, unit_cost)
            SELECT $1, b.item_id, b.warehouse_id, b.quantity,
                   CASE WHEN b.quantity > 0 THEN b.total_value / b.quantity ELSE i.unit_price END
            FROM stock_balances b
            JOIN inventory_items i ON i.id = b.item_id
            WHERE b.warehouse_id = ANY($2)
              AND ($3::text IS NULL OR i.category = $3)
            "#,
        )
        .bind(count_row.id)
        .bind(&input.warehouse_ids)
        .bind(&input.category)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE inventory_counts SET total_items = $1 WHERE id = $2")
            .bind(inserted.rows_affected() as i64)
            .bind(count_row.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get_count(count_row.id).await
    }

    /// Move a draft session into `counting`
    pub async fn start(&self, count_id: Uuid) -> AppResult<CountWithItems> {
        self.transition(count_id, CountStatus::Counting).await?;
        self.get_count(count_id).await
    }

    /// Record one counting round for a line. The submitted quantity
    /// becomes the line's authoritative count.
    pub async fn submit_round(
        &self,
        actor: Uuid,
        count_id: Uuid,
        input: SubmitRoundInput,
    ) -> AppResult<CountWithItems> {
        validate_counted_quantity(input.quantity)
            .map_err(|msg| AppError::validation("quantity", msg))?;

        let mut tx = self.db.begin().await?;

        let count = Self::lock_count(&mut tx, count_id).await?;
        if count.status != CountStatus::Counting {
            return Err(AppError::conflict(
                "status",
                format!(
                    "Rounds can only be submitted while counting, session is {}",
                    count.status.as_str()
                ),
            ));
        }

        let round = CountRound {
            counter: actor,
            quantity: input.quantity,
            counted_at: Utc::now(),
            notes: input.notes,
        };
        let round_json = serde_json::to_value(&round)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let updated = sqlx::query(
            r#"
            UPDATE count_items
            SET counted_quantity = $1, rounds = rounds || jsonb_build_array($2::jsonb)
            WHERE count_id = $3 AND item_id = $4 AND warehouse_id = $5
            "#,
        )
        .bind(input.quantity)
        .bind(round_json)
        .bind(count_id)
        .bind(input.item_id)
        .bind(input.warehouse_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Count line".to_string()));
        }

        Self::refresh_aggregates(&mut tx, count_id).await?;
        tx.commit().await?;

        self.get_count(count_id).await
    }

    /// Move a counting session into `ready_for_approval`
    pub async fn ready(&self, count_id: Uuid) -> AppResult<CountWithItems> {
        self.transition(count_id, CountStatus::ReadyForApproval).await?;
        self.get_count(count_id).await
    }

    /// Approve a session: freeze the system quantities at their live
    /// values and, when requested, post adjustment movements aligning
    /// system stock with the count, all in one transaction.
    pub async fn approve(
        &self,
        actor: Option<Uuid>,
        count_id: Uuid,
        input: ApproveCountInput,
    ) -> AppResult<CountWithItems> {
        let mut tx = self.db.begin().await?;

        let count = Self::lock_count(&mut tx, count_id).await?;
        if !count.status.can_transition_to(CountStatus::Approved) {
            return Err(AppError::conflict(
                "status",
                format!(
                    "Cannot approve a count in status {}",
                    count.status.as_str()
                ),
            ));
        }

        // Status moves first so the ledger's freeze guard no longer sees
        // this session when adjustments post below
        sqlx::query(
            r#"
            UPDATE inventory_counts
            SET status = 'approved', updated_at = NOW(), approved_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(count_id)
        .execute(&mut *tx)
        .await?;

        // Freeze each line at the live balance quantity
        sqlx::query(
            r#"
            UPDATE count_items ci
            SET system_quantity_at_finalization = COALESCE(b.quantity, 0)
            FROM count_items target
            LEFT JOIN stock_balances b
              ON b.item_id = target.item_id AND b.warehouse_id = target.warehouse_id
            WHERE ci.id = target.id AND ci.count_id = $1
            "#,
        )
        .bind(count_id)
        .execute(&mut *tx)
        .await?;

        let mut touched_keys = Vec::new();
        if input.apply_adjustments.unwrap_or(false) {
            let lines = Self::fetch_lines(&mut tx, count_id).await?;
            for line in &lines {
                let Some(discrepancy) = line.discrepancy() else {
                    continue;
                };
                if discrepancy == Decimal::ZERO {
                    continue;
                }
                let movement_type = if discrepancy > Decimal::ZERO {
                    MovementType::AdjustmentIncrement
                } else {
                    MovementType::AdjustmentDecrement
                };
                StockLedgerService::apply_movement_tx(
                    &mut tx,
                    actor,
                    &ApplyMovementInput {
                        item_id: line.item_id,
                        warehouse_id: line.warehouse_id,
                        movement_type,
                        quantity: discrepancy.abs(),
                        unit_price: None,
                        lot_number: None,
                        expiry_date: None,
                        reference: Some(format!("count:{}", count_id)),
                        notes: None,
                    },
                )
                .await?;
                touched_keys.push((line.item_id, line.warehouse_id));
            }
        }

        Self::refresh_aggregates(&mut tx, count_id).await?;
        tx.commit().await?;

        let alerts = AlertService::new(self.db.clone());
        for (item_id, warehouse_id) in touched_keys {
            alerts.refresh_key(item_id, warehouse_id).await?;
        }

        self.get_count(count_id).await
    }

    /// Close an approved session
    pub async fn close(&self, count_id: Uuid) -> AppResult<CountWithItems> {
        self.transition(count_id, CountStatus::Closed).await?;
        self.get_count(count_id).await
    }

    /// Cancel a session from any pre-approval state
    pub async fn cancel(&self, count_id: Uuid) -> AppResult<CountWithItems> {
        self.transition(count_id, CountStatus::Cancelled).await?;
        self.get_count(count_id).await
    }

    /// Get a session with its lines
    pub async fn get_count(&self, count_id: Uuid) -> AppResult<CountWithItems> {
        let row = sqlx::query_as::<_, CountRow>(
            r#"
            SELECT id, warehouse_ids, category, status, freeze_movements, total_items,
                   counted_items, discrepancies, discrepancy_value, created_by,
                   created_at, updated_at, approved_at
            FROM inventory_counts
            WHERE id = $1
            "#,
        )
        .bind(count_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Count session".to_string()))?;

        let items = sqlx::query_as::<_, CountItemRow>(
            r#"
            SELECT id, count_id, item_id, warehouse_id, system_quantity,
                   system_quantity_at_finalization, counted_quantity, unit_cost, rounds
            FROM count_items
            WHERE count_id = $1
            ORDER BY warehouse_id, item_id
            "#,
        )
        .bind(count_id)
        .fetch_all(&self.db)
        .await?;

        Ok(CountWithItems {
            count: row.try_into()?,
            items: items
                .into_iter()
                .map(CountItem::try_from)
                .collect::<Result<_, _>>()?,
        })
    }

    /// List sessions, newest first
    pub async fn list_counts(&self) -> AppResult<Vec<InventoryCount>> {
        let rows = sqlx::query_as::<_, CountRow>(
            r#"
            SELECT id, warehouse_ids, category, status, freeze_movements, total_items,
                   counted_items, discrepancies, discrepancy_value, created_by,
                   created_at, updated_at, approved_at
            FROM inventory_counts
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(InventoryCount::try_from).collect()
    }

    /// Variance report: every line with its discrepancy
    pub async fn variance_report(&self, count_id: Uuid) -> AppResult<Vec<VarianceLine>> {
        let count = self.get_count(count_id).await?;

        Ok(count
            .items
            .iter()
            .map(|line| VarianceLine {
                item_id: line.item_id,
                warehouse_id: line.warehouse_id,
                system_quantity: line.effective_system_quantity(),
                counted_quantity: line.counted_quantity,
                discrepancy: line.discrepancy(),
                discrepancy_value: line.discrepancy_value(),
            })
            .collect())
    }

    /// Rescan every line and store the session aggregates
    async fn refresh_aggregates(conn: &mut PgConnection, count_id: Uuid) -> AppResult<()> {
        let rows = sqlx::query_as::<_, CountItemRow>(
            r#"
            SELECT id, count_id, item_id, warehouse_id, system_quantity,
                   system_quantity_at_finalization, counted_quantity, unit_cost, rounds
            FROM count_items
            WHERE count_id = $1
            "#,
        )
        .bind(count_id)
        .fetch_all(&mut *conn)
        .await?;

        let lines: Vec<CountItem> = rows
            .into_iter()
            .map(CountItem::try_from)
            .collect::<Result<_, _>>()?;
        let summary = summarize(&lines);

        sqlx::query(
            r#"
            UPDATE inventory_counts
            SET total_items = $1, counted_items = $2, discrepancies = $3,
                discrepancy_value = $4, updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(summary.total_items)
        .bind(summary.counted_items)
        .bind(summary.discrepancies)
        .bind(summary.discrepancy_value)
        .bind(count_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn fetch_lines(conn: &mut PgConnection, count_id: Uuid) -> AppResult<Vec<CountItem>> {
        let rows = sqlx::query_as::<_, CountItemRow>(
            r#"
            SELECT id, count_id, item_id, warehouse_id, system_quantity,
                   system_quantity_at_finalization, counted_quantity, unit_cost, rounds
            FROM count_items
            WHERE count_id = $1
            ORDER BY warehouse_id, item_id
            "#,
        )
        .bind(count_id)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(CountItem::try_from).collect()
    }

    async fn lock_count(conn: &mut PgConnection, count_id: Uuid) -> AppResult<InventoryCount> {
        let row = sqlx::query_as::<_, CountRow>(
            r#"
            SELECT id, warehouse_ids, category, status, freeze_movements, total_items,
                   counted_items, discrepancies, discrepancy_value, created_by,
                   created_at, updated_at, approved_at
            FROM inventory_counts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(count_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Count session".to_string()))?;

        row.try_into()
    }

    /// Guarded status transition for the non-posting transitions
    async fn transition(&self, count_id: Uuid, next: CountStatus) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let count = Self::lock_count(&mut tx, count_id).await?;
        if !count.status.can_transition_to(next) {
            return Err(AppError::conflict(
                "status",
                format!(
                    "Cannot move count from {} to {}",
                    count.status.as_str(),
                    next.as_str()
                ),
            ));
        }

        sqlx::query("UPDATE inventory_counts SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(next.as_str())
            .bind(count_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
