//! Transfer workflow
//!
//! Moves stock between two warehouses through a paired TRANSFER_OUT /
//! TRANSFER_IN posting per line. Completion is all-or-nothing: every
//! posting for the transfer happens in one transaction, so a failure on
//! either side leaves both warehouses untouched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use shared::models::{MovementType, Transfer, TransferLine, TransferStatus};
use shared::validation::validate_quantity;

use crate::error::{AppError, AppResult};
use crate::services::alert::AlertService;
use crate::services::stock_ledger::{ApplyMovementInput, StockLedgerService};

/// Transfer workflow service
#[derive(Clone)]
pub struct TransferService {
    db: PgPool,
}

/// Database row for a transfer
#[derive(Debug, sqlx::FromRow)]
struct TransferRow {
    id: Uuid,
    from_warehouse_id: Uuid,
    to_warehouse_id: Uuid,
    status: String,
    total_value: Decimal,
    reference: Option<String>,
    notes: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransferRow> for Transfer {
    type Error = AppError;

    fn try_from(row: TransferRow) -> Result<Self, Self::Error> {
        let status = TransferStatus::from_str(&row.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Unknown transfer status: {}", row.status))
        })?;
        Ok(Transfer {
            id: row.id,
            from_warehouse_id: row.from_warehouse_id,
            to_warehouse_id: row.to_warehouse_id,
            status,
            total_value: row.total_value,
            reference: row.reference,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransferLineRow {
    id: Uuid,
    transfer_id: Uuid,
    item_id: Uuid,
    quantity: Decimal,
    unit_cost: Option<Decimal>,
    line_value: Option<Decimal>,
}

impl From<TransferLineRow> for TransferLine {
    fn from(row: TransferLineRow) -> Self {
        TransferLine {
            id: row.id,
            transfer_id: row.transfer_id,
            item_id: row.item_id,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            line_value: row.line_value,
        }
    }
}

/// Input for creating a transfer
#[derive(Debug, Deserialize)]
pub struct CreateTransferInput {
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    pub lines: Vec<TransferLineInput>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferLineInput {
    pub item_id: Uuid,
    pub quantity: Decimal,
}

/// A transfer with its lines
#[derive(Debug, serde::Serialize)]
pub struct TransferWithLines {
    #[serde(flatten)]
    pub transfer: Transfer,
    pub lines: Vec<TransferLine>,
}

impl TransferService {
    /// Create a new TransferService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a transfer in `pending`
    pub async fn create_transfer(
        &self,
        actor: Option<Uuid>,
        input: CreateTransferInput,
    ) -> AppResult<TransferWithLines> {
        if input.from_warehouse_id == input.to_warehouse_id {
            return Err(AppError::validation(
                "to_warehouse_id",
                "Source and destination warehouses must differ",
            ));
        }
        if input.lines.is_empty() {
            return Err(AppError::validation("lines", "At least one line is required"));
        }
        for line in &input.lines {
            validate_quantity(line.quantity)
                .map_err(|msg| AppError::validation("lines.quantity", msg))?;
        }

        for warehouse_id in [input.from_warehouse_id, input.to_warehouse_id] {
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

        let transfer_row = sqlx::query_as::<_, TransferRow>(
            r#"
            INSERT INTO transfers (from_warehouse_id, to_warehouse_id, status, reference, notes, created_by)
            VALUES ($1, $2, 'pending', $3, $4, $5)
            RETURNING id, from_warehouse_id, to_warehouse_id, status, total_value, reference,
                      notes, created_by, created_at, updated_at, completed_at
            "#,
        )
        .bind(input.from_warehouse_id)
        .bind(input.to_warehouse_id)
        .bind(&input.reference)
        .bind(&input.notes)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        for line in &input.lines {
            sqlx::query(
                "INSERT INTO transfer_lines (transfer_id, item_id, quantity) VALUES ($1, $2, $3)",
            )
            .bind(transfer_row.id)
            .bind(line.item_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_transfer(transfer_row.id).await
    }

    /// Mark a pending transfer as dispatched
    pub async fn dispatch(&self, transfer_id: Uuid) -> AppResult<TransferWithLines> {
        self.transition(transfer_id, TransferStatus::InTransit).await?;
        self.get_transfer(transfer_id).await
    }

    /// Cancel a transfer that has not been completed
    pub async fn cancel(&self, transfer_id: Uuid) -> AppResult<TransferWithLines> {
        self.transition(transfer_id, TransferStatus::Cancelled).await?;
        self.get_transfer(transfer_id).await
    }

    /// Complete an in-transit transfer: for every line post TRANSFER_OUT
    /// against the source (FIFO-costed) and TRANSFER_IN at the same unit
    /// cost against the destination, atomically for the whole transfer.
    pub async fn complete(
        &self,
        actor: Option<Uuid>,
        transfer_id: Uuid,
    ) -> AppResult<TransferWithLines> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT id, from_warehouse_id, to_warehouse_id, status, total_value, reference,
                   notes, created_by, created_at, updated_at, completed_at
            FROM transfers
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(transfer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        let transfer = Transfer::try_from(row)?;
        if !transfer.status.can_transition_to(TransferStatus::Completed) {
            return Err(AppError::conflict(
                "status",
                format!(
                    "Cannot complete a transfer in status {}",
                    transfer.status.as_str()
                ),
            ));
        }

        let lines = sqlx::query_as::<_, TransferLineRow>(
            r#"
            SELECT id, transfer_id, item_id, quantity, unit_cost, line_value
            FROM transfer_lines
            WHERE transfer_id = $1
            ORDER BY id
            "#,
        )
        .bind(transfer_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut total_value = Decimal::ZERO;
        let mut touched_keys = Vec::with_capacity(lines.len() * 2);

        for line in &lines {
            let reference = format!("transfer:{}", transfer_id);

            let out = StockLedgerService::apply_movement_tx(
                &mut tx,
                actor,
                &ApplyMovementInput {
                    item_id: line.item_id,
                    warehouse_id: transfer.from_warehouse_id,
                    movement_type: MovementType::TransferOut,
                    quantity: line.quantity,
                    unit_price: None,
                    lot_number: None,
                    expiry_date: None,
                    reference: Some(reference.clone()),
                    notes: None,
                },
            )
            .await?;

            // The destination receives at the cost the source gave up
            let unit_cost = out.movement.unit_price;
            StockLedgerService::apply_movement_tx(
                &mut tx,
                actor,
                &ApplyMovementInput {
                    item_id: line.item_id,
                    warehouse_id: transfer.to_warehouse_id,
                    movement_type: MovementType::TransferIn,
                    quantity: line.quantity,
                    unit_price: Some(unit_cost),
                    lot_number: None,
                    expiry_date: None,
                    reference: Some(reference),
                    notes: None,
                },
            )
            .await?;

            let line_value = -out.movement.value_change;
            total_value += line_value;

            sqlx::query(
                "UPDATE transfer_lines SET unit_cost = $1, line_value = $2 WHERE id = $3",
            )
            .bind(unit_cost)
            .bind(line_value)
            .bind(line.id)
            .execute(&mut *tx)
            .await?;

            touched_keys.push((line.item_id, transfer.from_warehouse_id));
            touched_keys.push((line.item_id, transfer.to_warehouse_id));
        }

        sqlx::query(
            r#"
            UPDATE transfers
            SET status = 'completed', total_value = $1, updated_at = NOW(), completed_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(total_value)
        .bind(transfer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let alerts = AlertService::new(self.db.clone());
        for (item_id, warehouse_id) in touched_keys {
            alerts.refresh_key(item_id, warehouse_id).await?;
        }

        self.get_transfer(transfer_id).await
    }

    /// Get a transfer with its lines
    pub async fn get_transfer(&self, transfer_id: Uuid) -> AppResult<TransferWithLines> {
        let row = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT id, from_warehouse_id, to_warehouse_id, status, total_value, reference,
                   notes, created_by, created_at, updated_at, completed_at
            FROM transfers
            WHERE id = $1
            "#,
        )
        .bind(transfer_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        let lines = sqlx::query_as::<_, TransferLineRow>(
            r#"
            SELECT id, transfer_id, item_id, quantity, unit_cost, line_value
            FROM transfer_lines
            WHERE transfer_id = $1
            ORDER BY id
            "#,
        )
        .bind(transfer_id)
        .fetch_all(&self.db)
        .await?;

        Ok(TransferWithLines {
            transfer: row.try_into()?,
            lines: lines.into_iter().map(Into::into).collect(),
        })
    }

    /// List transfers, newest first
    pub async fn list_transfers(&self) -> AppResult<Vec<Transfer>> {
        let rows = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT id, from_warehouse_id, to_warehouse_id, status, total_value, reference,
                   notes, created_by, created_at, updated_at, completed_at
            FROM transfers
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Transfer::try_from).collect()
    }

    /// Guarded status transition for the non-posting transitions
    async fn transition(&self, transfer_id: Uuid, next: TransferStatus) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM transfers WHERE id = $1 FOR UPDATE",
        )
        .bind(transfer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        let current = TransferStatus::from_str(&status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Unknown transfer status: {}", status))
        })?;
        if !current.can_transition_to(next) {
            return Err(AppError::conflict(
                "status",
                format!(
                    "Cannot move transfer from {} to {}",
                    current.as_str(),
                    next.as_str()
                ),
            ));
        }

        sqlx::query("UPDATE transfers SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(next.as_str())
            .bind(transfer_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
