//! Goods-receipt workflow
//!
//! Receiving a purchase restocks the destination warehouse at weighted
//! average, writes one PURCHASE_IN ledger row per line and creates the
//! downstream invoice (and payment, when the purchase was already settled)
//! in the same transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use shared::models::{Invoice, MovementType, Payment, Purchase, PurchaseLine, PurchaseStatus};
use shared::validation::{validate_quantity, validate_unit_price};

use crate::error::{AppError, AppResult};
use crate::services::alert::AlertService;
use crate::services::stock_ledger::{ApplyMovementInput, StockLedgerService};

/// Goods-receipt workflow service
#[derive(Clone)]
pub struct ReceivingService {
    db: PgPool,
}

/// Database row for a purchase
#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    warehouse_id: Uuid,
    supplier: String,
    status: String,
    total_value: Decimal,
    paid: bool,
    reference: Option<String>,
    notes: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    received_at: Option<DateTime<Utc>>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = AppError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let status = PurchaseStatus::from_str(&row.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Unknown purchase status: {}", row.status))
        })?;
        Ok(Purchase {
            id: row.id,
            warehouse_id: row.warehouse_id,
            supplier: row.supplier,
            status,
            total_value: row.total_value,
            paid: row.paid,
            reference: row.reference,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            received_at: row.received_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseLineRow {
    id: Uuid,
    purchase_id: Uuid,
    item_id: Uuid,
    quantity: Decimal,
    unit_price: Decimal,
    lot_number: Option<String>,
    expiry_date: Option<NaiveDate>,
}

impl From<PurchaseLineRow> for PurchaseLine {
    fn from(row: PurchaseLineRow) -> Self {
        PurchaseLine {
            id: row.id,
            purchase_id: row.purchase_id,
            item_id: row.item_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            lot_number: row.lot_number,
            expiry_date: row.expiry_date,
        }
    }
}

/// Input for creating a purchase order
#[derive(Debug, Deserialize)]
pub struct CreatePurchaseInput {
    pub warehouse_id: Uuid,
    pub supplier: String,
    pub paid: Option<bool>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<PurchaseLineInput>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseLineInput {
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// A purchase with its lines
#[derive(Debug, serde::Serialize)]
pub struct PurchaseWithLines {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub lines: Vec<PurchaseLine>,
}

impl ReceivingService {
    /// Create a new ReceivingService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a purchase order in `ordered`
    pub async fn create_purchase(
        &self,
        actor: Option<Uuid>,
        input: CreatePurchaseInput,
    ) -> AppResult<PurchaseWithLines> {
        if input.supplier.trim().is_empty() {
            return Err(AppError::validation("supplier", "Supplier is required"));
        }
        if input.lines.is_empty() {
            return Err(AppError::validation("lines", "At least one line is required"));
        }
        for line in &input.lines {
            validate_quantity(line.quantity)
                .map_err(|msg| AppError::validation("lines.quantity", msg))?;
            validate_unit_price(line.unit_price)
                .map_err(|msg| AppError::validation("lines.unit_price", msg))?;
        }

        let warehouse_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)")
                .bind(input.warehouse_id)
                .fetch_one(&self.db)
                .await?;
        if !warehouse_exists {
            return Err(AppError::NotFound("Warehouse".to_string()));
        }

        let total_value: Decimal = input
            .lines
            .iter()
            .map(|l| l.quantity * l.unit_price)
            .sum();

        let mut tx = self.db.begin().await?;

        let purchase_row = sqlx::query_as::<_, PurchaseRow>(
            r#"
            INSERT INTO purchases (warehouse_id, supplier, status, total_value, paid,
                                   reference, notes, created_by)
            VALUES ($1, $2, 'ordered', $3, $4, $5, $6, $7)
            RETURNING id, warehouse_id, supplier, status, total_value, paid, reference,
                      notes, created_by, created_at, updated_at, received_at
            "#,
        )
        .bind(input.warehouse_id)
        .bind(input.supplier.trim())
        .bind(total_value)
        .bind(input.paid.unwrap_or(false))
        .bind(&input.reference)
        .bind(&input.notes)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        for line in &input.lines {
            sqlx::query(
                r#"
                INSERT INTO purchase_lines (purchase_id, item_id, quantity, unit_price,
                                            lot_number, expiry_date)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(purchase_row.id)
            .bind(line.item_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(&line.lot_number)
            .bind(line.expiry_date)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_purchase(purchase_row.id).await
    }

    /// Receive a purchase: restock every line, create the invoice and, for
    /// an already-paid purchase, the payment, as one atomic unit.
    pub async fn receive(
        &self,
        actor: Option<Uuid>,
        purchase_id: Uuid,
    ) -> AppResult<PurchaseWithLines> {
        let mut tx = self.db.begin().await?;

        let purchase = Self::lock_purchase(&mut tx, purchase_id).await?;
        if !purchase.status.can_transition_to(PurchaseStatus::Received) {
            return Err(AppError::conflict(
                "status",
                format!(
                    "Cannot receive a purchase in status {}",
                    purchase.status.as_str()
                ),
            ));
        }

        let lines = Self::fetch_lines(&mut tx, purchase_id).await?;
        let mut touched_keys = Vec::with_capacity(lines.len());

        for line in &lines {
            StockLedgerService::apply_movement_tx(
                &mut tx,
                actor,
                &ApplyMovementInput {
                    item_id: line.item_id,
                    warehouse_id: purchase.warehouse_id,
                    movement_type: MovementType::PurchaseIn,
                    quantity: line.quantity,
                    unit_price: Some(line.unit_price),
                    lot_number: line.lot_number.clone(),
                    expiry_date: line.expiry_date,
                    reference: Some(format!("purchase:{}", purchase_id)),
                    notes: None,
                },
            )
            .await?;
            touched_keys.push((line.item_id, purchase.warehouse_id));
        }

        let invoice = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO invoices (purchase_id, amount)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(purchase_id)
        .bind(purchase.total_value)
        .fetch_one(&mut *tx)
        .await?;

        if purchase.paid {
            sqlx::query("INSERT INTO payments (invoice_id, amount) VALUES ($1, $2)")
                .bind(invoice.0)
                .bind(purchase.total_value)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            UPDATE purchases
            SET status = 'received', updated_at = NOW(), received_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(purchase_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let alerts = AlertService::new(self.db.clone());
        for (item_id, warehouse_id) in touched_keys {
            alerts.refresh_key(item_id, warehouse_id).await?;
        }

        self.get_purchase(purchase_id).await
    }

    /// Cancel a purchase. A received purchase is reversed at the weighted
    /// average current at cancellation time, not by unwinding the FIFO
    /// layer the receipt opened; the reversal is therefore not symmetric
    /// with the receipt.
    pub async fn cancel(
        &self,
        actor: Option<Uuid>,
        purchase_id: Uuid,
    ) -> AppResult<PurchaseWithLines> {
        let mut tx = self.db.begin().await?;

        let purchase = Self::lock_purchase(&mut tx, purchase_id).await?;
        if !purchase.status.can_transition_to(PurchaseStatus::Cancelled) {
            return Err(AppError::conflict(
                "status",
                format!(
                    "Cannot cancel a purchase in status {}",
                    purchase.status.as_str()
                ),
            ));
        }

        let mut touched_keys = Vec::new();
        if purchase.status == PurchaseStatus::Received {
            let lines = Self::fetch_lines(&mut tx, purchase_id).await?;
            for line in &lines {
                StockLedgerService::apply_movement_tx(
                    &mut tx,
                    actor,
                    &ApplyMovementInput {
                        item_id: line.item_id,
                        warehouse_id: purchase.warehouse_id,
                        movement_type: MovementType::ReturnOut,
                        quantity: line.quantity,
                        unit_price: None,
                        lot_number: line.lot_number.clone(),
                        expiry_date: None,
                        reference: Some(format!("purchase-cancel:{}", purchase_id)),
                        notes: None,
                    },
                )
                .await?;
                touched_keys.push((line.item_id, purchase.warehouse_id));
            }
        }

        sqlx::query("UPDATE purchases SET status = 'cancelled', updated_at = NOW() WHERE id = $1")
            .bind(purchase_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let alerts = AlertService::new(self.db.clone());
        for (item_id, warehouse_id) in touched_keys {
            alerts.refresh_key(item_id, warehouse_id).await?;
        }

        self.get_purchase(purchase_id).await
    }

    /// Get a purchase with its lines
    pub async fn get_purchase(&self, purchase_id: Uuid) -> AppResult<PurchaseWithLines> {
        let row = sqlx::query_as::<_, PurchaseRow>(
            r#"
            SELECT id, warehouse_id, supplier, status, total_value, paid, reference,
                   notes, created_by, created_at, updated_at, received_at
            FROM purchases
            WHERE id = $1
            "#,
        )
        .bind(purchase_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;

        let lines = sqlx::query_as::<_, PurchaseLineRow>(
            r#"
            SELECT id, purchase_id, item_id, quantity, unit_price, lot_number, expiry_date
            FROM purchase_lines
            WHERE purchase_id = $1
            ORDER BY id
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.db)
        .await?;

        Ok(PurchaseWithLines {
            purchase: row.try_into()?,
            lines: lines.into_iter().map(Into::into).collect(),
        })
    }

    /// List purchases, newest first
    pub async fn list_purchases(&self) -> AppResult<Vec<Purchase>> {
        let rows = sqlx::query_as::<_, PurchaseRow>(
            r#"
            SELECT id, warehouse_id, supplier, status, total_value, paid, reference,
                   notes, created_by, created_at, updated_at, received_at
            FROM purchases
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Purchase::try_from).collect()
    }

    /// Invoice and payment records created by a receipt
    pub async fn purchase_documents(
        &self,
        purchase_id: Uuid,
    ) -> AppResult<(Vec<Invoice>, Vec<Payment>)> {
        let invoices = sqlx::query_as::<_, (Uuid, Uuid, Decimal, DateTime<Utc>)>(
            "SELECT id, purchase_id, amount, issued_at FROM invoices WHERE purchase_id = $1",
        )
        .bind(purchase_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|r| Invoice {
            id: r.0,
            purchase_id: r.1,
            amount: r.2,
            issued_at: r.3,
        })
        .collect::<Vec<_>>();

        let payments = sqlx::query_as::<_, (Uuid, Uuid, Decimal, DateTime<Utc>)>(
            r#"
            SELECT p.id, p.invoice_id, p.amount, p.paid_at
            FROM payments p
            JOIN invoices i ON i.id = p.invoice_id
            WHERE i.purchase_id = $1
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|r| Payment {
            id: r.0,
            invoice_id: r.1,
            amount: r.2,
            paid_at: r.3,
        })
        .collect::<Vec<_>>();

        Ok((invoices, payments))
    }

    async fn lock_purchase(conn: &mut PgConnection, purchase_id: Uuid) -> AppResult<Purchase> {
        let row = sqlx::query_as::<_, PurchaseRow>(
            r#"
            SELECT id, warehouse_id, supplier, status, total_value, paid, reference,
                   notes, created_by, created_at, updated_at, received_at
            FROM purchases
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(purchase_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;

        row.try_into()
    }

    async fn fetch_lines(
        conn: &mut PgConnection,
        purchase_id: Uuid,
    ) -> AppResult<Vec<PurchaseLine>> {
        let lines = sqlx::query_as::<_, PurchaseLineRow>(
            r#"
            SELECT id, purchase_id, item_id, quantity, unit_price, lot_number, expiry_date
            FROM purchase_lines
            WHERE purchase_id = $1
            ORDER BY id
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(lines.into_iter().map(Into::into).collect())
    }
}
