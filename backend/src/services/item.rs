//! Inventory item master service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use shared::models::{InventoryItem, ThresholdOverride};
use shared::validation::{validate_item_code, validate_threshold_order, values_match};

use crate::error::{AppError, AppResult};
use crate::services::stock_ledger::StockLedgerService;

/// Item master data: identity, unit, category, thresholds and the
/// denormalized stock cache
#[derive(Clone)]
pub struct ItemService {
    db: PgPool,
}

/// Database row for an inventory item
#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    code: String,
    name: String,
    category: Option<String>,
    unit: String,
    current_stock: Decimal,
    unit_price: Decimal,
    min_stock: Option<Decimal>,
    reorder_point: Option<Decimal>,
    max_stock: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for InventoryItem {
    fn from(row: ItemRow) -> Self {
        InventoryItem {
            id: row.id,
            code: row.code,
            name: row.name,
            category: row.category,
            unit: row.unit,
            current_stock: row.current_stock,
            unit_price: row.unit_price,
            thresholds: ThresholdOverride {
                min_stock: row.min_stock,
                reorder_point: row.reorder_point,
                max_stock: row.max_stock,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Input for creating an item
#[derive(Debug, Deserialize)]
pub struct CreateItemInput {
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub min_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub max_stock: Option<Decimal>,
}

/// Input for updating an item
#[derive(Debug, Deserialize)]
pub struct UpdateItemInput {
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub min_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub max_stock: Option<Decimal>,
}

/// Input for a per-warehouse threshold override
#[derive(Debug, Deserialize)]
pub struct SetWarehouseThresholdInput {
    pub min_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub max_stock: Option<Decimal>,
}

/// Result of a cache reconciliation pass
#[derive(Debug, Serialize)]
pub struct CacheReconciliation {
    pub item_id: Uuid,
    pub cached_stock: Decimal,
    pub balance_stock: Decimal,
    /// Whether the cache matched the balance sum before the recompute
    pub was_in_sync: bool,
}

impl ItemService {
    /// Create a new ItemService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create an inventory item
    pub async fn create_item(&self, input: CreateItemInput) -> AppResult<InventoryItem> {
        validate_item_code(&input.code).map_err(|msg| AppError::validation("code", msg))?;
        if input.name.trim().is_empty() {
            return Err(AppError::validation("name", "Item name cannot be empty"));
        }
        if input.unit.trim().is_empty() {
            return Err(AppError::validation("unit", "Item unit cannot be empty"));
        }
        Self::validate_thresholds(input.min_stock, input.reorder_point, input.max_stock)?;

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM inventory_items WHERE code = $1)",
        )
        .bind(&input.code)
        .fetch_one(&self.db)
        .await?;
        if exists {
            return Err(AppError::conflict(
                "code",
                format!("Item code {} already exists", input.code),
            ));
        }

        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            INSERT INTO inventory_items (code, name, category, unit, min_stock, reorder_point, max_stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, code, name, category, unit, current_stock, unit_price,
                      min_stock, reorder_point, max_stock, created_at, updated_at
            "#,
        )
        .bind(&input.code)
        .bind(input.name.trim())
        .bind(&input.category)
        .bind(input.unit.trim())
        .bind(input.min_stock)
        .bind(input.reorder_point)
        .bind(input.max_stock)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    /// Update item master data
    pub async fn update_item(
        &self,
        item_id: Uuid,
        input: UpdateItemInput,
    ) -> AppResult<InventoryItem> {
        let existing = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, code, name, category, unit, current_stock, unit_price,
                   min_stock, reorder_point, max_stock, created_at, updated_at
            FROM inventory_items
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        let name = input.name.unwrap_or(existing.name);
        let category = input.category.or(existing.category);
        let unit = input.unit.unwrap_or(existing.unit);
        let min_stock = input.min_stock.or(existing.min_stock);
        let reorder_point = input.reorder_point.or(existing.reorder_point);
        let max_stock = input.max_stock.or(existing.max_stock);
        Self::validate_thresholds(min_stock, reorder_point, max_stock)?;

        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            UPDATE inventory_items
            SET name = $1, category = $2, unit = $3, min_stock = $4, reorder_point = $5,
                max_stock = $6, updated_at = NOW()
            WHERE id = $7
            RETURNING id, code, name, category, unit, current_stock, unit_price,
                      min_stock, reorder_point, max_stock, created_at, updated_at
            "#,
        )
        .bind(&name)
        .bind(&category)
        .bind(&unit)
        .bind(min_stock)
        .bind(reorder_point)
        .bind(max_stock)
        .bind(item_id)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    /// Get an item by id
    pub async fn get_item(&self, item_id: Uuid) -> AppResult<InventoryItem> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, code, name, category, unit, current_stock, unit_price,
                   min_stock, reorder_point, max_stock, created_at, updated_at
            FROM inventory_items
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        Ok(row.into())
    }

    /// List items, optionally filtered by category
    pub async fn list_items(&self, category: Option<String>) -> AppResult<Vec<InventoryItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, code, name, category, unit, current_stock, unit_price,
                   min_stock, reorder_point, max_stock, created_at, updated_at
            FROM inventory_items
            WHERE ($1::text IS NULL OR category = $1)
            ORDER BY code
            "#,
        )
        .bind(category)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Set (or replace) the threshold override for an item in one warehouse
    pub async fn set_warehouse_thresholds(
        &self,
        item_id: Uuid,
        warehouse_id: Uuid,
        input: SetWarehouseThresholdInput,
    ) -> AppResult<()> {
        Self::validate_thresholds(input.min_stock, input.reorder_point, input.max_stock)?;

        let item_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM inventory_items WHERE id = $1)",
        )
        .bind(item_id)
        .fetch_one(&self.db)
        .await?;
        if !item_exists {
            return Err(AppError::NotFound("Item".to_string()));
        }
        let warehouse_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)")
                .bind(warehouse_id)
                .fetch_one(&self.db)
                .await?;
        if !warehouse_exists {
            return Err(AppError::NotFound("Warehouse".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO item_warehouse_thresholds (item_id, warehouse_id, min_stock, reorder_point, max_stock)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (item_id, warehouse_id)
            DO UPDATE SET min_stock = $3, reorder_point = $4, max_stock = $5
            "#,
        )
        .bind(item_id)
        .bind(warehouse_id)
        .bind(input.min_stock)
        .bind(input.reorder_point)
        .bind(input.max_stock)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Recompute the denormalized stock cache from the live balances and
    /// report whether it had drifted
    pub async fn reconcile_cache(&self, item_id: Uuid) -> AppResult<CacheReconciliation> {
        let mut tx = self.db.begin().await?;

        let cached = sqlx::query_scalar::<_, Decimal>(
            "SELECT current_stock FROM inventory_items WHERE id = $1",
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        let balance_stock = sqlx::query_scalar::<_, Option<Decimal>>(
            "SELECT SUM(quantity) FROM stock_balances WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_one(&mut *tx)
        .await?
        .unwrap_or(Decimal::ZERO);

        StockLedgerService::refresh_item_cache(&mut tx, item_id).await?;
        tx.commit().await?;

        Ok(CacheReconciliation {
            item_id,
            cached_stock: cached,
            balance_stock,
            was_in_sync: values_match(cached, balance_stock),
        })
    }

    fn validate_thresholds(
        min_stock: Option<Decimal>,
        reorder_point: Option<Decimal>,
        max_stock: Option<Decimal>,
    ) -> AppResult<()> {
        if let (Some(min), Some(reorder)) = (min_stock, reorder_point) {
            validate_threshold_order(min, reorder, max_stock)
                .map_err(|msg| AppError::validation("thresholds", msg))?;
        }
        Ok(())
    }
}
