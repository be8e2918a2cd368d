//! Warehouse registry service

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use shared::models::{Warehouse, WarehouseStatus};
use shared::validation::validate_warehouse_code;

use crate::error::{AppError, AppResult};

/// Warehouse registry: static reference data consulted by every stock
/// operation
#[derive(Clone)]
pub struct WarehouseService {
    db: PgPool,
}

/// Database row for a warehouse
#[derive(Debug, sqlx::FromRow)]
struct WarehouseRow {
    id: Uuid,
    code: String,
    name: String,
    status: String,
    allow_negative_stock: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WarehouseRow> for Warehouse {
    type Error = AppError;

    fn try_from(row: WarehouseRow) -> Result<Self, Self::Error> {
        let status = WarehouseStatus::from_str(&row.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Unknown warehouse status: {}", row.status))
        })?;
        Ok(Warehouse {
            id: row.id,
            code: row.code,
            name: row.name,
            status,
            allow_negative_stock: row.allow_negative_stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input for creating a warehouse
#[derive(Debug, Deserialize)]
pub struct CreateWarehouseInput {
    pub code: String,
    pub name: String,
    pub allow_negative_stock: Option<bool>,
}

/// Input for updating a warehouse
#[derive(Debug, Deserialize)]
pub struct UpdateWarehouseInput {
    pub name: Option<String>,
    pub status: Option<WarehouseStatus>,
    pub allow_negative_stock: Option<bool>,
}

impl WarehouseService {
    /// Create a new WarehouseService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register a warehouse
    pub async fn create_warehouse(&self, input: CreateWarehouseInput) -> AppResult<Warehouse> {
        validate_warehouse_code(&input.code)
            .map_err(|msg| AppError::validation("code", msg))?;
        if input.name.trim().is_empty() {
            return Err(AppError::validation("name", "Warehouse name cannot be empty"));
        }

        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM warehouses WHERE code = $1)")
                .bind(&input.code)
                .fetch_one(&self.db)
                .await?;
        if exists {
            return Err(AppError::conflict(
                "code",
                format!("Warehouse code {} already exists", input.code),
            ));
        }

        let row = sqlx::query_as::<_, WarehouseRow>(
            r#"
            INSERT INTO warehouses (code, name, status, allow_negative_stock)
            VALUES ($1, $2, 'active', $3)
            RETURNING id, code, name, status, allow_negative_stock, created_at, updated_at
            "#,
        )
        .bind(&input.code)
        .bind(input.name.trim())
        .bind(input.allow_negative_stock.unwrap_or(false))
        .fetch_one(&self.db)
        .await?;

        row.try_into()
    }

    /// Update warehouse status or policy
    pub async fn update_warehouse(
        &self,
        warehouse_id: Uuid,
        input: UpdateWarehouseInput,
    ) -> AppResult<Warehouse> {
        let existing = sqlx::query_as::<_, (String, String, bool)>(
            "SELECT name, status, allow_negative_stock FROM warehouses WHERE id = $1",
        )
        .bind(warehouse_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Warehouse".to_string()))?;

        let name = input.name.unwrap_or(existing.0);
        let status = input
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or(existing.1);
        let allow_negative_stock = input.allow_negative_stock.unwrap_or(existing.2);

        let row = sqlx::query_as::<_, WarehouseRow>(
            r#"
            UPDATE warehouses
            SET name = $1, status = $2, allow_negative_stock = $3, updated_at = NOW()
            WHERE id = $4
            RETURNING id, code, name, status, allow_negative_stock, created_at, updated_at
            "#,
        )
        .bind(&name)
        .bind(&status)
        .bind(allow_negative_stock)
        .bind(warehouse_id)
        .fetch_one(&self.db)
        .await?;

        row.try_into()
    }

    /// Get a warehouse by id
    pub async fn get_warehouse(&self, warehouse_id: Uuid) -> AppResult<Warehouse> {
        let row = sqlx::query_as::<_, WarehouseRow>(
            r#"
            SELECT id, code, name, status, allow_negative_stock, created_at, updated_at
            FROM warehouses
            WHERE id = $1
            "#,
        )
        .bind(warehouse_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Warehouse".to_string()))?;

        row.try_into()
    }

    /// List all warehouses
    pub async fn list_warehouses(&self) -> AppResult<Vec<Warehouse>> {
        let rows = sqlx::query_as::<_, WarehouseRow>(
            r#"
            SELECT id, code, name, status, allow_negative_stock, created_at, updated_at
            FROM warehouses
            ORDER BY code
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Warehouse::try_from).collect()
    }
}
