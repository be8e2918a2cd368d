//! Inventory item master data

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::alert::ThresholdOverride;

/// An inventory item (ingredient, packaging, retail good)
///
/// `current_stock` and `unit_price` are a denormalized cache over the
/// per-warehouse balances; the stock engine keeps it equal to the sum of
/// live balances and their blended average cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub current_stock: Decimal,
    pub unit_price: Decimal,
    /// Item-level threshold defaults; category and global defaults fill the
    /// gaps
    pub thresholds: ThresholdOverride,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

