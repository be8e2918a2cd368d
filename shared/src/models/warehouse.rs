//! Warehouse registry models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseStatus {
    Active,
    Inactive,
}

impl WarehouseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseStatus::Active => "active",
            WarehouseStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(WarehouseStatus::Active),
            "inactive" => Some(WarehouseStatus::Inactive),
            _ => None,
        }
    }
}

/// Static reference data consulted by every stock operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub status: WarehouseStatus,
    /// Policy flag: outbound movements may drive the balance below zero
    pub allow_negative_stock: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Warehouse {
    pub fn is_active(&self) -> bool {
        self.status == WarehouseStatus::Active
    }
}
