//! Inter-warehouse transfers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transfer lifecycle. `completed` is terminal: reversing a completed
/// transfer means creating a new transfer in the opposite direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InTransit,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InTransit => "in_transit",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransferStatus::Pending),
            "in_transit" => Some(TransferStatus::InTransit),
            "completed" => Some(TransferStatus::Completed),
            "cancelled" => Some(TransferStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Pending, InTransit)
                | (InTransit, Completed)
                | (Pending, Cancelled)
                | (InTransit, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Cancelled)
    }
}

/// A stock transfer between two warehouses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    pub status: TransferStatus,
    /// Total cost of the moved stock, set at completion
    pub total_value: Decimal,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One item line on a transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLine {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub item_id: Uuid,
    pub quantity: Decimal,
    /// Effective unit cost of the outbound posting, set at completion
    pub unit_cost: Option<Decimal>,
    pub line_value: Option<Decimal>,
}
