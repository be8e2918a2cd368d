//! Purchases, goods receipt, and the downstream invoice/payment records

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Ordered,
    Received,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Ordered => "ordered",
            PurchaseStatus::Received => "received",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ordered" => Some(PurchaseStatus::Ordered),
            "received" => Some(PurchaseStatus::Received),
            "cancelled" => Some(PurchaseStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: PurchaseStatus) -> bool {
        use PurchaseStatus::*;
        matches!(
            (self, next),
            (Ordered, Received) | (Ordered, Cancelled) | (Received, Cancelled)
        )
    }
}

/// A purchase order against a supplier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub supplier: String,
    pub status: PurchaseStatus,
    pub total_value: Decimal,
    /// Marks the purchase as already settled; receipt then also creates a
    /// payment record
    pub paid: bool,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
}

/// One item line on a purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Invoice created alongside goods receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub amount: Decimal,
    pub issued_at: DateTime<Utc>,
}

/// Payment created when a received purchase was already marked paid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_transitions() {
        use PurchaseStatus::*;
        assert!(Ordered.can_transition_to(Received));
        assert!(Ordered.can_transition_to(Cancelled));
        assert!(Received.can_transition_to(Cancelled));

        assert!(!Received.can_transition_to(Ordered));
        assert!(!Cancelled.can_transition_to(Received));
        assert!(!Cancelled.can_transition_to(Ordered));
    }
}
