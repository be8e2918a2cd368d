//! Stock movement taxonomy and ledger rows

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every way stock can enter or leave a warehouse. The caller never
/// supplies a sign; direction and costing method derive from the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Initial,
    PurchaseIn,
    TransferIn,
    AdjustmentIncrement,
    ReturnIn,
    SaleConsumption,
    TransferOut,
    AdjustmentDecrement,
    Wastage,
    ReturnOut,
}

/// Movement direction derived from the movement type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    Inbound,
    Outbound,
}

/// How an outbound movement is costed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostingMethod {
    /// Walk FIFO layers oldest-first, weighted-average fallback on shortfall
    FifoLayered,
    /// Price the whole quantity at the current weighted average; layers untouched
    WeightedAverage,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Initial => "initial",
            MovementType::PurchaseIn => "purchase_in",
            MovementType::TransferIn => "transfer_in",
            MovementType::AdjustmentIncrement => "adjustment_increment",
            MovementType::ReturnIn => "return_in",
            MovementType::SaleConsumption => "sale_consumption",
            MovementType::TransferOut => "transfer_out",
            MovementType::AdjustmentDecrement => "adjustment_decrement",
            MovementType::Wastage => "wastage",
            MovementType::ReturnOut => "return_out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(MovementType::Initial),
            "purchase_in" => Some(MovementType::PurchaseIn),
            "transfer_in" => Some(MovementType::TransferIn),
            "adjustment_increment" => Some(MovementType::AdjustmentIncrement),
            "return_in" => Some(MovementType::ReturnIn),
            "sale_consumption" => Some(MovementType::SaleConsumption),
            "transfer_out" => Some(MovementType::TransferOut),
            "adjustment_decrement" => Some(MovementType::AdjustmentDecrement),
            "wastage" => Some(MovementType::Wastage),
            "return_out" => Some(MovementType::ReturnOut),
            _ => None,
        }
    }

    pub fn direction(&self) -> MovementDirection {
        match self {
            MovementType::Initial
            | MovementType::PurchaseIn
            | MovementType::TransferIn
            | MovementType::AdjustmentIncrement
            | MovementType::ReturnIn => MovementDirection::Inbound,
            MovementType::SaleConsumption
            | MovementType::TransferOut
            | MovementType::AdjustmentDecrement
            | MovementType::Wastage
            | MovementType::ReturnOut => MovementDirection::Outbound,
        }
    }

    /// Costing method for outbound movements. Inbound movements are always
    /// priced at their own unit price and open a fresh FIFO layer.
    pub fn costing_method(&self) -> CostingMethod {
        match self {
            MovementType::SaleConsumption | MovementType::TransferOut => CostingMethod::FifoLayered,
            _ => CostingMethod::WeightedAverage,
        }
    }

    pub fn is_inbound(&self) -> bool {
        self.direction() == MovementDirection::Inbound
    }
}

/// Immutable ledger row. Never mutated or deleted; corrections are new
/// movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub movement_type: MovementType,
    /// Signed quantity delta (magnitude times direction)
    pub quantity_change: Decimal,
    pub unit_price: Decimal,
    /// Signed value delta
    pub value_change: Decimal,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_taxonomy() {
        let inbound = [
            MovementType::Initial,
            MovementType::PurchaseIn,
            MovementType::TransferIn,
            MovementType::AdjustmentIncrement,
            MovementType::ReturnIn,
        ];
        let outbound = [
            MovementType::SaleConsumption,
            MovementType::TransferOut,
            MovementType::AdjustmentDecrement,
            MovementType::Wastage,
            MovementType::ReturnOut,
        ];

        for t in inbound {
            assert_eq!(t.direction(), MovementDirection::Inbound);
        }
        for t in outbound {
            assert_eq!(t.direction(), MovementDirection::Outbound);
        }
    }

    #[test]
    fn test_costing_method_split() {
        assert_eq!(
            MovementType::SaleConsumption.costing_method(),
            CostingMethod::FifoLayered
        );
        assert_eq!(
            MovementType::TransferOut.costing_method(),
            CostingMethod::FifoLayered
        );
        assert_eq!(
            MovementType::AdjustmentDecrement.costing_method(),
            CostingMethod::WeightedAverage
        );
        assert_eq!(
            MovementType::Wastage.costing_method(),
            CostingMethod::WeightedAverage
        );
        assert_eq!(
            MovementType::ReturnOut.costing_method(),
            CostingMethod::WeightedAverage
        );
    }

    #[test]
    fn test_as_str_round_trip() {
        let all = [
            MovementType::Initial,
            MovementType::PurchaseIn,
            MovementType::TransferIn,
            MovementType::AdjustmentIncrement,
            MovementType::ReturnIn,
            MovementType::SaleConsumption,
            MovementType::TransferOut,
            MovementType::AdjustmentDecrement,
            MovementType::Wastage,
            MovementType::ReturnOut,
        ];
        for t in all {
            assert_eq!(MovementType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(MovementType::from_str("teleport"), None);
    }
}
