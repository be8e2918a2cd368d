//! Stock balances and the pure costing core
//!
//! `cost_movement` is the arithmetic heart of the ledger: given the current
//! balance and (for FIFO types) the cost layers, it produces the signed
//! quantity/value deltas a movement causes. The backend wraps it in a
//! per-key database transaction; the test suites drive it directly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fifo::{consume_layers, FifoLayer, LayerConsumption};
use super::movement::{CostingMethod, MovementDirection, MovementType};

/// Current stock position for one (item, warehouse) key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockBalance {
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: Decimal,
    pub total_value: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl StockBalance {
    /// Current weighted-average unit cost (zero on an empty balance)
    pub fn average_unit_cost(&self) -> Decimal {
        if self.quantity > Decimal::ZERO {
            self.total_value / self.quantity
        } else {
            Decimal::ZERO
        }
    }
}

/// Weighted-average unit cost after adding stock at a new price
pub fn weighted_average(
    old_quantity: Decimal,
    old_value: Decimal,
    added_quantity: Decimal,
    added_unit_price: Decimal,
) -> Decimal {
    let total_quantity = old_quantity + added_quantity;
    if total_quantity <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (old_value + added_quantity * added_unit_price) / total_quantity
}

/// The signed effect of one movement on a balance
#[derive(Debug, Clone, Serialize)]
pub struct MovementCost {
    /// Signed quantity delta
    pub quantity_change: Decimal,
    /// Signed value delta
    pub value_change: Decimal,
    /// Effective unit price of the movement (always a positive magnitude)
    pub unit_price: Decimal,
    /// Per-layer contributions, for FIFO-costed outbound types
    pub layer_consumptions: Vec<LayerConsumption>,
    /// Quantity priced at weighted average because layers ran out
    pub shortfall_quantity: Decimal,
}

/// Cost a movement against the current balance.
///
/// Inbound: value = quantity * unit_price, falling back to the current
/// average when no price is given. Opening the FIFO layer is the caller's
/// responsibility.
///
/// Outbound: SALE_CONSUMPTION and TRANSFER_OUT walk `layers` oldest-first
/// and price any shortfall at the current weighted average, a deliberate
/// fallback, not an error. The weighted-average types ignore `layers`.
pub fn cost_movement(
    balance: &StockBalance,
    movement_type: MovementType,
    quantity: Decimal,
    unit_price: Option<Decimal>,
    layers: &mut [FifoLayer],
) -> MovementCost {
    let average = balance.average_unit_cost();

    match movement_type.direction() {
        MovementDirection::Inbound => {
            let price = unit_price.unwrap_or(average);
            MovementCost {
                quantity_change: quantity,
                value_change: quantity * price,
                unit_price: price,
                layer_consumptions: Vec::new(),
                shortfall_quantity: Decimal::ZERO,
            }
        }
        MovementDirection::Outbound => match movement_type.costing_method() {
            CostingMethod::FifoLayered => {
                let consumed = consume_layers(layers, quantity);
                let shortfall_cost = consumed.shortfall * average;
                let total_cost = consumed.cost_from_layers + shortfall_cost;
                let effective_price = if quantity > Decimal::ZERO {
                    total_cost / quantity
                } else {
                    Decimal::ZERO
                };
                MovementCost {
                    quantity_change: -quantity,
                    value_change: -total_cost,
                    unit_price: effective_price,
                    layer_consumptions: consumed.consumptions,
                    shortfall_quantity: consumed.shortfall,
                }
            }
            CostingMethod::WeightedAverage => MovementCost {
                quantity_change: -quantity,
                value_change: -(quantity * average),
                unit_price: average,
                layer_consumptions: Vec::new(),
                shortfall_quantity: Decimal::ZERO,
            },
        },
    }
}
