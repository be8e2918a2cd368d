//! FIFO cost layers
//!
//! A layer is a batch of stock at a known unit cost. Layers are created by
//! inbound movements and decremented, oldest first, by FIFO-costed outbound
//! movements. Weighted-average movement types bypass layers entirely, so the
//! sum of remaining quantities can legitimately drift from the balance
//! quantity; that drift is observable, not repaired here.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A FIFO cost layer for one (item, warehouse) key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FifoLayer {
    pub id: Uuid,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    /// The inbound movement that opened this layer
    pub movement_id: Uuid,
    pub original_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub unit_price: Decimal,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Quantity and cost taken from a single layer during consumption
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerConsumption {
    pub layer_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub cost: Decimal,
}

/// Result of walking the layers for one outbound movement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FifoConsumption {
    pub consumptions: Vec<LayerConsumption>,
    /// Total cost satisfied from layers
    pub cost_from_layers: Decimal,
    /// Quantity the layers could not cover; the caller prices this at the
    /// current weighted average
    pub shortfall: Decimal,
}

impl FifoConsumption {
    pub fn quantity_from_layers(&self) -> Decimal {
        self.consumptions.iter().map(|c| c.quantity).sum()
    }
}

/// Walk `layers` in the given order (callers pass them sorted oldest first)
/// and consume up to `requested`, mutating `remaining_quantity` in place.
///
/// Layers are never driven negative: each contributes
/// min(remaining, still-needed). Whatever is left uncovered is returned as
/// `shortfall` for the caller to price at weighted average.
pub fn consume_layers(layers: &mut [FifoLayer], requested: Decimal) -> FifoConsumption {
    let mut remaining = requested;
    let mut consumptions = Vec::new();
    let mut cost_from_layers = Decimal::ZERO;

    for layer in layers.iter_mut() {
        if remaining <= Decimal::ZERO {
            break;
        }
        if layer.remaining_quantity <= Decimal::ZERO {
            continue;
        }

        let take = layer.remaining_quantity.min(remaining);
        let cost = take * layer.unit_price;

        layer.remaining_quantity -= take;
        remaining -= take;
        cost_from_layers += cost;

        consumptions.push(LayerConsumption {
            layer_id: layer.id,
            quantity: take,
            unit_price: layer.unit_price,
            cost,
        });
    }

    FifoConsumption {
        consumptions,
        cost_from_layers,
        shortfall: remaining,
    }
}

/// Soonest expiry date among layers that still hold stock
pub fn soonest_expiry(layers: &[FifoLayer]) -> Option<NaiveDate> {
    layers
        .iter()
        .filter(|l| l.remaining_quantity > Decimal::ZERO)
        .filter_map(|l| l.expiry_date)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn layer(remaining: &str, price: &str) -> FifoLayer {
        FifoLayer {
            id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            movement_id: Uuid::new_v4(),
            original_quantity: dec(remaining),
            remaining_quantity: dec(remaining),
            unit_price: dec(price),
            lot_number: None,
            expiry_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_consume_single_layer_partial() {
        let mut layers = vec![layer("100", "10")];
        let result = consume_layers(&mut layers, dec("40"));

        assert_eq!(layers[0].remaining_quantity, dec("60"));
        assert_eq!(result.cost_from_layers, dec("400"));
        assert_eq!(result.shortfall, Decimal::ZERO);
        assert_eq!(result.consumptions.len(), 1);
    }

    #[test]
    fn test_consume_spans_layers_oldest_first() {
        // 60 left at 10, then 50 at 12; taking 70 consumes 60 + 10
        let mut layers = vec![layer("60", "10"), layer("50", "12")];
        let result = consume_layers(&mut layers, dec("70"));

        assert_eq!(layers[0].remaining_quantity, Decimal::ZERO);
        assert_eq!(layers[1].remaining_quantity, dec("40"));
        assert_eq!(result.cost_from_layers, dec("720")); // 600 + 120
        assert_eq!(result.quantity_from_layers(), dec("70"));
        assert_eq!(result.shortfall, Decimal::ZERO);
        assert_eq!(result.consumptions.len(), 2);
        assert_eq!(result.consumptions[0].cost, dec("600"));
        assert_eq!(result.consumptions[1].cost, dec("120"));
    }

    #[test]
    fn test_consume_exhaustion_reports_shortfall() {
        let mut layers = vec![layer("30", "10")];
        let result = consume_layers(&mut layers, dec("50"));

        assert_eq!(layers[0].remaining_quantity, Decimal::ZERO);
        assert_eq!(result.cost_from_layers, dec("300"));
        assert_eq!(result.shortfall, dec("20"));
    }

    #[test]
    fn test_consume_skips_empty_layers() {
        let mut layers = vec![layer("0", "8"), layer("25", "10")];
        let result = consume_layers(&mut layers, dec("10"));

        assert_eq!(result.consumptions.len(), 1);
        assert_eq!(result.consumptions[0].unit_price, dec("10"));
        assert_eq!(layers[1].remaining_quantity, dec("15"));
    }

    #[test]
    fn test_consume_never_negative() {
        let mut layers = vec![layer("10", "5"), layer("10", "6")];
        consume_layers(&mut layers, dec("100"));

        for l in &layers {
            assert!(l.remaining_quantity >= Decimal::ZERO);
        }
    }

    #[test]
    fn test_soonest_expiry_ignores_empty_layers() {
        let mut expired = layer("0", "10");
        expired.expiry_date = NaiveDate::from_ymd_opt(2025, 1, 1);
        let mut live = layer("5", "10");
        live.expiry_date = NaiveDate::from_ymd_opt(2025, 6, 1);

        let layers = vec![expired, live];
        assert_eq!(
            soonest_expiry(&layers),
            NaiveDate::from_ymd_opt(2025, 6, 1)
        );
    }
}
