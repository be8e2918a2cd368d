//! Stock alerts: thresholds, conditions, severities
//!
//! Threshold resolution and condition evaluation are pure so the alert
//! sweep stays a thin database loop and the rules stay testable.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Global fallback thresholds, used when neither the item-warehouse
/// override, the item default, nor the category default sets a value.
pub const DEFAULT_MIN_STOCK: Decimal = Decimal::from_parts(10, 0, 0, false, 0);
pub const DEFAULT_REORDER_POINT: Decimal = Decimal::from_parts(20, 0, 0, false, 0);
pub const DEFAULT_MAX_STOCK: Decimal = Decimal::from_parts(100, 0, 0, false, 0);
pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 30;

/// Alert type codes, the third component of the idempotent upsert key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    OutOfStock,
    LowStock,
    NearReorder,
    Overstock,
    ExpirySoon,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::OutOfStock => "out_of_stock",
            AlertType::LowStock => "low_stock",
            AlertType::NearReorder => "near_reorder",
            AlertType::Overstock => "overstock",
            AlertType::ExpirySoon => "expiry_soon",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "out_of_stock" => Some(AlertType::OutOfStock),
            "low_stock" => Some(AlertType::LowStock),
            "near_reorder" => Some(AlertType::NearReorder),
            "overstock" => Some(AlertType::Overstock),
            "expiry_soon" => Some(AlertType::ExpirySoon),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// A persisted alert. Resolved alerts stay on record; the sweep never
/// deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAlert {
    pub id: Uuid,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub threshold: Option<Decimal>,
    pub quantity: Decimal,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Effective thresholds for one (item, warehouse) key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_stock: Decimal,
    pub reorder_point: Decimal,
    pub max_stock: Decimal,
    pub expiry_window_days: i64,
}

/// One layer of the override chain; `None` falls through to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOverride {
    pub min_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub max_stock: Option<Decimal>,
}

impl Thresholds {
    /// Resolve per field: item-warehouse override, then item default, then
    /// category default, then the global constants.
    pub fn resolve(
        warehouse_override: Option<&ThresholdOverride>,
        item_default: Option<&ThresholdOverride>,
        category_default: Option<&ThresholdOverride>,
    ) -> Self {
        let chain = [warehouse_override, item_default, category_default];

        let pick = |field: fn(&ThresholdOverride) -> Option<Decimal>, fallback: Decimal| {
            chain
                .iter()
                .flatten()
                .find_map(|o| field(o))
                .unwrap_or(fallback)
        };

        Thresholds {
            min_stock: pick(|o| o.min_stock, DEFAULT_MIN_STOCK),
            reorder_point: pick(|o| o.reorder_point, DEFAULT_REORDER_POINT),
            max_stock: pick(|o| o.max_stock, DEFAULT_MAX_STOCK),
            expiry_window_days: DEFAULT_EXPIRY_WINDOW_DAYS,
        }
    }
}

/// A condition that currently holds for a key; the sweep upserts one alert
/// per condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCondition {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub threshold: Option<Decimal>,
    pub message: String,
}

/// Evaluate every alert condition independently; an item can carry several
/// alert types at once.
pub fn evaluate_conditions(
    quantity: Decimal,
    thresholds: &Thresholds,
    soonest_expiry: Option<NaiveDate>,
    today: NaiveDate,
) -> Vec<AlertCondition> {
    let mut conditions = Vec::new();
    let two = Decimal::from(2);

    if quantity == Decimal::ZERO {
        conditions.push(AlertCondition {
            alert_type: AlertType::OutOfStock,
            severity: AlertSeverity::Critical,
            threshold: None,
            message: "Out of stock".to_string(),
        });
    }

    if quantity > Decimal::ZERO && quantity <= thresholds.min_stock {
        let severity = if quantity <= thresholds.min_stock / two {
            AlertSeverity::High
        } else {
            AlertSeverity::Medium
        };
        conditions.push(AlertCondition {
            alert_type: AlertType::LowStock,
            severity,
            threshold: Some(thresholds.min_stock),
            message: format!(
                "Stock {} at or below minimum {}",
                quantity, thresholds.min_stock
            ),
        });
    }

    if quantity > thresholds.min_stock && quantity <= thresholds.reorder_point {
        conditions.push(AlertCondition {
            alert_type: AlertType::NearReorder,
            severity: AlertSeverity::Medium,
            threshold: Some(thresholds.reorder_point),
            message: format!(
                "Stock {} at or below reorder point {}",
                quantity, thresholds.reorder_point
            ),
        });
    }

    if thresholds.max_stock > Decimal::ZERO && quantity >= thresholds.max_stock {
        conditions.push(AlertCondition {
            alert_type: AlertType::Overstock,
            severity: AlertSeverity::Low,
            threshold: Some(thresholds.max_stock),
            message: format!("Stock {} at or above maximum {}", quantity, thresholds.max_stock),
        });
    }

    if let Some(expiry) = soonest_expiry {
        let days_left = (expiry - today).num_days();
        if days_left >= 0 && days_left <= thresholds.expiry_window_days {
            let severity = if days_left <= 7 {
                AlertSeverity::Critical
            } else if days_left <= 15 {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            conditions.push(AlertCondition {
                alert_type: AlertType::ExpirySoon,
                severity,
                threshold: None,
                message: format!("Oldest lot expires in {} days ({})", days_left, expiry),
            });
        }
    }

    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn defaults() -> Thresholds {
        Thresholds::resolve(None, None, None)
    }

    fn types_of(conditions: &[AlertCondition]) -> Vec<AlertType> {
        conditions.iter().map(|c| c.alert_type).collect()
    }

    #[test]
    fn test_global_defaults() {
        let t = defaults();
        assert_eq!(t.min_stock, dec("10"));
        assert_eq!(t.reorder_point, dec("20"));
        assert_eq!(t.max_stock, dec("100"));
        assert_eq!(t.expiry_window_days, 30);
    }

    #[test]
    fn test_resolve_override_chain_per_field() {
        let warehouse = ThresholdOverride {
            min_stock: Some(dec("5")),
            ..Default::default()
        };
        let item = ThresholdOverride {
            reorder_point: Some(dec("15")),
            ..Default::default()
        };
        let category = ThresholdOverride {
            min_stock: Some(dec("99")), // shadowed by the warehouse override
            max_stock: Some(dec("200")),
            ..Default::default()
        };

        let t = Thresholds::resolve(Some(&warehouse), Some(&item), Some(&category));
        assert_eq!(t.min_stock, dec("5"));
        assert_eq!(t.reorder_point, dec("15"));
        assert_eq!(t.max_stock, dec("200"));
    }

    #[test]
    fn test_out_of_stock_is_critical() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let conditions = evaluate_conditions(Decimal::ZERO, &defaults(), None, today);
        assert_eq!(types_of(&conditions), vec![AlertType::OutOfStock]);
        assert_eq!(conditions[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_low_stock_severity_scales() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let at_half = evaluate_conditions(dec("5"), &defaults(), None, today);
        assert_eq!(at_half[0].alert_type, AlertType::LowStock);
        assert_eq!(at_half[0].severity, AlertSeverity::High);

        let above_half = evaluate_conditions(dec("8"), &defaults(), None, today);
        assert_eq!(above_half[0].severity, AlertSeverity::Medium);
    }

    #[test]
    fn test_near_reorder_band() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let conditions = evaluate_conditions(dec("15"), &defaults(), None, today);
        assert_eq!(types_of(&conditions), vec![AlertType::NearReorder]);

        // Above the reorder point, nothing fires
        assert!(evaluate_conditions(dec("21"), &defaults(), None, today).is_empty());
    }

    #[test]
    fn test_overstock() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let conditions = evaluate_conditions(dec("100"), &defaults(), None, today);
        assert_eq!(types_of(&conditions), vec![AlertType::Overstock]);
        assert_eq!(conditions[0].severity, AlertSeverity::Low);
    }

    #[test]
    fn test_expiry_severity_scales_with_days_left() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let t = defaults();

        let in_5 = today + chrono::Duration::days(5);
        let in_10 = today + chrono::Duration::days(10);
        let in_25 = today + chrono::Duration::days(25);
        let past = today - chrono::Duration::days(1);

        let critical = evaluate_conditions(dec("50"), &t, Some(in_5), today);
        assert_eq!(critical[0].severity, AlertSeverity::Critical);

        let high = evaluate_conditions(dec("50"), &t, Some(in_10), today);
        assert_eq!(high[0].severity, AlertSeverity::High);

        let medium = evaluate_conditions(dec("50"), &t, Some(in_25), today);
        assert_eq!(medium[0].severity, AlertSeverity::Medium);

        // Already past the expiry date: not an EXPIRY_SOON condition
        assert!(evaluate_conditions(dec("50"), &t, Some(past), today).is_empty());
    }

    #[test]
    fn test_conditions_are_independent() {
        // Low stock and imminent expiry can hold at the same time
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let expiry = today + chrono::Duration::days(3);
        let conditions = evaluate_conditions(dec("8"), &defaults(), Some(expiry), today);
        assert_eq!(
            types_of(&conditions),
            vec![AlertType::LowStock, AlertType::ExpirySoon]
        );
    }
}
