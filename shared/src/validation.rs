//! Validation utilities for the Restaurant Management Platform
//!
//! Pure checks used by the stock engine before anything touches the
//! database. Monetary comparisons go through the epsilon helpers here.

use rust_decimal::Decimal;

/// Tolerance for monetary equality checks (currency has two decimal places,
/// value arithmetic can drift below that).
pub const VALUE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Compare two monetary values within [`VALUE_EPSILON`].
pub fn values_match(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= VALUE_EPSILON
}

/// Validate a movement quantity: callers supply unsigned magnitudes,
/// the sign comes from the movement type.
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be a positive magnitude");
    }
    Ok(())
}

/// Validate a unit price magnitude.
pub fn validate_unit_price(unit_price: Decimal) -> Result<(), &'static str> {
    if unit_price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    Ok(())
}

/// Validate a counted quantity submitted during a count round.
pub fn validate_counted_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity < Decimal::ZERO {
        return Err("Counted quantity cannot be negative");
    }
    Ok(())
}

/// Validate an item code (2-20 uppercase alphanumeric, dashes allowed)
pub fn validate_item_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 {
        return Err("Item code must be at least 2 characters");
    }
    if code.len() > 20 {
        return Err("Item code must be at most 20 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Item code must be uppercase alphanumeric");
    }
    Ok(())
}

/// Validate a warehouse code (2-10 uppercase alphanumeric)
pub fn validate_warehouse_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 {
        return Err("Warehouse code must be at least 2 characters");
    }
    if code.len() > 10 {
        return Err("Warehouse code must be at most 10 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err("Warehouse code must be uppercase alphanumeric");
    }
    Ok(())
}

/// Validate threshold ordering: min <= reorder point, and max (when set)
/// above both.
pub fn validate_threshold_order(
    min_stock: Decimal,
    reorder_point: Decimal,
    max_stock: Option<Decimal>,
) -> Result<(), &'static str> {
    if min_stock < Decimal::ZERO || reorder_point < Decimal::ZERO {
        return Err("Thresholds cannot be negative");
    }
    if reorder_point < min_stock {
        return Err("Reorder point must not be below minimum stock");
    }
    if let Some(max) = max_stock {
        if max > Decimal::ZERO && max < reorder_point {
            return Err("Maximum stock must not be below the reorder point");
        }
    }
    Ok(())
}
