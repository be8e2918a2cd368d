//! Physical count sessions and reconciliation math

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Count session lifecycle. `cancelled` is reachable from any
/// pre-approval state; `closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    Draft,
    Counting,
    ReadyForApproval,
    Approved,
    Closed,
    Cancelled,
}

impl CountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountStatus::Draft => "draft",
            CountStatus::Counting => "counting",
            CountStatus::ReadyForApproval => "ready_for_approval",
            CountStatus::Approved => "approved",
            CountStatus::Closed => "closed",
            CountStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(CountStatus::Draft),
            "counting" => Some(CountStatus::Counting),
            "ready_for_approval" => Some(CountStatus::ReadyForApproval),
            "approved" => Some(CountStatus::Approved),
            "closed" => Some(CountStatus::Closed),
            "cancelled" => Some(CountStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: CountStatus) -> bool {
        use CountStatus::*;
        matches!(
            (self, next),
            (Draft, Counting)
                | (Counting, ReadyForApproval)
                | (ReadyForApproval, Approved)
                | (Approved, Closed)
                | (Draft, Cancelled)
                | (Counting, Cancelled)
                | (ReadyForApproval, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CountStatus::Closed | CountStatus::Cancelled)
    }
}

/// One submission for a line; the most recent round is authoritative
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountRound {
    pub counter: Uuid,
    pub quantity: Decimal,
    pub counted_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A count session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryCount {
    pub id: Uuid,
    pub warehouse_ids: Vec<Uuid>,
    pub category: Option<String>,
    pub status: CountStatus,
    pub freeze_movements: bool,
    pub total_items: i64,
    pub counted_items: i64,
    pub discrepancies: i64,
    pub discrepancy_value: Decimal,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// One (item, warehouse) line inside a count session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountItem {
    pub id: Uuid,
    pub count_id: Uuid,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    /// Live balance snapshotted when the session was created
    pub system_quantity: Decimal,
    /// Frozen at approval; once set, later ledger activity cannot change
    /// the approved discrepancy
    pub system_quantity_at_finalization: Option<Decimal>,
    pub counted_quantity: Option<Decimal>,
    pub unit_cost: Decimal,
    pub rounds: Vec<CountRound>,
}

impl CountItem {
    /// The system-side quantity a discrepancy is measured against
    pub fn effective_system_quantity(&self) -> Decimal {
        self.system_quantity_at_finalization
            .unwrap_or(self.system_quantity)
    }

    /// counted - system, once a count has been submitted
    pub fn discrepancy(&self) -> Option<Decimal> {
        self.counted_quantity
            .map(|counted| counted - self.effective_system_quantity())
    }

    pub fn discrepancy_value(&self) -> Option<Decimal> {
        self.discrepancy().map(|d| d * self.unit_cost)
    }
}

/// Session-level aggregates, recomputed by rescanning every line
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CountSummary {
    pub total_items: i64,
    pub counted_items: i64,
    pub discrepancies: i64,
    pub discrepancy_value: Decimal,
}

/// Full rescan of the session lines. O(n) per mutation, always correct.
pub fn summarize(lines: &[CountItem]) -> CountSummary {
    let mut counted_items = 0;
    let mut discrepancies = 0;
    let mut discrepancy_value = Decimal::ZERO;

    for line in lines {
        if line.counted_quantity.is_some() {
            counted_items += 1;
        }
        if let Some(d) = line.discrepancy() {
            if d != Decimal::ZERO {
                discrepancies += 1;
                discrepancy_value += d * line.unit_cost;
            }
        }
    }

    CountSummary {
        total_items: lines.len() as i64,
        counted_items,
        discrepancies,
        discrepancy_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(system: &str, counted: Option<&str>, unit_cost: &str) -> CountItem {
        CountItem {
            id: Uuid::new_v4(),
            count_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            system_quantity: dec(system),
            system_quantity_at_finalization: None,
            counted_quantity: counted.map(dec),
            unit_cost: dec(unit_cost),
            rounds: Vec::new(),
        }
    }

    #[test]
    fn test_status_transitions() {
        use CountStatus::*;
        assert!(Draft.can_transition_to(Counting));
        assert!(Counting.can_transition_to(ReadyForApproval));
        assert!(ReadyForApproval.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Closed));

        assert!(Draft.can_transition_to(Cancelled));
        assert!(Counting.can_transition_to(Cancelled));
        assert!(ReadyForApproval.can_transition_to(Cancelled));

        // No cancellation once approved, no reopening
        assert!(!Approved.can_transition_to(Cancelled));
        assert!(!Closed.can_transition_to(Counting));
        assert!(!Approved.can_transition_to(Counting));
        assert!(!Draft.can_transition_to(Approved));
    }

    #[test]
    fn test_discrepancy_uses_snapshot_until_finalized() {
        let mut l = line("40", Some("38"), "12");
        assert_eq!(l.discrepancy(), Some(dec("-2")));
        assert_eq!(l.discrepancy_value(), Some(dec("-24")));

        // Finalization freezes the system side even if the snapshot field
        // were to change afterwards
        l.system_quantity_at_finalization = Some(dec("40"));
        l.system_quantity = dec("55");
        assert_eq!(l.discrepancy(), Some(dec("-2")));
    }

    #[test]
    fn test_summarize_rescan() {
        let lines = vec![
            line("40", Some("38"), "12"),  // -2 * 12 = -24
            line("10", Some("10"), "5"),   // counted, no discrepancy
            line("7", None, "3"),          // not yet counted
            line("20", Some("25"), "2"),   // +5 * 2 = +10
        ];

        let summary = summarize(&lines);
        assert_eq!(summary.total_items, 4);
        assert_eq!(summary.counted_items, 3);
        assert_eq!(summary.discrepancies, 2);
        assert_eq!(summary.discrepancy_value, dec("-14"));
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_items, 0);
        assert_eq!(summary.discrepancy_value, Decimal::ZERO);
    }
}
