//! Count & reconciliation workflow tests
//!
//! Covers the session state machine, round authority, the approval freeze
//! and the rescan-based aggregates.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::models::{summarize, CountItem, CountRound, CountStatus};

// Helper to create Decimal from string
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

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// The worked example: snapshot 40, count 38, approve at 40; the
    /// discrepancy is -2 and its value -24 at unit cost 12
    #[test]
    fn test_count_scenario() {
        let mut l = line("40", None, "12");
        assert_eq!(l.discrepancy(), None);

        // Round 1
        l.rounds.push(CountRound {
            counter: Uuid::new_v4(),
            quantity: dec("38"),
            counted_at: Utc::now(),
            notes: None,
        });
        l.counted_quantity = Some(dec("38"));
        assert_eq!(l.discrepancy(), Some(dec("-2")));

        // Approval freezes the system side
        l.system_quantity_at_finalization = Some(dec("40"));
        assert_eq!(l.discrepancy(), Some(dec("-2")));
        assert_eq!(l.discrepancy_value(), Some(dec("-24")));
    }

    /// Later ledger activity cannot retroactively change an approved
    /// discrepancy
    #[test]
    fn test_discrepancy_stable_after_finalization() {
        let mut l = line("40", Some("38"), "12");
        l.system_quantity_at_finalization = Some(dec("40"));

        let before = l.discrepancy();

        // A refreshed snapshot (as a later live re-read would produce)
        // does not move the frozen discrepancy
        l.system_quantity = dec("100");
        assert_eq!(l.discrepancy(), before);
    }

    /// The most recent round is authoritative
    #[test]
    fn test_latest_round_wins() {
        let mut l = line("40", None, "12");
        for quantity in ["38", "39", "40"] {
            l.rounds.push(CountRound {
                counter: Uuid::new_v4(),
                quantity: dec(quantity),
                counted_at: Utc::now(),
                notes: None,
            });
            l.counted_quantity = Some(dec(quantity));
        }

        assert_eq!(l.rounds.len(), 3);
        assert_eq!(l.counted_quantity, Some(dec("40")));
        assert_eq!(l.discrepancy(), Some(Decimal::ZERO));
    }

    /// Aggregates are a full rescan: totals, counted lines, discrepancy
    /// count and signed value
    #[test]
    fn test_aggregate_rescan() {
        let lines = vec![
            line("40", Some("38"), "12"), // -24
            line("10", Some("10"), "5"),  // counted, balanced
            line("7", None, "3"),         // uncounted
            line("20", Some("26"), "2"),  // +12
        ];

        let summary = summarize(&lines);
        assert_eq!(summary.total_items, 4);
        assert_eq!(summary.counted_items, 3);
        assert_eq!(summary.discrepancies, 2);
        assert_eq!(summary.discrepancy_value, dec("-12"));
    }

    /// Full lifecycle transitions
    #[test]
    fn test_count_lifecycle() {
        use CountStatus::*;
        let happy_path = [Draft, Counting, ReadyForApproval, Approved, Closed];
        for pair in happy_path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {}",
                pair[0].as_str(),
                pair[1].as_str()
            );
        }

        // Cancellation is pre-approval only
        for status in [Draft, Counting, ReadyForApproval] {
            assert!(status.can_transition_to(Cancelled));
        }
        for status in [Approved, Closed, Cancelled] {
            assert!(!status.can_transition_to(Cancelled));
        }

        // Terminal states go nowhere
        for status in [Closed, Cancelled] {
            for next in [Draft, Counting, ReadyForApproval, Approved, Closed] {
                assert!(!status.can_transition_to(next));
            }
        }
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=10000i64).prop_map(|n| Decimal::new(n, 1))
    }

    fn cost_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=100000i64).prop_map(|n| Decimal::new(n, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// discrepancy = counted - system, and its value scales with the
        /// unit cost
        #[test]
        fn prop_discrepancy_definition(
            system in quantity_strategy(),
            counted in quantity_strategy(),
            unit_cost in cost_strategy()
        ) {
            let mut l = line("0", None, "1");
            l.system_quantity = system;
            l.counted_quantity = Some(counted);
            l.unit_cost = unit_cost;

            prop_assert_eq!(l.discrepancy(), Some(counted - system));
            prop_assert_eq!(l.discrepancy_value(), Some((counted - system) * unit_cost));
        }

        /// Once finalized, the discrepancy ignores the live snapshot field
        #[test]
        fn prop_finalization_freezes(
            frozen in quantity_strategy(),
            drifted in quantity_strategy(),
            counted in quantity_strategy()
        ) {
            let mut l = line("0", None, "1");
            l.counted_quantity = Some(counted);
            l.system_quantity_at_finalization = Some(frozen);

            l.system_quantity = drifted;
            prop_assert_eq!(l.discrepancy(), Some(counted - frozen));
        }

        /// The summary's discrepancy value is the sum of the per-line
        /// values, and counted_items never exceeds total_items
        #[test]
        fn prop_summary_consistency(
            quantities in prop::collection::vec(
                (quantity_strategy(), prop::option::of(quantity_strategy()), cost_strategy()),
                0..20
            )
        ) {
            let lines: Vec<CountItem> = quantities
                .iter()
                .map(|(system, counted, cost)| {
                    let mut l = line("0", None, "1");
                    l.system_quantity = *system;
                    l.counted_quantity = *counted;
                    l.unit_cost = *cost;
                    l
                })
                .collect();

            let summary = summarize(&lines);
            prop_assert_eq!(summary.total_items, lines.len() as i64);
            prop_assert!(summary.counted_items <= summary.total_items);
            prop_assert!(summary.discrepancies <= summary.counted_items);

            let expected: Decimal = lines
                .iter()
                .filter_map(|l| l.discrepancy_value())
                .sum();
            prop_assert_eq!(summary.discrepancy_value, expected);
        }
    }
}
