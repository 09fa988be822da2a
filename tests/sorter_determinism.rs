//! Transaction ordering properties
//!
//! Replicas must replay the same history in the same order no matter in
//! which order their ledgers return transactions.

use entity_ledger::ledger::{Payload, Transaction};
use entity_ledger::sorter::{sort_transactions, SorterError};

// =============================================================================
// Test Utilities
// =============================================================================

fn tx(id: &str, date: i64, deps: &[&str]) -> Transaction {
    Transaction {
        id: id.to_string(),
        date,
        deps: deps.iter().map(|d| d.to_string()).collect(),
        version: 3,
        signer: None,
        hash: String::new(),
        signature: None,
        payload: Payload::Text(String::new()),
    }
}

/// Every permutation of `items`, via Heap's algorithm.
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    fn generate<T: Clone>(k: usize, items: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
        if k <= 1 {
            out.push(items.clone());
            return;
        }
        for i in 0..k {
            generate(k - 1, items, out);
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
        }
    }
    let mut items = items.to_vec();
    let mut out = Vec::new();
    let len = items.len();
    generate(len, &mut items, &mut out);
    out
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_diamond_order_is_independent_of_input_order() {
    let diamond = vec![
        tx("a", 1, &[]),
        tx("b", 2, &["a"]),
        tx("c", 2, &["a"]),
        tx("d", 3, &["b", "c"]),
    ];

    let all = permutations(&diamond);
    assert_eq!(all.len(), 24);
    for permutation in all {
        let ordering = sort_transactions(permutation).unwrap();
        assert_eq!(ordering.ids(), vec!["a", "b", "c", "d"]);
        assert_eq!(ordering.leaf_ids(), vec!["d"]);
        assert!(ordering.excluded.is_empty());
    }
}

#[test]
fn test_dates_order_independent_branches() {
    let history = vec![
        tx("root", 10, &[]),
        tx("late", 30, &["root"]),
        tx("early", 20, &["root"]),
        tx("after-early", 25, &["early"]),
    ];

    for permutation in permutations(&history) {
        let ordering = sort_transactions(permutation).unwrap();
        assert_eq!(ordering.ids(), vec!["root", "early", "after-early", "late"]);

        let mut leaves = ordering.leaf_ids();
        leaves.sort();
        assert_eq!(leaves, vec!["after-early", "late"]);
    }
}

#[test]
fn test_dependency_wins_over_date() {
    // Clock skew: the dependent transaction claims an earlier date
    let ordering = sort_transactions(vec![tx("b", 1, &["a"]), tx("a", 5, &[])]).unwrap();
    assert_eq!(ordering.ids(), vec!["a", "b"]);
}

// =============================================================================
// Reachability
// =============================================================================

#[test]
fn test_unreachable_transactions_never_appear() {
    let input = vec![
        tx("a", 1, &[]),
        tx("b", 2, &["a"]),
        tx("stray", 0, &["unknown"]),
        tx("cycle-1", 3, &["cycle-2"]),
        tx("cycle-2", 3, &["cycle-1"]),
    ];

    for permutation in permutations(&input) {
        let ordering = sort_transactions(permutation).unwrap();
        assert_eq!(ordering.ids(), vec!["a", "b"]);

        let mut excluded = ordering.excluded.clone();
        excluded.sort();
        assert_eq!(excluded, vec!["cycle-1", "cycle-2", "stray"]);
    }
}

#[test]
fn test_no_genesis() {
    let err = sort_transactions(vec![tx("a", 1, &["b"]), tx("b", 1, &["a"])]).unwrap_err();
    assert!(matches!(err, SorterError::NoGenesisTransaction { count: 2 }));
}
