//! Deterministic topological ordering of ledger transactions
//!
//! Kahn's algorithm with a min-heap instead of a FIFO queue:
//! - ready transactions leave the heap ordered by (date, id)
//! - dependencies absent from the input are treated as already applied
//! - transactions unreachable from genesis are excluded from the output
//!
//! The result is identical for every permutation of the same input set.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ledger::Transaction;

use super::errors::{SorterError, SorterResult};
use super::heap::Heap;

/// Output of [`sort_transactions`].
#[derive(Debug, Clone, Default)]
pub struct TransactionOrdering {
    /// Reachable transactions in replay order
    pub transactions: Vec<Transaction>,
    /// Ordered transactions no other ordered transaction depends on
    pub leaves: Vec<Transaction>,
    /// Ids of input transactions unreachable from genesis
    pub excluded: Vec<String>,
}

impl TransactionOrdering {
    pub fn ids(&self) -> Vec<String> {
        self.transactions.iter().map(|t| t.id.clone()).collect()
    }

    pub fn leaf_ids(&self) -> Vec<String> {
        self.leaves.iter().map(|t| t.id.clone()).collect()
    }
}

struct Node {
    successors: Vec<usize>,
    unresolved: usize,
}

fn compare_by_date_then_id(a: &Transaction, b: &Transaction) -> Ordering {
    a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id))
}

/// Sorts `transactions` into replay order and detects the current leaves.
///
/// # Errors
///
/// Returns `SorterError::NoGenesisTransaction` if a non-empty input contains
/// no transaction without dependencies.
pub fn sort_transactions(transactions: Vec<Transaction>) -> SorterResult<TransactionOrdering> {
    if transactions.is_empty() {
        return Ok(TransactionOrdering::default());
    }

    // First occurrence of an id wins
    let mut txs: Vec<Transaction> = Vec::with_capacity(transactions.len());
    let mut index_by_id: HashMap<String, usize> = HashMap::with_capacity(transactions.len());
    for tx in transactions {
        if index_by_id.contains_key(&tx.id) {
            continue;
        }
        index_by_id.insert(tx.id.clone(), txs.len());
        txs.push(tx);
    }

    let mut nodes: Vec<Node> = (0..txs.len())
        .map(|_| Node {
            successors: Vec::new(),
            unresolved: 0,
        })
        .collect();

    for (index, tx) in txs.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &tx.deps {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            if let Some(&dep_index) = index_by_id.get(dep) {
                nodes[dep_index].successors.push(index);
                nodes[index].unresolved += 1;
            }
        }
    }

    let genesis = txs
        .iter()
        .enumerate()
        .filter(|(_, tx)| tx.is_genesis())
        .min_by(|(_, a), (_, b)| compare_by_date_then_id(a, b))
        .map(|(index, _)| index)
        .ok_or(SorterError::NoGenesisTransaction { count: txs.len() })?;

    let mut heap = Heap::with_capacity(txs.len(), |a: &usize, b: &usize| {
        compare_by_date_then_id(&txs[*a], &txs[*b])
    });
    heap.insert(genesis);

    let mut order: Vec<usize> = Vec::with_capacity(txs.len());
    while let Some(index) = heap.remove_smallest() {
        order.push(index);
        for position in 0..nodes[index].successors.len() {
            let successor = nodes[index].successors[position];
            let node = &mut nodes[successor];
            node.unresolved -= 1;
            if node.unresolved == 0 {
                heap.insert(successor);
            }
        }
    }
    drop(heap);

    let emitted: HashSet<usize> = order.iter().copied().collect();
    let leaf_indexes: Vec<usize> = order
        .iter()
        .copied()
        .filter(|index| {
            !nodes[*index]
                .successors
                .iter()
                .any(|successor| emitted.contains(successor))
        })
        .collect();

    if order.len() < txs.len() {
        debug!(
            event = "sorter_excluded_unreachable",
            excluded = txs.len() - order.len(),
            "transactions unreachable from genesis were excluded"
        );
    }

    let excluded = txs
        .iter()
        .enumerate()
        .filter(|(index, _)| !emitted.contains(index))
        .map(|(_, tx)| tx.id.clone())
        .collect();

    let mut slots: Vec<Option<Transaction>> = txs.into_iter().map(Some).collect();
    let leaves = leaf_indexes
        .iter()
        .filter_map(|index| slots[*index].clone())
        .collect();
    let transactions = order
        .iter()
        .filter_map(|index| slots[*index].take())
        .collect();

    Ok(TransactionOrdering {
        transactions,
        leaves,
        excluded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Payload;

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

    #[test]
    fn test_empty_input_yields_empty_ordering() {
        let ordering = sort_transactions(vec![]).unwrap();
        assert!(ordering.transactions.is_empty());
        assert!(ordering.leaves.is_empty());
    }

    #[test]
    fn test_single_genesis() {
        let ordering = sort_transactions(vec![tx("a", 1, &[])]).unwrap();
        assert_eq!(ordering.ids(), vec!["a"]);
        assert_eq!(ordering.leaf_ids(), vec!["a"]);
    }

    #[test]
    fn test_missing_genesis_is_fatal() {
        let err = sort_transactions(vec![tx("b", 2, &["a"]), tx("c", 3, &["b"])]).unwrap_err();
        assert_eq!(err, SorterError::NoGenesisTransaction { count: 2 });
    }

    #[test]
    fn test_missing_dependencies_are_ignored() {
        // "x" was never fetched; "b" still resolves through "a"
        let ordering =
            sort_transactions(vec![tx("b", 2, &["a", "x"]), tx("a", 1, &[])]).unwrap();
        assert_eq!(ordering.ids(), vec!["a", "b"]);
        assert_eq!(ordering.leaf_ids(), vec!["b"]);
    }

    #[test]
    fn test_equal_dates_break_ties_by_id() {
        let ordering = sort_transactions(vec![
            tx("c", 5, &["a"]),
            tx("b", 5, &["a"]),
            tx("a", 1, &[]),
        ])
        .unwrap();
        assert_eq!(ordering.ids(), vec!["a", "b", "c"]);
        assert_eq!(ordering.leaf_ids(), vec!["b", "c"]);
    }

    #[test]
    fn test_duplicate_dependency_counts_once() {
        let ordering =
            sort_transactions(vec![tx("a", 1, &[]), tx("b", 2, &["a", "a"])]).unwrap();
        assert_eq!(ordering.ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_second_genesis_branch_is_excluded() {
        let ordering = sort_transactions(vec![
            tx("a", 1, &[]),
            tx("z", 2, &[]),
            tx("y", 3, &["z"]),
            tx("b", 4, &["a"]),
        ])
        .unwrap();
        assert_eq!(ordering.ids(), vec!["a", "b"]);
        assert_eq!(ordering.leaf_ids(), vec!["b"]);

        let mut excluded = ordering.excluded.clone();
        excluded.sort();
        assert_eq!(excluded, vec!["y", "z"]);
    }
}
