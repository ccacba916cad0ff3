// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Transaction Sampling

use std::collections::HashSet;

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::types::{NodeId, NodeInfo, Transaction};

/// Sample the payment workload: `count` sources drawn uniformly with
/// replacement, and targets split between merchants (degree-proportional,
/// a floor(epsilon * count) share) and the uniform remainder.
///
/// Self-payments are dropped after the draw, so the returned workload can
/// be slightly smaller than `count`; transaction ids are dense over the
/// surviving rows.
pub fn sample_transactions(
    nodes: &[NodeInfo],
    amount: u64,
    count: usize,
    epsilon: f64,
    merchants: &[NodeId],
    rng: &mut ChaCha8Rng,
) -> Vec<Transaction> {
    if nodes.is_empty() || count == 0 {
        return Vec::new();
    }

    let uniform = |rng: &mut ChaCha8Rng| nodes[rng.gen_range(0..nodes.len())].node;
    let sources: Vec<NodeId> = (0..count).map(|_| uniform(rng)).collect();

    let targets: Vec<NodeId> = if epsilon > 0.0 {
        let merchant_share = (epsilon * count as f64) as usize;
        let mut targets = sample_merchants(nodes, merchant_share, merchants, rng);
        for _ in 0..count - targets.len() {
            targets.push(uniform(rng));
        }
        targets.shuffle(rng);
        targets
    } else {
        (0..count).map(|_| uniform(rng)).collect()
    };

    let transactions: Vec<Transaction> = sources
        .into_iter()
        .zip(targets)
        .filter(|(source, target)| source != target)
        .enumerate()
        .map(|(transaction_id, (source, target))| Transaction {
            transaction_id,
            source,
            target,
            amount,
        })
        .collect();

    let merchant_set: HashSet<NodeId> = merchants.iter().copied().collect();
    let merchant_hits = transactions
        .iter()
        .filter(|tx| merchant_set.contains(&tx.target))
        .count();
    log::info!(
        "sampled {} transactions ({} self-payments removed, merchant target ratio {:.3})",
        transactions.len(),
        count - transactions.len(),
        if transactions.is_empty() {
            0.0
        } else {
            merchant_hits as f64 / transactions.len() as f64
        }
    );
    transactions
}

/// Draw `share` merchant targets with probability proportional to degree.
/// Degenerate merchant sets (empty, or all zero-degree) fall back to the
/// uniform pool with a warning instead of aborting the run.
fn sample_merchants(
    nodes: &[NodeInfo],
    share: usize,
    merchants: &[NodeId],
    rng: &mut ChaCha8Rng,
) -> Vec<NodeId> {
    if share == 0 {
        return Vec::new();
    }
    let merchant_set: HashSet<NodeId> = merchants.iter().copied().collect();
    let pool: Vec<&NodeInfo> = nodes
        .iter()
        .filter(|info| merchant_set.contains(&info.node))
        .collect();
    let weights: Vec<f64> = pool.iter().map(|info| info.degree as f64).collect();
    match WeightedIndex::new(&weights) {
        Ok(dist) => (0..share).map(|_| pool[dist.sample(rng)].node).collect(),
        Err(_) => {
            log::warn!("no active merchants with positive degree; merchant share drawn uniformly");
            (0..share)
                .map(|_| nodes[rng.gen_range(0..nodes.len())].node)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn node(id: u32, degree: u32) -> NodeInfo {
        NodeInfo {
            node: NodeId(id),
            degree,
            total_capacity: 0.0,
        }
    }

    #[test]
    fn empty_count_yields_empty_workload() {
        let nodes = vec![node(0, 1), node(1, 1)];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(sample_transactions(&nodes, 100, 0, 0.8, &[], &mut rng).is_empty());
    }

    #[test]
    fn ids_are_dense_and_self_payments_removed() {
        let nodes = vec![node(0, 1), node(1, 1), node(2, 1)];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let txs = sample_transactions(&nodes, 100, 500, 0.0, &[], &mut rng);
        assert!(txs.len() <= 500);
        for (i, tx) in txs.iter().enumerate() {
            assert_eq!(tx.transaction_id, i);
            assert_ne!(tx.source, tx.target);
            assert_eq!(tx.amount, 100);
        }
    }

    #[test]
    fn full_bias_targets_only_merchants() {
        let nodes = vec![node(0, 5), node(1, 3), node(2, 2), node(3, 1)];
        let merchants = vec![NodeId(1), NodeId(2)];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let txs = sample_transactions(&nodes, 100, 400, 1.0, &merchants, &mut rng);
        assert!(txs
            .iter()
            .all(|tx| tx.target == NodeId(1) || tx.target == NodeId(2)));
    }

    #[test]
    fn merchant_draws_follow_degree() {
        // Degree 9 vs 1: the heavy merchant should take ~90% of targets.
        let nodes = vec![node(0, 1), node(1, 9), node(2, 1)];
        let merchants = vec![NodeId(1), NodeId(2)];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let txs = sample_transactions(&nodes, 100, 4000, 1.0, &merchants, &mut rng);
        let heavy = txs.iter().filter(|tx| tx.target == NodeId(1)).count();
        let ratio = heavy as f64 / txs.len() as f64;
        assert!((ratio - 0.9).abs() < 0.03, "ratio {ratio:.3} expected ~0.9");
    }

    #[test]
    fn zero_degree_merchants_fall_back_to_uniform() {
        let nodes = vec![node(0, 0), node(1, 0), node(2, 0)];
        let merchants = vec![NodeId(0)];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        // Must not panic; targets come from the uniform pool instead.
        let txs = sample_transactions(&nodes, 100, 200, 1.0, &merchants, &mut rng);
        assert!(!txs.is_empty());
    }

    #[test]
    fn same_seed_same_workload() {
        let nodes = vec![node(0, 2), node(1, 4), node(2, 1)];
        let merchants = vec![NodeId(1)];
        let mut rng_a = ChaCha8Rng::seed_from_u64(11);
        let mut rng_b = ChaCha8Rng::seed_from_u64(11);
        let a = sample_transactions(&nodes, 50, 300, 0.8, &merchants, &mut rng_a);
        let b = sample_transactions(&nodes, 50, 300, 0.8, &merchants, &mut rng_b);
        assert_eq!(a, b);
    }
}
