// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Counterfactual Sweep

//! Per-router node-exclusion recomputation. Every bucketed router is
//! removed from a private snapshot of the graph and its transactions are
//! re-routed against a fresh copy of the initial capacity state, measuring
//! what the payments would cost without that router. Workers share
//! nothing; the sweep is embarrassingly parallel across routers.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::HashMap;

use crate::capacity::CapacityMap;
use crate::graph::SearchGraph;
use crate::routing::{route_transactions, RouteOptions, RoutingError};
use crate::types::{AlternativePath, NodeCatalog, NodeId, Transaction};

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("counterfactual worker for router {router} failed: {source}")]
    Worker {
        router: String,
        #[source]
        source: RoutingError,
    },
    #[error("failed to build sweep thread pool: {0}")]
    Pool(String),
}

/// Re-route one router's bucket with that router (and its pseudo-target
/// form) removed from the graph.
pub fn shortest_paths_with_exclusion(
    capacities: Option<&CapacityMap>,
    graph: &SearchGraph,
    transactions: &[Transaction],
    node: NodeId,
    catalog: &NodeCatalog,
    seed: u64,
) -> Result<Vec<AlternativePath>, RoutingError> {
    let mut pruned = graph.clone();
    pruned.exclude_node(node);
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(node.0 as u64));
    let outcome = route_transactions(
        capacities,
        &pruned,
        transactions,
        catalog,
        &RouteOptions::default(),
        &mut rng,
    )?;
    Ok(outcome
        .paths
        .into_iter()
        .map(|path| AlternativePath { node, path })
        .collect())
}

/// Run the sweep over every bucketed router.
///
/// Routers are processed in ascending id order and their result frames
/// concatenated in that order, so the output is deterministic regardless
/// of worker scheduling. With `max_threads <= 1` the sweep degrades to a
/// plain sequential loop.
pub fn run_node_removal_sweep(
    capacities: Option<&CapacityMap>,
    graph: &SearchGraph,
    buckets: &HashMap<NodeId, Vec<Transaction>>,
    catalog: &NodeCatalog,
    max_threads: usize,
    seed: u64,
) -> Result<Vec<AlternativePath>, SweepError> {
    let mut items: Vec<(NodeId, &Vec<Transaction>)> =
        buckets.iter().map(|(node, txs)| (*node, txs)).collect();
    items.sort_by_key(|(node, _)| *node);

    let worker = |&(node, transactions): &(NodeId, &Vec<Transaction>)| {
        shortest_paths_with_exclusion(capacities, graph, transactions, node, catalog, seed)
            .map_err(|source| SweepError::Worker {
                router: catalog.key(node).to_string(),
                source,
            })
    };

    log::info!(
        "counterfactual sweep over {} routers on {} thread(s)",
        items.len(),
        max_threads.max(1)
    );
    let frames: Vec<Vec<AlternativePath>> = if max_threads > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_threads)
            .build()
            .map_err(|e| SweepError::Pool(e.to_string()))?;
        pool.install(|| items.par_iter().map(worker).collect::<Result<_, _>>())?
    } else {
        items.iter().map(worker).collect::<Result<_, _>>()?
    };
    Ok(frames.into_iter().flatten().collect())
}
