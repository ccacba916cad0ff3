// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Path Engine

//! Sequential routing with live capacity depletion.
//!
//! Transactions are processed strictly in input order: every capacity
//! mutation made by transaction i is observable to transaction i+1, so the
//! ordering is part of the engine's contract. The graph and capacity state
//! are snapshotted on entry; the caller's copies are never touched.

use std::collections::HashMap;

use rand_chacha::ChaCha8Rng;

use crate::capacity::CapacityMap;
use crate::genetic::{GeneticExtender, BEST_RATIO, POPULATION_SIZE};
use crate::graph::SearchGraph;
use crate::types::{NodeCatalog, NodeId, PathResult, RouterFee, Transaction, Vertex};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Fatal routing failures. A transaction that simply has no route is not an
/// error; it yields a null-cost [`PathResult`] and the run continues.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// The graph still offered an edge whose live capacity cannot carry the
    /// amount: state and graph have diverged.
    #[error("forward update on {src}->{trg}: live capacity {live_cap:.1} below amount {amount}")]
    StateDesync {
        src: String,
        trg: String,
        live_cap: f64,
        amount: u64,
    },
    #[error("loop detected: target {0} appears inside the path")]
    LoopDetected(String),
    #[error("crossover produced an invalid path through {0}")]
    InvalidCrossover(String),
}

// ─── Options & outcome ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteOptions<'a> {
    /// Collect per-router transaction buckets for the counterfactual sweep.
    pub hash_by_router: bool,
    /// Grow multi-hop paths shorter than this to the required hop count.
    pub required_length: Option<usize>,
    /// Insertion bias for the genetic extender; absent means uniform.
    pub router_weights: Option<&'a HashMap<NodeId, f64>>,
}

#[derive(Debug, Default)]
pub struct RoutingOutcome {
    /// One result per transaction, in input order.
    pub paths: Vec<PathResult>,
    /// Transactions grouped by every router that carried them.
    pub buckets: HashMap<NodeId, Vec<Transaction>>,
    pub router_fees: Vec<RouterFee>,
    /// Number of times each node lost an incoming edge to depletion.
    pub depletions: HashMap<NodeId, u64>,
    /// Rounds executed per genetic extension, -1 when init found nothing.
    pub genetic_rounds: Vec<i32>,
    /// Capacity state after the run (present when depletion was tracked).
    pub capacities: Option<CapacityMap>,
    /// Search graph after the run.
    pub graph: SearchGraph,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Route `transactions` over a snapshot of `graph` and `capacities`.
///
/// With `capacities == None` the loop never touches capacity: paths are
/// static min-weight paths and the result is independent of transaction
/// order.
pub fn route_transactions(
    capacities: Option<&CapacityMap>,
    graph: &SearchGraph,
    transactions: &[Transaction],
    catalog: &NodeCatalog,
    opts: &RouteOptions,
    rng: &mut ChaCha8Rng,
) -> Result<RoutingOutcome, RoutingError> {
    let mut graph = graph.clone();
    let mut capacities = capacities.cloned();
    let mut outcome = RoutingOutcome::default();

    for tx in transactions {
        let source = Vertex::Real(tx.source);
        let sink = Vertex::Target(tx.target);
        if !graph.contains_vertex(source) || !graph.contains_vertex(sink) {
            outcome.paths.push(PathResult::failed(tx.transaction_id));
            continue;
        }
        let Some((_, mut path)) = graph.shortest_path(source, sink) else {
            outcome.paths.push(PathResult::failed(tx.transaction_id));
            continue;
        };

        if let Some(required) = opts.required_length {
            // Only multi-hop paths are extended; direct payments stay as-is.
            if path.len() > 3 && path.len() - 1 < required {
                let extender =
                    GeneticExtender::new(required, &graph, opts.router_weights, catalog);
                match extender.run(&path, POPULATION_SIZE, BEST_RATIO, rng)? {
                    Some(extension) => {
                        outcome.genetic_rounds.push(extension.rounds as i32);
                        path = extension.path;
                    }
                    None => outcome.genetic_rounds.push(-1),
                }
            }
        }

        // The target may only appear as the hop feeding its own sink.
        if path.len() >= 3 && path[1..path.len() - 2].contains(&Vertex::Real(tx.target)) {
            return Err(RoutingError::LoopDetected(
                catalog.key(tx.target).to_string(),
            ));
        }

        let (cost, hop_fees) = process_path(
            &path,
            tx.amount,
            &mut capacities,
            &mut graph,
            catalog,
            &mut outcome.depletions,
        )?;
        for &(node, fee) in &hop_fees {
            outcome.router_fees.push(RouterFee {
                transaction_id: tx.transaction_id,
                node,
                fee,
            });
            if opts.hash_by_router {
                outcome.buckets.entry(node).or_default().push(*tx);
            }
        }
        outcome
            .paths
            .push(PathResult::found(tx.transaction_id, cost, path));
    }

    outcome.capacities = capacities;
    outcome.graph = graph;
    Ok(outcome)
}

/// Apply one successful path to the capacity state.
///
/// Walks every real hop (all but the final pseudo hop): records the head
/// node's incoming fee, then debits the forward direction and credits the
/// reverse one. The fee of the final real edge into the target is part of
/// the cost and is attributed to the target as the path's last
/// intermediate node; no separate router earns it.
fn process_path(
    path: &[Vertex],
    amount: u64,
    capacities: &mut Option<CapacityMap>,
    graph: &mut SearchGraph,
    catalog: &NodeCatalog,
    depletions: &mut HashMap<NodeId, u64>,
) -> Result<(f64, Vec<(NodeId, f64)>), RoutingError> {
    let mut fees = Vec::with_capacity(path.len().saturating_sub(2));
    let mut cost = 0.0;
    for i in 0..path.len().saturating_sub(2) {
        let (from_vertex, to_vertex) = (path[i], path[i + 1]);
        let (from, to) = (from_vertex.node(), to_vertex.node());
        let fee = graph
            .edge(from_vertex, to_vertex)
            .map(|data| data.fee)
            .expect("path hops are edges of the search graph");
        cost += fee;
        fees.push((to, fee));
        if let Some(state) = capacities.as_mut() {
            if forward_update(state, graph, amount, from, to, catalog)? {
                *depletions.entry(to).or_insert(0) += 1;
            }
            backward_update(state, graph, amount, to, from);
        }
    }
    Ok((cost, fees))
}

/// Debit the forward direction. Removes the edge from the graph once its
/// live capacity can no longer carry two payments; returns whether that
/// removal happened. A live capacity already below the amount is a fatal
/// desync, because the graph should have dropped the edge earlier.
fn forward_update(
    capacities: &mut CapacityMap,
    graph: &mut SearchGraph,
    amount: u64,
    src: NodeId,
    trg: NodeId,
    catalog: &NodeCatalog,
) -> Result<bool, RoutingError> {
    let amt = amount as f64;
    let state = match capacities.get_mut(src, trg) {
        Some(state) if state.live_cap >= amt => state,
        found => {
            return Err(RoutingError::StateDesync {
                src: catalog.key(src).to_string(),
                trg: catalog.key(trg).to_string(),
                live_cap: found.map(|s| s.live_cap).unwrap_or(0.0),
                amount,
            })
        }
    };
    state.live_cap -= amt;
    let removed = state.live_cap < 2.0 * amt;
    if removed {
        graph.remove_channel_edge(src, trg);
    }
    Ok(removed)
}

/// Credit the reverse direction, if that side exists as a channel. A side
/// whose pre-credit live capacity was below the amount had been dropped
/// from the graph and becomes routable again.
fn backward_update(
    capacities: &mut CapacityMap,
    graph: &mut SearchGraph,
    amount: u64,
    src: NodeId,
    trg: NodeId,
) {
    let amt = amount as f64;
    if let Some(state) = capacities.get_mut(src, trg) {
        if state.live_cap < amt {
            graph.insert_channel_edge(src, trg, state.live_cap + amt, state.fee);
        }
        state.live_cap += amt;
    }
}
