// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Capacity State

use std::collections::{HashMap, HashSet};

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::types::{DirectedEdge, NodeId};

// ─── Channel state ───────────────────────────────────────────────────────────

/// Live state of one directed channel side.
///
/// A (src, trg) whose reverse also exists forms an undirected channel: the
/// two sides share one physical capacity, split randomly at init, and
/// `live_cap(s,t) + live_cap(t,s)` stays equal to that capacity for the
/// whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    /// Mutable routable balance in satoshi.
    pub live_cap: f64,
    /// Total routing fee of this side for the configured amount.
    pub fee: f64,
    /// True iff trg is some transaction's target.
    pub is_target_side: bool,
    /// Immutable aggregated capacity of this side.
    pub total_cap: f64,
}

/// Per-directed-edge live capacity for a run. Run-scoped and passed
/// explicitly; the path engine is its only mutator.
#[derive(Debug, Clone, Default)]
pub struct CapacityMap {
    states: HashMap<(NodeId, NodeId), ChannelState>,
}

impl CapacityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, src: NodeId, trg: NodeId, state: ChannelState) {
        self.states.insert((src, trg), state);
    }

    pub fn get(&self, src: NodeId, trg: NodeId) -> Option<&ChannelState> {
        self.states.get(&(src, trg))
    }

    pub fn get_mut(&mut self, src: NodeId, trg: NodeId) -> Option<&mut ChannelState> {
        self.states.get_mut(&(src, trg))
    }

    pub fn contains(&self, src: NodeId, trg: NodeId) -> bool {
        self.states.contains_key(&(src, trg))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(NodeId, NodeId), &ChannelState)> {
        self.states.iter()
    }

    /// Largest violation of the undirected-channel conservation invariant:
    /// for every two-sided channel, the live capacities must sum to the
    /// larger of the two aggregated capacities.
    pub fn max_conservation_error(&self) -> f64 {
        let mut worst: f64 = 0.0;
        for (&(src, trg), state) in &self.states {
            if src < trg {
                if let Some(reverse) = self.get(trg, src) {
                    let channel_cap = state.total_cap.max(reverse.total_cap);
                    let error = (state.live_cap + reverse.live_cap - channel_cap).abs();
                    worst = worst.max(error);
                }
            }
        }
        worst
    }
}

// ─── Initialization ──────────────────────────────────────────────────────────

/// One emitted routable edge side: input row for the search graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub src: NodeId,
    pub trg: NodeId,
    pub capacity: f64,
    pub total_fee: f64,
}

/// Build the capacity state and the routable edge rows.
///
/// Physical channels are visited once, in first-occurrence order of the
/// directed edge list. Two-sided channels take `max` of the two aggregated
/// capacities and split it at a uniform random point; one-sided channels
/// keep their full capacity. Only sides with `live_cap >= amount` are
/// emitted as graph rows.
pub fn init_capacities(
    edges: &[DirectedEdge],
    targets: &HashSet<NodeId>,
    amount: u64,
    rng: &mut ChaCha8Rng,
) -> (CapacityMap, Vec<GraphEdge>) {
    let amount = amount as f64;
    let mut map = CapacityMap::new();
    for edge in edges {
        map.insert(
            edge.src,
            edge.trg,
            ChannelState {
                live_cap: 0.0,
                fee: edge.total_fee,
                is_target_side: targets.contains(&edge.trg),
                total_cap: edge.capacity,
            },
        );
    }

    let mut rows = Vec::new();
    let mut visited: HashSet<(NodeId, NodeId)> = HashSet::new();
    for edge in edges {
        let (src, trg) = (edge.src, edge.trg);
        if visited.contains(&(src, trg)) || visited.contains(&(trg, src)) {
            continue;
        }
        visited.insert((src, trg));

        let forward_cap = if map.contains(trg, src) {
            let reverse_total = map.get(trg, src).map(|s| s.total_cap).unwrap_or(0.0);
            let channel_cap = edge.capacity.max(reverse_total);
            let split: f64 = rng.gen();
            let reverse_cap = channel_cap * (1.0 - split);
            let reverse = map.get_mut(trg, src).expect("reverse side exists");
            reverse.live_cap = reverse_cap;
            let reverse_fee = reverse.fee;
            if reverse_cap >= amount {
                rows.push(GraphEdge {
                    src: trg,
                    trg: src,
                    capacity: reverse_cap,
                    total_fee: reverse_fee,
                });
            }
            channel_cap * split
        } else {
            edge.capacity
        };

        let forward = map.get_mut(src, trg).expect("forward side exists");
        forward.live_cap = forward_cap;
        if forward_cap >= amount {
            rows.push(GraphEdge {
                src,
                trg,
                capacity: forward_cap,
                total_fee: forward.fee,
            });
        }
    }
    log::debug!(
        "capacity init: {} directed sides, {} routable",
        map.len(),
        rows.len()
    );
    (map, rows)
}
