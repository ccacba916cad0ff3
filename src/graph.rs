// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Search Graph

//! Mutable directed graph used for path search. Vertices are tagged
//! (`Real` node or pseudo-target sink), edges carry the configured search
//! weight alongside the routing fee, and the whole structure clones
//! cheaply enough to snapshot per counterfactual worker.
//!
//! Every transaction target `v` is reachable only through the zero-weight
//! sink edge `Real(v) -> Target(v)`: shortest-path queries land on the
//! sink, the final real hop into the target pays its fee like any other,
//! and the target can never serve as a router for a payment addressed to
//! it (the sink has no outgoing edges, and a simple path cannot revisit
//! the target before the sink hop).

use std::collections::HashSet;

use petgraph::algo::astar;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::capacity::GraphEdge;
use crate::types::{NodeId, Vertex, WeightColumn};

/// Edge payload: `weight` drives the search, `fee` is always the total
/// routing fee regardless of the configured weight column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeData {
    pub weight: f64,
    pub fee: f64,
}

#[derive(Debug, Clone)]
pub struct SearchGraph {
    graph: DiGraphMap<Vertex, EdgeData>,
    weight: WeightColumn,
}

impl Default for SearchGraph {
    fn default() -> Self {
        Self {
            graph: DiGraphMap::new(),
            weight: WeightColumn::default(),
        }
    }
}

impl SearchGraph {
    /// Build the search graph from emitted edge rows. Rows below the
    /// payment amount are skipped; every target present in the row set
    /// gets its pseudo sink.
    pub fn build(
        rows: &[GraphEdge],
        targets: &HashSet<NodeId>,
        weight: WeightColumn,
        amount: u64,
    ) -> Self {
        let mut graph = DiGraphMap::new();
        for row in rows {
            if row.capacity < amount as f64 {
                continue;
            }
            let edge_weight = match weight {
                WeightColumn::TotalFee => row.total_fee,
                WeightColumn::Capacity => row.capacity,
            };
            graph.add_edge(
                Vertex::Real(row.src),
                Vertex::Real(row.trg),
                EdgeData {
                    weight: edge_weight,
                    fee: row.total_fee,
                },
            );
        }
        let mut sinks: Vec<NodeId> = targets.iter().copied().collect();
        sinks.sort();
        for target in sinks {
            if graph.contains_node(Vertex::Real(target)) {
                graph.add_edge(
                    Vertex::Real(target),
                    Vertex::Target(target),
                    EdgeData {
                        weight: 0.0,
                        fee: 0.0,
                    },
                );
            }
        }
        Self { graph, weight }
    }

    /// Re-insert a channel side, deriving the search weight from the live
    /// capacity when routing by capacity.
    pub fn insert_channel_edge(&mut self, src: NodeId, trg: NodeId, live_cap: f64, fee: f64) {
        let weight = match self.weight {
            WeightColumn::TotalFee => fee,
            WeightColumn::Capacity => live_cap,
        };
        self.graph
            .add_edge(Vertex::Real(src), Vertex::Real(trg), EdgeData { weight, fee });
    }

    pub fn remove_channel_edge(&mut self, src: NodeId, trg: NodeId) -> bool {
        self.graph
            .remove_edge(Vertex::Real(src), Vertex::Real(trg))
            .is_some()
    }

    /// Remove a node in both its real and pseudo form.
    pub fn exclude_node(&mut self, node: NodeId) {
        self.graph.remove_node(Vertex::Real(node));
        self.graph.remove_node(Vertex::Target(node));
    }

    pub fn contains_vertex(&self, vertex: Vertex) -> bool {
        self.graph.contains_node(vertex)
    }

    pub fn has_edge(&self, from: Vertex, to: Vertex) -> bool {
        self.graph.contains_edge(from, to)
    }

    pub fn edge(&self, from: Vertex, to: Vertex) -> Option<&EdgeData> {
        self.graph.edge_weight(from, to)
    }

    pub fn successors(&self, vertex: Vertex) -> impl Iterator<Item = Vertex> + '_ {
        self.graph.neighbors_directed(vertex, Direction::Outgoing)
    }

    pub fn predecessors(&self, vertex: Vertex) -> impl Iterator<Item = Vertex> + '_ {
        self.graph.neighbors_directed(vertex, Direction::Incoming)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Minimum-weight path, Dijkstra over the configured weight column.
    pub fn shortest_path(&self, from: Vertex, to: Vertex) -> Option<(f64, Vec<Vertex>)> {
        astar(
            &self.graph,
            from,
            |vertex| vertex == to,
            |(_, _, data): (Vertex, Vertex, &EdgeData)| data.weight,
            |_| 0.0,
        )
    }

    /// Fee cost of a path: the sum over every hop except the final
    /// zero-fee pseudo hop.
    pub fn path_fee_cost(&self, path: &[Vertex]) -> f64 {
        path.windows(2)
            .take(path.len().saturating_sub(2))
            .map(|hop| self.edge(hop[0], hop[1]).map(|d| d.fee).unwrap_or(0.0))
            .sum()
    }
}
