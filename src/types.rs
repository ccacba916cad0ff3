// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Type Definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Reserved suffix for pseudo-target vertices. No real pub_key may end in it.
pub const TARGET_SUFFIX: &str = "_trg";

// ─── NodeId / NodeCatalog ────────────────────────────────────────────────────

/// Interned node identifier. The mapping to the LN public key lives in the
/// run's [`NodeCatalog`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Append-only pub_key interner, owned by a simulation run.
#[derive(Debug, Clone, Default)]
pub struct NodeCatalog {
    keys: Vec<String>,
    index: HashMap<String, NodeId>,
}

impl NodeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `key`, returning its stable id.
    pub fn intern(&mut self, key: &str) -> NodeId {
        if let Some(&id) = self.index.get(key) {
            return id;
        }
        let id = NodeId(self.keys.len() as u32);
        self.keys.push(key.to_string());
        self.index.insert(key.to_string(), id);
        id
    }

    pub fn lookup(&self, key: &str) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub fn key(&self, id: NodeId) -> &str {
        &self.keys[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// ─── Vertex ──────────────────────────────────────────────────────────────────

/// Search-graph vertex: a real node or its pseudo-target sink.
///
/// The pseudo form exists so shortest-path queries land on the target
/// without the target ever acting as an interior router; it has no outgoing
/// edges. Rendered with the reserved `_trg` suffix on export.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Vertex {
    Real(NodeId),
    Target(NodeId),
}

impl Vertex {
    pub fn node(&self) -> NodeId {
        match self {
            Vertex::Real(n) | Vertex::Target(n) => *n,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(self, Vertex::Target(_))
    }

    /// Human-readable label, with the `_trg` suffix for pseudo-targets.
    pub fn label(&self, catalog: &NodeCatalog) -> String {
        match self {
            Vertex::Real(n) => catalog.key(*n).to_string(),
            Vertex::Target(n) => format!("{}{}", catalog.key(*n), TARGET_SUFFIX),
        }
    }
}

// ─── Edge records ────────────────────────────────────────────────────────────

/// Aggregated directed edge. At most one record per (src, trg); multi-edges
/// in the raw snapshot are summed on capacity and mean-averaged on fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectedEdge {
    pub src: NodeId,
    pub trg: NodeId,
    /// Satoshi. Kept as f64 so capacity scaling composes with the split.
    pub capacity: f64,
    /// Total routing fee for the configured amount, in satoshi.
    pub total_fee: f64,
    /// Mean base fee in satoshi.
    pub base_fee: f64,
    /// Mean proportional rate, satoshi per million satoshi.
    pub rate: f64,
}

/// Per-node degree and incident capacity, used by the transaction sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: NodeId,
    pub degree: u32,
    pub total_capacity: f64,
}

// ─── Transactions & path results ─────────────────────────────────────────────

/// A sampled payment. `source != target` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: usize,
    pub source: NodeId,
    pub target: NodeId,
    /// Payment amount in satoshi.
    pub amount: u64,
}

/// Outcome of routing one transaction.
///
/// On success the path ends `..., Real(target), Target(target)` and
/// `length == path.len() - 1` (the pseudo hop included). `cost` sums the
/// fees of every real hop; the final pseudo hop contributes zero. Failure
/// is encoded as `cost == None` with an empty path and length -1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub transaction_id: usize,
    pub cost: Option<f64>,
    pub length: i64,
    pub path: Vec<Vertex>,
}

impl PathResult {
    pub fn failed(transaction_id: usize) -> Self {
        Self {
            transaction_id,
            cost: None,
            length: -1,
            path: Vec::new(),
        }
    }

    pub fn found(transaction_id: usize, cost: f64, path: Vec<Vertex>) -> Self {
        let length = path.len() as i64 - 1;
        Self {
            transaction_id,
            cost: Some(cost),
            length,
            path,
        }
    }

    pub fn is_success(&self) -> bool {
        self.cost.is_some()
    }
}

/// One fee record per intermediate node of a successful path.
///
/// The fee is the node's incoming edge fee. By construction the last
/// intermediate node is the payment target itself, so the final real edge's
/// fee is accounted both here and in the path cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouterFee {
    pub transaction_id: usize,
    pub node: NodeId,
    pub fee: f64,
}

/// A counterfactual path computed with `node` excluded from the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativePath {
    pub node: NodeId,
    pub path: PathResult,
}

// ─── Simulation parameters ───────────────────────────────────────────────────

/// Search-weight column of the aggregated edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightColumn {
    #[default]
    TotalFee,
    Capacity,
}

/// Full configuration surface of a run, serialized verbatim to
/// `params.json` on export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    /// Payment amount in satoshi.
    pub amount: u64,
    /// Number of transactions to sample.
    pub count: usize,
    /// Merchant bias in [0, 1].
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// When false, capacities are never tracked and paths are static.
    #[serde(default = "default_true")]
    pub with_depletion: bool,
    #[serde(default = "default_true")]
    pub drop_disabled: bool,
    #[serde(default = "default_true")]
    pub drop_low_cap: bool,
    /// Keep only edges updated within this window of the newest update.
    #[serde(default)]
    pub time_window: Option<i64>,
    /// Drop edges with `last_update` at or after this timestamp.
    #[serde(default)]
    pub ts_upper_bound: Option<i64>,
    #[serde(default)]
    pub weight: WeightColumn,
    /// Gates the counterfactual sweep and optimal-fee analysis.
    #[serde(default)]
    pub with_node_removals: bool,
    #[serde(default = "default_threads")]
    pub max_threads: usize,
    /// Nodes removed from the graph (real and pseudo form) before routing.
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Minimum hop count; shorter multi-hop paths are genetically extended.
    #[serde(default)]
    pub required_length: Option<usize>,
    /// Scale capacities on edges touching these nodes by `capacity_fraction`.
    #[serde(default)]
    pub cap_change_nodes: Vec<String>,
    #[serde(default = "default_fraction")]
    pub capacity_fraction: f64,
    /// Retention floor for the fee-threshold sweep.
    #[serde(default)]
    pub min_ratio: f64,
    /// Root seed; every random component derives its own stream from it.
    #[serde(default)]
    pub seed: u64,
}

fn default_epsilon() -> f64 {
    0.8
}

fn default_true() -> bool {
    true
}

fn default_threads() -> usize {
    4
}

fn default_fraction() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_interns_once() {
        let mut catalog = NodeCatalog::new();
        let a = catalog.intern("alice");
        let b = catalog.intern("bob");
        assert_ne!(a, b);
        assert_eq!(catalog.intern("alice"), a);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.key(b), "bob");
        assert_eq!(catalog.lookup("bob"), Some(b));
        assert_eq!(catalog.lookup("carol"), None);
    }

    #[test]
    fn vertex_labels_carry_suffix() {
        let mut catalog = NodeCatalog::new();
        let a = catalog.intern("alice");
        assert_eq!(Vertex::Real(a).label(&catalog), "alice");
        assert_eq!(Vertex::Target(a).label(&catalog), "alice_trg");
        assert!(Vertex::Target(a).is_pseudo());
        assert_eq!(Vertex::Target(a).node(), a);
    }

    #[test]
    fn failed_path_has_negative_length() {
        let p = PathResult::failed(7);
        assert_eq!(p.transaction_id, 7);
        assert!(p.cost.is_none());
        assert_eq!(p.length, -1);
        assert!(p.path.is_empty());
    }

    #[test]
    fn params_fill_defaults() {
        let params: SimParams =
            serde_json::from_str(r#"{"amount": 60000, "count": 5000}"#).unwrap();
        assert!((params.epsilon - 0.8).abs() < f64::EPSILON);
        assert!(params.with_depletion);
        assert!(params.drop_disabled);
        assert_eq!(params.weight, WeightColumn::TotalFee);
        assert!(!params.with_node_removals);
        assert_eq!(params.max_threads, 4);
        assert!((params.capacity_fraction - 1.0).abs() < f64::EPSILON);
        assert_eq!(params.seed, 0);
    }
}
