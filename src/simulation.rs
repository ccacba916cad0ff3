// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Simulation Core

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::capacity::{self, GraphEdge};
use crate::graph::SearchGraph;
use crate::preprocess;
use crate::pricing::OptimalFeeRow;
use crate::report::{self, ExportError};
use crate::routing::{self, RouteOptions, RoutingError};
use crate::sampling;
use crate::snapshot::{InputError, RawEdge};
use crate::sweep::{self, SweepError};
use crate::types::{
    AlternativePath, DirectedEdge, NodeCatalog, NodeId, NodeInfo, PathResult, RouterFee,
    SimParams, Transaction,
};

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

// Fixed offsets deriving one independent PRNG stream per random component
// from the root seed.
const SAMPLING_STREAM: u64 = 0;
const CAPACITY_STREAM: u64 = 1;
const GENETIC_STREAM: u64 = 2;
const SWEEP_STREAM: u64 = 3;

fn stream_rng(seed: u64, offset: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed.wrapping_add(offset))
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SimulationOutput {
    /// One result per transaction, in input order.
    pub shortest_paths: Vec<PathResult>,
    /// Counterfactual paths, empty unless node removals ran.
    pub alternative_paths: Vec<AlternativePath>,
    pub router_fees: Vec<RouterFee>,
    /// Depletion events per node.
    pub depletions: HashMap<NodeId, u64>,
    /// Success flag per transaction, aligned with `shortest_paths`.
    pub success: Vec<bool>,
}

impl SimulationOutput {
    pub fn success_ratio(&self) -> f64 {
        if self.success.is_empty() {
            return 0.0;
        }
        self.success.iter().filter(|s| **s).count() as f64 / self.success.len() as f64
    }
}

// ─── Simulator ───────────────────────────────────────────────────────────────

/// One payment-traffic experiment: preprocessed edges, sampled workload,
/// and the routing pipeline over them.
///
/// All state is scoped to this value; two simulators never share anything,
/// and a fixed seed reproduces the whole run bit for bit.
pub struct TrafficSimulator {
    params: SimParams,
    catalog: NodeCatalog,
    edges: Vec<DirectedEdge>,
    node_variables: Vec<NodeInfo>,
    active_merchants: Vec<NodeId>,
    transactions: Vec<Transaction>,
}

impl TrafficSimulator {
    /// Preprocess the snapshot and sample the workload.
    pub fn new(raw_edges: &[RawEdge], merchants: &[String], params: SimParams) -> Self {
        let (catalog, edges) = preprocess::prepare_edges(raw_edges, &params);
        let (node_variables, active_merchants, _active_ratio) =
            preprocess::init_node_params(&edges, merchants, &catalog);
        let mut rng = stream_rng(params.seed, SAMPLING_STREAM);
        let transactions = sampling::sample_transactions(
            &node_variables,
            params.amount,
            params.count,
            params.epsilon,
            &active_merchants,
            &mut rng,
        );
        Self {
            params,
            catalog,
            edges,
            node_variables,
            active_merchants,
            transactions,
        }
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn catalog(&self) -> &NodeCatalog {
        &self.catalog
    }

    pub fn edges(&self) -> &[DirectedEdge] {
        &self.edges
    }

    pub fn node_variables(&self) -> &[NodeInfo] {
        &self.node_variables
    }

    pub fn active_merchants(&self) -> &[NodeId] {
        &self.active_merchants
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Run the full pipeline: capacity init, original-graph routing, and
    /// (when enabled) the counterfactual sweep.
    pub fn simulate(&self) -> Result<SimulationOutput, SimError> {
        let params = &self.params;
        let edges = self.scaled_edges();

        let targets: HashSet<NodeId> = self.transactions.iter().map(|tx| tx.target).collect();
        let (capacities, mut graph) = if params.with_depletion {
            let mut rng = stream_rng(params.seed, CAPACITY_STREAM);
            let (map, rows) =
                capacity::init_capacities(&edges, &targets, params.amount, &mut rng);
            let graph = SearchGraph::build(&rows, &targets, params.weight, params.amount);
            (Some(map), graph)
        } else {
            let rows: Vec<GraphEdge> = edges
                .iter()
                .map(|edge| GraphEdge {
                    src: edge.src,
                    trg: edge.trg,
                    capacity: edge.capacity,
                    total_fee: edge.total_fee,
                })
                .collect();
            (
                None,
                SearchGraph::build(&rows, &targets, params.weight, params.amount),
            )
        };

        if !params.excluded.is_empty() {
            for name in &params.excluded {
                if let Some(node) = self.catalog.lookup(name) {
                    graph.exclude_node(node);
                }
            }
            log::info!("{} nodes excluded up front", params.excluded.len());
        }
        log::info!(
            "graph initialized: {} vertices, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        let opts = RouteOptions {
            hash_by_router: params.with_node_removals,
            required_length: params.required_length,
            router_weights: None,
        };
        let mut rng = stream_rng(params.seed, GENETIC_STREAM);
        log::info!("routing {} transactions on the original graph", self.transactions.len());
        let outcome = routing::route_transactions(
            capacities.as_ref(),
            &graph,
            &self.transactions,
            &self.catalog,
            &opts,
            &mut rng,
        )?;

        let success: Vec<bool> = outcome.paths.iter().map(PathResult::is_success).collect();
        let succeeded = success.iter().filter(|s| **s).count();
        log::info!(
            "original routing done: {}/{} transactions succeeded",
            succeeded,
            success.len()
        );
        if params.required_length.is_some() {
            log_genetic_rounds(&outcome.genetic_rounds);
        }

        let alternative_paths = if params.with_node_removals {
            sweep::run_node_removal_sweep(
                capacities.as_ref(),
                &graph,
                &outcome.buckets,
                &self.catalog,
                params.max_threads,
                params.seed.wrapping_add(SWEEP_STREAM),
            )?
        } else {
            Vec::new()
        };

        Ok(SimulationOutput {
            shortest_paths: outcome.paths,
            alternative_paths,
            router_fees: outcome.router_fees,
            depletions: outcome.depletions,
            success,
        })
    }

    /// Write the parameter record and every aggregate table.
    pub fn export(
        &self,
        dir: &Path,
        output: &SimulationOutput,
        opt_fees: Option<&[OptimalFeeRow]>,
    ) -> Result<(), SimError> {
        fs::create_dir_all(dir).map_err(ExportError::Io)?;
        report::export_params(dir, &self.params)?;
        report::export_lengths(dir, &output.shortest_paths)?;
        let incomes = report::total_router_income(&output.router_fees);
        report::export_router_incomes(dir, &incomes, &self.catalog)?;
        let fees =
            report::total_source_fees(&self.transactions, &output.shortest_paths, &self.catalog);
        report::export_source_fees(dir, &fees, &self.catalog)?;
        if let Some(rows) = opt_fees {
            report::export_opt_fees(dir, rows, &self.catalog)?;
        }
        log::info!("export done: {}", dir.display());
        Ok(())
    }

    /// Apply the configured capacity scaling around the named nodes and
    /// drop edges that fall below the payment amount.
    fn scaled_edges(&self) -> Vec<DirectedEdge> {
        let params = &self.params;
        let mut edges = self.edges.clone();
        if params.cap_change_nodes.is_empty() || params.capacity_fraction >= 1.0 {
            return edges;
        }
        let scaled: HashSet<NodeId> = params
            .cap_change_nodes
            .iter()
            .filter_map(|name| self.catalog.lookup(name))
            .collect();
        for edge in &mut edges {
            if scaled.contains(&edge.src) || scaled.contains(&edge.trg) {
                edge.capacity *= params.capacity_fraction;
            }
        }
        let before = edges.len();
        edges.retain(|edge| edge.capacity >= params.amount as f64);
        log::info!(
            "capacity change around {} nodes (fraction {:.4}), {} edges dropped",
            scaled.len(),
            params.capacity_fraction,
            before - edges.len()
        );
        edges
    }
}

fn log_genetic_rounds(rounds: &[i32]) {
    let mut counts: HashMap<i32, u32> = HashMap::new();
    for &r in rounds {
        *counts.entry(r).or_insert(0) += 1;
    }
    let mut common: Vec<(i32, u32)> = counts.into_iter().collect();
    common.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    log::debug!("genetic extension rounds: {common:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(src: &str, trg: &str, capacity: u64, base_msat: f64) -> RawEdge {
        RawEdge {
            src: src.into(),
            trg: trg.into(),
            capacity,
            last_update: 0,
            disabled: false,
            fee_base_msat: base_msat,
            fee_rate_milli_msat: 0.0,
            min_htlc: 1000.0,
        }
    }

    fn params(json: &str) -> SimParams {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn same_seed_reproduces_the_workload() {
        let edges = vec![
            raw("a", "b", 1000, 1000.0),
            raw("b", "c", 1000, 2000.0),
            raw("c", "a", 1000, 3000.0),
            raw("b", "a", 1000, 1000.0),
        ];
        let merchants = vec!["c".to_string()];
        let p = params(r#"{"amount": 10, "count": 50, "seed": 42}"#);
        let sim_a = TrafficSimulator::new(&edges, &merchants, p.clone());
        let sim_b = TrafficSimulator::new(&edges, &merchants, p);
        assert_eq!(sim_a.transactions(), sim_b.transactions());
        assert!(!sim_a.transactions().is_empty());
    }

    #[test]
    fn count_zero_runs_to_empty_output() {
        let edges = vec![raw("a", "b", 1000, 1000.0)];
        let p = params(r#"{"amount": 10, "count": 0, "with_node_removals": true}"#);
        let sim = TrafficSimulator::new(&edges, &[], p);
        let output = sim.simulate().unwrap();
        assert!(output.shortest_paths.is_empty());
        assert!(output.alternative_paths.is_empty());
        assert!(output.router_fees.is_empty());
        assert!((output.success_ratio() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn capacity_scaling_drops_small_edges() {
        let edges = vec![
            raw("a", "b", 15, 1000.0),
            raw("b", "c", 1000, 1000.0),
        ];
        let p = params(
            r#"{"amount": 10, "count": 0,
                "cap_change_nodes": ["a"], "capacity_fraction": 0.5}"#,
        );
        let sim = TrafficSimulator::new(&edges, &[], p);
        let scaled = sim.scaled_edges();
        // a-b scaled to 7.5 < 10 and dropped; b-c untouched.
        assert_eq!(scaled.len(), 1);
        let b = sim.catalog().lookup("b").unwrap();
        assert_eq!(scaled[0].src, b);
    }

    #[test]
    fn excluded_nodes_never_route() {
        let edges = vec![
            raw("a", "b", 1000, 1000.0),
            raw("b", "c", 1000, 2000.0),
            raw("a", "c", 1000, 10000.0),
        ];
        let mut p = params(r#"{"amount": 10, "count": 0, "seed": 1}"#);
        p.excluded = vec!["b".to_string()];
        let mut sim = TrafficSimulator::new(&edges, &[], p);
        // Inject a deterministic workload instead of a sampled one.
        let a = sim.catalog.lookup("a").unwrap();
        let c = sim.catalog.lookup("c").unwrap();
        sim.transactions = vec![Transaction {
            transaction_id: 0,
            source: a,
            target: c,
            amount: 10,
        }];
        let output = sim.simulate().unwrap();
        assert_eq!(output.shortest_paths.len(), 1);
        // With b gone the only route is the expensive direct channel.
        assert_eq!(output.shortest_paths[0].cost, Some(10.0));
    }
}
