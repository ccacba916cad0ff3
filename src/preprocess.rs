// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Edge Preprocessing

use std::collections::{HashMap, HashSet};

use crate::snapshot::RawEdge;
use crate::types::{DirectedEdge, NodeCatalog, NodeId, NodeInfo, SimParams};

/// Filter the raw directed edges and aggregate them per (src, trg).
///
/// The filter order is part of the observable contract: timestamp upper
/// bound, then low capacity, then recency window, then disabled flag.
/// Swapping it changes the surviving set whenever several filters are
/// active. The per-edge total fee is the base fee plus the proportional
/// fee for the configured amount.
pub fn prepare_edges(raw: &[RawEdge], params: &SimParams) -> (NodeCatalog, Vec<DirectedEdge>) {
    let mut rows: Vec<&RawEdge> = raw.iter().collect();
    let total = rows.len();

    if let Some(upper) = params.ts_upper_bound {
        rows.retain(|e| e.last_update < upper);
        log::info!("edge filter - invalid timestamp: {}", total - rows.len());
    }
    if params.drop_low_cap {
        let before = rows.len();
        rows.retain(|e| e.capacity >= params.amount);
        log::info!("edge filter - capacity: {}", before - rows.len());
    }
    if let Some(window) = params.time_window {
        let before = rows.len();
        if let Some(newest) = rows.iter().map(|e| e.last_update).max() {
            rows.retain(|e| e.last_update >= newest - window);
        }
        log::info!("edge filter - recency: {}", before - rows.len());
    }
    if params.drop_disabled {
        let before = rows.len();
        rows.retain(|e| !e.disabled);
        log::info!("edge filter - disabled: {}", before - rows.len());
    }

    // Aggregate multi-edges, preserving first-occurrence order.
    struct Accum {
        capacity: f64,
        total_fee: f64,
        base_fee: f64,
        rate: f64,
        count: u32,
    }
    let mut catalog = NodeCatalog::new();
    let mut order: Vec<(NodeId, NodeId)> = Vec::new();
    let mut groups: HashMap<(NodeId, NodeId), Accum> = HashMap::new();
    for edge in &rows {
        let key = (catalog.intern(&edge.src), catalog.intern(&edge.trg));
        let fee = total_fee(edge, params.amount);
        let entry = groups.entry(key).or_insert_with(|| {
            order.push(key);
            Accum {
                capacity: 0.0,
                total_fee: 0.0,
                base_fee: 0.0,
                rate: 0.0,
                count: 0,
            }
        });
        entry.capacity += edge.capacity as f64;
        entry.total_fee += fee;
        entry.base_fee += edge.fee_base_msat / 1000.0;
        entry.rate += edge.fee_rate_milli_msat;
        entry.count += 1;
    }
    let edges: Vec<DirectedEdge> = order
        .into_iter()
        .map(|(src, trg)| {
            let accum = &groups[&(src, trg)];
            let n = accum.count as f64;
            DirectedEdge {
                src,
                trg,
                capacity: accum.capacity,
                total_fee: accum.total_fee / n,
                base_fee: accum.base_fee / n,
                rate: accum.rate / n,
            }
        })
        .collect();

    log::info!(
        "edges: {} raw -> {} kept -> {} aggregated",
        total,
        rows.len(),
        edges.len()
    );
    (catalog, edges)
}

/// Total routing fee in satoshi for one directed edge.
///
/// fee_base_msat is millisatoshi; fee_rate_milli_msat is satoshi charged
/// per million satoshi routed.
pub fn total_fee(edge: &RawEdge, amount: u64) -> f64 {
    edge.fee_base_msat / 1000.0 + amount as f64 * edge.fee_rate_milli_msat / 1e6
}

/// Per-node degree and incident capacity over the aggregated edges, plus
/// the merchants that are actually present in the graph.
pub fn init_node_params(
    edges: &[DirectedEdge],
    merchants: &[String],
    catalog: &NodeCatalog,
) -> (Vec<NodeInfo>, Vec<NodeId>, f64) {
    let mut degrees: HashMap<NodeId, (u32, f64)> = HashMap::new();
    for edge in edges {
        for node in [edge.src, edge.trg] {
            let entry = degrees.entry(node).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += edge.capacity;
        }
    }
    let mut nodes: Vec<NodeInfo> = degrees
        .into_iter()
        .map(|(node, (degree, total_capacity))| NodeInfo {
            node,
            degree,
            total_capacity,
        })
        .collect();
    nodes.sort_by_key(|info| info.node);

    let present: HashSet<NodeId> = nodes.iter().map(|info| info.node).collect();
    let mut seen = HashSet::new();
    let active: Vec<NodeId> = merchants
        .iter()
        .filter_map(|key| catalog.lookup(key))
        .filter(|id| present.contains(id) && seen.insert(*id))
        .collect();
    let active_ratio = if merchants.is_empty() {
        0.0
    } else {
        active.len() as f64 / merchants.len() as f64
    };
    log::info!(
        "merchants: {} listed, {} active ({:.2})",
        merchants.len(),
        active.len(),
        active_ratio
    );
    (nodes, active, active_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(src: &str, trg: &str, capacity: u64, last_update: i64, disabled: bool) -> RawEdge {
        RawEdge {
            src: src.into(),
            trg: trg.into(),
            capacity,
            last_update,
            disabled,
            fee_base_msat: 1000.0,
            fee_rate_milli_msat: 100.0,
            min_htlc: 1000.0,
        }
    }

    fn params(amount: u64) -> SimParams {
        serde_json::from_str(&format!(r#"{{"amount": {amount}, "count": 0}}"#)).unwrap()
    }

    #[test]
    fn fee_combines_base_and_rate() {
        let edge = raw("a", "b", 1000, 0, false);
        // 1000 msat base = 1 sat, plus 60000 * 100 / 1e6 = 6 sat
        assert!((total_fee(&edge, 60000) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn multi_edges_sum_capacity_and_average_fee() {
        let mut a = raw("a", "b", 100, 0, false);
        a.fee_base_msat = 1000.0;
        a.fee_rate_milli_msat = 0.0;
        let mut b = raw("a", "b", 300, 0, false);
        b.fee_base_msat = 3000.0;
        b.fee_rate_milli_msat = 0.0;
        let (catalog, edges) = prepare_edges(&[a, b], &params(10));
        assert_eq!(edges.len(), 1);
        assert_eq!(catalog.len(), 2);
        assert!((edges[0].capacity - 400.0).abs() < f64::EPSILON);
        assert!((edges[0].total_fee - 2.0).abs() < 1e-9);
        assert!((edges[0].base_fee - 2.0).abs() < 1e-9);
    }

    #[test]
    fn filters_apply_in_order() {
        let rows = vec![
            raw("a", "b", 5, 100, false),   // dropped: low capacity
            raw("a", "c", 50, 10, false),   // dropped: outside time window
            raw("b", "c", 50, 100, true),   // dropped: disabled
            raw("c", "a", 50, 95, false),   // kept
            raw("c", "b", 50, 200, false),  // dropped: at ts upper bound
        ];
        let mut p = params(10);
        p.ts_upper_bound = Some(200);
        p.time_window = Some(10);
        let (_, edges) = prepare_edges(&rows, &p);
        assert_eq!(edges.len(), 1);
        // The recency window anchors on the newest surviving timestamp
        // (100 here), which is only true because the ts_upper_bound filter
        // ran first.
    }

    #[test]
    fn low_cap_filter_can_be_disabled() {
        let rows = vec![raw("a", "b", 5, 0, false)];
        let mut p = params(10);
        p.drop_low_cap = false;
        let (_, edges) = prepare_edges(&rows, &p);
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn node_params_count_both_directions() {
        let rows = vec![
            raw("a", "b", 100, 0, false),
            raw("b", "a", 100, 0, false),
            raw("b", "c", 100, 0, false),
        ];
        let (catalog, edges) = prepare_edges(&rows, &params(10));
        let merchants = vec!["b".to_string(), "ghost".to_string(), "b".to_string()];
        let (nodes, active, ratio) = init_node_params(&edges, &merchants, &catalog);
        assert_eq!(nodes.len(), 3);
        let b = catalog.lookup("b").unwrap();
        let b_info = nodes.iter().find(|n| n.node == b).unwrap();
        assert_eq!(b_info.degree, 3);
        assert!((b_info.total_capacity - 300.0).abs() < f64::EPSILON);
        assert_eq!(active, vec![b]);
        assert!((ratio - 1.0 / 3.0).abs() < 1e-9);
    }
}
