// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Aggregation & Export

//! Tabular result sinks: the parameter record as JSON and the aggregate
//! tables (path-length histogram, per-router incomes, per-source mean
//! fees, optimal-fee table) as CSV.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::pricing::OptimalFeeRow;
use crate::types::{NodeCatalog, NodeId, PathResult, RouterFee, SimParams, Transaction};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

/// Total routing income and carried transaction count per node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterIncome {
    pub node: NodeId,
    pub fee: f64,
    pub num_trans: u64,
}

/// Group router fee records by node, sorted by income descending.
pub fn total_router_income(router_fees: &[RouterFee]) -> Vec<RouterIncome> {
    let mut grouped: HashMap<NodeId, (f64, u64)> = HashMap::new();
    for record in router_fees {
        let entry = grouped.entry(record.node).or_insert((0.0, 0));
        entry.0 += record.fee;
        entry.1 += 1;
    }
    let mut incomes: Vec<RouterIncome> = grouped
        .into_iter()
        .map(|(node, (fee, num_trans))| RouterIncome {
            node,
            fee,
            num_trans,
        })
        .collect();
    incomes.sort_by(|a, b| b.fee.total_cmp(&a.fee).then(a.node.cmp(&b.node)));
    incomes
}

/// Mean routing cost and payment count per source, over successful paths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFee {
    pub source: NodeId,
    pub mean_fee: f64,
    pub num_trans: u64,
}

/// Join transactions with their successful paths and average the cost per
/// source node, sorted by the source pub_key.
pub fn total_source_fees(
    transactions: &[Transaction],
    shortest_paths: &[PathResult],
    catalog: &NodeCatalog,
) -> Vec<SourceFee> {
    let source_of: HashMap<usize, NodeId> = transactions
        .iter()
        .map(|tx| (tx.transaction_id, tx.source))
        .collect();
    let mut grouped: HashMap<NodeId, (f64, u64)> = HashMap::new();
    for path in shortest_paths {
        if path.length <= 0 {
            continue;
        }
        let (Some(cost), Some(&source)) = (path.cost, source_of.get(&path.transaction_id)) else {
            continue;
        };
        let entry = grouped.entry(source).or_insert((0.0, 0));
        entry.0 += cost;
        entry.1 += 1;
    }
    let mut fees: Vec<SourceFee> = grouped
        .into_iter()
        .map(|(source, (total, num_trans))| SourceFee {
            source,
            mean_fee: total / num_trans as f64,
            num_trans,
        })
        .collect();
    fees.sort_by(|a, b| catalog.key(a.source).cmp(catalog.key(b.source)));
    fees
}

/// Path-length histogram, most frequent first.
pub fn length_histogram(shortest_paths: &[PathResult]) -> Vec<(i64, u64)> {
    let mut counts: HashMap<i64, u64> = HashMap::new();
    for path in shortest_paths {
        *counts.entry(path.length).or_insert(0) += 1;
    }
    let mut histogram: Vec<(i64, u64)> = counts.into_iter().collect();
    histogram.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    histogram
}

// ─── Sinks ───────────────────────────────────────────────────────────────────

pub fn export_params(dir: &Path, params: &SimParams) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(params)?;
    fs::write(dir.join("params.json"), json)?;
    Ok(())
}

pub fn export_lengths(dir: &Path, shortest_paths: &[PathResult]) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(dir.join("lengths_distrib.csv"))?;
    writer.write_record(["length", "count"])?;
    for (length, count) in length_histogram(shortest_paths) {
        writer.write_record([length.to_string(), count.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_router_incomes(
    dir: &Path,
    incomes: &[RouterIncome],
    catalog: &NodeCatalog,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(dir.join("router_incomes.csv"))?;
    writer.write_record(["node", "fee", "num_trans"])?;
    for income in incomes {
        writer.write_record([
            catalog.key(income.node).to_string(),
            income.fee.to_string(),
            income.num_trans.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_source_fees(
    dir: &Path,
    fees: &[SourceFee],
    catalog: &NodeCatalog,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(dir.join("source_fees.csv"))?;
    writer.write_record(["source", "mean_fee", "num_trans"])?;
    for fee in fees {
        writer.write_record([
            catalog.key(fee.source).to_string(),
            fee.mean_fee.to_string(),
            fee.num_trans.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_opt_fees(
    dir: &Path,
    rows: &[OptimalFeeRow],
    catalog: &NodeCatalog,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(dir.join("opt_fees.csv"))?;
    writer.write_record([
        "node",
        "total_income",
        "total_traffic",
        "failed_traffic_ratio",
        "opt_delta",
        "income_diff",
    ])?;
    for row in rows {
        writer.write_record([
            catalog.key(row.node).to_string(),
            row.total_income.to_string(),
            row.total_traffic.to_string(),
            row.failed_traffic_ratio.to_string(),
            row.opt_delta.to_string(),
            row.income_diff.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vertex;

    fn path(id: usize, cost: Option<f64>, length: i64) -> PathResult {
        PathResult {
            transaction_id: id,
            cost,
            length,
            path: vec![Vertex::Real(NodeId(0))],
        }
    }

    #[test]
    fn router_income_groups_and_sorts() {
        let fees = vec![
            RouterFee { transaction_id: 0, node: NodeId(1), fee: 1.0 },
            RouterFee { transaction_id: 1, node: NodeId(1), fee: 2.0 },
            RouterFee { transaction_id: 0, node: NodeId(2), fee: 5.0 },
        ];
        let incomes = total_router_income(&fees);
        assert_eq!(incomes.len(), 2);
        assert_eq!(incomes[0].node, NodeId(2));
        assert!((incomes[0].fee - 5.0).abs() < 1e-9);
        assert_eq!(incomes[1].num_trans, 2);
        assert!((incomes[1].fee - 3.0).abs() < 1e-9);
    }

    #[test]
    fn source_fees_average_successful_paths_only() {
        let mut catalog = NodeCatalog::new();
        let a = catalog.intern("a");
        let b = catalog.intern("b");
        let txs = vec![
            Transaction { transaction_id: 0, source: a, target: b, amount: 10 },
            Transaction { transaction_id: 1, source: a, target: b, amount: 10 },
            Transaction { transaction_id: 2, source: b, target: a, amount: 10 },
        ];
        let paths = vec![
            path(0, Some(2.0), 3),
            path(1, Some(4.0), 3),
            path(2, None, -1),
        ];
        let fees = total_source_fees(&txs, &paths, &catalog);
        assert_eq!(fees.len(), 1);
        assert_eq!(fees[0].source, a);
        assert!((fees[0].mean_fee - 3.0).abs() < 1e-9);
        assert_eq!(fees[0].num_trans, 2);
    }

    #[test]
    fn histogram_sorts_by_count_then_length() {
        let paths = vec![
            path(0, Some(1.0), 3),
            path(1, Some(1.0), 3),
            path(2, Some(1.0), 2),
            path(3, None, -1),
        ];
        let histogram = length_histogram(&paths);
        assert_eq!(histogram[0], (3, 2));
        assert!(histogram.contains(&(2, 1)));
        assert!(histogram.contains(&(-1, 1)));
    }

    #[test]
    fn export_writes_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = NodeCatalog::new();
        let a = catalog.intern("a");
        let paths = vec![path(0, Some(3.0), 3)];
        let fees = vec![RouterFee { transaction_id: 0, node: a, fee: 1.0 }];
        let params: SimParams =
            serde_json::from_str(r#"{"amount": 100, "count": 1}"#).unwrap();

        export_params(dir.path(), &params).unwrap();
        export_lengths(dir.path(), &paths).unwrap();
        export_router_incomes(dir.path(), &total_router_income(&fees), &catalog).unwrap();
        let txs = vec![Transaction { transaction_id: 0, source: a, target: a, amount: 100 }];
        export_source_fees(dir.path(), &total_source_fees(&txs, &paths, &catalog), &catalog)
            .unwrap();

        let lengths = fs::read_to_string(dir.path().join("lengths_distrib.csv")).unwrap();
        assert!(lengths.starts_with("length,count"));
        assert!(lengths.contains("3,1"));
        let incomes = fs::read_to_string(dir.path().join("router_incomes.csv")).unwrap();
        assert!(incomes.contains("a,1,1"));
        let params_json = fs::read_to_string(dir.path().join("params.json")).unwrap();
        assert!(params_json.contains("\"amount\": 100"));
    }
}
