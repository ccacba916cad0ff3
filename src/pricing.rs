// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Optimal Base Fee Pricing

//! Derives each router's income-maximizing base-fee increment from the
//! cost gap between the payments' original paths and their best
//! alternatives with that router excluded. The gap is the rent the router
//! could extract before the payment would rather route around it.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::report::total_router_income;
use crate::types::{AlternativePath, NodeId, PathResult, RouterFee};

/// Final per-router pricing record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimalFeeRow {
    pub node: NodeId,
    pub total_income: f64,
    pub total_traffic: u64,
    pub failed_traffic_ratio: f64,
    pub opt_delta: f64,
    pub income_diff: f64,
}

/// Optimum of the threshold sweep for one router.
#[derive(Debug, Clone, PartialEq)]
struct RouterOptimum {
    opt_delta: f64,
    opt_income: f64,
    opt_ratio: f64,
    alt_income: f64,
    alt_traffic: u64,
}

/// One joined transaction: the router's fee on the original path and the
/// extra cost of the best alternative, rounded to 2 decimals.
#[derive(Debug, Clone, Copy)]
struct DeltaRecord {
    fee: f64,
    delta_cost: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sweep the candidate thresholds in ascending order.
///
/// At threshold theta the router keeps exactly the transactions whose
/// delta is at least theta, each paying its old fee plus theta. The sweep
/// stops early once the retained share drops below `min_ratio`.
fn inspect_base_fee_thresholds(
    deltas: &[DeltaRecord],
    positive_thresholds: &[f64],
    min_ratio: f64,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let base_income: f64 = deltas.iter().map(|d| d.fee).sum();
    let base_count = deltas.len();
    let mut thresholds = vec![0.0];
    thresholds.extend_from_slice(positive_thresholds);
    let mut incomes = vec![base_income];
    let mut probas = vec![1.0];
    for &threshold in &thresholds[1..] {
        let retained: Vec<&DeltaRecord> = deltas
            .iter()
            .filter(|d| d.delta_cost >= threshold)
            .collect();
        let proba = retained.len() as f64 / base_count as f64;
        probas.push(proba);
        let income: f64 =
            retained.iter().map(|d| d.fee).sum::<f64>() + retained.len() as f64 * threshold;
        incomes.push(income);
        if proba < min_ratio {
            break;
        }
    }
    (incomes, probas, thresholds)
}

/// Income-maximizing threshold for one router; ties resolve to the
/// smallest threshold, so `opt_delta = 0` whenever no increment beats the
/// baseline.
fn calculate_max_income(deltas: &mut Vec<DeltaRecord>, min_ratio: f64) -> RouterOptimum {
    deltas.sort_by(|a, b| a.delta_cost.total_cmp(&b.delta_cost));
    let mut positive: Vec<f64> = deltas
        .iter()
        .map(|d| d.delta_cost)
        .filter(|&d| d > 0.0)
        .collect();
    positive.dedup();
    let (incomes, probas, thresholds) = inspect_base_fee_thresholds(deltas, &positive, min_ratio);
    let mut best = 0;
    for (i, &income) in incomes.iter().enumerate() {
        if income > incomes[best] {
            best = i;
        }
    }
    RouterOptimum {
        opt_delta: thresholds[best],
        opt_income: incomes[best],
        opt_ratio: probas[best],
        alt_income: incomes[0],
        alt_traffic: deltas.len() as u64,
    }
}

/// Build the per-router optimal-fee table.
///
/// Joins, per router: the original cost of every path with at least one
/// non-target router, the alternative cost with the router excluded, and
/// the router's fee on the original path. Routers whose alternatives all
/// failed keep their traffic totals with zeroed pricing columns. Rows are
/// sorted by total income, descending.
pub fn calc_optimal_base_fee(
    shortest_paths: &[PathResult],
    alternative_paths: &[AlternativePath],
    router_fees: &[RouterFee],
    min_ratio: f64,
) -> Vec<OptimalFeeRow> {
    let original_costs: HashMap<usize, f64> = shortest_paths
        .iter()
        .filter(|p| p.length > 2)
        .filter_map(|p| p.cost.map(|cost| (p.transaction_id, cost)))
        .collect();
    let fee_on_original: HashMap<(usize, NodeId), f64> = router_fees
        .iter()
        .map(|r| ((r.transaction_id, r.node), r.fee))
        .collect();

    let mut deltas_by_router: BTreeMap<NodeId, Vec<DeltaRecord>> = BTreeMap::new();
    for alt in alternative_paths {
        let Some(alt_cost) = alt.path.cost else {
            continue;
        };
        let entry = deltas_by_router.entry(alt.node).or_default();
        let id = alt.path.transaction_id;
        let (Some(original), Some(fee)) = (
            original_costs.get(&id),
            fee_on_original.get(&(id, alt.node)),
        ) else {
            continue;
        };
        entry.push(DeltaRecord {
            fee: *fee,
            delta_cost: round2(alt_cost - original),
        });
    }

    let optima: HashMap<NodeId, RouterOptimum> = deltas_by_router
        .into_iter()
        .map(|(node, mut deltas)| (node, calculate_max_income(&mut deltas, min_ratio)))
        .collect();

    let mut rows: Vec<OptimalFeeRow> = total_router_income(router_fees)
        .into_iter()
        .map(|income| {
            let optimum = optima.get(&income.node);
            let alt_traffic = optimum.map(|o| o.alt_traffic).unwrap_or(0);
            let failed_traffic = income.num_trans.saturating_sub(alt_traffic);
            let opt_delta = optimum.map(|o| o.opt_delta).unwrap_or(0.0);
            let income_diff = optimum
                .map(|o| o.opt_income - o.alt_income + failed_traffic as f64 * o.opt_delta)
                .unwrap_or(0.0);
            OptimalFeeRow {
                node: income.node,
                total_income: income.fee,
                total_traffic: income.num_trans,
                failed_traffic_ratio: if income.num_trans > 0 {
                    failed_traffic as f64 / income.num_trans as f64
                } else {
                    0.0
                },
                opt_delta,
                income_diff,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_income
            .total_cmp(&a.total_income)
            .then(a.node.cmp(&b.node))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vertex;

    fn path(id: usize, cost: f64, length: i64) -> PathResult {
        PathResult {
            transaction_id: id,
            cost: Some(cost),
            length,
            path: vec![Vertex::Real(NodeId(99))],
        }
    }

    fn alt(node: u32, id: usize, cost: Option<f64>) -> AlternativePath {
        AlternativePath {
            node: NodeId(node),
            path: PathResult {
                transaction_id: id,
                cost,
                length: if cost.is_some() { 2 } else { -1 },
                path: Vec::new(),
            },
        }
    }

    fn fee(id: usize, node: u32, fee: f64) -> RouterFee {
        RouterFee {
            transaction_id: id,
            node: NodeId(node),
            fee,
        }
    }

    #[test]
    fn single_transaction_optimum_matches_hand_calculation() {
        // Router b carried one payment at fee 1; rerouting costs 7 more.
        let paths = vec![path(0, 3.0, 3)];
        let alts = vec![alt(1, 0, Some(10.0))];
        let fees = vec![fee(0, 1, 1.0), fee(0, 2, 2.0)];
        let rows = calc_optimal_base_fee(&paths, &alts, &fees, 0.0);

        let b = rows.iter().find(|r| r.node == NodeId(1)).unwrap();
        assert!((b.opt_delta - 7.0).abs() < 1e-9);
        // income(7) = 1 + 1 * 7 = 8, baseline 1, no failed traffic.
        assert!((b.income_diff - 7.0).abs() < 1e-9);
        assert!((b.total_income - 1.0).abs() < 1e-9);
        assert_eq!(b.total_traffic, 1);
        assert!((b.failed_traffic_ratio - 0.0).abs() < 1e-9);
    }

    #[test]
    fn routers_without_alternatives_keep_zeroed_pricing() {
        let paths = vec![path(0, 3.0, 3)];
        let alts = vec![alt(1, 0, None)];
        let fees = vec![fee(0, 1, 1.0), fee(0, 2, 2.0)];
        let rows = calc_optimal_base_fee(&paths, &alts, &fees, 0.0);
        // Sorted by total income: c (2.0) first.
        assert_eq!(rows[0].node, NodeId(2));
        let b = rows.iter().find(|r| r.node == NodeId(1)).unwrap();
        assert!((b.opt_delta - 0.0).abs() < 1e-9);
        assert!((b.income_diff - 0.0).abs() < 1e-9);
        assert!((b.failed_traffic_ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn optimum_never_loses_to_the_baseline() {
        // Mixed deltas, including a negative one.
        let paths = vec![path(0, 5.0, 3), path(1, 5.0, 3), path(2, 5.0, 3)];
        let alts = vec![
            alt(1, 0, Some(4.5)),
            alt(1, 1, Some(8.0)),
            alt(1, 2, Some(11.0)),
        ];
        let fees = vec![fee(0, 1, 1.0), fee(1, 1, 1.0), fee(2, 1, 1.0)];
        let rows = calc_optimal_base_fee(&paths, &alts, &fees, 0.0);
        let b = &rows[0];
        let baseline = 3.0;
        // Thresholds {0, 3, 6}: income(3) = 2 + 2*3 = 8, income(6) = 1 + 6 = 7.
        assert!((b.opt_delta - 3.0).abs() < 1e-9);
        assert!(8.0 - baseline <= b.income_diff + 1e-9);
        assert!((b.income_diff - 5.0).abs() < 1e-9);
    }

    #[test]
    fn min_ratio_stops_the_sweep_early() {
        let deltas = &mut vec![
            DeltaRecord { fee: 1.0, delta_cost: 1.0 },
            DeltaRecord { fee: 1.0, delta_cost: 2.0 },
            DeltaRecord { fee: 1.0, delta_cost: 100.0 },
        ];
        // The 100 threshold retains 1/3 < 0.5, so the sweep stops there,
        // but its income is still recorded and can win.
        let optimum = calculate_max_income(deltas, 0.5);
        assert!((optimum.opt_delta - 100.0).abs() < 1e-9);
        let unrestricted = calculate_max_income(deltas, 0.0);
        assert!((unrestricted.opt_delta - 100.0).abs() < 1e-9);
        assert!((unrestricted.opt_income - 101.0).abs() < 1e-9);
    }

    #[test]
    fn direct_originals_are_excluded_from_the_join() {
        // length 2 means no non-target router on the original path.
        let paths = vec![path(0, 3.0, 2)];
        let alts = vec![alt(1, 0, Some(10.0))];
        let fees = vec![fee(0, 1, 1.0)];
        let rows = calc_optimal_base_fee(&paths, &alts, &fees, 0.0);
        let b = rows.iter().find(|r| r.node == NodeId(1)).unwrap();
        // The join drops the only transaction: zeroed pricing columns.
        assert!((b.opt_delta - 0.0).abs() < 1e-9);
        assert!((b.failed_traffic_ratio - 1.0).abs() < 1e-9);
    }
}
