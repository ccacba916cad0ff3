// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Snapshot Ingestion

//! Boundary between the simulator and LN graph data: a directed-edge CSV
//! table, a merchant list, and raw lnd `describegraph` JSON snapshots that
//! are flattened into the same directed-edge rows.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// Defaults imputed for missing channel policy fields, in msat.
const DEFAULT_BASE_MSAT: f64 = 1000.0;
const DEFAULT_RATE_MILLI_MSAT: f64 = 1.0;
const DEFAULT_MIN_HTLC: f64 = 1000.0;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("input schema: {0}")]
    Schema(String),
}

// ─── Directed edge rows ──────────────────────────────────────────────────────

/// One directed edge of the snapshot, before filtering and aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdge {
    pub src: String,
    pub trg: String,
    /// Channel capacity in satoshi.
    pub capacity: u64,
    pub last_update: i64,
    #[serde(deserialize_with = "flexible_bool")]
    pub disabled: bool,
    pub fee_base_msat: f64,
    pub fee_rate_milli_msat: f64,
    #[serde(default = "default_min_htlc")]
    pub min_htlc: f64,
}

fn default_min_htlc() -> f64 {
    DEFAULT_MIN_HTLC
}

/// Accepts `true`/`false` in any case plus `0`/`1`, so tables written by
/// pandas (`True`/`False`) load unchanged.
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean, got {other:?}"
        ))),
    }
}

// ─── CSV loaders ─────────────────────────────────────────────────────────────

const REQUIRED_EDGE_COLUMNS: [&str; 7] = [
    "src",
    "trg",
    "capacity",
    "last_update",
    "disabled",
    "fee_base_msat",
    "fee_rate_milli_msat",
];

/// Load the directed-edge table, verifying the schema up front.
pub fn load_edges_csv(path: &Path) -> Result<Vec<RawEdge>, InputError> {
    read_edges(BufReader::new(File::open(path)?))
}

pub fn read_edges<R: Read>(reader: R) -> Result<Vec<RawEdge>, InputError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let missing: Vec<&str> = REQUIRED_EDGE_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(InputError::Schema(format!(
            "edge table is missing required columns: {}",
            missing.join(", ")
        )));
    }
    let mut edges = Vec::new();
    for record in csv_reader.deserialize() {
        edges.push(record?);
    }
    Ok(edges)
}

/// Load the merchant list (single `pub_key` column).
pub fn load_merchants_csv(path: &Path) -> Result<Vec<String>, InputError> {
    read_merchants(BufReader::new(File::open(path)?))
}

pub fn read_merchants<R: Read>(reader: R) -> Result<Vec<String>, InputError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let col = headers
        .iter()
        .position(|h| h == "pub_key")
        .ok_or_else(|| InputError::Schema("merchant table has no pub_key column".into()))?;
    let mut merchants = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if let Some(key) = record.get(col) {
            if !key.is_empty() {
                merchants.push(key.to_string());
            }
        }
    }
    Ok(merchants)
}

// ─── Raw snapshot preprocessing ──────────────────────────────────────────────

/// Flatten a raw lnd `describegraph` snapshot into directed edge rows.
///
/// Every channel yields two rows: node1 -> node2 priced by node2's policy
/// and the reverse priced by node1's. Self-loops and channels with a
/// missing policy on either side are dropped; missing policy fields are
/// imputed with the network-wide defaults.
pub fn preprocess_json_snapshot(path: &Path) -> Result<Vec<RawEdge>, InputError> {
    let doc: Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    parse_snapshot(&doc)
}

pub fn parse_snapshot(doc: &Value) -> Result<Vec<RawEdge>, InputError> {
    let channels = doc
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| InputError::Schema("snapshot has no edges array".into()))?;

    let mut rows = Vec::with_capacity(channels.len() * 2);
    let mut dropped = 0usize;
    for channel in channels {
        let Some(node1) = channel.get("node1_pub").and_then(Value::as_str) else {
            return Err(InputError::Schema("channel without node1_pub".into()));
        };
        let Some(node2) = channel.get("node2_pub").and_then(Value::as_str) else {
            return Err(InputError::Schema("channel without node2_pub".into()));
        };
        if node1 == node2 {
            dropped += 1;
            continue;
        }
        let policy1 = channel.get("node1_policy").filter(|p| !p.is_null());
        let policy2 = channel.get("node2_policy").filter(|p| !p.is_null());
        if policy1.is_none() || policy2.is_none() {
            dropped += 1;
            continue;
        }
        let capacity = lenient_u64(channel.get("capacity")).unwrap_or(0);
        let last_update = lenient_i64(channel.get("last_update")).unwrap_or(0);
        rows.push(directed_row(node1, node2, capacity, last_update, policy2));
        rows.push(directed_row(node2, node1, capacity, last_update, policy1));
    }
    log::info!(
        "snapshot: {} channels -> {} directed edges ({} dropped)",
        channels.len(),
        rows.len(),
        dropped
    );
    Ok(rows)
}

fn directed_row(
    src: &str,
    trg: &str,
    capacity: u64,
    last_update: i64,
    policy: Option<&Value>,
) -> RawEdge {
    let field = |name: &str| policy.and_then(|p| p.get(name));
    RawEdge {
        src: src.to_string(),
        trg: trg.to_string(),
        capacity,
        last_update,
        disabled: field("disabled").and_then(Value::as_bool).unwrap_or(false),
        fee_base_msat: lenient_f64(field("fee_base_msat")).unwrap_or(DEFAULT_BASE_MSAT),
        fee_rate_milli_msat: lenient_f64(field("fee_rate_milli_msat"))
            .unwrap_or(DEFAULT_RATE_MILLI_MSAT),
        min_htlc: lenient_f64(field("min_htlc")).unwrap_or(DEFAULT_MIN_HTLC),
    }
}

// lnd snapshots serialize numbers as strings; accept both encodings.
fn lenient_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn lenient_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDGE_CSV: &str = "\
src,trg,capacity,last_update,disabled,fee_base_msat,fee_rate_milli_msat,min_htlc
alice,bob,100000,1600000000,False,1000,1,1000
bob,alice,100000,1600000001,True,2000,10,1000
";

    #[test]
    fn reads_pandas_style_booleans() {
        let edges = read_edges(EDGE_CSV.as_bytes()).unwrap();
        assert_eq!(edges.len(), 2);
        assert!(!edges[0].disabled);
        assert!(edges[1].disabled);
        assert_eq!(edges[0].capacity, 100000);
        assert!((edges[1].fee_rate_milli_msat - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_column_is_schema_error() {
        let bad = "src,trg,capacity\nalice,bob,1\n";
        let err = read_edges(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, InputError::Schema(_)), "got {err:?}");
        assert!(err.to_string().contains("last_update"));
    }

    #[test]
    fn min_htlc_defaults_when_absent() {
        let csv = "\
src,trg,capacity,last_update,disabled,fee_base_msat,fee_rate_milli_msat
alice,bob,100000,1600000000,false,1000,1
";
        let edges = read_edges(csv.as_bytes()).unwrap();
        assert!((edges[0].min_htlc - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reads_merchant_column() {
        let csv = "pub_key,alias\nalice,Alice\nbob,Bob\n";
        let merchants = read_merchants(csv.as_bytes()).unwrap();
        assert_eq!(merchants, vec!["alice", "bob"]);
    }

    #[test]
    fn snapshot_flattens_channels() {
        let doc: Value = serde_json::from_str(
            r#"{
                "edges": [
                    {
                        "node1_pub": "alice", "node2_pub": "bob",
                        "capacity": "150000", "last_update": 1600000000,
                        "node1_policy": {"disabled": false, "fee_base_msat": "1000",
                                         "fee_rate_milli_msat": "1", "min_htlc": "1000"},
                        "node2_policy": {"disabled": true, "fee_base_msat": "2000",
                                         "fee_rate_milli_msat": "10", "min_htlc": "1000"}
                    },
                    {
                        "node1_pub": "carol", "node2_pub": "carol",
                        "capacity": "1", "last_update": 0,
                        "node1_policy": {}, "node2_policy": {}
                    },
                    {
                        "node1_pub": "dave", "node2_pub": "erin",
                        "capacity": "1", "last_update": 0,
                        "node1_policy": null, "node2_policy": {}
                    }
                ]
            }"#,
        )
        .unwrap();
        let rows = parse_snapshot(&doc).unwrap();
        // Self-loop and missing-policy channels dropped, one channel kept.
        assert_eq!(rows.len(), 2);
        let forward = &rows[0];
        assert_eq!(forward.src, "alice");
        assert_eq!(forward.trg, "bob");
        assert_eq!(forward.capacity, 150000);
        // node1 -> node2 is priced by node2's policy
        assert!(forward.disabled);
        assert!((forward.fee_base_msat - 2000.0).abs() < f64::EPSILON);
        let reverse = &rows[1];
        assert_eq!(reverse.src, "bob");
        assert!(!reverse.disabled);
        assert!((reverse.fee_base_msat - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_imputes_missing_policy_fields() {
        let doc: Value = serde_json::from_str(
            r#"{"edges": [{
                "node1_pub": "a", "node2_pub": "b",
                "capacity": 10, "last_update": 5,
                "node1_policy": {}, "node2_policy": {}
            }]}"#,
        )
        .unwrap();
        let rows = parse_snapshot(&doc).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].disabled);
        assert!((rows[0].fee_base_msat - 1000.0).abs() < f64::EPSILON);
        assert!((rows[0].fee_rate_milli_msat - 1.0).abs() < f64::EPSILON);
        assert!((rows[0].min_htlc - 1000.0).abs() < f64::EPSILON);
    }
}
