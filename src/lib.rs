// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite

//! Payment-traffic simulation over a directed, fee-weighted,
//! capacity-constrained Lightning channel graph: workload sampling,
//! min-fee routing with live depletion, per-router counterfactuals, and
//! income-maximizing base-fee analysis.

pub mod capacity;
pub mod genetic;
pub mod graph;
pub mod preprocess;
pub mod pricing;
pub mod report;
pub mod routing;
pub mod sampling;
pub mod simulation;
pub mod snapshot;
pub mod sweep;
pub mod types;

pub use simulation::{SimError, SimulationOutput, TrafficSimulator};
pub use types::*;
