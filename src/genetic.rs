// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Lightning Traffic Simulation Suite - Genetic Path Extension

//! Grows a too-short payment path to a required hop count while keeping it
//! a valid, loop-free path with the same endpoints. Candidates are built
//! by inserting common neighbors between adjacent hops, evolved by
//! swapping interior nodes between parents, and scored by total fee.

use std::collections::{BTreeSet, HashMap, HashSet};

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::graph::SearchGraph;
use crate::routing::RoutingError;
use crate::types::{NodeCatalog, NodeId, Vertex};

pub const POPULATION_SIZE: usize = 100;
pub const BEST_RATIO: f64 = 0.25;

const MAX_ITERATIONS: usize = 5;
const PAIRING_ROUNDS: usize = 5;
const MAX_INSERT_TRIALS: u32 = 10;

/// A successful extension: the best path found and the number of evolution
/// rounds that ran before stopping.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    pub path: Vec<Vertex>,
    pub cost: f64,
    pub rounds: usize,
}

pub struct GeneticExtender<'a> {
    required_length: usize,
    graph: &'a SearchGraph,
    router_weights: Option<&'a HashMap<NodeId, f64>>,
    catalog: &'a NodeCatalog,
}

impl<'a> GeneticExtender<'a> {
    pub fn new(
        required_length: usize,
        graph: &'a SearchGraph,
        router_weights: Option<&'a HashMap<NodeId, f64>>,
        catalog: &'a NodeCatalog,
    ) -> Self {
        Self {
            required_length,
            graph,
            router_weights,
            catalog,
        }
    }

    /// Run the fixed-size minimum-cost search. Returns `None` when not a
    /// single candidate could be grown to the required length; the caller
    /// then keeps its original shorter path.
    pub fn run(
        &self,
        seed: &[Vertex],
        size: usize,
        best_ratio: f64,
        rng: &mut ChaCha8Rng,
    ) -> Result<Option<Extension>, RoutingError> {
        let mut population = self.init_population(seed, size, rng);
        if population.is_empty() {
            return Ok(None);
        }
        let (mut best_path, mut best_cost) = self.best_of(&population);
        let mut rounds = 0;
        for round in 0..MAX_ITERATIONS {
            rounds = round;
            let parent_count = (size as f64 * best_ratio) as usize;
            population = self.next_generation(&population, parent_count, rng)?;
            if population.is_empty() {
                break;
            }
            let (path, cost) = self.best_of(&population);
            if cost < best_cost {
                best_cost = cost;
                best_path = path;
            } else {
                // No improvement this round, stop early.
                break;
            }
        }
        Ok(Some(Extension {
            path: best_path,
            cost: best_cost,
            rounds,
        }))
    }

    /// Build the initial population by repeated neighbor insertion,
    /// deduplicated.
    fn init_population(
        &self,
        seed: &[Vertex],
        size: usize,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Vec<Vertex>> {
        let mut seen: HashSet<Vec<Vertex>> = HashSet::new();
        let mut population = Vec::new();
        for _ in 0..size {
            if let Some(candidate) = self.populate(seed, rng) {
                if seen.insert(candidate.clone()) {
                    population.push(candidate);
                }
            }
        }
        population
    }

    /// Grow one candidate to `required_length` hops by inserting common
    /// neighbors at random positions. An empty neighbor set is retried up
    /// to 10 times before the candidate is abandoned.
    fn populate(&self, seed: &[Vertex], rng: &mut ChaCha8Rng) -> Option<Vec<Vertex>> {
        let mut path = seed.to_vec();
        let target = seed.last()?.node();
        let mut trials = 0;
        while path.len() < self.required_length + 1 {
            // Insert between real hops only; the sink hop admits nothing.
            let pos = rng.gen_range(0..path.len() - 2);
            let candidates = self.common_neighbors(path[pos], path[pos + 1], &path, target);
            if candidates.is_empty() {
                trials += 1;
                if trials == MAX_INSERT_TRIALS {
                    return None;
                }
                continue;
            }
            let pick = self.weighted_pick(&candidates, rng);
            path.insert(pos + 1, pick);
        }
        Some(path)
    }

    /// Common directed neighbors of an adjacent pair, minus the stripped
    /// target and everything already on the candidate.
    fn common_neighbors(
        &self,
        from: Vertex,
        to: Vertex,
        path: &[Vertex],
        target: NodeId,
    ) -> Vec<Vertex> {
        let predecessors: HashSet<Vertex> = self.graph.predecessors(to).collect();
        self.graph
            .successors(from)
            .filter(|v| predecessors.contains(v))
            .filter(|v| *v != Vertex::Real(target))
            .filter(|v| !path.contains(v))
            .collect()
    }

    /// Choose an insertion candidate, biased by the router-weight map when
    /// one is present and carries any positive weight.
    fn weighted_pick(&self, candidates: &[Vertex], rng: &mut ChaCha8Rng) -> Vertex {
        if let Some(weights_map) = self.router_weights {
            let weights: Vec<f64> = candidates
                .iter()
                .map(|v| weights_map.get(&v.node()).copied().unwrap_or(0.0))
                .collect();
            if weights.iter().sum::<f64>() > 0.0 {
                if let Ok(dist) = WeightedIndex::new(&weights) {
                    return candidates[dist.sample(rng)];
                }
            }
        }
        candidates[rng.gen_range(0..candidates.len())]
    }

    /// Fee over all but the final pseudo hop.
    fn fitness(&self, path: &[Vertex]) -> f64 {
        self.graph.path_fee_cost(path)
    }

    /// Cheapest individual; ties resolve to the earliest one.
    fn best_of(&self, population: &[Vec<Vertex>]) -> (Vec<Vertex>, f64) {
        let mut best = 0;
        let mut best_cost = self.fitness(&population[0]);
        for (i, candidate) in population.iter().enumerate().skip(1) {
            let cost = self.fitness(candidate);
            if cost < best_cost {
                best = i;
                best_cost = cost;
            }
        }
        (population[best].clone(), best_cost)
    }

    /// One evolution step: crossover offspring of the best parents plus a
    /// random sample of the previous generation, deduplicated.
    fn next_generation(
        &self,
        population: &[Vec<Vertex>],
        parent_count: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<Vec<Vertex>>, RoutingError> {
        let mut ranked: Vec<&Vec<Vertex>> = population.iter().collect();
        ranked.sort_by(|a, b| {
            self.fitness(a)
                .partial_cmp(&self.fitness(b))
                .expect("path costs are finite")
        });
        let mut parents: Vec<&Vec<Vertex>> =
            ranked.into_iter().take(parent_count).collect();

        let mut offspring: Vec<Vec<Vertex>> = Vec::new();
        for _ in 0..PAIRING_ROUNDS {
            parents.shuffle(rng);
            for pair in parents.chunks(2) {
                if let [first, second] = pair {
                    offspring.extend(self.crossover(first, second, rng)?);
                    offspring.extend(self.crossover(second, first, rng)?);
                }
            }
        }

        let mut seen: HashSet<Vec<Vertex>> = HashSet::new();
        let mut generation: Vec<Vec<Vertex>> = Vec::new();
        for child in offspring {
            if seen.insert(child.clone()) {
                generation.push(child);
            }
        }
        // Refresh with survivors sampled from the previous generation.
        if !generation.is_empty() {
            let survivors: BTreeSet<usize> = (0..generation.len())
                .map(|_| rng.gen_range(0..population.len()))
                .collect();
            generation.extend(survivors.into_iter().map(|i| population[i].clone()));
        }
        Ok(generation)
    }

    /// Produce children by replacing one interior node of `primary` with a
    /// common neighbor that is also interior to `secondary`. Every child
    /// must validate; a violation means the candidate enumeration itself
    /// is broken and aborts the run.
    fn crossover(
        &self,
        primary: &[Vertex],
        secondary: &[Vertex],
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<Vec<Vertex>>, RoutingError> {
        let target = primary
            .last()
            .expect("candidate paths are never empty")
            .node();
        let interior: HashSet<Vertex> = secondary[1..secondary.len() - 1].iter().copied().collect();
        let mut children = Vec::new();
        for i in 1..primary.len() - 1 {
            let candidates: Vec<Vertex> = self
                .common_neighbors(primary[i - 1], primary[i + 1], primary, target)
                .into_iter()
                .filter(|v| interior.contains(v))
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let mut child = primary.to_vec();
            child[i] = candidates[rng.gen_range(0..candidates.len())];
            if !self.validate(&child) {
                return Err(RoutingError::InvalidCrossover(
                    child[i].label(self.catalog),
                ));
            }
            children.push(child);
        }
        Ok(children)
    }

    /// A candidate is valid when its vertices are unique and every
    /// consecutive pair is an edge of the graph.
    pub fn validate(&self, path: &[Vertex]) -> bool {
        let unique: HashSet<&Vertex> = path.iter().collect();
        if unique.len() != path.len() {
            return false;
        }
        path.windows(2).all(|hop| self.graph.has_edge(hop[0], hop[1]))
    }
}
