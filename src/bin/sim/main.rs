// LN Traffic Simulator runner - snapshot in, CSV tables out
//
// Usage:
//   cargo run --release --bin sim -- <edges.csv> <merchants.csv> <params.json> <out_dir>
//   cargo run --release --bin sim -- --raw <snapshot.json> <merchants.csv> <params.json> <out_dir>
//   cargo run --release --bin sim -- ... --seed 42        # Override the params seed
//   cargo run --release --bin sim -- ... --threads 8      # Override the sweep pool size

use std::path::Path;
use std::process;
use std::time::Instant;

use lnsim_engine::pricing::calc_optimal_base_fee;
use lnsim_engine::report::total_router_income;
use lnsim_engine::snapshot;
use lnsim_engine::{SimParams, TrafficSimulator};

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    raw: bool,
    seed: Option<u64>,
    threads: Option<usize>,
    paths: Vec<String>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        raw: false,
        seed: None,
        threads: None,
        paths: Vec::new(),
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--raw" => {
                cli.raw = true;
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    cli.seed = args[i].parse().ok();
                }
            }
            "--threads" => {
                i += 1;
                if i < args.len() {
                    cli.threads = args[i].parse().ok();
                }
            }
            arg if !arg.starts_with('-') => {
                cli.paths.push(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    cli
}

fn usage() -> ! {
    eprintln!("You must supply 4 input arguments:");
    eprintln!("   sim [--raw] <edges> <merchants.csv> <params.json> <out_dir>");
    eprintln!("With --raw, <edges> is a raw describegraph JSON snapshot;");
    eprintln!("otherwise it is a preprocessed directed-edge CSV table.");
    process::exit(1);
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() {
    env_logger::init();
    let cli = parse_args();
    if cli.paths.len() != 4 {
        usage();
    }
    let [edges_path, merchants_path, params_path, out_dir] =
        [&cli.paths[0], &cli.paths[1], &cli.paths[2], &cli.paths[3]];

    let params_file = std::fs::read_to_string(params_path).unwrap_or_else(|e| {
        eprintln!("Cannot read {params_path}: {e}");
        process::exit(1);
    });
    let mut params: SimParams = serde_json::from_str(&params_file).unwrap_or_else(|e| {
        eprintln!("Invalid parameter file {params_path}: {e}");
        process::exit(1);
    });
    if let Some(seed) = cli.seed {
        params.seed = seed;
    }
    if let Some(threads) = cli.threads {
        params.max_threads = threads;
    }

    let edges = if cli.raw {
        snapshot::preprocess_json_snapshot(Path::new(edges_path))
    } else {
        snapshot::load_edges_csv(Path::new(edges_path))
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to load edges from {edges_path}: {e}");
        process::exit(1);
    });
    let merchants = snapshot::load_merchants_csv(Path::new(merchants_path)).unwrap_or_else(|e| {
        eprintln!("Failed to load merchants from {merchants_path}: {e}");
        process::exit(1);
    });

    println!("\n  LN Traffic Simulator");
    println!(
        "  PRNG: ChaCha8Rng | seed {} | {} transactions of {} sat | depletion {}",
        params.seed, params.count, params.amount, params.with_depletion
    );

    let start = Instant::now();
    let simulator = TrafficSimulator::new(&edges, &merchants, params.clone());
    println!(
        "  {} directed edges, {} nodes, {} sampled payments",
        simulator.edges().len(),
        simulator.catalog().len(),
        simulator.transactions().len()
    );

    let output = match simulator.simulate() {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Simulation failed: {e}");
            process::exit(1);
        }
    };

    let opt_fees = if params.with_node_removals {
        Some(calc_optimal_base_fee(
            &output.shortest_paths,
            &output.alternative_paths,
            &output.router_fees,
            params.min_ratio,
        ))
    } else {
        None
    };

    if let Err(e) = simulator.export(Path::new(out_dir), &output, opt_fees.as_deref()) {
        eprintln!("Export failed: {e}");
        process::exit(1);
    }

    let routers = total_router_income(&output.router_fees);
    let depletion_events: u64 = output.depletions.values().sum();
    println!(
        "  Success rate: {:.1}%  Routers earning: {}  Depletion events: {}",
        output.success_ratio() * 100.0,
        routers.len(),
        depletion_events
    );
    if let Some(rows) = &opt_fees {
        println!("  Optimal-fee table: {} routers", rows.len());
    }
    println!(
        "  Results saved to: {}  ({:.1}s)\n",
        out_dir,
        start.elapsed().as_secs_f64()
    );
}
