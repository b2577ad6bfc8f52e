//! EquiNet Simulator CLI
//!
//! Run deterministic stabilization scenarios, optionally sweeping seeds.

use clap::Parser;
use equinet_core::Pattern;
use equinet_sim::scenarios::ScenarioId;
use equinet_sim::{CorrectionPolicy, RunnerConfig, ScenarioResult, ScenarioRunner};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// EquiNet deterministic stabilization CLI
#[derive(Parser, Debug)]
#[command(name = "equinet-sim")]
#[command(about = "Run deterministic fault-injection scenarios for EquiNet", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of agents in generated patterns
    #[arg(short, long, default_value = "15")]
    agents: usize,

    /// Ones per step in generated patterns
    #[arg(short, long, default_value = "9")]
    ones: usize,

    /// Steps to simulate after the initial state
    #[arg(short = 't', long, default_value = "40")]
    steps: u64,

    /// Scenario to run (steady, inferred_ring, ring_fault, follower_fault, blip, follower_storm, replay, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Correction policy (single_shot, until_stable)
    #[arg(short, long, default_value = "single_shot")]
    correction: CorrectionPolicy,

    /// Observed pattern file: JSON array of per-agent bitstrings
    #[arg(short, long)]
    pattern: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the run's trace to a JSON file (single scenario and seed)
    #[arg(long)]
    export: Option<String>,
}

fn load_pattern(path: &str) -> Pattern {
    let raw = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error: cannot read pattern file {}: {}", path, e);
        std::process::exit(1);
    });
    Pattern::from_json(&raw).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    })
}

fn run_with_export(config: RunnerConfig, scenario: ScenarioId, export_path: &str) -> bool {
    let run = match ScenarioRunner::from_config(config).execute(scenario) {
        Ok(run) => run,
        Err(e) => {
            error!("✗ {} setup failed: {}", scenario.name(), e);
            return false;
        }
    };

    run.world.topology().summary();
    let export = run.export();
    if let Err(e) = export.write_to_file(export_path) {
        error!("Failed to write export: {:?}", e);
    } else {
        info!("Exported {} frames to {}", export.frames.len(), export_path);
    }

    if run.result.passed {
        info!("✓ {} (seed={}) PASSED - exported to {}",
            scenario.name(), run.result.seed, export_path);
    } else {
        error!("✗ {} FAILED: {}",
            scenario.name(),
            run.result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
    run.result.passed
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG still refines per-module levels
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("EquiNet Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
            eprintln!("Available scenarios: {}, all", names.join(", "));
            std::process::exit(1);
        })]
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let base_config = RunnerConfig {
        seed: base_seed,
        num_agents: args.agents,
        ones: args.ones,
        steps: args.steps,
        correction: args.correction,
        pattern: args.pattern.as_deref().map(load_pattern),
        ..Default::default()
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 || args.seeds > 1 {
            eprintln!("Error: --export only supports a single scenario and seed");
            std::process::exit(1);
        }

        info!("Running with export to: {}", export_path);
        if !run_with_export(base_config, scenarios[0], export_path) {
            std::process::exit(1);
        }
        return;
    }

    // Every (seed, scenario) pair runs on its own blocking task
    let mut handles = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        for &scenario in &scenarios {
            let config = RunnerConfig {
                seed,
                ..base_config.clone()
            };
            let handle = tokio::task::spawn_blocking(move || {
                ScenarioRunner::from_config(config).run(scenario)
            });
            handles.push((seed, scenario, handle));
        }
    }

    // Track results in submission order
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for (seed, scenario, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("✗ {} (seed={}) task failed: {}", scenario.name(), seed, e);
                failed_count += 1;
                continue;
            }
        };

        if !args.json {
            if result.passed {
                info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
            } else {
                error!("✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }

        if !result.passed {
            failed_count += 1;
        }

        all_results.push(result);
    }

    // Summary
    let total = args.seeds * scenarios.len();
    let passed = total - failed_count;

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "correction": args.correction.name(),
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "steps": r.total_steps,
                    "anomalies": r.metrics.anomalies,
                    "corrections": r.metrics.corrections,
                    "flips": r.metrics.flips,
                    "max_deviation": r.metrics.max_deviation,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: cannot render summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            // List failed seeds
            for result in &all_results {
                if !result.passed {
                    error!("  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
