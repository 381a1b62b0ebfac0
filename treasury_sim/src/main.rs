//! Treasury Simulator CLI
//!
//! Run the agent engine through crisis scenarios on a deterministic clock.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use treasury_core::catalog::builtin_scenarios;
use treasury_core::EngineConfig;
use treasury_sim::{SimConfig, SimError, SimResult, SimRunner};

/// Treasury agent simulation CLI
#[derive(Parser, Debug)]
#[command(name = "treasury-sim")]
#[command(about = "Run deterministic treasury agent simulations", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Coordinator ticks per scenario run
    #[arg(short, long, default_value = "24")]
    ticks: u64,

    /// Scenario to run (market-crash, compliance-audit, governance-proposal, liquidity-crunch, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-tick frames and the final snapshot to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Engine configuration file (JSON); missing fields take defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn base_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(42)
}

async fn run(args: &Args) -> Result<Vec<SimResult>, SimError> {
    let engine = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    let catalog: Vec<String> = builtin_scenarios()?.into_iter().map(|s| s.id).collect();
    let scenarios: Vec<String> = if args.scenario == "all" {
        catalog
    } else if catalog.contains(&args.scenario) {
        vec![args.scenario.clone()]
    } else {
        eprintln!("Error: unknown scenario '{}'", args.scenario);
        eprintln!("Available scenarios: {}, all", catalog.join(", "));
        std::process::exit(2);
    };

    if args.export.is_some() && scenarios.len() > 1 {
        eprintln!("Error: --export only supports a single scenario, not 'all'");
        std::process::exit(2);
    }

    let config = SimConfig {
        seed: base_seed(args.seed),
        ticks: args.ticks,
        engine,
        ..Default::default()
    };
    let runner = SimRunner::new(config).with_frames(args.export.is_some());

    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        let (result, export) = runner.run(scenario).await?;

        if !args.json {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED: {} decisions over {} ticks",
                    scenario, result.seed, result.metrics.decisions, result.total_ticks
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }

        if let Some(path) = &args.export {
            export.write_to_file(path)?;
            info!("Exported {} frames to {}", export.frames.len(), path.display());
        }
        results.push(result);
    }
    Ok(results)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("Treasury Simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    let results = match run(&args).await {
        Ok(results) => results,
        Err(e) => {
            error!("Simulation aborted: {}", e);
            std::process::exit(2);
        }
    };

    let failed: Vec<&SimResult> = results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed.len(),
            "failed": failed.len(),
            "results": results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else if failed.is_empty() {
        info!("All {} scenario runs passed", results.len());
    } else {
        error!("{}/{} scenario runs failed", failed.len(), results.len());
    }

    // Exit with proper code for CI
    if !failed.is_empty() {
        std::process::exit(1);
    }
}
