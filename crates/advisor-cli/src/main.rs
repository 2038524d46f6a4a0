//! equity-advisor: long-term Buy/Hold/Sell recommendation for one company.
//!
//! Usage:
//!   equity-advisor "Reliance" --risk medium --horizon 2
//!   equity-advisor "HDFC Bank" --risk low --horizon 5 --runs-dir ./runs
//!   RUST_LOG=debug equity-advisor Apple --json-logs

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use analysis_core::{Decision, FactorOutcome, SymbolLookup};
use analysis_orchestrator::{
    prepare_context, AdvisorConfig, AggregatorPolicy, AnalysisOrchestrator, ProducerSet, RunError,
    RunRequest,
};
use anyhow::{Context, Result};
use clap::Parser;
use polygon_client::PolygonClient;
use symbol_resolver::SymbolResolver;

#[derive(Parser, Debug)]
#[command(name = "equity-advisor", version, about = "Long-term equity Buy/Hold/Sell advisor")]
struct Args {
    /// Company name or ticker, e.g. "Reliance" or "AAPL"
    company: String,

    /// Risk level: low, medium or high
    #[arg(long)]
    risk: Option<String>,

    /// Investment horizon in years
    #[arg(long)]
    horizon: Option<f64>,

    /// Directory that receives one sub-directory per run
    #[arg(long)]
    runs_dir: Option<PathBuf>,

    /// Overall run timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// JSON file overriding the aggregator policy
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "equity_advisor=info,analysis_orchestrator=info,polygon_client=warn".into()
    });
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn print_decision(decision: &Decision) {
    println!("Action:        {}", decision.action);
    println!("Confidence:    {:.0}%", decision.confidence * 100.0);
    println!("Composite:     {:+.2}", decision.composite_score);
    println!("Entry timing:  {}", decision.entry_timing);
    println!(
        "Position size: {:.1}% of portfolio (cap {:.1}%, {:?})",
        decision.position_size.fraction * 100.0,
        decision.position_size.cap * 100.0,
        decision.position_size.bucket
    );
    if let Some(plan) = &decision.dca_plan {
        println!("DCA plan:      {} tranches over {} weeks", plan.tranches, plan.span_weeks);
    }
    let controls = &decision.risk_controls;
    println!(
        "Risk controls: stop loss {:.0}%{}, review every {} months",
        controls.stop_loss_pct * 100.0,
        if controls.exit_below_200dma { ", exit below 200-day average" } else { "" },
        controls.review_every_months
    );

    println!();
    println!("Rationale: {}", decision.rationale.statement);
    for factor in &decision.rationale.factors {
        match &factor.outcome {
            FactorOutcome::Contributed {
                direction,
                score,
                weight,
                highlight,
            } => println!(
                "  {:<13} {:?} {:+.2} (weight {:.2}): {}",
                factor.category.label(),
                direction,
                score,
                weight,
                highlight
            ),
            FactorOutcome::Missing { kind, reason } => println!(
                "  {:<13} missing ({}): {}",
                factor.category.label(),
                kind.as_str(),
                reason
            ),
        }
    }

    println!();
    println!("News: {}", decision.news_summary);
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut config = AdvisorConfig::from_env().context("reading configuration from environment")?;
    if let Some(dir) = args.runs_dir {
        config.runs_dir = dir;
    }
    if let Some(secs) = args.timeout_secs {
        config.run_timeout = Duration::from_secs(secs);
    }
    if args.policy.is_some() {
        config.policy_file = args.policy;
    }

    let policy: AggregatorPolicy = config.load_policy()?;
    let request = RunRequest::new(
        args.company,
        args.risk.unwrap_or_else(|| config.default_risk_level.clone()),
        args.horizon.unwrap_or(config.default_horizon_years),
    );
    if let Err(e) = prepare_context(&request, &policy, config.run_timeout) {
        eprintln!("Configuration error: {}", e);
        return Ok(ExitCode::from(2));
    }

    let api_key = config
        .polygon_api_key
        .clone()
        .context("POLYGON_API_KEY must be set")?;

    let client = PolygonClient::new(api_key, config.polygon_rate_limit);
    let lookup: Arc<dyn SymbolLookup> = Arc::new(client.clone());
    let orchestrator = AnalysisOrchestrator::new(
        SymbolResolver::new(Some(lookup)),
        ProducerSet::polygon(client, config.retry_policy()),
        config.runs_dir.clone(),
    )
    .with_policy(policy)
    .with_run_timeout(config.run_timeout);

    tracing::info!(
        "Advising on '{}' (risk={}, horizon={}y, runs in {})",
        request.company,
        request.risk_level,
        request.horizon_years,
        config.runs_dir.display()
    );

    match orchestrator.run(&request).await {
        Ok(outcome) => {
            if let Some(symbol) = &outcome.bundle.context.symbol {
                println!("{} ({})", symbol.name, symbol.ticker);
                println!();
            }
            if let Some(decision) = &outcome.bundle.decision {
                tracing::info!(
                    "Run complete: {} at {:.2} confidence",
                    decision.action,
                    decision.confidence
                );
                print_decision(decision);
            }
            println!();
            println!("Run artifacts: {}", outcome.run_dir.display());
            tracing::info!("Artifacts written to {}", outcome.run_dir.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(RunError::Config(e)) => {
            tracing::error!("Configuration error: {}", e);
            eprintln!("Configuration error: {}", e);
            Ok(ExitCode::from(2))
        }
        Err(RunError::Resolution { error, run_dir }) => {
            tracing::warn!("Run aborted at resolution, artifacts in {}", run_dir.display());
            eprintln!("Could not resolve company: {}", error);
            eprintln!("Run artifacts: {}", run_dir.display());
            Ok(ExitCode::from(3))
        }
        Err(e @ RunError::Ledger(_)) => Err(e).context("writing run ledger"),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.json_logs);
    run(args).await
}
