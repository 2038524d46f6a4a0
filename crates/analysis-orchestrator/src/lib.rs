//! Run orchestration: resolve the company, fan out the five producers,
//! wait for all of them at a barrier, aggregate, and commit the bundle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use analysis_core::{
    AlternativesPayload, Bundle, ConfigError, FailureKind, FundamentalsPayload, MAX_RUN_TIMEOUT,
    NewsPayload, Payload, Producer, ProducerResult, ProducerResults, ResolutionError,
    ResolutionRecord, ResultMetadata, RetryPolicy, RiskLevel, RunContext, SectorMacroPayload,
    Symbol, TechnicalPayload,
};
use chrono::Utc;
use polygon_client::{
    PolygonClient, PolygonFundamentals, PolygonNews, PolygonPeers, PolygonPrices, PolygonSector,
};
use symbol_resolver::SymbolResolver;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub mod aggregator;
pub mod config;
pub mod ledger;

#[cfg(test)]
mod tests;

pub use aggregator::aggregate;
pub use config::{AdvisorConfig, AggregatorPolicy, CategoryWeights, RiskProfile, RiskProfiles};
pub use ledger::{
    read_artifact, LedgerError, RunLedger, BUNDLE_ARTIFACT, CONTEXT_ARTIFACT, DECISION_ARTIFACT,
    RESOLUTION_ARTIFACT,
};

/// Errors that stop a run. Producer failures never surface here.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{error}")]
    Resolution {
        error: ResolutionError,
        /// Directory holding the aborted bundle
        run_dir: PathBuf,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One invocation: free-text company, risk level string, horizon in years.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub company: String,
    pub risk_level: String,
    pub horizon_years: f64,
}

impl RunRequest {
    pub fn new(company: impl Into<String>, risk_level: impl Into<String>, horizon_years: f64) -> Self {
        Self {
            company: company.into(),
            risk_level: risk_level.into(),
            horizon_years,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub bundle: Bundle,
    pub run_dir: PathBuf,
}

/// The five producers of a run.
#[derive(Clone)]
pub struct ProducerSet {
    pub fundamentals: Arc<dyn Producer<Payload = FundamentalsPayload>>,
    pub technical: Arc<dyn Producer<Payload = TechnicalPayload>>,
    pub news: Arc<dyn Producer<Payload = NewsPayload>>,
    pub sector_macro: Arc<dyn Producer<Payload = SectorMacroPayload>>,
    pub alternatives: Arc<dyn Producer<Payload = AlternativesPayload>>,
}

impl ProducerSet {
    /// Producers backed by the Polygon REST collaborators.
    pub fn polygon(client: PolygonClient, retry: RetryPolicy) -> Self {
        Self {
            fundamentals: Arc::new(fundamental_analysis::FundamentalsProducer::new(
                Arc::new(PolygonFundamentals::new(client.clone())),
                retry,
            )),
            technical: Arc::new(technical_analysis::TechnicalProducer::new(
                Arc::new(PolygonPrices::new(client.clone())),
                retry,
            )),
            news: Arc::new(sentiment_analysis::SentimentProducer::new(
                Arc::new(PolygonNews::new(client.clone())),
                retry,
            )),
            sector_macro: Arc::new(sector_macro::SectorMacroProducer::new(
                Arc::new(PolygonSector::new(client.clone())),
                retry,
            )),
            alternatives: Arc::new(alternatives::AlternativesProducer::new(
                Arc::new(PolygonPeers::new(client)),
                retry,
            )),
        }
    }
}

pub struct AnalysisOrchestrator {
    resolver: SymbolResolver,
    producers: ProducerSet,
    policy: AggregatorPolicy,
    runs_dir: PathBuf,
    run_timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(resolver: SymbolResolver, producers: ProducerSet, runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            producers,
            policy: AggregatorPolicy::default(),
            runs_dir: runs_dir.into(),
            run_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_policy(mut self, policy: AggregatorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Validate the request and build the run context. No I/O happens here.
    pub fn prepare(&self, request: &RunRequest) -> Result<RunContext, ConfigError> {
        prepare_context(request, &self.policy, self.run_timeout)
    }

    /// Execute one run end to end.
    ///
    /// Returns `Err` only for invalid input, an unresolvable company, or a
    /// ledger that cannot be written. Every producer outcome, including
    /// timeouts and panics, ends up in the bundle.
    pub async fn run(&self, request: &RunRequest) -> Result<RunOutcome, RunError> {
        let context = self.prepare(request)?;
        tracing::info!(
            "Starting run for '{}' (risk={}, horizon={}y)",
            context.query,
            context.risk_level,
            context.horizon_years
        );

        let deadline = run_deadline(context.run_timeout());
        let resolution = match tokio::time::timeout_at(deadline, self.resolver.resolve(&context.query)).await {
            Ok(resolution) => resolution,
            Err(_) => Err(ResolutionError::TimedOut {
                query: context.query.clone(),
                timeout_secs: context.run_timeout_secs,
            }),
        };
        let record = ResolutionRecord::from_result(&context.query, &resolution);

        let resolved = match resolution {
            Ok(resolved) => resolved,
            Err(error) => {
                tracing::warn!("Resolution failed for '{}': {}", context.query, error);
                let ledger = RunLedger::create(&self.runs_dir, &context.run_key).await?;
                ledger.write_artifact(CONTEXT_ARTIFACT, &context).await?;
                ledger.write_artifact(RESOLUTION_ARTIFACT, &record).await?;
                ledger
                    .commit_bundle(&Bundle::aborted(context, record, error.to_string()))
                    .await?;
                return Err(RunError::Resolution {
                    error,
                    run_dir: ledger.dir().to_path_buf(),
                });
            }
        };

        tracing::info!(
            "Resolved '{}' to {} ({:?}, score {:.2})",
            context.query,
            resolved.symbol.ticker,
            resolved.strategy,
            resolved.score
        );
        let symbol = resolved.symbol.clone();
        let context = context.with_symbol(symbol.clone());
        let ledger = Arc::new(RunLedger::create(&self.runs_dir, &context.run_key).await?);
        ledger.write_artifact(CONTEXT_ARTIFACT, &context).await?;
        ledger.write_artifact(RESOLUTION_ARTIFACT, &record).await?;

        let results = self.fan_out(&symbol, &context, &ledger, deadline).await?;

        let decision = aggregate(&results, &context, &self.policy);
        tracing::info!(
            "Decision for {}: {} (confidence {:.2}, {} of 5 categories)",
            symbol.ticker,
            decision.action,
            decision.confidence,
            decision.rationale.contributing_categories
        );
        ledger.write_artifact(DECISION_ARTIFACT, &decision).await?;

        let bundle = Bundle::completed(context, record, results, decision);
        ledger.commit_bundle(&bundle).await?;

        Ok(RunOutcome {
            bundle,
            run_dir: ledger.dir().to_path_buf(),
        })
    }

    /// Spawn all five producers and wait for every one of them.
    async fn fan_out(
        &self,
        symbol: &Symbol,
        context: &RunContext,
        ledger: &Arc<RunLedger>,
        deadline: Instant,
    ) -> Result<ProducerResults, RunError> {
        let context = Arc::new(context.clone());

        let fundamentals = spawn_producer(self.producers.fundamentals.clone(), symbol, &context, ledger, deadline);
        let technical = spawn_producer(self.producers.technical.clone(), symbol, &context, ledger, deadline);
        let news = spawn_producer(self.producers.news.clone(), symbol, &context, ledger, deadline);
        let sector_macro = spawn_producer(self.producers.sector_macro.clone(), symbol, &context, ledger, deadline);
        let alternatives = spawn_producer(self.producers.alternatives.clone(), symbol, &context, ledger, deadline);

        let (fundamentals, technical, news, sector_macro, alternatives) = tokio::join!(
            join_producer(fundamentals, symbol, ledger),
            join_producer(technical, symbol, ledger),
            join_producer(news, symbol, ledger),
            join_producer(sector_macro, symbol, ledger),
            join_producer(alternatives, symbol, ledger),
        );

        let results = ProducerResults {
            fundamentals: fundamentals?,
            technical: technical?,
            news: news?,
            sector_macro: sector_macro?,
            alternatives: alternatives?,
        };
        tracing::info!(
            "Barrier reached for {}: {} of 5 producers succeeded",
            symbol.ticker,
            results.successes()
        );
        Ok(results)
    }
}

/// Check a request against the policy and timeout before any collaborator exists.
pub fn prepare_context(
    request: &RunRequest,
    policy: &AggregatorPolicy,
    run_timeout: Duration,
) -> Result<RunContext, ConfigError> {
    policy.validate()?;
    let risk: RiskLevel = request.risk_level.parse()?;
    RunContext::new(&request.company, risk, request.horizon_years, run_timeout, Utc::now())
}

/// Deadline shared by resolution and every producer of one run.
fn run_deadline(run_timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(run_timeout).unwrap_or(now + MAX_RUN_TIMEOUT)
}

struct Spawned<P: Payload> {
    handle: JoinHandle<(ProducerResult<P>, Result<(), LedgerError>)>,
    source: String,
}

/// Run one producer against the shared deadline and persist its result as soon as it lands.
fn spawn_producer<P: Payload>(
    producer: Arc<dyn Producer<Payload = P>>,
    symbol: &Symbol,
    context: &Arc<RunContext>,
    ledger: &Arc<RunLedger>,
    deadline: Instant,
) -> Spawned<P> {
    let source = producer.source().to_string();
    let symbol = symbol.clone();
    let context = Arc::clone(context);
    let ledger = Arc::clone(ledger);
    let task_source = source.clone();

    let handle = tokio::spawn(async move {
        let category = P::CATEGORY;
        tracing::debug!("{} producer started for {}", category, symbol.ticker);

        let result = match tokio::time::timeout_at(deadline, producer.analyze(&symbol, &context)).await {
            Ok(result) => result,
            Err(_) => ProducerResult::failure(
                FailureKind::Timeout,
                format!("run deadline of {}s exceeded", context.run_timeout_secs),
                ResultMetadata::new(category, &symbol.ticker, &task_source),
            ),
        };
        tracing::info!(
            "{} producer finished for {}: {} in {}ms",
            category,
            symbol.ticker,
            result.outcome_label(),
            result.metadata().elapsed_ms
        );

        let persisted = ledger
            .write_artifact(&category.artifact_name(), &result)
            .await
            .map(|_| ());
        (result, persisted)
    });

    Spawned { handle, source }
}

/// Await a producer task. A panicked task becomes an `Internal` failure and
/// its artifact is written here instead.
async fn join_producer<P: Payload>(
    spawned: Spawned<P>,
    symbol: &Symbol,
    ledger: &RunLedger,
) -> Result<ProducerResult<P>, RunError> {
    match spawned.handle.await {
        Ok((result, persisted)) => {
            persisted?;
            Ok(result)
        }
        Err(join_error) => {
            tracing::error!("{} producer task failed: {}", P::CATEGORY, join_error);
            let result = ProducerResult::failure(
                FailureKind::Internal,
                format!("producer task failed: {}", join_error),
                ResultMetadata::new(P::CATEGORY, &symbol.ticker, &spawned.source),
            );
            ledger
                .write_artifact(&P::CATEGORY.artifact_name(), &result)
                .await?;
            Ok(result)
        }
    }
}
