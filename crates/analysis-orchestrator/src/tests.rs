use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use analysis_core::{
    Action, BundleStatus, Category, CollaboratorError, Decision, EntryTiming, FactorOutcome,
    Headline, ListingCandidate, MarketRegime, ResolutionOutcome, ScoredListing, SectorTrend,
    SentimentLabel, SymbolLookup, TrendDirection,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use super::*;

// =============================================================================
// Fakes
// =============================================================================

enum Behavior<P> {
    Succeed(P),
    Fail(FailureKind, &'static str),
    Hang,
    Panic,
}

struct FakeProducer<P> {
    behavior: Behavior<P>,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl<P: Payload> Producer for FakeProducer<P> {
    type Payload = P;

    async fn analyze(&self, symbol: &Symbol, _context: &RunContext) -> ProducerResult<P> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let metadata = ResultMetadata::new(P::CATEGORY, &symbol.ticker, "fake");
        match &self.behavior {
            Behavior::Succeed(payload) => ProducerResult::validated(payload.clone(), metadata),
            Behavior::Fail(kind, reason) => ProducerResult::failure(*kind, *reason, metadata),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                ProducerResult::failure(FailureKind::Internal, "unreachable", metadata)
            }
            Behavior::Panic => panic!("producer blew up"),
        }
    }

    fn source(&self) -> &str {
        "fake"
    }
}

/// Ticker search that never answers.
struct StalledLookup;

#[async_trait]
impl SymbolLookup for StalledLookup {
    async fn search(&self, _query: &str) -> Result<Vec<ListingCandidate>, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

fn fake<P: Payload>(behavior: Behavior<P>, calls: &Arc<AtomicU32>) -> Arc<dyn Producer<Payload = P>> {
    Arc::new(FakeProducer {
        behavior,
        calls: Arc::clone(calls),
    })
}

// =============================================================================
// Bullish fixtures
// =============================================================================

fn fundamentals() -> FundamentalsPayload {
    let metrics: BTreeMap<String, f64> = [
        ("pe_ratio", 22.0),
        ("roe", 18.0),
        ("net_margin", 12.0),
        ("gross_margin", 45.0),
        ("operating_margin", 17.0),
        ("debt_to_equity", 0.4),
        ("current_ratio", 1.6),
        ("revenue_growth_yoy", 14.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    FundamentalsPayload {
        metrics,
        pros: vec!["Strong ROE (18.0%)".into()],
        cons: vec![],
        score: 80.0,
        periods_analyzed: 8,
    }
}

fn technical() -> TechnicalPayload {
    TechnicalPayload {
        last_close: 2950.0,
        sma_50: 2850.0,
        sma_200: Some(2700.0),
        rsi_14: Some(58.0),
        momentum_3m: Some(0.12),
        drawdown_52w: -0.03,
        trend: TrendDirection::Uptrend,
        pros: vec!["Price above 50/200-day averages".into()],
        cons: vec![],
        bars_analyzed: 270,
    }
}

fn news() -> NewsPayload {
    NewsPayload {
        score: 0.4,
        label: SentimentLabel::Positive,
        article_count: 10,
        positive: 6,
        negative: 1,
        neutral: 3,
        headlines: vec![Headline {
            title: "Reliance posts record quarterly profit".into(),
            url: "https://news.example/1".into(),
            published_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
            sentiment: 0.9,
        }],
        summary: "10 articles: 6 positive, 1 negative, 3 neutral; overall positive".into(),
    }
}

fn sector() -> SectorMacroPayload {
    SectorMacroPayload {
        sector: "Energy".into(),
        sector_etf: "XLE".into(),
        benchmark: "SPY".into(),
        sector_return_3m: 0.06,
        sector_return_12m: Some(0.15),
        benchmark_return_3m: 0.03,
        benchmark_return_12m: Some(0.10),
        relative_strength_3m: 0.03,
        relative_strength_12m: Some(0.05),
        regime: MarketRegime::Normal,
        trend: SectorTrend::Tailwind,
        summary: "Energy (XLE) +6.0% over 3m vs SPY +3.0%; normal regime".into(),
    }
}

fn alternatives() -> AlternativesPayload {
    let listing = |ticker: &str, score: f64| ScoredListing {
        ticker: ticker.into(),
        name: ticker.into(),
        score,
        return_12m: Some(0.1),
        volatility: Some(0.25),
        market_cap: Some(1e11),
        reason: "+10.0% trailing return at 25% volatility".into(),
    };
    AlternativesPayload {
        subject: listing("RELIANCE.NS", 72.0),
        candidates: vec![
            listing("ONGC.NS", 75.0),
            listing("IOC.NS", 60.0),
            listing("BPCL.NS", 55.0),
            listing("GAIL.NS", 50.0),
            listing("HINDPETRO.NS", 45.0),
        ],
        subject_rank: 2,
        subject_percentile: 0.8,
    }
}

struct Harness {
    calls: Arc<AtomicU32>,
    root: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            root: tempfile::tempdir().unwrap(),
        }
    }

    fn all_succeed(&self) -> ProducerSet {
        ProducerSet {
            fundamentals: fake(Behavior::Succeed(fundamentals()), &self.calls),
            technical: fake(Behavior::Succeed(technical()), &self.calls),
            news: fake(Behavior::Succeed(news()), &self.calls),
            sector_macro: fake(Behavior::Succeed(sector()), &self.calls),
            alternatives: fake(Behavior::Succeed(alternatives()), &self.calls),
        }
    }

    fn all_fail(&self) -> ProducerSet {
        ProducerSet {
            fundamentals: fake(Behavior::Fail(FailureKind::DataUnavailable, "no filings"), &self.calls),
            technical: fake(Behavior::Fail(FailureKind::Timeout, "slow"), &self.calls),
            news: fake(Behavior::Fail(FailureKind::DataUnavailable, "no articles"), &self.calls),
            sector_macro: fake(Behavior::Fail(FailureKind::ValidationFailed, "bad bars"), &self.calls),
            alternatives: fake(Behavior::Fail(FailureKind::DataUnavailable, "no peers"), &self.calls),
        }
    }

    fn orchestrator(&self, producers: ProducerSet) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(SymbolResolver::new(None), producers, self.root.path())
            .with_run_timeout(Duration::from_secs(5))
    }
}

fn reliance(risk: &str) -> RunRequest {
    RunRequest::new("Reliance", risk, 2.0)
}

fn context_for(risk: RiskLevel) -> RunContext {
    RunContext::new(
        "Reliance",
        risk,
        2.0,
        Duration::from_secs(30),
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap(),
    )
    .unwrap()
    .with_symbol(Symbol::new("RELIANCE.NS", "Reliance Industries Limited"))
}

fn metadata(category: Category) -> ResultMetadata {
    let mut metadata = ResultMetadata::new(category, "RELIANCE.NS", "fake");
    metadata.completed_at = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 1).unwrap();
    metadata
}

fn bullish_results() -> ProducerResults {
    ProducerResults {
        fundamentals: ProducerResult::validated(fundamentals(), metadata(Category::Fundamentals)),
        technical: ProducerResult::validated(technical(), metadata(Category::Technical)),
        news: ProducerResult::validated(news(), metadata(Category::News)),
        sector_macro: ProducerResult::validated(sector(), metadata(Category::SectorMacro)),
        alternatives: ProducerResult::validated(alternatives(), metadata(Category::Alternatives)),
    }
}

fn decision_of(outcome: &RunOutcome) -> &Decision {
    outcome.bundle.decision.as_ref().unwrap()
}

// =============================================================================
// End-to-end runs
// =============================================================================

#[tokio::test]
async fn test_reliance_all_bullish_buys() {
    let harness = Harness::new();
    let outcome = harness
        .orchestrator(harness.all_succeed())
        .run(&reliance("medium"))
        .await
        .unwrap();

    let decision = decision_of(&outcome);
    assert_eq!(decision.action, Action::Buy);
    assert!(decision.confidence > 0.6, "confidence {}", decision.confidence);
    let cap = AggregatorPolicy::default().risk.medium.position_cap;
    assert!(decision.position_size.fraction > 0.0);
    assert!(decision.position_size.fraction <= cap);
    assert_eq!(decision.rationale.contributing_categories, 5);
    assert!(decision.degraded.is_none());
    assert_eq!(outcome.bundle.status, BundleStatus::Complete);
    assert_eq!(harness.calls.load(Ordering::SeqCst), 5);
    assert!(decision.news_summary.contains("Reliance posts record quarterly profit"));
}

#[tokio::test]
async fn test_every_stage_is_persisted() {
    let harness = Harness::new();
    let outcome = harness
        .orchestrator(harness.all_succeed())
        .run(&reliance("medium"))
        .await
        .unwrap();

    for name in [CONTEXT_ARTIFACT, RESOLUTION_ARTIFACT, DECISION_ARTIFACT, BUNDLE_ARTIFACT] {
        assert!(outcome.run_dir.join(name).exists(), "{} missing", name);
    }
    for category in Category::ALL {
        assert!(outcome.run_dir.join(category.artifact_name()).exists());
    }
    let dir_name = outcome.run_dir.file_name().unwrap().to_string_lossy().to_string();
    assert!(dir_name.ends_with("_RELIANCE_NS"), "{}", dir_name);
}

#[tokio::test]
async fn test_missing_news_degrades_confidence() {
    let harness = Harness::new();
    let full = harness
        .orchestrator(harness.all_succeed())
        .run(&reliance("medium"))
        .await
        .unwrap();

    let mut producers = harness.all_succeed();
    producers.news = fake(Behavior::Fail(FailureKind::DataUnavailable, "feed returned nothing"), &harness.calls);
    let partial = harness.orchestrator(producers).run(&reliance("medium")).await.unwrap();

    let full = decision_of(&full);
    let partial_decision = decision_of(&partial);
    assert!(partial_decision.confidence < full.confidence);
    assert_eq!(partial_decision.rationale.contributing_categories, 4);
    assert!(partial_decision.rationale.statement.contains("News"));

    let news_entry = partial_decision
        .rationale
        .factors
        .iter()
        .find(|f| f.category == Category::News)
        .unwrap();
    assert!(matches!(
        news_entry.outcome,
        FactorOutcome::Missing { kind: FailureKind::DataUnavailable, .. }
    ));

    let degraded = partial_decision.degraded.as_ref().unwrap();
    assert_eq!(degraded.successful, 4);
    assert_eq!(degraded.missing[0].category, Category::News);
    assert_eq!(
        partial.bundle.status,
        BundleStatus::Degraded { missing: vec![Category::News] }
    );
    assert!(partial_decision.news_summary.starts_with("News unavailable"));
}

#[tokio::test]
async fn test_resolution_failure_invokes_no_producer() {
    let harness = Harness::new();
    let err = harness
        .orchestrator(harness.all_succeed())
        .run(&RunRequest::new("Nonexistent Widgets", "medium", 2.0))
        .await
        .unwrap_err();

    let run_dir = match err {
        RunError::Resolution { error, run_dir } => {
            assert!(matches!(error, ResolutionError::NotFound { .. }));
            run_dir
        }
        other => panic!("expected resolution error, got {:?}", other),
    };
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
    for category in Category::ALL {
        assert!(!run_dir.join(category.artifact_name()).exists());
    }
    assert!(!run_dir.join(DECISION_ARTIFACT).exists());

    let bundle: Bundle = read_artifact(&run_dir, BUNDLE_ARTIFACT).await.unwrap();
    assert!(matches!(bundle.status, BundleStatus::Aborted { .. }));
    assert!(bundle.producers.is_none());
    assert!(bundle.decision.is_none());
    assert!(matches!(bundle.resolution.outcome, ResolutionOutcome::Failed { .. }));
}

#[tokio::test]
async fn test_ambiguous_company_aborts() {
    let harness = Harness::new();
    let err = harness
        .orchestrator(harness.all_succeed())
        .run(&RunRequest::new("HDFC", "medium", 2.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Resolution { error: ResolutionError::Ambiguous { .. }, .. }
    ));
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_input_fails_before_any_work() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(harness.all_succeed());

    let err = orchestrator.run(&RunRequest::new("Reliance", "aggressive", 2.0)).await.unwrap_err();
    assert!(matches!(err, RunError::Config(ConfigError::InvalidRiskLevel(_))));

    let err = orchestrator.run(&RunRequest::new("Reliance", "low", 0.0)).await.unwrap_err();
    assert!(matches!(err, RunError::Config(ConfigError::InvalidHorizon(_))));

    let err = orchestrator.run(&RunRequest::new("Reliance", "low", -1.5)).await.unwrap_err();
    assert!(matches!(err, RunError::Config(ConfigError::InvalidHorizon(_))));

    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_dir(harness.root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_oversized_run_timeout_is_a_config_error() {
    let harness = Harness::new();
    let err = harness
        .orchestrator(harness.all_succeed())
        .with_run_timeout(Duration::from_secs(u64::MAX))
        .run(&reliance("medium"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Config(ConfigError::InvalidTimeout(_))));
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_dir(harness.root.path()).unwrap().count(), 0);
}

#[test]
fn test_prepare_context_needs_no_orchestrator() {
    let policy = AggregatorPolicy::default();
    let timeout = Duration::from_secs(30);
    let context = prepare_context(&reliance("HIGH"), &policy, timeout).unwrap();
    assert_eq!(context.risk_level, RiskLevel::High);
    assert!(context.symbol.is_none());

    let err = prepare_context(&reliance("aggressive"), &policy, timeout).unwrap_err();
    assert_eq!(err, ConfigError::InvalidRiskLevel("aggressive".into()));
}

#[tokio::test]
async fn test_stalled_symbol_lookup_hits_run_deadline() {
    let harness = Harness::new();
    let resolver = SymbolResolver::new(Some(Arc::new(StalledLookup)));
    let orchestrator = AnalysisOrchestrator::new(resolver, harness.all_succeed(), harness.root.path())
        .with_run_timeout(Duration::from_secs(1));

    let err = orchestrator
        .run(&RunRequest::new("Nonexistent Widgets", "medium", 2.0))
        .await
        .unwrap_err();
    let run_dir = match err {
        RunError::Resolution { error, run_dir } => {
            assert_eq!(
                error,
                ResolutionError::TimedOut {
                    query: "Nonexistent Widgets".into(),
                    timeout_secs: 1,
                }
            );
            run_dir
        }
        other => panic!("expected resolution error, got {:?}", other),
    };
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
    let bundle: Bundle = read_artifact(&run_dir, BUNDLE_ARTIFACT).await.unwrap();
    assert!(matches!(bundle.status, BundleStatus::Aborted { .. }));
}

#[tokio::test]
async fn test_all_producers_failing_still_holds() {
    let harness = Harness::new();
    let outcome = harness
        .orchestrator(harness.all_fail())
        .run(&reliance("high"))
        .await
        .unwrap();

    let decision = decision_of(&outcome);
    assert_eq!(decision.action, Action::Hold);
    assert_eq!(decision.confidence, AggregatorPolicy::default().confidence_floor);
    assert_eq!(decision.rationale.contributing_categories, 0);
    assert!(decision.rationale.statement.starts_with("insufficient data: 0 of 5"));
    assert_eq!(decision.position_size.fraction, 0.0);
    assert!(matches!(decision.entry_timing, EntryTiming::Wait { .. }));
    assert_eq!(harness.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_hung_producer_times_out_at_barrier() {
    let harness = Harness::new();
    let mut producers = harness.all_succeed();
    producers.alternatives = fake(Behavior::Hang, &harness.calls);
    let outcome = harness
        .orchestrator(producers)
        .with_run_timeout(Duration::from_secs(1))
        .run(&reliance("medium"))
        .await
        .unwrap();

    let alternatives = &outcome.bundle.producers.as_ref().unwrap().alternatives;
    assert_eq!(alternatives.failure_info().map(|f| f.kind), Some(FailureKind::Timeout));
    assert_eq!(decision_of(&outcome).rationale.contributing_categories, 4);
    assert!(outcome.run_dir.join(Category::Alternatives.artifact_name()).exists());
}

#[tokio::test]
async fn test_panicking_producer_is_isolated() {
    let harness = Harness::new();
    let mut producers = harness.all_succeed();
    producers.sector_macro = fake(Behavior::Panic, &harness.calls);
    let outcome = harness.orchestrator(producers).run(&reliance("medium")).await.unwrap();

    let results = outcome.bundle.producers.as_ref().unwrap();
    assert_eq!(results.sector_macro.failure_info().map(|f| f.kind), Some(FailureKind::Internal));
    assert!(results.fundamentals.is_success());
    assert!(results.technical.is_success());
    assert!(outcome.run_dir.join(Category::SectorMacro.artifact_name()).exists());
}

#[tokio::test]
async fn test_artifacts_round_trip() {
    let harness = Harness::new();
    let mut producers = harness.all_succeed();
    producers.technical = fake(Behavior::Fail(FailureKind::ValidationFailed, "gap in bars"), &harness.calls);
    let outcome = harness.orchestrator(producers).run(&reliance("low")).await.unwrap();
    let dir = &outcome.run_dir;

    let bundle: Bundle = read_artifact(dir, BUNDLE_ARTIFACT).await.unwrap();
    assert_eq!(bundle, outcome.bundle);

    let decision: Decision = read_artifact(dir, DECISION_ARTIFACT).await.unwrap();
    assert_eq!(Some(&decision), outcome.bundle.decision.as_ref());

    let context: RunContext = read_artifact(dir, CONTEXT_ARTIFACT).await.unwrap();
    assert_eq!(context, outcome.bundle.context);

    let record: ResolutionRecord = read_artifact(dir, RESOLUTION_ARTIFACT).await.unwrap();
    assert_eq!(record, outcome.bundle.resolution);

    let results = outcome.bundle.producers.as_ref().unwrap();
    let fundamentals: ProducerResult<FundamentalsPayload> =
        read_artifact(dir, &Category::Fundamentals.artifact_name()).await.unwrap();
    assert_eq!(fundamentals, results.fundamentals);
    let technical: ProducerResult<TechnicalPayload> =
        read_artifact(dir, &Category::Technical.artifact_name()).await.unwrap();
    assert_eq!(technical, results.technical);
    let news: ProducerResult<NewsPayload> = read_artifact(dir, &Category::News.artifact_name()).await.unwrap();
    assert_eq!(news, results.news);
    let sector: ProducerResult<SectorMacroPayload> =
        read_artifact(dir, &Category::SectorMacro.artifact_name()).await.unwrap();
    assert_eq!(sector, results.sector_macro);
    let alternatives: ProducerResult<AlternativesPayload> =
        read_artifact(dir, &Category::Alternatives.artifact_name()).await.unwrap();
    assert_eq!(alternatives, results.alternatives);
}

// =============================================================================
// Aggregator properties
// =============================================================================

#[test]
fn test_aggregation_is_deterministic() {
    let policy = AggregatorPolicy::default();
    let context = context_for(RiskLevel::Medium);
    let first = serde_json::to_vec(&aggregate(&bullish_results(), &context, &policy)).unwrap();
    let second = serde_json::to_vec(&aggregate(&bullish_results(), &context, &policy)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_five_successes_beat_two() {
    let policy = AggregatorPolicy::default();
    for risk in RiskLevel::ALL {
        for horizon in [0.5, 2.0, 10.0] {
            let mut context = context_for(risk);
            context.horizon_years = horizon;
            let full = aggregate(&bullish_results(), &context, &policy);

            let mut two = bullish_results();
            two.news = ProducerResult::failure(FailureKind::DataUnavailable, "none", metadata(Category::News));
            two.sector_macro =
                ProducerResult::failure(FailureKind::Timeout, "slow", metadata(Category::SectorMacro));
            two.alternatives =
                ProducerResult::failure(FailureKind::DataUnavailable, "none", metadata(Category::Alternatives));
            let partial = aggregate(&two, &context, &policy);

            assert!(
                full.confidence > partial.confidence,
                "risk {} horizon {}: {} <= {}",
                risk,
                horizon,
                full.confidence,
                partial.confidence
            );
        }
    }
}

#[test]
fn test_low_risk_never_sized_above_high_risk() {
    let policy = AggregatorPolicy::default();
    let mut mild = bullish_results();
    let mut weaker = fundamentals();
    weaker.score = 62.0;
    mild.fundamentals = ProducerResult::validated(weaker, metadata(Category::Fundamentals));

    for results in [bullish_results(), mild] {
        let low = aggregate(&results, &context_for(RiskLevel::Low), &policy);
        let medium = aggregate(&results, &context_for(RiskLevel::Medium), &policy);
        let high = aggregate(&results, &context_for(RiskLevel::High), &policy);
        assert!(low.position_size.fraction <= medium.position_size.fraction);
        assert!(medium.position_size.fraction <= high.position_size.fraction);
        assert!(low.position_size.fraction <= policy.risk.low.position_cap);
    }
}

/// Every category reporting the same signal score, so the composite equals `score`.
/// Valid for |score| < 0.3.
fn uniform_results(score: f64) -> ProducerResults {
    let mut f = fundamentals();
    f.score = 50.0 + 50.0 * score;

    // mixed trend contributes 0, momentum adds 0.3 * tanh(3m)
    let mut t = technical();
    t.trend = TrendDirection::Mixed;
    t.momentum_3m = Some((score / 0.3).atanh() / 3.0);

    let mut n = news();
    n.score = score;
    n.label = SentimentLabel::from_score(score);

    let mut sec = sector();
    let strength = score.atanh() / 5.0;
    sec.relative_strength_3m = strength;
    sec.relative_strength_12m = Some(strength);

    let mut a = alternatives();
    a.subject_percentile = 0.5 + score / 1.2;

    ProducerResults {
        fundamentals: ProducerResult::validated(f, metadata(Category::Fundamentals)),
        technical: ProducerResult::validated(t, metadata(Category::Technical)),
        news: ProducerResult::validated(n, metadata(Category::News)),
        sector_macro: ProducerResult::validated(sec, metadata(Category::SectorMacro)),
        alternatives: ProducerResult::validated(a, metadata(Category::Alternatives)),
    }
}

fn actions_by_risk(results: &ProducerResults) -> Vec<Action> {
    let policy = AggregatorPolicy::default();
    RiskLevel::ALL
        .iter()
        .map(|&risk| {
            let decision = aggregate(results, &context_for(risk), &policy);
            assert_eq!(decision.rationale.contributing_categories, 5);
            assert!(decision.confidence >= policy.min_confidence_to_act);
            decision.action
        })
        .collect()
}

#[test]
fn test_moderately_bullish_buys_only_above_low_risk() {
    let results = uniform_results(0.29);
    let decision = aggregate(&results, &context_for(RiskLevel::Medium), &AggregatorPolicy::default());
    assert!((decision.composite_score - 0.29).abs() < 1e-6, "{}", decision.composite_score);
    assert_eq!(actions_by_risk(&results), vec![Action::Hold, Action::Buy, Action::Buy]);
}

#[test]
fn test_mildly_bullish_buys_only_at_high_risk() {
    let results = uniform_results(0.2);
    assert_eq!(actions_by_risk(&results), vec![Action::Hold, Action::Hold, Action::Buy]);
}

#[test]
fn test_mildly_bearish_sells_only_at_low_risk() {
    let results = uniform_results(-0.2);
    let decision = aggregate(&results, &context_for(RiskLevel::Low), &AggregatorPolicy::default());
    assert!((decision.composite_score + 0.2).abs() < 1e-6, "{}", decision.composite_score);
    assert_eq!(actions_by_risk(&results), vec![Action::Sell, Action::Hold, Action::Hold]);
}

#[test]
fn test_moderately_bearish_holds_only_at_high_risk() {
    let results = uniform_results(-0.29);
    assert_eq!(actions_by_risk(&results), vec![Action::Sell, Action::Sell, Action::Hold]);
}

#[test]
fn test_huge_horizon_keeps_longest_dca_plan() {
    let mut context = context_for(RiskLevel::High);
    context.horizon_years = 1e10;
    let decision = aggregate(&bullish_results(), &context, &AggregatorPolicy::default());
    assert_eq!(decision.action, Action::Buy);
    assert_eq!(
        decision.entry_timing,
        EntryTiming::Staged { tranches: 6, over_weeks: 24 }
    );
}

#[test]
fn test_fundamentals_led_buy_is_staged() {
    let decision = aggregate(&bullish_results(), &context_for(RiskLevel::Medium), &AggregatorPolicy::default());
    assert_eq!(
        decision.entry_timing,
        EntryTiming::Staged { tranches: 3, over_weeks: 12 }
    );
    assert_eq!(decision.dca_plan.as_ref().map(|p| p.tranches), Some(3));
    assert!(decision.risk_controls.exit_below_200dma);
    assert_eq!(decision.risk_controls.stop_loss_pct, 0.15);
}

#[test]
fn test_rationale_enumerates_every_category() {
    let decision = aggregate(&bullish_results(), &context_for(RiskLevel::Medium), &AggregatorPolicy::default());
    let categories: Vec<Category> = decision.rationale.factors.iter().map(|f| f.category).collect();
    assert_eq!(categories, Category::ALL.to_vec());
    let total_weight: f64 = decision
        .rationale
        .factors
        .iter()
        .map(|f| match &f.outcome {
            FactorOutcome::Contributed { weight, .. } => *weight,
            FactorOutcome::Missing { .. } => 0.0,
        })
        .sum();
    assert!((total_weight - 1.0).abs() < 1e-9);
}

#[test]
fn test_bearish_inputs_sell() {
    let mut results = bullish_results();
    let mut f = fundamentals();
    f.score = 15.0;
    results.fundamentals = ProducerResult::validated(f, metadata(Category::Fundamentals));
    let mut t = technical();
    t.trend = TrendDirection::Downtrend;
    t.momentum_3m = Some(-0.2);
    results.technical = ProducerResult::validated(t, metadata(Category::Technical));
    let mut n = news();
    n.score = -0.6;
    n.label = SentimentLabel::Negative;
    results.news = ProducerResult::validated(n, metadata(Category::News));
    let mut s = sector();
    s.relative_strength_3m = -0.08;
    s.relative_strength_12m = Some(-0.1);
    s.trend = SectorTrend::Headwind;
    results.sector_macro = ProducerResult::validated(s, metadata(Category::SectorMacro));
    let mut a = alternatives();
    a.subject_percentile = 0.0;
    a.subject_rank = 6;
    results.alternatives = ProducerResult::validated(a, metadata(Category::Alternatives));

    let decision = aggregate(&results, &context_for(RiskLevel::Medium), &AggregatorPolicy::default());
    assert_eq!(decision.action, Action::Sell);
    assert_eq!(decision.position_size.fraction, 0.0);
    assert!(matches!(decision.entry_timing, EntryTiming::Exit { .. }));
}
