//! Sector and macro backdrop: how the company's sector ETF has done against
//! the broad-market benchmark, and how turbulent the benchmark is right now.

use std::sync::Arc;
use std::time::Instant;

use analysis_core::{
    fetch_with_retry, AnalysisError, Category, DataCollaborator, MarketRegime, Producer,
    ProducerResult, ResultMetadata, RetryPolicy, RunContext, SectorMacroPayload, SectorSnapshot,
    SectorTrend, Symbol,
};
use async_trait::async_trait;
use technical_analysis::{daily_returns, std_dev, trailing_return, SESSIONS_PER_YEAR};

const QUARTER_SESSIONS: usize = 63;
const RECENT_SESSIONS: usize = 10;
const VOLATILE_RATIO: f64 = 1.5;
const CALM_RATIO: f64 = 0.6;
/// Blended relative strength beyond which the sector counts as a tailwind or headwind
const TREND_BAND: f64 = 0.02;

pub struct SectorMacroProducer {
    sectors: Arc<dyn DataCollaborator<Raw = SectorSnapshot>>,
    retry: RetryPolicy,
}

impl SectorMacroProducer {
    pub fn new(sectors: Arc<dyn DataCollaborator<Raw = SectorSnapshot>>, retry: RetryPolicy) -> Self {
        Self { sectors, retry }
    }
}

#[async_trait]
impl Producer for SectorMacroProducer {
    type Payload = SectorMacroPayload;

    async fn analyze(&self, symbol: &Symbol, _context: &RunContext) -> ProducerResult<SectorMacroPayload> {
        let started = Instant::now();
        let (fetched, attempts) =
            fetch_with_retry(&self.retry, "sector", || self.sectors.fetch(symbol)).await;
        let metadata = ResultMetadata::new(Category::SectorMacro, &symbol.ticker, self.sectors.source())
            .with_attempts(attempts);

        let result = match fetched {
            Ok(snapshot) => match analyze_sector(&snapshot) {
                Ok(payload) => ProducerResult::validated(payload, metadata),
                Err(e) => ProducerResult::from_analysis_error(&e, metadata),
            },
            Err(e) => {
                tracing::warn!("Sector data for {} unavailable: {}", symbol.ticker, e);
                ProducerResult::from_collaborator_error(&e, metadata)
            }
        };
        result.with_elapsed_ms(started.elapsed().as_millis() as u64)
    }

    fn source(&self) -> &str {
        self.sectors.source()
    }
}

/// Relative strength of the sector ETF against the benchmark over 3 and 12 months.
pub fn analyze_sector(snapshot: &SectorSnapshot) -> Result<SectorMacroPayload, AnalysisError> {
    let sector_closes: Vec<f64> = snapshot.sector_bars.iter().map(|b| b.close).collect();
    let benchmark_closes: Vec<f64> = snapshot.benchmark_bars.iter().map(|b| b.close).collect();

    for (label, closes) in [(&snapshot.etf, &sector_closes), (&snapshot.benchmark, &benchmark_closes)] {
        if closes.len() <= QUARTER_SESSIONS {
            return Err(AnalysisError::InsufficientData(format!(
                "Need more than {} bars of {}, got {}",
                QUARTER_SESSIONS,
                label,
                closes.len()
            )));
        }
        if closes.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(AnalysisError::InvalidData(format!("non-positive close in {}", label)));
        }
    }

    let sector_return_3m = trailing_return(&sector_closes, QUARTER_SESSIONS)
        .ok_or_else(|| AnalysisError::CalculationError("sector 3m return".to_string()))?;
    let benchmark_return_3m = trailing_return(&benchmark_closes, QUARTER_SESSIONS)
        .ok_or_else(|| AnalysisError::CalculationError("benchmark 3m return".to_string()))?;
    let sector_return_12m = trailing_return(&sector_closes, SESSIONS_PER_YEAR);
    let benchmark_return_12m = trailing_return(&benchmark_closes, SESSIONS_PER_YEAR);

    let relative_strength_3m = sector_return_3m - benchmark_return_3m;
    let relative_strength_12m = match (sector_return_12m, benchmark_return_12m) {
        (Some(s), Some(b)) => Some(s - b),
        _ => None,
    };

    let regime = detect_regime(&benchmark_closes);
    let blended = match relative_strength_12m {
        Some(rs_12m) => 0.4 * relative_strength_3m + 0.6 * rs_12m,
        None => relative_strength_3m,
    };
    let trend = if blended > TREND_BAND {
        SectorTrend::Tailwind
    } else if blended < -TREND_BAND {
        SectorTrend::Headwind
    } else {
        SectorTrend::Neutral
    };

    let summary = format!(
        "{} ({}) {:+.1}% over 3m vs {} {:+.1}%; {} regime",
        snapshot.sector,
        snapshot.etf,
        sector_return_3m * 100.0,
        snapshot.benchmark,
        benchmark_return_3m * 100.0,
        match regime {
            MarketRegime::Calm => "calm",
            MarketRegime::Normal => "normal",
            MarketRegime::Volatile => "volatile",
        }
    );

    Ok(SectorMacroPayload {
        sector: snapshot.sector.clone(),
        sector_etf: snapshot.etf.clone(),
        benchmark: snapshot.benchmark.clone(),
        sector_return_3m,
        sector_return_12m,
        benchmark_return_3m,
        benchmark_return_12m,
        relative_strength_3m,
        relative_strength_12m,
        regime,
        trend,
        summary,
    })
}

/// Ratio of the last ten sessions' volatility to the whole window's.
pub fn detect_regime(benchmark_closes: &[f64]) -> MarketRegime {
    let returns = daily_returns(benchmark_closes);
    if returns.len() < 2 * RECENT_SESSIONS {
        return MarketRegime::Normal;
    }

    let full_vol = std_dev(&returns).unwrap_or(0.0);
    let recent_vol = std_dev(&returns[returns.len() - RECENT_SESSIONS..]).unwrap_or(0.0);
    if full_vol == 0.0 {
        return MarketRegime::Normal;
    }

    let ratio = recent_vol / full_vol;
    if ratio > VOLATILE_RATIO {
        MarketRegime::Volatile
    } else if ratio < CALM_RATIO {
        MarketRegime::Calm
    } else {
        MarketRegime::Normal
    }
}
