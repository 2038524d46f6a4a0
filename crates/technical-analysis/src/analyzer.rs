use std::sync::Arc;
use std::time::Instant;

use analysis_core::{
    fetch_with_retry, AnalysisError, Bar, Category, DataCollaborator, Producer, ProducerResult,
    ResultMetadata, RetryPolicy, RunContext, Symbol, TechnicalPayload, TrendDirection,
};
use async_trait::async_trait;

use crate::indicators::*;

/// Fewest daily bars the producer accepts
pub const MIN_BARS: usize = 50;
const MOMENTUM_WINDOW: usize = 63;
const DISCOUNT_THRESHOLD: f64 = -0.15;

pub struct TechnicalProducer {
    prices: Arc<dyn DataCollaborator<Raw = Vec<Bar>>>,
    retry: RetryPolicy,
}

impl TechnicalProducer {
    pub fn new(prices: Arc<dyn DataCollaborator<Raw = Vec<Bar>>>, retry: RetryPolicy) -> Self {
        Self { prices, retry }
    }
}

#[async_trait]
impl Producer for TechnicalProducer {
    type Payload = TechnicalPayload;

    async fn analyze(&self, symbol: &Symbol, _context: &RunContext) -> ProducerResult<TechnicalPayload> {
        let started = Instant::now();
        let (fetched, attempts) =
            fetch_with_retry(&self.retry, "technical", || self.prices.fetch(symbol)).await;
        let metadata = ResultMetadata::new(Category::Technical, &symbol.ticker, self.prices.source())
            .with_attempts(attempts);

        let result = match fetched {
            Ok(bars) => match analyze_bars(&bars) {
                Ok(payload) => ProducerResult::validated(payload, metadata),
                Err(e) => ProducerResult::from_analysis_error(&e, metadata),
            },
            Err(e) => {
                tracing::warn!("Price fetch for {} failed: {}", symbol.ticker, e);
                ProducerResult::from_collaborator_error(&e, metadata)
            }
        };
        result.with_elapsed_ms(started.elapsed().as_millis() as u64)
    }

    fn source(&self) -> &str {
        self.prices.source()
    }
}

/// Long-term indicators from daily bars, oldest first.
pub fn analyze_bars(bars: &[Bar]) -> Result<TechnicalPayload, AnalysisError> {
    if bars.len() < MIN_BARS {
        return Err(AnalysisError::InsufficientData(format!(
            "Need at least {} bars for technical analysis, got {}",
            MIN_BARS,
            bars.len()
        )));
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    if let Some(bad) = closes.iter().find(|c| !c.is_finite() || **c <= 0.0) {
        return Err(AnalysisError::InvalidData(format!("non-positive close {}", bad)));
    }

    let last = closes[closes.len() - 1];
    let sma_50 = last_sma(&closes, 50)
        .ok_or_else(|| AnalysisError::CalculationError("SMA50 unavailable".to_string()))?;
    let sma_200 = last_sma(&closes, 200);
    let rsi_14 = rsi(&closes, 14).last().copied();
    let momentum_3m = trailing_return(&closes, MOMENTUM_WINDOW);
    let drawdown_52w = drawdown_from_high(&closes, SESSIONS_PER_YEAR)
        .ok_or_else(|| AnalysisError::CalculationError("52-week high unavailable".to_string()))?;

    let mut pros = Vec::new();
    let mut cons = Vec::new();

    let trend = classify_trend(last, sma_50, sma_200);
    let averages = if sma_200.is_some() { "50/200-day averages" } else { "50-day average" };
    match trend {
        TrendDirection::Uptrend => pros.push(format!("Price above {}", averages)),
        TrendDirection::Downtrend => cons.push(format!("Price below {}", averages)),
        TrendDirection::Mixed => {}
    }

    if drawdown_52w <= DISCOUNT_THRESHOLD {
        pros.push(format!(
            "Attractive discount vs 52-week high ({:.0}% below)",
            -drawdown_52w * 100.0
        ));
    }

    match rsi_14 {
        Some(r) if r > 70.0 => cons.push(format!("RSI overbought ({:.0})", r)),
        Some(r) if r < 30.0 => pros.push(format!("RSI oversold ({:.0})", r)),
        _ => {}
    }

    match momentum_3m {
        Some(m) if m > 0.10 => pros.push(format!("Strong 3-month momentum (+{:.1}%)", m * 100.0)),
        Some(m) if m < -0.10 => cons.push(format!("Weak 3-month momentum ({:.1}%)", m * 100.0)),
        _ => {}
    }

    Ok(TechnicalPayload {
        last_close: last,
        sma_50,
        sma_200,
        rsi_14,
        momentum_3m,
        drawdown_52w,
        trend,
        pros,
        cons,
        bars_analyzed: bars.len() as u32,
    })
}

/// Above every available average is an uptrend, below every one a downtrend.
pub fn classify_trend(last: f64, sma_50: f64, sma_200: Option<f64>) -> TrendDirection {
    let above_200 = sma_200.map_or(true, |s| last > s);
    let below_200 = sma_200.map_or(true, |s| last < s);
    if last > sma_50 && above_200 {
        TrendDirection::Uptrend
    } else if last < sma_50 && below_200 {
        TrendDirection::Downtrend
    } else {
        TrendDirection::Mixed
    }
}
