use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::Category;

/// Contract shared by the five producer payloads.
pub trait Payload:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    const CATEGORY: Category;

    /// Required fields present and every numeric field finite and in range.
    fn validate(&self) -> Result<(), String>;

    /// Directional reading of this payload for the aggregator.
    fn signal(&self) -> CategorySignal;
}

/// Directional contribution of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySignal {
    /// -1.0 (bearish) to 1.0 (bullish)
    pub score: f64,
    /// 0.0 to 1.0, how much of the expected evidence was present
    pub quality: f64,
    pub highlight: String,
}

impl CategorySignal {
    pub fn new(score: f64, quality: f64, highlight: impl Into<String>) -> Self {
        Self {
            score: score.clamp(-1.0, 1.0),
            quality: quality.clamp(0.0, 1.0),
            highlight: highlight.into(),
        }
    }
}

fn finite(name: &str, value: f64) -> Result<(), String> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(format!("{} is not finite", name))
    }
}

fn in_range(name: &str, value: f64, lo: f64, hi: f64) -> Result<(), String> {
    finite(name, value)?;
    if value < lo || value > hi {
        return Err(format!("{} = {} outside [{}, {}]", name, value, lo, hi));
    }
    Ok(())
}

fn optional_finite(name: &str, value: Option<f64>) -> Result<(), String> {
    value.map_or(Ok(()), |v| finite(name, v))
}

fn non_empty(name: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is empty", name))
    } else {
        Ok(())
    }
}

// =============================================================================
// Fundamentals
// =============================================================================

/// Number of ratios a complete fundamentals run reports.
pub const FUNDAMENTAL_METRIC_COUNT: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsPayload {
    /// Ratio name to value, e.g. `pe_ratio`, `roe`, `revenue_growth_yoy`
    pub metrics: BTreeMap<String, f64>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    /// 0 to 100
    pub score: f64,
    pub periods_analyzed: u32,
}

impl Payload for FundamentalsPayload {
    const CATEGORY: Category = Category::Fundamentals;

    fn validate(&self) -> Result<(), String> {
        if self.metrics.is_empty() {
            return Err("no fundamental metrics computed".to_string());
        }
        for (name, value) in &self.metrics {
            finite(name, *value)?;
        }
        in_range("score", self.score, 0.0, 100.0)?;
        if self.periods_analyzed == 0 {
            return Err("periods_analyzed is zero".to_string());
        }
        Ok(())
    }

    fn signal(&self) -> CategorySignal {
        let quality = self.metrics.len() as f64 / FUNDAMENTAL_METRIC_COUNT as f64;
        let mut highlight = format!("fundamental score {:.0}/100", self.score);
        if let Some(pro) = self.pros.first() {
            highlight.push_str(&format!(", {}", pro));
        } else if let Some(con) = self.cons.first() {
            highlight.push_str(&format!(", {}", con));
        }
        CategorySignal::new((self.score - 50.0) / 50.0, quality, highlight)
    }
}

// =============================================================================
// Technical
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Uptrend,
    Downtrend,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalPayload {
    pub last_close: f64,
    pub sma_50: f64,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
    /// Return over the last 63 sessions
    pub momentum_3m: Option<f64>,
    /// Fraction below the 52-week high, in [-1, 0]
    pub drawdown_52w: f64,
    pub trend: TrendDirection,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub bars_analyzed: u32,
}

impl Payload for TechnicalPayload {
    const CATEGORY: Category = Category::Technical;

    fn validate(&self) -> Result<(), String> {
        finite("last_close", self.last_close)?;
        if self.last_close <= 0.0 {
            return Err("last_close must be positive".to_string());
        }
        finite("sma_50", self.sma_50)?;
        optional_finite("sma_200", self.sma_200)?;
        optional_finite("momentum_3m", self.momentum_3m)?;
        if let Some(rsi) = self.rsi_14 {
            in_range("rsi_14", rsi, 0.0, 100.0)?;
        }
        in_range("drawdown_52w", self.drawdown_52w, -1.0, 0.0)?;
        if self.bars_analyzed == 0 {
            return Err("bars_analyzed is zero".to_string());
        }
        Ok(())
    }

    fn signal(&self) -> CategorySignal {
        let mut score = match self.trend {
            TrendDirection::Uptrend => 0.5,
            TrendDirection::Downtrend => -0.5,
            TrendDirection::Mixed => 0.0,
        };
        if let Some(momentum) = self.momentum_3m {
            score += (momentum * 3.0).tanh() * 0.3;
        }
        match self.rsi_14 {
            Some(rsi) if rsi > 70.0 => score -= 0.15,
            Some(rsi) if rsi < 30.0 => score += 0.15,
            _ => {}
        }
        if self.drawdown_52w <= -0.15 && self.trend != TrendDirection::Downtrend {
            score += 0.1;
        }

        let quality = if self.sma_200.is_some() { 1.0 } else { 0.75 };
        let trend = match self.trend {
            TrendDirection::Uptrend => "uptrend",
            TrendDirection::Downtrend => "downtrend",
            TrendDirection::Mixed => "mixed trend",
        };
        let highlight = match self.rsi_14 {
            Some(rsi) => format!("{}, RSI {:.0}", trend, rsi),
            None => trend.to_string(),
        };
        CategorySignal::new(score, quality, highlight)
    }
}

// =============================================================================
// News sentiment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > 0.15 {
            SentimentLabel::Positive
        } else if score < -0.15 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub sentiment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsPayload {
    /// -1.0 to 1.0
    pub score: f64,
    pub label: SentimentLabel,
    pub article_count: u32,
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
    pub headlines: Vec<Headline>,
    pub summary: String,
}

impl Payload for NewsPayload {
    const CATEGORY: Category = Category::News;

    fn validate(&self) -> Result<(), String> {
        in_range("score", self.score, -1.0, 1.0)?;
        if self.article_count == 0 {
            return Err("no articles analyzed".to_string());
        }
        if self.positive + self.negative + self.neutral != self.article_count {
            return Err("sentiment counts do not add up to article_count".to_string());
        }
        if self.headlines.len() > self.article_count as usize {
            return Err("more headlines than articles".to_string());
        }
        for headline in &self.headlines {
            in_range("headline sentiment", headline.sentiment, -1.0, 1.0)?;
        }
        non_empty("summary", &self.summary)
    }

    fn signal(&self) -> CategorySignal {
        let coverage = (self.article_count as f64 / 10.0).min(1.0);
        CategorySignal::new(
            self.score,
            0.2 + 0.8 * coverage,
            format!(
                "{} news tone over {} articles",
                self.label.as_str(),
                self.article_count
            ),
        )
    }
}

// =============================================================================
// Sector / macro
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Calm,
    Normal,
    Volatile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorTrend {
    Tailwind,
    Neutral,
    Headwind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorMacroPayload {
    pub sector: String,
    pub sector_etf: String,
    pub benchmark: String,
    pub sector_return_3m: f64,
    pub sector_return_12m: Option<f64>,
    pub benchmark_return_3m: f64,
    pub benchmark_return_12m: Option<f64>,
    pub relative_strength_3m: f64,
    pub relative_strength_12m: Option<f64>,
    pub regime: MarketRegime,
    pub trend: SectorTrend,
    pub summary: String,
}

impl SectorMacroPayload {
    /// Blend of 3- and 12-month relative strength, 3-month only when the year is missing.
    pub fn blended_relative_strength(&self) -> f64 {
        match self.relative_strength_12m {
            Some(rs_12m) => 0.4 * self.relative_strength_3m + 0.6 * rs_12m,
            None => self.relative_strength_3m,
        }
    }
}

impl Payload for SectorMacroPayload {
    const CATEGORY: Category = Category::SectorMacro;

    fn validate(&self) -> Result<(), String> {
        non_empty("sector", &self.sector)?;
        non_empty("sector_etf", &self.sector_etf)?;
        non_empty("benchmark", &self.benchmark)?;
        finite("sector_return_3m", self.sector_return_3m)?;
        finite("benchmark_return_3m", self.benchmark_return_3m)?;
        finite("relative_strength_3m", self.relative_strength_3m)?;
        optional_finite("sector_return_12m", self.sector_return_12m)?;
        optional_finite("benchmark_return_12m", self.benchmark_return_12m)?;
        optional_finite("relative_strength_12m", self.relative_strength_12m)?;
        non_empty("summary", &self.summary)
    }

    fn signal(&self) -> CategorySignal {
        let mut score = (self.blended_relative_strength() * 5.0).tanh();
        if self.regime == MarketRegime::Volatile {
            score *= 0.8;
        }
        let quality = if self.relative_strength_12m.is_some() { 1.0 } else { 0.7 };
        let trend = match self.trend {
            SectorTrend::Tailwind => "tailwind",
            SectorTrend::Neutral => "neutral",
            SectorTrend::Headwind => "headwind",
        };
        CategorySignal::new(
            score,
            quality,
            format!("{} sector {} vs {}", self.sector, trend, self.benchmark),
        )
    }
}

// =============================================================================
// Alternatives
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredListing {
    pub ticker: String,
    pub name: String,
    /// 0 to 100
    pub score: f64,
    pub return_12m: Option<f64>,
    pub volatility: Option<f64>,
    pub market_cap: Option<f64>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativesPayload {
    pub subject: ScoredListing,
    /// Comparable listings, best first
    pub candidates: Vec<ScoredListing>,
    /// 1-based rank of the subject among subject and candidates
    pub subject_rank: u32,
    /// Share of peers the subject outscores, 0.0 to 1.0
    pub subject_percentile: f64,
}

impl Payload for AlternativesPayload {
    const CATEGORY: Category = Category::Alternatives;

    fn validate(&self) -> Result<(), String> {
        if self.candidates.is_empty() {
            return Err("no comparable listings".to_string());
        }
        for listing in std::iter::once(&self.subject).chain(self.candidates.iter()) {
            non_empty("ticker", &listing.ticker)?;
            in_range("score", listing.score, 0.0, 100.0)?;
            optional_finite("return_12m", listing.return_12m)?;
            optional_finite("volatility", listing.volatility)?;
            optional_finite("market_cap", listing.market_cap)?;
        }
        in_range("subject_percentile", self.subject_percentile, 0.0, 1.0)?;
        if self.subject_rank == 0 || self.subject_rank as usize > self.candidates.len() + 1 {
            return Err(format!("subject_rank {} out of range", self.subject_rank));
        }
        Ok(())
    }

    fn signal(&self) -> CategorySignal {
        let quality = (self.candidates.len() as f64 / 5.0).min(1.0);
        CategorySignal::new(
            (self.subject_percentile - 0.5) * 2.0 * 0.6,
            quality,
            format!(
                "ranks {} of {} against comparables",
                self.subject_rank,
                self.candidates.len() + 1
            ),
        )
    }
}
