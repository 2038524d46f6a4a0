use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ResolutionError};

/// OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Company financials for one fiscal period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Financials {
    pub symbol: String,
    pub fiscal_period: String,
    pub fiscal_year: i32,
    pub revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_income: Option<f64>,
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub shareholders_equity: Option<f64>,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub cash_flow_operating: Option<f64>,
}

/// News article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub published_utc: DateTime<Utc>,
    pub article_url: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub tickers: Vec<String>,
}

/// Raw input of the fundamentals producer: quarterly periods (newest first) and the last price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsRaw {
    pub financials: Vec<Financials>,
    pub last_price: Option<f64>,
}

/// Raw input of the sector-macro producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorSnapshot {
    pub sector: String,
    pub etf: String,
    pub benchmark: String,
    pub sector_bars: Vec<Bar>,
    pub benchmark_bars: Vec<Bar>,
}

/// One listing in a peer universe, with daily closes oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerListing {
    pub ticker: String,
    pub name: String,
    pub market_cap: Option<f64>,
    pub closes: Vec<f64>,
}

/// Raw input of the alternatives producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerUniverse {
    pub subject: PeerListing,
    pub peers: Vec<PeerListing>,
}

/// Candidate listing returned by an external ticker search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingCandidate {
    pub ticker: String,
    pub name: String,
    pub exchange: Option<String>,
}

/// Canonical trading identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub ticker: String,
    pub name: String,
    pub exchange: Option<String>,
}

impl Symbol {
    pub fn new(ticker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            exchange: None,
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ticker, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ConfigError;

    /// Case-insensitive; anything other than the three levels is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            _ => Err(ConfigError::InvalidRiskLevel(s.to_string())),
        }
    }
}

/// The five analysis categories, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Fundamentals,
    Technical,
    News,
    SectorMacro,
    Alternatives,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Fundamentals,
        Category::Technical,
        Category::News,
        Category::SectorMacro,
        Category::Alternatives,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fundamentals => "fundamentals",
            Category::Technical => "technical",
            Category::News => "news",
            Category::SectorMacro => "sector_macro",
            Category::Alternatives => "alternatives",
        }
    }

    /// Ledger file name of this category's producer result.
    pub fn artifact_name(&self) -> String {
        format!("{}.json", self.as_str())
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Fundamentals => "Fundamentals",
            Category::Technical => "Technical",
            Category::News => "News",
            Category::SectorMacro => "Sector/Macro",
            Category::Alternatives => "Alternatives",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Longest overall deadline a run may ask for.
pub const MAX_RUN_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-run context. Built once before any I/O and never mutated afterwards;
/// resolution produces a new value via [`RunContext::with_symbol`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub query: String,
    pub symbol: Option<Symbol>,
    pub risk_level: RiskLevel,
    pub horizon_years: f64,
    pub started_at: DateTime<Utc>,
    pub run_key: String,
    pub run_timeout_secs: u64,
}

impl RunContext {
    pub fn new(
        query: &str,
        risk_level: RiskLevel,
        horizon_years: f64,
        run_timeout: Duration,
        started_at: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ConfigError::EmptyQuery);
        }
        if !horizon_years.is_finite() || horizon_years <= 0.0 {
            return Err(ConfigError::InvalidHorizon(horizon_years));
        }
        if run_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "run timeout must be greater than zero".to_string(),
            ));
        }
        if run_timeout > MAX_RUN_TIMEOUT {
            return Err(ConfigError::InvalidTimeout(format!(
                "run timeout of {}s exceeds the {}s maximum",
                run_timeout.as_secs(),
                MAX_RUN_TIMEOUT.as_secs()
            )));
        }

        Ok(Self {
            query: query.to_string(),
            symbol: None,
            risk_level,
            horizon_years,
            started_at,
            run_key: run_key(started_at, query),
            run_timeout_secs: run_timeout.as_secs().max(1),
        })
    }

    /// Pin the resolved symbol. The run key switches to the ticker.
    pub fn with_symbol(self, symbol: Symbol) -> Self {
        Self {
            run_key: run_key(self.started_at, &symbol.ticker),
            symbol: Some(symbol),
            ..self
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

/// `%Y%m%d_%H%M%S_<identifier>` with the identifier reduced to `[A-Za-z0-9_-]`.
pub fn run_key(started_at: DateTime<Utc>, identifier: &str) -> String {
    let mut slug = String::with_capacity(identifier.len());
    for c in identifier.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    let slug = if slug.is_empty() { "run" } else { slug };
    format!("{}_{}", started_at.format("%Y%m%d_%H%M%S"), slug)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    Fuzzy,
    External,
}

/// Resolved identifier together with how it was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub symbol: Symbol,
    pub strategy: MatchStrategy,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Resolved(Resolution),
    Failed { error: ResolutionError },
}

/// Ledger record of the resolution stage (`resolution.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub query: String,
    pub outcome: ResolutionOutcome,
}

impl ResolutionRecord {
    pub fn from_result(query: &str, result: &Result<Resolution, ResolutionError>) -> Self {
        let outcome = match result {
            Ok(resolution) => ResolutionOutcome::Resolved(resolution.clone()),
            Err(error) => ResolutionOutcome::Failed {
                error: error.clone(),
            },
        };
        Self {
            query: query.to_string(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_risk_level_parsing() {
        assert_eq!("low".parse::<RiskLevel>().unwrap(), RiskLevel::Low);
        assert_eq!(" Medium ".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert_eq!(
            "aggressive".parse::<RiskLevel>(),
            Err(ConfigError::InvalidRiskLevel("aggressive".to_string()))
        );
    }

    #[test]
    fn test_context_rejects_bad_horizon() {
        let timeout = Duration::from_secs(60);
        for horizon in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = RunContext::new("Reliance", RiskLevel::Medium, horizon, timeout, started());
            assert!(matches!(result, Err(ConfigError::InvalidHorizon(_))));
        }
    }

    #[test]
    fn test_context_rejects_out_of_range_timeout() {
        for timeout in [Duration::ZERO, MAX_RUN_TIMEOUT + Duration::from_secs(1), Duration::from_secs(u64::MAX)] {
            let result = RunContext::new("Reliance", RiskLevel::Medium, 2.0, timeout, started());
            assert!(matches!(result, Err(ConfigError::InvalidTimeout(_))));
        }
        let ctx = RunContext::new("Reliance", RiskLevel::Medium, 2.0, MAX_RUN_TIMEOUT, started()).unwrap();
        assert_eq!(ctx.run_timeout(), MAX_RUN_TIMEOUT);
    }

    #[test]
    fn test_context_rejects_empty_query() {
        let result = RunContext::new("   ", RiskLevel::Low, 2.0, Duration::from_secs(60), started());
        assert_eq!(result, Err(ConfigError::EmptyQuery));
    }

    #[test]
    fn test_run_key_uses_ticker_after_resolution() {
        let ctx = RunContext::new(
            "Reliance Industries",
            RiskLevel::Medium,
            2.0,
            Duration::from_secs(60),
            started(),
        )
        .unwrap();
        assert_eq!(ctx.run_key, "20240305_140709_Reliance_Industries");

        let ctx = ctx.with_symbol(Symbol::new("RELIANCE.NS", "Reliance Industries Limited"));
        assert_eq!(ctx.run_key, "20240305_140709_RELIANCE_NS");
        assert_eq!(ctx.symbol.as_ref().unwrap().ticker, "RELIANCE.NS");
    }

    #[test]
    fn test_run_key_never_empty() {
        assert_eq!(run_key(started(), "///"), "20240305_140709_run");
    }

    #[test]
    fn test_category_artifacts() {
        let names: Vec<String> = Category::ALL.iter().map(|c| c.artifact_name()).collect();
        assert_eq!(
            names,
            vec![
                "fundamentals.json",
                "technical.json",
                "news.json",
                "sector_macro.json",
                "alternatives.json"
            ]
        );
    }

    #[test]
    fn test_resolution_record_roundtrip() {
        let failed = ResolutionRecord::from_result(
            "HDFC",
            &Err(ResolutionError::Ambiguous {
                query: "HDFC".into(),
                candidates: vec!["HDB".into(), "HDFCBANK".into()],
            }),
        );
        let json = serde_json::to_string(&failed).unwrap();
        assert_eq!(serde_json::from_str::<ResolutionRecord>(&json).unwrap(), failed);
    }
}
