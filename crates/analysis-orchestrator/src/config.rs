use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use analysis_core::{Category, ConfigError, RetryPolicy, RiskLevel};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Base weight of each category before horizon tilt and renormalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub fundamentals: f64,
    pub technical: f64,
    pub news: f64,
    pub sector_macro: f64,
    pub alternatives: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            fundamentals: 0.30,
            technical: 0.25,
            news: 0.15,
            sector_macro: 0.20,
            alternatives: 0.10,
        }
    }
}

impl CategoryWeights {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Fundamentals => self.fundamentals,
            Category::Technical => self.technical,
            Category::News => self.news,
            Category::SectorMacro => self.sector_macro,
            Category::Alternatives => self.alternatives,
        }
    }
}

/// Thresholds and limits for one risk level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Composite score at or above which the action is Buy
    pub buy_threshold: f64,
    /// Composite score at or below which the action is Sell
    pub sell_threshold: f64,
    /// Largest single-name allocation
    pub position_cap: f64,
    pub stop_loss_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfiles {
    pub low: RiskProfile,
    pub medium: RiskProfile,
    pub high: RiskProfile,
}

impl Default for RiskProfiles {
    fn default() -> Self {
        Self {
            low: RiskProfile {
                buy_threshold: 0.35,
                sell_threshold: -0.15,
                position_cap: 0.05,
                stop_loss_pct: 0.10,
            },
            medium: RiskProfile {
                buy_threshold: 0.25,
                sell_threshold: -0.25,
                position_cap: 0.10,
                stop_loss_pct: 0.15,
            },
            high: RiskProfile {
                buy_threshold: 0.15,
                sell_threshold: -0.35,
                position_cap: 0.15,
                stop_loss_pct: 0.20,
            },
        }
    }
}

impl RiskProfiles {
    pub fn get(&self, risk: RiskLevel) -> &RiskProfile {
        match risk {
            RiskLevel::Low => &self.low,
            RiskLevel::Medium => &self.medium,
            RiskLevel::High => &self.high,
        }
    }
}

/// Every numeric constant the decision aggregator uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorPolicy {
    pub weights: CategoryWeights,
    /// Horizon (years) at which no tilt is applied
    pub horizon_pivot_years: f64,
    /// Years beyond the pivot at which the tilt saturates
    pub horizon_span_years: f64,
    /// Maximum relative shift between short- and long-horizon categories
    pub horizon_strength: f64,
    pub risk: RiskProfiles,
    pub confidence_floor: f64,
    /// Below this confidence a Buy or Sell is downgraded to Hold
    pub min_confidence_to_act: f64,
    /// Per-category scores within +/- this band read as neutral
    pub neutral_band: f64,
}

impl Default for AggregatorPolicy {
    fn default() -> Self {
        Self {
            weights: CategoryWeights::default(),
            horizon_pivot_years: 1.0,
            horizon_span_years: 4.0,
            horizon_strength: 0.5,
            risk: RiskProfiles::default(),
            confidence_floor: 0.05,
            min_confidence_to_act: 0.35,
            neutral_band: 0.15,
        }
    }
}

fn check(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::InvalidPolicy(message.to_string()))
    }
}

impl AggregatorPolicy {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading policy file {}", path.display()))?;
        let policy: AggregatorPolicy = serde_json::from_str(&raw)
            .with_context(|| format!("parsing policy file {}", path.display()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Rejects policies that break the ordering the aggregator relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in Category::ALL {
            let w = self.weights.get(category);
            check(w.is_finite() && w > 0.0, "category weights must be positive")?;
        }
        check(
            self.weights.fundamentals >= self.weights.alternatives
                && self.weights.technical >= self.weights.alternatives,
            "fundamentals and technical must weigh at least as much as alternatives",
        )?;

        check(
            self.horizon_pivot_years.is_finite() && self.horizon_pivot_years > 0.0,
            "horizon_pivot_years must be positive",
        )?;
        check(
            self.horizon_span_years.is_finite() && self.horizon_span_years > 0.0,
            "horizon_span_years must be positive",
        )?;
        check(
            (0.0..1.0).contains(&self.horizon_strength),
            "horizon_strength must be in [0, 1)",
        )?;

        for risk in RiskLevel::ALL {
            let p = self.risk.get(risk);
            check(
                p.buy_threshold.is_finite() && p.buy_threshold > 0.0 && p.buy_threshold <= 1.0,
                "buy thresholds must be in (0, 1]",
            )?;
            check(
                p.sell_threshold.is_finite() && p.sell_threshold < 0.0 && p.sell_threshold >= -1.0,
                "sell thresholds must be in [-1, 0)",
            )?;
            check(
                p.position_cap.is_finite() && p.position_cap > 0.0 && p.position_cap <= 1.0,
                "position caps must be in (0, 1]",
            )?;
            check(
                p.stop_loss_pct.is_finite() && p.stop_loss_pct > 0.0 && p.stop_loss_pct < 1.0,
                "stop losses must be in (0, 1)",
            )?;
        }
        let (low, medium, high) = (&self.risk.low, &self.risk.medium, &self.risk.high);
        check(
            low.buy_threshold >= medium.buy_threshold && medium.buy_threshold >= high.buy_threshold,
            "lower risk must demand a stronger bullish score to buy",
        )?;
        check(
            high.sell_threshold <= medium.sell_threshold && medium.sell_threshold <= low.sell_threshold,
            "higher risk must demand a stronger bearish score to sell",
        )?;
        check(
            low.position_cap <= medium.position_cap && medium.position_cap <= high.position_cap,
            "position caps must not shrink as risk rises",
        )?;

        check(
            (0.0..1.0).contains(&self.confidence_floor),
            "confidence_floor must be in [0, 1)",
        )?;
        check(
            self.min_confidence_to_act >= self.confidence_floor && self.min_confidence_to_act <= 1.0,
            "min_confidence_to_act must be between the floor and 1",
        )?;
        check(
            (0.0..1.0).contains(&self.neutral_band),
            "neutral_band must be in [0, 1)",
        )?;
        Ok(())
    }
}

/// Process-level settings, read from the environment.
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub polygon_api_key: Option<String>,
    pub polygon_rate_limit: usize,
    pub runs_dir: PathBuf,
    pub run_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub default_risk_level: String,
    pub default_horizon_years: f64,
    pub policy_file: Option<PathBuf>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            polygon_api_key: None,
            polygon_rate_limit: 500,
            runs_dir: PathBuf::from("runs"),
            run_timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            default_risk_level: "medium".to_string(),
            default_horizon_years: 2.0,
            policy_file: None,
        }
    }
}

impl AdvisorConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            polygon_api_key: env::var("POLYGON_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            polygon_rate_limit: env::var("POLYGON_RATE_LIMIT")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .context("POLYGON_RATE_LIMIT must be a whole number")?,
            runs_dir: env::var("ADVISOR_RUNS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("runs")),
            run_timeout: Duration::from_secs(
                env::var("ADVISOR_RUN_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .context("ADVISOR_RUN_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            max_retries: env::var("ADVISOR_MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("ADVISOR_MAX_RETRIES must be a whole number")?,
            retry_backoff: Duration::from_millis(
                env::var("ADVISOR_RETRY_BACKOFF_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .context("ADVISOR_RETRY_BACKOFF_MS must be a whole number of milliseconds")?,
            ),
            default_risk_level: env::var("DEFAULT_RISK_LEVEL").unwrap_or_else(|_| "medium".to_string()),
            default_horizon_years: env::var("DEFAULT_HORIZON_YEARS")
                .unwrap_or_else(|_| "2.0".to_string())
                .parse()
                .context("DEFAULT_HORIZON_YEARS must be a number")?,
            policy_file: env::var("ADVISOR_POLICY_FILE").ok().map(PathBuf::from),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_backoff)
    }

    /// The policy file if one is configured, defaults otherwise.
    pub fn load_policy(&self) -> Result<AggregatorPolicy> {
        match &self.policy_file {
            Some(path) => AggregatorPolicy::from_json_file(path),
            None => Ok(AggregatorPolicy::default()),
        }
    }
}
