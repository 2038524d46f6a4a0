use std::fmt;

use serde::{Deserialize, Serialize};

use crate::payloads::{
    AlternativesPayload, FundamentalsPayload, NewsPayload, SectorMacroPayload, TechnicalPayload,
};
use crate::result::{FailureKind, ProducerFailure, ProducerResult};
use crate::types::{Category, ResolutionRecord, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::Buy => "Buy",
            Action::Hold => "Hold",
            Action::Sell => "Sell",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryTiming {
    /// Momentum-led: enter now
    Immediate,
    /// Fundamentals-led: accumulate gradually
    Staged { tranches: u32, over_weeks: u32 },
    /// Wait for price to confirm before entering
    OnTechnicalConfirmation,
    /// No position; revisit later
    Wait { review_in_weeks: u32 },
    /// Reduce an existing position
    Exit { over_weeks: u32 },
}

impl fmt::Display for EntryTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryTiming::Immediate => write!(f, "enter now"),
            EntryTiming::Staged {
                tranches,
                over_weeks,
            } => write!(f, "staged: {} tranches over {} weeks", tranches, over_weeks),
            EntryTiming::OnTechnicalConfirmation => {
                write!(f, "wait for a close back above the 50-day average")
            }
            EntryTiming::Wait { review_in_weeks } => {
                write!(f, "no entry, review in {} weeks", review_in_weeks)
            }
            EntryTiming::Exit { over_weeks } => write!(f, "exit over {} weeks", over_weeks),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionBucket {
    None,
    Starter,
    Standard,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    /// Fraction of the portfolio, 0.0 to `cap`
    pub fraction: f64,
    /// Risk-level ceiling for a single name
    pub cap: f64,
    pub bucket: PositionBucket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaPlan {
    pub tranches: u32,
    pub span_weeks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskControls {
    pub stop_loss_pct: f64,
    /// Exit on a close below the 200-day average; only set when one was computed
    pub exit_below_200dma: bool,
    pub review_every_months: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FactorOutcome {
    Contributed {
        direction: Direction,
        score: f64,
        /// Renormalized weight actually applied
        weight: f64,
        highlight: String,
    },
    Missing {
        kind: FailureKind,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RationaleEntry {
    pub category: Category,
    pub outcome: FactorOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub contributing_categories: u32,
    pub statement: String,
    /// One entry per category, in canonical order
    pub factors: Vec<RationaleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingCategory {
    pub category: Category,
    pub kind: FailureKind,
    pub reason: String,
}

/// Marker on a decision built from fewer than five successful categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationDegraded {
    pub successful: u32,
    pub missing: Vec<MissingCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// 0.0 to 1.0
    pub confidence: f64,
    /// Weighted directional score, -1.0 to 1.0
    pub composite_score: f64,
    pub entry_timing: EntryTiming,
    pub position_size: PositionSize,
    pub dca_plan: Option<DcaPlan>,
    pub risk_controls: RiskControls,
    pub rationale: Rationale,
    pub news_summary: String,
    pub degraded: Option<AggregationDegraded>,
}

/// The five producer outcomes of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerResults {
    pub fundamentals: ProducerResult<FundamentalsPayload>,
    pub technical: ProducerResult<TechnicalPayload>,
    pub news: ProducerResult<NewsPayload>,
    pub sector_macro: ProducerResult<SectorMacroPayload>,
    pub alternatives: ProducerResult<AlternativesPayload>,
}

impl ProducerResults {
    /// `(category, failure)` for each category, in canonical order.
    pub fn outcomes(&self) -> [(Category, Option<&ProducerFailure>); 5] {
        [
            (Category::Fundamentals, self.fundamentals.failure_info()),
            (Category::Technical, self.technical.failure_info()),
            (Category::News, self.news.failure_info()),
            (Category::SectorMacro, self.sector_macro.failure_info()),
            (Category::Alternatives, self.alternatives.failure_info()),
        ]
    }

    pub fn successes(&self) -> u32 {
        self.outcomes()
            .iter()
            .filter(|(_, failure)| failure.is_none())
            .count() as u32
    }

    pub fn missing(&self) -> Vec<MissingCategory> {
        self.outcomes()
            .into_iter()
            .filter_map(|(category, failure)| {
                failure.map(|f| MissingCategory {
                    category,
                    kind: f.kind,
                    reason: f.reason.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BundleStatus {
    Complete,
    Degraded { missing: Vec<Category> },
    Aborted { reason: String },
}

/// Final artifact of a run (`bundle.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub context: RunContext,
    pub resolution: ResolutionRecord,
    pub status: BundleStatus,
    pub producers: Option<ProducerResults>,
    pub decision: Option<Decision>,
}

impl Bundle {
    pub fn completed(
        context: RunContext,
        resolution: ResolutionRecord,
        producers: ProducerResults,
        decision: Decision,
    ) -> Self {
        let missing: Vec<Category> = producers.missing().iter().map(|m| m.category).collect();
        let status = if missing.is_empty() {
            BundleStatus::Complete
        } else {
            BundleStatus::Degraded { missing }
        };
        Self {
            context,
            resolution,
            status,
            producers: Some(producers),
            decision: Some(decision),
        }
    }

    /// A run that stopped before any producer was invoked.
    pub fn aborted(context: RunContext, resolution: ResolutionRecord, reason: String) -> Self {
        Self {
            context,
            resolution,
            status: BundleStatus::Aborted { reason },
            producers: None,
            decision: None,
        }
    }
}
