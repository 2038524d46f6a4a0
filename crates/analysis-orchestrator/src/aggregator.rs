//! Decision aggregation.
//!
//! Turns the five producer outcomes of a run into exactly one [`Decision`].
//! Weights are renormalized over the categories that succeeded; confidence
//! scales with the share of categories that contributed, so a decision built
//! from partial evidence always reads as less certain.

use analysis_core::{
    Action, AggregationDegraded, Category, CategorySignal, DcaPlan, Decision, Direction,
    EntryTiming, FactorOutcome, FailureKind, Payload, PositionBucket, PositionSize, ProducerResult,
    ProducerResults, Rationale, RationaleEntry, RiskControls, RunContext, TrendDirection,
};

use crate::config::AggregatorPolicy;

const HEADLINES_IN_SUMMARY: usize = 3;

/// One successful category with its tilted, renormalized weight.
#[derive(Debug, Clone)]
struct Contribution {
    category: Category,
    signal: CategorySignal,
    weight: f64,
}

fn signal_of<T: Payload>(result: &ProducerResult<T>) -> Option<(Category, CategorySignal)> {
    result.payload().map(|p| (T::CATEGORY, p.signal()))
}

/// Multiplier applied to a category's base weight for the given horizon.
/// Technical reads favor short horizons; fundamentals and sector context favor long ones.
pub fn horizon_multiplier(policy: &AggregatorPolicy, category: Category, horizon_years: f64) -> f64 {
    let tilt = ((horizon_years - policy.horizon_pivot_years) / policy.horizon_span_years).clamp(-1.0, 1.0);
    match category {
        Category::Technical => 1.0 - policy.horizon_strength * tilt,
        Category::Fundamentals | Category::SectorMacro => 1.0 + policy.horizon_strength * tilt,
        Category::News | Category::Alternatives => 1.0,
    }
}

pub fn direction_of(score: f64, neutral_band: f64) -> Direction {
    if score > neutral_band {
        Direction::Bullish
    } else if score < -neutral_band {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

fn contributions(results: &ProducerResults, context: &RunContext, policy: &AggregatorPolicy) -> Vec<Contribution> {
    let signals = [
        signal_of(&results.fundamentals),
        signal_of(&results.technical),
        signal_of(&results.news),
        signal_of(&results.sector_macro),
        signal_of(&results.alternatives),
    ];

    let mut contributions: Vec<Contribution> = signals
        .into_iter()
        .flatten()
        .map(|(category, signal)| Contribution {
            category,
            weight: policy.weights.get(category)
                * horizon_multiplier(policy, category, context.horizon_years),
            signal,
        })
        .collect();

    let total: f64 = contributions.iter().map(|c| c.weight).sum();
    if total > 0.0 {
        for c in contributions.iter_mut() {
            c.weight /= total;
        }
    }
    contributions
}

/// Weighted share of contributors pointing the same way as the composite.
fn agreement(contributions: &[Contribution], composite: f64) -> f64 {
    contributions
        .iter()
        .map(|c| {
            let product = c.signal.score * composite;
            if product > 0.0 {
                c.weight
            } else if product == 0.0 {
                0.5 * c.weight
            } else {
                0.0
            }
        })
        .sum()
}

/// Contributor with the largest weighted pull; earlier categories win ties.
fn dominant(contributions: &[Contribution]) -> Option<&Contribution> {
    contributions.iter().fold(None, |best: Option<&Contribution>, c| match best {
        Some(b) if (b.weight * b.signal.score).abs() >= (c.weight * c.signal.score).abs() => Some(b),
        _ => Some(c),
    })
}

fn review_months(horizon_years: f64) -> u32 {
    if horizon_years < 1.0 {
        1
    } else if horizon_years <= 3.0 {
        3
    } else {
        6
    }
}

/// Longer horizons accumulate in more tranches over a longer span.
fn dca_plan_for(horizon_years: f64) -> DcaPlan {
    let tranches = (horizon_years.ceil().clamp(1.0, 5.0) as u32 + 1).clamp(2, 6);
    DcaPlan {
        tranches,
        span_weeks: tranches * 4,
    }
}

fn bucket_for(fraction: f64, cap: f64) -> PositionBucket {
    if fraction <= 0.0 || cap <= 0.0 {
        return PositionBucket::None;
    }
    let share = fraction / cap;
    if share < 0.4 {
        PositionBucket::Starter
    } else if share < 0.75 {
        PositionBucket::Standard
    } else {
        PositionBucket::Full
    }
}

fn news_summary(results: &ProducerResults) -> String {
    match (results.news.payload(), results.news.failure_info()) {
        (Some(news), _) => {
            let mut summary = news.summary.clone();
            for headline in news.headlines.iter().take(HEADLINES_IN_SUMMARY) {
                summary.push_str(&format!("\n- {} ({:+.2})", headline.title, headline.sentiment));
            }
            summary
        }
        (None, Some(failure)) => format!("News unavailable ({}): {}", failure.kind.as_str(), failure.reason),
        (None, None) => "News unavailable".to_string(),
    }
}

/// Build the decision for one run. Deterministic in its inputs and never fails.
pub fn aggregate(results: &ProducerResults, context: &RunContext, policy: &AggregatorPolicy) -> Decision {
    let contributions = contributions(results, context, policy);
    let successful = contributions.len() as u32;
    let missing = results.missing();
    let profile = policy.risk.get(context.risk_level);

    let composite: f64 = contributions
        .iter()
        .map(|c| c.weight * c.signal.score)
        .sum::<f64>()
        .clamp(-1.0, 1.0);
    let quality: f64 = contributions.iter().map(|c| c.weight * c.signal.quality).sum();

    let coverage = successful as f64 / Category::ALL.len() as f64;
    let evidence = if successful == 0 {
        0.0
    } else {
        0.5 + 0.5 * quality * (0.5 * agreement(&contributions, composite) + 0.5 * composite.abs())
    };
    let confidence = (policy.confidence_floor + (1.0 - policy.confidence_floor) * coverage * evidence).clamp(0.0, 1.0);

    let action = if successful == 0 || confidence < policy.min_confidence_to_act {
        Action::Hold
    } else if composite >= profile.buy_threshold {
        Action::Buy
    } else if composite <= profile.sell_threshold {
        Action::Sell
    } else {
        Action::Hold
    };

    let technical = results.technical.payload();
    let lead = dominant(&contributions);
    let review_every_months = review_months(context.horizon_years);

    let entry_timing = match action {
        Action::Buy => {
            if technical.map_or(false, |t| t.trend == TrendDirection::Downtrend) {
                EntryTiming::OnTechnicalConfirmation
            } else if lead.map_or(false, |c| matches!(c.category, Category::Technical | Category::News)) {
                EntryTiming::Immediate
            } else {
                let plan = dca_plan_for(context.horizon_years);
                EntryTiming::Staged {
                    tranches: plan.tranches,
                    over_weeks: plan.span_weeks,
                }
            }
        }
        Action::Hold => EntryTiming::Wait {
            review_in_weeks: review_every_months * 4,
        },
        Action::Sell => EntryTiming::Exit {
            over_weeks: if lead.map_or(false, |c| c.category == Category::Technical) { 1 } else { 4 },
        },
    };

    let dca_plan = match entry_timing {
        EntryTiming::Staged { tranches, over_weeks } => Some(DcaPlan {
            tranches,
            span_weeks: over_weeks,
        }),
        _ => None,
    };

    let fraction = if action == Action::Buy {
        (profile.position_cap * confidence).clamp(0.0, profile.position_cap)
    } else {
        0.0
    };
    let position_size = PositionSize {
        fraction,
        cap: profile.position_cap,
        bucket: bucket_for(fraction, profile.position_cap),
    };

    let risk_controls = RiskControls {
        stop_loss_pct: profile.stop_loss_pct,
        exit_below_200dma: technical.map_or(false, |t| t.sma_200.is_some()),
        review_every_months,
    };

    let factors: Vec<RationaleEntry> = Category::ALL
        .iter()
        .map(|&category| {
            let outcome = match contributions.iter().find(|c| c.category == category) {
                Some(c) => FactorOutcome::Contributed {
                    direction: direction_of(c.signal.score, policy.neutral_band),
                    score: c.signal.score,
                    weight: c.weight,
                    highlight: c.signal.highlight.clone(),
                },
                None => {
                    let (kind, reason) = missing
                        .iter()
                        .find(|m| m.category == category)
                        .map(|m| (m.kind, m.reason.clone()))
                        .unwrap_or((FailureKind::Internal, "no result".to_string()));
                    FactorOutcome::Missing { kind, reason }
                }
            };
            RationaleEntry { category, outcome }
        })
        .collect();

    let statement = if successful == 0 {
        format!("insufficient data: 0 of {} categories contributed", Category::ALL.len())
    } else {
        let mut statement = format!(
            "{} at {:.0}% confidence from {} of {} categories (composite {:+.2})",
            action,
            confidence * 100.0,
            successful,
            Category::ALL.len(),
            composite
        );
        if let Some(lead) = lead {
            statement.push_str(&format!("; led by {}: {}", lead.category, lead.signal.highlight));
        }
        if !missing.is_empty() {
            let names: Vec<String> = missing
                .iter()
                .map(|m| format!("{} ({})", m.category, m.kind.as_str()))
                .collect();
            statement.push_str(&format!("; missing: {}", names.join(", ")));
        }
        statement
    };

    let degraded = if missing.is_empty() {
        None
    } else {
        Some(AggregationDegraded {
            successful,
            missing,
        })
    };

    Decision {
        action,
        confidence,
        composite_score: composite,
        entry_timing,
        position_size,
        dca_plan,
        risk_controls,
        rationale: Rationale {
            contributing_categories: successful,
            statement,
            factors,
        },
        news_summary: news_summary(results),
        degraded,
    }
}
