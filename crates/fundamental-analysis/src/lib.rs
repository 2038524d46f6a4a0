use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use analysis_core::{
    fetch_with_retry, AnalysisError, Category, DataCollaborator, Financials, FundamentalsPayload,
    FundamentalsRaw, Producer, ProducerResult, ResultMetadata, RetryPolicy, RunContext, Symbol,
};
use async_trait::async_trait;

pub struct FundamentalsProducer {
    source: Arc<dyn DataCollaborator<Raw = FundamentalsRaw>>,
    retry: RetryPolicy,
}

impl FundamentalsProducer {
    pub fn new(source: Arc<dyn DataCollaborator<Raw = FundamentalsRaw>>, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }
}

#[async_trait]
impl Producer for FundamentalsProducer {
    type Payload = FundamentalsPayload;

    async fn analyze(&self, symbol: &Symbol, _context: &RunContext) -> ProducerResult<FundamentalsPayload> {
        let started = Instant::now();
        let (fetched, attempts) =
            fetch_with_retry(&self.retry, "fundamentals", || self.source.fetch(symbol)).await;
        let metadata = ResultMetadata::new(Category::Fundamentals, &symbol.ticker, self.source.source())
            .with_attempts(attempts);

        let result = match fetched {
            Ok(raw) => match analyze_financials(&raw.financials, raw.last_price) {
                Ok(payload) => ProducerResult::validated(payload, metadata),
                Err(e) => ProducerResult::from_analysis_error(&e, metadata),
            },
            Err(e) => {
                tracing::warn!("Financials fetch for {} failed: {}", symbol.ticker, e);
                ProducerResult::from_collaborator_error(&e, metadata)
            }
        };
        result.with_elapsed_ms(started.elapsed().as_millis() as u64)
    }

    fn source(&self) -> &str {
        self.source.source()
    }
}

fn calculate_pe_ratio(price: f64, eps: f64) -> Option<f64> {
    if eps > 0.0 && price > 0.0 {
        Some(price / eps)
    } else {
        None
    }
}

fn calculate_debt_to_equity(liabilities: f64, equity: f64) -> Option<f64> {
    if equity > 0.0 {
        Some(liabilities / equity)
    } else {
        None
    }
}

/// Percent of equity
fn calculate_roe(net_income: f64, equity: f64) -> Option<f64> {
    if equity > 0.0 {
        Some((net_income / equity) * 100.0)
    } else {
        None
    }
}

/// `part` as a percent of revenue
fn calculate_margin(part: f64, revenue: f64) -> Option<f64> {
    if revenue > 0.0 {
        Some((part / revenue) * 100.0)
    } else {
        None
    }
}

fn calculate_current_ratio(assets: f64, liabilities: f64) -> Option<f64> {
    if liabilities > 0.0 {
        Some(assets / liabilities)
    } else {
        None
    }
}

/// Sum a field across quarters, `None` if every quarter lacks it
fn sum_ttm(quarters: &[Financials], accessor: fn(&Financials) -> Option<f64>) -> Option<f64> {
    let values: Vec<f64> = quarters.iter().filter_map(accessor).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum())
    }
}

/// Trailing-year revenue vs the year before, in percent. Needs at least
/// three reported quarters in each year; partial years are annualized.
fn revenue_growth_yoy(financials: &[Financials]) -> Option<f64> {
    if financials.len() < 5 {
        return None;
    }
    let current = &financials[..4];
    let prior = &financials[4..financials.len().min(8)];

    let current_count = current.iter().filter(|f| f.revenue.is_some()).count();
    let prior_count = prior.iter().filter(|f| f.revenue.is_some()).count();
    if current_count < 3 || prior_count < 3 {
        return None;
    }

    let current_norm = sum_ttm(current, |f| f.revenue)? / current_count as f64 * 4.0;
    let prior_norm = sum_ttm(prior, |f| f.revenue)? / prior_count as f64 * 4.0;
    if prior_norm <= 0.0 {
        return None;
    }
    Some(((current_norm - prior_norm) / prior_norm) * 100.0)
}

/// Ratios, pros/cons and a 0-100 score from quarterly financials (newest first).
///
/// Flow metrics use the trailing four quarters; balance-sheet metrics use the
/// latest quarter.
pub fn analyze_financials(
    financials: &[Financials],
    price: Option<f64>,
) -> Result<FundamentalsPayload, AnalysisError> {
    if !financials
        .iter()
        .any(|f| f.revenue.is_some() || f.net_income.is_some())
    {
        return Err(AnalysisError::InsufficientData(
            "No quarter reports revenue or net income".to_string(),
        ));
    }

    let ttm = &financials[..financials.len().min(4)];
    let ttm_revenue = sum_ttm(ttm, |f| f.revenue);
    let ttm_gross_profit = sum_ttm(ttm, |f| f.gross_profit);
    let ttm_operating_income = sum_ttm(ttm, |f| f.operating_income);
    let ttm_net_income = sum_ttm(ttm, |f| f.net_income);
    let ttm_eps = sum_ttm(ttm, |f| f.eps);
    let latest = &financials[0];

    let mut metrics = BTreeMap::new();
    // (label, weight, bullish)
    let mut signals: Vec<(String, i32, bool)> = Vec::new();

    let revenue_growth = revenue_growth_yoy(financials);

    if let (Some(eps), Some(price)) = (ttm_eps, price) {
        if let Some(pe) = calculate_pe_ratio(price, eps) {
            metrics.insert("pe_ratio".to_string(), pe);
            // Growth earns a higher tolerated multiple
            let (low, high) = match revenue_growth {
                Some(g) if g > 25.0 => (25.0, 60.0),
                Some(g) if g > 10.0 => (18.0, 40.0),
                _ => (15.0, 30.0),
            };
            if pe < low {
                signals.push((format!("Low P/E ratio ({:.1})", pe), 3, true));
            } else if pe > high {
                signals.push((format!("High P/E ratio ({:.1})", pe), 2, false));
            }
        }
    }

    if let (Some(net_income), Some(equity)) = (ttm_net_income, latest.shareholders_equity) {
        if let Some(roe) = calculate_roe(net_income, equity) {
            metrics.insert("roe".to_string(), roe);
            if roe > 15.0 {
                signals.push((format!("Strong ROE ({:.1}%)", roe), 3, true));
            } else if roe < 5.0 {
                signals.push((format!("Weak ROE ({:.1}%)", roe), 2, false));
            }
        }
    }

    if let (Some(net_income), Some(revenue)) = (ttm_net_income, ttm_revenue) {
        if let Some(margin) = calculate_margin(net_income, revenue) {
            metrics.insert("net_margin".to_string(), margin);
            if margin > 20.0 {
                signals.push((format!("High net margin ({:.1}%)", margin), 3, true));
            } else if margin < 5.0 {
                signals.push((format!("Thin net margin ({:.1}%)", margin), 2, false));
            }
        }
    }

    if let (Some(gross_profit), Some(revenue)) = (ttm_gross_profit, ttm_revenue) {
        if let Some(gm) = calculate_margin(gross_profit, revenue) {
            metrics.insert("gross_margin".to_string(), gm);
            if gm > 50.0 {
                signals.push((format!("High gross margin ({:.1}%)", gm), 2, true));
            } else if gm < 20.0 {
                signals.push((format!("Low gross margin ({:.1}%)", gm), 2, false));
            }
        }
    }

    if let (Some(op_income), Some(revenue)) = (ttm_operating_income, ttm_revenue) {
        if let Some(om) = calculate_margin(op_income, revenue) {
            metrics.insert("operating_margin".to_string(), om);
            if om > 20.0 {
                signals.push((format!("Strong operating margin ({:.1}%)", om), 2, true));
            } else if om < 5.0 {
                signals.push((format!("Weak operating margin ({:.1}%)", om), 2, false));
            }
        }
    }

    if let (Some(liabilities), Some(equity)) = (latest.total_liabilities, latest.shareholders_equity) {
        if let Some(d2e) = calculate_debt_to_equity(liabilities, equity) {
            metrics.insert("debt_to_equity".to_string(), d2e);
            if d2e < 0.5 {
                signals.push((format!("Low leverage (D/E {:.2})", d2e), 2, true));
            } else if d2e > 2.0 {
                signals.push((format!("High leverage (D/E {:.2})", d2e), 3, false));
            }
        }
    }

    if let (Some(assets), Some(liabilities)) = (latest.current_assets, latest.current_liabilities) {
        if let Some(cr) = calculate_current_ratio(assets, liabilities) {
            metrics.insert("current_ratio".to_string(), cr);
            if cr > 1.5 {
                signals.push((format!("Comfortable liquidity (current ratio {:.2})", cr), 2, true));
            } else if cr < 1.0 {
                signals.push((format!("Tight liquidity (current ratio {:.2})", cr), 2, false));
            }
        }
    }

    if let Some(growth) = revenue_growth {
        metrics.insert("revenue_growth_yoy".to_string(), growth);
        if growth > 10.0 {
            signals.push((format!("Strong revenue growth ({:+.1}% YoY)", growth), 3, true));
        } else if growth < -5.0 {
            signals.push((format!("Revenue decline ({:+.1}% YoY)", growth), 3, false));
        }
    }

    if metrics.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "No fundamental ratio could be computed".to_string(),
        ));
    }

    let mut total_score = 0;
    let mut total_weight = 0;
    for (_, weight, bullish) in &signals {
        total_weight += weight;
        total_score += if *bullish { *weight } else { -weight };
    }
    let normalized = if total_weight > 0 {
        total_score as f64 / total_weight as f64
    } else {
        0.0
    };
    // Breadth of evidence scales how far the score can move from neutral
    let breadth = (signals.len() as f64 / 4.0).min(1.0);
    let score = (50.0 + 50.0 * normalized * breadth).clamp(0.0, 100.0);

    let mut pros = Vec::new();
    let mut cons = Vec::new();
    for (label, _, bullish) in signals {
        if bullish {
            pros.push(label);
        } else {
            cons.push(label);
        }
    }

    Ok(FundamentalsPayload {
        metrics,
        pros,
        cons,
        score,
        periods_analyzed: financials.len() as u32,
    })
}
