//! Comparable-listing ranking.
//!
//! Each listing gets a 0-100 composite of trailing return, return per unit of
//! volatility, and size. The subject's percentile among its peers is the
//! directional signal; the peers themselves are offered as alternatives.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use analysis_core::{
    fetch_with_retry, AlternativesPayload, AnalysisError, Category, DataCollaborator, PeerListing,
    PeerUniverse, Producer, ProducerResult, ResultMetadata, RetryPolicy, RunContext, ScoredListing,
    Symbol,
};
use async_trait::async_trait;
use technical_analysis::{annualized_volatility, trailing_return, SESSIONS_PER_YEAR};

/// Fewest closes a listing needs to be scored
pub const MIN_CLOSES: usize = 64;

/// Weights for the composite listing score
#[derive(Debug, Clone)]
pub struct RankingWeights {
    pub return_weight: f64,
    pub risk_adjusted_weight: f64,
    pub size_weight: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            return_weight: 0.5,
            risk_adjusted_weight: 0.3,
            size_weight: 0.2,
        }
    }
}

pub struct ListingRanker {
    weights: RankingWeights,
}

impl Default for ListingRanker {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingRanker {
    pub fn new() -> Self {
        Self {
            weights: RankingWeights::default(),
        }
    }

    pub fn with_weights(weights: RankingWeights) -> Self {
        Self { weights }
    }

    /// None when the listing has too little usable history.
    pub fn score(&self, listing: &PeerListing) -> Option<ScoredListing> {
        if listing.closes.len() < MIN_CLOSES || listing.closes.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return None;
        }

        // Up to a year of history; shorter listings use what they have.
        let period = (listing.closes.len() - 1).min(SESSIONS_PER_YEAR);
        let return_12m = trailing_return(&listing.closes, period)?;
        let volatility = annualized_volatility(&listing.closes).filter(|v| v.is_finite());

        let return_score = 50.0 + 50.0 * (2.0 * return_12m).tanh();
        let risk_adjusted_score = match volatility {
            Some(v) if v > 0.0 => 50.0 + 50.0 * (return_12m / v).tanh(),
            _ => 50.0,
        };
        let size_score = match listing.market_cap {
            Some(cap) if cap > 0.0 => ((cap.log10() - 9.0) / 3.0 * 100.0).clamp(0.0, 100.0),
            _ => 50.0,
        };

        let score = (return_score * self.weights.return_weight
            + risk_adjusted_score * self.weights.risk_adjusted_weight
            + size_score * self.weights.size_weight)
            .clamp(0.0, 100.0);

        let reason = match volatility {
            Some(v) => format!(
                "{:+.1}% trailing return at {:.0}% volatility",
                return_12m * 100.0,
                v * 100.0
            ),
            None => format!("{:+.1}% trailing return", return_12m * 100.0),
        };

        Some(ScoredListing {
            ticker: listing.ticker.clone(),
            name: listing.name.clone(),
            score,
            return_12m: Some(return_12m),
            volatility,
            market_cap: listing.market_cap,
            reason,
        })
    }

    /// Scores the universe, ranks peers best first and places the subject among them.
    pub fn rank(&self, universe: &PeerUniverse) -> Result<AlternativesPayload, AnalysisError> {
        let subject = self.score(&universe.subject).ok_or_else(|| {
            AnalysisError::InsufficientData(format!(
                "{} has fewer than {} usable closes",
                universe.subject.ticker, MIN_CLOSES
            ))
        })?;

        let mut candidates: Vec<ScoredListing> = universe
            .peers
            .iter()
            .filter(|p| !p.ticker.eq_ignore_ascii_case(&subject.ticker))
            .filter_map(|p| {
                let scored = self.score(p);
                if scored.is_none() {
                    tracing::debug!("Dropping peer {} with insufficient history", p.ticker);
                }
                scored
            })
            .collect();

        if candidates.is_empty() {
            return Err(AnalysisError::InsufficientData(format!(
                "No comparable listings with history for {}",
                subject.ticker
            )));
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        let better = candidates.iter().filter(|c| c.score > subject.score).count();
        let worse = candidates.iter().filter(|c| c.score < subject.score).count();
        let ties = candidates.len() - better - worse;
        let subject_percentile = (worse as f64 + 0.5 * ties as f64) / candidates.len() as f64;

        Ok(AlternativesPayload {
            subject_rank: better as u32 + 1,
            subject_percentile,
            subject,
            candidates,
        })
    }
}

pub struct AlternativesProducer {
    peers: Arc<dyn DataCollaborator<Raw = PeerUniverse>>,
    retry: RetryPolicy,
    ranker: ListingRanker,
}

impl AlternativesProducer {
    pub fn new(peers: Arc<dyn DataCollaborator<Raw = PeerUniverse>>, retry: RetryPolicy) -> Self {
        Self {
            peers,
            retry,
            ranker: ListingRanker::new(),
        }
    }

    pub fn with_ranker(mut self, ranker: ListingRanker) -> Self {
        self.ranker = ranker;
        self
    }
}

#[async_trait]
impl Producer for AlternativesProducer {
    type Payload = AlternativesPayload;

    async fn analyze(&self, symbol: &Symbol, _context: &RunContext) -> ProducerResult<AlternativesPayload> {
        let started = Instant::now();
        let (fetched, attempts) =
            fetch_with_retry(&self.retry, "alternatives", || self.peers.fetch(symbol)).await;
        let metadata = ResultMetadata::new(Category::Alternatives, &symbol.ticker, self.peers.source())
            .with_attempts(attempts);

        let result = match fetched {
            Ok(universe) => match self.ranker.rank(&universe) {
                Ok(payload) => {
                    tracing::debug!(
                        "{} ranks {} of {}",
                        symbol.ticker,
                        payload.subject_rank,
                        payload.candidates.len() + 1
                    );
                    ProducerResult::validated(payload, metadata)
                }
                Err(e) => ProducerResult::from_analysis_error(&e, metadata),
            },
            Err(e) => {
                tracing::warn!("Peer lookup for {} failed: {}", symbol.ticker, e);
                ProducerResult::from_collaborator_error(&e, metadata)
            }
        };
        result.with_elapsed_ms(started.elapsed().as_millis() as u64)
    }

    fn source(&self) -> &str {
        self.peers.source()
    }
}
