//! Company name to trading symbol resolution.
//!
//! Strategies run in order and the first one that yields a decision wins:
//! exact match on the built-in directory (name, alias or ticker), fuzzy match
//! on the directory, then an external ticker search.

pub mod directory;
pub mod normalize;

use std::sync::Arc;

use analysis_core::{
    ListingCandidate, MatchStrategy, Resolution, ResolutionError, Symbol, SymbolLookup,
};

pub use directory::{DirectoryEntry, BUILTIN_DIRECTORY};
pub use normalize::{base_ticker, normalize_company_name, similarity};

/// Scores closer than this are treated as a tie.
const TIE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    /// Minimum similarity a fuzzy or external candidate must reach
    pub min_score: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { min_score: 0.6 }
    }
}

#[derive(Debug, Clone)]
struct ScoredCandidate {
    symbol: Symbol,
    score: f64,
}

enum Stage {
    Decided(Result<Resolution, ResolutionError>),
    /// Nothing cleared the threshold; carries the best score seen
    NoMatch(f64),
}

pub struct SymbolResolver {
    directory: Vec<DirectoryEntry>,
    lookup: Option<Arc<dyn SymbolLookup>>,
    config: ResolverConfig,
}

impl SymbolResolver {
    pub fn new(lookup: Option<Arc<dyn SymbolLookup>>) -> Self {
        Self {
            directory: BUILTIN_DIRECTORY.to_vec(),
            lookup,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_directory(mut self, directory: Vec<DirectoryEntry>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn resolve(&self, company_name: &str) -> Result<Resolution, ResolutionError> {
        let query = company_name.trim();
        let normalized = normalize_company_name(query);

        if let Some(decided) = self.exact_match(query, &normalized) {
            return decided;
        }

        let directory_best = match self.fuzzy_match(query, &normalized) {
            Stage::Decided(result) => return result,
            Stage::NoMatch(best) => best,
        };

        let external_best = match self.external_match(query, &normalized).await {
            Stage::Decided(result) => return result,
            Stage::NoMatch(best) => best,
        };

        let best_score = directory_best.max(external_best);
        tracing::info!(
            "No listing for '{}' cleared {:.2} (best {:.2})",
            query,
            self.config.min_score,
            best_score
        );
        Err(ResolutionError::NotFound {
            query: query.to_string(),
            best_score,
        })
    }

    fn exact_match(
        &self,
        query: &str,
        normalized: &str,
    ) -> Option<Result<Resolution, ResolutionError>> {
        let upper = query.to_ascii_uppercase();
        let mut hits: Vec<ScoredCandidate> = self
            .directory
            .iter()
            .filter(|entry| {
                entry.ticker == upper
                    || base_ticker(entry.ticker) == upper
                    || normalize_company_name(entry.name) == normalized
                    || entry
                        .aliases
                        .iter()
                        .any(|alias| normalize_company_name(alias) == normalized)
            })
            .map(|entry| ScoredCandidate {
                symbol: entry.to_symbol(),
                score: 1.0,
            })
            .collect();

        if hits.is_empty() {
            return None;
        }
        tracing::debug!("Exact directory hits for '{}': {}", query, hits.len());
        Some(self.pick(query, &mut hits, MatchStrategy::Exact))
    }

    fn fuzzy_match(&self, query: &str, normalized: &str) -> Stage {
        let mut scored: Vec<ScoredCandidate> = self
            .directory
            .iter()
            .map(|entry| {
                let score = std::iter::once(entry.name)
                    .chain(entry.aliases.iter().copied())
                    .map(|name| similarity(normalized, &normalize_company_name(name)))
                    .fold(0.0, f64::max);
                ScoredCandidate {
                    symbol: entry.to_symbol(),
                    score,
                }
            })
            .collect();

        self.decide(query, &mut scored, MatchStrategy::Fuzzy)
    }

    async fn external_match(&self, query: &str, normalized: &str) -> Stage {
        let Some(lookup) = &self.lookup else {
            return Stage::NoMatch(0.0);
        };

        let listings = match lookup.search(query).await {
            Ok(listings) => listings,
            Err(e) => {
                tracing::warn!("External symbol search for '{}' failed: {}", query, e);
                return Stage::NoMatch(0.0);
            }
        };

        let upper = query.to_ascii_uppercase();
        let mut scored: Vec<ScoredCandidate> = listings
            .into_iter()
            .map(|listing| {
                let score = if listing.ticker.eq_ignore_ascii_case(&upper) {
                    1.0
                } else {
                    similarity(normalized, &normalize_company_name(&listing.name))
                };
                ScoredCandidate {
                    symbol: listing_symbol(listing),
                    score,
                }
            })
            .collect();

        self.decide(query, &mut scored, MatchStrategy::External)
    }

    fn decide(&self, query: &str, scored: &mut Vec<ScoredCandidate>, strategy: MatchStrategy) -> Stage {
        let best = scored.iter().map(|c| c.score).fold(0.0, f64::max);
        if best < self.config.min_score {
            return Stage::NoMatch(best);
        }
        scored.retain(|c| c.score >= self.config.min_score);
        Stage::Decided(self.pick(query, scored, strategy))
    }

    /// Best candidate wins; distinct tickers tied at the top are ambiguous.
    fn pick(
        &self,
        query: &str,
        candidates: &mut Vec<ScoredCandidate>,
        strategy: MatchStrategy,
    ) -> Result<Resolution, ResolutionError> {
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.symbol.ticker.cmp(&b.symbol.ticker))
        });
        candidates.dedup_by(|a, b| a.symbol.ticker == b.symbol.ticker);

        let Some(top) = candidates.first() else {
            return Err(ResolutionError::NotFound {
                query: query.to_string(),
                best_score: 0.0,
            });
        };

        let tied: Vec<String> = candidates
            .iter()
            .filter(|c| (top.score - c.score).abs() < TIE_EPSILON)
            .map(|c| c.symbol.ticker.clone())
            .collect();

        if tied.len() > 1 {
            tracing::info!("'{}' is ambiguous: {:?}", query, tied);
            return Err(ResolutionError::Ambiguous {
                query: query.to_string(),
                candidates: tied,
            });
        }

        tracing::info!(
            "Resolved '{}' to {} via {:?} match (score {:.2})",
            query,
            top.symbol.ticker,
            strategy,
            top.score
        );
        Ok(Resolution {
            symbol: top.symbol.clone(),
            strategy,
            score: top.score,
        })
    }
}

fn listing_symbol(listing: ListingCandidate) -> Symbol {
    let symbol = Symbol::new(listing.ticker, listing.name);
    match listing.exchange {
        Some(exchange) => symbol.with_exchange(exchange),
        None => symbol,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::CollaboratorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeLookup {
        listings: Vec<ListingCandidate>,
        calls: AtomicU32,
    }

    impl FakeLookup {
        fn new(listings: Vec<ListingCandidate>) -> Arc<Self> {
            Arc::new(Self {
                listings,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl SymbolLookup for FakeLookup {
        async fn search(&self, _query: &str) -> Result<Vec<ListingCandidate>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.listings.clone())
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl SymbolLookup for FailingLookup {
        async fn search(&self, _query: &str) -> Result<Vec<ListingCandidate>, CollaboratorError> {
            Err(CollaboratorError::Transport("connection refused".into()))
        }
    }

    fn candidate(ticker: &str, name: &str) -> ListingCandidate {
        ListingCandidate {
            ticker: ticker.to_string(),
            name: name.to_string(),
            exchange: Some("XNAS".to_string()),
        }
    }

    #[tokio::test]
    async fn test_exact_ticker_base_match() {
        let resolver = SymbolResolver::new(None);
        let resolution = resolver.resolve("Reliance").await.unwrap();
        assert_eq!(resolution.symbol.ticker, "RELIANCE.NS");
        assert_eq!(resolution.strategy, MatchStrategy::Exact);
        assert_eq!(resolution.score, 1.0);
    }

    #[tokio::test]
    async fn test_exact_name_match_beats_fuzzy() {
        let resolver = SymbolResolver::new(None);
        let resolution = resolver.resolve("HDFC Bank").await.unwrap();
        assert_eq!(resolution.symbol.ticker, "HDFCBANK.NS");
        assert_eq!(resolution.strategy, MatchStrategy::Exact);
    }

    #[tokio::test]
    async fn test_alias_match() {
        let resolver = SymbolResolver::new(None);
        let resolution = resolver.resolve("google").await.unwrap();
        assert_eq!(resolution.symbol.ticker, "GOOGL");
    }

    #[tokio::test]
    async fn test_ambiguous_prefix() {
        let resolver = SymbolResolver::new(None);
        let err = resolver.resolve("HDFC").await.unwrap_err();
        match err {
            ResolutionError::Ambiguous { candidates, .. } => {
                assert!(candidates.contains(&"HDFCBANK.NS".to_string()));
                assert!(candidates.contains(&"HDFCLIFE.NS".to_string()));
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fuzzy_match() {
        let resolver = SymbolResolver::new(None);
        let resolution = resolver.resolve("Reliance Industries Group").await.unwrap();
        assert_eq!(resolution.symbol.ticker, "RELIANCE.NS");
        assert_eq!(resolution.strategy, MatchStrategy::Fuzzy);
        assert!(resolution.score >= 0.6 && resolution.score < 1.0);
    }

    #[tokio::test]
    async fn test_directory_hit_skips_external_lookup() {
        let lookup = FakeLookup::new(vec![candidate("ZZZ", "Apple Inc.")]);
        let resolver = SymbolResolver::new(Some(lookup.clone()));
        let resolution = resolver.resolve("Apple").await.unwrap();
        assert_eq!(resolution.symbol.ticker, "AAPL");
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_external_lookup_fallback() {
        let lookup = FakeLookup::new(vec![
            candidate("ZOMATO.NS", "Zomato Limited"),
            candidate("SWIGGY.NS", "Swiggy Limited"),
        ]);
        let resolver = SymbolResolver::new(Some(lookup.clone()));
        let resolution = resolver.resolve("Zomato").await.unwrap();
        assert_eq!(resolution.symbol.ticker, "ZOMATO.NS");
        assert_eq!(resolution.strategy, MatchStrategy::External);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found() {
        let lookup = FakeLookup::new(vec![candidate("ABC", "Alpha Beta Corp")]);
        let resolver = SymbolResolver::new(Some(lookup));
        let err = resolver.resolve("Nonexistent Widgets").await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_not_found() {
        let resolver = SymbolResolver::new(Some(Arc::new(FailingLookup)));
        let err = resolver.resolve("Nonexistent Widgets").await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_resolution_is_deterministic() {
        let resolver = SymbolResolver::new(None);
        let first = resolver.resolve("tata motors").await;
        for _ in 0..5 {
            assert_eq!(resolver.resolve("tata motors").await, first);
        }
    }
}
