//! Polygon-backed data collaborators, one per producer.

use analysis_core::{
    Bar, CollaboratorError, DataCollaborator, FundamentalsRaw, NewsArticle, PeerListing,
    PeerUniverse, SectorSnapshot, Symbol,
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};

use crate::sectors::{classify_sic, BENCHMARK_ETF};
use crate::PolygonClient;

/// Calendar days of history requested for daily-bar consumers (~270 sessions).
const HISTORY_DAYS: i64 = 400;
const NEWS_LIMIT: u32 = 50;
const MAX_PEERS: usize = 5;

fn history_window() -> (NaiveDate, NaiveDate) {
    let to = Utc::now().date_naive();
    (to - Duration::days(HISTORY_DAYS), to)
}

/// Daily bars for the technical producer.
#[derive(Clone)]
pub struct PolygonPrices {
    client: PolygonClient,
}

impl PolygonPrices {
    pub fn new(client: PolygonClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataCollaborator for PolygonPrices {
    type Raw = Vec<Bar>;

    async fn fetch(&self, symbol: &Symbol) -> Result<Vec<Bar>, CollaboratorError> {
        let (from, to) = history_window();
        self.client.get_daily_bars(&symbol.ticker, from, to).await
    }

    fn source(&self) -> &str {
        "polygon:aggregates"
    }
}

/// Quarterly financials plus the latest close.
#[derive(Clone)]
pub struct PolygonFundamentals {
    client: PolygonClient,
}

impl PolygonFundamentals {
    pub fn new(client: PolygonClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataCollaborator for PolygonFundamentals {
    type Raw = FundamentalsRaw;

    async fn fetch(&self, symbol: &Symbol) -> Result<FundamentalsRaw, CollaboratorError> {
        let financials = self.client.get_financials(&symbol.ticker).await?;

        let to = Utc::now().date_naive();
        let last_price = match self
            .client
            .get_daily_bars(&symbol.ticker, to - Duration::days(10), to)
            .await
        {
            Ok(bars) => bars.last().map(|b| b.close),
            Err(e) => {
                tracing::warn!("No recent price for {}: {}", symbol.ticker, e);
                None
            }
        };

        Ok(FundamentalsRaw {
            financials,
            last_price,
        })
    }

    fn source(&self) -> &str {
        "polygon:financials"
    }
}

#[derive(Clone)]
pub struct PolygonNews {
    client: PolygonClient,
}

impl PolygonNews {
    pub fn new(client: PolygonClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataCollaborator for PolygonNews {
    type Raw = Vec<NewsArticle>;

    async fn fetch(&self, symbol: &Symbol) -> Result<Vec<NewsArticle>, CollaboratorError> {
        self.client.get_news(&symbol.ticker, NEWS_LIMIT).await
    }

    fn source(&self) -> &str {
        "polygon:news"
    }
}

/// Sector ETF and benchmark bars, sector chosen from the SIC description.
#[derive(Clone)]
pub struct PolygonSector {
    client: PolygonClient,
}

impl PolygonSector {
    pub fn new(client: PolygonClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataCollaborator for PolygonSector {
    type Raw = SectorSnapshot;

    async fn fetch(&self, symbol: &Symbol) -> Result<SectorSnapshot, CollaboratorError> {
        let details = self.client.get_ticker_details(&symbol.ticker).await?;
        let description = details.sic_description.ok_or_else(|| {
            CollaboratorError::NotFound(format!("{} has no SIC classification", symbol.ticker))
        })?;
        let etf = classify_sic(&description).ok_or_else(|| {
            CollaboratorError::NotFound(format!("no sector ETF for SIC '{}'", description))
        })?;
        tracing::debug!("{} classified as {} ({})", symbol.ticker, etf.sector, etf.symbol);

        let (from, to) = history_window();
        let sector_bars = self.client.get_daily_bars(etf.symbol, from, to).await?;
        let benchmark_bars = self.client.get_daily_bars(BENCHMARK_ETF, from, to).await?;

        Ok(SectorSnapshot {
            sector: etf.sector.to_string(),
            etf: etf.symbol.to_string(),
            benchmark: BENCHMARK_ETF.to_string(),
            sector_bars,
            benchmark_bars,
        })
    }

    fn source(&self) -> &str {
        "polygon:sector"
    }
}

/// Subject plus up to five related companies with a year of closes each.
#[derive(Clone)]
pub struct PolygonPeers {
    client: PolygonClient,
}

impl PolygonPeers {
    pub fn new(client: PolygonClient) -> Self {
        Self { client }
    }

    async fn listing(&self, ticker: &str, fallback_name: &str) -> Result<PeerListing, CollaboratorError> {
        let (name, market_cap) = match self.client.get_ticker_details(ticker).await {
            Ok(details) => (details.name, details.market_cap),
            Err(e) => {
                tracing::debug!("No details for {}: {}", ticker, e);
                (fallback_name.to_string(), None)
            }
        };
        let (from, to) = history_window();
        let closes = self
            .client
            .get_daily_bars(ticker, from, to)
            .await?
            .into_iter()
            .map(|b| b.close)
            .collect();

        Ok(PeerListing {
            ticker: ticker.to_string(),
            name,
            market_cap,
            closes,
        })
    }
}

#[async_trait]
impl DataCollaborator for PolygonPeers {
    type Raw = PeerUniverse;

    async fn fetch(&self, symbol: &Symbol) -> Result<PeerUniverse, CollaboratorError> {
        let related = self.client.get_related_companies(&symbol.ticker).await?;
        let subject = self.listing(&symbol.ticker, &symbol.name).await?;

        let mut peers = Vec::with_capacity(MAX_PEERS);
        for ticker in related.iter().take(MAX_PEERS) {
            match self.listing(ticker, ticker).await {
                Ok(listing) => peers.push(listing),
                Err(e) => tracing::debug!("Skipping peer {}: {}", ticker, e),
            }
        }

        Ok(PeerUniverse { subject, peers })
    }

    fn source(&self) -> &str {
        "polygon:related-companies"
    }
}
