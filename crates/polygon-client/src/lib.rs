pub mod collaborators;
pub mod sectors;

use analysis_core::{Bar, CollaboratorError, Financials, ListingCandidate, NewsArticle, SymbolLookup};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub use collaborators::{PolygonFundamentals, PolygonNews, PolygonPeers, PolygonPrices, PolygonSector};

const BASE_URL: &str = "https://api.polygon.io";
const BARS_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let Some(&oldest) = ts.front() else { continue };
            let sleep_dur = (oldest + self.window).duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
    bars_cache: Arc<DashMap<String, (Instant, Vec<Bar>)>>,
}

impl PolygonClient {
    /// `requests_per_minute`: 500 suits the Starter plan, the free tier needs 5.
    pub fn new(api_key: String, requests_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(requests_per_minute, Duration::from_secs(60)),
            bars_cache: Arc::new(DashMap::new()),
        }
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, CollaboratorError> {
        let request = builder.build().map_err(transport_error)?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| CollaboratorError::Transport("Cannot clone request".to_string()))?;
            let response = self.client.execute(req_clone).await.map_err(transport_error)?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return check_status(response).await;
            }

            let wait_secs = 15u64;
            tracing::warn!("Polygon 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(CollaboratorError::RateLimited("Rate limited by Polygon after 3 retries".to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, CollaboratorError> {
        let response = self.send_request(builder).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                CollaboratorError::Timeout(e.to_string())
            } else {
                CollaboratorError::Malformed(e.to_string())
            }
        })
    }

    /// Daily bars between two dates, oldest first. Cached for 15 minutes.
    pub async fn get_daily_bars(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, CollaboratorError> {
        let cache_key = format!("{}:{}:{}", symbol, from, to);
        if let Some(entry) = self.bars_cache.get(&cache_key) {
            let (fetched_at, bars) = entry.value();
            if fetched_at.elapsed() < BARS_CACHE_TTL {
                tracing::debug!("Bars cache hit for {}", symbol);
                return Ok(bars.clone());
            }
        }

        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            BASE_URL,
            symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let agg_response: AggregateResponse = self
            .get_json(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        let bars: Vec<Bar> = agg_response
            .results
            .into_iter()
            .filter_map(|r| {
                Some(Bar {
                    timestamp: DateTime::from_timestamp_millis(r.t)?,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect();

        self.bars_cache.insert(cache_key, (Instant::now(), bars.clone()));
        Ok(bars)
    }

    /// Quarterly financials, newest first
    pub async fn get_financials(&self, symbol: &str) -> Result<Vec<Financials>, CollaboratorError> {
        let url = format!("{}/vX/reference/financials", BASE_URL);

        let fin_response: FinancialsResponse = self
            .get_json(self.client.get(&url).query(&[
                ("ticker", symbol),
                ("timeframe", "quarterly"),
                ("order", "desc"),
                ("sort", "period_of_report_date"),
                ("apiKey", self.api_key.as_str()),
                ("limit", "8"),
            ]))
            .await?;

        Ok(fin_response
            .results
            .into_iter()
            .map(|r| {
                let income = r.financials.income_statement;
                let balance = r.financials.balance_sheet;
                let cash_flow = r.financials.cash_flow_statement;

                Financials {
                    symbol: symbol.to_string(),
                    fiscal_period: r.fiscal_period,
                    fiscal_year: r.fiscal_year.parse().unwrap_or(0),
                    revenue: statement_value(&income, "revenues"),
                    gross_profit: statement_value(&income, "gross_profit"),
                    operating_income: statement_value(&income, "operating_income_loss"),
                    net_income: statement_value(&income, "net_income_loss"),
                    eps: statement_value(&income, "basic_earnings_per_share"),
                    total_assets: statement_value(&balance, "assets"),
                    total_liabilities: statement_value(&balance, "liabilities"),
                    shareholders_equity: statement_value(&balance, "equity"),
                    current_assets: statement_value(&balance, "current_assets"),
                    current_liabilities: statement_value(&balance, "current_liabilities"),
                    cash_flow_operating: statement_value(&cash_flow, "net_cash_flow_from_operating_activities"),
                }
            })
            .collect())
    }

    /// Get news articles for a ticker, newest first
    pub async fn get_news(&self, symbol: &str, limit: u32) -> Result<Vec<NewsArticle>, CollaboratorError> {
        let url = format!("{}/v2/reference/news", BASE_URL);
        let limit = limit.to_string();

        let news_response: NewsResponse = self
            .get_json(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("ticker", symbol),
                ("limit", limit.as_str()),
                ("order", "desc"),
            ]))
            .await?;

        Ok(news_response
            .results
            .into_iter()
            .filter_map(|r| {
                // Articles without a parseable timestamp cannot be recency-weighted.
                let published_utc = DateTime::parse_from_rfc3339(&r.published_utc)
                    .ok()?
                    .with_timezone(&Utc);
                Some(NewsArticle {
                    id: r.id,
                    title: r.title,
                    author: r.author,
                    published_utc,
                    article_url: r.article_url,
                    description: r.description,
                    keywords: r.keywords.unwrap_or_default(),
                    tickers: r.tickers,
                })
            })
            .collect())
    }

    /// Get ticker details
    pub async fn get_ticker_details(&self, symbol: &str) -> Result<TickerDetails, CollaboratorError> {
        let url = format!("{}/v3/reference/tickers/{}", BASE_URL, symbol);

        let details_response: TickerDetailsResponse = self
            .get_json(self.client.get(&url).query(&[("apiKey", self.api_key.as_str())]))
            .await?;

        Ok(details_response.results)
    }

    /// Tickers Polygon considers related to `symbol`
    pub async fn get_related_companies(&self, symbol: &str) -> Result<Vec<String>, CollaboratorError> {
        let url = format!("{}/v1/related-companies/{}", BASE_URL, symbol);

        let related: RelatedCompaniesResponse = self
            .get_json(self.client.get(&url).query(&[("apiKey", self.api_key.as_str())]))
            .await?;

        Ok(related
            .results
            .into_iter()
            .map(|r| r.ticker)
            .filter(|t| !t.eq_ignore_ascii_case(symbol))
            .collect())
    }

    /// Active common stocks whose name or ticker matches `query`.
    pub async fn search_tickers(&self, query: &str, limit: u32) -> Result<Vec<ListingCandidate>, CollaboratorError> {
        let limit = limit.to_string();
        let body: TickerListResponse = self
            .get_json(self.client.get(format!("{}/v3/reference/tickers", BASE_URL)).query(&[
                ("apiKey", self.api_key.as_str()),
                ("search", query),
                ("market", "stocks"),
                ("active", "true"),
                ("limit", limit.as_str()),
            ]))
            .await?;

        Ok(body
            .results
            .into_iter()
            .map(|t| ListingCandidate {
                ticker: t.ticker,
                name: t.name.unwrap_or_default(),
                exchange: t.primary_exchange,
            })
            .collect())
    }
}

#[async_trait]
impl SymbolLookup for PolygonClient {
    async fn search(&self, query: &str) -> Result<Vec<ListingCandidate>, CollaboratorError> {
        self.search_tickers(query, 10).await
    }
}

fn transport_error(e: reqwest::Error) -> CollaboratorError {
    if e.is_timeout() {
        CollaboratorError::Timeout(e.to_string())
    } else {
        CollaboratorError::Transport(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> CollaboratorError {
    let message = format!("HTTP {}: {}", status, body);
    match status.as_u16() {
        // Plans without access to an endpoint get 401/403; treat as no data.
        401 | 403 | 404 => CollaboratorError::NotFound(message),
        408 | 504 => CollaboratorError::Timeout(message),
        429 => CollaboratorError::RateLimited(message),
        _ => CollaboratorError::Transport(message),
    }
}

fn statement_value(statement: &HashMap<String, serde_json::Value>, key: &str) -> Option<f64> {
    statement.get(key).and_then(|v| v.get("value")).and_then(|v| v.as_f64())
}

// Response structures
#[derive(Debug, Deserialize)]
struct TickerListResponse {
    #[serde(default)]
    results: Vec<TickerListEntry>,
}

#[derive(Debug, Deserialize)]
struct TickerListEntry {
    ticker: String,
    name: Option<String>,
    primary_exchange: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelatedCompaniesResponse {
    #[serde(default)]
    results: Vec<RelatedCompany>,
}

#[derive(Debug, Deserialize)]
struct RelatedCompany {
    ticker: String,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    v: f64, // volume
}

#[derive(Debug, Deserialize)]
struct FinancialsResponse {
    #[serde(default)]
    results: Vec<FinancialResult>,
}

#[derive(Debug, Deserialize)]
struct FinancialResult {
    fiscal_period: String,
    fiscal_year: String,
    financials: FinancialStatements,
}

#[derive(Debug, Deserialize)]
struct FinancialStatements {
    #[serde(default)]
    income_statement: HashMap<String, serde_json::Value>,
    #[serde(default)]
    balance_sheet: HashMap<String, serde_json::Value>,
    #[serde(default)]
    cash_flow_statement: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    id: String,
    title: String,
    author: Option<String>,
    published_utc: String,
    article_url: String,
    description: Option<String>,
    keywords: Option<Vec<String>>,
    #[serde(default)]
    tickers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: TickerDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerDetails {
    pub ticker: String,
    pub name: String,
    pub market: String,
    pub locale: String,
    pub primary_exchange: Option<String>,
    #[serde(rename = "type")]
    pub ticker_type: Option<String>,
    pub active: bool,
    pub currency_name: Option<String>,
    pub market_cap: Option<f64>,
    pub sic_code: Option<String>,
    pub sic_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, ""),
            CollaboratorError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "plan"),
            CollaboratorError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::GATEWAY_TIMEOUT, ""),
            CollaboratorError::Timeout(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            CollaboratorError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            CollaboratorError::Transport(_)
        ));
    }

    #[test]
    fn test_statement_value() {
        let statement: HashMap<String, serde_json::Value> = serde_json::from_str(
            r#"{"revenues": {"value": 1250.5, "unit": "USD"}, "gross_profit": {"unit": "USD"}}"#,
        )
        .unwrap();
        assert_eq!(statement_value(&statement, "revenues"), Some(1250.5));
        assert_eq!(statement_value(&statement, "gross_profit"), None);
        assert_eq!(statement_value(&statement, "net_income_loss"), None);
    }

    #[test]
    fn test_ticker_details_parse() {
        let json = r#"{
            "results": {
                "ticker": "AAPL",
                "name": "Apple Inc.",
                "market": "stocks",
                "locale": "us",
                "primary_exchange": "XNAS",
                "type": "CS",
                "active": true,
                "currency_name": "usd",
                "market_cap": 2800000000000.0,
                "sic_code": "3571",
                "sic_description": "ELECTRONIC COMPUTERS"
            }
        }"#;
        let parsed: TickerDetailsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.sic_description.as_deref(), Some("ELECTRONIC COMPUTERS"));
        assert_eq!(parsed.results.market_cap, Some(2.8e12));
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_burst_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let started = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
