use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use analysis_core::{
    fetch_with_retry, AnalysisError, Category, DataCollaborator, Headline, NewsArticle,
    NewsPayload, Producer, ProducerResult, ResultMetadata, RetryPolicy, RunContext,
    SentimentLabel, Symbol,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "wouldn't", "couldn't", "shouldn't", "hardly",
    "barely", "neither", "nor", "without",
];

const NEGATION_WINDOW: usize = 3;

const POSITIVE_WORDS: &[&str] = &[
    "bullish", "rally", "surge", "gain", "gains", "profit", "growth", "beat", "beats",
    "upgrade", "outperform", "strong", "positive", "rise", "rises", "increase",
    "breakthrough", "innovation", "success", "exceed", "exceeds", "momentum",
    "buy", "recommend", "optimistic", "record", "high", "advance",
    "dividend", "buyback", "repurchase", "accretive", "upside",
    "recovery", "rebound", "expansion", "robust", "accelerating",
    "overweight", "raised", "upgraded", "initiated",
    "reiterated", "outpacing", "tailwind",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "decline", "declines", "loss", "losses", "fall", "falls", "plunge", "crash", "miss",
    "misses", "downgrade", "underperform", "weak", "negative", "drop", "drops", "decrease",
    "concern", "concerns", "risk", "fail", "disappoint", "disappointing", "slump", "sell",
    "warning", "pessimistic", "low", "retreat", "fear", "trouble",
    "dilution", "dilutive", "headwind", "lawsuit", "litigation",
    "recall", "investigation", "probe", "default", "bankruptcy",
    "restructuring", "layoff", "layoffs", "downside", "overvalued", "bubble",
    "underweight", "lowered", "suspended", "downgraded",
];

/// Raw lexicon scores are squashed by tanh(raw / RAW_SCALE) into [-1, 1].
const RAW_SCALE: f64 = 3.0;
const MAX_HEADLINES: usize = 5;
const MIN_HALF_LIFE_HOURS: f64 = 12.0;
const MAX_HALF_LIFE_HOURS: f64 = 168.0;

/// News event type with importance weight for aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NewsEventType {
    Earnings,
    MergersAcq,
    Regulatory,
    AnalystAction,
    Management,
    Product,
    Legal,
    Macro,
    General,
}

impl NewsEventType {
    fn importance_weight(&self) -> f64 {
        match self {
            NewsEventType::Earnings => 2.0,
            NewsEventType::MergersAcq => 2.5,
            NewsEventType::Regulatory => 2.0,
            NewsEventType::AnalystAction => 1.5,
            NewsEventType::Management => 1.3,
            NewsEventType::Product => 1.2,
            NewsEventType::Legal => 1.5,
            NewsEventType::Macro => 0.8,
            NewsEventType::General => 1.0,
        }
    }
}

fn classify_event(title: &str, description: Option<&str>) -> NewsEventType {
    let text = format!("{} {}", title, description.unwrap_or("")).to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if any(&["earnings", "quarterly", "guidance", "eps"])
        || (text.contains("revenue") && any(&["beat", "miss", "report"]))
        || (text.contains("profit") && text.contains("quarter"))
    {
        NewsEventType::Earnings
    } else if any(&["acqui", "merger", "buyout", "takeover", "spinoff", "spin-off"]) {
        NewsEventType::MergersAcq
    } else if any(&["fda", "sec ", "sebi", "regulat", "approval", "antitrust", "compliance"]) {
        NewsEventType::Regulatory
    } else if any(&["upgrade", "downgrade", "price target", "initiat", "analyst", "rating"]) {
        NewsEventType::AnalystAction
    } else if any(&["ceo", "cfo", "board", "executive", "resign", "appoint"]) {
        NewsEventType::Management
    } else if any(&["launch", "product", "recall", "patent", "innovation"]) {
        NewsEventType::Product
    } else if any(&["lawsuit", "litigation", "settlement", "sued", "court", "indictment"]) {
        NewsEventType::Legal
    } else if any(&["fed ", "federal reserve", "interest rate", "inflation", "gdp", "unemployment"]) {
        NewsEventType::Macro
    } else {
        NewsEventType::General
    }
}

/// Lexicon score of one text: +1 per positive word, -1 per negative word,
/// flipped when a negation word sits within `NEGATION_WINDOW` words before it.
fn analyze_text(text: &str) -> f64 {
    let text_lower = text.to_lowercase();
    let words: Vec<&str> = text_lower
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '.' | '!' | '?' | ':' | '"' | '(' | ')'))
        .filter(|w| !w.is_empty())
        .collect();

    let positive_set: HashSet<&str> = POSITIVE_WORDS.iter().copied().collect();
    let negative_set: HashSet<&str> = NEGATIVE_WORDS.iter().copied().collect();
    let negation_set: HashSet<&str> = NEGATION_WORDS.iter().copied().collect();

    let negation_positions: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(_, w)| negation_set.contains(*w))
        .map(|(i, _)| i)
        .collect();

    let mut score: i32 = 0;
    for (i, word) in words.iter().enumerate() {
        let is_positive = positive_set.contains(*word);
        let is_negative = negative_set.contains(*word);
        if !is_positive && !is_negative {
            continue;
        }

        let negated = negation_positions
            .iter()
            .any(|&neg_pos| neg_pos < i && (i - neg_pos) <= NEGATION_WINDOW);

        if is_positive {
            score += if negated { -1 } else { 1 };
        } else {
            score += if negated { 1 } else { -1 };
        }
    }

    score as f64
}

/// Title counts double, keywords half.
fn raw_article_score(article: &NewsArticle) -> f64 {
    let mut total = analyze_text(&article.title) * 2.0;
    if let Some(desc) = &article.description {
        total += analyze_text(desc);
    }
    for keyword in &article.keywords {
        total += analyze_text(keyword) * 0.5;
    }
    total
}

/// Articles tagged with the ticker outweigh peripheral mentions.
fn entity_weight(article: &NewsArticle, ticker: &str) -> f64 {
    let is_primary = article.tickers.iter().any(|t| t.eq_ignore_ascii_case(ticker));
    if is_primary {
        if article.tickers.len() <= 2 {
            1.5
        } else {
            1.2
        }
    } else {
        0.5
    }
}

/// Per-article tone in [-1, 1].
pub fn article_sentiment(article: &NewsArticle) -> f64 {
    (raw_article_score(article) / RAW_SCALE).tanh()
}

/// Weighted news tone for `ticker` as of `now`.
///
/// Weights combine an exponential recency decay (half-life a quarter of the
/// data span, clamped to 12h..1 week), an entity weight and the event's
/// importance. Headlines are the newest articles.
pub fn analyze_articles(
    ticker: &str,
    articles: &[NewsArticle],
    now: DateTime<Utc>,
) -> Result<NewsPayload, AnalysisError> {
    if articles.is_empty() {
        return Err(AnalysisError::InsufficientData(format!(
            "No news articles available for {}",
            ticker
        )));
    }

    let scores: Vec<f64> = articles.iter().map(article_sentiment).collect();

    let age_hours = |a: &NewsArticle| ((now - a.published_utc).num_minutes() as f64 / 60.0).max(0.0);
    let max_age_hours = articles.iter().map(age_hours).fold(0.0_f64, f64::max);
    let half_life_hours = (max_age_hours / 4.0).clamp(MIN_HALF_LIFE_HOURS, MAX_HALF_LIFE_HOURS);

    let mut total_score = 0.0;
    let mut total_weight = 0.0;
    let (mut positive, mut negative, mut neutral) = (0u32, 0u32, 0u32);

    for (article, &score) in articles.iter().zip(&scores) {
        let recency = 0.5_f64.powf(age_hours(article) / half_life_hours);
        let event = classify_event(&article.title, article.description.as_deref());
        let weight = recency * entity_weight(article, ticker) * event.importance_weight();
        total_score += score * weight;
        total_weight += weight;

        match SentimentLabel::from_score(score) {
            SentimentLabel::Positive => positive += 1,
            SentimentLabel::Negative => negative += 1,
            SentimentLabel::Neutral => neutral += 1,
        }
    }

    let score = if total_weight > 0.0 {
        (total_score / total_weight).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let label = SentimentLabel::from_score(score);

    let mut ordered: Vec<(&NewsArticle, f64)> = articles.iter().zip(scores.iter().copied()).collect();
    ordered.sort_by(|a, b| {
        b.0.published_utc
            .cmp(&a.0.published_utc)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    let headlines = ordered
        .into_iter()
        .take(MAX_HEADLINES)
        .map(|(a, s)| Headline {
            title: a.title.clone(),
            url: a.article_url.clone(),
            published_at: a.published_utc,
            sentiment: s,
        })
        .collect();

    let article_count = articles.len() as u32;
    let summary = format!(
        "{} articles: {} positive, {} negative, {} neutral; overall {}",
        article_count,
        positive,
        negative,
        neutral,
        label.as_str()
    );

    Ok(NewsPayload {
        score,
        label,
        article_count,
        positive,
        negative,
        neutral,
        headlines,
        summary,
    })
}

pub struct SentimentProducer {
    news: Arc<dyn DataCollaborator<Raw = Vec<NewsArticle>>>,
    retry: RetryPolicy,
}

impl SentimentProducer {
    pub fn new(news: Arc<dyn DataCollaborator<Raw = Vec<NewsArticle>>>, retry: RetryPolicy) -> Self {
        Self { news, retry }
    }
}

#[async_trait]
impl Producer for SentimentProducer {
    type Payload = NewsPayload;

    async fn analyze(&self, symbol: &Symbol, context: &RunContext) -> ProducerResult<NewsPayload> {
        let started = Instant::now();
        let (fetched, attempts) =
            fetch_with_retry(&self.retry, "news", || self.news.fetch(symbol)).await;
        let metadata = ResultMetadata::new(Category::News, &symbol.ticker, self.news.source())
            .with_attempts(attempts);

        let result = match fetched {
            Ok(articles) => {
                tracing::debug!("Scoring {} articles for {}", articles.len(), symbol.ticker);
                match analyze_articles(&symbol.ticker, &articles, context.started_at) {
                    Ok(payload) => ProducerResult::validated(payload, metadata),
                    Err(e) => ProducerResult::from_analysis_error(&e, metadata),
                }
            }
            Err(e) => {
                tracing::warn!("News fetch for {} failed: {}", symbol.ticker, e);
                ProducerResult::from_collaborator_error(&e, metadata)
            }
        };
        result.with_elapsed_ms(started.elapsed().as_millis() as u64)
    }

    fn source(&self) -> &str {
        self.news.source()
    }
}
