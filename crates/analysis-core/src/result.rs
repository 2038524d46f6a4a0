use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AnalysisError, CollaboratorError};
use crate::payloads::Payload;
use crate::types::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Collaborator returned nothing usable
    DataUnavailable,
    /// Collaborator or run deadline exceeded
    Timeout,
    /// Data fetched but failed schema or invariant checks
    ValidationFailed,
    /// Producer task aborted unexpectedly
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::DataUnavailable => "data unavailable",
            FailureKind::Timeout => "timeout",
            FailureKind::ValidationFailed => "validation failed",
            FailureKind::Internal => "internal error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerFailure {
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub category: Category,
    pub symbol: String,
    pub source: String,
    /// Collaborator calls made; zero when the producer never reported back.
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl ResultMetadata {
    pub fn new(category: Category, symbol: &str, source: &str) -> Self {
        Self {
            category,
            symbol: symbol.to_string(),
            source: source.to_string(),
            attempts: 0,
            elapsed_ms: 0,
            completed_at: Utc::now(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}

/// A payload that passed [`Payload::validate`]. The only way to build one is
/// [`Validated::new`], and deserialization re-runs the same checks, so a
/// `Success` never carries a malformed payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Validated<T>(T);

impl<T: Payload> Validated<T> {
    pub fn new(payload: T) -> Result<Self, String> {
        payload.validate()?;
        Ok(Self(payload))
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Validated<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<'de, T: Payload> Deserialize<'de> for Validated<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let payload = T::deserialize(deserializer)?;
        Validated::new(payload).map_err(serde::de::Error::custom)
    }
}

/// Outcome of one producer for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[serde(bound(serialize = "T: Payload", deserialize = "T: Payload"))]
pub enum ProducerResult<T> {
    Success {
        payload: Validated<T>,
        metadata: ResultMetadata,
    },
    Failure {
        failure: ProducerFailure,
        metadata: ResultMetadata,
    },
}

impl<T: Payload> ProducerResult<T> {
    /// Wrap a freshly built payload, demoting it to `ValidationFailed` if it
    /// does not pass its checks.
    pub fn validated(payload: T, metadata: ResultMetadata) -> Self {
        match Validated::new(payload) {
            Ok(payload) => ProducerResult::Success { payload, metadata },
            Err(reason) => ProducerResult::failure(
                FailureKind::ValidationFailed,
                format!("payload rejected: {}", reason),
                metadata,
            ),
        }
    }

    pub fn failure(kind: FailureKind, reason: impl Into<String>, metadata: ResultMetadata) -> Self {
        ProducerResult::Failure {
            failure: ProducerFailure {
                kind,
                reason: reason.into(),
            },
            metadata,
        }
    }

    pub fn from_collaborator_error(err: &CollaboratorError, metadata: ResultMetadata) -> Self {
        ProducerResult::failure(err.kind(), err.to_string(), metadata)
    }

    pub fn from_analysis_error(err: &AnalysisError, metadata: ResultMetadata) -> Self {
        ProducerResult::failure(err.kind(), err.to_string(), metadata)
    }

    pub fn with_elapsed_ms(self, elapsed_ms: u64) -> Self {
        match self {
            ProducerResult::Success { payload, metadata } => ProducerResult::Success {
                payload,
                metadata: metadata.with_elapsed_ms(elapsed_ms),
            },
            ProducerResult::Failure { failure, metadata } => ProducerResult::Failure {
                failure,
                metadata: metadata.with_elapsed_ms(elapsed_ms),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProducerResult::Success { .. })
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            ProducerResult::Success { payload, .. } => Some(&payload.0),
            ProducerResult::Failure { .. } => None,
        }
    }

    pub fn failure_info(&self) -> Option<&ProducerFailure> {
        match self {
            ProducerResult::Success { .. } => None,
            ProducerResult::Failure { failure, .. } => Some(failure),
        }
    }

    pub fn metadata(&self) -> &ResultMetadata {
        match self {
            ProducerResult::Success { metadata, .. } | ProducerResult::Failure { metadata, .. } => {
                metadata
            }
        }
    }

    pub fn category(&self) -> Category {
        T::CATEGORY
    }

    pub fn outcome_label(&self) -> &'static str {
        match self {
            ProducerResult::Success { .. } => "success",
            ProducerResult::Failure { failure, .. } => failure.kind.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::{NewsPayload, SentimentLabel};

    fn news(score: f64) -> NewsPayload {
        NewsPayload {
            score,
            label: SentimentLabel::from_score(score),
            article_count: 2,
            positive: 1,
            negative: 0,
            neutral: 1,
            headlines: vec![],
            summary: "2 articles, mildly positive".to_string(),
        }
    }

    fn meta() -> ResultMetadata {
        ResultMetadata::new(Category::News, "AAPL", "test")
    }

    #[test]
    fn test_invalid_payload_becomes_failure() {
        let result = ProducerResult::validated(news(f64::NAN), meta());
        assert!(!result.is_success());
        assert_eq!(
            result.failure_info().map(|f| f.kind),
            Some(FailureKind::ValidationFailed)
        );
    }

    #[test]
    fn test_valid_payload_becomes_success() {
        let result = ProducerResult::validated(news(0.4), meta());
        assert!(result.is_success());
        assert_eq!(result.payload().map(|p| p.score), Some(0.4));
        assert_eq!(result.category(), Category::News);
    }

    #[test]
    fn test_deserialize_rejects_malformed_success() {
        let good = ProducerResult::validated(news(0.4), meta());
        let mut json: serde_json::Value = serde_json::to_value(&good).unwrap();
        json["payload"]["score"] = serde_json::json!(3.5);
        let parsed: Result<ProducerResult<NewsPayload>, _> = serde_json::from_value(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_tagged_layout() {
        let failed: ProducerResult<NewsPayload> =
            ProducerResult::failure(FailureKind::Timeout, "deadline", meta());
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["failure"]["kind"], "timeout");

        let back: ProducerResult<NewsPayload> = serde_json::from_value(json).unwrap();
        assert_eq!(back, failed);
    }
}
