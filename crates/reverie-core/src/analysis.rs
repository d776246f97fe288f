//! Analysis result types and the remote backend contract.
//!
//! The analysis engine computes one of three kinds over a
//! caller-supplied entry set. The typed results, the cache-key
//! fingerprint, and the contract for the optional remote sentiment
//! collaborator all live here so implementations stay swappable.

use crate::error::{Result, ReverieError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Confidence attached to locally computed sentiment. Deliberately
/// lower than [`REMOTE_SENTIMENT_CONFIDENCE`].
pub const LOCAL_SENTIMENT_CONFIDENCE: f64 = 0.6;
/// Confidence attached to remote-computed sentiment.
pub const REMOTE_SENTIMENT_CONFIDENCE: f64 = 0.85;
/// Confidence attached to local pattern and trend statistics.
pub const LOCAL_STATS_CONFIDENCE: f64 = 0.8;

/// Inclusive time range an analysis was scoped to, if any.
pub type TimeRange = (DateTime<Utc>, DateTime<Utc>);

/// The three analysis kinds the engine can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Sentiment,
    Patterns,
    Trends,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Sentiment => "sentiment",
            AnalysisKind::Patterns => "patterns",
            AnalysisKind::Trends => "trends",
        }
    }
}

/// Which path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Remote,
    Local,
}

/// Sentiment classification shared by the local heuristic and the
/// remote response schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// Per-entry sentiment classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySentiment {
    pub entry_id: String,
    pub sentiment: Sentiment,
    /// In [-1.0, 1.0]; 0.0 for ties.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentSummary {
    pub overall: Sentiment,
    /// Mean of per-entry scores.
    pub score: f64,
    pub per_entry: Vec<EntrySentiment>,
}

/// A recurring token across the entry set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub name: String,
    pub frequency: usize,
    /// Ids of the entries the token appears in.
    pub entry_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSummary {
    /// Up to ten recurring tokens, descending by frequency.
    pub patterns: Vec<Pattern>,
    /// Names of the top five tokens.
    pub top_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodTrendPoint {
    pub date: NaiveDate,
    pub mood: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmojiUsage {
    pub emoji: String,
    pub count: usize,
    /// count / total entry count.
    pub relative_frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSummary {
    /// Per-day dominant mood, ordered chronologically.
    pub mood_trends: Vec<MoodTrendPoint>,
    /// Writing histogram keyed by weekday name, Monday first.
    pub day_of_week_counts: Vec<(String, usize)>,
    /// Mode of the weekday histogram.
    pub most_active_day: String,
    /// Consecutive calendar days with at least one entry, walking
    /// backward from today.
    pub current_streak: u32,
    pub average_entries_per_week: f64,
    /// Emoji frequency table, descending by count.
    pub emoji_usage: Vec<EmojiUsage>,
}

/// Kind-specific analysis payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Sentiment(SentimentSummary),
    Patterns(PatternSummary),
    Trends(TrendSummary),
}

/// A completed analysis over one entry set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub outcome: AnalysisOutcome,
    pub confidence: f64,
    pub source: AnalysisSource,
    /// When this result was computed; identical for cache hits.
    pub computed_at: DateTime<Utc>,
    /// Size of the entry set the result was computed over.
    pub entry_count: usize,
}

impl AnalysisResult {
    pub fn kind(&self) -> AnalysisKind {
        match self.outcome {
            AnalysisOutcome::Sentiment(_) => AnalysisKind::Sentiment,
            AnalysisOutcome::Patterns(_) => AnalysisKind::Patterns,
            AnalysisOutcome::Trends(_) => AnalysisKind::Trends,
        }
    }
}

/// Cache key: analysis kind + optional time range + sorted entry ids,
/// digested to a SHA-256 hex string.
pub fn fingerprint(
    kind: AnalysisKind,
    time_range: Option<TimeRange>,
    entry_ids: &[&str],
) -> String {
    let mut sorted: Vec<&str> = entry_ids.to_vec();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b":");
    if let Some((start, end)) = time_range {
        hasher.update(start.timestamp_millis().to_le_bytes());
        hasher.update(end.timestamp_millis().to_le_bytes());
    }
    hasher.update(b":");
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update(b",");
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Sentiment payload returned by the remote collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSentiment {
    pub sentiment: Sentiment,
    pub score: f64,
}

impl RemoteSentiment {
    /// Rejects structurally valid but out-of-range payloads.
    pub fn validate(self) -> Result<Self> {
        if !self.score.is_finite() || !(-1.0..=1.0).contains(&self.score) {
            return Err(ReverieError::MalformedRemoteResponse(format!(
                "sentiment score out of range: {}",
                self.score
            )));
        }
        Ok(self)
    }
}

/// Contract for the optional remote text-analysis collaborator.
///
/// The engine never assumes a call succeeds: any error (transport,
/// credential, malformed payload) makes the caller fall back to the
/// local heuristic for that call only.
#[async_trait]
pub trait SentimentBackend: Send + Sync {
    /// Analyzes the overall sentiment of the given plaintext bodies.
    async fn analyze_sentiment(&self, texts: &[String]) -> Result<RemoteSentiment>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_id_order() {
        let a = fingerprint(AnalysisKind::Sentiment, None, &["b", "a", "c"]);
        let b = fingerprint(AnalysisKind::Sentiment, None, &["a", "c", "b"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_distinguishes_kind_and_range() {
        let ids = ["a", "b"];
        let base = fingerprint(AnalysisKind::Sentiment, None, &ids);
        assert_ne!(base, fingerprint(AnalysisKind::Patterns, None, &ids));
        let now = Utc::now();
        assert_ne!(
            base,
            fingerprint(AnalysisKind::Sentiment, Some((now, now)), &ids)
        );
    }

    #[test]
    fn test_remote_sentiment_validation() {
        let ok = RemoteSentiment {
            sentiment: Sentiment::Positive,
            score: 0.4,
        };
        assert!(ok.validate().is_ok());

        let bad = RemoteSentiment {
            sentiment: Sentiment::Positive,
            score: 2.0,
        };
        assert!(matches!(
            bad.validate(),
            Err(ReverieError::MalformedRemoteResponse(_))
        ));
    }

    #[test]
    fn test_remote_payload_schema() {
        let parsed: RemoteSentiment =
            serde_json::from_str(r#"{"sentiment":"negative","score":-0.3}"#).unwrap();
        assert_eq!(parsed.sentiment, Sentiment::Negative);
    }
}
