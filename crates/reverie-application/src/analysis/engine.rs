//! Hybrid analysis engine: caching, request coalescing, rate-limited
//! remote assistance with local fallback.
//!
//! State machine per cache key: `Uncached -> Pending -> Cached`. A
//! second request for a key while `Pending` awaits the same in-flight
//! shared computation instead of starting duplicate work, so at most
//! one computation (and one remote call) is ever in flight per
//! fingerprint.

use super::local::{local_patterns, local_sentiment, local_trends};
use super::rate_limit::RateLimiter;
use chrono::{Duration, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reverie_core::Entry;
use reverie_core::analysis::{
    AnalysisKind, AnalysisOutcome, AnalysisResult, AnalysisSource, LOCAL_SENTIMENT_CONFIDENCE,
    LOCAL_STATS_CONFIDENCE, REMOTE_SENTIMENT_CONFIDENCE, SentimentBackend, TimeRange, fingerprint,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Results expire from the cache after this many hours even if the
/// entry set is unchanged.
const CACHE_TTL_HOURS: i64 = 24;

type SharedComputation = Shared<BoxFuture<'static, AnalysisResult>>;

struct EngineInner {
    cache: RwLock<HashMap<String, AnalysisResult>>,
    pending: Mutex<HashMap<String, SharedComputation>>,
    limiter: RateLimiter,
    backend: Option<Arc<dyn SentimentBackend>>,
}

/// Computes sentiment, recurring-pattern, and trend statistics over a
/// caller-supplied entry set.
#[derive(Clone)]
pub struct AnalysisEngine {
    inner: Arc<EngineInner>,
}

impl AnalysisEngine {
    /// Engine without a remote collaborator: every kind runs locally.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Engine with a remote sentiment backend. Patterns and trends are
    /// still always computed locally.
    pub fn with_backend(backend: Arc<dyn SentimentBackend>) -> Self {
        Self::build(Some(backend))
    }

    fn build(backend: Option<Arc<dyn SentimentBackend>>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                cache: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                limiter: RateLimiter::new(),
                backend,
            }),
        }
    }

    /// Computes (or returns the cached) analysis of `kind` over the
    /// given entry set.
    ///
    /// A cache hit requires the same entry count as the cached
    /// computation and an age below the 24-hour TTL; otherwise the key
    /// is treated as uncached. Concurrent requests for the same
    /// fingerprint coalesce onto one in-flight computation and all
    /// receive the same result.
    pub async fn analyze(
        &self,
        kind: AnalysisKind,
        entries: &[Entry],
        time_range: Option<TimeRange>,
    ) -> AnalysisResult {
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let key = fingerprint(kind, time_range, &ids);

        if let Some(hit) = self.cache_lookup(&key, entries.len()).await {
            return hit;
        }

        let computation = {
            let mut pending = self.inner.pending.lock().await;
            if let Some(in_flight) = pending.get(&key) {
                in_flight.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let owned_entries = entries.to_vec();
                let owned_key = key.clone();
                let computation: SharedComputation = async move {
                    let result = compute(&inner, kind, &owned_entries).await;
                    inner
                        .cache
                        .write()
                        .await
                        .insert(owned_key.clone(), result.clone());
                    inner.pending.lock().await.remove(&owned_key);
                    result
                }
                .boxed()
                .shared();
                pending.insert(key, computation.clone());
                computation
            }
        };

        computation.await
    }

    /// Drops every cached result. Signaled by the storage orchestrator
    /// whenever the entry set changes.
    pub async fn invalidate_all(&self) {
        self.inner.cache.write().await.clear();
        tracing::debug!("analysis cache cleared");
    }

    /// Shifts every cached result's `computed_at` into the past, so
    /// TTL expiry is observable without waiting out wall-clock time.
    #[cfg(test)]
    async fn age_cached_results(&self, by: Duration) {
        let mut cache = self.inner.cache.write().await;
        for result in cache.values_mut() {
            result.computed_at = result.computed_at - by;
        }
    }

    async fn cache_lookup(&self, key: &str, entry_count: usize) -> Option<AnalysisResult> {
        let cache = self.inner.cache.read().await;
        let hit = cache.get(key)?;
        if hit.entry_count != entry_count {
            return None;
        }
        if Utc::now() - hit.computed_at > Duration::hours(CACHE_TTL_HOURS) {
            return None;
        }
        Some(hit.clone())
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}

async fn compute(inner: &EngineInner, kind: AnalysisKind, entries: &[Entry]) -> AnalysisResult {
    let (outcome, confidence, source) = match kind {
        AnalysisKind::Patterns => (
            AnalysisOutcome::Patterns(local_patterns(entries)),
            LOCAL_STATS_CONFIDENCE,
            AnalysisSource::Local,
        ),
        AnalysisKind::Trends => (
            AnalysisOutcome::Trends(local_trends(entries, Utc::now().date_naive())),
            LOCAL_STATS_CONFIDENCE,
            AnalysisSource::Local,
        ),
        AnalysisKind::Sentiment => compute_sentiment(inner, entries).await,
    };

    AnalysisResult {
        outcome,
        confidence,
        source,
        computed_at: Utc::now(),
        entry_count: entries.len(),
    }
}

/// Sentiment takes the remote path only when a backend is configured,
/// at least one entry is plaintext, and the rate limiter permits a
/// call. Ciphertext bodies are never sent off-device, and any remote
/// failure falls back to the local heuristic for this call only.
async fn compute_sentiment(
    inner: &EngineInner,
    entries: &[Entry],
) -> (AnalysisOutcome, f64, AnalysisSource) {
    let texts: Vec<String> = entries
        .iter()
        .filter_map(|e| e.body.as_plaintext())
        .map(str::to_string)
        .collect();

    if let Some(backend) = &inner.backend {
        if !texts.is_empty() && inner.limiter.acquire().await {
            match backend.analyze_sentiment(&texts).await {
                Ok(remote) => {
                    let mut summary = local_sentiment(entries);
                    summary.overall = remote.sentiment;
                    summary.score = remote.score;
                    return (
                        AnalysisOutcome::Sentiment(summary),
                        REMOTE_SENTIMENT_CONFIDENCE,
                        AnalysisSource::Remote,
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, "remote sentiment failed, using local heuristic");
                }
            }
        }
    }

    (
        AnalysisOutcome::Sentiment(local_sentiment(entries)),
        LOCAL_SENTIMENT_CONFIDENCE,
        AnalysisSource::Local,
    )
}
