//! HTTP client for the remote text-analysis collaborator.
//!
//! The collaborator is treated as opaque: it takes a natural-language
//! prompt and returns structured text. This client builds the prompt,
//! enforces a conservative request timeout, and validates the returned
//! payload as well-formed JSON matching the sentiment schema. Every
//! failure maps to a recoverable error so the analysis engine can fall
//! back to its local heuristic.
//!
//! Configuration priority: explicit constructor > environment variables
//! (`REVERIE_ANALYSIS_API_KEY`, `REVERIE_ANALYSIS_URL`).

use async_trait::async_trait;
use reqwest::Client;
use reverie_core::analysis::{RemoteSentiment, SentimentBackend};
use reverie_core::error::{Result, ReverieError};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.reverie.app/v1/analyze";
const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote sentiment backend over HTTP.
#[derive(Clone)]
pub struct HttpSentimentClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl HttpSentimentClient {
    /// Creates a client with the provided API key and endpoint.
    ///
    /// Fails if the underlying HTTP client cannot be built; the request
    /// timeout is part of the contract, so there is no untimed
    /// fallback.
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .build()
            .map_err(|err| {
                ReverieError::internal(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }

    /// Loads configuration from environment variables.
    ///
    /// `REVERIE_ANALYSIS_API_KEY` is required; `REVERIE_ANALYSIS_URL`
    /// defaults to the hosted endpoint.
    pub fn try_from_env() -> Result<Self> {
        let api_key = env::var("REVERIE_ANALYSIS_API_KEY").map_err(|_| {
            ReverieError::RemoteUnavailable(
                "REVERIE_ANALYSIS_API_KEY not found in environment".into(),
            )
        })?;
        let endpoint =
            env::var("REVERIE_ANALYSIS_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.into());
        Self::new(api_key, endpoint)
    }

    async fn send_request(&self, body: &AnalyzeRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                ReverieError::RemoteUnavailable(format!("analysis request failed: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(ReverieError::RemoteUnavailable(format!(
                "analysis endpoint returned {status}: {body_text}"
            )));
        }

        let parsed: AnalyzeResponse = response.json().await.map_err(|err| {
            ReverieError::MalformedRemoteResponse(format!("response is not valid JSON: {err}"))
        })?;
        Ok(parsed.content)
    }
}

#[async_trait]
impl SentimentBackend for HttpSentimentClient {
    async fn analyze_sentiment(&self, texts: &[String]) -> Result<RemoteSentiment> {
        let request = AnalyzeRequest {
            prompt: build_sentiment_prompt(texts),
        };
        let content = self.send_request(&request).await?;
        parse_sentiment_content(&content)
    }
}

#[derive(Serialize)]
struct AnalyzeRequest {
    prompt: String,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    content: String,
}

/// Builds the natural-language prompt sent to the collaborator.
fn build_sentiment_prompt(texts: &[String]) -> String {
    let mut prompt = String::from(
        "Analyze the overall emotional sentiment of the following journal \
         entries. Respond with only a JSON object of the form \
         {\"sentiment\": \"positive\"|\"negative\"|\"neutral\", \"score\": number in [-1, 1]}.\n",
    );
    for (index, text) in texts.iter().enumerate() {
        prompt.push_str(&format!("\nEntry {}:\n{}\n", index + 1, text));
    }
    prompt
}

/// Parses and validates the structured text the collaborator returned.
fn parse_sentiment_content(content: &str) -> Result<RemoteSentiment> {
    let parsed: RemoteSentiment = serde_json::from_str(content.trim()).map_err(|err| {
        ReverieError::MalformedRemoteResponse(format!(
            "payload does not match sentiment schema: {err}"
        ))
    })?;
    parsed.validate()
}
