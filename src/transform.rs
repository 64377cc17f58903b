//! Text Transformer collaborator: turns a feed entry into an opportunity
//! payload via the OpenAI Responses API.
//!
//! The model is forced into JSON-object output mode, but its reply is still
//! treated as untrusted: a reply that is not valid JSON degrades to an
//! empty [`RawOpportunity`], which the quality gate then rejects — a bad
//! model reply never crashes the run. Transport and HTTP failures are
//! errors, handled per-entry by the pipeline.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;

use crate::opportunity::RawOpportunity;

const DEFAULT_API_BASE: &str = "https://api.openai.com";

/// Character cap applied to the entry content embedded in the prompt,
/// keeping oversized articles from blowing up the request.
pub const CONTENT_CAP: usize = 6500;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Transformer returned status {status}: {detail}")]
    HttpStatus { status: u16, detail: String },
    #[error("Insecure API base URL: HTTPS required (except localhost for testing)")]
    InsecureApiBase,
}

/// The per-entry input handed to the transformer.
#[derive(Debug)]
pub struct TransformInput<'a> {
    pub title: &'a str,
    pub url: &'a str,
    pub content: &'a str,
    pub source_name: &'a str,
}

/// Client for the transformer API. Holds the credential for the lifetime of
/// the run; the key never appears in Debug output or logs.
pub struct Transformer {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base: String,
}

impl Transformer {
    /// Builds a transformer client.
    ///
    /// `base_url` overrides the official API endpoint (for tests and
    /// compatible servers). To keep the bearer token off the wire in
    /// cleartext, non-HTTPS bases are rejected except localhost.
    pub fn new(
        client: reqwest::Client,
        api_key: SecretString,
        model: &str,
        base_url: Option<&str>,
    ) -> Result<Self, TransformError> {
        let base = base_url.unwrap_or(DEFAULT_API_BASE);

        if !base.starts_with("https://") {
            let is_localhost =
                base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS transformer base URL");
                return Err(TransformError::InsecureApiBase);
            }
            tracing::warn!(base_url = %base, "Using non-HTTPS transformer base URL (localhost only)");
        }

        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// Asks the model to turn one entry into an opportunity payload.
    ///
    /// No timeout is applied here: only the feed fetch is time-bounded, the
    /// transform call is awaited for as long as the API takes.
    pub async fn transform(
        &self,
        input: &TransformInput<'_>,
    ) -> Result<RawOpportunity, TransformError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": build_prompt(input),
            "text": { "format": { "type": "json_object" } },
        });

        let response = self
            .client
            .post(format!("{}/v1/responses", self.base))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TransformError::HttpStatus {
                status: status.as_u16(),
                detail,
            });
        }

        let envelope: Value = response.json().await?;
        let text = envelope
            .pointer("/output/0/content/0/text")
            .and_then(Value::as_str)
            .unwrap_or("{}");

        Ok(serde_json::from_str(text).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Model reply was not a JSON object; degrading to empty payload");
            RawOpportunity::default()
        }))
    }
}

fn build_prompt(input: &TransformInput<'_>) -> String {
    format!(
        r#"You are an "Opportunity Radar" for readers hunting practical side income.
Task: turn the news item below into a money-making opportunity that can
realistically be acted on online or locally.
Answer with JSON only, following this schema:

{{
  "title": "the opportunity, phrased as a headline",
  "category": "Product Trend | Business Model | AI Tool | Cross-border | Risk/Regulation",
  "summary": "3-5 sentences, no guessing",
  "opportunity_score": 0,
  "risk_score": 0,
  "who_is_it_for": ["2-4 audiences this suits"],
  "how_to_start": ["4-6 concrete first steps"],
  "watch_out": ["2-4 caveats"],
  "keywords": ["5-10 keywords"],
  "confidence": 0.0
}}

Rules:
- If there is no realistic way to earn from it, keep confidence low and
  classify it as Risk/Regulation or a plain summary.
- opportunity_score is 0-10 and risk_score is 0-10.
- Never cite numbers or facts that are not in the content.

SOURCE: {source}
TITLE: {title}
URL: {url}
CONTENT:
{content}"#,
        source = input.source_name,
        title = input.title,
        url = input.url,
        content = truncate_chars(input.content, CONTENT_CAP),
    )
}

/// Truncates to at most `cap` chars without splitting a code point.
fn truncate_chars(s: &str, cap: usize) -> &str {
    match s.char_indices().nth(cap) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
