//! Text generation via the Gemini `generateContent` API.
//!
//! Two entry points: chat replies grounded in the scraped page content, and
//! the search-grounded summary used when scraping a page fails. Both return
//! reply text plus an ordered list of citation sources (empty for plain
//! replies).

use crate::config::LlmConfig;
use crate::error::{ChatError, Result};
use crate::session::{GroundingSource, HistoryEntry, Role};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// A generated reply with optional citations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReply {
    pub text: String,
    /// Ordered citations; empty unless search grounding was used.
    pub grounding_sources: Vec<GroundingSource>,
}

/// Collaborator seam: the text-generation backend.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate a reply to `user_text` given the page content (empty when
    /// the scrape failed) and the prior transcript.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Generation`] on any backend failure. The turn
    /// aborts; no model message is appended.
    async fn generate_reply(
        &self,
        user_text: &str,
        page_context: &str,
        history: &[HistoryEntry],
    ) -> Result<GeneratedReply>;

    /// Summarize `url` using search grounding. Fallback path used only when
    /// the page scrape reported failure.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Generation`] on any backend failure.
    async fn generate_grounded_summary(&self, url: &str) -> Result<GeneratedReply>;
}

/// HTTP client for a Gemini-compatible `generateContent` endpoint.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    summary_model: String,
}

impl GeminiGenerator {
    /// Create a generator from config and a resolved API key.
    pub fn new(config: &LlmConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key,
            model: config.model.clone(),
            summary_model: config.summary_model.clone(),
        }
    }

    /// Same as [`GeminiGenerator::new`] but with an explicit base URL,
    /// used by tests pointing at a mock server.
    pub fn with_base_url(config: &LlmConfig, api_key: String, base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            ..Self::new(config, api_key)
        }
    }

    async fn call_generate(&self, model: &str, body: serde_json::Value) -> Result<GeneratedReply> {
        let url = format!("{}/models/{model}:generateContent", self.base_url);
        debug!("generateContent request to model {model}");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChatError::Generation(format!(
                "backend returned {status}: {detail}"
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Generation(format!("malformed response: {e}")))?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Generation("response had no candidates".into()))?;

        let text: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(ChatError::Generation("response had no text".into()));
        }

        let grounding_sources = candidate
            .grounding_metadata
            .map(|m| {
                m.grounding_chunks
                    .into_iter()
                    .filter_map(|c| c.web)
                    .map(|w| GroundingSource {
                        title: w.title.unwrap_or_else(|| w.uri.clone()),
                        uri: w.uri,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(GeneratedReply {
            text,
            grounding_sources,
        })
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

#[async_trait]
impl ReplyGenerator for GeminiGenerator {
    async fn generate_reply(
        &self,
        user_text: &str,
        page_context: &str,
        history: &[HistoryEntry],
    ) -> Result<GeneratedReply> {
        let mut contents: Vec<serde_json::Value> = history
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "role": role_name(entry.role),
                    "parts": [{ "text": entry.text }],
                })
            })
            .collect();
        contents.push(serde_json::json!({
            "role": "user",
            "parts": [{ "text": user_text }],
        }));

        let system = if page_context.is_empty() {
            "You are a helpful voice assistant discussing a web page with the user. \
             Keep answers short and conversational; they will be spoken aloud."
                .to_owned()
        } else {
            format!(
                "You are a helpful voice assistant discussing a web page with the user. \
                 Keep answers short and conversational; they will be spoken aloud. \
                 Answer using this page content:\n\n{page_context}"
            )
        };

        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": contents,
        });

        self.call_generate(&self.model, body).await
    }

    async fn generate_grounded_summary(&self, url: &str) -> Result<GeneratedReply> {
        let prompt = format!(
            "Briefly summarize the website at {url} in a couple of spoken sentences, \
             then invite the user to ask questions about it."
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "tools": [{ "google_search": {} }],
        });

        self.call_generate(&self.summary_model, body).await
    }
}

// -- Response wire format (the subset this crate reads) --

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroundingMetadata {
    #[serde(rename = "groundingChunks", default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: String,
    title: Option<String>,
}
