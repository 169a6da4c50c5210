use std::env;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Single-shot `generateContent` caller. No retries and no client-side timeout.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_base: String,
    http: HttpClient,
}

impl GeminiClient {
    /// Uses `GEMINI_API_BASE` when set, otherwise the public endpoint.
    pub fn from_env() -> Result<Self> {
        let api_base = env::var("GEMINI_API_BASE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self::new(api_base)
    }

    pub fn new(api_base: impl Into<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(None)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::with_http(api_base, http))
    }

    pub fn with_http(api_base: impl Into<String>, http: HttpClient) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    pub fn generate_content(&self, api_key: &str, model: &str, payload: &Value) -> Result<Value> {
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, api_key)
            .json(payload)
            .send()
            .with_context(|| format!("Error calling API ({endpoint})"))?;

        let status = response.status();
        let body = response
            .text()
            .context("Gemini response body read failed")?;
        if !status.is_success() {
            bail!("API returned HTTP {}\nResponse: {body}", status.as_u16());
        }
        serde_json::from_str(&body).context("Gemini returned invalid JSON payload")
    }
}
