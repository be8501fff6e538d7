//! Concrete [`ProviderAdapter`] implementations.
//!
//! Each adapter wraps one review backend (Anthropic, Google Gemini,
//! OpenAI, or a local Ollama endpoint), owns its request construction
//! and authentication, and extracts the model text from the vendor
//! envelope. The shared normalizer handles everything after that.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use super::adapter::{is_rate_limited, ProviderAdapter, ProviderKind, RetryPolicy};
use super::types::ReviewContext;
use crate::config::ReviewConfig;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Default per-request HTTP timeout when not built from config.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

// ── Shared prompt ────────────────────────────────────────────────

/// Build the review prompt all providers share.
///
/// The JSON contract in the instructions matches the wire payload the
/// normalizer parses; context sections are included only when present.
pub(crate) fn build_review_prompt(diff: &str, ctx: &ReviewContext) -> String {
    let mut info = String::new();
    if let Some(repo) = &ctx.repo_name {
        info.push_str(&format!("Repository: {repo}\n"));
    }
    if let Some(title) = &ctx.pr_title {
        info.push_str(&format!("Title: {title}\n"));
    }
    if let Some(desc) = &ctx.pr_description {
        info.push_str(&format!("Description: {desc}\n"));
    }
    if let Some(branch) = &ctx.target_branch {
        info.push_str(&format!("Target branch: {branch}\n"));
    }
    if let Some(count) = ctx.file_count {
        info.push_str(&format!("Changed files: {count}\n"));
    }
    if let Some(platform) = &ctx.platform {
        info.push_str(&format!("Platform: {platform}\n"));
    }
    if info.is_empty() {
        info.push_str("(no additional context provided)\n");
    }

    format!(
        r#"You are an expert code reviewer evaluating a proposed change.

## Change Information
{info}
## Code Diff
```diff
{diff}
```

## Instructions
Review this change for correctness, security, performance, and quality.
Respond in EXACTLY this JSON format:

```json
{{
  "verdict": "critical_vulnerabilities" | "needs_review" | "provide_feedback" | "comment_only" | "approve",
  "confidence": 0.0,
  "issues": [
    {{
      "severity": "critical" | "major" | "minor" | "suggestion",
      "category": "security" | "logic" | "performance" | "style" | "documentation",
      "file": "path/to/file or null",
      "line": 123,
      "title": "short issue title",
      "description": "what the issue is",
      "suggestion": "how to fix it or null"
    }}
  ],
  "summary": "one-line summary of the change and your assessment"
}}
```

Use "critical_vulnerabilities" only for exploitable security defects.
Focus on substantive issues; skip trivial style nitpicks. If the code
is good, say so with an "approve" verdict."#
    )
}

// ── Shared HTTP helpers ──────────────────────────────────────────

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Send a request, retrying with exponential backoff only when the
/// response carries a rate-limit signature. Network errors and every
/// other failure status are terminal for this attempt.
pub(crate) async fn send_with_retry(
    build: impl Fn() -> reqwest::RequestBuilder,
    retry: &RetryPolicy,
    provider: &str,
) -> anyhow::Result<reqwest::Response> {
    let mut attempt: u32 = 0;
    loop {
        let resp = build().send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let transient = status.as_u16() == 429 || is_rate_limited(&body);
        if transient && attempt < retry.max_attempts {
            let delay = retry.delay_for(attempt);
            tracing::warn!(
                provider,
                status = status.as_u16(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, backing off before retry"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }

        anyhow::bail!("{provider} API error {status}: {body}");
    }
}

// ── Claude (Anthropic) ───────────────────────────────────────────

/// Review provider backed by the Anthropic messages API.
pub struct ClaudeProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl ClaudeProvider {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            client: build_client(DEFAULT_HTTP_TIMEOUT),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self {
            api_key: config.anthropic_api_key.clone(),
            model: config.anthropic_model.clone(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            client: build_client(config.provider_timeout()),
            retry: config.retry_policy(),
        }
    }

    /// Override the API base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeProvider {
    fn id(&self) -> &str {
        "claude"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    async fn review(&self, diff: &str, ctx: &ReviewContext) -> anyhow::Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            anyhow::bail!("missing ANTHROPIC_API_KEY credential for claude");
        };

        let prompt = build_review_prompt(diff, ctx);
        let payload = json!({
            "model": self.model,
            "max_tokens": 4096,
            "temperature": 0.2,
            "messages": [{ "role": "user", "content": prompt }]
        });

        let url = format!("{}/v1/messages", self.base_url);
        let resp = send_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("x-api-key", api_key)
                    .header("anthropic-version", "2023-06-01")
                    .header("content-type", "application/json")
                    .json(&payload)
            },
            &self.retry,
            self.id(),
        )
        .await?;

        let body: serde_json::Value = resp.json().await?;
        let text = body["content"][0]["text"].as_str().unwrap_or_default();
        if text.trim().is_empty() {
            anyhow::bail!("claude returned an empty response envelope");
        }
        Ok(text.to_string())
    }
}

// ── Gemini (Google) ──────────────────────────────────────────────

/// Review provider backed by the Google Gemini API.
pub struct GeminiProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
            client: build_client(DEFAULT_HTTP_TIMEOUT),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self {
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: GEMINI_BASE_URL.to_string(),
            client: build_client(config.provider_timeout()),
            retry: config.retry_policy(),
        }
    }

    /// Override the API base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
    fn id(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    async fn review(&self, diff: &str, ctx: &ReviewContext) -> anyhow::Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            anyhow::bail!("missing GEMINI_API_KEY credential for gemini");
        };

        let prompt = build_review_prompt(diff, ctx);
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.2,
                "maxOutputTokens": 4096,
                "responseMimeType": "application/json"
            }
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );
        let resp = send_with_retry(
            || self.client.post(&url).json(&payload),
            &self.retry,
            self.id(),
        )
        .await?;

        let body: serde_json::Value = resp.json().await?;
        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();
        if text.trim().is_empty() {
            anyhow::bail!("gemini returned an empty response envelope");
        }
        Ok(text.to_string())
    }
}

// ── OpenAI ───────────────────────────────────────────────────────

/// Review provider backed by the OpenAI chat completions API.
pub struct OpenAiProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
            client: build_client(DEFAULT_HTTP_TIMEOUT),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self {
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            base_url: OPENAI_BASE_URL.to_string(),
            client: build_client(config.provider_timeout()),
            retry: config.retry_policy(),
        }
    }

    /// Override the API base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn id(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    async fn review(&self, diff: &str, ctx: &ReviewContext) -> anyhow::Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            anyhow::bail!("missing OPENAI_API_KEY credential for openai");
        };

        let prompt = build_review_prompt(diff, ctx);
        let payload = json!({
            "model": self.model,
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
            "messages": [{ "role": "user", "content": prompt }]
        });

        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = send_with_retry(
            || {
                self.client
                    .post(&url)
                    .bearer_auth(api_key)
                    .json(&payload)
            },
            &self.retry,
            self.id(),
        )
        .await?;

        let body: serde_json::Value = resp.json().await?;
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();
        if text.trim().is_empty() {
            anyhow::bail!("openai returned an empty response envelope");
        }
        Ok(text.to_string())
    }
}

// ── Ollama (local) ───────────────────────────────────────────────

/// Review provider backed by a local Ollama endpoint.
///
/// Runs without credentials; usable whenever the endpoint answers.
pub struct OllamaProvider {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: String) -> Self {
        Self {
            model,
            base_url: base_url.into(),
            client: build_client(DEFAULT_HTTP_TIMEOUT),
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self {
            model: config.ollama_model.clone(),
            base_url: config.ollama_url.clone(),
            client: build_client(config.provider_timeout()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OllamaProvider {
    fn id(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn review(&self, diff: &str, ctx: &ReviewContext) -> anyhow::Result<String> {
        let prompt = build_review_prompt(diff, ctx);
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
            "format": "json",
            "options": { "temperature": 0.2 }
        });

        let url = format!("{}/api/chat", self.base_url);
        let resp = self.client.post(&url).json(&payload).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("ollama API error {status}: {body}");
        }

        let body: serde_json::Value = resp.json().await?;
        let text = body["message"]["content"].as_str().unwrap_or_default();
        if text.trim().is_empty() {
            anyhow::bail!("ollama returned an empty response envelope");
        }
        Ok(text.to_string())
    }
}

// ── Tests ────────────────────────────────────────────────────────
