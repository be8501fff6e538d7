//! Runtime configuration for a review run.
//!
//! Credentials and knobs are read from the environment exactly once at
//! startup via [`ReviewConfig::from_env`]; the registry and adapters
//! consume the resulting struct and never touch the environment again.

use std::time::Duration;

use crate::review::adapter::RetryPolicy;

/// Default agreement threshold for the consensus vote.
pub const DEFAULT_AGREEMENT_THRESHOLD: f64 = 0.6;

/// Default per-provider call timeout in seconds.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;

/// Default retry attempts after the first rate-limited call.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 2;

/// Default base backoff delay in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Default local Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

// ── Review configuration ─────────────────────────────────────────

/// Configuration for the review orchestrator and its providers.
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    /// Vote share a verdict must reach to become the consensus.
    pub agreement_threshold: f64,
    /// Per-provider call timeout.
    pub provider_timeout_secs: u64,
    /// Retry attempt cap for rate-limited calls.
    pub retry_max_attempts: u32,
    /// Base backoff delay for rate-limit retries.
    pub retry_base_delay_ms: u64,

    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            agreement_threshold: DEFAULT_AGREEMENT_THRESHOLD,
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-6".into(),
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".into(),
            openai_api_key: None,
            openai_model: "gpt-4o".into(),
            ollama_url: DEFAULT_OLLAMA_URL.into(),
            ollama_model: "qwen2.5-coder:7b".into(),
        }
    }
}

impl ReviewConfig {
    /// Load configuration from environment variables.
    ///
    /// Credentials use the standard vendor variables; knobs use the
    /// `CONCLAVE_*` namespace. Unset or unparsable values fall back to
    /// the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            agreement_threshold: env_f64("CONCLAVE_AGREEMENT_THRESHOLD")
                .map(clamp_threshold)
                .unwrap_or(defaults.agreement_threshold),
            provider_timeout_secs: env_u64("CONCLAVE_PROVIDER_TIMEOUT_SECS")
                .filter(|&secs| secs > 0)
                .unwrap_or(defaults.provider_timeout_secs),
            retry_max_attempts: env_u64("CONCLAVE_RETRY_MAX_ATTEMPTS")
                .map(|n| n.min(10) as u32)
                .unwrap_or(defaults.retry_max_attempts),
            retry_base_delay_ms: env_u64("CONCLAVE_RETRY_BASE_DELAY_MS")
                .filter(|&ms| ms > 0)
                .unwrap_or(defaults.retry_base_delay_ms),
            anthropic_api_key: env_nonempty("ANTHROPIC_API_KEY"),
            anthropic_model: env_nonempty("CONCLAVE_CLAUDE_MODEL")
                .unwrap_or(defaults.anthropic_model),
            gemini_api_key: env_nonempty("GEMINI_API_KEY")
                .or_else(|| env_nonempty("GOOGLE_API_KEY")),
            gemini_model: env_nonempty("CONCLAVE_GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            openai_api_key: env_nonempty("OPENAI_API_KEY"),
            openai_model: env_nonempty("CONCLAVE_OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ollama_url: env_nonempty("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            ollama_model: env_nonempty("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
        }
    }

    /// Per-provider call timeout as a [`Duration`].
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Retry policy for rate-limited provider calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

fn clamp_threshold(value: f64) -> f64 {
    value.clamp(0.01, 1.0)
}

fn env_nonempty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn env_f64(var: &str) -> Option<f64> {
    std::env::var(var).ok()?.trim().parse().ok()
}

fn env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok()?.trim().parse().ok()
}

// ── Tests ────────────────────────────────────────────────────────
