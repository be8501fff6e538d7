//! Provider adapter contract and failure classification.
//!
//! Every reviewer backend implements [`ProviderAdapter`]: given a diff
//! and a [`ReviewContext`], it makes at most one outbound call and
//! returns the model's raw text. All failure modes surface as `Err`
//! values that the dispatcher converts into non-voting reviews using
//! the adapter's own [`ProviderAdapter::classify_error`] rules, so new
//! providers can override matching without touching shared logic.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use super::types::{ReviewContext, Verdict};

// ── Provider kind ────────────────────────────────────────────────

/// Whether a provider needs cloud credentials or runs locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Hosted API requiring a credential at registry build time.
    Cloud,
    /// Local endpoint, usable without credentials.
    Local,
}

// ── Retry policy ─────────────────────────────────────────────────

/// Bounded exponential backoff applied only to rate-limited calls.
///
/// Retries are local to the adapter and invisible to the dispatcher's
/// join semantics; every other failure is terminal for the attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first call.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

// ── Adapter trait ────────────────────────────────────────────────

/// A pluggable review backend.
///
/// Implementations own request construction, authentication, and
/// vendor envelope extraction. They return the model's raw text; the
/// shared normalizer turns it into a [`super::types::Review`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique provider id (e.g. "claude", "gemini", "ollama").
    fn id(&self) -> &str;

    /// Vendor model identifier used by this adapter.
    fn model_name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Perform one review call and return the raw model text.
    ///
    /// Makes exactly one outbound network call, or zero if a local
    /// precondition check (e.g. missing credential) fails first.
    async fn review(&self, diff: &str, ctx: &ReviewContext) -> anyhow::Result<String>;

    /// Map an unstructured failure message to the error taxonomy.
    fn classify_error(&self, message: &str) -> Verdict {
        classify_error_text(message)
    }
}

// ── Error text classification ────────────────────────────────────

fn auth_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b401\b|\b403\b|unauthorized|forbidden|invalid.{0,8}key|credential|authentication")
            .expect("auth pattern is valid")
    })
}

fn network_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)connection|connect error|dns|network|unreachable|refused|reset by peer|broken pipe")
            .expect("network pattern is valid")
    })
}

fn rate_limit_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b429\b|rate.?limit|too many requests|quota exceeded|overloaded")
            .expect("rate limit pattern is valid")
    })
}

/// Default best-effort classifier from provider error text to the fixed
/// error taxonomy. Rate-limit signatures classify as `ErrorService`
/// here because a rate-limit error that reaches classification has
/// already exhausted its retries.
pub fn classify_error_text(message: &str) -> Verdict {
    if message.contains("timed out") || message.contains("timeout") {
        Verdict::ErrorTimeout
    } else if auth_pattern().is_match(message) {
        Verdict::ErrorAuth
    } else if network_pattern().is_match(message) {
        Verdict::ErrorNetwork
    } else {
        Verdict::ErrorService
    }
}

/// Whether an error body carries a transient rate-limit signature.
pub fn is_rate_limited(message: &str) -> bool {
    rate_limit_pattern().is_match(message)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_auth_errors() {
        assert_eq!(
            classify_error_text("API error 401 Unauthorized: bad key"),
            Verdict::ErrorAuth
        );
        assert_eq!(
            classify_error_text("missing ANTHROPIC_API_KEY credential"),
            Verdict::ErrorAuth
        );
        assert_eq!(
            classify_error_text("invalid x-api-key header"),
            Verdict::ErrorAuth
        );
    }

    #[test]
    fn classify_network_errors() {
        assert_eq!(
            classify_error_text("error sending request: connection refused"),
            Verdict::ErrorNetwork
        );
        assert_eq!(
            classify_error_text("dns error: failed to lookup host"),
            Verdict::ErrorNetwork
        );
    }

    #[test]
    fn classify_timeout_before_network() {
        // reqwest timeouts mention the connection too; timeout wins.
        assert_eq!(
            classify_error_text("operation timed out during connection"),
            Verdict::ErrorTimeout
        );
    }

    #[test]
    fn classify_unknown_as_service() {
        assert_eq!(
            classify_error_text("500 Internal Server Error"),
            Verdict::ErrorService
        );
    }

    #[test]
    fn rate_limit_signatures() {
        assert!(is_rate_limited("HTTP 429 Too Many Requests"));
        assert!(is_rate_limited("rate limit exceeded, retry later"));
        assert!(is_rate_limited("model overloaded"));
        assert!(!is_rate_limited("404 not found"));
    }

    #[test]
    fn retry_policy_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }
}
