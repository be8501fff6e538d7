//! Parallel dispatch: one timeout-wrapped task per provider, joined
//! unconditionally.
//!
//! No provider's success, failure, or timeout short-circuits the
//! others; the run returns once the slowest surviving call completes
//! or times out, because a late critical finding must still influence
//! the outcome. Results are sorted by provider id before return so
//! arrival order never leaks into the aggregation.

use futures_util::future::join_all;
use std::time::{Duration, Instant};

use super::normalize::normalize_review;
use super::registry::ProviderRegistry;
use super::types::{Review, ReviewContext, Verdict};

// ── Fatal precondition ───────────────────────────────────────────

/// Run-level failures raised before any provider call is attempted.
///
/// Provider-scoped failures never surface here; they become non-voting
/// reviews instead.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No providers enabled and none explicitly selected. Distinct
    /// from a provider-level failure: with zero reviewers there is no
    /// evidence to aggregate at all.
    #[error("no providers available for review")]
    NoProviders,
}

// ── Dispatcher ───────────────────────────────────────────────────

/// Fan out one review call per provider and collect every result.
///
/// `selection` overrides the registry's enabled set when present; an
/// explicitly selected id that does not resolve yields an error review
/// for that provider only. An empty effective list is the fatal
/// [`DispatchError::NoProviders`] precondition.
pub async fn dispatch_reviews(
    registry: &ProviderRegistry,
    diff: &str,
    ctx: &ReviewContext,
    selection: Option<&[String]>,
    timeout: Duration,
) -> Result<Vec<Review>, DispatchError> {
    let requested: Vec<String> = match selection {
        Some(ids) => ids.to_vec(),
        None => registry.enabled(),
    };
    if requested.is_empty() {
        return Err(DispatchError::NoProviders);
    }

    tracing::info!(
        providers = ?requested,
        timeout_secs = timeout.as_secs(),
        "Dispatching review fan-out"
    );

    let tasks = requested.iter().map(|id| {
        let adapter = registry.resolve(id);
        let id = id.clone();
        async move {
            let Some(adapter) = adapter else {
                tracing::warn!(provider = %id, "Requested provider is not registered");
                return Review::failure(
                    &id,
                    "unknown",
                    Verdict::ErrorService,
                    format!("provider '{id}' is not registered"),
                    0,
                );
            };

            let started = Instant::now();
            match tokio::time::timeout(timeout, adapter.review(diff, ctx)).await {
                Ok(Ok(raw)) => {
                    let review =
                        normalize_review(&id, adapter.model_name(), &raw, elapsed_ms(started));
                    tracing::info!(
                        provider = %id,
                        verdict = review.verdict.label(),
                        issues = review.issues.len(),
                        duration_ms = review.duration_ms,
                        "Review completed"
                    );
                    review
                }
                Ok(Err(e)) => {
                    let message = e.to_string();
                    let verdict = adapter.classify_error(&message);
                    tracing::warn!(
                        provider = %id,
                        verdict = verdict.label(),
                        error = %message,
                        "Provider review failed"
                    );
                    Review::failure(&id, adapter.model_name(), verdict, message, elapsed_ms(started))
                }
                Err(_) => {
                    tracing::warn!(
                        provider = %id,
                        timeout_secs = timeout.as_secs(),
                        "Provider review timed out"
                    );
                    Review::timeout(&id, adapter.model_name(), elapsed_ms(started))
                }
            }
        }
    });

    let mut reviews = join_all(tasks).await;
    reviews.sort_by(|a, b| a.provider.cmp(&b.provider));
    Ok(reviews)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u64::MAX as u128) as u64
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::adapter::{ProviderAdapter, ProviderKind};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Test adapter returning a canned payload after an optional delay.
    struct FakeProvider {
        id: &'static str,
        payload: String,
        delay: Duration,
        fail_with: Option<String>,
    }

    impl FakeProvider {
        fn approving(id: &'static str) -> Self {
            Self {
                id,
                payload: r#"{"verdict": "approve", "confidence": 0.9, "summary": "ok"}"#.into(),
                delay: Duration::ZERO,
                fail_with: None,
            }
        }

        fn slow(id: &'static str, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::approving(id)
            }
        }

        fn failing(id: &'static str, message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Self::approving(id)
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for FakeProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn model_name(&self) -> &str {
            "fake-model"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Local
        }

        async fn review(&self, _diff: &str, _ctx: &ReviewContext) -> anyhow::Result<String> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(message) = &self.fail_with {
                anyhow::bail!("{message}");
            }
            Ok(self.payload.clone())
        }
    }

    fn registry_with(providers: Vec<FakeProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(Arc::new(provider));
        }
        registry
    }

    #[tokio::test]
    async fn empty_provider_list_is_fatal() {
        let registry = ProviderRegistry::new();
        let err = dispatch_reviews(
            &registry,
            "+code",
            &ReviewContext::default(),
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DispatchError::NoProviders));
    }

    #[tokio::test]
    async fn explicit_empty_selection_is_fatal() {
        let registry = registry_with(vec![FakeProvider::approving("alpha")]);
        let err = dispatch_reviews(
            &registry,
            "+code",
            &ReviewContext::default(),
            Some(&[]),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DispatchError::NoProviders));
    }

    #[tokio::test]
    async fn all_enabled_providers_report() {
        let registry = registry_with(vec![
            FakeProvider::approving("alpha"),
            FakeProvider::approving("beta"),
        ]);
        let reviews = dispatch_reviews(
            &registry,
            "+code",
            &ReviewContext::default(),
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(reviews.len(), 2);
        assert!(reviews.iter().all(|r| r.verdict == Verdict::Approve));
    }

    #[tokio::test]
    async fn timeout_scopes_to_one_provider() {
        let registry = registry_with(vec![
            FakeProvider::approving("fast"),
            FakeProvider::slow("laggard", Duration::from_millis(300)),
        ]);
        let reviews = dispatch_reviews(
            &registry,
            "+code",
            &ReviewContext::default(),
            None,
            Duration::from_millis(50),
        )
        .await
        .unwrap();

        assert_eq!(reviews.len(), 2);
        let fast = reviews.iter().find(|r| r.provider == "fast").unwrap();
        assert_eq!(fast.verdict, Verdict::Approve);

        let slow = reviews.iter().find(|r| r.provider == "laggard").unwrap();
        assert_eq!(slow.verdict, Verdict::ErrorTimeout);
        assert!(slow.error.is_some());
    }

    #[tokio::test]
    async fn failure_classified_by_adapter() {
        let registry = registry_with(vec![FakeProvider::failing(
            "broken",
            "API error 401 Unauthorized",
        )]);
        let reviews = dispatch_reviews(
            &registry,
            "+code",
            &ReviewContext::default(),
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(reviews[0].verdict, Verdict::ErrorAuth);
        assert_eq!(reviews[0].confidence, 0.0);
    }

    #[tokio::test]
    async fn unknown_selected_provider_yields_error_review() {
        let registry = registry_with(vec![FakeProvider::approving("alpha")]);
        let selection = vec!["alpha".to_string(), "ghost".to_string()];
        let reviews = dispatch_reviews(
            &registry,
            "+code",
            &ReviewContext::default(),
            Some(&selection),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(reviews.len(), 2);
        let ghost = reviews.iter().find(|r| r.provider == "ghost").unwrap();
        assert_eq!(ghost.verdict, Verdict::ErrorService);
        assert!(ghost.error.as_deref().unwrap().contains("not registered"));

        let alpha = reviews.iter().find(|r| r.provider == "alpha").unwrap();
        assert_eq!(alpha.verdict, Verdict::Approve);
    }

    #[tokio::test]
    async fn results_sorted_by_provider_regardless_of_completion_order() {
        let registry = registry_with(vec![
            FakeProvider::slow("aardvark", Duration::from_millis(40)),
            FakeProvider::approving("zebra"),
        ]);
        let reviews = dispatch_reviews(
            &registry,
            "+code",
            &ReviewContext::default(),
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        let ids: Vec<&str> = reviews.iter().map(|r| r.provider.as_str()).collect();
        assert_eq!(ids, vec!["aardvark", "zebra"]);
    }
}
