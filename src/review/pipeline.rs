//! Review orchestration: fan-out, fan-in, and result assembly.
//!
//! The orchestrator owns the registry and configuration, dispatches
//! the provider fan-out, and reduces the collected reviews to one
//! [`AggregatedResult`] through the consensus calculator and the issue
//! aggregator. Downstream collaborators (posting, formatting) consume
//! the result read-only.

use super::aggregate::aggregate_issues;
use super::consensus::calculate_consensus;
use super::dispatch::dispatch_reviews;
use super::registry::ProviderRegistry;
use super::types::{AggregatedResult, Consensus, IssueStats, ProviderSummary, Review, ReviewContext};
use crate::config::ReviewConfig;

/// Orchestrates a full multi-provider review run.
pub struct ReviewOrchestrator {
    registry: ProviderRegistry,
    config: ReviewConfig,
}

impl ReviewOrchestrator {
    /// Build the orchestrator with the default provider set derived
    /// from configuration.
    pub fn from_config(config: ReviewConfig) -> Self {
        Self {
            registry: ProviderRegistry::from_config(&config),
            config,
        }
    }

    /// Build with a caller-supplied registry (custom adapters, tests).
    pub fn with_registry(registry: ProviderRegistry, config: ReviewConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Run a review with the configured agreement threshold.
    ///
    /// `providers` overrides the enabled set when present. The only
    /// fatal error is the no-providers precondition; every
    /// provider-scoped failure is absorbed into the result.
    pub async fn run(
        &self,
        diff: &str,
        ctx: &ReviewContext,
        providers: Option<&[String]>,
    ) -> anyhow::Result<AggregatedResult> {
        self.run_with_threshold(diff, ctx, providers, self.config.agreement_threshold)
            .await
    }

    /// Run a review with an explicit agreement threshold override.
    pub async fn run_with_threshold(
        &self,
        diff: &str,
        ctx: &ReviewContext,
        providers: Option<&[String]>,
        threshold: f64,
    ) -> anyhow::Result<AggregatedResult> {
        let threshold = threshold.clamp(0.01, 1.0);
        let reviews = dispatch_reviews(
            &self.registry,
            diff,
            ctx,
            providers,
            self.config.provider_timeout(),
        )
        .await?;

        let consensus = calculate_consensus(&reviews, threshold);
        let aggregation = aggregate_issues(&reviews);
        let combined_summary = build_combined_summary(&consensus, &aggregation.stats, &reviews);

        tracing::info!(
            verdict = consensus.verdict.label(),
            agreement = consensus.agreement,
            voting = consensus.voting_count,
            total = consensus.total_count,
            issues = aggregation.stats.total,
            "Review run complete"
        );

        // dispatch_reviews returns reviews sorted by provider name, so
        // the summaries inherit that ordering.
        let providers = reviews.iter().map(ProviderSummary::from_review).collect();

        Ok(AggregatedResult {
            consensus,
            issues: aggregation.issues,
            issue_stats: aggregation.stats,
            providers,
            combined_summary,
        })
    }
}

/// Build the human-readable one-paragraph summary of the run.
fn build_combined_summary(
    consensus: &Consensus,
    stats: &IssueStats,
    reviews: &[Review],
) -> String {
    let failed = reviews.iter().filter(|r| r.error.is_some()).count();

    let mut summary = if consensus.voting_count == 0 {
        "No provider produced a usable vote; the run abstains.".to_string()
    } else if consensus.no_consensus {
        format!(
            "{} of {} provider(s) voted without reaching the agreement threshold; \
             defaulting to the most severe verdict present: {}.",
            consensus.voting_count,
            consensus.total_count,
            consensus.verdict.label(),
        )
    } else {
        format!(
            "{} of {} provider(s) voted; consensus is {} with {:.0}% agreement.",
            consensus.voting_count,
            consensus.total_count,
            consensus.verdict.label(),
            consensus.agreement * 100.0,
        )
    };

    if stats.total == 0 {
        summary.push_str(" No issues were reported.");
    } else {
        summary.push_str(&format!(" {} merged issue(s)", stats.total));
        let mut parts: Vec<String> = Vec::new();
        for (severity, count) in stats.by_severity.iter().rev() {
            parts.push(format!("{count} {}", severity.label()));
        }
        summary.push_str(&format!(" ({})", parts.join(", ")));
        if stats.escalated_count > 0 {
            summary.push_str(&format!(
                "; {} escalated by multi-provider agreement",
                stats.escalated_count
            ));
        }
        summary.push('.');
    }

    if failed > 0 {
        summary.push_str(&format!(" {failed} provider(s) failed to review."));
    }

    summary
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::adapter::{ProviderAdapter, ProviderKind};
    use crate::review::dispatch::DispatchError;
    use crate::review::types::Verdict;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct CannedProvider {
        id: &'static str,
        payload: &'static str,
    }

    #[async_trait]
    impl ProviderAdapter for CannedProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn model_name(&self) -> &str {
            "canned-model"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Local
        }

        async fn review(&self, _diff: &str, _ctx: &ReviewContext) -> anyhow::Result<String> {
            Ok(self.payload.to_string())
        }
    }

    fn orchestrator_with(providers: Vec<CannedProvider>) -> ReviewOrchestrator {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(Arc::new(provider));
        }
        ReviewOrchestrator::with_registry(registry, ReviewConfig::default())
    }

    #[tokio::test]
    async fn end_to_end_consensus_and_aggregation() {
        let orchestrator = orchestrator_with(vec![
            CannedProvider {
                id: "alpha",
                payload: r#"{"verdict": "approve", "confidence": 0.9,
                    "issues": [{"severity": "minor", "category": "style", "file": "src/lib.rs",
                                "line": 10, "title": "naming", "description": "rename this"}],
                    "summary": "fine"}"#,
            },
            CannedProvider {
                id: "beta",
                payload: r#"{"verdict": "approve", "confidence": 0.7,
                    "issues": [{"severity": "minor", "category": "style", "file": "src/lib.rs",
                                "line": 12, "title": "naming", "description": "bad identifier"}],
                    "summary": "fine too"}"#,
            },
            CannedProvider {
                id: "gamma",
                payload: r#"{"verdict": "needs_review", "confidence": 0.8, "issues": [],
                    "summary": "not sure"}"#,
            },
        ]);

        let result = orchestrator
            .run("+code", &ReviewContext::default(), None)
            .await
            .unwrap();

        // 2/3 approve clears the 0.6 default threshold.
        assert_eq!(result.consensus.verdict, Verdict::Approve);
        assert!(!result.consensus.no_consensus);
        assert_eq!(result.consensus.voting_count, 3);

        // The two style issues sit in the same 5-line window and merge,
        // then escalate minor -> major on two reporters.
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].reporter_count, 2);
        assert!(result.issues[0].escalated);

        assert_eq!(result.providers.len(), 3);
        let names: Vec<&str> = result.providers.iter().map(|p| p.provider.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);

        assert!(result.combined_summary.contains("consensus is approve"));

        // The result serializes to the documented shape.
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["consensus"]["verdict"], "approve");
    }

    #[tokio::test]
    async fn no_providers_is_fatal() {
        let orchestrator =
            ReviewOrchestrator::with_registry(ProviderRegistry::new(), ReviewConfig::default());
        let err = orchestrator
            .run("+code", &ReviewContext::default(), None)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<DispatchError>().is_some());
    }

    #[tokio::test]
    async fn half_failed_run_still_aggregates() {
        let orchestrator = orchestrator_with(vec![
            CannedProvider {
                id: "alpha",
                payload: r#"{"verdict": "provide_feedback", "confidence": 0.8, "summary": "meh"}"#,
            },
            CannedProvider {
                id: "broken",
                payload: "total nonsense, not json at all",
            },
        ]);

        let result = orchestrator
            .run("+code", &ReviewContext::default(), None)
            .await
            .unwrap();

        assert_eq!(result.consensus.voting_count, 1);
        assert_eq!(result.consensus.abstain_count, 1);
        assert_eq!(result.consensus.verdict, Verdict::ProvideFeedback);

        // The unusable opinion is retained, not dropped.
        let broken = result
            .providers
            .iter()
            .find(|p| p.provider == "broken")
            .unwrap();
        assert_eq!(broken.verdict, Verdict::Abstain);
    }

    #[tokio::test]
    async fn threshold_override_changes_outcome() {
        let orchestrator = orchestrator_with(vec![
            CannedProvider {
                id: "alpha",
                payload: r#"{"verdict": "approve", "confidence": 0.9, "summary": "a"}"#,
            },
            CannedProvider {
                id: "beta",
                payload: r#"{"verdict": "approve", "confidence": 0.9, "summary": "b"}"#,
            },
            CannedProvider {
                id: "gamma",
                payload: r#"{"verdict": "needs_review", "confidence": 0.9, "summary": "c"}"#,
            },
        ]);

        let strict = orchestrator
            .run_with_threshold("+code", &ReviewContext::default(), None, 0.9)
            .await
            .unwrap();
        assert!(strict.consensus.no_consensus);
        assert_eq!(strict.consensus.verdict, Verdict::NeedsReview);

        let lenient = orchestrator
            .run_with_threshold("+code", &ReviewContext::default(), None, 0.5)
            .await
            .unwrap();
        assert!(!lenient.consensus.no_consensus);
        assert_eq!(lenient.consensus.verdict, Verdict::Approve);
    }

    #[tokio::test]
    async fn explicit_selection_limits_the_run() {
        let orchestrator = orchestrator_with(vec![
            CannedProvider {
                id: "alpha",
                payload: r#"{"verdict": "approve", "confidence": 0.9, "summary": "a"}"#,
            },
            CannedProvider {
                id: "beta",
                payload: r#"{"verdict": "needs_review", "confidence": 0.9, "summary": "b"}"#,
            },
        ]);

        let selection = vec!["alpha".to_string()];
        let result = orchestrator
            .run("+code", &ReviewContext::default(), Some(&selection))
            .await
            .unwrap();
        assert_eq!(result.consensus.total_count, 1);
        assert_eq!(result.consensus.verdict, Verdict::Approve);
    }
}
