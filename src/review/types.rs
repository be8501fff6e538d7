//! Core data model for a multi-provider review run.
//!
//! A run produces one [`Review`] per provider attempt, reduces the set
//! to a single [`Consensus`] verdict, merges near-duplicate findings
//! into [`MergedIssue`] records, and packages everything as one
//! immutable [`AggregatedResult`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Verdict ──────────────────────────────────────────────────────

/// A provider's categorical judgment of a change.
///
/// Voting variants are declared most severe first; the non-voting
/// variants (`Abstain` and the `Error*` kinds) never contribute to the
/// consensus vote count but are retained for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Security findings that must block the change.
    CriticalVulnerabilities,
    /// Substantive problems, human review required.
    NeedsReview,
    /// Actionable feedback worth addressing before merge.
    ProvideFeedback,
    /// Informational comments only.
    CommentOnly,
    /// No issues found.
    Approve,
    /// Provider produced no usable structured opinion.
    Abstain,
    /// Provider call exceeded its timeout.
    ErrorTimeout,
    /// Network-level failure reaching the provider.
    ErrorNetwork,
    /// Missing or rejected credentials.
    ErrorAuth,
    /// Any other provider-side failure.
    ErrorService,
}

/// Voting verdicts ordered by severity, most severe first. Used for the
/// no-consensus fallback tie-break.
pub const SEVERITY_ORDER: [Verdict; 5] = [
    Verdict::CriticalVulnerabilities,
    Verdict::NeedsReview,
    Verdict::ProvideFeedback,
    Verdict::CommentOnly,
    Verdict::Approve,
];

/// Verdicts in the order the threshold pass checks them. Reaching
/// agreement on approval requires the supermajority first; the ordering
/// is deliberately not the severity ordering.
pub const THRESHOLD_ORDER: [Verdict; 4] = [
    Verdict::Approve,
    Verdict::CommentOnly,
    Verdict::ProvideFeedback,
    Verdict::NeedsReview,
];

impl Verdict {
    /// Whether this verdict contributes to the consensus vote count.
    pub fn is_voting(self) -> bool {
        matches!(
            self,
            Self::CriticalVulnerabilities
                | Self::NeedsReview
                | Self::ProvideFeedback
                | Self::CommentOnly
                | Self::Approve
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::CriticalVulnerabilities => "critical_vulnerabilities",
            Self::NeedsReview => "needs_review",
            Self::ProvideFeedback => "provide_feedback",
            Self::CommentOnly => "comment_only",
            Self::Approve => "approve",
            Self::Abstain => "abstain",
            Self::ErrorTimeout => "error_timeout",
            Self::ErrorNetwork => "error_network",
            Self::ErrorAuth => "error_auth",
            Self::ErrorService => "error_service",
        }
    }

    /// Lenient parse of verdict strings as providers actually emit them.
    ///
    /// Accepts the canonical snake_case labels plus the common aliases
    /// seen in model output (`request_changes`, `needs_work`, `comment`,
    /// `feedback`, `critical`). Returns `None` for anything else so the
    /// normalizer can fall through to its degrade path.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical_vulnerabilities" | "critical" => Some(Self::CriticalVulnerabilities),
            "needs_review" | "request_changes" | "needs_work" => Some(Self::NeedsReview),
            "provide_feedback" | "feedback" => Some(Self::ProvideFeedback),
            "comment_only" | "comment" => Some(Self::CommentOnly),
            "approve" | "approved" | "lgtm" => Some(Self::Approve),
            "abstain" => Some(Self::Abstain),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Issue severity ───────────────────────────────────────────────

/// Severity level for a single reported issue.
///
/// Declared ascending so the derived `Ord` makes `Critical` the
/// greatest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Optional improvement, not a defect.
    Suggestion,
    /// Should be addressed but not urgent.
    Minor,
    /// Important issue that should be fixed before merge.
    Major,
    /// Must-fix: correctness or security defect.
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Suggestion => "suggestion",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }

    /// Lenient parse covering the high/medium/low vocabulary some
    /// models use instead of the canonical labels.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "blocker" => Some(Self::Critical),
            "major" | "high" => Some(Self::Major),
            "minor" | "medium" => Some(Self::Minor),
            "suggestion" | "low" | "info" | "nit" => Some(Self::Suggestion),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Raw issue ────────────────────────────────────────────────────

/// A single issue reported by one provider, before deduplication.
///
/// Owned by its [`Review`] and never mutated; the aggregator produces
/// new [`MergedIssue`] records instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    /// Free-form category (e.g. security, logic, performance, style).
    pub category: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub title: String,
    pub description: String,
    pub suggestion: Option<String>,
    /// Provider that reported this issue.
    pub provider: String,
    /// That provider's overall confidence for the run.
    pub confidence: f64,
}

// ── Review ───────────────────────────────────────────────────────

/// One provider attempt, normalized to the common schema.
///
/// Immutable once constructed. Failure shapes carry a non-voting
/// verdict, zero confidence, and no issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub provider: String,
    pub model: String,
    pub verdict: Verdict,
    /// Self-reported confidence, clamped to 0.0 - 1.0.
    pub confidence: f64,
    pub issues: Vec<Issue>,
    pub summary: String,
    /// Populated only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl Review {
    /// Whether this review contributes a vote.
    pub fn is_voting(&self) -> bool {
        self.verdict.is_voting()
    }

    /// Build the review shape for a provider-scoped failure.
    pub fn failure(
        provider: &str,
        model: &str,
        verdict: Verdict,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            verdict,
            confidence: 0.0,
            issues: Vec::new(),
            summary: String::new(),
            error: Some(error.into()),
            duration_ms,
        }
    }

    /// Build the review shape for a timed-out provider call.
    pub fn timeout(provider: &str, model: &str, duration_ms: u64) -> Self {
        Self::failure(
            provider,
            model,
            Verdict::ErrorTimeout,
            format!("provider '{provider}' did not respond within the timeout"),
            duration_ms,
        )
    }
}

// ── Review context ───────────────────────────────────────────────

/// Metadata handed to every provider alongside the diff.
///
/// All fields are optional; absent values simply leave the provider
/// prompt without that section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewContext {
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub pr_title: Option<String>,
    #[serde(default)]
    pub pr_description: Option<String>,
    #[serde(default)]
    pub target_branch: Option<String>,
    #[serde(default)]
    pub file_count: Option<u32>,
    /// Hosting platform the change came from (e.g. "github", "gitlab").
    #[serde(default)]
    pub platform: Option<String>,
}

// ── Merged issue ─────────────────────────────────────────────────

/// A deduplicated issue backed by one or more provider reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedIssue {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub category: String,
    /// Most severe severity among the merged group, after escalation.
    pub severity: Severity,
    /// Title of the first occurrence.
    pub title: String,
    /// Distinct descriptions from all reporters, joined.
    pub description: String,
    /// First non-null suggestion among the group.
    pub suggestion: Option<String>,
    /// Distinct provider ids that reported this issue.
    pub reported_by: BTreeSet<String>,
    pub reporter_count: usize,
    /// Arithmetic mean of the contributing confidences.
    pub confidence: f64,
    /// Whether multi-reporter agreement bumped the severity.
    pub escalated: bool,
}

// ── Consensus ────────────────────────────────────────────────────

/// The single verdict derived from all providers' votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consensus {
    pub verdict: Verdict,
    /// Mean confidence of the reviews that voted for the verdict.
    pub confidence: f64,
    /// Winning vote count over the voting population.
    pub agreement: f64,
    pub voting_count: usize,
    pub abstain_count: usize,
    pub total_count: usize,
    /// Count per verdict observed in the run, non-voting included.
    pub verdict_counts: BTreeMap<Verdict, usize>,
    /// Set when no verdict reached the agreement threshold.
    pub no_consensus: bool,
}

// ── Issue statistics ─────────────────────────────────────────────

/// Summary statistics over the merged issue list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueStats {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub escalated_count: usize,
    /// Issues reported by two or more distinct providers.
    pub multi_reporter_count: usize,
}

// ── Provider summary ─────────────────────────────────────────────

/// Per-provider outcome retained in the aggregated result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub provider: String,
    pub model: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub issue_count: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderSummary {
    pub fn from_review(review: &Review) -> Self {
        Self {
            provider: review.provider.clone(),
            model: review.model.clone(),
            verdict: review.verdict,
            confidence: review.confidence,
            issue_count: review.issues.len(),
            duration_ms: review.duration_ms,
            error: review.error.clone(),
        }
    }
}

// ── Aggregated result ────────────────────────────────────────────

/// The sole externally visible output of a review run.
///
/// Built fresh each run and never updated in place. Serializes to the
/// `{consensus, issues, issue_stats, providers, combined_summary}`
/// shape consumed by the posting collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub consensus: Consensus,
    pub issues: Vec<MergedIssue>,
    pub issue_stats: IssueStats,
    /// Per-provider summaries, sorted by provider name.
    pub providers: Vec<ProviderSummary>,
    pub combined_summary: String,
}

impl AggregatedResult {
    /// Format the result as a markdown string for PR comment bodies.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("## Multi-Provider Review Consensus\n\n");
        md.push_str(&format!("**Verdict**: {}", self.consensus.verdict.label()));
        if self.consensus.no_consensus {
            md.push_str(" (no consensus reached)");
        }
        md.push_str(&format!(
            "\n\n**Agreement**: {:.0}% of {} voting provider(s) ({} total)\n\n",
            self.consensus.agreement * 100.0,
            self.consensus.voting_count,
            self.consensus.total_count,
        ));
        md.push_str(&format!("{}\n\n", self.combined_summary));

        if !self.issues.is_empty() {
            md.push_str("### Issues\n\n");
            md.push_str("| Severity | Category | Reporters | Description |\n");
            md.push_str("|----------|----------|-----------|-------------|\n");
            for issue in &self.issues {
                let location = match (&issue.file, issue.line) {
                    (Some(file), Some(line)) => format!(" (`{file}:{line}`)"),
                    (Some(file), None) => format!(" (`{file}`)"),
                    _ => String::new(),
                };
                let escalated = if issue.escalated { " ^" } else { "" };
                md.push_str(&format!(
                    "| {}{} | {} | {} | {}{} |\n",
                    issue.severity.label(),
                    escalated,
                    issue.category,
                    issue.reporter_count,
                    issue.title,
                    location,
                ));
            }
            if self.issue_stats.escalated_count > 0 {
                md.push_str("\n`^` severity escalated by multi-provider agreement\n");
            }
            md.push('\n');
        }

        md.push_str("### Providers\n\n");
        for p in &self.providers {
            match &p.error {
                Some(err) => md.push_str(&format!(
                    "- `{}` ({}): {} — {}\n",
                    p.provider,
                    p.model,
                    p.verdict.label(),
                    err,
                )),
                None => md.push_str(&format!(
                    "- `{}` ({}): {} with {} issue(s) in {}ms\n",
                    p.provider,
                    p.model,
                    p.verdict.label(),
                    p.issue_count,
                    p.duration_ms,
                )),
            }
        }

        md
    }
}

// ── Tests ────────────────────────────────────────────────────────
