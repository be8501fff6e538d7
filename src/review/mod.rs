//! Multi-provider code review with quorum consensus.
//!
//! Dispatches one review request to several independent AI providers
//! in parallel, normalizes their heterogeneous responses into a common
//! schema, and reduces the set to a single explainable decision plus a
//! merged, deduplicated issue list.
//!
//! ## Architecture
//!
//! ```text
//!            ┌─▸ ClaudeProvider ──▸ raw text ─▸ Review ─┐
//! Registry ──┼─▸ GeminiProvider ──▸ raw text ─▸ Review ─┤
//! (enabled)  ├─▸ OpenAiProvider ──▸ raw text ─▸ Review ─┼─▸ AggregatedResult
//!            └─▸ OllamaProvider ──▸ raw text ─▸ Review ─┘
//!                 (fan-out, per-call timeout)    (fan-in: consensus
//!                                                 + issue merge)
//! ```
//!
//! Every provider task is isolated: a fault, slow response, or timeout
//! in one never affects another's execution or the final join. The
//! fan-in stage is a pure function of the collected review set, so
//! completion order has no effect on the result.
//!
//! ## Extension
//!
//! Add new backends by implementing [`ProviderAdapter`] and registering
//! them with [`ProviderRegistry::register`].

pub mod adapter;
pub mod aggregate;
pub mod consensus;
pub mod dispatch;
pub mod normalize;
pub mod pipeline;
pub mod providers;
pub mod registry;
pub mod types;

pub use adapter::{ProviderAdapter, ProviderKind, RetryPolicy};
pub use aggregate::{aggregate_issues, IssueAggregation};
pub use consensus::calculate_consensus;
pub use dispatch::{dispatch_reviews, DispatchError};
pub use normalize::normalize_review;
pub use pipeline::ReviewOrchestrator;
pub use providers::{ClaudeProvider, GeminiProvider, OllamaProvider, OpenAiProvider};
pub use registry::ProviderRegistry;
pub use types::{
    AggregatedResult, Consensus, Issue, IssueStats, MergedIssue, ProviderSummary, Review,
    ReviewContext, Severity, Verdict,
};
