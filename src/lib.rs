//! conclave: multi-provider AI code review with quorum consensus.
//!
//! Given a unified diff and optional change metadata, conclave fans
//! the review out to every enabled provider concurrently, tolerates
//! individual failures and timeouts, and produces one deterministic
//! [`review::AggregatedResult`]: a consensus verdict, a deduplicated
//! issue list with multi-reporter severity escalation, and
//! per-provider observability data.
//!
//! ```no_run
//! use conclave::config::ReviewConfig;
//! use conclave::review::{ReviewContext, ReviewOrchestrator};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let orchestrator = ReviewOrchestrator::from_config(ReviewConfig::from_env());
//! let ctx = ReviewContext {
//!     repo_name: Some("conclave".into()),
//!     pr_title: Some("fix: tighten parser".into()),
//!     ..Default::default()
//! };
//! let result = orchestrator.run("--- a/src/lib.rs\n+++ b/src/lib.rs\n", &ctx, None).await?;
//! println!("{}", result.to_markdown());
//! # Ok(())
//! # }
//! ```
//!
//! Each invocation is stateless given its inputs: no historical review
//! data is persisted, and the result is built fresh every run.

pub mod config;
pub mod review;

pub use config::ReviewConfig;
pub use review::{AggregatedResult, ReviewContext, ReviewOrchestrator};
