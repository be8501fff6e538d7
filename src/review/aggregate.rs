//! Issue aggregation: merge near-duplicate findings across providers.
//!
//! Issues on the same file and category within a 5-line window are
//! treated as one underlying issue reported by different reviewers,
//! tolerating minor line-number disagreement between models. Raw
//! issues are never mutated; each aggregation run produces fresh
//! [`MergedIssue`] records.

use std::collections::{BTreeMap, BTreeSet};

use super::types::{Issue, IssueStats, MergedIssue, Review, Severity};

/// Line-window width for the grouping key.
const LINE_WINDOW: u32 = 5;

/// Separator between distinct descriptions of a merged issue.
const DESCRIPTION_SEPARATOR: &str = "\n\n";

/// Result of one aggregation pass.
#[derive(Debug, Clone)]
pub struct IssueAggregation {
    /// Merged issues, sorted by severity then reporter count.
    pub issues: Vec<MergedIssue>,
    pub stats: IssueStats,
}

/// Merge all issues across the review set into deduplicated entries,
/// escalate severities where providers agree, and compute summary
/// statistics.
pub fn aggregate_issues(reviews: &[Review]) -> IssueAggregation {
    // BTreeMap keeps group iteration deterministic; member order is
    // the stable review/issue order within each group.
    type GroupKey = (Option<String>, Option<u32>, String);
    let mut groups: BTreeMap<GroupKey, Vec<&Issue>> = BTreeMap::new();

    for review in reviews {
        for issue in &review.issues {
            let key = (
                issue.file.clone(),
                issue.line.map(|line| line / LINE_WINDOW),
                issue.category.clone(),
            );
            groups.entry(key).or_default().push(issue);
        }
    }

    let mut issues: Vec<MergedIssue> = groups.into_values().map(merge_group).collect();
    for issue in &mut issues {
        escalate(issue);
    }

    issues.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.reporter_count.cmp(&a.reporter_count))
            .then(a.file.cmp(&b.file))
            .then(a.line.cmp(&b.line))
            .then(a.title.cmp(&b.title))
    });

    let stats = compute_stats(&issues);
    IssueAggregation { issues, stats }
}

/// Merge one group of raw issues into a single record.
///
/// Severity takes the most severe member; title and suggestion take
/// the first occurrence; descriptions keep every distinct phrasing
/// since reviewers may explain the same defect differently.
fn merge_group(members: Vec<&Issue>) -> MergedIssue {
    let first = members[0];

    let severity = members
        .iter()
        .map(|issue| issue.severity)
        .max()
        .unwrap_or(first.severity);

    let mut descriptions: Vec<&str> = Vec::new();
    for issue in &members {
        let text = issue.description.trim();
        if !text.is_empty() && !descriptions.contains(&text) {
            descriptions.push(text);
        }
    }

    let suggestion = members
        .iter()
        .find_map(|issue| issue.suggestion.clone());

    let reported_by: BTreeSet<String> = members
        .iter()
        .map(|issue| issue.provider.clone())
        .collect();
    let reporter_count = reported_by.len();

    let confidence =
        members.iter().map(|issue| issue.confidence).sum::<f64>() / members.len() as f64;

    MergedIssue {
        file: first.file.clone(),
        line: first.line,
        category: first.category.clone(),
        severity,
        title: first.title.clone(),
        description: descriptions.join(DESCRIPTION_SEPARATOR),
        suggestion,
        reported_by,
        reporter_count,
        confidence,
        escalated: false,
    }
}

/// Bump severity when multiple independent providers agree.
///
/// One-shot and guarded by the `escalated` flag: for a fixed
/// `reported_by` set the severity never climbs more than one step, and
/// re-applying is a no-op.
fn escalate(issue: &mut MergedIssue) {
    if issue.escalated {
        return;
    }
    let bumped = match (issue.severity, issue.reporter_count) {
        (Severity::Minor, n) if n >= 2 => Some(Severity::Major),
        (Severity::Major, n) if n >= 2 => Some(Severity::Critical),
        _ => None,
    };
    if let Some(severity) = bumped {
        tracing::debug!(
            title = %issue.title,
            from = issue.severity.label(),
            to = severity.label(),
            reporters = issue.reporter_count,
            "Escalating merged issue"
        );
        issue.severity = severity;
        issue.escalated = true;
    }
}

fn compute_stats(issues: &[MergedIssue]) -> IssueStats {
    let mut stats = IssueStats {
        total: issues.len(),
        ..Default::default()
    };
    for issue in issues {
        *stats.by_severity.entry(issue.severity).or_insert(0) += 1;
        *stats
            .by_category
            .entry(issue.category.clone())
            .or_insert(0) += 1;
        if issue.escalated {
            stats.escalated_count += 1;
        }
        if issue.reporter_count >= 2 {
            stats.multi_reporter_count += 1;
        }
    }
    stats
}

// ── Tests ────────────────────────────────────────────────────────
