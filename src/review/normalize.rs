//! Response normalization: raw provider text to a canonical [`Review`].
//!
//! Strict JSON parse first, then three fallback extractions in order:
//! a fenced block labeled `json`, any fenced block, and the first
//! balanced brace-delimited substring in the free text. When all of
//! them fail the raw text is kept as the review summary with an
//! abstain verdict: an opinion that cannot vote is still context.

use serde::Deserialize;

use super::types::{Issue, Review, Severity, Verdict};

/// Confidence assigned when output is present but unusable for
/// structured aggregation.
const UNPARSED_CONFIDENCE: f64 = 0.5;

/// Category assigned to issues that arrive without one.
const DEFAULT_CATEGORY: &str = "general";

// ── Wire payload ─────────────────────────────────────────────────

/// The JSON object providers are prompted to return.
#[derive(Debug, Deserialize)]
struct ProviderPayload {
    verdict: String,
    confidence: Option<f64>,
    #[serde(default)]
    issues: Vec<PayloadIssue>,
    summary: Option<String>,
    model: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayloadIssue {
    severity: Option<String>,
    category: Option<String>,
    file: Option<String>,
    line: Option<u32>,
    title: Option<String>,
    description: Option<String>,
    suggestion: Option<String>,
}

// ── Normalization ────────────────────────────────────────────────

/// Convert one provider's raw text into a canonical [`Review`].
///
/// Never fails: non-conforming output degrades to an abstain review
/// that carries the raw text as its summary.
pub fn normalize_review(provider: &str, model: &str, raw: &str, duration_ms: u64) -> Review {
    let Some(payload) = parse_payload(raw) else {
        tracing::debug!(provider, "Provider output not parseable as structured review");
        return Review {
            provider: provider.to_string(),
            model: model.to_string(),
            verdict: Verdict::Abstain,
            confidence: UNPARSED_CONFIDENCE,
            issues: Vec::new(),
            summary: raw.trim().to_string(),
            error: None,
            duration_ms,
        };
    };

    // parse_payload only returns payloads with a recognised verdict.
    let verdict = Verdict::parse_lenient(&payload.verdict).unwrap_or(Verdict::Abstain);
    let confidence = payload.confidence.unwrap_or(UNPARSED_CONFIDENCE).clamp(0.0, 1.0);

    let issues = payload
        .issues
        .into_iter()
        .map(|issue| coerce_issue(issue, provider, confidence))
        .collect();

    Review {
        provider: provider.to_string(),
        model: payload.model.unwrap_or_else(|| model.to_string()),
        verdict,
        confidence,
        issues,
        summary: payload.summary.unwrap_or_default(),
        error: payload.error,
        duration_ms,
    }
}

fn coerce_issue(issue: PayloadIssue, provider: &str, confidence: f64) -> Issue {
    let description = issue.description.unwrap_or_default();
    let title = issue
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| truncate_title(&description));

    Issue {
        severity: issue
            .severity
            .as_deref()
            .and_then(Severity::parse_lenient)
            .unwrap_or(Severity::Suggestion),
        category: issue
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        file: issue.file,
        line: issue.line,
        title,
        description,
        suggestion: issue.suggestion,
        provider: provider.to_string(),
        confidence,
    }
}

fn truncate_title(description: &str) -> String {
    let first_line = description.lines().next().unwrap_or_default().trim();
    if first_line.is_empty() {
        return "untitled issue".to_string();
    }
    let mut title: String = first_line.chars().take(80).collect();
    if first_line.chars().count() > 80 {
        title.push('…');
    }
    title
}

// ── Extraction fallbacks ─────────────────────────────────────────

/// Parse a payload from raw text, trying strict JSON first and then
/// the fallback extractions in order.
fn parse_payload(raw: &str) -> Option<ProviderPayload> {
    let candidates = [
        Some(raw.trim()),
        fenced_block(raw, true),
        fenced_block(raw, false),
        balanced_braces(raw),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Ok(payload) = serde_json::from_str::<ProviderPayload>(candidate) {
            // A payload with an unrecognised verdict is as unusable as
            // no payload at all; keep falling through.
            if Verdict::parse_lenient(&payload.verdict).is_some() {
                return Some(payload);
            }
        }
    }
    None
}

/// Extract the contents of a fenced code block. With `labeled` set,
/// only a block opened as ```json matches; otherwise any fence does,
/// skipping a language identifier line when present.
fn fenced_block(text: &str, labeled: bool) -> Option<&str> {
    let (open, skip_label_line) = if labeled {
        ("```json", false)
    } else {
        ("```", true)
    };

    let start = text.find(open)? + open.len();
    let body = &text[start..];
    let end = body.find("```")?;
    let mut block = body[..end].trim();

    if skip_label_line && !block.starts_with('{') {
        let newline = block.find('\n')?;
        block = block[newline + 1..].trim();
    }
    Some(block)
}

/// Find the first balanced brace-delimited substring, tracking string
/// literals and escapes so braces inside them do not count.
fn balanced_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_parses() {
        let raw = r#"{"verdict": "approve", "confidence": 0.9, "issues": [], "summary": "fine"}"#;
        let review = normalize_review("claude", "claude-sonnet-4-6", raw, 100);
        assert_eq!(review.verdict, Verdict::Approve);
        assert_eq!(review.confidence, 0.9);
        assert_eq!(review.summary, "fine");
        assert!(review.is_voting());
    }

    #[test]
    fn labeled_fence_parses() {
        let raw = "Here is my review:\n```json\n{\"verdict\": \"needs_review\", \"confidence\": 0.8, \"summary\": \"problems\"}\n```\nDone.";
        let review = normalize_review("gemini", "gemini-2.5-flash", raw, 100);
        assert_eq!(review.verdict, Verdict::NeedsReview);
    }

    #[test]
    fn plain_fence_parses() {
        let raw = "```\n{\"verdict\": \"comment_only\", \"confidence\": 0.7}\n```";
        let review = normalize_review("openai", "gpt-4o", raw, 100);
        assert_eq!(review.verdict, Verdict::CommentOnly);
    }

    #[test]
    fn plain_fence_skips_language_line() {
        let raw = "```javascript\n{\"verdict\": \"approve\", \"confidence\": 1.0}\n```";
        let review = normalize_review("openai", "gpt-4o", raw, 100);
        assert_eq!(review.verdict, Verdict::Approve);
    }

    #[test]
    fn braces_in_prose_parse() {
        let raw = "I think the change is risky. {\"verdict\": \"provide_feedback\", \"confidence\": 0.6, \"summary\": \"see issues\"} Hope that helps!";
        let review = normalize_review("claude", "claude-sonnet-4-6", raw, 100);
        assert_eq!(review.verdict, Verdict::ProvideFeedback);
    }

    #[test]
    fn braces_inside_strings_do_not_terminate() {
        let raw = r#"prefix {"verdict": "approve", "confidence": 0.9, "summary": "code uses {} braces"} suffix"#;
        let review = normalize_review("claude", "claude-sonnet-4-6", raw, 100);
        assert_eq!(review.verdict, Verdict::Approve);
        assert_eq!(review.summary, "code uses {} braces");
    }

    #[test]
    fn freeform_text_degrades_to_abstain() {
        let raw = "The diff looks mostly harmless but I could not finish my analysis.";
        let review = normalize_review("claude", "claude-sonnet-4-6", raw, 100);
        assert_eq!(review.verdict, Verdict::Abstain);
        assert_eq!(review.confidence, UNPARSED_CONFIDENCE);
        assert_eq!(review.summary, raw);
        assert!(!review.is_voting());
    }

    #[test]
    fn malformed_json_degrades_to_abstain() {
        let raw = r#"{"verdict": "approve", "confidence": "#;
        let review = normalize_review("claude", "claude-sonnet-4-6", raw, 100);
        assert_eq!(review.verdict, Verdict::Abstain);
        assert!(review.summary.contains("approve"));
    }

    #[test]
    fn unknown_verdict_degrades_to_abstain() {
        let raw = r#"{"verdict": "maybe", "confidence": 0.9}"#;
        let review = normalize_review("claude", "claude-sonnet-4-6", raw, 100);
        assert_eq!(review.verdict, Verdict::Abstain);
    }

    #[test]
    fn confidence_clamped() {
        let raw = r#"{"verdict": "approve", "confidence": 3.5}"#;
        let review = normalize_review("claude", "claude-sonnet-4-6", raw, 100);
        assert_eq!(review.confidence, 1.0);
    }

    #[test]
    fn issues_coerced_with_backref() {
        let raw = r#"{
            "verdict": "needs_review",
            "confidence": 0.8,
            "issues": [
                {"severity": "high", "category": "security", "file": "src/auth.rs", "line": 42,
                 "title": "Token leak", "description": "Token is logged", "suggestion": "Redact it"},
                {"description": "Something vague"}
            ],
            "summary": "two findings"
        }"#;
        let review = normalize_review("gemini", "gemini-2.5-flash", raw, 100);
        assert_eq!(review.issues.len(), 2);

        let first = &review.issues[0];
        assert_eq!(first.severity, Severity::Major);
        assert_eq!(first.provider, "gemini");
        assert_eq!(first.confidence, 0.8);
        assert_eq!(first.line, Some(42));

        let second = &review.issues[1];
        assert_eq!(second.severity, Severity::Suggestion);
        assert_eq!(second.category, "general");
        assert_eq!(second.title, "Something vague");
    }

    #[test]
    fn payload_model_overrides_fallback() {
        let raw = r#"{"verdict": "approve", "confidence": 0.9, "model": "gpt-4o-2024-11-20"}"#;
        let review = normalize_review("openai", "gpt-4o", raw, 100);
        assert_eq!(review.model, "gpt-4o-2024-11-20");
    }

    #[test]
    fn long_description_truncated_into_title() {
        let description = "x".repeat(200);
        let raw = format!(
            r#"{{"verdict": "comment_only", "confidence": 0.5, "issues": [{{"description": "{description}"}}]}}"#
        );
        let review = normalize_review("claude", "claude-sonnet-4-6", &raw, 100);
        assert!(review.issues[0].title.chars().count() <= 81);
        assert!(review.issues[0].title.ends_with('…'));
    }
}
