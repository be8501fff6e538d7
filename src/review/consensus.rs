//! Consensus calculation over a set of reviews.
//!
//! State-free reduction from the full review set to one verdict. Two
//! orderings are in play and they are intentionally different: the
//! threshold pass checks approve first (agreement on approval needs
//! the supermajority), while the no-consensus fallback picks the most
//! severe verdict present (failing to agree defaults to caution).

use std::collections::BTreeMap;

use super::types::{Consensus, Review, Verdict, SEVERITY_ORDER, THRESHOLD_ORDER};

/// Reduce a review set to a single consensus outcome.
///
/// `threshold` is the vote share a verdict must reach; it applies only
/// when two or more reviews vote (a single voter is its own quorum).
/// A voting `critical_vulnerabilities` review decides the run
/// immediately: security findings are never outvoted.
pub fn calculate_consensus(reviews: &[Review], threshold: f64) -> Consensus {
    let total_count = reviews.len();
    let voting: Vec<&Review> = reviews.iter().filter(|r| r.is_voting()).collect();
    let voting_count = voting.len();
    let abstain_count = total_count - voting_count;

    let mut verdict_counts: BTreeMap<Verdict, usize> = BTreeMap::new();
    for review in reviews {
        *verdict_counts.entry(review.verdict).or_insert(0) += 1;
    }

    // No voting reviews: conservative default, never a silent approve.
    if voting.is_empty() {
        tracing::debug!(total = total_count, "No voting reviews; consensus abstains");
        return Consensus {
            verdict: Verdict::Abstain,
            confidence: 0.0,
            agreement: 0.0,
            voting_count,
            abstain_count,
            total_count,
            verdict_counts,
            no_consensus: true,
        };
    }

    let count_of = |verdict: Verdict| -> usize {
        voting.iter().filter(|r| r.verdict == verdict).count()
    };
    let mean_confidence = |verdict: Verdict| -> f64 {
        let members: Vec<f64> = voting
            .iter()
            .filter(|r| r.verdict == verdict)
            .map(|r| r.confidence)
            .collect();
        if members.is_empty() {
            0.0
        } else {
            members.iter().sum::<f64>() / members.len() as f64
        }
    };

    // Security-first override: any critical vote wins outright.
    let critical_votes = count_of(Verdict::CriticalVulnerabilities);
    if critical_votes > 0 {
        return Consensus {
            verdict: Verdict::CriticalVulnerabilities,
            confidence: mean_confidence(Verdict::CriticalVulnerabilities),
            agreement: critical_votes as f64 / voting_count as f64,
            voting_count,
            abstain_count,
            total_count,
            verdict_counts,
            no_consensus: false,
        };
    }

    // Threshold pass in the fixed priority order.
    for verdict in THRESHOLD_ORDER {
        let count = count_of(verdict);
        if count == 0 {
            continue;
        }
        let ratio = count as f64 / voting_count as f64;
        if ratio >= threshold {
            return Consensus {
                verdict,
                confidence: mean_confidence(verdict),
                agreement: ratio,
                voting_count,
                abstain_count,
                total_count,
                verdict_counts,
                no_consensus: false,
            };
        }
    }

    // No verdict reached threshold: fall back to the most severe
    // verdict present (severity ordering, not count).
    let fallback = SEVERITY_ORDER
        .into_iter()
        .find(|&verdict| count_of(verdict) > 0)
        .unwrap_or(Verdict::Abstain);

    Consensus {
        verdict: fallback,
        confidence: mean_confidence(fallback),
        agreement: count_of(fallback) as f64 / voting_count as f64,
        voting_count,
        abstain_count,
        total_count,
        verdict_counts,
        no_consensus: true,
    }
}

// ── Tests ────────────────────────────────────────────────────────
