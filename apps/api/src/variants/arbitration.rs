//! Deterministic arbitration between the ideal and personalized variants.

use serde::{Deserialize, Serialize};

/// Which variant the comparison recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Ideal,
    Personalized,
    Blend,
}

/// Arbitration thresholds. The defaults are heuristic and uncalibrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationThresholds {
    /// Below this evidence strength the personalized variant is never preferred.
    pub min_evidence_strength: u32,
    /// Score gap (exclusive) that makes one variant a clear winner.
    pub decisive_margin: u32,
}

impl Default for ArbitrationThresholds {
    fn default() -> Self {
        Self {
            min_evidence_strength: 40,
            decisive_margin: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantComparison {
    pub recommendation: Recommendation,
    pub reason: String,
    /// `personalized.overall - ideal.overall`.
    pub score_difference: i64,
    pub evidence_strength: u32,
}

pub fn arbitrate(
    ideal_score: u32,
    personalized_score: u32,
    evidence_count: usize,
    evidence_strength: u32,
    thresholds: &ArbitrationThresholds,
) -> VariantComparison {
    let score_difference = personalized_score as i64 - ideal_score as i64;
    let margin = thresholds.decisive_margin as i64;

    let (recommendation, reason) = if evidence_count == 0 {
        (
            Recommendation::Ideal,
            "No evidence items were available; the industry-standard variant is the safe choice"
                .to_string(),
        )
    } else if evidence_strength < thresholds.min_evidence_strength {
        (
            Recommendation::Ideal,
            format!(
                "Evidence strength {evidence_strength} is below {}; the personalized variant is weakly grounded",
                thresholds.min_evidence_strength
            ),
        )
    } else if score_difference > margin {
        (
            Recommendation::Personalized,
            format!("Personalized variant scores {score_difference} points higher"),
        )
    } else if -score_difference > margin {
        (
            Recommendation::Ideal,
            format!("Ideal variant scores {} points higher", -score_difference),
        )
    } else {
        (
            Recommendation::Blend,
            format!(
                "Scores are within {margin} points; combine the ideal structure with your evidence"
            ),
        )
    };

    VariantComparison {
        recommendation,
        reason,
        score_difference,
        evidence_strength,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ideal: u32, personalized: u32, count: usize, strength: u32) -> Recommendation {
        arbitrate(
            ideal,
            personalized,
            count,
            strength,
            &ArbitrationThresholds::default(),
        )
        .recommendation
    }

    #[test]
    fn test_no_evidence_always_recommends_ideal() {
        assert_eq!(run(10, 95, 0, 0), Recommendation::Ideal);
    }

    #[test]
    fn test_weak_evidence_recommends_ideal() {
        assert_eq!(run(50, 90, 3, 39), Recommendation::Ideal);
    }

    #[test]
    fn test_decisive_margins() {
        assert_eq!(run(60, 71, 2, 40), Recommendation::Personalized);
        assert_eq!(run(71, 60, 2, 40), Recommendation::Ideal);
    }

    #[test]
    fn test_exact_margin_is_blend() {
        assert_eq!(run(60, 70, 2, 80), Recommendation::Blend);
        assert_eq!(run(70, 60, 2, 80), Recommendation::Blend);
        assert_eq!(run(65, 65, 2, 80), Recommendation::Blend);
    }

    #[test]
    fn test_comparison_reports_signed_difference() {
        let comparison = arbitrate(70, 55, 1, 90, &ArbitrationThresholds::default());
        assert_eq!(comparison.score_difference, -15);
        assert_eq!(comparison.evidence_strength, 90);

        let json = serde_json::to_value(&comparison).unwrap();
        assert_eq!(json["recommendation"], "ideal");
        assert_eq!(json["scoreDifference"], -15);
    }
}
