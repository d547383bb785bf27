//! Internal risk scorer
//!
//! A fixed logistic model over the profile. Returns the probability that
//! the customer is low-risk and names the two strongest factors.

use super::RiskScorer;
use crate::models::{CustomerProfile, RiskAssessment};
use crate::Result;
use async_trait::async_trait;

pub const NEUTRAL_SAFETY: f64 = 0.50;

/// Neutral assessment used when scoring is unavailable
pub fn neutral_risk() -> RiskAssessment {
    RiskAssessment {
        safety_probability: NEUTRAL_SAFETY,
        explanation: "model unavailable".to_string(),
    }
}

const INTERCEPT: f64 = 0.9;
const REFERENCE_INCOME: f64 = 50_000.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicRiskScorer;

struct Factor {
    label: &'static str,
    contribution: f64,
}

fn factors(profile: &CustomerProfile) -> Vec<Factor> {
    let income = profile.monthly_income as f64;
    let income_term = if income > 0.0 {
        (0.8 * (income / REFERENCE_INCOME).ln()).clamp(-2.0, 2.0)
    } else {
        -2.0
    };

    let annual_income = (income * 12.0).max(1.0);
    let exposure = profile.pre_approved_limit as f64 / annual_income;

    vec![
        Factor {
            label: "monthly income",
            contribution: income_term,
        },
        Factor {
            label: "pre-approved limit relative to income",
            contribution: (-1.2 * (exposure - 0.5)).clamp(-2.0, 1.0),
        },
        Factor {
            label: "existing loans",
            contribution: if profile.has_current_loans() { -0.6 } else { 0.0 },
        },
        Factor {
            label: "collateral on file",
            contribution: if profile.has_collateral() { 0.5 } else { 0.0 },
        },
        Factor {
            label: "age",
            contribution: -0.02 * (profile.age as f64 - 38.0).abs(),
        },
    ]
}

/// Deterministic score and explanation for a profile
pub fn assess(profile: &CustomerProfile) -> RiskAssessment {
    let mut factors = factors(profile);
    let z = INTERCEPT + factors.iter().map(|f| f.contribution).sum::<f64>();
    let probability = 1.0 / (1.0 + (-z).exp());

    factors.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
    let explanation = factors
        .iter()
        .filter(|f| f.contribution != 0.0)
        .take(2)
        .map(|f| {
            format!(
                "{} {} safety",
                f.label,
                if f.contribution > 0.0 { "raises" } else { "lowers" }
            )
        })
        .collect::<Vec<_>>()
        .join("; ");

    RiskAssessment {
        safety_probability: (probability * 100.0).round() / 100.0,
        explanation: if explanation.is_empty() {
            "no dominant factors".to_string()
        } else {
            explanation
        },
    }
}

#[async_trait]
impl RiskScorer for HeuristicRiskScorer {
    async fn score_risk(&self, profile: &CustomerProfile) -> Result<RiskAssessment> {
        Ok(assess(profile))
    }
}
