//! Underwriting engine
//!
//! Rules-based credit decisions. Deterministic, no I/O.

use crate::error::AssistantError;
use crate::models::{
    CustomerProfile, Decision, LoanRequest, RejectionCause, SalaryAssessment, UnderwritingOutcome,
};
use crate::pricing::format_inr;
use crate::Result;
use tracing::info;

/// Thresholds applied by the engine
#[derive(Debug, Clone)]
pub struct UnderwritingPolicy {
    pub min_credit_score: u32,
    /// Requested / limit at or below which approval is instant
    pub instant_ratio: f64,
    /// Requested / limit at or below which a salary slip can unlock approval
    pub documented_ratio: f64,
    /// Highest acceptable EMI as a percentage of monthly salary
    pub max_emi_ratio_pct: f64,
}

impl Default for UnderwritingPolicy {
    fn default() -> Self {
        Self {
            min_credit_score: 700,
            instant_ratio: 1.0,
            documented_ratio: 2.0,
            max_emi_ratio_pct: 50.0,
        }
    }
}

pub struct UnderwritingEngine {
    policy: UnderwritingPolicy,
}

impl UnderwritingEngine {
    pub fn new(policy: UnderwritingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &UnderwritingPolicy {
        &self.policy
    }

    /// Classify a request as APPROVED, REQUIRES_SALARY_SLIP or REJECTED
    pub fn evaluate(
        &self,
        customer: &CustomerProfile,
        request: &LoanRequest,
        credit_score: u32,
    ) -> Result<UnderwritingOutcome> {
        let amount = request.amount.filter(|a| *a > 0).ok_or_else(|| {
            AssistantError::InvalidInput("Loan amount missing for underwriting".to_string())
        })?;
        let limit = customer.pre_approved_limit;

        let outcome = if credit_score < self.policy.min_credit_score {
            UnderwritingOutcome {
                decision: Decision::Rejected,
                reason: format!(
                    "Credit score ({}) below minimum requirement ({})",
                    credit_score, self.policy.min_credit_score
                ),
                ratio: None,
                suggested_amount: None,
                rejection: Some(RejectionCause::CreditScore),
            }
        } else if limit == 0 {
            UnderwritingOutcome {
                decision: Decision::Rejected,
                reason: "No pre-approved limit on record".to_string(),
                ratio: None,
                suggested_amount: None,
                rejection: Some(RejectionCause::AmountOverLimit),
            }
        } else {
            let ratio = amount as f64 / limit as f64;

            if ratio <= self.policy.instant_ratio {
                UnderwritingOutcome {
                    decision: Decision::Approved,
                    reason: format!(
                        "Amount {} within pre-approved limit {}",
                        format_inr(amount),
                        format_inr(limit)
                    ),
                    ratio: Some(ratio),
                    suggested_amount: None,
                    rejection: None,
                }
            } else if ratio <= self.policy.documented_ratio {
                UnderwritingOutcome {
                    decision: Decision::RequiresSalarySlip,
                    reason: format!(
                        "Amount is {:.1}x the pre-approved limit; income verification required",
                        ratio
                    ),
                    ratio: Some(ratio),
                    suggested_amount: None,
                    rejection: None,
                }
            } else {
                let ceiling = (limit as f64 * self.policy.documented_ratio) as u64;
                UnderwritingOutcome {
                    decision: Decision::Rejected,
                    reason: format!(
                        "Amount exceeds {}x the pre-approved limit. Maximum approved amount: {}",
                        self.policy.documented_ratio,
                        format_inr(ceiling)
                    ),
                    ratio: Some(ratio),
                    suggested_amount: Some(ceiling),
                    rejection: Some(RejectionCause::AmountOverLimit),
                }
            }
        };

        info!(
            customer_id = %customer.customer_id,
            amount,
            credit_score,
            decision = %outcome.decision,
            "Underwriting decision"
        );

        Ok(outcome)
    }

    /// EMI-to-income check after salary verification
    pub fn evaluate_with_salary(&self, monthly_salary: u64, monthly_emi: u64) -> Result<SalaryAssessment> {
        if monthly_salary == 0 {
            return Err(AssistantError::InvalidInput(
                "Monthly salary must be positive".to_string(),
            ));
        }

        let emi_ratio_pct = monthly_emi as f64 / monthly_salary as f64 * 100.0;
        let approved = emi_ratio_pct <= self.policy.max_emi_ratio_pct;

        let assessment = SalaryAssessment {
            decision: if approved { Decision::Approved } else { Decision::Rejected },
            emi_ratio_pct,
            reason: if approved {
                format!("EMI is {:.1}% of monthly salary", emi_ratio_pct)
            } else {
                format!(
                    "EMI is {:.1}% of monthly salary, above the {:.0}% limit",
                    emi_ratio_pct, self.policy.max_emi_ratio_pct
                )
            },
        };

        info!(
            monthly_salary,
            monthly_emi,
            emi_ratio_pct,
            decision = %assessment.decision,
            "Salary-based underwriting"
        );

        Ok(assessment)
    }
}

impl Default for UnderwritingEngine {
    fn default() -> Self {
        Self::new(UnderwritingPolicy::default())
    }
}

fn round_to_nearest_10k(value: f64) -> u64 {
    ((value / 10_000.0).round() as u64) * 10_000
}

/// Lower amount to offer after a rejection.
///
/// Always strictly below `requested` and at least `pre_approved_limit`;
/// `None` when no such amount exists.
pub fn suggest_lower_amount(requested: u64, pre_approved_limit: u64) -> Option<u64> {
    if pre_approved_limit >= requested {
        return None;
    }

    let candidate = round_to_nearest_10k(requested as f64 * 0.85).max(pre_approved_limit);
    if candidate < requested {
        Some(candidate)
    } else {
        Some(pre_approved_limit).filter(|limit| *limit > 0)
    }
}
