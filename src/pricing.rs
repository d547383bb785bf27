//! Rate and EMI model
//!
//! Deterministic pricing: the language model never computes numbers,
//! it only presents what this module produces.

use crate::models::{CustomerProfile, LoanRequest};
use serde::{Deserialize, Serialize};

/// Starting annual rate for unsecured loans (percent)
pub const BASE_RATE: f64 = 11.5;

/// Rates never drop below this floor (percent)
pub const RATE_FLOOR: f64 = 0.0;

/// Unsecured amounts at or above this carry an extra surcharge
const LARGE_UNSECURED_AMOUNT: u64 = 2_500_000;

/// Annual interest rate for an unsecured loan, rounded to 2 decimals.
pub fn interest_rate(
    credit_score: u32,
    safety_score: Option<f64>,
    amount: u64,
    tenure_months: u32,
) -> f64 {
    let mut rate = BASE_RATE;

    rate += match credit_score {
        s if s >= 800 => -1.0,
        s if s >= 750 => -0.5,
        s if s < 700 => 1.0,
        _ => 0.0,
    };

    if let Some(safety) = safety_score {
        if safety >= 0.9 {
            rate -= 0.25;
        } else if safety <= 0.3 {
            rate += 0.25;
        }
    }

    if amount <= 200_000 {
        rate -= 0.5;
    } else if amount >= 1_000_000 {
        rate += 0.5;
    }
    if amount >= LARGE_UNSECURED_AMOUNT {
        rate += 0.5;
    }

    if tenure_months <= 12 {
        rate -= 0.5;
    } else if tenure_months >= 48 {
        rate += 0.5;
    }

    round2(rate.max(RATE_FLOOR))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Exact reducing-balance EMI
fn exact_emi(principal: f64, annual_rate: f64, months: u32) -> f64 {
    if months == 0 {
        return principal;
    }
    let n = months as f64;
    let r = annual_rate / 1200.0;
    if r <= 0.0 {
        return principal / n;
    }
    let growth = (1.0 + r).powf(n);
    principal * r * growth / (growth - 1.0)
}

/// Monthly instalment, rounded up to a whole currency unit.
///
/// `months == 0` is degenerate and returns the principal unchanged.
pub fn calculate_emi(principal: u64, annual_rate: f64, months: u32) -> u64 {
    if months == 0 {
        return principal;
    }
    exact_emi(principal as f64, annual_rate, months).ceil() as u64
}

/// Total interest paid over the life of the loan at the rounded EMI
pub fn total_interest(principal: u64, annual_rate: f64, months: u32) -> u64 {
    let emi = calculate_emi(principal, annual_rate, months);
    (emi * months as u64).saturating_sub(principal)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Installment {
    pub month: u32,
    pub emi: f64,
    pub principal: f64,
    pub interest: f64,
    pub balance: f64,
}

/// Month-by-month amortization schedule
pub fn amortization_schedule(principal: u64, annual_rate: f64, months: u32) -> Vec<Installment> {
    let r = annual_rate / 1200.0;
    let emi = exact_emi(principal as f64, annual_rate, months);
    let mut balance = principal as f64;

    (1..=months)
        .map(|month| {
            let interest = balance * r;
            let principal_part = emi - interest;
            balance -= principal_part;

            Installment {
                month,
                emi: round2(emi),
                principal: round2(principal_part),
                interest: round2(interest),
                balance: round2(balance.max(0.0)),
            }
        })
        .collect()
}

/// Apply the rate model to a complete request; no-op otherwise.
pub fn price_request(request: &mut LoanRequest, customer: &CustomerProfile) {
    let (Some(amount), Some(tenure)) = (request.amount, request.tenure_months) else {
        return;
    };
    if !request.is_complete() {
        return;
    }

    let rate = interest_rate(customer.credit_score, customer.safety_score, amount, tenure);
    request.interest_rate = Some(rate);
    request.emi = Some(calculate_emi(amount, rate, tenure));
}

/// Indian-style grouping: 4500000 → "₹45,00,000"
pub fn format_inr(amount: u64) -> String {
    let digits = amount.to_string();
    if digits.len() <= 3 {
        return format!("₹{}", digits);
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 2 {
        groups.push(&head[end - 2..end]);
        end -= 2;
    }
    groups.push(&head[..end]);
    groups.reverse();

    format!("₹{},{}", groups.join(","), tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LoanPurpose;

    #[test]
    fn test_base_rate_neutral_profile() {
        // score 720, no safety, mid amount, mid tenure
        assert_eq!(interest_rate(720, None, 500_000, 36), 11.5);
    }

    #[test]
    fn test_rate_adjustments_are_additive() {
        // 11.5 - 1.0 - 0.25 - 0.5 - 0.5
        assert_eq!(interest_rate(810, Some(0.95), 150_000, 12), 9.25);
        // 11.5 + 1.0 + 0.25 + 0.5 + 0.5
        assert_eq!(interest_rate(650, Some(0.2), 1_500_000, 60), 13.75);
        // large unsecured surcharge on top of the 10 lakh band
        assert_eq!(interest_rate(720, None, 3_000_000, 36), 12.5);
        assert_eq!(interest_rate(782, Some(0.5), 300_000, 24), 11.0);
    }

    #[test]
    fn test_emi_known_value() {
        // 3,00,000 at 11.5% for 24 months ≈ 14,052.xx
        let emi = calculate_emi(300_000, 11.5, 24);
        assert!((14_050..=14_060).contains(&emi), "emi = {}", emi);
    }

    #[test]
    fn test_emi_deterministic_and_covers_principal() {
        for (p, rate, n) in [(10_000u64, 0.5, 12u32), (500_000, 11.5, 60), (1, 9.0, 36), (75_000, 13.75, 7)] {
            let first = calculate_emi(p, rate, n);
            assert_eq!(first, calculate_emi(p, rate, n));
            assert!(first * n as u64 >= p);
        }
    }

    #[test]
    fn test_emi_degenerate_cases() {
        assert_eq!(calculate_emi(120_000, 0.0, 12), 10_000);
        assert_eq!(calculate_emi(120_000, 11.5, 0), 120_000);
    }

    #[test]
    fn test_amortization_schedule_pays_down() {
        let schedule = amortization_schedule(300_000, 11.5, 24);
        assert_eq!(schedule.len(), 24);
        assert!(schedule[0].interest > schedule[23].interest);
        assert!(schedule[23].balance < 1.0);
        assert!(total_interest(300_000, 11.5, 24) > 0);
    }

    #[test]
    fn test_price_request_requires_complete_fields() {
        let customer: CustomerProfile = serde_json::from_value(serde_json::json!({
            "customer_id": "C01",
            "name": "Riya Sharma",
            "phone": "7303201137",
            "credit_score": 782
        }))
        .unwrap();

        let mut request = LoanRequest {
            amount: Some(300_000),
            tenure_months: Some(24),
            ..Default::default()
        };
        price_request(&mut request, &customer);
        assert!(request.emi.is_none());

        request.purpose = Some(LoanPurpose::Travel);
        price_request(&mut request, &customer);
        assert_eq!(request.interest_rate, Some(11.0));
        assert_eq!(request.emi, Some(calculate_emi(300_000, 11.0, 24)));
    }

    #[test]
    fn test_format_inr() {
        assert_eq!(format_inr(999), "₹999");
        assert_eq!(format_inr(1_000), "₹1,000");
        assert_eq!(format_inr(500_000), "₹5,00,000");
        assert_eq!(format_inr(4_500_000), "₹45,00,000");
        assert_eq!(format_inr(12_000_000), "₹1,20,00,000");
    }
}
