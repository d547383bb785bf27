//! Secured loan engine
//!
//! Turns a free-text collateral description into a loan-to-value backed offer.

use crate::extraction::contains_keyword;
use crate::models::{Collateral, CollateralType, CustomerProfile, SecuredLoanOffer};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

pub const MIN_SECURED_TENURE: u32 = 12;
pub const MAX_SECURED_TENURE: u32 = 120;
pub const PROCESSING_FEE: &str = "1% of loan amount";

/// Values below this are treated as unrelated numbers, not appraisals
pub const MIN_COLLATERAL_VALUE: u64 = 50_000;

const NO_COLLATERAL: &[&str] = &["none", "no", "nil", "na", "n/a", "nothing"];

/// Type buckets, checked in order
const TYPE_KEYWORDS: &[(CollateralType, &[&str])] = &[
    (CollateralType::FixedDeposit, &["fixed deposit", "fd", "deposit"]),
    (CollateralType::Property, &["property", "flat", "house", "villa", "apartment", "bhk", "residential", "commercial"]),
    (CollateralType::Vehicle, &["vehicle", "car", "bike", "scooter", "truck"]),
    (CollateralType::Gold, &["gold", "jewelry", "jewellery"]),
    (CollateralType::MutualFunds, &["mutual fund", "mf"]),
    (CollateralType::Stocks, &["stock", "share", "equity"]),
    (CollateralType::Land, &["land", "plot", "acre"]),
];

static VALUE_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| vec![
    (Regex::new(r"(?i)(?:₹|\brs\.?|\binr\b)\s*(\d[\d,]*)").unwrap(), 1.0),
    (Regex::new(r"(?i)\bvalue\s*[:\-=]?\s*(\d[\d,]*)").unwrap(), 1.0),
    (Regex::new(r"\b(\d[\d,]{3,})\b").unwrap(), 1.0),
    (Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:crores?|cr)\b").unwrap(), 10_000_000.0),
    (Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:lakhs?|lacs?|l)\b").unwrap(), 100_000.0),
    (Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*k\b").unwrap(), 1_000.0),
]);

#[derive(Debug, Default, Clone, Copy)]
pub struct SecuredLoanEngine;

impl SecuredLoanEngine {
    pub fn new() -> Self {
        Self
    }

    /// Parse a collateral description. `None` when the text declares no
    /// collateral or no appraised value can be found.
    pub fn parse_collateral(&self, text: &str) -> Option<Collateral> {
        let lowered = text.trim().to_lowercase();
        if lowered.is_empty() || NO_COLLATERAL.contains(&lowered.as_str()) {
            return None;
        }

        let value = extract_value(text)?;
        let kind = classify(&lowered);
        let ltv = kind.ltv();

        let collateral = Collateral {
            kind,
            value,
            ltv,
            max_loan: value * kind.ltv_percent() / 100,
            interest_rate: kind.interest_rate(),
        };
        debug!(?collateral, "Collateral parsed");
        Some(collateral)
    }

    /// Secured offer backed by the customer's declared collateral
    pub fn offer(&self, customer: &CustomerProfile) -> Option<SecuredLoanOffer> {
        let description = customer.collateral.as_deref()?;
        let collateral = self.parse_collateral(description)?;

        Some(SecuredLoanOffer {
            description: description.to_string(),
            max_amount: collateral.max_loan,
            interest_rate: collateral.interest_rate,
            min_tenure_months: MIN_SECURED_TENURE,
            max_tenure_months: MAX_SECURED_TENURE,
            processing_fee: PROCESSING_FEE.to_string(),
            collateral,
        })
    }
}

fn extract_value(text: &str) -> Option<u64> {
    for (pattern, multiplier) in VALUE_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let Ok(number) = caps[1].replace(',', "").parse::<f64>() else {
                continue;
            };
            let value = (number * multiplier).round();
            if value >= MIN_COLLATERAL_VALUE as f64 {
                return Some(value as u64);
            }
        }
    }
    None
}

fn classify(lowered: &str) -> CollateralType {
    TYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| contains_keyword(lowered, kw)))
        .map(|(kind, _)| *kind)
        .unwrap_or(CollateralType::Property)
}

/// Render a description that `parse_collateral` reads back
pub fn describe_collateral(kind: CollateralType, value: u64) -> String {
    format!(
        "{} (Estimated Value: {})",
        kind.label(),
        crate::pricing::format_inr(value)
    )
}
