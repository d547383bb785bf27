//! Slot extraction from free text
//!
//! Layered regex heuristics turning customer utterances into loan fields.
//! Every free-text parser in the crate (negotiation, onboarding income,
//! phone and email capture) goes through this module.

pub mod marker;

pub use marker::{parse_marker, strip_markers, ExtractionMarker};

use crate::models::LoanPurpose;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Amount multiplier for parsing
#[derive(Debug, Clone, Copy)]
enum AmountMultiplier {
    Unit,
    Thousand,
    Lakh,
    Crore,
}

impl AmountMultiplier {
    fn value(&self) -> f64 {
        match self {
            AmountMultiplier::Unit => 1.0,
            AmountMultiplier::Thousand => 1_000.0,
            AmountMultiplier::Lakh => 100_000.0,
            AmountMultiplier::Crore => 10_000_000.0,
        }
    }
}

// Priority order matters: the first pattern that matches wins.
static AMOUNT_PATTERNS: Lazy<Vec<(Regex, AmountMultiplier)>> = Lazy::new(|| vec![
    (Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:lakhs?|lacs?)\b").unwrap(), AmountMultiplier::Lakh),
    (Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:crores?|cr)\b").unwrap(), AmountMultiplier::Crore),
    (Regex::new(r"(?i)(?:₹|\brs\.?|\binr\b|\brupees?\b)\s*(\d[\d,]*(?:\.\d+)?)").unwrap(), AmountMultiplier::Unit),
    (Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:thousand|k)\b").unwrap(), AmountMultiplier::Thousand),
]);

static BARE_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,3}(?:,\d{2,3})+|\d{4,9})\b").unwrap());

static TENURE_YEARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:years?|yrs?)\b").unwrap());
static TENURE_MONTHS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:months?|mons?|mths?)\b").unwrap());

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)+").unwrap());

static NUMBER_WITH_UNIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d[\d,]*)\s*([a-z]*)").unwrap());

static INCOME: Lazy<Regex> = Lazy::new(|| Regex::new(
    r"(?i)(\d+(?:\.\d+)?)\s*(k|thousand|lakhs?|lacs?|l|crores?|cr|c)?\b"
).unwrap());

/// Words that mark a bare number as an identifier rather than money
const IDENTIFIER_CONTEXT: &[&str] = &["phone", "mobile", "pin", "code", "otp", "contact"];

/// Purpose categories, checked in order; the first with a hit wins
const PURPOSE_KEYWORDS: &[(LoanPurpose, &[&str])] = &[
    (LoanPurpose::Business, &["business", "startup", "venture", "company", "expand", "expansion", "shop"]),
    (LoanPurpose::Wedding, &["wedding", "marriage", "shaadi"]),
    (LoanPurpose::Medical, &["medical", "health", "hospital", "surgery", "treatment"]),
    (LoanPurpose::Education, &["education", "study", "course", "college", "university", "tuition"]),
    (LoanPurpose::Travel, &["travel", "vacation", "holiday", "trip"]),
    (LoanPurpose::HomeRenovation, &["renovation", "renovate", "repair", "remodel", "home improvement", "painting"]),
    (LoanPurpose::DebtConsolidation, &["debt", "consolidate", "pay off", "credit card"]),
    (LoanPurpose::Emergency, &["emergency", "urgent", "immediate"]),
    (LoanPurpose::Vehicle, &["car", "bike", "vehicle", "automobile", "scooter"]),
    (LoanPurpose::Personal, &["personal", "general", "use"]),
];

/// Loan fields recovered from one or more utterances
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanSlots {
    pub amount: Option<u64>,
    pub tenure_months: Option<u32>,
    pub purpose: Option<LoanPurpose>,
}

impl LoanSlots {
    pub fn is_filled(&self) -> bool {
        self.amount.is_some() && self.tenure_months.is_some() && self.purpose.is_some()
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

fn scaled(raw: &str, multiplier: AmountMultiplier) -> Option<u64> {
    let value = parse_number(raw)? * multiplier.value();
    if value.is_finite() && value >= 1.0 {
        Some(value.round() as u64)
    } else {
        None
    }
}

/// Whole-word match for short keywords, substring match otherwise.
pub(crate) fn contains_keyword(text: &str, keyword: &str) -> bool {
    if keyword.len() > 3 {
        return text.contains(keyword);
    }
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| word == keyword)
}

/// Extract a loan amount in currency units
pub fn extract_amount(text: &str) -> Option<u64> {
    for (pattern, multiplier) in AMOUNT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            if let Some(amount) = scaled(&caps[1], *multiplier) {
                debug!(amount, ?multiplier, "Amount extracted");
                return Some(amount);
            }
        }
    }

    let lowered = text.to_lowercase();
    if IDENTIFIER_CONTEXT.iter().any(|w| lowered.contains(w)) {
        return None;
    }

    BARE_AMOUNT
        .captures(text)
        .and_then(|caps| scaled(&caps[1], AmountMultiplier::Unit))
}

/// Extract a tenure in months ("3 years" → 36, "18 months" → 18)
pub fn extract_tenure(text: &str) -> Option<u32> {
    if let Some(caps) = TENURE_YEARS.captures(text) {
        if let Ok(years) = caps[1].parse::<u32>() {
            if years > 0 {
                return years.checked_mul(12);
            }
        }
    }

    TENURE_MONTHS
        .captures(text)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|months| *months > 0)
}

/// Map free text to a purpose category; `None` when nothing matches
pub fn extract_purpose(text: &str) -> Option<LoanPurpose> {
    let lowered = text.to_lowercase();

    PURPOSE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| contains_keyword(&lowered, kw)))
        .map(|(purpose, _)| *purpose)
}

/// Scan utterances most-recent first, filling each slot from the newest
/// message that states it. Stops once every slot is found.
pub fn backfill_slots<'a, I>(newest_first: I) -> LoanSlots
where
    I: IntoIterator<Item = &'a str>,
{
    let mut slots = LoanSlots::default();

    for text in newest_first {
        if slots.amount.is_none() {
            slots.amount = extract_amount(text);
        }
        if slots.tenure_months.is_none() {
            slots.tenure_months = extract_tenure(text);
        }
        if slots.purpose.is_none() {
            slots.purpose = extract_purpose(text);
        }
        if slots.is_filled() {
            break;
        }
    }

    slots
}

/// Normalize a phone number to its last 10 digits
pub fn extract_phone(text: &str) -> Option<String> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return None;
    }
    Some(digits[digits.len() - 10..].to_string())
}

pub fn extract_email(text: &str) -> Option<String> {
    EMAIL.find(text).map(|m| m.as_str().trim_end_matches('.').to_lowercase())
}

/// Parse a monthly income, honouring k / l / c multiplier suffixes
pub fn parse_income(text: &str) -> Option<u64> {
    let cleaned = text.replace(',', "");
    let caps = INCOME.captures(&cleaned)?;

    let multiplier = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        None => AmountMultiplier::Unit,
        Some(suffix) => match suffix.as_str() {
            "k" | "thousand" => AmountMultiplier::Thousand,
            "c" | "cr" | "crore" | "crores" => AmountMultiplier::Crore,
            _ => AmountMultiplier::Lakh,
        },
    };

    scaled(&caps[1], multiplier)
}

/// Amount for a reply to "how much would you like?", where small bare
/// numbers mean lakhs ("15" or "15 l" → 15 lakh). Numbers followed by
/// a year or month unit are skipped.
pub fn extract_amount_lakh_scaled(text: &str) -> Option<u64> {
    if let Some(amount) = extract_amount(text) {
        return Some(amount);
    }

    for caps in NUMBER_WITH_UNIT.captures_iter(text) {
        let unit = caps[2].to_lowercase();
        if unit.starts_with('y') || unit.starts_with('m') {
            continue;
        }
        let Ok(value) = caps[1].replace(',', "").parse::<u64>() else {
            continue;
        };

        let lakh_hint = unit.starts_with('l');
        return Some(if (value < 1_000 && lakh_hint) || value < 100 {
            value * 100_000
        } else {
            value
        });
    }
    None
}
