//! Extraction marker emitted by the language model
//!
//! Format: `[EXTRACTION:amount=<digits>,tenure=<months>,purpose=<category>]`.
//! Anything that does not match the grammar exactly is ignored.

use super::extract_purpose;
use crate::models::LoanPurpose;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Longest tenure a marker may carry (40 years)
const MAX_MARKER_TENURE: u32 = 480;

static ANY_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[EXTRACTION:[^\]]*\]").unwrap());
static STRICT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(
    r"^\[EXTRACTION:amount=(\d{1,12}),tenure=(\d{1,3}),purpose=([A-Za-z][A-Za-z_ ]{1,39})\]$"
).unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMarker {
    pub amount: u64,
    pub tenure_months: u32,
    pub purpose: LoanPurpose,
}

impl ExtractionMarker {
    pub fn render(&self) -> String {
        format!(
            "[EXTRACTION:amount={},tenure={},purpose={}]",
            self.amount,
            self.tenure_months,
            self.purpose.as_tag()
        )
    }
}

fn validate(raw: &str) -> Option<ExtractionMarker> {
    let caps = STRICT_MARKER.captures(raw)?;

    let amount = caps[1].parse::<u64>().ok().filter(|a| *a > 0)?;
    let tenure_months = caps[2]
        .parse::<u32>()
        .ok()
        .filter(|t| (1..=MAX_MARKER_TENURE).contains(t))?;
    let purpose = LoanPurpose::from_tag(&caps[3]).or_else(|| extract_purpose(&caps[3]))?;

    Some(ExtractionMarker {
        amount,
        tenure_months,
        purpose,
    })
}

/// Parse the last marker in `reply`; malformed markers count as absent.
pub fn parse_marker(reply: &str) -> Option<ExtractionMarker> {
    let raw = ANY_MARKER.find_iter(reply).last()?.as_str();

    let marker = validate(raw);
    if marker.is_none() {
        warn!(marker = raw, "Ignoring malformed extraction marker");
    }
    marker
}

/// Remove every marker-shaped tag from text shown to the customer
pub fn strip_markers(reply: &str) -> String {
    ANY_MARKER.replace_all(reply, "").trim().to_string()
}
