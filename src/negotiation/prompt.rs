//! Negotiation prompt construction
//!
//! The prompt states what is known, what is missing, and a mode directive.
//! All numbers in it are computed by the pricing module.

use super::NegotiationMode;
use crate::extraction::ExtractionMarker;
use crate::models::{CustomerProfile, LoanRequest};
use crate::pricing::{format_inr, total_interest};

/// Default style rules injected into every negotiation prompt
pub const DEFAULT_PERSONALITY: &str = "\
- Your vibe: a helpful, professional and human bank agent.
- Formatting: do not use asterisks, bold text or emojis. Use plain sentences.
- Style: speak naturally, like a bank officer talking to a customer in person.
- Negotiation: if the EMI feels too high, suggest a longer tenure or a lower amount.";

fn or_missing<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "Not specified".to_string())
}

fn profile_block(customer: &CustomerProfile) -> String {
    format!(
        "CUSTOMER PROFILE:\n\
         - Name: {}\n\
         - Age: {}\n\
         - City: {}\n\
         - Pre-approved limit: {}\n\
         - Credit score: {}/900\n\
         - Monthly income: {}\n\
         - Current loans: {}\n\
         - Collateral: {}",
        customer.name,
        customer.age,
        if customer.city.is_empty() { "N/A" } else { customer.city.as_str() },
        format_inr(customer.pre_approved_limit),
        customer.credit_score,
        format_inr(customer.monthly_income),
        customer.current_loans.as_deref().unwrap_or("None"),
        customer.collateral.as_deref().unwrap_or("None"),
    )
}

fn known_block(loan: &LoanRequest) -> String {
    let mut missing = Vec::new();
    if loan.purpose.is_none() {
        missing.push("purpose (why they need the loan)");
    }
    if loan.amount.is_none() {
        missing.push("amount (how much they need)");
    }
    if loan.tenure_months.is_none() {
        missing.push("tenure (repayment period in months, usually 12 to 60)");
    }

    let missing = if missing.is_empty() {
        "Nothing, all details are known.".to_string()
    } else {
        missing
            .iter()
            .map(|m| format!("- {}", m))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "WHAT YOU HAVE SO FAR:\n\
         - Loan amount: {}\n\
         - Loan tenure (months): {}\n\
         - Loan purpose: {}\n\n\
         WHAT IS STILL MISSING:\n{}",
        or_missing(loan.amount.map(format_inr)),
        or_missing(loan.tenure_months),
        or_missing(loan.purpose),
        missing
    )
}

fn mode_block(mode: NegotiationMode, loan: &LoanRequest) -> String {
    match mode {
        NegotiationMode::GatherInfo => "YOUR TASK:\n\
             - Ask naturally for the missing details only. Do not ask for what you already have.\n\
             - If the customer changes a value, acknowledge the new value.\n\
             - Do NOT mention EMI, interest rates or monthly payments.\n\
             - Do NOT output any [EXTRACTION:...] line."
            .to_string(),
        NegotiationMode::PresentEmi => {
            let (amount, tenure, rate, emi) = (
                loan.amount.unwrap_or_default(),
                loan.tenure_months.unwrap_or_default(),
                loan.interest_rate.unwrap_or_default(),
                loan.emi.unwrap_or_default(),
            );
            let marker = ExtractionMarker {
                amount,
                tenure_months: tenure,
                purpose: loan.purpose.unwrap_or(crate::models::LoanPurpose::Personal),
            }
            .render();

            format!(
                "CALCULATED OFFER (already computed, never recalculate):\n\
                 - Amount: {}\n\
                 - Tenure: {} months\n\
                 - Interest rate: {}% p.a.\n\
                 - EMI: {} per month\n\
                 - Total interest: {}\n\n\
                 YOUR TASK:\n\
                 1. Present this EMI to the customer and ask if it works for them.\n\
                 2. If they hesitate, suggest extending the tenure or reducing the amount. Do not compute new numbers yourself.\n\
                 3. If they ask for a secured loan or a loan against collateral, stop negotiating and output the marker line immediately.\n\
                 4. If they accept, or have declined every alternative, output the marker line to finalize.\n\n\
                 Marker line, exactly, on its own line at the end of your message:\n{}",
                format_inr(amount),
                tenure,
                rate,
                format_inr(emi),
                format_inr(total_interest(amount, rate, tenure)),
                marker
            )
        }
    }
}

/// Full system prompt for one negotiation turn
pub fn build_system_prompt(
    customer: &CustomerProfile,
    loan: &LoanRequest,
    mode: NegotiationMode,
    personality: &str,
) -> String {
    format!(
        "You are Arjun, a personal loan advisor. You are talking to {}, a valued customer. \
         Address them by first name.\n\n{}\n\nYOUR PERSONALITY:\n{}\n\n{}\n\n{}",
        customer.name,
        profile_block(customer),
        personality,
        known_block(loan),
        mode_block(mode, loan)
    )
}

/// Deterministic reply used when no language model is configured
pub fn template_reply(customer: &CustomerProfile, loan: &LoanRequest, mode: NegotiationMode) -> String {
    match mode {
        NegotiationMode::GatherInfo => {
            let mut asks = Vec::new();
            if loan.purpose.is_none() {
                asks.push("what the loan is for");
            }
            if loan.amount.is_none() {
                asks.push("how much you need");
            }
            if loan.tenure_months.is_none() {
                asks.push("over how many months or years you would like to repay");
            }

            let noted = match (loan.amount, loan.purpose) {
                (Some(amount), Some(purpose)) => format!("Noted, {} for {}. ", format_inr(amount), purpose),
                (Some(amount), None) => format!("Noted, {}. ", format_inr(amount)),
                (None, Some(purpose)) => format!("A {} loan, noted. ", purpose),
                (None, None) => String::new(),
            };

            let asks = match asks.len() {
                0 => String::new(),
                1 => asks[0].to_string(),
                _ => format!("{} and {}", asks[..asks.len() - 1].join(", "), asks[asks.len() - 1]),
            };

            format!("{}{}, could you tell me {}?", noted, customer.first_name(), asks)
        }
        NegotiationMode::PresentEmi => format!(
            "Here is your offer, {}: {} for {} over {} months at {}% p.a. \
             Your EMI would be {} per month. Does this work for you? \
             If the EMI feels high, I can stretch the tenure or lower the amount.",
            customer.first_name(),
            format_inr(loan.amount.unwrap_or_default()),
            or_missing(loan.purpose),
            loan.tenure_months.unwrap_or_default(),
            loan.interest_rate.unwrap_or_default(),
            format_inr(loan.emi.unwrap_or_default())
        ),
    }
}
