//! Sanction letter rendering
//!
//! Writes a plain-text letter per approval:
//! `SanctionLetter_<Name_With_Underscores>_<YYYYMMDD>.txt`.

use super::SanctionLetterRenderer;
use crate::error::AssistantError;
use crate::models::{CustomerProfile, LoanOffer, LoanType};
use crate::pricing::{amortization_schedule, format_inr, total_interest};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::info;

/// Rows of the amortization schedule printed on the letter
const SCHEDULE_ROWS: usize = 12;

const TERMS: &[&str] = &[
    "The loan is subject to the terms and conditions mentioned in the loan agreement.",
    "EMI payments must be made on or before the 5th of every month.",
    "Prepayment is allowed after 6 months with no additional charges.",
    "Late payment will attract a penalty of 2% per month on the overdue amount.",
    "The loan is subject to final documentation and verification.",
    "Disbursement will be done within 2-3 business days post-documentation.",
    "This sanction is valid for 30 days from the date of issue.",
];

pub struct TextSanctionLetterRenderer {
    output_dir: PathBuf,
}

impl TextSanctionLetterRenderer {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

pub fn letter_file_name(customer_name: &str, issued: &DateTime<Local>) -> String {
    format!(
        "SanctionLetter_{}_{}.txt",
        customer_name.trim().replace(' ', "_"),
        issued.format("%Y%m%d")
    )
}

/// Letter body; pure so it can be checked without touching the disk
pub fn render_letter(customer: &CustomerProfile, terms: &LoanOffer, issued: &DateTime<Local>) -> Result<String> {
    let mut out = String::new();
    write_letter(&mut out, customer, terms, issued)
        .map_err(|e| AssistantError::DocumentError(format!("Cannot render sanction letter: {}", e)))?;
    Ok(out)
}

fn write_letter(
    out: &mut String,
    customer: &CustomerProfile,
    terms: &LoanOffer,
    issued: &DateTime<Local>,
) -> fmt::Result {
    let interest = total_interest(terms.amount, terms.interest_rate, terms.tenure_months);
    let payable = terms.emi * terms.tenure_months as u64;

    writeln!(out, "LOAN SANCTION LETTER")?;
    writeln!(out, "Date: {}", issued.format("%d %B %Y"))?;
    writeln!(
        out,
        "Reference No: TC/PL/{}/{}",
        issued.format("%Y%m%d"),
        customer.customer_id
    )?;

    writeln!(out, "\nCUSTOMER DETAILS")?;
    writeln!(out, "Name: {}", customer.name)?;
    writeln!(out, "Customer ID: {}", customer.customer_id)?;
    writeln!(out, "Phone: {}", customer.phone)?;
    writeln!(out, "Email: {}", customer.email)?;
    writeln!(out, "Address: {}", customer.address)?;

    writeln!(out, "\nLOAN DETAILS")?;
    writeln!(out, "Loan Amount: {}", format_inr(terms.amount))?;
    writeln!(out, "Interest Rate: {}% per annum", terms.interest_rate)?;
    writeln!(
        out,
        "Loan Tenure: {} months ({} years)",
        terms.tenure_months,
        terms.tenure_months / 12
    )?;
    writeln!(out, "Monthly EMI: {}", format_inr(terms.emi))?;
    writeln!(out, "Total Interest: {}", format_inr(interest))?;
    writeln!(out, "Total Payable: {}", format_inr(payable))?;
    writeln!(out, "Loan Purpose: {}", terms.purpose)?;
    writeln!(
        out,
        "Loan Type: {}",
        match terms.loan_type {
            LoanType::Secured => "Secured",
            LoanType::Unsecured => "Unsecured",
        }
    )?;
    if let Some(collateral) = &terms.collateral {
        writeln!(out, "Collateral: {}", collateral)?;
    }
    writeln!(out, "Disbursement Mode: Direct Bank Transfer")?;

    writeln!(out, "\nREPAYMENT SCHEDULE (first {} months)", SCHEDULE_ROWS)?;
    writeln!(out, "{:>5} {:>12} {:>12} {:>12} {:>14}", "Month", "EMI", "Principal", "Interest", "Balance")?;
    for row in amortization_schedule(terms.amount, terms.interest_rate, terms.tenure_months)
        .iter()
        .take(SCHEDULE_ROWS)
    {
        writeln!(
            out,
            "{:>5} {:>12.2} {:>12.2} {:>12.2} {:>14.2}",
            row.month, row.emi, row.principal, row.interest, row.balance
        )?;
    }

    writeln!(out, "\nTERMS & CONDITIONS")?;
    for (i, term) in TERMS.iter().enumerate() {
        writeln!(out, "{}. {}", i + 1, term)?;
    }

    writeln!(
        out,
        "\nThis is a system-generated document and does not require a physical signature."
    )?;
    Ok(())
}

#[async_trait]
impl SanctionLetterRenderer for TextSanctionLetterRenderer {
    async fn render_sanction_letter(&self, customer: &CustomerProfile, terms: &LoanOffer) -> Result<PathBuf> {
        let issued = Local::now();
        let path = self.output_dir.join(letter_file_name(&customer.name, &issued));

        tokio::fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            AssistantError::DocumentError(format!(
                "Cannot create {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;
        let letter = render_letter(customer, terms, &issued)?;
        tokio::fs::write(&path, letter)
            .await
            .map_err(|e| AssistantError::DocumentError(format!("Cannot write {}: {}", path.display(), e)))?;

        info!(path = %path.display(), amount = terms.amount, "Sanction letter generated");
        Ok(path)
    }
}
