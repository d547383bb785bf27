//! Customer-facing reply text
//!
//! Plain text only: no emphasis markup, no emoji.

use crate::models::{Collateral, CreditReport, CustomerProfile, LoanRequest, SecuredLoanOffer};
use crate::pricing::format_inr;
use crate::state::{OnboardingStep, RejectionMenu, RejectionOption};
use std::path::Path;

pub const WELCOME: &str = "Hello! Welcome to Tata Capital.\n\
I am your personal loan assistant, and I am here to help you get the best loan offer tailored to your needs.\n\
May I have your phone number to get started?";

pub const RESTART: &str =
    "Starting a fresh loan application.\n\nPlease share your registered phone number to begin.";

pub const RECOVERY: &str = "I am sorry, something went wrong. Let me restart our conversation.\n\n\
May I have your phone number to get started?";

// =============================
// Identification
// =============================

pub const PROFILE_FOUND: &str = "Thank you. I found an existing profile linked to this number.\n\n\
May I access your profile information to provide you with personalized loan offers?\n\n\
Please reply with Yes or No.";

pub const PROFILE_NOT_FOUND: &str =
    "I couldn't find your profile in our system. No worries, let me collect your details.\n\nWhat is your full name?";

pub const INVALID_PHONE: &str =
    "I didn't catch a valid phone number. Could you please provide your 10-digit mobile number?";

pub const PERMISSION_DECLINED: &str = "No problem. Let's enter your details manually. What is your full name?";

pub const PERMISSION_REPROMPT: &str =
    "May I use the profile linked to this number? Please reply with Yes or No.";

pub fn permission_granted(customer: &CustomerProfile) -> String {
    format!(
        "Great. I found your profile, {}. You have a pre-approved limit of {}.\n\n\
         Could you tell me how much loan amount you are looking for and for what purpose?",
        customer.name,
        format_inr(customer.pre_approved_limit)
    )
}

// =============================
// Onboarding
// =============================

/// Question asked when `step` becomes the current step
pub fn onboarding_question(step: OnboardingStep) -> &'static str {
    match step {
        OnboardingStep::Name => "What is your full name?",
        OnboardingStep::City => "Great. What is your city?",
        OnboardingStep::Address => "Perfect. What is your complete address?",
        OnboardingStep::Email => "Thank you. What is your email address?",
        OnboardingStep::Income => "Thanks. What is your monthly income (in rupees)?",
        OnboardingStep::Collateral => {
            "Great. One last question:\n\n\
             Do you have any collateral that you would like to use for a secured loan? \
             This could be Property, Vehicle, Gold, or Fixed Deposits.\n\n\
             Please provide details like '3BHK worth 30 lakhs' or 'Honda City car worth 6 lakh'.\n\
             (Or simply type 'none' if you don't have collateral)"
        }
    }
}

/// Re-prompt after an answer that failed validation
pub fn onboarding_retry(step: OnboardingStep) -> &'static str {
    match step {
        OnboardingStep::Name => "Could you please tell me your full name?",
        OnboardingStep::City => "Could you please tell me which city you live in?",
        OnboardingStep::Address => "Could you please share your complete address?",
        OnboardingStep::Email => {
            "That doesn't look like a valid email address. Could you type it again (e.g., name@example.com)?"
        }
        OnboardingStep::Income => {
            "I didn't catch a valid amount. Please type your monthly income (e.g., 50000)."
        }
        OnboardingStep::Collateral => {
            "Please describe your collateral with its value, or type 'none' if you don't have any."
        }
    }
}

pub fn onboarding_summary(customer: &CustomerProfile, collateral: Option<&Collateral>) -> String {
    let mut out = format!(
        "Perfect! Thank you for providing your details, {}.\n\nProfile Summary:\n- Monthly Income: {}\n",
        customer.name,
        format_inr(customer.monthly_income)
    );

    match collateral {
        Some(collateral) => {
            out.push_str(&format!(
                "- Collateral: {} (Value: {})\n\nBased on this, you have two options:\n\
                 1. Unsecured Loan: Up to {}\n\
                 2. Secured Loan: Up to {} at {}% interest.\n",
                customer.collateral.as_deref().unwrap_or(collateral.kind.label()),
                format_inr(collateral.value),
                format_inr(customer.pre_approved_limit),
                format_inr(collateral.max_loan),
                collateral.interest_rate
            ));
        }
        None => {
            out.push_str(&format!(
                "You are eligible for a pre-approved unsecured loan of up to {}.\n",
                format_inr(customer.pre_approved_limit)
            ));
        }
    }

    out.push_str(
        "\nNow, let's discuss your loan needs:\n\
         1. What is the purpose of the loan?\n\
         2. How much amount do you need?\n\
         3. What tenure (years or months) works for you?",
    );
    out
}

// =============================
// Verification
// =============================

pub const VERIFICATION_CONFIRMED: &str = "Thank you. Checking your credit profile now...";

pub const WHICH_DETAIL: &str = "Oh, I see. Which personal detail is incorrect? (Name, Phone, Address, or Email)";

pub const PHONE_IMMUTABLE: &str = "Your phone number identifies your profile and cannot be changed here. \
If you'd like to use a different number, type 'restart'. Otherwise, which detail is incorrect? (Name, Address, or Email)";

pub const VERIFICATION_REPROMPT: &str =
    "Please confirm if your details are correct (Yes/No). Or say 'change amount' if you want to modify the loan.";

pub const LOAN_CHANGE: &str = "Understood. Let's update your loan details.";

pub fn ask_corrected_value(label: &str) -> String {
    format!("Please share the correct {}.", label)
}

pub fn verification_summary(customer: &CustomerProfile, loan: &LoanRequest) -> String {
    let email = if customer.email.is_empty() {
        "Not provided"
    } else {
        customer.email.as_str()
    };

    format!(
        "Perfect. Let me summarize your request:\n\
         - Amount: {}\n\
         - Purpose: {}\n\
         - Tenure: {} months\n\
         - EMI: {}\n\n\
         For security, I need to verify your details:\n\
         - Name: {}\n\
         - Phone: {}\n\
         - Address: {}\n\
         - Email: {}\n\n\
         Is this correct? (Yes/No)",
        format_inr(loan.amount.unwrap_or_default()),
        loan.purpose.map(|p| p.to_string()).unwrap_or_else(|| "personal".to_string()),
        loan.tenure_months.unwrap_or_default(),
        format_inr(loan.emi.unwrap_or_default()),
        customer.name,
        customer.phone,
        customer.address,
        email
    )
}

pub fn details_updated(fields: &[&str], summary: &str) -> String {
    format!("Updated: {}. Let me re-verify:\n\n{}", fields.join(", "), summary)
}

// =============================
// Credit and underwriting
// =============================

pub fn credit_too_low(score: u32) -> String {
    format!(
        "I have reviewed your profile. Your credit score is {}, which is below our minimum for unsecured loans.",
        score
    )
}

pub fn credit_ok(score: u32) -> String {
    format!("Your credit score of {} is strong. Evaluating eligibility...", score)
}

pub const LOAN_APPROVED: &str = "Congratulations! Your loan is APPROVED.";

pub const SALARY_SLIP_REQUIRED: &str =
    "We need to verify your income. Please upload your latest salary slip (type 'upload' or 'manual upload').";

pub fn amount_over_limit(amount: u64, ceiling: Option<u64>) -> String {
    let mut out = format!(
        "I have reviewed your application. The requested amount of {} exceeds our unsecured limits based on your profile.",
        format_inr(amount)
    );
    if let Some(ceiling) = ceiling {
        out.push_str(&format!(
            " The most we can consider with income verification is {}.",
            format_inr(ceiling)
        ));
    }
    out
}

// =============================
// Documents
// =============================

pub const DOCUMENT_REPROMPT: &str = "Please upload your salary slip to proceed. \
Type 'upload' or 'manual upload' to share it, or 'skip' to see other options.";

pub const DOCUMENT_FAILED: &str = "I couldn't read your salary slip. \
Please type 'upload' to try again, or 'skip' to see other options.";

pub fn salary_verified(net_salary: u64, emi_ratio_pct: f64) -> String {
    format!(
        "Thank you. Your salary slip shows a net monthly salary of {}. Your EMI would be {:.1}% of it, which is within our limits.",
        format_inr(net_salary),
        emi_ratio_pct
    )
}

pub fn salary_insufficient(net_salary: u64, emi_ratio_pct: f64) -> String {
    format!(
        "Thank you. Your salary slip shows a net monthly salary of {}. The EMI would be {:.1}% of it, above our 50% limit.",
        format_inr(net_salary),
        emi_ratio_pct
    )
}

// =============================
// Rejection menu
// =============================

pub fn rejection_menu(menu: &RejectionMenu) -> String {
    let mut out = String::from("Here are your options:\n");
    for (i, option) in menu.options.iter().enumerate() {
        let number = i + 1;
        let line = match option {
            RejectionOption::LowerAmount(amount) => format!("Try a lower amount: {}", format_inr(*amount)),
            RejectionOption::SecuredLoan { kind, max_amount } => format!(
                "Secured Loan: Get up to {} using your {}",
                format_inr(*max_amount),
                kind
            ),
            RejectionOption::AcceptPreApproved(amount) => {
                format!("Accept Pre-approved: {}", format_inr(*amount))
            }
            RejectionOption::Counseling => "Talk to a credit counselor".to_string(),
        };
        out.push_str(&format!("{}. {} (Reply 'Option {}')\n", number, line, number));
    }
    out
}

pub const OPTION_UNAVAILABLE: &str = "That option isn't available for your application.";

pub fn retry_lower_amount(amount: u64) -> String {
    format!("Okay, let's try for {}. Re-evaluating...", format_inr(amount))
}

pub fn accept_pre_approved(amount: u64) -> String {
    format!("Great. Processing your pre-approved loan of {}.", format_inr(amount))
}

/// Credit-improvement guidance from the bureau factors
pub fn counseling(report: Option<&CreditReport>) -> String {
    let mut out = String::from("Here is what usually helps improve a credit profile:\n");
    match report {
        Some(report) => {
            out.push_str(&format!(
                "- Your {} score is {} out of {}.\n",
                report.bureau, report.score, report.max_score
            ));
            for (factor, rating) in &report.factors {
                out.push_str(&format!("- {}: {}\n", factor.replace('_', " "), rating));
            }
        }
        None => out.push_str("- Your credit report is not available right now.\n"),
    }
    out.push_str(
        "- Pay every EMI and card bill on time; payment history matters most.\n\
         - Keep credit card usage below 30% of the limit.\n\
         - Avoid several new loan applications in a short period.\n\n\
         Whenever you're ready, reply with one of the options below.",
    );
    out
}

// =============================
// Secured loans
// =============================

pub fn secured_offer(offer: &SecuredLoanOffer) -> String {
    format!(
        "Perfect choice. Let me explain your Secured Loan option.\n\n\
         Collateral: {} (Value: {})\n\n\
         Loan Offer:\n\
         - Maximum Amount: {}\n\
         - Interest Rate: {}% p.a.\n\
         - Tenure: {} to {} months\n\
         - Processing Fee: {}\n\n\
         How much would you like to borrow? (Max: {})",
        offer.description,
        format_inr(offer.collateral.value),
        format_inr(offer.max_amount),
        offer.interest_rate,
        offer.min_tenure_months,
        offer.max_tenure_months,
        offer.processing_fee,
        format_inr(offer.max_amount)
    )
}

pub const NO_COLLATERAL: &str = "I don't see any collateral on your profile, so a secured loan isn't available right now.";

pub fn no_collateral_on_file(loan: &LoanRequest) -> String {
    match (loan.amount, loan.tenure_months, loan.emi) {
        (Some(amount), Some(tenure), Some(emi)) => format!(
            "{} Your unsecured offer still stands: {} over {} months at an EMI of {}. Shall we go ahead with it?",
            NO_COLLATERAL,
            format_inr(amount),
            tenure,
            format_inr(emi)
        ),
        _ => format!("{} Let's continue with an unsecured loan. How much would you like to borrow?", NO_COLLATERAL),
    }
}

pub fn secured_amount_prompt(max_amount: u64) -> String {
    format!("Please specify an amount up to {}.", format_inr(max_amount))
}

pub fn secured_over_limit(max_amount: u64) -> String {
    format!(
        "That exceeds the limit. Maximum allowed is {}. Would you like the maximum?",
        format_inr(max_amount)
    )
}

pub fn secured_approved(amount: u64, tenure_months: u32, interest_rate: f64, emi: u64) -> String {
    format!(
        "Excellent. Your Secured Loan of {} is APPROVED.\n\n\
         Loan Details:\n\
         - Tenure: {} months\n\
         - Interest: {}%\n\
         - EMI: {}",
        format_inr(amount),
        tenure_months,
        interest_rate,
        format_inr(emi)
    )
}

// =============================
// Approval and Q&A
// =============================

pub fn letter_issued(path: &Path) -> String {
    format!(
        "Sanction Letter Generated: {}\n\nOur team will contact you shortly. \
         Is there anything else you would like to know about your loan?",
        path.display()
    )
}

pub fn letter_failed(error: &str) -> String {
    format!(
        "Your loan is approved, but I couldn't generate the sanction letter ({}). \
         Our team will send it to you shortly. Is there anything else you would like to know about your loan?",
        error
    )
}

pub const QA_FALLBACK: &str =
    "I can answer any questions about your loan terms or the difference between secured and unsecured loans.";

pub const NEW_LOAN_REDIRECT: &str = "Your current application is complete. \
To apply for another loan, please type 'restart' and we'll begin a fresh application.";

pub fn qa_system_prompt(customer: Option<&CustomerProfile>, loan: &LoanRequest, decision: &str) -> String {
    format!(
        "You are a helpful bank agent. The customer has just completed their loan application.\n\
         Answer their questions simply and clearly.\n\
         DO NOT use Markdown tables. Use bullet points or simple paragraphs.\n\
         DO NOT use asterisks or emojis.\n\
         Keep answers short and human-like.\n\
         Never start a new loan application in this conversation. If the customer asks for another loan, \
         tell them to type 'restart'.\n\n\
         APPROVED LOAN:\n\
         - Customer: {}\n\
         - Decision: {}\n\
         - Type: {}\n\
         - Amount: {}\n\
         - Tenure: {} months\n\
         - Interest rate: {}% p.a.\n\
         - EMI: {}",
        customer.map(|c| c.name.as_str()).unwrap_or("Customer"),
        decision,
        loan.loan_type,
        format_inr(loan.amount.unwrap_or_default()),
        loan.tenure_months.unwrap_or_default(),
        loan.interest_rate.unwrap_or_default(),
        format_inr(loan.emi.unwrap_or_default())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollateralType, LoanPurpose};

    #[test]
    fn test_menu_numbering() {
        let menu = RejectionMenu {
            options: vec![
                RejectionOption::LowerAmount(1_020_000),
                RejectionOption::SecuredLoan {
                    kind: CollateralType::Property,
                    max_amount: 2_925_000,
                },
                RejectionOption::AcceptPreApproved(500_000),
                RejectionOption::Counseling,
            ],
        };
        let text = rejection_menu(&menu);

        assert!(text.contains("1. Try a lower amount: ₹10,20,000 (Reply 'Option 1')"));
        assert!(text.contains("2. Secured Loan: Get up to ₹29,25,000 using your Property (Reply 'Option 2')"));
        assert!(text.contains("3. Accept Pre-approved: ₹5,00,000 (Reply 'Option 3')"));
        assert!(text.contains("4. Talk to a credit counselor (Reply 'Option 4')"));
    }

    #[test]
    fn test_verification_summary_fields() {
        let customer: CustomerProfile = serde_json::from_value(serde_json::json!({
            "customer_id": "C01",
            "name": "Riya Sharma",
            "phone": "7303201137",
            "address": "Rohini, Delhi"
        }))
        .unwrap();
        let loan = LoanRequest {
            amount: Some(300_000),
            tenure_months: Some(24),
            purpose: Some(LoanPurpose::HomeRenovation),
            emi: Some(13_983),
            ..Default::default()
        };

        let summary = verification_summary(&customer, &loan);
        assert!(summary.contains("- Amount: ₹3,00,000"));
        assert!(summary.contains("- Purpose: home renovation"));
        assert!(summary.contains("- Tenure: 24 months"));
        assert!(summary.contains("- Email: Not provided"));
        assert!(summary.ends_with("Is this correct? (Yes/No)"));
    }

    #[test]
    fn test_replies_have_no_markup() {
        for text in [WELCOME, PROFILE_FOUND, WHICH_DETAIL, SALARY_SLIP_REQUIRED, QA_FALLBACK] {
            assert!(!text.contains('*'));
        }
    }
}
