//! Stage handlers
//!
//! One handler per `Stage`. `handler_for` is the total dispatch table.

use super::replies;
use super::LoanOrchestrator;
use crate::classifier::{DetailField, DocumentCommand, IntentClassifier, RejectionIntent};
use crate::error::AssistantError;
use crate::extraction::{
    extract_amount, extract_amount_lakh_scaled, extract_email, extract_phone, extract_tenure, parse_income,
};
use crate::models::{CustomerProfile, Decision, FinalDecision, LoanPurpose, LoanType, RejectionCause};
use crate::negotiation::{NegotiationMode, NegotiationOutcome, FALLBACK_REPLY};
use crate::pricing::{calculate_emi, price_request};
use crate::secured::describe_collateral;
use crate::state::{OnboardingStep, PendingInteraction, RejectionOption, Session, Stage};
use crate::tools::credit::{credit_report, DEFAULT_CREDIT_SCORE};
use crate::tools::customers::customer_id_for_phone;
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

/// Pre-approved limit cap for customers onboarded in chat
pub const MAX_ONBOARDING_LIMIT: u64 = 500_000;

const NO_COLLATERAL_ANSWERS: &[&str] = &[
    "none", "no", "nothing", "nil", "na", "n/a", "don't have", "dont have", "nahi",
];

static ADDRESS_UPDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)address\s*(?:is|to|:|->)\s*(.+)").unwrap());
static NAME_UPDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)name\s*(?:is|to|:|->)\s*([a-zA-Z\s.]+)").unwrap());

/// What the orchestrator does after a handler returns
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    /// Reply and wait for the customer
    Reply(String),
    /// Reply, then run the new stage's handler without input
    Continue(String),
    /// Run the new stage's handler on the same input, after the optional lead text
    Reprocess(Option<String>),
}

#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(
        &self,
        agent: &LoanOrchestrator,
        session: &mut Session,
        input: &str,
    ) -> Result<NextAction>;
}

pub fn handler_for(stage: Stage) -> &'static dyn StageHandler {
    match stage {
        Stage::Initial => &InitialHandler,
        Stage::NewCustomerOnboarding => &OnboardingHandler,
        Stage::NeedsAssessment => &NeedsAssessmentHandler,
        Stage::Verification => &VerificationHandler,
        Stage::CreditCheck => &CreditCheckHandler,
        Stage::Underwriting => &UnderwritingHandler,
        Stage::DocumentUpload => &DocumentUploadHandler,
        Stage::Rejection => &RejectionHandler,
        Stage::SecuredLoan => &SecuredLoanHandler,
        Stage::Approval | Stage::Completed => &PostDecisionHandler,
    }
}

fn missing(what: &str, session: &Session) -> AssistantError {
    AssistantError::StateError(format!("{} missing in stage {}", what, session.stage()))
}

fn require_customer(session: &Session) -> Result<&CustomerProfile> {
    session
        .customer
        .as_ref()
        .ok_or_else(|| missing("Customer profile", session))
}

/// Blank profile for a phone number the directory doesn't know
fn new_customer_profile(phone: &str) -> CustomerProfile {
    CustomerProfile {
        customer_id: customer_id_for_phone(phone),
        name: String::new(),
        phone: phone.to_string(),
        age: 30,
        city: String::new(),
        address: String::new(),
        email: String::new(),
        monthly_income: 0,
        pre_approved_limit: 0,
        credit_score: DEFAULT_CREDIT_SCORE,
        employment: "Salaried".to_string(),
        company: None,
        current_loans: None,
        collateral: None,
        safety_score: None,
        safety_explanation: None,
    }
}

// =============================
// initial
// =============================

pub struct InitialHandler;

#[async_trait]
impl StageHandler for InitialHandler {
    async fn handle(&self, agent: &LoanOrchestrator, session: &mut Session, input: &str) -> Result<NextAction> {
        let Some(phone) = extract_phone(input) else {
            return Ok(NextAction::Reply(replies::INVALID_PHONE.to_string()));
        };

        let found = match agent
            .with_timeout("customer lookup", agent.tools.directory.lookup_customer(&phone))
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Customer lookup failed, onboarding as a new customer");
                None
            }
        };

        match found {
            Some(profile) => {
                info!(session_id = %session.session_id, customer_id = %profile.customer_id, "Existing customer found");
                session.staged_customer = Some(profile);
                session.enter(Stage::Verification, PendingInteraction::ProfilePermission)?;
                Ok(NextAction::Reply(replies::PROFILE_FOUND.to_string()))
            }
            None => {
                info!(session_id = %session.session_id, "No profile for phone, starting onboarding");
                session.staged_customer = Some(new_customer_profile(&phone));
                session.enter(
                    Stage::NewCustomerOnboarding,
                    PendingInteraction::ManualEntry(OnboardingStep::Name),
                )?;
                Ok(NextAction::Reply(replies::PROFILE_NOT_FOUND.to_string()))
            }
        }
    }
}

// =============================
// new_customer_onboarding
// =============================

pub struct OnboardingHandler;

fn declines_collateral(answer: &str) -> bool {
    let lowered = answer.trim().to_lowercase();
    NO_COLLATERAL_ANSWERS.contains(&lowered.trim_end_matches('.'))
}

#[async_trait]
impl StageHandler for OnboardingHandler {
    async fn handle(&self, agent: &LoanOrchestrator, session: &mut Session, input: &str) -> Result<NextAction> {
        let PendingInteraction::ManualEntry(step) = session.pending().clone() else {
            return Err(missing("Onboarding step", session));
        };
        let answer = input.trim();
        let Some(staged) = session.staged_customer.as_mut() else {
            return Err(missing("Staged profile", session));
        };

        let accepted = match step {
            OnboardingStep::Name if answer.chars().any(char::is_alphabetic) => {
                staged.name = answer.to_string();
                true
            }
            OnboardingStep::City if !answer.is_empty() => {
                staged.city = answer.to_string();
                true
            }
            OnboardingStep::Address if !answer.is_empty() => {
                staged.address = answer.to_string();
                true
            }
            OnboardingStep::Email => match extract_email(answer) {
                Some(email) => {
                    staged.email = email;
                    true
                }
                None => false,
            },
            OnboardingStep::Income => match parse_income(answer).filter(|income| *income > 0) {
                Some(income) => {
                    staged.monthly_income = income;
                    staged.pre_approved_limit = income.saturating_mul(10).min(MAX_ONBOARDING_LIMIT);
                    true
                }
                None => false,
            },
            OnboardingStep::Collateral if !answer.is_empty() => {
                staged.collateral = (!declines_collateral(answer)).then(|| answer.to_string());
                true
            }
            _ => false,
        };

        if !accepted {
            return Ok(NextAction::Reply(replies::onboarding_retry(step).to_string()));
        }

        if let Some(next) = step.next() {
            session.set_pending(PendingInteraction::ManualEntry(next))?;
            return Ok(NextAction::Reply(replies::onboarding_question(next).to_string()));
        }

        let Some(mut profile) = session.staged_customer.take() else {
            return Err(missing("Staged profile", session));
        };
        agent.apply_risk_score(&mut profile).await;

        let collateral = profile
            .collateral
            .as_deref()
            .and_then(|description| agent.secured.parse_collateral(description));
        if let Some(parsed) = &collateral {
            profile.collateral = Some(describe_collateral(parsed.kind, parsed.value));
        }
        let reply = replies::onboarding_summary(&profile, collateral.as_ref());

        info!(
            session_id = %session.session_id,
            customer_id = %profile.customer_id,
            pre_approved_limit = profile.pre_approved_limit,
            has_collateral = collateral.is_some(),
            "New customer onboarded"
        );

        session.customer = Some(profile);
        session.enter(Stage::NeedsAssessment, PendingInteraction::None)?;
        Ok(NextAction::Reply(reply))
    }
}

// =============================
// needs_assessment
// =============================

pub struct NeedsAssessmentHandler;

#[async_trait]
impl StageHandler for NeedsAssessmentHandler {
    async fn handle(&self, agent: &LoanOrchestrator, session: &mut Session, input: &str) -> Result<NextAction> {
        let customer = require_customer(session)?;

        if IntentClassifier::wants_secured_loan(input) {
            let Some(offer) = agent.secured.offer(customer) else {
                info!(session_id = %session.session_id, "Secured loan requested without usable collateral");
                return Ok(NextAction::Reply(replies::no_collateral_on_file(&session.loan_request)));
            };
            info!(session_id = %session.session_id, collateral = %offer.collateral.kind, "Customer pivoted to a secured loan");
            let reply = replies::secured_offer(&offer);
            session.enter(Stage::SecuredLoan, PendingInteraction::SecuredLoanAmount(offer))?;
            return Ok(NextAction::Reply(reply));
        }

        let negotiation = agent.negotiation.negotiate(
            input,
            customer,
            &session.history,
            &session.loan_request,
            &agent.settings.personality,
        );
        let outcome = match tokio::time::timeout(agent.settings.external_call_timeout, negotiation).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(session_id = %session.session_id, "Negotiation timed out, using fallback reply");
                NegotiationOutcome {
                    reply: FALLBACK_REPLY.to_string(),
                    is_complete: false,
                    finalized: false,
                    loan: session.loan_request.clone(),
                    mode: NegotiationMode::GatherInfo,
                }
            }
        };

        session.loan_request = outcome.loan;

        if outcome.finalized {
            let summary = replies::verification_summary(require_customer(session)?, &session.loan_request);
            info!(
                session_id = %session.session_id,
                amount = ?session.loan_request.amount,
                tenure = ?session.loan_request.tenure_months,
                emi = ?session.loan_request.emi,
                "Loan terms agreed"
            );
            session.enter(Stage::Verification, PendingInteraction::None)?;
            return Ok(NextAction::Reply(summary));
        }

        Ok(NextAction::Reply(outcome.reply))
    }
}

// =============================
// verification
// =============================

/// Sub-handlers run in a fixed order: profile permission, loan-change
/// redirect, free-text corrections, correction dialogue, yes/no.
pub struct VerificationHandler;

#[async_trait]
impl StageHandler for VerificationHandler {
    async fn handle(&self, agent: &LoanOrchestrator, session: &mut Session, input: &str) -> Result<NextAction> {
        if matches!(session.pending(), PendingInteraction::ProfilePermission) {
            return profile_permission(agent, session, input).await;
        }

        if IntentClassifier::requests_loan_change(input) {
            session.enter(Stage::NeedsAssessment, PendingInteraction::None)?;
            return Ok(NextAction::Reprocess(Some(replies::LOAN_CHANGE.to_string())));
        }

        if let Some(action) = smart_corrections(session, input)? {
            return Ok(action);
        }

        if let PendingInteraction::DetailCorrection(field) = session.pending().clone() {
            if let Some(action) = detail_correction(session, field, input)? {
                return Ok(action);
            }
        }

        confirm_details(session, input)
    }
}

async fn profile_permission(
    agent: &LoanOrchestrator,
    session: &mut Session,
    input: &str,
) -> Result<NextAction> {
    if IntentClassifier::is_affirmative(input) {
        let Some(mut profile) = session.staged_customer.take() else {
            return Err(missing("Staged profile", session));
        };
        agent.apply_risk_score(&mut profile).await;

        let reply = replies::permission_granted(&profile);
        session.customer = Some(profile);
        session.enter(Stage::NeedsAssessment, PendingInteraction::None)?;
        Ok(NextAction::Reply(reply))
    } else if IntentClassifier::is_negative(input) {
        let phone = session
            .staged_customer
            .as_ref()
            .map(|profile| profile.phone.clone())
            .ok_or_else(|| missing("Staged profile", session))?;

        session.staged_customer = Some(new_customer_profile(&phone));
        session.enter(
            Stage::NewCustomerOnboarding,
            PendingInteraction::ManualEntry(OnboardingStep::Name),
        )?;
        Ok(NextAction::Reply(replies::PERMISSION_DECLINED.to_string()))
    } else {
        Ok(NextAction::Reply(replies::PERMISSION_REPROMPT.to_string()))
    }
}

fn usable_value(value: &str) -> bool {
    !value.is_empty() && !IntentClassifier::is_negative(value)
}

/// "address is X", "name to X" and bare email addresses, applied directly
fn smart_corrections(session: &mut Session, input: &str) -> Result<Option<NextAction>> {
    let Some(customer) = session.customer.as_mut() else {
        return Err(missing("Customer profile", session));
    };
    let mut updated = Vec::new();

    if let Some(address) = ADDRESS_UPDATE
        .captures(input)
        .map(|caps| caps[1].trim().to_string())
        .filter(|address| usable_value(address) && !address.contains('@'))
    {
        customer.address = address;
        updated.push(DetailField::Address.label());
    }

    if let Some(name) = NAME_UPDATE
        .captures(input)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| name.len() > 2 && usable_value(name))
    {
        customer.name = name;
        updated.push(DetailField::Name.label());
    }

    if let Some(email) = extract_email(input) {
        customer.email = email;
        updated.push(DetailField::Email.label());
    }

    if updated.is_empty() {
        return Ok(None);
    }

    let summary = replies::verification_summary(customer, &session.loan_request);
    info!(session_id = %session.session_id, fields = ?updated, "Customer details corrected");
    session.set_pending(PendingInteraction::None)?;
    Ok(Some(NextAction::Reply(replies::details_updated(&updated, &summary))))
}

/// `None` passes the message on to the yes/no check
fn detail_correction(
    session: &mut Session,
    field: Option<DetailField>,
    input: &str,
) -> Result<Option<NextAction>> {
    let Some(field) = field else {
        return match IntentClassifier::detail_field(input) {
            Some(DetailField::Phone) => Ok(Some(NextAction::Reply(replies::PHONE_IMMUTABLE.to_string()))),
            Some(field) => {
                session.set_pending(PendingInteraction::DetailCorrection(Some(field)))?;
                Ok(Some(NextAction::Reply(replies::ask_corrected_value(field.label()))))
            }
            None => Ok(None),
        };
    };

    let value = input.trim();
    let Some(customer) = session.customer.as_mut() else {
        return Err(missing("Customer profile", session));
    };

    let applied = match field {
        DetailField::Phone => {
            return Ok(Some(NextAction::Reply(replies::PHONE_IMMUTABLE.to_string())));
        }
        DetailField::Name if value.len() > 2 => {
            customer.name = value.to_string();
            true
        }
        DetailField::Address if !value.is_empty() => {
            customer.address = value.to_string();
            true
        }
        DetailField::Email => match extract_email(value) {
            Some(email) => {
                customer.email = email;
                true
            }
            None => false,
        },
        _ => false,
    };

    if !applied {
        return Ok(Some(NextAction::Reply(replies::ask_corrected_value(field.label()))));
    }

    let summary = replies::verification_summary(customer, &session.loan_request);
    session.set_pending(PendingInteraction::None)?;
    Ok(Some(NextAction::Reply(replies::details_updated(&[field.label()], &summary))))
}

fn confirm_details(session: &mut Session, input: &str) -> Result<NextAction> {
    if IntentClassifier::is_affirmative(input) {
        require_customer(session)?;
        session.enter(Stage::CreditCheck, PendingInteraction::None)?;
        Ok(NextAction::Continue(replies::VERIFICATION_CONFIRMED.to_string()))
    } else if IntentClassifier::is_negative(input) {
        session.set_pending(PendingInteraction::DetailCorrection(None))?;
        Ok(NextAction::Reply(replies::WHICH_DETAIL.to_string()))
    } else {
        Ok(NextAction::Reply(replies::VERIFICATION_REPROMPT.to_string()))
    }
}

// =============================
// credit_check
// =============================

pub struct CreditCheckHandler;

#[async_trait]
impl StageHandler for CreditCheckHandler {
    async fn handle(&self, agent: &LoanOrchestrator, session: &mut Session, _input: &str) -> Result<NextAction> {
        let customer = require_customer(session)?;
        let profile_score = customer.credit_score;
        let phone = customer.phone.clone();

        let report = match agent
            .with_timeout("credit bureau", agent.tools.credit.score_credit(&phone))
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Credit bureau unavailable, using profile score");
                credit_report(profile_score)
            }
        };

        let score = report.score;
        info!(session_id = %session.session_id, score, bureau = %report.bureau, "Credit score retrieved");
        session.credit_report = Some(report);

        if score < agent.underwriting.policy().min_credit_score {
            let menu = agent.enter_rejection(session, RejectionCause::CreditScore)?;
            return Ok(NextAction::Reply(format!("{}\n{}", replies::credit_too_low(score), menu)));
        }

        session.enter(Stage::Underwriting, PendingInteraction::None)?;
        Ok(NextAction::Continue(replies::credit_ok(score)))
    }
}

// =============================
// underwriting
// =============================

pub struct UnderwritingHandler;

#[async_trait]
impl StageHandler for UnderwritingHandler {
    async fn handle(&self, agent: &LoanOrchestrator, session: &mut Session, _input: &str) -> Result<NextAction> {
        let customer = require_customer(session)?;
        let score = session
            .credit_report
            .as_ref()
            .map(|report| report.score)
            .unwrap_or(customer.credit_score);

        let outcome = agent.underwriting.evaluate(customer, &session.loan_request, score)?;
        let decision = outcome.decision;
        let cause = outcome.rejection.unwrap_or(RejectionCause::AmountOverLimit);
        let ceiling = outcome.suggested_amount;
        session.underwriting = Some(outcome);

        match decision {
            Decision::Approved => {
                let letter = agent.finalize_approval(session, FinalDecision::Approved).await?;
                Ok(NextAction::Reply(format!("{}\n{}", replies::LOAN_APPROVED, letter)))
            }
            Decision::RequiresSalarySlip => {
                session.enter(Stage::DocumentUpload, PendingInteraction::None)?;
                Ok(NextAction::Reply(replies::SALARY_SLIP_REQUIRED.to_string()))
            }
            Decision::Rejected => {
                let lead = match cause {
                    RejectionCause::CreditScore => replies::credit_too_low(score),
                    _ => replies::amount_over_limit(session.loan_request.amount.unwrap_or_default(), ceiling),
                };
                let menu = agent.enter_rejection(session, cause)?;
                Ok(NextAction::Reply(format!("{}\n{}", lead, menu)))
            }
        }
    }
}

// =============================
// document_upload
// =============================

pub struct DocumentUploadHandler;

#[async_trait]
impl StageHandler for DocumentUploadHandler {
    async fn handle(&self, agent: &LoanOrchestrator, session: &mut Session, input: &str) -> Result<NextAction> {
        match IntentClassifier::document_command(input) {
            Some(DocumentCommand::Skip) => {
                let menu = agent.enter_rejection(session, RejectionCause::DocumentsSkipped)?;
                Ok(NextAction::Reply(menu))
            }
            Some(DocumentCommand::Upload) => {
                let customer = require_customer(session)?.clone();

                let salary = match agent
                    .with_timeout("salary slip", agent.tools.documents.upload_and_extract_salary(&customer))
                    .await
                {
                    Ok(extraction) if extraction.success => extraction.monthly_salary.filter(|s| *s > 0),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(error = %e, "Salary slip processing failed");
                        None
                    }
                };
                let Some(salary) = salary else {
                    return Ok(NextAction::Reply(replies::DOCUMENT_FAILED.to_string()));
                };

                let emi = session
                    .loan_request
                    .emi
                    .ok_or_else(|| missing("EMI", session))?;
                let assessment = agent.underwriting.evaluate_with_salary(salary, emi)?;
                let ratio = assessment.emi_ratio_pct;
                let decision = assessment.decision;
                session.salary_assessment = Some(assessment);

                if decision == Decision::Approved {
                    let letter = agent.finalize_approval(session, FinalDecision::Approved).await?;
                    Ok(NextAction::Reply(format!(
                        "{}\n\n{}\n{}",
                        replies::salary_verified(salary, ratio),
                        replies::LOAN_APPROVED,
                        letter
                    )))
                } else {
                    let menu = agent.enter_rejection(session, RejectionCause::EmiRatio)?;
                    Ok(NextAction::Reply(format!(
                        "{}\n{}",
                        replies::salary_insufficient(salary, ratio),
                        menu
                    )))
                }
            }
            None => Ok(NextAction::Reply(replies::DOCUMENT_REPROMPT.to_string())),
        }
    }
}

// =============================
// rejection
// =============================

pub struct RejectionHandler;

fn offers(option: &RejectionOption, intent: RejectionIntent) -> bool {
    matches!(
        (option, intent),
        (RejectionOption::LowerAmount(_), RejectionIntent::LowerAmount)
            | (RejectionOption::SecuredLoan { .. }, RejectionIntent::SecuredLoan)
            | (RejectionOption::AcceptPreApproved(_), RejectionIntent::AcceptPreApproved)
            | (RejectionOption::Counseling, RejectionIntent::Counseling)
    )
}

/// New amount on the current terms, repriced
fn reprice_with_amount(session: &mut Session, amount: u64) -> Result<()> {
    let Some(customer) = session.customer.as_ref() else {
        return Err(missing("Customer profile", session));
    };
    let loan = &mut session.loan_request;

    loan.amount = Some(amount);
    loan.interest_rate = None;
    loan.emi = None;
    loan.purpose.get_or_insert(LoanPurpose::Personal);
    price_request(loan, customer);
    Ok(())
}

#[async_trait]
impl StageHandler for RejectionHandler {
    async fn handle(&self, agent: &LoanOrchestrator, session: &mut Session, input: &str) -> Result<NextAction> {
        let PendingInteraction::RejectionChoice(menu) = session.pending().clone() else {
            return Err(missing("Rejection menu", session));
        };

        let number = IntentClassifier::menu_number(input);
        let intent = IntentClassifier::rejection_intent(input);
        let choice = number
            .and_then(|n| menu.option(n).cloned())
            .or_else(|| intent.and_then(|i| menu.options.iter().find(|o| offers(o, i)).cloned()));

        // "reduce the amount" picks the menu option; new figures renegotiate
        let states_terms = extract_amount(input).is_some() || extract_tenure(input).is_some();
        if IntentClassifier::requests_loan_change(input) && (states_terms || choice.is_none()) {
            session.enter(Stage::NeedsAssessment, PendingInteraction::None)?;
            return Ok(NextAction::Reprocess(Some(replies::LOAN_CHANGE.to_string())));
        }

        let Some(choice) = choice else {
            let menu_text = replies::rejection_menu(&menu);
            return Ok(NextAction::Reply(if number.is_some() || intent.is_some() {
                format!("{}\n{}", replies::OPTION_UNAVAILABLE, menu_text)
            } else {
                menu_text
            }));
        };

        info!(session_id = %session.session_id, ?choice, "Rejection option chosen");

        match choice {
            RejectionOption::LowerAmount(amount) => {
                reprice_with_amount(session, amount)?;
                session.enter(Stage::Underwriting, PendingInteraction::None)?;
                Ok(NextAction::Continue(replies::retry_lower_amount(amount)))
            }
            RejectionOption::SecuredLoan { .. } => {
                let offer = agent
                    .secured
                    .offer(require_customer(session)?)
                    .ok_or_else(|| missing("Usable collateral", session))?;
                let reply = replies::secured_offer(&offer);
                session.enter(Stage::SecuredLoan, PendingInteraction::SecuredLoanAmount(offer))?;
                Ok(NextAction::Reply(reply))
            }
            RejectionOption::AcceptPreApproved(amount) => {
                reprice_with_amount(session, amount)?;
                let letter = agent.finalize_approval(session, FinalDecision::Approved).await?;
                Ok(NextAction::Reply(format!("{}\n{}", replies::accept_pre_approved(amount), letter)))
            }
            RejectionOption::Counseling => Ok(NextAction::Reply(format!(
                "{}\n\n{}",
                replies::counseling(session.credit_report.as_ref()),
                replies::rejection_menu(&menu)
            ))),
        }
    }
}

// =============================
// secured_loan
// =============================

pub struct SecuredLoanHandler;

#[async_trait]
impl StageHandler for SecuredLoanHandler {
    async fn handle(&self, agent: &LoanOrchestrator, session: &mut Session, input: &str) -> Result<NextAction> {
        let PendingInteraction::SecuredLoanAmount(offer) = session.pending().clone() else {
            return Err(missing("Secured loan offer", session));
        };

        let requested = if IntentClassifier::wants_maximum(input) {
            Some(offer.max_amount)
        } else {
            extract_amount_lakh_scaled(input)
                .or_else(|| IntentClassifier::is_affirmative(input).then_some(offer.max_amount))
        };

        let Some(amount) = requested.filter(|amount| *amount > 0) else {
            return Ok(NextAction::Reply(replies::secured_amount_prompt(offer.max_amount)));
        };
        if amount > offer.max_amount {
            return Ok(NextAction::Reply(replies::secured_over_limit(offer.max_amount)));
        }

        let tenure = extract_tenure(input)
            .unwrap_or(offer.max_tenure_months)
            .clamp(offer.min_tenure_months, offer.max_tenure_months);
        let emi = calculate_emi(amount, offer.interest_rate, tenure);

        let loan = &mut session.loan_request;
        loan.amount = Some(amount);
        loan.tenure_months = Some(tenure);
        loan.interest_rate = Some(offer.interest_rate);
        loan.emi = Some(emi);
        loan.loan_type = LoanType::Secured;
        loan.collateral = Some(offer.description.clone());
        loan.purpose.get_or_insert(LoanPurpose::Personal);

        info!(
            session_id = %session.session_id,
            amount,
            tenure,
            emi,
            collateral = %offer.collateral.kind,
            "Secured loan terms set"
        );

        let letter = agent.finalize_approval(session, FinalDecision::ApprovedSecured).await?;
        Ok(NextAction::Reply(format!(
            "{}\n\n{}",
            replies::secured_approved(amount, tenure, offer.interest_rate, emi),
            letter
        )))
    }
}

// =============================
// approval / completed
// =============================

/// Post-decision Q&A; never starts a new application
pub struct PostDecisionHandler;

#[async_trait]
impl StageHandler for PostDecisionHandler {
    async fn handle(&self, agent: &LoanOrchestrator, session: &mut Session, input: &str) -> Result<NextAction> {
        if IntentClassifier::wants_new_application(input) {
            return Ok(NextAction::Reply(replies::NEW_LOAN_REDIRECT.to_string()));
        }

        let Some(llm) = &agent.llm else {
            return Ok(NextAction::Reply(replies::QA_FALLBACK.to_string()));
        };

        let decision = session
            .final_decision
            .map(|d| d.to_string())
            .unwrap_or_else(|| "APPROVED".to_string());
        let prompt = replies::qa_system_prompt(session.customer.as_ref(), &session.loan_request, &decision);
        let context = session.history.window(agent.settings.qa_history_window);

        let answer = agent
            .with_timeout(
                "post-decision answer",
                llm.generate(&prompt, &context, input, &agent.settings.qa_params),
            )
            .await;

        match answer {
            Ok(answer) if !answer.trim().is_empty() => Ok(NextAction::Reply(answer.trim().to_string())),
            Ok(_) => Ok(NextAction::Reply(replies::QA_FALLBACK.to_string())),
            Err(e) => {
                warn!(error = %e, "Post-decision answer failed, using fallback");
                Ok(NextAction::Reply(replies::QA_FALLBACK.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_stage_has_a_handler() {
        // exhaustive by construction; this just exercises the table
        for stage in [
            Stage::Initial,
            Stage::NewCustomerOnboarding,
            Stage::NeedsAssessment,
            Stage::Verification,
            Stage::CreditCheck,
            Stage::Underwriting,
            Stage::DocumentUpload,
            Stage::Rejection,
            Stage::SecuredLoan,
            Stage::Approval,
            Stage::Completed,
        ] {
            let _ = handler_for(stage);
        }
    }

    #[test]
    fn test_collateral_declines() {
        for answer in ["none", "No", "nothing.", "don't have", "NAHI"] {
            assert!(declines_collateral(answer), "{}", answer);
        }
        assert!(!declines_collateral("gold worth 2 lakh"));
    }

    #[test]
    fn test_smart_correction_patterns() {
        let caps = ADDRESS_UPDATE.captures("please change address to 12 MG Road, Pune").unwrap();
        assert_eq!(caps[1].trim(), "12 MG Road, Pune");

        let caps = NAME_UPDATE.captures("my name is Riya S. Sharma").unwrap();
        assert_eq!(caps[1].trim(), "Riya S. Sharma");

        // a complaint is not a value
        let caps = NAME_UPDATE.captures("the name is wrong").unwrap();
        assert!(!usable_value(caps[1].trim()));
    }

    #[test]
    fn test_new_customer_defaults() {
        let profile = new_customer_profile("9876543210");
        assert_eq!(profile.credit_score, 700);
        assert_eq!(profile.age, 30);
        assert_eq!(profile.employment, "Salaried");
        assert!(profile.customer_id.starts_with('C'));
    }
}
