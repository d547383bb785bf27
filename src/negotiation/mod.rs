//! Negotiation engine
//!
//! Collects amount, tenure and purpose over several turns, prices the
//! request once complete, and lets the language model phrase the replies.

use crate::classifier::IntentClassifier;
use crate::extraction::{backfill_slots, parse_marker, strip_markers};
use crate::llm::{LanguageModel, SamplingParams};
use crate::memory::ConversationHistory;
use crate::models::{CustomerProfile, LoanRequest};
use crate::pricing::price_request;
use std::iter;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod prompt;
pub use prompt::{build_system_prompt, template_reply, DEFAULT_PERSONALITY};

/// History tag for turns handled by negotiation
pub const NEEDS_ASSESSMENT: &str = "needs_assessment";

pub const FALLBACK_REPLY: &str =
    "I'd love to help you with your loan! Could you tell me more about what you're looking for?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationMode {
    GatherInfo,
    PresentEmi,
}

#[derive(Debug, Clone)]
pub struct NegotiationOutcome {
    pub reply: String,
    /// amount, tenure and purpose are all known
    pub is_complete: bool,
    /// The customer accepted (or the model finalized) the terms in `loan`
    pub finalized: bool,
    pub loan: LoanRequest,
    pub mode: NegotiationMode,
}

pub struct NegotiationEngine {
    llm: Option<Arc<dyn LanguageModel>>,
    params: SamplingParams,
    history_window: usize,
}

impl NegotiationEngine {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>, params: SamplingParams, history_window: usize) -> Self {
        Self {
            llm,
            params,
            history_window,
        }
    }

    /// Template-only engine
    pub fn offline() -> Self {
        Self::new(None, SamplingParams::default(), 10)
    }

    /// Run one negotiation turn. Never fails: model errors produce a
    /// fallback reply with `known` returned unchanged.
    pub async fn negotiate(
        &self,
        user_message: &str,
        customer: &CustomerProfile,
        history: &ConversationHistory,
        known: &LoanRequest,
        personality: &str,
    ) -> NegotiationOutcome {
        let loan = merge_slots(user_message, customer, history, known);
        let is_complete = loan.is_complete();
        let mode = if is_complete {
            NegotiationMode::PresentEmi
        } else {
            NegotiationMode::GatherInfo
        };

        // An offer already on the table, restated unchanged, and a plain yes
        let accepted = is_complete
            && known.emi.is_some()
            && loan.same_terms(known)
            && IntentClassifier::is_affirmative(user_message);

        debug!(?mode, accepted, amount = ?loan.amount, tenure = ?loan.tenure_months, "Negotiation slots merged");

        let Some(llm) = &self.llm else {
            return NegotiationOutcome {
                reply: if accepted {
                    String::new()
                } else {
                    template_reply(customer, &loan, mode)
                },
                is_complete,
                finalized: accepted,
                loan,
                mode,
            };
        };

        let system_prompt = build_system_prompt(customer, &loan, mode, personality);
        let context = history.window(self.history_window);

        let raw_reply = match llm.generate(&system_prompt, &context, user_message, &self.params).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Negotiation model call failed, using fallback reply");
                return NegotiationOutcome {
                    reply: FALLBACK_REPLY.to_string(),
                    is_complete: false,
                    finalized: false,
                    loan: known.clone(),
                    mode,
                };
            }
        };

        if let Some(marker) = parse_marker(&raw_reply) {
            let mut finalized_loan = loan.clone();
            finalized_loan.amount = Some(marker.amount);
            finalized_loan.tenure_months = Some(marker.tenure_months);
            finalized_loan.purpose = Some(marker.purpose);
            price_request(&mut finalized_loan, customer);

            info!(
                amount = marker.amount,
                tenure = marker.tenure_months,
                purpose = %marker.purpose,
                "Loan terms finalized by marker"
            );

            return NegotiationOutcome {
                reply: strip_markers(&raw_reply),
                is_complete: true,
                finalized: true,
                loan: finalized_loan,
                mode,
            };
        }

        NegotiationOutcome {
            reply: strip_markers(&raw_reply),
            is_complete,
            finalized: accepted,
            loan,
            mode,
        }
    }
}

/// Slots from the current message overwrite known values; older
/// negotiation turns only fill slots that are still empty.
fn merge_slots(
    user_message: &str,
    customer: &CustomerProfile,
    history: &ConversationHistory,
    known: &LoanRequest,
) -> LoanRequest {
    let current = backfill_slots(iter::once(user_message));
    let earlier = backfill_slots(history.user_messages_for(NEEDS_ASSESSMENT));

    let mut loan = known.clone();
    loan.amount = current.amount.or(loan.amount).or(earlier.amount);
    loan.tenure_months = current.tenure_months.or(loan.tenure_months).or(earlier.tenure_months);
    loan.purpose = current.purpose.or(loan.purpose).or(earlier.purpose);

    if !loan.same_terms(known) {
        loan.interest_rate = None;
        loan.emi = None;
    }
    price_request(&mut loan, customer);
    loan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLanguageModel;
    use crate::models::LoanPurpose;

    fn customer() -> CustomerProfile {
        serde_json::from_value(serde_json::json!({
            "customer_id": "C01",
            "name": "Riya Sharma",
            "phone": "7303201137",
            "monthly_income": 60000,
            "pre_approved_limit": 500000,
            "credit_score": 782
        }))
        .unwrap()
    }

    fn scripted(replies: &[&str]) -> (Arc<ScriptedLanguageModel>, NegotiationEngine) {
        let model = Arc::new(ScriptedLanguageModel::new(replies.iter().copied()));
        let engine = NegotiationEngine::new(
            Some(model.clone() as Arc<dyn LanguageModel>),
            SamplingParams::default(),
            10,
        );
        (model, engine)
    }

    #[tokio::test]
    async fn test_gather_mode_until_complete() {
        let (model, engine) = scripted(&["How long would you like to repay?"]);
        let history = ConversationHistory::new();

        let outcome = engine
            .negotiate("I need 5 lakh for my wedding", &customer(), &history, &LoanRequest::default(), DEFAULT_PERSONALITY)
            .await;

        assert_eq!(outcome.mode, NegotiationMode::GatherInfo);
        assert!(!outcome.is_complete);
        assert!(!outcome.finalized);
        assert_eq!(outcome.loan.amount, Some(500_000));
        assert_eq!(outcome.loan.purpose, Some(LoanPurpose::Wedding));
        assert!(outcome.loan.emi.is_none());
        assert!(model.calls()[0].system_prompt.contains("Do NOT mention EMI"));
    }

    #[tokio::test]
    async fn test_complete_request_is_priced() {
        let (model, engine) = scripted(&["Your EMI would be about 16,000. Does that work?"]);
        let mut history = ConversationHistory::new();
        history.record_turn(NEEDS_ASSESSMENT, "I need 5 lakh for my wedding", "For how long?");
        let known = LoanRequest {
            amount: Some(500_000),
            purpose: Some(LoanPurpose::Wedding),
            ..Default::default()
        };

        let outcome = engine
            .negotiate("3 years", &customer(), &history, &known, DEFAULT_PERSONALITY)
            .await;

        assert_eq!(outcome.mode, NegotiationMode::PresentEmi);
        assert!(outcome.is_complete);
        assert!(!outcome.finalized);
        assert_eq!(outcome.loan.tenure_months, Some(36));
        assert!(outcome.loan.emi.is_some());
        assert!(model.calls()[0].system_prompt.contains("CALCULATED OFFER"));
    }

    #[tokio::test]
    async fn test_latest_correction_wins() {
        let (_, engine) = scripted(&["Okay, 7 lakh it is."]);
        let mut history = ConversationHistory::new();
        history.record_turn(NEEDS_ASSESSMENT, "5 lakh for business", "Tenure?");
        history.record_turn(NEEDS_ASSESSMENT, "wait, 5 years", "Noted.");
        let known = LoanRequest {
            amount: Some(500_000),
            tenure_months: Some(60),
            purpose: Some(LoanPurpose::Business),
            ..Default::default()
        };

        let outcome = engine
            .negotiate("actually 7 lakh", &customer(), &history, &known, DEFAULT_PERSONALITY)
            .await;

        assert_eq!(outcome.loan.amount, Some(700_000));
        assert_eq!(outcome.loan.tenure_months, Some(60));
        assert_eq!(outcome.loan.purpose, Some(LoanPurpose::Business));
    }

    #[tokio::test]
    async fn test_marker_overrides_heuristics_and_is_stripped() {
        let (_, engine) = scripted(&[
            "Wonderful, let's lock it in!\n[EXTRACTION:amount=700000,tenure=60,purpose=business]",
        ]);
        let history = ConversationHistory::new();

        let outcome = engine
            .negotiate("ok 6 lakh is fine", &customer(), &history, &LoanRequest::default(), DEFAULT_PERSONALITY)
            .await;

        assert!(outcome.finalized);
        assert!(outcome.is_complete);
        assert_eq!(outcome.loan.amount, Some(700_000));
        assert_eq!(outcome.loan.tenure_months, Some(60));
        assert_eq!(outcome.loan.purpose, Some(LoanPurpose::Business));
        assert!(outcome.loan.emi.is_some());
        assert_eq!(outcome.reply, "Wonderful, let's lock it in!");
    }

    #[tokio::test]
    async fn test_malformed_marker_is_ignored() {
        let (_, engine) = scripted(&["Done [EXTRACTION:amount=lots,tenure=60,purpose=business]"]);
        let history = ConversationHistory::new();

        let outcome = engine
            .negotiate("hello", &customer(), &history, &LoanRequest::default(), DEFAULT_PERSONALITY)
            .await;

        assert!(!outcome.finalized);
        assert!(outcome.loan.amount.is_none());
        assert_eq!(outcome.reply, "Done");
    }

    #[tokio::test]
    async fn test_model_failure_keeps_known_fields() {
        let (model, engine) = scripted(&[]);
        model.push_failure("timeout");
        let history = ConversationHistory::new();
        let known = LoanRequest {
            amount: Some(400_000),
            ..Default::default()
        };

        let outcome = engine
            .negotiate("for 2 years, travel", &customer(), &history, &known, DEFAULT_PERSONALITY)
            .await;

        assert_eq!(outcome.reply, FALLBACK_REPLY);
        assert!(!outcome.is_complete);
        assert_eq!(outcome.loan, known);
    }

    #[tokio::test]
    async fn test_offline_acceptance_of_presented_offer() {
        let engine = NegotiationEngine::offline();
        let history = ConversationHistory::new();

        let presented = engine
            .negotiate("3 lakh for travel over 2 years", &customer(), &history, &LoanRequest::default(), DEFAULT_PERSONALITY)
            .await;
        assert!(presented.is_complete);
        assert!(!presented.finalized);
        assert!(presented.reply.contains("Your EMI would be"));

        let accepted = engine
            .negotiate("yes, that works", &customer(), &history, &presented.loan, DEFAULT_PERSONALITY)
            .await;
        assert!(accepted.finalized);
        assert_eq!(accepted.loan, presented.loan);
    }

    #[tokio::test]
    async fn test_onboarding_answers_are_not_loan_amounts() {
        let engine = NegotiationEngine::offline();
        let mut history = ConversationHistory::new();
        history.record_turn("new_customer_onboarding", "60000", "Any collateral?");

        let outcome = engine
            .negotiate("I want a loan for a trip", &customer(), &history, &LoanRequest::default(), DEFAULT_PERSONALITY)
            .await;

        assert!(outcome.loan.amount.is_none());
        assert_eq!(outcome.loan.purpose, Some(LoanPurpose::Travel));
    }
}
