//! Conversation orchestrator
//!
//! One customer message in, one reply out. The session's stage picks the
//! handler; handlers may chain (credit check straight into underwriting)
//! within a single turn. Errors never reach the customer: the session is
//! reset and a recovery message is sent instead.

pub mod handlers;
pub mod replies;

pub use handlers::{handler_for, NextAction, StageHandler};

use crate::audit::{ApplicationLog, ApplicationRecord};
use crate::classifier::IntentClassifier;
use crate::config::AppConfig;
use crate::error::AssistantError;
use crate::llm::{GeminiClient, LanguageModel, SamplingParams};
use crate::memory::ConversationMessage;
use crate::models::{CustomerProfile, FinalDecision, RejectionCause};
use crate::negotiation::{NegotiationEngine, DEFAULT_PERSONALITY};
use crate::secured::SecuredLoanEngine;
use crate::state::{PendingInteraction, RejectionMenu, RejectionOption, Session, Stage, DEFAULT_LANGUAGE};
use crate::tools::{create_default_toolkit, neutral_risk, Toolkit};
use crate::underwriting::{suggest_lower_amount, UnderwritingEngine};
use crate::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Synthetic first message sent by chat front-ends
pub const INIT_COMMAND: &str = "__INIT__";

/// Handlers chained in one turn before the session is considered stuck
const MAX_CHAINED_HANDLERS: usize = 6;

const QA_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub negotiation: SamplingParams,
    pub history_window: usize,
    pub qa_params: SamplingParams,
    pub qa_history_window: usize,
    pub external_call_timeout: Duration,
    pub personality: String,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            negotiation: SamplingParams {
                temperature: config.negotiation_temperature,
                max_tokens: config.negotiation_max_tokens,
            },
            history_window: config.history_window,
            qa_params: SamplingParams {
                temperature: QA_TEMPERATURE,
                max_tokens: config.qa_max_tokens,
            },
            qa_history_window: config.qa_history_window,
            external_call_timeout: config.external_call_timeout(),
            personality: DEFAULT_PERSONALITY.to_string(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Reply to one customer message
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub reply: String,
    pub stage: Stage,
    pub final_decision: Option<FinalDecision>,
}

impl TurnReply {
    fn from_session(session: &Session, reply: String) -> Self {
        Self {
            reply,
            stage: session.stage(),
            final_decision: session.final_decision,
        }
    }
}

pub struct LoanOrchestrator {
    tools: Toolkit,
    negotiation: NegotiationEngine,
    underwriting: UnderwritingEngine,
    secured: SecuredLoanEngine,
    llm: Option<Arc<dyn LanguageModel>>,
    applications: Arc<ApplicationLog>,
    settings: OrchestratorSettings,
}

impl LoanOrchestrator {
    pub fn new(
        tools: Toolkit,
        llm: Option<Arc<dyn LanguageModel>>,
        applications: Arc<ApplicationLog>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            negotiation: NegotiationEngine::new(llm.clone(), settings.negotiation, settings.history_window),
            underwriting: UnderwritingEngine::default(),
            secured: SecuredLoanEngine::new(),
            tools,
            llm,
            applications,
            settings,
        }
    }

    pub fn applications(&self) -> &ApplicationLog {
        &self.applications
    }

    /// Welcome text; recorded only at the start of a conversation
    pub fn greeting(&self, session: &mut Session) -> TurnReply {
        if session.history.is_empty() {
            session
                .history
                .add_message(ConversationMessage::assistant(replies::WELCOME));
        }
        TurnReply::from_session(session, replies::WELCOME.to_string())
    }

    /// Process one customer message
    pub async fn handle_message(&self, session: &mut Session, message: &str) -> TurnReply {
        session.touch();
        let message = message.trim();

        if message == INIT_COMMAND {
            let mut turn = self.greeting(session);
            turn.reply = self.to_customer_language(session, &turn.reply).await;
            return turn;
        }

        if IntentClassifier::is_restart(message) {
            info!(session_id = %session.session_id, "Customer restarted the application");
            session.reset();
            session
                .history
                .record_turn(Stage::Initial.as_str(), message, replies::RESTART);
            let reply = self.to_customer_language(session, replies::RESTART).await;
            return TurnReply::from_session(session, reply);
        }

        let input = self.from_customer_language(session, message).await;
        debug!(session_id = %session.session_id, stage = %session.stage(), "Handling message");

        let reply = match self.dispatch(session, &input).await {
            Ok((reply, consumed_by)) => {
                session.history.record_turn(consumed_by.as_str(), &input, &reply);
                reply
            }
            Err(e) => {
                warn!(session_id = %session.session_id, stage = %session.stage(), error = %e, "Turn failed, resetting session");
                session.reset();
                session
                    .history
                    .record_turn(Stage::Initial.as_str(), &input, replies::RECOVERY);
                replies::RECOVERY.to_string()
            }
        };

        let reply = self.to_customer_language(session, &reply).await;
        TurnReply::from_session(session, reply)
    }

    /// Run stage handlers until one waits for the customer. Returns the
    /// joined reply and the stage that consumed the customer's message.
    async fn dispatch(&self, session: &mut Session, input: &str) -> Result<(String, Stage)> {
        let mut parts: Vec<String> = Vec::new();
        let mut current = input;
        let mut consumed_by = session.stage();

        for _ in 0..MAX_CHAINED_HANDLERS {
            let stage = session.stage();
            match handler_for(stage).handle(self, session, current).await? {
                NextAction::Reply(text) => {
                    parts.push(text);
                    let reply = parts
                        .into_iter()
                        .filter(|part| !part.trim().is_empty())
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    return Ok((reply, consumed_by));
                }
                NextAction::Continue(text) => {
                    parts.push(text);
                    current = "";
                }
                NextAction::Reprocess(lead) => {
                    parts.extend(lead);
                    consumed_by = session.stage();
                }
            }
        }

        Err(AssistantError::StateError(format!(
            "More than {} chained handlers ending in stage {}",
            MAX_CHAINED_HANDLERS,
            session.stage()
        )))
    }

    pub(crate) async fn with_timeout<T, F>(&self, what: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.settings.external_call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AssistantError::ToolTimeout(format!(
                "{} after {:?}",
                what, self.settings.external_call_timeout
            ))),
        }
    }

    /// Attach the risk score; neutral when scoring is unavailable
    pub(crate) async fn apply_risk_score(&self, profile: &mut CustomerProfile) {
        let assessment = match self
            .with_timeout("risk scoring", self.tools.risk.score_risk(profile))
            .await
        {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(customer_id = %profile.customer_id, error = %e, "Risk scoring failed, using neutral score");
                neutral_risk()
            }
        };

        profile.safety_score = Some(assessment.safety_probability);
        profile.safety_explanation = Some(assessment.explanation);
    }

    /// Enter the rejection stage with the options this session qualifies for
    pub(crate) fn enter_rejection(&self, session: &mut Session, cause: RejectionCause) -> Result<String> {
        let menu = self.build_rejection_menu(session, cause)?;
        let text = replies::rejection_menu(&menu);

        info!(
            session_id = %session.session_id,
            ?cause,
            options = menu.options.len(),
            "Application rejected, offering alternatives"
        );
        session.enter(Stage::Rejection, PendingInteraction::RejectionChoice(menu))?;
        Ok(text)
    }

    fn build_rejection_menu(&self, session: &Session, cause: RejectionCause) -> Result<RejectionMenu> {
        let customer = session.customer.as_ref().ok_or_else(|| {
            AssistantError::StateError("Customer profile missing at rejection".to_string())
        })?;
        let limit = customer.pre_approved_limit;
        let amount_based = cause != RejectionCause::CreditScore && limit > 0;
        let mut options = Vec::new();

        if amount_based {
            let suggestion = session
                .loan_request
                .amount
                .and_then(|requested| suggest_lower_amount(requested, limit))
                .filter(|suggested| *suggested != limit);
            if let Some(amount) = suggestion {
                options.push(RejectionOption::LowerAmount(amount));
            }
        }

        if let Some(offer) = self.secured.offer(customer) {
            options.push(RejectionOption::SecuredLoan {
                kind: offer.collateral.kind,
                max_amount: offer.max_amount,
            });
        }

        if amount_based {
            options.push(RejectionOption::AcceptPreApproved(limit));
        }

        options.push(RejectionOption::Counseling);
        Ok(RejectionMenu { options })
    }

    /// Record the decision and issue the sanction letter. A letter failure
    /// keeps the session in `Approval`.
    pub(crate) async fn finalize_approval(&self, session: &mut Session, decision: FinalDecision) -> Result<String> {
        let terms = session.loan_request.to_offer().ok_or_else(|| {
            AssistantError::StateError("Loan terms incomplete at approval".to_string())
        })?;
        let customer = session.customer.clone().ok_or_else(|| {
            AssistantError::StateError("Customer profile missing at approval".to_string())
        })?;

        session.final_decision = Some(decision);
        session.enter(Stage::Approval, PendingInteraction::None)?;

        let letter = self
            .with_timeout(
                "sanction letter",
                self.tools.letters.render_sanction_letter(&customer, &terms),
            )
            .await;

        match letter {
            Ok(path) => {
                let record = ApplicationRecord::new(customer.phone.as_str(), decision, &terms, Some(&path));
                match self.applications.record(record).await {
                    Ok(application_id) => {
                        info!(session_id = %session.session_id, %application_id, %decision, "Application recorded")
                    }
                    Err(e) => warn!(session_id = %session.session_id, error = %e, "Failed to record application"),
                }

                let reply = replies::letter_issued(&path);
                session.sanction_letter = Some(path);
                session.enter(Stage::Completed, PendingInteraction::None)?;
                Ok(reply)
            }
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Sanction letter generation failed");
                Ok(replies::letter_failed(&e.to_string()))
            }
        }
    }

    async fn from_customer_language(&self, session: &Session, text: &str) -> String {
        self.translate(text, &session.language, DEFAULT_LANGUAGE).await
    }

    async fn to_customer_language(&self, session: &Session, text: &str) -> String {
        self.translate(text, DEFAULT_LANGUAGE, &session.language).await
    }

    /// Passthrough on failure
    async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        if source == target {
            return text.to_string();
        }
        match self
            .with_timeout("translation", self.tools.translator.translate(text, source, target))
            .await
        {
            Ok(translated) if !translated.trim().is_empty() => translated,
            Ok(_) => text.to_string(),
            Err(e) => {
                warn!(source, target, error = %e, "Translation failed, using original text");
                text.to_string()
            }
        }
    }
}

/// Build an orchestrator from configuration. Without an API key the
/// assistant runs on template replies.
pub async fn create_orchestrator(config: &AppConfig) -> Result<LoanOrchestrator> {
    let llm: Option<Arc<dyn LanguageModel>> = match &config.gemini_api_key {
        Some(key) => {
            info!(model = %config.gemini_model, "Using Gemini for replies");
            Some(Arc::new(GeminiClient::new(key.clone(), config.gemini_model.clone())?))
        }
        None => {
            warn!("GEMINI_API_KEY not set, running with template replies");
            None
        }
    };

    let tools = create_default_toolkit(config, llm.clone()).await;
    let applications = Arc::new(ApplicationLog::from_database_url(config.database_url.as_deref()));

    Ok(LoanOrchestrator::new(
        tools,
        llm,
        applications,
        OrchestratorSettings::from_config(config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLanguageModel;
    use crate::models::{CollateralType, LoanType};
    use std::path::PathBuf;
    use uuid::Uuid;

    const RIYA: &str = "7303201137";
    const KABIR: &str = "8667765432";

    fn letter_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sanction-{}", Uuid::new_v4()))
    }

    async fn orchestrator_with(llm: Option<Arc<dyn LanguageModel>>) -> LoanOrchestrator {
        let config = AppConfig {
            sanction_letter_dir: letter_dir(),
            ..AppConfig::default()
        };
        let tools = create_default_toolkit(&config, llm.clone()).await;
        LoanOrchestrator::new(
            tools,
            llm,
            Arc::new(ApplicationLog::new()),
            OrchestratorSettings::from_config(&config),
        )
    }

    async fn offline() -> LoanOrchestrator {
        orchestrator_with(None).await
    }

    async fn say(agent: &LoanOrchestrator, session: &mut Session, message: &str) -> TurnReply {
        agent.handle_message(session, message).await
    }

    /// Identify, grant profile access, agree on terms and confirm details
    async fn through_verification(agent: &LoanOrchestrator, session: &mut Session, phone: &str, request: &str) -> TurnReply {
        say(agent, session, INIT_COMMAND).await;
        say(agent, session, phone).await;
        say(agent, session, "yes").await;
        let offer = say(agent, session, request).await;
        assert_eq!(offer.stage, Stage::NeedsAssessment);
        let summary = say(agent, session, "yes").await;
        assert_eq!(summary.stage, Stage::Verification);
        say(agent, session, "yes").await
    }

    #[tokio::test]
    async fn test_init_greets_once() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        let first = say(&agent, &mut session, INIT_COMMAND).await;
        assert_eq!(first.reply, replies::WELCOME);
        assert_eq!(first.stage, Stage::Initial);
        say(&agent, &mut session, INIT_COMMAND).await;
        assert_eq!(session.history.message_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_phone_reprompts() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        let turn = say(&agent, &mut session, "hello there").await;
        assert_eq!(turn.reply, replies::INVALID_PHONE);
        assert_eq!(turn.stage, Stage::Initial);
    }

    #[tokio::test]
    async fn test_instant_approval_issues_letter() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        let turn = through_verification(&agent, &mut session, RIYA, "I need 3 lakh for travel over 2 years").await;

        assert_eq!(turn.stage, Stage::Completed);
        assert_eq!(turn.final_decision, Some(FinalDecision::Approved));
        assert!(turn.reply.contains(replies::VERIFICATION_CONFIRMED));
        assert!(turn.reply.contains(replies::LOAN_APPROVED));
        assert!(turn.reply.contains("Sanction Letter Generated"));

        let letter = session.sanction_letter.clone().unwrap();
        assert!(letter.exists());

        let records = agent.applications().list_for_user(RIYA).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 300_000);
        assert_eq!(records[0].tenure_months, 24);
        assert_eq!(records[0].status, FinalDecision::Approved);
    }

    #[tokio::test]
    async fn test_salary_slip_unlocks_larger_amount() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        let turn = through_verification(&agent, &mut session, RIYA, "6 lakh for travel over 3 years").await;
        assert_eq!(turn.stage, Stage::DocumentUpload);
        assert!(turn.reply.contains(replies::SALARY_SLIP_REQUIRED));

        let vague = say(&agent, &mut session, "what do you need?").await;
        assert_eq!(vague.reply, replies::DOCUMENT_REPROMPT);

        let turn = say(&agent, &mut session, "upload").await;
        assert_eq!(turn.stage, Stage::Completed);
        assert_eq!(turn.final_decision, Some(FinalDecision::Approved));

        let assessment = session.salary_assessment.clone().unwrap();
        assert!(assessment.emi_ratio_pct < 50.0);
    }

    #[tokio::test]
    async fn test_skipping_documents_rejects() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        through_verification(&agent, &mut session, RIYA, "6 lakh for travel over 3 years").await;
        let turn = say(&agent, &mut session, "skip").await;

        assert_eq!(turn.stage, Stage::Rejection);
        let PendingInteraction::RejectionChoice(menu) = session.pending() else {
            panic!("expected a rejection menu");
        };
        assert_eq!(menu.options[0], RejectionOption::LowerAmount(510_000));
    }

    #[tokio::test]
    async fn test_over_limit_rejection_menu_and_pre_approved_acceptance() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        let turn = through_verification(&agent, &mut session, RIYA, "12 lakh for travel over 5 years").await;
        assert_eq!(turn.stage, Stage::Rejection);

        let PendingInteraction::RejectionChoice(menu) = session.pending().clone() else {
            panic!("expected a rejection menu");
        };
        assert_eq!(menu.options.len(), 4);
        assert_eq!(menu.options[0], RejectionOption::LowerAmount(1_020_000));
        assert!(matches!(
            menu.options[1],
            RejectionOption::SecuredLoan { kind: CollateralType::Property, .. }
        ));
        assert_eq!(menu.options[2], RejectionOption::AcceptPreApproved(500_000));
        assert_eq!(menu.options[3], RejectionOption::Counseling);
        assert!(turn.reply.contains("Option 1"));

        let unknown = say(&agent, &mut session, "option 9").await;
        assert!(unknown.reply.starts_with(replies::OPTION_UNAVAILABLE));
        assert_eq!(unknown.stage, Stage::Rejection);

        let accepted = say(&agent, &mut session, "3").await;
        assert_eq!(accepted.stage, Stage::Completed);
        assert_eq!(session.loan_request.amount, Some(500_000));
        assert_eq!(session.loan_request.tenure_months, Some(60));
        assert!(session.loan_request.emi.is_some());
    }

    #[tokio::test]
    async fn test_reduce_request_picks_lower_amount_option() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        through_verification(&agent, &mut session, RIYA, "12 lakh for travel over 5 years").await;
        let turn = say(&agent, &mut session, "please reduce the amount").await;

        assert!(turn.reply.contains(&replies::retry_lower_amount(1_020_000)));
        assert_eq!(turn.stage, Stage::Rejection);
        assert_eq!(session.loan_request.amount, Some(1_020_000));
        let PendingInteraction::RejectionChoice(menu) = session.pending() else {
            panic!("expected a rejection menu");
        };
        assert_eq!(menu.options[0], RejectionOption::LowerAmount(870_000));
    }

    #[tokio::test]
    async fn test_loan_change_from_rejection_menu() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        through_verification(&agent, &mut session, RIYA, "12 lakh for travel over 5 years").await;
        let turn = say(&agent, &mut session, "change the amount to 4 lakh").await;

        assert_eq!(turn.stage, Stage::NeedsAssessment);
        assert!(turn.reply.starts_with(replies::LOAN_CHANGE));
        assert!(session.pending().is_none());
        assert_eq!(session.loan_request.amount, Some(400_000));
        assert_eq!(session.loan_request.tenure_months, Some(60));
    }

    #[tokio::test]
    async fn test_lower_amount_retry_asks_for_salary_slip() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        let turn = through_verification(&agent, &mut session, RIYA, "11.5 lakh for travel over 5 years").await;
        assert_eq!(turn.stage, Stage::Rejection);
        let PendingInteraction::RejectionChoice(menu) = session.pending().clone() else {
            panic!("expected a rejection menu");
        };
        assert_eq!(menu.options[0], RejectionOption::LowerAmount(980_000));

        let retry = say(&agent, &mut session, "1").await;
        assert_eq!(retry.stage, Stage::DocumentUpload);
        assert!(retry.reply.contains(replies::SALARY_SLIP_REQUIRED));
        assert_eq!(session.loan_request.amount, Some(980_000));

        let done = say(&agent, &mut session, "upload").await;
        assert_eq!(done.stage, Stage::Completed);
        assert_eq!(done.final_decision, Some(FinalDecision::Approved));
    }

    #[tokio::test]
    async fn test_hesitation_is_not_consent() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        say(&agent, &mut session, RIYA).await;
        say(&agent, &mut session, "yes").await;
        say(&agent, &mut session, "3 lakh for travel over 2 years").await;

        let objection = say(&agent, &mut session, "that EMI is unacceptable").await;
        assert_eq!(objection.stage, Stage::NeedsAssessment);

        say(&agent, &mut session, "yes").await;
        assert_eq!(session.stage(), Stage::Verification);

        let unsure = say(&agent, &mut session, "I'm unsure").await;
        assert_eq!(unsure.stage, Stage::Verification);
        assert_eq!(unsure.final_decision, None);
        assert!(session.sanction_letter.is_none());
        assert!(agent.applications().list_for_user(RIYA).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_low_credit_score_goes_to_secured_loan() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        let turn = through_verification(&agent, &mut session, KABIR, "2 lakh for travel over 2 years").await;
        assert_eq!(turn.stage, Stage::Rejection);
        assert!(turn.reply.contains("698"));

        let PendingInteraction::RejectionChoice(menu) = session.pending().clone() else {
            panic!("expected a rejection menu");
        };
        assert_eq!(
            menu.options,
            vec![
                RejectionOption::SecuredLoan {
                    kind: CollateralType::Vehicle,
                    max_amount: 487_500
                },
                RejectionOption::Counseling,
            ]
        );

        let advice = say(&agent, &mut session, "2").await;
        assert_eq!(advice.stage, Stage::Rejection);
        assert!(advice.reply.contains("payment history"));

        let offer = say(&agent, &mut session, "1").await;
        assert_eq!(offer.stage, Stage::SecuredLoan);

        let too_much = say(&agent, &mut session, "10 lakh").await;
        assert_eq!(too_much.stage, Stage::SecuredLoan);

        let approved = say(&agent, &mut session, "max").await;
        assert_eq!(approved.stage, Stage::Completed);
        assert_eq!(approved.final_decision, Some(FinalDecision::ApprovedSecured));
        assert_eq!(session.loan_request.amount, Some(487_500));
        assert_eq!(session.loan_request.tenure_months, Some(120));
        assert_eq!(session.loan_request.loan_type, LoanType::Secured);
    }

    #[tokio::test]
    async fn test_new_customer_onboarding() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        let turn = say(&agent, &mut session, "9876543210").await;
        assert_eq!(turn.stage, Stage::NewCustomerOnboarding);

        say(&agent, &mut session, "Anita Desai").await;
        say(&agent, &mut session, "Pune").await;
        say(&agent, &mut session, "12 MG Road, Pune").await;

        let bad_email = say(&agent, &mut session, "not sure").await;
        assert_eq!(bad_email.stage, Stage::NewCustomerOnboarding);

        say(&agent, &mut session, "anita@example.com").await;
        say(&agent, &mut session, "75000").await;
        let done = say(&agent, &mut session, "none").await;

        assert_eq!(done.stage, Stage::NeedsAssessment);
        let customer = session.customer.clone().unwrap();
        assert_eq!(customer.name, "Anita Desai");
        assert_eq!(customer.email, "anita@example.com");
        assert_eq!(customer.monthly_income, 75_000);
        assert_eq!(customer.pre_approved_limit, 500_000);
        assert!(customer.collateral.is_none());
        assert!(customer.safety_score.is_some());
    }

    #[tokio::test]
    async fn test_onboarded_collateral_enables_secured_pivot() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        for answer in ["9812345678", "Vikram Nair", "Kochi", "MG Road, Kochi", "vikram@example.com", "40k"] {
            say(&agent, &mut session, answer).await;
        }
        let done = say(&agent, &mut session, "gold jewellery worth 2 lakh").await;
        assert_eq!(done.stage, Stage::NeedsAssessment);

        let customer = session.customer.clone().unwrap();
        assert_eq!(customer.monthly_income, 40_000);
        assert_eq!(customer.pre_approved_limit, 400_000);
        assert!(customer.collateral.unwrap().contains("Estimated Value"));

        let pivot = say(&agent, &mut session, "I want a secured loan instead").await;
        assert_eq!(pivot.stage, Stage::SecuredLoan);
        let PendingInteraction::SecuredLoanAmount(offer) = session.pending() else {
            panic!("expected a secured offer");
        };
        assert_eq!(offer.collateral.kind, CollateralType::Gold);
        assert_eq!(offer.collateral.value, 200_000);
    }

    #[tokio::test]
    async fn test_declined_permission_switches_to_manual_entry() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        say(&agent, &mut session, RIYA).await;
        let turn = say(&agent, &mut session, "no").await;

        assert_eq!(turn.reply, replies::PERMISSION_DECLINED);
        assert_eq!(turn.stage, Stage::NewCustomerOnboarding);
        assert_eq!(session.staged_customer.as_ref().unwrap().phone, RIYA);
    }

    #[tokio::test]
    async fn test_verification_corrections() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        say(&agent, &mut session, RIYA).await;
        say(&agent, &mut session, "yes").await;
        say(&agent, &mut session, "3 lakh for travel over 2 years").await;
        say(&agent, &mut session, "yes").await;
        assert_eq!(session.stage(), Stage::Verification);

        let updated = say(&agent, &mut session, "my address is 4 Park Street, Kolkata").await;
        assert_eq!(updated.stage, Stage::Verification);
        assert_eq!(session.customer.as_ref().unwrap().address, "4 Park Street, Kolkata");

        let which = say(&agent, &mut session, "no").await;
        assert_eq!(which.reply, replies::WHICH_DETAIL);

        let phone = say(&agent, &mut session, "the phone number").await;
        assert_eq!(phone.reply, replies::PHONE_IMMUTABLE);

        say(&agent, &mut session, "my email").await;
        say(&agent, &mut session, "riya.new@example.com").await;
        assert_eq!(session.customer.as_ref().unwrap().email, "riya.new@example.com");
        assert!(session.pending().is_none());
    }

    #[tokio::test]
    async fn test_loan_change_during_verification() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        say(&agent, &mut session, RIYA).await;
        say(&agent, &mut session, "yes").await;
        say(&agent, &mut session, "3 lakh for travel over 2 years").await;
        say(&agent, &mut session, "yes").await;

        let turn = say(&agent, &mut session, "change the amount to 4 lakh").await;
        assert_eq!(turn.stage, Stage::NeedsAssessment);
        assert!(turn.reply.starts_with(replies::LOAN_CHANGE));
        assert_eq!(session.loan_request.amount, Some(400_000));
        assert_eq!(session.loan_request.tenure_months, Some(24));
    }

    #[tokio::test]
    async fn test_restart_clears_everything_but_the_id() {
        let agent = offline().await;
        let mut session = Session::new("s1");

        say(&agent, &mut session, RIYA).await;
        say(&agent, &mut session, "yes").await;
        let turn = say(&agent, &mut session, "restart").await;

        assert_eq!(turn.reply, replies::RESTART);
        assert_eq!(turn.stage, Stage::Initial);
        assert_eq!(session.session_id, "s1");
        assert!(session.customer.is_none());
        assert_eq!(session.history.message_count(), 2);
    }

    #[tokio::test]
    async fn test_inconsistent_session_recovers() {
        let agent = offline().await;
        let mut session = Session::new("s1");
        session.customer = reference_customer(RIYA);
        session.enter(Stage::Rejection, PendingInteraction::None).unwrap();

        let turn = say(&agent, &mut session, "1").await;

        assert_eq!(turn.reply, replies::RECOVERY);
        assert_eq!(turn.stage, Stage::Initial);
        assert!(session.customer.is_none());
    }

    #[tokio::test]
    async fn test_post_decision_guards_new_applications() {
        let agent = offline().await;
        let mut session = Session::new("s1");
        through_verification(&agent, &mut session, RIYA, "3 lakh for travel over 2 years").await;

        let again = say(&agent, &mut session, "I want another loan").await;
        assert_eq!(again.reply, replies::NEW_LOAN_REDIRECT);
        assert_eq!(again.stage, Stage::Completed);

        let question = say(&agent, &mut session, "when is my first EMI due?").await;
        assert_eq!(question.reply, replies::QA_FALLBACK);
        assert_eq!(agent.applications().list_for_user(RIYA).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_model_marker_finalizes_and_answers_questions() {
        let model = Arc::new(ScriptedLanguageModel::new([
            "Perfect, 3 lakh over 24 months it is. [EXTRACTION:amount=300000,tenure=24,purpose=travel]",
            "Your first EMI is due one month after disbursement.",
        ]));
        let agent = orchestrator_with(Some(model.clone() as Arc<dyn LanguageModel>)).await;
        let mut session = Session::new("s1");

        say(&agent, &mut session, RIYA).await;
        say(&agent, &mut session, "yes").await;
        let summary = say(&agent, &mut session, "3 lakh for a trip, 2 years").await;
        assert_eq!(summary.stage, Stage::Verification);
        assert!(!summary.reply.contains("EXTRACTION"));

        let done = say(&agent, &mut session, "yes").await;
        assert_eq!(done.stage, Stage::Completed);

        let answer = say(&agent, &mut session, "when is my first EMI due?").await;
        assert_eq!(answer.reply, "Your first EMI is due one month after disbursement.");

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].params.max_tokens, 200);
        assert!(calls[1].history_len <= 4);
    }

    #[tokio::test]
    async fn test_secured_request_without_collateral_keeps_negotiating() {
        let model = Arc::new(ScriptedLanguageModel::new([
            "Your EMI would be about 14,000 a month over 24 months. Does that work?",
            "Switching you over. [EXTRACTION:amount=300000,tenure=24,purpose=travel]",
        ]));
        let agent = orchestrator_with(Some(model.clone() as Arc<dyn LanguageModel>)).await;
        let mut session = Session::new("s1");

        for answer in ["9812345678", "Vikram Nair", "Kochi", "MG Road, Kochi", "vikram@example.com", "40k", "none"] {
            say(&agent, &mut session, answer).await;
        }
        let offer = say(&agent, &mut session, "3 lakh for travel over 2 years").await;
        assert_eq!(offer.stage, Stage::NeedsAssessment);

        let turn = say(&agent, &mut session, "I'd rather have a secured loan").await;

        assert_eq!(turn.stage, Stage::NeedsAssessment);
        assert!(turn.reply.starts_with(replies::NO_COLLATERAL));
        assert_eq!(session.loan_request.loan_type, LoanType::Unsecured);
        assert_eq!(model.calls().len(), 1);
    }

    fn reference_customer(phone: &str) -> Option<CustomerProfile> {
        crate::tools::customers::reference_customers()
            .into_iter()
            .find(|c| c.phone == phone)
    }
}
