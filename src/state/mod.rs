//! Session state
//!
//! One `Session` per conversation. The active sub-dialogue is a single
//! `PendingInteraction` tied to the stage that owns it.

use crate::classifier::DetailField;
use crate::error::AssistantError;
use crate::memory::ConversationHistory;
use crate::models::{
    CollateralType, CreditReport, CustomerProfile, FinalDecision, LoanRequest, SalaryAssessment,
    SecuredLoanOffer, UnderwritingOutcome,
};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initial,
    NewCustomerOnboarding,
    NeedsAssessment,
    Verification,
    CreditCheck,
    Underwriting,
    DocumentUpload,
    Rejection,
    SecuredLoan,
    Approval,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::NewCustomerOnboarding => "new_customer_onboarding",
            Stage::NeedsAssessment => "needs_assessment",
            Stage::Verification => "verification",
            Stage::CreditCheck => "credit_check",
            Stage::Underwriting => "underwriting",
            Stage::DocumentUpload => "document_upload",
            Stage::Rejection => "rejection",
            Stage::SecuredLoan => "secured_loan",
            Stage::Approval => "approval",
            Stage::Completed => "completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Onboarding wizard steps, in order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Name,
    City,
    Address,
    Email,
    Income,
    Collateral,
}

impl OnboardingStep {
    pub fn next(&self) -> Option<OnboardingStep> {
        match self {
            OnboardingStep::Name => Some(OnboardingStep::City),
            OnboardingStep::City => Some(OnboardingStep::Address),
            OnboardingStep::Address => Some(OnboardingStep::Email),
            OnboardingStep::Email => Some(OnboardingStep::Income),
            OnboardingStep::Income => Some(OnboardingStep::Collateral),
            OnboardingStep::Collateral => None,
        }
    }
}

/// One entry of the rejection menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionOption {
    LowerAmount(u64),
    SecuredLoan { kind: CollateralType, max_amount: u64 },
    AcceptPreApproved(u64),
    Counseling,
}

/// Numbered options, in display order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionMenu {
    pub options: Vec<RejectionOption>,
}

impl RejectionMenu {
    /// 1-based lookup
    pub fn option(&self, number: usize) -> Option<&RejectionOption> {
        number.checked_sub(1).and_then(|i| self.options.get(i))
    }
}

/// The single sub-dialogue awaiting an answer, if any
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PendingInteraction {
    #[default]
    None,
    /// May the staged profile be used?
    ProfilePermission,
    ManualEntry(OnboardingStep),
    /// Waiting to hear which detail is wrong, or its new value
    DetailCorrection(Option<DetailField>),
    SecuredLoanAmount(SecuredLoanOffer),
    RejectionChoice(RejectionMenu),
}

impl PendingInteraction {
    /// Stage that owns this sub-dialogue
    pub fn owner(&self) -> Option<Stage> {
        match self {
            PendingInteraction::None => None,
            PendingInteraction::ProfilePermission | PendingInteraction::DetailCorrection(_) => {
                Some(Stage::Verification)
            }
            PendingInteraction::ManualEntry(_) => Some(Stage::NewCustomerOnboarding),
            PendingInteraction::SecuredLoanAmount(_) => Some(Stage::SecuredLoan),
            PendingInteraction::RejectionChoice(_) => Some(Stage::Rejection),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, PendingInteraction::None)
    }
}

/// Per-conversation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    stage: Stage,
    pending: PendingInteraction,
    pub customer: Option<CustomerProfile>,
    /// Profile awaiting permission or being built by onboarding
    pub staged_customer: Option<CustomerProfile>,
    pub loan_request: LoanRequest,
    pub history: ConversationHistory,
    pub credit_report: Option<CreditReport>,
    pub underwriting: Option<UnderwritingOutcome>,
    pub salary_assessment: Option<SalaryAssessment>,
    pub final_decision: Option<FinalDecision>,
    pub sanction_letter: Option<PathBuf>,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            stage: Stage::Initial,
            pending: PendingInteraction::None,
            customer: None,
            staged_customer: None,
            loan_request: LoanRequest::default(),
            history: ConversationHistory::new(),
            credit_report: None,
            underwriting: None,
            salary_assessment: None,
            final_decision: None,
            sanction_letter: None,
            language: DEFAULT_LANGUAGE.to_string(),
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn pending(&self) -> &PendingInteraction {
        &self.pending
    }

    /// Move to `stage`, replacing whatever sub-dialogue was active.
    /// Fails if `pending` belongs to a different stage.
    pub fn enter(&mut self, stage: Stage, pending: PendingInteraction) -> Result<()> {
        if let Some(owner) = pending.owner() {
            if owner != stage {
                return Err(AssistantError::StateError(format!(
                    "{:?} cannot be pending in stage {}",
                    pending, stage
                )));
            }
        }

        if stage != self.stage {
            info!(session_id = %self.session_id, from = %self.stage, to = %stage, "Stage transition");
        }
        self.stage = stage;
        self.pending = pending;
        Ok(())
    }

    /// Change the sub-dialogue without leaving the current stage
    pub fn set_pending(&mut self, pending: PendingInteraction) -> Result<()> {
        self.enter(self.stage, pending)
    }

    /// Start over, keeping only the session id and language
    pub fn reset(&mut self) {
        let language = std::mem::take(&mut self.language);
        *self = Session::new(std::mem::take(&mut self.session_id));
        self.language = language;
        info!(session_id = %self.session_id, "Session reset");
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}

/// Session persistence with idle eviction
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Existing session, or a fresh one
    async fn checkout(&self, session_id: &str) -> Result<Arc<Mutex<Session>>>;
    async fn remove(&self, session_id: &str) -> Result<()>;
    async fn active_sessions(&self) -> Result<usize>;
    /// Drop sessions idle longer than the timeout; returns how many
    async fn evict_idle(&self) -> Result<usize>;
}

struct SessionSlot {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

/// In-memory session store for development
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionSlot>>>,
    idle_timeout: Duration,
}

impl InMemorySessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn checkout(&self, session_id: &str) -> Result<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionSlot {
                session: Arc::new(Mutex::new(Session::new(session_id))),
                last_seen: Instant::now(),
            });
        slot.last_seen = Instant::now();
        Ok(slot.session.clone())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn active_sessions(&self) -> Result<usize> {
        Ok(self.sessions.read().await.len())
    }

    async fn evict_idle(&self) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| slot.last_seen.elapsed() < self.idle_timeout);
        let evicted = before - sessions.len();

        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Idle sessions evicted");
        }
        Ok(evicted)
    }
}
