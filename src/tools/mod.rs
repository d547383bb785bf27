//! External collaborators
//!
//! Everything the orchestrator cannot decide on its own: customer lookup,
//! scoring, document handling, letters and translation. Each capability is
//! a trait so deployments can swap in real services.

use crate::config::AppConfig;
use crate::llm::LanguageModel;
use crate::models::{CreditReport, CustomerProfile, LoanOffer, RiskAssessment};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub mod credit;
pub mod customers;
pub mod documents;
pub mod risk;
pub mod sanction;
pub mod translation;

pub use credit::DirectoryCreditBureau;
pub use customers::InMemoryCustomerDirectory;
pub use documents::{DirectorySalarySlipProcessor, SalaryBreakdown, SalaryExtraction};
pub use risk::{neutral_risk, HeuristicRiskScorer};
pub use sanction::TextSanctionLetterRenderer;
pub use translation::{LlmTranslator, PassthroughTranslator};

/// Phone-indexed customer records
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Phone is normalized to its last 10 digits
    async fn lookup_customer(&self, phone: &str) -> Result<Option<CustomerProfile>>;
    async fn find_by_name(&self, name: &str) -> Result<Option<CustomerProfile>>;
}

#[async_trait]
pub trait RiskScorer: Send + Sync {
    async fn score_risk(&self, profile: &CustomerProfile) -> Result<RiskAssessment>;
}

#[async_trait]
pub trait CreditBureau: Send + Sync {
    async fn score_credit(&self, phone: &str) -> Result<CreditReport>;
}

/// Best-effort translation; callers fall back to the input on error
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String>;
}

#[async_trait]
pub trait SalarySlipProcessor: Send + Sync {
    async fn upload_and_extract_salary(&self, customer: &CustomerProfile) -> Result<SalaryExtraction>;
}

#[async_trait]
pub trait SanctionLetterRenderer: Send + Sync {
    async fn render_sanction_letter(&self, customer: &CustomerProfile, terms: &LoanOffer) -> Result<PathBuf>;
}

/// The full set of collaborators handed to the orchestrator
#[derive(Clone)]
pub struct Toolkit {
    pub directory: Arc<dyn CustomerDirectory>,
    pub risk: Arc<dyn RiskScorer>,
    pub credit: Arc<dyn CreditBureau>,
    pub documents: Arc<dyn SalarySlipProcessor>,
    pub letters: Arc<dyn SanctionLetterRenderer>,
    pub translator: Arc<dyn Translator>,
}

/// In-process collaborators backed by the customer directory
pub async fn create_default_toolkit(
    config: &AppConfig,
    llm: Option<Arc<dyn LanguageModel>>,
) -> Toolkit {
    let directory = match &config.customer_data_path {
        Some(path) => match InMemoryCustomerDirectory::load_json(path).await {
            Ok(directory) => directory,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Customer data unavailable, using reference customers");
                InMemoryCustomerDirectory::with_reference_customers()
            }
        },
        None => InMemoryCustomerDirectory::with_reference_customers(),
    };
    let directory: Arc<dyn CustomerDirectory> = Arc::new(directory);

    let translator: Arc<dyn Translator> = match llm {
        Some(model) => Arc::new(LlmTranslator::new(model)),
        None => Arc::new(PassthroughTranslator),
    };

    info!(letters = %config.sanction_letter_dir.display(), "Collaborators initialized");

    Toolkit {
        risk: Arc::new(HeuristicRiskScorer),
        credit: Arc::new(DirectoryCreditBureau::new(directory.clone())),
        documents: Arc::new(DirectorySalarySlipProcessor::new(directory.clone())),
        letters: Arc::new(TextSanctionLetterRenderer::new(config.sanction_letter_dir.clone())),
        translator,
        directory,
    }
}
