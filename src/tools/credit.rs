//! Credit bureau backed by the customer directory

use super::{CreditBureau, CustomerDirectory};
use crate::models::CreditReport;
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const BUREAU_NAME: &str = "CIBIL";
pub const MAX_CREDIT_SCORE: u32 = 900;

/// Score reported for numbers the bureau has never seen
pub const DEFAULT_CREDIT_SCORE: u32 = 700;

pub struct DirectoryCreditBureau {
    directory: Arc<dyn CustomerDirectory>,
}

impl DirectoryCreditBureau {
    pub fn new(directory: Arc<dyn CustomerDirectory>) -> Self {
        Self { directory }
    }
}

/// Factor bands behind a score
pub fn credit_factors(score: u32) -> BTreeMap<String, String> {
    let (payment, utilization, age, mix) = match score {
        s if s >= 800 => ("Excellent", "Low", "Good", "Diverse"),
        s if s >= 750 => ("Very Good", "Low", "Good", "Good"),
        s if s >= 700 => ("Good", "Moderate", "Fair", "Adequate"),
        _ => ("Needs Improvement", "High", "Limited", "Limited"),
    };

    [
        ("payment_history", payment),
        ("credit_utilization", utilization),
        ("credit_age", age),
        ("credit_mix", mix),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn credit_report(score: u32) -> CreditReport {
    CreditReport {
        score,
        bureau: BUREAU_NAME.to_string(),
        max_score: MAX_CREDIT_SCORE,
        factors: credit_factors(score),
    }
}

#[async_trait]
impl CreditBureau for DirectoryCreditBureau {
    async fn score_credit(&self, phone: &str) -> Result<CreditReport> {
        let score = self
            .directory
            .lookup_customer(phone)
            .await?
            .map(|c| c.credit_score)
            .unwrap_or(DEFAULT_CREDIT_SCORE);

        debug!(score, "Credit score fetched");
        Ok(credit_report(score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::InMemoryCustomerDirectory;

    #[tokio::test]
    async fn test_known_and_unknown_numbers() {
        let bureau = DirectoryCreditBureau::new(Arc::new(InMemoryCustomerDirectory::with_reference_customers()));

        let riya = bureau.score_credit("7303201137").await.unwrap();
        assert_eq!(riya.score, 782);
        assert_eq!(riya.bureau, "CIBIL");
        assert_eq!(riya.max_score, 900);
        assert_eq!(riya.factors["payment_history"], "Very Good");

        let unknown = bureau.score_credit("9000000000").await.unwrap();
        assert_eq!(unknown.score, 700);
    }

    #[test]
    fn test_factor_bands() {
        assert_eq!(credit_factors(820)["credit_mix"], "Diverse");
        assert_eq!(credit_factors(700)["credit_utilization"], "Moderate");
        assert_eq!(credit_factors(660)["payment_history"], "Needs Improvement");
    }
}
