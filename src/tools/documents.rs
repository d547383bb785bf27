//! Salary slip upload and extraction
//!
//! Uploads are simulated: the slip for a customer is derived from the
//! income on record (or the income declared during onboarding), split into
//! the usual Indian salary structure.

use super::{CustomerDirectory, SalarySlipProcessor};
use crate::models::CustomerProfile;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryBreakdown {
    pub basic_salary: u64,
    pub hra: u64,
    pub other_allowances: u64,
    pub gross_salary: u64,
    pub deductions: u64,
    pub net_salary: u64,
}

impl SalaryBreakdown {
    /// basic 70%, HRA 20%, other 10% of gross; 5% deductions
    pub fn from_monthly_income(monthly_income: u64) -> Self {
        let basic_salary = monthly_income * 70 / 100;
        let hra = monthly_income * 20 / 100;
        let other_allowances = monthly_income * 10 / 100;
        let gross_salary = basic_salary + hra + other_allowances;
        let deductions = gross_salary * 5 / 100;

        Self {
            basic_salary,
            hra,
            other_allowances,
            gross_salary,
            deductions,
            net_salary: gross_salary - deductions,
        }
    }

    /// Slip used when the customer has no income on record
    pub fn fallback() -> Self {
        Self::from_monthly_income(52_000)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryExtraction {
    pub success: bool,
    /// Net monthly salary; this is the figure underwritten
    pub monthly_salary: Option<u64>,
    pub breakdown: Option<SalaryBreakdown>,
}

pub struct DirectorySalarySlipProcessor {
    directory: Arc<dyn CustomerDirectory>,
}

impl DirectorySalarySlipProcessor {
    pub fn new(directory: Arc<dyn CustomerDirectory>) -> Self {
        Self { directory }
    }
}

impl DirectorySalarySlipProcessor {
    /// Income on the directory record, matched by phone then by name
    async fn income_on_record(&self, customer: &CustomerProfile) -> Result<Option<u64>> {
        let record = match self.directory.lookup_customer(&customer.phone).await? {
            Some(record) => Some(record),
            None => self.directory.find_by_name(&customer.name).await?,
        };
        Ok(record.map(|r| r.monthly_income).filter(|income| *income > 0))
    }
}

#[async_trait]
impl SalarySlipProcessor for DirectorySalarySlipProcessor {
    async fn upload_and_extract_salary(&self, customer: &CustomerProfile) -> Result<SalaryExtraction> {
        let declared = Some(customer.monthly_income).filter(|income| *income > 0);
        let breakdown = match self.income_on_record(customer).await?.or(declared) {
            Some(income) => SalaryBreakdown::from_monthly_income(income),
            None => {
                warn!(customer = %customer.name, "No salary on record, using fallback slip");
                SalaryBreakdown::fallback()
            }
        };

        info!(
            customer = %customer.name,
            net_salary = breakdown.net_salary,
            "Salary slip processed"
        );

        Ok(SalaryExtraction {
            success: true,
            monthly_salary: Some(breakdown.net_salary),
            breakdown: Some(breakdown),
        })
    }
}
