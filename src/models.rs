//! Core data models for the loan assistant

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

//
// ================= Customer =================
//

/// Customer attributes used across the application flow.
///
/// Field aliases accept the keys used by the customer data file
/// (`id`, `preapproved_limit`, `score`, `salary`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerProfile {
    #[serde(alias = "id")]
    pub customer_id: String,
    pub name: String,
    pub phone: String,
    #[serde(default = "default_age")]
    pub age: u32,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub email: String,
    #[serde(alias = "salary", default)]
    pub monthly_income: u64,
    #[serde(alias = "preapproved_limit", default)]
    pub pre_approved_limit: u64,
    #[serde(alias = "score", default = "default_credit_score")]
    pub credit_score: u32,
    #[serde(default = "default_employment")]
    pub employment: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub current_loans: Option<String>,
    /// Free-text collateral description; `None` when the customer has none
    #[serde(default)]
    pub collateral: Option<String>,
    /// Internal safety probability from the risk model
    #[serde(default)]
    pub safety_score: Option<f64>,
    #[serde(default)]
    pub safety_explanation: Option<String>,
}

fn default_age() -> u32 {
    30
}

fn default_credit_score() -> u32 {
    700
}

fn default_employment() -> String {
    "Salaried".to_string()
}

impl CustomerProfile {
    pub fn has_collateral(&self) -> bool {
        self.collateral
            .as_deref()
            .map(|c| !c.trim().is_empty() && !c.trim().eq_ignore_ascii_case("none"))
            .unwrap_or(false)
    }

    pub fn has_current_loans(&self) -> bool {
        self.current_loans
            .as_deref()
            .map(|l| !l.trim().is_empty() && !l.trim().eq_ignore_ascii_case("none"))
            .unwrap_or(false)
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

//
// ================= Loan Request =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoanPurpose {
    Business,
    Wedding,
    Medical,
    Education,
    Travel,
    HomeRenovation,
    DebtConsolidation,
    Emergency,
    Vehicle,
    Personal,
}

impl LoanPurpose {
    pub const ALL: [LoanPurpose; 10] = [
        LoanPurpose::Business,
        LoanPurpose::Wedding,
        LoanPurpose::Medical,
        LoanPurpose::Education,
        LoanPurpose::Travel,
        LoanPurpose::HomeRenovation,
        LoanPurpose::DebtConsolidation,
        LoanPurpose::Emergency,
        LoanPurpose::Vehicle,
        LoanPurpose::Personal,
    ];

    /// Category tag, as carried in the extraction marker
    pub fn as_tag(&self) -> &'static str {
        match self {
            LoanPurpose::Business => "business",
            LoanPurpose::Wedding => "wedding",
            LoanPurpose::Medical => "medical",
            LoanPurpose::Education => "education",
            LoanPurpose::Travel => "travel",
            LoanPurpose::HomeRenovation => "home_renovation",
            LoanPurpose::DebtConsolidation => "debt_consolidation",
            LoanPurpose::Emergency => "emergency",
            LoanPurpose::Vehicle => "vehicle",
            LoanPurpose::Personal => "personal",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        let normalized = tag.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|p| p.as_tag() == normalized)
    }
}

impl fmt::Display for LoanPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_tag().replace('_', " "))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoanType {
    #[default]
    Unsecured,
    Secured,
}

impl fmt::Display for LoanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanType::Unsecured => write!(f, "unsecured"),
            LoanType::Secured => write!(f, "secured"),
        }
    }
}

/// Partial-to-complete loan request, filled in over several turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoanRequest {
    pub amount: Option<u64>,
    pub tenure_months: Option<u32>,
    pub purpose: Option<LoanPurpose>,
    pub interest_rate: Option<f64>,
    pub emi: Option<u64>,
    #[serde(default)]
    pub loan_type: LoanType,
    pub collateral: Option<String>,
}

impl LoanRequest {
    /// Amount, tenure and purpose are all known and non-zero
    pub fn is_complete(&self) -> bool {
        matches!(self.amount, Some(a) if a > 0)
            && matches!(self.tenure_months, Some(t) if t > 0)
            && self.purpose.is_some()
    }

    pub fn same_terms(&self, other: &LoanRequest) -> bool {
        self.amount == other.amount
            && self.tenure_months == other.tenure_months
            && self.purpose == other.purpose
    }

    /// Finalized offer, available once pricing has been applied
    pub fn to_offer(&self) -> Option<LoanOffer> {
        Some(LoanOffer {
            amount: self.amount?,
            tenure_months: self.tenure_months?,
            interest_rate: self.interest_rate?,
            emi: self.emi?,
            purpose: self.purpose.unwrap_or(LoanPurpose::Personal),
            loan_type: self.loan_type,
            collateral: self.collateral.clone(),
        })
    }
}

/// Finalized loan terms (secured or unsecured)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoanOffer {
    pub amount: u64,
    pub tenure_months: u32,
    pub interest_rate: f64,
    pub emi: u64,
    pub purpose: LoanPurpose,
    pub loan_type: LoanType,
    pub collateral: Option<String>,
}

//
// ================= Decisions =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    RequiresSalarySlip,
    Rejected,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Approved => write!(f, "APPROVED"),
            Decision::RequiresSalarySlip => write!(f, "REQUIRES_SALARY_SLIP"),
            Decision::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Why an application landed in the rejection menu
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCause {
    CreditScore,
    AmountOverLimit,
    EmiRatio,
    DocumentsSkipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnderwritingOutcome {
    pub decision: Decision,
    pub reason: String,
    /// requested / pre-approved limit
    pub ratio: Option<f64>,
    /// Maximum amount that could be considered (2x limit)
    pub suggested_amount: Option<u64>,
    pub rejection: Option<RejectionCause>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalaryAssessment {
    pub decision: Decision,
    pub emi_ratio_pct: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalDecision {
    Approved,
    ApprovedSecured,
}

impl fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalDecision::Approved => write!(f, "APPROVED"),
            FinalDecision::ApprovedSecured => write!(f, "APPROVED_SECURED"),
        }
    }
}

//
// ================= Collateral =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollateralType {
    Property,
    Vehicle,
    Gold,
    FixedDeposit,
    MutualFunds,
    Stocks,
    Land,
}

impl CollateralType {
    /// Loan-to-value ratio as a whole percentage
    pub fn ltv_percent(&self) -> u64 {
        match self {
            CollateralType::Property => 65,
            CollateralType::Vehicle => 75,
            CollateralType::Gold => 75,
            CollateralType::FixedDeposit => 90,
            CollateralType::MutualFunds => 70,
            CollateralType::Stocks => 60,
            CollateralType::Land => 60,
        }
    }

    /// Loan-to-value ratio
    pub fn ltv(&self) -> f64 {
        self.ltv_percent() as f64 / 100.0
    }

    /// Annual interest rate (percent) for loans against this collateral
    pub fn interest_rate(&self) -> f64 {
        match self {
            CollateralType::Property => 9.5,
            CollateralType::Vehicle => 10.5,
            CollateralType::Gold => 9.0,
            CollateralType::FixedDeposit => 8.0,
            CollateralType::MutualFunds => 11.0,
            CollateralType::Stocks => 12.0,
            CollateralType::Land => 10.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CollateralType::Property => "Property",
            CollateralType::Vehicle => "Vehicle",
            CollateralType::Gold => "Gold",
            CollateralType::FixedDeposit => "Fixed Deposit",
            CollateralType::MutualFunds => "Mutual Funds",
            CollateralType::Stocks => "Stocks",
            CollateralType::Land => "Land",
        }
    }
}

impl fmt::Display for CollateralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Derived from a free-text description; never stored on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collateral {
    pub kind: CollateralType,
    pub value: u64,
    pub ltv: f64,
    pub max_loan: u64,
    pub interest_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecuredLoanOffer {
    pub collateral: Collateral,
    pub description: String,
    pub max_amount: u64,
    pub interest_rate: f64,
    pub min_tenure_months: u32,
    pub max_tenure_months: u32,
    pub processing_fee: String,
}

//
// ================= Scoring =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditReport {
    pub score: u32,
    pub bureau: String,
    pub max_score: u32,
    pub factors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    /// Probability in [0, 1] that the customer is low-risk
    pub safety_probability: f64,
    pub explanation: String,
}
