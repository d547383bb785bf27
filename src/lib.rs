//! Loan Origination Assistant
//!
//! A conversational assistant that takes a customer from identification
//! to a sanctioned personal loan:
//! - Extracts loan amount, tenure and purpose from free text
//! - Prices loans deterministically (rate and EMI never come from the LLM)
//! - Underwrites against the pre-approved limit, credit score and salary
//! - Offers secured loans against declared collateral
//! - Records every sanctioned application with an integrity hash
//!
//! STAGES:
//! INITIAL → VERIFICATION → NEEDS_ASSESSMENT → CREDIT_CHECK → UNDERWRITING → COMPLETED

pub mod agent;
pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod memory;
pub mod models;
pub mod negotiation;
pub mod pricing;
pub mod secured;
pub mod state;
pub mod tools;
pub mod underwriting;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::{LoanOrchestrator, TurnReply};
