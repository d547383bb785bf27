//! Customer directory
//!
//! Phone-indexed profiles, seeded with the reference customers and
//! optionally loaded from a `{"customers": [...]}` JSON file.

use super::CustomerDirectory;
use crate::error::AssistantError;
use crate::extraction::extract_phone;
use crate::models::CustomerProfile;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Deserialize)]
struct CustomerFile {
    customers: Vec<CustomerProfile>,
}

/// Stable id for a customer created during onboarding
pub fn customer_id_for_phone(phone: &str) -> String {
    let digest = hex::encode(Sha256::digest(phone.as_bytes()));
    format!("C{}", digest[..8].to_uppercase())
}

pub fn reference_customers() -> Vec<CustomerProfile> {
    vec![
        CustomerProfile {
            customer_id: "C01".to_string(),
            name: "Riya Sharma".to_string(),
            phone: "7303201137".to_string(),
            age: 28,
            city: "Delhi".to_string(),
            address: "Block A, Sector 15, Rohini, Delhi - 110085".to_string(),
            email: "riya.sharma@email.com".to_string(),
            monthly_income: 60_000,
            pre_approved_limit: 500_000,
            credit_score: 782,
            employment: "Salaried".to_string(),
            company: Some("Tech Innovations Pvt Ltd".to_string()),
            current_loans: None,
            collateral: Some(
                "Residential Property - 2BHK Apartment (Estimated Value: ₹45,00,000)".to_string(),
            ),
            safety_score: None,
            safety_explanation: None,
        },
        CustomerProfile {
            customer_id: "C02".to_string(),
            name: "Kabir Rao".to_string(),
            phone: "8667765432".to_string(),
            age: 31,
            city: "Mumbai".to_string(),
            address: "78, Andheri West, Mumbai - 400053".to_string(),
            email: "kabir.rao@email.com".to_string(),
            monthly_income: 52_000,
            pre_approved_limit: 200_000,
            credit_score: 698,
            employment: "Salaried".to_string(),
            company: Some("Finance Corp".to_string()),
            current_loans: Some("Car Loan: ₹3,50,000".to_string()),
            collateral: Some("Vehicle - Honda City 2019 (Estimated Value: ₹6,50,000)".to_string()),
            safety_score: None,
            safety_explanation: None,
        },
    ]
}

/// In-memory directory for development
pub struct InMemoryCustomerDirectory {
    by_phone: Arc<RwLock<HashMap<String, CustomerProfile>>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self {
            by_phone: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_customers(customers: Vec<CustomerProfile>) -> Self {
        let by_phone = customers
            .into_iter()
            .map(complete_profile)
            .filter_map(|c| extract_phone(&c.phone).map(|phone| (phone, c)))
            .collect();

        Self {
            by_phone: Arc::new(RwLock::new(by_phone)),
        }
    }

    pub fn with_reference_customers() -> Self {
        Self::from_customers(reference_customers())
    }

    pub async fn load_json(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let file: CustomerFile = serde_json::from_str(&raw)?;
        if file.customers.is_empty() {
            return Err(AssistantError::ConfigError(format!(
                "No customers in {}",
                path.display()
            )));
        }

        info!(path = %path.display(), customers = file.customers.len(), "Customer data loaded");
        Ok(Self::from_customers(file.customers))
    }

    pub async fn insert(&self, customer: CustomerProfile) {
        if let Some(phone) = extract_phone(&customer.phone) {
            self.by_phone.write().await.insert(phone, complete_profile(customer));
        }
    }

    pub async fn len(&self) -> usize {
        self.by_phone.read().await.len()
    }
}

impl Default for InMemoryCustomerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill in the fields a data file may omit
fn complete_profile(mut customer: CustomerProfile) -> CustomerProfile {
    if customer.address.trim().is_empty() {
        customer.address = format!("{}, India", customer.city);
    }
    if customer.email.trim().is_empty() {
        customer.email = format!("{}@email.com", customer.name.to_lowercase().replace(' ', "."));
    }
    if !customer.has_collateral() {
        customer.collateral = None;
    }
    if !customer.has_current_loans() {
        customer.current_loans = None;
    }
    customer
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn lookup_customer(&self, phone: &str) -> Result<Option<CustomerProfile>> {
        let Some(phone) = extract_phone(phone) else {
            return Ok(None);
        };
        Ok(self.by_phone.read().await.get(&phone).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CustomerProfile>> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .by_phone
            .read()
            .await
            .values()
            .find(|c| c.name.to_lowercase() == wanted)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_normalizes_phone() {
        let directory = InMemoryCustomerDirectory::with_reference_customers();

        let riya = directory.lookup_customer("+91 73032 01137").await.unwrap().unwrap();
        assert_eq!(riya.name, "Riya Sharma");
        assert_eq!(riya.pre_approved_limit, 500_000);

        assert!(directory.lookup_customer("9999999999").await.unwrap().is_none());
        assert!(directory.lookup_customer("12345").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_name_is_case_insensitive() {
        let directory = InMemoryCustomerDirectory::with_reference_customers();
        let kabir = directory.find_by_name("kabir rao").await.unwrap().unwrap();
        assert_eq!(kabir.credit_score, 698);
        assert!(kabir.has_current_loans());
    }

    #[tokio::test]
    async fn test_data_file_defaults() {
        let directory = InMemoryCustomerDirectory::new();
        let customer: CustomerProfile = serde_json::from_value(serde_json::json!({
            "id": "C09",
            "name": "Meera Iyer",
            "phone": "9123456780",
            "city": "Chennai",
            "preapproved_limit": 300000,
            "score": 760,
            "salary": 70000,
            "collateral": "None"
        }))
        .unwrap();
        directory.insert(customer).await;

        let meera = directory.lookup_customer("9123456780").await.unwrap().unwrap();
        assert_eq!(meera.address, "Chennai, India");
        assert_eq!(meera.email, "meera.iyer@email.com");
        assert!(meera.collateral.is_none());
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_json_file() {
        let dir = std::env::temp_dir().join(format!("customers-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("customer_data.json");
        tokio::fs::write(
            &path,
            r#"{"customers":[{"id":"C05","name":"Dev Patel","phone":"9000000001","age":40,"city":"Pune","preapproved_limit":250000,"score":720,"salary":45000}]}"#,
        )
        .await
        .unwrap();

        let directory = InMemoryCustomerDirectory::load_json(&path).await.unwrap();
        assert!(directory.lookup_customer("9000000001").await.unwrap().is_some());

        let missing = InMemoryCustomerDirectory::load_json(&dir.join("nope.json")).await;
        assert!(missing.is_err());
    }

    #[test]
    fn test_customer_id_is_stable() {
        let id = customer_id_for_phone("9876543210");
        assert_eq!(id, customer_id_for_phone("9876543210"));
        assert_eq!(id.len(), 9);
        assert!(id.starts_with('C'));
        assert_ne!(id, customer_id_for_phone("9876543211"));
    }
}
