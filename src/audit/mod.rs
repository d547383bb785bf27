//! Application log
//!
//! Every issued sanction letter is recorded as an application with a
//! SHA-256 integrity hash. Stored in memory, or in Postgres when a
//! database URL is configured.

use crate::error::AssistantError;
use crate::models::{FinalDecision, LoanOffer, LoanType};
use crate::Result;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationRecord {
    pub application_id: Uuid,
    /// Customer phone number
    pub user_id: String,
    pub status: FinalDecision,
    pub amount: u64,
    pub tenure_months: u32,
    pub interest_rate: f64,
    pub emi: u64,
    pub loan_type: LoanType,
    pub sanction_letter: Option<String>,
    pub created_at: DateTime<Utc>,
    pub integrity_hash: String,
}

impl ApplicationRecord {
    pub fn new(
        user_id: impl Into<String>,
        status: FinalDecision,
        terms: &LoanOffer,
        sanction_letter: Option<&Path>,
    ) -> Self {
        let mut record = Self {
            application_id: Uuid::new_v4(),
            user_id: user_id.into(),
            status,
            amount: terms.amount,
            tenure_months: terms.tenure_months,
            interest_rate: terms.interest_rate,
            emi: terms.emi,
            loan_type: terms.loan_type,
            sanction_letter: sanction_letter.map(|p| p.display().to_string()),
            // Postgres keeps microseconds
            created_at: Utc::now().trunc_subsecs(6),
            integrity_hash: String::new(),
        };
        record.integrity_hash = compute_application_hash(&record);
        record
    }
}

/// Fields covered by the integrity hash
#[derive(Serialize)]
struct HashedFields<'a> {
    application_id: &'a Uuid,
    user_id: &'a str,
    status: FinalDecision,
    amount: u64,
    tenure_months: u32,
    interest_rate: f64,
    emi: u64,
    loan_type: LoanType,
    sanction_letter: Option<&'a str>,
    created_at: &'a DateTime<Utc>,
}

/// SHA-256 over the record's contents, excluding the stored hash
pub fn compute_application_hash(record: &ApplicationRecord) -> String {
    let fields = HashedFields {
        application_id: &record.application_id,
        user_id: &record.user_id,
        status: record.status,
        amount: record.amount,
        tenure_months: record.tenure_months,
        interest_rate: record.interest_rate,
        emi: record.emi,
        loan_type: record.loan_type,
        sanction_letter: record.sanction_letter.as_deref(),
        created_at: &record.created_at,
    };

    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &fields).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

enum LogBackend {
    InMemory {
        records: Arc<RwLock<HashMap<Uuid, ApplicationRecord>>>,
    },
    Postgres {
        pool: PgPool,
        schema_ready: Arc<OnceCell<()>>,
    },
}

pub struct ApplicationLog {
    backend: LogBackend,
}

impl ApplicationLog {
    pub fn new() -> Self {
        Self {
            backend: LogBackend::InMemory {
                records: Arc::new(RwLock::new(HashMap::new())),
            },
        }
    }

    /// Postgres when `database_url` is set and usable, in-memory otherwise
    pub fn from_database_url(database_url: Option<&str>) -> Self {
        if let Some(url) = database_url {
            match sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect_lazy(url)
            {
                Ok(pool) => {
                    info!("Application log backend: postgres");
                    return Self {
                        backend: LogBackend::Postgres {
                            pool,
                            schema_ready: Arc::new(OnceCell::new()),
                        },
                    };
                }
                Err(error) => {
                    warn!(
                        "Failed to initialize postgres application log, falling back to in-memory: {}",
                        error
                    );
                }
            }
        }

        info!("Application log backend: in-memory");
        Self::new()
    }

    async fn ensure_schema_if_needed(&self) -> Result<()> {
        let LogBackend::Postgres { pool, schema_ready } = &self.backend else {
            return Ok(());
        };

        schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS loan_applications (
                      application_id UUID PRIMARY KEY,
                      user_id TEXT NOT NULL,
                      status TEXT NOT NULL,
                      amount BIGINT NOT NULL,
                      tenure_months INTEGER NOT NULL,
                      interest_rate DOUBLE PRECISION NOT NULL,
                      emi BIGINT NOT NULL,
                      loan_type TEXT NOT NULL,
                      sanction_letter TEXT,
                      created_at TIMESTAMPTZ NOT NULL,
                      integrity_hash TEXT NOT NULL
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_loan_applications_user_time
                    ON loan_applications (user_id, created_at);
                    "#,
                )
                .execute(pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AssistantError::DatabaseError(format!(
                    "Failed to initialize application log schema: {}",
                    e
                ))
            })?;

        Ok(())
    }

    /// Store an application record
    pub async fn record(&self, record: ApplicationRecord) -> Result<Uuid> {
        let application_id = record.application_id;

        match &self.backend {
            LogBackend::InMemory { records } => {
                records.write().await.insert(application_id, record);
            }
            LogBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                sqlx::query(
                    r#"
                    INSERT INTO loan_applications
                      (application_id, user_id, status, amount, tenure_months, interest_rate, emi, loan_type, sanction_letter, created_at, integrity_hash)
                    VALUES
                      ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                )
                .bind(record.application_id)
                .bind(&record.user_id)
                .bind(record.status.to_string())
                .bind(record.amount as i64)
                .bind(record.tenure_months as i32)
                .bind(record.interest_rate)
                .bind(record.emi as i64)
                .bind(record.loan_type.to_string())
                .bind(&record.sanction_letter)
                .bind(record.created_at)
                .bind(&record.integrity_hash)
                .execute(pool)
                .await
                .map_err(|e| {
                    AssistantError::DatabaseError(format!("Failed to insert application: {}", e))
                })?;
            }
        }

        info!(%application_id, "Application recorded");
        Ok(application_id)
    }

    /// Retrieve a record by application ID
    pub async fn get(&self, application_id: Uuid) -> Result<Option<ApplicationRecord>> {
        match &self.backend {
            LogBackend::InMemory { records } => Ok(records.read().await.get(&application_id).cloned()),
            LogBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let row = sqlx::query("SELECT * FROM loan_applications WHERE application_id = $1")
                    .bind(application_id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        AssistantError::DatabaseError(format!("Failed to load application: {}", e))
                    })?;

                row.as_ref().map(record_from_row).transpose()
            }
        }
    }

    /// All applications for a user, oldest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<ApplicationRecord>> {
        match &self.backend {
            LogBackend::InMemory { records } => {
                let records = records.read().await;
                let mut items: Vec<_> = records
                    .values()
                    .filter(|record| record.user_id == user_id)
                    .cloned()
                    .collect();
                items.sort_by_key(|record| record.created_at);
                Ok(items)
            }
            LogBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let rows = sqlx::query(
                    "SELECT * FROM loan_applications WHERE user_id = $1 ORDER BY created_at ASC",
                )
                .bind(user_id)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    AssistantError::DatabaseError(format!("Failed to list applications: {}", e))
                })?;

                rows.iter().map(record_from_row).collect()
            }
        }
    }

    /// Recompute the hash of a stored record and compare
    pub async fn verify_integrity(&self, application_id: Uuid) -> Result<bool> {
        Ok(self
            .get(application_id)
            .await?
            .map(|record| compute_application_hash(&record) == record.integrity_hash)
            .unwrap_or(false))
    }
}

impl Default for ApplicationLog {
    fn default() -> Self {
        Self::new()
    }
}

fn status_from_db(status: &str) -> Result<FinalDecision> {
    match status {
        "APPROVED" => Ok(FinalDecision::Approved),
        "APPROVED_SECURED" => Ok(FinalDecision::ApprovedSecured),
        other => Err(AssistantError::AuditError(format!("Unknown application status '{}'", other))),
    }
}

fn loan_type_from_db(loan_type: &str) -> Result<LoanType> {
    match loan_type {
        "secured" => Ok(LoanType::Secured),
        "unsecured" => Ok(LoanType::Unsecured),
        other => Err(AssistantError::AuditError(format!("Unknown loan type '{}'", other))),
    }
}

fn record_from_row(row: &PgRow) -> Result<ApplicationRecord> {
    let db_err = |e: sqlx::Error| AssistantError::DatabaseError(format!("Malformed application row: {}", e));

    let status: String = row.try_get("status").map_err(db_err)?;
    let loan_type: String = row.try_get("loan_type").map_err(db_err)?;
    let amount: i64 = row.try_get("amount").map_err(db_err)?;
    let tenure_months: i32 = row.try_get("tenure_months").map_err(db_err)?;
    let emi: i64 = row.try_get("emi").map_err(db_err)?;

    Ok(ApplicationRecord {
        application_id: row.try_get("application_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        status: status_from_db(&status)?,
        amount: amount.max(0) as u64,
        tenure_months: tenure_months.max(0) as u32,
        interest_rate: row.try_get("interest_rate").map_err(db_err)?,
        emi: emi.max(0) as u64,
        loan_type: loan_type_from_db(&loan_type)?,
        sanction_letter: row.try_get("sanction_letter").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        integrity_hash: row.try_get("integrity_hash").map_err(db_err)?,
    })
}
