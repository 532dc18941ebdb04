//! Persistence seam.
//!
//! The record store is an external collaborator, so every read and write the
//! jobs need goes through [`Repository`]. The bundled
//! [`InMemoryRepository`] backs the binary and the tests; a SQL-backed
//! implementation slots in behind the same trait.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    BillingRecord, BillingStatus, Company, ConsultationItem, ConsultationState, LogEntry, LogLevel,
};

#[async_trait]
pub trait Repository: Send + Sync {
    async fn list_active_companies(&self) -> AppResult<Vec<Company>>;

    async fn get_company(&self, id: Uuid) -> AppResult<Option<Company>>;

    /// Scheduled items whose `scheduled_for` is at or before `now`, oldest
    /// first.
    async fn list_due_consultations(&self, now: DateTime<Utc>)
        -> AppResult<Vec<ConsultationItem>>;

    /// Failed items that still have retry budget left.
    async fn list_retryable_consultations(
        &self,
        max_attempts: u32,
    ) -> AppResult<Vec<ConsultationItem>>;

    async fn create_consultation(&self, item: ConsultationItem) -> AppResult<ConsultationItem>;

    /// Persist the full item state. Unknown ids are an error; state
    /// transitions must never be silently dropped.
    async fn update_consultation(&self, item: &ConsultationItem) -> AppResult<()>;

    /// Billing records the due-date scanner should look at (issued or
    /// already flagged overdue).
    async fn list_active_billing_records(&self) -> AppResult<Vec<BillingRecord>>;

    async fn append_log(
        &self,
        reference: &str,
        level: LogLevel,
        message: &str,
        payload: Option<serde_json::Value>,
    ) -> AppResult<()>;
}

#[derive(Default)]
struct Store {
    companies: HashMap<Uuid, Company>,
    consultations: HashMap<Uuid, ConsultationItem>,
    billing_records: Vec<BillingRecord>,
    logs: Vec<LogEntry>,
}

/// In-memory store, optionally seeded from a JSON file at startup.
#[derive(Default)]
pub struct InMemoryRepository {
    inner: RwLock<Store>,
}

/// JSON seed shape consumed by [`InMemoryRepository::from_seed_file`].
#[derive(Debug, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub billing_records: Vec<BillingRecord>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_seed_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| AppError::Config(format!("seed file: {e}")))?;
        let seed: Seed = serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("seed file: {e}")))?;

        let repo = Self::new();
        for company in seed.companies {
            repo.insert_company(company).await;
        }
        for record in seed.billing_records {
            repo.insert_billing_record(record).await;
        }
        Ok(repo)
    }

    pub async fn insert_company(&self, company: Company) {
        self.inner.write().await.companies.insert(company.id, company);
    }

    pub async fn insert_billing_record(&self, record: BillingRecord) {
        self.inner.write().await.billing_records.push(record);
    }

    pub async fn get_consultation(&self, id: Uuid) -> Option<ConsultationItem> {
        self.inner.read().await.consultations.get(&id).cloned()
    }

    pub async fn consultations(&self) -> Vec<ConsultationItem> {
        self.inner.read().await.consultations.values().cloned().collect()
    }

    pub async fn logs(&self) -> Vec<LogEntry> {
        self.inner.read().await.logs.clone()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_active_companies(&self) -> AppResult<Vec<Company>> {
        let store = self.inner.read().await;
        Ok(store
            .companies
            .values()
            .filter(|c| c.active)
            .cloned()
            .collect())
    }

    async fn get_company(&self, id: Uuid) -> AppResult<Option<Company>> {
        Ok(self.inner.read().await.companies.get(&id).cloned())
    }

    async fn list_due_consultations(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<ConsultationItem>> {
        let store = self.inner.read().await;
        let mut due: Vec<ConsultationItem> = store
            .consultations
            .values()
            .filter(|c| c.state == ConsultationState::Scheduled && c.scheduled_for <= now)
            .cloned()
            .collect();
        due.sort_by_key(|c| c.scheduled_for);
        Ok(due)
    }

    async fn list_retryable_consultations(
        &self,
        max_attempts: u32,
    ) -> AppResult<Vec<ConsultationItem>> {
        let store = self.inner.read().await;
        let mut items: Vec<ConsultationItem> = store
            .consultations
            .values()
            .filter(|c| c.state == ConsultationState::Failed && c.attempts < max_attempts)
            .cloned()
            .collect();
        items.sort_by_key(|c| c.scheduled_for);
        Ok(items)
    }

    async fn create_consultation(&self, item: ConsultationItem) -> AppResult<ConsultationItem> {
        self.inner
            .write()
            .await
            .consultations
            .insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_consultation(&self, item: &ConsultationItem) -> AppResult<()> {
        let mut store = self.inner.write().await;
        match store.consultations.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(AppError::Repository(format!(
                "consultation {} not found",
                item.id
            ))),
        }
    }

    async fn list_active_billing_records(&self) -> AppResult<Vec<BillingRecord>> {
        let store = self.inner.read().await;
        Ok(store
            .billing_records
            .iter()
            .filter(|r| matches!(r.status, BillingStatus::Issued | BillingStatus::Overdue))
            .cloned()
            .collect())
    }

    async fn append_log(
        &self,
        reference: &str,
        level: LogLevel,
        message: &str,
        payload: Option<serde_json::Value>,
    ) -> AppResult<()> {
        self.inner.write().await.logs.push(LogEntry {
            reference: reference.to_string(),
            level,
            message: message.to_string(),
            payload,
            created_at: Utc::now(),
        });
        Ok(())
    }
}
