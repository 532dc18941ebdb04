//! Short-interval job that feeds due and retryable consultations through
//! the executor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::jobs::ConsultationExecutor;
use crate::repository::Repository;

pub struct PendingWorkPoller {
    repository: Arc<dyn Repository>,
    executor: Arc<ConsultationExecutor>,
    max_retries: u32,
}

#[derive(Debug, Default)]
pub struct PollResult {
    pub processed: usize,
    pub errors: Vec<String>,
}

impl PendingWorkPoller {
    pub fn new(
        repository: Arc<dyn Repository>,
        executor: Arc<ConsultationExecutor>,
        max_retries: u32,
    ) -> Self {
        Self {
            repository,
            executor,
            max_retries,
        }
    }

    pub async fn run(&self) -> Result<PollResult, Box<dyn std::error::Error + Send + Sync>> {
        self.run_at(Utc::now()).await
    }

    /// Process everything currently actionable, sequentially. Order matters:
    /// due items first, then retryable failures, each batch oldest first.
    /// The provider's rate limiter makes concurrency pointless here.
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<PollResult, Box<dyn std::error::Error + Send + Sync>> {
        let mut result = PollResult::default();

        let mut batch = self.repository.list_due_consultations(now).await?;
        batch.extend(
            self.repository
                .list_retryable_consultations(self.max_retries)
                .await?,
        );

        if batch.is_empty() {
            return Ok(result);
        }
        info!(items = batch.len(), "processing pending consultations");

        for item in batch {
            let id = item.id;
            match self.executor.execute(item).await {
                Ok(_) => result.processed += 1,
                Err(err) => {
                    let message = format!("consulta {id}: {err}");
                    error!(error = %message, "consultation processing aborted");
                    result.errors.push(message);
                }
            }
        }

        info!(
            processed = result.processed,
            errors = result.errors.len(),
            "pending work poll finished"
        );
        Ok(result)
    }
}
