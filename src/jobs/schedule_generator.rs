//! Daily job that turns per-company periodicity rules into scheduled
//! consultation items.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{error, info};

use crate::error::AppResult;
use crate::models::{ConsultationItem, LookupType, parse_time_of_day};
use crate::repository::Repository;

pub struct ScheduleGenerator {
    repository: Arc<dyn Repository>,
    lookup_types: Vec<LookupType>,
}

#[derive(Debug, Default)]
pub struct GenerationResult {
    pub created: usize,
    pub errors: Vec<String>,
}

impl ScheduleGenerator {
    pub fn new(repository: Arc<dyn Repository>, lookup_types: Vec<LookupType>) -> Self {
        Self {
            repository,
            lookup_types,
        }
    }

    pub async fn run(&self) -> Result<GenerationResult, Box<dyn std::error::Error + Send + Sync>> {
        self.run_for_date(Utc::now().date_naive()).await
    }

    /// Create consultation items for every active company whose periodicity
    /// fires on `today`. One company failing must not stop the batch.
    pub async fn run_for_date(
        &self,
        today: NaiveDate,
    ) -> Result<GenerationResult, Box<dyn std::error::Error + Send + Sync>> {
        info!(date = %today, "schedule generation started");
        let mut result = GenerationResult::default();

        let companies = self.repository.list_active_companies().await?;
        for company in companies {
            if !company.periodicity.is_due_on(today) {
                continue;
            }

            let (hour, minute) = parse_time_of_day(&company.periodicity.time_of_day);
            // Valid by construction: parse_time_of_day clamps to 0-23/0-59.
            let scheduled_for = today
                .and_hms_opt(hour, minute, 0)
                .unwrap_or_else(|| today.and_hms_opt(8, 0, 0).expect("08:00 is valid"))
                .and_utc();

            for lookup_type in &self.lookup_types {
                let item = ConsultationItem::new(company.id, *lookup_type, scheduled_for);
                match self.repository.create_consultation(item).await {
                    Ok(_) => result.created += 1,
                    Err(err) => {
                        let message = format!(
                            "empresa {} ({}): {}",
                            company.name, lookup_type, err
                        );
                        error!(error = %message, "failed to create consultation");
                        result.errors.push(message);
                    }
                }
            }
        }

        info!(
            created = result.created,
            errors = result.errors.len(),
            "schedule generation finished"
        );
        Ok(result)
    }

    /// Schedule an out-of-band consultation for right now, bypassing the
    /// periodicity rule. Used for operator-triggered rechecks.
    pub async fn force_schedule(
        &self,
        company_id: uuid::Uuid,
        lookup_type: LookupType,
    ) -> AppResult<ConsultationItem> {
        let item = ConsultationItem::new(company_id, lookup_type, Utc::now());
        self.repository.create_consultation(item).await
    }
}
