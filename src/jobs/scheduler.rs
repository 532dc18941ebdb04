//! Cron wiring for the three background jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use super::{PendingWorkPoller, ScheduleGenerator, VencimentoScanner};
use crate::config::SchedulerConfig;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Job execution error: {0}")]
    ExecutionError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Completed,
    Failed,
    PartialFailure,
}

const EXECUTION_LOG_CAP: usize = 100;

pub struct JobScheduler {
    scheduler: TokioScheduler,
    generator: Arc<ScheduleGenerator>,
    poller: Arc<PendingWorkPoller>,
    scanner: Arc<VencimentoScanner>,
    config: SchedulerConfig,
    execution_logs: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl JobScheduler {
    pub async fn new(
        generator: Arc<ScheduleGenerator>,
        poller: Arc<PendingWorkPoller>,
        scanner: Arc<VencimentoScanner>,
        config: SchedulerConfig,
    ) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            generator,
            poller,
            scanner,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_pending_poller().await?;
        self.schedule_generator().await?;
        self.schedule_vencimento_scanner().await?;

        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_pending_poller(&self) -> JobResult<()> {
        let interval = self.config.poll_interval_minutes;
        let cron_expr = format!("0 */{} * * * *", interval); // Every N minutes

        let poller = self.poller.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let poller = poller.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();
                info!("Running pending-consultation poller job");

                match poller.run().await {
                    Ok(result) => {
                        record_run(
                            &logs,
                            "Pending Consultation Poller",
                            started_at,
                            result.processed as i32,
                            result.errors,
                        )
                        .await;
                    }
                    Err(e) => {
                        error!("Pending-consultation poller failed: {}", e);
                        record_failure(&logs, "Pending Consultation Poller", started_at, e).await;
                    }
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled pending-consultation poller every {} minutes", interval);

        Ok(())
    }

    async fn schedule_generator(&self) -> JobResult<()> {
        let cron_expr = format!(
            "0 {} {} * * *",
            self.config.daily_minute, self.config.daily_hour
        );

        let generator = self.generator.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let generator = generator.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();
                info!("Running schedule generator job");

                match generator.run().await {
                    Ok(result) => {
                        record_run(
                            &logs,
                            "Schedule Generator",
                            started_at,
                            result.created as i32,
                            result.errors,
                        )
                        .await;
                    }
                    Err(e) => {
                        error!("Schedule generator failed: {}", e);
                        record_failure(&logs, "Schedule Generator", started_at, e).await;
                    }
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!(
            "Scheduled daily schedule generation at {:02}:{:02}",
            self.config.daily_hour, self.config.daily_minute
        );

        Ok(())
    }

    async fn schedule_vencimento_scanner(&self) -> JobResult<()> {
        let cron_expr = format!("0 0 {} * * *", self.config.vencimento_hour);

        let scanner = self.scanner.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let scanner = scanner.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();
                info!("Running billing due-date scanner job");

                match scanner.run().await {
                    Ok(result) => {
                        record_run(
                            &logs,
                            "Billing Due-Date Scanner",
                            started_at,
                            (result.reminders + result.overdue_alerts) as i32,
                            result.errors,
                        )
                        .await;
                    }
                    Err(e) => {
                        error!("Billing due-date scanner failed: {}", e);
                        record_failure(&logs, "Billing Due-Date Scanner", started_at, e).await;
                    }
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!(
            "Scheduled billing due-date scan daily at {:02}:00",
            self.config.vencimento_hour
        );

        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    /// Trigger one job out of band, for operator use.
    pub async fn run_job_now(&self, job_name: &str) -> JobResult<()> {
        match job_name {
            "schedule_generator" => {
                self.generator
                    .run()
                    .await
                    .map_err(|e| JobError::ExecutionError(e.to_string()))?;
            }
            "pending_poller" => {
                self.poller
                    .run()
                    .await
                    .map_err(|e| JobError::ExecutionError(e.to_string()))?;
            }
            "vencimento_scanner" => {
                self.scanner
                    .run()
                    .await
                    .map_err(|e| JobError::ExecutionError(e.to_string()))?;
            }
            _ => return Err(JobError::ConfigError(format!("Unknown job: {}", job_name))),
        }

        Ok(())
    }
}

async fn record_run(
    logs: &Arc<RwLock<Vec<JobExecutionLog>>>,
    job_name: &str,
    started_at: DateTime<Utc>,
    items_processed: i32,
    errors: Vec<String>,
) {
    let completed_at = Utc::now();
    let status = if errors.is_empty() {
        JobStatus::Completed
    } else {
        JobStatus::PartialFailure
    };
    push_log(
        logs,
        JobExecutionLog {
            id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            started_at,
            completed_at: Some(completed_at),
            status,
            items_processed,
            errors,
            duration_ms: Some((completed_at - started_at).num_milliseconds()),
        },
    )
    .await;
}

async fn record_failure(
    logs: &Arc<RwLock<Vec<JobExecutionLog>>>,
    job_name: &str,
    started_at: DateTime<Utc>,
    error: Box<dyn std::error::Error + Send + Sync>,
) {
    let completed_at = Utc::now();
    push_log(
        logs,
        JobExecutionLog {
            id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            started_at,
            completed_at: Some(completed_at),
            status: JobStatus::Failed,
            items_processed: 0,
            errors: vec![error.to_string()],
            duration_ms: Some((completed_at - started_at).num_milliseconds()),
        },
    )
    .await;
}

async fn push_log(logs: &Arc<RwLock<Vec<JobExecutionLog>>>, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    // Keep only the most recent entries.
    if logs.len() > EXECUTION_LOG_CAP {
        logs.remove(0);
    }
}
