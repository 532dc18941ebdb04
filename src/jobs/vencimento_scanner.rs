//! Daily scan of billing due dates.
//!
//! Emits a reminder the day before a boleto is due (D-1) and overdue
//! alerts on a fixed cadence: days 1, 3 and 7 after the due date, then
//! every 7 days.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::models::{BillingRecord, BillingStatus, LogLevel, parse_due_date};
use crate::notifications::dispatcher::format_due_date;
use crate::notifications::{BillingNoticeData, NotificationDispatcher, NotificationEvent};
use crate::repository::Repository;

pub struct VencimentoScanner {
    repository: Arc<dyn Repository>,
    dispatcher: Arc<NotificationDispatcher>,
    backend_url: String,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub reminders: usize,
    pub overdue_alerts: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl VencimentoScanner {
    pub fn new(
        repository: Arc<dyn Repository>,
        dispatcher: Arc<NotificationDispatcher>,
        backend_url: String,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            backend_url: backend_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn run(&self) -> Result<ScanResult, Box<dyn std::error::Error + Send + Sync>> {
        self.run_for_date(Utc::now().date_naive()).await
    }

    pub async fn run_for_date(
        &self,
        today: NaiveDate,
    ) -> Result<ScanResult, Box<dyn std::error::Error + Send + Sync>> {
        info!(date = %today, "billing due-date scan started");
        let mut result = ScanResult::default();
        let tomorrow = today.succ_opt().unwrap_or(today);

        for record in self.repository.list_active_billing_records().await? {
            let Some(due) = parse_due_date(&record.due_date) else {
                warn!(
                    record = %record.id,
                    due_date = %record.due_date,
                    "unparsable due date, record skipped"
                );
                result.skipped += 1;
                continue;
            };

            if due == tomorrow && record.status == BillingStatus::Issued {
                match self.send_reminder(&record, due).await {
                    Ok(()) => result.reminders += 1,
                    Err(message) => result.errors.push(message),
                }
                continue;
            }

            if due < today {
                let days = (today - due).num_days();
                if should_notify_overdue(days) {
                    match self.send_overdue(&record, due, days).await {
                        Ok(()) => result.overdue_alerts += 1,
                        Err(message) => result.errors.push(message),
                    }
                }
            }
        }

        info!(
            reminders = result.reminders,
            overdue_alerts = result.overdue_alerts,
            skipped = result.skipped,
            errors = result.errors.len(),
            "billing due-date scan finished"
        );
        Ok(result)
    }

    async fn send_reminder(&self, record: &BillingRecord, due: NaiveDate) -> Result<(), String> {
        let event = NotificationEvent::BoletoDueTomorrow(self.notice(record, due, None));
        self.dispatcher
            .notify(
                event,
                record.notification_email.as_deref(),
                record.chat_handle.as_deref(),
            )
            .await
            .map_err(|e| format!("boleto {}: {e}", record.reference()))?;

        if let Err(err) = self
            .repository
            .append_log(
                "BOLETO_D1",
                LogLevel::Info,
                &format!("Lembrete D-1 enviado: {}", record.reference()),
                None,
            )
            .await
        {
            warn!(error = %err, "failed to record reminder log entry");
        }
        Ok(())
    }

    async fn send_overdue(
        &self,
        record: &BillingRecord,
        due: NaiveDate,
        days: i64,
    ) -> Result<(), String> {
        let event = NotificationEvent::BoletoOverdue(self.notice(record, due, Some(days)));
        self.dispatcher
            .notify(
                event,
                record.notification_email.as_deref(),
                record.chat_handle.as_deref(),
            )
            .await
            .map_err(|e| format!("boleto {}: {e}", record.reference()))?;

        if let Err(err) = self
            .repository
            .append_log(
                "BOLETO_ATRASO",
                LogLevel::Warn,
                &format!("Alerta D+{days} enviado: {}", record.reference()),
                None,
            )
            .await
        {
            warn!(error = %err, "failed to record overdue log entry");
        }
        Ok(())
    }

    fn notice(
        &self,
        record: &BillingRecord,
        due: NaiveDate,
        days_overdue: Option<i64>,
    ) -> BillingNoticeData {
        BillingNoticeData {
            reference: record.reference(),
            payer_name: record.payer_name.clone(),
            amount: record.amount,
            due_date: format_due_date(due),
            digitable_line: record.digitable_line.clone(),
            pdf_link: format!("{}/api/boleto/pdf/{}", self.backend_url, record.reference()),
            days_overdue,
        }
    }
}

/// Overdue cadence: alert on days 1, 3 and 7, then weekly.
pub fn should_notify_overdue(days: i64) -> bool {
    matches!(days, 1 | 3 | 7) || (days > 7 && days % 7 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::notifications::{NotificationQueue, StaticSettings};
    use crate::repository::InMemoryRepository;
    use crate::services::{ChatSender, EmailSender};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use uuid::Uuid;

    struct NoopEmail;

    #[async_trait]
    impl EmailSender for NoopEmail {
        async fn send_email(&self, _: &str, _: &str, _: &str) -> AppResult<bool> {
            Ok(true)
        }
    }

    struct NoopChat;

    #[async_trait]
    impl ChatSender for NoopChat {
        async fn send_chat_message(&self, _: &str, _: &str) -> AppResult<bool> {
            Ok(true)
        }
    }

    #[test]
    fn overdue_cadence_matches_the_contract() {
        let expected: Vec<i64> = vec![1, 3, 7, 14, 21, 28];
        let actual: Vec<i64> = (1..=30).filter(|d| should_notify_overdue(*d)).collect();
        assert_eq!(actual, expected);
        assert!(!should_notify_overdue(0));
        assert!(!should_notify_overdue(-1));
    }

    fn record(due_date: &str, status: BillingStatus) -> BillingRecord {
        BillingRecord {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            payer_name: "Empresa Teste".to_string(),
            due_date: due_date.to_string(),
            status,
            amount: Decimal::new(10000, 2),
            digitable_line: "23793.38128".to_string(),
            our_number: "OUR-1".to_string(),
            notification_email: Some("fin@empresa.com.br".to_string()),
            chat_handle: None,
        }
    }

    async fn scanner_with(
        repository: Arc<InMemoryRepository>,
    ) -> (VencimentoScanner, Arc<NotificationQueue>) {
        let queue = Arc::new(NotificationQueue::new(
            3,
            Duration::from_millis(10),
            Duration::from_millis(100),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            queue.clone(),
            Arc::new(NoopEmail),
            Arc::new(NoopChat),
            repository.clone(),
            Arc::new(StaticSettings::new(true)),
        ));
        (
            VencimentoScanner::new(
                repository,
                dispatcher,
                "http://localhost:8000".to_string(),
            ),
            queue,
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[tokio::test]
    async fn issued_record_due_tomorrow_gets_a_reminder() {
        let repository = Arc::new(InMemoryRepository::new());
        repository
            .insert_billing_record(record("2025-04-02", BillingStatus::Issued))
            .await;
        // Overdue records due tomorrow make no sense; only Issued reminds.
        repository
            .insert_billing_record(record("2025-04-02", BillingStatus::Overdue))
            .await;

        let (scanner, queue) = scanner_with(repository.clone()).await;
        let result = scanner.run_for_date(date(2025, 4, 1)).await.unwrap();

        assert_eq!(result.reminders, 1);
        assert_eq!(result.overdue_alerts, 0);
        assert_eq!(queue.stats().enqueued, 1);

        let logs = repository.logs().await;
        assert!(logs.iter().any(|l| l.reference == "BOLETO_D1"));
    }

    #[tokio::test]
    async fn overdue_alerts_follow_the_cadence() {
        let repository = Arc::new(InMemoryRepository::new());
        // 3 days overdue on 2025-04-04: alert day.
        repository
            .insert_billing_record(record("2025-04-01", BillingStatus::Overdue))
            .await;
        // 2 days overdue: off-cadence, silent.
        repository
            .insert_billing_record(record("2025-04-02", BillingStatus::Overdue))
            .await;
        // 14 days overdue: weekly cadence.
        repository
            .insert_billing_record(record("2025-03-21", BillingStatus::Issued))
            .await;

        let (scanner, queue) = scanner_with(repository.clone()).await;
        let result = scanner.run_for_date(date(2025, 4, 4)).await.unwrap();

        assert_eq!(result.overdue_alerts, 2);
        assert_eq!(queue.stats().enqueued, 2);

        let logs = repository.logs().await;
        let overdue_logs: Vec<_> =
            logs.iter().filter(|l| l.reference == "BOLETO_ATRASO").collect();
        assert_eq!(overdue_logs.len(), 2);
        assert!(overdue_logs.iter().any(|l| l.message.contains("D+3")));
        assert!(overdue_logs.iter().any(|l| l.message.contains("D+14")));
    }

    #[tokio::test]
    async fn unparsable_due_date_is_skipped_not_fatal() {
        let repository = Arc::new(InMemoryRepository::new());
        repository
            .insert_billing_record(record("04/01/2025", BillingStatus::Issued))
            .await;
        repository
            .insert_billing_record(record("2025-04-02", BillingStatus::Issued))
            .await;

        let (scanner, _) = scanner_with(repository).await;
        let result = scanner.run_for_date(date(2025, 4, 1)).await.unwrap();

        assert_eq!(result.skipped, 1);
        assert_eq!(result.reminders, 1);
    }
}
