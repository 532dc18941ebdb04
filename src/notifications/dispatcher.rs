//! Turns domain events into queued channel deliveries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::queue::{Channel, DeliveryFn, DeliveryFuture, NotificationQueue, NotificationTask};
use super::templates;
use crate::error::AppResult;
use crate::models::{LogLevel, LookupType, Situation};
use crate::repository::Repository;
use crate::services::{ChatSender, EmailSender};

/// Runtime kill switch for all outbound messaging.
#[async_trait]
pub trait GlobalSettingsSource: Send + Sync {
    async fn messaging_enabled(&self) -> bool;
}

/// Fixed-at-startup settings source backed by an atomic, so tests and
/// operators can flip it without restarting.
pub struct StaticSettings {
    messaging_enabled: AtomicBool,
}

impl StaticSettings {
    pub fn new(messaging_enabled: bool) -> Self {
        Self {
            messaging_enabled: AtomicBool::new(messaging_enabled),
        }
    }

    pub fn set_messaging_enabled(&self, enabled: bool) {
        self.messaging_enabled.store(enabled, Ordering::Relaxed);
    }
}

#[async_trait]
impl GlobalSettingsSource for StaticSettings {
    async fn messaging_enabled(&self) -> bool {
        self.messaging_enabled.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct AlertData {
    pub consultation_id: Uuid,
    pub company_name: String,
    pub cnpj: String,
    pub lookup_type: LookupType,
    pub situation: Situation,
}

#[derive(Debug, Clone)]
pub struct BillingNoticeData {
    /// Communication-log reference (our-number or record id).
    pub reference: String,
    pub payer_name: String,
    pub amount: Decimal,
    /// Already formatted for display (dd/mm/yyyy).
    pub due_date: String,
    pub digitable_line: String,
    pub pdf_link: String,
    pub days_overdue: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Alert(AlertData),
    BoletoIssued(BillingNoticeData),
    BoletoPaid(BillingNoticeData),
    BoletoDueTomorrow(BillingNoticeData),
    BoletoOverdue(BillingNoticeData),
    BoletoReactivated(BillingNoticeData),
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Alert(_) => "alerta",
            Self::BoletoIssued(_) => "boleto-emitido",
            Self::BoletoPaid(_) => "boleto-pago",
            Self::BoletoDueTomorrow(_) => "boleto-d1",
            Self::BoletoOverdue(_) => "boleto-atraso",
            Self::BoletoReactivated(_) => "boleto-reativado",
        }
    }

    /// Reference the communication log entries attach to.
    pub fn log_reference(&self) -> String {
        match self {
            Self::Alert(data) => data.consultation_id.to_string(),
            Self::BoletoIssued(data)
            | Self::BoletoPaid(data)
            | Self::BoletoDueTomorrow(data)
            | Self::BoletoOverdue(data)
            | Self::BoletoReactivated(data) => data.reference.clone(),
        }
    }
}

/// Fans an event out to the configured channels, one queue task per channel,
/// logging the outcome of every delivery attempt to the repository.
pub struct NotificationDispatcher {
    queue: Arc<NotificationQueue>,
    email: Arc<dyn EmailSender>,
    chat: Arc<dyn ChatSender>,
    repository: Arc<dyn Repository>,
    settings: Arc<dyn GlobalSettingsSource>,
}

impl NotificationDispatcher {
    pub fn new(
        queue: Arc<NotificationQueue>,
        email: Arc<dyn EmailSender>,
        chat: Arc<dyn ChatSender>,
        repository: Arc<dyn Repository>,
        settings: Arc<dyn GlobalSettingsSource>,
    ) -> Self {
        Self {
            queue,
            email,
            chat,
            repository,
            settings,
        }
    }

    /// Enqueue the event for each channel with a recipient. Returns how many
    /// tasks were queued; zero when messaging is globally disabled.
    pub async fn notify(
        &self,
        event: NotificationEvent,
        email_to: Option<&str>,
        chat_to: Option<&str>,
    ) -> AppResult<usize> {
        if !self.settings.messaging_enabled().await {
            info!(kind = event.kind(), "messaging disabled, event suppressed");
            return Ok(0);
        }

        let mut queued = 0;

        if let Some(to) = email_to.filter(|to| !to.is_empty()) {
            self.queue.enqueue(self.email_task(&event, to))?;
            queued += 1;
        }
        if let Some(to) = chat_to.filter(|to| !to.is_empty()) {
            self.queue.enqueue(self.chat_task(&event, to))?;
            queued += 1;
        }

        if queued == 0 {
            warn!(kind = event.kind(), "event has no reachable recipients");
        }
        Ok(queued)
    }

    fn email_task(&self, event: &NotificationEvent, to: &str) -> NotificationTask {
        let (subject, body) = templates::email_payload(event);
        let sender = self.email.clone();
        let repository = self.repository.clone();
        let reference = event.log_reference();
        let kind = event.kind();
        let to = to.to_string();

        let deliver: DeliveryFn = Arc::new(move || {
            let sender = sender.clone();
            let repository = repository.clone();
            let reference = reference.clone();
            let to = to.clone();
            let subject = subject.clone();
            let body = body.clone();
            Box::pin(async move {
                let result = sender.send_email(&to, &subject, &body).await;
                log_outcome(&*repository, &reference, Channel::Email, kind, &to, &result).await;
                result
            }) as DeliveryFuture
        });

        NotificationTask::new(
            format!("{}-{}-email", kind, Uuid::new_v4()),
            Channel::Email,
            deliver,
        )
    }

    fn chat_task(&self, event: &NotificationEvent, to: &str) -> NotificationTask {
        let text = templates::chat_text(event);
        let sender = self.chat.clone();
        let repository = self.repository.clone();
        let reference = event.log_reference();
        let kind = event.kind();
        let to = to.to_string();

        let deliver: DeliveryFn = Arc::new(move || {
            let sender = sender.clone();
            let repository = repository.clone();
            let reference = reference.clone();
            let to = to.clone();
            let text = text.clone();
            Box::pin(async move {
                let result = sender.send_chat_message(&to, &text).await;
                log_outcome(&*repository, &reference, Channel::Chat, kind, &to, &result).await;
                result
            }) as DeliveryFuture
        });

        NotificationTask::new(
            format!("{}-{}-chat", kind, Uuid::new_v4()),
            Channel::Chat,
            deliver,
        )
    }
}

async fn log_outcome(
    repository: &dyn Repository,
    reference: &str,
    channel: Channel,
    kind: &str,
    to: &str,
    result: &AppResult<bool>,
) {
    let (level, message) = match result {
        Ok(true) => (
            LogLevel::Info,
            format!("Notificação {kind} enviada via {channel} para {to}"),
        ),
        Ok(false) => (
            LogLevel::Warn,
            format!("Notificação {kind} via {channel} não enviada, canal indisponível"),
        ),
        Err(err) => (
            LogLevel::Error,
            format!("Falha ao enviar {kind} via {channel} para {to}: {err}"),
        ),
    };
    if let Err(err) = repository.append_log(reference, level, &message, None).await {
        warn!(error = %err, "failed to record communication log");
    }
}

/// Display helper shared by the scanner and the templates.
pub fn format_due_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct RecordingEmail {
        sent: AtomicU32,
    }

    #[async_trait]
    impl EmailSender for RecordingEmail {
        async fn send_email(&self, _to: &str, _subject: &str, _html: &str) -> AppResult<bool> {
            self.sent.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        }
    }

    struct NoopChat;

    #[async_trait]
    impl ChatSender for NoopChat {
        async fn send_chat_message(&self, _to: &str, _text: &str) -> AppResult<bool> {
            Ok(true)
        }
    }

    fn alert_event() -> NotificationEvent {
        NotificationEvent::Alert(AlertData {
            consultation_id: Uuid::new_v4(),
            company_name: "Empresa Teste".to_string(),
            cnpj: "12345678000190".to_string(),
            lookup_type: LookupType::CndFederal,
            situation: Situation::Negative,
        })
    }

    fn dispatcher(
        enabled: bool,
    ) -> (
        NotificationDispatcher,
        Arc<NotificationQueue>,
        Arc<RecordingEmail>,
        Arc<InMemoryRepository>,
    ) {
        let queue = Arc::new(NotificationQueue::new(
            3,
            Duration::from_millis(10),
            Duration::from_millis(100),
        ));
        let email = Arc::new(RecordingEmail {
            sent: AtomicU32::new(0),
        });
        let repository = Arc::new(InMemoryRepository::new());
        let dispatcher = NotificationDispatcher::new(
            queue.clone(),
            email.clone(),
            Arc::new(NoopChat),
            repository.clone(),
            Arc::new(StaticSettings::new(enabled)),
        );
        (dispatcher, queue, email, repository)
    }

    #[tokio::test]
    async fn kill_switch_suppresses_everything() {
        let (dispatcher, queue, _, _) = dispatcher(false);
        let queued = dispatcher
            .notify(alert_event(), Some("a@b.c"), Some("5511999990000"))
            .await
            .unwrap();
        assert_eq!(queued, 0);
        assert_eq!(queue.stats().enqueued, 0);
    }

    #[tokio::test]
    async fn queues_one_task_per_reachable_channel() {
        let (dispatcher, queue, _, _) = dispatcher(true);
        let queued = dispatcher
            .notify(alert_event(), Some("a@b.c"), None)
            .await
            .unwrap();
        assert_eq!(queued, 1);
        assert_eq!(queue.stats().enqueued, 1);

        let queued = dispatcher
            .notify(alert_event(), Some("a@b.c"), Some("5511999990000"))
            .await
            .unwrap();
        assert_eq!(queued, 2);
    }

    #[tokio::test]
    async fn empty_recipients_are_skipped() {
        let (dispatcher, queue, _, _) = dispatcher(true);
        let queued = dispatcher.notify(alert_event(), Some(""), None).await.unwrap();
        assert_eq!(queued, 0);
        assert_eq!(queue.stats().enqueued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_outcome_lands_in_the_communication_log() {
        let (dispatcher, queue, email, repository) = dispatcher(true);
        dispatcher
            .notify(alert_event(), Some("fiscal@empresa.com.br"), None)
            .await
            .unwrap();

        let worker = tokio::spawn(queue.clone().run_worker());
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.stop();
        worker.await.unwrap();

        assert_eq!(email.sent.load(Ordering::Relaxed), 1);
        let logs = repository.logs().await;
        assert_eq!(logs.len(), 1);
        assert!(logs[0].message.contains("enviada via email"));
    }
}
