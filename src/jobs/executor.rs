//! Consultation retry state machine.
//!
//! One call to [`ConsultationExecutor::execute`] drives a single item
//! through one attempt: Scheduled/Failed -> InProgress -> Completed, or back
//! to Failed (retryable until the attempt budget is spent, terminal after).
//! Provider problems never bubble out of an attempt; only repository
//! failures do, because losing a state transition would corrupt the queue.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::models::{ConsultationItem, ConsultationState, LogLevel, Situation};
use crate::notifications::{AlertData, NotificationDispatcher, NotificationEvent};
use crate::repository::Repository;
use crate::services::LookupProvider;

pub struct ConsultationExecutor {
    repository: Arc<dyn Repository>,
    provider: Arc<dyn LookupProvider>,
    dispatcher: Arc<NotificationDispatcher>,
    max_retries: u32,
}

impl ConsultationExecutor {
    pub fn new(
        repository: Arc<dyn Repository>,
        provider: Arc<dyn LookupProvider>,
        dispatcher: Arc<NotificationDispatcher>,
        max_retries: u32,
    ) -> Self {
        Self {
            repository,
            provider,
            dispatcher,
            max_retries,
        }
    }

    pub async fn execute(&self, mut item: ConsultationItem) -> AppResult<ConsultationItem> {
        item.attempts += 1;
        item.state = ConsultationState::InProgress;
        self.repository.update_consultation(&item).await?;
        self.log(
            &item,
            LogLevel::Info,
            &format!(
                "Iniciando consulta {} (tentativa {})",
                item.lookup_type, item.attempts
            ),
        )
        .await;

        let Some(company) = self.repository.get_company(item.company_id).await? else {
            return self.handle_failure(item, "empresa não encontrada").await;
        };

        let result = self.provider.lookup(&company, item.lookup_type).await;

        if result.situation == Situation::Error {
            let message = result
                .error_message
                .unwrap_or_else(|| "erro desconhecido do provedor".to_string());
            return self.handle_failure(item, &message).await;
        }

        item.state = ConsultationState::Completed;
        item.executed_at = Some(Utc::now());
        item.situation = Some(result.situation);
        item.result_json = result.raw;
        item.certificate_url = result.certificate_url;
        item.valid_until = result.valid_until;
        item.error_message = None;
        self.repository.update_consultation(&item).await?;
        self.log(
            &item,
            LogLevel::Info,
            &format!("Consulta concluída: situação {}", result.situation.label()),
        )
        .await;
        info!(
            consultation = %item.id,
            cnpj = %company.cnpj,
            situation = %result.situation,
            "consultation completed"
        );

        if result.situation.requires_alert() {
            self.log(
                &item,
                LogLevel::Warn,
                &format!("ALERTA: situação {}", result.situation.label()),
            )
            .await;
            self.send_alert(&item, &company.name, &company.cnpj, result.situation)
                .await;
        }

        Ok(item)
    }

    async fn handle_failure(
        &self,
        mut item: ConsultationItem,
        message: &str,
    ) -> AppResult<ConsultationItem> {
        item.state = ConsultationState::Failed;

        if item.attempts >= self.max_retries {
            // Terminal: out of budget. The company is alerted so the problem
            // is not silently invisible until the next schedule.
            item.situation = Some(Situation::Error);
            item.executed_at = Some(Utc::now());
            item.error_message = Some(format!(
                "Falha após {} tentativas: {}",
                item.attempts, message
            ));
            self.repository.update_consultation(&item).await?;
            self.log(
                &item,
                LogLevel::Error,
                item.error_message.as_deref().unwrap_or(message),
            )
            .await;
            error!(
                consultation = %item.id,
                attempts = item.attempts,
                error = message,
                "consultation failed permanently"
            );

            if let Ok(Some(company)) = self.repository.get_company(item.company_id).await {
                self.send_alert(&item, &company.name, &company.cnpj, Situation::Error)
                    .await;
            }
        } else {
            item.error_message = Some(format!("Tentativa {}: {}", item.attempts, message));
            self.repository.update_consultation(&item).await?;
            self.log(
                &item,
                LogLevel::Warn,
                &format!("Retry pendente ({}/{}): {}", item.attempts, self.max_retries, message),
            )
            .await;
            warn!(
                consultation = %item.id,
                attempt = item.attempts,
                error = message,
                "consultation attempt failed, retry pending"
            );
        }

        Ok(item)
    }

    async fn send_alert(
        &self,
        item: &ConsultationItem,
        company_name: &str,
        cnpj: &str,
        situation: Situation,
    ) {
        let event = NotificationEvent::Alert(AlertData {
            consultation_id: item.id,
            company_name: company_name.to_string(),
            cnpj: cnpj.to_string(),
            lookup_type: item.lookup_type,
            situation,
        });
        let company = self.repository.get_company(item.company_id).await;
        let (email_to, chat_to) = match &company {
            Ok(Some(c)) => (c.notification_email.clone(), c.chat_handle.clone()),
            _ => (None, None),
        };
        if let Err(err) = self
            .dispatcher
            .notify(event, email_to.as_deref(), chat_to.as_deref())
            .await
        {
            error!(consultation = %item.id, error = %err, "failed to queue alert");
        }
    }

    /// Best-effort consultation log entry; never turns into an attempt
    /// failure.
    async fn log(&self, item: &ConsultationItem, level: LogLevel, message: &str) {
        if let Err(err) = self
            .repository
            .append_log(&item.id.to_string(), level, message, None)
            .await
        {
            warn!(consultation = %item.id, error = %err, "failed to append log entry");
        }
    }
}
