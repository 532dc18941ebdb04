use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use certwatch::config::Config;
use certwatch::jobs::{ConsultationExecutor, JobScheduler, PendingWorkPoller, ScheduleGenerator, VencimentoScanner};
use certwatch::notifications::{NotificationDispatcher, NotificationQueue, StaticSettings};
use certwatch::repository::{InMemoryRepository, Repository};
use certwatch::services::{RateLimitedClient, SmtpEmailService, WebhookChatService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!("certwatch starting");

    let repository: Arc<dyn Repository> = match &config.seed_file {
        Some(path) => {
            info!(path, "loading repository seed");
            Arc::new(InMemoryRepository::from_seed_file(path).await?)
        }
        None => Arc::new(InMemoryRepository::new()),
    };

    let queue = Arc::new(NotificationQueue::new(
        config.notifications.max_retries,
        Duration::from_millis(config.notifications.base_delay_ms),
        Duration::from_millis(config.notifications.max_delay_ms),
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        queue.clone(),
        Arc::new(SmtpEmailService::new(&config.smtp)),
        Arc::new(WebhookChatService::new(config.chat_webhook_url.clone())),
        repository.clone(),
        Arc::new(StaticSettings::new(config.notifications.messaging_enabled)),
    ));

    let provider = Arc::new(RateLimitedClient::new(&config.provider));
    let executor = Arc::new(ConsultationExecutor::new(
        repository.clone(),
        provider,
        dispatcher.clone(),
        config.max_retries,
    ));
    let generator = Arc::new(ScheduleGenerator::new(
        repository.clone(),
        config.scheduler.lookup_types.clone(),
    ));
    let poller = Arc::new(PendingWorkPoller::new(
        repository.clone(),
        executor,
        config.max_retries,
    ));
    let scanner = Arc::new(VencimentoScanner::new(
        repository,
        dispatcher,
        config.backend_url.clone(),
    ));

    let worker = tokio::spawn(queue.clone().run_worker());

    let mut scheduler =
        JobScheduler::new(generator, poller, scanner, config.scheduler.clone()).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    scheduler.shutdown().await?;
    queue.stop();
    worker.await?;

    let stats = queue.stats();
    info!(
        enqueued = stats.enqueued,
        sent = stats.sent,
        failed = stats.failed,
        "certwatch stopped"
    );
    Ok(())
}
