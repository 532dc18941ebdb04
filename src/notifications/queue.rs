//! In-process delivery queue with bounded retries and exponential backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{error, info, warn};

use crate::error::AppResult;

pub type DeliveryFuture = BoxFuture<'static, AppResult<bool>>;
pub type DeliveryFn = Arc<dyn Fn() -> DeliveryFuture + Send + Sync>;
pub type FailureCallback = Arc<dyn Fn(NotificationTask) -> BoxFuture<'static, AppResult<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Chat,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::Chat => "chat",
        })
    }
}

/// One delivery attempt unit. The closure captures everything it needs, so
/// the queue stays channel-agnostic.
#[derive(Clone)]
pub struct NotificationTask {
    pub task_id: String,
    pub channel: Channel,
    pub deliver: DeliveryFn,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl NotificationTask {
    pub fn new(task_id: String, channel: Channel, deliver: DeliveryFn) -> Self {
        Self {
            task_id,
            channel,
            deliver,
            attempts: 0,
            created_at: Utc::now(),
            last_error: None,
        }
    }
}

impl std::fmt::Debug for NotificationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationTask")
            .field("task_id", &self.task_id)
            .field("channel", &self.channel)
            .field("attempts", &self.attempts)
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub sent: u64,
    pub failed: u64,
    pub pending: u64,
}

/// Unbounded FIFO of notification tasks with a single worker.
///
/// A task that fails with retry budget left waits out its backoff delay and
/// re-enters at the tail, so a flapping channel cannot starve the rest of
/// the queue.
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<NotificationTask>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<NotificationTask>>>,
    shutdown_tx: watch::Sender<bool>,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    enqueued: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    pending: AtomicU64,
    on_failure: Mutex<Option<FailureCallback>>,
}

impl NotificationQueue {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            shutdown_tx,
            max_retries,
            base_delay,
            max_delay,
            enqueued: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            on_failure: Mutex::new(None),
        }
    }

    /// Invoked once per task whose retry budget is exhausted. Callback
    /// errors are logged and contained.
    pub async fn set_failure_callback(&self, callback: FailureCallback) {
        *self.on_failure.lock().await = Some(callback);
    }

    pub fn enqueue(&self, task: NotificationTask) -> AppResult<()> {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.send(task)
    }

    fn requeue(&self, task: NotificationTask) -> AppResult<()> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.send(task)
    }

    fn send(&self, task: NotificationTask) -> AppResult<()> {
        self.tx.send(task).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            crate::AppError::Notification(format!("queue closed: {e}"))
        })
    }

    /// Drain the queue until [`stop`](Self::stop) is called. May only run
    /// once; a second call returns immediately.
    pub async fn run_worker(self: Arc<Self>) {
        let Some(mut rx) = self.rx.lock().await.take() else {
            warn!("notification worker already started");
            return;
        };
        let mut shutdown = self.shutdown_tx.subscribe();
        info!("notification worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                task = rx.recv() => {
                    let Some(task) = task else { break };
                    self.pending.fetch_sub(1, Ordering::Relaxed);
                    self.process(task, &mut shutdown).await;
                }
            }
        }
        info!("notification worker stopped");
    }

    async fn process(&self, mut task: NotificationTask, shutdown: &mut watch::Receiver<bool>) {
        task.attempts += 1;

        match (task.deliver)().await {
            Ok(true) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                info!(
                    task_id = %task.task_id,
                    channel = %task.channel,
                    attempt = task.attempts,
                    "notification delivered"
                );
                return;
            }
            Ok(false) => {
                task.last_error = Some("canal indisponível".to_string());
            }
            Err(err) => {
                task.last_error = Some(err.to_string());
            }
        }

        if task.attempts < self.max_retries {
            let delay = backoff_delay(task.attempts, self.base_delay, self.max_delay);
            warn!(
                task_id = %task.task_id,
                attempt = task.attempts,
                delay_ms = delay.as_millis() as u64,
                error = task.last_error.as_deref().unwrap_or(""),
                "notification failed, will retry"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
            if let Err(err) = self.requeue(task) {
                error!(error = %err, "failed to requeue notification");
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                task_id = %task.task_id,
                channel = %task.channel,
                attempts = task.attempts,
                error = task.last_error.as_deref().unwrap_or(""),
                "notification dropped after exhausting retries"
            );
            let callback = self.on_failure.lock().await.clone();
            if let Some(callback) = callback {
                if let Err(err) = callback(task).await {
                    error!(error = %err, "failure callback errored");
                }
            }
        }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}

/// Delay before retry `attempt + 1`: `base * 2^(attempt - 1)`, capped.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent).min(cap)
}
