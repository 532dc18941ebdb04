//! Asynchronous notification pipeline.
//!
//! Producers hand [`queue::NotificationTask`]s to the single in-process
//! [`queue::NotificationQueue`]; a worker drains it, retrying failed
//! deliveries with exponential backoff. The
//! [`dispatcher::NotificationDispatcher`] is the only producer in this
//! crate: it turns domain events into channel tasks and owns the
//! communication log entries.

pub mod dispatcher;
pub mod queue;
pub mod templates;

pub use dispatcher::{
    AlertData, BillingNoticeData, GlobalSettingsSource, NotificationDispatcher, NotificationEvent,
    StaticSettings,
};
pub use queue::{Channel, NotificationQueue, NotificationTask, QueueStats};
