//! certwatch: automated monitoring of fiscal-compliance certificates and
//! billing due dates.
//!
//! The crate is an in-process pipeline with four cooperating jobs:
//! a daily [`jobs::ScheduleGenerator`] that turns per-company periodicity
//! rules into consultation work items, a short-interval
//! [`jobs::PendingWorkPoller`] that drives each item through the
//! [`jobs::ConsultationExecutor`] retry state machine against a rate-limited
//! external lookup provider, and a daily [`jobs::VencimentoScanner`] that
//! emits due-tomorrow / overdue billing alerts. All notifications flow
//! through the [`notifications::NotificationDispatcher`] into a single
//! in-process [`notifications::NotificationQueue`] with exponential backoff.
//!
//! Persistence lives behind the [`repository::Repository`] trait; the
//! external record store is a collaborator, not part of this crate.

pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod notifications;
pub mod repository;
pub mod services;

pub use error::{AppError, AppResult};
