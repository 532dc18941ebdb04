//! Crate-wide error type.
//!
//! Jobs collect per-item failures as strings (they must never abort a batch);
//! `AppError` is reserved for failures that cross component boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("repository error: {0}")]
    Repository(String),

    #[error("lookup provider error: {0}")]
    Provider(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for AppError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::Notification(err.to_string())
    }
}

impl From<lettre::error::Error> for AppError {
    fn from(err: lettre::error::Error) -> Self {
        Self::Notification(err.to_string())
    }
}

impl From<lettre::address::AddressError> for AppError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::Notification(format!("invalid address: {err}"))
    }
}
