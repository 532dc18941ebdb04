use std::env;

use serde::{Deserialize, Serialize};

use crate::models::LookupType;

/// Application configuration, loaded from environment variables (a `.env`
/// file is read by the binary before this runs).
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationConfig,
    pub smtp: SmtpConfig,
    /// Webhook endpoint for the chat channel; empty disables chat sends.
    pub chat_webhook_url: String,
    /// Base URL used to build certificate/boleto PDF links in notifications.
    pub backend_url: String,
    /// Retry budget for consultation execution.
    pub max_retries: u32,
    /// Optional JSON seed file for the in-memory repository.
    pub seed_file: Option<String>,
}

/// External certificate-lookup provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub token: String,
    pub base_url: String,
    /// Minimum interval between outbound provider calls.
    pub rate_limit_seconds: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pending-work poller interval.
    pub poll_interval_minutes: u32,
    /// Daily schedule-generation time.
    pub daily_hour: u32,
    pub daily_minute: u32,
    /// Daily billing due-date scan hour.
    pub vencimento_hour: u32,
    /// Lookup types created for each due company.
    pub lookup_types: Vec<LookupType>,
}

/// Notification queue + kill-switch settings.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub messaging_enabled: bool,
}

/// SMTP configuration for sending emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let lookup_types = env::var("LOOKUP_TYPES")
            .map(|raw| {
                raw.split(',')
                    .filter_map(LookupType::parse)
                    .collect::<Vec<_>>()
            })
            .ok()
            .filter(|types| !types.is_empty())
            .unwrap_or_else(|| vec![LookupType::CndFederal, LookupType::CndEstadual]);

        Ok(Config {
            provider: ProviderConfig {
                token: env::var("PROVIDER_TOKEN").unwrap_or_default(),
                base_url: env::var("PROVIDER_BASE_URL")
                    .unwrap_or_else(|_| "https://api.infosimples.com/api/v2".to_string()),
                rate_limit_seconds: parse_env("PROVIDER_RATE_LIMIT_SECONDS", 3),
                request_timeout_seconds: parse_env("PROVIDER_TIMEOUT_SECONDS", 120),
            },
            scheduler: SchedulerConfig {
                poll_interval_minutes: parse_env("SCHEDULER_POLL_INTERVAL_MINUTES", 5),
                daily_hour: parse_env("SCHEDULER_DAILY_HOUR", 0),
                daily_minute: parse_env("SCHEDULER_DAILY_MINUTE", 5),
                vencimento_hour: parse_env("SCHEDULER_VENCIMENTO_HOUR", 7),
                lookup_types,
            },
            notifications: NotificationConfig {
                max_retries: parse_env("NOTIFICATION_MAX_RETRIES", 3),
                base_delay_ms: parse_env("NOTIFICATION_BASE_DELAY_MS", 1_000),
                max_delay_ms: parse_env("NOTIFICATION_MAX_DELAY_MS", 16_000),
                messaging_enabled: parse_env("MESSAGING_ENABLED", true),
            },
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
                port: parse_env("SMTP_PORT", 587),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                from_email: env::var("SMTP_FROM_EMAIL")
                    .unwrap_or_else(|_| "noreply@certwatch.local".to_string()),
                from_name: env::var("SMTP_FROM_NAME")
                    .unwrap_or_else(|_| "Certwatch".to_string()),
            },
            chat_webhook_url: env::var("CHAT_WEBHOOK_URL").unwrap_or_default(),
            backend_url: env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            max_retries: parse_env("MAX_RETRIES", 3),
            seed_file: env::var("SEED_FILE").ok(),
        })
    }
}

impl SmtpConfig {
    /// Check if SMTP is properly configured.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}
