//! Domain model shared by the scheduling, execution, and notification
//! components, plus the small pure functions (periodicity evaluation,
//! time-of-day and due-date parsing) the jobs are built on.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// External certificate check kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupType {
    CndFederal,
    CndEstadual,
    FgtsRegularidade,
}

impl LookupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CndFederal => "cnd_federal",
            Self::CndEstadual => "cnd_estadual",
            Self::FgtsRegularidade => "fgts_regularidade",
        }
    }

    /// Human-readable label used in alert payloads.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CndFederal => "CND Federal (Receita Federal / PGFN)",
            Self::CndEstadual => "CND Estadual (SEFAZ)",
            Self::FgtsRegularidade => "FGTS Regularidade (CAIXA)",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "cnd_federal" => Some(Self::CndFederal),
            "cnd_estadual" => Some(Self::CndEstadual),
            "fgts_regularidade" => Some(Self::FgtsRegularidade),
            _ => None,
        }
    }
}

impl std::fmt::Display for LookupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized outcome of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    Positive,
    Negative,
    Regular,
    Irregular,
    Error,
}

impl Situation {
    /// Negative and irregular outcomes escalate to an alert notification.
    pub fn requires_alert(&self) -> bool {
        matches!(self, Self::Negative | Self::Irregular)
    }

    /// Uppercase label used in alert emails and log entries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Positive => "POSITIVA",
            Self::Negative => "NEGATIVA",
            Self::Regular => "REGULAR",
            Self::Irregular => "IRREGULAR",
            Self::Error => "ERRO",
        }
    }
}

impl std::fmt::Display for Situation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Regular => "regular",
            Self::Irregular => "irregular",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodicityKind {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

/// Per-company schedule rule evaluated against "today" by the daily
/// schedule generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Periodicity {
    pub kind: PeriodicityKind,
    /// 0 = Monday .. 6 = Sunday; only meaningful for weekly.
    #[serde(default)]
    pub weekday: Option<u8>,
    /// Only meaningful for biweekly and monthly.
    #[serde(default)]
    pub day_of_month: Option<u32>,
    /// "HH:MM[:SS]"; malformed values fall back to 08:00.
    #[serde(default = "default_time_of_day")]
    pub time_of_day: String,
}

fn default_time_of_day() -> String {
    "08:00:00".to_string()
}

impl Periodicity {
    /// Whether a consultation is due on `date`.
    ///
    /// The biweekly rule fires on the configured day-of-month and on
    /// `min(day + 15, 28)`. This is deliberately not calendar-exact near
    /// month boundaries; the two-points-per-month behaviour is the contract.
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        match self.kind {
            PeriodicityKind::Daily => true,
            PeriodicityKind::Weekly => self
                .weekday
                .is_some_and(|w| u32::from(w) == date.weekday().num_days_from_monday()),
            PeriodicityKind::Biweekly => self
                .day_of_month
                .is_some_and(|d| date.day() == d || date.day() == (d + 15).min(28)),
            PeriodicityKind::Monthly => self.day_of_month.is_some_and(|d| date.day() == d),
        }
    }
}

/// Parse "HH:MM[:SS]" into (hour, minute), falling back to 08:00 on any
/// malformed or out-of-range component.
pub fn parse_time_of_day(value: &str) -> (u32, u32) {
    const DEFAULT: (u32, u32) = (8, 0);

    let mut parts = value.split(':');
    let Some(hour) = parts
        .next()
        .and_then(|h| h.trim().parse::<u32>().ok())
        .filter(|h| *h < 24)
    else {
        return DEFAULT;
    };

    match parts.next() {
        None => (hour, 0),
        Some(m) => match m.trim().parse::<u32>().ok().filter(|m| *m < 60) {
            Some(minute) => (hour, minute),
            None => DEFAULT,
        },
    }
}

/// Parse a repository due-date snapshot ("YYYY-MM-DD", possibly with a time
/// suffix). Returns `None` for unparsable values; callers skip and log.
pub fn parse_due_date(value: &str) -> Option<NaiveDate> {
    let head = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// A monitored company. Owned by the external repository; this core only
/// reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub cnpj: String,
    /// State registration, required by the state clearance lookup.
    #[serde(default)]
    pub state_registration: Option<String>,
    pub active: bool,
    pub periodicity: Periodicity,
    #[serde(default)]
    pub notification_email: Option<String>,
    #[serde(default)]
    pub chat_handle: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationState {
    Scheduled,
    InProgress,
    Completed,
    Failed,
}

/// One scheduled check of one lookup type for one company.
///
/// `Failed` is retryable while `attempts` is below the retry budget; the
/// poller re-surfaces such items. It becomes terminal once the budget is
/// exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationItem {
    pub id: Uuid,
    pub company_id: Uuid,
    pub lookup_type: LookupType,
    pub state: ConsultationState,
    pub attempts: u32,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub situation: Option<Situation>,
    #[serde(default)]
    pub result_json: serde_json::Value,
    #[serde(default)]
    pub certificate_url: Option<String>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ConsultationItem {
    pub fn new(company_id: Uuid, lookup_type: LookupType, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            lookup_type,
            state: ConsultationState::Scheduled,
            attempts: 0,
            scheduled_for,
            executed_at: None,
            situation: None,
            result_json: serde_json::Value::Null,
            certificate_url: None,
            valid_until: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Issued,
    Overdue,
    Paid,
    WrittenOff,
    Other,
}

/// An issued payment instrument, read-only to this core. Contact fields are
/// a snapshot taken at emission; the due date is kept as the raw repository
/// string because unparsable values are an expected edge case (skipped with
/// a log entry by the scanner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub payer_name: String,
    pub due_date: String,
    pub status: BillingStatus,
    pub amount: Decimal,
    #[serde(default)]
    pub digitable_line: String,
    #[serde(default)]
    pub our_number: String,
    #[serde(default)]
    pub notification_email: Option<String>,
    #[serde(default)]
    pub chat_handle: Option<String>,
}

impl BillingRecord {
    /// Log reference for communication entries about this record.
    pub fn reference(&self) -> String {
        if self.our_number.is_empty() {
            self.id.to_string()
        } else {
            self.our_number.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Append-only log entry attached to a consultation or a symbolic reference
/// (e.g. "BOLETO_D1" for scanner activity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub reference: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodicity(kind: PeriodicityKind, weekday: Option<u8>, dom: Option<u32>) -> Periodicity {
        Periodicity {
            kind,
            weekday,
            day_of_month: dom,
            time_of_day: "08:00:00".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn daily_is_always_due() {
        let p = periodicity(PeriodicityKind::Daily, None, None);
        assert!(p.is_due_on(date(2025, 3, 3)));
        assert!(p.is_due_on(date(2025, 3, 4)));
    }

    #[test]
    fn weekly_due_only_on_configured_weekday() {
        // 2025-03-03 is a Monday.
        let p = periodicity(PeriodicityKind::Weekly, Some(0), None);
        assert!(p.is_due_on(date(2025, 3, 3)));
        assert!(!p.is_due_on(date(2025, 3, 4)));
        assert!(!p.is_due_on(date(2025, 3, 9)));
    }

    #[test]
    fn weekly_without_weekday_is_never_due() {
        let p = periodicity(PeriodicityKind::Weekly, None, None);
        assert!(!p.is_due_on(date(2025, 3, 3)));
    }

    #[test]
    fn monthly_due_on_day_of_month() {
        let p = periodicity(PeriodicityKind::Monthly, None, Some(10));
        assert!(p.is_due_on(date(2025, 3, 10)));
        assert!(!p.is_due_on(date(2025, 3, 11)));
    }

    #[test]
    fn biweekly_fires_on_two_days() {
        let p = periodicity(PeriodicityKind::Biweekly, None, Some(5));
        assert!(p.is_due_on(date(2025, 3, 5)));
        assert!(p.is_due_on(date(2025, 3, 20)));
        assert!(!p.is_due_on(date(2025, 3, 6)));
        assert!(!p.is_due_on(date(2025, 3, 19)));
    }

    #[test]
    fn biweekly_second_day_is_capped_at_28() {
        let p = periodicity(PeriodicityKind::Biweekly, None, Some(20));
        // min(20 + 15, 28) == 28
        assert!(p.is_due_on(date(2025, 3, 20)));
        assert!(p.is_due_on(date(2025, 3, 28)));
        assert!(!p.is_due_on(date(2025, 3, 31)));
    }

    #[test]
    fn time_of_day_parses_hour_and_minute() {
        assert_eq!(parse_time_of_day("09:30:00"), (9, 30));
        assert_eq!(parse_time_of_day("23:59"), (23, 59));
        assert_eq!(parse_time_of_day("7"), (7, 0));
    }

    #[test]
    fn malformed_time_of_day_falls_back_to_default() {
        assert_eq!(parse_time_of_day(""), (8, 0));
        assert_eq!(parse_time_of_day("abc"), (8, 0));
        assert_eq!(parse_time_of_day("25:00"), (8, 0));
        assert_eq!(parse_time_of_day("10:xx"), (8, 0));
        assert_eq!(parse_time_of_day("10:75"), (8, 0));
    }

    #[test]
    fn due_date_parses_iso_prefix() {
        assert_eq!(parse_due_date("2025-04-01"), Some(date(2025, 4, 1)));
        assert_eq!(parse_due_date("2025-04-01T00:00:00Z"), Some(date(2025, 4, 1)));
        assert_eq!(parse_due_date("01/04/2025"), None);
        assert_eq!(parse_due_date(""), None);
    }

    #[test]
    fn lookup_type_round_trips_through_parse() {
        for t in [
            LookupType::CndFederal,
            LookupType::CndEstadual,
            LookupType::FgtsRegularidade,
        ] {
            assert_eq!(LookupType::parse(t.as_str()), Some(t));
        }
        assert_eq!(LookupType::parse("bogus"), None);
    }
}
