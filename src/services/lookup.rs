//! Certificate lookup provider client.
//!
//! All calls go through a shared rate limiter so the provider never sees two
//! requests closer together than the configured interval, regardless of how
//! many consultations are in flight. Classification is deliberately
//! infallible: transport errors, non-2xx statuses, and unrecognized payloads
//! all normalize to [`Situation::Error`] so the executor's retry state
//! machine is the only place that deals with failure.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::models::{Company, LookupType, Situation};

/// Normalized outcome of one provider call.
#[derive(Debug, Clone)]
pub struct LookupResult {
    pub situation: Situation,
    pub certificate_url: Option<String>,
    pub valid_until: Option<NaiveDate>,
    /// Raw provider payload, persisted for audit.
    pub raw: Value,
    pub error_message: Option<String>,
}

impl LookupResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            situation: Situation::Error,
            certificate_url: None,
            valid_until: None,
            raw: Value::Null,
            error_message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait LookupProvider: Send + Sync {
    async fn lookup(&self, company: &Company, lookup_type: LookupType) -> LookupResult;
}

/// HTTP client for the lookup provider with a built-in minimum interval
/// between requests.
pub struct RateLimitedClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    min_interval: Duration,
    /// Held across the wait and the timestamp update so concurrent callers
    /// serialize; two tasks must not both observe a stale last-request time.
    last_request: Mutex<Option<Instant>>,
}

impl RateLimitedClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_seconds))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            min_interval: Duration::from_secs(config.rate_limit_seconds),
            last_request: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_interval(base_url: String, min_interval: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: "test-token".to_string(),
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    fn endpoint(&self, lookup_type: LookupType) -> String {
        let path = match lookup_type {
            LookupType::CndFederal => "consultas/receita-federal/pgfn",
            LookupType::CndEstadual => "consultas/sefaz/certidao-debitos",
            LookupType::FgtsRegularidade => "consultas/caixa/regularidade",
        };
        format!("{}/{}", self.base_url, path)
    }

    async fn post_rate_limited(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<Value, reqwest::Error> {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());

        let response = self.http.post(url).form(form).send().await?;
        let response = response.error_for_status()?;
        response.json().await
    }
}

#[async_trait]
impl LookupProvider for RateLimitedClient {
    async fn lookup(&self, company: &Company, lookup_type: LookupType) -> LookupResult {
        let url = self.endpoint(lookup_type);

        let mut form: Vec<(&str, &str)> = vec![("token", &self.token), ("cnpj", &company.cnpj)];
        let state_registration;
        if lookup_type == LookupType::CndEstadual {
            match &company.state_registration {
                Some(ie) if !ie.is_empty() => {
                    state_registration = ie.clone();
                    form.push(("inscricao_estadual", &state_registration));
                }
                _ => {
                    return LookupResult::error(format!(
                        "empresa {} sem inscrição estadual",
                        company.cnpj
                    ));
                }
            }
        }

        match self.post_rate_limited(&url, &form).await {
            Ok(body) => classify_response(lookup_type, body),
            Err(err) => {
                warn!(cnpj = %company.cnpj, tipo = %lookup_type, error = %err, "consulta falhou");
                LookupResult::error(err.to_string())
            }
        }
    }
}

/// Map a provider payload onto a normalized result. Never panics and never
/// errors; anything unrecognized becomes `Situation::Error`.
pub fn classify_response(lookup_type: LookupType, body: Value) -> LookupResult {
    match lookup_type {
        LookupType::CndFederal | LookupType::CndEstadual => parse_clearance_response(body),
        LookupType::FgtsRegularidade => parse_regularity_response(body),
    }
}

/// Clearance certificates (federal and state) share the provider's response
/// convention: code 200 carries a situation text, code 600 means debts were
/// found and only the receipt is returned.
fn parse_clearance_response(body: Value) -> LookupResult {
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
    let item = response_item(&body);

    match code {
        200 => {
            let situation_text = item
                .and_then(|i| i.get("situacao"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_lowercase();
            // A "positiva" certificate attests to outstanding debts.
            let situation = if situation_text.contains("positiva") {
                Situation::Negative
            } else {
                Situation::Positive
            };
            LookupResult {
                situation,
                certificate_url: extract_url(&body, item),
                valid_until: extract_validity(item),
                raw: body,
                error_message: None,
            }
        }
        600 => LookupResult {
            situation: Situation::Negative,
            certificate_url: extract_url(&body, item),
            valid_until: None,
            raw: body,
            error_message: None,
        },
        _ => {
            let message = body
                .get("code_message")
                .and_then(Value::as_str)
                .unwrap_or("resposta não reconhecida")
                .to_string();
            LookupResult {
                situation: Situation::Error,
                certificate_url: None,
                valid_until: None,
                raw: body,
                error_message: Some(message),
            }
        }
    }
}

fn parse_regularity_response(body: Value) -> LookupResult {
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code != 200 {
        let message = body
            .get("code_message")
            .and_then(Value::as_str)
            .unwrap_or("resposta não reconhecida")
            .to_string();
        return LookupResult {
            situation: Situation::Error,
            certificate_url: None,
            valid_until: None,
            raw: body,
            error_message: Some(message),
        };
    }

    let item = response_item(&body);
    let situation_text = item
        .and_then(|i| i.get("situacao"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    let situation =
        if situation_text.contains("regular") && !situation_text.contains("irregular") {
            Situation::Regular
        } else {
            Situation::Irregular
        };
    LookupResult {
        situation,
        certificate_url: extract_url(&body, item),
        valid_until: extract_validity(item),
        raw: body,
        error_message: None,
    }
}

/// The provider nests results under `data`, usually as a one-element array.
fn response_item(body: &Value) -> Option<&Value> {
    match body.get("data") {
        Some(Value::Array(items)) => items.first(),
        Some(item @ Value::Object(_)) => Some(item),
        _ => None,
    }
}

fn extract_url(body: &Value, item: Option<&Value>) -> Option<String> {
    const KEYS: [&str; 3] = ["site_receipt_url", "pdf_url", "certidao_url"];
    for source in item.into_iter().chain(std::iter::once(body)) {
        for key in KEYS {
            if let Some(url) = source.get(key).and_then(Value::as_str) {
                if !url.is_empty() {
                    return Some(url.to_string());
                }
            }
        }
    }
    None
}

fn extract_validity(item: Option<&Value>) -> Option<NaiveDate> {
    let raw = item?
        .get("validade")
        .or_else(|| item?.get("data_validade"))?
        .as_str()?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Periodicity, PeriodicityKind};
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn company(state_registration: Option<&str>) -> Company {
        Company {
            id: Uuid::new_v4(),
            name: "Empresa Teste LTDA".to_string(),
            cnpj: "12345678000190".to_string(),
            state_registration: state_registration.map(str::to_string),
            active: true,
            periodicity: Periodicity {
                kind: PeriodicityKind::Daily,
                weekday: None,
                day_of_month: None,
                time_of_day: "08:00:00".to_string(),
            },
            notification_email: None,
            chat_handle: None,
        }
    }

    #[test]
    fn clean_certificate_classifies_as_positive() {
        let body = json!({
            "code": 200,
            "data": [{
                "situacao": "Certidão Negativa de Débitos",
                "site_receipt_url": "https://provider/cert.pdf",
                "validade": "2025-09-30"
            }]
        });
        let result = classify_response(LookupType::CndFederal, body);
        assert_eq!(result.situation, Situation::Positive);
        assert_eq!(
            result.certificate_url.as_deref(),
            Some("https://provider/cert.pdf")
        );
        assert_eq!(
            result.valid_until,
            NaiveDate::from_ymd_opt(2025, 9, 30)
        );
    }

    #[test]
    fn positiva_keyword_classifies_as_negative() {
        let body = json!({
            "code": 200,
            "data": [{ "situacao": "Certidão Positiva com Efeitos de Negativa" }]
        });
        let result = classify_response(LookupType::CndFederal, body);
        assert_eq!(result.situation, Situation::Negative);
        assert!(result.situation.requires_alert());
    }

    #[test]
    fn code_600_means_debts_found() {
        let body = json!({
            "code": 600,
            "code_message": "Pendências encontradas",
            "site_receipt_url": "https://provider/receipt.html"
        });
        let result = classify_response(LookupType::CndEstadual, body);
        assert_eq!(result.situation, Situation::Negative);
        assert_eq!(
            result.certificate_url.as_deref(),
            Some("https://provider/receipt.html")
        );
    }

    #[test]
    fn unknown_code_classifies_as_error() {
        let body = json!({ "code": 612, "code_message": "Serviço indisponível" });
        let result = classify_response(LookupType::CndFederal, body);
        assert_eq!(result.situation, Situation::Error);
        assert_eq!(result.error_message.as_deref(), Some("Serviço indisponível"));
    }

    #[test]
    fn regularity_requires_regular_without_irregular() {
        let regular = json!({ "code": 200, "data": [{ "situacao": "Empregador Regular" }] });
        let irregular = json!({ "code": 200, "data": [{ "situacao": "Empregador Irregular" }] });
        assert_eq!(
            classify_response(LookupType::FgtsRegularidade, regular).situation,
            Situation::Regular
        );
        assert_eq!(
            classify_response(LookupType::FgtsRegularidade, irregular).situation,
            Situation::Irregular
        );
    }

    #[test]
    fn validity_accepts_brazilian_date_format() {
        let body = json!({
            "code": 200,
            "data": [{ "situacao": "Regular", "validade": "30/09/2025" }]
        });
        let result = classify_response(LookupType::FgtsRegularidade, body);
        assert_eq!(result.valid_until, NaiveDate::from_ymd_opt(2025, 9, 30));
    }

    #[tokio::test]
    async fn missing_state_registration_short_circuits() {
        let client =
            RateLimitedClient::with_interval("http://unused".to_string(), Duration::ZERO);
        let result = client
            .lookup(&company(None), LookupType::CndEstadual)
            .await;
        assert_eq!(result.situation, Situation::Error);
    }

    #[tokio::test]
    async fn transport_failure_classifies_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/consultas/receita-federal/pgfn"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = RateLimitedClient::with_interval(server.uri(), Duration::ZERO);
        let result = client.lookup(&company(None), LookupType::CndFederal).await;
        assert_eq!(result.situation, Situation::Error);
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn consecutive_requests_honor_the_minimum_interval() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": [{ "situacao": "Certidão Negativa" }]
            })))
            .mount(&server)
            .await;

        let interval = Duration::from_millis(200);
        let client = RateLimitedClient::with_interval(server.uri(), interval);
        let c = company(None);

        let started = std::time::Instant::now();
        client.lookup(&c, LookupType::CndFederal).await;
        client.lookup(&c, LookupType::CndFederal).await;
        assert!(started.elapsed() >= interval);
    }
}
