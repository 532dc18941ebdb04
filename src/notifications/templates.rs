//! Message bodies for the notification channels.
//!
//! Pure functions from event data to (subject, html) or plain text, so the
//! wording can be tested without a transport.

use super::dispatcher::{AlertData, BillingNoticeData, NotificationEvent};

/// Email subject and HTML body for an event.
pub fn email_payload(event: &NotificationEvent) -> (String, String) {
    match event {
        NotificationEvent::Alert(data) => alert_email(data),
        NotificationEvent::BoletoIssued(data) => (
            format!("Boleto emitido - vencimento {}", data.due_date),
            billing_email(
                "Boleto emitido",
                "Um novo boleto foi emitido para pagamento.",
                data,
            ),
        ),
        NotificationEvent::BoletoPaid(data) => (
            "Pagamento confirmado".to_string(),
            billing_email(
                "Pagamento confirmado",
                "Recebemos a confirmação de pagamento do boleto abaixo. Obrigado!",
                data,
            ),
        ),
        NotificationEvent::BoletoDueTomorrow(data) => (
            format!("Lembrete: boleto vence amanhã ({})", data.due_date),
            billing_email(
                "Boleto vence amanhã",
                "Este é um lembrete de que o boleto abaixo vence amanhã.",
                data,
            ),
        ),
        NotificationEvent::BoletoOverdue(data) => {
            let days = data.days_overdue.unwrap_or(0);
            (
                format!("Boleto em atraso há {days} dia(s)"),
                billing_email(
                    "Boleto em atraso",
                    &format!(
                        "O boleto abaixo está em atraso há <strong>{days} dia(s)</strong>. \
                         Regularize o pagamento para evitar encargos adicionais."
                    ),
                    data,
                ),
            )
        }
        NotificationEvent::BoletoReactivated(data) => (
            "Boleto reativado".to_string(),
            billing_email(
                "Boleto reativado",
                "O boleto abaixo foi reativado e segue disponível para pagamento.",
                data,
            ),
        ),
    }
}

/// Short plain-text rendering for the chat channel.
pub fn chat_text(event: &NotificationEvent) -> String {
    match event {
        NotificationEvent::Alert(data) => format!(
            "🚨 *Alerta Fiscal*\nEmpresa: {}\nCNPJ: {}\nConsulta: {}\nSituação: *{}*",
            data.company_name,
            data.cnpj,
            data.lookup_type.label(),
            data.situation.label(),
        ),
        NotificationEvent::BoletoIssued(data) => format!(
            "📄 Boleto emitido para {}\nValor: R$ {}\nVencimento: {}\nLinha digitável: {}",
            data.payer_name, data.amount, data.due_date, data.digitable_line,
        ),
        NotificationEvent::BoletoPaid(data) => format!(
            "✅ Pagamento confirmado, {}! Boleto de R$ {} quitado.",
            data.payer_name, data.amount,
        ),
        NotificationEvent::BoletoDueTomorrow(data) => format!(
            "⏰ Lembrete: seu boleto de R$ {} vence amanhã ({}).\nLinha digitável: {}\nPDF: {}",
            data.amount, data.due_date, data.digitable_line, data.pdf_link,
        ),
        NotificationEvent::BoletoOverdue(data) => format!(
            "⚠️ Boleto em atraso há {} dia(s).\nValor: R$ {}\nLinha digitável: {}\nPDF: {}",
            data.days_overdue.unwrap_or(0),
            data.amount,
            data.digitable_line,
            data.pdf_link,
        ),
        NotificationEvent::BoletoReactivated(data) => format!(
            "🔄 Boleto reativado para {}. Vencimento: {}.",
            data.payer_name, data.due_date,
        ),
    }
}

fn alert_email(data: &AlertData) -> (String, String) {
    let subject = format!(
        "🚨 Alerta Fiscal: {} - {}",
        data.situation.label(),
        data.company_name
    );
    let body = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <h2 style="color: #c0392b;">Alerta de Situação Fiscal</h2>
  <p>Uma consulta automática identificou uma situação que requer atenção.</p>
  <table cellpadding="6" style="border-collapse: collapse;">
    <tr><td><strong>Empresa</strong></td><td>{}</td></tr>
    <tr><td><strong>CNPJ</strong></td><td>{}</td></tr>
    <tr><td><strong>Tipo de consulta</strong></td><td>{}</td></tr>
    <tr><td><strong>Situação</strong></td><td style="color: #c0392b;"><strong>{}</strong></td></tr>
  </table>
  <p>Consulte o painel para mais detalhes e para o comprovante da consulta.</p>
</body>
</html>"#,
        data.company_name,
        data.cnpj,
        data.lookup_type.label(),
        data.situation.label(),
    );
    (subject, body)
}

fn billing_email(title: &str, intro: &str, data: &BillingNoticeData) -> String {
    format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <h2>{title}</h2>
  <p>Olá, {payer},</p>
  <p>{intro}</p>
  <table cellpadding="6" style="border-collapse: collapse;">
    <tr><td><strong>Valor</strong></td><td>R$ {amount}</td></tr>
    <tr><td><strong>Vencimento</strong></td><td>{due}</td></tr>
    <tr><td><strong>Linha digitável</strong></td><td>{line}</td></tr>
  </table>
  <p><a href="{pdf}">Baixar boleto em PDF</a></p>
</body>
</html>"#,
        title = title,
        payer = data.payer_name,
        intro = intro,
        amount = data.amount,
        due = data.due_date,
        line = data.digitable_line,
        pdf = data.pdf_link,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LookupType, Situation};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn billing_data(days_overdue: Option<i64>) -> BillingNoticeData {
        BillingNoticeData {
            reference: "OUR-123".to_string(),
            payer_name: "Empresa Teste LTDA".to_string(),
            amount: Decimal::new(125050, 2),
            due_date: "05/04/2025".to_string(),
            digitable_line: "23793.38128 60007.827136".to_string(),
            pdf_link: "http://localhost:8000/api/boleto/pdf/OUR-123".to_string(),
            days_overdue,
        }
    }

    #[test]
    fn alert_email_names_company_and_situation() {
        let event = NotificationEvent::Alert(AlertData {
            consultation_id: Uuid::new_v4(),
            company_name: "Empresa Teste LTDA".to_string(),
            cnpj: "12345678000190".to_string(),
            lookup_type: LookupType::CndFederal,
            situation: Situation::Negative,
        });
        let (subject, body) = email_payload(&event);
        assert!(subject.contains("NEGATIVA"));
        assert!(body.contains("Empresa Teste LTDA"));
        assert!(body.contains("12345678000190"));
    }

    #[test]
    fn overdue_email_mentions_days_in_arrears() {
        let event = NotificationEvent::BoletoOverdue(billing_data(Some(7)));
        let (subject, body) = email_payload(&event);
        assert!(subject.contains("7 dia(s)"));
        assert!(body.contains("7 dia(s)"));
        assert!(body.contains("1250.50"));
    }

    #[test]
    fn due_tomorrow_chat_text_includes_pdf_link() {
        let event = NotificationEvent::BoletoDueTomorrow(billing_data(None));
        let text = chat_text(&event);
        assert!(text.contains("vence amanhã"));
        assert!(text.contains("/api/boleto/pdf/OUR-123"));
    }
}
