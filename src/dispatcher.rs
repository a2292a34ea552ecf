// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Notification Dispatcher (C6): delivers batches to the email and chat
//! sinks and records delivery outcomes. Also exposes ungated single-shot
//! test operations used to verify operator-entered configuration.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::settings::EngineSettings;

/// Outcome of one dispatch attempt, ready to be turned into a Log row by the
/// caller (the periodic loop).
pub enum DispatchOutcome {
    /// Nothing was sent: the sink is disabled or there were no lines.
    Skipped,
    Sent { count: usize },
    Failed { reason: String },
}

/// Send a batch of outage or recovery lines over email, gated by
/// `settings.mail.enabled`. Mirrors the email sink's `send_email_batch`
/// contract: a disabled sink or an empty batch is a silent no-op.
pub fn send_mail_batch(settings: &EngineSettings, subject: &str, lines: &[String]) -> DispatchOutcome {
    if !settings.mail.enabled || lines.is_empty() {
        return DispatchOutcome::Skipped;
    }
    let body = format!(
        "<h3>System Alert</h3><ul>{}</ul>",
        lines.iter().map(|l| format!("<li>{l}</li>")).collect::<String>()
    );
    match send_mail_raw(settings, subject, &body) {
        Ok(()) => DispatchOutcome::Sent { count: lines.len() },
        Err(reason) => DispatchOutcome::Failed { reason },
    }
}

/// Send a single email immediately, bypassing `MAIL_ENABLED`. Used by the
/// operator-facing "test email" operation.
pub fn test_email(settings: &EngineSettings, subject: &str, html_body: &str) -> Result<(), String> {
    send_mail_raw(settings, subject, html_body)
}

fn send_mail_raw(settings: &EngineSettings, subject: &str, html_body: &str) -> Result<(), String> {
    if settings.mail_recipients.is_empty() {
        return Err("no MAIL_RECIPIENTS configured".to_string());
    }

    let mut builder = Message::builder()
        .from(settings.mail_user.parse().map_err(|e| format!("invalid MAIL_USER: {e}"))?)
        .subject(subject)
        .header(ContentType::TEXT_HTML);
    for recipient in &settings.mail_recipients {
        builder = builder.to(recipient.parse().map_err(|e| format!("invalid recipient '{recipient}': {e}"))?);
    }
    let message = builder.body(html_body.to_string()).map_err(|e| e.to_string())?;

    let creds = Credentials::new(settings.mail_user.clone(), settings.mail_pass.clone());
    let mailer = SmtpTransport::starttls_relay(&settings.mail_server)
        .map_err(|e| e.to_string())?
        .port(settings.mail_port)
        .credentials(creds)
        .build();

    mailer.send(&message).map(|_| ()).map_err(|e| e.to_string())
}

/// Send a batch of lines over Telegram, gated by `settings.telegram.enabled`.
pub async fn send_telegram_batch(
    http: &reqwest::Client,
    settings: &EngineSettings,
    timeout: std::time::Duration,
    header: &str,
    lines: &[String],
) -> DispatchOutcome {
    if !settings.telegram.enabled || lines.is_empty() {
        return DispatchOutcome::Skipped;
    }
    let message = format!("*{header}*\n{}", lines.join("\n"));
    match send_telegram_raw(http, settings, timeout, &message).await {
        Ok(()) => DispatchOutcome::Sent { count: lines.len() },
        Err(reason) => DispatchOutcome::Failed { reason },
    }
}

/// Send a single Telegram message immediately, bypassing `TELEGRAM_ENABLED`.
/// Used by the operator-facing "test telegram" operation.
pub async fn test_telegram(
    http: &reqwest::Client,
    settings: &EngineSettings,
    timeout: std::time::Duration,
    message: &str,
) -> Result<(), String> {
    send_telegram_raw(http, settings, timeout, message).await
}

async fn send_telegram_raw(
    http: &reqwest::Client,
    settings: &EngineSettings,
    timeout: std::time::Duration,
    message: &str,
) -> Result<(), String> {
    if settings.telegram_bot_token.is_empty() || settings.telegram_chat_ids.is_empty() {
        return Err("Missing Token/ID".to_string());
    }

    let url = format!("https://api.telegram.org/bot{}/sendMessage", settings.telegram_bot_token);
    let mut first_error = None;

    for chat_id in &settings.telegram_chat_ids {
        // Proxying, if configured, is baked into `http` at construction time
        // (see `build_telegram_client`) rather than per-request.
        let request = http
            .post(&url)
            .timeout(timeout)
            .form(&[("chat_id", chat_id.as_str()), ("text", message), ("parse_mode", "Markdown")]);
        if let Err(e) = request.send().await {
            first_error.get_or_insert_with(|| e.to_string());
        }
    }

    match first_error {
        Some(reason) => Err(reason),
        None => Ok(()),
    }
}

/// Build the outbound HTTP client used for Telegram delivery, honouring an
/// optional proxy URL read from settings at dispatcher-construction time.
pub fn build_telegram_client(proxy_url: Option<&str>) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if let Some(url) = proxy_url {
        if let Ok(proxy) = reqwest::Proxy::all(url) {
            builder = builder.proxy(proxy);
        }
    }
    builder.build().unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn disabled_mail_sink_skips_without_building_a_message() {
        let mut map = HashMap::new();
        map.insert("MAIL_ENABLED".to_string(), "false".to_string());
        let settings = EngineSettings::parse(&map);
        let outcome = send_mail_batch(&settings, "subj", &["line".to_string()]);
        assert!(matches!(outcome, DispatchOutcome::Skipped));
    }

    #[test]
    fn empty_batch_skips_even_when_enabled() {
        let mut map = HashMap::new();
        map.insert("MAIL_ENABLED".to_string(), "true".to_string());
        let settings = EngineSettings::parse(&map);
        let outcome = send_mail_batch(&settings, "subj", &[]);
        assert!(matches!(outcome, DispatchOutcome::Skipped));
    }

    #[tokio::test]
    async fn telegram_missing_token_is_a_structured_error_not_a_panic() {
        let settings = EngineSettings::parse(&HashMap::new());
        let http = build_telegram_client(None);
        let result = test_telegram(&http, &settings, std::time::Duration::from_secs(10), "hello").await;
        assert_eq!(result, Err("Missing Token/ID".to_string()));
    }
}
