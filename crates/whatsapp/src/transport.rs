//! Outbound message transport. The HTTP client retries transiently on its
//! own with exponential backoff; callers treat failure as a loggable value,
//! never a crash.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, warn};

use palco_core::config::WhatsappConfig;
use palco_core::domain::contact::normalize_subject_id;

/// The chat surface truncates past this many chars.
const MAX_OUTBOUND_CHARS: usize = 1600;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendOutcome {
    pub success: bool,
    pub message_sid: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
}

impl SendOutcome {
    pub fn sent(message_sid: String, attempts: u32) -> Self {
        Self { success: true, message_sid: Some(message_sid), error: None, attempts }
    }

    pub fn failed(error: String, attempts: u32) -> Self {
        Self { success: false, message_sid: None, error: Some(error), attempts }
    }
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, subject_id: &str, text: &str) -> SendOutcome;
}

/// Trims runs of blank lines and enforces the platform length ceiling.
pub fn format_outbound(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !collapsed.is_empty() {
            collapsed.push('\n');
        }
        collapsed.push_str(line);
    }

    let trimmed = collapsed.trim();
    if trimmed.chars().count() <= MAX_OUTBOUND_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_OUTBOUND_CHARS - 3).collect();
    format!("{cut}...")
}

/// Twilio-style REST sender with bounded retries.
pub struct TwilioTransport {
    http: reqwest::Client,
    account_sid: SecretString,
    auth_token: SecretString,
    from_number: String,
    max_retries: u32,
    base_url: String,
}

impl TwilioTransport {
    pub fn from_config(config: &WhatsappConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            max_retries: config.send_max_retries.max(1),
            base_url: "https://api.twilio.com".to_string(),
        }
    }

    async fn attempt(&self, to: &str, body: &str) -> Result<String, String> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url,
            self.account_sid.expose_secret()
        );

        let response = self
            .http
            .post(url)
            .basic_auth(
                self.account_sid.expose_secret(),
                Some(self.auth_token.expose_secret()),
            )
            .form(&[("From", self.from_number.as_str()), ("To", to), ("Body", body)])
            .send()
            .await
            .map_err(|error| error.to_string())?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|error| error.to_string())?;
        if !status.is_success() {
            return Err(format!("transport returned {status}: {payload}"));
        }

        payload["sid"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "transport response had no sid".to_string())
    }
}

#[async_trait]
impl MessageTransport for TwilioTransport {
    async fn send(&self, subject_id: &str, text: &str) -> SendOutcome {
        let to = format!("whatsapp:{}", normalize_subject_id(subject_id));
        let body = format_outbound(text);

        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            match self.attempt(&to, &body).await {
                Ok(sid) => {
                    info!(subject = subject_id, sid = %sid, "outbound message delivered");
                    return SendOutcome::sent(sid, attempt + 1);
                }
                Err(error) => {
                    warn!(subject = subject_id, attempt = attempt + 1, %error,
                          "outbound send attempt failed");
                    last_error = error;
                    if attempt + 1 < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1u64 << attempt.min(5))).await;
                    }
                }
            }
        }

        SendOutcome::failed(last_error, self.max_retries)
    }
}

/// Records messages instead of sending them; used by tests and the offline
/// simulator.
#[derive(Debug, Default)]
pub struct NoopTransport {
    sent: Mutex<Vec<(String, String)>>,
}

impl NoopTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageTransport for NoopTransport {
    async fn send(&self, subject_id: &str, text: &str) -> SendOutcome {
        if let Ok(mut rows) = self.sent.lock() {
            rows.push((subject_id.to_string(), text.to_string()));
        }
        SendOutcome::sent(format!("noop-{}", subject_id.len()), 1)
    }
}
