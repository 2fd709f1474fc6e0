//! Inbound webhook payload and the TwiML-style reply envelope. The
//! transport layer always expects a well-formed envelope back, so reply
//! text is XML-escaped here and nowhere else.

use serde::Deserialize;
use thiserror::Error;

use palco_core::domain::contact::normalize_subject_id;

/// The form fields the messaging platform posts to the webhook.
#[derive(Clone, Debug, Deserialize)]
pub struct WebhookForm {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Normalized stable identity key.
    pub subject_id: String,
    pub body: String,
    pub message_sid: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("missing originating identity")]
    MissingFrom,
    #[error("empty message body")]
    EmptyBody,
}

impl InboundMessage {
    pub fn from_form(form: WebhookForm) -> Result<Self, EnvelopeError> {
        if form.from.trim().is_empty() {
            return Err(EnvelopeError::MissingFrom);
        }
        let body = form.body.trim().to_string();
        if body.is_empty() {
            return Err(EnvelopeError::EmptyBody);
        }

        Ok(Self {
            subject_id: normalize_subject_id(&form.from),
            body,
            message_sid: form.message_sid,
        })
    }
}

/// Minimal reply envelope: one message element, escaped text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TwimlReply {
    pub message: String,
}

impl TwimlReply {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn to_xml(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <Response>\n    <Message>{}</Message>\n</Response>",
            escape_xml(&self.message)
        )
    }
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{EnvelopeError, InboundMessage, TwimlReply, WebhookForm};

    fn form(from: &str, body: &str) -> WebhookForm {
        WebhookForm { from: from.to_string(), body: body.to_string(), message_sid: None }
    }

    #[test]
    fn inbound_identity_is_normalized() {
        let inbound =
            InboundMessage::from_form(form("whatsapp:+5511987654321", "oi")).expect("valid form");
        assert_eq!(inbound.subject_id, "+5511987654321");
        assert_eq!(inbound.body, "oi");
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert_eq!(
            InboundMessage::from_form(form("", "oi")).expect_err("no identity"),
            EnvelopeError::MissingFrom
        );
        assert_eq!(
            InboundMessage::from_form(form("whatsapp:+5511987654321", "  ")).expect_err("no body"),
            EnvelopeError::EmptyBody
        );
    }

    #[test]
    fn reply_envelope_escapes_markup() {
        let xml = TwimlReply::new("links <aqui> & \"aspas\"").to_xml();
        assert!(xml.contains("links &lt;aqui&gt; &amp; &quot;aspas&quot;"));
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("<Message>"));
    }
}
