use serde::{Deserialize, Serialize};

/// Transport prefix the messaging platform prepends to phone numbers.
const TRANSPORT_PREFIX: &str = "whatsapp:";

/// Default country code applied to bare national numbers.
const DEFAULT_COUNTRY_CODE: &str = "+55";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Whatsapp,
    Email,
    Phone,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactChannel {
    pub kind: ContactKind,
    pub value: String,
    pub primary: bool,
}

impl ContactChannel {
    pub fn whatsapp_primary(subject_id: &str) -> Self {
        Self { kind: ContactKind::Whatsapp, value: normalize_subject_id(subject_id), primary: true }
    }
}

/// Normalizes an inbound identity into the stable subject key: strips the
/// transport prefix, drops everything but digits and `+`, and guarantees a
/// leading country code.
pub fn normalize_subject_id(raw: &str) -> String {
    let stripped = raw.trim().strip_prefix(TRANSPORT_PREFIX).unwrap_or(raw.trim());
    let digits: String = stripped.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect();

    if digits.starts_with('+') {
        digits
    } else if digits.starts_with("55") {
        format!("+{digits}")
    } else {
        format!("{DEFAULT_COUNTRY_CODE}{digits}")
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_subject_id, ContactChannel, ContactKind};

    #[test]
    fn strips_transport_prefix_and_keeps_country_code() {
        assert_eq!(normalize_subject_id("whatsapp:+5511987654321"), "+5511987654321");
    }

    #[test]
    fn adds_country_code_to_bare_national_numbers() {
        assert_eq!(normalize_subject_id("11987654321"), "+5511987654321");
        assert_eq!(normalize_subject_id("5511987654321"), "+5511987654321");
    }

    #[test]
    fn drops_spacing_and_punctuation() {
        assert_eq!(normalize_subject_id("whatsapp: +55 (11) 98765-4321"), "+5511987654321");
    }

    #[test]
    fn builds_primary_whatsapp_channel() {
        let channel = ContactChannel::whatsapp_primary("whatsapp:11987654321");
        assert_eq!(channel.kind, ContactKind::Whatsapp);
        assert_eq!(channel.value, "+5511987654321");
        assert!(channel.primary);
    }
}
