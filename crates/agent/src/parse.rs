//! Salvage helpers for models that wrap JSON in prose or markdown fences.

/// Strips ```json / ``` fences and surrounding whitespace.
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let mut cleaned = raw.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Best-effort slice of the first JSON object embedded in free text.
pub(crate) fn salvage_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::{salvage_json_object, strip_code_fences};

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn embedded_object_is_salvaged() {
        assert_eq!(
            salvage_json_object("claro! aqui está: {\"nome\": \"Banda X\"} espero que ajude"),
            Some("{\"nome\": \"Banda X\"}")
        );
        assert_eq!(salvage_json_object("sem json aqui"), None);
    }
}
