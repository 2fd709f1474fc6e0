//! Output shaping: long replies are split into a few coherent chunks joined
//! by a blank line, mimicking natural chat pacing. Short replies pass
//! through untouched.

/// Replies at or under this many chars are never split.
const SPLIT_THRESHOLD: usize = 300;

/// Maximum number of chunks a reply is split into.
const MAX_CHUNKS: usize = 3;

/// Openers that deserve their own first chunk when present.
const GREETING_OPENERS: &[&str] =
    &["olá", "oi", "prazer", "perfeito", "legal", "ótimo", "obrigada", "obrigado", "bom dia", "boa tarde", "boa noite"];

pub fn shape_reply(reply: &str) -> String {
    if reply.chars().count() <= SPLIT_THRESHOLD {
        return reply.to_string();
    }

    // Paragraph structure already present means the author paced the
    // message; leave it alone.
    if reply.contains("\n\n") {
        return reply.to_string();
    }

    let sentences = split_sentences(reply);
    if sentences.len() < 2 {
        return reply.to_string();
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut rest = sentences.as_slice();

    // Greeting / acknowledgment opener stands alone.
    if let Some(first) = rest.first() {
        let lower = first.trim().to_lowercase();
        if GREETING_OPENERS.iter().any(|opener| lower.starts_with(opener)) {
            chunks.push(first.trim().to_string());
            rest = &rest[1..];
        }
    }

    // The closing question or call-to-action stands alone too.
    let mut tail: Option<String> = None;
    if rest.len() > 1 {
        if let Some(last) = rest.last() {
            if last.trim().ends_with('?') {
                tail = Some(last.trim().to_string());
                rest = &rest[..rest.len() - 1];
            }
        }
    }

    if !rest.is_empty() {
        chunks.push(rest.iter().map(|s| s.trim()).collect::<Vec<_>>().join(" "));
    }
    if let Some(tail) = tail {
        chunks.push(tail);
    }

    chunks.truncate(MAX_CHUNKS);
    chunks.retain(|chunk| !chunk.is_empty());
    if chunks.is_empty() {
        return reply.to_string();
    }
    chunks.join("\n\n")
}

/// Splits on sentence-final punctuation, keeping the punctuation with the
/// sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}
