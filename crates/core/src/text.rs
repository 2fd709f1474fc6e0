//! Small text helpers shared by the flow engine and the extraction tiers.

/// Title-cases each whitespace-separated word, preserving the rest of the
/// word as typed (so acronyms like "MPB" survive).
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapses runs of whitespace and trims, optionally truncating on a word
/// boundary with an ellipsis.
pub fn clean_text(text: &str, max_chars: Option<usize>) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match max_chars {
        Some(max) if collapsed.chars().count() > max => {
            let truncated: String = collapsed.chars().take(max).collect();
            let cut = truncated.rfind(' ').unwrap_or(truncated.len());
            format!("{}...", &truncated[..cut])
        }
        _ => collapsed,
    }
}
