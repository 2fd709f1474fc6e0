//! LLM-backed entity extraction with a regex heuristic safety net. The
//! cascade is: structured JSON from the pool, then a salvage parse of the
//! raw text, then pattern matching over the message itself. Each tier
//! degrades silently into the next; the result is never an error.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use palco_core::domain::analysis::ExtractedEntities;
use palco_core::domain::conversation::HistoryLine;
use palco_core::domain::genre::Genre;
use palco_core::flows::ports::EntityExtractor;
use palco_core::text::title_case;

use crate::parse::{salvage_json_object, strip_code_fences};
use crate::pool::ProviderPool;
use crate::prompts::extraction_prompt;

/// Tokens that must never be taken as an artist name: the bot persona is
/// prepended at runtime.
const NAME_SKIP_WORDS: &[&str] = &[
    "bot",
    "assistente",
    "oi",
    "olá",
    "ola",
    "hello",
    "bom dia",
    "boa tarde",
    "boa noite",
    "tudo bem",
];

pub struct DataExtractor {
    pool: Arc<ProviderPool>,
    persona_name: String,
}

impl DataExtractor {
    pub fn new(pool: Arc<ProviderPool>, persona_name: impl Into<String>) -> Self {
        Self { pool, persona_name: persona_name.into() }
    }

    fn is_forbidden_name(&self, candidate: &str) -> bool {
        let lowered = candidate.trim().to_lowercase();
        lowered.is_empty()
            || lowered == self.persona_name.to_lowercase()
            || NAME_SKIP_WORDS.contains(&lowered.as_str())
    }

    /// Drops persona/greeting tokens captured as names and recomputes the
    /// confidence from what is left.
    fn sanitize(&self, mut entities: ExtractedEntities) -> ExtractedEntities {
        if let Some(name) = entities.name.as_deref() {
            if self.is_forbidden_name(name) {
                entities.name = None;
            }
        }
        if let Some(years) = entities.years_experience {
            if years > 50 {
                entities.years_experience = None;
            }
        }
        entities.score_confidence();
        entities
    }
}

fn parse_entities(raw: &str) -> Option<ExtractedEntities> {
    let cleaned = strip_code_fences(raw);
    if let Ok(entities) = serde_json::from_str::<ExtractedEntities>(cleaned) {
        return Some(entities);
    }
    salvage_json_object(cleaned)
        .and_then(|candidate| serde_json::from_str::<ExtractedEntities>(candidate).ok())
}

#[async_trait]
impl EntityExtractor for DataExtractor {
    async fn extract(&self, message: &str, history: &[HistoryLine]) -> ExtractedEntities {
        let prompt = extraction_prompt(message, history, &self.persona_name);

        if let Some(raw) = self.pool.complete(&prompt).await {
            if let Some(entities) = parse_entities(&raw) {
                return self.sanitize(entities);
            }
            warn!(raw = %raw.chars().take(200).collect::<String>(),
                  "extraction response was not parseable, using heuristics");
        }

        self.sanitize(heuristic_extract(message))
    }
}

fn name_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)(?:me chamo|meu nome é|meu nome e|eu sou|sou o|sou a|somos o|somos a)\s+([\w À-ÿ]+)",
            r"(?i)(?:banda|grupo|projeto|duo|trio)\s+([\w À-ÿ]+)",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("name pattern compiles"))
        .collect()
    })
}

fn city_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:somos de|moro em|viemos de|da cidade de|cidade de)\s+([\w À-ÿ]+)")
            .expect("city pattern compiles")
    })
}

fn social_pattern(prefixes: &str) -> Regex {
    // Word boundaries keep short aliases like "ig" from firing inside
    // ordinary words ("obrigado").
    Regex::new(&format!(r"(?i)\b(?:{prefixes})\b\s*[:.]?\s*(@?[\w./@-]+)"))
        .expect("social pattern compiles")
}

fn instagram_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| social_pattern("instagram|insta|ig"))
}

fn youtube_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| social_pattern("youtube|yt"))
}

fn years_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:há\s+)?(\d{1,2})\s*anos").expect("years pattern compiles")
    })
}

/// Cuts a captured phrase at the first clause boundary and title-cases it.
fn tidy_capture(capture: &str) -> String {
    let cut = capture.split([',', '.', '!', '?', '\n']).next().unwrap_or(capture);
    title_case(cut.trim())
}

/// Last-resort extraction straight from the message text: introduction
/// phrases, the closed genre keyword list, prefixed social handles and a
/// years-of-experience figure. Finding nothing yields an all-empty result.
pub fn heuristic_extract(message: &str) -> ExtractedEntities {
    let mut entities = ExtractedEntities::default();

    for pattern in name_patterns() {
        if let Some(capture) = pattern.captures(message).and_then(|c| c.get(1)) {
            let candidate = tidy_capture(capture.as_str());
            if candidate.len() > 2 {
                entities.name = Some(candidate);
                break;
            }
        }
    }

    if let Some(capture) = city_pattern().captures(message).and_then(|c| c.get(1)) {
        entities.city = Some(tidy_capture(capture.as_str()));
    }

    if let Some(genre) = Genre::detect(message) {
        entities.genre = Some(genre.as_str().to_string());
    }

    if let Some(capture) = instagram_pattern().captures(message).and_then(|c| c.get(1)) {
        entities.instagram = Some(capture.as_str().to_string());
    }
    if let Some(capture) = youtube_pattern().captures(message).and_then(|c| c.get(1)) {
        entities.youtube = Some(capture.as_str().to_string());
    }

    if let Some(capture) = years_pattern().captures(message).and_then(|c| c.get(1)) {
        if let Ok(years) = capture.as_str().parse::<u8>() {
            if years <= 50 {
                entities.years_experience = Some(years);
            }
        }
    }

    entities.score_confidence();
    entities
}
