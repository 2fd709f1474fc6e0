//! Keyword-count menu classifier: the cheap tier beneath the LLM analyzer.
//! Counts keyword hits per category and returns the best one as a closed
//! enum, unit-testable with no model in the loop.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuIntent {
    Schedule,
    UpdateData,
    VenueInfo,
    Unknown,
}

const SCHEDULE_KEYWORDS: &[&str] = &[
    "agenda",
    "show",
    "tocar",
    "data",
    "quando",
    "disponível",
    "disponivel",
    "sexta",
    "sábado",
    "sabado",
    "apresentar",
];

const DATA_KEYWORDS: &[&str] = &[
    "dados",
    "atualizar",
    "mudar",
    "alterar",
    "instagram",
    "spotify",
    "youtube",
    "corrigir",
    "editar",
];

const INFO_KEYWORDS: &[&str] = &[
    "casa",
    "cervejaria",
    "info",
    "informação",
    "informacao",
    "local",
    "endereço",
    "endereco",
    "onde",
    "horário",
    "horario",
    "funciona",
];

pub fn classify_menu_intent(message: &str) -> MenuIntent {
    let lower = message.to_lowercase();
    let count = |keywords: &[&str]| keywords.iter().filter(|k| lower.contains(**k)).count();

    let schedule = count(SCHEDULE_KEYWORDS);
    let data = count(DATA_KEYWORDS);
    let info = count(INFO_KEYWORDS);

    let best = schedule.max(data).max(info);
    if best == 0 {
        MenuIntent::Unknown
    } else if schedule == best {
        MenuIntent::Schedule
    } else if data == best {
        MenuIntent::UpdateData
    } else {
        MenuIntent::VenueInfo
    }
}

const AFFIRMATIVE_TOKENS: &[&str] =
    &["sim", "ok", "okay", "certo", "correto", "confirmo", "quero", "fechado", "bora", "pode ser"];

/// Detects a confirmation in a short reply, used when an offer is pending.
/// Any negation wins over an embedded affirmative token.
pub fn is_affirmative(message: &str) -> bool {
    let lower = message.trim().to_lowercase();
    if lower.contains("não") || lower.contains("nao") {
        return false;
    }
    AFFIRMATIVE_TOKENS.iter().any(|token| {
        lower == *token
            || lower.starts_with(&format!("{token} "))
            || lower.contains(&format!(" {token}"))
    })
}

#[cfg(test)]
mod tests {
    use super::{classify_menu_intent, is_affirmative, MenuIntent};

    #[test]
    fn schedule_keywords_win() {
        assert_eq!(classify_menu_intent("quero ver a agenda de shows"), MenuIntent::Schedule);
        assert_eq!(classify_menu_intent("tem data disponível na sexta?"), MenuIntent::Schedule);
    }

    #[test]
    fn data_keywords_win() {
        assert_eq!(classify_menu_intent("preciso atualizar meu instagram"), MenuIntent::UpdateData);
    }

    #[test]
    fn info_keywords_win() {
        assert_eq!(classify_menu_intent("onde fica a casa? qual o endereço?"), MenuIntent::VenueInfo);
    }

    #[test]
    fn no_keywords_is_unknown() {
        assert_eq!(classify_menu_intent("hmmmm"), MenuIntent::Unknown);
    }

    #[test]
    fn affirmative_detection() {
        assert!(is_affirmative("sim"));
        assert!(is_affirmative("Confirmo a data"));
        assert!(is_affirmative("pode ser"));
        assert!(!is_affirmative("não sei ainda"));
        assert!(!is_affirmative("não quero"));
    }
}
