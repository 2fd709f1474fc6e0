//! Prompt builders for the two LLM-backed operations. All user-facing
//! conversation happens in Brazilian Portuguese, so the prompts do too.

use palco_core::domain::conversation::{CollectedFields, Direction, HistoryLine};
use palco_core::flows::ports::AnalysisRequest;
use palco_core::venue::VenueProfile;

/// How many history lines are inlined as context.
const HISTORY_CONTEXT_LINES: usize = 6;

fn history_block(history: &[HistoryLine]) -> String {
    if history.is_empty() {
        return "Primeira interação".to_string();
    }
    history
        .iter()
        .rev()
        .take(HISTORY_CONTEXT_LINES)
        .rev()
        .map(|line| match line.direction {
            Direction::Inbound => format!("Artista: {}", line.text),
            Direction::Outbound => format!("Bot: {}", line.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn collected_block(collected: &CollectedFields) -> String {
    let mut known = Vec::new();
    if let Some(name) = &collected.name {
        known.push(format!("nome: {name}"));
    }
    if let Some(genre) = &collected.genre {
        known.push(format!("estilo: {genre}"));
    }
    if let Some(city) = &collected.city {
        known.push(format!("cidade: {city}"));
    }
    if collected.has_any_link() {
        known.push("links: já informados".to_string());
    }
    if known.is_empty() {
        "nenhum".to_string()
    } else {
        known.join(", ")
    }
}

/// Classification prompt: intent + entities + sentiment + urgency +
/// confidence, answered as one JSON object.
pub fn analysis_prompt(request: &AnalysisRequest<'_>, venue: &VenueProfile) -> String {
    format!(
        r#"Você analisa mensagens de artistas e bandas que querem tocar na {venue}.

CONTEXTO:
- Usuário já cadastrado: {registered}
- Dados já coletados: {collected}
- Histórico recente:
{history}

MENSAGEM ATUAL DO USUÁRIO:
"{message}"

Classifique a mensagem e responda APENAS com um objeto JSON com os campos:
- "intent": uma de initial_registration, registration_followup, schedule_inquiry,
  update_data, venue_info, greeting, farewell, general_question, feedback,
  confirm_booking, cancel, unknown
- "secondary_intent": segunda intenção, se houver (opcional)
- "entities": objeto com os campos encontrados na mensagem
  (name, city, genre, instagram, youtube, spotify, bio, years_experience)
- "sentiment": positive, neutral, negative, anxious ou frustrated
- "urgency": low, medium ou high
- "keywords": lista de palavras-chave importantes
- "confidence": número de 0.0 a 1.0
- "needs_human": true se precisar de atendimento humano
- "summary": resumo da mensagem em uma linha

REGRAS:
- Se a mensagem fala em tocar/apresentar/show e o usuário NÃO está cadastrado,
  classifique como initial_registration.
- Se já está cadastrado e fala nessas palavras, classifique como schedule_inquiry.
- Saudação que abre uma apresentação é initial_registration, não greeting.
- Não invente informações que não estão na mensagem.
- Não use markdown, apenas o JSON puro."#,
        venue = venue.name,
        registered = if request.has_existing_profile { "sim" } else { "não" },
        collected = collected_block(request.collected),
        history = history_block(request.history),
        message = request.message,
    )
}

/// Extraction prompt: partial profile fields only, as one JSON object.
pub fn extraction_prompt(message: &str, history: &[HistoryLine], persona_name: &str) -> String {
    format!(
        r#"Você extrai informações específicas de mensagens de artistas.

IMPORTANTE:
- "{persona}" é o nome do bot, NUNCA é o nome do artista.
- Ignore saudações genéricas ("oi", "olá", "bom dia"): não extraia nome delas.
- Extraia apenas o que está explícito na mensagem.

Histórico (apenas para desambiguar, nunca como fonte de dados):
{history}

Mensagem do usuário:
"{message}"

Responda APENAS com um objeto JSON com os campos encontrados (omita os ausentes):
- "name": nome real do artista ou banda
- "city": cidade onde atua
- "genre": estilo musical (rock, pop, mpb, sertanejo, funk, rap, eletronica,
  jazz, blues, reggae, outro)
- "instagram": link ou @usuario do Instagram
- "youtube": link ou canal do YouTube
- "spotify": link do Spotify
- "bio": descrição ou biografia
- "years_experience": anos de experiência (número inteiro)

Sem markdown, sem explicações. Apenas JSON puro."#,
        persona = persona_name,
        history = history_block(history),
        message = message,
    )
}

#[cfg(test)]
mod tests {
    use palco_core::domain::conversation::{CollectedFields, ConversationState, Direction};
    use palco_core::flows::ports::AnalysisRequest;
    use palco_core::venue::VenueProfile;

    use super::{analysis_prompt, extraction_prompt};

    #[test]
    fn analysis_prompt_carries_context_and_message() {
        let mut state = ConversationState::new("+5511987654321");
        state.push_line(Direction::Inbound, "oi");
        state.push_line(Direction::Outbound, "olá!");
        let collected = CollectedFields { name: Some("Banda X".to_string()), ..Default::default() };

        let prompt = analysis_prompt(
            &AnalysisRequest {
                message: "tem data em agosto?",
                history: &state.recent_messages,
                collected: &collected,
                has_existing_profile: true,
            },
            &VenueProfile::default(),
        );

        assert!(prompt.contains("tem data em agosto?"));
        assert!(prompt.contains("nome: Banda X"));
        assert!(prompt.contains("Usuário já cadastrado: sim"));
        assert!(prompt.contains("Artista: oi"));
    }

    #[test]
    fn extraction_prompt_names_the_persona_exclusion() {
        let prompt = extraction_prompt("me chamo João", &[], "Lia");
        assert!(prompt.contains("\"Lia\" é o nome do bot"));
        assert!(prompt.contains("me chamo João"));
    }
}
