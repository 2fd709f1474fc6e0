//! The consolidated conversation state machine: one state set, one router.
//! Collection stages assign fields directly from the raw message; every
//! other stage goes through the intent router, which merges whatever
//! entities the analyzer found before dispatching, so fields may arrive in
//! any order.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::analysis::{ExtractedEntities, Intent, Sentiment};
use crate::domain::conversation::{CollectedFields, ConversationState, Direction, OfferKind, Stage};
use crate::domain::genre::Genre;
use crate::domain::profile::{normalize_social_url, Platform, Profile};
use crate::flows::menu::{classify_menu_intent, is_affirmative, MenuIntent};
use crate::flows::ports::{
    AnalysisRequest, AvailabilityCalendar, EntityExtractor, LogDirection, MessageAnalyzer,
    ProfileStore,
};
use crate::flows::reply::shape_reply;
use crate::text::title_case;
use crate::venue::{pick_partner_referrals, PartnerVenue, VenueProfile};

/// Shown whenever an internal failure must be hidden from the user.
pub const TECHNICAL_DIFFICULTY_REPLY: &str = "Desculpe, estou com dificuldades técnicas no \
     momento. Pode tentar novamente em alguns instantes?";

/// Terminal reply once a collection loop passes its ceiling without viable
/// data.
pub const APOLOGY_STOP_REPLY: &str = "Desculpe, não consegui completar seu cadastro por aqui. \
     Vou pedir para alguém da equipe entrar em contato com você em breve.";

/// Returned by the webhook when processing outruns the platform deadline.
pub const SLOW_REPLY: &str =
    "Desculpe, estou com uma lentidão momentânea. Pode repetir sua mensagem?";

/// Analyzer results below this confidence fall through to the keyword tier.
const ROUTER_CONFIDENCE_FLOOR: f32 = 0.3;

/// How many partner venues a referral offers at once.
const REFERRAL_LIMIT: usize = 2;

#[derive(Clone, Copy, Debug)]
pub struct FlowLimits {
    /// Ceiling for passes through the simple collection stages.
    pub collection_attempt_ceiling: u32,
    /// Ceiling for consecutive unproductive router passes.
    pub router_attempt_ceiling: u32,
}

impl Default for FlowLimits {
    fn default() -> Self {
        Self { collection_attempt_ceiling: 10, router_attempt_ceiling: 3 }
    }
}

pub struct FlowEngine {
    analyzer: Arc<dyn MessageAnalyzer>,
    extractor: Arc<dyn EntityExtractor>,
    profiles: Arc<dyn ProfileStore>,
    calendar: Arc<dyn AvailabilityCalendar>,
    venue: VenueProfile,
    partners: Vec<PartnerVenue>,
    limits: FlowLimits,
}

impl FlowEngine {
    pub fn new(
        analyzer: Arc<dyn MessageAnalyzer>,
        extractor: Arc<dyn EntityExtractor>,
        profiles: Arc<dyn ProfileStore>,
        calendar: Arc<dyn AvailabilityCalendar>,
        venue: VenueProfile,
        partners: Vec<PartnerVenue>,
        limits: FlowLimits,
    ) -> Self {
        Self { analyzer, extractor, profiles, calendar, venue, partners, limits }
    }

    /// Drives one inbound message through the machine: mutates the state,
    /// returns the (already shaped) outbound reply. Internal failures never
    /// escape; they become user-safe copy.
    pub async fn handle_message(&self, state: &mut ConversationState, message: &str) -> String {
        state.push_line(Direction::Inbound, message);

        let reply = match state.stage {
            Stage::Start | Stage::Error => self.enter(state, message).await,
            stage if stage.is_collection() => self.collect(state, message).await,
            Stage::Validating | Stage::Persisting => self.persist(state).await,
            _ => self.route(state, message).await,
        };

        let shaped = shape_reply(&reply);
        state.push_line(Direction::Outbound, shaped.clone());
        self.log_exchange(state, message, &shaped).await;

        info!(
            subject = %state.subject_id,
            stage = state.stage.as_str(),
            attempts = state.collection_attempts,
            "flow pass completed"
        );

        shaped
    }

    /// Entry: decide between the registered-artist menu, the
    /// complete-your-profile path and the first-contact welcome. The very
    /// first message also goes through the extractor so an artist who
    /// introduces themselves in one line skips the redundant questions.
    async fn enter(&self, state: &mut ConversationState, message: &str) -> String {
        let profile = match self.profiles.find_by_contact(&state.subject_id).await {
            Ok(found) => found,
            Err(error) => {
                warn!(subject = %state.subject_id, %error, "profile lookup failed on entry");
                return TECHNICAL_DIFFICULTY_REPLY.to_string();
            }
        };

        if let Some(profile) = profile {
            state.linked_profile_id = Some(profile.id.clone());
            if profile.is_minimum_viable() {
                state.stage = Stage::MainMenu;
                return self.menu_text(Some(&profile.name));
            }

            state.collected_fields.seed_from_profile(&profile);
            state.stage = next_missing_stage(&state.collected_fields);
            let missing = profile
                .missing_fields()
                .iter()
                .map(|field| format!("• {field}"))
                .collect::<Vec<_>>()
                .join("\n");
            return format!(
                "Olá {nome}! {persona} da {venue} aqui.\n\n\
                 Notei que seu cadastro está incompleto. Para agendar shows, preciso de:\n\
                 {missing}\n\nVamos completar seu cadastro?",
                nome = profile.name,
                persona = self.venue.persona_name,
                venue = self.venue.name,
            );
        }

        let entities = self.extractor.extract(message, &state.recent_messages).await;
        merge_entities(&mut state.collected_fields, &entities);

        if state.collected_fields.is_minimum_viable() {
            return self.persist(state).await;
        }

        if state.collected_fields.has_name() {
            let name = state.collected_fields.name.clone().unwrap_or_default();
            state.stage = next_missing_stage(&state.collected_fields);
            return format!(
                "Prazer, {name}! Sou a {persona}, responsável pela agenda de shows da {venue}. {ask}",
                persona = self.venue.persona_name,
                venue = self.venue.name,
                ask = ask_for(state.stage),
            );
        }

        state.stage = Stage::CollectingName;
        format!(
            "Olá! Sou a {persona}, assistente da {venue}.\n\
             Vamos cadastrar você para tocar aqui na casa?\n{ask}",
            persona = self.venue.persona_name,
            venue = self.venue.name,
            ask = ask_for(Stage::CollectingName),
        )
    }

    /// Simple per-field collection: direct assignment with light trimming,
    /// fixed priority name -> genre -> city -> links, guarded by the
    /// attempt ceiling.
    async fn collect(&self, state: &mut ConversationState, message: &str) -> String {
        state.collection_attempts += 1;
        if state.collection_attempts > self.limits.collection_attempt_ceiling {
            if state.collected_fields.is_minimum_viable() {
                return self.persist(state).await;
            }
            warn!(subject = %state.subject_id, "collection attempt ceiling reached");
            state.stage = Stage::Error;
            return APOLOGY_STOP_REPLY.to_string();
        }

        let trimmed = message.trim();
        match state.stage {
            Stage::CollectingName => {
                if trimmed.chars().count() < 2 {
                    return "Por favor, me diga seu nome artístico ou da banda.".to_string();
                }
                let name = title_case(trimmed);
                state.collected_fields.name = Some(name.clone());
                self.advance(state, Some(format!("Prazer, {name}!"))).await
            }
            Stage::CollectingGenre => {
                if trimmed.is_empty() {
                    return "Qual é o seu estilo musical principal?".to_string();
                }
                state.collected_fields.genre = Some(trimmed.to_lowercase());
                self.advance(state, Some(format!("Legal, {trimmed} é um ótimo som!"))).await
            }
            Stage::CollectingCity => {
                if trimmed.is_empty() {
                    return "De qual cidade você é?".to_string();
                }
                state.collected_fields.city = Some(title_case(trimmed));
                self.advance(state, Some("Anotado!".to_string())).await
            }
            Stage::CollectingLinks => {
                let Some((platform, url)) = parse_link_message(trimmed) else {
                    return "Não consegui identificar o link. Me envie seu Instagram (com @), \
                            YouTube ou Spotify:"
                        .to_string();
                };
                state.collected_fields.set_link(platform, url);
                if state.collected_fields.has_any_link() {
                    self.persist(state).await
                } else {
                    ask_for(Stage::CollectingLinks)
                }
            }
            // Collection is only entered with a collecting stage; anything
            // else re-enters the flow from the top.
            _ => self.enter(state, message).await,
        }
    }

    /// Moves to the next missing field, or into validation when the
    /// sequence is done.
    async fn advance(&self, state: &mut ConversationState, ack: Option<String>) -> String {
        let next = next_missing_stage(&state.collected_fields);
        if !next.is_collection() {
            return self.persist(state).await;
        }
        state.stage = next;
        match ack {
            Some(ack) => format!("{ack} {}", ask_for(next)),
            None => ask_for(next),
        }
    }

    /// Validation then persistence. Validation failures route back to the
    /// correctable stage for the named field; persistence failures keep the
    /// stage at `Persisting` so the next message naturally retries.
    async fn persist(&self, state: &mut ConversationState) -> String {
        state.stage = Stage::Validating;

        let profile = loop {
            match Profile::from_collected(&state.collected_fields, &state.subject_id) {
                Ok(profile) => break profile,
                // Optional extras are dropped rather than argued about.
                Err(error) if error.field() == "biografia" => {
                    state.collected_fields.bio = None;
                }
                Err(error) if error.field() == "experiencia" => {
                    state.collected_fields.years_experience = None;
                }
                Err(error) => {
                    state.stage = stage_for_field(error.field());
                    return format!(
                        "Encontrei um problema com os dados fornecidos ({field}). \
                         Vamos corrigir isso juntos. {ask}",
                        field = error.field(),
                        ask = ask_for(state.stage),
                    );
                }
            }
        };

        state.stage = Stage::Persisting;
        match self.profiles.create(&profile).await {
            Ok(id) => {
                state.linked_profile_id = Some(id);
                state.stage = Stage::MainMenu;
                state.collection_attempts = 0;
                state.router_attempts = 0;
                format!(
                    "Perfeito, {nome}! Cadastro concluído.\n\n\
                     Resumo:\n\
                     • Nome: {nome}\n\
                     • Estilo: {estilo}\n\
                     • Cidade: {cidade}\n\n\
                     Você já está na nossa base de artistas. Quando tiver uma oportunidade \
                     compatível com o seu som, a gente te chama por aqui.\n\n{menu}",
                    nome = profile.name,
                    estilo = profile.genre,
                    cidade = profile.city.as_deref().unwrap_or("Não informada"),
                    menu = menu_options(&self.venue),
                )
            }
            Err(error) => {
                warn!(subject = %state.subject_id, %error, "profile persistence failed");
                "Houve um problema técnico ao salvar seus dados. \
                 Por favor, tente novamente em alguns minutos."
                    .to_string()
            }
        }
    }

    /// The LLM-driven router: analyze once, merge entities, dispatch by
    /// intent. The keyword classifier backs the analyzer up when the
    /// classification is unusable.
    async fn route(&self, state: &mut ConversationState, message: &str) -> String {
        let has_profile = state.linked_profile_id.is_some();
        let analysis = self
            .analyzer
            .analyze(AnalysisRequest {
                message,
                history: &state.recent_messages,
                collected: &state.collected_fields,
                has_existing_profile: has_profile,
            })
            .await;
        merge_entities(&mut state.collected_fields, &analysis.entities);

        let mut intent = analysis.intent;
        if intent == Intent::Unknown || analysis.confidence < ROUTER_CONFIDENCE_FLOOR {
            intent = match classify_menu_intent(message) {
                MenuIntent::Schedule => Intent::ScheduleInquiry,
                MenuIntent::UpdateData => Intent::UpdateData,
                MenuIntent::VenueInfo => Intent::VenueInfo,
                MenuIntent::Unknown => intent,
            };
        }

        info!(
            subject = %state.subject_id,
            intent = intent.as_str(),
            confidence = f64::from(analysis.confidence),
            "message routed"
        );

        // A pending offer plus a plain confirmation short-circuits to the
        // booking step even when the analyzer saw something else.
        if matches!(state.stage, Stage::ScheduleInquiry | Stage::PartnerReferral)
            && state.pending_offer.is_some()
            && (intent == Intent::ConfirmBooking || is_affirmative(message))
        {
            state.router_attempts = 0;
            return self.confirm_booking(state, message).await;
        }

        if intent != Intent::Unknown {
            state.router_attempts = 0;
        }

        match intent {
            Intent::Greeting => {
                state.stage = Stage::MainMenu;
                let name = state.collected_fields.name.clone();
                self.menu_text(name.as_deref())
            }
            Intent::ScheduleInquiry => self.schedule(state).await,
            Intent::ConfirmBooking => self.confirm_booking(state, message).await,
            Intent::VenueInfo => {
                state.stage = Stage::Info;
                self.venue.info_text()
            }
            Intent::Farewell => {
                state.stage = Stage::Completed;
                match state.collected_fields.name.as_deref().filter(|_| has_profile) {
                    Some(name) => format!("Até mais, {name}! Foi ótimo falar com você."),
                    None => "Até mais! Quando quiser tocar aqui, é só chamar.".to_string(),
                }
            }
            Intent::Cancel => {
                state.collected_fields = CollectedFields::default();
                state.pending_offer = None;
                state.stage = Stage::MainMenu;
                "Sem problemas! Cancelei o processo. Se mudar de ideia, estou sempre por aqui."
                    .to_string()
            }
            Intent::Feedback => match analysis.sentiment {
                Sentiment::Positive => {
                    "Fico muito feliz em ajudar! Conte sempre comigo.".to_string()
                }
                Sentiment::Negative | Sentiment::Frustrated => {
                    "Sinto muito se algo não saiu como esperado. Seu retorno é importante. \
                     Pode me contar mais sobre o que aconteceu?"
                        .to_string()
                }
                _ => "Obrigada pelo retorno! É sempre bom saber como estamos indo.".to_string(),
            },
            Intent::UpdateData => self.update_data(state, message).await,
            Intent::InitialRegistration | Intent::RegistrationFollowup => {
                self.continue_registration(state).await
            }
            Intent::GeneralQuestion => "Posso ajudar com:\n\
                 • Cadastro de artistas\n\
                 • Consulta de agenda\n\
                 • Informações sobre a casa\n\n\
                 O que você gostaria de saber?"
                .to_string(),
            Intent::Unknown => {
                state.router_attempts += 1;
                if state.router_attempts >= self.limits.router_attempt_ceiling {
                    warn!(subject = %state.subject_id, "router attempt ceiling reached");
                    state.stage = Stage::Error;
                    return APOLOGY_STOP_REPLY.to_string();
                }
                format!(
                    "Desculpe, não entendi. Você pode me dizer se quer:\n\n{}",
                    menu_options(&self.venue)
                )
            }
        }
    }

    /// Open slots when the calendar has them, partner referral otherwise.
    async fn schedule(&self, state: &mut ConversationState) -> String {
        if state.linked_profile_id.is_none() && !state.collected_fields.is_minimum_viable() {
            state.stage = next_missing_stage(&state.collected_fields);
            return format!(
                "Legal seu interesse em tocar aqui! Antes de ver as datas disponíveis, \
                 preciso das informações da sua banda. {ask}",
                ask = ask_for(state.stage),
            );
        }

        let slots = self.calendar.open_slots();
        if !slots.is_empty() {
            state.stage = Stage::ScheduleInquiry;
            state.pending_offer = Some(OfferKind::DirectSlot);
            let listing =
                slots.iter().map(|slot| format!("• {}", slot.label)).collect::<Vec<_>>().join("\n");
            return format!(
                "Aqui estão as próximas datas disponíveis:\n\n{listing}\n\n\
                 Interesse em alguma? Me avisa que já reservo para vocês!"
            );
        }

        let (genre, city) = self.referral_context(state).await;
        let picks = pick_partner_referrals(&self.partners, genre, city.as_deref(), REFERRAL_LIMIT);
        if picks.is_empty() {
            state.pending_offer = None;
            return "No momento nossa agenda está fechada, mas seu cadastro fica na nossa base. \
                    Assim que abrir uma data compatível, te chamo por aqui!"
                .to_string();
        }

        state.stage = Stage::PartnerReferral;
        state.pending_offer = Some(OfferKind::PartnerReferral);
        let listing = picks
            .iter()
            .map(|venue| format!("• {} ({})", venue.name, venue.city))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Nossa agenda está cheia por enquanto, mas conheço casas parceiras que combinam \
             com o som de vocês:\n\n{listing}\n\n\
             Quer que eu faça a ponte com alguma delas?"
        )
    }

    /// Logs the lead and closes with copy shaped by how the offer arrived.
    async fn confirm_booking(&self, state: &mut ConversationState, message: &str) -> String {
        if state.linked_profile_id.is_none() {
            state.stage = next_missing_stage(&state.collected_fields);
            return format!(
                "Para confirmar uma data, primeiro preciso te cadastrar na nossa base. {ask}",
                ask = ask_for(state.stage),
            );
        }

        let offer = state.pending_offer.take();
        state.stage = Stage::BookingConfirm;

        if let Some(profile_id) = state.linked_profile_id.clone() {
            let lead = format!("pedido de reserva: {message}");
            if let Err(error) = self
                .profiles
                .append_interaction(&profile_id, &lead, LogDirection::Inbound, Some("lead"))
                .await
            {
                warn!(subject = %state.subject_id, %error, "lead record not persisted");
            }
        }

        state.stage = Stage::Completed;
        match offer {
            Some(OfferKind::PartnerReferral) => {
                "Combinado! Vou avisar a casa parceira e colocar vocês em contato. \
                 Qualquer novidade te aviso por aqui."
                    .to_string()
            }
            _ => "Ótimo! Vou reservar essa data para vocês. Em breve envio todos os detalhes \
                 por aqui mesmo. Já podem ir divulgando!"
                .to_string(),
        }
    }

    /// Registered artists sending fresh links get them merged and saved;
    /// otherwise the current data is echoed back with an update prompt.
    async fn update_data(&self, state: &mut ConversationState, message: &str) -> String {
        if state.linked_profile_id.is_none() {
            state.stage = next_missing_stage(&state.collected_fields);
            return format!(
                "Você ainda não está cadastrado. Vamos fazer isso agora? {ask}",
                ask = ask_for(state.stage),
            );
        }

        let Some(mut profile) = self.lookup_profile(state).await else {
            return TECHNICAL_DIFFICULTY_REPLY.to_string();
        };

        let entities = self.extractor.extract(message, &state.recent_messages).await;
        let mut updated = Vec::new();
        for (platform, raw) in [
            (Platform::Instagram, entities.instagram.as_deref()),
            (Platform::Youtube, entities.youtube.as_deref()),
            (Platform::Spotify, entities.spotify.as_deref()),
        ] {
            if let Some(url) = raw.and_then(|raw| normalize_social_url(platform, raw)) {
                profile.social_links.set(platform, url.clone());
                updated.push(format!("• {}: {url}", title_case(platform.as_str())));
            }
        }

        if updated.is_empty() {
            state.stage = Stage::MainMenu;
            return format!(
                "Seus dados atuais:\n\
                 • Nome: {nome}\n\
                 • Cidade: {cidade}\n\
                 • Estilo: {estilo}\n\n\
                 O que você gostaria de atualizar? Pode me mandar, por exemplo, \
                 seu Instagram com @.",
                nome = profile.name,
                cidade = profile.city.as_deref().unwrap_or("Não informada"),
                estilo = profile.genre,
            );
        }

        match self.profiles.update(&profile).await {
            Ok(()) => {
                state.stage = Stage::MainMenu;
                format!(
                    "Perfeito, {nome}! Seus links foram atualizados:\n{links}\n\n{menu}",
                    nome = profile.name,
                    links = updated.join("\n"),
                    menu = menu_options(&self.venue),
                )
            }
            Err(error) => {
                warn!(subject = %state.subject_id, %error, "profile update failed");
                "Ops, tive um problema ao salvar seus dados. Pode tentar novamente?".to_string()
            }
        }
    }

    /// Registration intents landing on the router: keep collecting, or
    /// persist when the gate is already satisfied.
    async fn continue_registration(&self, state: &mut ConversationState) -> String {
        if state.linked_profile_id.is_some() {
            state.stage = Stage::MainMenu;
            return format!(
                "Vi que você já está na nossa base de artistas. Quer ver a agenda disponível \
                 ou atualizar seus materiais?\n\n{}",
                menu_options(&self.venue)
            );
        }

        if state.collected_fields.is_minimum_viable() {
            return self.persist(state).await;
        }

        state.stage = next_missing_stage(&state.collected_fields);
        let missing = missing_descriptions(&state.collected_fields);
        if missing.len() == 1 {
            format!("Ótimo! Agora só falta {}.", missing[0])
        } else {
            let (last, head) = missing.split_last().expect("at least one missing field");
            format!("Legal! Ainda preciso de {} e {last}.", head.join(", "))
        }
    }

    async fn lookup_profile(&self, state: &ConversationState) -> Option<Profile> {
        match self.profiles.find_by_contact(&state.subject_id).await {
            Ok(profile) => profile,
            Err(error) => {
                warn!(subject = %state.subject_id, %error, "profile lookup failed");
                None
            }
        }
    }

    async fn referral_context(&self, state: &ConversationState) -> (Option<Genre>, Option<String>) {
        let collected_genre = state.collected_fields.genre.as_deref().map(Genre::parse);
        let collected_city = state.collected_fields.city.clone();
        if collected_genre.is_some() || state.linked_profile_id.is_none() {
            return (collected_genre, collected_city);
        }
        match self.lookup_profile(state).await {
            Some(profile) => (Some(profile.genre), profile.city.or(collected_city)),
            None => (collected_genre, collected_city),
        }
    }

    async fn log_exchange(&self, state: &ConversationState, inbound: &str, outbound: &str) {
        let Some(profile_id) = state.linked_profile_id.clone() else {
            return;
        };
        let key_moment = Some(state.stage.as_str());
        for (text, direction) in
            [(inbound, LogDirection::Inbound), (outbound, LogDirection::Outbound)]
        {
            if let Err(error) =
                self.profiles.append_interaction(&profile_id, text, direction, key_moment).await
            {
                warn!(subject = %state.subject_id, %error, "interaction log write failed");
                break;
            }
        }
    }

    fn menu_text(&self, name: Option<&str>) -> String {
        let greeting = match name {
            Some(name) => format!("Olá {name}!"),
            None => "Olá!".to_string(),
        };
        format!(
            "{greeting} {persona} da {venue} aqui.\n\nComo posso ajudar hoje?\n\n{options}\n\n\
             O que você gostaria?",
            persona = self.venue.persona_name,
            venue = self.venue.name,
            options = menu_options(&self.venue),
        )
    }
}

fn menu_options(venue: &VenueProfile) -> String {
    format!(
        "• Agenda - ver datas disponíveis para shows\n\
         • Dados - atualizar suas informações\n\
         • Casa - saber mais sobre a {}",
        venue.name
    )
}

/// Fixed collection priority: name -> genre -> city -> links.
pub fn next_missing_stage(fields: &CollectedFields) -> Stage {
    if !fields.has_name() {
        Stage::CollectingName
    } else if !fields.has_genre() {
        Stage::CollectingGenre
    } else if !fields.has_city() {
        Stage::CollectingCity
    } else if !fields.has_any_link() {
        Stage::CollectingLinks
    } else {
        Stage::Validating
    }
}

/// The per-stage question, also the hardcoded fallback when every provider
/// is down.
pub fn ask_for(stage: Stage) -> String {
    match stage {
        Stage::CollectingName => {
            "Para começar, qual é o seu nome ou nome da sua banda?".to_string()
        }
        Stage::CollectingGenre => {
            "Qual é o seu estilo musical principal? (rock, MPB, samba, pop, sertanejo...)"
                .to_string()
        }
        Stage::CollectingCity => "De qual cidade você é?".to_string(),
        Stage::CollectingLinks => {
            "Agora preciso de pelo menos uma rede social sua. Me envie seu Instagram (com @), \
             YouTube ou Spotify:"
                .to_string()
        }
        _ => "Qual seria a próxima informação que você gostaria de compartilhar?".to_string(),
    }
}

fn stage_for_field(field: &str) -> Stage {
    match field {
        "nome" => Stage::CollectingName,
        "estilo musical" => Stage::CollectingGenre,
        "cidade" => Stage::CollectingCity,
        _ => Stage::CollectingLinks,
    }
}

/// Human descriptions of what is still missing, in collection order.
fn missing_descriptions(fields: &CollectedFields) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !fields.has_name() {
        missing.push("o nome do seu projeto");
    }
    if !fields.has_genre() {
        missing.push("o estilo musical");
    }
    if !fields.has_city() {
        missing.push("de onde vocês são");
    }
    if !fields.has_any_link() {
        missing.push("links do seu trabalho (Instagram, YouTube ou Spotify)");
    }
    missing
}

/// Merges analyzer/extractor entities into the collected fields. String
/// fields are normalized here: genre lowercased, name and city title-cased,
/// handles expanded into absolute URLs. Later mentions overwrite earlier
/// ones so corrections stick.
pub fn merge_entities(fields: &mut CollectedFields, entities: &ExtractedEntities) {
    if let Some(name) = entities.name.as_deref().map(str::trim).filter(|n| n.len() >= 2) {
        fields.name = Some(title_case(name));
    }
    if let Some(city) = entities.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        fields.city = Some(title_case(city));
    }
    if let Some(genre) = entities.genre.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        fields.genre = Some(genre.to_lowercase());
    }
    for (platform, raw) in [
        (Platform::Instagram, entities.instagram.as_deref()),
        (Platform::Youtube, entities.youtube.as_deref()),
        (Platform::Spotify, entities.spotify.as_deref()),
    ] {
        if let Some(url) = raw.and_then(|raw| normalize_social_url(platform, raw)) {
            fields.set_link(platform, url);
        }
    }
    if let Some(bio) = entities.bio.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        fields.bio = Some(bio.to_string());
    }
    if let Some(years) = entities.years_experience {
        fields.years_experience = Some(years);
    }
}

/// Interprets one links-stage message: `@handle` means Instagram, platform
/// tokens trigger URL synthesis, bare URLs are sniffed by domain with
/// Instagram as the default.
pub fn parse_link_message(message: &str) -> Option<(Platform, String)> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();

    if let Some(at_index) = trimmed.find('@') {
        let handle: String = trimmed[at_index + 1..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
            .collect();
        if !handle.is_empty() {
            return normalize_social_url(Platform::Instagram, &handle)
                .map(|url| (Platform::Instagram, url));
        }
    }

    if lower.contains("youtube") || lower.contains("youtu.be") {
        let raw = if lower.contains("youtube.com") || lower.contains("youtu.be") {
            first_url_token(trimmed).unwrap_or(trimmed).to_string()
        } else {
            strip_platform_token(trimmed, "youtube")
        };
        return normalize_social_url(Platform::Youtube, &raw).map(|url| (Platform::Youtube, url));
    }

    if lower.contains("spotify") {
        let raw = if lower.contains("spotify.com") {
            first_url_token(trimmed).unwrap_or(trimmed).to_string()
        } else {
            strip_platform_token(trimmed, "spotify")
        };
        return normalize_social_url(Platform::Spotify, &raw).map(|url| (Platform::Spotify, url));
    }

    if let Some(url) = first_url_token(trimmed) {
        let platform = Platform::from_url(url).unwrap_or(Platform::Instagram);
        return Some((platform, url.to_string()));
    }

    // A bare token is taken as an Instagram username.
    let token = trimmed.split_whitespace().next()?;
    normalize_social_url(Platform::Instagram, token).map(|url| (Platform::Instagram, url))
}

fn first_url_token(message: &str) -> Option<&str> {
    message.split_whitespace().find(|token| token.starts_with("http"))
}

fn strip_platform_token(message: &str, platform: &str) -> String {
    message
        .to_lowercase()
        .replace(platform, "")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '.' || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::domain::analysis::{AnalysisResult, ExtractedEntities, Intent};
    use crate::domain::contact::ContactChannel;
    use crate::domain::conversation::{ConversationState, HistoryLine, OfferKind, Stage};
    use crate::domain::genre::Genre;
    use crate::domain::profile::{Platform, Profile, ProfileId, SocialLinks};
    use crate::flows::ports::{
        AnalysisRequest, EntityExtractor, LogDirection, MessageAnalyzer, ProfileStore, StoreError,
    };
    use crate::venue::{default_partner_directory, FixedCalendar, VenueProfile};

    use super::{parse_link_message, FlowEngine, FlowLimits, APOLOGY_STOP_REPLY};

    #[derive(Default)]
    struct ScriptedAnalyzer {
        script: Mutex<VecDeque<AnalysisResult>>,
    }

    impl ScriptedAnalyzer {
        fn with(results: Vec<AnalysisResult>) -> Self {
            Self { script: Mutex::new(results.into()) }
        }

        fn intent(intent: Intent) -> AnalysisResult {
            AnalysisResult { intent, confidence: 0.9, ..AnalysisResult::default() }
        }
    }

    #[async_trait]
    impl MessageAnalyzer for ScriptedAnalyzer {
        async fn analyze(&self, _request: AnalysisRequest<'_>) -> AnalysisResult {
            self.script.lock().expect("lock").pop_front().unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct ScriptedExtractor {
        script: Mutex<VecDeque<ExtractedEntities>>,
    }

    impl ScriptedExtractor {
        fn with(entities: Vec<ExtractedEntities>) -> Self {
            Self { script: Mutex::new(entities.into()) }
        }
    }

    #[async_trait]
    impl EntityExtractor for ScriptedExtractor {
        async fn extract(&self, _message: &str, _history: &[HistoryLine]) -> ExtractedEntities {
            self.script.lock().expect("lock").pop_front().unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct MemProfiles {
        rows: Mutex<Vec<Profile>>,
        interactions: Mutex<Vec<(ProfileId, String, Option<String>)>>,
        fail_creates: AtomicBool,
    }

    #[async_trait]
    impl ProfileStore for MemProfiles {
        async fn find_by_contact(&self, subject_id: &str) -> Result<Option<Profile>, StoreError> {
            Ok(self
                .rows
                .lock()
                .expect("lock")
                .iter()
                .find(|p| p.contact_channels.iter().any(|c| c.value == subject_id))
                .cloned())
        }

        async fn create(&self, profile: &Profile) -> Result<ProfileId, StoreError> {
            if self.fail_creates.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("insert disabled".to_string()));
            }
            self.rows.lock().expect("lock").push(profile.clone());
            Ok(profile.id.clone())
        }

        async fn update(&self, profile: &Profile) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().expect("lock");
            if let Some(row) = rows.iter_mut().find(|p| p.id == profile.id) {
                *row = profile.clone();
            }
            Ok(())
        }

        async fn append_interaction(
            &self,
            profile_id: &ProfileId,
            text: &str,
            _direction: LogDirection,
            key_moment: Option<&str>,
        ) -> Result<(), StoreError> {
            self.interactions.lock().expect("lock").push((
                profile_id.clone(),
                text.to_string(),
                key_moment.map(str::to_string),
            ));
            Ok(())
        }
    }

    struct Harness {
        engine: FlowEngine,
        profiles: Arc<MemProfiles>,
    }

    fn harness(
        analyzer: ScriptedAnalyzer,
        extractor: ScriptedExtractor,
        calendar: FixedCalendar,
    ) -> Harness {
        let profiles = Arc::new(MemProfiles::default());
        let engine = FlowEngine::new(
            Arc::new(analyzer),
            Arc::new(extractor),
            profiles.clone(),
            Arc::new(calendar),
            VenueProfile::default(),
            default_partner_directory(),
            FlowLimits::default(),
        );
        Harness { engine, profiles }
    }

    fn registered_profile(subject_id: &str) -> Profile {
        Profile {
            id: ProfileId::generate(),
            name: "Rock Total".to_string(),
            city: Some("São Paulo".to_string()),
            genre: Genre::Rock,
            social_links: SocialLinks {
                instagram: Some("https://instagram.com/rocktotal".to_string()),
                ..SocialLinks::default()
            },
            bio: None,
            years_experience: None,
            contact_channels: vec![ContactChannel::whatsapp_primary(subject_id)],
        }
    }

    #[tokio::test]
    async fn rich_first_message_persists_in_one_turn() {
        let extractor = ScriptedExtractor::with(vec![ExtractedEntities {
            name: Some("Rock Total".to_string()),
            city: Some("São Paulo".to_string()),
            genre: Some("rock".to_string()),
            instagram: Some("@rocktotal".to_string()),
            ..ExtractedEntities::default()
        }]);
        let h = harness(ScriptedAnalyzer::default(), extractor, FixedCalendar::with_defaults());

        let mut state = ConversationState::new("+5511987654321");
        let reply = h
            .engine
            .handle_message(
                &mut state,
                "Oi, somos o Rock Total de São Paulo, tocamos rock, instagram @rocktotal",
            )
            .await;

        assert_eq!(state.stage, Stage::MainMenu);
        assert!(state.linked_profile_id.is_some());
        assert!(reply.contains("Cadastro concluído"));

        let rows = h.profiles.rows.lock().expect("lock");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].genre, Genre::Rock);
        assert_eq!(
            rows[0].social_links.instagram.as_deref(),
            Some("https://instagram.com/rocktotal")
        );
    }

    #[tokio::test]
    async fn field_by_field_collection_round_trips_into_the_store() {
        let h = harness(
            ScriptedAnalyzer::default(),
            ScriptedExtractor::default(),
            FixedCalendar::with_defaults(),
        );
        let mut state = ConversationState::new("+5511987654321");

        let welcome = h.engine.handle_message(&mut state, "oi").await;
        assert!(welcome.contains("nome"));
        assert_eq!(state.stage, Stage::CollectingName);

        h.engine.handle_message(&mut state, "Banda X").await;
        assert_eq!(state.stage, Stage::CollectingGenre);

        h.engine.handle_message(&mut state, "rock").await;
        assert_eq!(state.stage, Stage::CollectingCity);

        h.engine.handle_message(&mut state, "Bragança").await;
        assert_eq!(state.stage, Stage::CollectingLinks);

        let done = h.engine.handle_message(&mut state, "@bandax").await;
        assert!(done.contains("Cadastro concluído"));
        assert_eq!(state.stage, Stage::MainMenu);

        let rows = h.profiles.rows.lock().expect("lock");
        assert_eq!(rows[0].name, "Banda X");
        assert_eq!(rows[0].genre, Genre::Rock);
        assert_eq!(rows[0].city.as_deref(), Some("Bragança"));
        assert_eq!(rows[0].social_links.instagram.as_deref(), Some("https://instagram.com/bandax"));
    }

    #[tokio::test]
    async fn collection_loop_terminates_with_the_fixed_apology() {
        let h = harness(
            ScriptedAnalyzer::default(),
            ScriptedExtractor::default(),
            FixedCalendar::with_defaults(),
        );
        let mut state = ConversationState::new("+5511987654321");
        h.engine.handle_message(&mut state, "oi").await;

        let mut last = String::new();
        for _ in 0..12 {
            last = h.engine.handle_message(&mut state, " ").await;
            if state.stage == Stage::Error {
                break;
            }
        }

        assert_eq!(state.stage, Stage::Error);
        assert_eq!(last, APOLOGY_STOP_REPLY);
        assert!(state.collection_attempts > 10);
    }

    #[tokio::test]
    async fn greeting_from_registered_artist_gets_the_personalized_menu() {
        let h = harness(
            ScriptedAnalyzer::with(vec![ScriptedAnalyzer::intent(Intent::Greeting)]),
            ScriptedExtractor::default(),
            FixedCalendar::with_defaults(),
        );
        h.profiles.rows.lock().expect("lock").push(registered_profile("+5511987654321"));

        let mut state = ConversationState::new("+5511987654321");
        let entry = h.engine.handle_message(&mut state, "oi").await;
        assert_eq!(state.stage, Stage::MainMenu);
        assert!(entry.contains("Rock Total"));
        assert!(entry.contains("Agenda"));

        let menu = h.engine.handle_message(&mut state, "oi").await;
        assert!(menu.contains("Como posso ajudar"));
        assert!(!menu.contains("qual é o seu nome"));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_the_stage_and_the_next_message_retries() {
        let h = harness(
            ScriptedAnalyzer::default(),
            ScriptedExtractor::with(vec![ExtractedEntities {
                name: Some("Banda X".to_string()),
                genre: Some("rock".to_string()),
                city: Some("Bragança".to_string()),
                instagram: Some("@bandax".to_string()),
                ..ExtractedEntities::default()
            }]),
            FixedCalendar::with_defaults(),
        );
        h.profiles.fail_creates.store(true, Ordering::SeqCst);

        let mut state = ConversationState::new("+5511987654321");
        let reply = h.engine.handle_message(&mut state, "somos a Banda X, rock, @bandax").await;

        assert_eq!(state.stage, Stage::Persisting);
        assert!(reply.contains("problema técnico"));
        assert!(h.profiles.rows.lock().expect("lock").is_empty());

        h.profiles.fail_creates.store(false, Ordering::SeqCst);
        let retry = h.engine.handle_message(&mut state, "pode tentar de novo").await;

        assert_eq!(state.stage, Stage::MainMenu);
        assert!(retry.contains("Cadastro concluído"));
        assert_eq!(h.profiles.rows.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn empty_calendar_routes_to_partner_referral_then_booking_confirm() {
        let h = harness(
            ScriptedAnalyzer::with(vec![
                ScriptedAnalyzer::intent(Intent::ScheduleInquiry),
                ScriptedAnalyzer::intent(Intent::ConfirmBooking),
            ]),
            ScriptedExtractor::default(),
            FixedCalendar::empty(),
        );
        h.profiles.rows.lock().expect("lock").push(registered_profile("+5511987654321"));

        let mut state = ConversationState::new("+5511987654321");
        h.engine.handle_message(&mut state, "oi").await;

        let referral = h.engine.handle_message(&mut state, "tem data pra gente tocar?").await;
        assert_eq!(state.stage, Stage::PartnerReferral);
        assert_eq!(state.pending_offer, Some(OfferKind::PartnerReferral));
        assert!(referral.contains("casas parceiras"));

        let closing = h.engine.handle_message(&mut state, "sim, pode fazer a ponte").await;
        assert_eq!(state.stage, Stage::Completed);
        assert!(closing.contains("casa parceira"));

        let interactions = h.profiles.interactions.lock().expect("lock");
        assert!(interactions.iter().any(|(_, text, moment)| text.contains("pedido de reserva")
            && moment.as_deref() == Some("lead")));
    }

    #[tokio::test]
    async fn three_unknown_router_passes_end_with_the_apology() {
        let h = harness(
            ScriptedAnalyzer::default(),
            ScriptedExtractor::default(),
            FixedCalendar::with_defaults(),
        );
        h.profiles.rows.lock().expect("lock").push(registered_profile("+5511987654321"));

        let mut state = ConversationState::new("+5511987654321");
        h.engine.handle_message(&mut state, "oi").await;

        let mut last = String::new();
        for _ in 0..3 {
            last = h.engine.handle_message(&mut state, "xyzzy plugh").await;
        }

        assert_eq!(state.stage, Stage::Error);
        assert_eq!(last, APOLOGY_STOP_REPLY);
    }

    #[test]
    fn link_parsing_covers_the_documented_shapes() {
        assert_eq!(
            parse_link_message("@bandax"),
            Some((Platform::Instagram, "https://instagram.com/bandax".to_string()))
        );
        assert_eq!(
            parse_link_message("youtube bandax"),
            Some((Platform::Youtube, "https://youtube.com/@bandax".to_string()))
        );
        assert_eq!(
            parse_link_message("https://open.spotify.com/artist/xyz"),
            Some((Platform::Spotify, "https://open.spotify.com/artist/xyz".to_string()))
        );
        // Unrecognized domains default to Instagram.
        assert_eq!(
            parse_link_message("https://mais.co/rocktotal"),
            Some((Platform::Instagram, "https://mais.co/rocktotal".to_string()))
        );
        assert_eq!(parse_link_message("   "), None);
    }
}
