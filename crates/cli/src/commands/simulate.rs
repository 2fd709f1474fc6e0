//! Offline conversation simulator: drives the real flow engine against
//! in-memory stores with an empty provider pool, so every extraction takes
//! the heuristic path and no network is touched.

use std::sync::Arc;

use palco_agent::{DataExtractor, IntentAnalyzer, ProviderPool};
use palco_core::domain::conversation::ConversationState;
use palco_core::venue::{default_partner_directory, FixedCalendar, VenueProfile};
use palco_core::{normalize_subject_id, FlowEngine, FlowLimits};
use palco_db::InMemoryProfileRepository;

pub fn run(subject: &str, messages: &[String]) -> String {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => return format!("simulate: runtime build failed: {error}"),
    };

    runtime.block_on(simulate(subject, messages))
}

async fn simulate(subject: &str, messages: &[String]) -> String {
    let venue = VenueProfile::default();
    let pool = Arc::new(ProviderPool::with_clients(Vec::new()));
    let profiles = Arc::new(InMemoryProfileRepository::new());

    let engine = FlowEngine::new(
        Arc::new(IntentAnalyzer::new(pool.clone(), venue.clone())),
        Arc::new(DataExtractor::new(pool, venue.persona_name.clone())),
        profiles.clone(),
        Arc::new(FixedCalendar::with_defaults()),
        venue,
        default_partner_directory(),
        FlowLimits::default(),
    );

    let subject_id = normalize_subject_id(subject);
    let mut state = ConversationState::new(subject_id.clone());
    let mut transcript = vec![format!("simulate: subject {subject_id} (heuristic-only mode)")];

    for message in messages {
        transcript.push(format!("> {message}"));
        let reply = engine.handle_message(&mut state, message).await;
        for line in reply.lines() {
            transcript.push(format!("< {line}"));
        }
        transcript.push(format!("  [stage: {}]", state.stage.as_str()));
    }

    if let Some(profile) = profiles.profiles().first() {
        transcript.push(format!(
            "persisted: {} ({}) links={}",
            profile.name,
            profile.genre,
            profile
                .social_links
                .instagram
                .as_deref()
                .or(profile.social_links.youtube.as_deref())
                .or(profile.social_links.spotify.as_deref())
                .unwrap_or("-"),
        ));
    }

    transcript.join("\n")
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn a_full_scripted_registration_persists_a_profile() {
        let messages = [
            "oi".to_string(),
            "Banda X".to_string(),
            "rock".to_string(),
            "Bragança".to_string(),
            "@bandax".to_string(),
        ];

        let output = run("+5511999990000", &messages);

        assert!(output.contains("[stage: main_menu]"));
        assert!(output.contains("persisted: Banda X (rock)"));
    }
}
