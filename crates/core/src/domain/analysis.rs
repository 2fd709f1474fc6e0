use serde::{Deserialize, Serialize};

/// Closed set of intents the router dispatches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    InitialRegistration,
    RegistrationFollowup,
    ScheduleInquiry,
    UpdateData,
    VenueInfo,
    Greeting,
    Farewell,
    GeneralQuestion,
    Feedback,
    ConfirmBooking,
    Cancel,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::InitialRegistration => "initial_registration",
            Intent::RegistrationFollowup => "registration_followup",
            Intent::ScheduleInquiry => "schedule_inquiry",
            Intent::UpdateData => "update_data",
            Intent::VenueInfo => "venue_info",
            Intent::Greeting => "greeting",
            Intent::Farewell => "farewell",
            Intent::GeneralQuestion => "general_question",
            Intent::Feedback => "feedback",
            Intent::ConfirmBooking => "confirm_booking",
            Intent::Cancel => "cancel",
            Intent::Unknown => "unknown",
        }
    }

    /// Heuristic confidence assigned when the model leaves the field unset.
    pub fn default_confidence(&self) -> f32 {
        match self {
            Intent::Greeting | Intent::Farewell => 0.9,
            Intent::InitialRegistration
            | Intent::RegistrationFollowup
            | Intent::ScheduleInquiry => 0.8,
            Intent::Unknown => 0.0,
            _ => 0.7,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
    Anxious,
    Frustrated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
}

/// Partial profile-shaped fields pulled out of a single message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub youtube: Option<String>,
    #[serde(default)]
    pub spotify: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub years_experience: Option<u8>,
    /// 0..=1, computed as filled-fields / 3 capped at 1.0.
    #[serde(default)]
    pub confidence: f32,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.city.is_none()
            && self.genre.is_none()
            && self.instagram.is_none()
            && self.youtube.is_none()
            && self.spotify.is_none()
            && self.bio.is_none()
            && self.years_experience.is_none()
    }

    pub fn filled_count(&self) -> usize {
        [
            self.name.is_some(),
            self.city.is_some(),
            self.genre.is_some(),
            self.instagram.is_some(),
            self.youtube.is_some(),
            self.spotify.is_some(),
            self.bio.is_some(),
            self.years_experience.is_some(),
        ]
        .iter()
        .filter(|filled| **filled)
        .count()
    }

    /// Confidence grows with the number of extracted fields, capped at 1.0.
    pub fn score_confidence(&mut self) {
        self.confidence = (self.filled_count() as f32 / 3.0).min(1.0);
    }
}

/// Full per-message classification. Ephemeral: produced fresh for each
/// inbound message and consumed within the same flow invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub intent: Intent,
    #[serde(default)]
    pub secondary_intent: Option<Intent>,
    #[serde(default)]
    pub entities: ExtractedEntities,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub needs_human: bool,
    #[serde(default)]
    pub summary: Option<String>,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            intent: Intent::Unknown,
            secondary_intent: None,
            entities: ExtractedEntities::default(),
            sentiment: Sentiment::Neutral,
            urgency: Urgency::Low,
            keywords: Vec::new(),
            confidence: 0.0,
            needs_human: false,
            summary: None,
        }
    }
}

impl AnalysisResult {
    /// The documented safe default when the whole provider pool is down.
    pub fn provider_exhausted() -> Self {
        Self { needs_human: true, ..Self::default() }
    }

    /// Post-processing applied to every model response: an unknown intent
    /// zeroes confidence and flags a human, unset confidence gets the
    /// per-intent heuristic default, and a missing summary is synthesized
    /// from the intent plus the message prefix.
    pub fn finalize(mut self, message: &str) -> Self {
        if self.intent == Intent::Unknown {
            self.confidence = 0.0;
            self.needs_human = true;
        } else if self.confidence <= 0.0 {
            self.confidence = self.intent.default_confidence();
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);

        if self.summary.is_none() {
            let prefix: String = message.chars().take(50).collect();
            self.summary = Some(format!("{}: {prefix}", self.intent.as_str()));
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::{AnalysisResult, ExtractedEntities, Intent, Sentiment};

    #[test]
    fn unknown_intent_forces_zero_confidence_and_human_flag() {
        let result =
            AnalysisResult { intent: Intent::Unknown, confidence: 0.8, ..Default::default() }
                .finalize("mensagem qualquer");

        assert_eq!(result.confidence, 0.0);
        assert!(result.needs_human);
    }

    #[test]
    fn unset_confidence_is_backfilled_by_intent_class() {
        let greeting =
            AnalysisResult { intent: Intent::Greeting, ..Default::default() }.finalize("oi");
        assert_eq!(greeting.confidence, 0.9);

        let registration =
            AnalysisResult { intent: Intent::InitialRegistration, ..Default::default() }
                .finalize("somos a banda x");
        assert_eq!(registration.confidence, 0.8);

        let feedback = AnalysisResult { intent: Intent::Feedback, ..Default::default() }
            .finalize("adorei o atendimento");
        assert_eq!(feedback.confidence, 0.7);
    }

    #[test]
    fn missing_summary_is_synthesized_from_intent_and_prefix() {
        let result = AnalysisResult { intent: Intent::Greeting, ..Default::default() }
            .finalize("bom dia, tudo bem?");
        assert_eq!(result.summary.as_deref(), Some("greeting: bom dia, tudo bem?"));
    }

    #[test]
    fn exhausted_pool_default_is_safe() {
        let result = AnalysisResult::provider_exhausted();
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.sentiment, Sentiment::Neutral);
        assert_eq!(result.confidence, 0.0);
        assert!(result.needs_human);
    }

    #[test]
    fn entity_confidence_caps_at_one() {
        let mut entities = ExtractedEntities {
            name: Some("Banda X".to_string()),
            city: Some("Bragança".to_string()),
            genre: Some("rock".to_string()),
            instagram: Some("https://instagram.com/bandax".to_string()),
            ..Default::default()
        };
        entities.score_confidence();
        assert_eq!(entities.confidence, 1.0);

        let mut single =
            ExtractedEntities { name: Some("Banda X".to_string()), ..Default::default() };
        single.score_confidence();
        assert!((single.confidence - 1.0 / 3.0).abs() < f32::EPSILON);
    }
}
