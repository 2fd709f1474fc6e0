use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::genre::Genre;
use crate::domain::profile::{Platform, Profile, ProfileId};

/// Maximum lines kept in the rolling history (10 exchanges).
const HISTORY_CAP: usize = 20;

/// Named positions of a conversation inside the flow graph. The state row
/// only ever stores members of this set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    CollectingName,
    CollectingGenre,
    CollectingCity,
    CollectingLinks,
    Validating,
    Persisting,
    MainMenu,
    ScheduleInquiry,
    PartnerReferral,
    Info,
    BookingConfirm,
    Completed,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::CollectingName => "collecting_name",
            Stage::CollectingGenre => "collecting_genre",
            Stage::CollectingCity => "collecting_city",
            Stage::CollectingLinks => "collecting_links",
            Stage::Validating => "validating",
            Stage::Persisting => "persisting",
            Stage::MainMenu => "main_menu",
            Stage::ScheduleInquiry => "schedule_inquiry",
            Stage::PartnerReferral => "partner_referral",
            Stage::Info => "info",
            Stage::BookingConfirm => "booking_confirm",
            Stage::Completed => "completed",
            Stage::Error => "error",
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Stage::CollectingName
                | Stage::CollectingGenre
                | Stage::CollectingCity
                | Stage::CollectingLinks
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLine {
    pub direction: Direction,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// How the current booking offer reached the artist; shapes the closing
/// copy of the confirmation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    DirectSlot,
    PartnerReferral,
}

/// Scalar profile fields accumulated across the conversation. Values are
/// only ever added or overwritten, never removed outside an explicit reset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedFields {
    pub name: Option<String>,
    pub city: Option<String>,
    pub genre: Option<String>,
    pub instagram: Option<String>,
    pub youtube: Option<String>,
    pub spotify: Option<String>,
    pub soundcloud: Option<String>,
    pub bandcamp: Option<String>,
    pub bio: Option<String>,
    pub years_experience: Option<u8>,
}

impl CollectedFields {
    pub fn link(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Instagram => self.instagram.as_deref(),
            Platform::Youtube => self.youtube.as_deref(),
            Platform::Spotify => self.spotify.as_deref(),
            Platform::Soundcloud => self.soundcloud.as_deref(),
            Platform::Bandcamp => self.bandcamp.as_deref(),
        }
    }

    pub fn set_link(&mut self, platform: Platform, value: String) {
        match platform {
            Platform::Instagram => self.instagram = Some(value),
            Platform::Youtube => self.youtube = Some(value),
            Platform::Spotify => self.spotify = Some(value),
            Platform::Soundcloud => self.soundcloud = Some(value),
            Platform::Bandcamp => self.bandcamp = Some(value),
        }
    }

    pub fn has_any_link(&self) -> bool {
        Platform::ALL.iter().any(|platform| self.link(*platform).is_some())
    }

    pub fn has_name(&self) -> bool {
        self.name.as_deref().map(|n| n.trim().len() >= 2).unwrap_or(false)
    }

    pub fn has_genre(&self) -> bool {
        self.genre.as_deref().map(|g| !g.trim().is_empty()).unwrap_or(false)
    }

    pub fn has_city(&self) -> bool {
        self.city.as_deref().map(|c| !c.trim().is_empty()).unwrap_or(false)
    }

    /// The persistence gate on the collection side: name + genre + one link.
    pub fn is_minimum_viable(&self) -> bool {
        self.has_name() && self.has_genre() && self.has_any_link()
    }

    /// Seeds the collected fields from an already-persisted profile so the
    /// complete-your-profile path only asks for what is actually missing.
    pub fn seed_from_profile(&mut self, profile: &Profile) {
        self.name.get_or_insert_with(|| profile.name.clone());
        if self.genre.is_none() && profile.genre != Genre::Other {
            self.genre = Some(profile.genre.as_str().to_string());
        }
        if self.city.is_none() {
            self.city.clone_from(&profile.city);
        }
        for platform in Platform::ALL {
            if self.link(platform).is_none() {
                if let Some(url) = profile.social_links.get(platform) {
                    self.set_link(platform, url.to_string());
                }
            }
        }
    }

    pub fn filled_count(&self) -> usize {
        let scalars = [
            self.name.is_some(),
            self.city.is_some(),
            self.genre.is_some(),
            self.instagram.is_some(),
            self.youtube.is_some(),
            self.spotify.is_some(),
            self.soundcloud.is_some(),
            self.bandcamp.is_some(),
            self.bio.is_some(),
        ];
        scalars.iter().filter(|filled| **filled).count()
            + usize::from(self.years_experience.is_some())
    }
}

/// Per-subject conversation record. Created on first contact, mutated by
/// every flow invocation, persisted after every mutation, replaced wholesale
/// by an explicit reset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub subject_id: String,
    pub collected_fields: CollectedFields,
    pub stage: Stage,
    pub collection_attempts: u32,
    pub router_attempts: u32,
    pub recent_messages: Vec<HistoryLine>,
    pub linked_profile_id: Option<ProfileId>,
    pub pending_offer: Option<OfferKind>,
}

impl ConversationState {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            collected_fields: CollectedFields::default(),
            stage: Stage::Start,
            collection_attempts: 0,
            router_attempts: 0,
            recent_messages: Vec::new(),
            linked_profile_id: None,
            pending_offer: None,
        }
    }

    /// A reset keeps only the identity; everything else starts over.
    pub fn reset(&mut self) {
        *self = Self::new(self.subject_id.clone());
    }

    pub fn push_line(&mut self, direction: Direction, text: impl Into<String>) {
        self.recent_messages.push(HistoryLine { direction, text: text.into(), at: Utc::now() });
        if self.recent_messages.len() > HISTORY_CAP {
            let excess = self.recent_messages.len() - HISTORY_CAP;
            self.recent_messages.drain(..excess);
        }
    }

    /// Completion snapshot for the status command: essential fields plus
    /// the at-least-one-link requirement, weighted equally.
    pub fn progress(&self) -> ConversationProgress {
        let fields = &self.collected_fields;
        let satisfied = usize::from(fields.has_name())
            + usize::from(fields.has_genre())
            + usize::from(fields.has_any_link());
        let percent = (satisfied as f32 / 3.0) * 100.0;

        ConversationProgress {
            percent: (percent * 10.0).round() / 10.0,
            stage: self.stage,
            attempts: self.collection_attempts,
            fields_collected: fields.filled_count(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversationProgress {
    pub percent: f32,
    pub stage: Stage,
    pub attempts: u32,
    pub fields_collected: usize,
}
