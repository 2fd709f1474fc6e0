//! Collaborator seams for the flow engine. Concrete implementations live in
//! `palco-agent` (LLM-backed analysis/extraction) and `palco-db` (storage);
//! in-memory doubles back the tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::analysis::{AnalysisResult, ExtractedEntities};
use crate::domain::conversation::{CollectedFields, ConversationState, HistoryLine};
use crate::domain::profile::{Profile, ProfileId};

/// Transient storage failures surface as values, never as panics; the flow
/// turns them into user-safe copy.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage rejected the record: {0}")]
    Rejected(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogDirection {
    Inbound,
    Outbound,
}

impl LogDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogDirection::Inbound => "entrada",
            LogDirection::Outbound => "saida",
        }
    }
}

/// Everything the analyzer needs to classify one message in context.
pub struct AnalysisRequest<'a> {
    pub message: &'a str,
    pub history: &'a [HistoryLine],
    pub collected: &'a CollectedFields,
    pub has_existing_profile: bool,
}

/// Classifies a message into an `AnalysisResult`. Implementations never
/// fail: provider exhaustion returns the documented safe default.
#[async_trait]
pub trait MessageAnalyzer: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest<'_>) -> AnalysisResult;
}

/// Pulls partial profile fields out of a message. History is disambiguating
/// context only, never a data source. Implementations never fail: total
/// extraction failure returns an all-empty result.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, message: &str, history: &[HistoryLine]) -> ExtractedEntities;
}

/// The artist-record persistence collaborator.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_contact(&self, subject_id: &str) -> Result<Option<Profile>, StoreError>;
    async fn create(&self, profile: &Profile) -> Result<ProfileId, StoreError>;
    async fn update(&self, profile: &Profile) -> Result<(), StoreError>;
    async fn append_interaction(
        &self,
        profile_id: &ProfileId,
        text: &str,
        direction: LogDirection,
        key_moment: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// Durable conversation-state storage; the in-memory cache in front of it
/// lives in `flows::session`.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, subject_id: &str) -> Result<Option<ConversationState>, StoreError>;
    async fn save(&self, state: &ConversationState) -> Result<(), StoreError>;
}

/// A bookable show slot, as presented to the artist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShowSlot {
    pub label: String,
}

/// Source of open show dates. The default implementation is mocked; a real
/// availability engine is out of scope and plugs in here.
pub trait AvailabilityCalendar: Send + Sync {
    fn open_slots(&self) -> Vec<ShowSlot>;
}
