//! Core domain and conversation machinery for the Palco intake agent:
//! profiles, conversation state, the flow engine and its collaborator
//! ports, configuration and shared error types. I/O lives in the sibling
//! crates (`palco-agent`, `palco-db`, `palco-whatsapp`, `palco-server`).

pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod metrics;
pub mod text;
pub mod venue;

pub use domain::analysis::{AnalysisResult, ExtractedEntities, Intent, Sentiment, Urgency};
pub use domain::contact::{normalize_subject_id, ContactChannel, ContactKind};
pub use domain::conversation::{
    CollectedFields, ConversationProgress, ConversationState, Direction, HistoryLine, OfferKind,
    Stage,
};
pub use domain::genre::Genre;
pub use domain::profile::{
    normalize_social_url, Platform, Profile, ProfileId, ProfileValidationError, SocialLinks,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::engine::{APOLOGY_STOP_REPLY, SLOW_REPLY, TECHNICAL_DIFFICULTY_REPLY};
pub use flows::{FlowEngine, FlowLimits, StateManager};
pub use metrics::{BotMetrics, MetricsSnapshot};
pub use venue::{PartnerVenue, VenueProfile};
