//! In-memory implementations of the storage ports, for tests and the
//! offline simulator.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use palco_core::domain::conversation::ConversationState;
use palco_core::domain::profile::{Profile, ProfileId};
use palco_core::flows::ports::{LogDirection, ProfileStore, StateStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryProfileRepository {
    profiles: Mutex<Vec<Profile>>,
    interactions: Mutex<Vec<InteractionRecord>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionRecord {
    pub profile_id: ProfileId,
    pub message: String,
    pub direction: &'static str,
    pub key_moment: Option<String>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.profiles.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn interactions(&self) -> Vec<InteractionRecord> {
        self.interactions.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileRepository {
    async fn find_by_contact(&self, subject_id: &str) -> Result<Option<Profile>, StoreError> {
        let rows = self
            .profiles
            .lock()
            .map_err(|_| StoreError::Unavailable("profile lock poisoned".to_string()))?;
        Ok(rows
            .iter()
            .find(|profile| {
                profile.contact_channels.iter().any(|contact| contact.value == subject_id)
            })
            .cloned())
    }

    async fn create(&self, profile: &Profile) -> Result<ProfileId, StoreError> {
        let mut rows = self
            .profiles
            .lock()
            .map_err(|_| StoreError::Unavailable("profile lock poisoned".to_string()))?;
        rows.push(profile.clone());
        Ok(profile.id.clone())
    }

    async fn update(&self, profile: &Profile) -> Result<(), StoreError> {
        let mut rows = self
            .profiles
            .lock()
            .map_err(|_| StoreError::Unavailable("profile lock poisoned".to_string()))?;
        match rows.iter_mut().find(|row| row.id == profile.id) {
            Some(row) => {
                *row = profile.clone();
                Ok(())
            }
            None => Err(StoreError::Rejected(format!("profile `{}` does not exist", profile.id))),
        }
    }

    async fn append_interaction(
        &self,
        profile_id: &ProfileId,
        text: &str,
        direction: LogDirection,
        key_moment: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut rows = self
            .interactions
            .lock()
            .map_err(|_| StoreError::Unavailable("interaction lock poisoned".to_string()))?;
        rows.push(InteractionRecord {
            profile_id: profile_id.clone(),
            message: text.to_string(),
            direction: direction.as_str(),
            key_moment: key_moment.map(str::to_string),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStateRepository {
    states: Mutex<HashMap<String, ConversationState>>,
}

impl InMemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateRepository {
    async fn load(&self, subject_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let rows = self
            .states
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))?;
        Ok(rows.get(subject_id).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let mut rows = self
            .states
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))?;
        rows.insert(state.subject_id.clone(), state.clone());
        Ok(())
    }
}
