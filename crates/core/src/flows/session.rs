//! Process-scoped conversation-state cache in front of the durable store.
//! Entries populate lazily on miss and write through on every mutation; the
//! durable store stays the source of truth across restarts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::domain::conversation::ConversationState;
use crate::flows::ports::{StateStore, StoreError};

pub struct StateManager {
    store: Arc<dyn StateStore>,
    cache: Mutex<HashMap<String, ConversationState>>,
}

impl StateManager {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store, cache: Mutex::new(HashMap::new()) }
    }

    /// Cache first, durable store second, fresh state last.
    pub async fn get(&self, subject_id: &str) -> ConversationState {
        if let Some(state) = self.cache_get(subject_id) {
            return state;
        }

        match self.store.load(subject_id).await {
            Ok(Some(state)) => {
                self.cache_put(state.clone());
                state
            }
            Ok(None) => ConversationState::new(subject_id),
            Err(error) => {
                warn!(subject = subject_id, %error, "state load failed, starting fresh");
                ConversationState::new(subject_id)
            }
        }
    }

    /// Write-through: the cache is updated even when the durable write
    /// fails, and the failure is reported as a value.
    pub async fn put(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.cache_put(state.clone());
        self.store.save(state).await
    }

    /// Replaces the subject's state with a fresh one. Safe to call twice in
    /// a row: both calls yield the same fresh-state result.
    pub async fn reset(&self, subject_id: &str) -> ConversationState {
        let fresh = ConversationState::new(subject_id);
        if let Err(error) = self.put(&fresh).await {
            warn!(subject = subject_id, %error, "state reset persisted only in memory");
        }
        fresh
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn cache_get(&self, subject_id: &str) -> Option<ConversationState> {
        self.cache.lock().ok().and_then(|cache| cache.get(subject_id).cloned())
    }

    fn cache_put(&self, state: ConversationState) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(state.subject_id.clone(), state);
        }
    }
}
