use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::Row;

use palco_core::domain::conversation::ConversationState;
use palco_core::flows::ports::{StateStore, StoreError};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlStateRepository {
    pool: DbPool,
}

impl SqlStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// State rows are keyed by a digest of the subject id, keeping raw phone
/// numbers out of the state table.
pub fn subject_hash(subject_id: &str) -> String {
    let digest = Sha256::digest(subject_id.as_bytes());
    format!("{digest:x}")
}

#[async_trait]
impl StateStore for SqlStateRepository {
    async fn load(&self, subject_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let row = sqlx::query("SELECT state FROM conversation_state WHERE subject_hash = ?")
            .bind(subject_hash(subject_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)
            .map_err(StoreError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };

        serde_json::from_str(&row.get::<String, _>("state"))
            .map(Some)
            .map_err(|error| StoreError::Rejected(format!("bad state row: {error}")))
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let payload = serde_json::to_string(state)
            .map_err(|error| StoreError::Rejected(error.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_state (subject_hash, state, updated_at) \
             VALUES (?, ?, datetime('now')) \
             ON CONFLICT (subject_hash) DO UPDATE SET \
                 state = excluded.state, \
                 updated_at = excluded.updated_at",
        )
        .bind(subject_hash(&state.subject_id))
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::Unavailable(error.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use palco_core::domain::conversation::{ConversationState, Stage};
    use palco_core::flows::ports::StateStore;

    use crate::{connect_with_settings, migrations};

    use super::{subject_hash, SqlStateRepository};

    async fn repository() -> SqlStateRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqlStateRepository::new(pool)
    }

    #[tokio::test]
    async fn save_and_load_round_trips_the_full_state() {
        let repo = repository().await;
        let mut state = ConversationState::new("+5511987654321");
        state.stage = Stage::CollectingLinks;
        state.collected_fields.name = Some("Banda X".to_string());
        state.collection_attempts = 4;

        repo.save(&state).await.expect("save");
        let loaded =
            repo.load("+5511987654321").await.expect("load").expect("state should exist");

        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let repo = repository().await;
        let mut state = ConversationState::new("+5511987654321");
        repo.save(&state).await.expect("first save");

        state.stage = Stage::MainMenu;
        repo.save(&state).await.expect("second save");

        let loaded =
            repo.load("+5511987654321").await.expect("load").expect("state should exist");
        assert_eq!(loaded.stage, Stage::MainMenu);
    }

    #[tokio::test]
    async fn missing_subject_loads_nothing() {
        let repo = repository().await;
        assert!(repo.load("+5511900000000").await.expect("load").is_none());
    }

    #[test]
    fn subject_hash_is_stable_and_hides_the_number() {
        let hash = subject_hash("+5511987654321");
        assert_eq!(hash, subject_hash("+5511987654321"));
        assert!(!hash.contains("5511987654321"));
        assert_eq!(hash.len(), 64);
    }
}
