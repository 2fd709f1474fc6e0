use thiserror::Error;

use palco_core::flows::ports::StoreError;

pub mod memory;
pub mod profile;
pub mod state;

pub use memory::{InMemoryProfileRepository, InMemoryStateRepository};
pub use profile::SqlProfileRepository;
pub use state::SqlStateRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => StoreError::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Rejected(message),
        }
    }
}
