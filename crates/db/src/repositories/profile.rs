use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use palco_core::domain::contact::{ContactChannel, ContactKind};
use palco_core::domain::genre::Genre;
use palco_core::domain::profile::{Profile, ProfileId, SocialLinks};
use palco_core::flows::ports::{LogDirection, ProfileStore, StoreError};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlProfileRepository {
    pool: DbPool,
}

impl SqlProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_contacts(
        &self,
        profile_id: &ProfileId,
    ) -> Result<Vec<ContactChannel>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT kind, value, is_primary FROM profile_contact WHERE profile_id = ?",
        )
        .bind(profile_id.0.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let kind = match row.get::<String, _>("kind").as_str() {
                    "whatsapp" => ContactKind::Whatsapp,
                    "email" => ContactKind::Email,
                    "phone" => ContactKind::Phone,
                    other => {
                        return Err(RepositoryError::Decode(format!(
                            "unknown contact kind `{other}`"
                        )))
                    }
                };
                Ok(ContactChannel {
                    kind,
                    value: row.get::<String, _>("value"),
                    primary: row.get::<i64, _>("is_primary") != 0,
                })
            })
            .collect()
    }

    fn decode_profile(row: &sqlx::sqlite::SqliteRow) -> Result<Profile, RepositoryError> {
        let id = Uuid::parse_str(&row.get::<String, _>("id"))
            .map_err(|error| RepositoryError::Decode(format!("bad profile id: {error}")))?;
        let social_links: SocialLinks =
            serde_json::from_str(&row.get::<String, _>("social_links"))
                .map_err(|error| RepositoryError::Decode(format!("bad social links: {error}")))?;

        Ok(Profile {
            id: ProfileId(id),
            name: row.get::<String, _>("name"),
            city: row.get::<Option<String>, _>("city"),
            genre: Genre::parse(&row.get::<String, _>("genre")),
            social_links,
            bio: row.get::<Option<String>, _>("bio"),
            years_experience: row
                .get::<Option<i64>, _>("years_experience")
                .and_then(|years| u8::try_from(years).ok()),
            contact_channels: Vec::new(),
        })
    }

    async fn find_by_contact_inner(
        &self,
        subject_id: &str,
    ) -> Result<Option<Profile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT p.id, p.name, p.city, p.genre, p.social_links, p.bio, p.years_experience \
             FROM artist_profile p \
             JOIN profile_contact c ON c.profile_id = p.id \
             WHERE c.value = ? AND c.kind = 'whatsapp' \
             LIMIT 1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut profile = Self::decode_profile(&row)?;
        profile.contact_channels = self.load_contacts(&profile.id).await?;
        Ok(Some(profile))
    }

    async fn create_inner(&self, profile: &Profile) -> Result<ProfileId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let social_links = serde_json::to_string(&profile.social_links)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO artist_profile (id, name, city, genre, social_links, bio, years_experience) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(profile.id.0.to_string())
        .bind(&profile.name)
        .bind(&profile.city)
        .bind(profile.genre.as_str())
        .bind(social_links)
        .bind(&profile.bio)
        .bind(profile.years_experience.map(i64::from))
        .execute(&mut *tx)
        .await?;

        for contact in &profile.contact_channels {
            sqlx::query(
                "INSERT INTO profile_contact (profile_id, kind, value, is_primary) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(profile.id.0.to_string())
            .bind(match contact.kind {
                ContactKind::Whatsapp => "whatsapp",
                ContactKind::Email => "email",
                ContactKind::Phone => "phone",
            })
            .bind(&contact.value)
            .bind(i64::from(contact.primary))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(profile.id.clone())
    }

    async fn update_inner(&self, profile: &Profile) -> Result<(), RepositoryError> {
        let social_links = serde_json::to_string(&profile.social_links)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        let result = sqlx::query(
            "UPDATE artist_profile \
             SET name = ?, city = ?, genre = ?, social_links = ?, bio = ?, years_experience = ? \
             WHERE id = ?",
        )
        .bind(&profile.name)
        .bind(&profile.city)
        .bind(profile.genre.as_str())
        .bind(social_links)
        .bind(&profile.bio)
        .bind(profile.years_experience.map(i64::from))
        .bind(profile.id.0.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Decode(format!(
                "profile `{}` does not exist",
                profile.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqlProfileRepository {
    async fn find_by_contact(&self, subject_id: &str) -> Result<Option<Profile>, StoreError> {
        self.find_by_contact_inner(subject_id).await.map_err(StoreError::from)
    }

    async fn create(&self, profile: &Profile) -> Result<ProfileId, StoreError> {
        self.create_inner(profile).await.map_err(StoreError::from)
    }

    async fn update(&self, profile: &Profile) -> Result<(), StoreError> {
        self.update_inner(profile).await.map_err(StoreError::from)
    }

    async fn append_interaction(
        &self,
        profile_id: &ProfileId,
        text: &str,
        direction: LogDirection,
        key_moment: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO interaction_log (profile_id, direction, message, key_moment) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(profile_id.0.to_string())
        .bind(direction.as_str())
        .bind(text)
        .bind(key_moment)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        Ok(())
    }
}
