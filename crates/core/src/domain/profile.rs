use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::contact::ContactChannel;
use crate::domain::conversation::CollectedFields;
use crate::domain::genre::Genre;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Social platforms the intake flow knows how to normalize links for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Youtube,
    Spotify,
    Soundcloud,
    Bandcamp,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Instagram,
        Platform::Youtube,
        Platform::Spotify,
        Platform::Soundcloud,
        Platform::Bandcamp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::Spotify => "spotify",
            Platform::Soundcloud => "soundcloud",
            Platform::Bandcamp => "bandcamp",
        }
    }

    /// Sniffs the platform from a full URL's domain.
    pub fn from_url(url: &str) -> Option<Platform> {
        let lower = url.to_lowercase();
        if lower.contains("instagram.com") {
            Some(Platform::Instagram)
        } else if lower.contains("youtube.com") || lower.contains("youtu.be") {
            Some(Platform::Youtube)
        } else if lower.contains("spotify.com") {
            Some(Platform::Spotify)
        } else if lower.contains("soundcloud.com") {
            Some(Platform::Soundcloud)
        } else if lower.contains("bandcamp.com") {
            Some(Platform::Bandcamp)
        } else {
            None
        }
    }
}

/// Turns a bare `@handle`, partial path or full URL into an absolute URL
/// following each platform's path conventions.
pub fn normalize_social_url(platform: Platform, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Some(trimmed.to_string());
    }

    let handle = trimmed.trim_start_matches('@').trim_matches('/').to_string();
    if handle.is_empty() {
        return None;
    }

    // A partial like "youtube.com/banda" only needs the scheme back.
    if handle.contains('.') && handle.contains('/') {
        return Some(format!("https://{handle}"));
    }

    Some(match platform {
        Platform::Instagram => format!("https://instagram.com/{handle}"),
        Platform::Youtube => format!("https://youtube.com/@{handle}"),
        Platform::Spotify => format!("https://open.spotify.com/artist/{handle}"),
        Platform::Soundcloud => format!("https://soundcloud.com/{handle}"),
        Platform::Bandcamp => format!("https://{handle}.bandcamp.com"),
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub instagram: Option<String>,
    pub youtube: Option<String>,
    pub spotify: Option<String>,
    pub soundcloud: Option<String>,
    pub bandcamp: Option<String>,
}

impl SocialLinks {
    pub fn is_empty(&self) -> bool {
        self.instagram.is_none()
            && self.youtube.is_none()
            && self.spotify.is_none()
            && self.soundcloud.is_none()
            && self.bandcamp.is_none()
    }

    pub fn get(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Instagram => self.instagram.as_deref(),
            Platform::Youtube => self.youtube.as_deref(),
            Platform::Spotify => self.spotify.as_deref(),
            Platform::Soundcloud => self.soundcloud.as_deref(),
            Platform::Bandcamp => self.bandcamp.as_deref(),
        }
    }

    pub fn set(&mut self, platform: Platform, url: String) {
        match platform {
            Platform::Instagram => self.instagram = Some(url),
            Platform::Youtube => self.youtube = Some(url),
            Platform::Spotify => self.spotify = Some(url),
            Platform::Soundcloud => self.soundcloud = Some(url),
            Platform::Bandcamp => self.bandcamp = Some(url),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub city: Option<String>,
    pub genre: Genre,
    pub social_links: SocialLinks,
    pub bio: Option<String>,
    pub years_experience: Option<u8>,
    pub contact_channels: Vec<ContactChannel>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProfileValidationError {
    #[error("field `{field}` is missing")]
    MissingField { field: &'static str },
    #[error("field `{field}` is out of bounds: {detail}")]
    OutOfBounds { field: &'static str, detail: String },
}

impl ProfileValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingField { field } | Self::OutOfBounds { field, .. } => field,
        }
    }
}

impl Profile {
    /// The persistence gate: name + genre + at least one social link. City
    /// is recommended but never blocks persistence.
    pub fn is_minimum_viable(&self) -> bool {
        !self.name.trim().is_empty() && !self.social_links.is_empty()
    }

    /// Fields still missing before the profile can book shows, in the same
    /// priority order the collection flow asks for them.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("nome");
        }
        if self.social_links.is_empty() {
            missing.push("links das redes sociais");
        }
        missing
    }

    /// Builds a persistable profile from the fields a conversation has
    /// accumulated. Enforces the data-model bounds; the caller turns a
    /// failure into a clarification prompt for the named field.
    pub fn from_collected(
        collected: &CollectedFields,
        subject_id: &str,
    ) -> Result<Profile, ProfileValidationError> {
        let name = collected
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(ProfileValidationError::MissingField { field: "nome" })?;
        if name.len() < 2 || name.len() > 100 {
            return Err(ProfileValidationError::OutOfBounds {
                field: "nome",
                detail: format!("expected 2..=100 chars, got {}", name.len()),
            });
        }

        let genre_text = collected
            .genre
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .ok_or(ProfileValidationError::MissingField { field: "estilo musical" })?;

        if let Some(city) = collected.city.as_deref() {
            if city.len() > 50 {
                return Err(ProfileValidationError::OutOfBounds {
                    field: "cidade",
                    detail: format!("expected at most 50 chars, got {}", city.len()),
                });
            }
        }

        if let Some(bio) = collected.bio.as_deref() {
            if bio.len() > 500 {
                return Err(ProfileValidationError::OutOfBounds {
                    field: "biografia",
                    detail: format!("expected at most 500 chars, got {}", bio.len()),
                });
            }
        }

        if let Some(years) = collected.years_experience {
            if years > 50 {
                return Err(ProfileValidationError::OutOfBounds {
                    field: "experiencia",
                    detail: format!("expected 0..=50 years, got {years}"),
                });
            }
        }

        let mut social_links = SocialLinks::default();
        for platform in Platform::ALL {
            if let Some(raw) = collected.link(platform) {
                if let Some(url) = normalize_social_url(platform, raw) {
                    social_links.set(platform, url);
                }
            }
        }
        if social_links.is_empty() {
            return Err(ProfileValidationError::MissingField { field: "links" });
        }

        Ok(Profile {
            id: ProfileId::generate(),
            name: name.to_string(),
            city: collected.city.as_deref().map(str::trim).map(str::to_string),
            genre: Genre::parse(genre_text),
            social_links,
            bio: collected.bio.clone(),
            years_experience: collected.years_experience,
            contact_channels: vec![ContactChannel::whatsapp_primary(subject_id)],
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::conversation::CollectedFields;
    use crate::domain::genre::Genre;

    use super::{normalize_social_url, Platform, Profile, ProfileValidationError};

    fn viable_fields() -> CollectedFields {
        CollectedFields {
            name: Some("Banda X".to_string()),
            genre: Some("rock".to_string()),
            city: Some("Bragança".to_string()),
            instagram: Some("@bandax".to_string()),
            ..CollectedFields::default()
        }
    }

    #[test]
    fn handle_normalization_strips_at_and_builds_absolute_url() {
        assert_eq!(
            normalize_social_url(Platform::Instagram, "@bandax").as_deref(),
            Some("https://instagram.com/bandax")
        );
        assert_eq!(
            normalize_social_url(Platform::Youtube, "bandax").as_deref(),
            Some("https://youtube.com/@bandax")
        );
        assert_eq!(
            normalize_social_url(Platform::Spotify, "3x4mpl3").as_deref(),
            Some("https://open.spotify.com/artist/3x4mpl3")
        );
        assert_eq!(
            normalize_social_url(Platform::Bandcamp, "bandax").as_deref(),
            Some("https://bandax.bandcamp.com")
        );
    }

    #[test]
    fn full_urls_pass_through_and_partials_gain_scheme() {
        assert_eq!(
            normalize_social_url(Platform::Instagram, "https://instagram.com/bandax").as_deref(),
            Some("https://instagram.com/bandax")
        );
        assert_eq!(
            normalize_social_url(Platform::Youtube, "youtube.com/bandax").as_deref(),
            Some("https://youtube.com/bandax")
        );
        assert_eq!(normalize_social_url(Platform::Instagram, "   "), None);
    }

    #[test]
    fn platform_sniffing_from_domain() {
        assert_eq!(Platform::from_url("https://open.spotify.com/artist/x"), Some(Platform::Spotify));
        assert_eq!(Platform::from_url("https://youtu.be/abc"), Some(Platform::Youtube));
        assert_eq!(Platform::from_url("https://mais.co/rocktotal"), None);
    }

    #[test]
    fn collected_fields_build_a_viable_profile() {
        let profile = Profile::from_collected(&viable_fields(), "whatsapp:11987654321")
            .expect("viable fields should build");

        assert_eq!(profile.name, "Banda X");
        assert_eq!(profile.genre, Genre::Rock);
        assert_eq!(profile.social_links.instagram.as_deref(), Some("https://instagram.com/bandax"));
        assert!(profile.is_minimum_viable());
        assert_eq!(profile.contact_channels.len(), 1);
        assert_eq!(profile.contact_channels[0].value, "+5511987654321");
    }

    #[test]
    fn genre_always_lands_in_the_closed_enum() {
        let mut fields = viable_fields();
        fields.genre = Some("forró eletrônico de garagem".to_string());
        let profile = Profile::from_collected(&fields, "+5511987654321").expect("build");
        assert!(Genre::ALL.contains(&profile.genre));
    }

    #[test]
    fn missing_name_and_links_are_rejected_with_the_field_named() {
        let mut fields = viable_fields();
        fields.name = None;
        let error = Profile::from_collected(&fields, "+5511987654321").expect_err("no name");
        assert_eq!(error.field(), "nome");

        let mut fields = viable_fields();
        fields.instagram = None;
        let error = Profile::from_collected(&fields, "+5511987654321").expect_err("no links");
        assert_eq!(error.field(), "links");
    }

    #[test]
    fn out_of_bounds_experience_is_rejected() {
        let mut fields = viable_fields();
        fields.years_experience = Some(70);
        let error = Profile::from_collected(&fields, "+5511987654321").expect_err("bad years");
        assert!(matches!(error, ProfileValidationError::OutOfBounds { field: "experiencia", .. }));
    }
}
