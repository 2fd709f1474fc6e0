//! Venue identity, partner directory and the mocked availability calendar.
//! The copy blocks here feed the flow engine's menu/info/schedule replies.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::genre::Genre;
use crate::flows::ports::{AvailabilityCalendar, ShowSlot};

/// Identity of the house the bot books for. Configurable so the same code
/// serves a different venue without a rebuild.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueProfile {
    pub name: String,
    pub persona_name: String,
    pub city: String,
    pub address: String,
    pub opening_hours: String,
    pub show_nights: String,
    pub blurb: String,
}

impl Default for VenueProfile {
    fn default() -> Self {
        Self {
            name: "Armazém do Palco".to_string(),
            persona_name: "Lia".to_string(),
            city: "Bragança Paulista".to_string(),
            address: "Rua das Gaitas, 120 - Centro, Bragança Paulista/SP".to_string(),
            opening_hours: "Qui-Dom, 18h às 00h".to_string(),
            show_nights: "Sex e Sáb, a partir das 20h".to_string(),
            blurb: "Espaço acolhedor de música ao vivo, focado em rock, MPB e música autoral."
                .to_string(),
        }
    }
}

impl VenueProfile {
    /// Venue information block, also used by the info state.
    pub fn info_text(&self) -> String {
        format!(
            "{name}\n\n\
             Endereço: {address}\n\
             Funcionamento: {hours}\n\
             Shows: {nights}\n\n\
             {blurb}\n\n\
             Algo mais que você gostaria de saber?",
            name = self.name,
            address = self.address,
            hours = self.opening_hours,
            nights = self.show_nights,
            blurb = self.blurb,
        )
    }
}

/// A partner venue the bot can refer artists to when the house calendar has
/// no open slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerVenue {
    pub name: String,
    pub city: String,
    pub genres: Vec<Genre>,
}

pub fn default_partner_directory() -> Vec<PartnerVenue> {
    vec![
        PartnerVenue {
            name: "Porão do Blues".to_string(),
            city: "Bragança Paulista".to_string(),
            genres: vec![Genre::Blues, Genre::Jazz, Genre::Rock],
        },
        PartnerVenue {
            name: "Quintal da Vila".to_string(),
            city: "Atibaia".to_string(),
            genres: vec![Genre::Mpb, Genre::Pop, Genre::Sertanejo],
        },
        PartnerVenue {
            name: "Galpão 77".to_string(),
            city: "Campinas".to_string(),
            genres: vec![Genre::Rock, Genre::Rap, Genre::Eletronica],
        },
        PartnerVenue {
            name: "Casa Maré".to_string(),
            city: "Bragança Paulista".to_string(),
            genres: vec![Genre::Reggae, Genre::Mpb],
        },
    ]
}

/// Picks up to `limit` referral candidates: genre overlap first, narrowed by
/// city when possible, falling back to a random sample of the directory.
pub fn pick_partner_referrals(
    directory: &[PartnerVenue],
    genre: Option<Genre>,
    city: Option<&str>,
    limit: usize,
) -> Vec<PartnerVenue> {
    let mut by_genre: Vec<&PartnerVenue> = match genre {
        Some(genre) => directory.iter().filter(|venue| venue.genres.contains(&genre)).collect(),
        None => Vec::new(),
    };

    if let Some(city) = city {
        let city_lower = city.trim().to_lowercase();
        let same_city: Vec<&PartnerVenue> = by_genre
            .iter()
            .copied()
            .filter(|venue| venue.city.to_lowercase() == city_lower)
            .collect();
        if !same_city.is_empty() {
            by_genre = same_city;
        }
    }

    if by_genre.is_empty() {
        let mut rng = rand::thread_rng();
        let mut sampled: Vec<PartnerVenue> = directory.to_vec();
        sampled.shuffle(&mut rng);
        sampled.truncate(limit);
        return sampled;
    }

    by_genre.into_iter().take(limit).cloned().collect()
}

/// Mocked calendar: a handful of canned weekend slots, each independently
/// open with the configured probability. A real availability query replaces
/// this implementation behind the same trait.
pub struct MockedCalendar {
    pub open_probability: f64,
}

impl Default for MockedCalendar {
    fn default() -> Self {
        Self { open_probability: 0.7 }
    }
}

const CANNED_SLOTS: &[&str] = &[
    "Sexta 23/08 - 20h às 23h",
    "Sábado 24/08 - 21h às 00h",
    "Sexta 30/08 - 20h às 23h",
];

impl AvailabilityCalendar for MockedCalendar {
    fn open_slots(&self) -> Vec<ShowSlot> {
        let mut rng = rand::thread_rng();
        CANNED_SLOTS
            .iter()
            .filter(|_| rng.gen_bool(self.open_probability.clamp(0.0, 1.0)))
            .map(|label| ShowSlot { label: (*label).to_string() })
            .collect()
    }
}

/// Deterministic calendar for tests and the offline simulator.
pub struct FixedCalendar {
    pub slots: Vec<ShowSlot>,
}

impl FixedCalendar {
    pub fn empty() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn with_defaults() -> Self {
        Self {
            slots: CANNED_SLOTS.iter().map(|label| ShowSlot { label: (*label).to_string() }).collect(),
        }
    }
}

impl AvailabilityCalendar for FixedCalendar {
    fn open_slots(&self) -> Vec<ShowSlot> {
        self.slots.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::genre::Genre;

    use super::{default_partner_directory, pick_partner_referrals, FixedCalendar};
    use crate::flows::ports::AvailabilityCalendar;

    #[test]
    fn referrals_prefer_genre_overlap() {
        let directory = default_partner_directory();
        let picks = pick_partner_referrals(&directory, Some(Genre::Rock), None, 2);

        assert!(!picks.is_empty());
        assert!(picks.iter().all(|venue| venue.genres.contains(&Genre::Rock)));
    }

    #[test]
    fn referrals_narrow_by_city_when_possible() {
        let directory = default_partner_directory();
        let picks =
            pick_partner_referrals(&directory, Some(Genre::Rock), Some("Bragança Paulista"), 3);

        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].name, "Porão do Blues");
    }

    #[test]
    fn referrals_fall_back_to_a_sample_when_nothing_matches() {
        let directory = default_partner_directory();
        let picks = pick_partner_referrals(&directory, Some(Genre::Funk), None, 2);

        assert_eq!(picks.len(), 2);
    }

    #[test]
    fn fixed_calendar_is_deterministic() {
        assert!(FixedCalendar::empty().open_slots().is_empty());
        assert_eq!(FixedCalendar::with_defaults().open_slots().len(), 3);
    }
}
