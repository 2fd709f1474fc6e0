use serde::{Deserialize, Serialize};

/// Closed set of musical genres the venue programs for. Free text that does
/// not resolve to a named genre falls into `Other`, never an arbitrary
/// string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Genre {
    Rock,
    Pop,
    Mpb,
    Sertanejo,
    Funk,
    Rap,
    Eletronica,
    Jazz,
    Blues,
    Reggae,
    #[serde(rename = "outro")]
    Other,
}

/// Synonym table mapping free-text style descriptions onto the closed enum.
/// Reviewed as configuration data: coverage gaps fall through to `Other`.
const SYNONYMS: &[(&str, Genre)] = &[
    ("samba", Genre::Mpb),
    ("pagode", Genre::Mpb),
    ("bossa nova", Genre::Mpb),
    ("musica popular brasileira", Genre::Mpb),
    ("música popular brasileira", Genre::Mpb),
    ("hip hop", Genre::Rap),
    ("hip-hop", Genre::Rap),
    ("trap", Genre::Rap),
    ("country", Genre::Sertanejo),
    ("sertanejo universitário", Genre::Sertanejo),
    ("electronic", Genre::Eletronica),
    ("eletrônica", Genre::Eletronica),
    ("techno", Genre::Eletronica),
    ("house", Genre::Eletronica),
    ("edm", Genre::Eletronica),
    ("r&b", Genre::Blues),
    ("rhythm and blues", Genre::Blues),
    ("ragga", Genre::Reggae),
];

impl Genre {
    pub const ALL: [Genre; 11] = [
        Genre::Rock,
        Genre::Pop,
        Genre::Mpb,
        Genre::Sertanejo,
        Genre::Funk,
        Genre::Rap,
        Genre::Eletronica,
        Genre::Jazz,
        Genre::Blues,
        Genre::Reggae,
        Genre::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Rock => "rock",
            Genre::Pop => "pop",
            Genre::Mpb => "mpb",
            Genre::Sertanejo => "sertanejo",
            Genre::Funk => "funk",
            Genre::Rap => "rap",
            Genre::Eletronica => "eletronica",
            Genre::Jazz => "jazz",
            Genre::Blues => "blues",
            Genre::Reggae => "reggae",
            Genre::Other => "outro",
        }
    }

    /// Maps a free-text style description onto the enum: exact value match
    /// first, then the synonym table by substring, defaulting to `Other`.
    pub fn parse(text: &str) -> Genre {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return Genre::Other;
        }

        for genre in Genre::ALL {
            if genre == Genre::Other {
                continue;
            }
            if normalized == genre.as_str() || normalized.contains(genre.as_str()) {
                return genre;
            }
        }

        for (synonym, genre) in SYNONYMS {
            if normalized.contains(synonym) {
                return *genre;
            }
        }

        Genre::Other
    }

    /// Detects a genre mentioned anywhere inside free text, used by the
    /// heuristic extraction tier. `None` when nothing in the closed set or
    /// synonym table is mentioned (unlike `parse`, which always resolves).
    pub fn detect(text: &str) -> Option<Genre> {
        let normalized = text.to_lowercase();
        for genre in Genre::ALL {
            if genre == Genre::Other {
                continue;
            }
            if normalized.contains(genre.as_str()) {
                return Some(genre);
            }
        }
        SYNONYMS.iter().find(|(synonym, _)| normalized.contains(synonym)).map(|(_, g)| *g)
    }
}

impl std::fmt::Display for Genre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Genre;

    #[test]
    fn parse_matches_enum_values_directly() {
        assert_eq!(Genre::parse("rock"), Genre::Rock);
        assert_eq!(Genre::parse(" MPB "), Genre::Mpb);
        assert_eq!(Genre::parse("Jazz"), Genre::Jazz);
    }

    #[test]
    fn parse_maps_synonyms_into_buckets() {
        assert_eq!(Genre::parse("samba"), Genre::Mpb);
        assert_eq!(Genre::parse("pagode"), Genre::Mpb);
        assert_eq!(Genre::parse("bossa nova"), Genre::Mpb);
        assert_eq!(Genre::parse("hip hop"), Genre::Rap);
        assert_eq!(Genre::parse("country"), Genre::Sertanejo);
        assert_eq!(Genre::parse("techno"), Genre::Eletronica);
    }

    #[test]
    fn parse_defaults_to_other_for_unknown_styles() {
        assert_eq!(Genre::parse("forró"), Genre::Other);
        assert_eq!(Genre::parse(""), Genre::Other);
        assert_eq!(Genre::parse("polka experimental"), Genre::Other);
    }

    #[test]
    fn parse_tolerates_composite_descriptions() {
        assert_eq!(Genre::parse("rock nacional"), Genre::Rock);
        assert_eq!(Genre::parse("jazz instrumental"), Genre::Jazz);
    }

    #[test]
    fn detect_finds_genre_inside_free_text() {
        assert_eq!(Genre::detect("a gente toca rock autoral"), Some(Genre::Rock));
        assert_eq!(Genre::detect("somos um grupo de pagode"), Some(Genre::Mpb));
        assert_eq!(Genre::detect("oi, tudo bem?"), None);
    }
}
